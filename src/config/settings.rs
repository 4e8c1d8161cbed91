/// Runtime settings structures

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::error::ConfigError;

pub const PUMPPORTAL_WEBSOCKET: &str = "wss://pumpportal.fun/api/data";
pub const DEXSCREENER_TOKEN_PAIRS: &str = "https://api.dexscreener.com/token-pairs/v1/solana";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub transport: TransportSettings,
    pub subscription: SubscriptionSpec,
    pub tracker: TrackerSettings,
    pub enrichment: EnrichmentSettings,
    pub decoder: DecoderSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportSettings {
    pub endpoint: String,
    pub reconnect_delay_secs: u64,
    pub connect_timeout_secs: u64,
    /// Capacity of the ordered frame channel between session and consumer
    pub frame_buffer: usize,
    /// Consecutive handshake failures before logging at error level
    pub handshake_escalation_after: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            endpoint: PUMPPORTAL_WEBSOCKET.to_string(),
            reconnect_delay_secs: 5,
            connect_timeout_secs: 10,
            frame_buffer: 4096,
            handshake_escalation_after: 3,
        }
    }
}

impl TransportSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Event categories and keys requested on every (re)connect.
/// Fixed for the lifetime of a session.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionSpec {
    pub new_tokens: bool,
    /// Keys for the token trade subscription; `*` means every token
    pub token_trade_keys: Vec<String>,
    pub migrations: bool,
}

impl Default for SubscriptionSpec {
    fn default() -> Self {
        Self {
            new_tokens: true,
            token_trade_keys: vec!["*".to_string()],
            migrations: false,
        }
    }
}

impl SubscriptionSpec {
    /// Subscription requests in the order they are sent
    pub fn requests(&self) -> Vec<String> {
        let mut requests = Vec::new();

        if self.new_tokens {
            requests.push(json!({ "method": "subscribeNewToken" }).to_string());
        }

        if !self.token_trade_keys.is_empty() {
            requests.push(
                json!({
                    "method": "subscribeTokenTrade",
                    "keys": self.token_trade_keys,
                })
                .to_string(),
            );
        }

        if self.migrations {
            requests.push(json!({ "method": "subscribeMigration" }).to_string());
        }

        requests
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub pre_graduation_min_percent: f64,
    pub pre_graduation_max_percent: f64,
    /// Tracked-token count above which the sweep evicts
    pub high_water_mark: usize,
    /// Number of oldest entries dropped per sweep
    pub eviction_batch: usize,
    pub sweep_interval_secs: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            pre_graduation_min_percent: 40.0,
            pre_graduation_max_percent: 60.0,
            high_water_mark: 1000,
            eviction_batch: 500,
            sweep_interval_secs: 30,
        }
    }
}

impl TrackerSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEXSCREENER_TOKEN_PAIRS.to_string(),
            timeout_secs: 5,
        }
    }
}

impl EnrichmentSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecoderSettings {
    pub unknown_kind_log_limit: usize,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            unknown_kind_log_limit: 5,
        }
    }
}

impl Settings {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Like `load_from_file`, but a missing file yields the defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.transport.endpoint).map_err(|_| ConfigError::Invalid {
            field: "transport.endpoint",
            value: self.transport.endpoint.clone(),
        })?;

        if self.transport.reconnect_delay_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.reconnect_delay_secs",
                value: "0".to_string(),
            });
        }

        if self.transport.frame_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.frame_buffer",
                value: "0".to_string(),
            });
        }

        let tracker = &self.tracker;
        let in_range = |p: f64| (0.0..=100.0).contains(&p);
        if !in_range(tracker.pre_graduation_min_percent)
            || !in_range(tracker.pre_graduation_max_percent)
            || tracker.pre_graduation_min_percent > tracker.pre_graduation_max_percent
        {
            return Err(ConfigError::Invalid {
                field: "tracker.pre_graduation_*_percent",
                value: format!(
                    "{}..{}",
                    tracker.pre_graduation_min_percent, tracker.pre_graduation_max_percent
                ),
            });
        }

        if tracker.eviction_batch == 0 {
            return Err(ConfigError::Invalid {
                field: "tracker.eviction_batch",
                value: "0".to_string(),
            });
        }

        if tracker.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "tracker.sweep_interval_secs",
                value: "0".to_string(),
            });
        }

        if self.enrichment.enabled {
            Url::parse(&self.enrichment.endpoint).map_err(|_| ConfigError::Invalid {
                field: "enrichment.endpoint",
                value: self.enrichment.endpoint.clone(),
            })?;
        }

        Ok(())
    }
}
