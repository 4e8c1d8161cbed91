/// Shared data types flowing through the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Trade,
    Graduated,
}

/// A decoded frame. Produced by the decoder, consumed once by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchEvent {
    pub kind: EventKind,
    pub token_address: String,
    /// 0-100, only meaningful for Trade and Graduated
    pub bonding_curve_percent: f64,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub price_sol: Option<f64>,
    pub volume_sol: Option<f64>,
    pub liquidity_sol: Option<f64>,
    pub market_cap_sol: Option<f64>,
    pub trader: Option<String>,
    pub signature: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LaunchEvent {
    pub fn new(kind: EventKind, token_address: impl Into<String>, bonding_curve_percent: f64) -> Self {
        Self {
            kind,
            token_address: token_address.into(),
            bonding_curve_percent,
            name: None,
            symbol: None,
            price_sol: None,
            volume_sol: None,
            liquidity_sol: None,
            market_cap_sol: None,
            trader: None,
            signature: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    PreGraduation,
    PostGraduation,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::PreGraduation => write!(f, "pre_graduation"),
            SignalType::PostGraduation => write!(f, "post_graduation"),
        }
    }
}

/// Classification result awaiting enrichment and delivery
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSignal {
    pub signal_type: SignalType,
    pub event: LaunchEvent,
}

/// Aggregate market data from the pair lookup, all values in USD
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_h1_usd: Option<f64>,
    pub volume_h24_usd: Option<f64>,
    pub price_change_m5: Option<f64>,
    pub price_change_h1: Option<f64>,
    pub price_change_h24: Option<f64>,
}

/// Result of the best-effort enrichment lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairData {
    pub holder_count: u64,
    pub market: Option<MarketSnapshot>,
}

/// Finalized signal handed to the downstream sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub token_address: String,
    pub name: String,
    pub symbol: String,
    pub signal_type: SignalType,
    pub bonding_curve_percent: f64,
    pub price_sol: Option<f64>,
    pub volume_sol: Option<f64>,
    pub liquidity_sol: Option<f64>,
    pub market_cap_sol: Option<f64>,
    pub trader: Option<String>,
    pub signature: Option<String>,
    #[serde(flatten)]
    pub market: MarketSnapshot,
    pub holder_count: u64,
    pub event_time: DateTime<Utc>,
    pub emitted_at: DateTime<Utc>,
}

impl Signal {
    /// Merges transport fields, classification and enrichment
    pub fn from_parts(pending: PendingSignal, enrichment: PairData) -> Self {
        let PendingSignal { signal_type, event } = pending;
        Self {
            name: event.name.unwrap_or_else(|| "Unknown".to_string()),
            symbol: event.symbol.unwrap_or_else(|| "???".to_string()),
            token_address: event.token_address,
            signal_type,
            bonding_curve_percent: event.bonding_curve_percent,
            price_sol: event.price_sol,
            volume_sol: event.volume_sol,
            liquidity_sol: event.liquidity_sol,
            market_cap_sol: event.market_cap_sol,
            trader: event.trader,
            signature: event.signature,
            market: enrichment.market.unwrap_or_default(),
            holder_count: enrichment.holder_count,
            event_time: event.timestamp,
            emitted_at: Utc::now(),
        }
    }
}
