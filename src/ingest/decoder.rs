/// Frame decoding for PumpPortal-style launch events

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::types::{EventKind, LaunchEvent};

// pump.fun bonding curve constants (token units, 6 decimals stripped)
const INITIAL_VIRTUAL_TOKEN_RESERVES: f64 = 1_073_000_000.0;
const CURVE_TOKENS_FOR_SALE: f64 = 793_100_000.0;
const FINAL_VIRTUAL_TOKEN_RESERVES: f64 = INITIAL_VIRTUAL_TOKEN_RESERVES - CURVE_TOKENS_FOR_SALE;

/// Wire shape of an inbound frame. Every field is optional so that partial
/// frames reach the classification step below instead of failing serde.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(alias = "txType")]
    tx_type: Option<String>,

    mint: Option<String>,
    name: Option<String>,
    symbol: Option<String>,

    #[serde(alias = "bondingCurvePercent", alias = "bondingCurveProgress")]
    bonding_curve_percent: Option<f64>,

    #[serde(alias = "vTokensInBondingCurve")]
    v_tokens_in_bonding_curve: Option<f64>,

    #[serde(alias = "vSolInBondingCurve")]
    v_sol_in_bonding_curve: Option<f64>,

    #[serde(alias = "marketCapSol")]
    market_cap_sol: Option<f64>,

    #[serde(alias = "solAmount")]
    sol_amount: Option<f64>,

    price: Option<f64>,

    #[serde(alias = "traderPublicKey")]
    trader_public_key: Option<String>,

    signature: Option<String>,
    timestamp: Option<f64>,
    message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub decoded: u64,
    pub malformed: u64,
    pub unknown_kind: u64,
    pub acknowledgements: u64,
}

/// Converts raw text frames into `LaunchEvent`s. A frame that cannot be
/// classified yields `None`; decoding never fails the caller.
#[derive(Debug)]
pub struct FrameDecoder {
    unknown_kind_log_limit: usize,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(unknown_kind_log_limit: usize) -> Self {
        Self {
            unknown_kind_log_limit,
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    pub fn decode(&mut self, frame: &str) -> Option<LaunchEvent> {
        let raw = match serde_json::from_str::<RawFrame>(frame) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.malformed += 1;
                debug!(error = %e, "Dropping frame that is not a JSON object");
                return None;
            }
        };

        let tx_type = match raw.tx_type.as_deref() {
            Some(tx_type) => tx_type,
            None => {
                if let Some(message) = raw.message.as_deref() {
                    self.stats.acknowledgements += 1;
                    debug!(message = %message, "Server acknowledgement");
                } else {
                    self.stats.malformed += 1;
                    debug!("Dropping frame without txType");
                }
                return None;
            }
        };

        let kind = match classify(tx_type) {
            Some(kind) => kind,
            None => {
                self.stats.unknown_kind += 1;
                if self.stats.unknown_kind <= self.unknown_kind_log_limit as u64 {
                    info!(
                        tx_type = %tx_type,
                        occurrence = self.stats.unknown_kind,
                        limit = self.unknown_kind_log_limit,
                        "Ignoring unknown event kind"
                    );
                }
                return None;
            }
        };

        let token_address = match raw.mint.as_deref().map(str::trim) {
            Some(mint) if !mint.is_empty() => mint.to_string(),
            _ => {
                self.stats.malformed += 1;
                debug!(kind = ?kind, "Dropping event without token address");
                return None;
            }
        };

        let bonding_curve_percent = raw
            .bonding_curve_percent
            .or_else(|| raw.v_tokens_in_bonding_curve.map(progress_from_virtual_tokens))
            .map(|p| p.clamp(0.0, 100.0))
            .unwrap_or(if kind == EventKind::Graduated { 100.0 } else { 0.0 });

        let price_sol = raw.price.or_else(|| {
            match (raw.v_sol_in_bonding_curve, raw.v_tokens_in_bonding_curve) {
                (Some(sol), Some(tokens)) if tokens > 0.0 => Some(sol / tokens),
                _ => None,
            }
        });

        self.stats.decoded += 1;

        Some(LaunchEvent {
            kind,
            token_address,
            bonding_curve_percent,
            name: raw.name,
            symbol: raw.symbol,
            price_sol,
            volume_sol: raw.sol_amount,
            liquidity_sol: raw.v_sol_in_bonding_curve,
            market_cap_sol: raw.market_cap_sol,
            trader: raw.trader_public_key,
            signature: raw.signature,
            timestamp: raw.timestamp.and_then(parse_timestamp).unwrap_or_else(Utc::now),
        })
    }
}

fn classify(tx_type: &str) -> Option<EventKind> {
    match tx_type.to_ascii_lowercase().as_str() {
        "create" => Some(EventKind::Created),
        "buy" | "sell" => Some(EventKind::Trade),
        "migrate" | "migration" | "graduate" | "graduated" | "complete" => Some(EventKind::Graduated),
        _ => None,
    }
}

/// Curve progress derived from the virtual token reserve
pub fn progress_from_virtual_tokens(v_tokens: f64) -> f64 {
    let remaining = (v_tokens - FINAL_VIRTUAL_TOKEN_RESERVES) / CURVE_TOKENS_FOR_SALE;
    (100.0 - remaining * 100.0).clamp(0.0, 100.0)
}

/// Accepts second and millisecond epoch timestamps, fractional or not
fn parse_timestamp(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() || ts < 0.0 {
        return None;
    }
    if ts > 10_000_000_000.0 {
        DateTime::from_timestamp_millis(ts as i64)
    } else {
        let nanos = (ts.fract() * 1_000_000_000.0) as u32;
        DateTime::from_timestamp(ts.trunc() as i64, nanos)
    }
}
