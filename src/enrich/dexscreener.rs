/// DexScreener-style token pair lookup used for holder enrichment

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::HolderLookup;
use crate::core::types::{MarketSnapshot, PairData};
use crate::error::EnrichmentError;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PairsResponse {
    Pairs(Vec<TokenPair>),
    Wrapped { pairs: Option<Vec<TokenPair>> },
}

impl PairsResponse {
    fn into_first(self) -> Option<TokenPair> {
        match self {
            PairsResponse::Pairs(pairs) => pairs.into_iter().next(),
            PairsResponse::Wrapped { pairs } => pairs.and_then(|p| p.into_iter().next()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TokenPair {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    volume: Option<Volume>,
    #[serde(rename = "priceChange")]
    price_change: Option<PriceChange>,
    liquidity: Option<Liquidity>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
    fdv: Option<f64>,
    #[serde(alias = "holderCount")]
    holders: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Volume {
    h1: Option<f64>,
    h24: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PriceChange {
    m5: Option<f64>,
    h1: Option<f64>,
    h24: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

impl From<TokenPair> for PairData {
    fn from(pair: TokenPair) -> Self {
        let volume = pair.volume.unwrap_or_default();
        let price_change = pair.price_change.unwrap_or_default();
        PairData {
            holder_count: pair.holders.unwrap_or(0),
            market: Some(MarketSnapshot {
                price_usd: pair.price_usd.as_deref().and_then(|p| p.parse().ok()),
                market_cap_usd: pair.market_cap.or(pair.fdv),
                liquidity_usd: pair.liquidity.and_then(|l| l.usd),
                volume_h1_usd: volume.h1,
                volume_h24_usd: volume.h24,
                price_change_m5: price_change.m5,
                price_change_h1: price_change.h1,
                price_change_h24: price_change.h24,
            }),
        }
    }
}

/// `GET {endpoint}/{token_address}`; the first pair in the response wins
#[derive(Debug, Clone)]
pub struct DexScreenerLookup {
    client: Client,
    endpoint: String,
}

impl DexScreenerLookup {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, EnrichmentError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HolderLookup for DexScreenerLookup {
    async fn lookup(&self, token_address: &str) -> Result<PairData, EnrichmentError> {
        let url = format!("{}/{}", self.endpoint, token_address);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: PairsResponse = serde_json::from_slice(&body)?;

        match parsed.into_first() {
            Some(pair) => Ok(pair.into()),
            None => {
                debug!(token = %token_address, "No pairs listed yet");
                Ok(PairData::default())
            }
        }
    }
}
