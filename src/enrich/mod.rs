/// Best-effort holder-count enrichment
///
/// A lookup failure or timeout never drops a signal; it degrades to
/// `PairData::default()` (zero holders, no market snapshot).

pub mod dexscreener;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use dexscreener::DexScreenerLookup;

use crate::core::types::PairData;
use crate::error::EnrichmentError;

/// Secondary data source keyed by token address
#[async_trait]
pub trait HolderLookup: Send + Sync {
    async fn lookup(&self, token_address: &str) -> Result<PairData, EnrichmentError>;
}

/// Lookup used when enrichment is disabled
#[derive(Debug, Clone, Default)]
pub struct NoopLookup;

#[async_trait]
impl HolderLookup for NoopLookup {
    async fn lookup(&self, _token_address: &str) -> Result<PairData, EnrichmentError> {
        Ok(PairData::default())
    }
}

/// Wraps a lookup with a hard latency bound
pub struct Enricher {
    lookup: Arc<dyn HolderLookup>,
    timeout: Duration,
    fallbacks: AtomicU64,
}

impl Enricher {
    pub fn new(lookup: Arc<dyn HolderLookup>, timeout: Duration) -> Self {
        Self {
            lookup,
            timeout,
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of lookups that fell back to defaults
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub async fn enrich(&self, token_address: &str) -> PairData {
        match timeout(self.timeout, self.lookup.lookup(token_address)).await {
            Ok(Ok(data)) => {
                debug!(token = %token_address, holders = data.holder_count, "Enrichment complete");
                data
            }
            Ok(Err(e)) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(token = %token_address, error = %e, "Enrichment failed, using defaults");
                PairData::default()
            }
            Err(_) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(token = %token_address, timeout = ?self.timeout, "Enrichment timed out, using defaults");
                PairData::default()
            }
        }
    }
}
