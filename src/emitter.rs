/// Signal emission: enrich, build, deliver once, isolate failures

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::types::{PendingSignal, Signal, SignalType};
use crate::enrich::Enricher;

/// Downstream collaborator receiving finalized signals.
/// Invoked at most once per signal and never retried.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn deliver(&self, signal: Signal, signal_type: SignalType) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> SignalSink for F
where
    F: Fn(Signal, SignalType) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn deliver(&self, signal: Signal, signal_type: SignalType) -> anyhow::Result<()> {
        (self)(signal, signal_type).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitterStats {
    pub dispatched: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub discarded: u64,
    pub enrichment_fallbacks: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Clone)]
pub struct SignalEmitter {
    enricher: Arc<Enricher>,
    sink: Arc<dyn SignalSink>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
}

impl SignalEmitter {
    pub fn new(enricher: Arc<Enricher>, sink: Arc<dyn SignalSink>, shutdown: CancellationToken) -> Self {
        Self {
            enricher,
            sink,
            shutdown,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            enrichment_fallbacks: self.enricher.fallbacks(),
        }
    }

    /// Hands the signal to its own task so classification of the next frame
    /// is never blocked on enrichment. Emission order across signals follows
    /// enrichment latency, not arrival order.
    pub fn dispatch(&self, pending: PendingSignal) -> JoinHandle<()> {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let emitter = self.clone();
        tokio::spawn(async move { emitter.emit(pending).await })
    }

    /// Enrich, build and deliver one signal. Errors and panics from the sink
    /// are logged and dropped.
    pub async fn emit(&self, pending: PendingSignal) {
        let token = pending.event.token_address.clone();
        let signal_type = pending.signal_type;

        let enrichment = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            data = self.enricher.enrich(&token) => Some(data),
        };

        let enrichment = match enrichment {
            Some(data) if !self.shutdown.is_cancelled() => data,
            _ => {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(token = %token, %signal_type, "Discarding in-flight signal on shutdown");
                return;
            }
        };

        let signal = Signal::from_parts(pending, enrichment);
        info!(
            token = %signal.token_address,
            symbol = %signal.symbol,
            %signal_type,
            bonding_percent = signal.bonding_curve_percent,
            holders = signal.holder_count,
            "🚀 Emitting signal"
        );

        let delivery = AssertUnwindSafe(self.sink.deliver(signal, signal_type)).catch_unwind().await;
        match delivery {
            Ok(Ok(())) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                warn!(token = %token, %signal_type, error = %e, "Signal delivery failed, dropping");
            }
            Err(_) => {
                self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                error!(token = %token, %signal_type, "Signal sink panicked, dropping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EventKind, LaunchEvent, PairData};
    use crate::enrich::HolderLookup;
    use crate::error::EnrichmentError;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct FixedLookup(u64);

    #[async_trait]
    impl HolderLookup for FixedLookup {
        async fn lookup(&self, _token_address: &str) -> Result<PairData, EnrichmentError> {
            Ok(PairData { holder_count: self.0, market: None })
        }
    }

    struct HangingLookup;

    #[async_trait]
    impl HolderLookup for HangingLookup {
        async fn lookup(&self, _token_address: &str) -> Result<PairData, EnrichmentError> {
            std::future::pending().await
        }
    }

    fn pending(address: &str) -> PendingSignal {
        PendingSignal {
            signal_type: SignalType::PreGraduation,
            event: LaunchEvent::new(EventKind::Trade, address, 45.0),
        }
    }

    fn emitter_with(lookup: Arc<dyn HolderLookup>, sink: Arc<dyn SignalSink>) -> (SignalEmitter, CancellationToken) {
        let shutdown = CancellationToken::new();
        let enricher = Arc::new(Enricher::new(lookup, Duration::from_secs(5)));
        (SignalEmitter::new(enricher, sink, shutdown.clone()), shutdown)
    }

    #[tokio::test]
    async fn test_delivers_enriched_signal_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = move |signal: Signal, signal_type: SignalType| {
            let tx = tx.clone();
            async move {
                tx.send((signal, signal_type))?;
                Ok::<(), anyhow::Error>(())
            }
        };
        let (emitter, _shutdown) = emitter_with(Arc::new(FixedLookup(77)), Arc::new(sink));

        emitter.dispatch(pending("MintA")).await.unwrap();

        let (signal, signal_type) = rx.recv().await.unwrap();
        assert_eq!(signal.token_address, "MintA");
        assert_eq!(signal.holder_count, 77);
        assert_eq!(signal_type, SignalType::PreGraduation);
        assert!(rx.try_recv().is_err());
        assert_eq!(emitter.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_sink_error_is_isolated() {
        let sink = |_signal: Signal, _signal_type: SignalType| async move {
            Err::<(), _>(anyhow::anyhow!("telegram unavailable"))
        };
        let (emitter, _shutdown) = emitter_with(Arc::new(FixedLookup(1)), Arc::new(sink));

        emitter.dispatch(pending("MintB")).await.unwrap();
        emitter.dispatch(pending("MintC")).await.unwrap();

        let stats = emitter.stats();
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.delivery_failures, 2);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn test_sink_panic_is_isolated() {
        let sink = |signal: Signal, _signal_type: SignalType| async move {
            if signal.token_address == "Boom" {
                panic!("sink exploded");
            }
            Ok::<(), anyhow::Error>(())
        };
        let (emitter, _shutdown) = emitter_with(Arc::new(FixedLookup(1)), Arc::new(sink));

        // The task itself completes normally
        emitter.dispatch(pending("Boom")).await.unwrap();
        emitter.dispatch(pending("Fine")).await.unwrap();

        let stats = emitter.stats();
        assert_eq!(stats.delivery_failures, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_shutdown_discards_in_flight_enrichment() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
        let sink = move |signal: Signal, _signal_type: SignalType| {
            let tx = tx.clone();
            async move {
                tx.send(signal)?;
                Ok::<(), anyhow::Error>(())
            }
        };
        let (emitter, shutdown) = emitter_with(Arc::new(HangingLookup), Arc::new(sink));

        let handle = emitter.dispatch(pending("MintD"));
        tokio::task::yield_now().await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(emitter.stats().discarded, 1);
    }
}
