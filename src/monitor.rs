/// Launch monitor: session → decoder → tracker → emitter
///
/// One sequential consumer decodes and classifies frames in delivery order.
/// The maintenance sweep runs on the same consumer, so the tracker is never
/// shared. Enrichment and delivery run on spawned tasks.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::Settings;
use crate::core::types::LaunchEvent;
use crate::emitter::{EmitterStats, SignalEmitter, SignalSink};
use crate::enrich::{DexScreenerLookup, Enricher, HolderLookup, NoopLookup};
use crate::ingest::connector::{Connector, WsConnector};
use crate::ingest::decoder::FrameDecoder;
use crate::ingest::session::{SessionStats, SessionState, TransportSession};
use crate::tracker::TokenStateTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStats {
    pub session: SessionStats,
    pub events_decoded: u64,
    pub malformed_frames: u64,
    pub unknown_kind_frames: u64,
    pub tracked_tokens: usize,
    pub evicted_tokens: u64,
    pub emitter: EmitterStats,
}

/// Consumer-side counters published for `stats()`
#[derive(Default)]
struct ConsumerCounters {
    events_decoded: AtomicU64,
    malformed_frames: AtomicU64,
    unknown_kind_frames: AtomicU64,
    tracked_tokens: AtomicUsize,
    evicted_tokens: AtomicU64,
}

pub struct LaunchMonitor {
    settings: Settings,
    session: Arc<TransportSession>,
    emitter: SignalEmitter,
    frames: Mutex<Option<mpsc::Receiver<String>>>,
    shutdown: CancellationToken,
    started: AtomicBool,
    counters: Arc<ConsumerCounters>,
}

impl LaunchMonitor {
    /// Builds a monitor with explicit collaborators. Fails on settings that
    /// do not validate.
    pub fn new(
        settings: Settings,
        connector: Arc<dyn Connector>,
        lookup: Arc<dyn HolderLookup>,
        sink: Arc<dyn SignalSink>,
    ) -> Result<Self> {
        settings.validate().context("Invalid settings")?;

        let (frame_tx, frame_rx) = mpsc::channel(settings.transport.frame_buffer);
        let session = Arc::new(TransportSession::new(
            &settings.transport,
            settings.subscription.clone(),
            connector,
            frame_tx,
        ));

        let shutdown = CancellationToken::new();
        let enricher = Arc::new(Enricher::new(lookup, settings.enrichment.timeout()));
        let emitter = SignalEmitter::new(enricher, sink, shutdown.child_token());

        Ok(Self {
            settings,
            session,
            emitter,
            frames: Mutex::new(Some(frame_rx)),
            shutdown,
            started: AtomicBool::new(false),
            counters: Arc::new(ConsumerCounters::default()),
        })
    }

    /// Production wiring: WebSocket transport and HTTP pair lookup
    pub fn from_settings(settings: Settings, sink: Arc<dyn SignalSink>) -> Result<Self> {
        settings.validate().context("Invalid settings")?;

        let connector = Arc::new(WsConnector::new(settings.transport.connect_timeout()));
        let lookup: Arc<dyn HolderLookup> = if settings.enrichment.enabled {
            Arc::new(
                DexScreenerLookup::new(&settings.enrichment.endpoint, settings.enrichment.timeout())
                    .context("Failed to build enrichment client")?,
            )
        } else {
            info!("Holder enrichment disabled");
            Arc::new(NoopLookup)
        };

        Self::new(settings, connector, lookup, sink)
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            session: self.session.stats(),
            events_decoded: self.counters.events_decoded.load(Ordering::Relaxed),
            malformed_frames: self.counters.malformed_frames.load(Ordering::Relaxed),
            unknown_kind_frames: self.counters.unknown_kind_frames.load(Ordering::Relaxed),
            tracked_tokens: self.counters.tracked_tokens.load(Ordering::Relaxed),
            evicted_tokens: self.counters.evicted_tokens.load(Ordering::Relaxed),
            emitter: self.emitter.stats(),
        }
    }

    /// Runs until `stop()` is called. Can only be started once.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("Launch monitor already started");
        }
        let frames = match self.frames.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(frames) = frames else {
            bail!("Frame receiver already taken");
        };

        info!("🦡 Launch monitor starting");

        let consumer = Consumer {
            decoder: FrameDecoder::new(self.settings.decoder.unknown_kind_log_limit),
            tracker: TokenStateTracker::new(&self.settings.tracker),
            emitter: self.emitter.clone(),
            counters: Arc::clone(&self.counters),
        };

        let (session_result, ()) = tokio::join!(
            self.session.start(),
            consumer.run(frames, self.settings.tracker.sweep_interval(), self.shutdown.clone()),
        );

        info!("👋 Launch monitor stopped");
        session_result
    }

    /// Stops the session, abandons in-flight enrichment. Idempotent.
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.session.stop();
    }
}

struct Consumer {
    decoder: FrameDecoder,
    tracker: TokenStateTracker,
    emitter: SignalEmitter,
    counters: Arc<ConsumerCounters>,
}

impl Consumer {
    async fn run(
        mut self,
        mut frames: mpsc::Receiver<String>,
        sweep_every: std::time::Duration,
        shutdown: CancellationToken,
    ) {
        let mut sweep = interval(sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        sweep.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                // Ahead of frames so a busy channel cannot starve it
                _ = sweep.tick() => {
                    self.tracker.sweep();
                    self.publish();
                }
                frame = frames.recv() => match frame {
                    Some(frame) => self.process(&frame),
                    None => break,
                },
            }
        }

        debug!("Frame consumer stopped");
    }

    fn process(&mut self, frame: &str) {
        if let Some(event) = self.decoder.decode(frame) {
            self.classify(event);
        }
        self.publish();
    }

    fn classify(&mut self, event: LaunchEvent) {
        if let Some(pending) = self.tracker.observe(event) {
            // Detached: delivery is tracked through emitter counters
            let _ = self.emitter.dispatch(pending);
        }
    }

    fn publish(&self) {
        let decoder = self.decoder.stats();
        self.counters.events_decoded.store(decoder.decoded, Ordering::Relaxed);
        self.counters.malformed_frames.store(decoder.malformed, Ordering::Relaxed);
        self.counters.unknown_kind_frames.store(decoder.unknown_kind, Ordering::Relaxed);
        let tracker = self.tracker.stats();
        self.counters.tracked_tokens.store(tracker.tracked, Ordering::Relaxed);
        self.counters.evicted_tokens.store(tracker.evicted, Ordering::Relaxed);
    }
}
