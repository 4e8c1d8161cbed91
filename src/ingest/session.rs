/// Transport session: one logical push connection, reconnected until stopped

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::connector::{Connector, FrameConnection};
use crate::config::{SubscriptionSpec, TransportSettings};
use crate::error::TransportError;

/// Lifecycle of the session. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Subscribing,
    Listening,
    ConnectionLost,
    Stopped,
}

/// Counters for monitoring; never used for control decisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub state: SessionState,
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub handshake_failures: u64,
    pub disconnects: u64,
    pub frames_received: u64,
}

enum ConnectionOutcome {
    Stopped,
    ConsumerGone,
    HandshakeFailed(TransportError),
    Lost(TransportError),
}

pub struct TransportSession {
    endpoint: String,
    subscription: SubscriptionSpec,
    reconnect_delay: Duration,
    handshake_escalation_after: u32,
    connector: Arc<dyn Connector>,
    frames: mpsc::Sender<String>,
    state: watch::Sender<SessionState>,
    shutdown: CancellationToken,
    running: AtomicBool,
    consecutive_handshake_failures: AtomicU32,
    connection_attempts: AtomicU64,
    successful_connections: AtomicU64,
    handshake_failures: AtomicU64,
    disconnects: AtomicU64,
    frames_received: AtomicU64,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("endpoint", &self.endpoint)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl TransportSession {
    /// Frames are forwarded, in delivery order, to `frames`.
    pub fn new(
        settings: &TransportSettings,
        subscription: SubscriptionSpec,
        connector: Arc<dyn Connector>,
        frames: mpsc::Sender<String>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            endpoint: settings.endpoint.clone(),
            subscription,
            reconnect_delay: settings.reconnect_delay(),
            handshake_escalation_after: settings.handshake_escalation_after,
            connector,
            frames,
            state,
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
            consecutive_handshake_failures: AtomicU32::new(0),
            connection_attempts: AtomicU64::new(0),
            successful_connections: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state(),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            successful_connections: self.successful_connections.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
        }
    }

    /// Runs the connect/subscribe/listen loop until `stop()` is called.
    /// Transport errors never end the loop; there is no retry limit.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn start(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            bail!("Transport session already stopped");
        }
        if self.running.swap(true, Ordering::SeqCst) {
            bail!("Transport session already running");
        }

        info!("📡 Starting transport session");

        loop {
            self.set_state(SessionState::Connecting);
            let attempt = self.connection_attempts.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(attempt, "Connecting");

            match self.run_connection().await {
                ConnectionOutcome::Stopped => break,
                ConnectionOutcome::ConsumerGone => {
                    warn!("Frame consumer dropped, stopping session");
                    self.shutdown.cancel();
                    break;
                }
                ConnectionOutcome::HandshakeFailed(e) => {
                    self.handshake_failures.fetch_add(1, Ordering::Relaxed);
                    let consecutive =
                        self.consecutive_handshake_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if consecutive >= self.handshake_escalation_after {
                        error!(error = %e, consecutive, "Subscription handshake keeps failing");
                    } else {
                        warn!(error = %e, consecutive, "Subscription handshake failed");
                    }
                }
                ConnectionOutcome::Lost(e) => {
                    warn!(error = %e, "Connection lost");
                }
            }

            self.disconnects.fetch_add(1, Ordering::Relaxed);
            self.set_state(SessionState::ConnectionLost);
            info!("Reconnecting in {:?}", self.reconnect_delay);

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(SessionState::Stopped);
        info!("🛑 Transport session stopped");
        Ok(())
    }

    /// Stops the session and closes the active connection. Idempotent.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("Stop requested");
        }
        self.shutdown.cancel();
        if !self.running.load(Ordering::SeqCst) {
            self.set_state(SessionState::Stopped);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn run_connection(&self) -> ConnectionOutcome {
        let connected = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return ConnectionOutcome::Stopped,
            result = self.connector.connect(&self.endpoint) => result,
        };

        let mut connection = match connected {
            Ok(connection) => connection,
            Err(e) => return ConnectionOutcome::Lost(e),
        };
        self.successful_connections.fetch_add(1, Ordering::Relaxed);

        self.set_state(SessionState::Subscribing);
        if let Err(e) = self.subscribe(connection.as_mut()).await {
            connection.close().await;
            return ConnectionOutcome::HandshakeFailed(e);
        }
        self.consecutive_handshake_failures.store(0, Ordering::Relaxed);

        self.set_state(SessionState::Listening);
        info!("🎯 Listening for launch events");

        let outcome = self.listen(connection.as_mut()).await;
        if matches!(outcome, ConnectionOutcome::Stopped | ConnectionOutcome::ConsumerGone) {
            connection.close().await;
        }
        outcome
    }

    async fn subscribe(&self, connection: &mut dyn FrameConnection) -> Result<(), TransportError> {
        for request in self.subscription.requests() {
            debug!(request = %request, "Sending subscription");
            connection
                .send_text(request)
                .await
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
        }
        Ok(())
    }

    async fn listen(&self, connection: &mut dyn FrameConnection) -> ConnectionOutcome {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return ConnectionOutcome::Stopped,
                next = connection.next_frame() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return ConnectionOutcome::Lost(e),
                None => {
                    return ConnectionOutcome::Lost(TransportError::Closed(
                        "stream ended".to_string(),
                    ))
                }
            };
            self.frames_received.fetch_add(1, Ordering::Relaxed);

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return ConnectionOutcome::Stopped,
                sent = self.frames.send(frame) => {
                    if sent.is_err() {
                        return ConnectionOutcome::ConsumerGone;
                    }
                }
            }
        }
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            // Stopped is terminal
            if *state == SessionState::Stopped || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }
}
