#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use launchwatch::enrich::HolderLookup;
use launchwatch::error::{EnrichmentError, TransportError};
use launchwatch::ingest::{Connector, FrameConnection};
use launchwatch::{PairData, Signal, SignalSink, SignalType};

/// What happens once a scripted connection has replayed its frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Then {
    Close,
    Hang,
}

#[derive(Debug, Clone)]
pub enum Script {
    Refuse,
    FailHandshake,
    Frames { frames: Vec<(Duration, String)>, then: Then },
}

impl Script {
    pub fn close_after(frames: Vec<String>) -> Self {
        Script::Frames {
            frames: frames.into_iter().map(|f| (Duration::ZERO, f)).collect(),
            then: Then::Close,
        }
    }

    pub fn hang_after(frames: Vec<String>) -> Self {
        Script::Frames {
            frames: frames.into_iter().map(|f| (Duration::ZERO, f)).collect(),
            then: Then::Hang,
        }
    }
}

/// Replays one script per connect; once exhausted, connections stay silent
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    connects: Mutex<Vec<Instant>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn FrameConnection>, TransportError> {
        self.connects.lock().unwrap().push(Instant::now());
        let script = self.scripts.lock().unwrap().pop_front();

        let (frames, then, fail_send) = match script {
            Some(Script::Refuse) => {
                return Err(TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused".to_string(),
                })
            }
            Some(Script::FailHandshake) => (VecDeque::new(), Then::Close, true),
            Some(Script::Frames { frames, then }) => (frames.into(), then, false),
            None => (VecDeque::new(), Then::Hang, false),
        };

        Ok(Box::new(ScriptedConnection {
            frames,
            then,
            fail_send,
            sent: Arc::clone(&self.sent),
        }))
    }
}

struct ScriptedConnection {
    frames: VecDeque<(Duration, String)>,
    then: Then,
    fail_send: bool,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl FrameConnection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.fail_send {
            return Err(TransportError::Closed("reset by peer".to_string()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        match self.frames.pop_front() {
            Some((delay, frame)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Some(Ok(frame))
            }
            None => match self.then {
                Then::Close => None,
                Then::Hang => std::future::pending().await,
            },
        }
    }

    async fn close(&mut self) {}
}

/// Fixed holder count, optionally slow
pub struct StubLookup {
    pub holders: u64,
    pub delay: Duration,
}

impl StubLookup {
    pub fn instant(holders: u64) -> Arc<Self> {
        Arc::new(Self { holders, delay: Duration::ZERO })
    }

    pub fn slow(holders: u64, delay: Duration) -> Arc<Self> {
        Arc::new(Self { holders, delay })
    }
}

#[async_trait]
impl HolderLookup for StubLookup {
    async fn lookup(&self, _token_address: &str) -> Result<PairData, EnrichmentError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(PairData { holder_count: self.holders, market: None })
    }
}

/// Forwards delivered signals to a channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(Signal, SignalType)>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(Signal, SignalType)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl SignalSink for ChannelSink {
    async fn deliver(&self, signal: Signal, signal_type: SignalType) -> anyhow::Result<()> {
        self.tx.send((signal, signal_type))?;
        Ok(())
    }
}

pub fn trade(mint: &str, percent: f64) -> String {
    json!({
        "txType": "buy",
        "mint": mint,
        "name": format!("{mint} token"),
        "symbol": mint.to_uppercase(),
        "bondingCurvePercent": percent,
        "solAmount": 0.5,
        "marketCapSol": 60.0,
        "traderPublicKey": "Trader111",
    })
    .to_string()
}

pub fn created(mint: &str) -> String {
    json!({ "txType": "create", "mint": mint, "name": mint, "symbol": mint }).to_string()
}

pub fn graduated(mint: &str) -> String {
    json!({ "txType": "migrate", "mint": mint }).to_string()
}

pub async fn next_signal(
    rx: &mut mpsc::UnboundedReceiver<(Signal, SignalType)>,
) -> (Signal, SignalType) {
    tokio::time::timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("timed out waiting for signal")
        .expect("sink channel closed")
}
