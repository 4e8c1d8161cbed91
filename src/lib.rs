// Core modules
pub mod core;
pub mod config;
pub mod error;

// Pipeline stages
pub mod ingest;
pub mod tracker;
pub mod enrich;
pub mod emitter;
pub mod monitor;

// Re-export commonly used types for convenience
pub use core::*;
pub use config::Settings;
pub use emitter::SignalSink;
pub use monitor::{LaunchMonitor, MonitorStats};
