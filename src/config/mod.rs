/// Configuration loaded from TOML with per-field defaults

pub mod settings;

pub use settings::*;
