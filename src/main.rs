use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launchwatch::{LaunchMonitor, Settings, Signal, SignalSink, SignalType};

const DEFAULT_CONFIG_PATH: &str = "launchwatch.toml";

/// Prints each signal to the terminal
struct ConsoleSink;

#[async_trait]
impl SignalSink for ConsoleSink {
    async fn deliver(&self, signal: Signal, signal_type: SignalType) -> Result<()> {
        let banner = match signal_type {
            SignalType::PreGraduation => "🎯 PRE-GRADUATION".bright_yellow().bold(),
            SignalType::PostGraduation => "🎓 GRADUATED".bright_green().bold(),
        };

        println!("\n{} {} ({})", banner, signal.name.bright_white().bold(), signal.symbol.yellow());
        println!("{}", "=".repeat(70).dimmed());
        println!("🪙 Mint: {}", signal.token_address.blue());
        println!("📈 Bonding curve: {:.1}%", signal.bonding_curve_percent);
        if let Some(mcap) = signal.market_cap_sol {
            println!("💰 Market cap: {:.2} SOL", mcap);
        }
        if let Some(liquidity) = signal.market.liquidity_usd {
            println!("💧 Liquidity: ${:.0}", liquidity);
        }
        println!("👥 Holders: {}", signal.holder_count);
        println!("📊 DEX Screener: https://dexscreener.com/solana/{}", signal.token_address);
        println!("⏰ {}", signal.emitted_at.format("%H:%M:%S UTC").to_string().cyan());

        Ok(())
    }
}

fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Create logs directory if it doesn't exist
    std::fs::create_dir_all("logs")?;

    // Daily rolling JSON file; flushed while the returned guard lives
    let file_appender = tracing_appender::rolling::daily("logs", "launchwatch.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    // Compact console output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .json()
        .with_current_span(false)
        .with_span_list(true);

    // Initialize subscriber with both layers, RUST_LOG overrides the info default
    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing()?;

    let config_path =
        std::env::var("LAUNCHWATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let settings = Settings::load_or_default(&config_path)?;
    info!(config = %config_path, endpoint = %settings.transport.endpoint, "Configuration loaded");

    let monitor = Arc::new(LaunchMonitor::from_settings(settings, Arc::new(ConsoleSink))?);

    let runner = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.start().await })
    };

    let reporter = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move {
            let mut every = tokio::time::interval(Duration::from_secs(300));
            every.tick().await;
            loop {
                every.tick().await;
                let stats = monitor.stats();
                info!(
                    state = ?stats.session.state,
                    attempts = stats.session.connection_attempts,
                    frames = stats.session.frames_received,
                    decoded = stats.events_decoded,
                    malformed = stats.malformed_frames,
                    tracked = stats.tracked_tokens,
                    evicted = stats.evicted_tokens,
                    delivered = stats.emitter.delivered,
                    failed = stats.emitter.delivery_failures,
                    "📊 Monitor summary"
                );
            }
        })
    };

    match signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    monitor.stop();
    reporter.abort();

    match runner.await {
        Ok(Ok(())) => info!("✅ Launch monitor shut down cleanly"),
        Ok(Err(e)) => error!("Launch monitor error: {}", e),
        Err(e) => error!("Launch monitor task failed: {}", e),
    }

    Ok(())
}
