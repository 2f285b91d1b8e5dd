//! Session Sync GW - SysEx state-sync bridge
//!
//! Connects a DAW session to a companion app over a pair of MIDI ports.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use session_sync_gw::config::{AppConfig, ConfigWatcher, LoggingConfig};
use session_sync_gw::host::MemorySession;
use session_sync_gw::transport::{self, LogSink, MidiSink, MidirSink, MidirSource};
use session_sync_gw::{sniffer, BridgeActor, BridgeOptions};

/// Session Sync GW - keep a companion app in sync with a DAW session
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Decode bridge output arriving on the input port matching PATTERN
    #[arg(long, value_name = "PATTERN")]
    sniff: Option<String>,

    /// Print sniffed messages as JSON lines
    #[arg(long, requires = "sniff")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.list_ports {
        return transport::list_ports();
    }

    // The watcher reports config errors properly later; here we only need
    // to know where file logs go.
    let early_config = AppConfig::load(&args.config).await.ok();
    let _log_guard = init_logging(
        &args.log_level,
        early_config.as_ref().and_then(|c| c.logging.as_ref()),
    )?;

    if let Some(pattern) = args.sniff.as_deref() {
        let max_chunk_bytes = early_config.unwrap_or_default().protocol.max_chunk_bytes;
        return sniffer::run_sniffer(pattern, max_chunk_bytes, args.json).await;
    }

    info!("Starting Session Sync GW...");
    info!("Configuration file: {}", args.config);

    let (config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    run_app((*initial_config).clone(), config_watcher, shutdown_signal()).await?;

    info!("Session Sync GW shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    mut config_watcher: ConfigWatcher,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let host = match &config.session {
        Some(session) => MemorySession::load(&session.fixture)
            .with_context(|| format!("Loading session {}", session.fixture.display()))?,
        None => {
            warn!("No session fixture configured, starting with an empty session");
            MemorySession::default()
        }
    };

    let sink: Arc<dyn MidiSink> = match config.midi.output_port.as_deref() {
        Some(pattern) => Arc::new(MidirSink::open(pattern)?),
        None => {
            warn!("No output port configured, outbound messages are only logged");
            Arc::new(LogSink)
        }
    };

    let handle = BridgeActor::spawn(host, sink, BridgeOptions::from(&config));

    let _source = match config.midi.input_port.as_deref() {
        Some(pattern) => {
            let forward = handle.clone();
            Some(MidirSource::open(pattern, move |data| forward.midi(data.to_vec()))?)
        }
        None => {
            warn!("No input port configured, the companion app cannot connect");
            None
        }
    };

    info!("Waiting for the companion app handshake...");

    let mut current = config;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("Configuration file changed, applying...");
                if new_config.midi != current.midi {
                    warn!("MIDI port changes take effect after a restart");
                }
                if new_config.session != current.session {
                    warn!("Session fixture changes take effect after a restart");
                }
                handle.reconfigure(new_config.clone());
                current = new_config;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping bridge");
                break;
            }
        }
    }

    match handle.status().await {
        Ok(status) => info!(
            initialized = status.initialized,
            listeners = status.subscriptions,
            "Final bridge state"
        ),
        Err(e) => warn!("Bridge status unavailable: {}", e),
    }
    handle.shutdown().await?;
    Ok(())
}

/// Console output, plus JSON log files when `logging.directory` is set
fn init_logging(level: &str, file: Option<&LoggingConfig>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match file {
        Some(logging) => {
            let appender =
                tracing_appender::rolling::daily(&logging.directory, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
