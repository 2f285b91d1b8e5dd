//! Hot reload of the configuration file
//!
//! Editors usually emit several notifications per save. Notifications are
//! forwarded to a single reload task that waits for the burst to settle,
//! re-reads the file once and only reports configs that actually differ from
//! the last one it delivered.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Quiet period after the last notification before the file is re-read
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let path = PathBuf::from(&config_path);
        let initial = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let (touched_tx, touched_rx) = mpsc::unbounded_channel::<()>();
        let (config_tx, config_rx) = mpsc::channel(10);

        // notify delivers on its own thread; only a signal crosses over
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    debug!("Config file touched: {:?}", event.paths);
                    let _ = touched_tx.send(());
                }
                Ok(_) => {}
                Err(e) => error!("Watch error: {}", e),
            }
        })?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;

        tokio::spawn(reload_loop(config_path.clone(), initial.clone(), touched_rx, config_tx));
        info!("Config file watcher started for: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx: config_rx,
            },
            Arc::new(initial),
        ))
    }

    /// Next changed configuration; `None` once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

async fn reload_loop(
    config_path: String,
    mut current: AppConfig,
    mut touched: mpsc::UnboundedReceiver<()>,
    configs: mpsc::Sender<AppConfig>,
) {
    while touched.recv().await.is_some() {
        // Let the burst settle, then swallow what arrived meanwhile
        tokio::time::sleep(RELOAD_DEBOUNCE).await;
        while touched.try_recv().is_ok() {}

        match AppConfig::load(&config_path).await {
            Ok(config) if config == current => debug!("Config unchanged, nothing to apply"),
            Ok(config) => {
                info!("Configuration reloaded");
                current = config.clone();
                if configs.send(config).await.is_err() {
                    debug!("Config receiver dropped, stopping reload task");
                    return;
                }
            }
            Err(e) => warn!("Failed to reload config (keeping old config): {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reload_delivers_changed_interval() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("bridge.yaml");
        fs::write(&config_path, "midi:\n  input_port: \"test-in\"\nsync:\n  interval_ms: 300\n")?;

        let (mut watcher, config) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        assert_eq!(config.midi.input_port.as_deref(), Some("test-in"));
        assert_eq!(config.sync.interval_ms, 300);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, "midi:\n  input_port: \"test-in\"\nsync:\n  interval_ms: 150\n")?;

        let reloaded = tokio::time::timeout(Duration::from_secs(2), watcher.next_config())
            .await?
            .context("watcher closed before delivering the reload")?;
        assert_eq!(reloaded.sync.interval_ms, 150);
        Ok(())
    }

    #[tokio::test]
    async fn test_reload_loop_skips_identical_and_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bridge.yaml");
        fs::write(&config_path, "sync:\n  interval_ms: 300\n").unwrap();
        let path = config_path.to_string_lossy().to_string();

        let (touched_tx, touched_rx) = mpsc::unbounded_channel();
        let (config_tx, mut config_rx) = mpsc::channel(10);
        let initial = AppConfig::load(&path).await.unwrap();
        tokio::spawn(reload_loop(path, initial, touched_rx, config_tx));

        // Same content: nothing delivered
        touched_tx.send(()).unwrap();
        touched_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(config_rx.try_recv().is_err());

        // Invalid content: kept old config
        fs::write(&config_path, "sync:\n  interval_ms: 1\n").unwrap();
        touched_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(config_rx.try_recv().is_err());

        fs::write(&config_path, "sync:\n  interval_ms: 500\n").unwrap();
        touched_tx.send(()).unwrap();
        let reloaded = tokio::time::timeout(Duration::from_secs(2), config_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.sync.interval_ms, 500);
    }
}
