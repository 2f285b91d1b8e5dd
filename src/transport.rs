//! MIDI transport
//!
//! The bridge writes through a [`MidiSink`]. In production that is a midir
//! output connection; tests record frames instead, and the standalone mode
//! without an output port logs them.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::error::{BridgeError, BridgeResult};
use crate::midi::{find_port_by_substring, format_hex};

/// Destination for outbound MIDI bytes
pub trait MidiSink: Send + Sync {
    fn send(&self, bytes: &[u8]) -> BridgeResult<()>;
}

/// Output port opened through midir
pub struct MidirSink {
    port_name: String,
    connection: Mutex<MidiOutputConnection>,
}

impl MidirSink {
    /// Open the first output port whose name contains `pattern`
    pub fn open(pattern: &str) -> Result<Self> {
        let midi_out = MidiOutput::new("Session-Sync-Out")?;
        let port = find_port_by_substring(&midi_out, pattern)
            .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;
        let port_name = midi_out.port_name(&port).unwrap_or_else(|_| pattern.to_string());

        let connection = midi_out
            .connect(&port, "session-sync-out")
            .map_err(|e| anyhow!("Failed to connect output '{}': {}", port_name, e))?;

        info!("MIDI OUT opened: '{}'", port_name);
        Ok(Self {
            port_name,
            connection: Mutex::new(connection),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSink for MidirSink {
    fn send(&self, bytes: &[u8]) -> BridgeResult<()> {
        trace!("TX -> {}", format_hex(bytes));
        self.connection
            .lock()
            .send(bytes)
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}

/// Inbound port; every message is handed to `on_message` on midir's thread
pub struct MidirSource {
    port_name: String,
    _connection: MidiInputConnection<()>,
}

impl MidirSource {
    pub fn open<F>(pattern: &str, mut on_message: F) -> Result<Self>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let mut midi_in = MidiInput::new("Session-Sync-In")?;
        midi_in.ignore(midir::Ignore::None);

        let port = find_port_by_substring(&midi_in, pattern)
            .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;
        let port_name = midi_in.port_name(&port).unwrap_or_else(|_| pattern.to_string());

        let connection = midi_in
            .connect(
                &port,
                "session-sync-in",
                move |_timestamp, data, _| {
                    trace!("RX <- {}", format_hex(data));
                    on_message(data);
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect input '{}': {}", port_name, e))
            .context("Opening MIDI input")?;

        info!("MIDI IN opened: '{}'", port_name);
        Ok(Self {
            port_name,
            _connection: connection,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// Sink that only logs, used when no output port is configured
#[derive(Debug, Default)]
pub struct LogSink;

impl MidiSink for LogSink {
    fn send(&self, bytes: &[u8]) -> BridgeResult<()> {
        debug!("(no output) {}", format_hex(bytes));
        Ok(())
    }
}

/// Sink that keeps every message, for inspection in tests
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl MidiSink for RecordingSink {
    fn send(&self, bytes: &[u8]) -> BridgeResult<()> {
        self.sent.lock().push(bytes.to_vec());
        Ok(())
    }
}

/// Sink that rejects every write
#[derive(Debug, Default)]
pub struct ClosedSink;

impl MidiSink for ClosedSink {
    fn send(&self, _bytes: &[u8]) -> BridgeResult<()> {
        Err(BridgeError::Transport("port closed".to_string()))
    }
}

/// Print available ports to stdout
pub fn list_ports() -> Result<()> {
    use colored::*;

    let midi_in = MidiInput::new("Session-Sync-List").context("MIDI input unavailable")?;
    let midi_out = MidiOutput::new("Session-Sync-List").context("MIDI output unavailable")?;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());
    for (title, names) in [
        ("Input Ports:", crate::midi::port_names(&midi_in)),
        ("Output Ports:", crate::midi::port_names(&midi_out)),
    ] {
        println!("\n{}", title.bold());
        if names.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for (index, name) in names.iter().enumerate() {
            println!("  [{}] {}", index, name);
        }
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_take() {
        let sink = RecordingSink::new();
        let shared = sink.clone();
        sink.send(&[0x93, 1, 100]).unwrap();
        sink.send(&[0xF0, 0x02, 0x01, 0xF7]).unwrap();

        assert_eq!(shared.sent().len(), 2);
        assert_eq!(shared.take()[0], vec![0x93, 1, 100]);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_closed_sink_errors() {
        assert!(matches!(
            ClosedSink.send(&[0xF0, 0xF7]),
            Err(BridgeError::Transport(_))
        ));
    }
}
