//! Protocol sniffer for debugging and development
//!
//! Listens on a MIDI input that carries the bridge's output (a loopback or a
//! virtual port), reassembles chunked payloads and prints each decoded
//! message, either colored for humans or as JSON lines.

use std::time::Instant;

use anyhow::Result;
use colored::*;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::midi::{format_hex, MidiMessage};
use crate::protocol::{decode3, parse_frame, OutboundTag, Reassembler};
use crate::serializer::{decode_metadata, decode_note_records, ClipMetadata, NoteEvent};
use crate::transport::MidirSource;

/// One decoded message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decoded {
    Text { tag: String, text: String },
    Notes { notes: Vec<NoteEvent> },
    EmptyClip,
    Metadata { metadata: ClipMetadata },
    Playhead { position: i32 },
    UndoRedo { can_undo: bool, can_redo: bool },
    /// Well-formed frame with a tag we do not know, or a body we cannot read
    Unknown { tag: u8, bytes: String },
    /// Plain channel message (handshake confirmation and the like)
    Channel { message: String },
}

/// Decode a complete payload for `tag`
pub fn decode_payload(tag: u8, payload: &[u8]) -> Decoded {
    let unknown = || Decoded::Unknown {
        tag,
        bytes: format_hex(payload),
    };

    let Some(known) = OutboundTag::from_byte(tag) else {
        return unknown();
    };

    match known {
        OutboundTag::ClipNotes => match decode_note_records(payload) {
            Some(notes) => Decoded::Notes { notes },
            None => Decoded::EmptyClip,
        },
        OutboundTag::ClipMetadata => match decode_metadata(payload) {
            Some(metadata) => Decoded::Metadata { metadata },
            None => unknown(),
        },
        OutboundTag::PlayheadPosition if payload.len() >= 3 => Decoded::Playhead {
            position: decode3(payload, 0),
        },
        OutboundTag::UndoRedoState => match payload {
            [undo, redo, ..] => Decoded::UndoRedo {
                can_undo: *undo != 0,
                can_redo: *redo != 0,
            },
            _ => unknown(),
        },
        text_tag if text_tag.is_text() => Decoded::Text {
            tag: text_tag.to_string(),
            text: String::from_utf8_lossy(payload).into_owned(),
        },
        _ => unknown(),
    }
}

/// Stateful decoder over raw MIDI messages
#[derive(Debug)]
pub struct Sniffer {
    reassembler: Reassembler,
}

impl Sniffer {
    pub fn new(max_chunk_bytes: usize) -> Self {
        Self {
            reassembler: Reassembler::new(max_chunk_bytes),
        }
    }

    /// Feed one raw message; `None` while a chunk sequence is still open
    /// or when the bytes are not MIDI at all
    pub fn feed(&mut self, raw: &[u8]) -> Option<Decoded> {
        if let Some(frame) = parse_frame(raw) {
            let payload = self.reassembler.push(frame.tag, frame.body)?;
            return Some(decode_payload(frame.tag, &payload));
        }

        MidiMessage::parse(raw).map(|message| Decoded::Channel {
            message: message.to_string(),
        })
    }
}

fn print_human(elapsed_ms: u64, decoded: &Decoded) {
    let stamp = format!("[{:>8}ms]", elapsed_ms).dimmed();
    match decoded {
        Decoded::Text { tag, text } => println!("{} {:<15} | {}", stamp, tag.cyan(), text),
        Decoded::Notes { notes } => {
            println!("{} {:<15} | {} notes", stamp, "notes".cyan(), notes.len());
            for note in notes {
                println!(
                    "{}   #{:<5} pitch {:>3} @ {:>7}ms len {:>6}ms vel {:>3}{}",
                    " ".repeat(12),
                    note.id,
                    note.pitch,
                    note.start,
                    note.duration,
                    note.velocity,
                    if note.mute { " (muted)" } else { "" }
                );
            }
        }
        Decoded::EmptyClip => {
            println!("{} {:<15} | {}", stamp, "notes".cyan(), "empty clip".dimmed())
        }
        Decoded::Metadata { metadata } => println!(
            "{} {:<15} | markers {}..{} loop {}..{} {}/{}",
            stamp,
            "clip-metadata".cyan(),
            metadata.start_marker,
            metadata.end_marker,
            metadata.loop_start,
            metadata.loop_end,
            metadata.numerator,
            metadata.denominator
        ),
        Decoded::Playhead { position } => {
            println!("{} {:<15} | {}ms", stamp, "playhead".cyan(), position)
        }
        Decoded::UndoRedo { can_undo, can_redo } => println!(
            "{} {:<15} | undo {} redo {}",
            stamp,
            "undo-redo".cyan(),
            can_undo,
            can_redo
        ),
        Decoded::Unknown { tag, bytes } => println!(
            "{} {:<15} | {}",
            stamp,
            format!("tag {:#04X}", tag).yellow(),
            bytes
        ),
        Decoded::Channel { message } => println!("{} {:<15} | {}", stamp, "midi".green(), message),
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    elapsed_ms: u64,
    #[serde(flatten)]
    decoded: &'a Decoded,
}

/// Monitor the input port matching `pattern` until Ctrl+C
pub async fn run_sniffer(pattern: &str, max_chunk_bytes: usize, json: bool) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<Vec<u8>>(1000);

    let source = MidirSource::open(pattern, move |data| {
        if event_tx.try_send(data.to_vec()).is_err() {
            warn!("Sniffer backlog full, dropping message");
        }
    })?;

    if !json {
        println!("{}", "=== Protocol Sniffer ===".bold().cyan());
        println!("Listening on '{}', press Ctrl+C to exit", source.port_name());
        println!("{}\n", "─".repeat(80).dimmed());
    }

    let start = Instant::now();
    let mut sniffer = Sniffer::new(max_chunk_bytes);

    loop {
        tokio::select! {
            Some(raw) = event_rx.recv() => {
                let Some(decoded) = sniffer.feed(&raw) else {
                    continue;
                };
                let elapsed_ms = start.elapsed().as_millis() as u64;
                if json {
                    let line = JsonLine { elapsed_ms, decoded: &decoded };
                    println!("{}", serde_json::to_string(&line)?);
                } else {
                    print_human(elapsed_ms, &decoded);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("Sniffer interrupted");
                break;
            }
        }
    }

    Ok(())
}
