//! Playing-note stream
//!
//! While a clip on the selected track plays, the companion app mirrors the
//! notes sounding under the playhead as plain note-on/note-off messages.
//! [`NotePlayback`] turns successive playhead positions into those messages.

use crate::midi::MidiMessage;
use crate::serializer::{ClipMetadata, NoteEvent};

/// Channel (raw, 0-15) of the mirrored notes
pub const PLAYING_NOTE_CHANNEL: u8 = 0;

/// Velocity of every mirrored note-on and note-off
pub const PLAYING_NOTE_VELOCITY: u8 = 100;

const PITCHES: usize = 128;

/// Sounding pitches of one playing clip
#[derive(Debug, Clone)]
pub struct NotePlayback {
    sounding: [bool; PITCHES],
    last_position: Option<i32>,
}

impl NotePlayback {
    pub fn new() -> Self {
        Self {
            sounding: [false; PITCHES],
            last_position: None,
        }
    }

    /// Move the playhead to `position` and return the note-offs for notes
    /// that stopped sounding, then the note-ons for notes started since the
    /// previous position.
    ///
    /// A position behind the previous one means the clip wrapped (or was
    /// restarted): the scan restarts from the loop start when the playhead is
    /// inside the loop, from the start marker otherwise.
    pub fn advance(
        &mut self,
        notes: &[NoteEvent],
        metadata: &ClipMetadata,
        position: i32,
    ) -> Vec<MidiMessage> {
        let (from, inclusive) = match self.last_position {
            Some(last) if last <= position => (last, false),
            _ if position >= metadata.loop_start => (metadata.loop_start, true),
            _ => (metadata.start_marker, true),
        };
        self.last_position = Some(position);

        let audible = || notes.iter().filter(|n| !n.mute);
        let mut messages = Vec::new();

        for pitch in 0..PITCHES {
            if !self.sounding[pitch] {
                continue;
            }
            let held = audible().any(|n| {
                usize::from(n.pitch) == pitch
                    && n.start <= position
                    && position < n.start.saturating_add(n.duration)
            });
            if !held {
                self.sounding[pitch] = false;
                messages.push(note_off(pitch as u8));
            }
        }

        for note in audible() {
            let started = if inclusive {
                from <= note.start
            } else {
                from < note.start
            };
            if started && note.start <= position {
                self.sounding[usize::from(note.pitch & 0x7F)] = true;
                messages.push(MidiMessage::NoteOn {
                    channel: PLAYING_NOTE_CHANNEL,
                    note: note.pitch,
                    velocity: PLAYING_NOTE_VELOCITY,
                });
            }
        }

        messages
    }

    /// Note-offs for everything still sounding; the next position starts a
    /// fresh scan
    pub fn release_all(&mut self) -> Vec<MidiMessage> {
        self.last_position = None;
        let mut messages = Vec::new();
        for (pitch, sounding) in self.sounding.iter_mut().enumerate() {
            if std::mem::take(sounding) {
                messages.push(note_off(pitch as u8));
            }
        }
        messages
    }

    pub fn is_silent(&self) -> bool {
        !self.sounding.contains(&true)
    }
}

impl Default for NotePlayback {
    fn default() -> Self {
        Self::new()
    }
}

fn note_off(pitch: u8) -> MidiMessage {
    MidiMessage::NoteOff {
        channel: PLAYING_NOTE_CHANNEL,
        note: pitch,
        velocity: PLAYING_NOTE_VELOCITY,
    }
}
