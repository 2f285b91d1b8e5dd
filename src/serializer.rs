//! Note and clip serialization
//!
//! Clip notes travel as fixed 11-byte records, clip metadata as four 3-byte
//! times followed by the time signature. Both payloads go through the
//! chunker, so a long note list arrives as several frames.

use serde::{Deserialize, Serialize};

use crate::protocol::codec::{decode2, decode3, encode2, encode3, MAX_ID};

/// Size of one serialized note
pub const NOTE_RECORD_LEN: usize = 11;

/// Size of a serialized metadata payload
pub const METADATA_LEN: usize = 14;

/// Payload sent instead of note records when the focused slot holds no clip
pub const EMPTY_CLIP_SENTINEL: [u8; 3] = [0x7F, 0x7F, 0x7F];

/// Mute flag inside the packed mute/probability byte
pub const MUTE_FLAG: u8 = 0x40;

/// Largest quantized probability step
pub const PROBABILITY_STEPS: u8 = 0x3F;

/// A single note of a clip, times in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    #[serde(default)]
    pub id: u16,
    pub pitch: u8,
    pub start: i32,
    pub duration: i32,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    #[serde(default)]
    pub mute: bool,
    #[serde(default = "default_probability")]
    pub probability: f32,
}

/// Clip markers (milliseconds) and time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipMetadata {
    #[serde(default)]
    pub start_marker: i32,
    pub end_marker: i32,
    #[serde(default)]
    pub loop_start: i32,
    pub loop_end: i32,
    #[serde(default = "default_numerator")]
    pub numerator: u8,
    #[serde(default = "default_denominator")]
    pub denominator: u8,
}

impl Default for ClipMetadata {
    fn default() -> Self {
        Self {
            start_marker: 0,
            end_marker: 4000,
            loop_start: 0,
            loop_end: 4000,
            numerator: default_numerator(),
            denominator: default_denominator(),
        }
    }
}

fn default_velocity() -> u8 { 100 }
fn default_probability() -> f32 { 1.0 }
fn default_numerator() -> u8 { 4 }
fn default_denominator() -> u8 { 4 }

/// Quantize a probability (0.0-1.0) to 0..=63
pub fn quantize_probability(probability: f32) -> u8 {
    if probability.is_nan() {
        return PROBABILITY_STEPS;
    }
    (probability.clamp(0.0, 1.0) * PROBABILITY_STEPS as f32).round() as u8
}

/// Pack mute and probability into one 7-bit byte
pub fn pack_mute_probability(mute: bool, probability: f32) -> u8 {
    let mute = if mute { MUTE_FLAG } else { 0 };
    mute | quantize_probability(probability)
}

/// Inverse of [`pack_mute_probability`]
pub fn unpack_mute_probability(byte: u8) -> (bool, f32) {
    let steps = byte & PROBABILITY_STEPS;
    (byte & MUTE_FLAG != 0, steps as f32 / PROBABILITY_STEPS as f32)
}

/// Serialize a clip's notes; `None` means the slot holds no clip.
pub fn serialize_notes(notes: Option<&[NoteEvent]>) -> Vec<u8> {
    let Some(notes) = notes else {
        return EMPTY_CLIP_SENTINEL.to_vec();
    };

    let mut out = Vec::with_capacity(notes.len() * NOTE_RECORD_LEN);
    for note in notes {
        out.extend_from_slice(&encode2(note.id.min(MAX_ID)));
        out.push(note.pitch & 0x7F);
        out.extend_from_slice(&encode3(note.start));
        out.extend_from_slice(&encode3(note.duration));
        out.push(note.velocity & 0x7F);
        out.push(pack_mute_probability(note.mute, note.probability));
    }
    out
}

/// Decode a reassembled notes payload.
///
/// Returns `None` for the empty-clip sentinel. Trailing bytes that do not
/// form a full record are ignored.
pub fn decode_note_records(payload: &[u8]) -> Option<Vec<NoteEvent>> {
    if payload == EMPTY_CLIP_SENTINEL {
        return None;
    }

    Some(
        payload
            .chunks_exact(NOTE_RECORD_LEN)
            .map(|record| {
                let (mute, probability) = unpack_mute_probability(record[10]);
                NoteEvent {
                    id: decode2(record, 0),
                    pitch: record[2],
                    start: decode3(record, 3),
                    duration: decode3(record, 6),
                    velocity: record[9],
                    mute,
                    probability,
                }
            })
            .collect(),
    )
}

/// Serialize clip markers and time signature
pub fn serialize_metadata(metadata: &ClipMetadata) -> Vec<u8> {
    let mut out = Vec::with_capacity(METADATA_LEN);
    for time in [
        metadata.start_marker,
        metadata.end_marker,
        metadata.loop_start,
        metadata.loop_end,
    ] {
        out.extend_from_slice(&encode3(time));
    }
    out.push(metadata.numerator & 0x7F);
    out.push(metadata.denominator & 0x7F);
    out
}

/// Decode a metadata payload (`None` when truncated)
pub fn decode_metadata(payload: &[u8]) -> Option<ClipMetadata> {
    if payload.len() < METADATA_LEN {
        return None;
    }

    Some(ClipMetadata {
        start_marker: decode3(payload, 0),
        end_marker: decode3(payload, 3),
        loop_start: decode3(payload, 6),
        loop_end: decode3(payload, 9),
        numerator: payload[12],
        denominator: payload[13],
    })
}
