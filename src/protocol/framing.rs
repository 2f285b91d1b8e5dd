//! SysEx framing, chunking and reassembly
//!
//! Outbound messages are `F0 <tag> <device> <payload..> F7`. Payloads larger
//! than the chunk limit are split into pieces that are framed independently;
//! every piece but the last starts with [`CONTINUATION_MARKER`], the last one
//! with [`FINAL_MARKER`].

use std::collections::HashMap;
use tracing::{trace, warn};

/// SysEx start byte
pub const SYSEX_START: u8 = 0xF0;

/// SysEx end byte
pub const SYSEX_END: u8 = 0xF7;

/// Device id carried by every outbound frame
pub const DEFAULT_DEVICE_ID: u8 = 0x01;

/// Largest payload sent in a single frame
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 250;

/// Prefix of every chunk except the last (`$`)
pub const CONTINUATION_MARKER: u8 = b'$';

/// Prefix of the last chunk (`_`)
pub const FINAL_MARKER: u8 = b'_';

/// Most payload bytes a receiver buffers for one unfinished sequence
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Frame a payload. Bytes with the high bit set are masked so the frame
/// never carries a stray status byte.
pub fn frame(tag: u8, device_id: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(
        super::codec::is_seven_bit_safe(payload),
        "payload for tag {tag:#04X} is not 7-bit safe"
    );

    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(SYSEX_START);
    out.push(tag & 0x7F);
    out.push(device_id & 0x7F);
    out.extend(payload.iter().map(|b| b & 0x7F));
    out.push(SYSEX_END);
    out
}

/// Split a payload into framed chunks of at most `max_chunk_bytes` payload
/// bytes each (plus the marker byte).
pub fn chunk(tag: u8, device_id: u8, payload: &[u8], max_chunk_bytes: usize) -> Vec<Vec<u8>> {
    let max = max_chunk_bytes.max(1);

    if payload.len() <= max {
        return vec![frame(tag, device_id, payload)];
    }

    let pieces: Vec<&[u8]> = payload.chunks(max).collect();
    let last = pieces.len() - 1;

    trace!(
        "Chunking {} bytes for tag {:#04X} into {} pieces",
        payload.len(),
        tag,
        pieces.len()
    );

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            let marker = if index == last {
                FINAL_MARKER
            } else {
                CONTINUATION_MARKER
            };
            let mut body = Vec::with_capacity(piece.len() + 1);
            body.push(marker);
            body.extend_from_slice(piece);
            frame(tag, device_id, &body)
        })
        .collect()
}

/// A parsed outbound-style frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub tag: u8,
    pub device_id: u8,
    pub body: &'a [u8],
}

/// Parse `F0 <tag> <device> <body..> F7`
pub fn parse_frame(raw: &[u8]) -> Option<Frame<'_>> {
    let inner = sysex_body(raw)?;
    if inner.len() < 2 {
        return None;
    }

    Some(Frame {
        tag: inner[0],
        device_id: inner[1],
        body: &inner[2..],
    })
}

/// Strip the framing bytes of an inbound command message, leaving
/// `<opcode> <args..>`.
pub fn command_payload(raw: &[u8]) -> Option<&[u8]> {
    sysex_body(raw).filter(|body| !body.is_empty())
}

fn sysex_body(raw: &[u8]) -> Option<&[u8]> {
    if raw.first() != Some(&SYSEX_START) {
        return None;
    }
    let end = raw.iter().position(|&b| b == SYSEX_END)?;
    Some(&raw[1..end])
}

/// Receiver-side reassembly of chunked payloads, one stream per tag.
///
/// A continuation piece always carries exactly `max_chunk_bytes` payload
/// bytes, so a frame is only treated as the start of a chunk sequence when
/// it has that exact shape. Anything else with no sequence in progress is a
/// complete single-frame payload.
///
/// A sequence that grows past the pending limit without a final piece is
/// dropped.
#[derive(Debug)]
pub struct Reassembler {
    max_chunk_bytes: usize,
    max_pending_bytes: usize,
    pending: HashMap<u8, Vec<u8>>,
}

impl Reassembler {
    pub fn new(max_chunk_bytes: usize) -> Self {
        Self {
            max_chunk_bytes: max_chunk_bytes.max(1),
            max_pending_bytes: MAX_PENDING_BYTES,
            pending: HashMap::new(),
        }
    }

    pub fn with_max_pending_bytes(mut self, max_pending_bytes: usize) -> Self {
        self.max_pending_bytes = max_pending_bytes;
        self
    }

    /// Feed one frame body; returns the complete payload once available.
    pub fn push(&mut self, tag: u8, body: &[u8]) -> Option<Vec<u8>> {
        if let Some(buffer) = self.pending.get_mut(&tag) {
            match body.first() {
                Some(&CONTINUATION_MARKER) => {
                    if buffer.len() + body.len() - 1 > self.max_pending_bytes {
                        warn!(
                            "Chunk sequence for tag {:#04X} exceeds {} bytes, dropped",
                            tag, self.max_pending_bytes
                        );
                        self.pending.remove(&tag);
                        return None;
                    }
                    buffer.extend_from_slice(&body[1..]);
                    return None;
                }
                Some(&FINAL_MARKER) => {
                    buffer.extend_from_slice(&body[1..]);
                    return self.pending.remove(&tag);
                }
                _ => {
                    warn!(
                        "Unterminated chunk sequence for tag {:#04X} dropped ({} bytes)",
                        tag,
                        buffer.len()
                    );
                    self.pending.remove(&tag);
                }
            }
        }

        if body.len() == self.max_chunk_bytes + 1 && body.first() == Some(&CONTINUATION_MARKER) {
            self.pending.insert(tag, body[1..].to_vec());
            return None;
        }

        Some(body.to_vec())
    }

    /// Whether a chunk sequence is in progress for `tag`
    pub fn is_pending(&self, tag: u8) -> bool {
        self.pending.contains_key(&tag)
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_BYTES)
    }
}
