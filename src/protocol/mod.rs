//! Wire protocol between the bridge and the companion app
//!
//! Outbound traffic is tagged SysEx (the manufacturer byte selects what the
//! payload means), inbound traffic is opcoded commands (see
//! [`crate::dispatcher`]).

pub mod codec;
pub mod framing;

pub use codec::{decode2, decode3, encode2, encode3, encode_text};
pub use framing::{chunk, command_payload, frame, parse_frame, Frame, Reassembler};

use std::fmt;

/// Outbound payload tags (SysEx manufacturer byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OutboundTag {
    DeviceList = 0x01,
    TrackNames = 0x02,
    SelectedTrack = 0x03,
    TrackColors = 0x04,
    ClipGridRow = 0x05,
    ReturnTrackNames = 0x06,
    ReturnTrackColors = 0x07,
    SelectedReturn = 0x08,
    ScaleRoot = 0x0A,
    MidiInputFlag = 0x0B,
    TrackCapabilities = 0x0C,
    ClipNotes = 0x0D,
    ClipMetadata = 0x0E,
    PlayheadPosition = 0x0F,
    SelectedClipSlot = 0x10,
    DrumPadNames = 0x11,
    UndoRedoState = 0x12,
    /// Index of the selected device among the track's devices
    SelectedDevice = 0x4D,
    /// Parameter bank names of the selected device
    BankNames = 0x5D,
    /// `<bank name>;<has drum rack>`
    BankName = 0x6D,
    /// Parameter names on the current bank
    ParameterNames = 0x7D,
}

impl OutboundTag {
    pub const ALL: [OutboundTag; 21] = [
        OutboundTag::DeviceList,
        OutboundTag::TrackNames,
        OutboundTag::SelectedTrack,
        OutboundTag::TrackColors,
        OutboundTag::ClipGridRow,
        OutboundTag::ReturnTrackNames,
        OutboundTag::ReturnTrackColors,
        OutboundTag::SelectedReturn,
        OutboundTag::ScaleRoot,
        OutboundTag::MidiInputFlag,
        OutboundTag::TrackCapabilities,
        OutboundTag::ClipNotes,
        OutboundTag::ClipMetadata,
        OutboundTag::PlayheadPosition,
        OutboundTag::SelectedClipSlot,
        OutboundTag::DrumPadNames,
        OutboundTag::UndoRedoState,
        OutboundTag::SelectedDevice,
        OutboundTag::BankNames,
        OutboundTag::BankName,
        OutboundTag::ParameterNames,
    ];

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_byte() == byte)
    }

    /// Whether the payload is text (as opposed to packed binary records)
    pub fn is_text(self) -> bool {
        !matches!(
            self,
            OutboundTag::ClipNotes
                | OutboundTag::ClipMetadata
                | OutboundTag::PlayheadPosition
                | OutboundTag::UndoRedoState
        )
    }
}

impl fmt::Display for OutboundTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutboundTag::DeviceList => "devices",
            OutboundTag::TrackNames => "track-names",
            OutboundTag::SelectedTrack => "selected-track",
            OutboundTag::TrackColors => "track-colors",
            OutboundTag::ClipGridRow => "grid-row",
            OutboundTag::ReturnTrackNames => "return-names",
            OutboundTag::ReturnTrackColors => "return-colors",
            OutboundTag::SelectedReturn => "selected-return",
            OutboundTag::ScaleRoot => "scale",
            OutboundTag::MidiInputFlag => "midi-input",
            OutboundTag::TrackCapabilities => "capabilities",
            OutboundTag::ClipNotes => "notes",
            OutboundTag::ClipMetadata => "clip-metadata",
            OutboundTag::PlayheadPosition => "playhead",
            OutboundTag::SelectedClipSlot => "selected-slot",
            OutboundTag::DrumPadNames => "drum-pads",
            OutboundTag::UndoRedoState => "undo-redo",
            OutboundTag::SelectedDevice => "selected-device",
            OutboundTag::BankNames => "bank-names",
            OutboundTag::BankName => "bank-name",
            OutboundTag::ParameterNames => "parameter-names",
        };
        write!(f, "{}", name)
    }
}

/// Framing parameters shared by everything that emits SysEx
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireSettings {
    pub device_id: u8,
    pub max_chunk_bytes: usize,
}

impl WireSettings {
    /// Frame (and chunk when needed) a payload for `tag`
    pub fn encode(&self, tag: OutboundTag, payload: &[u8]) -> Vec<Vec<u8>> {
        chunk(tag.as_byte(), self.device_id, payload, self.max_chunk_bytes)
    }
}

impl Default for WireSettings {
    fn default() -> Self {
        Self {
            device_id: framing::DEFAULT_DEVICE_ID,
            max_chunk_bytes: framing::DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}
