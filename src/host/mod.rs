//! Host session graph interface
//!
//! The DAW's live session is an external collaborator. The bridge only sees
//! it through [`SessionHost`]: enumeration of tracks and devices, note
//! access on the focused clip, a handful of edit operations and per-property
//! change listeners.
//!
//! Host entities are addressed by index ([`EntityRef`]). Indices are only
//! meaningful within one structural generation: after tracks are added,
//! removed or reordered the same index may name a different object.

pub mod devices;
pub mod memory;

pub use devices::{find_drum_pads, DeviceNode, ParameterBank, MAX_RACK_DEPTH};
pub use memory::MemorySession;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serializer::{ClipMetadata, NoteEvent};

/// Address of a host entity a listener can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityRef {
    Song,
    SongView,
    Track(usize),
    ReturnTrack(usize),
    Master,
    ClipSlot { track: usize, slot: usize },
    Clip { track: usize, slot: usize },
}

/// Property a listener observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Track list of the song (structural)
    Tracks,
    /// Return track list of the song (structural)
    ReturnTracks,
    /// Scale name or root note
    Scale,
    SelectedTrack,
    SelectedScene,
    /// Clip shown in the detail view
    DetailClip,
    Name,
    Color,
    Devices,
    /// Selected device or its parameter bank
    SelectedDevice,
    /// Output meter of a track, return or the master
    OutputMeter,
    HasClip,
    /// Playing, triggered or recording state of a slot
    PlayingStatus,
    Notes,
    Markers,
    PlayingPosition,
}

/// Opaque handle for a registered host listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Notification delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// A registered listener fired
    Fired(ListenerId),
    /// The track graph changed shape without a song-level listener firing
    StructuralChange,
}

/// Group membership of a track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    #[default]
    None,
    /// The track is a group (foldable) track
    Group,
    /// The track sits inside a group
    Grouped,
}

impl GroupStatus {
    pub fn code(self) -> u8 {
        match self {
            GroupStatus::None => 0,
            GroupStatus::Group => 1,
            GroupStatus::Grouped => 2,
        }
    }
}

/// State of one clip slot as reported by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotInfo {
    pub has_clip: bool,
    pub is_playing: bool,
    pub is_recording: bool,
    pub is_triggered: bool,
    /// Packed RGB of the clip, when there is one
    pub clip_color: Option<u32>,
}

/// Track as reported by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub name: String,
    pub color: u32,
    pub has_audio_input: bool,
    pub has_midi_input: bool,
    pub has_audio_output: bool,
    pub group: GroupStatus,
    pub slots: Vec<SlotInfo>,
}

/// Currently selected track.
///
/// Stored as `{ kind: track, index: 2 }`, `{ kind: return, index: 0 }` or
/// `{ kind: master }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "lowercase")]
pub enum TrackSelection {
    Track(usize),
    Return(usize),
    Master,
}

impl Default for TrackSelection {
    fn default() -> Self {
        TrackSelection::Track(0)
    }
}

/// Position of a clip in the session grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipRef {
    pub track: usize,
    pub slot: usize,
}

impl ClipRef {
    pub fn new(track: usize, slot: usize) -> Self {
        Self { track, slot }
    }

    pub fn slot_entity(self) -> EntityRef {
        EntityRef::ClipSlot {
            track: self.track,
            slot: self.slot,
        }
    }

    pub fn clip_entity(self) -> EntityRef {
        EntityRef::Clip {
            track: self.track,
            slot: self.slot,
        }
    }
}

/// Device shown on the device page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    /// Index among the selected track's top-level devices
    pub index: usize,
    /// Parameter bank on screen
    #[serde(default)]
    pub bank: usize,
}

/// Output meter of one mixer strip, both sides in `0.0..=1.0`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterLevel {
    pub left: f32,
    pub right: f32,
}

/// Musical scale of the song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    pub name: String,
    pub root: u8,
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            name: "Major".to_string(),
            root: 0,
        }
    }
}

/// Undo/redo availability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UndoState {
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Clip marker addressed by the set-marker command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Start,
    End,
    LoopStart,
    LoopEnd,
}

impl Marker {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Marker::Start),
            1 => Some(Marker::End),
            2 => Some(Marker::LoopStart),
            3 => Some(Marker::LoopEnd),
            _ => None,
        }
    }
}

/// Errors reported by host operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostError {
    #[error("entity {0:?} no longer exists")]
    StaleEntity(EntityRef),

    #[error("no clip is focused")]
    NoFocusedClip,

    #[error("note {0} not found")]
    NoteNotFound(u16),

    #[error("host rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

pub type HostResult<T> = Result<T, HostError>;

/// Capabilities the bridge needs from the host session graph
pub trait SessionHost: Send {
    // Enumeration

    fn tracks(&self) -> Vec<TrackInfo>;
    fn return_tracks(&self) -> Vec<TrackInfo>;
    fn master_track(&self) -> TrackInfo;
    fn selected_track(&self) -> TrackSelection;
    fn selected_scene(&self) -> Option<usize>;
    fn devices(&self, track: TrackSelection) -> Vec<DeviceNode>;
    /// Device on the device page, if the selected track has one selected
    fn selected_device(&self) -> Option<DeviceSelection>;
    /// Current output level of a track, return or the master
    fn output_meter(&self, strip: EntityRef) -> HostResult<MeterLevel>;
    fn scale(&self) -> Scale;
    fn undo_state(&self) -> UndoState;

    // Focused clip

    fn focused_clip(&self) -> Option<ClipRef>;
    fn clip_metadata(&self, clip: ClipRef) -> HostResult<ClipMetadata>;
    /// Notes of the clip in `clip`; `Ok(None)` when the slot is empty
    fn clip_notes(&self, clip: ClipRef) -> HostResult<Option<Vec<NoteEvent>>>;
    fn playing_position(&self, clip: ClipRef) -> HostResult<i32>;

    // Edits

    fn fire_slot(&mut self, clip: ClipRef) -> HostResult<()>;
    fn stop_slot(&mut self, clip: ClipRef) -> HostResult<()>;
    fn delete_clip(&mut self, clip: ClipRef) -> HostResult<()>;
    fn duplicate_clip_to(&mut self, from: ClipRef, to: ClipRef) -> HostResult<()>;
    fn duplicate_loop(&mut self, clip: ClipRef) -> HostResult<()>;
    fn set_scale(&mut self, name: &str, root: u8) -> HostResult<()>;
    /// Insert a note; the host assigns the id and returns it
    fn add_note(&mut self, clip: ClipRef, note: NoteEvent) -> HostResult<u16>;
    fn remove_note(&mut self, clip: ClipRef, id: u16) -> HostResult<()>;
    /// Write back a full, already modified note list
    fn apply_note_modifications(&mut self, clip: ClipRef, notes: Vec<NoteEvent>)
        -> HostResult<()>;
    fn set_marker(&mut self, clip: ClipRef, marker: Marker, time: i32) -> HostResult<()>;

    // Listeners

    /// Attach a listener. The host is not required to deduplicate.
    fn add_listener(&mut self, entity: EntityRef, kind: EventKind) -> HostResult<ListenerId>;
    fn remove_listener(&mut self, id: ListenerId) -> HostResult<()>;
    /// Notifications raised since the last call
    fn drain_events(&mut self) -> Vec<HostEvent>;
}

/// Format a packed RGB color as `(r,g,b)`
pub fn color_string(color: u32) -> String {
    let red = (color >> 16) & 0xFF;
    let green = (color >> 8) & 0xFF;
    let blue = color & 0xFF;
    format!("({},{},{})", red, green, blue)
}
