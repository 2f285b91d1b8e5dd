//! Clip grid snapshots and row diffing
//!
//! Every track renders to one row string; the differ remembers the rows it
//! last reported and returns the indices whose row changed plus the indices
//! that no longer exist. Comparison is per whole row.

use crate::host::{color_string, SlotInfo, TrackInfo};

/// Separator between slot cells in a row
pub const CELL_SEPARATOR: &str = "-";

/// Payload prefix announcing a deleted row
pub const DELETED_ROW_PREFIX: &str = "DEL";

/// State code of one clip slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SlotCode {
    Empty = 0,
    HasClip = 1,
    Playing = 2,
    Recording = 3,
    Triggered = 4,
}

/// One rendered grid cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSlotState {
    pub code: SlotCode,
    /// `(r,g,b)` of the clip, `None` renders as the `0` sentinel
    pub color: Option<String>,
}

impl ClipSlotState {
    /// Triggered beats recording beats playing beats having a clip
    pub fn from_slot(slot: &SlotInfo) -> Self {
        let code = if slot.is_triggered {
            SlotCode::Triggered
        } else if slot.is_recording {
            SlotCode::Recording
        } else if slot.is_playing {
            SlotCode::Playing
        } else if slot.has_clip {
            SlotCode::HasClip
        } else {
            SlotCode::Empty
        };

        let color = match code {
            SlotCode::Empty => None,
            _ => slot.clip_color.map(color_string),
        };

        Self { code, color }
    }

    pub fn render(&self) -> String {
        format!(
            "{}:{}",
            self.code as u8,
            self.color.as_deref().unwrap_or("0")
        )
    }
}

/// Render the row string of one track
pub fn render_row(track: &TrackInfo) -> String {
    track
        .slots
        .iter()
        .map(|slot| ClipSlotState::from_slot(slot).render())
        .collect::<Vec<_>>()
        .join(CELL_SEPARATOR)
}

/// Row strings of the whole grid, indexed by track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridSnapshot {
    pub rows: Vec<String>,
}

impl GridSnapshot {
    pub fn capture(tracks: &[TrackInfo]) -> Self {
        Self {
            rows: tracks.iter().map(render_row).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of comparing two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridDiff {
    /// Indices whose row differs or is new, ascending
    pub changed: Vec<usize>,
    /// Indices present before but gone now, ascending
    pub deleted: Vec<usize>,
}

impl GridDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Wire payload of a changed row: `<index>%<row>`
pub fn row_payload(index: usize, row: &str) -> String {
    format!("{}%{}", index, row)
}

/// Wire payload of a deleted row: `DEL<index>`
pub fn deletion_payload(index: usize) -> String {
    format!("{}{}", DELETED_ROW_PREFIX, index)
}

#[derive(Debug, Default)]
pub struct SnapshotDiffer {
    previous: GridSnapshot,
}

impl SnapshotDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare against the previous snapshot and adopt `current` as the new
    /// baseline, whatever the caller does with the result.
    pub fn diff(&mut self, current: GridSnapshot) -> GridDiff {
        let previous = &self.previous.rows;
        let span = previous.len().max(current.rows.len());

        let mut diff = GridDiff::default();
        for index in 0..span {
            match (previous.get(index), current.rows.get(index)) {
                (Some(old), Some(new)) if old == new => {}
                (_, Some(_)) => diff.changed.push(index),
                (Some(_), None) => diff.deleted.push(index),
                (None, None) => {}
            }
        }

        self.previous = current;
        diff
    }

    /// Forget the baseline so the next diff reports every row
    pub fn reset(&mut self) {
        self.previous = GridSnapshot::default();
    }

    pub fn previous(&self) -> &GridSnapshot {
        &self.previous
    }
}
