//! In-memory session host
//!
//! A self-contained [`SessionHost`] backed by plain data. The binary uses it
//! when no DAW is attached (loaded from a YAML fixture) and the tests use it
//! to drive the bridge. Listener registrations are recorded so duplicate
//! subscriptions are observable, and every mutation queues the matching
//! listener notifications.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    ClipRef, DeviceNode, DeviceSelection, EntityRef, EventKind, GroupStatus, HostError, HostEvent,
    HostResult, ListenerId, Marker, MeterLevel, Scale, SessionHost, SlotInfo, TrackInfo,
    TrackSelection, UndoState,
};
use crate::protocol::codec::MAX_ID;
use crate::serializer::{ClipMetadata, NoteEvent};

/// A clip held by a [`MemorySlot`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryClip {
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub notes: Vec<NoteEvent>,
    #[serde(default)]
    pub metadata: ClipMetadata,
    /// Playing position in milliseconds
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySlot {
    #[serde(default)]
    pub clip: Option<MemoryClip>,
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub triggered: bool,
}

impl MemorySlot {
    pub fn with_clip(clip: MemoryClip) -> Self {
        Self {
            clip: Some(clip),
            ..Default::default()
        }
    }

    fn info(&self) -> SlotInfo {
        SlotInfo {
            has_clip: self.clip.is_some(),
            is_playing: self.playing,
            is_recording: self.recording,
            is_triggered: self.triggered,
            clip_color: self.clip.as_ref().map(|c| c.color),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTrack {
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub audio_input: bool,
    #[serde(default)]
    pub midi_input: bool,
    /// MIDI tracks without an instrument have no audio output
    #[serde(default = "default_audio_output")]
    pub audio_output: bool,
    #[serde(default)]
    pub group: GroupStatus,
    #[serde(default)]
    pub devices: Vec<DeviceNode>,
    #[serde(default)]
    pub selected_device: Option<DeviceSelection>,
    #[serde(default)]
    pub meter: MeterLevel,
    #[serde(default)]
    pub slots: Vec<MemorySlot>,
}

fn default_audio_output() -> bool {
    true
}

impl Default for MemoryTrack {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: 0,
            audio_input: false,
            midi_input: false,
            audio_output: default_audio_output(),
            group: GroupStatus::None,
            devices: Vec::new(),
            selected_device: None,
            meter: MeterLevel::default(),
            slots: Vec::new(),
        }
    }
}

impl MemoryTrack {
    /// A MIDI track with `slots` empty clip slots
    pub fn midi(name: impl Into<String>, color: u32, slots: usize) -> Self {
        Self {
            name: name.into(),
            color,
            midi_input: true,
            slots: vec![MemorySlot::default(); slots],
            ..Default::default()
        }
    }

    fn info(&self) -> TrackInfo {
        TrackInfo {
            name: self.name.clone(),
            color: self.color,
            has_audio_input: self.audio_input,
            has_midi_input: self.midi_input,
            has_audio_output: self.audio_output,
            group: self.group,
            slots: self.slots.iter().map(MemorySlot::info).collect(),
        }
    }
}

/// Session contents as stored in a fixture file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFixture {
    #[serde(default)]
    pub tracks: Vec<MemoryTrack>,
    #[serde(default)]
    pub returns: Vec<MemoryTrack>,
    #[serde(default)]
    pub master: MemoryTrack,
    #[serde(default)]
    pub selected_track: TrackSelection,
    #[serde(default)]
    pub selected_scene: Option<usize>,
    #[serde(default)]
    pub focused_clip: Option<ClipRef>,
    #[serde(default)]
    pub scale: Scale,
}

/// In-memory [`SessionHost`]
#[derive(Debug, Default)]
pub struct MemorySession {
    session: SessionFixture,
    undo: UndoState,
    listeners: HashMap<ListenerId, (EntityRef, EventKind)>,
    registrations: HashMap<(EntityRef, EventKind), usize>,
    next_listener: u64,
    next_note_id: u16,
    events: Vec<HostEvent>,
}

impl MemorySession {
    pub fn new(session: SessionFixture) -> Self {
        let next_note_id = session
            .tracks
            .iter()
            .flat_map(|t| t.slots.iter())
            .filter_map(|s| s.clip.as_ref())
            .flat_map(|c| c.notes.iter().map(|n| n.id))
            .max()
            .map_or(0, following_note_id);

        Self {
            session,
            next_note_id,
            ..Default::default()
        }
    }

    /// Parse a session fixture from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let session: SessionFixture =
            serde_yaml::from_str(yaml).context("Failed to parse session fixture")?;
        Ok(Self::new(session))
    }

    /// Load a session fixture from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session fixture: {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    /// Total `add_listener` calls ever made for a key
    pub fn registrations(&self, entity: EntityRef, kind: EventKind) -> usize {
        self.registrations.get(&(entity, kind)).copied().unwrap_or(0)
    }

    /// Listeners currently attached for a key
    pub fn live_listeners(&self, entity: EntityRef, kind: EventKind) -> usize {
        self.listeners
            .values()
            .filter(|(e, k)| *e == entity && *k == kind)
            .count()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // Session edits that a user would make in the DAW

    pub fn push_track(&mut self, track: MemoryTrack) {
        self.session.tracks.push(track);
        self.structural_change();
    }

    pub fn remove_track(&mut self, index: usize) -> Option<MemoryTrack> {
        if index >= self.session.tracks.len() {
            return None;
        }
        let removed = self.session.tracks.remove(index);
        self.structural_change();
        Some(removed)
    }

    pub fn rename_track(&mut self, index: usize, name: &str) {
        if let Some(track) = self.session.tracks.get_mut(index) {
            track.name = name.to_string();
            self.notify(EntityRef::Track(index), EventKind::Name);
        }
    }

    pub fn set_slot(&mut self, clip: ClipRef, slot: MemorySlot) {
        if let Some(target) = self.slot_mut(clip) {
            *target = slot;
            self.notify(clip.slot_entity(), EventKind::HasClip);
            self.notify(clip.slot_entity(), EventKind::PlayingStatus);
        }
    }

    pub fn select_track(&mut self, selection: TrackSelection) {
        self.session.selected_track = selection;
        self.notify(EntityRef::SongView, EventKind::SelectedTrack);
    }

    pub fn select_scene(&mut self, scene: Option<usize>) {
        self.session.selected_scene = scene;
        self.notify(EntityRef::SongView, EventKind::SelectedScene);
    }

    pub fn focus_clip(&mut self, clip: Option<ClipRef>) {
        self.session.focused_clip = clip;
        self.notify(EntityRef::SongView, EventKind::DetailClip);
    }

    pub fn advance_playhead(&mut self, clip: ClipRef, position: i32) {
        if let Some(c) = self.clip_mut(clip) {
            c.position = position;
            self.notify(clip.clip_entity(), EventKind::PlayingPosition);
        }
    }

    pub fn set_clip_color(&mut self, clip: ClipRef, color: u32) {
        if let Some(c) = self.clip_mut(clip) {
            c.color = color;
            self.notify(clip.clip_entity(), EventKind::Color);
        }
    }

    /// Select a device (and bank) on the selected track
    pub fn select_device(&mut self, device: Option<DeviceSelection>) {
        if let Some(track) = self.selected_track_mut() {
            track.selected_device = device;
            self.notify(EntityRef::SongView, EventKind::SelectedDevice);
        }
    }

    /// Meter reading of a track, return or the master
    pub fn set_meter(&mut self, strip: EntityRef, level: MeterLevel) {
        let track = match strip {
            EntityRef::Track(index) => self.session.tracks.get_mut(index),
            EntityRef::ReturnTrack(index) => self.session.returns.get_mut(index),
            EntityRef::Master => Some(&mut self.session.master),
            _ => None,
        };
        if let Some(track) = track {
            track.meter = level;
            self.notify(strip, EventKind::OutputMeter);
        }
    }

    /// Undo/redo availability has no listener; it is polled
    pub fn set_undo_state(&mut self, undo: UndoState) {
        self.undo = undo;
    }

    // Internals

    fn structural_change(&mut self) {
        debug!("Session structure changed ({} tracks)", self.session.tracks.len());
        self.release_vanished_listeners();
        if !self.notify(EntityRef::Song, EventKind::Tracks) {
            self.events.push(HostEvent::StructuralChange);
        }
    }

    /// Queue a notification for every listener on the key; returns whether
    /// any listener was attached.
    fn notify(&mut self, entity: EntityRef, kind: EventKind) -> bool {
        let mut fired: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|(_, (e, k))| *e == entity && *k == kind)
            .map(|(id, _)| *id)
            .collect();
        fired.sort();

        trace!("notify {:?}/{:?} -> {} listeners", entity, kind, fired.len());
        let any = !fired.is_empty();
        self.events.extend(fired.into_iter().map(HostEvent::Fired));
        any
    }

    /// Listeners on entities that no longer exist are released, as a DAW
    /// does when the object behind them is destroyed
    fn release_vanished_listeners(&mut self) {
        let listeners = std::mem::take(&mut self.listeners);
        let before = listeners.len();
        self.listeners = listeners
            .into_iter()
            .filter(|(_, (entity, _))| self.entity_exists(*entity))
            .collect();
        let released = before - self.listeners.len();
        if released > 0 {
            trace!("Released {} listeners on vanished entities", released);
        }
    }

    fn entity_exists(&self, entity: EntityRef) -> bool {
        match entity {
            EntityRef::Song | EntityRef::SongView | EntityRef::Master => true,
            EntityRef::Track(index) => index < self.session.tracks.len(),
            EntityRef::ReturnTrack(index) => index < self.session.returns.len(),
            EntityRef::ClipSlot { track, slot } => self.slot(ClipRef::new(track, slot)).is_some(),
            EntityRef::Clip { track, slot } => self.clip(ClipRef::new(track, slot)).is_some(),
        }
    }

    fn track(&self, selection: TrackSelection) -> Option<&MemoryTrack> {
        match selection {
            TrackSelection::Track(index) => self.session.tracks.get(index),
            TrackSelection::Return(index) => self.session.returns.get(index),
            TrackSelection::Master => Some(&self.session.master),
        }
    }

    fn selected_track_mut(&mut self) -> Option<&mut MemoryTrack> {
        match self.session.selected_track {
            TrackSelection::Track(index) => self.session.tracks.get_mut(index),
            TrackSelection::Return(index) => self.session.returns.get_mut(index),
            TrackSelection::Master => Some(&mut self.session.master),
        }
    }

    fn strip(&self, strip: EntityRef) -> Option<&MemoryTrack> {
        match strip {
            EntityRef::Track(index) => self.track(TrackSelection::Track(index)),
            EntityRef::ReturnTrack(index) => self.track(TrackSelection::Return(index)),
            EntityRef::Master => self.track(TrackSelection::Master),
            _ => None,
        }
    }

    fn slot(&self, clip: ClipRef) -> Option<&MemorySlot> {
        self.session.tracks.get(clip.track)?.slots.get(clip.slot)
    }

    fn slot_mut(&mut self, clip: ClipRef) -> Option<&mut MemorySlot> {
        self.session.tracks.get_mut(clip.track)?.slots.get_mut(clip.slot)
    }

    fn clip(&self, clip: ClipRef) -> Option<&MemoryClip> {
        self.slot(clip)?.clip.as_ref()
    }

    fn clip_mut(&mut self, clip: ClipRef) -> Option<&mut MemoryClip> {
        self.slot_mut(clip)?.clip.as_mut()
    }

    fn existing_slot_mut(&mut self, clip: ClipRef) -> HostResult<&mut MemorySlot> {
        self.slot_mut(clip)
            .ok_or(HostError::StaleEntity(clip.slot_entity()))
    }

    fn existing_clip_mut(&mut self, clip: ClipRef) -> HostResult<&mut MemoryClip> {
        self.clip_mut(clip)
            .ok_or(HostError::StaleEntity(clip.clip_entity()))
    }

    fn notes_changed(&mut self, clip: ClipRef) {
        self.undo.can_undo = true;
        self.notify(clip.clip_entity(), EventKind::Notes);
    }
}

fn following_note_id(id: u16) -> u16 {
    if id >= MAX_ID {
        0
    } else {
        id + 1
    }
}

/// Next id from `next` that is not in use. Ids wrap after [`MAX_ID`] so
/// they always fit the two-byte wire field.
fn allocate_note_id(next: &mut u16, in_use: impl Fn(u16) -> bool) -> HostResult<u16> {
    for _ in 0..=MAX_ID {
        let candidate = *next;
        *next = following_note_id(candidate);
        if !in_use(candidate) {
            return Ok(candidate);
        }
    }
    Err(HostError::Rejected {
        operation: "add_note",
        reason: "no free note id".to_string(),
    })
}

impl SessionHost for MemorySession {
    fn tracks(&self) -> Vec<TrackInfo> {
        self.session.tracks.iter().map(MemoryTrack::info).collect()
    }

    fn return_tracks(&self) -> Vec<TrackInfo> {
        self.session.returns.iter().map(MemoryTrack::info).collect()
    }

    fn master_track(&self) -> TrackInfo {
        self.session.master.info()
    }

    fn selected_track(&self) -> TrackSelection {
        self.session.selected_track
    }

    fn selected_scene(&self) -> Option<usize> {
        self.session.selected_scene
    }

    fn devices(&self, track: TrackSelection) -> Vec<DeviceNode> {
        self.track(track)
            .map(|t| t.devices.clone())
            .unwrap_or_default()
    }

    fn selected_device(&self) -> Option<DeviceSelection> {
        self.track(self.session.selected_track)?.selected_device
    }

    fn output_meter(&self, strip: EntityRef) -> HostResult<MeterLevel> {
        self.strip(strip)
            .map(|t| t.meter)
            .ok_or(HostError::StaleEntity(strip))
    }

    fn scale(&self) -> Scale {
        self.session.scale.clone()
    }

    fn undo_state(&self) -> UndoState {
        self.undo
    }

    fn focused_clip(&self) -> Option<ClipRef> {
        self.session.focused_clip
    }

    fn clip_metadata(&self, clip: ClipRef) -> HostResult<ClipMetadata> {
        self.clip(clip)
            .map(|c| c.metadata)
            .ok_or(HostError::StaleEntity(clip.clip_entity()))
    }

    fn clip_notes(&self, clip: ClipRef) -> HostResult<Option<Vec<NoteEvent>>> {
        let slot = self
            .slot(clip)
            .ok_or(HostError::StaleEntity(clip.slot_entity()))?;
        Ok(slot.clip.as_ref().map(|c| c.notes.clone()))
    }

    fn playing_position(&self, clip: ClipRef) -> HostResult<i32> {
        self.clip(clip)
            .map(|c| c.position)
            .ok_or(HostError::StaleEntity(clip.clip_entity()))
    }

    fn fire_slot(&mut self, clip: ClipRef) -> HostResult<()> {
        let slot = self.existing_slot_mut(clip)?;
        slot.playing = slot.clip.is_some();
        slot.triggered = false;
        self.notify(clip.slot_entity(), EventKind::PlayingStatus);
        Ok(())
    }

    fn stop_slot(&mut self, clip: ClipRef) -> HostResult<()> {
        let slot = self.existing_slot_mut(clip)?;
        slot.playing = false;
        slot.triggered = false;
        self.notify(clip.slot_entity(), EventKind::PlayingStatus);
        Ok(())
    }

    fn delete_clip(&mut self, clip: ClipRef) -> HostResult<()> {
        let slot = self.existing_slot_mut(clip)?;
        if slot.clip.take().is_none() {
            return Err(HostError::Rejected {
                operation: "delete_clip",
                reason: "slot is empty".to_string(),
            });
        }
        slot.playing = false;
        slot.recording = false;
        slot.triggered = false;
        self.undo.can_undo = true;
        self.release_vanished_listeners();
        self.notify(clip.slot_entity(), EventKind::HasClip);
        Ok(())
    }

    fn duplicate_clip_to(&mut self, from: ClipRef, to: ClipRef) -> HostResult<()> {
        let source = self
            .clip(from)
            .cloned()
            .ok_or(HostError::StaleEntity(from.clip_entity()))?;
        let target = self.existing_slot_mut(to)?;
        target.clip = Some(source);
        target.playing = false;
        self.undo.can_undo = true;
        self.notify(to.slot_entity(), EventKind::HasClip);
        Ok(())
    }

    fn duplicate_loop(&mut self, clip: ClipRef) -> HostResult<()> {
        let mut next_id = self.next_note_id;
        let target = self.existing_clip_mut(clip)?;
        let (loop_start, loop_end) = (target.metadata.loop_start, target.metadata.loop_end);

        let rejected = |reason: &str| HostError::Rejected {
            operation: "duplicate_loop",
            reason: reason.to_string(),
        };
        let length = loop_end
            .checked_sub(loop_start)
            .filter(|length| *length > 0)
            .ok_or_else(|| rejected("empty loop"))?;
        let new_end = loop_end
            .checked_add(length)
            .ok_or_else(|| rejected("loop out of range"))?;

        let originals: Vec<NoteEvent> = target
            .notes
            .iter()
            .filter(|n| n.start >= loop_start && n.start < loop_end)
            .cloned()
            .collect();
        let mut taken: HashSet<u16> = target.notes.iter().map(|n| n.id).collect();
        let mut copies = Vec::with_capacity(originals.len());
        for note in originals {
            let start = note
                .start
                .checked_add(length)
                .ok_or_else(|| rejected("loop out of range"))?;
            let id = allocate_note_id(&mut next_id, |id| taken.contains(&id))?;
            taken.insert(id);
            copies.push(NoteEvent { id, start, ..note });
        }
        target.notes.extend(copies);
        target.metadata.loop_end = new_end;
        target.metadata.end_marker = target.metadata.end_marker.max(new_end);

        self.next_note_id = next_id;
        self.notify(clip.clip_entity(), EventKind::Markers);
        self.notes_changed(clip);
        Ok(())
    }

    fn set_scale(&mut self, name: &str, root: u8) -> HostResult<()> {
        self.session.scale = Scale {
            name: name.to_string(),
            root,
        };
        self.notify(EntityRef::Song, EventKind::Scale);
        Ok(())
    }

    fn add_note(&mut self, clip: ClipRef, mut note: NoteEvent) -> HostResult<u16> {
        let mut next_id = self.next_note_id;
        let target = self.existing_clip_mut(clip)?;
        note.id = allocate_note_id(&mut next_id, |id| target.notes.iter().any(|n| n.id == id))?;
        let id = note.id;
        target.notes.push(note);
        self.next_note_id = next_id;
        self.notes_changed(clip);
        Ok(id)
    }

    fn remove_note(&mut self, clip: ClipRef, id: u16) -> HostResult<()> {
        let target = self.existing_clip_mut(clip)?;
        let before = target.notes.len();
        target.notes.retain(|n| n.id != id);
        if target.notes.len() == before {
            return Err(HostError::NoteNotFound(id));
        }
        self.notes_changed(clip);
        Ok(())
    }

    fn apply_note_modifications(
        &mut self,
        clip: ClipRef,
        notes: Vec<NoteEvent>,
    ) -> HostResult<()> {
        let target = self.existing_clip_mut(clip)?;
        target.notes = notes;
        self.notes_changed(clip);
        Ok(())
    }

    fn set_marker(&mut self, clip: ClipRef, marker: Marker, time: i32) -> HostResult<()> {
        let target = self.existing_clip_mut(clip)?;
        let metadata = &mut target.metadata;
        match marker {
            Marker::Start => metadata.start_marker = time,
            Marker::End => metadata.end_marker = time,
            Marker::LoopStart => metadata.loop_start = time,
            Marker::LoopEnd => metadata.loop_end = time,
        }
        self.notify(clip.clip_entity(), EventKind::Markers);
        Ok(())
    }

    fn add_listener(&mut self, entity: EntityRef, kind: EventKind) -> HostResult<ListenerId> {
        if !self.entity_exists(entity) {
            return Err(HostError::StaleEntity(entity));
        }

        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.insert(id, (entity, kind));
        *self.registrations.entry((entity, kind)).or_insert(0) += 1;
        Ok(id)
    }

    fn remove_listener(&mut self, id: ListenerId) -> HostResult<()> {
        match self.listeners.remove(&id) {
            Some(_) => Ok(()),
            None => Err(HostError::Rejected {
                operation: "remove_listener",
                reason: format!("unknown listener {}", id.0),
            }),
        }
    }

    fn drain_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::find_drum_pads;

    const FIXTURE: &str = r#"
tracks:
  - name: Drums
    color: 16711680
    midi_input: true
    devices:
      - name: Kit
        drum_pads: [Kick, Snare]
    slots:
      - clip:
          color: 65280
          notes:
            - { id: 3, pitch: 36, start: 0, duration: 250 }
      - {}
  - name: Bass
    audio_input: true
    group: grouped
    audio_output: false
    meter: { left: 0.25, right: 0.5 }
returns:
  - name: Reverb
selected_track: { kind: track, index: 0 }
focused_clip: { track: 0, slot: 0 }
scale: { name: Dorian, root: 2 }
"#;

    fn session() -> MemorySession {
        MemorySession::from_yaml_str(FIXTURE).unwrap()
    }

    #[test]
    fn test_fixture_loading() {
        let s = session();
        let tracks = s.tracks();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].name, "Drums");
        assert_eq!(tracks[0].color, 0xFF0000);
        assert!(tracks[0].slots[0].has_clip);
        assert!(!tracks[0].slots[1].has_clip);
        assert_eq!(tracks[1].group, GroupStatus::Grouped);
        assert_eq!(s.return_tracks()[0].name, "Reverb");
        assert_eq!(s.scale(), Scale { name: "Dorian".into(), root: 2 });
        assert_eq!(s.focused_clip(), Some(ClipRef::new(0, 0)));
        assert_eq!(s.devices(TrackSelection::Track(0))[0].name, "Kit");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");
        std::fs::write(&path, FIXTURE).unwrap();

        let s = MemorySession::load(&path).unwrap();
        assert_eq!(s.tracks().len(), 2);
        assert!(MemorySession::load(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_listener_on_missing_entity_fails() {
        let mut s = session();
        assert!(s.add_listener(EntityRef::Track(5), EventKind::Name).is_err());
        assert!(s
            .add_listener(EntityRef::Clip { track: 0, slot: 1 }, EventKind::Notes)
            .is_err());
        assert_eq!(s.listener_count(), 0);
    }

    #[test]
    fn test_mutation_fires_listener() {
        let mut s = session();
        let clip = ClipRef::new(0, 0);
        let id = s.add_listener(clip.clip_entity(), EventKind::Notes).unwrap();

        let new_id = s
            .add_note(
                clip,
                NoteEvent {
                    id: 0,
                    pitch: 38,
                    start: 500,
                    duration: 250,
                    velocity: 90,
                    mute: false,
                    probability: 1.0,
                },
            )
            .unwrap();

        assert_eq!(new_id, 4);
        assert_eq!(s.drain_events(), vec![HostEvent::Fired(id)]);
        assert!(s.drain_events().is_empty());
        assert!(s.undo_state().can_undo);
    }

    #[test]
    fn test_structural_change_without_song_listener() {
        let mut s = session();
        s.push_track(MemoryTrack::midi("Keys", 0, 2));
        assert_eq!(s.drain_events(), vec![HostEvent::StructuralChange]);

        let id = s.add_listener(EntityRef::Song, EventKind::Tracks).unwrap();
        s.remove_track(0);
        assert_eq!(s.drain_events(), vec![HostEvent::Fired(id)]);
    }

    #[test]
    fn test_demo_fixture_parses() {
        let s = MemorySession::from_yaml_str(include_str!("../../demo/session.yaml")).unwrap();
        assert_eq!(s.tracks().len(), 3);
        assert_eq!(s.return_tracks().len(), 2);
        assert_eq!(s.scale().root, 9);
        assert_eq!(
            find_drum_pads(&s.devices(TrackSelection::Track(0))).map(|p| p.len()),
            Some(4)
        );
    }

    #[test]
    fn test_vanished_entities_release_listeners() {
        let mut s = session();
        let clip = ClipRef::new(0, 0);
        s.add_listener(EntityRef::Track(1), EventKind::Name).unwrap();
        s.add_listener(clip.clip_entity(), EventKind::Notes).unwrap();
        assert_eq!(s.listener_count(), 2);

        s.delete_clip(clip).unwrap();
        assert_eq!(s.live_listeners(clip.clip_entity(), EventKind::Notes), 0);

        s.remove_track(1);
        assert_eq!(s.listener_count(), 0);
    }

    #[test]
    fn test_duplicate_loop_doubles_region() {
        let mut s = session();
        let clip = ClipRef::new(0, 0);
        s.duplicate_loop(clip).unwrap();

        let metadata = s.clip_metadata(clip).unwrap();
        assert_eq!(metadata.loop_end, 8000);
        assert_eq!(metadata.end_marker, 8000);

        let notes = s.clip_notes(clip).unwrap().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].start, 4000);
        assert_ne!(notes[0].id, notes[1].id);
    }

    #[test]
    fn test_note_ids_wrap_within_wire_range() {
        let mut s = session();
        let clip = ClipRef::new(0, 0);
        s.next_note_id = MAX_ID;
        let note = s.clip_notes(clip).unwrap().unwrap()[0].clone();

        assert_eq!(s.add_note(clip, note.clone()).unwrap(), MAX_ID);
        assert_eq!(s.add_note(clip, note.clone()).unwrap(), 0);
        assert_eq!(s.add_note(clip, note.clone()).unwrap(), 1);
        // 3 is already taken by the fixture note
        s.next_note_id = 3;
        assert_eq!(s.add_note(clip, note).unwrap(), 4);
    }

    #[test]
    fn test_duplicate_loop_rejects_out_of_range_loop() {
        let mut s = session();
        let clip = ClipRef::new(0, 0);
        s.set_marker(clip, Marker::LoopStart, i32::MIN).unwrap();
        s.set_marker(clip, Marker::LoopEnd, i32::MAX).unwrap();
        assert!(matches!(s.duplicate_loop(clip), Err(HostError::Rejected { .. })));

        s.set_marker(clip, Marker::LoopStart, 0).unwrap();
        s.set_marker(clip, Marker::LoopEnd, i32::MAX - 10).unwrap();
        assert!(matches!(s.duplicate_loop(clip), Err(HostError::Rejected { .. })));
        assert_eq!(s.clip_notes(clip).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_meters_and_device_selection() {
        let mut s = session();
        assert_eq!(
            s.output_meter(EntityRef::Track(1)).unwrap(),
            MeterLevel { left: 0.25, right: 0.5 }
        );
        assert!(!s.tracks()[1].has_audio_output);
        assert!(s.tracks()[0].has_audio_output);
        assert!(s.output_meter(EntityRef::ReturnTrack(4)).is_err());

        let meter = s.add_listener(EntityRef::Master, EventKind::OutputMeter).unwrap();
        let device = s.add_listener(EntityRef::SongView, EventKind::SelectedDevice).unwrap();
        s.set_meter(EntityRef::Master, MeterLevel { left: 1.0, right: 0.0 });
        s.select_device(Some(DeviceSelection { index: 0, bank: 1 }));

        assert_eq!(s.drain_events(), vec![HostEvent::Fired(meter), HostEvent::Fired(device)]);
        assert_eq!(s.selected_device(), Some(DeviceSelection { index: 0, bank: 1 }));
        s.select_track(TrackSelection::Track(1));
        assert_eq!(s.selected_device(), None);
    }

    #[test]
    fn test_delete_empty_slot_is_rejected() {
        let mut s = session();
        assert!(matches!(
            s.delete_clip(ClipRef::new(0, 1)),
            Err(HostError::Rejected { .. })
        ));
        assert!(matches!(
            s.delete_clip(ClipRef::new(9, 0)),
            Err(HostError::StaleEntity(_))
        ));
    }
}
