//! Outbound state pushes
//!
//! Each `push_*` reads the current host state and sends one or more tagged
//! SysEx payloads. Text payloads go through the lenient ASCII encoder.

use tracing::{debug, trace};

use super::SessionBridge;
use crate::differ::{deletion_payload, row_payload, GridSnapshot};
use crate::error::BridgeResult;
use crate::host::devices::device_names;
use crate::host::{
    color_string, find_drum_pads, ClipRef, EntityRef, MeterLevel, SessionHost, TrackInfo,
    TrackSelection,
};
use crate::midi::MidiMessage;
use crate::protocol::{encode3, encode_text, OutboundTag};
use crate::serializer::{serialize_metadata, serialize_notes};

/// Text sent on the selected-track tags when nothing matches
const NOT_FOUND: &str = "not found";
const NONE_SELECTED: &str = "none selected";

/// Meter CCs (raw channels): controller = strip index, value = level x 100
const METER_LEFT_CHANNEL: u8 = 9;
const METER_RIGHT_CHANNEL: u8 = 10;

fn meter_value(level: f32) -> u8 {
    (level * 100.0).round().clamp(0.0, 127.0) as u8
}

fn names(tracks: &[TrackInfo]) -> String {
    tracks
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn colors<'a>(tracks: impl IntoIterator<Item = &'a TrackInfo>) -> String {
    tracks
        .into_iter()
        .map(|t| color_string(t.color))
        .collect::<Vec<_>>()
        .join("-")
}

/// `<audio input><group code>` per track
fn capabilities(tracks: &[TrackInfo]) -> String {
    tracks
        .iter()
        .map(|t| format!("{}{}", u8::from(t.has_audio_input), t.group.code()))
        .collect::<Vec<_>>()
        .join(",")
}

impl<H: SessionHost> SessionBridge<H> {
    /// Frame, chunk and write one payload
    pub(super) fn send(&self, tag: OutboundTag, payload: &[u8]) -> BridgeResult<()> {
        let frames = self.options.wire.encode(tag, payload);
        trace!("Pushing {} ({} bytes, {} frames)", tag, payload.len(), frames.len());
        for frame in frames {
            self.sink.send(&frame)?;
        }
        Ok(())
    }

    pub(super) fn send_text(&self, tag: OutboundTag, text: &str) -> BridgeResult<()> {
        self.send(tag, &encode_text(text))
    }

    /// Everything the companion app needs after connecting
    pub(super) fn push_project(&mut self) -> BridgeResult<()> {
        self.push_tracks()?;
        self.push_return_tracks()?;
        self.push_selection()?;
        self.push_selected_slot()?;
        self.push_scale()?;
        self.push_devices()?;
        self.push_grid_diff()?;
        self.push_undo_state_if_changed()?;
        if self.views.device {
            self.push_clip_state()?;
        }
        Ok(())
    }

    pub(super) fn push_tracks(&mut self) -> BridgeResult<()> {
        self.push_track_names()?;
        self.push_track_colors()
    }

    /// Names plus the capability list, which is keyed by the same indices
    pub(super) fn push_track_names(&mut self) -> BridgeResult<()> {
        let tracks = self.host.tracks();
        self.send_text(OutboundTag::TrackNames, &names(&tracks))?;
        self.send_text(OutboundTag::TrackCapabilities, &capabilities(&tracks))
    }

    pub(super) fn push_track_colors(&mut self) -> BridgeResult<()> {
        let tracks = self.host.tracks();
        self.send_text(OutboundTag::TrackColors, &colors(&tracks))
    }

    /// Return names, then return colors with the master color appended
    pub(super) fn push_return_tracks(&mut self) -> BridgeResult<()> {
        let returns = self.host.return_tracks();
        let master = self.host.master_track();
        self.send_text(OutboundTag::ReturnTrackNames, &names(&returns))?;
        self.send_text(
            OutboundTag::ReturnTrackColors,
            &colors(returns.iter().chain(std::iter::once(&master))),
        )
    }

    /// Selected track, selected return (or master) and its MIDI input flag
    pub(super) fn push_selection(&mut self) -> BridgeResult<()> {
        let tracks = self.host.tracks();
        let selection = self.host.selected_track();

        let (track, ret, midi_input) = match selection {
            TrackSelection::Track(index) => match tracks.get(index) {
                Some(track) => (index.to_string(), NONE_SELECTED.to_string(), track.has_midi_input),
                None => (NOT_FOUND.to_string(), NONE_SELECTED.to_string(), false),
            },
            TrackSelection::Return(index) => (NOT_FOUND.to_string(), index.to_string(), false),
            TrackSelection::Master => (
                NOT_FOUND.to_string(),
                self.host.return_tracks().len().to_string(),
                false,
            ),
        };

        self.send_text(OutboundTag::SelectedTrack, &track)?;
        self.send_text(OutboundTag::SelectedReturn, &ret)?;
        self.send_text(
            OutboundTag::MidiInputFlag,
            if midi_input { "1" } else { "0" },
        )
    }

    pub(super) fn push_selected_slot(&mut self) -> BridgeResult<()> {
        let scene = match self.host.selected_scene() {
            Some(index) => index.to_string(),
            None => NOT_FOUND.to_string(),
        };
        self.send_text(OutboundTag::SelectedClipSlot, &scene)
    }

    pub(super) fn push_scale(&mut self) -> BridgeResult<()> {
        let scale = self.host.scale();
        self.send_text(
            OutboundTag::ScaleRoot,
            &format!("{};{}", scale.name, scale.root),
        )
    }

    /// Device chain of the selected track, the first drum rack's pads
    /// (empty when there is none), then the device page
    pub(super) fn push_devices(&mut self) -> BridgeResult<()> {
        let devices = self.host.devices(self.host.selected_track());
        self.send_text(OutboundTag::DeviceList, &device_names(&devices))?;

        let pads = find_drum_pads(&devices);
        let has_drums = u8::from(pads.is_some());
        self.send_text(
            OutboundTag::DrumPadNames,
            &pads.map(|pads| pads.join(",")).unwrap_or_default(),
        )?;

        let page = self
            .host
            .selected_device()
            .and_then(|selection| Some((selection, devices.get(selection.index)?)));
        match page {
            Some((selection, device)) => {
                let bank = device
                    .banks
                    .get(selection.bank)
                    .map(|b| b.name.as_str())
                    .unwrap_or_default();
                self.send_text(OutboundTag::BankName, &format!("{};{}", bank, has_drums))?;
                self.send_text(OutboundTag::BankNames, &device.bank_names())?;
                self.send_text(OutboundTag::SelectedDevice, &selection.index.to_string())?;
                self.send_text(
                    OutboundTag::ParameterNames,
                    &device.parameter_names(selection.bank),
                )
            }
            None => {
                self.send_text(OutboundTag::BankName, &format!(";{}", has_drums))?;
                self.send_text(OutboundTag::BankNames, "")?;
                self.send_text(OutboundTag::ParameterNames, "")
            }
        }
    }

    /// Rows that changed since the last push, then deleted rows
    pub(super) fn push_grid_diff(&mut self) -> BridgeResult<()> {
        let snapshot = GridSnapshot::capture(&self.host.tracks());
        let diff = self.differ.diff(snapshot);
        if diff.is_empty() {
            return Ok(());
        }

        debug!(
            "Grid diff: {} changed, {} deleted",
            diff.changed.len(),
            diff.deleted.len()
        );
        let rows = &self.differ.previous().rows;
        for &index in &diff.changed {
            if let Some(row) = rows.get(index) {
                self.send_text(OutboundTag::ClipGridRow, &row_payload(index, row))?;
            }
        }
        for &index in &diff.deleted {
            self.send_text(OutboundTag::ClipGridRow, &deletion_payload(index))?;
        }
        Ok(())
    }

    /// Notes, metadata and playhead of the focused clip
    pub(super) fn push_clip_state(&mut self) -> BridgeResult<()> {
        self.push_notes()?;
        self.push_metadata()?;
        self.push_playhead()
    }

    /// Notes of the focused clip; an empty slot sends the sentinel
    pub(super) fn push_notes(&mut self) -> BridgeResult<()> {
        let Some(clip) = self.focused else {
            return Ok(());
        };
        match self.host.clip_notes(clip) {
            Ok(notes) => self.send(OutboundTag::ClipNotes, &serialize_notes(notes.as_deref())),
            Err(e) => {
                debug!("Skipping notes push: {}", e);
                Ok(())
            }
        }
    }

    pub(super) fn push_metadata(&mut self) -> BridgeResult<()> {
        let Some(clip) = self.focused else {
            return Ok(());
        };
        match self.host.clip_metadata(clip) {
            Ok(metadata) => self.send(OutboundTag::ClipMetadata, &serialize_metadata(&metadata)),
            Err(e) => {
                debug!("Skipping metadata push: {}", e);
                Ok(())
            }
        }
    }

    pub(super) fn push_playhead(&mut self) -> BridgeResult<()> {
        let Some(clip) = self.focused else {
            return Ok(());
        };
        match self.host.playing_position(clip) {
            Ok(position) => self.send(OutboundTag::PlayheadPosition, &encode3(position)),
            Err(e) => {
                trace!("Skipping playhead push: {}", e);
                Ok(())
            }
        }
    }

    /// Note-ons and note-offs for the playhead of `clip`, which must sit on
    /// the selected MIDI track
    pub(super) fn push_playing_notes(&mut self, clip: ClipRef) -> BridgeResult<()> {
        let on_selected_midi_track = self.host.selected_track()
            == TrackSelection::Track(clip.track)
            && self
                .host
                .tracks()
                .get(clip.track)
                .is_some_and(|t| t.has_midi_input);
        if !on_selected_midi_track {
            return Ok(());
        }
        if self.playing_clip != Some(clip) {
            self.release_playing_notes()?;
            self.playing_clip = Some(clip);
        }

        let state = self.host.clip_notes(clip).and_then(|notes| {
            Ok((
                notes,
                self.host.clip_metadata(clip)?,
                self.host.playing_position(clip)?,
            ))
        });
        let (notes, metadata, position) = match state {
            Ok((Some(notes), metadata, position)) => (notes, metadata, position),
            Ok((None, ..)) => return Ok(()),
            Err(e) => {
                trace!("Skipping playing notes: {}", e);
                return Ok(());
            }
        };

        for message in self.playback.advance(&notes, &metadata, position) {
            self.sink.send(&message.encode())?;
        }
        Ok(())
    }

    /// Note-off for every mirrored note still sounding
    pub(super) fn release_playing_notes(&mut self) -> BridgeResult<()> {
        self.playing_clip = None;
        for message in self.playback.release_all() {
            self.sink.send(&message.encode())?;
        }
        Ok(())
    }

    /// Left and right output level of one strip. Strips are numbered tracks
    /// first, then returns, then the master.
    pub(super) fn push_meter(&mut self, strip: EntityRef) -> BridgeResult<()> {
        let tracks = self.host.tracks();
        let returns = self.host.return_tracks();
        let (index, info) = match strip {
            EntityRef::Track(i) => (i, tracks.get(i).cloned()),
            EntityRef::ReturnTrack(i) => (tracks.len() + i, returns.get(i).cloned()),
            EntityRef::Master => (tracks.len() + returns.len(), Some(self.host.master_track())),
            _ => return Ok(()),
        };
        let Some(info) = info else {
            return Ok(());
        };

        let level = if info.has_audio_output {
            match self.host.output_meter(strip) {
                Ok(level) => level,
                Err(e) => {
                    trace!("Skipping meter: {}", e);
                    return Ok(());
                }
            }
        } else {
            MeterLevel::default()
        };
        self.send_meter(index, meter_value(level.left), meter_value(level.right))
    }

    /// Current level of every strip
    pub(super) fn push_all_meters(&mut self) -> BridgeResult<()> {
        let strips = (0..self.host.tracks().len())
            .map(EntityRef::Track)
            .chain((0..self.host.return_tracks().len()).map(EntityRef::ReturnTrack))
            .chain(std::iter::once(EntityRef::Master))
            .collect::<Vec<_>>();
        for strip in strips {
            self.push_meter(strip)?;
        }
        Ok(())
    }

    /// Zero every strip once the mixer is hidden
    pub(super) fn reset_meters(&mut self) -> BridgeResult<()> {
        let strips = self.host.tracks().len() + self.host.return_tracks().len() + 1;
        for index in 0..strips {
            self.send_meter(index, 0, 0)?;
        }
        Ok(())
    }

    fn send_meter(&self, index: usize, left: u8, right: u8) -> BridgeResult<()> {
        // One controller per strip; strips past the last controller have no meter
        let Some(cc) = u8::try_from(index).ok().filter(|cc| *cc <= 0x7F) else {
            return Ok(());
        };
        for (channel, value) in [(METER_LEFT_CHANNEL, left), (METER_RIGHT_CHANNEL, right)] {
            let message = MidiMessage::ControlChange { channel, cc, value };
            self.sink.send(&message.encode())?;
        }
        Ok(())
    }

    /// `[can_undo, can_redo]`, only when it differs from the last push
    pub(super) fn push_undo_state_if_changed(&mut self) -> BridgeResult<()> {
        let state = self.host.undo_state();
        if self.last_undo == Some(state) {
            return Ok(());
        }
        self.send(
            OutboundTag::UndoRedoState,
            &[u8::from(state.can_undo), u8::from(state.can_redo)],
        )?;
        self.last_undo = Some(state);
        Ok(())
    }
}
