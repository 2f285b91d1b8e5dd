//! Listener passes over the host session

use tracing::debug;

use super::SessionBridge;
use crate::host::{ClipRef, EntityRef, EventKind, SessionHost, TrackSelection};
use crate::subscriptions::Handler;

/// Listeners that only the focused clip carries
const FOCUSED_CLIP_KINDS: [EventKind; 3] =
    [EventKind::Notes, EventKind::Markers, EventKind::PlayingPosition];

impl<H: SessionHost> SessionBridge<H> {
    /// Walk the whole session and make sure each watched property has
    /// exactly one listener. Entries the walk does not reach are detached.
    pub(super) fn resubscribe_all(&mut self) {
        let generation = self.subscriptions.begin_pass();

        let current = self.host.focused_clip();
        if current != self.focused {
            self.release_focused_clip();
            self.focused = current;
        }

        let host: &mut dyn SessionHost = &mut self.host;
        let registry = &mut self.subscriptions;

        let song = [
            (EntityRef::Song, EventKind::Tracks, Handler::Structure),
            (EntityRef::Song, EventKind::ReturnTracks, Handler::Structure),
            (EntityRef::Song, EventKind::Scale, Handler::Scale),
            (EntityRef::SongView, EventKind::SelectedTrack, Handler::Selection),
            (EntityRef::SongView, EventKind::SelectedScene, Handler::SelectedScene),
            (EntityRef::SongView, EventKind::DetailClip, Handler::FocusedClip),
            (EntityRef::SongView, EventKind::SelectedDevice, Handler::Devices),
            (EntityRef::Master, EventKind::Color, Handler::ReturnColors),
            (EntityRef::Master, EventKind::OutputMeter, Handler::Meter(EntityRef::Master)),
        ];
        for (entity, kind, handler) in song {
            registry.ensure_subscribed(host, entity, kind, handler);
        }

        let tracks = host.tracks();
        for (index, track) in tracks.iter().enumerate() {
            let entity = EntityRef::Track(index);
            registry.ensure_subscribed(host, entity, EventKind::Name, Handler::TrackNames);
            registry.ensure_subscribed(host, entity, EventKind::Color, Handler::TrackColors);
            registry.ensure_subscribed(host, entity, EventKind::Devices, Handler::Devices);
            let meter = Handler::Meter(entity);
            registry.ensure_subscribed(host, entity, EventKind::OutputMeter, meter);

            for slot in 0..track.slots.len() {
                let entity = EntityRef::ClipSlot { track: index, slot };
                let watched = [
                    (EventKind::HasClip, Handler::SlotContent),
                    (EventKind::PlayingStatus, Handler::GridSlot),
                ];
                for (kind, handler) in watched {
                    registry.ensure_subscribed(host, entity, kind, handler);
                }
            }
        }

        for index in 0..host.return_tracks().len() {
            let entity = EntityRef::ReturnTrack(index);
            registry.ensure_subscribed(host, entity, EventKind::Name, Handler::ReturnNames);
            registry.ensure_subscribed(host, entity, EventKind::Color, Handler::ReturnColors);
            let meter = Handler::Meter(entity);
            registry.ensure_subscribed(host, entity, EventKind::OutputMeter, meter);
        }

        self.subscribe_focused_clip();
        self.sync_clip_listeners();

        let dropped = self.subscriptions.finish_pass(&mut self.host);
        debug!(
            "Subscription pass {}: {} live, {} dropped",
            generation,
            self.subscriptions.len(),
            dropped
        );
    }

    /// The detail view moved to another clip: move the clip listeners along
    pub(super) fn refresh_focused_clip(&mut self) {
        let current = self.host.focused_clip();
        if current != self.focused {
            self.release_focused_clip();
            debug!("Focused clip: {:?}", current);
            self.focused = current;
        }
        self.subscribe_focused_clip();
        // The old clip may still need its position listener for playing notes
        self.sync_clip_listeners();

        if self.views.device {
            self.log_push("clip", Self::push_clip_state);
        }
    }

    /// The selected track changed: playing-note listeners follow it
    pub(super) fn refresh_clip_listeners(&mut self) {
        let playing_track = self.playing_notes_track();
        let focused = self.focused;
        let moved = self.subscriptions.unsubscribe_matching(&mut self.host, |(entity, kind)| {
            let EntityRef::Clip { track, slot } = *entity else {
                return false;
            };
            *kind == EventKind::PlayingPosition
                && Some(track) != playing_track
                && focused != Some(ClipRef::new(track, slot))
        });
        if moved > 0 {
            debug!("Detached {} position listeners of the previous track", moved);
        }
        self.sync_clip_listeners();
    }

    /// Clip-level listeners for every slot: color on every clip, playing
    /// position on the clips of the selected MIDI track. Empty slots carry
    /// none, so a clip created later starts from a clean key.
    pub(super) fn sync_clip_listeners(&mut self) {
        let playing_track = self.playing_notes_track();
        let tracks = self.host.tracks();
        let host: &mut dyn SessionHost = &mut self.host;
        let registry = &mut self.subscriptions;

        for (index, track) in tracks.iter().enumerate() {
            for (slot, info) in track.slots.iter().enumerate() {
                let clip = ClipRef::new(index, slot);
                let entity = clip.clip_entity();
                if !info.has_clip {
                    registry.unsubscribe_all(host, entity);
                    continue;
                }

                registry.ensure_subscribed(host, entity, EventKind::Color, Handler::GridSlot);
                if playing_track == Some(index) {
                    let handler = Handler::ClipPosition(clip);
                    registry.ensure_subscribed(host, entity, EventKind::PlayingPosition, handler);
                }
            }
        }
    }

    /// Notes, markers and playhead of the focused clip. An empty slot has no
    /// clip to listen to; the host refuses and nothing is attached.
    fn subscribe_focused_clip(&mut self) {
        let Some(clip) = self.focused else {
            return;
        };
        let entity = clip.clip_entity();
        let watched = [
            (EventKind::Notes, Handler::ClipNotes),
            (EventKind::Markers, Handler::ClipMarkers),
            (EventKind::PlayingPosition, Handler::ClipPosition(clip)),
        ];
        for (kind, handler) in watched {
            self.subscriptions
                .ensure_subscribed(&mut self.host, entity, kind, handler);
        }
    }

    /// Detach the listeners the focused clip carried because it was focused
    fn release_focused_clip(&mut self) {
        let Some(previous) = self.focused.take() else {
            return;
        };
        let entity = previous.clip_entity();
        self.subscriptions.unsubscribe_matching(&mut self.host, |(e, kind)| {
            *e == entity && FOCUSED_CLIP_KINDS.contains(kind)
        });
    }

    /// Index of the selected track when it takes MIDI input
    fn playing_notes_track(&self) -> Option<usize> {
        match self.host.selected_track() {
            TrackSelection::Track(index)
                if self
                    .host
                    .tracks()
                    .get(index)
                    .is_some_and(|t| t.has_midi_input) =>
            {
                Some(index)
            }
            _ => None,
        }
    }
}
