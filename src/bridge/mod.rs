//! Session bridge
//!
//! Owns everything one running bridge needs: the host session, the outbound
//! sink, the listener registry, the grid differ, the playing-note tracker and
//! the sync loop. Every entry point (inbound MIDI, queued host notifications,
//! timer ticks) is a `&mut self` method, so whoever owns the bridge
//! serializes them.

mod push;
mod subscribe;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::{AppConfig, HandshakeConfig};
use crate::differ::SnapshotDiffer;
use crate::dispatcher;
use crate::error::BridgeResult;
use crate::host::{ClipRef, HostEvent, SessionHost, UndoState};
use crate::midi::MidiMessage;
use crate::playback::NotePlayback;
use crate::protocol::{command_payload, WireSettings};
use crate::subscriptions::{Handler, SubscriptionRegistry};
use crate::sync_loop::{SyncLoop, Tick};
use crate::transport::MidiSink;

/// Upper bound on drain rounds after one entry point
const MAX_EVENT_ROUNDS: usize = 16;

/// Bridge settings taken from the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOptions {
    pub wire: WireSettings,
    pub handshake: HandshakeConfig,
    pub sync_interval: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for BridgeOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            wire: config.wire(),
            handshake: config.handshake.clone(),
            sync_interval: config.sync_interval(),
        }
    }
}

/// Which companion-app view is on screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewFlags {
    pub device: bool,
    pub mixer: bool,
}

impl ViewFlags {
    /// The clip grid shows whenever neither the device nor the mixer view does
    pub fn grid_visible(&self) -> bool {
        !self.device && !self.mixer
    }
}

/// Point-in-time summary, for status queries and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStatus {
    pub initialized: bool,
    pub subscriptions: usize,
    pub generation: u64,
    pub grid_rows: usize,
    pub sync_running: bool,
    pub sync_interval: Duration,
    pub views: ViewFlags,
}

pub struct SessionBridge<H: SessionHost> {
    host: H,
    sink: Arc<dyn MidiSink>,
    options: BridgeOptions,
    subscriptions: SubscriptionRegistry,
    differ: SnapshotDiffer,
    sync: SyncLoop,
    ticker: Option<Arc<dyn Tick>>,
    views: ViewFlags,
    initialized: bool,
    /// Clip whose note/marker/playhead listeners are attached
    focused: Option<ClipRef>,
    last_undo: Option<UndoState>,
    playback: NotePlayback,
    /// Clip the playing notes are mirrored from
    playing_clip: Option<ClipRef>,
}

impl<H: SessionHost> SessionBridge<H> {
    pub fn new(host: H, sink: Arc<dyn MidiSink>, options: BridgeOptions) -> Self {
        let sync = SyncLoop::new(options.sync_interval);
        Self {
            host,
            sink,
            options,
            subscriptions: SubscriptionRegistry::new(),
            differ: SnapshotDiffer::new(),
            sync,
            ticker: None,
            views: ViewFlags::default(),
            initialized: false,
            focused: None,
            last_undo: None,
            playback: NotePlayback::new(),
            playing_clip: None,
        }
    }

    /// Work the sync loop runs on each firing
    pub fn set_ticker(&mut self, ticker: Arc<dyn Tick>) {
        self.ticker = Some(ticker);
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn views(&self) -> ViewFlags {
        self.views
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn sync_loop(&self) -> &SyncLoop {
        &self.sync
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            initialized: self.initialized,
            subscriptions: self.subscriptions.len(),
            generation: self.subscriptions.generation(),
            grid_rows: self.differ.previous().len(),
            sync_running: self.sync.is_running(),
            sync_interval: self.sync.interval(),
            views: self.views,
        }
    }

    /// Apply a reloaded configuration. Framing and interval changes take
    /// effect immediately.
    pub fn reconfigure(&mut self, config: &AppConfig) {
        let options = BridgeOptions::from(config);
        if options.wire != self.options.wire {
            info!(
                "Wire settings changed: device {:#04X}, chunk {} bytes",
                options.wire.device_id, options.wire.max_chunk_bytes
            );
        }
        self.sync.set_interval(options.sync_interval);
        self.options = options;
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Inbound MIDI from the companion app
    pub fn handle_midi(&mut self, raw: &[u8]) {
        let channel = self.options.handshake.channel;

        match MidiMessage::parse(raw) {
            Some(MidiMessage::SysEx { .. }) => match command_payload(raw) {
                Some(payload) => dispatcher::handle_payload(&mut self.host, payload),
                None => debug!("Dropping empty SysEx"),
            },
            Some(MidiMessage::NoteOn { channel: ch, note, .. }) if ch == channel => {
                self.on_control_note(note, true)
            }
            Some(MidiMessage::NoteOff { channel: ch, note, .. }) if ch == channel => {
                self.on_control_note(note, false)
            }
            Some(other) => trace!("Ignoring {}", other),
            None => debug!("Dropping unparseable MIDI: {:02X?}", raw),
        }

        self.pump_events();
    }

    /// The track graph changed shape: every index may now name something
    /// else, so listeners are re-established and track state re-sent.
    pub fn on_structural_change(&mut self) {
        if !self.initialized {
            return;
        }

        debug!("Structural change");
        self.resubscribe_all();
        self.log_push("tracks", Self::push_tracks);
        self.log_push("returns", Self::push_return_tracks);
        self.log_push("selection", Self::push_selection);
        self.log_push("grid", Self::push_grid_diff);
    }

    /// One sync loop firing: host notifications queued since the last entry
    /// point, then the grid diff when the grid is on screen and the undo/redo
    /// state when it changed since the last tick.
    pub fn tick(&mut self) -> BridgeResult<()> {
        if !self.initialized {
            return Ok(());
        }

        self.pump_events();
        if self.views.grid_visible() {
            self.push_grid_diff()?;
        }
        self.push_undo_state_if_changed()?;
        Ok(())
    }

    /// Silence mirrored notes, detach every listener, then stop the loop
    pub fn teardown(&mut self) {
        self.log_push("playing notes", Self::release_playing_notes);
        let detached = self.subscriptions.unsubscribe_everything(&mut self.host);
        self.sync.stop();
        self.focused = None;
        self.initialized = false;
        info!("Bridge torn down ({} listeners detached)", detached);
    }

    // ------------------------------------------------------------------
    // Handshake and view notes
    // ------------------------------------------------------------------

    fn on_control_note(&mut self, note: u8, on: bool) {
        let hs = &self.options.handshake;

        if note == hs.connect_note {
            if on {
                self.handshake();
            }
        } else if note == hs.resend_note {
            if on && self.initialized {
                self.resend_project();
            }
        } else if note == hs.device_view_note {
            let was_visible = self.views.device;
            self.views.device = on;
            debug!("Device view {}", if on { "shown" } else { "hidden" });
            if !self.initialized || on == was_visible {
                return;
            }
            if on {
                self.log_push("clip", Self::push_clip_state);
            } else {
                self.log_push("playing notes", Self::release_playing_notes);
            }
        } else if note == hs.mixer_view_note {
            let was_visible = self.views.mixer;
            self.views.mixer = on;
            debug!("Mixer view {}", if on { "shown" } else { "hidden" });
            if !self.initialized || on == was_visible {
                return;
            }
            if on {
                self.log_push("meters", Self::push_all_meters);
            } else {
                self.log_push("meters", Self::reset_meters);
            }
        } else {
            trace!("Unmapped control note {}", note);
        }
    }

    /// Confirm the connection; the first handshake also bootstraps the
    /// session.
    fn handshake(&mut self) {
        let hs = &self.options.handshake;
        let confirm = MidiMessage::NoteOn {
            channel: hs.confirm_channel,
            note: hs.confirm_note,
            velocity: hs.confirm_velocity,
        };
        if let Err(e) = self.sink.send(&confirm.encode()) {
            warn!("Handshake confirmation failed: {}", e);
        }

        if self.initialized {
            debug!("Handshake confirmed (already initialized)");
            return;
        }

        info!("Companion app connected, initializing session");
        self.initialized = true;
        self.differ.reset();
        self.last_undo = None;
        self.resubscribe_all();
        self.log_push("project", Self::push_project);

        match &self.ticker {
            Some(ticker) => {
                self.sync.start(ticker.clone());
            }
            None => debug!("No ticker attached, sync loop not started"),
        }
    }

    /// Forget the grid baseline and send everything again
    fn resend_project(&mut self) {
        info!("Resending project");
        self.differ.reset();
        self.log_push("tracks", Self::push_tracks);
        self.log_push("returns", Self::push_return_tracks);
        self.log_push("grid", Self::push_grid_diff);
    }

    // ------------------------------------------------------------------
    // Host events
    // ------------------------------------------------------------------

    /// Drain queued host notifications until the host is quiet
    pub fn pump_events(&mut self) {
        for _ in 0..MAX_EVENT_ROUNDS {
            let events = self.host.drain_events();
            if events.is_empty() {
                return;
            }
            self.handle_batch(events);
        }
        warn!(
            "Host still busy after {} rounds, deferring remaining events",
            MAX_EVENT_ROUNDS
        );
    }

    /// Run each distinct handler of a batch once, in first-seen order.
    /// Handlers are resolved before a structural change re-attaches the
    /// listeners that fired.
    fn handle_batch(&mut self, events: Vec<HostEvent>) {
        let mut structural = false;
        let mut handlers = Vec::new();
        let mut seen = HashSet::new();

        for event in events {
            match event {
                HostEvent::StructuralChange => structural = true,
                HostEvent::Fired(id) => match self.subscriptions.handler_for(id) {
                    Some((_, Handler::Structure)) => structural = true,
                    Some((entity, handler)) => {
                        trace!("Listener {:?} on {:?} -> {:?}", id, entity, handler);
                        if seen.insert(handler) {
                            handlers.push(handler);
                        }
                    }
                    None => trace!("Listener {:?} is not ours (anymore)", id),
                },
            }
        }

        if structural {
            self.on_structural_change();
        }
        for handler in handlers {
            self.run_handler(handler);
        }
    }

    fn run_handler(&mut self, handler: Handler) {
        if !self.initialized {
            return;
        }

        match handler {
            Handler::Structure => self.on_structural_change(),
            Handler::TrackNames => self.log_push("track names", Self::push_track_names),
            Handler::TrackColors => self.log_push("track colors", Self::push_track_colors),
            Handler::ReturnNames | Handler::ReturnColors => {
                self.log_push("returns", Self::push_return_tracks)
            }
            Handler::Selection => {
                self.log_push("selection", Self::push_selection);
                self.log_push("selected slot", Self::push_selected_slot);
                self.log_push("devices", Self::push_devices);
                self.log_push("playing notes", Self::release_playing_notes);
                self.refresh_clip_listeners();
            }
            Handler::SelectedScene => self.log_push("selected slot", Self::push_selected_slot),
            Handler::Scale => self.log_push("scale", Self::push_scale),
            Handler::FocusedClip => self.refresh_focused_clip(),
            Handler::Devices => self.log_push("devices", Self::push_devices),
            Handler::GridSlot => {
                if self.views.grid_visible() {
                    self.log_push("grid", Self::push_grid_diff);
                }
            }
            Handler::SlotContent => {
                self.sync_clip_listeners();
                if self.views.grid_visible() {
                    self.log_push("grid", Self::push_grid_diff);
                }
            }
            Handler::ClipNotes => {
                if self.views.device {
                    self.log_push("notes", Self::push_notes);
                }
            }
            Handler::ClipMarkers => {
                if self.views.device {
                    self.log_push("clip metadata", Self::push_metadata);
                }
            }
            Handler::ClipPosition(clip) => {
                if !self.views.device {
                    return;
                }
                if self.focused == Some(clip) {
                    self.log_push("playhead", Self::push_playhead);
                }
                if let Err(e) = self.push_playing_notes(clip) {
                    warn!("Failed to push playing notes: {}", e);
                }
            }
            Handler::Meter(strip) => {
                if self.views.mixer {
                    if let Err(e) = self.push_meter(strip) {
                        warn!("Failed to push meter: {}", e);
                    }
                }
            }
        }
    }

    /// Run a push outside the tick; failures are logged and dropped
    fn log_push(&mut self, what: &str, push: fn(&mut Self) -> BridgeResult<()>) {
        if let Err(e) = push(self) {
            warn!("Failed to push {}: {}", what, e);
        }
    }
}
