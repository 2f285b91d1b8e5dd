//! Tests for the session bridge

use super::*;
use crate::error::BridgeError;
use crate::host::memory::{MemoryClip, MemorySlot, MemoryTrack, SessionFixture};
use crate::host::{
    DeviceNode, DeviceSelection, EntityRef, EventKind, MemorySession, MeterLevel, TrackSelection,
};
use crate::protocol::{encode3, parse_frame, OutboundTag, Reassembler};
use crate::serializer::{decode_note_records, NoteEvent, EMPTY_CLIP_SENTINEL};
use crate::transport::{ClosedSink, RecordingSink};

const HANDSHAKE: [u8; 3] = [0x9F, 94, 127];
const RESEND: [u8; 3] = [0x9F, 88, 127];
const DEVICE_VIEW_ON: [u8; 3] = [0x9F, 89, 127];
const MIXER_VIEW_ON: [u8; 3] = [0x9F, 90, 127];
const DEVICE_VIEW_OFF: [u8; 3] = [0x8F, 89, 0];
const MIXER_VIEW_OFF: [u8; 3] = [0x8F, 90, 0];

fn note(id: u16, pitch: u8, start: i32) -> NoteEvent {
    NoteEvent {
        id,
        pitch,
        start,
        duration: 250,
        velocity: 100,
        mute: false,
        probability: 1.0,
    }
}

fn make_fixture(notes: Vec<NoteEvent>) -> SessionFixture {
    let mut drums = MemoryTrack::midi("Drums", 0xFF0000, 2);
    drums.devices = vec![DeviceNode::drum_rack("Kit", &["Kick", "Snare"])];
    drums.slots[0] = MemorySlot::with_clip(MemoryClip {
        color: 0x00FF00,
        notes,
        ..Default::default()
    });

    let mut bass = MemoryTrack::midi("Bass", 0x0000FF, 2);
    bass.midi_input = false;
    bass.audio_input = true;
    bass.audio_output = false;

    SessionFixture {
        tracks: vec![drums, bass, MemoryTrack::midi("Keys", 0x00FF00, 2)],
        returns: vec![MemoryTrack::midi("Reverb", 0x808080, 0)],
        master: MemoryTrack {
            name: "Master".to_string(),
            color: 0xFFFFFF,
            ..Default::default()
        },
        focused_clip: Some(ClipRef::new(0, 0)),
        ..Default::default()
    }
}

fn make_session(notes: Vec<NoteEvent>) -> MemorySession {
    MemorySession::new(make_fixture(notes))
}

fn make_bridge() -> (SessionBridge<MemorySession>, RecordingSink) {
    make_bridge_with(make_session(vec![note(1, 36, 0)]))
}

fn make_bridge_with(session: MemorySession) -> (SessionBridge<MemorySession>, RecordingSink) {
    let sink = RecordingSink::new();
    let bridge = SessionBridge::new(session, Arc::new(sink.clone()), BridgeOptions::default());
    (bridge, sink)
}

fn connected() -> (SessionBridge<MemorySession>, RecordingSink) {
    let (mut bridge, sink) = make_bridge();
    bridge.handle_midi(&HANDSHAKE);
    sink.clear();
    (bridge, sink)
}

/// Reassembled payloads per frame tag, in send order
fn payloads(sink: &RecordingSink) -> Vec<(OutboundTag, Vec<u8>)> {
    let mut reassembler = Reassembler::new(250);
    sink.take()
        .iter()
        .filter_map(|raw| parse_frame(raw))
        .filter_map(|frame| {
            let payload = reassembler.push(frame.tag, frame.body)?;
            Some((OutboundTag::from_byte(frame.tag)?, payload))
        })
        .collect()
}

fn texts(all: &[(OutboundTag, Vec<u8>)], tag: OutboundTag) -> Vec<String> {
    all.iter()
        .filter(|(t, _)| *t == tag)
        .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
        .collect()
}

fn binaries(all: &[(OutboundTag, Vec<u8>)], tag: OutboundTag) -> Vec<Vec<u8>> {
    all.iter()
        .filter(|(t, _)| *t == tag)
        .map(|(_, p)| p.clone())
        .collect()
}

#[test]
fn test_handshake_confirms_on_channel_four() {
    let (mut bridge, sink) = make_bridge();
    bridge.handle_midi(&HANDSHAKE);

    assert_eq!(sink.sent()[0], vec![0x93, 1, 100]);
    assert!(bridge.is_initialized());
    assert!(sink.sent().len() > 1);

    // A second handshake only confirms
    sink.clear();
    bridge.handle_midi(&HANDSHAKE);
    assert_eq!(sink.take(), vec![vec![0x93, 1, 100]]);
}

#[test]
fn test_handshake_on_other_channel_is_ignored() {
    let (mut bridge, sink) = make_bridge();
    bridge.handle_midi(&[0x90, 94, 127]);
    assert!(!bridge.is_initialized());
    assert!(sink.sent().is_empty());
}

#[test]
fn test_bootstrap_pushes_project() {
    let (mut bridge, sink) = make_bridge();
    bridge.handle_midi(&HANDSHAKE);
    let all = payloads(&sink);

    assert_eq!(texts(&all, OutboundTag::TrackNames), vec!["Drums,Bass,Keys"]);
    assert_eq!(texts(&all, OutboundTag::TrackCapabilities), vec!["00,10,00"]);
    assert_eq!(
        texts(&all, OutboundTag::TrackColors),
        vec!["(255,0,0)-(0,0,255)-(0,255,0)"]
    );
    assert_eq!(texts(&all, OutboundTag::ReturnTrackNames), vec!["Reverb"]);
    assert_eq!(
        texts(&all, OutboundTag::ReturnTrackColors),
        vec!["(128,128,128)-(255,255,255)"]
    );
    assert_eq!(texts(&all, OutboundTag::SelectedTrack), vec!["0"]);
    assert_eq!(texts(&all, OutboundTag::SelectedReturn), vec!["none selected"]);
    assert_eq!(texts(&all, OutboundTag::MidiInputFlag), vec!["1"]);
    assert_eq!(texts(&all, OutboundTag::SelectedClipSlot), vec!["not found"]);
    assert_eq!(texts(&all, OutboundTag::ScaleRoot), vec!["Major;0"]);
    assert_eq!(texts(&all, OutboundTag::DeviceList), vec!["Kit"]);
    assert_eq!(texts(&all, OutboundTag::DrumPadNames), vec!["Kick,Snare"]);
    assert_eq!(texts(&all, OutboundTag::BankName), vec![";1"]);
    assert_eq!(texts(&all, OutboundTag::BankNames), vec![""]);
    assert_eq!(texts(&all, OutboundTag::ParameterNames), vec![""]);
    assert!(texts(&all, OutboundTag::SelectedDevice).is_empty());
    assert_eq!(binaries(&all, OutboundTag::UndoRedoState), vec![vec![0, 0]]);

    // Clip detail stays quiet until the device view is shown
    assert!(binaries(&all, OutboundTag::ClipNotes).is_empty());
}

#[test]
fn test_first_sync_sends_every_row() {
    let (mut bridge, sink) = make_bridge();
    bridge.handle_midi(&HANDSHAKE);
    let all = payloads(&sink);

    assert_eq!(
        texts(&all, OutboundTag::ClipGridRow),
        vec!["0%1:(0,255,0)-0:0", "1%0:0-0:0", "2%0:0-0:0"]
    );

    // Nothing changed: the next tick is silent
    bridge.tick().unwrap();
    assert!(sink.sent().is_empty());
}

#[test]
fn test_resend_forgets_grid_baseline() {
    let (mut bridge, sink) = connected();
    bridge.handle_midi(&RESEND);
    let all = payloads(&sink);

    assert_eq!(texts(&all, OutboundTag::TrackNames), vec!["Drums,Bass,Keys"]);
    assert_eq!(texts(&all, OutboundTag::ClipGridRow).len(), 3);
}

#[test]
fn test_fire_clip_pushes_changed_row() {
    let (mut bridge, sink) = connected();
    bridge.handle_midi(&[0xF0, 0x09, 1, 0, 0, 0xF7]);

    let all = payloads(&sink);
    assert_eq!(
        texts(&all, OutboundTag::ClipGridRow),
        vec!["0%2:(0,255,0)-0:0"]
    );

    // Firing a playing clip stops it
    bridge.handle_midi(&[0xF0, 0x09, 1, 0, 0, 0xF7]);
    let all = payloads(&sink);
    assert_eq!(
        texts(&all, OutboundTag::ClipGridRow),
        vec!["0%1:(0,255,0)-0:0"]
    );
}

#[test]
fn test_truncated_command_is_dropped() {
    let (mut bridge, sink) = connected();
    bridge.handle_midi(&[0xF0, 0x09, 1, 0, 0xF7]);

    assert!(sink.sent().is_empty());
    assert!(!bridge.host().tracks()[0].slots[0].is_playing);
    assert!(bridge.host_mut().drain_events().is_empty());
}

#[test]
fn test_listeners_are_not_duplicated() {
    let (mut bridge, _sink) = connected();
    let clip = EntityRef::Clip { track: 0, slot: 0 };

    bridge.handle_midi(&HANDSHAKE);
    bridge.host_mut().focus_clip(Some(ClipRef::new(0, 0)));
    bridge.pump_events();

    let host = bridge.host();
    assert_eq!(host.registrations(clip, EventKind::Notes), 1);
    assert_eq!(host.registrations(EntityRef::Track(0), EventKind::Name), 1);

    // A structural change re-attaches, but only one listener stays live
    bridge.host_mut().push_track(MemoryTrack::midi("Pad", 0, 2));
    bridge.pump_events();
    let host = bridge.host();
    assert_eq!(host.live_listeners(EntityRef::Track(0), EventKind::Name), 1);
    assert_eq!(host.live_listeners(EntityRef::Track(3), EventKind::Name), 1);
    assert_eq!(host.listener_count(), bridge.subscriptions().len());
}

#[test]
fn test_tick_drains_queued_host_events() {
    let (mut bridge, sink) = connected();
    bridge.host_mut().rename_track(0, "Kit");
    assert!(sink.sent().is_empty());

    bridge.tick().unwrap();
    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::TrackNames), vec!["Kit,Bass,Keys"]);
}

#[test]
fn test_track_removal_sends_deleted_row() {
    let (mut bridge, sink) = connected();
    bridge.host_mut().remove_track(1);
    bridge.pump_events();

    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::TrackNames), vec!["Drums,Keys"]);
    assert_eq!(texts(&all, OutboundTag::ClipGridRow), vec!["DEL2"]);
    assert_eq!(bridge.status().grid_rows, 2);
}

#[test]
fn test_track_added_sends_new_row() {
    let (mut bridge, sink) = connected();
    bridge.host_mut().push_track(MemoryTrack::midi("Pad", 0, 1));
    bridge.pump_events();

    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::TrackNames), vec!["Drums,Bass,Keys,Pad"]);
    assert_eq!(texts(&all, OutboundTag::ClipGridRow), vec!["3%0:0"]);
}

#[test]
fn test_rename_pushes_names_only() {
    let (mut bridge, sink) = connected();
    bridge.host_mut().rename_track(2, "Piano");
    bridge.pump_events();

    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::TrackNames), vec!["Drums,Bass,Piano"]);
    assert!(texts(&all, OutboundTag::ClipGridRow).is_empty());
}

#[test]
fn test_playhead_follows_device_view() {
    let (mut bridge, sink) = connected();
    let clip = ClipRef::new(0, 0);

    bridge.host_mut().advance_playhead(clip, 1500);
    bridge.pump_events();
    assert!(sink.sent().is_empty());

    bridge.handle_midi(&DEVICE_VIEW_ON);
    let shown = payloads(&sink);
    assert_eq!(binaries(&shown, OutboundTag::ClipNotes).len(), 1);
    assert_eq!(binaries(&shown, OutboundTag::ClipMetadata).len(), 1);

    bridge.host_mut().advance_playhead(clip, 2000);
    bridge.pump_events();
    let all = payloads(&sink);
    assert_eq!(
        binaries(&all, OutboundTag::PlayheadPosition),
        vec![encode3(2000).to_vec()]
    );
}

#[test]
fn test_mixer_view_hides_grid() {
    let (mut bridge, sink) = connected();
    bridge.handle_midi(&MIXER_VIEW_ON);
    assert!(!bridge.views().grid_visible());
    sink.clear();

    bridge.handle_midi(&[0xF0, 0x09, 1, 0, 0, 0xF7]);
    bridge.tick().unwrap();
    assert!(sink.sent().is_empty());

    bridge.handle_midi(&MIXER_VIEW_OFF);
    bridge.tick().unwrap();
    let all = payloads(&sink);
    assert_eq!(
        texts(&all, OutboundTag::ClipGridRow),
        vec!["0%2:(0,255,0)-0:0"]
    );
}

#[test]
fn test_undo_state_pushed_on_change() {
    let (mut bridge, sink) = connected();

    bridge.tick().unwrap();
    assert!(sink.sent().is_empty());

    bridge.host_mut().set_undo_state(UndoState {
        can_undo: true,
        can_redo: false,
    });
    bridge.tick().unwrap();
    bridge.tick().unwrap();

    let all = payloads(&sink);
    assert_eq!(binaries(&all, OutboundTag::UndoRedoState), vec![vec![1, 0]]);
}

#[test]
fn test_selection_of_return_and_master() {
    let (mut bridge, sink) = connected();

    bridge.host_mut().select_track(TrackSelection::Return(0));
    bridge.pump_events();
    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::SelectedTrack), vec!["not found"]);
    assert_eq!(texts(&all, OutboundTag::SelectedReturn), vec!["0"]);
    assert_eq!(texts(&all, OutboundTag::MidiInputFlag), vec!["0"]);
    assert_eq!(texts(&all, OutboundTag::DrumPadNames), vec![""]);

    bridge.host_mut().select_track(TrackSelection::Master);
    bridge.pump_events();
    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::SelectedReturn), vec!["1"]);
}

#[test]
fn test_focus_moves_clip_listeners() {
    let (mut bridge, sink) = connected();
    bridge.handle_midi(&DEVICE_VIEW_ON);
    sink.clear();

    bridge.host_mut().focus_clip(Some(ClipRef::new(1, 0)));
    bridge.pump_events();

    let old = EntityRef::Clip { track: 0, slot: 0 };
    assert_eq!(bridge.host().live_listeners(old, EventKind::Notes), 0);
    assert!(!bridge.subscriptions().is_subscribed(old, EventKind::Notes));

    let all = payloads(&sink);
    assert_eq!(
        binaries(&all, OutboundTag::ClipNotes),
        vec![EMPTY_CLIP_SENTINEL.to_vec()]
    );
}

#[test]
fn test_large_clip_is_chunked() {
    let notes: Vec<NoteEvent> = (0..30).map(|i| note(i, 36 + i as u8, i as i32 * 100)).collect();
    let (mut bridge, sink) = make_bridge_with(make_session(notes.clone()));
    bridge.handle_midi(&HANDSHAKE);
    sink.clear();

    bridge.handle_midi(&DEVICE_VIEW_ON);
    let frames: Vec<Vec<u8>> = sink
        .sent()
        .into_iter()
        .filter(|raw| raw.get(1) == Some(&OutboundTag::ClipNotes.as_byte()))
        .collect();
    assert_eq!(frames.len(), 2);

    let all = payloads(&sink);
    let payload = &binaries(&all, OutboundTag::ClipNotes)[0];
    assert_eq!(decode_note_records(payload), Some(notes));
}

#[test]
fn test_events_before_handshake_are_ignored() {
    let (mut bridge, sink) = make_bridge();
    bridge.host_mut().push_track(MemoryTrack::midi("Pad", 0, 1));
    bridge.pump_events();
    bridge.tick().unwrap();

    assert!(sink.sent().is_empty());
    assert_eq!(bridge.subscriptions().len(), 0);
}

#[test]
fn test_teardown_detaches_everything() {
    let (mut bridge, _sink) = connected();
    bridge.host_mut().remove_track(2);
    bridge.pump_events();
    assert!(bridge.host().listener_count() > 0);

    bridge.teardown();
    assert_eq!(bridge.host().listener_count(), 0);
    assert!(bridge.subscriptions().is_empty());
    assert!(!bridge.status().sync_running);
}

#[test]
fn test_closed_sink_surfaces_on_tick() {
    let mut bridge = SessionBridge::new(
        make_session(Vec::new()),
        Arc::new(ClosedSink),
        BridgeOptions::default(),
    );
    bridge.handle_midi(&HANDSHAKE);
    assert!(bridge.is_initialized());

    assert!(matches!(bridge.tick(), Err(BridgeError::Transport(_))));
}

#[tokio::test(start_paused = true)]
async fn test_handshake_starts_sync_loop() {
    struct Noop;

    #[async_trait::async_trait]
    impl Tick for Noop {
        async fn tick(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    let (mut bridge, _sink) = make_bridge();
    bridge.set_ticker(Arc::new(Noop));
    assert!(!bridge.sync_loop().is_running());

    bridge.handle_midi(&HANDSHAKE);
    assert!(bridge.sync_loop().is_running());

    bridge.teardown();
    assert!(!bridge.sync_loop().is_running());
}

/// Raw note-on/note-off messages among everything sent
fn note_messages(sink: &RecordingSink) -> Vec<Vec<u8>> {
    sink.take()
        .into_iter()
        .filter(|raw| matches!(raw.first().copied(), Some(0x80..=0x9F)))
        .collect()
}

/// Raw meter CCs among everything sent
fn meter_messages(sink: &RecordingSink) -> Vec<Vec<u8>> {
    sink.take()
        .into_iter()
        .filter(|raw| matches!(raw.first().copied(), Some(0xB9 | 0xBA)))
        .collect()
}

#[test]
fn test_focus_change_during_structural_change_keeps_one_listener() {
    let (mut bridge, _sink) = connected();
    let first = ClipRef::new(0, 0);
    let second = ClipRef::new(2, 0);
    bridge
        .host_mut()
        .set_slot(second, MemorySlot::with_clip(MemoryClip::default()));
    bridge.pump_events();

    // Focus moves in the same batch as a track is added
    bridge.host_mut().focus_clip(Some(second));
    bridge.host_mut().push_track(MemoryTrack::midi("Pad", 0, 1));
    bridge.pump_events();

    bridge.host_mut().focus_clip(Some(first));
    bridge.pump_events();

    let host = bridge.host();
    assert_eq!(host.live_listeners(first.clip_entity(), EventKind::Notes), 1);
    assert_eq!(host.live_listeners(first.clip_entity(), EventKind::Markers), 1);
    assert_eq!(host.live_listeners(second.clip_entity(), EventKind::Notes), 0);
    assert_eq!(host.live_listeners(second.clip_entity(), EventKind::Markers), 0);
    assert_eq!(host.listener_count(), bridge.subscriptions().len());
}

#[test]
fn test_selection_pushes_selected_slot() {
    let (mut bridge, sink) = connected();
    bridge.host_mut().select_scene(Some(1));
    bridge.pump_events();
    sink.clear();

    bridge.host_mut().select_track(TrackSelection::Track(2));
    bridge.pump_events();

    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::SelectedTrack), vec!["2"]);
    assert_eq!(texts(&all, OutboundTag::SelectedClipSlot), vec!["1"]);
    assert_eq!(texts(&all, OutboundTag::DeviceList), vec![""]);
}

#[test]
fn test_clip_color_change_pushes_row() {
    let (mut bridge, sink) = connected();
    bridge.host_mut().set_clip_color(ClipRef::new(0, 0), 0x0000FF);
    bridge.pump_events();

    let all = payloads(&sink);
    assert_eq!(
        texts(&all, OutboundTag::ClipGridRow),
        vec!["0%1:(0,0,255)-0:0"]
    );
}

#[test]
fn test_device_page_follows_selected_device() {
    let mut fixture = make_fixture(Vec::new());
    fixture.tracks[0].devices.push(
        DeviceNode::new("Glue")
            .with_bank("Main", &["Threshold", "Ratio", "", "Makeup"])
            .with_bank("Sidechain", &["Gain", "Mix"]),
    );
    fixture.tracks[0].selected_device = Some(DeviceSelection { index: 1, bank: 0 });
    let (mut bridge, sink) = make_bridge_with(MemorySession::new(fixture));

    bridge.handle_midi(&HANDSHAKE);
    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::DeviceList), vec!["Kit,Glue"]);
    assert_eq!(texts(&all, OutboundTag::BankName), vec!["Main;1"]);
    assert_eq!(texts(&all, OutboundTag::BankNames), vec!["Main,Sidechain"]);
    assert_eq!(texts(&all, OutboundTag::SelectedDevice), vec!["1"]);
    assert_eq!(
        texts(&all, OutboundTag::ParameterNames),
        vec!["Threshold,Ratio,Makeup"]
    );

    bridge
        .host_mut()
        .select_device(Some(DeviceSelection { index: 1, bank: 1 }));
    bridge.pump_events();
    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::BankName), vec!["Sidechain;1"]);
    assert_eq!(texts(&all, OutboundTag::ParameterNames), vec!["Gain,Mix"]);

    // A selection past the chain falls back to the empty page
    bridge
        .host_mut()
        .select_device(Some(DeviceSelection { index: 5, bank: 0 }));
    bridge.pump_events();
    let all = payloads(&sink);
    assert_eq!(texts(&all, OutboundTag::BankName), vec![";1"]);
    assert!(texts(&all, OutboundTag::SelectedDevice).is_empty());
}

#[test]
fn test_meters_follow_mixer_view() {
    let (mut bridge, sink) = connected();
    bridge.host_mut().set_meter(
        EntityRef::Track(0),
        MeterLevel {
            left: 0.5,
            right: 0.25,
        },
    );
    bridge.pump_events();
    assert!(meter_messages(&sink).is_empty());

    // Drums, Bass, Keys, Reverb, Master
    bridge.handle_midi(&MIXER_VIEW_ON);
    let shown = meter_messages(&sink);
    assert_eq!(shown.len(), 10);
    assert_eq!(shown[0], vec![0xB9, 0, 50]);
    assert_eq!(shown[1], vec![0xBA, 0, 25]);
    assert!(shown[2..].iter().all(|m| m[2] == 0));

    bridge.host_mut().set_meter(
        EntityRef::ReturnTrack(0),
        MeterLevel {
            left: 1.0,
            right: 2.0,
        },
    );
    bridge.pump_events();
    assert_eq!(
        meter_messages(&sink),
        vec![vec![0xB9, 3, 100], vec![0xBA, 3, 127]]
    );

    // Bass has no audio output
    bridge.host_mut().set_meter(
        EntityRef::Track(1),
        MeterLevel {
            left: 0.9,
            right: 0.9,
        },
    );
    bridge.pump_events();
    assert_eq!(
        meter_messages(&sink),
        vec![vec![0xB9, 1, 0], vec![0xBA, 1, 0]]
    );

    bridge.handle_midi(&MIXER_VIEW_OFF);
    let hidden = meter_messages(&sink);
    assert_eq!(hidden.len(), 10);
    assert!(hidden.iter().all(|m| m[2] == 0));
    assert_eq!(hidden[8], vec![0xB9, 4, 0]);
}

#[test]
fn test_playing_notes_follow_playhead() {
    let mut later = note(2, 38, 500);
    later.duration = 100;
    let (mut bridge, sink) = make_bridge_with(make_session(vec![note(1, 36, 0), later]));
    bridge.handle_midi(&HANDSHAKE);
    sink.clear();
    let clip = ClipRef::new(0, 0);

    // Hidden device view: nothing mirrored
    bridge.host_mut().advance_playhead(clip, 100);
    bridge.pump_events();
    assert!(note_messages(&sink).is_empty());

    bridge.handle_midi(&DEVICE_VIEW_ON);
    sink.clear();
    bridge.host_mut().advance_playhead(clip, 100);
    bridge.pump_events();
    assert_eq!(note_messages(&sink), vec![vec![0x90, 36, 100]]);

    bridge.host_mut().advance_playhead(clip, 550);
    bridge.pump_events();
    assert_eq!(
        note_messages(&sink),
        vec![vec![0x80, 36, 100], vec![0x90, 38, 100]]
    );

    // Hiding the device view silences what is still sounding
    bridge.handle_midi(&DEVICE_VIEW_OFF);
    assert_eq!(note_messages(&sink), vec![vec![0x80, 38, 100]]);
}

#[test]
fn test_playing_notes_stop_when_selection_moves() {
    let (mut bridge, sink) = connected();
    let clip = ClipRef::new(0, 0);
    bridge.handle_midi(&DEVICE_VIEW_ON);
    bridge.host_mut().advance_playhead(clip, 10);
    bridge.pump_events();
    sink.clear();

    bridge.host_mut().select_track(TrackSelection::Track(2));
    bridge.pump_events();
    assert_eq!(note_messages(&sink), vec![vec![0x80, 36, 100]]);

    bridge.host_mut().advance_playhead(clip, 20);
    bridge.pump_events();
    assert!(note_messages(&sink).is_empty());
}

#[test]
fn test_new_clip_on_selected_track_is_mirrored() {
    let (mut bridge, sink) = connected();
    bridge.handle_midi(&DEVICE_VIEW_ON);
    let added = ClipRef::new(0, 1);
    bridge.host_mut().set_slot(
        added,
        MemorySlot::with_clip(MemoryClip {
            notes: vec![note(5, 40, 0)],
            ..Default::default()
        }),
    );
    bridge.pump_events();
    assert!(bridge
        .subscriptions()
        .is_subscribed(added.clip_entity(), EventKind::PlayingPosition));
    sink.clear();

    bridge.host_mut().advance_playhead(added, 10);
    bridge.pump_events();
    assert_eq!(note_messages(&sink), vec![vec![0x90, 40, 100]]);

    // Emptying the slot drops its clip listeners
    bridge.host_mut().set_slot(added, MemorySlot::default());
    bridge.pump_events();
    assert_eq!(bridge.host().live_listeners(added.clip_entity(), EventKind::Color), 0);
    assert!(!bridge
        .subscriptions()
        .is_subscribed(added.clip_entity(), EventKind::PlayingPosition));
}
