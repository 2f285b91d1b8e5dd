//! Inbound edit commands
//!
//! Each command is `<opcode> <args..>` with a fixed argument count. Short
//! commands and unknown opcodes are dropped without touching the host.
//! Extra trailing bytes are ignored.

use tracing::debug;

use crate::host::{ClipRef, HostError, HostResult, Marker, SessionHost};
use crate::protocol::codec::{decode2, decode3};
use crate::serializer::{unpack_mute_probability, NoteEvent};

pub const OP_FIRE_CLIP: u8 = 0x09;
pub const OP_DELETE_CLIP: u8 = 0x0A;
pub const OP_COPY_PASTE_CLIP: u8 = 0x0B;
pub const OP_SET_SCALE_ROOT: u8 = 0x0C;
pub const OP_DUPLICATE_LOOP: u8 = 0x0D;
pub const OP_ADD_NOTE: u8 = 0x0E;
pub const OP_REMOVE_NOTE: u8 = 0x0F;
pub const OP_MODIFY_NOTE: u8 = 0x10;
pub const OP_SET_MARKER: u8 = 0x11;

/// Note fields carried by add/modify commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteFields {
    pub pitch: u8,
    pub start: i32,
    pub duration: i32,
    pub velocity: u8,
    pub mute: bool,
    pub probability: f32,
}

impl NoteFields {
    /// Decode the 9-byte field block
    fn decode(args: &[u8]) -> Self {
        let (mute, probability) = unpack_mute_probability(args[8]);
        Self {
            pitch: args[0],
            start: decode3(args, 1),
            duration: decode3(args, 4),
            velocity: args[7],
            mute,
            probability,
        }
    }

    fn apply(&self, note: &mut NoteEvent) {
        note.pitch = self.pitch;
        note.start = self.start;
        note.duration = self.duration;
        note.velocity = self.velocity;
        note.mute = self.mute;
        note.probability = self.probability;
    }

    fn into_note(self) -> NoteEvent {
        NoteEvent {
            id: 0,
            pitch: self.pitch,
            start: self.start,
            duration: self.duration,
            velocity: self.velocity,
            mute: self.mute,
            probability: self.probability,
        }
    }
}

const NOTE_FIELDS_LEN: usize = 9;

/// A decoded inbound command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Stop the slot if `fire` is set and it is playing, fire it otherwise
    FireClip { fire: bool, clip: ClipRef },
    DeleteClip { clip: ClipRef },
    CopyPasteClip { from: ClipRef, to: ClipRef },
    SetScaleRoot { name: String, root: u8 },
    DuplicateLoop { clip: ClipRef },
    AddNote(NoteFields),
    RemoveNote { id: u16 },
    ModifyNote { id: u16, fields: NoteFields },
    SetMarker { marker: Marker, time: i32 },
}

impl Command {
    /// Decode `<opcode> <args..>`; `None` for anything malformed or unknown
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let (&opcode, args) = payload.split_first()?;

        let command = match opcode {
            OP_FIRE_CLIP => {
                let a = args.get(..3)?;
                Command::FireClip {
                    fire: a[0] == 1,
                    clip: ClipRef::new(a[1] as usize, a[2] as usize),
                }
            }
            OP_DELETE_CLIP => {
                let a = args.get(..2)?;
                Command::DeleteClip {
                    clip: ClipRef::new(a[0] as usize, a[1] as usize),
                }
            }
            OP_COPY_PASTE_CLIP => {
                let a = args.get(..4)?;
                Command::CopyPasteClip {
                    from: ClipRef::new(a[0] as usize, a[1] as usize),
                    to: ClipRef::new(a[2] as usize, a[3] as usize),
                }
            }
            OP_SET_SCALE_ROOT => {
                let (&root, name) = args.split_last()?;
                if name.is_empty() {
                    return None;
                }
                let name = std::str::from_utf8(name).ok()?;
                Command::SetScaleRoot {
                    name: name.to_string(),
                    root,
                }
            }
            OP_DUPLICATE_LOOP => {
                let a = args.get(..2)?;
                Command::DuplicateLoop {
                    clip: ClipRef::new(a[0] as usize, a[1] as usize),
                }
            }
            OP_ADD_NOTE => Command::AddNote(NoteFields::decode(args.get(..NOTE_FIELDS_LEN)?)),
            OP_REMOVE_NOTE => {
                let a = args.get(..2)?;
                Command::RemoveNote { id: decode2(a, 0) }
            }
            OP_MODIFY_NOTE => {
                let a = args.get(..2 + NOTE_FIELDS_LEN)?;
                Command::ModifyNote {
                    id: decode2(a, 0),
                    fields: NoteFields::decode(&a[2..]),
                }
            }
            OP_SET_MARKER => {
                let a = args.get(..4)?;
                Command::SetMarker {
                    marker: Marker::from_id(a[0])?,
                    time: decode3(a, 1),
                }
            }
            _ => return None,
        };

        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::FireClip { .. } => "fireClip",
            Command::DeleteClip { .. } => "deleteClip",
            Command::CopyPasteClip { .. } => "copyPasteClip",
            Command::SetScaleRoot { .. } => "setScaleRoot",
            Command::DuplicateLoop { .. } => "duplicateLoop",
            Command::AddNote(_) => "addNote",
            Command::RemoveNote { .. } => "removeNote",
            Command::ModifyNote { .. } => "modifyNote",
            Command::SetMarker { .. } => "setMarker",
        }
    }
}

/// Apply a command to the host
pub fn dispatch(host: &mut dyn SessionHost, command: &Command) -> HostResult<()> {
    match command {
        Command::FireClip { fire, clip } => {
            if *fire && slot_is_playing(host, *clip) {
                host.stop_slot(*clip)
            } else {
                host.fire_slot(*clip)
            }
        }
        Command::DeleteClip { clip } => host.delete_clip(*clip),
        Command::CopyPasteClip { from, to } => host.duplicate_clip_to(*from, *to),
        Command::SetScaleRoot { name, root } => host.set_scale(name, *root),
        Command::DuplicateLoop { clip } => host.duplicate_loop(*clip),
        Command::AddNote(fields) => {
            let clip = focused(host)?;
            let id = host.add_note(clip, fields.into_note())?;
            debug!("Added note {} to {:?}", id, clip);
            Ok(())
        }
        Command::RemoveNote { id } => {
            let clip = focused(host)?;
            host.remove_note(clip, *id)
        }
        Command::ModifyNote { id, fields } => {
            let clip = focused(host)?;
            let mut notes = host.clip_notes(clip)?.ok_or(HostError::NoFocusedClip)?;
            let note = notes
                .iter_mut()
                .find(|n| n.id == *id)
                .ok_or(HostError::NoteNotFound(*id))?;
            fields.apply(note);
            host.apply_note_modifications(clip, notes)
        }
        Command::SetMarker { marker, time } => {
            let clip = focused(host)?;
            host.set_marker(clip, *marker, *time)
        }
    }
}

/// Decode and apply a raw command payload. Failures end here.
pub fn handle_payload(host: &mut dyn SessionHost, payload: &[u8]) {
    let Some(command) = Command::decode(payload) else {
        debug!("Dropping malformed command: {:02X?}", payload);
        return;
    };

    debug!("Command {}: {:?}", command.name(), command);
    if let Err(e) = dispatch(host, &command) {
        debug!("Command {} rejected: {}", command.name(), e);
    }
}

fn focused(host: &dyn SessionHost) -> HostResult<ClipRef> {
    host.focused_clip().ok_or(HostError::NoFocusedClip)
}

fn slot_is_playing(host: &dyn SessionHost, clip: ClipRef) -> bool {
    host.tracks()
        .get(clip.track)
        .and_then(|t| t.slots.get(clip.slot))
        .map(|s| s.is_playing)
        .unwrap_or(false)
}
