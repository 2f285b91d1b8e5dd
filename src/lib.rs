//! Session Sync GW
//!
//! Keeps a companion app's view of a DAW session (tracks, clip grid,
//! selection, scale, devices, focused clip notes) in sync over SysEx, and
//! applies the edits the app sends back.

pub mod actor;
pub mod bridge;
pub mod config;
pub mod differ;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod midi;
pub mod playback;
pub mod protocol;
pub mod serializer;
pub mod sniffer;
pub mod subscriptions;
pub mod sync_loop;
pub mod transport;

pub use actor::{BridgeActor, BridgeHandle};
pub use bridge::{BridgeOptions, BridgeStatus, SessionBridge};
pub use error::{BridgeError, BridgeResult};
