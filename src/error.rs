//! Bridge-level error types

use thiserror::Error;

/// Errors surfaced by the bridge to its owner
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("MIDI transport error: {0}")]
    Transport(String),

    #[error("bridge actor is no longer running")]
    ActorClosed,
}

pub type BridgeResult<T> = Result<T, BridgeError>;
