//! Shared error categories for the duel subsystem.
//!
//! These mirror the categories in the error handling design: every failure surfaced
//! across a component boundary collapses into one of these, never a bare panic.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Bad auth, malformed first frame. Closed silently with `invalid token`.
    Protocol(String),
    /// Policy rejection: already in a match, rate-limited answer.
    Policy(String),
    /// Send/receive failure on a channel. Becomes a synthetic `disconnected` event.
    Transport(String),
    /// Problem repository returned an insufficient batch.
    Resource(String),
    /// Settlement transaction failed after retry.
    Persistence(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::Policy(msg) => write!(f, "policy violation: {}", msg),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::Resource(msg) => write!(f, "resource error: {}", msg),
            Error::Persistence(msg) => write!(f, "persistence error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
