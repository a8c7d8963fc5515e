//! Messages delivered to a [`super::match_actor::MatchActor`]'s mailbox.
//!
//! All messages to a single match are processed sequentially through the actor's
//! mailbox (spec §5: "Event-stream dequeue is the only wait during a problem"), which
//! is what gives the total order over answers from either participant that §8 requires.

use crate::channel::DuelChannel;
use crate::models::UserId;

/// The classified kind of an inbound frame once it reaches the match (spec §4.5 step 4).
#[derive(Debug, Clone)]
pub enum EventKind {
    Chat(String),
    Emoji(String),
    /// Anything that isn't a reserved side-channel prefix is treated as an answer.
    Answer(String),
    /// Synthetic event a producer task emits when its channel errors (spec §4.6).
    Disconnected,
}

/// One event in a match's single shared stream, always carrying its originating user.
#[derive(Debug, Clone)]
pub struct MatchEvent {
    pub user_id: UserId,
    pub kind: EventKind,
}

/// Messages a [`super::match_actor::MatchActor`] accepts.
#[derive(Debug)]
pub enum MatchMsg {
    /// An event from one of the two participants' producer tasks.
    Event(MatchEvent),
    /// A participant's channel was replaced after a successful reconnect.
    Reattach { user_id: UserId, channel: DuelChannel },
    /// Per-problem deadline timer fired. `generation` lets the actor ignore stale
    /// timers scheduled for a problem that has since resolved or advanced.
    ProblemTimeout { generation: u64 },
    /// Reconnect grace timer fired.
    ReconnectTimeout { generation: u64 },
    /// External shutdown: take the cancellation path immediately.
    Shutdown,
}
