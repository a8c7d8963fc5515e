//! Core domain types shared across the duel subsystem (spec §3 Data Model).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type MatchId = String;

/// Runtime-only user handle: created at connect, discarded at disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct UserHandle {
    pub user_id: UserId,
    pub rating: f64,
    pub display_name: String,
}

/// A problem as seen by the core: opaque beyond id and canonical answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    pub canonical_answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    AWins,
    BWins,
    Draw,
    Cancelled,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::AWins => "a_wins",
            MatchOutcome::BWins => "b_wins",
            MatchOutcome::Draw => "draw",
            MatchOutcome::Cancelled => "cancelled",
        }
    }
}

/// A completed or cancelled match, ready to be persisted.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub player_a: UserId,
    pub player_b: UserId,
    pub result: MatchOutcome,
    pub delta_a: f64,
    pub delta_b: f64,
    pub created_at: DateTime<Utc>,
}

/// One row appended per player per completed or cancelled match.
#[derive(Debug, Clone)]
pub struct RatingHistoryRecord {
    pub user_id: UserId,
    pub rating_after: f64,
    pub delta: f64,
    pub created_at: DateTime<Utc>,
}
