//! Process-wide match registry, mirroring the teacher's `ActorRegistry`: a `DashMap`
//! keyed by id, holding a cheap `ActorRef` clone per live actor.

use dashmap::DashMap;
use ractor::ActorRef;
use tracing::info;

use super::messages::MatchMsg;
use crate::models::MatchId;

pub struct MatchRegistry {
    matches: DashMap<MatchId, ActorRef<MatchMsg>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn insert(&self, match_id: MatchId, actor: ActorRef<MatchMsg>) {
        self.matches.insert(match_id, actor);
    }

    pub fn get(&self, match_id: &str) -> Option<ActorRef<MatchMsg>> {
        self.matches.get(match_id).map(|e| e.value().clone())
    }

    pub fn remove(&self, match_id: &str) {
        self.matches.remove(match_id);
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Cast `Shutdown` to every live match and drop our references. Used when the
    /// host is tearing down: in-flight matches take the cancellation path.
    pub fn shutdown_all(&self) {
        for entry in self.matches.iter() {
            let _ = entry.value().cast(MatchMsg::Shutdown);
        }
        info!(count = self.matches.len(), "shutdown cast to all matches");
        self.matches.clear();
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
