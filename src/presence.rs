//! The presence registry (spec §4.2): the single source of truth for what each user
//! is doing right now, and the only place that enforces one-channel/one-match-per-user.
//!
//! Grounded on the teacher's `actors::registry::ActorRegistry` for the "one map guarded
//! by one lock, `Clone`-able handle" shape, but `parking_lot::Mutex` replaces `DashMap`
//! here because the design explicitly calls for a *single* mutex across all presence
//! transitions, and no Presence call may yield while holding it -- a `DashMap`'s
//! per-shard locks don't give that guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use ractor::ActorRef;
use tracing::{info, warn};

use crate::actors::messages::{MatchEvent, MatchMsg};
use crate::channel::DuelChannel;
use crate::matchmaking::pool::{WaitingEntry, WaitingPool};
use crate::models::UserId;

/// What a user is doing, from the registry's point of view. Absence from the map
/// means idle.
enum Presence {
    Queued(DuelChannel),
    /// Paired by the matchmaker but the match runner hasn't finished starting yet.
    /// Exists so pairing and "no longer queued" are a single atomic transition (spec
    /// §4.3), without waiting on the actor spawn to learn an `ActorRef`.
    Claimed,
    InMatch(ActorRef<MatchMsg>),
    AwaitingReconnect(ActorRef<MatchMsg>),
}

/// Outcome of an `attach` call, for the gateway to act on.
pub enum AttachOutcome {
    /// User was idle; a new waiting entry was created.
    QueuedNew,
    /// User was already queued; old channel closed, new one takes its place.
    ReplacedQueued,
    /// User was awaiting reconnect; the match runner now has the new channel.
    Reconnected(ActorRef<MatchMsg>),
    /// User is mid-match and not awaiting reconnect.
    AlreadyInMatch,
}

/// Process-wide presence table, guarded by one mutex (spec §4.2: "no Presence call
/// yields while holding it").
pub struct PresenceRegistry {
    inner: Mutex<HashMap<UserId, Presence>>,
    pool: Arc<Mutex<WaitingPool>>,
}

impl PresenceRegistry {
    pub fn new(pool: Arc<Mutex<WaitingPool>>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            pool,
        }
    }

    /// Attach a connected channel to `user_id`, routing it per current presence.
    pub fn attach(&self, user_id: UserId, rating: f64, channel: DuelChannel) -> AttachOutcome {
        let mut guard = self.inner.lock();
        match guard.get(&user_id) {
            None => {
                guard.insert(user_id, Presence::Queued(channel.clone()));
                self.pool.lock().insert(WaitingEntry {
                    user_id,
                    rating,
                    joined_at: Instant::now(),
                    channel_ref: channel,
                });
                info!(user_id, "queued");
                AttachOutcome::QueuedNew
            }
            Some(Presence::Queued(old)) => {
                let old = old.clone();
                guard.insert(user_id, Presence::Queued(channel.clone()));
                // Position in the pool is keyed by (rating, joined_at); since the user
                // is still queued this entry's ordering key is untouched -- only the
                // channel handle on file changes, so we update it in place.
                {
                    let mut pool = self.pool.lock();
                    if let Some(mut entry) = pool.remove(user_id) {
                        entry.channel_ref = channel;
                        pool.insert(entry);
                    }
                }
                let old_for_close = old;
                tokio::spawn(async move {
                    let _ = old_for_close.send("opponent disconnected").await;
                    old_for_close.close().await;
                });
                info!(user_id, "replaced queued channel");
                AttachOutcome::ReplacedQueued
            }
            Some(Presence::AwaitingReconnect(actor)) => {
                let actor = actor.clone();
                guard.insert(user_id, Presence::InMatch(actor.clone()));
                let _ = actor.cast(MatchMsg::Reattach { user_id, channel });
                info!(user_id, "reconnected");
                AttachOutcome::Reconnected(actor)
            }
            Some(Presence::InMatch(_)) | Some(Presence::Claimed) => {
                warn!(user_id, "attach rejected: already in match");
                AttachOutcome::AlreadyInMatch
            }
        }
    }

    /// Runs the pairing scan and marks both members of every emitted pair `Claimed`
    /// in the same critical section as their removal from the pool (spec §4.3:
    /// "matched users are marked in_match inside the same critical section"). The
    /// matchmaker upgrades `Claimed` to `InMatch` once the runner actor exists, via
    /// `mark_in_match`.
    pub fn pair_and_claim(
        &self,
        now: Instant,
        tolerance_slope: f64,
    ) -> Vec<(WaitingEntry, WaitingEntry)> {
        let mut presence = self.inner.lock();
        let pairs = self.pool.lock().pairing_scan(now, tolerance_slope);
        for (a, b) in &pairs {
            presence.insert(a.user_id, Presence::Claimed);
            presence.insert(b.user_id, Presence::Claimed);
        }
        pairs
    }

    /// Record that `user_id`'s claimed pairing now has a running match runner.
    pub fn mark_in_match(&self, user_id: UserId, actor: ActorRef<MatchMsg>) {
        self.inner.lock().insert(user_id, Presence::InMatch(actor));
    }

    /// Undoes a claim for a user whose handshake failed but whose channel is still
    /// alive: puts them back in the pool as a fresh, idle queued entry. Bypasses
    /// `attach`'s collision handling entirely, since the caller already knows the
    /// user's true state is "claimed, not yet matched" rather than "already queued".
    pub fn release_claim_to_idle(&self, user_id: UserId, rating: f64, channel: DuelChannel) {
        let mut guard = self.inner.lock();
        guard.insert(user_id, Presence::Queued(channel.clone()));
        self.pool.lock().insert(WaitingEntry {
            user_id,
            rating,
            joined_at: Instant::now(),
            channel_ref: channel,
        });
        info!(user_id, "released claim back to idle queue");
    }

    /// Undoes a claim for a user whose channel is gone; nothing to requeue.
    pub fn release_claim(&self, user_id: UserId) {
        self.inner.lock().remove(&user_id);
        info!(user_id, "released claim, channel unrecoverable");
    }

    /// A channel error surfaced for `user_id`: either pull them out of the queue, or
    /// start their reconnect grace window if they're mid-match.
    pub fn detach(&self, user_id: UserId) {
        let mut guard = self.inner.lock();
        match guard.remove(&user_id) {
            Some(Presence::InMatch(actor)) => {
                guard.insert(user_id, Presence::AwaitingReconnect(actor));
            }
            Some(Presence::Queued(_)) => {
                self.pool.lock().remove(user_id);
            }
            Some(Presence::AwaitingReconnect(actor)) => {
                // Already awaiting; put it back, nothing else to do.
                guard.insert(user_id, Presence::AwaitingReconnect(actor));
            }
            None => {}
        }
    }

    /// Clears presence entirely for `user_id` (match finished or cancelled).
    pub fn clear(&self, user_id: UserId) {
        self.inner.lock().remove(&user_id);
    }

    /// True if `user_id` has any presence entry (queued, in-match, or awaiting).
    pub fn is_present(&self, user_id: UserId) -> bool {
        self.inner.lock().contains_key(&user_id)
    }

    /// Routes an in-match event to the owning runner. Returns `false` if the user
    /// isn't currently in a match or reconnect wait (e.g. a stray frame from a
    /// still-queued user), in which case the gateway drops it silently.
    pub fn dispatch_event(&self, event: MatchEvent) -> bool {
        let guard = self.inner.lock();
        match guard.get(&event.user_id) {
            Some(Presence::InMatch(actor)) | Some(Presence::AwaitingReconnect(actor)) => {
                let _ = actor.cast(MatchMsg::Event(event));
                true
            }
            _ => false,
        }
    }
}

/// Spawns the reconnect-grace timer: after `grace`, casts `ReconnectTimeout` to the
/// runner if the user hasn't reattached by then. The runner discards it if `generation`
/// is stale (spec §4.5 reconnect wait).
pub fn spawn_reconnect_timer(actor: ActorRef<MatchMsg>, grace: Duration, generation: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let _ = actor.cast(MatchMsg::ReconnectTimeout { generation });
    });
}
