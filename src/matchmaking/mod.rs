pub mod pool;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::actors::match_actor::{MatchActor, MatchActorArgs};
use crate::actors::registry::MatchRegistry;
use crate::config::Config;
use crate::db::Persistence;
use crate::presence::PresenceRegistry;
use crate::problems::ProblemRepository;
use pool::WaitingPool;

/// Everything the matchmaker loop needs to turn a pair into a running match. Grouped
/// behind `Arc` the way the teacher bundles its `AppState` fields, since every tick
/// clones this to hand off to spawned match runners.
#[derive(Clone)]
pub struct MatchmakerDeps {
    pub pool: Arc<Mutex<WaitingPool>>,
    pub presence: Arc<PresenceRegistry>,
    pub registry: Arc<MatchRegistry>,
    pub problems: Arc<dyn ProblemRepository>,
    pub persistence: Arc<dyn Persistence>,
    pub config: Arc<Config>,
}

/// The matchmaker loop: confines the one piece of global periodic state the design
/// notes call out, with an explicit `start`/`stop` the host drives at boot/shutdown
/// rather than relying on process exit.
pub struct MatchmakerLoop {
    handle: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
}

/// Drops `alive` to `false` when the loop task's future is torn down, whether by a
/// panic or by `JoinHandle::abort`. Lets a cheap, clonable liveness check answer
/// "is the matchmaker loop still running" without needing to join the handle.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A cloneable handle readiness checks can poll without owning the loop itself.
#[derive(Clone)]
pub struct MatchmakerLiveness(Arc<AtomicBool>);

impl MatchmakerLiveness {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl MatchmakerLoop {
    pub fn start(deps: MatchmakerDeps) -> Self {
        let interval = deps.config.matchmake_interval;
        let alive = Arc::new(AtomicBool::new(true));
        let alive_task = alive.clone();
        let handle = tokio::spawn(async move {
            let _guard = AliveGuard(alive_task);
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = run_tick(&deps).await {
                    error!(error = %e, "matchmaker tick failed");
                }
            }
        });
        Self {
            handle: Some(handle),
            alive,
        }
    }

    /// A liveness handle for `/health/ready` (spec-adjacent: readiness checks this
    /// loop's join handle is still running).
    pub fn liveness(&self) -> MatchmakerLiveness {
        MatchmakerLiveness(self.alive.clone())
    }

    /// Cancel and join the loop task (spec §4.4: "on shutdown it is cancelled and
    /// joined").
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn run_tick(deps: &MatchmakerDeps) -> Result<(), crate::error::Error> {
    let tolerance_slope = deps.config.tolerance_slope;
    // Pairing and marking both members `Claimed` happen atomically inside
    // `pair_and_claim` (spec §4.3); nothing is released to requeue a claimed user
    // except the runner's own handshake-failure path.
    let pairs = deps
        .presence
        .pair_and_claim(std::time::Instant::now(), tolerance_slope);

    for (a, b) in pairs {
        info!(user_a = a.user_id, user_b = b.user_id, "pair formed");
        if let Err(e) = spawn_match(deps.clone(), a, b).await {
            error!(error = %e, "failed to spawn match runner");
        }
    }

    Ok(())
}

async fn spawn_match(
    deps: MatchmakerDeps,
    a: pool::WaitingEntry,
    b: pool::WaitingEntry,
) -> Result<(), crate::error::Error> {
    let match_id = uuid::Uuid::new_v4().to_string();

    let args = MatchActorArgs {
        match_id: match_id.clone(),
        player_a: a.user_id,
        player_b: b.user_id,
        rating_a: a.rating,
        rating_b: b.rating,
        channel_a: a.channel_ref,
        channel_b: b.channel_ref,
        problems: deps.problems.clone(),
        persistence: deps.persistence.clone(),
        config: deps.config.clone(),
        presence: deps.presence.clone(),
        registry: deps.registry.clone(),
    };

    let (actor_ref, _join) = ractor::Actor::spawn(Some(match_id.clone()), MatchActor, args)
        .await
        .map_err(|e| crate::error::Error::Transport(format!("spawn match actor: {e}")))?;

    // Upgrades each player's `Claimed` marker (set atomically with pool removal in
    // `pair_and_claim`) to `InMatch` now that the runner exists.
    deps.presence.mark_in_match(a.user_id, actor_ref.clone());
    deps.presence.mark_in_match(b.user_id, actor_ref.clone());
    deps.registry.insert(match_id, actor_ref);

    Ok(())
}

#[allow(dead_code)]
fn default_tick_interval() -> Duration {
    Duration::from_secs(3)
}
