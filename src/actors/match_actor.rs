//! The match runner (spec §4.5): the behavioural heart of the system, as a
//! `ractor::Actor`. Grounded on the teacher's `ConversationActor` for the overall
//! shape (a `pre_start` that does setup and returns initial state, a `handle` that
//! dispatches on a message enum, transaction-wrapped settlement), generalized from
//! "serialize conversation mutations" to "serialize match events and adjudicate them".

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tracing::{error, info, warn};

use super::messages::{EventKind, MatchEvent, MatchMsg};
use super::registry::MatchRegistry;
use crate::channel::DuelChannel;
use crate::config::Config;
use crate::db::Persistence;
use crate::elo;
use crate::models::{MatchId, MatchOutcome, MatchRecord, Problem, UserId};
use crate::normalize::answers_match;
use crate::presence::PresenceRegistry;
use crate::problems::ProblemRepository;
use crate::rate_limiter::RateLimiter;

pub struct MatchActorArgs {
    pub match_id: MatchId,
    pub player_a: UserId,
    pub player_b: UserId,
    pub rating_a: f64,
    pub rating_b: f64,
    pub channel_a: DuelChannel,
    pub channel_b: DuelChannel,
    pub problems: Arc<dyn ProblemRepository>,
    pub persistence: Arc<dyn Persistence>,
    pub config: Arc<Config>,
    pub presence: Arc<PresenceRegistry>,
    pub registry: Arc<MatchRegistry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Playing,
    AwaitingReconnect { disconnected: UserId },
    Settling,
    Finished,
}

struct Side {
    user_id: UserId,
    rating: f64,
    channel: DuelChannel,
    score: u32,
}

pub struct MatchActorState {
    match_id: MatchId,
    a: Side,
    b: Side,
    problems: Vec<Problem>,
    current: usize,
    resolved_current: bool,
    phase: Phase,
    deadline_generation: u64,
    reconnect_generation: u64,
    rate_limiter: RateLimiter,
    config: Arc<Config>,
    persistence: Arc<dyn Persistence>,
    presence: Arc<PresenceRegistry>,
    registry: Arc<MatchRegistry>,
}

impl MatchActorState {
    fn channel_for(&self, user_id: UserId) -> DuelChannel {
        if user_id == self.a.user_id {
            self.a.channel.clone()
        } else {
            self.b.channel.clone()
        }
    }

    fn opponent_channel(&self, user_id: UserId) -> DuelChannel {
        if user_id == self.a.user_id {
            self.b.channel.clone()
        } else {
            self.a.channel.clone()
        }
    }

    fn opponent_of(&self, user_id: UserId) -> UserId {
        if user_id == self.a.user_id {
            self.b.user_id
        } else {
            self.a.user_id
        }
    }

    fn set_channel(&mut self, user_id: UserId, channel: DuelChannel) {
        if user_id == self.a.user_id {
            self.a.channel = channel;
        } else {
            self.b.channel = channel;
        }
    }
}

/// Sends `frame` on `channel` (owned by `user_id`); a write failure is translated
/// into the same reconnect-wait transition as a synthetic `disconnected` event
/// (spec §4.6/§7: "send/receive failure -> synthetic disconnected event").
async fn send_checked(
    myself: &ActorRef<MatchMsg>,
    state: &mut MatchActorState,
    user_id: UserId,
    channel: DuelChannel,
    frame: impl Into<String>,
) {
    if channel.send(frame).await.is_err() {
        enter_reconnect_wait(myself, state, user_id);
    }
}

/// Puts `user_id` into `AwaitingReconnect` and arms the grace timer. Free function
/// (rather than a `MatchActor` method) so both event handling and `send_checked`
/// can reach it without needing a `&MatchActor` receiver.
fn enter_reconnect_wait(myself: &ActorRef<MatchMsg>, state: &mut MatchActorState, user_id: UserId) {
    if matches!(state.phase, Phase::AwaitingReconnect { .. } | Phase::Settling | Phase::Finished) {
        return;
    }
    info!(user_id, "entering reconnect wait");
    state.phase = Phase::AwaitingReconnect {
        disconnected: user_id,
    };
    state.reconnect_generation += 1;
    let generation = state.reconnect_generation;
    state.presence.detach(user_id);
    crate::presence::spawn_reconnect_timer(myself.clone(), state.config.reconnect_grace, generation);
}

pub struct MatchActor;

async fn send_current_problem(myself: &ActorRef<MatchMsg>, state: &mut MatchActorState) {
    let id = state.problems[state.current].id;
    let a_user = state.a.user_id;
    let b_user = state.b.user_id;
    let a_channel = state.a.channel.clone();
    let b_channel = state.b.channel.clone();
    send_checked(myself, state, a_user, a_channel, id.to_string()).await;
    send_checked(myself, state, b_user, b_channel, id.to_string()).await;
}

fn schedule_problem_timeout(myself: &ActorRef<MatchMsg>, state: &mut MatchActorState) {
    state.deadline_generation += 1;
    let generation = state.deadline_generation;
    let timeout = state.config.problem_timeout;
    let actor = myself.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = actor.cast(MatchMsg::ProblemTimeout { generation });
    });
}

async fn send_outcome(
    channel: &DuelChannel,
    result: MatchOutcome,
    is_a: bool,
    rating: f64,
    user_id: UserId,
) {
    let frame = match (result, is_a) {
        (MatchOutcome::Draw, _) => format!("draw {:.1}", rating),
        (MatchOutcome::AWins, true) | (MatchOutcome::BWins, false) => format!("win {:.1}", rating),
        (MatchOutcome::AWins, false) | (MatchOutcome::BWins, true) => format!("loss {:.1}", rating),
        (MatchOutcome::Cancelled, _) => return,
    };
    // The match is already Finished by the time this fires; there is no further
    // state transition to take, so a failure here is logged, not routed anywhere.
    if channel.send(frame).await.is_err() {
        warn!(user_id, "failed to deliver settlement frame");
    }
}

#[async_trait]
impl Actor for MatchActor {
    type Msg = MatchMsg;
    type State = MatchActorState;
    type Arguments = MatchActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let a_ok = args.channel_a.send("ping").await.is_ok();
        let b_ok = args.channel_b.send("ping").await.is_ok();

        if !a_ok || !b_ok {
            // Both players were marked `Claimed` atomically with pool removal
            // (spec §4.3). Release each one independently and symmetrically: the
            // survivor goes back to the pool as a fresh idle queued entry (never
            // through `attach`'s collision handling, which would mistake the
            // still-live channel for a stale duplicate and close it); the failed
            // side just has its claim dropped.
            if a_ok {
                args.presence
                    .release_claim_to_idle(args.player_a, args.rating_a, args.channel_a.clone());
            } else {
                args.presence.release_claim(args.player_a);
            }
            if b_ok {
                args.presence
                    .release_claim_to_idle(args.player_b, args.rating_b, args.channel_b.clone());
            } else {
                args.presence.release_claim(args.player_b);
            }
            warn!(match_id = %args.match_id, "handshake failed, aborting before match start");
            return Err("handshake failed".into());
        }

        let problems = match args.problems.fetch_random_batch(args.config.problem_count).await {
            Ok(p) => p,
            Err(e) => {
                let _ = args.channel_a.send("нет задач").await;
                let _ = args.channel_b.send("нет задач").await;
                args.channel_a.close().await;
                args.channel_b.close().await;
                args.presence.clear(args.player_a);
                args.presence.clear(args.player_b);
                return Err(format!("insufficient problems: {e}").into());
            }
        };

        let mut state = MatchActorState {
            match_id: args.match_id,
            a: Side {
                user_id: args.player_a,
                rating: args.rating_a,
                channel: args.channel_a,
                score: 0,
            },
            b: Side {
                user_id: args.player_b,
                rating: args.rating_b,
                channel: args.channel_b,
                score: 0,
            },
            problems,
            current: 0,
            resolved_current: false,
            phase: Phase::Playing,
            deadline_generation: 0,
            reconnect_generation: 0,
            rate_limiter: RateLimiter::new(args.config.rate_window, args.config.rate_max),
            config: args.config,
            persistence: args.persistence,
            presence: args.presence,
            registry: args.registry,
        };

        let a_user = state.a.user_id;
        let b_user = state.b.user_id;
        let a_channel = state.a.channel.clone();
        let b_channel = state.b.channel.clone();
        send_checked(&myself, &mut state, a_user, a_channel, "match started").await;
        send_checked(&myself, &mut state, b_user, b_channel, "match started").await;

        send_current_problem(&myself, &mut state).await;
        schedule_problem_timeout(&myself, &mut state);

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            MatchMsg::Event(event) => self.on_event(&myself, state, event).await?,
            MatchMsg::Reattach { user_id, channel } => {
                self.on_reattach(&myself, state, user_id, channel).await
            }
            MatchMsg::ProblemTimeout { generation } => {
                self.on_problem_timeout(&myself, state, generation).await?
            }
            MatchMsg::ReconnectTimeout { generation } => {
                self.on_reconnect_timeout(&myself, state, generation).await?
            }
            MatchMsg::Shutdown => self.cancel_match(state).await,
        }
        Ok(())
    }
}

impl MatchActor {
    async fn on_event(
        &self,
        myself: &ActorRef<MatchMsg>,
        state: &mut MatchActorState,
        event: MatchEvent,
    ) -> Result<(), ActorProcessingErr> {
        if matches!(state.phase, Phase::Settling | Phase::Finished) {
            return Ok(());
        }

        match event.kind {
            EventKind::Chat(payload) => {
                let opponent_user = state.opponent_of(event.user_id);
                let opponent = state.opponent_channel(event.user_id);
                send_checked(myself, state, opponent_user, opponent, format!("chat message {payload}")).await;
            }
            EventKind::Emoji(payload) => {
                let opponent_user = state.opponent_of(event.user_id);
                let opponent = state.opponent_channel(event.user_id);
                send_checked(myself, state, opponent_user, opponent, format!("emoji {payload}")).await;
            }
            EventKind::Disconnected => {
                enter_reconnect_wait(myself, state, event.user_id);
            }
            EventKind::Answer(text) => {
                self.handle_answer(myself, state, event.user_id, text).await?;
            }
        }
        Ok(())
    }

    async fn handle_answer(
        &self,
        myself: &ActorRef<MatchMsg>,
        state: &mut MatchActorState,
        user_id: UserId,
        text: String,
    ) -> Result<(), ActorProcessingErr> {
        if state.resolved_current {
            return Ok(());
        }

        let now = Instant::now();
        if !state.rate_limiter.check_and_record(user_id, now) {
            let channel = state.channel_for(user_id);
            let secs = state.config.rate_window.as_secs();
            send_checked(
                myself,
                state,
                user_id,
                channel,
                format!("please wait {secs} seconds between answers"),
            )
            .await;
            return Ok(());
        }

        let canonical = state.problems[state.current].canonical_answer.clone();
        if answers_match(&text, &canonical) {
            state.resolved_current = true;
            if user_id == state.a.user_id {
                state.a.score += 1;
            } else {
                state.b.score += 1;
            }
            let channel = state.channel_for(user_id);
            send_checked(myself, state, user_id, channel, "correct").await;
            let opponent_user = state.opponent_of(user_id);
            let opponent = state.opponent_channel(user_id);
            send_checked(
                myself,
                state,
                opponent_user,
                opponent,
                "other player answered. next task",
            )
            .await;
            self.advance_problem(myself, state).await?;
        } else {
            let channel = state.channel_for(user_id);
            send_checked(myself, state, user_id, channel, "incorrect").await;
        }
        Ok(())
    }

    async fn advance_problem(
        &self,
        myself: &ActorRef<MatchMsg>,
        state: &mut MatchActorState,
    ) -> Result<(), ActorProcessingErr> {
        let majority = state.problems.len() / 2;
        if state.a.score as usize > majority || state.b.score as usize > majority {
            self.settle(state).await;
            return Ok(());
        }

        state.current += 1;
        if state.current >= state.problems.len() {
            self.settle(state).await;
            return Ok(());
        }

        state.resolved_current = false;
        send_current_problem(myself, state).await;
        schedule_problem_timeout(myself, state);
        Ok(())
    }

    async fn on_problem_timeout(
        &self,
        myself: &ActorRef<MatchMsg>,
        state: &mut MatchActorState,
        generation: u64,
    ) -> Result<(), ActorProcessingErr> {
        if generation != state.deadline_generation
            || matches!(state.phase, Phase::Settling | Phase::Finished)
        {
            return Ok(());
        }

        let a_user = state.a.user_id;
        let b_user = state.b.user_id;
        let a_channel = state.a.channel.clone();
        let b_channel = state.b.channel.clone();
        send_checked(myself, state, a_user, a_channel, "time is up. next task").await;
        send_checked(myself, state, b_user, b_channel, "time is up. next task").await;
        state.resolved_current = true;
        self.advance_problem(myself, state).await
    }

    async fn on_reattach(
        &self,
        myself: &ActorRef<MatchMsg>,
        state: &mut MatchActorState,
        user_id: UserId,
        channel: DuelChannel,
    ) {
        if let Phase::AwaitingReconnect { disconnected } = state.phase {
            if disconnected == user_id {
                state.set_channel(user_id, channel.clone());
                state.phase = Phase::Playing;
                send_checked(myself, state, user_id, channel.clone(), "match started").await;
                let id = state.problems[state.current].id;
                send_checked(myself, state, user_id, channel, id.to_string()).await;
                info!(user_id, "reconnected mid-match");
            }
        }
    }

    async fn on_reconnect_timeout(
        &self,
        _myself: &ActorRef<MatchMsg>,
        state: &mut MatchActorState,
        generation: u64,
    ) -> Result<(), ActorProcessingErr> {
        if generation != state.reconnect_generation {
            return Ok(());
        }
        if matches!(state.phase, Phase::AwaitingReconnect { .. }) {
            self.cancel_match(state).await;
        }
        Ok(())
    }

    async fn cancel_match(&self, state: &mut MatchActorState) {
        state.phase = Phase::Settling;
        if state.a.channel.send("opponent disconnected").await.is_err() {
            warn!(user_id = state.a.user_id, "failed to deliver cancellation frame");
        }
        if state.b.channel.send("opponent disconnected").await.is_err() {
            warn!(user_id = state.b.user_id, "failed to deliver cancellation frame");
        }
        state.a.channel.close().await;
        state.b.channel.close().await;

        let record = MatchRecord {
            player_a: state.a.user_id,
            player_b: state.b.user_id,
            result: MatchOutcome::Cancelled,
            delta_a: 0.0,
            delta_b: 0.0,
            created_at: Utc::now(),
        };

        if let Err(e) = state.persistence.settle_match(&record).await {
            error!(error = %e, "failed to persist cancelled match");
        }

        state.presence.clear(state.a.user_id);
        state.presence.clear(state.b.user_id);
        state.registry.remove(&state.match_id);
        state.phase = Phase::Finished;
    }

    async fn settle(&self, state: &mut MatchActorState) {
        state.phase = Phase::Settling;

        let (result, s_a, s_b) = if state.a.score == state.b.score {
            (MatchOutcome::Draw, elo::DRAW, elo::DRAW)
        } else if state.a.score > state.b.score {
            (MatchOutcome::AWins, elo::WIN, elo::LOSS)
        } else {
            (MatchOutcome::BWins, elo::LOSS, elo::WIN)
        };

        let delta_a = elo::rating_delta(state.a.rating, state.b.rating, s_a, state.config.k_factor);
        let delta_b = elo::rating_delta(state.b.rating, state.a.rating, s_b, state.config.k_factor);

        let record = MatchRecord {
            player_a: state.a.user_id,
            player_b: state.b.user_id,
            result,
            delta_a,
            delta_b,
            created_at: Utc::now(),
        };

        let mut settled = state.persistence.settle_match(&record).await;
        if settled.is_err() {
            warn!("settlement failed once, retrying");
            settled = state.persistence.settle_match(&record).await;
        }

        match settled {
            Ok((new_rating_a, new_rating_b)) => {
                let a_user = state.a.user_id;
                let b_user = state.b.user_id;
                send_outcome(&state.a.channel, result, true, new_rating_a, a_user).await;
                send_outcome(&state.b.channel, result, false, new_rating_b, b_user).await;
                state.a.channel.close().await;
                state.b.channel.close().await;
                state.presence.clear(state.a.user_id);
                state.presence.clear(state.b.user_id);
                state.registry.remove(&state.match_id);
                state.phase = Phase::Finished;
            }
            Err(e) => {
                error!(error = %e, "settlement failed twice, degrading to cancellation");
                self.cancel_match(state).await;
            }
        }
    }
}
