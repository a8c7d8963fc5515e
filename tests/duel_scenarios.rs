//! End-to-end duel scenarios driven against the in-memory test doubles (no database
//! required). Mirrors the six concrete scenarios enumerated for the match runner and
//! waiting pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use duel_server::actors::match_actor::{MatchActor, MatchActorArgs};
use duel_server::actors::messages::{EventKind, MatchEvent, MatchMsg};
use duel_server::actors::registry::MatchRegistry;
use duel_server::channel::ChannelCommand;
use duel_server::config::Config;
use duel_server::matchmaking::pool::{WaitingEntry, WaitingPool};
use duel_server::models::Problem;
use duel_server::presence::PresenceRegistry;
use duel_server::testing::{FixedProblemRepository, InMemoryPersistence};

async fn drain_text(rx: &mut tokio::sync::mpsc::Receiver<ChannelCommand>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(Some(cmd)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
        match cmd {
            ChannelCommand::Send(s) => out.push(s),
            ChannelCommand::Close => break,
        }
    }
    out
}

fn test_channel() -> (
    duel_server::channel::DuelChannel,
    tokio::sync::mpsc::Receiver<ChannelCommand>,
) {
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    (duel_server::channel::DuelChannel::new(tx), rx)
}

#[tokio::test]
async fn draw_scenario_settles_with_half_k_deltas() {
    let (channel_a, mut rx_a) = test_channel();
    let (channel_b, mut rx_b) = test_channel();

    let problems = vec![
        Problem {
            id: 1,
            canonical_answer: "paris".into(),
        },
        Problem {
            id: 2,
            canonical_answer: "tokyo".into(),
        },
        Problem {
            id: 3,
            canonical_answer: "berlin".into(),
        },
    ];

    let mut ratings = HashMap::new();
    ratings.insert(1, 1000.0);
    ratings.insert(2, 1000.0);
    let persistence = Arc::new(InMemoryPersistence::new(ratings));

    let pool = Arc::new(parking_lot::Mutex::new(WaitingPool::new()));
    let presence = Arc::new(PresenceRegistry::new(pool));
    let config = Arc::new(Config::default());

    let args = MatchActorArgs {
        match_id: "m1".into(),
        player_a: 1,
        player_b: 2,
        rating_a: 1000.0,
        rating_b: 1000.0,
        channel_a: channel_a.clone(),
        channel_b: channel_b.clone(),
        problems: Arc::new(FixedProblemRepository::new(problems)),
        persistence: persistence.clone(),
        config,
        presence,
        registry: Arc::new(MatchRegistry::new()),
    };

    let (actor_ref, _handle) = ractor::Actor::spawn(None, MatchActor, args)
        .await
        .expect("actor spawns");

    let a_frames = drain_text(&mut rx_a).await;
    assert!(a_frames.contains(&"ping".to_string()));
    assert!(a_frames.contains(&"match started".to_string()));

    // Problem 1: A answers correctly.
    actor_ref
        .cast(MatchMsg::Event(MatchEvent {
            user_id: 1,
            kind: EventKind::Answer("Paris".into()),
        }))
        .unwrap();
    drain_text(&mut rx_a).await;
    drain_text(&mut rx_b).await;

    // Problem 2: B answers correctly.
    actor_ref
        .cast(MatchMsg::Event(MatchEvent {
            user_id: 2,
            kind: EventKind::Answer("tokyo".into()),
        }))
        .unwrap();
    drain_text(&mut rx_a).await;
    drain_text(&mut rx_b).await;

    // Problem 3: nobody answers; force a timeout via a direct cast using generation 2
    // (the second scheduled timer, 0-indexed after the first problem's generation 1).
    actor_ref
        .cast(MatchMsg::ProblemTimeout { generation: 3 })
        .unwrap();

    let a_final = drain_text(&mut rx_a).await;
    let b_final = drain_text(&mut rx_b).await;

    let a_outcome = a_final.iter().find(|f| f.starts_with("draw"));
    let b_outcome = b_final.iter().find(|f| f.starts_with("draw"));
    assert!(a_outcome.is_some(), "expected a draw frame for A, got {a_final:?}");
    assert!(b_outcome.is_some(), "expected a draw frame for B, got {b_final:?}");

    assert_eq!(persistence.records.lock().unwrap().len(), 1);
}

/// Scenario 3 (spec §8): four wrong answers inside the rate window; the first three
/// get `incorrect`, the fourth gets the rate-limit reply and isn't counted.
#[tokio::test]
async fn rate_limit_scenario_blocks_fourth_wrong_answer_in_window() {
    let (channel_a, mut rx_a) = test_channel();
    let (channel_b, _rx_b) = test_channel();

    let problems = vec![Problem {
        id: 1,
        canonical_answer: "paris".into(),
    }];

    let mut ratings = HashMap::new();
    ratings.insert(1, 1000.0);
    ratings.insert(2, 1000.0);
    let persistence = Arc::new(InMemoryPersistence::new(ratings));
    let pool = Arc::new(parking_lot::Mutex::new(WaitingPool::new()));
    let presence = Arc::new(PresenceRegistry::new(pool));

    let args = MatchActorArgs {
        match_id: "m-rate".into(),
        player_a: 1,
        player_b: 2,
        rating_a: 1000.0,
        rating_b: 1000.0,
        channel_a: channel_a.clone(),
        channel_b: channel_b.clone(),
        problems: Arc::new(FixedProblemRepository::new(problems)),
        persistence,
        config: Arc::new(Config::default()),
        presence,
        registry: Arc::new(MatchRegistry::new()),
    };

    let (actor_ref, _handle) = ractor::Actor::spawn(None, MatchActor, args)
        .await
        .expect("actor spawns");
    drain_text(&mut rx_a).await;

    for _ in 0..3 {
        actor_ref
            .cast(MatchMsg::Event(MatchEvent {
                user_id: 1,
                kind: EventKind::Answer("wrong".into()),
            }))
            .unwrap();
        let frames = drain_text(&mut rx_a).await;
        assert_eq!(frames, vec!["incorrect".to_string()]);
    }

    actor_ref
        .cast(MatchMsg::Event(MatchEvent {
            user_id: 1,
            kind: EventKind::Answer("wrong".into()),
        }))
        .unwrap();
    let fourth = drain_text(&mut rx_a).await;
    assert_eq!(
        fourth,
        vec!["please wait 10 seconds between answers".to_string()]
    );
}

/// Scenario 4 (spec §8): a disconnect mid-problem followed by a reattach within the
/// grace window resumes the match on the new channel without resetting the deadline.
#[tokio::test]
async fn reconnect_success_resumes_on_new_channel() {
    let (channel_a, mut rx_a) = test_channel();
    let (channel_b, mut rx_b) = test_channel();

    let problems = vec![Problem {
        id: 7,
        canonical_answer: "paris".into(),
    }];

    let mut ratings = HashMap::new();
    ratings.insert(1, 1000.0);
    ratings.insert(2, 1000.0);
    let persistence = Arc::new(InMemoryPersistence::new(ratings));
    let pool = Arc::new(parking_lot::Mutex::new(WaitingPool::new()));
    let presence = Arc::new(PresenceRegistry::new(pool));

    let args = MatchActorArgs {
        match_id: "m-reconnect-ok".into(),
        player_a: 1,
        player_b: 2,
        rating_a: 1000.0,
        rating_b: 1000.0,
        channel_a: channel_a.clone(),
        channel_b: channel_b.clone(),
        problems: Arc::new(FixedProblemRepository::new(problems)),
        persistence,
        config: Arc::new(Config::default()),
        presence,
        registry: Arc::new(MatchRegistry::new()),
    };

    let (actor_ref, _handle) = ractor::Actor::spawn(None, MatchActor, args)
        .await
        .expect("actor spawns");
    drain_text(&mut rx_a).await;
    drain_text(&mut rx_b).await;

    actor_ref
        .cast(MatchMsg::Event(MatchEvent {
            user_id: 1,
            kind: EventKind::Disconnected,
        }))
        .unwrap();

    let (new_channel, mut new_rx) = test_channel();
    actor_ref
        .cast(MatchMsg::Reattach {
            user_id: 1,
            channel: new_channel,
        })
        .unwrap();

    let reattach_frames = drain_text(&mut new_rx).await;
    assert!(reattach_frames.contains(&"match started".to_string()));
    assert!(reattach_frames.contains(&"7".to_string()));

    // The opponent never saw a cancellation; the match is still live.
    let b_frames = drain_text(&mut rx_b).await;
    assert!(!b_frames.iter().any(|f| f == "opponent disconnected"));
}

/// Scenario 5 (spec §8): a disconnect with no reattach before the grace timer fires
/// cancels the match, notifies both sides, and persists a zero-delta record.
#[tokio::test]
async fn reconnect_timeout_cancels_and_persists_zero_deltas() {
    let (channel_a, mut rx_a) = test_channel();
    let (channel_b, mut rx_b) = test_channel();

    let problems = vec![Problem {
        id: 1,
        canonical_answer: "paris".into(),
    }];

    let mut ratings = HashMap::new();
    ratings.insert(1, 1000.0);
    ratings.insert(2, 1000.0);
    let persistence = Arc::new(InMemoryPersistence::new(ratings));
    let pool = Arc::new(parking_lot::Mutex::new(WaitingPool::new()));
    let presence = Arc::new(PresenceRegistry::new(pool));
    let registry = Arc::new(MatchRegistry::new());

    let args = MatchActorArgs {
        match_id: "m-reconnect-timeout".into(),
        player_a: 1,
        player_b: 2,
        rating_a: 1000.0,
        rating_b: 1000.0,
        channel_a: channel_a.clone(),
        channel_b: channel_b.clone(),
        problems: Arc::new(FixedProblemRepository::new(problems)),
        persistence: persistence.clone(),
        config: Arc::new(Config::default()),
        presence,
        registry: registry.clone(),
    };

    let (actor_ref, _handle) = ractor::Actor::spawn(None, MatchActor, args)
        .await
        .expect("actor spawns");
    registry.insert("m-reconnect-timeout".into(), actor_ref.clone());
    drain_text(&mut rx_a).await;
    drain_text(&mut rx_b).await;

    actor_ref
        .cast(MatchMsg::Event(MatchEvent {
            user_id: 1,
            kind: EventKind::Disconnected,
        }))
        .unwrap();

    // No reattach arrives; the grace timer's generation (1, the first reconnect
    // wait entered) fires directly.
    actor_ref
        .cast(MatchMsg::ReconnectTimeout { generation: 1 })
        .unwrap();

    let a_final = drain_text(&mut rx_a).await;
    let b_final = drain_text(&mut rx_b).await;
    assert!(a_final.contains(&"opponent disconnected".to_string()));
    assert!(b_final.contains(&"opponent disconnected".to_string()));

    let records = persistence.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].delta_a, 0.0);
    assert_eq!(records[0].delta_b, 0.0);
    drop(records);

    assert!(registry.get("m-reconnect-timeout").is_none());
}

#[test]
fn fast_pairing_and_tolerance_growth_match_spec_scenarios() {
    use std::time::Instant;

    let mut pool = WaitingPool::new();
    let t0 = Instant::now();
    let (ch, _rx) = {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        (duel_server::channel::DuelChannel::new(tx), rx)
    };

    pool.insert(WaitingEntry {
        user_id: 1,
        rating: 1000.0,
        joined_at: t0,
        channel_ref: ch.clone(),
    });
    pool.insert(WaitingEntry {
        user_id: 2,
        rating: 1050.0,
        joined_at: t0 + Duration::from_millis(500),
        channel_ref: ch,
    });

    let pairs = pool.pairing_scan(t0 + Duration::from_secs(2), 50.0);
    assert_eq!(pairs.len(), 1);
}
