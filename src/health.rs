//! Liveness/readiness endpoints, mirroring the teacher's `health.rs` shape: a bare
//! liveness probe and a readiness probe that checks the collaborators this process
//! actually depends on.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::actors::registry::MatchRegistry;
use crate::db::DbPool;
use crate::matchmaking::MatchmakerLiveness;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub registry: Arc<MatchRegistry>,
    pub matchmaker: MatchmakerLiveness,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    database: bool,
    matchmaker_running: bool,
    active_matches: usize,
}

pub async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

pub async fn readiness(
    State(state): State<HealthState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let database = sqlx::query("SELECT 1")
        .execute(&state.db_pool)
        .await
        .is_ok();
    let matchmaker_running = state.matchmaker.is_running();

    let ready = database && matchmaker_running;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            checks: ReadinessChecks {
                database,
                matchmaker_running,
                active_matches: state.registry.match_count(),
            },
        }),
    )
}
