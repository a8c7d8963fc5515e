//! Prometheus metrics, mirroring the teacher's `MetricsRecorder`: install the
//! recorder once at startup, describe each series, expose a render handler.

use axum::{http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        metrics::describe_counter!("duel_matches_started_total", "Total matches started");
        metrics::describe_counter!("duel_matches_finished_total", "Total matches finished, by result");
        metrics::describe_counter!("duel_matches_cancelled_total", "Total matches cancelled");
        metrics::describe_histogram!("duel_match_duration_seconds", "Wall-clock duration of a match");
        metrics::describe_gauge!("duel_waiting_pool_size", "Current size of the waiting pool");
        metrics::describe_counter!("duel_rate_limited_answers_total", "Answers rejected by the rate limiter");
        metrics::describe_counter!("duel_reconnects_total", "Successful mid-match reconnects");

        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> impl IntoResponse {
    (StatusCode::OK, handle.render())
}

pub fn record_match_started() {
    metrics::counter!("duel_matches_started_total", 1);
}

pub fn record_match_finished(result: &str) {
    metrics::counter!("duel_matches_finished_total", 1, "result" => result.to_string());
}

pub fn record_match_cancelled() {
    metrics::counter!("duel_matches_cancelled_total", 1);
}

pub fn record_rate_limited() {
    metrics::counter!("duel_rate_limited_answers_total", 1);
}

pub fn record_reconnect() {
    metrics::counter!("duel_reconnects_total", 1);
}

pub fn set_waiting_pool_size(size: usize) {
    metrics::gauge!("duel_waiting_pool_size", size as f64);
}
