//! Runtime configuration, loaded from the environment the way the teacher's
//! `db::DbConfig` is: typed fields with sane defaults, read once at startup.

use std::time::Duration;

/// Fixed rank thresholds (rating -> band name). Not environment-tunable: they define
/// the glossary's rank bands, not a tunable policy knob.
pub const RANK_THRESHOLDS: &[(f64, &str)] = &[
    (0.0, "Bronze"),
    (1200.0, "Silver"),
    (1700.0, "Gold"),
    (2300.0, "Elite"),
    (3000.0, "Sensei"),
    (5000.0, "Legend"),
];

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,

    /// N: number of problems per match.
    pub problem_count: usize,
    /// T_problem: per-problem deadline.
    pub problem_timeout: Duration,
    /// W: sliding rate-limit window.
    pub rate_window: Duration,
    /// R: max answers per window.
    pub rate_max: usize,
    /// G: reconnect grace, clamped to [5, 15] seconds.
    pub reconnect_grace: Duration,
    /// Matchmaker tick interval.
    pub matchmake_interval: Duration,
    /// Rating points of tolerance per second of wait.
    pub tolerance_slope: f64,
    /// Elo K-factor.
    pub k_factor: f64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        let reconnect_grace_secs: u64 = env_or("DUEL_RECONNECT_GRACE_SECS", 10).clamp(5, 15);

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/duel".to_string()),
            server_port: env_or("SERVER_PORT", 8080),
            problem_count: env_or("DUEL_PROBLEM_COUNT", 3),
            problem_timeout: Duration::from_secs(env_or("DUEL_PROBLEM_TIMEOUT_SECS", 120)),
            rate_window: Duration::from_secs(env_or("DUEL_RATE_WINDOW_SECS", 10)),
            rate_max: env_or("DUEL_RATE_MAX", 3),
            reconnect_grace: Duration::from_secs(reconnect_grace_secs),
            matchmake_interval: Duration::from_secs(env_or("DUEL_MATCHMAKE_INTERVAL_SECS", 3)),
            tolerance_slope: env_or("DUEL_TOLERANCE_SLOPE", 50.0),
            k_factor: env_or("DUEL_K_FACTOR", 32.0),
        }
    }
}

/// Recompute the rank band for a rating by walking the fixed threshold table.
pub fn rank_for_rating(rating: f64) -> &'static str {
    let mut band = RANK_THRESHOLDS[0].1;
    for (threshold, name) in RANK_THRESHOLDS {
        if rating >= *threshold {
            band = name;
        } else {
            break;
        }
    }
    band
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_bands_follow_thresholds() {
        assert_eq!(rank_for_rating(0.0), "Bronze");
        assert_eq!(rank_for_rating(1199.9), "Bronze");
        assert_eq!(rank_for_rating(1200.0), "Silver");
        assert_eq!(rank_for_rating(1699.9), "Silver");
        assert_eq!(rank_for_rating(1700.0), "Gold");
        assert_eq!(rank_for_rating(2300.0), "Elite");
        assert_eq!(rank_for_rating(3000.0), "Sensei");
        assert_eq!(rank_for_rating(5000.0), "Legend");
        assert_eq!(rank_for_rating(9999.0), "Legend");
    }

    #[test]
    fn reconnect_grace_env_clamps() {
        std::env::set_var("DUEL_RECONNECT_GRACE_SECS", "1");
        let cfg = Config::default();
        assert_eq!(cfg.reconnect_grace, Duration::from_secs(5));
        std::env::set_var("DUEL_RECONNECT_GRACE_SECS", "60");
        let cfg = Config::default();
        assert_eq!(cfg.reconnect_grace, Duration::from_secs(15));
        std::env::remove_var("DUEL_RECONNECT_GRACE_SECS");
    }
}
