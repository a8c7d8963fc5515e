//! Database setup and the `Persistence` interface, mirroring the teacher's `db.rs`
//! (`DbConfig`, `init_db`) and `storage.rs` (thin trait over the pool).

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::Pool;
use thiserror::Error;
use tracing::info;

use crate::models::{MatchRecord, RatingHistoryRecord, UserId};

pub type DbPool = Pool<Postgres>;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/duel".to_string()),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

pub async fn init_db(config: &DbConfig) -> Result<DbPool, sqlx::Error> {
    info!(max_connections = config.max_connections, "connecting to database");
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn init_db_default() -> Result<DbPool, sqlx::Error> {
    init_db(&DbConfig::from_env()).await
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unknown user {0}")]
    UnknownUser(UserId),
}

#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub username: String,
    pub rating: f64,
    pub banned: bool,
}

/// What the match runner needs from the persistent store (spec §6). Settlement and
/// cancellation both go through `settle_match`, which is responsible for the
/// rating-update + match-record + two-history-rows transaction in one go.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedUser, PersistenceError>;

    /// Applies the settlement (or cancellation, when both deltas are zero and the
    /// result is `cancelled`) atomically: rating deltas, one match record, two rating
    /// history rows. Returns the post-settlement ratings for `(player_a, player_b)`.
    async fn settle_match(
        &self,
        record: &MatchRecord,
    ) -> Result<(f64, f64), PersistenceError>;
}

pub struct PostgresPersistence {
    pool: DbPool,
}

impl PostgresPersistence {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Persistence for PostgresPersistence {
    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedUser, PersistenceError> {
        let row = sqlx::query_as::<_, (String, f64, bool)>(
            "SELECT username, rating, banned FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (username, rating, banned) = row.ok_or(PersistenceError::UnknownUser(user_id))?;
        Ok(ResolvedUser {
            username,
            rating,
            banned,
        })
    }

    async fn settle_match(
        &self,
        record: &MatchRecord,
    ) -> Result<(f64, f64), PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let new_rating_a: f64 = sqlx::query_scalar(
            "UPDATE users SET rating = rating + $1, rank = rank WHERE id = $2 RETURNING rating",
        )
        .bind(record.delta_a)
        .bind(record.player_a)
        .fetch_one(&mut *tx)
        .await?;

        let new_rating_b: f64 = sqlx::query_scalar(
            "UPDATE users SET rating = rating + $1, rank = rank WHERE id = $2 RETURNING rating",
        )
        .bind(record.delta_b)
        .bind(record.player_b)
        .fetch_one(&mut *tx)
        .await?;

        let rank_a = crate::config::rank_for_rating(new_rating_a);
        let rank_b = crate::config::rank_for_rating(new_rating_b);
        sqlx::query("UPDATE users SET rank = $1 WHERE id = $2")
            .bind(rank_a)
            .bind(record.player_a)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE users SET rank = $1 WHERE id = $2")
            .bind(rank_b)
            .bind(record.player_b)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO pvp_matches (player_a, player_b, result, delta_a, delta_b, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.player_a)
        .bind(record.player_b)
        .bind(record.result.as_str())
        .bind(record.delta_a)
        .bind(record.delta_b)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        for history in [
            RatingHistoryRecord {
                user_id: record.player_a,
                rating_after: new_rating_a,
                delta: record.delta_a,
                created_at: record.created_at,
            },
            RatingHistoryRecord {
                user_id: record.player_b,
                rating_after: new_rating_b,
                delta: record.delta_b,
                created_at: record.created_at,
            },
        ] {
            sqlx::query(
                "INSERT INTO rating_history (user_id, rating_after, delta, created_at)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(history.user_id)
            .bind(history.rating_after)
            .bind(history.delta)
            .bind(history.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((new_rating_a, new_rating_b))
    }
}
