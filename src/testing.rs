//! In-memory test doubles for the out-of-scope collaborators, so end-to-end duel
//! scenarios can run without a live Postgres instance or identity/problem services.
//! Integration tests that do need a real database follow the teacher's
//! `DATABASE_URL`/`TEST_DATABASE_URL`-gated convention instead (see `tests/`).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::{Persistence, PersistenceError, ResolvedUser};
use crate::identity::{IdentityError, IdentityProvider, ResolvedIdentity};
use crate::models::{MatchRecord, UserId};
use crate::problems::{ProblemError, ProblemRepository};

/// Fixed identity map, keyed by opaque token == stringified user id for simplicity.
pub struct InMemoryIdentityProvider {
    users: HashMap<String, ResolvedIdentity>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
        }
    }

    pub fn with_user(mut self, token: &str, user_id: UserId, rating: f64) -> Self {
        self.users.insert(
            token.to_string(),
            ResolvedIdentity {
                user_id,
                display_name: format!("user-{user_id}"),
                rating,
                banned: false,
            },
        );
        self
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn resolve_token(&self, token: &str) -> Result<ResolvedIdentity, IdentityError> {
        self.users
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)
    }

    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedIdentity, IdentityError> {
        self.users
            .values()
            .find(|u| u.user_id == user_id)
            .cloned()
            .ok_or(IdentityError::InvalidToken)
    }
}

/// Always returns the same fixed batch, truncated/rejected against the requested size.
pub struct FixedProblemRepository {
    problems: Vec<crate::models::Problem>,
}

impl FixedProblemRepository {
    pub fn new(problems: Vec<crate::models::Problem>) -> Self {
        Self { problems }
    }
}

#[async_trait]
impl ProblemRepository for FixedProblemRepository {
    async fn fetch_random_batch(
        &self,
        n: usize,
    ) -> Result<Vec<crate::models::Problem>, ProblemError> {
        if self.problems.len() < n {
            return Err(ProblemError::Insufficient {
                want: n,
                got: self.problems.len(),
            });
        }
        Ok(self.problems[..n].to_vec())
    }
}

/// Records settlement calls in memory, applying deltas to an in-process rating map so
/// tests can assert on the post-settlement state without a database.
pub struct InMemoryPersistence {
    ratings: Mutex<HashMap<UserId, f64>>,
    pub records: Mutex<Vec<MatchRecord>>,
}

impl InMemoryPersistence {
    pub fn new(initial_ratings: HashMap<UserId, f64>) -> Self {
        Self {
            ratings: Mutex::new(initial_ratings),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn rating_of(&self, user_id: UserId) -> f64 {
        *self.ratings.lock().unwrap().get(&user_id).unwrap_or(&1000.0)
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedUser, PersistenceError> {
        let rating = self.rating_of(user_id);
        Ok(ResolvedUser {
            username: format!("user-{user_id}"),
            rating,
            banned: false,
        })
    }

    async fn settle_match(&self, record: &MatchRecord) -> Result<(f64, f64), PersistenceError> {
        let mut ratings = self.ratings.lock().unwrap();
        let new_a = ratings.entry(record.player_a).or_insert(1000.0);
        *new_a += record.delta_a;
        let new_a = *new_a;

        let new_b = ratings.entry(record.player_b).or_insert(1000.0);
        *new_b += record.delta_b;
        let new_b = *new_b;

        self.records.lock().unwrap().push(record.clone());
        Ok((new_a, new_b))
    }
}
