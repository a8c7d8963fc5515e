//! The problem repository is out of scope for the core (spec §1); this module
//! specifies the interface the match runner calls against it.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Problem;

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("repository returned {got} problems, needed {want}")]
    Insufficient { want: usize, got: usize },
    #[error("problem repository unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    /// Fetches exactly `n` random problems, or signals insufficiency (spec §6: the
    /// runner replies with an informational frame and terminates without a match
    /// record when this fails).
    async fn fetch_random_batch(&self, n: usize) -> Result<Vec<Problem>, ProblemError>;
}

pub struct HttpProblemRepository {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProblemRepository {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProblemRepository for HttpProblemRepository {
    async fn fetch_random_batch(&self, n: usize) -> Result<Vec<Problem>, ProblemError> {
        let resp = self
            .client
            .get(format!("{}/internal/problems/random", self.base_url))
            .query(&[("count", n)])
            .send()
            .await
            .map_err(|e| ProblemError::Unavailable(e.to_string()))?;

        let problems: Vec<Problem> = resp
            .json()
            .await
            .map_err(|e| ProblemError::Unavailable(e.to_string()))?;

        if problems.len() != n {
            return Err(ProblemError::Insufficient {
                want: n,
                got: problems.len(),
            });
        }

        Ok(problems)
    }
}
