//! Attempt recorder trait and its request types.
//!
//! The recorder persists attempt starts, answers and completions and serves
//! the admin queries. Implementations live in `secquiz-recorder`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    AttemptId, AttemptResult, AttemptSummary, OutcomeKind, QuestionRecord, StoredResponse,
};
use crate::scoring::{statistics, AggregateStatistics};

/// Trait for stores that record quiz attempts.
#[async_trait]
pub trait AttemptRecorder: Send + Sync {
    /// Human-readable recorder name (e.g. "supabase").
    fn name(&self) -> &str;

    /// Create the attempt row. Returns the id the store filed it under.
    async fn start_attempt(&self, request: &StartAttemptRequest) -> anyhow::Result<AttemptId>;

    /// Store an answered question.
    async fn record_answer(&self, request: &AnswerRequest) -> anyhow::Result<()>;

    /// Store a skipped or timed-out question.
    async fn record_skip(&self, request: &SkipRequest) -> anyhow::Result<()>;

    /// Mark the attempt completed and return the store's view of the result.
    async fn complete_attempt(&self, request: &CompleteRequest) -> anyhow::Result<AttemptResult>;

    /// Attempts, newest first, optionally limited to one user.
    async fn list_attempts(&self, user_id: Option<&str>) -> anyhow::Result<Vec<AttemptSummary>>;

    /// Stored responses of one attempt, ordered by question id.
    async fn attempt_responses(&self, attempt_id: AttemptId)
        -> anyhow::Result<Vec<StoredResponse>>;

    /// Statistics over every completed attempt in the store.
    async fn aggregate_statistics(&self) -> anyhow::Result<AggregateStatistics> {
        let attempts = self.list_attempts(None).await?;
        Ok(statistics(&attempts)?)
    }
}

/// Request to open a new attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptRequest {
    /// Issued by the session so dispatch never waits on the store.
    pub attempt_id: AttemptId,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    /// Snapshot of the session's question set.
    pub questions: Vec<Arc<QuestionRecord>>,
}

/// An answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub attempt_id: AttemptId,
    pub question_id: u32,
    pub question_text: String,
    pub submitted_option: String,
    pub correct_option: String,
    pub response_time_seconds: u32,
}

impl AnswerRequest {
    pub fn is_correct(&self) -> bool {
        !self.submitted_option.is_empty() && self.submitted_option == self.correct_option
    }
}

/// A question resolved without a chosen option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRequest {
    pub attempt_id: AttemptId,
    pub question_id: u32,
    pub question_text: String,
    pub correct_option: String,
    /// `Skipped`, `TimedOut`, or `Answered` for an empty submission.
    pub outcome: OutcomeKind,
    /// The full per-question limit, except for an empty submission, which
    /// carries the seconds elapsed before it.
    pub response_time_seconds: u32,
}

/// Request to close an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub attempt_id: AttemptId,
    pub total_time_seconds: u32,
}
