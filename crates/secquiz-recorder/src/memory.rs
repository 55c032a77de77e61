//! In-memory attempt recorder for tests and offline play.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use secquiz_core::error::RecorderError;
use secquiz_core::model::{ActivityKind, AttemptId, AttemptResult, AttemptSummary, StoredResponse};
use secquiz_core::scoring::{PassPolicy, DEFAULT_PASS_THRESHOLD};
use secquiz_core::traits::{
    AnswerRequest, AttemptRecorder, CompleteRequest, SkipRequest, StartAttemptRequest,
};

/// One entry of the user activity log.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub user_id: String,
    pub kind: ActivityKind,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Store {
    attempts: Vec<AttemptSummary>,
    responses: Vec<StoredResponse>,
    activity: Vec<ActivityEntry>,
}

impl Store {
    fn attempt_mut(&mut self, id: AttemptId) -> Result<&mut AttemptSummary, RecorderError> {
        self.attempts
            .iter_mut()
            .find(|a| a.attempt_id == id)
            .ok_or_else(|| RecorderError::NotFound(id.to_string()))
    }

    fn owner(&self, id: AttemptId) -> Result<String, RecorderError> {
        self.attempts
            .iter()
            .find(|a| a.attempt_id == id)
            .map(|a| a.user_id.clone())
            .ok_or_else(|| RecorderError::NotFound(id.to_string()))
    }

    fn log(&mut self, user_id: String, kind: ActivityKind, details: serde_json::Value) {
        self.activity.push(ActivityEntry {
            user_id,
            kind,
            details,
            at: Utc::now(),
        });
    }
}

/// Attempt store held in process memory.
///
/// Completion scores from the stored responses, the same way the hosted
/// store does, so a lost answer shows up as a score mismatch.
pub struct InMemoryRecorder {
    policy: PassPolicy,
    store: Mutex<Store>,
    call_count: AtomicU32,
    failing: AtomicBool,
}

impl Default for InMemoryRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_PASS_THRESHOLD)
    }
}

impl InMemoryRecorder {
    pub fn new(pass_threshold: u32) -> Self {
        Self {
            policy: PassPolicy::new(pass_threshold),
            store: Mutex::new(Store::default()),
            call_count: AtomicU32::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with `RecorderError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of trait calls made, including failed ones.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// The activity log, oldest first.
    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.store().activity.clone()
    }

    pub fn attempt(&self, id: AttemptId) -> Option<AttemptSummary> {
        self.store()
            .attempts
            .iter()
            .find(|a| a.attempt_id == id)
            .cloned()
    }

    pub fn response_count(&self, id: AttemptId) -> usize {
        self.store()
            .responses
            .iter()
            .filter(|r| r.attempt_id == id)
            .count()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self) -> Result<MutexGuard<'_, Store>, RecorderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(RecorderError::Unavailable("in-memory recorder switched off".into()));
        }
        Ok(self.store())
    }
}

#[async_trait]
impl AttemptRecorder for InMemoryRecorder {
    fn name(&self) -> &str {
        "memory"
    }

    async fn start_attempt(&self, request: &StartAttemptRequest) -> anyhow::Result<AttemptId> {
        let mut store = self.enter()?;
        if store.attempts.iter().any(|a| a.attempt_id == request.attempt_id) {
            return Err(RecorderError::Rejected {
                status: 409,
                message: format!("attempt {} already exists", request.attempt_id),
            }
            .into());
        }
        store.attempts.push(AttemptSummary {
            attempt_id: request.attempt_id,
            user_id: request.user_id.clone(),
            started_at: request.started_at,
            completed_at: None,
            score: 0,
            total_questions: request.questions.len() as u32,
            passed: false,
            total_time_seconds: None,
        });
        store.log(
            request.user_id.clone(),
            ActivityKind::QuizStart,
            json!({
                "attempt_id": request.attempt_id,
                "total_questions": request.questions.len(),
            }),
        );
        Ok(request.attempt_id)
    }

    async fn record_answer(&self, request: &AnswerRequest) -> anyhow::Result<()> {
        let mut store = self.enter()?;
        let user_id = store.owner(request.attempt_id)?;
        let is_correct = request.is_correct();
        store.responses.push(StoredResponse {
            attempt_id: request.attempt_id,
            question_id: request.question_id,
            question_text: request.question_text.clone(),
            submitted_option: Some(request.submitted_option.clone()),
            correct_option: request.correct_option.clone(),
            is_correct,
            response_time_seconds: Some(request.response_time_seconds),
            answered_at: Utc::now(),
        });
        store.log(
            user_id,
            ActivityKind::QuestionAnswer,
            json!({
                "attempt_id": request.attempt_id,
                "question_id": request.question_id,
                "is_correct": is_correct,
                "time_taken": request.response_time_seconds,
            }),
        );
        Ok(())
    }

    async fn record_skip(&self, request: &SkipRequest) -> anyhow::Result<()> {
        let mut store = self.enter()?;
        let user_id = store.owner(request.attempt_id)?;
        store.responses.push(StoredResponse {
            attempt_id: request.attempt_id,
            question_id: request.question_id,
            question_text: request.question_text.clone(),
            submitted_option: None,
            correct_option: request.correct_option.clone(),
            is_correct: false,
            response_time_seconds: Some(request.response_time_seconds),
            answered_at: Utc::now(),
        });
        store.log(
            user_id,
            ActivityKind::QuestionSkip,
            json!({
                "attempt_id": request.attempt_id,
                "question_id": request.question_id,
                "outcome": request.outcome,
            }),
        );
        Ok(())
    }

    async fn complete_attempt(&self, request: &CompleteRequest) -> anyhow::Result<AttemptResult> {
        let mut store = self.enter()?;
        let score = store
            .responses
            .iter()
            .filter(|r| r.attempt_id == request.attempt_id && r.is_correct)
            .count() as u32;
        let passed = self.policy.passed(score);

        let attempt = store.attempt_mut(request.attempt_id)?;
        attempt.completed_at = Some(Utc::now());
        attempt.score = score;
        attempt.passed = passed;
        attempt.total_time_seconds = Some(request.total_time_seconds);
        let user_id = attempt.user_id.clone();
        let total = attempt.total_questions;

        store.log(
            user_id,
            ActivityKind::QuizComplete,
            json!({
                "attempt_id": request.attempt_id,
                "score": score,
                "total_questions": total,
                "passed": passed,
                "time_taken": request.total_time_seconds,
            }),
        );
        Ok(AttemptResult { score, passed })
    }

    async fn list_attempts(&self, user_id: Option<&str>) -> anyhow::Result<Vec<AttemptSummary>> {
        let store = self.enter()?;
        let mut attempts: Vec<AttemptSummary> = store
            .attempts
            .iter()
            .filter(|a| user_id.map_or(true, |u| a.user_id == u))
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(attempts)
    }

    async fn attempt_responses(
        &self,
        attempt_id: AttemptId,
    ) -> anyhow::Result<Vec<StoredResponse>> {
        let store = self.enter()?;
        store.owner(attempt_id)?;
        let mut responses: Vec<StoredResponse> = store
            .responses
            .iter()
            .filter(|r| r.attempt_id == attempt_id)
            .cloned()
            .collect();
        responses.sort_by_key(|r| r.question_id);
        Ok(responses)
    }
}
