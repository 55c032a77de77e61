//! Timed quiz session state machine.
//!
//! A session walks one user through a sampled question set:
//!
//! ```text
//! NotStarted -> InProgress { index, remaining, revealing } -> Completed
//! ```
//!
//! Each question gets a fixed countdown. Answering, skipping or running out
//! of time records exactly one [`AnswerEvent`] and enters the reveal phase,
//! during which the clock is frozen and input is refused. [`QuizSession::advance`]
//! leaves the reveal phase for the next question or completes the attempt.
//!
//! The session itself is synchronous and clock-free: time only moves through
//! [`QuizSession::tick`]. [`crate::driver`] runs it against a real timer.
//! Every answer and the completion are handed to the recorder queue without
//! waiting for the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::dispatch::{RecorderCommand, RecorderHandle, DEFAULT_QUEUE_CAPACITY};
use crate::error::QuizError;
use crate::model::{
    AnswerEvent, AttemptId, AttemptRecord, AttemptResult, OutcomeKind, QuestionRecord,
    SessionQuestionSet,
};
use crate::scoring::{self, PassPolicy, DEFAULT_PASS_THRESHOLD};
use crate::traits::{AnswerRequest, CompleteRequest, SkipRequest, StartAttemptRequest};

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    /// Questions drawn per attempt.
    pub question_count: usize,
    /// Countdown per question, in seconds.
    pub time_limit_secs: u32,
    /// How long feedback stays up before moving on.
    pub reveal_delay_ms: u64,
    /// Minimum score that passes. Fixed, not scaled with `question_count`.
    pub pass_threshold: u32,
    /// Capacity of the recorder queue.
    pub recorder_queue_capacity: usize,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            question_count: 15,
            time_limit_secs: 30,
            reveal_delay_ms: 2000,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            recorder_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl QuizConfig {
    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn pass_policy(&self) -> PassPolicy {
        PassPolicy::new(self.pass_threshold)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.question_count >= 1, "question_count must be at least 1");
        anyhow::ensure!(self.time_limit_secs >= 1, "time_limit_secs must be at least 1");
        anyhow::ensure!(
            self.pass_threshold as usize <= self.question_count,
            "pass_threshold {} is unreachable with {} questions",
            self.pass_threshold,
            self.question_count
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Progress {
    index: usize,
    remaining: u32,
    revealing: bool,
    /// Ticks spent on all questions so far.
    elapsed: u32,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    NotStarted,
    InProgress(Progress),
    Completed,
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The clock moved; seconds left on the current question.
    Counting { remaining: u32 },
    /// The clock hit zero and the question was recorded as timed out.
    TimedOut(AnswerEvent),
    /// The clock is frozen while an answer is revealed.
    Frozen,
}

/// Where `advance` went.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Showing the question at `index`.
    Next { index: usize },
    /// The attempt is over.
    Completed(AttemptResult),
}

/// Read-only snapshot for presentation.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub question_index: usize,
    pub total: usize,
    pub timer_seconds_remaining: u32,
    pub revealing: bool,
    pub current_question: Arc<QuestionRecord>,
    pub running_score: u32,
    /// The answer being revealed, if any.
    pub last_answer: Option<AnswerEvent>,
}

/// One attempt by one user.
pub struct QuizSession {
    config: QuizConfig,
    recorder: RecorderHandle,
    phase: Phase,
    record: Option<AttemptRecord>,
}

impl QuizSession {
    pub fn new(config: QuizConfig, recorder: RecorderHandle) -> Self {
        Self {
            config,
            recorder,
            phase: Phase::NotStarted,
            record: None,
        }
    }

    /// Begin the attempt at the first question with a full clock.
    pub fn start(
        &mut self,
        user_id: &str,
        question_set: SessionQuestionSet,
    ) -> Result<AttemptId, QuizError> {
        if !matches!(self.phase, Phase::NotStarted) {
            tracing::warn!("start called on a session that already started");
            return Err(QuizError::SessionAlreadyStarted);
        }
        if question_set.is_empty() {
            return Err(QuizError::InsufficientQuestions {
                requested: 1,
                available: 0,
            });
        }

        let record = AttemptRecord::begin(user_id, question_set);
        let attempt_id = record.attempt_id;

        self.recorder.dispatch(RecorderCommand::Start(StartAttemptRequest {
            attempt_id,
            user_id: record.user_id.clone(),
            started_at: record.started_at,
            questions: record.question_set.iter().cloned().collect(),
        }));

        tracing::info!(
            attempt = %attempt_id,
            user = user_id,
            questions = record.question_set.len(),
            "quiz session started"
        );

        self.record = Some(record);
        self.phase = Phase::InProgress(Progress {
            index: 0,
            remaining: self.config.time_limit_secs,
            revealing: false,
            elapsed: 0,
        });
        Ok(attempt_id)
    }

    /// Advance the clock by one second.
    ///
    /// When it reaches zero the current question is recorded as timed out.
    pub fn tick(&mut self) -> Result<TickOutcome, QuizError> {
        let progress = self.progress_mut()?;
        if progress.revealing {
            return Ok(TickOutcome::Frozen);
        }

        progress.remaining = progress.remaining.saturating_sub(1);
        progress.elapsed += 1;
        let remaining = progress.remaining;
        tracing::trace!(remaining, "tick");

        if remaining == 0 {
            let event = self.resolve(None, OutcomeKind::TimedOut)?;
            return Ok(TickOutcome::TimedOut(event));
        }
        Ok(TickOutcome::Counting { remaining })
    }

    /// Answer the current question. An empty option scores as incorrect.
    pub fn submit(&mut self, option: &str) -> Result<AnswerEvent, QuizError> {
        let submitted = (!option.is_empty()).then(|| option.to_string());
        self.resolve(submitted, OutcomeKind::Answered)
    }

    /// Give up on the current question.
    pub fn skip(&mut self) -> Result<AnswerEvent, QuizError> {
        self.resolve(None, OutcomeKind::Skipped)
    }

    /// Leave the reveal phase: next question, or complete the attempt.
    ///
    /// With no clock to consult, a completed attempt's total time is the sum
    /// of countdown ticks. Reveal pauses are not counted.
    pub fn advance(&mut self) -> Result<Advance, QuizError> {
        self.advance_inner(None)
    }

    /// Same as [`QuizSession::advance`], but a completed attempt records
    /// `elapsed_secs`, measured from the first question to now.
    pub fn advance_timed(&mut self, elapsed_secs: u32) -> Result<Advance, QuizError> {
        self.advance_inner(Some(elapsed_secs))
    }

    fn advance_inner(&mut self, measured: Option<u32>) -> Result<Advance, QuizError> {
        let total = self.record()?.question_set.len();
        let limit = self.config.time_limit_secs;
        let progress = self.progress_mut()?;
        if !progress.revealing {
            return Err(QuizError::NotRevealing);
        }

        if progress.index + 1 < total {
            progress.index += 1;
            progress.remaining = limit;
            progress.revealing = false;
            let index = progress.index;
            tracing::debug!(index, "next question");
            return Ok(Advance::Next { index });
        }

        let elapsed = measured.unwrap_or(progress.elapsed);
        let result = self.complete(elapsed)?;
        Ok(Advance::Completed(result))
    }

    fn resolve(
        &mut self,
        submitted: Option<String>,
        outcome: OutcomeKind,
    ) -> Result<AnswerEvent, QuizError> {
        let limit = self.config.time_limit_secs;
        let progress = self.progress_mut()?;
        if progress.revealing {
            let index = progress.index;
            tracing::warn!(index, "answer ignored, question already answered");
            return Err(QuizError::AlreadyAnswered { index });
        }
        progress.revealing = true;
        let index = progress.index;
        let response_time = match outcome {
            OutcomeKind::Answered => limit - progress.remaining,
            OutcomeKind::Skipped | OutcomeKind::TimedOut => limit,
        };

        let record = self.record_mut()?;
        let question = record
            .question_set
            .get(index)
            .cloned()
            .ok_or(QuizError::SessionFinished)?;
        let event = AnswerEvent::new(index, &question, submitted, response_time, outcome);
        record.answers.push(event.clone());
        let attempt_id = record.attempt_id;

        let command = match &event.submitted_option {
            Some(option) => RecorderCommand::Answer(AnswerRequest {
                attempt_id,
                question_id: question.id,
                question_text: question.prompt.clone(),
                submitted_option: option.clone(),
                correct_option: question.correct_option.clone(),
                response_time_seconds: response_time,
            }),
            None => RecorderCommand::Skip(SkipRequest {
                attempt_id,
                question_id: question.id,
                question_text: question.prompt.clone(),
                correct_option: question.correct_option.clone(),
                outcome,
                response_time_seconds: response_time,
            }),
        };
        self.recorder.dispatch(command);

        tracing::debug!(
            index,
            question = question.id,
            correct = event.is_correct,
            %outcome,
            "question resolved"
        );
        Ok(event)
    }

    fn complete(&mut self, elapsed: u32) -> Result<AttemptResult, QuizError> {
        let policy = self.config.pass_policy();
        let record = self.record_mut()?;

        let score = scoring::score(&record.answers);
        let passed = scoring::passed(score, record.question_set.len() as u32, policy.threshold);
        record.completed_at = Some(Utc::now());
        record.score = Some(score);
        record.passed = Some(passed);
        record.total_time_seconds = Some(elapsed);
        let attempt_id = record.attempt_id;
        let total = record.question_set.len();

        let result = AttemptResult { score, passed };
        self.recorder.dispatch(RecorderCommand::Complete {
            request: CompleteRequest {
                attempt_id,
                total_time_seconds: elapsed,
            },
            expected: result,
        });
        self.phase = Phase::Completed;

        tracing::info!(
            attempt = %attempt_id,
            score,
            total,
            passed,
            seconds = elapsed,
            "quiz session completed"
        );
        Ok(result)
    }

    fn progress_mut(&mut self) -> Result<&mut Progress, QuizError> {
        match &mut self.phase {
            Phase::NotStarted => Err(QuizError::SessionNotStarted),
            Phase::InProgress(progress) => Ok(progress),
            Phase::Completed => Err(QuizError::SessionFinished),
        }
    }

    fn record(&self) -> Result<&AttemptRecord, QuizError> {
        self.record.as_ref().ok_or(QuizError::SessionNotStarted)
    }

    fn record_mut(&mut self) -> Result<&mut AttemptRecord, QuizError> {
        self.record.as_mut().ok_or(QuizError::SessionNotStarted)
    }

    // --- read access -------------------------------------------------------

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        !matches!(self.phase, Phase::NotStarted)
    }

    pub fn is_revealing(&self) -> bool {
        matches!(self.phase, Phase::InProgress(p) if p.revealing)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.phase, Phase::Completed)
    }

    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.record.as_ref().map(|r| r.attempt_id)
    }

    /// The attempt as recorded so far.
    pub fn attempt(&self) -> Option<&AttemptRecord> {
        self.record.as_ref()
    }

    /// The attempt, only once completed.
    pub fn final_record(&self) -> Option<&AttemptRecord> {
        self.record.as_ref().filter(|_| self.is_completed())
    }

    /// Snapshot of the question on screen; `None` unless in progress.
    pub fn view(&self) -> Option<SessionView> {
        let Phase::InProgress(progress) = self.phase else {
            return None;
        };
        let record = self.record.as_ref()?;
        let current_question = Arc::clone(record.question_set.get(progress.index)?);
        let last_answer = if progress.revealing {
            record.answers.last().cloned()
        } else {
            None
        };
        Some(SessionView {
            question_index: progress.index,
            total: record.question_set.len(),
            timer_seconds_remaining: progress.remaining,
            revealing: progress.revealing,
            current_question,
            running_score: record.correct_so_far(),
            last_answer,
        })
    }
}
