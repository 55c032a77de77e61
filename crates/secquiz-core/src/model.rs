//! Core data model types for secquiz.
//!
//! Questions, the per-attempt question set, answer events and attempt
//! records. Everything the state machine, the scorer and the recorders
//! exchange is defined here.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier issued to an attempt when its session starts.
pub type AttemptId = Uuid;

/// A single multiple-choice question. Immutable once the bank is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Unique positive identifier within the bank.
    pub id: u32,
    /// The question text.
    pub prompt: String,
    /// Answer options, in display order.
    pub options: Vec<String>,
    /// The correct option; always one of `options`.
    pub correct_option: String,
    /// Topic tag.
    #[serde(default)]
    pub category: Option<Category>,
    /// Shown to the player while the answer is revealed.
    #[serde(default)]
    pub explanation: Option<String>,
}

impl QuestionRecord {
    /// Whether `option` is the correct answer. Empty input never is.
    pub fn is_correct(&self, option: &str) -> bool {
        !option.is_empty() && option == self.correct_option
    }

    /// Position of `option` in the option list.
    pub fn option_index(&self, option: &str) -> Option<usize> {
        self.options.iter().position(|o| o == option)
    }
}

/// Topic a question belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Password,
    Phishing,
    Social,
    Physical,
    Data,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Password => write!(f, "password"),
            Category::Phishing => write!(f, "phishing"),
            Category::Social => write!(f, "social"),
            Category::Physical => write!(f, "physical"),
            Category::Data => write!(f, "data"),
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "password" | "passwords" => Ok(Category::Password),
            "phishing" => Ok(Category::Phishing),
            "social" | "social-engineering" => Ok(Category::Social),
            "physical" => Ok(Category::Physical),
            "data" => Ok(Category::Data),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// The ordered questions drawn for one attempt.
///
/// Records are shared with the bank, never copied or mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuestionSet {
    questions: Vec<Arc<QuestionRecord>>,
}

impl SessionQuestionSet {
    pub(crate) fn new(questions: Vec<Arc<QuestionRecord>>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<QuestionRecord>> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<QuestionRecord>> {
        self.questions.iter()
    }

    /// Question ids in session order.
    pub fn ids(&self) -> Vec<u32> {
        self.questions.iter().map(|q| q.id).collect()
    }
}

/// How a question was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Answered,
    Skipped,
    TimedOut,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Answered => write!(f, "answered"),
            OutcomeKind::Skipped => write!(f, "skipped"),
            OutcomeKind::TimedOut => write!(f, "timed out"),
        }
    }
}

/// The single recorded resolution of one question in an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEvent {
    /// Position of the question within the session.
    pub question_index: usize,
    pub question_id: u32,
    /// `None` when the question was skipped or timed out.
    pub submitted_option: Option<String>,
    /// Copied from the question so the event audits on its own.
    pub correct_option: String,
    pub is_correct: bool,
    /// Seconds elapsed on the question before answering, or the full limit
    /// for skip/timeout.
    pub response_time_seconds: u32,
    pub outcome: OutcomeKind,
}

impl AnswerEvent {
    pub(crate) fn new(
        question_index: usize,
        question: &QuestionRecord,
        submitted_option: Option<String>,
        response_time_seconds: u32,
        outcome: OutcomeKind,
    ) -> Self {
        let submitted_option = submitted_option.filter(|s| !s.is_empty());
        let is_correct = submitted_option
            .as_deref()
            .is_some_and(|s| question.is_correct(s));
        Self {
            question_index,
            question_id: question.id,
            submitted_option,
            correct_option: question.correct_option.clone(),
            is_correct,
            response_time_seconds,
            outcome,
        }
    }
}

/// One quiz run by one user.
///
/// Fields set at completion (`completed_at`, `score`, `passed`,
/// `total_time_seconds`) stay `None` while the attempt is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: AttemptId,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub question_set: SessionQuestionSet,
    /// Append-only, at most one entry per question index.
    #[serde(default)]
    pub answers: Vec<AnswerEvent>,
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub total_time_seconds: Option<u32>,
}

impl AttemptRecord {
    pub(crate) fn begin(user_id: &str, question_set: SessionQuestionSet) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            question_set,
            answers: Vec::new(),
            score: None,
            passed: None,
            total_time_seconds: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Correct answers recorded so far.
    pub fn correct_so_far(&self) -> u32 {
        self.answers.iter().filter(|a| a.is_correct).count() as u32
    }

    pub fn total_questions(&self) -> usize {
        self.question_set.len()
    }
}

/// Final score and pass flag of a completed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub score: u32,
    pub passed: bool,
}

/// An attempt as listed by a recorder, without its responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub attempt_id: AttemptId,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub score: u32,
    pub total_questions: u32,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub total_time_seconds: Option<u32>,
}

impl From<&AttemptRecord> for AttemptSummary {
    fn from(record: &AttemptRecord) -> Self {
        Self {
            attempt_id: record.attempt_id,
            user_id: record.user_id.clone(),
            started_at: record.started_at,
            completed_at: record.completed_at,
            score: record.score.unwrap_or(0),
            total_questions: record.total_questions() as u32,
            passed: record.passed.unwrap_or(false),
            total_time_seconds: record.total_time_seconds,
        }
    }
}

/// One persisted answer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub attempt_id: AttemptId,
    pub question_id: u32,
    pub question_text: String,
    #[serde(default)]
    pub submitted_option: Option<String>,
    pub correct_option: String,
    pub is_correct: bool,
    #[serde(default)]
    pub response_time_seconds: Option<u32>,
    pub answered_at: DateTime<Utc>,
}

/// Activity kinds written to the user activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    QuizStart,
    QuestionAnswer,
    QuestionSkip,
    QuizComplete,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::QuizStart => "quiz_start",
            ActivityKind::QuestionAnswer => "question_answer",
            ActivityKind::QuestionSkip => "question_skip",
            ActivityKind::QuizComplete => "quiz_complete",
        }
    }
}
