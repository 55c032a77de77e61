//! Scoring, pass policy and aggregate statistics.

use serde::{Deserialize, Serialize};

use crate::error::QuizError;
use crate::model::{AnswerEvent, AttemptRecord, AttemptSummary, Category};

/// Minimum score that passes a standard 15-question session.
pub const DEFAULT_PASS_THRESHOLD: u32 = 14;

/// Number of correct answers.
pub fn score(answers: &[AnswerEvent]) -> u32 {
    answers.iter().filter(|a| a.is_correct).count() as u32
}

/// Whether `score` passes against a fixed `threshold`.
///
/// The threshold does not scale with `total`; a session size other than the
/// one it was configured for needs its own threshold.
pub fn passed(score: u32, total: u32, threshold: u32) -> bool {
    if threshold > total {
        tracing::warn!(threshold, total, "pass threshold exceeds question count");
    }
    score >= threshold
}

/// A fixed pass threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassPolicy {
    pub threshold: u32,
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

impl PassPolicy {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn passed(&self, score: u32) -> bool {
        score >= self.threshold
    }
}

/// Result-screen percentage, rounded to the nearest whole number.
pub fn percentage(score: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (score as f64 / total as f64 * 100.0).round() as u32
}

/// Anything that can be counted toward aggregate statistics.
pub trait ScoredAttempt {
    /// `(score, passed)` once the attempt is completed, `None` before.
    fn completed_result(&self) -> Option<(u32, bool)>;
}

impl ScoredAttempt for AttemptRecord {
    fn completed_result(&self) -> Option<(u32, bool)> {
        match (self.completed_at, self.score, self.passed) {
            (Some(_), Some(score), Some(passed)) => Some((score, passed)),
            _ => None,
        }
    }
}

impl ScoredAttempt for AttemptSummary {
    fn completed_result(&self) -> Option<(u32, bool)> {
        self.completed_at.map(|_| (self.score, self.passed))
    }
}

/// Statistics over a set of completed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatistics {
    pub total_attempts: u32,
    pub passed_attempts: u32,
    pub failed_attempts: u32,
    /// Mean score, rounded to 2 decimals.
    pub average_score: f64,
    /// Percentage of passed attempts, rounded to 2 decimals.
    pub pass_rate: f64,
}

/// Aggregate the completed attempts in `attempts`; in-progress ones are ignored.
///
/// Returns `QuizError::EmptyAttemptSet` when nothing is completed.
pub fn statistics<A: ScoredAttempt>(attempts: &[A]) -> Result<AggregateStatistics, QuizError> {
    let completed: Vec<(u32, bool)> = attempts
        .iter()
        .filter_map(ScoredAttempt::completed_result)
        .collect();

    if completed.is_empty() {
        return Err(QuizError::EmptyAttemptSet);
    }

    let total = completed.len() as u32;
    let passed = completed.iter().filter(|(_, p)| *p).count() as u32;
    let score_sum: u64 = completed.iter().map(|(s, _)| *s as u64).sum();

    Ok(AggregateStatistics {
        total_attempts: total,
        passed_attempts: passed,
        failed_attempts: total - passed,
        average_score: round2(score_sum as f64 / total as f64),
        pass_rate: round2(passed as f64 / total as f64 * 100.0),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Correct answers within one category of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Option<Category>,
    pub correct: u32,
    pub total: u32,
}

/// Per-category tally of an attempt's answers, uncategorized last.
pub fn category_breakdown(record: &AttemptRecord) -> Vec<CategoryScore> {
    let mut scores: Vec<CategoryScore> = Vec::new();
    for answer in &record.answers {
        let category = record
            .question_set
            .get(answer.question_index)
            .and_then(|q| q.category);
        let entry = match scores.iter_mut().position(|s| s.category == category) {
            Some(i) => &mut scores[i],
            None => {
                scores.push(CategoryScore {
                    category,
                    correct: 0,
                    total: 0,
                });
                let last = scores.len() - 1;
                &mut scores[last]
            }
        };
        entry.total += 1;
        if answer.is_correct {
            entry.correct += 1;
        }
    }
    scores.sort_by_key(|s| (s.category.is_none(), s.category));
    scores
}
