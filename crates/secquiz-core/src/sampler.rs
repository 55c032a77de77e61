//! Session sampler.
//!
//! Draws the ordered question set for one attempt: a uniform random
//! permutation of the bank, truncated to the requested count.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::bank::QuestionBank;
use crate::error::QuizError;
use crate::model::SessionQuestionSet;

/// Draw `count` distinct questions from `bank` in random order.
///
/// Every ordered selection is equally likely. The random source is passed in
/// so callers can seed it for reproducible sessions.
pub fn sample<R: Rng + ?Sized>(
    bank: &QuestionBank,
    count: usize,
    rng: &mut R,
) -> Result<SessionQuestionSet, QuizError> {
    if count > bank.len() {
        return Err(QuizError::InsufficientQuestions {
            requested: count,
            available: bank.len(),
        });
    }

    // Partial Fisher-Yates over indices; only the first `count` slots are drawn.
    let mut indices: Vec<usize> = (0..bank.len()).collect();
    let (chosen, _) = indices.partial_shuffle(rng, count);

    let questions = chosen
        .iter()
        .map(|&i| Arc::clone(&bank.questions()[i]))
        .collect();

    tracing::debug!(bank = %bank.id, count, "sampled session questions");
    Ok(SessionQuestionSet::new(questions))
}
