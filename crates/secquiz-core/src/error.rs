//! Quiz and recorder error types.
//!
//! `QuizError` covers configuration, ordering and statistical failures raised
//! by the core itself. `RecorderError` represents failures talking to an
//! attempt store; it lives here so the dispatcher can downcast and classify
//! recorder failures without string matching.

use thiserror::Error;

/// Errors raised by the quiz core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizError {
    /// The bank holds fewer questions than a session asks for.
    #[error("question bank has {available} questions, {requested} requested")]
    InsufficientQuestions { requested: usize, available: usize },

    /// A question record breaks a bank invariant.
    #[error("invalid question {id}: {reason}")]
    InvalidQuestion { id: u32, reason: String },

    /// Two records in the same bank share an id.
    #[error("duplicate question id: {0}")]
    DuplicateQuestion(u32),

    /// A session operation was called before `start`.
    #[error("session has not been started")]
    SessionNotStarted,

    /// `start` was called on a session that already ran.
    #[error("session already started")]
    SessionAlreadyStarted,

    /// The current question already has its answer recorded.
    #[error("question {index} already answered")]
    AlreadyAnswered { index: usize },

    /// `advance` was called while no answer is being revealed.
    #[error("no answer is being revealed")]
    NotRevealing,

    /// The session is completed and only read access remains.
    #[error("session already finished")]
    SessionFinished,

    /// Aggregate statistics were requested over zero completed attempts.
    #[error("no completed attempts to aggregate")]
    EmptyAttemptSet,
}

impl QuizError {
    /// Returns `true` for ordering violations that leave session state intact.
    ///
    /// Callers treat these as no-ops; they must not retry the same action.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            QuizError::SessionNotStarted
                | QuizError::SessionAlreadyStarted
                | QuizError::AlreadyAnswered { .. }
                | QuizError::NotRevealing
                | QuizError::SessionFinished
        )
    }
}

/// Errors that can occur when talking to an attempt recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The store could not be reached.
    #[error("recorder unavailable: {0}")]
    Unavailable(String),

    /// The store answered with an error status.
    #[error("recorder rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The referenced attempt does not exist in the store.
    #[error("attempt not found: {0}")]
    NotFound(String),

    /// The request timed out.
    #[error("recorder request timed out after {0}s")]
    Timeout(u64),

    /// The store answered with something we could not decode.
    #[error("invalid recorder response: {0}")]
    InvalidResponse(String),
}

impl RecorderError {
    /// Returns `true` if the failure is at the transport level rather than a
    /// definite answer from the store.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RecorderError::Unavailable(_) | RecorderError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_are_classified() {
        assert!(QuizError::AlreadyAnswered { index: 2 }.is_protocol());
        assert!(QuizError::SessionFinished.is_protocol());
        assert!(!QuizError::EmptyAttemptSet.is_protocol());
        assert!(!QuizError::InsufficientQuestions {
            requested: 15,
            available: 3
        }
        .is_protocol());
    }

    #[test]
    fn recorder_error_downcasts_from_anyhow() {
        let err: anyhow::Error = RecorderError::Timeout(10).into();
        let recorder = err.downcast_ref::<RecorderError>().unwrap();
        assert!(recorder.is_unavailable());
        assert!(err.to_string().contains("timed out"));
    }
}
