//! Application facade and screen model.
//!
//! `QuizApp` owns the bank, the session settings, the random source and the
//! current session, so the presentation layer only deals with one object.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::bank::QuestionBank;
use crate::dispatch::RecorderHandle;
use crate::error::QuizError;
use crate::model::AttemptId;
use crate::sampler::sample;
use crate::session::{QuizConfig, QuizSession};

/// What a signed-in user may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    Admin,
}

/// The screens of the quiz front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Login,
    Landing,
    Quiz,
    Results,
    Admin,
}

impl Screen {
    /// Where a user lands after signing in.
    pub fn home_for(role: Role) -> Screen {
        match role {
            Role::Player => Screen::Landing,
            Role::Admin => Screen::Admin,
        }
    }

    /// Whether `role` may open this screen.
    pub fn allows(&self, role: Role) -> bool {
        match self {
            Screen::Admin => role == Role::Admin,
            _ => true,
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screen::Login => write!(f, "login"),
            Screen::Landing => write!(f, "landing"),
            Screen::Quiz => write!(f, "quiz"),
            Screen::Results => write!(f, "results"),
            Screen::Admin => write!(f, "admin"),
        }
    }
}

/// One player's quiz front end.
pub struct QuizApp {
    bank: Arc<QuestionBank>,
    config: QuizConfig,
    rng: StdRng,
    recorder: RecorderHandle,
    session: Option<QuizSession>,
}

impl QuizApp {
    pub fn new(bank: Arc<QuestionBank>, config: QuizConfig, recorder: RecorderHandle) -> Self {
        Self::with_rng(bank, config, recorder, StdRng::from_entropy())
    }

    /// Same as `new`, with reproducible question order.
    pub fn with_seed(
        bank: Arc<QuestionBank>,
        config: QuizConfig,
        recorder: RecorderHandle,
        seed: u64,
    ) -> Self {
        Self::with_rng(bank, config, recorder, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        bank: Arc<QuestionBank>,
        config: QuizConfig,
        recorder: RecorderHandle,
        rng: StdRng,
    ) -> Self {
        Self {
            bank,
            config,
            rng,
            recorder,
            session: None,
        }
    }

    /// Sample a fresh question set and start a session.
    ///
    /// Fails with `SessionAlreadyStarted` while a session is in progress;
    /// use [`QuizApp::restart`] to discard it.
    pub fn start(&mut self, user_id: &str) -> Result<AttemptId, QuizError> {
        if self.session.as_ref().is_some_and(|s| !s.is_completed()) {
            return Err(QuizError::SessionAlreadyStarted);
        }
        let set = sample(&self.bank, self.config.question_count, &mut self.rng)?;
        let mut session = QuizSession::new(self.config.clone(), self.recorder.clone());
        let attempt_id = session.start(user_id, set)?;
        self.session = Some(session);
        Ok(attempt_id)
    }

    /// Discard the current session and start over with a new sample.
    ///
    /// A discarded in-progress attempt is left incomplete in the store.
    pub fn restart(&mut self, user_id: &str) -> Result<AttemptId, QuizError> {
        if let Some(old) = self.session.take() {
            if let Some(record) = old.attempt().filter(|_| !old.is_completed()) {
                tracing::info!(
                    attempt = %record.attempt_id,
                    answered = record.answers.len(),
                    "abandoning attempt on restart"
                );
            }
        }
        self.start(user_id)
    }

    pub fn session(&self) -> Option<&QuizSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut QuizSession> {
        self.session.as_mut()
    }

    /// The screen the current session calls for.
    pub fn screen(&self) -> Screen {
        match &self.session {
            None => Screen::Landing,
            Some(s) if s.is_completed() => Screen::Results,
            Some(_) => Screen::Quiz,
        }
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }
}
