//! Async countdown driver.
//!
//! Runs a started [`QuizSession`] against wall-clock time: a one-second
//! ticker per question, player input from a channel, and a fixed reveal
//! delay between questions. The ticker lives inside the loop, so leaving
//! the loop for any reason stops it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::QuizError;
use crate::model::{AnswerEvent, AttemptId, AttemptRecord, QuestionRecord};
use crate::session::{Advance, QuizSession, SessionView, TickOutcome};

const TICK: Duration = Duration::from_secs(1);

/// Something the player did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInput {
    /// Pick an option by its text.
    Choose(String),
    Skip,
    /// Leave the quiz without finishing.
    Abandon,
}

/// How a driven session ended.
#[derive(Debug, Clone)]
pub enum DriveOutcome {
    Completed(AttemptRecord),
    Abandoned { attempt_id: AttemptId, answered: usize },
}

/// Receives session progress for presentation.
pub trait SessionObserver: Send + Sync {
    fn on_question(&self, view: &SessionView);
    fn on_tick(&self, remaining: u32);
    fn on_answer(&self, event: &AnswerEvent, question: &QuestionRecord);
    fn on_complete(&self, record: &AttemptRecord);
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_question(&self, _: &SessionView) {}
    fn on_tick(&self, _: u32) {}
    fn on_answer(&self, _: &AnswerEvent, _: &QuestionRecord) {}
    fn on_complete(&self, _: &AttemptRecord) {}
}

/// Drive `session` until it completes or the player leaves.
///
/// Input that arrives while an answer is revealed is discarded. A closed
/// input channel counts as abandoning. The attempt's total time is wall-clock
/// time from the first question to completion, reveal pauses included.
pub async fn drive_session(
    session: &mut QuizSession,
    input: &mut mpsc::Receiver<PlayerInput>,
    observer: &dyn SessionObserver,
) -> Result<DriveOutcome, QuizError> {
    if !session.is_started() {
        return Err(QuizError::SessionNotStarted);
    }
    let reveal_delay = session.config().reveal_delay();
    let started = Instant::now();

    loop {
        let view = session.view().ok_or(QuizError::SessionFinished)?;
        observer.on_question(&view);

        let Some(event) = await_answer(session, input, observer).await? else {
            return abandoned(session);
        };
        observer.on_answer(&event, &view.current_question);

        tokio::time::sleep(reveal_delay).await;
        let mut discarded = 0;
        while input.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "ignored input sent during reveal");
        }

        let elapsed = u32::try_from(started.elapsed().as_secs()).unwrap_or(u32::MAX);
        match session.advance_timed(elapsed)? {
            Advance::Next { .. } => continue,
            Advance::Completed(_) => {
                let record = session
                    .final_record()
                    .cloned()
                    .ok_or(QuizError::SessionNotStarted)?;
                observer.on_complete(&record);
                return Ok(DriveOutcome::Completed(record));
            }
        }
    }
}

/// Run one question's countdown. `None` means the player left.
async fn await_answer(
    session: &mut QuizSession,
    input: &mut mpsc::Receiver<PlayerInput>,
    observer: &dyn SessionObserver,
) -> Result<Option<AnswerEvent>, QuizError> {
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => match session.tick()? {
                TickOutcome::Counting { remaining } => observer.on_tick(remaining),
                TickOutcome::TimedOut(event) => return Ok(Some(event)),
                TickOutcome::Frozen => {}
            },
            received = input.recv() => match received {
                Some(PlayerInput::Choose(option)) => match session.submit(&option) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) if e.is_protocol() => continue,
                    Err(e) => return Err(e),
                },
                Some(PlayerInput::Skip) => return session.skip().map(Some),
                Some(PlayerInput::Abandon) | None => return Ok(None),
            },
        }
    }
}

fn abandoned(session: &QuizSession) -> Result<DriveOutcome, QuizError> {
    let record = session.attempt().ok_or(QuizError::SessionNotStarted)?;
    tracing::info!(
        attempt = %record.attempt_id,
        answered = record.answers.len(),
        "quiz session abandoned"
    );
    Ok(DriveOutcome::Abandoned {
        attempt_id: record.attempt_id,
        answered: record.answers.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::bank::QuestionBank;
    use crate::dispatch::RecorderHandle;
    use crate::model::OutcomeKind;
    use crate::sampler::sample;
    use crate::session::QuizConfig;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Question(usize),
        Answer(OutcomeKind),
        Complete(u32),
    }

    /// Forwards questions to the test and keeps a log of everything else.
    struct ChannelObserver {
        questions: mpsc::UnboundedSender<SessionView>,
        log: Mutex<Vec<Seen>>,
        ticks: Mutex<Vec<u32>>,
    }

    impl ChannelObserver {
        fn new() -> (Self, mpsc::UnboundedReceiver<SessionView>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    questions: tx,
                    log: Mutex::new(Vec::new()),
                    ticks: Mutex::new(Vec::new()),
                },
                rx,
            )
        }
    }

    impl SessionObserver for ChannelObserver {
        fn on_question(&self, view: &SessionView) {
            self.log.lock().unwrap().push(Seen::Question(view.question_index));
            let _ = self.questions.send(view.clone());
        }

        fn on_tick(&self, remaining: u32) {
            self.ticks.lock().unwrap().push(remaining);
        }

        fn on_answer(&self, event: &AnswerEvent, _: &QuestionRecord) {
            self.log.lock().unwrap().push(Seen::Answer(event.outcome));
        }

        fn on_complete(&self, record: &AttemptRecord) {
            self.log
                .lock()
                .unwrap()
                .push(Seen::Complete(record.score.unwrap_or(0)));
        }
    }

    fn session(n: usize) -> QuizSession {
        let questions = (1..=10)
            .map(|id| QuestionRecord {
                id,
                prompt: format!("Question {id}"),
                options: vec![format!("right {id}"), format!("wrong {id}")],
                correct_option: format!("right {id}"),
                category: None,
                explanation: None,
            })
            .collect();
        let bank = QuestionBank::new("t", "T", questions).unwrap();
        let config = QuizConfig {
            question_count: n,
            pass_threshold: n as u32,
            ..QuizConfig::default()
        };
        let mut session = QuizSession::new(config, RecorderHandle::disconnected());
        let set = sample(&bank, n, &mut StdRng::seed_from_u64(11)).unwrap();
        session.start("bob", set).unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_questions_time_out() {
        let mut session = session(2);
        let (_tx, mut rx) = mpsc::channel(4);
        let (observer, _questions) = ChannelObserver::new();

        let start = Instant::now();
        let outcome = drive_session(&mut session, &mut rx, &observer).await.unwrap();

        let DriveOutcome::Completed(record) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(record.answers.len(), 2);
        assert!(record
            .answers
            .iter()
            .all(|a| a.outcome == OutcomeKind::TimedOut && a.response_time_seconds == 30));
        assert_eq!(record.score, Some(0));
        // Two countdowns plus two reveals.
        assert_eq!(start.elapsed(), Duration::from_secs(64));
        assert_eq!(record.total_time_seconds, Some(64));

        let ticks = observer.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 58);
        assert_eq!(ticks[0], 29);
        assert_eq!(ticks[28], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn answers_skip_and_complete() {
        let mut session = session(3);
        let (tx, mut rx) = mpsc::channel(4);
        let (observer, mut questions) = ChannelObserver::new();

        let player = tokio::spawn(async move {
            let mut n = 0;
            while let Some(view) = questions.recv().await {
                let input = if n == 1 {
                    PlayerInput::Skip
                } else {
                    PlayerInput::Choose(view.current_question.correct_option.clone())
                };
                tx.send(input).await.unwrap();
                n += 1;
            }
        });

        let outcome = drive_session(&mut session, &mut rx, &observer).await.unwrap();
        drop(observer);
        player.await.unwrap();

        let DriveOutcome::Completed(record) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(record.score, Some(2));
        assert_eq!(record.passed, Some(false));
        assert_eq!(record.answers[1].outcome, OutcomeKind::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn total_time_includes_reveals() {
        let mut session = session(2);
        let (tx, mut rx) = mpsc::channel(4);
        let (observer, mut questions) = ChannelObserver::new();

        let player = tokio::spawn(async move {
            while let Some(view) = questions.recv().await {
                tokio::time::sleep(Duration::from_millis(3500)).await;
                let answer = view.current_question.correct_option.clone();
                tx.send(PlayerInput::Choose(answer)).await.unwrap();
            }
        });

        let outcome = drive_session(&mut session, &mut rx, &observer).await.unwrap();
        drop(observer);
        player.await.unwrap();

        let DriveOutcome::Completed(record) = outcome else {
            panic!("expected completion");
        };
        assert!(record.answers.iter().all(|a| a.response_time_seconds == 3));
        // 3.5s per answer plus a 2s reveal after each, rounded down.
        assert_eq!(record.total_time_seconds, Some(11));
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_lifecycle_in_order() {
        let mut session = session(2);
        let (tx, mut rx) = mpsc::channel(4);
        let (observer, mut questions) = ChannelObserver::new();

        let player = tokio::spawn(async move {
            while let Some(view) = questions.recv().await {
                let answer = view.current_question.correct_option.clone();
                tx.send(PlayerInput::Choose(answer)).await.unwrap();
            }
        });

        drive_session(&mut session, &mut rx, &observer).await.unwrap();
        assert_eq!(
            *observer.log.lock().unwrap(),
            vec![
                Seen::Question(0),
                Seen::Answer(OutcomeKind::Answered),
                Seen::Question(1),
                Seen::Answer(OutcomeKind::Answered),
                Seen::Complete(2),
            ]
        );
        drop(observer);
        player.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_stops_the_session() {
        let mut session = session(3);
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(PlayerInput::Skip).await.unwrap();

        let (observer, mut questions) = ChannelObserver::new();
        let player = tokio::spawn(async move {
            // First question is skipped by the queued input; leave on the second.
            questions.recv().await;
            questions.recv().await;
            tx.send(PlayerInput::Abandon).await.unwrap();
        });

        let outcome = drive_session(&mut session, &mut rx, &observer).await.unwrap();
        player.await.unwrap();

        match outcome {
            DriveOutcome::Abandoned { answered, attempt_id } => {
                assert_eq!(answered, 1);
                assert_eq!(Some(attempt_id), session.attempt_id());
            }
            other => panic!("expected abandonment, got {other:?}"),
        }
        assert!(!session.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_input_counts_as_abandoning() {
        let mut session = session(2);
        let (tx, mut rx) = mpsc::channel::<PlayerInput>(1);
        drop(tx);
        let outcome = drive_session(&mut session, &mut rx, &NoopObserver)
            .await
            .unwrap();
        assert!(matches!(outcome, DriveOutcome::Abandoned { answered: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn input_during_reveal_is_discarded() {
        let mut session = session(2);
        let (tx, mut rx) = mpsc::channel(8);
        let (observer, mut questions) = ChannelObserver::new();

        let player = tokio::spawn(async move {
            let first = questions.recv().await.unwrap();
            tx.send(PlayerInput::Choose(first.current_question.correct_option.clone()))
                .await
                .unwrap();
            // Lands while the first answer is revealed.
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(PlayerInput::Skip).await.unwrap();
            questions.recv().await.unwrap();
            // Keep the channel open; the second question times out.
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(tx);
        });

        let outcome = drive_session(&mut session, &mut rx, &observer).await.unwrap();
        let DriveOutcome::Completed(record) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(record.answers[0].outcome, OutcomeKind::Answered);
        assert_eq!(record.answers[1].outcome, OutcomeKind::TimedOut);
        drop(observer);
        player.await.unwrap();
    }

    #[tokio::test]
    async fn unstarted_session_is_rejected() {
        let mut session = QuizSession::new(QuizConfig::default(), RecorderHandle::disconnected());
        let (_tx, mut rx) = mpsc::channel(1);
        let err = drive_session(&mut session, &mut rx, &NoopObserver)
            .await
            .unwrap_err();
        assert_eq!(err, QuizError::SessionNotStarted);
    }
}
