//! Fire-and-forget delivery of session events to an attempt recorder.
//!
//! The session pushes commands into a bounded queue without waiting; one
//! worker task delivers them in order. Delivery is best-effort: a failed
//! call is logged and counted, never retried, and never rolls back the
//! in-memory session.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{AttemptId, AttemptResult};
use crate::traits::{
    AnswerRequest, AttemptRecorder, CompleteRequest, SkipRequest, StartAttemptRequest,
};

/// Default queue capacity; a 15-question attempt produces 17 commands.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// One unit of work for the recorder.
#[derive(Debug, Clone)]
pub enum RecorderCommand {
    Start(StartAttemptRequest),
    Answer(AnswerRequest),
    Skip(SkipRequest),
    Complete {
        request: CompleteRequest,
        /// The session's own result, checked against the recorder's.
        expected: AttemptResult,
    },
}

impl RecorderCommand {
    pub fn attempt_id(&self) -> AttemptId {
        match self {
            RecorderCommand::Start(r) => r.attempt_id,
            RecorderCommand::Answer(r) => r.attempt_id,
            RecorderCommand::Skip(r) => r.attempt_id,
            RecorderCommand::Complete { request, .. } => request.attempt_id,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RecorderCommand::Start(_) => "start",
            RecorderCommand::Answer(_) => "answer",
            RecorderCommand::Skip(_) => "skip",
            RecorderCommand::Complete { .. } => "complete",
        }
    }
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    queued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
}

impl DeliveryCounters {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Delivery counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Accepted into the queue.
    pub queued: u64,
    /// Acknowledged by the recorder.
    pub delivered: u64,
    /// Rejected or unreachable recorder.
    pub failed: u64,
    /// Never queued: queue full or worker gone.
    pub dropped: u64,
    /// Not sent because the attempt's start had failed.
    pub skipped: u64,
}

/// Sending side of the recorder queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecorderCommand>,
    counters: Arc<DeliveryCounters>,
}

impl RecorderHandle {
    /// A handle and the raw receiving end, for callers that drain it themselves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RecorderCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                counters: Arc::new(DeliveryCounters::default()),
            },
            rx,
        )
    }

    /// A handle whose commands go nowhere. Every dispatch counts as dropped.
    pub fn disconnected() -> Self {
        let (handle, _rx) = Self::channel(1);
        handle
    }

    /// Queue a command without waiting.
    pub fn dispatch(&self, command: RecorderCommand) {
        match self.tx.try_send(command) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    attempt = %cmd.attempt_id(),
                    "recorder queue full, dropping {} event",
                    cmd.label()
                );
            }
            Err(mpsc::error::TrySendError::Closed(cmd)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    attempt = %cmd.attempt_id(),
                    "recorder not running, dropping {} event",
                    cmd.label()
                );
            }
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }
}

/// The running delivery task.
pub struct DispatchWorker {
    handle: JoinHandle<()>,
    counters: Arc<DeliveryCounters>,
}

impl DispatchWorker {
    /// Wait until every handle is dropped and the queue is drained.
    pub async fn finish(self) -> DeliveryStats {
        if let Err(e) = self.handle.await {
            tracing::error!("recorder dispatcher task failed: {e}");
        }
        self.counters.snapshot()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }
}

/// Spawn the delivery worker on the current tokio runtime.
pub fn spawn_dispatcher(
    recorder: Arc<dyn AttemptRecorder>,
    capacity: usize,
) -> (RecorderHandle, DispatchWorker) {
    let (handle, rx) = RecorderHandle::channel(capacity);
    let counters = Arc::clone(&handle.counters);
    let task = tokio::spawn(run_dispatcher(recorder, rx, Arc::clone(&counters)));
    (
        handle,
        DispatchWorker {
            handle: task,
            counters,
        },
    )
}

/// Attempts whose start was never recorded.
#[derive(Debug, Default)]
struct Unstarted(HashSet<AttemptId>);

impl Unstarted {
    fn insert(&mut self, attempt_id: AttemptId) {
        self.0.insert(attempt_id);
    }

    /// Whether `command` belongs to an attempt that was never recorded.
    /// The attempt is forgotten once its completion goes by.
    fn skips(&mut self, command: &RecorderCommand) -> bool {
        let attempt_id = command.attempt_id();
        match command {
            RecorderCommand::Complete { .. } => self.0.remove(&attempt_id),
            _ => self.0.contains(&attempt_id),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.len()
    }
}

async fn run_dispatcher(
    recorder: Arc<dyn AttemptRecorder>,
    mut rx: mpsc::Receiver<RecorderCommand>,
    counters: Arc<DeliveryCounters>,
) {
    let mut unstarted = Unstarted::default();

    while let Some(command) = rx.recv().await {
        let attempt_id = command.attempt_id();
        if unstarted.skips(&command) {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                attempt = %attempt_id,
                "skipping {} event, attempt was never recorded",
                command.label()
            );
            continue;
        }

        let label = command.label();
        let outcome = match command {
            RecorderCommand::Start(request) => {
                match recorder.start_attempt(&request).await {
                    Ok(stored_id) => {
                        if stored_id != request.attempt_id {
                            tracing::warn!(
                                attempt = %request.attempt_id,
                                stored = %stored_id,
                                "recorder filed attempt under a different id"
                            );
                        }
                        Ok(())
                    }
                    Err(e) => {
                        unstarted.insert(request.attempt_id);
                        Err(e)
                    }
                }
            }
            RecorderCommand::Answer(request) => recorder.record_answer(&request).await,
            RecorderCommand::Skip(request) => recorder.record_skip(&request).await,
            RecorderCommand::Complete { request, expected } => recorder
                .complete_attempt(&request)
                .await
                .map(|stored| {
                    if stored != expected {
                        tracing::warn!(
                            attempt = %request.attempt_id,
                            session_score = expected.score,
                            recorded_score = stored.score,
                            "recorded result differs from session, answer events may have been lost"
                        );
                    }
                }),
        };

        match outcome {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(attempt = %attempt_id, "delivered {label} event");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    attempt = %attempt_id,
                    recorder = recorder.name(),
                    "failed to record {label} event: {e:#}"
                );
            }
        }
    }

    tracing::debug!("recorder queue closed");
}
