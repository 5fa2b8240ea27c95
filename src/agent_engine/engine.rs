use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent_engine::context::ExecutionContext;
use crate::agent_engine::event_bus::{EventBus, ProgressEvent};
use crate::agent_engine::history::{HistoryEntry, RunHistory};
use crate::agent_engine::loop_control::CancelHandle;
use crate::agent_engine::state::{
    ActionKind, ActionSequence, ActionSpec, ActionStatus, ExecutionReport, SequenceStatus,
};
use crate::config::{ExecutionMode, ExecutorConfig};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::pointer_points;
use crate::executor::dispatcher::{dispatch, Capabilities};
use crate::executor::safety::SecurityPolicy;
use crate::planner::validator::validate;

/// Per-call progress sink.
pub type ProgressFn<'a> = &'a (dyn Fn(&ProgressEvent) + Send + Sync);

/// Pre-run approval. Returning `false` cancels the sequence.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(&self, sequence: &ActionSequence) -> bool;
}

/// Adapts a plain closure into a [`ConfirmationHandler`].
pub struct ConfirmWith<F>(pub F);

#[async_trait]
impl<F> ConfirmationHandler for ConfirmWith<F>
where
    F: Fn(&ActionSequence) -> bool + Send + Sync,
{
    async fn confirm(&self, sequence: &ActionSequence) -> bool {
        (self.0)(sequence)
    }
}

/// Aggregate numbers over every `execute` call that produced a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub sequences_run: u64,
    pub actions_run: u64,
    /// Completed actions over actions run, 0.0 before any action ran.
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Default)]
struct StatsAccumulator {
    sequences_run: u64,
    actions_run: u64,
    actions_completed: u64,
    total_duration_ms: u64,
}

impl StatsAccumulator {
    fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            sequences_run: self.sequences_run,
            actions_run: self.actions_run,
            success_rate: if self.actions_run == 0 {
                0.0
            } else {
                self.actions_completed as f64 / self.actions_run as f64
            },
            avg_duration_ms: if self.sequences_run == 0 {
                0.0
            } else {
                self.total_duration_ms as f64 / self.sequences_run as f64
            },
        }
    }
}

/// Clears the running flag when the run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> DeskPilotResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DeskPilotError::AlreadyExecuting)?;
        Ok(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Why the action loop ended early.
enum Stop {
    Failed(String),
    Cancelled,
}

/// Runs one sequence at a time against the capability providers.
pub struct Executor {
    caps: Capabilities,
    policy: Arc<SecurityPolicy>,
    config: ExecutorConfig,
    running: AtomicBool,
    cancel: CancelHandle,
    events: EventBus,
    stats: Mutex<StatsAccumulator>,
    history: Option<RunHistory>,
}

impl Executor {
    pub fn new(caps: Capabilities, policy: Arc<SecurityPolicy>, config: ExecutorConfig) -> Self {
        let history = config.history_enabled.then(RunHistory::new);
        Self {
            caps,
            policy,
            config,
            running: AtomicBool::new(false),
            cancel: CancelHandle::new(),
            events: EventBus::default(),
            stats: Mutex::new(StatsAccumulator::default()),
            history,
        }
    }

    pub fn with_history(mut self, history: RunHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<SecurityPolicy> {
        &self.policy
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the current run before its next action, or immediately while
    /// it is waiting for confirmation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub fn get_stats(&self) -> ExecutorStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot()
    }

    fn emit(&self, progress: Option<ProgressFn<'_>>, event: ProgressEvent) {
        if let Some(cb) = progress {
            cb(&event);
        }
        self.events.publish(event);
    }

    /// Drives `seq` to a terminal status.
    ///
    /// Only re-entrancy and validation problems are returned as errors;
    /// everything that goes wrong once the run has started is reported in
    /// the returned [`ExecutionReport`] and on the actions themselves.
    pub async fn execute(
        &self,
        seq: &mut ActionSequence,
        confirm: Option<&dyn ConfirmationHandler>,
        progress: Option<ProgressFn<'_>>,
    ) -> DeskPilotResult<ExecutionReport> {
        let _guard = RunningGuard::acquire(&self.running)?;

        if seq.status != SequenceStatus::Pending {
            return Err(DeskPilotError::Validation(vec![format!(
                "sequence {} is {}, only pending sequences can run",
                seq.id, seq.status
            )]));
        }
        let issues = validate(seq);
        if !issues.is_empty() {
            tracing::warn!(sequence = %seq.id, issues = issues.len(), "sequence rejected by validation");
            return Err(DeskPilotError::Validation(
                issues.iter().map(ToString::to_string).collect(),
            ));
        }

        self.cancel.reset();
        let started = Instant::now();
        seq.started_at = Some(chrono::Utc::now());

        if self.config.mode == ExecutionMode::Confirm && !self.confirmation_gate(seq, confirm, progress).await {
            tracing::info!(sequence = %seq.id, "sequence not confirmed, cancelling");
            if let Some(first) = seq.actions.first_mut() {
                first.transition(ActionStatus::Cancelled);
            }
            seq.status = SequenceStatus::Cancelled;
            return Ok(self.finish(seq, started, Some("not confirmed".into()), progress));
        }

        seq.status = SequenceStatus::Running;
        tracing::info!(
            sequence = %seq.id,
            name = %seq.name,
            actions = seq.len(),
            "sequence started"
        );
        self.emit(
            progress,
            ProgressEvent::SequenceStarted {
                sequence_id: seq.id.clone(),
                name: seq.name.clone(),
                total: seq.len(),
            },
        );

        let mut ctx = ExecutionContext::new();
        let deadline = Duration::from_secs(self.config.sequence_timeout_secs);
        let outcome = tokio::time::timeout(deadline, self.run_actions(seq, &mut ctx, progress)).await;

        let error = match outcome {
            Ok(None) => {
                seq.status = SequenceStatus::Completed;
                None
            }
            Ok(Some(Stop::Cancelled)) => {
                seq.status = SequenceStatus::Cancelled;
                Some(DeskPilotError::Cancelled.to_string())
            }
            Ok(Some(Stop::Failed(message))) => {
                seq.status = SequenceStatus::Failed;
                Some(message)
            }
            Err(_) => {
                let message = DeskPilotError::Timeout(deadline.as_millis() as u64).to_string();
                self.time_out_in_flight(seq, &message, progress);
                seq.status = SequenceStatus::Failed;
                Some(format!("sequence deadline exceeded: {message}"))
            }
        };
        Ok(self.finish(seq, started, error, progress))
    }

    /// `true` when the run may proceed.
    async fn confirmation_gate(
        &self,
        seq: &mut ActionSequence,
        confirm: Option<&dyn ConfirmationHandler>,
        progress: Option<ProgressFn<'_>>,
    ) -> bool {
        if let Some(first) = seq.actions.first_mut() {
            first.transition(ActionStatus::WaitingUser);
        }
        self.emit(
            progress,
            ProgressEvent::AwaitingConfirmation {
                sequence_id: seq.id.clone(),
                total: seq.len(),
            },
        );

        let Some(handler) = confirm else {
            tracing::warn!(sequence = %seq.id, "confirmation required but no handler registered");
            return false;
        };
        let snapshot: &ActionSequence = seq;
        tokio::select! {
            approved = handler.confirm(snapshot) => approved,
            _ = self.cancel.cancelled() => {
                tracing::info!(sequence = %snapshot.id, "cancelled while awaiting confirmation");
                false
            }
        }
    }

    /// Runs every action in order. `None` means the loop reached the end.
    async fn run_actions(
        &self,
        seq: &mut ActionSequence,
        ctx: &mut ExecutionContext,
        progress: Option<ProgressFn<'_>>,
    ) -> Option<Stop> {
        let total = seq.len();
        let pause = Duration::from_millis(self.config.inter_action_pause_ms);
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);

        for index in 0..total {
            if index > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            if self.cancel.is_cancelled() {
                tracing::info!(sequence = %seq.id, index, "sequence cancelled between actions");
                return Some(Stop::Cancelled);
            }

            seq.advance_to(index);
            ctx.retry_count = 0;

            let sequence_id = seq.id.clone();
            let action = &mut seq.actions[index];
            let spec = action.spec.clone();
            let timeout = action.timeout();
            action.transition(ActionStatus::Running);
            action.started_at = Some(chrono::Utc::now());
            let action_started = Instant::now();

            tracing::info!(
                sequence = %sequence_id,
                index,
                kind = %spec.kind(),
                description = %action.description,
                "action started"
            );
            self.emit(
                progress,
                ProgressEvent::ActionStarted {
                    sequence_id: sequence_id.clone(),
                    index,
                    total,
                    kind: spec.kind(),
                    description: action.description.clone(),
                    retry_count: ctx.retry_count,
                },
            );

            loop {
                action.attempts += 1;
                match tokio::time::timeout(timeout, self.attempt(&spec, ctx)).await {
                    Ok(Ok(result)) => {
                        action.result = Some(result);
                        action.error = None;
                        action.transition(ActionStatus::Completed);
                        break;
                    }
                    Ok(Err(e)) if ctx.retry_count < action.max_retries => {
                        ctx.retry_count += 1;
                        tracing::warn!(
                            sequence = %sequence_id,
                            index,
                            retry = ctx.retry_count,
                            max_retries = action.max_retries,
                            error = %e,
                            "action failed, retrying"
                        );
                        self.emit(
                            progress,
                            ProgressEvent::ActionRetrying {
                                sequence_id: sequence_id.clone(),
                                index,
                                retry_count: ctx.retry_count,
                                error: e.to_string(),
                            },
                        );
                        if !backoff.is_zero() {
                            tokio::time::sleep(backoff).await;
                        }
                    }
                    Ok(Err(e)) => {
                        action.error = Some(e.to_string());
                        action.transition(ActionStatus::Failed);
                        break;
                    }
                    Err(_) => {
                        let e = DeskPilotError::Timeout(timeout.as_millis() as u64);
                        action.error = Some(e.to_string());
                        action.transition(ActionStatus::Timeout);
                        break;
                    }
                }
            }
            action.elapsed_ms = Some(action_started.elapsed().as_millis() as u64);

            let status = action.status;
            let error = action.error.clone();
            let continue_on_error = action.continue_on_error;
            if status == ActionStatus::Completed {
                seq.success_count += 1;
                tracing::info!(sequence = %sequence_id, index, attempts = seq.actions[index].attempts, "action completed");
            } else {
                seq.failure_count += 1;
                tracing::warn!(
                    sequence = %sequence_id,
                    index,
                    status = %status,
                    error = error.as_deref().unwrap_or(""),
                    "action did not complete"
                );
            }
            self.emit(
                progress,
                ProgressEvent::ActionFinished {
                    sequence_id: sequence_id.clone(),
                    index,
                    status,
                    error: error.clone(),
                },
            );

            if status != ActionStatus::Completed && !continue_on_error {
                return Some(Stop::Failed(format!(
                    "action {index} ({}) {status}: {}",
                    spec.kind(),
                    error.unwrap_or_default()
                )));
            }
        }
        None
    }

    /// One dispatch attempt: refresh the capture, check policy, dispatch.
    async fn attempt(&self, spec: &ActionSpec, ctx: &mut ExecutionContext) -> DeskPilotResult<Value> {
        if !matches!(spec.kind(), ActionKind::Wait | ActionKind::Screenshot) {
            match self.caps.capture.capture().await {
                Ok(image) => {
                    self.policy
                        .set_screen_size(image.meta.physical_width, image.meta.physical_height);
                    ctx.last_capture = Some(image);
                }
                Err(e) => tracing::warn!(error = %e, "screen refresh failed, continuing"),
            }
        }

        let points = pointer_points(spec, ctx)?;
        self.policy.allow(spec, &points)?;
        dispatch(spec, &points, &self.caps, ctx).await
    }

    /// Marks the action that was running when the sequence deadline fired.
    fn time_out_in_flight(&self, seq: &mut ActionSequence, message: &str, progress: Option<ProgressFn<'_>>) {
        let index = seq.current_index;
        let Some(action) = seq.actions.get_mut(index) else {
            return;
        };
        if action.status != ActionStatus::Running {
            return;
        }
        action.transition(ActionStatus::Timeout);
        action.error = Some(message.to_string());
        action.elapsed_ms = action
            .started_at
            .map(|t| (chrono::Utc::now() - t).num_milliseconds().max(0) as u64);
        seq.failure_count += 1;
        tracing::warn!(sequence = %seq.id, index, "sequence deadline hit during action");
        self.emit(
            progress,
            ProgressEvent::ActionFinished {
                sequence_id: seq.id.clone(),
                index,
                status: ActionStatus::Timeout,
                error: Some(message.to_string()),
            },
        );
    }

    fn finish(
        &self,
        seq: &mut ActionSequence,
        started: Instant,
        error: Option<String>,
        progress: Option<ProgressFn<'_>>,
    ) -> ExecutionReport {
        seq.ended_at = Some(chrono::Utc::now());
        let report = ExecutionReport {
            sequence_id: seq.id.clone(),
            status: seq.status,
            success_count: seq.success_count,
            failure_count: seq.failure_count,
            elapsed_ms: started.elapsed().as_millis() as u64,
            error,
        };

        {
            let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            stats.sequences_run += 1;
            stats.actions_run += (seq.success_count + seq.failure_count) as u64;
            stats.actions_completed += seq.success_count as u64;
            stats.total_duration_ms += report.elapsed_ms;
        }

        if let Some(history) = &self.history {
            let entry = HistoryEntry {
                ts: chrono::Utc::now().timestamp_millis(),
                sequence_name: seq.name.clone(),
                actions: seq.len(),
                report: report.clone(),
            };
            if let Err(e) = history.append(&entry) {
                tracing::warn!(error = %e, "failed to write run history");
            }
        }

        tracing::info!(
            sequence = %report.sequence_id,
            status = %report.status,
            success = report.success_count,
            failed = report.failure_count,
            elapsed_ms = report.elapsed_ms,
            "sequence finished"
        );
        self.emit(progress, ProgressEvent::SequenceFinished { report: report.clone() });
        report
    }
}
