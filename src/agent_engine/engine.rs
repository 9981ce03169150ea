use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::event_bus::{EventBus, TaskEvent};
use crate::agent_engine::history::TrajectoryRecorder;
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{TaskResult, TaskStatus};
use crate::agent_engine::step::StepExecutor;
use crate::agent_engine::user_prompt::UserPrompter;
use crate::config::AppConfig;
use crate::device::DeviceTransport;
use crate::llm::ModelClient;

/// How the loop ended, before the result is assembled.
struct Ending {
    status: TaskStatus,
    final_message: Option<String>,
    error: Option<String>,
}

impl Ending {
    fn new(status: TaskStatus, final_message: Option<String>, error: Option<String>) -> Self {
        Self {
            status,
            final_message,
            error,
        }
    }

    fn interrupted() -> Self {
        Self::new(
            TaskStatus::Interrupted,
            None,
            Some("task cancelled".to_string()),
        )
    }
}

/// Runs tasks against one device until the model finishes, the step budget
/// runs out, a step fails fatally or the task is cancelled.
pub struct AgentEngine {
    config: AppConfig,
    executor: StepExecutor,
    events: EventBus,
    cancel: CancellationToken,
}

impl AgentEngine {
    pub fn new(
        config: AppConfig,
        transport: Box<dyn DeviceTransport>,
        model: Arc<dyn ModelClient>,
        prompter: Arc<dyn UserPrompter>,
    ) -> Self {
        let events = EventBus::new();
        let executor = StepExecutor::new(&config, transport, model, prompter, events.clone());
        Self {
            config,
            executor,
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that interrupts the running task; the trajectory so far is kept.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Runs one task to a terminal state. Never fails: every error is folded
    /// into the returned [`TaskResult`], which is also persisted.
    pub async fn run(&mut self, instruction: &str) -> TaskResult {
        let task_id = new_task_id();
        let started = Instant::now();
        let mut recorder = TrajectoryRecorder::new(task_id.clone(), &self.config.logging);
        let mut ctl = LoopController::new(&self.config.execution);

        tracing::info!(
            task_id = %task_id,
            instruction = %instruction,
            max_steps = ctl.max_steps(),
            "task started"
        );
        self.events.publish(TaskEvent::TaskStarted {
            task_id: task_id.clone(),
            instruction: instruction.to_string(),
            max_steps: ctl.max_steps(),
        });

        let ending = self.drive(instruction, &mut recorder, &mut ctl).await;

        let (result, writer) = recorder.finish(
            instruction,
            ending.status,
            started.elapsed().as_secs_f64(),
            ending.final_message,
            ending.error,
        );
        let trajectory = match writer.persist(&result) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(error = %e, "failed to save trajectory");
                None
            }
        };

        tracing::info!(
            task_id = %result.task_id,
            status = %result.status,
            steps = result.total_steps,
            duration_s = result.duration_seconds,
            "task finished"
        );
        self.events.publish(TaskEvent::TaskFinished {
            task_id: result.task_id.clone(),
            status: result.status,
            total_steps: result.total_steps,
            trajectory,
        });
        result
    }

    async fn drive(
        &mut self,
        instruction: &str,
        recorder: &mut TrajectoryRecorder,
        ctl: &mut LoopController,
    ) -> Ending {
        let step_delay = Duration::from_millis(self.config.execution.step_delay_ms);
        let breaker_pause = Duration::from_millis(self.config.execution.loop_breaker_pause_ms);

        loop {
            if self.cancel.is_cancelled() {
                return Ending::interrupted();
            }
            let Some(step) = ctl.next_step() else {
                let budget = ctl.max_steps();
                tracing::warn!(budget, "step budget exhausted");
                return Ending::new(
                    TaskStatus::Timeout,
                    None,
                    Some(format!("reached the step budget of {budget} without finishing")),
                );
            };

            self.events.publish(TaskEvent::StepStarted { step });
            let cancel = self.cancel.clone();
            let report = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                report = self.executor.execute(step, instruction, recorder.steps()) => Some(report),
            };
            let Some(report) = report else {
                tracing::info!(step, "cancelled mid-step, step discarded");
                return Ending::interrupted();
            };

            let accepted = report.accepted();
            self.events.publish(TaskEvent::StepRecorded {
                step,
                action: report.record.action.as_ref().map(|a| a.kind().to_string()),
                outcome: report.record.outcome,
                error: report.record.error.clone(),
            });
            let action = report.record.action.clone();
            recorder.record(report.record);

            if let Some(err) = report.fatal {
                if ctl.should_retry(&err) {
                    tracing::warn!(step, kind = ?err.kind(), "retrying after step failure");
                    continue;
                }
                return Ending::new(TaskStatus::Failed, None, Some(err.to_string()));
            }

            if report.should_terminate {
                return Ending::new(TaskStatus::Success, report.final_message, None);
            }

            if let Some(action) = action.filter(|_| accepted) {
                if ctl.observe(&action) {
                    tracing::warn!(
                        step,
                        action = %action.kind(),
                        pause_ms = breaker_pause.as_millis() as u64,
                        "same action repeated, pausing"
                    );
                    self.events.publish(TaskEvent::LoopBreaker {
                        after_step: step,
                        action: action.kind().to_string(),
                    });
                    if !self.pause(breaker_pause).await {
                        return Ending::interrupted();
                    }
                    self.executor.transport_mut().invalidate_screenshot();
                }
            }

            if !self.pause(step_delay).await {
                return Ending::interrupted();
            }
        }
    }

    /// Sleeps unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// `task_<YYYYmmdd_HHMMSS>_<8 hex>`
pub fn new_task_id() -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("task_{stamp}_{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_shape() {
        let id = new_task_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "task");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
