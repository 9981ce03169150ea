//! One iteration of the task loop: capture, predict, parse, validate,
//! transform, dispatch, record.
//!
//! Every failure ends up in the returned [`StepReport`]; nothing is raised to
//! the caller. A report with `fatal` set means the step could not do its job
//! and the loop has to decide whether the task goes on.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::action::{validate_action, Action, TerminateStatus};
use crate::agent_engine::event_bus::{EventBus, TaskEvent};
use crate::agent_engine::state::{ExecutionStep, Observation, StepOutcome};
use crate::agent_engine::user_prompt::UserPrompter;
use crate::config::{AppConfig, GestureConfig};
use crate::device::DeviceTransport;
use crate::errors::{PilotError, PilotResult};
use crate::executor::{self, CoordinateMapper, Dispatcher};
use crate::llm::{parse_prediction, HistoryTurn, ModelClient, PredictionRequest};

pub struct StepReport {
    pub record: ExecutionStep,
    pub should_terminate: bool,
    pub final_message: Option<String>,
    pub fatal: Option<PilotError>,
}

impl StepReport {
    /// True when the action passed validation and reached its handler.
    pub fn accepted(&self) -> bool {
        self.fatal.is_none() && self.record.action.is_some()
    }
}

struct Completion {
    outcome: StepOutcome,
    note: Option<String>,
    should_terminate: bool,
    final_message: Option<String>,
}

impl Completion {
    fn done() -> Self {
        Self {
            outcome: StepOutcome::Success,
            note: None,
            should_terminate: false,
            final_message: None,
        }
    }
}

pub struct StepExecutor {
    transport: Box<dyn DeviceTransport>,
    model: Arc<dyn ModelClient>,
    prompter: Arc<dyn UserPrompter>,
    events: EventBus,
    mapper: CoordinateMapper,
    gestures: GestureConfig,
    apps: HashMap<String, String>,
    history_n: usize,
    max_steps: u32,
    save_screenshots: bool,
    ask_timeout: Duration,
    pending_reply: Option<String>,
}

impl StepExecutor {
    pub fn new(
        config: &AppConfig,
        transport: Box<dyn DeviceTransport>,
        model: Arc<dyn ModelClient>,
        prompter: Arc<dyn UserPrompter>,
        events: EventBus,
    ) -> Self {
        let mapper = CoordinateMapper::new(transport.screen_size());
        Self {
            transport,
            model,
            prompter,
            events,
            mapper,
            gestures: config.gestures.clone(),
            apps: config.apps.clone(),
            history_n: config.model.history_n,
            max_steps: config.execution.max_steps,
            save_screenshots: config.logging.save_screenshots,
            ask_timeout: Duration::from_secs(config.execution.ask_timeout_secs),
            pending_reply: None,
        }
    }

    pub fn transport_mut(&mut self) -> &mut dyn DeviceTransport {
        self.transport.as_mut()
    }

    pub async fn execute(
        &mut self,
        step: u32,
        instruction: &str,
        history: &[ExecutionStep],
    ) -> StepReport {
        let started = Instant::now();
        let mut record = ExecutionStep {
            step_number: step,
            timestamp: chrono::Utc::now(),
            screenshot_b64: None,
            reasoning: None,
            action: None,
            outcome: StepOutcome::Failed,
            error: None,
            execution_time_ms: 0,
        };

        let mut report = match self.run(step, instruction, history, &mut record).await {
            Ok(done) => {
                record.outcome = done.outcome;
                record.error = done.note;
                StepReport {
                    record,
                    should_terminate: done.should_terminate,
                    final_message: done.final_message,
                    fatal: None,
                }
            }
            Err(e) => {
                tracing::warn!(step, kind = ?e.kind(), error = %e, "step failed");
                record.outcome = StepOutcome::Failed;
                record.error = Some(e.to_string());
                StepReport {
                    record,
                    should_terminate: false,
                    final_message: None,
                    fatal: Some(e),
                }
            }
        };
        report.record.execution_time_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn run(
        &mut self,
        step: u32,
        instruction: &str,
        history: &[ExecutionStep],
        record: &mut ExecutionStep,
    ) -> PilotResult<Completion> {
        // Each step observes the screen as it is now, not as the last step left it.
        self.transport.invalidate_screenshot();
        let observation = Observation {
            screenshot: self.transport.capture_screenshot().await?,
            step,
            max_steps: self.max_steps,
        };
        if self.save_screenshots {
            record.screenshot_b64 = Some(observation.screenshot.to_base64());
        }

        let request = PredictionRequest {
            instruction: instruction.to_string(),
            screenshot: observation.screenshot,
            step: observation.step,
            max_steps: observation.max_steps,
            history: self.history_turns(history),
            user_reply: self.pending_reply.clone(),
        };
        let raw = self.model.predict(&request).await?;
        self.pending_reply = None;
        tracing::debug!(step, raw = %raw, "model output");

        let prediction = parse_prediction(&raw)?;
        record.reasoning = prediction.reasoning.clone();

        let action = validate_action(&prediction.payload)?;
        record.action = Some(action.clone());
        let command = executor::plan(&action, &self.mapper, &self.gestures)?;

        tracing::info!(step, action = %action.kind(), "dispatching action");
        let completion = match &action {
            Action::Terminate(status) => Completion {
                should_terminate: true,
                final_message: Some(match status {
                    TerminateStatus::Success => "Task completed".to_string(),
                    TerminateStatus::Fail => "Model terminated the task with status: fail".to_string(),
                }),
                ..Completion::done()
            },
            Action::Answer { text } => Completion {
                should_terminate: true,
                final_message: Some(text.clone()),
                ..Completion::done()
            },
            Action::AskUser { question } => self.ask_user(question).await,
            Action::McpCall { tool, .. } => {
                tracing::warn!(tool = %tool, "mcp_call is not supported, skipping");
                Completion {
                    outcome: StepOutcome::Skipped,
                    note: Some(format!("mcp_call '{tool}' is not supported")),
                    ..Completion::done()
                }
            }
            Action::Note { text } => {
                tracing::info!(step, note = %text, "model note");
                Completion::done()
            }
            Action::Tap { .. }
            | Action::LongPress { .. }
            | Action::DoubleClick { .. }
            | Action::Swipe(_)
            | Action::Drag { .. }
            | Action::Pinch { .. }
            | Action::Rotate { .. }
            | Action::Type { .. }
            | Action::SystemButton(_)
            | Action::Open { .. }
            | Action::Wait { .. } => {
                let dispatched = Dispatcher::new(&self.gestures, &self.apps)
                    .dispatch(&command, self.transport.as_mut())
                    .await?;
                Completion {
                    note: dispatched.soft_failure,
                    ..Completion::done()
                }
            }
        };
        Ok(completion)
    }

    async fn ask_user(&mut self, question: &str) -> Completion {
        self.events.publish(TaskEvent::UserQuestion {
            question: question.to_string(),
        });
        let answer = match tokio::time::timeout(self.ask_timeout, self.prompter.ask(question)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no answer within {}s", self.ask_timeout.as_secs())),
        };
        // The screen may have changed while waiting.
        self.transport.invalidate_screenshot();

        match answer {
            Ok(answer) => {
                tracing::info!(answer = %answer, "user answered");
                self.pending_reply = Some(answer);
                Completion::done()
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "question went unanswered");
                self.pending_reply = Some("(no answer)".to_string());
                Completion {
                    note: Some(reason),
                    ..Completion::done()
                }
            }
        }
    }

    fn history_turns(&self, history: &[ExecutionStep]) -> Vec<HistoryTurn> {
        let with_action: Vec<&ExecutionStep> =
            history.iter().filter(|s| s.action.is_some()).collect();
        let skip = with_action.len().saturating_sub(self.history_n);
        with_action
            .into_iter()
            .skip(skip)
            .filter_map(|s| {
                s.action.as_ref().map(|a| HistoryTurn {
                    step: s.step_number,
                    reasoning: s.reasoning.clone(),
                    action: a.to_value(),
                })
            })
            .collect()
    }
}
