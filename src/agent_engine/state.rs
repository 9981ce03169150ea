use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::device::Screenshot;

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Success,
    Failed,
    /// Recognized control action with no implementation (`mcp_call`).
    Skipped,
}

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
    Timeout,
    Interrupted,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// What the device looked like at the start of a step.
#[derive(Debug, Clone)]
pub struct Observation {
    pub screenshot: Screenshot,
    pub step: u32,
    pub max_steps: u32,
}

/// One recorded step. `action` is `None` when the step failed before an
/// action could be recovered from the model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_number: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_b64: Option<String>,
    #[serde(rename = "thinking", default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub action: Option<Action>,
    #[serde(rename = "action_result")]
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

/// The persisted record of a whole task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub instruction: String,
    pub status: TaskStatus,
    pub total_steps: u32,
    pub duration_seconds: f64,
    pub final_message: Option<String>,
    pub error: Option<String>,
    pub trajectory: Vec<ExecutionStep>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
