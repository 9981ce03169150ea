use std::path::{Path, PathBuf};

use crate::agent_engine::state::{ExecutionStep, TaskResult, TaskStatus};
use crate::config::LoggingConfig;
use crate::errors::PilotResult;

pub const TRAJECTORY_FILE: &str = "trajectory.json";

/// Collects the steps of one task in memory and writes the finished
/// [`TaskResult`] once, to `<output_dir>/<task_id>/trajectory.json`.
pub struct TrajectoryRecorder {
    task_id: String,
    output_dir: PathBuf,
    enabled: bool,
    steps: Vec<ExecutionStep>,
}

impl TrajectoryRecorder {
    pub fn new(task_id: impl Into<String>, logging: &LoggingConfig) -> Self {
        Self {
            task_id: task_id.into(),
            output_dir: logging.output_dir.clone(),
            enabled: logging.save_trajectory,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: ExecutionStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn path(&self) -> PathBuf {
        self.output_dir.join(&self.task_id).join(TRAJECTORY_FILE)
    }

    /// Closes the trajectory into an immutable result.
    pub fn finish(
        self,
        instruction: &str,
        status: TaskStatus,
        duration_seconds: f64,
        final_message: Option<String>,
        error: Option<String>,
    ) -> (TaskResult, TrajectoryWriter) {
        let writer = TrajectoryWriter {
            path: self.path(),
            enabled: self.enabled,
        };
        let result = TaskResult {
            task_id: self.task_id,
            instruction: instruction.to_string(),
            status,
            total_steps: self.steps.len() as u32,
            duration_seconds,
            final_message,
            error,
            trajectory: self.steps,
        };
        (result, writer)
    }
}

/// Where a finished trajectory goes.
pub struct TrajectoryWriter {
    path: PathBuf,
    enabled: bool,
}

impl TrajectoryWriter {
    /// Writes `result` as pretty JSON. Returns `Ok(None)` when saving is disabled.
    pub fn persist(&self, result: &TaskResult) -> PilotResult<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(result)?;
        std::fs::write(&self.path, json)?;
        tracing::info!(
            path = %self.path.display(),
            steps = result.total_steps,
            "trajectory saved"
        );
        Ok(Some(self.path.clone()))
    }
}

pub fn load_trajectory(path: &Path) -> PilotResult<TaskResult> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, NormPoint};
    use crate::agent_engine::state::StepOutcome;

    fn step(n: u32, outcome: StepOutcome) -> ExecutionStep {
        ExecutionStep {
            step_number: n,
            timestamp: chrono::Utc::now(),
            screenshot_b64: None,
            reasoning: Some("tap the icon".into()),
            action: Some(Action::Tap {
                at: NormPoint::new(0.25, 0.75),
            }),
            outcome,
            error: None,
            execution_time_ms: 42,
        }
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let logging = LoggingConfig {
            output_dir: dir.path().to_path_buf(),
            ..LoggingConfig::default()
        };
        let mut recorder = TrajectoryRecorder::new("task_20250101_000000_abcdef12", &logging);
        recorder.record(step(1, StepOutcome::Success));
        recorder.record(step(2, StepOutcome::Failed));
        let expected_path = recorder.path();

        let (result, writer) =
            recorder.finish("open settings", TaskStatus::Failed, 1.5, None, Some("boom".into()));
        let path = writer.persist(&result).unwrap().unwrap();
        assert_eq!(path, expected_path);
        assert!(path.ends_with("task_20250101_000000_abcdef12/trajectory.json"));

        let loaded = load_trajectory(&path).unwrap();
        assert_eq!(loaded, result);
        assert_eq!(loaded.total_steps, 2);
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let logging = LoggingConfig {
            output_dir: dir.path().to_path_buf(),
            save_trajectory: false,
            ..LoggingConfig::default()
        };
        let recorder = TrajectoryRecorder::new("t", &logging);
        let (result, writer) = recorder.finish("x", TaskStatus::Success, 0.0, None, None);
        assert_eq!(writer.persist(&result).unwrap(), None);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
