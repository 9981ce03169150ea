pub mod engine;
pub mod event_bus;
pub mod history;
pub mod loop_control;
pub mod state;
pub mod step;
pub mod user_prompt;

pub use engine::AgentEngine;
pub use event_bus::{EventBus, TaskEvent};
pub use history::{load_trajectory, TrajectoryRecorder};
pub use state::{ExecutionStep, StepOutcome, TaskResult, TaskStatus};
pub use user_prompt::{LinePrompter, NoPrompter, UserPrompter};
