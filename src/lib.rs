pub mod action;
pub mod agent_engine;
pub mod config;
pub mod device;
pub mod errors;
pub mod executor;
pub mod llm;

pub use agent_engine::{AgentEngine, TaskResult, TaskStatus};
pub use config::AppConfig;
pub use errors::{PilotError, PilotResult};
