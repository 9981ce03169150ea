use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::agent_engine::state::{StepOutcome, TaskStatus};

/// Progress notifications published while a task runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskStarted {
        task_id: String,
        instruction: String,
        max_steps: u32,
    },
    StepStarted {
        step: u32,
    },
    StepRecorded {
        step: u32,
        action: Option<String>,
        outcome: StepOutcome,
        error: Option<String>,
    },
    LoopBreaker {
        after_step: u32,
        action: String,
    },
    UserQuestion {
        question: String,
    },
    TaskFinished {
        task_id: String,
        status: TaskStatus,
        total_steps: u32,
        trajectory: Option<PathBuf>,
    },
}

/// Fan-out of [`TaskEvent`]s. Publishing with no subscriber is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: TaskEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("task event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        bus.publish(TaskEvent::StepStarted { step: 0 });

        let mut rx = bus.subscribe();
        bus.publish(TaskEvent::StepStarted { step: 1 });
        match rx.recv().await.unwrap() {
            TaskEvent::StepStarted { step } => assert_eq!(step, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(TaskEvent::LoopBreaker {
            after_step: 3,
            action: "tap".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "loop_breaker");
        assert_eq!(json["after_step"], 3);
    }
}
