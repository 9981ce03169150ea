// Step budget, repeat detection and retry decisions for the task loop.
use std::collections::VecDeque;

use crate::action::Action;
use crate::config::{ExecutionConfig, RetryConfig};
use crate::errors::{FailureKind, PilotError};

/// Identical consecutive actions that trip the loop breaker.
pub const REPEAT_WINDOW: usize = 3;

pub struct LoopController {
    max_steps: u32,
    issued: u32,
    recent: VecDeque<Action>,
    retry: RetryPolicy,
}

impl LoopController {
    pub fn new(cfg: &ExecutionConfig) -> Self {
        Self {
            max_steps: cfg.max_steps,
            issued: 0,
            recent: VecDeque::with_capacity(REPEAT_WINDOW),
            retry: RetryPolicy::new(&cfg.retry),
        }
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Next 1-based step number, or `None` once the budget is spent.
    pub fn next_step(&mut self) -> Option<u32> {
        if self.issued >= self.max_steps {
            return None;
        }
        self.issued += 1;
        Some(self.issued)
    }

    /// Feeds an accepted action. Returns true when the last
    /// [`REPEAT_WINDOW`] actions are identical; the window then starts over.
    pub fn observe(&mut self, action: &Action) -> bool {
        if self.recent.len() == REPEAT_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(action.clone());

        let stuck = self.recent.len() == REPEAT_WINDOW
            && self.recent.iter().all(|a| a == &self.recent[0]);
        if stuck {
            self.recent.clear();
        }
        stuck
    }

    pub fn should_retry(&mut self, err: &PilotError) -> bool {
        self.retry.should_retry(err.kind())
    }
}

/// Bounded retry keyed on [`FailureKind`]. The default retries nothing.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_on: Vec<FailureKind>,
    used: u32,
}

impl RetryPolicy {
    pub fn new(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            retry_on: cfg.retry_on.clone(),
            used: 0,
        }
    }

    pub fn should_retry(&mut self, kind: FailureKind) -> bool {
        if self.used >= self.max_retries || !self.retry_on.contains(&kind) {
            return false;
        }
        self.used += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{NormPoint, SystemButton};

    fn tap(x: f64) -> Action {
        Action::Tap {
            at: NormPoint::new(x, 0.5),
        }
    }

    #[test]
    fn test_budget() {
        let cfg = ExecutionConfig {
            max_steps: 2,
            ..ExecutionConfig::default()
        };
        let mut ctl = LoopController::new(&cfg);
        assert_eq!(ctl.next_step(), Some(1));
        assert_eq!(ctl.next_step(), Some(2));
        assert_eq!(ctl.next_step(), None);
    }

    #[test]
    fn test_three_identical_actions_trip_once() {
        let mut ctl = LoopController::new(&ExecutionConfig::default());
        assert!(!ctl.observe(&tap(0.1)));
        assert!(!ctl.observe(&tap(0.1)));
        assert!(ctl.observe(&tap(0.1)));
        assert!(!ctl.observe(&tap(0.1)));
    }

    #[test]
    fn test_different_actions_do_not_trip() {
        let mut ctl = LoopController::new(&ExecutionConfig::default());
        assert!(!ctl.observe(&tap(0.1)));
        assert!(!ctl.observe(&tap(0.2)));
        assert!(!ctl.observe(&tap(0.2)));
        assert!(!ctl.observe(&Action::SystemButton(SystemButton::Back)));
    }

    #[test]
    fn test_default_policy_never_retries() {
        let mut policy = RetryPolicy::default();
        assert!(!policy.should_retry(FailureKind::PredictionTimeout));
        assert!(!policy.should_retry(FailureKind::TransportDisconnected));
    }

    #[test]
    fn test_bounded_retry_by_kind() {
        let mut policy = RetryPolicy::new(&RetryConfig {
            max_retries: 2,
            retry_on: vec![FailureKind::PredictionTimeout],
        });
        assert!(!policy.should_retry(FailureKind::Parse));
        assert!(policy.should_retry(FailureKind::PredictionTimeout));
        assert!(policy.should_retry(FailureKind::PredictionTimeout));
        assert!(!policy.should_retry(FailureKind::PredictionTimeout));
    }
}
