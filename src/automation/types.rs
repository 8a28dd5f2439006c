// Types and enums for the automation poll loop
use super::condition::{Context, Value};
use super::variables::Variables;
use std::collections::BTreeMap;

/// Poll loop state. `Running` is initial, both exits are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    ExitedSuccess,
    ExitedTimeout,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }

    /// Process exit code for a terminal state
    pub fn exit_code(&self) -> i32 {
        match self {
            RunState::Running | RunState::ExitedSuccess => 0,
            RunState::ExitedTimeout => 1,
        }
    }
}

/// State carried across rounds of one poll loop invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundContext {
    pub attempts: u32,
    pub elapsed_seconds: f64,
    pub last_match_score: f64,
    pub target_found: bool,
    pub variables: Variables,
    /// Configured wall-clock budget, exposed to conditions when set
    pub timeout_seconds: Option<f64>,
}

impl RoundContext {
    pub fn new(variables: Variables, timeout_seconds: Option<f64>) -> Self {
        Self {
            variables,
            timeout_seconds,
            ..Self::default()
        }
    }

    /// Names visible to `when` and exit conditions
    pub fn condition_context(&self) -> Context {
        let vars: BTreeMap<String, Value> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), Value::Text(v.clone())))
            .collect();
        let mut context = Context::new();
        context.insert("attempts".into(), Value::from(self.attempts));
        context.insert("elapsed_seconds".into(), Value::from(self.elapsed_seconds));
        context.insert("last_match_score".into(), Value::from(self.last_match_score));
        context.insert("target_found".into(), Value::from(self.target_found));
        context.insert("vars".into(), Value::Map(vars));
        if let Some(timeout) = self.timeout_seconds {
            context.insert("timeout_seconds".into(), Value::from(timeout));
        }
        context
    }

    /// Record the outcome of a detection
    pub fn record_match(&mut self, score: f64, found: bool) {
        self.last_match_score = score;
        self.target_found = found;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::condition::evaluate;

    #[test]
    fn test_context_exposes_round_state() {
        let mut variables = Variables::new();
        variables.insert("user".to_string(), "alice".to_string());
        let mut round = RoundContext::new(variables, Some(30.0));
        round.attempts = 2;
        round.elapsed_seconds = 31.5;
        round.record_match(0.91, true);

        let context = round.condition_context();
        assert!(evaluate("attempts == 2 and target_found", &context));
        assert!(evaluate("last_match_score > 0.9", &context));
        assert!(evaluate("elapsed_seconds >= timeout_seconds", &context));
        assert!(evaluate("vars.user == 'alice'", &context));
    }

    #[test]
    fn test_timeout_seconds_absent_when_unset() {
        let round = RoundContext::new(Variables::new(), None);
        assert!(!evaluate("elapsed_seconds >= timeout_seconds", &round.condition_context()));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunState::ExitedSuccess.exit_code(), 0);
        assert_eq!(RunState::ExitedTimeout.exit_code(), 1);
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::ExitedTimeout.is_terminal());
    }
}
