// Automation module
// YAML-driven poll loop: each round runs the gated actions (detect, click,
// notify, ...) and then checks the exit rules.

pub mod actions;
pub mod capture;
pub mod click;
pub mod condition;
pub mod config;
pub mod fsm;
pub mod render;
pub mod types;
pub mod variables;


pub use actions::{Action, ActionExecutor};
pub use config::{ActionSpec, ActionType, AutomationConfig, ExitRule, ExitSpec, PollingSpec, TargetKind, TargetSpec};
pub use fsm::{AutomationRunner, describe_plan};
pub use types::{RoundContext, RunState};
pub use variables::{VariableStore, Variables};
