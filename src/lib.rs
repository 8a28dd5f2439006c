pub mod args;
pub mod automation;
pub mod browser;
pub mod desktop;
pub mod error;
pub mod template_matching;

pub use automation::{AutomationConfig, AutomationRunner, RunState};
pub use error::{RunnerError, RunnerResult};
pub use template_matching::{MatchResult, ScaleSet, TemplateMatcher};
