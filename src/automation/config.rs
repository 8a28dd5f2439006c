// YAML configuration for the automation runner
use super::actions::Action;
use super::condition;
use crate::browser::ChromeDriverOptions;
use crate::error::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INTERVAL_SECONDS: f64 = 10.0;
pub const VARIABLES_FILE: &str = "variables.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Url,
    Selector,
    WindowTitle,
    ProcessName,
}

impl TargetKind {
    /// Targets whose frames come from a browser session
    pub fn is_browser(&self) -> bool {
        matches!(self, TargetKind::Url | TargetKind::Selector)
    }

    /// Targets located through window geometry on the desktop
    pub fn is_window(&self) -> bool {
        !self.is_browser()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub value: String,
    #[serde(default = "default_capture_method")]
    pub capture_method: String,
}

fn default_capture_method() -> String {
    "screenshot".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingSpec {
    pub interval_seconds: f64,
    /// 0 means unbounded
    pub max_attempts: u32,
    pub timeout_seconds: Option<f64>,
    /// Stop at `max_attempts` even when the timeout condition is false
    pub strict_max_attempts: bool,
}

impl Default for PollingSpec {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            max_attempts: 0,
            timeout_seconds: None,
            strict_max_attempts: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    DetectImage,
    ClickImage,
    ClickSelector,
    Keystroke,
    Notify,
    RunCommand,
    ReloadVars,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::DetectImage => "detect_image",
            ActionType::ClickImage => "click_image",
            ActionType::ClickSelector => "click_selector",
            ActionType::Keystroke => "keystroke",
            ActionType::Notify => "notify",
            ActionType::RunCommand => "run_command",
            ActionType::ReloadVars => "reload_vars",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default)]
    pub params: Mapping,
    #[serde(default = "default_when")]
    pub when: String,
}

fn default_when() -> String {
    "true".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExitRule {
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default)]
    pub action: Option<ActionSpec>,
}

fn default_condition() -> String {
    "false".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExitSpec {
    pub on_success: Option<ExitRule>,
    pub on_timeout: Option<ExitRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutomationConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub target: TargetSpec,
    #[serde(default)]
    pub polling: PollingSpec,
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub exit: ExitSpec,
    #[serde(default)]
    pub headless: bool,
    /// Where the latest browser screenshot is written
    #[serde(default)]
    pub screenshot: Option<PathBuf>,
    /// Fallback output for annotated detections
    #[serde(default)]
    pub annotated: Option<PathBuf>,
    #[serde(default)]
    pub variables_path: Option<PathBuf>,
    #[serde(default)]
    pub browser: ChromeDriverOptions,
}

impl AutomationConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> RunnerResult<Self> {
        let config: AutomationConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks beyond what serde enforces. Action parameters are
    /// checked by parsing them into their typed form.
    pub fn validate(&self) -> RunnerResult<()> {
        if self.target.value.trim().is_empty() {
            return Err(RunnerError::invalid("target.value must not be empty"));
        }
        let interval = self.polling.interval_seconds;
        if Duration::try_from_secs_f64(interval).is_err() {
            return Err(RunnerError::invalid(format!(
                "polling.interval_seconds must be a non-negative number of seconds, got {interval}"
            )));
        }
        if let Some(timeout) = self.polling.timeout_seconds
            && (!timeout.is_finite() || timeout <= 0.0)
        {
            return Err(RunnerError::invalid(format!(
                "polling.timeout_seconds must be positive, got {timeout}"
            )));
        }
        for (i, spec) in self.actions.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(RunnerError::invalid(format!("actions[{i}] has no name")));
            }
            validate_action(&spec.name, spec)?;
        }
        for (label, rule) in self.exit_rules() {
            if let Some(spec) = &rule.action {
                validate_action(&format!("exit.{label}.action"), spec)?;
            }
        }
        for (label, expr) in self.expressions() {
            if let Err(e) = condition::parse(&expr) {
                log::warn!("⚠️ {} '{}' will always be false: {}", label, expr, e);
            }
        }
        Ok(())
    }

    fn exit_rules(&self) -> impl Iterator<Item = (&'static str, &ExitRule)> {
        [
            ("on_success", self.exit.on_success.as_ref()),
            ("on_timeout", self.exit.on_timeout.as_ref()),
        ]
        .into_iter()
        .filter_map(|(label, rule)| rule.map(|r| (label, r)))
    }

    fn expressions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .actions
            .iter()
            .map(|a| (format!("when of '{}'", a.name), a.when.clone()))
            .collect();
        for (label, rule) in self.exit_rules() {
            out.push((format!("exit.{label}.condition"), rule.condition.clone()));
        }
        out
    }

    /// Variable store location: CLI override, then `variables_path`
    /// (relative to the config file), then `variables.yaml` beside it.
    pub fn resolve_variables_path(&self, config_path: &Path, cli_override: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_override {
            return path.to_path_buf();
        }
        let base = config_path.parent().unwrap_or_else(|| Path::new(""));
        match &self.variables_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base.join(path),
            None => base.join(VARIABLES_FILE),
        }
    }

    /// URL the browser session opens, `None` for desktop window targets
    pub fn browser_url(&self) -> Option<&str> {
        self.target.kind.is_browser().then_some(self.target.value.as_str())
    }
}

fn validate_action(label: &str, spec: &ActionSpec) -> RunnerResult<()> {
    Action::from_params(spec.kind, &spec.params)
        .map(|_| ())
        .map_err(|e| RunnerError::invalid(format!("action '{label}' ({}): {e}", spec.kind)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
id: login-watch
description: wait for the login button
target:
  type: url
  value: https://example.com
polling:
  interval_seconds: 0
  max_attempts: 3
actions:
  - name: find
    type: detect_image
    params:
      template_path: templates/login.png
      threshold: 0.9
  - name: tell
    type: notify
    when: target_found
    params:
      message: "score {{ last_match_score }}"
exit:
  on_success:
    condition: target_found
"#;

    #[test]
    fn test_parse_basic() {
        let config = AutomationConfig::from_yaml(BASIC).unwrap();
        assert_eq!(config.id.as_deref(), Some("login-watch"));
        assert_eq!(config.target.kind, TargetKind::Url);
        assert_eq!(config.target.capture_method, "screenshot");
        assert_eq!(config.polling.max_attempts, 3);
        assert_eq!(config.polling.interval_seconds, 0.0);
        assert_eq!(config.actions.len(), 2);
        assert_eq!(config.actions[0].when, "true");
        assert_eq!(config.actions[1].kind, ActionType::Notify);
        assert!(config.exit.on_timeout.is_none());
        assert_eq!(config.browser, ChromeDriverOptions::default());
        assert_eq!(config.browser_url(), Some("https://example.com"));
    }

    #[test]
    fn test_polling_defaults() {
        let config = AutomationConfig::from_yaml(
            "target: {type: window_title, value: Calculator}\nactions: []\n",
        )
        .unwrap();
        assert_eq!(config.polling, PollingSpec::default());
        assert_eq!(config.polling.interval_seconds, 10.0);
        assert!(config.target.kind.is_window());
        assert_eq!(config.browser_url(), None);
    }

    #[test]
    fn test_unknown_action_type_rejected() {
        let err = AutomationConfig::from_yaml(
            "target: {type: url, value: x}\nactions:\n  - {name: a, type: teleport}\n",
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_detect_without_template_rejected() {
        let err = AutomationConfig::from_yaml(
            "target: {type: url, value: x}\nactions:\n  - {name: a, type: detect_image}\n",
        )
        .unwrap_err();
        assert!(matches!(err, RunnerError::ConfigInvalid { .. }), "{err}");
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let err = AutomationConfig::from_yaml(
            "target: {type: url, value: x}\nactions: []\nretries: 3\n",
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_missing_target_rejected() {
        assert!(AutomationConfig::from_yaml("actions: []\n").is_err());
    }

    #[test]
    fn test_bad_scales_rejected() {
        let yaml = "target: {type: url, value: x}\nactions:\n  - name: a\n    type: detect_image\n    params: {template_path: t.png, scales: [0.5, -1]}\n";
        assert!(AutomationConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_negative_interval_rejected() {
        let yaml = "target: {type: url, value: x}\npolling: {interval_seconds: -1}\nactions: []\n";
        assert!(matches!(
            AutomationConfig::from_yaml(yaml),
            Err(RunnerError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_unrepresentable_interval_rejected() {
        for interval in ["1.0e20", ".inf", ".nan"] {
            let yaml = format!(
                "target: {{type: url, value: x}}\npolling: {{interval_seconds: {interval}}}\nactions: []\n"
            );
            assert!(
                matches!(AutomationConfig::from_yaml(&yaml), Err(RunnerError::ConfigInvalid { .. })),
                "interval {interval} should fail validation"
            );
        }
        let yaml = "target: {type: url, value: x}\npolling: {interval_seconds: 86400}\nactions: []\n";
        assert!(AutomationConfig::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_malformed_condition_only_warns() {
        let yaml = "target: {type: url, value: x}\nactions:\n  - {name: a, type: reload_vars, when: 'attempts >'}\n";
        assert!(AutomationConfig::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_variables_path_resolution() {
        let config = AutomationConfig::from_yaml(BASIC).unwrap();
        let cfg = Path::new("/etc/runner/watch.yaml");
        assert_eq!(
            config.resolve_variables_path(cfg, None),
            PathBuf::from("/etc/runner/variables.yaml")
        );
        assert_eq!(
            config.resolve_variables_path(cfg, Some(Path::new("/tmp/v.yaml"))),
            PathBuf::from("/tmp/v.yaml")
        );
        let custom = AutomationConfig {
            variables_path: Some(PathBuf::from("vars/dev.yaml")),
            ..config
        };
        assert_eq!(
            custom.resolve_variables_path(cfg, None),
            PathBuf::from("/etc/runner/vars/dev.yaml")
        );
    }
}
