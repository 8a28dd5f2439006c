// Finite state machine driving the detect-then-act poll loop
use super::actions::ActionExecutor;
use super::condition::evaluate;
use super::config::{ActionSpec, ActionType, AutomationConfig, DEFAULT_INTERVAL_SECONDS, ExitRule};
use super::types::{RoundContext, RunState};
use super::variables::{VariableStore, Variables};
use crate::browser::{BrowserLauncher, LazyBrowser};
use crate::desktop::Desktop;
use serde_yaml::Value as YamlValue;
use std::fmt::Write as _;
use tokio::time::{Duration, Instant, sleep};

pub struct AutomationRunner<D: Desktop, L: BrowserLauncher> {
    config: AutomationConfig,
    executor: ActionExecutor<D, L>,
    round: RoundContext,
    state: RunState,
    started: Option<Instant>,
    warned_stuck: bool,
}

impl<D: Desktop, L: BrowserLauncher> AutomationRunner<D, L> {
    pub fn new(config: AutomationConfig, executor: ActionExecutor<D, L>, variables: Variables) -> Self {
        let round = RoundContext::new(variables, config.polling.timeout_seconds);
        Self {
            config,
            executor,
            round,
            state: RunState::Running,
            started: None,
            warned_stuck: false,
        }
    }

    /// Wire a runner from a validated config: load the variable store, and
    /// prepare a lazy browser session when the target is a web page.
    pub async fn from_config(
        config: AutomationConfig,
        desktop: D,
        launcher: L,
        store: VariableStore,
        force_headless: bool,
    ) -> Self {
        let variables = store.load_or_empty().await;
        let headless = force_headless || config.headless;
        let browser = config
            .browser_url()
            .map(|url| LazyBrowser::new(launcher, url, headless));
        let executor = ActionExecutor::new(desktop, browser, config.target.clone(), store)
            .with_output_paths(config.screenshot.clone(), config.annotated.clone());
        Self::new(config, executor, variables)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn round(&self) -> &RoundContext {
        &self.round
    }

    pub fn executor(&self) -> &ActionExecutor<D, L> {
        &self.executor
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.executor.set_seed(seed);
    }

    /// Run rounds until an exit rule fires. Does not release the browser;
    /// call `shutdown` afterwards on every path.
    pub async fn run(&mut self) -> RunState {
        let interval = Duration::try_from_secs_f64(self.config.polling.interval_seconds)
            .unwrap_or_else(|e| {
                log::warn!("⚠️ Invalid polling interval ({}); using {}s", e, DEFAULT_INTERVAL_SECONDS);
                Duration::from_secs_f64(DEFAULT_INTERVAL_SECONDS)
            });
        log::info!(
            "🚀 Starting automation '{}' (interval {:?}, max_attempts {})",
            self.config.id.as_deref().unwrap_or("unnamed"),
            interval,
            self.config.polling.max_attempts
        );
        loop {
            let state = self.run_round().await;
            if state.is_terminal() {
                return state;
            }
            if !interval.is_zero() {
                sleep(interval).await;
            }
        }
    }

    /// One round: gated actions in order, then the exit rules.
    pub async fn run_round(&mut self) -> RunState {
        if self.state.is_terminal() {
            return self.state;
        }
        let started = *self.started.get_or_insert_with(Instant::now);
        self.round.attempts += 1;
        self.round.elapsed_seconds = started.elapsed().as_secs_f64();
        log::info!(
            "🔄 Round {} ({:.1}s elapsed)",
            self.round.attempts,
            self.round.elapsed_seconds
        );

        for spec in &self.config.actions {
            if !evaluate(&spec.when, &self.round.condition_context()) {
                log::debug!("Skipping '{}': when '{}' is false", spec.name, spec.when);
                continue;
            }
            self.executor.execute(spec, &mut self.round).await;
        }

        self.state = self.check_exit().await;
        self.state
    }

    async fn check_exit(&mut self) -> RunState {
        let context = self.round.condition_context();

        if let Some(rule) = &self.config.exit.on_success
            && evaluate(&rule.condition, &context)
        {
            log::info!("✅ Exit condition (success) met after {} round(s); stopping", self.round.attempts);
            run_exit_action(&mut self.executor, rule, "Finished", &mut self.round).await;
            return RunState::ExitedSuccess;
        }

        let polling = &self.config.polling;
        if polling.max_attempts == 0 || self.round.attempts < polling.max_attempts {
            return RunState::Running;
        }
        match &self.config.exit.on_timeout {
            None => {
                log::info!("⏱️ Reached max_attempts ({}); stopping", polling.max_attempts);
                RunState::ExitedTimeout
            }
            Some(rule) if evaluate(&rule.condition, &context) => {
                log::info!("⏱️ Exit condition (timeout) met; stopping");
                run_exit_action(&mut self.executor, rule, "Timeout", &mut self.round).await;
                RunState::ExitedTimeout
            }
            Some(_) if polling.strict_max_attempts => {
                log::info!(
                    "⏱️ Reached max_attempts ({}) with strict_max_attempts; stopping",
                    polling.max_attempts
                );
                RunState::ExitedTimeout
            }
            Some(rule) => {
                if !self.warned_stuck {
                    log::warn!(
                        "⚠️ Reached max_attempts ({}) but on_timeout condition '{}' is false; continuing",
                        polling.max_attempts,
                        rule.condition
                    );
                    self.warned_stuck = true;
                }
                RunState::Running
            }
        }
    }

    /// Release long-lived resources (the browser session).
    pub async fn shutdown(&mut self) {
        log::info!("🛑 Shutting down automation");
        self.executor.release().await;
    }
}

async fn run_exit_action<D: Desktop, L: BrowserLauncher>(
    executor: &mut ActionExecutor<D, L>,
    rule: &ExitRule,
    default_title: &str,
    round: &mut RoundContext,
) {
    let Some(spec) = &rule.action else {
        return;
    };
    let spec = with_default_title(spec, default_title);
    executor.execute(&spec, round).await;
}

/// Exit notifications default their title to the kind of exit
fn with_default_title(spec: &ActionSpec, title: &str) -> ActionSpec {
    let mut spec = spec.clone();
    if spec.name.is_empty() {
        spec.name = format!("exit {}", title.to_lowercase());
    }
    let key = YamlValue::from("title");
    if spec.kind == ActionType::Notify && !spec.params.contains_key(&key) {
        spec.params.insert(key, YamlValue::from(title));
    }
    spec
}

/// Human readable plan for `--dry-run`
pub fn describe_plan(config: &AutomationConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dry run: planned automation steps");
    if let Some(id) = &config.id {
        let _ = writeln!(out, "id: {id}");
    }
    if let Some(description) = &config.description {
        let _ = writeln!(out, "description: {description}");
    }
    let _ = writeln!(
        out,
        "target: {} = {}",
        serde_yaml::to_string(&config.target.kind).unwrap_or_default().trim(),
        config.target.value
    );
    let polling = &config.polling;
    let _ = writeln!(
        out,
        "polling: every {}s, max_attempts {}{}",
        polling.interval_seconds,
        if polling.max_attempts == 0 { "unbounded".to_string() } else { polling.max_attempts.to_string() },
        polling
            .timeout_seconds
            .map(|t| format!(", timeout_seconds {t}"))
            .unwrap_or_default()
    );
    for (i, action) in config.actions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} (type={}, when={})",
            i + 1,
            action.name,
            action.kind,
            action.when
        );
        for (key, value) in &action.params {
            let _ = writeln!(out, "     {}: {}", yaml_inline(key), yaml_inline(value));
        }
    }
    for (label, rule) in [
        ("on_success", &config.exit.on_success),
        ("on_timeout", &config.exit.on_timeout),
    ] {
        if let Some(rule) = rule {
            let action = rule
                .action
                .as_ref()
                .map(|a| format!(" -> {}", a.kind))
                .unwrap_or_default();
            let _ = writeln!(out, "exit.{label}: {}{action}", rule.condition);
        }
    }
    out
}

fn yaml_inline(value: &YamlValue) -> String {
    match value {
        YamlValue::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().replace('\n', " "))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_default_title() {
        let spec: ActionSpec = serde_yaml::from_str("type: notify\nparams: {message: done}\n").unwrap();
        let spec = with_default_title(&spec, "Finished");
        assert_eq!(spec.params["title"], YamlValue::from("Finished"));
        assert_eq!(spec.name, "exit finished");

        let titled: ActionSpec =
            serde_yaml::from_str("name: n\ntype: notify\nparams: {title: Custom}\n").unwrap();
        assert_eq!(with_default_title(&titled, "Timeout").params["title"], YamlValue::from("Custom"));
    }

    #[test]
    fn test_describe_plan() {
        let config = AutomationConfig::from_yaml(
            "id: demo\ntarget: {type: window_title, value: Calculator}\npolling: {max_attempts: 5}\nactions:\n  - {name: find, type: detect_image, params: {template_path: t.png, scales: [0.5, 1.0]}}\nexit:\n  on_success: {condition: target_found, action: {type: notify}}\n",
        )
        .unwrap();
        let plan = describe_plan(&config);
        assert!(plan.contains("id: demo"));
        assert!(plan.contains("target: window_title = Calculator"));
        assert!(plan.contains("max_attempts 5"));
        assert!(plan.contains("1. find (type=detect_image, when=true)"));
        assert!(plan.contains("template_path: t.png"));
        assert!(plan.contains("exit.on_success: target_found -> notify"));
    }
}
