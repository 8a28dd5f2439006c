// Action dispatch: typed parameters per action type and one handler each
use super::capture::{CapturedFrame, FrameSource, capture_frame};
use super::click::{ClickBox, click_point};
use super::config::{ActionSpec, ActionType, TargetSpec};
use super::render::ParamRenderer;
use super::types::RoundContext;
use super::variables::VariableStore;
use crate::browser::{BrowserDriver, BrowserLauncher, LazyBrowser};
use crate::desktop::Desktop;
use crate::error::{RunnerError, RunnerResult};
use crate::template_matching::{
    DEFAULT_THRESHOLD, MatchResult, ScaleSet, TemplateMatcher, annotate, load_template, save_frame,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use serde_yaml::Mapping;
use std::path::PathBuf;
use tokio::time::{Duration, sleep};

const DEVICE_PIXEL_RATIO_SCRIPT: &str = "return window.devicePixelRatio || 1";
const CLICK_AT_POINT_SCRIPT: &str = "var el = document.elementFromPoint(arguments[0], arguments[1]); \
     if (el) { el.click(); return true; } return false;";

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectImageParams {
    pub template_path: PathBuf,
    #[serde(default)]
    pub scales: Option<Vec<f64>>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub save_detected_annotated: bool,
    #[serde(default)]
    pub annotated_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClickImageParams {
    #[serde(flatten)]
    pub detect: DetectImageParams,
    #[serde(default)]
    pub click_width: Option<f64>,
    #[serde(default)]
    pub click_height: Option<f64>,
    #[serde(default)]
    pub randomize: bool,
    #[serde(default)]
    pub native_click: bool,
}

impl ClickImageParams {
    pub fn click_box(&self) -> ClickBox {
        ClickBox {
            width: self.click_width,
            height: self.click_height,
            randomize: self.randomize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClickSelectorParams {
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeystrokeParams {
    pub keys: String,
    #[serde(default)]
    pub selector: Option<String>,
}

fn default_notify_title() -> String {
    "Automation".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotifyParams {
    #[serde(default = "default_notify_title")]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunCommandParams {
    #[serde(default)]
    pub command: String,
}

/// An action with its parameters parsed for its type
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    DetectImage(DetectImageParams),
    ClickImage(ClickImageParams),
    ClickSelector(ClickSelectorParams),
    Keystroke(KeystrokeParams),
    Notify(NotifyParams),
    RunCommand(RunCommandParams),
    ReloadVars,
}

fn parse_params<T: DeserializeOwned>(params: &Mapping) -> Result<T, String> {
    serde_yaml::from_value(serde_yaml::Value::Mapping(params.clone())).map_err(|e| e.to_string())
}

fn check_scales(detect: &DetectImageParams) -> Result<(), String> {
    ScaleSet::from_option(detect.scales.as_deref()).map(|_| ())
}

impl Action {
    pub fn from_params(kind: ActionType, params: &Mapping) -> Result<Self, String> {
        let action = match kind {
            ActionType::DetectImage => Action::DetectImage(parse_params(params)?),
            ActionType::ClickImage => Action::ClickImage(parse_params(params)?),
            ActionType::ClickSelector => Action::ClickSelector(parse_params(params)?),
            ActionType::Keystroke => Action::Keystroke(parse_params(params)?),
            ActionType::Notify => Action::Notify(parse_params(params)?),
            ActionType::RunCommand => Action::RunCommand(parse_params(params)?),
            ActionType::ReloadVars => Action::ReloadVars,
        };
        match &action {
            Action::DetectImage(p) => check_scales(p)?,
            Action::ClickImage(p) => check_scales(&p.detect)?,
            _ => {}
        }
        Ok(action)
    }
}

/// Script to run in the browser when `command` is a browser invocation:
/// `js:`/`javascript:` prefixes are stripped, `alert(...)` runs as written.
pub fn browser_script(command: &str) -> Option<&str> {
    let command = command.trim();
    if let Some(script) = command.strip_prefix("javascript:").or_else(|| command.strip_prefix("js:")) {
        return Some(script.trim());
    }
    command.starts_with("alert(").then_some(command)
}

/// Outcome of one detection
pub struct Detection {
    pub captured: CapturedFrame,
    pub result: MatchResult,
    pub found: bool,
}

/// Runs actions against the desktop and the (optional) browser session.
/// Failures are logged per action and never escape `execute`.
pub struct ActionExecutor<D: Desktop, L: BrowserLauncher> {
    desktop: D,
    browser: Option<LazyBrowser<L>>,
    target: TargetSpec,
    matcher: TemplateMatcher,
    renderer: ParamRenderer,
    store: VariableStore,
    screenshot_path: Option<PathBuf>,
    annotated_path: Option<PathBuf>,
    rng: StdRng,
}

impl<D: Desktop, L: BrowserLauncher> ActionExecutor<D, L> {
    pub fn new(
        desktop: D,
        browser: Option<LazyBrowser<L>>,
        target: TargetSpec,
        store: VariableStore,
    ) -> Self {
        Self {
            desktop,
            browser,
            target,
            matcher: TemplateMatcher::new(),
            renderer: ParamRenderer::new(),
            store,
            screenshot_path: None,
            annotated_path: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_output_paths(mut self, screenshot: Option<PathBuf>, annotated: Option<PathBuf>) -> Self {
        self.screenshot_path = screenshot;
        self.annotated_path = annotated;
        self
    }

    /// Make randomized click points reproducible
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn desktop(&self) -> &D {
        &self.desktop
    }

    pub fn browser(&self) -> Option<&LazyBrowser<L>> {
        self.browser.as_ref()
    }

    /// Render, parse and run one action. Never fails; problems are logged.
    pub async fn execute(&mut self, spec: &ActionSpec, round: &mut RoundContext) {
        let params = self.renderer.render_params(&spec.params, round);
        let action = match Action::from_params(spec.kind, &params) {
            Ok(action) => action,
            Err(e) => {
                log::error!("❌ Action '{}' has invalid parameters after rendering: {}", spec.name, e);
                return;
            }
        };
        log::info!("▶️ Executing action: {} (type={})", spec.name, spec.kind);
        if let Err(e) = self.run(action, round).await {
            log::error!("❌ Action '{}' ({}) failed: {}", spec.name, spec.kind, e);
        }
    }

    pub async fn run(&mut self, action: Action, round: &mut RoundContext) -> RunnerResult<()> {
        match action {
            Action::DetectImage(params) => {
                self.detect_and_record(&params, round).await?;
                Ok(())
            }
            Action::ClickImage(params) => self.click_image(&params, round).await,
            Action::ClickSelector(params) => {
                self.driver().await?.click_selector(&params.selector).await
            }
            Action::Keystroke(params) => {
                self.driver()
                    .await?
                    .send_keys(params.selector.as_deref(), &params.keys)
                    .await
            }
            Action::Notify(params) => {
                self.desktop.notify(&params.title, &params.message).await;
                Ok(())
            }
            Action::RunCommand(params) => self.run_command(&params.command).await,
            Action::ReloadVars => self.reload_vars(round).await,
        }
    }

    /// Detection that writes its outcome into the round. A capture or
    /// template failure counts as "not found".
    async fn detect_and_record(
        &mut self,
        params: &DetectImageParams,
        round: &mut RoundContext,
    ) -> RunnerResult<Detection> {
        match self.detect(params).await {
            Ok(detection) => {
                round.record_match(detection.result.score, detection.found);
                Ok(detection)
            }
            Err(e) => {
                round.record_match(0.0, false);
                Err(e)
            }
        }
    }

    async fn detect(&mut self, params: &DetectImageParams) -> RunnerResult<Detection> {
        let captured = capture_frame(
            &self.target,
            &self.desktop,
            self.browser.as_mut(),
            self.screenshot_path.as_deref(),
        )
        .await?;
        let template = load_template(&params.template_path)?;
        let scales = ScaleSet::from_option(params.scales.as_deref()).map_err(RunnerError::invalid)?;
        let result = self.matcher.match_template(&captured.frame, &template, &scales);
        let found = result.is_found(params.threshold);
        let name = params.template_path.display().to_string();
        if found {
            log::info!("🎯 Match found: {}", result.describe(&name));
        } else {
            log::info!(
                "👀 No match above {:.2}: {}",
                params.threshold,
                result.describe(&name)
            );
        }

        if params.save_detected_annotated && found {
            match params.annotated_path.as_ref().or(self.annotated_path.as_ref()) {
                Some(path) => match save_frame(&annotate(&captured.frame, &result), path) {
                    Ok(()) => log::info!("🖼️ Annotated detection saved to {}", path.display()),
                    Err(e) => log::warn!("⚠️ {}", e),
                },
                None => log::debug!("No annotated_path configured; skipping annotated output"),
            }
        }

        Ok(Detection {
            captured,
            result,
            found,
        })
    }

    async fn click_image(&mut self, params: &ClickImageParams, round: &mut RoundContext) -> RunnerResult<()> {
        let detection = self.detect_and_record(&params.detect, round).await?;
        // The threshold only drives target_found; any located match is clicked
        let Some((x, y)) = click_point(
            &detection.result,
            detection.captured.dimensions(),
            &params.click_box(),
            &mut self.rng,
        ) else {
            log::info!("👀 click_image found no placement for the template; no click");
            return Ok(());
        };
        if !detection.found {
            log::info!(
                "👀 Best match {:.3} is below threshold {:.2}; clicking it anyway",
                detection.result.score,
                params.detect.threshold
            );
        }

        let desktop_target = detection.captured.source != FrameSource::Browser;
        if params.native_click && desktop_target {
            let (left, top) = detection.captured.origin;
            let screen_x = (left as f64 + x) as i32;
            let screen_y = (top as f64 + y) as i32;
            log::info!("🖱️ Native click at ({}, {})", screen_x, screen_y);
            return self.desktop.click(screen_x, screen_y).await;
        }

        let driver = match self.browser.as_mut() {
            Some(browser) => browser.get().await,
            None => None,
        };
        let Some(driver) = driver else {
            log::warn!("⚠️ No browser driver available to perform click_image");
            return Ok(());
        };
        let ratio = match driver.execute_script(DEVICE_PIXEL_RATIO_SCRIPT, Vec::new()).await {
            Ok(value) => value.as_f64().filter(|r| *r > 0.0).unwrap_or(1.0),
            Err(e) => {
                log::debug!("devicePixelRatio unavailable ({}); assuming 1", e);
                1.0
            }
        };
        let client_x = (x / ratio) as i64;
        let client_y = (y / ratio) as i64;
        let clicked = driver
            .execute_script(CLICK_AT_POINT_SCRIPT, vec![json!(client_x), json!(client_y)])
            .await?;
        if clicked == Value::Bool(true) {
            log::info!("🖱️ Clicked element at ({}, {}) (dpr {})", client_x, client_y, ratio);
        } else {
            log::warn!("⚠️ No element at ({}, {}) to click", client_x, client_y);
        }
        Ok(())
    }

    async fn run_command(&mut self, command: &str) -> RunnerResult<()> {
        if command.trim().is_empty() {
            log::info!("run_command has no command; skipping");
            return Ok(());
        }
        if let Some(script) = browser_script(command) {
            self.driver().await?.execute_script(script, Vec::new()).await?;
            // let dialogs and handlers settle
            sleep(Duration::from_millis(500)).await;
            return Ok(());
        }
        let code = self.desktop.run_shell(command).await?;
        if code != 0 {
            log::warn!("⚠️ Command '{}' exited with code {}", command, code);
        }
        Ok(())
    }

    async fn reload_vars(&mut self, round: &mut RoundContext) -> RunnerResult<()> {
        match self.store.load().await? {
            Some(variables) => {
                log::info!("📒 Variables reloaded ({} entries)", variables.len());
                round.variables = variables;
            }
            None => log::warn!("⚠️ {} not found; keeping current variables", self.store.path().display()),
        }
        Ok(())
    }

    async fn driver(&mut self) -> RunnerResult<&mut L::Driver> {
        match self.browser.as_mut() {
            Some(browser) => browser.get().await.ok_or(RunnerError::NoBrowser),
            None => Err(RunnerError::NoBrowser),
        }
    }

    /// Close the browser session if one was opened.
    pub async fn release(&mut self) {
        if let Some(browser) = self.browser.as_mut() {
            browser.release().await;
        }
    }
}
