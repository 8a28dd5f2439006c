use super::types::{BrowserDriver, BrowserLauncher};
use crate::error::{RunnerError, RunnerResult};
use base64::Engine;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};

/// W3C identifier key for element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// How the chromedriver service is started and how long to wait for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChromeDriverOptions {
    /// chromedriver binary (looked up in PATH when not absolute)
    pub driver_path: String,
    /// Local port the driver listens on
    pub port: u16,
    /// Seconds to wait for the driver to report ready
    pub startup_timeout_seconds: u64,
    /// Pause after navigation so the page can settle
    pub page_load_wait_ms: u64,
    /// Upper bound for any single WebDriver request
    pub command_timeout_seconds: u64,
    /// Extra Chrome command line switches
    pub extra_args: Vec<String>,
}

impl Default for ChromeDriverOptions {
    fn default() -> Self {
        Self {
            driver_path: "chromedriver".to_string(),
            port: 9515,
            startup_timeout_seconds: 20,
            page_load_wait_ms: 2000,
            command_timeout_seconds: 60,
            extra_args: Vec::new(),
        }
    }
}

/// Launches Chrome through a local chromedriver service
#[derive(Debug, Clone, Default)]
pub struct ChromeDriverLauncher {
    options: ChromeDriverOptions,
}

impl ChromeDriverLauncher {
    pub fn new(options: ChromeDriverOptions) -> Self {
        Self { options }
    }

    /// Chrome switches for a throwaway automation profile
    pub fn chrome_args(&self, headless: bool) -> Vec<String> {
        let mut args: Vec<String> = if headless {
            vec!["--headless=new".into(), "--window-size=1920,1080".into()]
        } else {
            vec!["--start-maximized".into()]
        };
        args.extend(
            [
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--no-first-run",
                "--no-default-browser-check",
                "--disable-extensions",
            ]
            .map(String::from),
        );
        args.extend(self.options.extra_args.iter().cloned());
        args
    }

    async fn wait_until_ready(&self, http: &reqwest::Client, base_url: &str) -> RunnerResult<()> {
        let timeout = Duration::from_secs(self.options.startup_timeout_seconds);
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(value) = send_command(http, Method::GET, &format!("{base_url}/status"), None).await
                && value.get("ready").and_then(Value::as_bool).unwrap_or(false)
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RunnerError::Timeout {
                    duration: timeout,
                    description: format!("chromedriver at {base_url} never reported ready"),
                });
            }
            sleep(Duration::from_millis(200)).await;
        }
    }
}

impl BrowserLauncher for ChromeDriverLauncher {
    type Driver = WebDriverSession;

    async fn launch(&self, url: &str, headless: bool) -> RunnerResult<WebDriverSession> {
        let port = self.options.port;
        let mut command = Command::new(&self.options.driver_path);
        command
            .arg(format!("--port={port}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        // Chrome inherits the group, so the whole tree can be killed at once
        #[cfg(unix)]
        command.process_group(0);
        let service = command.spawn().map_err(|source| RunnerError::SpawnFailed {
            command: self.options.driver_path.clone(),
            source,
        })?;

        let base_url = format!("http://127.0.0.1:{port}");
        let http = http_client(Duration::from_secs(self.options.command_timeout_seconds))?;
        self.wait_until_ready(&http, &base_url).await?;

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.chrome_args(headless) }
                }
            }
        });
        let created = send_command(
            &http,
            Method::POST,
            &format!("{base_url}/session"),
            Some(capabilities),
        )
        .await?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| RunnerError::WebDriver {
                error: "session not created".to_string(),
                message: format!("unexpected response: {created}"),
            })?
            .to_string();
        log::info!("🌐 Browser session {} started (headless={})", session_id, headless);

        let mut session = WebDriverSession {
            http,
            base_url,
            session_id: Some(session_id),
            service: Some(service),
        };
        if let Err(e) = session.navigate(url).await {
            let _ = session.quit().await;
            return Err(e);
        }
        sleep(Duration::from_millis(self.options.page_load_wait_ms)).await;
        Ok(session)
    }
}

/// A live W3C WebDriver session plus the driver service that owns it
pub struct WebDriverSession {
    http: reqwest::Client,
    base_url: String,
    session_id: Option<String>,
    service: Option<Child>,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> RunnerResult<Value> {
        let id = self.session_id.as_deref().ok_or(RunnerError::NoBrowser)?;
        let url = format!("{}/session/{}{}", self.base_url, id, path);
        send_command(&self.http, method, &url, body).await
    }

    pub async fn navigate(&mut self, url: &str) -> RunnerResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> RunnerResult<String> {
        let found = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        element_id(&found)
    }

    async fn active_element(&self) -> RunnerResult<String> {
        let found = self.command(Method::GET, "/element/active", None).await?;
        element_id(&found)
    }
}

impl BrowserDriver for WebDriverSession {
    async fn screenshot_png(&mut self) -> RunnerResult<Vec<u8>> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value.as_str().ok_or_else(|| RunnerError::WebDriver {
            error: "invalid screenshot".to_string(),
            message: "screenshot value is not a string".to_string(),
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| RunnerError::WebDriver {
                error: "invalid screenshot".to_string(),
                message: e.to_string(),
            })
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> RunnerResult<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn click_selector(&mut self, selector: &str) -> RunnerResult<()> {
        let element = self.find_element(selector).await?;
        self.command(Method::POST, &format!("/element/{element}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn send_keys(&mut self, selector: Option<&str>, keys: &str) -> RunnerResult<()> {
        let element = match selector {
            Some(selector) => self.find_element(selector).await?,
            None => self.active_element().await?,
        };
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": keys })),
        )
        .await?;
        Ok(())
    }

    async fn quit(&mut self) -> RunnerResult<()> {
        let mut result = Ok(());
        if let Some(id) = self.session_id.take() {
            let url = format!("{}/session/{}", self.base_url, id);
            result = send_command(&self.http, Method::DELETE, &url, None)
                .await
                .map(|_| ());
            match &result {
                Ok(()) => log::info!("🛑 Browser session {} closed", id),
                Err(e) => log::warn!("⚠️ Browser session {} did not close ({}); killing it", id, e),
            }
        }
        if let Some(mut service) = self.service.take() {
            if result.is_err()
                && let Some(pid) = service.id()
            {
                kill_process_group(pid);
            }
            if let Err(e) = service.kill().await {
                log::warn!("⚠️ Failed to stop chromedriver: {}", e);
            }
        }
        result
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.session_id.is_none() {
            return;
        }
        log::warn!("⚠️ Browser session dropped without quit; killing chromedriver and the browser");
        if let Some(pid) = self.service.as_ref().and_then(Child::id) {
            kill_process_group(pid);
        }
    }
}

/// Best-effort SIGKILL of the process group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let result = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("kill -s KILL -- -{pid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        log::warn!("⚠️ Could not kill process group {}: {}", pid, e);
    }
}

/// Without process groups only chromedriver itself goes, via kill_on_drop
#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// HTTP client whose requests give up after `limit`, so a hung driver cannot
/// stall the control loop (or shutdown).
fn http_client(limit: Duration) -> RunnerResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(limit)
        .connect_timeout(limit)
        .build()?)
}

async fn send_command(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> RunnerResult<Value> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(webdriver_error(&value, status.as_u16()));
    }
    Ok(value)
}

/// Convert a W3C error payload (`{"error": .., "message": ..}`) into a RunnerError
fn webdriver_error(value: &Value, status: u16) -> RunnerError {
    let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
    RunnerError::WebDriver {
        error: field("error").unwrap_or_else(|| format!("http status {status}")),
        message: field("message").unwrap_or_default(),
    }
}

fn element_id(value: &Value) -> RunnerResult<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RunnerError::WebDriver {
            error: "no such element".to_string(),
            message: format!("unexpected element reference: {value}"),
        })
}
