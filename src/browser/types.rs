// Browser capability traits
use crate::error::RunnerResult;
use serde_json::Value;

// Operations the runner needs from a live browser session
#[allow(async_fn_in_trait)]
pub trait BrowserDriver {
    /// PNG screenshot of the current viewport.
    async fn screenshot_png(&mut self) -> RunnerResult<Vec<u8>>;

    /// Run a synchronous script in the page; `args` are exposed as `arguments[i]`.
    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> RunnerResult<Value>;

    /// Click the first element matching a CSS selector.
    async fn click_selector(&mut self, selector: &str) -> RunnerResult<()>;

    /// Type `keys` into the element matching `selector`, or the focused element.
    async fn send_keys(&mut self, selector: Option<&str>, keys: &str) -> RunnerResult<()>;

    /// End the session and release the browser.
    async fn quit(&mut self) -> RunnerResult<()>;
}

// Factory for browser sessions, so the runner can create one lazily
#[allow(async_fn_in_trait)]
pub trait BrowserLauncher {
    type Driver: BrowserDriver;

    /// Start a browser, open `url` and return the ready session.
    async fn launch(&self, url: &str, headless: bool) -> RunnerResult<Self::Driver>;
}
