use super::types::{BrowserDriver, BrowserLauncher};

/// Browser session that is only started on first use and reused afterwards.
///
/// A failed launch is logged and retried the next time a caller asks for it.
pub struct LazyBrowser<L: BrowserLauncher> {
    launcher: L,
    url: String,
    headless: bool,
    driver: Option<L::Driver>,
    launches: u32,
}

impl<L: BrowserLauncher> LazyBrowser<L> {
    pub fn new(launcher: L, url: impl Into<String>, headless: bool) -> Self {
        Self {
            launcher,
            url: url.into(),
            headless,
            driver: None,
            launches: 0,
        }
    }

    /// The live session, launching it first if needed. `None` when launch failed.
    pub async fn get(&mut self) -> Option<&mut L::Driver> {
        if self.driver.is_none() {
            log::info!("🌐 Opening browser at {}", self.url);
            match self.launcher.launch(&self.url, self.headless).await {
                Ok(driver) => {
                    self.launches += 1;
                    self.driver = Some(driver);
                }
                Err(e) => {
                    log::error!("❌ Browser launch failed: {}", e);
                    return None;
                }
            }
        }
        self.driver.as_mut()
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    /// Number of successful launches so far.
    pub fn launches(&self) -> u32 {
        self.launches
    }

    /// Quit the session if open. Safe to call more than once.
    pub async fn release(&mut self) {
        if let Some(mut driver) = self.driver.take()
            && let Err(e) = driver.quit().await
        {
            log::warn!("⚠️ Browser did not quit cleanly: {}", e);
        }
    }
}
