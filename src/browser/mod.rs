// Browser module - WebDriver backed browser sessions
// The runner only talks to `BrowserDriver`; `ChromeDriverLauncher` is the real
// implementation and tests provide in-memory fakes.

pub mod session;
pub mod types;
pub mod webdriver;

pub use session::LazyBrowser;
pub use types::{BrowserDriver, BrowserLauncher};
pub use webdriver::{ChromeDriverLauncher, ChromeDriverOptions, WebDriverSession};
