use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "vision-runner", version)]
#[command(about = "🤖 Detect an image on screen or in a browser, then act on it")]
#[command(after_help = "EXAMPLES:\n    vision-runner --config automations/login.yaml --dry-run\n    vision-runner --config automations/login.yaml --headless\n    RUST_LOG=debug vision-runner --config watch.yaml")]
pub struct Args {
    /// Automation config (YAML)
    #[arg(long, env = "VISION_RUNNER_CONFIG")]
    pub config: PathBuf,

    /// Print the planned actions without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Force a headless browser
    #[arg(long)]
    pub headless: bool,

    /// Variable store to use instead of the configured one
    #[arg(long, value_name = "PATH")]
    pub vars: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG still wins when set)
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    pub fn log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
