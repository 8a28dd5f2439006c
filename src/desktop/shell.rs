use super::types::{Desktop, WindowBounds};
use crate::error::{RunnerError, RunnerResult};
use crate::template_matching::Frame;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Screen grabbers tried in order; each writes a PNG to stdout.
const CAPTURE_COMMANDS: &[&[&str]] = &[&["import", "-window", "root", "png:-"], &["grim", "-"]];

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
const INPUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Desktop backed by common X11/Wayland command line utilities
/// (ImageMagick or grim, xdotool, wmctrl, notify-send).
#[derive(Debug, Clone, Default)]
pub struct SystemDesktop;

impl SystemDesktop {
    pub fn new() -> Self {
        Self
    }

    /// Run a utility and return its stdout. A utility still running after
    /// `limit` is killed and reported as a timeout.
    async fn run(program: &str, args: &[&str], limit: Duration) -> RunnerResult<Vec<u8>> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        let output = match timeout(limit, command.output()).await {
            Ok(result) => result.map_err(|source| RunnerError::SpawnFailed {
                command: program.to_string(),
                source,
            })?,
            Err(_) => {
                return Err(RunnerError::Timeout {
                    duration: limit,
                    description: format!("{} {}", program, args.join(" ")),
                });
            }
        };
        if !output.status.success() {
            return Err(RunnerError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                description: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output.stdout)
    }

    async fn find_window_xdotool(title: &str) -> RunnerResult<Option<WindowBounds>> {
        let ids = Self::run("xdotool", &["search", "--name", title], LOOKUP_TIMEOUT).await?;
        let ids = String::from_utf8_lossy(&ids);
        let Some(window_id) = ids.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok(None);
        };
        let geometry =
            Self::run("xdotool", &["getwindowgeometry", "--shell", window_id], LOOKUP_TIMEOUT).await?;
        Ok(parse_xdotool_geometry(&String::from_utf8_lossy(&geometry)))
    }

    async fn find_window_wmctrl(title: &str) -> RunnerResult<Option<WindowBounds>> {
        let listing = Self::run("wmctrl", &["-lG"], LOOKUP_TIMEOUT).await?;
        Ok(parse_wmctrl_listing(&String::from_utf8_lossy(&listing), title))
    }
}

impl Desktop for SystemDesktop {
    async fn capture_screen(&self) -> RunnerResult<Frame> {
        let mut failures = Vec::new();
        for command in CAPTURE_COMMANDS {
            let (program, args) = (command[0], &command[1..]);
            match Self::run(program, args, CAPTURE_TIMEOUT).await {
                Ok(png) => {
                    let frame = image::load_from_memory(&png)?.to_rgb8();
                    log::debug!(
                        "📸 Captured screen with {} ({}x{})",
                        program,
                        frame.width(),
                        frame.height()
                    );
                    return Ok(frame);
                }
                Err(e) => failures.push(e.to_string()),
            }
        }
        Err(RunnerError::capture(format!(
            "no screen grabber succeeded ({})",
            failures.join("; ")
        )))
    }

    async fn find_window(&self, title: &str) -> Option<WindowBounds> {
        match Self::find_window_xdotool(title).await {
            Ok(Some(bounds)) => return Some(bounds),
            Ok(None) => log::debug!("xdotool found no window named '{}'", title),
            Err(e) => log::debug!("xdotool window lookup unavailable: {}", e),
        }
        match Self::find_window_wmctrl(title).await {
            Ok(found) => found,
            Err(e) => {
                log::debug!("wmctrl window lookup unavailable: {}", e);
                None
            }
        }
    }

    async fn click(&self, x: i32, y: i32) -> RunnerResult<()> {
        let (x, y) = (x.to_string(), y.to_string());
        Self::run(
            "xdotool",
            &["mousemove", x.as_str(), y.as_str(), "click", "1"],
            INPUT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn notify(&self, title: &str, message: &str) {
        let mut command = Command::new("notify-send");
        command.arg(title).arg(message).kill_on_drop(true);
        match timeout(INPUT_TIMEOUT, command.status()).await {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => log::warn!("⚠️ notify-send exited with {}", status),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                log::info!("notify-send not available; skipping desktop notification")
            }
            Ok(Err(e)) => log::warn!("⚠️ notify-send failed: {}", e),
            Err(_) => log::warn!("⚠️ notify-send timed out after {:?}", INPUT_TIMEOUT),
        }
    }

    async fn run_shell(&self, command: &str) -> RunnerResult<i32> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C");
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c");
            c
        };
        let status = cmd
            .arg(command)
            .status()
            .await
            .map_err(|source| RunnerError::SpawnFailed {
                command: command.to_string(),
                source,
            })?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Parse `xdotool getwindowgeometry --shell` output (X=, Y=, WIDTH=, HEIGHT= lines)
pub fn parse_xdotool_geometry(output: &str) -> Option<WindowBounds> {
    let (mut left, mut top, mut width, mut height) = (None, None, None, None);
    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "X" => left = value.parse::<i32>().ok(),
            "Y" => top = value.parse::<i32>().ok(),
            "WIDTH" => width = value.parse::<u32>().ok(),
            "HEIGHT" => height = value.parse::<u32>().ok(),
            _ => {}
        }
    }
    Some(WindowBounds::new(left?, top?, width?, height?))
}

/// Find the first `wmctrl -lG` line whose title contains `title` (case-insensitive)
///
/// Line format: `<id> <desktop> <x> <y> <width> <height> <host> <title...>`
pub fn parse_wmctrl_listing(output: &str, title: &str) -> Option<WindowBounds> {
    let needle = title.to_lowercase();
    output.lines().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            return None;
        }
        let window_title = parts[7..].join(" ");
        if !window_title.to_lowercase().contains(&needle) {
            return None;
        }
        match (
            parts[2].parse::<i32>(),
            parts[3].parse::<i32>(),
            parts[4].parse::<u32>(),
            parts[5].parse::<u32>(),
        ) {
            (Ok(x), Ok(y), Ok(w), Ok(h)) => Some(WindowBounds::new(x, y, w, h)),
            _ => None,
        }
    })
}
