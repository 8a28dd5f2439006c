// Frame acquisition for detection actions
use super::config::{TargetKind, TargetSpec};
use crate::browser::{BrowserDriver, BrowserLauncher, LazyBrowser};
use crate::desktop::{Desktop, crop_to_window};
use crate::error::{RunnerError, RunnerResult};
use crate::template_matching::Frame;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Browser,
    Window,
    FullScreen,
}

/// A frame plus where its (0,0) lies on screen
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub frame: Frame,
    pub origin: (i32, i32),
    pub source: FrameSource,
}

impl CapturedFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}

/// Capture a frame for the configured target.
///
/// Browser targets screenshot the viewport of the (lazily opened) session and
/// optionally persist the PNG. Window targets crop a full-screen capture to
/// the window; when the window cannot be found the full screen is used.
pub async fn capture_frame<D: Desktop, L: BrowserLauncher>(
    target: &TargetSpec,
    desktop: &D,
    browser: Option<&mut LazyBrowser<L>>,
    screenshot_path: Option<&Path>,
) -> RunnerResult<CapturedFrame> {
    match target.kind {
        TargetKind::Url | TargetKind::Selector => {
            let driver = match browser {
                Some(browser) => browser.get().await.ok_or(RunnerError::NoBrowser)?,
                None => return Err(RunnerError::NoBrowser),
            };
            let png = driver.screenshot_png().await?;
            if let Some(path) = screenshot_path {
                persist_screenshot(path, &png).await;
            }
            let frame = image::load_from_memory(&png)?.to_rgb8();
            log::debug!("📸 Browser viewport {}x{}", frame.width(), frame.height());
            Ok(CapturedFrame {
                frame,
                origin: (0, 0),
                source: FrameSource::Browser,
            })
        }
        TargetKind::WindowTitle | TargetKind::ProcessName => {
            let bounds = desktop.find_window(&target.value).await;
            let screen = desktop.capture_screen().await?;
            if let Some(bounds) = bounds {
                if let Some(frame) = crop_to_window(&screen, &bounds) {
                    log::debug!(
                        "📸 Window '{}' at ({},{}) {}x{}",
                        target.value,
                        bounds.left,
                        bounds.top,
                        frame.width(),
                        frame.height()
                    );
                    return Ok(CapturedFrame {
                        frame,
                        origin: (bounds.left.max(0), bounds.top.max(0)),
                        source: FrameSource::Window,
                    });
                }
                log::warn!(
                    "⚠️ Window '{}' lies outside the captured screen; using full screen",
                    target.value
                );
            } else {
                log::warn!(
                    "⚠️ Window with title containing '{}' not found; falling back to full-screen capture",
                    target.value
                );
            }
            Ok(CapturedFrame {
                frame: screen,
                origin: (0, 0),
                source: FrameSource::FullScreen,
            })
        }
    }
}

async fn persist_screenshot(path: &Path, png: &[u8]) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        log::warn!("⚠️ Cannot create {}: {}", parent.display(), e);
        return;
    }
    if let Err(e) = tokio::fs::write(path, png).await {
        log::warn!("⚠️ Failed to save screenshot {}: {}", path.display(), e);
    }
}
