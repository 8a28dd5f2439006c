// Core desktop types and traits
use crate::error::RunnerResult;
use crate::template_matching::Frame;

/// Screen-space geometry of a top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowBounds {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

// Trait defining desktop capabilities (OS utilities or test fakes)
#[allow(async_fn_in_trait)]
pub trait Desktop {
    /// Capture the whole screen.
    async fn capture_screen(&self) -> RunnerResult<Frame>;

    /// Look up a window whose title contains `title`. `None` when no lookup
    /// utility is available or no window matches.
    async fn find_window(&self, title: &str) -> Option<WindowBounds>;

    /// Left click at absolute screen coordinates.
    async fn click(&self, x: i32, y: i32) -> RunnerResult<()>;

    /// Best-effort desktop notification. Never fails.
    async fn notify(&self, title: &str, message: &str);

    /// Run a command line through the platform shell and return its exit code.
    async fn run_shell(&self, command: &str) -> RunnerResult<i32>;
}

/// Crop `frame` to the part covered by `bounds`, clipped to the frame.
/// Returns `None` when the window lies entirely off-frame.
pub fn crop_to_window(frame: &Frame, bounds: &WindowBounds) -> Option<Frame> {
    let left = bounds.left.max(0) as u32;
    let top = bounds.top.max(0) as u32;
    if left >= frame.width() || top >= frame.height() {
        return None;
    }
    let right = (bounds.left as i64 + bounds.width as i64).min(frame.width() as i64);
    let bottom = (bounds.top as i64 + bounds.height as i64).min(frame.height() as i64);
    if right <= left as i64 || bottom <= top as i64 {
        return None;
    }
    let width = (right - left as i64) as u32;
    let height = (bottom - top as i64) as u32;
    Some(image::imageops::crop_imm(frame, left, top, width, height).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_crop_inside_frame() {
        let frame = Frame::from_fn(100, 80, |x, y| Rgb([x as u8, y as u8, 0]));
        let cropped = crop_to_window(&frame, &WindowBounds::new(10, 20, 30, 40)).unwrap();
        assert_eq!(cropped.dimensions(), (30, 40));
        assert_eq!(cropped.get_pixel(0, 0), &Rgb([10, 20, 0]));
    }

    #[test]
    fn test_crop_clips_to_frame() {
        let frame = Frame::new(100, 80);
        let cropped = crop_to_window(&frame, &WindowBounds::new(-10, 60, 50, 50)).unwrap();
        assert_eq!(cropped.dimensions(), (40, 20));
    }

    #[test]
    fn test_crop_off_frame() {
        let frame = Frame::new(100, 80);
        assert!(crop_to_window(&frame, &WindowBounds::new(200, 0, 50, 50)).is_none());
        assert!(crop_to_window(&frame, &WindowBounds::new(-100, 0, 50, 50)).is_none());
    }
}
