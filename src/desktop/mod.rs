// Desktop module - OS level collaborators for the automation runner
// Screen capture, window geometry lookup, native clicks, notifications and
// shell commands, each behind the `Desktop` trait so tests can swap them out.

pub mod shell;
pub mod types;

pub use shell::SystemDesktop;
pub use types::{Desktop, WindowBounds, crop_to_window};
