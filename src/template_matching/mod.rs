//! Template matching module for locating saved templates in captured frames
//!
//! This module provides:
//! - Multi-scale matching over a configurable set of resize ratios
//! - Zero-mean normalized correlation scores in [-1, 1], correlated via FFT
//! - Template loading and annotated output for detections

mod fft;
pub mod matcher;
pub mod types;

pub use matcher::{TemplateMatcher, annotate, load_template, save_frame};
pub use types::{DEFAULT_THRESHOLD, Frame, MatchResult, ScaleSet};
