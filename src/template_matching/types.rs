//! Template matching data types

use image::RgbImage;

/// A captured 8-bit RGB frame (height x width x 3).
pub type Frame = RgbImage;

/// Default detection threshold for normalized correlation scores.
pub const DEFAULT_THRESHOLD: f64 = 0.78;

/// Ordered resize ratios applied to a template before correlating.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleSet {
    scales: Vec<f64>,
}

impl ScaleSet {
    /// Build a scale set from explicit ratios. Every ratio must be finite and positive.
    pub fn new(scales: Vec<f64>) -> Result<Self, String> {
        if scales.is_empty() {
            return Err("scale set must contain at least one scale".to_string());
        }
        if let Some(bad) = scales.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(format!("scale {bad} is not a positive number"));
        }
        Ok(Self { scales })
    }

    /// `count` evenly spaced ratios from `start` to `end` inclusive.
    pub fn linear(start: f64, end: f64, count: usize) -> Self {
        let scales = match count {
            0 => vec![start],
            1 => vec![start],
            _ => {
                let step = (end - start) / (count - 1) as f64;
                (0..count).map(|i| start + step * i as f64).collect()
            }
        };
        Self { scales }
    }

    /// Use the configured ratios when present, the default range otherwise.
    pub fn from_option(scales: Option<&[f64]>) -> Result<Self, String> {
        match scales {
            Some(s) => Self::new(s.to_vec()),
            None => Ok(Self::default()),
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.scales
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }
}

impl Default for ScaleSet {
    /// 21 ratios from 0.5 to 1.5
    fn default() -> Self {
        Self::linear(0.5, 1.5, 21)
    }
}

/// Best placement of a template inside a frame across all scales.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    /// Normalized correlation coefficient, -1.0 when no scale fit the frame
    pub score: f64,
    /// Top-left corner of the best placement
    pub top_left: Option<(u32, u32)>,
    /// Size of the resized template at the best placement
    pub matched_size: (u32, u32),
    /// Scale that produced the best placement
    pub scale: Option<f64>,
}

impl MatchResult {
    /// Result for a template that did not fit the frame at any scale.
    pub fn no_match(template_width: u32, template_height: u32) -> Self {
        Self {
            score: -1.0,
            top_left: None,
            matched_size: (template_width, template_height),
            scale: None,
        }
    }

    /// True when a placement exists and scores at or above `threshold`.
    pub fn is_found(&self, threshold: f64) -> bool {
        self.top_left.is_some() && self.score >= threshold
    }

    /// Center of the matched box in frame coordinates.
    pub fn center(&self) -> Option<(f64, f64)> {
        self.top_left.map(|(x, y)| {
            (
                x as f64 + self.matched_size.0 as f64 / 2.0,
                y as f64 + self.matched_size.1 as f64 / 2.0,
            )
        })
    }

    /// Format match as string with correlation percentage
    pub fn describe(&self, template_name: &str) -> String {
        match self.top_left {
            Some((x, y)) => format!(
                "{} at ({},{}) {}x{} - {:.1}%",
                template_name,
                x,
                y,
                self.matched_size.0,
                self.matched_size.1,
                self.score * 100.0
            ),
            None => format!("{template_name} did not fit the frame at any scale"),
        }
    }
}
