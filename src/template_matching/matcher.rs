//! Template matching implementation
//!
//! Multi-scale normalized correlation (zero-mean, "coefficient" flavour) of an
//! RGB template over an RGB frame. The correlation numerator is computed in
//! the frequency domain and the window statistics come from summed-area
//! tables; both frame-side parts are built once and reused for every scale.
use super::fft::{Fft2d, Spectrum};
use super::types::{Frame, MatchResult, ScaleSet};
use crate::error::{RunnerError, RunnerResult};
use image::imageops::{self, FilterType};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;

const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ANNOTATION_THICKNESS: u32 = 3;
/// Centred energy below which a window (or template) counts as flat. With
/// 8-bit data any non-flat patch of n pixels has energy of at least 1 - 1/n.
const FLAT_ENERGY: f64 = 0.5;

/// Template matcher for finding a template in a frame across scales
pub struct TemplateMatcher {
    filter: FilterType,
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateMatcher {
    /// Create a matcher using triangle (area-like when shrinking) resampling
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Find the best placement of `template` inside `frame`
    ///
    /// # Arguments
    /// * `frame` - The image to search in
    /// * `template` - The image to search for
    /// * `scales` - Resize ratios applied to the template, evaluated in order
    ///
    /// # Returns
    /// The highest scoring placement over all scales. Ties keep the earliest
    /// evaluated scale. When the template is larger than the frame at every
    /// scale the result has `score = -1` and no location.
    pub fn match_template(&self, frame: &Frame, template: &Frame, scales: &ScaleSet) -> MatchResult {
        let mut best = MatchResult::no_match(template.width(), template.height());
        if frame.width() == 0 || frame.height() == 0 || template.width() == 0 || template.height() == 0 {
            return best;
        }

        let stats = FrameStats::new(frame);

        for &scale in scales.as_slice() {
            let resized = self.resize_template(template, scale);
            if resized.width() > frame.width() || resized.height() > frame.height() {
                log::debug!(
                    "⚠️ Skipping scale {:.2} - template {}x{} larger than frame {}x{}",
                    scale,
                    resized.width(),
                    resized.height(),
                    frame.width(),
                    frame.height()
                );
                continue;
            }

            let prepared = PreparedTemplate::new(&resized);
            let (score, location) = stats.correlate(&prepared);
            log::debug!(
                "  ⏳ scale {:.2} ({}x{}): best {:.4} at {:?}",
                scale,
                resized.width(),
                resized.height(),
                score,
                location
            );

            if score > best.score {
                best = MatchResult {
                    score,
                    top_left: Some(location),
                    matched_size: (resized.width(), resized.height()),
                    scale: Some(scale),
                };
            }
        }

        best
    }

    fn resize_template(&self, template: &Frame, scale: f64) -> Frame {
        let new_width = ((template.width() as f64 * scale) as u32).max(1);
        let new_height = ((template.height() as f64 * scale) as u32).max(1);
        if (new_width, new_height) == template.dimensions() {
            return template.clone();
        }
        imageops::resize(template, new_width, new_height, self.filter)
    }
}

/// Template pixels with the per-channel mean removed
struct PreparedTemplate {
    width: usize,
    height: usize,
    weights: [Vec<f64>; 3],
    norm: f64,
}

impl PreparedTemplate {
    fn new(template: &Frame) -> Self {
        let width = template.width() as usize;
        let height = template.height() as usize;
        let count = (width * height) as f64;

        let mut weights: [Vec<f64>; 3] = Default::default();
        for (c, plane) in weights.iter_mut().enumerate() {
            *plane = template.pixels().map(|p| p.0[c] as f64).collect();
            let mean = plane.iter().sum::<f64>() / count;
            plane.iter_mut().for_each(|v| *v -= mean);
        }
        let norm = weights.iter().flatten().map(|v| v * v).sum();

        Self {
            width,
            height,
            weights,
            norm,
        }
    }
}

/// Channel spectra plus summed-area tables of one frame
struct FrameStats {
    width: usize,
    height: usize,
    fft: Fft2d,
    spectra: [Spectrum; 3],
    sums: [Vec<f64>; 3],
    squares: Vec<f64>,
}

impl FrameStats {
    fn new(frame: &Frame) -> Self {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let stride = width + 1;
        let fft = Fft2d::new(width, height);

        let mut planes: [Vec<f64>; 3] = Default::default();
        for (c, plane) in planes.iter_mut().enumerate() {
            *plane = frame.pixels().map(|p| p.0[c] as f64).collect();
        }

        let mut sums: [Vec<f64>; 3] = Default::default();
        let mut spectra: [Spectrum; 3] = Default::default();
        for c in 0..3 {
            sums[c] = summed_area(&planes[c], width, height);
            spectra[c] = fft.embed(&planes[c], width);
            fft.forward(&mut spectra[c]);
        }

        let mut squares = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                let v: f64 = planes.iter().map(|p| p[i] * p[i]).sum();
                squares[(y + 1) * stride + x + 1] =
                    v + squares[y * stride + x + 1] + squares[(y + 1) * stride + x] - squares[y * stride + x];
            }
        }

        Self {
            width,
            height,
            fft,
            spectra,
            sums,
            squares,
        }
    }

    fn window_sum(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let stride = self.width + 1;
        table[(y + h) * stride + x + w] - table[y * stride + x + w] - table[(y + h) * stride + x]
            + table[y * stride + x]
    }

    /// Sum over channels of the frame cross-correlated with the template
    /// weights, indexed by top-left offset (row-major, frame width).
    ///
    /// The frame grid is at least as large as the template, so offsets where
    /// the template fits never wrap around.
    fn numerators(&self, template: &PreparedTemplate) -> Vec<f64> {
        let mut product: Spectrum = vec![Default::default(); self.fft.cells()];
        for (spectrum, weights) in self.spectra.iter().zip(template.weights.iter()) {
            let mut kernel = self.fft.embed(weights, template.width);
            self.fft.forward(&mut kernel);
            for ((acc, f), k) in product.iter_mut().zip(spectrum).zip(&kernel) {
                *acc += *f * k.conj();
            }
        }
        self.fft.inverse(&mut product);
        product.into_iter().map(|c| c.re).collect()
    }

    /// Global maximum of the correlation surface and its first (row-major) location
    fn correlate(&self, template: &PreparedTemplate) -> (f64, (u32, u32)) {
        let (tw, th) = (template.width, template.height);
        let count = (tw * th) as f64;
        let numerators = self.numerators(template);
        let flat_template = template.norm < FLAT_ENERGY;
        let mut best = f64::NEG_INFINITY;
        let mut best_loc = (0u32, 0u32);

        for y in 0..=(self.height - th) {
            for x in 0..=(self.width - tw) {
                let mut window_norm = self.window_sum(&self.squares, x, y, tw, th);
                for table in &self.sums {
                    let s = self.window_sum(table, x, y, tw, th);
                    window_norm -= s * s / count;
                }

                // Flat window or flat template: correlation undefined, treat as no evidence
                let score = if flat_template || window_norm < FLAT_ENERGY {
                    0.0
                } else {
                    (numerators[y * self.width + x] / (window_norm * template.norm).sqrt()).clamp(-1.0, 1.0)
                };

                if score > best {
                    best = score;
                    best_loc = (x as u32, y as u32);
                }
            }
        }

        (best, best_loc)
    }
}

fn summed_area(plane: &[f64], width: usize, height: usize) -> Vec<f64> {
    let stride = width + 1;
    let mut table = vec![0.0; stride * (height + 1)];
    for y in 0..height {
        for x in 0..width {
            table[(y + 1) * stride + x + 1] =
                plane[y * width + x] + table[y * stride + x + 1] + table[(y + 1) * stride + x]
                    - table[y * stride + x];
        }
    }
    table
}

/// Load a template image from disk as RGB
pub fn load_template(path: &Path) -> RunnerResult<Frame> {
    let image = image::open(path).map_err(|source| RunnerError::TemplateLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(RunnerError::EmptyTemplate {
            path: path.to_path_buf(),
        });
    }
    Ok(rgb)
}

/// Copy of `frame` with a red box drawn around the match, if any
pub fn annotate(frame: &Frame, result: &MatchResult) -> Frame {
    let mut annotated = frame.clone();
    let Some((x, y)) = result.top_left else {
        return annotated;
    };
    let (w, h) = result.matched_size;
    for inset in 0..ANNOTATION_THICKNESS {
        let width = w.saturating_sub(inset * 2);
        let height = h.saturating_sub(inset * 2);
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at((x + inset) as i32, (y + inset) as i32).of_size(width, height);
        draw_hollow_rect_mut(&mut annotated, rect, ANNOTATION_COLOR);
    }
    annotated
}

/// Write a frame to disk, creating the parent directory when needed
pub fn save_frame(frame: &Frame, path: &Path) -> RunnerResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    frame.save(path).map_err(|source| RunnerError::ImageSave {
        path: path.to_path_buf(),
        source,
    })
}
