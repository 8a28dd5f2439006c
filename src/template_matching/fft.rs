//! Two-dimensional FFT over a row-major grid, built from 1D plans

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

pub type Spectrum = Vec<Complex<f64>>;

/// Forward and inverse plans for one grid size
pub struct Fft2d {
    width: usize,
    height: usize,
    rows: Arc<dyn Fft<f64>>,
    rows_inverse: Arc<dyn Fft<f64>>,
    columns: Arc<dyn Fft<f64>>,
    columns_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    pub fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            rows: planner.plan_fft_forward(width),
            rows_inverse: planner.plan_fft_inverse(width),
            columns: planner.plan_fft_forward(height),
            columns_inverse: planner.plan_fft_inverse(height),
        }
    }

    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Zero-padded real grid of the full size with `values` (row-major,
    /// `values_width` wide) in the top-left corner
    pub fn embed(&self, values: &[f64], values_width: usize) -> Spectrum {
        let mut grid = vec![Complex::default(); self.cells()];
        for (j, row) in values.chunks(values_width).enumerate() {
            let start = j * self.width;
            for (cell, v) in grid[start..start + row.len()].iter_mut().zip(row) {
                cell.re = *v;
            }
        }
        grid
    }

    pub fn forward(&self, data: &mut [Complex<f64>]) {
        self.transform(data, &self.rows, &self.columns);
    }

    /// Inverse transform, normalized so `inverse(forward(x)) == x`
    pub fn inverse(&self, data: &mut [Complex<f64>]) {
        self.transform(data, &self.rows_inverse, &self.columns_inverse);
        let scale = 1.0 / self.cells() as f64;
        data.iter_mut().for_each(|c| *c *= scale);
    }

    fn transform(&self, data: &mut [Complex<f64>], rows: &Arc<dyn Fft<f64>>, columns: &Arc<dyn Fft<f64>>) {
        rows.process(data);
        let mut transposed = vec![Complex::default(); data.len()];
        transpose(data, &mut transposed, self.width, self.height);
        columns.process(&mut transposed);
        transpose(&transposed, data, self.height, self.width);
    }
}

fn transpose(src: &[Complex<f64>], dst: &mut [Complex<f64>], width: usize, height: usize) {
    for y in 0..height {
        for x in 0..width {
            dst[x * height + y] = src[y * width + x];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let fft = Fft2d::new(5, 3);
        let values: Vec<f64> = (0..15).map(|v| v as f64).collect();
        let mut grid = fft.embed(&values, 5);
        fft.forward(&mut grid);
        fft.inverse(&mut grid);
        for (c, v) in grid.iter().zip(&values) {
            assert!((c.re - v).abs() < 1e-9 && c.im.abs() < 1e-9, "{c} != {v}");
        }
    }

    #[test]
    fn test_embed_pads_with_zeros() {
        let fft = Fft2d::new(4, 3);
        let grid = fft.embed(&[1.0, 2.0, 3.0, 4.0], 2);
        let re: Vec<f64> = grid.iter().map(|c| c.re).collect();
        assert_eq!(re, vec![1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
