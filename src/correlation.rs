//! Adaptive correlation filter (MOSSE).
//!
//! The filter is kept in the frequency domain as the running pair
//! `num = G * conj(F)`, `den = F * conj(F)`; the kernel applied to a new
//! window is `num / (den + eps)`. Relocation picks the peak of the inverse
//! transform of `F_new * kernel`, and the peak-to-sidelobe ratio of that
//! response tells whether the object is still locked.

use nalgebra as na;
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::fft::{self, Complex, Spectrum};
use crate::frame::sub_pixel_patch;
use crate::math;
use crate::motion::{Displacements, MotionTracker};
use crate::region::Region;

const EPS: f32 = 1e-5;
const TARGET_SIGMA: f32 = 2.0;
const SIDELOBE_EXCLUSION: isize = 5;
const PERTURBATIONS: usize = 8;
const PERTURBATION_SEED: u64 = 0x6d6f_7373;

#[derive(Debug, Clone)]
pub struct CorrelationFilter {
    center: na::Point2<f32>,
    size: (usize, usize),
    frame_dims: (usize, usize),
    window: Array2<f32>,
    target: Spectrum,
    num: Spectrum,
    den: Spectrum,
    kernel: Spectrum,
    learning_rate: f32,
    goodness_threshold: f32,
    psr: f32,
    good: bool,
    displacements: Displacements,
}

impl CorrelationFilter {
    pub fn new(
        frame: ArrayView2<'_, u8>,
        region: Region,
        learning_rate: f32,
        goodness_threshold: f32,
    ) -> Self {
        let (rows, cols) = frame.dim();
        let w = fft::optimal_size(region.width().max(1) as usize);
        let h = fft::optimal_size(region.height().max(1) as usize);

        // re-center the enlarged window on the requested box
        let x1 = (region.xmin + region.xmax - w as i32).div_euclid(2);
        let y1 = (region.ymin + region.ymax - h as i32).div_euclid(2);
        let center = clamp_center(
            na::Point2::new(
                x1 as f32 + 0.5 * (w as f32 - 1.0),
                y1 as f32 + 0.5 * (h as f32 - 1.0),
            ),
            (rows, cols),
        );

        let window = math::hanning(w, h);
        let target = fft::fft2(math::gaussian_peak(w, h, TARGET_SIGMA).view());

        let mut filter = Self {
            center,
            size: (w, h),
            frame_dims: (rows, cols),
            window,
            num: Array2::zeros(target.dim()),
            den: Array2::zeros(target.dim()),
            kernel: Array2::zeros(target.dim()),
            target,
            learning_rate,
            goodness_threshold,
            psr: 0.0,
            good: true,
            displacements: Displacements::new(),
        };

        let patch = sub_pixel_patch(frame, center, w, h);
        let mut rng = StdRng::seed_from_u64(PERTURBATION_SEED);

        for i in 0..=PERTURBATIONS {
            let sample = if i == 0 {
                patch.clone()
            } else {
                random_warp(patch.view(), &mut rng)
            };

            let spectrum = fft::fft2(filter.preprocess(sample).view());
            let (num, den) = filter.spectra(&spectrum);
            filter.num += &num;
            filter.den += &den;
        }

        filter.refresh_kernel();
        filter
    }

    fn preprocess(&self, patch: Array2<f32>) -> Array2<f32> {
        let logged = patch.mapv(|v| (v + 1.0).ln());
        let (mean, std) = math::mean_std(logged.view());

        (logged - mean) / (std + EPS) * &self.window
    }

    fn spectra(&self, f: &Spectrum) -> (Spectrum, Spectrum) {
        let mut num = Array2::zeros(f.dim());
        let mut den = Array2::zeros(f.dim());

        ndarray::Zip::from(&mut num)
            .and(&mut den)
            .and(&self.target)
            .and(f)
            .for_each(|n, d, &g, &fv| {
                *n = g * fv.conj();
                *d = fv * fv.conj();
            });

        (num, den)
    }

    fn refresh_kernel(&mut self) {
        ndarray::Zip::from(&mut self.kernel)
            .and(&self.num)
            .and(&self.den)
            .for_each(|k, &n, &d| {
                *k = n / Complex::new(d.re + EPS, d.im);
            });
    }

    /// Correlates a preprocessed window against the kernel, returning the
    /// peak offset from the window center and the peak-to-sidelobe ratio.
    fn correlate(&self, img: ArrayView2<'_, f32>) -> ((f32, f32), f32) {
        let f = fft::fft2(img);
        let response = fft::ifft2_real(&(f * &self.kernel));
        let (h, w) = response.dim();

        let mut peak = (0usize, 0usize);
        let mut peak_val = f32::MIN;
        for ((r, c), &v) in response.indexed_iter() {
            if v > peak_val {
                peak_val = v;
                peak = (r, c);
            }
        }

        let (py, px) = (peak.0 as isize, peak.1 as isize);
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut count = 0.0;

        for ((r, c), &v) in response.indexed_iter() {
            let (r, c) = (r as isize, c as isize);
            // the excluded square is zeroed, not dropped
            let v = if (r - py).abs() <= SIDELOBE_EXCLUSION && (c - px).abs() <= SIDELOBE_EXCLUSION {
                0.0
            } else {
                v
            };

            sum += v;
            sum_sq += v * v;
            count += 1.0;
        }

        let mean = sum / count;
        let std = (sum_sq / count - mean * mean).max(0.0).sqrt();
        let psr = (peak_val - mean) / (std + EPS);

        (
            (px as f32 - (w / 2) as f32, py as f32 - (h / 2) as f32),
            psr,
        )
    }

    /// Peak-to-sidelobe ratio of the last response.
    #[inline]
    pub fn psr(&self) -> f32 {
        self.psr
    }

    #[inline]
    pub fn size(&self) -> (usize, usize) {
        self.size
    }
}

impl MotionTracker for CorrelationFilter {
    fn update(&mut self, frame: ArrayView2<'_, u8>, is_stopped: bool) -> (Region, na::Point2<f32>) {
        let (w, h) = self.size;
        let patch = self.preprocess(sub_pixel_patch(frame, self.center, w, h));
        let ((dx, dy), psr) = self.correlate(patch.view());

        self.psr = psr;
        self.good = psr > self.goodness_threshold;

        if !self.good {
            trace!(psr, "correlation lost lock, holding position");
            self.displacements.push(0.0, 0.0);
            return (self.region(), self.center);
        }

        let prev = self.center;
        self.center = clamp_center(
            na::Point2::new(prev.x + dx, prev.y + dy),
            self.frame_dims,
        );
        self.displacements
            .push(self.center.x - prev.x, self.center.y - prev.y);

        if !is_stopped {
            let patch = self.preprocess(sub_pixel_patch(frame, self.center, w, h));
            let (num, den) = self.spectra(&fft::fft2(patch.view()));
            let rate = self.learning_rate;

            self.num = &self.num * (1.0 - rate) + &(num * rate);
            self.den = &self.den * (1.0 - rate) + &(den * rate);
            self.refresh_kernel();
        }

        (self.region(), self.center)
    }

    #[inline]
    fn region(&self) -> Region {
        Region::around(self.center, self.size.0 as i32, self.size.1 as i32)
    }

    #[inline]
    fn center(&self) -> na::Point2<f32> {
        self.center
    }

    #[inline]
    fn displacements(&self) -> &Displacements {
        &self.displacements
    }

    #[inline]
    fn goodness(&self) -> f32 {
        self.psr
    }

    #[inline]
    fn is_good(&self) -> bool {
        self.good
    }

    #[inline]
    fn area(&self) -> f32 {
        (self.size.0 * self.size.1) as f32
    }
}

#[inline]
fn clamp_center(c: na::Point2<f32>, (rows, cols): (usize, usize)) -> na::Point2<f32> {
    na::Point2::new(
        c.x.clamp(0.0, (cols.max(1) - 1) as f32),
        c.y.clamp(0.0, (rows.max(1) - 1) as f32),
    )
}

/// Small random rotation plus shear around the patch center.
fn random_warp(patch: ArrayView2<'_, f32>, rng: &mut StdRng) -> Array2<f32> {
    let (h, w) = patch.dim();
    let coef = 0.2f32;
    let angle = (rng.gen::<f32>() - 0.5) * coef;
    let (c, s) = (angle.cos(), angle.sin());

    let m = [
        [c + (rng.gen::<f32>() - 0.5) * coef, -s + (rng.gen::<f32>() - 0.5) * coef],
        [s + (rng.gen::<f32>() - 0.5) * coef, c + (rng.gen::<f32>() - 0.5) * coef],
    ];

    let (cx, cy) = (w as f32 * 0.5, h as f32 * 0.5);
    let sample = |y: f32, x: f32| -> f32 {
        let yi = (y.round() as isize).clamp(0, h as isize - 1) as usize;
        let xi = (x.round() as isize).clamp(0, w as isize - 1) as usize;
        patch[[yi, xi]]
    };

    Array2::from_shape_fn((h, w), |(r, col)| {
        let (x, y) = (col as f32 - cx, r as f32 - cy);
        let sx = m[0][0] * x + m[0][1] * y + cx;
        let sy = m[1][0] * x + m[1][1] * y + cy;
        sample(sy, sx)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(width: usize, height: usize, blob: (usize, usize, usize, usize)) -> Array2<u8> {
        let (x0, y0, bw, bh) = blob;

        Array2::from_shape_fn((height, width), |(r, c)| {
            let inside = c >= x0 && c < x0 + bw && r >= y0 && r < y0 + bh;
            if inside {
                200 + (((r - y0) * 7 + (c - x0) * 13) % 40) as u8
            } else {
                20 + ((r + c) % 5) as u8
            }
        })
    }

    #[test]
    fn window_size_is_transform_friendly() {
        let frame = scene(160, 120, (50, 40, 30, 22));
        let filter = CorrelationFilter::new(frame.view(), Region::new(45, 35, 76, 62), 0.225, 5.0);

        assert_eq!(filter.size(), (32, 27));
        assert_eq!(filter.area(), 32.0 * 27.0);
        assert!(filter.displacements().is_empty());
    }

    #[test]
    fn follows_a_translating_blob() {
        let first = scene(160, 120, (50, 40, 30, 22));
        let mut filter =
            CorrelationFilter::new(first.view(), Region::new(45, 35, 85, 67), 0.225, 5.0);
        let start = filter.center();

        let moved = scene(160, 120, (53, 42, 30, 22));
        let (_, center) = filter.update(moved.view(), false);

        assert!(filter.is_good(), "psr {}", filter.psr());
        assert!((center.x - start.x - 3.0).abs() <= 1.0, "dx {}", center.x - start.x);
        assert!((center.y - start.y - 2.0).abs() <= 1.0, "dy {}", center.y - start.y);
        assert_eq!(filter.displacements().len(), 1);
    }

    #[test]
    fn lost_lock_holds_position_but_records_sample() {
        let first = scene(160, 120, (50, 40, 30, 22));
        let mut filter =
            CorrelationFilter::new(first.view(), Region::new(45, 35, 85, 67), 0.225, 1e9);
        let start = filter.center();

        let (_, center) = filter.update(first.view(), false);

        assert!(!filter.is_good());
        assert_eq!(center, start);
        assert_eq!(filter.displacements().dx(), &[0.0]);
    }

    #[test]
    fn boxes_outside_the_frame_are_clamped() {
        let frame = scene(100, 80, (10, 10, 20, 20));
        let mut filter =
            CorrelationFilter::new(frame.view(), Region::new(150, 120, 180, 140), 0.225, 5.0);

        assert!(filter.center().x <= 99.0 && filter.center().y <= 79.0);
        filter.update(frame.view(), true);
        assert_eq!(filter.displacements().len(), 1);
    }
}
