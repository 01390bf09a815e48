//! Geometric template tracker: exhaustive normalized cross-correlation
//! search in a square neighbourhood of the previous center.

use nalgebra as na;
use ndarray::prelude::*;
use tracing::trace;

use crate::fft;
use crate::frame::sub_pixel_patch;
use crate::math;
use crate::motion::{Displacements, MotionTracker};
use crate::region::Region;

const MIN_SCORE: f32 = 0.5;
const MIN_SEARCH_RADIUS: usize = 8;

#[derive(Debug, Clone)]
pub struct TemplateTracker {
    center: na::Point2<f32>,
    size: (usize, usize),
    frame_dims: (usize, usize),
    template: Array2<f32>,
    search_radius: usize,
    learning_rate: f32,
    score: f32,
    good: bool,
    updates: usize,
    displacements: Displacements,
}

impl TemplateTracker {
    pub fn new(frame: ArrayView2<'_, u8>, region: Region, learning_rate: f32) -> Self {
        let (rows, cols) = frame.dim();
        let w = fft::optimal_size(region.width().max(1) as usize);
        let h = fft::optimal_size(region.height().max(1) as usize);
        let center = region.center();
        let center = na::Point2::new(
            center.x.clamp(0.0, (cols - 1) as f32),
            center.y.clamp(0.0, (rows - 1) as f32),
        );

        Self {
            center,
            size: (w, h),
            frame_dims: (rows, cols),
            template: sub_pixel_patch(frame, center, w, h),
            search_radius: (w.min(h) / 4).max(MIN_SEARCH_RADIUS),
            learning_rate,
            score: 1.0,
            good: true,
            updates: 0,
            displacements: Displacements::new(),
        }
    }

    /// Best `(offset_x, offset_y, score)` of the template inside `area`,
    /// which spans `search_radius` extra pixels on every side.
    fn search(&self, area: ArrayView2<'_, f32>) -> (isize, isize, f32) {
        let (w, h) = self.size;
        let r = self.search_radius;
        let (t_mean, t_std) = math::mean_std(self.template.view());
        let t = &self.template - t_mean;

        let mut best = (0isize, 0isize, f32::MIN);
        for oy in 0..=2 * r {
            for ox in 0..=2 * r {
                let window = area.slice(s![oy..oy + h, ox..ox + w]);
                let (w_mean, w_std) = math::mean_std(window);
                let denom = t_std * w_std * (w * h) as f32;

                let score = if denom <= f32::EPSILON {
                    0.0
                } else {
                    ndarray::Zip::from(&t)
                        .and(window)
                        .fold(0.0, |acc, &a, &b| acc + a * (b - w_mean))
                        / denom
                };

                // ties prefer the smaller displacement
                let (dx, dy) = (ox as isize - r as isize, oy as isize - r as isize);
                let closer = dx.abs() + dy.abs() < best.0.abs() + best.1.abs();
                if score > best.2 || (score == best.2 && closer) {
                    best = (dx, dy, score);
                }
            }
        }

        best
    }
}

impl MotionTracker for TemplateTracker {
    fn update(&mut self, frame: ArrayView2<'_, u8>, is_stopped: bool) -> (Region, na::Point2<f32>) {
        let (w, h) = self.size;
        let r = self.search_radius;
        let area = sub_pixel_patch(frame, self.center, w + 2 * r, h + 2 * r);
        let (ox, oy, score) = self.search(area.view());

        self.score = score;
        self.good = score >= MIN_SCORE;

        let prev = self.center;
        if self.good {
            let (rows, cols) = self.frame_dims;
            self.center = na::Point2::new(
                (prev.x + ox as f32).clamp(0.0, (cols - 1) as f32),
                (prev.y + oy as f32).clamp(0.0, (rows - 1) as f32),
            );
        } else {
            trace!(score, "template match too weak, holding position");
        }

        if self.updates == 0 {
            self.displacements.push(0.0, 0.0);
        } else {
            self.displacements
                .push(self.center.x - prev.x, self.center.y - prev.y);
        }
        self.updates += 1;

        if self.good && !is_stopped {
            let patch = sub_pixel_patch(frame, self.center, w, h);
            let rate = self.learning_rate;
            self.template = &self.template * (1.0 - rate) + &(patch * rate);
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
        self.score
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
