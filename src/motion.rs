use std::ops::Range;

use nalgebra as na;
use ndarray::ArrayView2;
use serde_derive::{Deserialize, Serialize};

use crate::correlation::CorrelationFilter;
use crate::region::Region;
use crate::template::TemplateTracker;

/// Per-frame center displacements, append-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Displacements {
    dx: Vec<f32>,
    dy: Vec<f32>,
}

impl Displacements {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, dx: f32, dy: f32) {
        self.dx.push(dx);
        self.dy.push(dy);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dx.is_empty()
    }

    #[inline]
    pub fn dx(&self) -> &[f32] {
        &self.dx
    }

    #[inline]
    pub fn dy(&self) -> &[f32] {
        &self.dy
    }

    /// Component-wise mean over `range`; `None` when the range is empty or
    /// runs past the recorded samples.
    pub fn mean(&self, range: Range<usize>) -> Option<(f32, f32)> {
        if range.start >= range.end || range.end > self.len() {
            return None;
        }

        let n = (range.end - range.start) as f32;
        let sx: f32 = self.dx[range.clone()].iter().sum();
        let sy: f32 = self.dy[range].iter().sum();

        Some((sx / n, sy / n))
    }

    /// Mean of the most recent `count` samples (fewer if not available).
    pub fn mean_last(&self, count: usize) -> Option<(f32, f32)> {
        let n = self.len();

        self.mean(n - count.min(n)..n)
    }

    /// Sums of the first `count` samples.
    pub fn sum_head(&self, count: usize) -> (f32, f32) {
        let n = count.min(self.len());

        (self.dx[..n].iter().sum(), self.dy[..n].iter().sum())
    }

    /// The sample pair with the largest magnitude.
    pub fn largest(&self) -> Option<(f32, f32)> {
        self.dx
            .iter()
            .zip(&self.dy)
            .map(|(&x, &y)| (x, y))
            .max_by(|a, b| {
                let ma = a.0 * a.0 + a.1 * a.1;
                let mb = b.0 * b.0 + b.1 * b.1;
                ma.total_cmp(&mb)
            })
    }
}

/// Relocates one object from frame to frame.
pub trait MotionTracker {
    /// Advances to `frame`; always records exactly one displacement sample.
    fn update(&mut self, frame: ArrayView2<'_, u8>, is_stopped: bool) -> (Region, na::Point2<f32>);

    fn region(&self) -> Region;

    fn center(&self) -> na::Point2<f32>;

    fn displacements(&self) -> &Displacements;

    /// Tracking confidence of the last update.
    fn goodness(&self) -> f32;

    fn is_good(&self) -> bool;

    /// Transform-sized area of the tracked window, in pixels.
    fn area(&self) -> f32;
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Correlation,
    Template,
}

impl Default for TrackerKind {
    fn default() -> Self {
        TrackerKind::Correlation
    }
}

#[derive(Debug, Clone)]
pub enum Motion {
    Correlation(CorrelationFilter),
    Template(TemplateTracker),
}

impl Motion {
    pub fn new(
        kind: TrackerKind,
        frame: ArrayView2<'_, u8>,
        region: Region,
        learning_rate: f32,
        goodness_threshold: f32,
    ) -> Self {
        match kind {
            TrackerKind::Correlation => Motion::Correlation(CorrelationFilter::new(
                frame,
                region,
                learning_rate,
                goodness_threshold,
            )),
            TrackerKind::Template => {
                Motion::Template(TemplateTracker::new(frame, region, learning_rate))
            }
        }
    }

    #[inline]
    pub fn kind(&self) -> TrackerKind {
        match self {
            Motion::Correlation(_) => TrackerKind::Correlation,
            Motion::Template(_) => TrackerKind::Template,
        }
    }
}

impl MotionTracker for Motion {
    #[inline(always)]
    fn update(&mut self, frame: ArrayView2<'_, u8>, is_stopped: bool) -> (Region, na::Point2<f32>) {
        match self {
            Motion::Correlation(t) => t.update(frame, is_stopped),
            Motion::Template(t) => t.update(frame, is_stopped),
        }
    }

    #[inline(always)]
    fn region(&self) -> Region {
        match self {
            Motion::Correlation(t) => t.region(),
            Motion::Template(t) => t.region(),
        }
    }

    #[inline(always)]
    fn center(&self) -> na::Point2<f32> {
        match self {
            Motion::Correlation(t) => t.center(),
            Motion::Template(t) => t.center(),
        }
    }

    #[inline(always)]
    fn displacements(&self) -> &Displacements {
        match self {
            Motion::Correlation(t) => t.displacements(),
            Motion::Template(t) => t.displacements(),
        }
    }

    #[inline(always)]
    fn goodness(&self) -> f32 {
        match self {
            Motion::Correlation(t) => t.goodness(),
            Motion::Template(t) => t.goodness(),
        }
    }

    #[inline(always)]
    fn is_good(&self) -> bool {
        match self {
            Motion::Correlation(t) => t.is_good(),
            Motion::Template(t) => t.is_good(),
        }
    }

    #[inline(always)]
    fn area(&self) -> f32 {
        match self {
            Motion::Correlation(t) => t.area(),
            Motion::Template(t) => t.area(),
        }
    }
}
