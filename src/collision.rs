//! Pairwise collision heuristic over forecast trajectories.
//!
//! A pair is suspicious when, at one of a few fixed frame offsets, at least
//! one of the objects was moving fast, their forecast centers nearly meet,
//! and one of them strayed far from its own forecast. Suspicious pairs are
//! then either accepted on geometry alone or confirmed by the flow
//! classifier.

use nalgebra as na;
use ndarray::ArrayView2;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::CrashClassifier;
use crate::flow;
use crate::horizon::OutOfHorizon;
use crate::region::Region;
use crate::tracker::{Analysis, TrackedObject};

pub const DEFAULT_OFFSETS: [usize; 5] = [16, 19, 22, 25, 28];
pub const SPEED_WINDOW: usize = 10;
pub const DEFAULT_ANALYSIS_WINDOW: usize = 30;

const THRESHOLD_FACTOR: f32 = 0.25;
const DEVIATION_RATIO: f32 = 0.5;

const MIN_WIDTH: i32 = 50;
const MIN_HEIGHT: i32 = 28;
const MIN_ASPECT: f32 = 0.35;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrashMode {
    /// Every suspicious pair is confirmed by the flow classifier.
    Classifier,
    /// Suspicious pairs are reported from their bounding windows alone.
    EstimationOnly,
}

impl Default for CrashMode {
    fn default() -> Self {
        CrashMode::Classifier
    }
}

/// What the collision heuristic needs to know about one object.
pub trait Trajectory {
    fn id(&self) -> u32;

    fn diagonal(&self) -> f32;

    fn forecast_at(&self, offset: usize) -> Option<na::Point2<f32>>;

    fn center_at(&self, offset: usize) -> Option<na::Point2<f32>>;

    fn is_above_speed_threshold(&mut self, from: usize, to: usize) -> Result<bool, OutOfHorizon>;
}

impl Trajectory for TrackedObject {
    #[inline]
    fn id(&self) -> u32 {
        TrackedObject::id(self)
    }

    #[inline]
    fn diagonal(&self) -> f32 {
        TrackedObject::diagonal(self)
    }

    #[inline]
    fn forecast_at(&self, offset: usize) -> Option<na::Point2<f32>> {
        TrackedObject::forecast_at(self, offset)
    }

    #[inline]
    fn center_at(&self, offset: usize) -> Option<na::Point2<f32>> {
        TrackedObject::center_at(self, offset)
    }

    #[inline]
    fn is_above_speed_threshold(&mut self, from: usize, to: usize) -> Result<bool, OutOfHorizon> {
        TrackedObject::is_above_speed_threshold(self, from, to)
    }
}

/// Distance under which two forecast centers count as converging.
#[inline]
pub fn distance_threshold<A: Trajectory + ?Sized, B: Trajectory + ?Sized>(a: &A, b: &B) -> f32 {
    THRESHOLD_FACTOR * (a.diagonal() + b.diagonal())
}

fn fast<T: Trajectory + ?Sized>(o: &mut T, offset: usize) -> bool {
    o.is_above_speed_threshold(offset.saturating_sub(SPEED_WINDOW), offset)
        .unwrap_or_else(|err| {
            warn!(id = o.id(), %err, "speed check skipped");
            false
        })
}

/// Collision test of one pair at one frame offset.
pub fn pair_in_collision<A, B>(a: &mut A, b: &mut B, offset: usize, threshold: f32) -> bool
where
    A: Trajectory + ?Sized,
    B: Trajectory + ?Sized,
{
    if !fast(a, offset) && !fast(b, offset) {
        return false;
    }

    let (Some(fa), Some(fb)) = (a.forecast_at(offset), b.forecast_at(offset)) else {
        return false;
    };

    let r = na::distance(&fa, &fb);
    if r == 0.0 {
        return true;
    }
    if r > threshold {
        return false;
    }

    let (Some(ca), Some(cb)) = (a.center_at(offset), b.center_at(offset)) else {
        return false;
    };

    let deviation = na::distance(&ca, &fa).max(na::distance(&cb, &fb));
    debug!(a = a.id(), b = b.id(), offset, r, deviation, "forecasts converge");

    deviation / r > DEVIATION_RATIO
}

/// Rejects windows too small or too flat to be a vehicle.
#[inline]
pub fn plausible_vehicle(region: &Region) -> bool {
    let (w, h) = (region.width(), region.height());

    w >= MIN_WIDTH && h > MIN_HEIGHT && h as f32 / w as f32 >= MIN_ASPECT
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crash {
    /// Union of every contributing object window.
    pub region: Region,
    /// Objects the classifier confirmed; empty in estimation-only mode.
    pub confirmed: Vec<u32>,
}

pub struct CrashDetector {
    mode: CrashMode,
    offsets: Vec<usize>,
    analysis_window: usize,
    classifier: Option<Box<dyn CrashClassifier + Send>>,
    warned_missing_model: bool,
}

impl CrashDetector {
    pub fn new(mode: CrashMode) -> Self {
        Self {
            mode,
            offsets: DEFAULT_OFFSETS.to_vec(),
            analysis_window: DEFAULT_ANALYSIS_WINDOW,
            classifier: None,
            warned_missing_model: false,
        }
    }

    pub fn with_offsets(mut self, offsets: Vec<usize>) -> Self {
        self.offsets = offsets;
        self
    }

    pub fn with_analysis_window(mut self, window: usize) -> Self {
        self.analysis_window = window;
        self
    }

    pub fn with_classifier<C: CrashClassifier + Send + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    #[inline]
    pub fn mode(&self) -> CrashMode {
        self.mode
    }

    /// Checks every unordered pair; `None` when no pair contributed a
    /// region this cycle.
    pub fn detect_crash(
        &mut self,
        frames: &[ArrayView2<'_, u8>],
        objects: &mut [&mut TrackedObject],
    ) -> Option<Crash> {
        let mut regions = Vec::new();
        let mut confirmed = Vec::new();

        for i in 0..objects.len() {
            let (head, tail) = objects.split_at_mut(i + 1);
            let a = &mut *head[i];

            for b in tail.iter_mut() {
                let b = &mut **b;
                let threshold = distance_threshold(&*a, &*b);

                let hit = self
                    .offsets
                    .iter()
                    .find(|&&offset| pair_in_collision(a, b, offset, threshold));

                let Some(&offset) = hit else {
                    continue;
                };

                info!(a = a.id(), b = b.id(), offset, "possible collision");

                match self.mode {
                    CrashMode::EstimationOnly => {
                        for o in [&*a, &*b] {
                            if let Some(region) = self.estimate(o) {
                                regions.push(region);
                            }
                        }
                    }
                    CrashMode::Classifier => {
                        for o in [&*b, &*a] {
                            if let Some(region) = self.classify(frames, o) {
                                regions.push(region);
                                confirmed.push(o.id());
                            }
                        }
                    }
                }
            }
        }

        let region = Region::union_all(&regions)?;
        confirmed.sort_unstable();
        confirmed.dedup();

        Some(Crash { region, confirmed })
    }

    fn estimate(&self, o: &TrackedObject) -> Option<Region> {
        if o.history().len() < self.analysis_window {
            return None;
        }

        let region = o.bounding_history_window(Some(self.analysis_window));
        plausible_vehicle(&region).then_some(region)
    }

    fn classify(&mut self, frames: &[ArrayView2<'_, u8>], o: &TrackedObject) -> Option<Region> {
        let clip = match o.frames_for_analysis(frames, self.analysis_window) {
            Analysis::Ready(clip) => clip,
            Analysis::InsufficientHistory => {
                debug!(id = o.id(), "not enough history to classify");
                return None;
            }
        };

        if !plausible_vehicle(&clip.region) {
            debug!(id = o.id(), region = ?clip.region, "window fails vehicle gates");
            return None;
        }

        let Some(classifier) = self.classifier.as_ref() else {
            if !self.warned_missing_model {
                warn!("no crash classifier loaded, suspicious pairs are ignored");
                self.warned_missing_model = true;
            }
            return None;
        };

        let views: Vec<_> = clip.frames.iter().map(|f| f.view()).collect();
        let features = flow::flow_features(&views);
        let crash = classifier.is_crash(&features);

        debug!(id = o.id(), crash, "classifier verdict");
        crash.then_some(clip.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Fake {
        id: u32,
        diagonal: f32,
        fast: bool,
        forecasts: HashMap<usize, na::Point2<f32>>,
        centers: HashMap<usize, na::Point2<f32>>,
        speed_checks: usize,
    }

    impl Trajectory for Fake {
        fn id(&self) -> u32 {
            self.id
        }

        fn diagonal(&self) -> f32 {
            self.diagonal
        }

        fn forecast_at(&self, offset: usize) -> Option<na::Point2<f32>> {
            self.forecasts.get(&offset).copied()
        }

        fn center_at(&self, offset: usize) -> Option<na::Point2<f32>> {
            self.centers.get(&offset).copied()
        }

        fn is_above_speed_threshold(&mut self, _: usize, _: usize) -> Result<bool, OutOfHorizon> {
            self.speed_checks += 1;
            Ok(self.fast)
        }
    }

    fn pair(a_forecast: (f32, f32), a_actual: (f32, f32), b_forecast: (f32, f32)) -> (Fake, Fake) {
        let p = |v: (f32, f32)| na::Point2::new(v.0, v.1);

        let a = Fake {
            id: 0,
            diagonal: 40.0,
            fast: true,
            forecasts: [(22, p(a_forecast))].into_iter().collect(),
            centers: [(22, p(a_actual))].into_iter().collect(),
            ..Fake::default()
        };
        let b = Fake {
            id: 1,
            diagonal: 60.0,
            forecasts: [(22, p(b_forecast))].into_iter().collect(),
            centers: [(22, p(b_forecast))].into_iter().collect(),
            ..Fake::default()
        };

        (a, b)
    }

    #[test]
    fn threshold_is_a_quarter_of_both_diagonals() {
        let (a, b) = pair((0.0, 0.0), (0.0, 0.0), (0.0, 0.0));

        assert_eq!(distance_threshold(&a, &b), 25.0);
    }

    #[test]
    fn coincident_forecasts_collide() {
        let (mut a, mut b) = pair((100.0, 100.0), (100.0, 100.0), (100.0, 100.0));

        assert!(pair_in_collision(&mut a, &mut b, 22, 25.0));
    }

    #[test]
    fn deviating_object_near_another_collides() {
        let (mut a, mut b) = pair((100.0, 100.0), (106.0, 100.0), (110.0, 100.0));
        assert!(pair_in_collision(&mut a, &mut b, 22, 25.0));

        let (mut a, mut b) = pair((100.0, 100.0), (104.0, 100.0), (110.0, 100.0));
        assert!(!pair_in_collision(&mut a, &mut b, 22, 25.0));
    }

    #[test]
    fn distant_forecasts_never_collide() {
        let (mut a, mut b) = pair((100.0, 100.0), (190.0, 100.0), (126.0, 100.0));

        assert!(!pair_in_collision(&mut a, &mut b, 22, 25.0));
    }

    #[test]
    fn slow_pairs_are_skipped() {
        let (mut a, mut b) = pair((100.0, 100.0), (100.0, 100.0), (100.0, 100.0));
        a.fast = false;

        assert!(!pair_in_collision(&mut a, &mut b, 22, 25.0));
        assert_eq!(a.speed_checks, 1);
        assert_eq!(b.speed_checks, 1);
    }

    #[test]
    fn missing_forecast_is_no_collision() {
        let (mut a, mut b) = pair((100.0, 100.0), (100.0, 100.0), (100.0, 100.0));

        assert!(!pair_in_collision(&mut a, &mut b, 16, 25.0));
    }

    #[test]
    fn vehicle_gates() {
        assert!(plausible_vehicle(&Region::new(0, 0, 50, 29)));
        assert!(!plausible_vehicle(&Region::new(0, 0, 49, 40)));
        assert!(!plausible_vehicle(&Region::new(0, 0, 60, 28)));
        assert!(!plausible_vehicle(&Region::new(0, 0, 100, 34)));
        assert!(plausible_vehicle(&Region::new(0, 0, 100, 35)));
    }
}
