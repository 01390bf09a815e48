use std::ops::Range;

use nalgebra as na;
use ndarray::ArrayView2;
use tracing::{debug, trace};

use crate::frame::{crop, GrayFrame};
use crate::horizon::{Horizon, OutOfHorizon};
use crate::motion::{Displacements, Motion, MotionTracker, TrackerKind};
use crate::region::Region;

/// Normalizes pixel speeds by the tracked area so near and far vehicles
/// share one scale.
pub const SPEED_COEFFICIENT: f32 = 43_200.0;

const ANGLE_SAMPLES: usize = 1000;
const CURRENT_SPEED_SAMPLES: usize = 3;
const FORECAST_MIN_SAMPLES: usize = 5;
const FORECAST_MAX_SAMPLES: usize = 20;
const FORECAST_LEAD: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectParams {
    pub kind: TrackerKind,
    pub learning_rate: f32,
    pub goodness_threshold: f32,
    pub interpolation: bool,
    pub stopped_speed: f32,
    pub speed_threshold: f32,
}

impl Default for ObjectParams {
    fn default() -> Self {
        Self {
            kind: TrackerKind::Correlation,
            learning_rate: 0.225,
            goodness_threshold: 5.0,
            interpolation: true,
            stopped_speed: 20.0,
            speed_threshold: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Forecast {
    /// Too few or too many samples for a meaningful extrapolation.
    Unavailable,
    Predicted {
        offset: usize,
        center: na::Point2<f32>,
        region: Region,
    },
}

impl Forecast {
    #[inline]
    pub fn region(&self) -> Option<Region> {
        match self {
            Forecast::Unavailable => None,
            Forecast::Predicted { region, .. } => Some(*region),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisClip {
    pub region: Region,
    pub frames: Vec<GrayFrame>,
}

impl AnalysisClip {
    #[inline]
    pub fn width(&self) -> i32 {
        self.region.width()
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.region.height()
    }
}

#[derive(Debug, Clone)]
pub enum Analysis {
    InsufficientHistory,
    Ready(AnalysisClip),
}

/// Heading in degrees over the first samples, clockwise from "rightward"
/// with image rows growing downward; `None` when there was no net motion.
pub fn heading(d: &Displacements) -> Option<f32> {
    let (dx, dy) = d.sum_head(ANGLE_SAMPLES);

    if dx == 0.0 {
        return if dy > 0.0 {
            Some(270.0)
        } else if dy < 0.0 {
            Some(90.0)
        } else {
            None
        };
    }

    let deg = (dy / dx).abs().atan().to_degrees();

    Some(if dx < 0.0 && dy >= 0.0 {
        180.0 + deg
    } else if dx < 0.0 {
        180.0 - deg
    } else if dy <= 0.0 {
        deg
    } else {
        360.0 - deg
    })
}

/// Linear extrapolation of `center` over the recent displacement average.
///
/// Returns the frame offset the prediction belongs to and the predicted
/// center, or `None` outside the `5..=20` sample validity window.
pub fn extrapolate(center: na::Point2<f32>, d: &Displacements) -> Option<(usize, na::Point2<f32>)> {
    let n = d.len();
    if !(FORECAST_MIN_SAMPLES..=FORECAST_MAX_SAMPLES).contains(&n) {
        return None;
    }

    let measure = n.min(FORECAST_LEAD);
    let (mx, my) = d.mean_last(measure)?;
    let lead = measure as f32;

    Some((
        n + FORECAST_LEAD,
        na::Point2::new(center.x + mx * lead, center.y + my * lead),
    ))
}

#[inline]
fn normalized(v: (f32, f32), area: f32) -> f32 {
    (v.0 * v.0 + v.1 * v.1).sqrt() * SPEED_COEFFICIENT / area
}

fn mean_speed(motion: &Motion, range: Option<Range<usize>>) -> Option<f32> {
    let d = motion.displacements();
    let mean = match range {
        Some(range) => d.mean(range)?,
        None => d.mean(0..d.len())?,
    };

    Some(normalized(mean, motion.area()))
}

/// One object followed across frames, with everything derived from its
/// motion: speeds, heading, and short-horizon forecasts.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    id: u32,
    motion: Motion,
    history: Vec<Region>,
    centers: Vec<na::Point2<f32>>,
    frame_dims: (u32, u32),
    vehicle: (i32, i32),
    speed_cache: Horizon<f32>,
    forecasts: Horizon<na::Point2<f32>>,
    interpolation: bool,
    stopped_speed: f32,
    speed_threshold: f32,
}

impl TrackedObject {
    pub fn new(
        frame: ArrayView2<'_, u8>,
        region: Region,
        frame_dims: (u32, u32),
        id: u32,
        params: &ObjectParams,
    ) -> Self {
        let motion = Motion::new(
            params.kind,
            frame,
            region,
            params.learning_rate,
            params.goodness_threshold,
        );
        let seed = motion.region();

        trace!(id, ?region, ?seed, "tracker created");

        Self {
            id,
            vehicle: (seed.width(), seed.height()),
            centers: vec![motion.center()],
            history: vec![seed],
            motion,
            frame_dims,
            speed_cache: Horizon::new(),
            forecasts: Horizon::new(),
            interpolation: params.interpolation,
            stopped_speed: params.stopped_speed,
            speed_threshold: params.speed_threshold,
        }
    }

    pub fn update(&mut self, frame: ArrayView2<'_, u8>) -> Region {
        let n = self.displacements().len();
        let is_stopped = self.interpolation
            && n >= CURRENT_SPEED_SAMPLES
            && self
                .average_speed(Some(n - CURRENT_SPEED_SAMPLES..n))
                .map_or(false, |s| s < self.stopped_speed);

        let (region, center) = self.motion.update(frame, is_stopped);
        self.history.push(region);
        self.centers.push(center);

        region
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> TrackerKind {
        self.motion.kind()
    }

    #[inline]
    pub fn history(&self) -> &[Region] {
        &self.history
    }

    #[inline]
    pub fn region(&self) -> Region {
        self.motion.region()
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        self.motion.center()
    }

    #[inline]
    pub fn displacements(&self) -> &Displacements {
        self.motion.displacements()
    }

    #[inline]
    pub fn goodness(&self) -> f32 {
        self.motion.goodness()
    }

    #[inline]
    pub fn is_good(&self) -> bool {
        self.motion.is_good()
    }

    #[inline]
    pub fn frame_dims(&self) -> (u32, u32) {
        self.frame_dims
    }

    /// Diagonal of the transform-sized box the object was seeded with.
    #[inline]
    pub fn diagonal(&self) -> f32 {
        let (w, h) = (self.vehicle.0 as f32, self.vehicle.1 as f32);

        (w * w + h * h).sqrt()
    }

    /// Recorded center after `offset` updates (`0` is the seed).
    #[inline]
    pub fn center_at(&self, offset: usize) -> Option<na::Point2<f32>> {
        self.centers.get(offset).copied()
    }

    #[inline]
    pub fn forecast_at(&self, offset: usize) -> Option<na::Point2<f32>> {
        self.forecasts.get(offset).copied()
    }

    /// Size-normalized mean speed over `range` of the displacement samples,
    /// or over all of them for `None`. Empty or overlong windows give `None`.
    #[inline]
    pub fn average_speed(&self, range: Option<Range<usize>>) -> Option<f32> {
        mean_speed(&self.motion, range)
    }

    pub fn current_speed(&self) -> Option<f32> {
        let mean = self.displacements().mean_last(CURRENT_SPEED_SAMPLES)?;

        Some(normalized(mean, self.motion.area()))
    }

    pub fn max_speed(&self) -> Option<f32> {
        let pair = self.displacements().largest()?;

        Some(normalized(pair, self.motion.area()))
    }

    #[inline]
    pub fn angle(&self) -> Option<f32> {
        heading(self.displacements())
    }

    /// Predicts where the object will be ten samples from now and files the
    /// prediction under that frame offset.
    pub fn forecast(&mut self) -> Forecast {
        let Some((offset, center)) = extrapolate(self.center(), self.displacements()) else {
            return Forecast::Unavailable;
        };

        if let Err(err) = self.forecasts.set(offset, center) {
            debug!(id = self.id, %err, "forecast not stored");
        }

        Forecast::Predicted {
            offset,
            center,
            region: Region::around(center, self.vehicle_size().0, self.vehicle_size().1),
        }
    }

    #[inline]
    fn vehicle_size(&self) -> (i32, i32) {
        let r = self.motion.region();

        (r.width(), r.height())
    }

    /// Whether the mean speed over `from..to` exceeds the threshold; the
    /// value is memoized under `to`.
    pub fn is_above_speed_threshold(&mut self, from: usize, to: usize) -> Result<bool, OutOfHorizon> {
        let motion = &self.motion;
        let speed = self
            .speed_cache
            .get_or_try_insert_with(to, || mean_speed(motion, Some(from..to)))?;

        Ok(speed.map_or(false, |s| s > self.speed_threshold))
    }

    /// Union of the last `count` history regions (all of them for `None`),
    /// clamped to the frame.
    pub fn bounding_history_window(&self, count: Option<usize>) -> Region {
        let n = self.history.len();
        let count = count.unwrap_or(n).clamp(1, n);
        let (fw, fh) = self.frame_dims;

        Region::union_all(&self.history[n - count..])
            .unwrap_or_else(|| self.region())
            .clamp(fw as i32, fh as i32)
    }

    /// Crops the last `window` frames to the object's recent bounding
    /// window.
    pub fn frames_for_analysis(&self, frames: &[ArrayView2<'_, u8>], window: usize) -> Analysis {
        if window == 0 || self.history.len() < window || frames.len() < window {
            return Analysis::InsufficientHistory;
        }

        let region = self.bounding_history_window(Some(window));
        let frames = frames[frames.len() - window..]
            .iter()
            .map(|f| crop(*f, &region))
            .collect();

        Analysis::Ready(AnalysisClip { region, frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn samples(pairs: &[(f32, f32)]) -> Displacements {
        let mut d = Displacements::new();
        for &(x, y) in pairs {
            d.push(x, y);
        }
        d
    }

    fn scene(x0: usize, y0: usize) -> Array2<u8> {
        Array2::from_shape_fn((120, 160), |(r, c)| {
            if c >= x0 && c < x0 + 30 && r >= y0 && r < y0 + 20 {
                170 + (((r - y0) * 3 + (c - x0) * 7) % 50) as u8
            } else {
                25
            }
        })
    }

    fn template_params() -> ObjectParams {
        ObjectParams {
            kind: TrackerKind::Template,
            ..ObjectParams::default()
        }
    }

    #[test]
    fn heading_special_cases() {
        assert_eq!(heading(&samples(&[(0.0, 5.0)])), Some(270.0));
        assert_eq!(heading(&samples(&[(0.0, -5.0)])), Some(90.0));
        assert_eq!(heading(&samples(&[(0.0, 0.0)])), None);
        assert_eq!(heading(&Displacements::new()), None);
    }

    #[test]
    fn heading_quadrants() {
        assert_abs_diff_eq!(heading(&samples(&[(1.0, -1.0)])).unwrap(), 45.0, epsilon = 1e-4);
        assert_abs_diff_eq!(heading(&samples(&[(-1.0, -1.0)])).unwrap(), 135.0, epsilon = 1e-4);
        assert_abs_diff_eq!(heading(&samples(&[(-1.0, 1.0)])).unwrap(), 225.0, epsilon = 1e-4);
        assert_abs_diff_eq!(heading(&samples(&[(1.0, 1.0)])).unwrap(), 315.0, epsilon = 1e-4);
        assert_abs_diff_eq!(heading(&samples(&[(3.0, 0.0)])).unwrap(), 0.0);
    }

    #[test]
    fn extrapolation_validity_window() {
        let center = na::Point2::new(10.0, 10.0);

        assert_eq!(extrapolate(center, &samples(&[(1.0, 0.0); 4])), None);
        assert_eq!(extrapolate(center, &samples(&[(1.0, 0.0); 21])), None);

        let (offset, p) = extrapolate(center, &samples(&[(1.0, 0.5); 6])).unwrap();
        assert_eq!(offset, 16);
        assert_abs_diff_eq!(p.x, 16.0);
        assert_abs_diff_eq!(p.y, 13.0);

        let (offset, p) = extrapolate(center, &samples(&[(2.0, 0.0); 20])).unwrap();
        assert_eq!(offset, 30);
        assert_abs_diff_eq!(p.x, 30.0);
    }

    #[test]
    fn extrapolation_converges_to_center_without_motion() {
        let center = na::Point2::new(42.0, 17.0);
        let (_, p) = extrapolate(center, &samples(&[(0.0, 0.0); 8])).unwrap();

        assert_eq!(p, center);
    }

    #[test]
    fn history_grows_by_one_per_update() {
        let dims = (160, 120);
        let mut obj = TrackedObject::new(
            scene(40, 40).view(),
            Region::new(40, 40, 70, 60),
            dims,
            7,
            &template_params(),
        );
        assert_eq!(obj.history().len(), 1);

        let mut returned = Vec::new();
        for k in 1..=6 {
            returned.push(obj.update(scene(40 + 2 * k, 40).view()));
        }

        assert_eq!(obj.history().len(), 7);
        assert_eq!(&obj.history()[1..], &returned[..]);
        assert_eq!(obj.displacements().len(), 6);
        assert_eq!(obj.center_at(6), Some(obj.center()));
        assert_eq!(obj.id(), 7);
    }

    #[test]
    fn speeds_scale_by_area() {
        let mut obj = TrackedObject::new(
            scene(40, 40).view(),
            Region::new(40, 40, 70, 60),
            (160, 120),
            1,
            &template_params(),
        );
        for k in 1..=5 {
            obj.update(scene(40 + 3 * k, 40).view());
        }

        // the first template update always records a zero sample
        let area = 30.0 * 20.0;
        assert_abs_diff_eq!(
            obj.average_speed(None).unwrap(),
            12.0 / 5.0 * SPEED_COEFFICIENT / area,
            epsilon = 1e-2
        );
        assert_abs_diff_eq!(
            obj.current_speed().unwrap(),
            3.0 * SPEED_COEFFICIENT / area,
            epsilon = 1e-2
        );
        assert_abs_diff_eq!(
            obj.max_speed().unwrap(),
            3.0 * SPEED_COEFFICIENT / area,
            epsilon = 1e-2
        );
        assert_eq!(obj.average_speed(Some(3..9)), None);
        assert_eq!(obj.angle(), Some(0.0));
    }

    fn moved_by(step: isize) -> TrackedObject {
        let mut obj = TrackedObject::new(
            scene(60, 40).view(),
            Region::new(60, 40, 90, 60),
            (160, 120),
            1,
            &template_params(),
        );
        for k in 1..=5 {
            obj.update(scene((60 + step * k) as usize, 40).view());
        }
        obj
    }

    #[test]
    fn average_speed_scales_linearly_with_displacement() {
        let base = moved_by(2).average_speed(None).unwrap();
        let doubled = moved_by(4).average_speed(None).unwrap();
        let reversed = moved_by(-4).average_speed(None).unwrap();

        assert!(base > 0.0);
        assert_abs_diff_eq!(doubled, 2.0 * base, epsilon = 1e-2);
        assert_abs_diff_eq!(reversed, doubled, epsilon = 1e-2);
    }

    #[test]
    fn speed_threshold_checks_are_memoized_and_bounded() {
        let mut obj = moved_by(4);

        // 4 px per sample over a 600 px box is 288 normalized units
        assert_eq!(obj.is_above_speed_threshold(1, 5), Ok(true));
        assert_eq!(obj.is_above_speed_threshold(4, 5), Ok(true));
        assert_eq!(obj.is_above_speed_threshold(3, 9), Ok(false));
        assert_eq!(obj.is_above_speed_threshold(20, 30), Err(OutOfHorizon(30)));
    }

    #[test]
    fn forecast_is_filed_under_its_offset() {
        let mut obj = TrackedObject::new(
            scene(40, 40).view(),
            Region::new(40, 40, 70, 60),
            (160, 120),
            1,
            &template_params(),
        );

        for k in 1..=4 {
            obj.update(scene(40 + 2 * k, 40).view());
            assert_eq!(obj.forecast(), Forecast::Unavailable);
        }

        obj.update(scene(50, 40).view());
        let forecast = obj.forecast();
        let region = forecast.region().unwrap();

        assert_eq!(region.width(), 30);
        assert_eq!(region.height(), 20);
        assert!(obj.forecast_at(15).is_some());
        assert_eq!(obj.forecast_at(16), None);
    }

    #[test]
    fn analysis_needs_a_full_window() {
        let frames: Vec<_> = (0..4).map(|k| scene(40 + k, 40)).collect();
        let views: Vec<_> = frames.iter().map(|f| f.view()).collect();
        let mut obj = TrackedObject::new(
            views[0],
            Region::new(40, 40, 70, 60),
            (160, 120),
            1,
            &template_params(),
        );

        assert!(matches!(
            obj.frames_for_analysis(&views, 4),
            Analysis::InsufficientHistory
        ));

        for v in &views[1..] {
            obj.update(*v);
        }

        match obj.frames_for_analysis(&views, 4) {
            Analysis::Ready(clip) => {
                assert_eq!(clip.frames.len(), 4);
                assert_eq!(clip.frames[0].dim(), (clip.height() as usize, clip.width() as usize));
                assert!(clip.width() >= 30);
            }
            Analysis::InsufficientHistory => panic!("expected a clip"),
        }
    }

    #[test]
    fn bounding_window_is_clamped() {
        let obj = TrackedObject::new(
            scene(0, 0).view(),
            Region::new(0, 0, 30, 20),
            (160, 120),
            1,
            &template_params(),
        );
        let window = obj.bounding_history_window(None);

        assert!(window.xmin >= 0 && window.ymin >= 0);
        assert!(window.xmax <= 160 && window.ymax <= 120);
    }
}
