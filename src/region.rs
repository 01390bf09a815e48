use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

/// Axis-aligned pixel box in left-top-right-bottom format.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl From<Region> for [i32; 4] {
    fn from(r: Region) -> Self {
        [r.xmin, r.ymin, r.xmax, r.ymax]
    }
}

impl From<[i32; 4]> for Region {
    #[inline]
    fn from(v: [i32; 4]) -> Self {
        Region::new(v[0], v[1], v[2], v[3])
    }
}

impl Region {
    #[inline]
    pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        debug_assert!(xmin < xmax && ymin < ymax, "degenerate region");

        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Box of `width`x`height` placed around a (sub-pixel) center.
    ///
    /// Truncates toward zero, so a center at `(x, y)` lands on
    /// `xmin = trunc(x - (width - 1) / 2)`.
    #[inline]
    pub fn around(center: na::Point2<f32>, width: i32, height: i32) -> Self {
        let xmin = (center.x - 0.5 * (width - 1) as f32) as i32;
        let ymin = (center.y - 0.5 * (height - 1) as f32) as i32;

        Self::new(xmin, ymin, xmin + width, ymin + height)
    }

    #[inline(always)]
    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    #[inline(always)]
    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }

    #[inline(always)]
    pub fn area(&self) -> i32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn diagonal(&self) -> f32 {
        let (w, h) = (self.width() as f32, self.height() as f32);

        (w * w + h * h).sqrt()
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(
            self.xmin as f32 + 0.5 * self.width() as f32,
            self.ymin as f32 + 0.5 * self.height() as f32,
        )
    }

    #[inline]
    pub fn union(&self, other: &Region) -> Region {
        Region {
            xmin: self.xmin.min(other.xmin),
            ymin: self.ymin.min(other.ymin),
            xmax: self.xmax.max(other.xmax),
            ymax: self.ymax.max(other.ymax),
        }
    }

    /// Smallest box covering every region, `None` for an empty input.
    pub fn union_all<'a, I: IntoIterator<Item = &'a Region>>(regions: I) -> Option<Region> {
        regions
            .into_iter()
            .fold(None, |acc: Option<Region>, r| match acc {
                Some(acc) => Some(acc.union(r)),
                None => Some(*r),
            })
    }

    /// Clamps into `[0, width] x [0, height]`.
    ///
    /// A box lying fully outside collapses onto the nearest one-pixel strip
    /// along the frame edge instead of becoming empty.
    pub fn clamp(&self, width: i32, height: i32) -> Region {
        let xmin = self.xmin.clamp(0, width - 1);
        let ymin = self.ymin.clamp(0, height - 1);
        let xmax = self.xmax.clamp(xmin + 1, width);
        let ymax = self.ymax.clamp(ymin + 1, height);

        Region::new(xmin, ymin, xmax, ymax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn around_truncates_toward_zero() {
        let r = Region::around(na::Point2::new(50.0, 40.0), 32, 20);

        assert_eq!(r, Region::new(34, 30, 66, 50));
        assert_eq!(r.width(), 32);
        assert_eq!(r.height(), 20);
    }

    #[test]
    fn clamp_keeps_regions_inside_frame() {
        let r = Region::new(-10, -5, 30, 500).clamp(480, 360);
        assert_eq!(r, Region::new(0, 0, 30, 360));

        let outside = Region::new(600, 400, 650, 420).clamp(480, 360);
        assert_eq!(outside, Region::new(479, 359, 480, 360));
    }

    #[test]
    fn union_all_covers_everything() {
        let regions = [Region::new(0, 10, 20, 30), Region::new(5, 2, 40, 25)];

        assert_eq!(Region::union_all(&regions), Some(Region::new(0, 2, 40, 30)));
        assert_eq!(Region::union_all(&[]), None);
    }

    #[test]
    fn diagonal_is_euclidean() {
        assert_eq!(Region::new(0, 0, 30, 40).diagonal(), 50.0);
    }
}
