use serde_derive::{Deserialize, Serialize};

use crate::region::Region;

/// One detector box, in the column order the replay files use.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    #[serde(rename = "c")]
    pub label: String,
    pub xmin: f32,
    pub xmax: f32,
    pub ymin: f32,
    pub ymax: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: &str, xmin: f32, xmax: f32, ymin: f32, ymax: f32, confidence: f32) -> Self {
        Self {
            label: label.to_string(),
            xmin,
            xmax,
            ymin,
            ymax,
            confidence,
        }
    }

    /// Integer tracker seed for a frame of `frame_width`x`frame_height`.
    ///
    /// The far edges are pulled inside the frame; boxes that end up empty
    /// yield `None`.
    pub fn region(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let xmin = self.xmin as i32;
        let ymin = self.ymin as i32;
        let xmax = (self.xmax as i32).min(frame_width as i32 - 1);
        let ymax = (self.ymax as i32).min(frame_height as i32 - 1);

        if xmin < xmax && ymin < ymax {
            Some(Region::new(xmin, ymin, xmax, ymax))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_clamps_far_edges() {
        let det = Detection::new("car", 400.5, 490.0, 300.0, 370.0, 0.9);

        assert_eq!(det.region(480, 360), Some(Region::new(400, 300, 479, 359)));
    }

    #[test]
    fn region_rejects_boxes_outside_frame() {
        let det = Detection::new("car", 500.0, 520.0, 10.0, 20.0, 0.9);

        assert_eq!(det.region(480, 360), None);
    }
}
