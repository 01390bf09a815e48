use serde_derive::Serialize;

use crate::motion::TrackerKind;
use crate::region::Region;
use crate::tracker::TrackedObject;

/// Read-only summary of a tracked object.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u32,
    pub kind: TrackerKind,
    pub bbox: Region,
    pub center: (f32, f32),
    pub history_len: usize,
    pub goodness: f32,
    pub is_good: bool,

    // size-normalized, see `tracker::SPEED_COEFFICIENT`
    pub avg_speed: Option<f32>,
    pub current_speed: Option<f32>,
    pub max_speed: Option<f32>,

    // degrees, clockwise from rightward
    pub angle: Option<f32>,
}

impl From<&TrackedObject> for Track {
    fn from(o: &TrackedObject) -> Track {
        let c = o.center();

        Track {
            track_id: o.id(),
            kind: o.kind(),
            bbox: o.region(),
            center: (c.x, c.y),
            history_len: o.history().len(),
            goodness: o.goodness(),
            is_good: o.is_good(),
            avg_speed: o.average_speed(None),
            current_speed: o.current_speed(),
            max_speed: o.max_speed(),
            angle: o.angle(),
        }
    }
}
