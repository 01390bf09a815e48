pub mod camera;
pub mod classifier;
pub mod collision;
pub mod config;
pub mod correlation;
pub mod detection;
pub mod error;
pub mod export;
pub mod fft;
pub mod flow;
pub mod frame;
pub mod horizon;
pub mod math;
pub mod motion;
pub mod region;
pub mod replay;
pub mod scene;
pub mod source;
pub mod template;
pub mod tracker;
#[cfg(feature = "opencv")]
pub mod video;

mod circular_queue;
mod track;

pub use camera::{CameraNode, CrashEvent};
pub use config::Config;
pub use detection::Detection;
pub use frame::Frame;
pub use region::Region;
pub use track::Track;

use std::collections::HashMap;

use error::Error;
use export::ExportWorker;

pub type Result<T> = std::result::Result<T, Error>;

/// One independent [`CameraNode`] per camera id.
pub struct CrashWatch {
    cameras: HashMap<String, CameraNode>,
}

impl CrashWatch {
    pub fn new() -> Self {
        Self {
            cameras: HashMap::new(),
        }
    }

    /// Registers a camera under `config.camera.id`, replacing any node that
    /// already used that id.
    pub fn add_camera(&mut self, config: &Config, exporter: Option<ExportWorker>) -> Result<&mut CameraNode> {
        config.validate()?;

        let id = config.camera.id.clone();
        if self.cameras.contains_key(&id) {
            tracing::warn!(camera = %id, "replacing camera");
        }

        self.cameras.insert(id.clone(), CameraNode::new(config, exporter));
        self.camera_mut(&id).ok_or(Error::UnknownCamera(id))
    }

    /// Adds an already configured node.
    pub fn insert(&mut self, node: CameraNode) {
        self.cameras.insert(node.id().to_string(), node);
    }

    pub fn feed(&mut self, camera_id: &str, frame: Frame) -> Result<Option<CrashEvent>> {
        let node = self
            .cameras
            .get_mut(camera_id)
            .ok_or_else(|| Error::UnknownCamera(camera_id.to_string()))?;

        Ok(node.feed(frame))
    }

    #[inline]
    pub fn camera(&self, camera_id: &str) -> Option<&CameraNode> {
        self.cameras.get(camera_id)
    }

    #[inline]
    pub fn camera_mut(&mut self, camera_id: &str) -> Option<&mut CameraNode> {
        self.cameras.get_mut(camera_id)
    }

    #[inline]
    pub fn tracks(&self, camera_id: &str) -> Vec<Track> {
        self.cameras
            .get(camera_id)
            .map(CameraNode::tracks)
            .unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

impl Default for CrashWatch {
    fn default() -> Self {
        Self::new()
    }
}
