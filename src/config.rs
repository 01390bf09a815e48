use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::collision::{CrashMode, DEFAULT_ANALYSIS_WINDOW, DEFAULT_OFFSETS, SPEED_WINDOW};
use crate::error::Error;
use crate::horizon::HORIZON;
use crate::motion::TrackerKind;
use crate::scene::DEFAULT_EXPORT_EVERY;
use crate::tracker::ObjectParams;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub camera: CameraCfg,
    pub tracking: TrackingCfg,
    pub crash: CrashCfg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraCfg {
    pub id: String,
    pub city: String,
    pub district: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub batch_len: usize,
    pub batch_overlap: usize,
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            id: "cam-0".to_string(),
            city: String::new(),
            district: String::new(),
            frame_width: 480,
            frame_height: 360,
            batch_len: 30,
            batch_overlap: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingCfg {
    pub kind: TrackerKind,
    pub learning_rate: f32,
    pub goodness_threshold: f32,
    pub interpolation: bool,
    pub stopped_speed: f32,
    pub export_every: usize,
    pub export_queue: usize,
}

impl Default for TrackingCfg {
    fn default() -> Self {
        Self {
            kind: TrackerKind::Correlation,
            learning_rate: 0.225,
            goodness_threshold: 5.0,
            interpolation: true,
            stopped_speed: 20.0,
            export_every: DEFAULT_EXPORT_EVERY,
            export_queue: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrashCfg {
    pub mode: CrashMode,
    pub model_path: Option<PathBuf>,
    pub lookback_offsets: Vec<usize>,
    pub speed_threshold: f32,
    pub analysis_window: usize,
}

impl Default for CrashCfg {
    fn default() -> Self {
        Self {
            mode: CrashMode::Classifier,
            model_path: None,
            lookback_offsets: DEFAULT_OFFSETS.to_vec(),
            speed_threshold: 50.0,
            analysis_window: DEFAULT_ANALYSIS_WINDOW,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        let cam = &self.camera;

        if cam.frame_width == 0 || cam.frame_height == 0 {
            return invalid(format!(
                "frame size {}x{} must be positive",
                cam.frame_width, cam.frame_height
            ));
        }

        if cam.batch_len == 0 || cam.batch_overlap >= cam.batch_len {
            return invalid(format!(
                "batch_overlap {} must be below batch_len {}",
                cam.batch_overlap, cam.batch_len
            ));
        }

        let offsets = &self.crash.lookback_offsets;
        if offsets.is_empty() {
            return invalid("lookback_offsets must not be empty".to_string());
        }

        if let Some(&o) = offsets.iter().find(|&&o| o < SPEED_WINDOW || o >= HORIZON) {
            return invalid(format!(
                "lookback offset {} outside {}..{}",
                o, SPEED_WINDOW, HORIZON
            ));
        }

        if self.crash.analysis_window == 0 || self.crash.analysis_window > cam.batch_len {
            return invalid(format!(
                "analysis_window {} must be within 1..={}",
                self.crash.analysis_window, cam.batch_len
            ));
        }

        if self.tracking.export_every == 0 {
            return invalid("export_every must be positive".to_string());
        }

        Ok(())
    }

    pub fn object_params(&self) -> ObjectParams {
        ObjectParams {
            kind: self.tracking.kind,
            learning_rate: self.tracking.learning_rate,
            goodness_threshold: self.tracking.goodness_threshold,
            interpolation: self.tracking.interpolation,
            stopped_speed: self.tracking.stopped_speed,
            speed_threshold: self.crash.speed_threshold,
        }
    }

    #[inline]
    pub fn frame_dims(&self) -> (u32, u32) {
        (self.camera.frame_width, self.camera.frame_height)
    }
}
