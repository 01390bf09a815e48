//! Per-camera batch pipeline: buffer frames, track over each batch, look
//! for crashes, report them.

use std::io::Write;

use ndarray::ArrayView2;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::circular_queue::CircularQueue;
use crate::classifier::LinearModel;
use crate::collision::{CrashDetector, CrashMode};
use crate::config::{CameraCfg, Config};
use crate::error::Error;
use crate::export::ExportWorker;
use crate::frame::{resize_gray, Frame};
use crate::region::Region;
use crate::scene::Scene;
use crate::tracker::TrackedObject;
use crate::Detection;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CrashEvent {
    pub camera_id: String,
    pub starting_frame_id: u64,
    pub region: Region,
    pub city: String,
    pub district: String,
}

pub trait CrashReporter {
    fn report(&mut self, event: &CrashEvent) -> Result<(), Error>;
}

pub struct LogReporter;

impl CrashReporter for LogReporter {
    fn report(&mut self, event: &CrashEvent) -> Result<(), Error> {
        info!(
            camera = %event.camera_id,
            frame = event.starting_frame_id,
            region = ?event.region,
            city = %event.city,
            district = %event.district,
            "crash detected"
        );

        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonLinesReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> CrashReporter for JsonLinesReporter<W> {
    fn report(&mut self, event: &CrashEvent) -> Result<(), Error> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;

        Ok(())
    }
}

fn scale_detection(det: &Detection, sx: f32, sy: f32) -> Detection {
    Detection {
        xmin: det.xmin * sx,
        xmax: det.xmax * sx,
        ymin: det.ymin * sy,
        ymax: det.ymax * sy,
        ..det.clone()
    }
}

pub struct CameraNode {
    camera: CameraCfg,
    scene: Scene,
    detector: CrashDetector,
    buffer: CircularQueue<Frame>,
    frames_seen: u64,
    batches: u64,
    reporter: Option<Box<dyn CrashReporter + Send>>,
    warned_no_reporter: bool,
}

impl CameraNode {
    pub fn new(config: &Config, exporter: Option<ExportWorker>) -> Self {
        let camera = config.camera.clone();
        let crash = &config.crash;

        let mut scene = Scene::new(config.frame_dims(), config.object_params())
            .with_frame_window(crash.analysis_window.max(camera.batch_len));
        if let Some(worker) = exporter {
            scene = scene.with_export(worker, config.tracking.export_every, crash.analysis_window);
        }

        let mut detector = CrashDetector::new(crash.mode)
            .with_offsets(crash.lookback_offsets.clone())
            .with_analysis_window(crash.analysis_window);

        if crash.mode == CrashMode::Classifier {
            match crash.model_path.as_ref() {
                Some(path) => match LinearModel::from_file(path) {
                    Ok(model) => {
                        info!(camera = %camera.id, path = %path.display(), "crash model loaded");
                        detector = detector.with_classifier(model);
                    }
                    Err(err) => {
                        warn!(camera = %camera.id, path = %path.display(), %err, "crash model unavailable")
                    }
                },
                None => warn!(camera = %camera.id, "no crash model configured"),
            }
        }

        Self {
            buffer: CircularQueue::with_capacity(camera.batch_len),
            camera,
            scene,
            detector,
            frames_seen: 0,
            batches: 0,
            reporter: None,
            warned_no_reporter: false,
        }
    }

    pub fn with_reporter<R: CrashReporter + Send + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    /// Replaces the crash detector, e.g. to plug in another classifier.
    pub fn with_detector(mut self, detector: CrashDetector) -> Self {
        self.detector = detector;
        self
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.camera.id
    }

    #[inline]
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    #[inline]
    pub fn batches(&self) -> u64 {
        self.batches
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn tracks(&self) -> Vec<crate::Track> {
        self.scene.tracks()
    }

    /// Buffers one frame; a full buffer is processed as a batch, after which
    /// only the overlapping tail is kept.
    pub fn feed(&mut self, frame: Frame) -> Option<CrashEvent> {
        let frame = self.conform(frame);

        self.buffer.push(frame);
        self.frames_seen += 1;

        if self.buffer.len() < self.camera.batch_len {
            return None;
        }

        let event = self.process_batch();
        self.buffer.retain_newest(self.camera.batch_overlap);

        event
    }

    fn conform(&self, frame: Frame) -> Frame {
        let (fw, fh) = (self.camera.frame_width, self.camera.frame_height);
        if frame.dims == (fw, fh) {
            return frame;
        }

        debug!(from = ?frame.dims, to = ?(fw, fh), "resizing frame");
        let sx = fw as f32 / frame.dims.0.max(1) as f32;
        let sy = fh as f32 / frame.dims.1.max(1) as f32;

        let image = resize_gray(frame.image.view(), fw as usize, fh as usize);
        let detections = frame
            .detections
            .iter()
            .map(|d| scale_detection(d, sx, sy))
            .collect();

        Frame::new(image, detections)
    }

    fn process_batch(&mut self) -> Option<CrashEvent> {
        let (fw, fh) = (self.camera.frame_width, self.camera.frame_height);
        let frames: Vec<&Frame> = self.buffer.asc_iter().collect();
        let first = frames.first()?;

        self.batches += 1;
        self.scene.reset();

        let regions: Vec<Region> = first
            .detections
            .iter()
            .filter_map(|d| d.region(fw, fh))
            .collect();
        self.scene.spawn(first.image.view(), &regions);

        for frame in &frames[1..] {
            self.scene.update_all(frame.image.view());
        }

        let views: Vec<ArrayView2<'_, u8>> = frames.iter().map(|f| f.image.view()).collect();
        let mut objects: Vec<&mut TrackedObject> = self.scene.objects_mut().collect();
        let crash = self.detector.detect_crash(&views, &mut objects)?;

        let event = CrashEvent {
            camera_id: self.camera.id.clone(),
            starting_frame_id: self.frames_seen + 1 - self.camera.batch_len as u64,
            region: crash.region,
            city: self.camera.city.clone(),
            district: self.camera.district.clone(),
        };

        if !crash.confirmed.is_empty() {
            self.scene.export_objects(Some(&crash.confirmed));
        }

        match self.reporter.as_mut() {
            Some(reporter) => {
                if let Err(err) = reporter.report(&event) {
                    warn!(camera = %event.camera_id, %err, "crash report failed");
                }
            }
            None if !self.warned_no_reporter => {
                warn!(camera = %event.camera_id, "no crash reporter configured");
                self.warned_no_reporter = true;
            }
            None => {}
        }

        Some(event)
    }
}
