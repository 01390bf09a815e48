use std::collections::BTreeMap;

use ndarray::ArrayView2;
use tracing::{debug, trace, warn};

use crate::circular_queue::CircularQueue;
use crate::export::{ExportWorker, TrackClip};
use crate::frame::GrayFrame;
use crate::region::Region;
use crate::tracker::{Analysis, ObjectParams, TrackedObject};

pub const DEFAULT_EXPORT_EVERY: usize = 30;
pub const DEFAULT_EXPORT_WINDOW: usize = 30;

struct Export {
    worker: ExportWorker,
    every: usize,
    window: usize,
    sequence: u32,
}

/// Registry of the objects tracked on one camera stream, together with the
/// recent frames they were tracked over.
pub struct Scene {
    objects: BTreeMap<u32, TrackedObject>,
    next_id: u32,
    frame_dims: (u32, u32),
    params: ObjectParams,
    frames: CircularQueue<(u64, GrayFrame)>,
    frame_no: u64,
    frames_recorded: u64,
    export: Option<Export>,
}

impl Scene {
    pub fn new(frame_dims: (u32, u32), params: ObjectParams) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
            frame_dims,
            params,
            frames: CircularQueue::with_capacity(DEFAULT_EXPORT_WINDOW),
            frame_no: 0,
            frames_recorded: 0,
            export: None,
        }
    }

    /// Exports every object's recent clip through `worker` once every
    /// `every` recorded frames.
    pub fn with_export(mut self, worker: ExportWorker, every: usize, window: usize) -> Self {
        let window = window.max(1);
        if window > self.frames.capacity() {
            self.frames = CircularQueue::with_capacity(window);
        }

        self.export = Some(Export {
            worker,
            every: every.max(1),
            window,
            sequence: 0,
        });
        self
    }

    /// Number of frames the scene keeps for clip extraction.
    pub fn with_frame_window(mut self, window: usize) -> Self {
        if window > self.frames.capacity() {
            self.frames = CircularQueue::with_capacity(window);
        }
        self
    }

    fn record(&mut self, frame: ArrayView2<'_, u8>) {
        let current = self.frames.newest().map(|(no, _)| *no);
        if current == Some(self.frame_no) {
            return;
        }

        self.frames.push((self.frame_no, frame.to_owned()));
        self.frames_recorded += 1;
    }

    /// Starts tracking every region on `frame`, which becomes the current
    /// frame unless it already is.
    pub fn spawn(&mut self, frame: ArrayView2<'_, u8>, regions: &[Region]) -> Vec<&TrackedObject> {
        self.record(frame);

        let mut ids = Vec::with_capacity(regions.len());
        for region in regions {
            let id = self.next_id;
            self.next_id += 1;

            let object = TrackedObject::new(frame, *region, self.frame_dims, id, &self.params);
            self.objects.insert(id, object);
            ids.push(id);
        }

        debug!(count = ids.len(), total = self.objects.len(), "trackers spawned");

        ids.iter().filter_map(|id| self.objects.get(id)).collect()
    }

    /// Advances every object to `frame` and refreshes its forecast.
    pub fn update_all(&mut self, frame: ArrayView2<'_, u8>) {
        self.frame_no += 1;
        self.record(frame);

        for object in self.objects.values_mut() {
            let region = object.update(frame);
            let forecast = object.forecast();

            trace!(id = object.id(), ?region, ?forecast, "object updated");
        }

        let due = self
            .export
            .as_ref()
            .map_or(false, |e| self.frames_recorded % e.every as u64 == 0);

        if due {
            self.export_objects(None);
        }
    }

    /// Hands a deep copy of each object's recent clip to the export worker;
    /// `None` exports every object.
    pub fn export_objects(&mut self, ids: Option<&[u32]>) {
        let Some(export) = self.export.as_mut() else {
            debug!("no export worker configured");
            return;
        };

        let views: Vec<_> = self.frames.asc_iter().map(|(_, f)| f.view()).collect();
        let sequence = export.sequence;
        export.sequence += 1;

        for object in self.objects.values() {
            if ids.map_or(false, |ids| !ids.contains(&object.id())) {
                continue;
            }

            let clip = match object.frames_for_analysis(&views, export.window) {
                Analysis::Ready(clip) => clip,
                Analysis::InsufficientHistory => {
                    trace!(id = object.id(), "history too short to export");
                    continue;
                }
            };

            let clip = TrackClip {
                tracker_id: object.id(),
                sequence,
                region: clip.region,
                frames: clip.frames,
            };

            if let Err(err) = export.worker.submit(clip) {
                warn!(id = object.id(), %err, "clip not exported");
            }
        }
    }

    /// Drops every tracked object and the recorded frames. Identifiers keep
    /// counting up.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.frames.clear();
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    #[inline]
    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    #[inline]
    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut TrackedObject> {
        self.objects.values_mut()
    }

    /// Recorded frames, oldest first.
    pub fn frames(&self) -> Vec<ArrayView2<'_, u8>> {
        self.frames.asc_iter().map(|(_, f)| f.view()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[inline]
    pub fn frame_dims(&self) -> (u32, u32) {
        self.frame_dims
    }

    pub fn tracks(&self) -> Vec<crate::Track> {
        self.objects.values().map(Into::into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::MemorySink;
    use crate::motion::TrackerKind;
    use ndarray::Array2;

    fn scene_frame(x0: usize) -> Array2<u8> {
        Array2::from_shape_fn((120, 160), |(r, c)| {
            if c >= x0 && c < x0 + 30 && r >= 40 && r < 60 {
                160 + (((r - 40) * 5 + (c - x0) * 11) % 60) as u8
            } else {
                20
            }
        })
    }

    fn params() -> ObjectParams {
        ObjectParams {
            kind: TrackerKind::Template,
            ..ObjectParams::default()
        }
    }

    #[test]
    fn identifiers_are_never_reused() {
        let mut scene = Scene::new((160, 120), params());
        let frame = scene_frame(20);

        let first: Vec<_> = scene
            .spawn(frame.view(), &[Region::new(20, 40, 50, 60), Region::new(100, 10, 130, 30)])
            .iter()
            .map(|o| o.id())
            .collect();
        assert_eq!(first, vec![0, 1]);

        scene.reset();
        assert!(scene.is_empty());
        assert!(scene.frames().is_empty());

        let second: Vec<_> = scene
            .spawn(frame.view(), &[Region::new(20, 40, 50, 60)])
            .iter()
            .map(|o| o.id())
            .collect();
        assert_eq!(second, vec![2]);
    }

    #[test]
    fn update_all_advances_every_object() {
        let mut scene = Scene::new((160, 120), params());
        scene.spawn(scene_frame(20).view(), &[Region::new(20, 40, 50, 60)]);
        scene.spawn(scene_frame(20).view(), &[Region::new(100, 80, 130, 100)]);
        assert_eq!(scene.frames().len(), 1);

        for k in 1..=6 {
            scene.update_all(scene_frame(20 + 2 * k).view());
        }

        assert_eq!(scene.frames().len(), 7);
        for object in scene.objects() {
            assert_eq!(object.history().len(), 7);
        }

        let moving = scene.get(0).unwrap();
        assert!(moving.forecast_at(15).is_some());
        assert!(moving.forecast_at(16).is_some());
        assert_eq!(scene.tracks().len(), 2);
    }

    #[test]
    fn exports_on_cadence() {
        let sink = MemorySink::default();
        let worker = ExportWorker::spawn(sink.clone(), 16);
        let mut scene = Scene::new((160, 120), params()).with_export(worker, 4, 4);

        scene.spawn(scene_frame(20).view(), &[Region::new(20, 40, 50, 60)]);
        for k in 1..=7 {
            scene.update_all(scene_frame(20 + k).view());
        }

        // recorded frames 4 and 8 trigger an export round each
        drop(scene);

        let clips = sink.0.lock().unwrap();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].sequence, 0);
        assert_eq!(clips[1].sequence, 1);
        assert_eq!(clips[1].frames.len(), 4);
    }
}
