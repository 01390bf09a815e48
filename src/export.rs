//! Background export of tracker clips.
//!
//! The frame loop builds a [`TrackClip`] (an owned copy of the cropped
//! frames) and hands it to the [`ExportWorker`], which writes it through a
//! [`ClipSink`] on its own thread. Submission never blocks: when the queue
//! is full the clip is dropped with a warning.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::frame::{write_frame, GrayFrame};
use crate::region::Region;

#[derive(Debug, Clone)]
pub struct TrackClip {
    pub tracker_id: u32,
    pub sequence: u32,
    pub region: Region,
    pub frames: Vec<GrayFrame>,
}

impl TrackClip {
    /// `<tracker_id>_<sequence>`, the stem every sink names its output by.
    #[inline]
    pub fn name(&self) -> String {
        format!("{}_{}", self.tracker_id, self.sequence)
    }
}

pub trait ClipSink {
    fn write_clip(&mut self, clip: &TrackClip) -> Result<(), Error>;
}

/// Writes every clip as a directory of numbered binary PGM frames.
pub struct PgmSequenceSink {
    root: PathBuf,
}

impl PgmSequenceSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        std::fs::create_dir_all(root.as_ref())?;

        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }
}

impl ClipSink for PgmSequenceSink {
    fn write_clip(&mut self, clip: &TrackClip) -> Result<(), Error> {
        let dir = self.root.join(clip.name());
        std::fs::create_dir_all(&dir)?;

        for (k, frame) in clip.frames.iter().enumerate() {
            write_frame(dir.join(format!("{}.pgm", k)), frame.view())?;
        }

        Ok(())
    }
}

pub struct ExportWorker {
    tx: Option<Sender<TrackClip>>,
    handle: Option<JoinHandle<()>>,
}

impl ExportWorker {
    pub fn spawn<S>(mut sink: S, capacity: usize) -> Self
    where
        S: ClipSink + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded::<TrackClip>(capacity.max(1));

        let handle = std::thread::spawn(move || {
            while let Ok(clip) = rx.recv() {
                match sink.write_clip(&clip) {
                    Ok(()) => debug!(
                        tracker = clip.tracker_id,
                        sequence = clip.sequence,
                        frames = clip.frames.len(),
                        "clip exported"
                    ),
                    Err(err) => warn!(tracker = clip.tracker_id, %err, "clip export failed"),
                }
            }

            info!("export worker stopped");
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queues a clip without blocking the caller.
    pub fn submit(&self, clip: TrackClip) -> Result<(), Error> {
        let tx = self.tx.as_ref().ok_or(Error::ExportClosed)?;

        match tx.try_send(clip) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(clip)) => {
                warn!(tracker = clip.tracker_id, sequence = clip.sequence, "export queue full, clip dropped");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::ExportClosed),
        }
    }

    /// Closes the queue and waits for pending clips to be written.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("export worker panicked");
            }
        }
    }
}

impl Drop for ExportWorker {
    fn drop(&mut self) {
        self.close();
    }
}
