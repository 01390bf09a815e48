use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crashwatch::camera::{CameraNode, JsonLinesReporter, LogReporter};
use crashwatch::export::ExportWorker;
use crashwatch::replay::ReplayFile;
use crashwatch::source::{FrameSource, ImageDirectory};
use crashwatch::{Config, Frame};

/// Replays a recorded clip through the crash detection pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration, defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of frame images (PNG, PGM, JPEG, ...)
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Video file decoded through OpenCV
    #[cfg(feature = "opencv")]
    #[arg(short, long)]
    video: Option<PathBuf>,

    /// Detection replay file, one batch of boxes per frame
    #[arg(short, long)]
    boxes: Option<PathBuf>,

    /// Where tracker clips are written
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Appends every crash event as a JSON line
    #[arg(long)]
    events: Option<PathBuf>,
}

#[cfg(feature = "opencv")]
fn open_video(args: &Args, config: &Config) -> Result<Option<Box<dyn FrameSource>>> {
    let video = match args.video.as_ref() {
        Some(video) => video,
        None => return Ok(None),
    };

    let (w, h) = config.frame_dims();
    let source = crashwatch::video::VideoFileSource::open(video, w, h)
        .with_context(|| format!("opening {}", video.display()))?;

    Ok(Some(Box::new(source)))
}

#[cfg(not(feature = "opencv"))]
fn open_video(_args: &Args, _config: &Config) -> Result<Option<Box<dyn FrameSource>>> {
    Ok(None)
}

fn open_source(args: &Args, config: &Config) -> Result<Box<dyn FrameSource>> {
    if let Some(source) = open_video(args, config)? {
        return Ok(source);
    }

    match args.frames.as_ref() {
        Some(dir) => {
            let source = ImageDirectory::open(dir).with_context(|| format!("opening {}", dir.display()))?;
            info!(frames = source.len(), resize_to = ?config.frame_dims(), "frame directory opened");

            Ok(Box::new(source))
        }
        None => bail!("no frame source given"),
    }
}

fn open_exporter(args: &Args, config: &Config) -> Result<Option<ExportWorker>> {
    let dir = match args.export_dir.as_ref() {
        Some(dir) => dir,
        None => return Ok(None),
    };

    let capacity = config.tracking.export_queue;

    #[cfg(feature = "opencv")]
    let worker = ExportWorker::spawn(crashwatch::video::AviSink::new(dir)?, capacity);

    #[cfg(not(feature = "opencv"))]
    let worker = ExportWorker::spawn(crashwatch::export::PgmSequenceSink::new(dir)?, capacity);

    Ok(Some(worker))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crashwatch=info")),
        )
        .init();

    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    let boxes = match args.boxes.as_ref() {
        Some(path) => ReplayFile::open(path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            warn!("no detection boxes given, nothing will be tracked");
            ReplayFile::default()
        }
    };

    let mut source = open_source(&args, &config)?;
    let exporter = open_exporter(&args, &config)?;

    let node = CameraNode::new(&config, exporter);
    let mut node = match args.events.as_ref() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;

            node.with_reporter(JsonLinesReporter::new(file))
        }
        None => node.with_reporter(LogReporter),
    };

    info!(camera = node.id(), dims = ?config.frame_dims(), mode = ?config.crash.mode, "pipeline started");

    let mut index = 0;
    let mut crashes = 0;
    while let Some(image) = source.next_frame()? {
        let frame = Frame::new(image, boxes.batch(index).to_vec());

        if let Some(event) = node.feed(frame) {
            crashes += 1;
            info!(frame = event.starting_frame_id, region = ?event.region, "crash in batch");
        }

        index += 1;
    }

    info!(frames = node.frames_seen(), batches = node.batches(), crashes, "pipeline finished");

    Ok(())
}
