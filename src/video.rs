//! OpenCV-backed video input and clip output.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio,
};
use tracing::debug;

use crate::error::Error;
use crate::export::{ClipSink, TrackClip};
use crate::frame::GrayFrame;
use crate::source::FrameSource;

pub const CLIP_FPS: f64 = 30.0;

fn to_gray_frame(gray: &Mat) -> Result<GrayFrame, Error> {
    let (rows, cols) = (gray.rows() as usize, gray.cols() as usize);
    let data = gray.data_typed::<u8>()?.to_vec();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::BadImage(e.to_string()))
}

fn to_bgr_mat(frame: &GrayFrame) -> Result<Mat, Error> {
    let (rows, cols) = frame.dim();
    let mut gray = Mat::new_rows_cols_with_default(
        rows as i32,
        cols as i32,
        core::CV_8UC1,
        core::Scalar::all(0.0),
    )?;

    for (dst, &src) in gray.data_typed_mut::<u8>()?.iter_mut().zip(frame.iter()) {
        *dst = src;
    }

    let mut bgr = Mat::default();
    imgproc::cvt_color(&gray, &mut bgr, imgproc::COLOR_GRAY2BGR, 0)?;

    Ok(bgr)
}

/// Decodes a video file, resizing each frame to `width`x`height` and
/// converting it to grayscale.
pub struct VideoFileSource {
    cam: videoio::VideoCapture,
    size: core::Size,
    frame: Mat,
}

impl VideoFileSource {
    pub fn open<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Self, Error> {
        let name = path.as_ref().to_string_lossy().into_owned();
        let cam = videoio::VideoCapture::from_file(&name, videoio::CAP_ANY)?;

        if !videoio::VideoCapture::is_opened(&cam)? {
            return Err(Error::BadImage(format!("unable to open video {}", name)));
        }

        debug!(
            video = %name,
            width = cam.get(videoio::CAP_PROP_FRAME_WIDTH)?,
            height = cam.get(videoio::CAP_PROP_FRAME_HEIGHT)?,
            total = cam.get(videoio::CAP_PROP_FRAME_COUNT)?,
            "video opened"
        );

        Ok(Self {
            cam,
            size: core::Size::new(width as i32, height as i32),
            frame: Mat::default(),
        })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<GrayFrame>, Error> {
        if !self.cam.read(&mut self.frame)? || self.frame.cols() == 0 || self.frame.rows() == 0 {
            return Ok(None);
        }

        let mut resized = Mat::default();
        imgproc::resize(&self.frame, &mut resized, self.size, 0.0, 0.0, imgproc::INTER_AREA)?;

        let mut gray = Mat::default();
        imgproc::cvt_color(&resized, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        to_gray_frame(&gray).map(Some)
    }
}

/// Writes every clip as an MJPG `<dir>/<id>_<seq>.avi`.
pub struct AviSink {
    root: PathBuf,
}

impl AviSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        std::fs::create_dir_all(root.as_ref())?;

        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }
}

impl ClipSink for AviSink {
    fn write_clip(&mut self, clip: &TrackClip) -> Result<(), Error> {
        let first = match clip.frames.first() {
            Some(frame) => frame,
            None => return Ok(()),
        };

        let (rows, cols) = first.dim();
        let path = self.root.join(format!("{}.avi", clip.name()));

        let mut writer = videoio::VideoWriter::new(
            &path.to_string_lossy(),
            videoio::VideoWriter::fourcc(b'M' as _, b'J' as _, b'P' as _, b'G' as _)?,
            CLIP_FPS,
            core::Size::new(cols as i32, rows as i32),
            true,
        )?;

        for frame in &clip.frames {
            writer.write(&to_bgr_mat(frame)?)?;
        }

        writer.release()?;
        Ok(())
    }
}
