//! Frame sources the pipeline can be driven from.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::debug;

use crate::error::Error;
use crate::frame::{read_frame, GrayFrame};

pub trait FrameSource {
    /// Next decoded frame, `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<GrayFrame>, Error>;
}

/// Directory of still frames in any format `image` decodes, read in
/// file-name order.
pub struct ImageDirectory {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageDirectory {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.is_file() && ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }

        paths.sort();
        debug!(dir = %dir.as_ref().display(), frames = paths.len(), "image directory opened");

        Ok(Self { paths, next: 0 })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageDirectory {
    fn next_frame(&mut self) -> Result<Option<GrayFrame>, Error> {
        let path = match self.paths.get(self.next) {
            Some(path) => path,
            None => return Ok(None),
        };

        self.next += 1;
        read_frame(path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::write_frame;
    use ndarray::Array2;

    #[test]
    fn reads_mixed_formats_in_name_order() {
        let dir = std::env::temp_dir().join(format!("crashwatch-src-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        for (name, value) in [("002.png", 2u8), ("001.pgm", 1), ("003.bmp", 3)] {
            write_frame(dir.join(name), Array2::from_elem((4, 6), value).view()).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "skip me").unwrap();

        let mut source = ImageDirectory::open(&dir).unwrap();
        assert_eq!(source.len(), 3);

        let mut seen = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.dim(), (4, 6));
            seen.push(frame[[0, 0]]);
        }

        assert_eq!(seen, vec![1, 2, 3]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
