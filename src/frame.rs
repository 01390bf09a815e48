use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use nalgebra as na;
use ndarray::prelude::*;

use crate::detection::Detection;
use crate::error::Error;
use crate::region::Region;

/// 8-bit grayscale image, indexed `[row, col]`.
pub type GrayFrame = Array2<u8>;

#[derive(Debug, Clone)]
pub struct Frame {
    pub dims: (u32, u32),
    pub image: GrayFrame,
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(image: GrayFrame, detections: Vec<Detection>) -> Self {
        let (rows, cols) = image.dim();

        Self {
            dims: (cols as u32, rows as u32),
            image,
            detections,
        }
    }
}

/// Owned copy of `region`, clamped to the frame first.
pub fn crop(frame: ArrayView2<'_, u8>, region: &Region) -> GrayFrame {
    let (rows, cols) = frame.dim();
    let r = region.clamp(cols as i32, rows as i32);

    frame
        .slice(s![
            r.ymin as usize..r.ymax as usize,
            r.xmin as usize..r.xmax as usize
        ])
        .to_owned()
}

/// Bilinear `width`x`height` patch centered on a sub-pixel location.
///
/// Samples outside the frame replicate the nearest border pixel, so the
/// patch is always fully populated.
pub fn sub_pixel_patch(
    frame: ArrayView2<'_, u8>,
    center: na::Point2<f32>,
    width: usize,
    height: usize,
) -> Array2<f32> {
    let (rows, cols) = frame.dim();
    let x0 = center.x - 0.5 * (width as f32 - 1.0);
    let y0 = center.y - 0.5 * (height as f32 - 1.0);

    let at = |y: i64, x: i64| -> f32 {
        let y = y.clamp(0, rows as i64 - 1) as usize;
        let x = x.clamp(0, cols as i64 - 1) as usize;
        frame[[y, x]] as f32
    };

    Array2::from_shape_fn((height, width), |(i, j)| {
        let x = x0 + j as f32;
        let y = y0 + i as f32;
        let (xf, yf) = (x.floor(), y.floor());
        let (ax, ay) = (x - xf, y - yf);
        let (xi, yi) = (xf as i64, yf as i64);

        let top = at(yi, xi) * (1.0 - ax) + at(yi, xi + 1) * ax;
        let bottom = at(yi + 1, xi) * (1.0 - ax) + at(yi + 1, xi + 1) * ax;

        top * (1.0 - ay) + bottom * ay
    })
}

type UnitImage = ImageBuffer<Luma<f32>, Vec<f32>>;

pub fn to_gray_image(frame: ArrayView2<'_, u8>) -> GrayImage {
    let (rows, cols) = frame.dim();

    GrayImage::from_fn(cols as u32, rows as u32, |x, y| Luma([frame[[y as usize, x as usize]]]))
}

pub fn from_gray_image(img: &GrayImage) -> GrayFrame {
    let (w, h) = img.dimensions();

    Array2::from_shape_fn((h as usize, w as usize), |(r, c)| img.get_pixel(c as u32, r as u32)[0])
}

/// Triangle-filtered resize to `width`x`height`.
pub fn resize_gray(src: ArrayView2<'_, u8>, width: usize, height: usize) -> GrayFrame {
    if src.dim() == (height, width) {
        return src.to_owned();
    }

    let out = imageops::resize(&to_gray_image(src), width as u32, height as u32, FilterType::Triangle);

    from_gray_image(&out)
}

/// Triangle-filtered resize of a map whose values lie in `[0, 1]`; values
/// outside that range are clamped into it.
pub fn resize_unit(src: ArrayView2<'_, f32>, width: usize, height: usize) -> Array2<f32> {
    if src.dim() == (height, width) {
        return src.mapv(|v| v.clamp(0.0, 1.0));
    }

    let (rows, cols) = src.dim();
    let img = UnitImage::from_fn(cols as u32, rows as u32, |x, y| Luma([src[[y as usize, x as usize]]]));
    let out = imageops::resize(&img, width as u32, height as u32, FilterType::Triangle);

    Array2::from_shape_fn((height, width), |(r, c)| out.get_pixel(c as u32, r as u32)[0])
}

/// Decodes any image format `image` supports into a grayscale frame.
pub fn read_frame<P: AsRef<Path>>(path: P) -> Result<GrayFrame, Error> {
    let img = image::open(path)?.to_luma8();

    Ok(from_gray_image(&img))
}

/// Encodes a frame in the format named by the file extension.
pub fn write_frame<P: AsRef<Path>>(path: P, frame: ArrayView2<'_, u8>) -> Result<(), Error> {
    to_gray_image(frame).save(path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_clamps_to_frame() {
        let frame = Array2::from_shape_fn((10, 20), |(r, c)| (r * 20 + c) as u8);
        let out = crop(frame.view(), &Region::new(15, 8, 25, 12));

        assert_eq!(out.dim(), (2, 5));
        assert_eq!(out[[0, 0]], (8 * 20 + 15) as u8);
    }

    #[test]
    fn sub_pixel_patch_replicates_border() {
        let frame = Array2::from_elem((4, 4), 7u8);
        let patch = sub_pixel_patch(frame.view(), na::Point2::new(0.0, 0.0), 5, 5);

        assert!(patch.iter().all(|&v| (v - 7.0).abs() < 1e-6));
    }

    #[test]
    fn resize_keeps_constant_images_constant() {
        let src = Array2::from_elem((36, 48), 0.35f32);
        let out = resize_unit(src.view(), 134, 100);

        assert_eq!(out.dim(), (100, 134));
        assert!(out.iter().all(|&v| (v - 0.35).abs() < 1e-5));

        let gray = resize_gray(Array2::from_elem((72, 96), 90u8).view(), 48, 36);
        assert_eq!(gray.dim(), (36, 48));
        assert!(gray.iter().all(|&v| v == 90));
    }

    #[test]
    fn gray_image_conversion_keeps_orientation() {
        let frame = Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c) as u8);
        let img = to_gray_image(frame.view());

        assert_eq!(img.dimensions(), (5, 3));
        assert_eq!(img.get_pixel(4, 1)[0], 9);
        assert_eq!(from_gray_image(&img), frame);
    }

    #[test]
    fn frames_round_trip_through_disk() {
        let dir = std::env::temp_dir().join(format!("crashwatch-pgm-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.pgm");

        let frame = Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c) as u8 * 10);
        write_frame(&path, frame.view()).unwrap();

        assert_eq!(read_frame(&path).unwrap(), frame);
        std::fs::remove_dir_all(&dir).ok();
    }
}
