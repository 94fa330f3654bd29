//! Quick-look PNG rendering of raw frames.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, ImageBuffer, ImageFormat, Luma};
use itertools::{Itertools, MinMaxResult};

use crate::frame::OrientedFrame;

/// Maps a frame to a displayable image file.
pub trait PreviewRenderer {
    fn render(&self, frame: &OrientedFrame, path: &Path) -> Result<()>;
}

/// Grayscale PNG preview.
///
/// With `scale` set, each frame is stretched over its own
/// value range into 8 bits, so previews of different frames
/// are not comparable. Otherwise counts are written as 16-bit
/// gray, clamped to `0..=65535`.
#[derive(Debug, Clone, Copy)]
pub struct PngPreview {
    pub scale: bool,
}

impl Default for PngPreview {
    fn default() -> Self {
        PngPreview { scale: true }
    }
}

impl PngPreview {
    fn scaled(frame: &OrientedFrame) -> Result<GrayImage> {
        let (rows, cols) = frame.dim();
        let values = frame.values();
        let (min, max) = match values.iter().copied().filter(|v| v.is_finite()).minmax() {
            MinMaxResult::NoElements => (0., 0.),
            MinMaxResult::OneElement(v) => (v, v),
            MinMaxResult::MinMax(lo, hi) => (lo, hi),
        };
        let range = max - min;

        let pixels = values
            .iter()
            .map(|&v| {
                if range > 0. && v.is_finite() {
                    ((v - min) / range * 255.).round().clamp(0., 255.) as u8
                } else {
                    0
                }
            })
            .collect();
        ImageBuffer::from_raw(cols as u32, rows as u32, pixels)
            .ok_or_else(|| anyhow!("preview buffer does not match {}x{}", cols, rows))
    }

    fn unscaled(frame: &OrientedFrame) -> Result<ImageBuffer<Luma<u16>, Vec<u16>>> {
        let (rows, cols) = frame.dim();
        let pixels = frame
            .values()
            .iter()
            .map(|&v| v.round().clamp(0., u16::MAX as f64) as u16)
            .collect();
        ImageBuffer::from_raw(cols as u32, rows as u32, pixels)
            .ok_or_else(|| anyhow!("preview buffer does not match {}x{}", cols, rows))
    }
}

impl PreviewRenderer for PngPreview {
    fn render(&self, frame: &OrientedFrame, path: &Path) -> Result<()> {
        let saved = if self.scale {
            Self::scaled(frame)?.save_with_format(path, ImageFormat::Png)
        } else {
            Self::unscaled(frame)?.save_with_format(path, ImageFormat::Png)
        };
        saved.with_context(|| format!("writing preview {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{io::Reader, DynamicImage};
    use ndarray::{array, Array2};
    use tempfile::TempDir;

    fn frame() -> OrientedFrame {
        OrientedFrame::new(array![[1000., 2000.], [3000., 5000.], [1000., 1000.]])
    }

    #[test]
    fn scaled_preview_spans_full_range() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("p.png");
        PngPreview { scale: true }.render(&frame(), &path)?;

        let img = match Reader::open(&path)?.with_guessed_format()?.decode()? {
            DynamicImage::ImageLuma8(img) => img,
            other => panic!("unexpected color type {:?}", other.color()),
        };
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(img.get_pixel(0, 0).0, [0]);
        assert_eq!(img.get_pixel(1, 1).0, [255]);
        assert_eq!(img.get_pixel(0, 1).0, [128]);
        Ok(())
    }

    #[test]
    fn unscaled_preview_keeps_counts() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("p.png");
        let frame = OrientedFrame::new(array![[-5., 70000.], [1234., 0.]]);
        PngPreview { scale: false }.render(&frame, &path)?;

        let img = match image::open(&path)? {
            DynamicImage::ImageLuma16(img) => img,
            other => panic!("unexpected color type {:?}", other.color()),
        };
        assert_eq!(img.get_pixel(0, 0).0, [0]);
        assert_eq!(img.get_pixel(1, 0).0, [65535]);
        assert_eq!(img.get_pixel(0, 1).0, [1234]);
        Ok(())
    }

    #[test]
    fn flat_frame_renders_black() -> Result<()> {
        let img = PngPreview::scaled(&OrientedFrame::new(Array2::from_elem((4, 3), 7.)))?;
        assert!(img.pixels().all(|p| p.0 == [0]));
        Ok(())
    }
}
