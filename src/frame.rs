//! Frame containers handed to the pose engine.
//!
//! - `RgbFrame`: packed 24-bit colour frame, row-major, no row padding.
//! - `DepthFrame`: dense grid of unsigned distance samples, one per pixel, row-major.
//!
//! Frames own their pixels. Nothing in this module borrows engine memory, so a
//! frame stays valid after the buffer it was copied from has been released.

use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

/// Packed RGB frame.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl RgbFrame {
    /// Wrap tightly packed RGB bytes. Length must be exactly `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = packed_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Pack a row-padded 24-bit bitmap into a tight buffer.
    ///
    /// `stride` is the byte distance between the starts of two rows and must be at
    /// least `width * 3`. The padding at the end of each row is dropped.
    pub fn from_strided(bytes: &[u8], width: u32, height: u32, stride: usize) -> Result<Self> {
        let line = (width as usize)
            .checked_mul(3)
            .ok_or_else(|| anyhow!("bitmap dimensions overflow"))?;
        if stride < line {
            return Err(anyhow!(
                "bitmap stride {} is shorter than a {}-pixel row",
                stride,
                width
            ));
        }
        let rows = height as usize;
        if rows > 0 {
            let needed = stride
                .checked_mul(rows - 1)
                .and_then(|v| v.checked_add(line))
                .ok_or_else(|| anyhow!("bitmap dimensions overflow"))?;
            if bytes.len() < needed {
                return Err(anyhow!(
                    "bitmap too short: need {} bytes, got {}",
                    needed,
                    bytes.len()
                ));
            }
        }

        let mut data = Vec::with_capacity(line * rows);
        for row in 0..rows {
            let start = row * stride;
            data.extend_from_slice(&bytes[start..start + line]);
        }
        Self::new(data, width, height)
    }

    /// Decode an image file (jpeg/png) into a packed frame.
    pub fn open(path: &Path) -> Result<Self> {
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        Ok(Self::from_image(decoded.to_rgb8()))
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// True when the frame has no pixels (zero width or height).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for RgbFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Depth frame as delivered by a depth-sensing camera.
#[derive(Clone, PartialEq, Eq)]
pub struct DepthFrame {
    samples: Vec<u16>,
    width: u32,
    height: u32,
}

impl DepthFrame {
    pub fn new(samples: Vec<u16>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("depth frame dimensions overflow"))?;
        if samples.len() != expected {
            return Err(anyhow!(
                "depth frame length mismatch: expected {}, got {}",
                expected,
                samples.len()
            ));
        }
        Ok(Self {
            samples,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Sample at `(x, y)`, or `None` outside the grid.
    pub fn sample(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

impl fmt::Debug for DepthFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn packed_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_frame_validates_length() {
        assert!(RgbFrame::new(vec![0u8; 12], 2, 2).is_ok());
        assert!(RgbFrame::new(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn strided_bitmap_drops_row_padding() -> Result<()> {
        // 2x2 bitmap, 6 bytes per row, padded to 8.
        let bytes = [
            1, 2, 3, 4, 5, 6, 0xAA, 0xAA, //
            7, 8, 9, 10, 11, 12, 0xBB, 0xBB,
        ];
        let frame = RgbFrame::from_strided(&bytes, 2, 2, 8)?;
        assert_eq!(frame.pixels(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        Ok(())
    }

    #[test]
    fn strided_bitmap_rejects_short_stride() {
        assert!(RgbFrame::from_strided(&[0u8; 16], 2, 2, 4).is_err());
        assert!(RgbFrame::from_strided(&[0u8; 10], 2, 2, 6).is_err());
    }

    #[test]
    fn depth_sample_lookup_is_row_major() -> Result<()> {
        let depth = DepthFrame::new(vec![1, 2, 3, 4, 5, 6], 3, 2)?;
        assert_eq!(depth.sample(0, 0), Some(1));
        assert_eq!(depth.sample(2, 0), Some(3));
        assert_eq!(depth.sample(0, 1), Some(4));
        assert_eq!(depth.sample(3, 0), None);
        Ok(())
    }
}
