//! Depth-to-colour mapping for depth-sensing camera frames.

use image::{Rgb, RgbImage};

use crate::frame::DepthFrame;

/// Distance that maps to full brightness.
pub const REFERENCE_DISTANCE: f32 = 2000.0;

/// Gray level reached at the reference distance.
pub const GRAY_CEILING: f32 = 250.0;

/// No return from the sensor.
pub const INVALID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Saturated sample (`u16::MAX`).
pub const SATURATED_COLOR: Rgb<u8> = Rgb([0, 128, 0]);

/// Beyond the reference distance.
pub const FAR_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Map one raw depth sample to a display colour.
pub fn depth_to_color(sample: u16) -> Rgb<u8> {
    match sample {
        0 => INVALID_COLOR,
        u16::MAX => SATURATED_COLOR,
        _ => {
            let brightness = sample as f32 / REFERENCE_DISTANCE;
            if brightness > 1.0 {
                FAR_COLOR
            } else {
                let c = (brightness * GRAY_CEILING) as u8;
                Rgb([c, c, c])
            }
        }
    }
}

/// Render a whole depth frame, one sample per pixel.
pub fn visualize(depth: &DepthFrame) -> RgbImage {
    let width = depth.width();
    let samples = depth.samples();
    RgbImage::from_fn(width, depth.height(), |x, y| {
        depth_to_color(samples[y as usize * width as usize + x as usize])
    })
}
