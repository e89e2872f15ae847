use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::frame::RgbFrame;

/// One estimated keypoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// Keypoints for every person in a frame, stored `[person][part][x, y, confidence]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseKeypoints {
    people: usize,
    parts: usize,
    values: Vec<f32>,
}

impl PoseKeypoints {
    pub fn new(people: usize, parts: usize, values: Vec<f32>) -> Result<Self> {
        let expected = people
            .checked_mul(parts)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("keypoint dimensions overflow"))?;
        if values.len() != expected {
            return Err(anyhow!(
                "expected {} keypoint values for {} people x {} parts, got {}",
                expected,
                people,
                parts,
                values.len()
            ));
        }
        Ok(Self {
            people,
            parts,
            values,
        })
    }

    pub fn people(&self) -> usize {
        self.people
    }

    pub fn parts(&self) -> usize {
        self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, person: usize, part: usize) -> Option<Keypoint> {
        if person >= self.people || part >= self.parts {
            return None;
        }
        let idx = (person * self.parts + part) * 3;
        Some(Keypoint {
            x: self.values[idx],
            y: self.values[idx + 1],
            confidence: self.values[idx + 2],
        })
    }

    /// Flattened table rows, person-major.
    pub fn rows(&self) -> impl Iterator<Item = KeypointRow> + '_ {
        let parts = self.parts;
        self.values
            .chunks_exact(3)
            .enumerate()
            .map(move |(i, point)| KeypointRow {
                part: i % parts,
                x: point[0],
                y: point[1],
                confidence: point[2],
                person: i / parts,
            })
    }
}

/// One row of the keypoint table shown by presentation layers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeypointRow {
    pub part: usize,
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
    pub person: usize,
}

/// Detection payload for one frame, copied out of the engine's buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseData {
    /// Engine-assigned frame index.
    pub frame_index: u64,
    pub pose: PoseKeypoints,
    /// Present only when the face sub-detector is enabled.
    pub face: Option<PoseKeypoints>,
    /// Left and right hand, present only when the hand sub-detector is enabled.
    pub hands: Option<[PoseKeypoints; 2]>,
    /// Frame with the skeleton overlay, when the engine renders one.
    pub rendered: Option<RgbFrame>,
}

impl PoseData {
    /// Rendered overlay, if it has any pixels.
    pub fn rendered_frame(&self) -> Option<&RgbFrame> {
        self.rendered.as_ref().filter(|frame| !frame.is_empty())
    }
}

/// Images captured alongside a depth-sensor detection.
#[derive(Clone, Debug)]
pub struct SensorImages {
    pub color: RgbFrame,
    pub depth: RgbImage,
}

/// Unit of the streaming protocol.
///
/// A result with `is_final == true` carries no payload and is the last result of a run.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    /// Position in production order, starting at 0 for each run.
    pub sequence: u64,
    pub payload: Option<PoseData>,
    pub sensor: Option<SensorImages>,
    pub is_final: bool,
}

impl DetectionResult {
    pub fn frame(sequence: u64, payload: PoseData) -> Self {
        Self {
            sequence,
            payload: Some(payload),
            sensor: None,
            is_final: false,
        }
    }

    /// Sensor frame. The payload may be absent when detection failed for this capture.
    pub fn sensor_frame(sequence: u64, payload: Option<PoseData>, images: SensorImages) -> Self {
        Self {
            sequence,
            payload,
            sensor: Some(images),
            is_final: false,
        }
    }

    pub fn finished(sequence: u64) -> Self {
        Self {
            sequence,
            payload: None,
            sensor: None,
            is_final: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypoints_reject_wrong_length() {
        assert!(PoseKeypoints::new(2, 3, vec![0.0; 18]).is_ok());
        assert!(PoseKeypoints::new(2, 3, vec![0.0; 17]).is_err());
    }

    #[test]
    fn rows_enumerate_parts_per_person() -> Result<()> {
        let values = vec![
            1.0, 2.0, 0.9, //
            3.0, 4.0, 0.8, //
            5.0, 6.0, 0.7, //
            7.0, 8.0, 0.6,
        ];
        let keypoints = PoseKeypoints::new(2, 2, values)?;
        let rows: Vec<_> = keypoints.rows().collect();
        assert_eq!(rows.len(), 4);
        assert_eq!((rows[1].part, rows[1].person), (1, 0));
        assert_eq!((rows[2].part, rows[2].person), (0, 1));
        assert_eq!(rows[3].x, 7.0);
        assert_eq!(keypoints.get(1, 1).map(|k| k.confidence), Some(0.6));
        assert_eq!(keypoints.get(2, 0), None);
        Ok(())
    }

    #[test]
    fn finished_result_has_no_payload() {
        let done = DetectionResult::finished(4);
        assert!(done.is_final);
        assert!(done.payload.is_none());
        assert!(done.sensor.is_none());
    }

    #[test]
    fn empty_rendered_frame_is_hidden() -> Result<()> {
        let data = PoseData {
            rendered: Some(RgbFrame::new(Vec::new(), 0, 0)?),
            ..PoseData::default()
        };
        assert!(data.rendered_frame().is_none());
        Ok(())
    }
}
