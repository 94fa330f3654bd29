//! Decode raw sensor dumps into oriented frames.
//!
//! The camera writes one frame per file as a packed grid of
//! little-endian `u16` counts, row-major, with no header.
//! Decoding widens the counts to `f64` and applies the fixed
//! sensor rotation once, so every consumer of the frame sees
//! the same orientation.

use std::{fs, path::Path};

use byteordered::byteorder::{ByteOrder, LittleEndian};
use ndarray::{s, Array2, ArrayView2};
use serde_derive::*;

use crate::error::DecodeError;

/// Dimensions of a raw frame as written by the camera.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub height: usize,
    pub width: usize,
}

impl FrameShape {
    pub fn len(&self) -> usize {
        self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FrameShape {
    fn default() -> Self {
        FrameShape {
            height: 480,
            width: 640,
        }
    }
}

/// Counter-clockwise rotation in multiples of 90°.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(from = "u8", into = "u8")]
pub struct Rotation {
    quarter_turns: u8,
}

impl Rotation {
    pub fn quarter_turns(quarter_turns: u8) -> Self {
        Rotation {
            quarter_turns: quarter_turns % 4,
        }
    }

    pub fn swaps_axes(&self) -> bool {
        self.quarter_turns % 2 == 1
    }

    /// Rotate a 2-D view, returning an owned array in
    /// standard layout.
    pub fn apply<T: Clone>(&self, frame: ArrayView2<T>) -> Array2<T> {
        let mut view = frame;
        for _ in 0..self.quarter_turns % 4 {
            // out[i][j] = in[j][w - 1 - i]
            view = view.slice_move(s![.., ..;-1]).reversed_axes();
        }
        view.as_standard_layout().into_owned()
    }
}

impl From<u8> for Rotation {
    fn from(quarter_turns: u8) -> Self {
        Rotation::quarter_turns(quarter_turns)
    }
}

impl From<Rotation> for u8 {
    fn from(rotation: Rotation) -> Self {
        rotation.quarter_turns
    }
}

impl Default for Rotation {
    /// Three counter-clockwise quarter turns (270°), which
    /// puts the FLIR gantry camera output north-up.
    fn default() -> Self {
        Rotation::quarter_turns(3)
    }
}

/// Raw sensor counts in camera orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame(Array2<u16>);

impl RawFrame {
    /// Parse a packed little-endian `u16` buffer. The buffer
    /// must hold exactly `shape.len()` samples.
    pub fn from_le_bytes(path: &Path, bytes: &[u8], shape: FrameShape) -> Result<Self, DecodeError> {
        if bytes.len() % 2 != 0 {
            return Err(DecodeError::OddLength {
                path: path.to_owned(),
                len: bytes.len(),
            });
        }

        let found = bytes.len() / 2;
        let mismatch = || DecodeError::ShapeMismatch {
            path: path.to_owned(),
            height: shape.height,
            width: shape.width,
            expected: shape.len(),
            found,
        };
        if found != shape.len() {
            return Err(mismatch());
        }

        let mut counts = vec![0u16; found];
        LittleEndian::read_u16_into(bytes, &mut counts);
        let counts =
            Array2::from_shape_vec((shape.height, shape.width), counts).map_err(|_| mismatch())?;
        Ok(RawFrame(counts))
    }

    pub fn counts(&self) -> &Array2<u16> {
        &self.0
    }

    /// Widen to floating point and rotate.
    pub fn orient(&self, rotation: Rotation) -> OrientedFrame {
        let widened = self.0.mapv(f64::from);
        OrientedFrame(rotation.apply(widened.view()))
    }
}

/// Raw counts as `f64`, rotated into output orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedFrame(Array2<f64>);

impl OrientedFrame {
    pub fn new(values: Array2<f64>) -> Self {
        OrientedFrame(values)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.0
    }

    /// `(rows, cols)` after rotation.
    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }
}

/// Source of oriented frames. The pipeline only talks to
/// this trait so that decodes can be observed in tests.
pub trait FrameSource {
    fn decode(&self, path: &Path) -> Result<OrientedFrame, DecodeError>;
}

/// Reads fixed-shape dumps from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    pub shape: FrameShape,
    pub rotation: Rotation,
}

impl FrameDecoder {
    pub fn new(shape: FrameShape, rotation: Rotation) -> Self {
        FrameDecoder { shape, rotation }
    }

    pub fn read_raw(&self, path: &Path) -> Result<RawFrame, DecodeError> {
        let bytes = fs::read(path).map_err(|source| DecodeError::Io {
            path: path.to_owned(),
            source,
        })?;
        RawFrame::from_le_bytes(path, &bytes, self.shape)
    }
}

impl FrameSource for FrameDecoder {
    fn decode(&self, path: &Path) -> Result<OrientedFrame, DecodeError> {
        Ok(self.read_raw(path)?.orient(self.rotation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use ndarray::array;
    use tempfile::TempDir;

    fn write_frame(dir: &TempDir, name: &str, counts: &[u16]) -> Result<std::path::PathBuf> {
        let path = dir.path().join(name);
        let mut bytes = vec![0u8; counts.len() * 2];
        LittleEndian::write_u16_into(counts, &mut bytes);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    #[test]
    fn zero_frame_is_rotated_to_portrait() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_frame(&dir, "zeros_ir.bin", &vec![0; 480 * 640])?;

        let frame = FrameDecoder::default().decode(&path)?;
        assert_eq!(frame.dim(), (640, 480));
        assert!(frame.values().iter().all(|&v| v == 0.0));
        Ok(())
    }

    #[test]
    fn repeated_decodes_are_identical() -> Result<()> {
        let dir = TempDir::new()?;
        let counts: Vec<u16> = (0..480 * 640).map(|i| (i % 65521) as u16).collect();
        let path = write_frame(&dir, "ramp_ir.bin", &counts)?;

        let decoder = FrameDecoder::default();
        let first = decoder.decode(&path)?;
        let second = decoder.decode(&path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn samples_are_little_endian() -> Result<()> {
        let shape = FrameShape {
            height: 1,
            width: 2,
        };
        let raw = RawFrame::from_le_bytes(Path::new("le"), &[0x01, 0x02, 0xff, 0x00], shape)?;
        assert_eq!(raw.counts(), &array![[0x0201u16, 0x00ff]]);
        Ok(())
    }

    #[test]
    fn odd_byte_count_is_rejected() {
        let shape = FrameShape {
            height: 1,
            width: 2,
        };
        let err = RawFrame::from_le_bytes(Path::new("odd"), &[0; 5], shape).unwrap_err();
        assert!(matches!(err, DecodeError::OddLength { len: 5, .. }));
    }

    #[test]
    fn wrong_sample_count_is_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_frame(&dir, "short_ir.bin", &vec![0; 480 * 639])?;

        let err = FrameDecoder::default().decode(&path).unwrap_err();
        match err {
            DecodeError::ShapeMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, 480 * 640);
                assert_eq!(found, 480 * 639);
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = FrameDecoder::default()
            .decode(Path::new("/nonexistent/frame_ir.bin"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }

    #[test]
    fn rotation_matches_quarter_turns() {
        let m = array![[1, 2, 3], [4, 5, 6]];

        assert_eq!(Rotation::quarter_turns(0).apply(m.view()), m);
        assert_eq!(
            Rotation::quarter_turns(1).apply(m.view()),
            array![[3, 6], [2, 5], [1, 4]]
        );
        assert_eq!(
            Rotation::quarter_turns(2).apply(m.view()),
            array![[6, 5, 4], [3, 2, 1]]
        );
        assert_eq!(
            Rotation::quarter_turns(3).apply(m.view()),
            array![[4, 1], [5, 2], [6, 3]]
        );
        assert_eq!(Rotation::quarter_turns(4), Rotation::quarter_turns(0));
    }

    #[test]
    fn orient_widens_before_rotating() -> Result<()> {
        let shape = FrameShape {
            height: 2,
            width: 3,
        };
        let mut bytes = vec![0u8; 12];
        LittleEndian::write_u16_into(&[1, 2, 3, 4, 5, 65535], &mut bytes);
        let raw = RawFrame::from_le_bytes(Path::new("small"), &bytes, shape)?;

        let frame = raw.orient(Rotation::default());
        assert_eq!(
            frame.values(),
            &array![[4.0, 1.0], [5.0, 2.0], [65535.0, 3.0]]
        );
        assert!(Rotation::default().swaps_axes());
        Ok(())
    }
}
