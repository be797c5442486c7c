//! Frame - FrameSource output
//!
//! Decoded video frame handed over by the external decode layer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Decoded video frame
///
/// Opaque to the synchronization core: the pixels are never inspected, only
/// moved between buffers. Cloning is cheap (`Bytes` is reference counted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Pixel layout
    pub format: PixelFormat,

    /// Raw pixel data (zero-copy)
    pub data: Bytes,
}

impl Frame {
    /// Create a frame from raw pixel data
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            format,
            data: data.into(),
        }
    }

    /// Zero-sized frame, used by tests and placeholder sources
    pub fn empty() -> Self {
        Self::new(0, 0, PixelFormat::Rgb8, Bytes::new())
    }

    /// Size of the pixel payload in bytes
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    #[default]
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    /// Bytes used by a single pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}
