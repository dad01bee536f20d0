//! Common types for lowview.
//!
//! This crate defines the data model shared by the acquisition and playback
//! halves of the daemon: the pixel [`Frame`] handed to the display, the
//! [`VideoDescriptor`] produced by discovery, and the [`MediaHandle`] that
//! owns a downloaded scratch file while it travels from the acquirer, through
//! the queue, to the player.
//!
//! # Ownership
//!
//! A [`MediaHandle`] is deliberately not `Clone`. Moving it is the only way
//! to hand it on, so exactly one unit holds it at a time and its backing file
//! is removed exactly once: either explicitly through [`MediaHandle::dispose`]
//! or, if it is dropped undisposed (e.g. left in the queue at shutdown), by
//! its `Drop` impl.
//!
//! # Examples
//!
//! ```
//! use common::{Frame, Resolution};
//!
//! let resolution = Resolution::new(96, 48);
//! let frame = Frame::blank(resolution);
//! assert_eq!(frame.as_bytes().len(), resolution.frame_len());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Bytes per pixel in the RGB24 layout used throughout the pipeline.
pub const BYTES_PER_PIXEL: usize = 3;

/// Errors produced while building a [`Frame`] from raw bytes.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PixelBufferError {
    #[error("buffer length {actual} does not match {resolution} RGB24 ({expected} bytes)")]
    Length {
        resolution: Resolution,
        expected: usize,
        actual: usize,
    },

    #[error("resolution must be non-zero, got {0}")]
    ZeroSize(Resolution),
}

/// Errors yielded by a frame sequence while it is being drained.
///
/// `Corrupt` affects a single frame and the sequence may continue; `Stream`
/// means the source cannot produce anything further.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("corrupt frame: {0}")]
    Corrupt(String),

    #[error("stream failure: {0}")]
    Stream(String),
}

/// Fixed display dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in one frame
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of bytes in one RGB24 frame
    pub fn frame_len(&self) -> usize {
        self.pixel_count() * BYTES_PER_PIXEL
    }

    /// Number of bytes in one unpadded RGB24 row
    pub fn row_len(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One RGB24 pixel buffer, row-major, no padding between rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    resolution: Resolution,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap raw RGB24 bytes, checking the length against the resolution
    pub fn from_rgb(resolution: Resolution, data: Vec<u8>) -> Result<Self, PixelBufferError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(PixelBufferError::ZeroSize(resolution));
        }

        let expected = resolution.frame_len();
        if data.len() != expected {
            return Err(PixelBufferError::Length {
                resolution,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self { resolution, data })
    }

    /// An all-black frame
    pub fn blank(resolution: Resolution) -> Self {
        Self {
            resolution,
            data: vec![0; resolution.frame_len()],
        }
    }

    /// A frame filled with a single color
    pub fn solid(resolution: Resolution, r: u8, g: u8, b: u8) -> Self {
        let data = [r, g, b]
            .iter()
            .copied()
            .cycle()
            .take(resolution.frame_len())
            .collect();
        Self { resolution, data }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// RGB value at (x, y), `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        let offset = (y as usize * self.resolution.width as usize + x as usize) * BYTES_PER_PIXEL;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }
}

/// A frame as produced by the decoder, with its presentation timestamp when
/// the container provides one.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame: Frame,
    pub timestamp: Option<Duration>,
}

impl DecodedFrame {
    pub fn new(frame: Frame, timestamp: Option<Duration>) -> Self {
        Self { frame, timestamp }
    }
}

/// Metadata for a discovered video, before download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub id: String,

    #[serde(rename = "webpage_url")]
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub view_count: Option<u64>,

    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    /// Upload date as YYYYMMDD
    #[serde(default)]
    pub upload_date: Option<String>,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,
}

impl VideoDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: None,
            view_count: None,
            duration: None,
            upload_date: None,
            width: None,
            height: None,
        }
    }

    /// Width / height, when both are known and non-zero
    pub fn aspect_ratio(&self) -> Option<f64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if h > 0 => Some(w as f64 / h as f64),
            _ => None,
        }
    }
}

/// Exclusive owner of one downloaded video file.
#[derive(Debug)]
pub struct MediaHandle {
    id: String,
    path: PathBuf,
    disposed: bool,
}

impl MediaHandle {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            disposed: false,
        }
    }

    /// Identifier of the video this file was downloaded from
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the backing file. Consumes the handle, so this can only happen once.
    pub fn dispose(mut self) -> io::Result<()> {
        self.disposed = true;
        std::fs::remove_file(&self.path)
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!(
                    "Failed to remove scratch file {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.path.display())
    }
}
