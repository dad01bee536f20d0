//! Video decoding for the player
//!
//! A [`Decoder`] opens a downloaded file and returns a [`FrameSource`]: a
//! single-pass, pull-based sequence of frames already scaled to the display
//! resolution and converted to RGB24. Pulling drives the decoder, so frames
//! never pile up in memory; dropping the source releases the decoder.
//!
//! - `pipeline`: GStreamer pipeline setup and configuration
//! - `source`: the GStreamer-backed frame iterator
//! - `stats`: per-session playback counters
//!
//! # Errors
//!
//! Items are `Result<DecodedFrame, FrameError>`. A `Corrupt` item stands in
//! for one frame that could not be converted and the sequence carries on
//! after it. A `Stream` item is the last thing a source yields.

#[cfg(feature = "video")]
mod pipeline;
#[cfg(feature = "video")]
mod source;
pub mod stats;

#[cfg(feature = "video")]
pub use source::GstDecoder;

#[cfg(not(feature = "video"))]
pub use decoder_stub::GstDecoder;

use common::{DecodedFrame, FrameError, MediaHandle, Resolution};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to start decoding a file at all
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("decoder backend error: {0}")]
    Backend(String),

    #[error("video support not compiled in")]
    Unsupported,
}

/// A lazy, single-pass sequence of decoded frames
pub trait FrameSource: Iterator<Item = Result<DecodedFrame, FrameError>> {
    /// Frame rate advertised by the container, used for frames that carry
    /// no timestamp
    fn nominal_fps(&self) -> Option<f64>;
}

/// Opens media handles as frame sources
pub trait Decoder: Send {
    type Source: FrameSource;

    fn open(
        &mut self,
        handle: &MediaHandle,
        resolution: Resolution,
    ) -> Result<Self::Source, DecodeError>;
}

#[cfg(not(feature = "video"))]
mod decoder_stub {
    use super::{DecodeError, Decoder, FrameSource};
    use common::{DecodedFrame, FrameError, MediaHandle, Resolution};

    /// Stub decoder when the video feature is disabled
    #[derive(Debug, Default)]
    pub struct GstDecoder;

    /// Never constructed; exists to satisfy the `Decoder` signature
    pub struct NoFrames;

    impl Iterator for NoFrames {
        type Item = Result<DecodedFrame, FrameError>;

        fn next(&mut self) -> Option<Self::Item> {
            None
        }
    }

    impl FrameSource for NoFrames {
        fn nominal_fps(&self) -> Option<f64> {
            None
        }
    }

    impl GstDecoder {
        pub fn new() -> Result<Self, DecodeError> {
            Ok(Self)
        }
    }

    impl Decoder for GstDecoder {
        type Source = NoFrames;

        fn open(
            &mut self,
            _handle: &MediaHandle,
            _resolution: Resolution,
        ) -> Result<Self::Source, DecodeError> {
            Err(DecodeError::Unsupported)
        }
    }
}
