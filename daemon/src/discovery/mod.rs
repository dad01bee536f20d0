//! Video discovery and download collaborators
//!
//! The acquirer only knows these two traits. [`Discovery`] yields one
//! validated [`VideoDescriptor`] per call (or reports that a round found
//! nothing), and [`Downloader`] turns a descriptor into a local
//! [`MediaHandle`]. Both may take an arbitrarily long time; neither is ever
//! shared between units.
//!
//! - `filter`: candidate validation rules (views, length, age, shape)
//! - `ytdlp`: both traits implemented on top of the `yt-dlp` executable

pub mod filter;
pub mod ytdlp;

pub use ytdlp::YtDlp;

use common::{MediaHandle, VideoDescriptor};
use std::future::Future;
use thiserror::Error;

/// Routine acquisition failures. None of these are fatal: the acquirer backs
/// off and starts over with a fresh candidate.
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("no suitable candidate after {attempts} attempts")]
    NoCandidate { attempts: u32 },

    #[error("{program} exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("download of {id} failed: {reason}")]
    Download { id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Finds the next video worth playing
pub trait Discovery: Send {
    fn find_candidate(
        &mut self,
    ) -> impl Future<Output = Result<VideoDescriptor, AcquireError>> + Send;
}

/// Fetches a discovered video into local scratch storage
pub trait Downloader: Send {
    fn fetch(
        &mut self,
        descriptor: &VideoDescriptor,
    ) -> impl Future<Output = Result<MediaHandle, AcquireError>> + Send;
}
