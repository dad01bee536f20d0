//! lowview: plays freshly discovered, rarely watched videos on a small LED panel
//!
//! Two loops share a bounded queue of downloaded files:
//!
//! - [`acquirer`]: background task that finds and downloads videos
//! - [`player`]: foreground thread that decodes, paces and displays them
//!
//! The remaining modules are the pieces they are built from.

mod macros;

pub mod acquirer;
pub mod config;
pub mod discovery;
pub mod display;
pub mod player;
pub mod queue;
pub mod video;
