//! Display sinks
//!
//! The player pushes one frame at a time into a [`DisplaySink`]. Sinks only
//! accept frames of the resolution they were created with; anything else is
//! rejected with [`DisplayError::Dimensions`] and never reaches the hardware.
//! Errors from `write` are reported to the caller, which logs them and keeps
//! going. `reset` is called once at startup and its failure is fatal.
//!
//! - `spi`: the LED panel on an SPI bus (feature `hardware`)
//! - `preview`: periodic PNG snapshots, for running without hardware
//! - `null`: accepts and counts frames

mod null;
mod preview;
#[cfg(feature = "hardware")]
mod spi;

pub use null::NullDisplay;
pub use preview::PreviewDisplay;
#[cfg(feature = "hardware")]
pub use spi::SpiDisplay;

use anyhow::Result;
use common::{Frame, Resolution};
use thiserror::Error;

use crate::config::{DisplaySettings, expand_path};

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("frame is {actual}, display is {expected}")]
    Dimensions {
        expected: Resolution,
        actual: Resolution,
    },

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("display not initialized")]
    NotReady,
}

/// Something that shows frames
pub trait DisplaySink: Send {
    /// The only resolution this sink accepts
    fn resolution(&self) -> Resolution;

    /// Show one frame
    fn write(&mut self, frame: &Frame) -> Result<(), DisplayError>;

    /// Reinitialize the device. Only called at startup.
    fn reset(&mut self) -> Result<(), DisplayError>;
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }

    fn write(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        (**self).write(frame)
    }

    fn reset(&mut self) -> Result<(), DisplayError> {
        (**self).reset()
    }
}

/// Reject frames that do not match the display
pub fn check_dimensions(expected: Resolution, frame: &Frame) -> Result<(), DisplayError> {
    let actual = frame.resolution();
    if actual != expected {
        return Err(DisplayError::Dimensions { expected, actual });
    }
    Ok(())
}

/// Create the sink selected in the configuration
pub fn open(settings: &DisplaySettings) -> Result<Box<dyn DisplaySink>> {
    let resolution = settings.resolution();
    match settings.sink.as_str() {
        "spi" => open_spi(settings),
        "preview" => {
            let path = expand_path(&settings.preview_path)?;
            log::info!("Preview display writing to {}", path.display());
            Ok(Box::new(PreviewDisplay::new(
                resolution,
                path,
                settings.preview_interval(),
            )))
        }
        "null" => Ok(Box::new(NullDisplay::new(resolution))),
        other => anyhow::bail!("Unknown display sink: {}", other),
    }
}

#[cfg(feature = "hardware")]
fn open_spi(settings: &DisplaySettings) -> Result<Box<dyn DisplaySink>> {
    Ok(Box::new(SpiDisplay::new(
        settings.resolution(),
        &settings.spi_device,
        settings.spi_speed_hz,
        settings.spi_mode,
    )))
}

#[cfg(not(feature = "hardware"))]
fn open_spi(_settings: &DisplaySettings) -> Result<Box<dyn DisplaySink>> {
    anyhow::bail!("SPI display support not compiled in (build with --features hardware)")
}
