//! LED panel on a Linux SPI bus
//!
//! The panel controller expects the whole frame as raw RGB24 bytes, row by
//! row, with chip select left alone. The kernel's spidev driver caps a single
//! transfer at its buffer size (4 KiB unless raised), so frames are written
//! in chunks.

use common::{Frame, Resolution};
use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use std::io::Write;
use std::path::PathBuf;

use super::{DisplayError, DisplaySink, check_dimensions};

/// Largest single write handed to spidev
const TRANSFER_CHUNK: usize = 4096;

pub struct SpiDisplay {
    resolution: Resolution,
    device: PathBuf,
    speed_hz: u32,
    mode: u8,
    spi: Option<Spidev>,
}

impl SpiDisplay {
    /// Describe the bus; nothing is opened until `reset`
    pub fn new(resolution: Resolution, device: &str, speed_hz: u32, mode: u8) -> Self {
        Self {
            resolution,
            device: PathBuf::from(device),
            speed_hz,
            mode,
            spi: None,
        }
    }

    fn mode_flags(&self) -> SpiModeFlags {
        let mode = match self.mode {
            0 => SpiModeFlags::SPI_MODE_0,
            1 => SpiModeFlags::SPI_MODE_1,
            2 => SpiModeFlags::SPI_MODE_2,
            _ => SpiModeFlags::SPI_MODE_3,
        };
        mode | SpiModeFlags::SPI_NO_CS
    }

    fn open_bus(&self) -> Result<Spidev, DisplayError> {
        let mut spi = Spidev::open(&self.device)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(self.speed_hz)
            .mode(self.mode_flags())
            .build();
        spi.configure(&options)?;
        Ok(spi)
    }

    fn transfer(spi: &mut Spidev, data: &[u8]) -> Result<(), DisplayError> {
        for chunk in data.chunks(TRANSFER_CHUNK) {
            spi.write_all(chunk)?;
        }
        Ok(())
    }
}

impl DisplaySink for SpiDisplay {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn write(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        check_dimensions(self.resolution, frame)?;
        let spi = self.spi.as_mut().ok_or(DisplayError::NotReady)?;
        Self::transfer(spi, frame.as_bytes())
    }

    fn reset(&mut self) -> Result<(), DisplayError> {
        // Close the old handle before reopening the device
        self.spi = None;

        log::info!(
            "Initializing panel on {} (mode {}, {} Hz, {})",
            self.device.display(),
            self.mode,
            self.speed_hz,
            self.resolution
        );
        let mut spi = self.open_bus()?;
        Self::transfer(&mut spi, Frame::blank(self.resolution).as_bytes())?;
        self.spi = Some(spi);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_before_reset_is_not_ready() {
        let res = Resolution::new(96, 48);
        let mut display = SpiDisplay::new(res, "/dev/spidev0.1", 16_000_000, 3);
        assert!(matches!(
            display.write(&Frame::blank(res)),
            Err(DisplayError::NotReady)
        ));
    }

    #[test]
    fn test_reset_fails_without_device() {
        let res = Resolution::new(96, 48);
        let mut display = SpiDisplay::new(res, "/nonexistent/spidev9.9", 16_000_000, 3);
        assert!(matches!(display.reset(), Err(DisplayError::Transport(_))));
    }

    #[test]
    fn test_mode_flags_disable_chip_select() {
        let display = SpiDisplay::new(Resolution::new(1, 1), "/dev/null", 1_000_000, 0);
        let flags = display.mode_flags();
        assert!(flags.contains(SpiModeFlags::SPI_NO_CS));
        assert!(!flags.contains(SpiModeFlags::SPI_CPOL));
    }
}
