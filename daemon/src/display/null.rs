use common::{Frame, Resolution};

use super::{DisplayError, DisplaySink, check_dimensions};

/// Discards frames after checking them. Useful for dry runs.
#[derive(Debug)]
pub struct NullDisplay {
    resolution: Resolution,
    frames: u64,
}

impl NullDisplay {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            frames: 0,
        }
    }

    /// Frames accepted since the last reset
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl DisplaySink for NullDisplay {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn write(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        check_dimensions(self.resolution, frame)?;
        self.frames += 1;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DisplayError> {
        self.frames = 0;
        Ok(())
    }
}
