use common::{Frame, Resolution};
use image::{ImageFormat, RgbImage, imageops};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{DisplayError, DisplaySink, check_dimensions};

/// Each panel pixel becomes a block this many pixels wide in the snapshot
const PREVIEW_SCALE: u32 = 8;

/// Stand-in for the panel that snapshots the latest frame to a PNG file
#[derive(Debug)]
pub struct PreviewDisplay {
    resolution: Resolution,
    path: PathBuf,
    interval: Duration,
    last_saved: Option<Instant>,
}

impl PreviewDisplay {
    pub fn new(resolution: Resolution, path: PathBuf, interval: Duration) -> Self {
        Self {
            resolution,
            path,
            interval,
            last_saved: None,
        }
    }

    fn save(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let Resolution { width, height } = self.resolution;
        let image = RgbImage::from_raw(width, height, frame.as_bytes().to_vec())
            .ok_or_else(|| std::io::Error::other("frame buffer smaller than image"))?;
        let scaled = imageops::resize(
            &image,
            width * PREVIEW_SCALE,
            height * PREVIEW_SCALE,
            imageops::FilterType::Nearest,
        );

        // Write next to the target and rename, so viewers never see half a file
        let tmp = self.path.with_extension("png.tmp");
        scaled.save_with_format(&tmp, ImageFormat::Png)?;
        std::fs::rename(&tmp, &self.path)?;

        self.last_saved = Some(Instant::now());
        Ok(())
    }
}

impl DisplaySink for PreviewDisplay {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn write(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        check_dimensions(self.resolution, frame)?;

        let due = self
            .last_saved
            .is_none_or(|saved| saved.elapsed() >= self.interval);
        if due {
            self.save(frame)?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DisplayError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.save(&Frame::blank(self.resolution))
    }
}
