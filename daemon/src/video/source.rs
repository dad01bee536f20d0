//! GStreamer-backed frame source
//!
//! Frames are pulled from the appsink one at a time. The appsink holds at
//! most a few buffers, so a source that is not being pulled stalls its
//! decoder instead of buffering the whole file.

use common::{DecodedFrame, Frame, FrameError, MediaHandle, Resolution};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::time::Duration;

use super::{DecodeError, Decoder, FrameSource, pipeline};

/// How long `open` waits for the pipeline to preroll
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a pull may block before the stream is considered stalled
const PULL_TIMEOUT: Duration = Duration::from_secs(2);

/// Decoder that opens files through GStreamer
#[derive(Debug)]
pub struct GstDecoder {
    _private: (),
}

impl GstDecoder {
    pub fn new() -> Result<Self, DecodeError> {
        pipeline::initialize_gstreamer()?;
        Ok(Self { _private: () })
    }
}

impl Decoder for GstDecoder {
    type Source = GstFrameSource;

    fn open(
        &mut self,
        handle: &MediaHandle,
        resolution: Resolution,
    ) -> Result<Self::Source, DecodeError> {
        let path = handle.path();
        let open_error = |reason: String| DecodeError::Open {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(open_error("file does not exist".to_string()));
        }

        let (pipeline, app_sink) = pipeline::build_pipeline(path, resolution)?;
        pipeline::configure_app_sink(&app_sink);

        // Wrap immediately so the pipeline is torn down on every error path
        let mut source = GstFrameSource {
            pipeline,
            app_sink,
            resolution,
            nominal_fps: None,
            finished: false,
        };

        source
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| {
                open_error(
                    pipeline::take_bus_error(&source.pipeline).unwrap_or_else(|| e.to_string()),
                )
            })?;

        let (result, _, _) = source
            .pipeline
            .state(Some(gst::ClockTime::from_nseconds(OPEN_TIMEOUT.as_nanos() as u64)));
        if let Err(e) = result {
            return Err(open_error(
                pipeline::take_bus_error(&source.pipeline).unwrap_or_else(|| e.to_string()),
            ));
        }

        source.nominal_fps = source.detect_fps();
        log::debug!(
            "Opened {} at {} ({} fps)",
            path.display(),
            resolution,
            source
                .nominal_fps
                .map(|fps| format!("{:.2}", fps))
                .unwrap_or_else(|| "unknown".to_string())
        );

        Ok(source)
    }
}

/// Pull iterator over a running decode pipeline
pub struct GstFrameSource {
    pipeline: gst::Pipeline,
    app_sink: gst_app::AppSink,
    resolution: Resolution,
    nominal_fps: Option<f64>,
    finished: bool,
}

impl GstFrameSource {
    /// Read the negotiated frame rate from the appsink caps
    fn detect_fps(&self) -> Option<f64> {
        let caps = self.app_sink.static_pad("sink")?.current_caps()?;
        let info = gst_video::VideoInfo::from_caps(&caps).ok()?;
        let fps = info.fps();
        if fps.numer() <= 0 || fps.denom() <= 0 {
            return None;
        }
        Some(fps.numer() as f64 / fps.denom() as f64)
    }

    /// Copy one sample out of GStreamer memory, dropping any row padding
    fn convert(&self, sample: &gst::Sample) -> Result<DecodedFrame, FrameError> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| FrameError::Corrupt("sample without buffer".to_string()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| FrameError::Corrupt("sample without caps".to_string()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| FrameError::Corrupt(format!("unreadable caps: {}", e)))?;

        if info.width() != self.resolution.width || info.height() != self.resolution.height {
            return Err(FrameError::Corrupt(format!(
                "decoded {}x{}, expected {}",
                info.width(),
                info.height(),
                self.resolution
            )));
        }

        let map = buffer
            .map_readable()
            .map_err(|e| FrameError::Corrupt(format!("unmappable buffer: {}", e)))?;
        let data = repack_rows(map.as_slice(), info.stride()[0] as usize, self.resolution)?;

        let frame = Frame::from_rgb(self.resolution, data)
            .map_err(|e| FrameError::Corrupt(e.to_string()))?;
        let timestamp = buffer.pts().map(|pts| Duration::from_nanos(pts.nseconds()));

        Ok(DecodedFrame::new(frame, timestamp))
    }

    fn stream_error(&self, fallback: &str) -> FrameError {
        FrameError::Stream(
            pipeline::take_bus_error(&self.pipeline).unwrap_or_else(|| fallback.to_string()),
        )
    }
}

impl Iterator for GstFrameSource {
    type Item = Result<DecodedFrame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let timeout = gst::ClockTime::from_nseconds(PULL_TIMEOUT.as_nanos() as u64);
        match self.app_sink.try_pull_sample(timeout) {
            Some(sample) => Some(self.convert(&sample)),
            None => {
                self.finished = true;
                if let Some(err) = pipeline::take_bus_error(&self.pipeline) {
                    Some(Err(FrameError::Stream(err)))
                } else if self.app_sink.is_eos() {
                    None
                } else {
                    Some(Err(self.stream_error("decoder stalled")))
                }
            }
        }
    }
}

impl FrameSource for GstFrameSource {
    fn nominal_fps(&self) -> Option<f64> {
        self.nominal_fps
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        pipeline::shutdown(&self.pipeline);
    }
}

/// Strip per-row stride padding from a packed RGB buffer
fn repack_rows(data: &[u8], stride: usize, resolution: Resolution) -> Result<Vec<u8>, FrameError> {
    let row_len = resolution.row_len();
    let rows = resolution.height as usize;

    if rows == 0 || stride < row_len || data.len() < stride * (rows - 1) + row_len {
        return Err(FrameError::Corrupt(format!(
            "buffer of {} bytes too small for {} (stride {})",
            data.len(),
            resolution,
            stride
        )));
    }

    if stride == row_len {
        return Ok(data[..row_len * rows].to_vec());
    }

    let mut packed = Vec::with_capacity(resolution.frame_len());
    for row in data.chunks(stride).take(rows) {
        packed.extend_from_slice(&row[..row_len]);
    }
    Ok(packed)
}
