//! GStreamer pipeline setup and configuration
//!
//! This module handles the creation and configuration of GStreamer pipelines
//! that decode a file to raw RGB frames at the display resolution.

use common::Resolution;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::path::Path;
use std::sync::OnceLock;

use super::DecodeError;

/// Frames buffered inside the appsink before the decoder stalls
const MAX_QUEUED_BUFFERS: u32 = 4;

/// Initialize GStreamer (idempotent, safe to call multiple times)
pub fn initialize_gstreamer() -> Result<(), DecodeError> {
    static GSTREAMER_INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

    GSTREAMER_INITIALIZED
        .get_or_init(|| {
            gst::init().map_err(|e| e.to_string())?;
            log::info!("GStreamer initialized");
            Ok(())
        })
        .clone()
        .map_err(DecodeError::Backend)
}

/// Pipeline description for one file
///
/// `decodebin` picks whatever demuxer and decoder the file needs, then
/// `videoconvert` and `videoscale` produce packed RGB at exactly the panel
/// resolution with square pixels.
pub fn pipeline_description(path: &Path, resolution: Resolution) -> String {
    format!(
        "filesrc location=\"{}\" ! decodebin ! videoconvert ! videoscale ! \
         video/x-raw,format=RGB,width={},height={},pixel-aspect-ratio=1/1 ! \
         appsink name=sink",
        path.display(),
        resolution.width,
        resolution.height
    )
}

/// Build a decode pipeline for `path`
///
/// # Returns
///
/// Tuple of (pipeline, app_sink) where app_sink hands out decoded frames
pub fn build_pipeline(
    path: &Path,
    resolution: Resolution,
) -> Result<(gst::Pipeline, gst_app::AppSink), DecodeError> {
    log::debug!("Creating GStreamer pipeline for: {}", path.display());

    let description = pipeline_description(path, resolution);
    log::trace!("GStreamer pipeline: {}", description);

    let pipeline = gst::parse::launch(&description)
        .map_err(|e| DecodeError::Backend(format!("failed to create pipeline: {}", e)))?
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| DecodeError::Backend("pipeline is not a gst::Pipeline".to_string()))?;

    let app_sink = pipeline
        .by_name("sink")
        .ok_or_else(|| DecodeError::Backend("failed to get appsink from pipeline".to_string()))?
        .dynamic_cast::<gst_app::AppSink>()
        .map_err(|_| DecodeError::Backend("sink is not an AppSink".to_string()))?;

    Ok((pipeline, app_sink))
}

/// Configure AppSink for pull-driven delivery
///
/// - `sync=false`: the player paces frames itself, so hand them out as soon
///   as they are decoded
/// - `drop=false`: never discard frames; a full appsink blocks the decoder
///   until the player pulls again
pub fn configure_app_sink(app_sink: &gst_app::AppSink) {
    app_sink.set_property("emit-signals", false);
    app_sink.set_property("sync", false);
    app_sink.set_property("max-buffers", MAX_QUEUED_BUFFERS);
    app_sink.set_property("drop", false);
}

/// Pop the first error waiting on the pipeline bus, if any
pub fn take_bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
        if let gst::MessageView::Error(err) = msg.view() {
            return Some(format!("{} (debug: {:?})", err.error(), err.debug()));
        }
    }
    None
}

/// Stop the pipeline and wait briefly for it to settle
pub fn shutdown(pipeline: &gst::Pipeline) {
    match pipeline.set_state(gst::State::Null) {
        Ok(_) => {
            let (result, current, _) = pipeline.state(Some(gst::ClockTime::from_seconds(2)));
            if let Err(e) = result {
                log::warn!("Pipeline did not reach Null (now {:?}): {:?}", current, e);
            }
        }
        Err(e) => {
            log::warn!("Failed to set pipeline state to Null: {}", e);
        }
    }

    // Drain pending messages from bus
    if let Some(bus) = pipeline.bus() {
        let mut drained = 0;
        while bus.pop().is_some() {
            drained += 1;
        }
        if drained > 0 {
            log::trace!("Drained {} pending messages from bus", drained);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_description_targets_panel() {
        let desc = pipeline_description(Path::new("/tmp/clip one.mp4"), Resolution::new(96, 48));
        assert!(desc.starts_with("filesrc location=\"/tmp/clip one.mp4\""));
        assert!(desc.contains("format=RGB,width=96,height=48"));
        assert!(desc.ends_with("appsink name=sink"));
    }
}
