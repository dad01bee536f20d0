use chrono::NaiveDate;
use common::VideoDescriptor;
use serde::Deserialize;
use thiserror::Error;

use crate::config::DiscoverySettings;

/// One entry of a flat (unprocessed) search result
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEntry {
    pub id: String,
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub view_count: Option<u64>,

    #[serde(default)]
    pub duration: Option<f64>,
}

/// Why a candidate was passed over
#[derive(Error, Debug, PartialEq)]
pub enum Rejection {
    #[error("already played")]
    Seen,

    #[error("too many views ({0})")]
    TooPopular(u64),

    #[error("view count unknown")]
    UnknownViews,

    #[error("video is a short")]
    Short,

    #[error("too short ({0:.0}s)")]
    TooShort(f64),

    #[error("too long ({0:.0}s)")]
    TooLong(f64),

    #[error("duration unknown")]
    UnknownDuration,

    #[error("too old ({0} days)")]
    TooOld(i64),

    #[error("upload date missing or malformed")]
    UnknownAge,

    #[error("too tall (aspect {0:.2})")]
    TooTall(f64),

    #[error("dimensions unknown")]
    UnknownShape,
}

/// Cheap checks on a search result before fetching full metadata
pub fn check_entry(entry: &SearchEntry, settings: &DiscoverySettings) -> Result<(), Rejection> {
    match entry.view_count {
        Some(views) if views > settings.max_views => return Err(Rejection::TooPopular(views)),
        Some(_) => {}
        None => return Err(Rejection::UnknownViews),
    }

    if entry.url.contains("/shorts/") {
        return Err(Rejection::Short);
    }

    check_duration(entry.duration, settings)
}

/// Checks that need the fully extracted metadata
pub fn check_descriptor(
    descriptor: &VideoDescriptor,
    settings: &DiscoverySettings,
    today: NaiveDate,
) -> Result<(), Rejection> {
    check_duration(descriptor.duration, settings)?;

    let uploaded = descriptor
        .upload_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
        .ok_or(Rejection::UnknownAge)?;
    let age = (today - uploaded).num_days();
    if age > settings.max_age_days {
        return Err(Rejection::TooOld(age));
    }

    let aspect = descriptor.aspect_ratio().ok_or(Rejection::UnknownShape)?;
    if aspect < settings.min_aspect_ratio {
        return Err(Rejection::TooTall(aspect));
    }

    Ok(())
}

fn check_duration(duration: Option<f64>, settings: &DiscoverySettings) -> Result<(), Rejection> {
    let duration = duration.ok_or(Rejection::UnknownDuration)?;
    if duration < settings.min_duration_secs as f64 {
        return Err(Rejection::TooShort(duration));
    }
    if duration > settings.max_duration_secs as f64 {
        return Err(Rejection::TooLong(duration));
    }
    Ok(())
}
