//! `yt-dlp` backed discovery and download
//!
//! Discovery searches for a random, date-sorted camera-default file name
//! (`IMG 0421` and friends), which surfaces recent uploads nobody has watched
//! yet. Each candidate goes through the cheap checks on the flat search
//! result first, and only survivors get a full metadata extraction.

use chrono::Local;
use common::{MediaHandle, VideoDescriptor};
use rand::Rng;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::filter::{self, Rejection, SearchEntry};
use super::{AcquireError, Discovery, Downloader};
use crate::config::DiscoverySettings;
use crate::log_and_continue;

/// Highest number used in generated search queries
const QUERY_RANGE: u32 = 7000;

/// How many handed-out IDs are remembered before the oldest are forgotten
const SEEN_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    entries: Vec<SearchEntry>,
}

/// Recently handed-out video IDs, oldest evicted first
#[derive(Debug)]
struct SeenIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    limit: usize,
}

impl SeenIds {
    fn new(limit: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            limit,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: String) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Discovery and download through the `yt-dlp` command line tool
pub struct YtDlp {
    settings: DiscoverySettings,
    scratch_dir: PathBuf,
    /// IDs already handed out during this run
    seen: SeenIds,
}

impl YtDlp {
    /// Create the collaborator, making sure the scratch directory exists
    pub fn new(settings: DiscoverySettings) -> Result<Self, AcquireError> {
        let scratch_dir = settings
            .scratch_path()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        std::fs::create_dir_all(&scratch_dir)?;

        log::info!(
            "yt-dlp discovery ready (binary: {}, scratch: {})",
            settings.yt_dlp,
            scratch_dir.display()
        );

        Ok(Self {
            settings,
            scratch_dir,
            seen: SeenIds::new(SEEN_LIMIT),
        })
    }

    /// Delete clips left behind by an earlier run. Returns how many were removed.
    pub fn purge_scratch(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.scratch_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "mp4") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Build a search query for one random file-name number
    pub fn random_query(&self) -> String {
        let number = rand::rng().random_range(0..=QUERY_RANGE);
        search_query(&self.settings.query_prefix, number)
    }

    fn scratch_file(&self, id: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}.mp4", id))
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>, AcquireError> {
        log::trace!("{} {}", self.settings.yt_dlp, args.join(" "));

        let output = Command::new(&self.settings.yt_dlp)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(AcquireError::Tool {
                program: self.settings.yt_dlp.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[String]) -> Result<T, AcquireError> {
        let stdout = self.run(args).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    /// Search once and return the newest matching upload, if any
    async fn search(&self) -> Result<Option<SearchEntry>, AcquireError> {
        let query = self.random_query();
        log::debug!("Searching: {}", query);

        let args = vec![
            "--dump-single-json".to_string(),
            "--flat-playlist".to_string(),
            "--no-warnings".to_string(),
            query,
        ];
        let result: SearchResult = self.run_json(&args).await?;
        Ok(result.entries.into_iter().next())
    }

    async fn extract(&self, url: &str) -> Result<VideoDescriptor, AcquireError> {
        let args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ];
        self.run_json(&args).await
    }

    async fn try_candidate(&self) -> Result<Result<VideoDescriptor, Rejection>, AcquireError> {
        let Some(entry) = self.search().await? else {
            return Err(AcquireError::NoCandidate { attempts: 1 });
        };

        if self.seen.contains(&entry.id) {
            return Ok(Err(Rejection::Seen));
        }
        if let Err(rejection) = filter::check_entry(&entry, &self.settings) {
            return Ok(Err(rejection));
        }

        let descriptor = self.extract(&entry.url).await?;
        let today = Local::now().date_naive();
        Ok(filter::check_descriptor(&descriptor, &self.settings, today).map(|()| descriptor))
    }
}

impl Discovery for YtDlp {
    async fn find_candidate(&mut self) -> Result<VideoDescriptor, AcquireError> {
        for attempt in 1..=self.settings.max_attempts {
            match self.try_candidate().await {
                Ok(Ok(descriptor)) => {
                    log::info!(
                        "Found candidate {} ({} views) after {} attempt(s)",
                        descriptor.id,
                        descriptor.view_count.unwrap_or(0),
                        attempt
                    );
                    self.seen.insert(descriptor.id.clone());
                    log::trace!("{} video IDs remembered", self.seen.len());
                    return Ok(descriptor);
                }
                Ok(Err(rejection)) => {
                    log::debug!("Candidate rejected: {}", rejection);
                }
                Err(AcquireError::NoCandidate { .. }) => {
                    log::debug!("Search returned no entries");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AcquireError::NoCandidate {
            attempts: self.settings.max_attempts,
        })
    }
}

impl Downloader for YtDlp {
    async fn fetch(&mut self, descriptor: &VideoDescriptor) -> Result<MediaHandle, AcquireError> {
        let path = self.scratch_file(&descriptor.id);
        let args = download_args(&self.settings, &path, &descriptor.url);

        log::info!("Downloading {} to {}", descriptor.id, path.display());

        if let Err(e) = self.run(&args).await {
            // Partial downloads are useless, clean up whatever was left
            log_and_continue!(
                remove_partial(&path).await,
                format!("remove partial download {}", path.display())
            );
            return Err(AcquireError::Download {
                id: descriptor.id.clone(),
                reason: e.to_string(),
            });
        }

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => Ok(MediaHandle::new(descriptor.id.clone(), path)),
            Ok(_) => {
                log_and_continue!(
                    remove_partial(&path).await,
                    format!("remove empty download {}", path.display())
                );
                Err(AcquireError::Download {
                    id: descriptor.id.clone(),
                    reason: "downloaded file is empty".to_string(),
                })
            }
            Err(e) => Err(AcquireError::Download {
                id: descriptor.id.clone(),
                reason: format!("expected output {} missing: {}", path.display(), e),
            }),
        }
    }
}

/// Remove a failed download; a file that never appeared is not an error
async fn remove_partial(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

fn search_query(prefix: &str, number: u32) -> String {
    format!("ytsearchdate1:{} {:04}", prefix, number)
}

fn download_args(settings: &DiscoverySettings, path: &Path, url: &str) -> Vec<String> {
    vec![
        "--format".to_string(),
        settings.format.clone(),
        "--no-playlist".to_string(),
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        "--force-overwrites".to_string(),
        "--download-sections".to_string(),
        format!("*0-{}", settings.clip_secs),
        "--output".to_string(),
        path.display().to_string(),
        url.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_zero_padded() {
        assert_eq!(search_query("IMG", 7), "ytsearchdate1:IMG 0007");
        assert_eq!(search_query("MOV", 6999), "ytsearchdate1:MOV 6999");
    }

    #[test]
    fn test_seen_ids_forget_oldest() {
        let mut seen = SeenIds::new(2);
        seen.insert("a".to_string());
        seen.insert("b".to_string());
        seen.insert("a".to_string());
        assert_eq!(seen.len(), 2);

        seen.insert("c".to_string());
        assert_eq!(seen.len(), 2);
        assert!(!seen.contains("a"));
        assert!(seen.contains("b"));
        assert!(seen.contains("c"));
    }

    #[test]
    fn test_purge_scratch_removes_only_clips() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DiscoverySettings {
            scratch_dir: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let ytdlp = YtDlp::new(settings).unwrap();
        std::fs::write(dir.path().join("old.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        assert_eq!(ytdlp.purge_scratch().unwrap(), 1);
        assert!(!dir.path().join("old.mp4").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_download_args() {
        let settings = DiscoverySettings::default();
        let args = download_args(
            &settings,
            Path::new("/tmp/scratch/abc.mp4"),
            "https://www.youtube.com/watch?v=abc",
        );

        let section = args.iter().position(|a| a == "--download-sections").unwrap();
        assert_eq!(args[section + 1], "*0-10");
        let format = args.iter().position(|a| a == "--format").unwrap();
        assert_eq!(args[format + 1], "worstvideo");
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_search_result_parsing() {
        let json = r#"{
            "_type": "playlist",
            "entries": [
                {"id": "a1", "url": "https://www.youtube.com/watch?v=a1", "view_count": 2, "duration": 31.0},
                {"id": "b2", "url": "https://www.youtube.com/watch?v=b2"}
            ]
        }"#;
        let result: SearchResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].view_count, Some(2));
        assert_eq!(result.entries[1].duration, None);
    }

    #[test]
    fn test_new_creates_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("nested").join("scratch");
        let settings = DiscoverySettings {
            scratch_dir: scratch.display().to_string(),
            ..Default::default()
        };

        let ytdlp = YtDlp::new(settings).unwrap();
        assert!(scratch.is_dir());
        assert_eq!(ytdlp.scratch_file("xyz"), scratch.join("xyz.mp4"));
        assert!(ytdlp.random_query().starts_with("ytsearchdate1:IMG "));
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DiscoverySettings {
            yt_dlp: "/nonexistent/yt-dlp".to_string(),
            scratch_dir: dir.path().display().to_string(),
            max_attempts: 2,
            ..Default::default()
        };

        let mut ytdlp = YtDlp::new(settings).unwrap();
        assert!(matches!(
            ytdlp.find_candidate().await,
            Err(AcquireError::Io(_))
        ));

        let desc = VideoDescriptor::new("abc", "https://www.youtube.com/watch?v=abc");
        assert!(matches!(
            ytdlp.fetch(&desc).await,
            Err(AcquireError::Download { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_download_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DiscoverySettings {
            yt_dlp: "/nonexistent/yt-dlp".to_string(),
            scratch_dir: dir.path().display().to_string(),
            ..Default::default()
        };
        let mut ytdlp = YtDlp::new(settings).unwrap();
        let partial = ytdlp.scratch_file("abc");
        std::fs::write(&partial, b"half a video").unwrap();

        let desc = VideoDescriptor::new("abc", "https://www.youtube.com/watch?v=abc");
        assert!(ytdlp.fetch(&desc).await.is_err());
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_empty_download_removed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DiscoverySettings {
            // Exits successfully without writing anything
            yt_dlp: "true".to_string(),
            scratch_dir: dir.path().display().to_string(),
            ..Default::default()
        };
        let mut ytdlp = YtDlp::new(settings).unwrap();
        let output = ytdlp.scratch_file("empty");
        std::fs::write(&output, b"").unwrap();

        let desc = VideoDescriptor::new("empty", "https://www.youtube.com/watch?v=empty");
        let err = ytdlp.fetch(&desc).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_remove_partial_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_partial(&dir.path().join("never.mp4")).await.is_ok());
    }
}
