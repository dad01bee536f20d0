//! Background acquisition loop
//!
//! Keeps the queue topped up: discover, download, enqueue, repeat. When the
//! queue is full the loop polls on a fixed interval instead of fetching,
//! because a discovery or download call cannot be interrupted once started.
//! Failures are routine here and only ever cost time.

use common::MediaHandle;
use std::time::Duration;

use crate::config::AcquirerSettings;
use crate::discovery::{AcquireError, Discovery, Downloader};
use crate::queue::{OfferError, QueueProducer};

/// Doubling retry delay with a ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following one will be twice as long, up to the ceiling
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Start over from the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquirerStats {
    pub acquired: u64,
    pub discovery_failures: u64,
    pub download_failures: u64,
}

/// Producer half of the pipeline
pub struct Acquirer<D, F> {
    discovery: D,
    downloader: F,
    queue: QueueProducer,
    poll_interval: Duration,
    backoff: Backoff,
    stats: AcquirerStats,
}

impl<D: Discovery, F: Downloader> Acquirer<D, F> {
    pub fn new(
        discovery: D,
        downloader: F,
        queue: QueueProducer,
        settings: &AcquirerSettings,
    ) -> Self {
        Self {
            discovery,
            downloader,
            queue,
            poll_interval: settings.poll_interval(),
            backoff: Backoff::new(settings.backoff_initial(), settings.backoff_max()),
            stats: AcquirerStats::default(),
        }
    }

    /// Run until the queue's consumer goes away
    pub async fn run(mut self) -> AcquirerStats {
        log::info!(
            "Acquirer started (queue capacity {}, poll every {}ms)",
            self.queue.capacity(),
            self.poll_interval.as_millis()
        );

        loop {
            if self.queue.is_closed() {
                break;
            }

            if self.queue.is_full() {
                log::trace!("Queue full, waiting");
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            let descriptor = match self.discovery.find_candidate().await {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    self.stats.discovery_failures += 1;
                    self.back_off("Discovery", &e).await;
                    continue;
                }
            };

            let handle = match self.downloader.fetch(&descriptor).await {
                Ok(handle) => handle,
                Err(e) => {
                    self.stats.download_failures += 1;
                    self.back_off("Download", &e).await;
                    continue;
                }
            };

            self.backoff.reset();
            if !self.enqueue(handle).await {
                break;
            }
            self.stats.acquired += 1;
        }

        log::info!(
            "Acquirer stopped: {} acquired, {} discovery failures, {} download failures",
            self.stats.acquired,
            self.stats.discovery_failures,
            self.stats.download_failures
        );
        self.stats
    }

    async fn back_off(&mut self, stage: &str, error: &AcquireError) {
        let delay = self.backoff.next_delay();
        log::warn!(
            "{} failed: {} (retrying in {}ms)",
            stage,
            error,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }

    /// Hand a handle to the queue, waiting out a full queue. Returns false if
    /// the consumer is gone, in which case the handle is dropped and its file
    /// removed.
    async fn enqueue(&self, mut handle: MediaHandle) -> bool {
        let id = handle.id().to_string();
        loop {
            match self.queue.offer(handle) {
                Ok(()) => {
                    log::info!(
                        "Queued video {} ({}/{})",
                        id,
                        self.queue.len(),
                        self.queue.capacity()
                    );
                    return true;
                }
                Err(OfferError::Full(rejected)) => {
                    handle = rejected;
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(OfferError::Closed(rejected)) => {
                    log::info!("Player gone, discarding {}", rejected);
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue;
    use common::VideoDescriptor;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDiscovery {
        calls: Arc<AtomicUsize>,
        failures_left: usize,
    }

    impl FakeDiscovery {
        fn new(calls: Arc<AtomicUsize>) -> Self {
            Self {
                calls,
                failures_left: 0,
            }
        }
    }

    impl Discovery for FakeDiscovery {
        async fn find_candidate(&mut self) -> Result<VideoDescriptor, AcquireError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(AcquireError::NoCandidate { attempts: 1 });
            }
            let id = format!("v{}", n);
            Ok(VideoDescriptor::new(
                id.clone(),
                format!("https://example.com/{}", id),
            ))
        }
    }

    #[derive(Default)]
    struct FakeDownloader {
        broken: HashSet<String>,
    }

    impl Downloader for FakeDownloader {
        async fn fetch(
            &mut self,
            descriptor: &VideoDescriptor,
        ) -> Result<MediaHandle, AcquireError> {
            if self.broken.contains(&descriptor.id) {
                return Err(AcquireError::Download {
                    id: descriptor.id.clone(),
                    reason: "unavailable".to_string(),
                });
            }
            Ok(MediaHandle::new(
                descriptor.id.clone(),
                format!("/nonexistent/lowview-test/{}.mp4", descriptor.id),
            ))
        }
    }

    fn settings() -> AcquirerSettings {
        AcquirerSettings {
            poll_interval_ms: 50,
            backoff_initial_ms: 100,
            backoff_max_ms: 4000,
        }
    }

    async fn take_ids(mut consumer: queue::QueueConsumer, count: usize) -> Vec<String> {
        tokio::task::spawn_blocking(move || {
            (0..count)
                .map(|_| consumer.take().unwrap().id().to_string())
                .collect()
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<u128> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_is_polled_not_overfilled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (producer, consumer) = queue::bounded(15);
        let acquirer = Acquirer::new(
            FakeDiscovery::new(calls.clone()),
            FakeDownloader::default(),
            producer,
            &settings(),
        );
        let task = tokio::spawn(acquirer.run());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(consumer.len(), 15);
        assert_eq!(calls.load(Ordering::SeqCst), 15);

        // Still stuck at capacity after many poll intervals
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(consumer.len(), 15);
        assert_eq!(calls.load(Ordering::SeqCst), 15);
        assert!(!task.is_finished());

        drop(consumer);
        let stats = task.await.unwrap();
        assert_eq!(stats.acquired, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_after_take() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (producer, mut consumer) = queue::bounded(3);
        let task = tokio::spawn(
            Acquirer::new(
                FakeDiscovery::new(calls.clone()),
                FakeDownloader::default(),
                producer,
                &settings(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        consumer = tokio::task::spawn_blocking(move || {
            assert_eq!(consumer.take().unwrap().id(), "v0");
            consumer
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(consumer.len(), 3);

        assert_eq!(take_ids(consumer, 3).await, vec!["v1", "v2", "v3"]);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_downloads_are_not_queued() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (producer, consumer) = queue::bounded(3);
        let downloader = FakeDownloader {
            broken: ["v1", "v3"].iter().map(|s| s.to_string()).collect(),
        };
        let task = tokio::spawn(
            Acquirer::new(
                FakeDiscovery::new(calls.clone()),
                downloader,
                producer,
                &settings(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        // v1 and v3 were fetched fresh from discovery each time, never retried
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(take_ids(consumer, 3).await, vec!["v0", "v2", "v4"]);

        let stats = task.await.unwrap();
        assert_eq!(stats.download_failures, 2);
        assert!(stats.acquired >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_failures_back_off() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (producer, consumer) = queue::bounded(1);
        let discovery = FakeDiscovery {
            calls: calls.clone(),
            failures_left: 3,
        };
        let start = tokio::time::Instant::now();
        let task = tokio::spawn(
            Acquirer::new(discovery, FakeDownloader::default(), producer, &settings()).run(),
        );

        // 100 + 200 + 400 ms of backoff before the first success
        tokio::time::sleep(Duration::from_millis(650)).await;
        assert_eq!(consumer.len(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(consumer.len(), 1);
        assert!(start.elapsed() >= Duration::from_millis(700));

        drop(consumer);
        let stats = task.await.unwrap();
        assert_eq!(stats.discovery_failures, 3);
        assert_eq!(stats.acquired, 1);
    }
}
