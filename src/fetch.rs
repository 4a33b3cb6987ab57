use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use crossbeam_channel::unbounded;
use serde::Serialize;
use tracing::{debug, warn};

use crate::archive::ArchiveClient;
use crate::domain::TimeSlice;
use crate::error::StrikeError;
use crate::store::{PayloadEncoding, SliceCache};

/// Where a slice file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Cache,
    Compressed,
    Uncompressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSlice {
    pub slice: TimeSlice,
    pub path: Utf8PathBuf,
    pub source: FetchSource,
}

pub struct Fetcher<C: ArchiveClient> {
    client: C,
    cache: SliceCache,
    base_url: String,
    fallback_cooldown: Duration,
}

impl<C: ArchiveClient> Fetcher<C> {
    pub fn new(
        client: C,
        cache: SliceCache,
        base_url: String,
        fallback_cooldown: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            base_url,
            fallback_cooldown,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cache(&self) -> &SliceCache {
        &self.cache
    }

    /// Cache first, then `.json.gz`, then (after the cooldown, only on 404) plain `.json`.
    pub fn fetch_slice(&self, slice: &TimeSlice) -> Result<FetchedSlice, StrikeError> {
        if self.cache.contains(slice) {
            debug!(slice = %slice, "cache hit");
            return Ok(FetchedSlice {
                slice: *slice,
                path: self.cache.path_for(slice),
                source: FetchSource::Cache,
            });
        }

        let compressed_url = slice.resource_url(&self.base_url, true);
        match self.client.get(&compressed_url) {
            Ok(payload) => {
                let path = self.cache.store(slice, &payload, PayloadEncoding::Gzip)?;
                Ok(FetchedSlice {
                    slice: *slice,
                    path,
                    source: FetchSource::Compressed,
                })
            }
            Err(err) if err.is_not_found() => {
                debug!(slice = %slice, url = %compressed_url, "no compressed variant, falling back");
                thread::sleep(self.fallback_cooldown);
                let plain_url = slice.resource_url(&self.base_url, false);
                let payload = self.client.get(&plain_url).inspect_err(|err| {
                    debug!(slice = %slice, url = %plain_url, error = %err, "fallback fetch failed");
                })?;
                let path = self.cache.store(slice, &payload, PayloadEncoding::Plain)?;
                Ok(FetchedSlice {
                    slice: *slice,
                    path,
                    source: FetchSource::Uncompressed,
                })
            }
            Err(err) => {
                debug!(slice = %slice, url = %compressed_url, error = %err, "fetch failed");
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub files: Vec<Utf8PathBuf>,
    pub cache_hits: usize,
    pub compressed: usize,
    pub uncompressed: usize,
    pub failed: Vec<TimeSlice>,
}

impl DownloadReport {
    pub fn succeeded(&self) -> usize {
        self.files.len()
    }
}

/// Fixed pool of download workers over a closed work queue.
pub struct DownloadCoordinator<'a, C: ArchiveClient> {
    fetcher: &'a Fetcher<C>,
    workers: usize,
}

impl<'a, C: ArchiveClient> DownloadCoordinator<'a, C> {
    pub fn new(fetcher: &'a Fetcher<C>, workers: usize) -> Self {
        Self {
            fetcher,
            workers: workers.max(1),
        }
    }

    /// Blocks until every worker has drained the queue and exited.
    pub fn run<I>(&self, slices: I) -> DownloadReport
    where
        I: IntoIterator<Item = TimeSlice>,
    {
        let (work_tx, work_rx) = unbounded::<TimeSlice>();
        for slice in slices {
            if work_tx.send(slice).is_err() {
                break;
            }
        }
        drop(work_tx);

        let (done_tx, done_rx) = unbounded();
        let fetcher = self.fetcher;
        thread::scope(|scope| {
            for worker in 0..self.workers {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for slice in work_rx.iter() {
                        let outcome = fetcher.fetch_slice(&slice);
                        if let Err(err) = &outcome {
                            warn!(worker, slice = %slice, error = %err, "slice dropped");
                        }
                        if done_tx.send((slice, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(done_tx);

        let mut report = DownloadReport::default();
        for (slice, outcome) in done_rx.iter() {
            match outcome {
                Ok(fetched) => {
                    match fetched.source {
                        FetchSource::Cache => report.cache_hits += 1,
                        FetchSource::Compressed => report.compressed += 1,
                        FetchSource::Uncompressed => report.uncompressed += 1,
                    }
                    report.files.push(fetched.path);
                }
                Err(_) => report.failed.push(slice),
            }
        }
        report.failed.sort();
        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::io::Read;
    use std::sync::Mutex;
    use std::time::Instant;

    use assert_matches::assert_matches;
    use flate2::read::GzDecoder;

    use super::*;
    use crate::store::gzip;

    const BASE: &str = "https://archive.example.com/strikes";

    #[derive(Default)]
    struct MockArchive {
        responses: HashMap<String, Result<Vec<u8>, u16>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockArchive {
        fn with(mut self, url: String, response: Result<Vec<u8>, u16>) -> Self {
            self.responses.insert(url, response);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ArchiveClient for MockArchive {
        fn get(&self, url: &str) -> Result<Vec<u8>, StrikeError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.responses.get(url) {
                Some(Ok(bytes)) => Ok(bytes.clone()),
                Some(Err(status)) => Err(StrikeError::ArchiveStatus {
                    status: *status,
                    message: "mock".to_string(),
                }),
                None => Err(StrikeError::ArchiveStatus {
                    status: 404,
                    message: "mock".to_string(),
                }),
            }
        }
    }

    fn fetcher(archive: MockArchive) -> (tempfile::TempDir, Fetcher<MockArchive>) {
        fetcher_with_cooldown(archive, Duration::ZERO)
    }

    fn fetcher_with_cooldown(
        archive: MockArchive,
        cooldown: Duration,
    ) -> (tempfile::TempDir, Fetcher<MockArchive>) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("slices")).unwrap();
        let fetcher = Fetcher::new(archive, SliceCache::new(root), BASE.to_string(), cooldown);
        (temp, fetcher)
    }

    fn slice() -> TimeSlice {
        "2015-08-01T04:30".parse().unwrap()
    }

    fn gunzip(path: &Utf8PathBuf) -> String {
        let file = fs::File::open(path.as_std_path()).unwrap();
        let mut text = String::new();
        GzDecoder::new(file).read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn second_fetch_is_served_from_cache() {
        let payload = gzip(b"{\"lat\":40.0,\"lon\":-73.0,\"time\":1}\n").unwrap();
        let archive = MockArchive::default().with(slice().resource_url(BASE, true), Ok(payload));
        let (_temp, fetcher) = fetcher(archive);

        let first = fetcher.fetch_slice(&slice()).unwrap();
        assert_eq!(first.source, FetchSource::Compressed);
        let before = fs::read(first.path.as_std_path()).unwrap();

        let second = fetcher.fetch_slice(&slice()).unwrap();
        assert_eq!(second.source, FetchSource::Cache);
        assert_eq!(second.path, first.path);
        assert_eq!(fetcher.client().calls().len(), 1);
        assert_eq!(fs::read(second.path.as_std_path()).unwrap(), before);
    }

    #[test]
    fn not_found_falls_back_to_plain_and_stores_gzip() {
        let archive = MockArchive::default()
            .with(slice().resource_url(BASE, true), Err(404))
            .with(slice().resource_url(BASE, false), Ok(b"{\"lat\":1.0}\n".to_vec()));
        let (_temp, fetcher) = fetcher(archive);

        let fetched = fetcher.fetch_slice(&slice()).unwrap();
        assert_eq!(fetched.source, FetchSource::Uncompressed);
        assert_eq!(
            fetcher.client().calls(),
            vec![slice().resource_url(BASE, true), slice().resource_url(BASE, false)]
        );
        assert_eq!(gunzip(&fetched.path), "{\"lat\":1.0}\n");
    }

    #[test]
    fn fallback_waits_for_cooldown() {
        let cooldown = Duration::from_millis(200);
        let archive = MockArchive::default()
            .with(slice().resource_url(BASE, true), Err(404))
            .with(slice().resource_url(BASE, false), Ok(b"{\"lat\":1.0}\n".to_vec()));
        let (_temp, fetcher) = fetcher_with_cooldown(archive, cooldown);

        let started = Instant::now();
        let fetched = fetcher.fetch_slice(&slice()).unwrap();
        assert_eq!(fetched.source, FetchSource::Uncompressed);
        assert!(started.elapsed() >= cooldown);
    }

    #[test]
    fn server_error_returns_without_cooldown() {
        let cooldown = Duration::from_secs(2);
        let archive = MockArchive::default().with(slice().resource_url(BASE, true), Err(500));
        let (_temp, fetcher) = fetcher_with_cooldown(archive, cooldown);

        let started = Instant::now();
        let err = fetcher.fetch_slice(&slice()).unwrap_err();
        assert_matches!(err, StrikeError::ArchiveStatus { status: 500, .. });
        assert!(started.elapsed() < cooldown);
    }

    #[test]
    fn other_status_skips_fallback() {
        let archive = MockArchive::default().with(slice().resource_url(BASE, true), Err(500));
        let (_temp, fetcher) = fetcher(archive);

        let err = fetcher.fetch_slice(&slice()).unwrap_err();
        assert_matches!(err, StrikeError::ArchiveStatus { status: 500, .. });
        assert_eq!(fetcher.client().calls().len(), 1);
        assert!(!fetcher.cache().contains(&slice()));
    }

    #[test]
    fn failed_fallback_leaves_no_file() {
        let (_temp, fetcher) = fetcher(MockArchive::default());

        let err = fetcher.fetch_slice(&slice()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fetcher.client().calls().len(), 2);
        assert!(!fetcher.cache().contains(&slice()));
    }

    #[test]
    fn coordinator_claims_each_slice_once() {
        let slices = (0..12)
            .map(|minute| format!("2015-08-01T05:{:02}", minute * 5).parse().unwrap())
            .collect::<Vec<TimeSlice>>();
        let mut archive = MockArchive::default();
        for slice in &slices {
            archive = archive.with(slice.resource_url(BASE, true), Ok(gzip(b"\n").unwrap()));
        }
        let (_temp, fetcher) = fetcher(archive);

        let report = DownloadCoordinator::new(&fetcher, 4).run(slices.clone());
        assert_eq!(report.succeeded(), 12);
        assert_eq!(report.compressed, 12);
        assert!(report.failed.is_empty());

        let mut calls = fetcher.client().calls();
        calls.sort();
        calls.dedup();
        assert_eq!(calls.len(), 12);
    }
}
