use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::archive::ArchiveClient;
use crate::domain::TimeRange;
use crate::error::StrikeError;
use crate::feature::FeatureCollection;
use crate::fetch::{DownloadCoordinator, Fetcher};
use crate::parse::ParseCoordinator;
use crate::sink::FeatureSink;

#[derive(Debug, Clone, Copy)]
pub struct PoolSizes {
    pub download: usize,
    pub parse: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub window_start: String,
    pub window_end: String,
    pub slices: usize,
    pub cache_hits: usize,
    pub compressed: usize,
    pub uncompressed: usize,
    pub failed_slices: Vec<String>,
    pub parsed_files: usize,
    pub failed_files: Vec<String>,
    pub features: usize,
    pub destination: String,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failed_slices.is_empty() && self.failed_files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Download barrier, then parse barrier, then a single write.
pub struct Pipeline<C: ArchiveClient, S: FeatureSink> {
    fetcher: Fetcher<C>,
    sink: S,
    pools: PoolSizes,
}

impl<C: ArchiveClient, S: FeatureSink> Pipeline<C, S> {
    pub fn new(fetcher: Fetcher<C>, sink: S, pools: PoolSizes) -> Self {
        Self {
            fetcher,
            sink,
            pools,
        }
    }

    pub fn fetcher(&self) -> &Fetcher<C> {
        &self.fetcher
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Slice and file failures are logged and left out of the collection; only the
    /// cache directory and the final write can fail the run.
    pub fn run(
        &self,
        range: &TimeRange,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary, StrikeError> {
        let started = Instant::now();
        self.fetcher.cache().ensure_root()?;

        let slices = range.slices().collect::<Vec<_>>();
        progress.event(ProgressEvent {
            message: format!(
                "phase=Download; {} slices with {} workers",
                slices.len(),
                self.pools.download
            ),
            elapsed: None,
        });
        let slice_count = slices.len();
        let downloads = DownloadCoordinator::new(&self.fetcher, self.pools.download).run(slices);
        if !downloads.failed.is_empty() {
            warn!(
                failed = downloads.failed.len(),
                total = slice_count,
                "some slices could not be downloaded"
            );
        }

        progress.event(ProgressEvent {
            message: format!(
                "phase=Parse; {} files with {} workers",
                downloads.files.len(),
                self.pools.parse
            ),
            elapsed: Some(started.elapsed()),
        });
        let parsed = ParseCoordinator::new(self.pools.parse).run(downloads.files.iter().cloned());
        if !parsed.failed.is_empty() {
            warn!(
                failed = parsed.failed.len(),
                total = downloads.files.len(),
                "some slice files could not be parsed"
            );
        }

        progress.event(ProgressEvent {
            message: format!("phase=Write; {} features", parsed.features.len()),
            elapsed: Some(started.elapsed()),
        });
        let collection = FeatureCollection::new(parsed.features);
        if collection.is_empty() {
            warn!(slices = slice_count, "no strikes collected for the window");
        }
        let written = self.sink.write(&collection)?;
        info!(
            features = written.features,
            destination = %written.destination,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "feature collection written"
        );

        Ok(RunSummary {
            window_start: range.start().format("%Y-%m-%dT%H:%M:%S").to_string(),
            window_end: range.end().format("%Y-%m-%dT%H:%M:%S").to_string(),
            slices: slice_count,
            cache_hits: downloads.cache_hits,
            compressed: downloads.compressed,
            uncompressed: downloads.uncompressed,
            failed_slices: downloads.failed.iter().map(ToString::to_string).collect(),
            parsed_files: parsed.parsed_files,
            failed_files: parsed.failed.iter().map(ToString::to_string).collect(),
            features: written.features,
            destination: written.destination,
        })
    }
}
