use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::{Mutex, PoisonError};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::unbounded;
use flate2::read::MultiGzDecoder;
use tracing::{debug, warn};

use crate::error::StrikeError;
use crate::feature::{GeoFeature, RawStrikeRecord};

/// Decompresses one slice file and converts every line. Any bad line fails the whole file.
pub fn parse_slice_file(path: &Utf8Path) -> Result<Vec<GeoFeature>, StrikeError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| StrikeError::Filesystem(format!("open {path}: {err}")))?;
    let reader = BufReader::new(MultiGzDecoder::new(file));

    let mut features = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| StrikeError::Decompress(format!("{path}: {err}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RawStrikeRecord =
            serde_json::from_str(&line).map_err(|err| StrikeError::RecordParse {
                line: index + 1,
                message: err.to_string(),
            })?;
        features.push(GeoFeature::from(&record));
    }
    Ok(features)
}

#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub features: Vec<GeoFeature>,
    pub parsed_files: usize,
    pub failed: Vec<Utf8PathBuf>,
}

/// Fixed pool of parse workers appending into one guarded accumulator.
#[derive(Debug, Clone, Copy)]
pub struct ParseCoordinator {
    workers: usize,
}

impl ParseCoordinator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Blocks until every worker has exited. Each file's features land contiguously,
    /// in line order; files interleave in completion order.
    pub fn run<I>(&self, files: I) -> ParseReport
    where
        I: IntoIterator<Item = Utf8PathBuf>,
    {
        let (work_tx, work_rx) = unbounded::<Utf8PathBuf>();
        for path in files {
            if work_tx.send(path).is_err() {
                break;
            }
        }
        drop(work_tx);

        let accumulator = Mutex::new(Vec::new());
        let (done_tx, done_rx) = unbounded();
        thread::scope(|scope| {
            for worker in 0..self.workers {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                let accumulator = &accumulator;
                scope.spawn(move || {
                    for path in work_rx.iter() {
                        let parsed = match parse_slice_file(&path) {
                            Ok(features) => {
                                debug!(worker, path = %path, features = features.len(), "parsed");
                                accumulator
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .extend(features);
                                true
                            }
                            Err(err) => {
                                warn!(worker, path = %path, error = %err, "slice file dropped");
                                false
                            }
                        };
                        if done_tx.send((path, parsed)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(done_tx);

        let mut report = ParseReport {
            features: accumulator
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
            ..ParseReport::default()
        };
        for (path, parsed) in done_rx.iter() {
            if parsed {
                report.parsed_files += 1;
            } else {
                report.failed.push(path);
            }
        }
        report.failed.sort();
        report
    }
}
