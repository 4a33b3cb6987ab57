use std::fs;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tempfile::Builder;

use crate::error::StrikeError;
use crate::feature::FeatureCollection;

#[derive(Debug, Clone, Serialize)]
pub struct SinkReport {
    pub destination: String,
    pub features: usize,
}

/// Durable destination for the finished collection. Called once per run.
pub trait FeatureSink {
    fn write(&self, collection: &FeatureCollection) -> Result<SinkReport, StrikeError>;
}

/// Streams the collection as gzip-compressed GeoJSON and renames it into place.
#[derive(Debug, Clone)]
pub struct GzipFileSink {
    path: Utf8PathBuf,
}

impl GzipFileSink {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

impl FeatureSink for GzipFileSink {
    fn write(&self, collection: &FeatureCollection) -> Result<SinkReport, StrikeError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| StrikeError::Output(format!("create {parent}: {err}")))?;
        let mut temp = Builder::new()
            .prefix(".thunderstruck-output")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| StrikeError::Output(err.to_string()))?;

        {
            let mut encoder = GzEncoder::new(
                BufWriter::new(temp.as_file_mut()),
                Compression::default(),
            );
            serde_json::to_writer(&mut encoder, collection)
                .map_err(|err| StrikeError::Output(err.to_string()))?;
            let mut writer = encoder
                .finish()
                .map_err(|err| StrikeError::Output(err.to_string()))?;
            writer
                .flush()
                .map_err(|err| StrikeError::Output(err.to_string()))?;
        }

        temp.persist(self.path.as_std_path())
            .map_err(|err| StrikeError::Output(err.to_string()))?;
        Ok(SinkReport {
            destination: self.path.to_string(),
            features: collection.len(),
        })
    }
}
