use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::Builder;

use crate::domain::TimeSlice;
use crate::error::StrikeError;

/// How a payload arrived from the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Gzip,
    Plain,
}

/// Local per-slice files. Everything on disk is gzip, whatever the archive served.
#[derive(Debug, Clone)]
pub struct SliceCache {
    root: Utf8PathBuf,
}

impl SliceCache {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn path_for(&self, slice: &TimeSlice) -> Utf8PathBuf {
        self.root.join(slice.cache_name())
    }

    /// Presence only. Stale or truncated content is not detected.
    pub fn contains(&self, slice: &TimeSlice) -> bool {
        self.path_for(slice).as_std_path().is_file()
    }

    pub fn ensure_root(&self) -> Result<(), StrikeError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| StrikeError::Filesystem(err.to_string()))
    }

    pub fn store(
        &self,
        slice: &TimeSlice,
        payload: &[u8],
        encoding: PayloadEncoding,
    ) -> Result<Utf8PathBuf, StrikeError> {
        let path = self.path_for(slice);
        match encoding {
            PayloadEncoding::Gzip => write_bytes_atomic(&path, payload)?,
            PayloadEncoding::Plain => write_bytes_atomic(&path, &gzip(payload)?)?,
        }
        Ok(path)
    }
}

pub fn gzip(payload: &[u8]) -> Result<Vec<u8>, StrikeError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 4), Compression::default());
    encoder
        .write_all(payload)
        .map_err(|err| StrikeError::Filesystem(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| StrikeError::Filesystem(err.to_string()))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), StrikeError> {
    let parent = path
        .parent()
        .ok_or_else(|| StrikeError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| StrikeError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".thunderstruck-slice")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| StrikeError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| StrikeError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| StrikeError::Filesystem(err.to_string()))?;
    Ok(())
}
