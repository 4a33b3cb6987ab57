use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(
            stdout,
            "{} features from {}/{} slices ({} .. {}) -> {}",
            summary.features,
            summary.parsed_files,
            summary.slices,
            summary.window_start,
            summary.window_end,
            summary.destination
        )?;
        writeln!(
            stdout,
            "cache hits: {}, compressed: {}, uncompressed: {}",
            summary.cache_hits, summary.compressed, summary.uncompressed
        )?;
        if !summary.failed_slices.is_empty() {
            writeln!(stdout, "missing slices: {}", summary.failed_slices.join(", "))?;
        }
        if !summary.failed_files.is_empty() {
            writeln!(stdout, "unreadable files: {}", summary.failed_files.join(", "))?;
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                info!(elapsed_ms, "{}", event.message)
            }
            None => info!("{}", event.message),
        }
    }
}
