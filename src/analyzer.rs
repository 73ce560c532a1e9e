//! Tick Recording
//!
//! JSONL sink for decoded snapshots on the analyzer side. One object per
//! line with a capture timestamp and the derived mid, so a recording can be
//! replayed or eyeballed with standard line tools.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::fix::Snapshot;

#[derive(Serialize)]
struct RecordLine<'a> {
    ts: String,
    #[serde(flatten)]
    snapshot: &'a Snapshot,
    mid: f64,
}

/// Buffered JSONL writer for decoded ticks.
pub struct TickRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    lines: u64,
}

impl TickRecorder {
    /// Creates (truncates) the record file.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            lines: 0,
        })
    }

    /// Appends one snapshot with the current UTC capture time.
    pub fn append(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let line = RecordLine {
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            snapshot,
            mid: snapshot.mid(),
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
