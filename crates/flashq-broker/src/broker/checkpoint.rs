//! High-watermark checkpoint file: one per log directory, line-oriented
//! text, written atomically via temp-file rename.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const CHECKPOINT_VERSION: u32 = 0;
const CHECKPOINT_FILE_NAME: &str = "replication-offset-checkpoint";

/// `topic partition hw` entries for every partition whose log lives in one directory.
pub struct HwCheckpointFile {
    path: PathBuf,
}

impl HwCheckpointFile {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            path: log_dir.as_ref().join(CHECKPOINT_FILE_NAME),
        }
    }

    #[instrument(level = "debug", skip(self, entries))]
    pub fn write(&self, entries: &HashMap<(String, u32), u64>) -> io::Result<()> {
        let mut body = String::new();
        body.push_str(&format!("{CHECKPOINT_VERSION}\n"));
        body.push_str(&format!("{}\n", entries.len()));
        let mut sorted: Vec<_> = entries.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for ((topic, partition), hw) in sorted {
            body.push_str(&format!("{topic} {partition} {hw}\n"));
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp_file = fs::File::create(&tmp_path)?;
            tmp_file.write_all(body.as_bytes())?;
            tmp_file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        info!(path = %self.path.display(), count = entries.len(), "wrote HW checkpoint");
        Ok(())
    }

    pub fn read(&self) -> io::Result<HashMap<(String, u32), u64>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let mut lines = content.lines();

        let _version: u32 = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing version line"))?;
        let count: usize = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing count line"))?;

        let mut entries = HashMap::with_capacity(count);
        for line in lines.take(count) {
            let mut parts = line.split_whitespace();
            let topic = parts
                .next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing topic"))?
                .to_string();
            let partition: u32 = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing partition"))?;
            let hw: u64 = parts
                .next()
                .and_then(|h| h.parse().ok())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing hw"))?;
            entries.insert((topic, partition), hw);
        }
        Ok(entries)
    }

    /// Removes every entry whose partition is hosted on a now-failed directory;
    /// called by the directory-failure handler before the checkpoint file
    /// itself is deleted.
    pub fn remove(&self) -> io::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
