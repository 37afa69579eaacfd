use chrono::{SecondsFormat, Utc};
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only text sink, one timestamped line per failed unit or record.
///
/// Line format: `[2026-01-31T12:00:00Z] unit 3 (lines 12-16): Request failed: ...`
pub struct ErrorLog {
    writer: Box<dyn Write + Send>,
    path: Option<PathBuf>,
    entries: usize,
}

impl ErrorLog {
    /// Create (or truncate) a log file.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        Ok(Self {
            writer: Box::new(BufWriter::new(file)),
            path: Some(path.to_path_buf()),
            entries: 0,
        })
    }

    /// Log into an arbitrary writer.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            path: None,
            entries: 0,
        }
    }

    /// Discard everything.
    pub fn discard() -> Self {
        Self::from_writer(io::sink())
    }

    /// Append one line. IO failures are reported through tracing only.
    pub fn record(&mut self, scope: &str, cause: &dyn Display) {
        self.entries += 1;
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = format!("[{}] {}: {}", ts, scope, cause).replace('\n', " ");
        if let Err(e) = writeln!(self.writer, "{}", line) {
            warn!(error = %e, "Failed to write error log entry");
        }
    }

    /// Lines recorded so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush the log, returning the number of entries.
    pub fn finish(&mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.entries)
    }
}
