//! Per-recording event log, mirrored to `<root>/<subject>/<subject>_run<id>.txt`.
//!
//! Files are only ever appended to. Several sessions for the same subject
//! and run, plus lines posted by the frontend, accumulate in one file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{SessionError, SessionResult};
use crate::params::SubjectName;

/// Maps subject/run pairs to log files under one root directory.
#[derive(Debug, Clone)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, subject: &SubjectName, run_id: i64) -> PathBuf {
        self.root
            .join(subject.as_str())
            .join(format!("{subject}_run{run_id}.txt"))
    }

    /// Append one line to the subject/run file, creating it if needed.
    pub fn append_line(
        &self,
        subject: &SubjectName,
        run_id: i64,
        line: &str,
    ) -> SessionResult<PathBuf> {
        let path = self.path_for(subject, run_id);
        append_lines(&path, std::iter::once(line))?;
        Ok(path)
    }
}

fn append_lines<'a>(path: &Path, lines: impl IntoIterator<Item = &'a str>) -> SessionResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SessionError::io(parent, e))?;
    }

    // One write per flush so concurrent appenders do not interleave mid-line
    let mut buf = String::new();
    for line in lines {
        buf.push_str(line.trim_end_matches('\n'));
        buf.push('\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SessionError::io(path, e))?;
    file.write_all(buf.as_bytes())
        .map_err(|e| SessionError::io(path, e))
}

/// One timestamped line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    /// `[<unix seconds, 6 decimals>] <message>`
    pub fn render(&self) -> String {
        let secs = self.timestamp.timestamp_micros() as f64 / 1_000_000.0;
        format!("[{secs:.6}] {}", self.message)
    }
}

#[derive(Debug, Default)]
struct LogBuffer {
    entries: Vec<LogEntry>,
    /// Entries before this index are already on disk.
    flushed: usize,
}

/// Append-only log owned by one controller.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    run_id: i64,
    buffer: Mutex<LogBuffer>,
}

impl LogSink {
    pub fn new(layout: &LogLayout, subject: &SubjectName, run_id: i64) -> Self {
        Self {
            path: layout.path_for(subject, run_id),
            run_id,
            buffer: Mutex::new(LogBuffer::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, LogBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn log(&self, message: impl Into<String>) {
        let entry = LogEntry::now(message);
        tracing::info!(run_id = self.run_id, "{}", entry.message);
        self.lock().entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending(&self) -> usize {
        let buffer = self.lock();
        buffer.entries.len() - buffer.flushed
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.clone()
    }

    /// Append every entry not yet on disk. Returns how many were written.
    ///
    /// On error nothing is marked flushed, so the next flush retries the
    /// same entries.
    pub fn flush(&self) -> SessionResult<usize> {
        let mut buffer = self.lock();
        let start = buffer.flushed;
        if start == buffer.entries.len() {
            return Ok(0);
        }

        let rendered: Vec<String> = buffer.entries[start..].iter().map(LogEntry::render).collect();
        append_lines(&self.path, rendered.iter().map(String::as_str))?;

        buffer.flushed = buffer.entries.len();
        let written = buffer.flushed - start;
        drop(buffer);

        tracing::info!(
            run_id = self.run_id,
            path = %self.path.display(),
            written,
            "Logs saved"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn subject() -> SubjectName {
        SubjectName::new("p1").unwrap()
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn layout_matches_subject_run_convention() {
        let layout = LogLayout::new("/var/eeg/data_logs");
        assert_eq!(
            layout.path_for(&subject(), 42),
            PathBuf::from("/var/eeg/data_logs/p1/p1_run42.txt")
        );
    }

    #[test]
    fn render_uses_unix_seconds_with_micros() {
        let entry = LogEntry {
            timestamp: Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap(),
            message: "Session created successfully.".to_string(),
        };
        assert_eq!(
            entry.render(),
            "[1700000000.123456] Session created successfully."
        );
    }

    #[test]
    fn flush_writes_only_new_entries() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::new(&LogLayout::new(dir.path()), &subject(), 1);

        sink.log("one");
        sink.log("two");
        assert_eq!(sink.flush().unwrap(), 2);
        assert_eq!(sink.flush().unwrap(), 0);

        sink.log("three");
        assert_eq!(sink.pending(), 1);
        assert_eq!(sink.flush().unwrap(), 1);

        let lines = read_lines(sink.path());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("] one"));
        assert!(lines[1].ends_with("] two"));
        assert!(lines[2].ends_with("] three"));
    }

    #[test]
    fn flush_appends_across_sinks_for_same_run() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());

        let first = LogSink::new(&layout, &subject(), 3);
        first.log("first session");
        first.flush().unwrap();

        layout.append_line(&subject(), 3, "[frontend] cross shown").unwrap();

        let second = LogSink::new(&layout, &subject(), 3);
        second.log("second session");
        second.flush().unwrap();

        let lines = read_lines(first.path());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("first session"));
        assert_eq!(lines[1], "[frontend] cross shown");
        assert!(lines[2].ends_with("second session"));
    }

    #[test]
    fn flush_error_keeps_entries_pending() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the subject directory should be makes create_dir_all fail
        std::fs::write(dir.path().join("p1"), b"not a dir").unwrap();

        let sink = LogSink::new(&LogLayout::new(dir.path()), &subject(), 1);
        sink.log("kept");
        assert!(sink.flush().is_err());
        assert_eq!(sink.pending(), 1);
    }

    #[test]
    fn concurrent_logging_loses_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = std::sync::Arc::new(LogSink::new(&LogLayout::new(dir.path()), &subject(), 9));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = std::sync::Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.log(format!("thread {t} line {i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(sink.len(), 400);
        assert_eq!(sink.flush().unwrap(), 400);
        assert_eq!(read_lines(sink.path()).len(), 400);
    }
}
