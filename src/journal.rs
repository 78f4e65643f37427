//! Append-only JSONL event journal.
//!
//! Each line is a self-contained JSON object: a UTC timestamp, a severity,
//! and the event payload. Lines are assembled in memory and written with a
//! single `write_all` so a tailing process never sees interleaved fragments.
//!
//! Degradation chain: primary file → stderr → silent discard. A scan must
//! never fail because its journal could not be written.

#![allow(missing_docs)]

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::scanner::progress::{ProgressSink, ScanEvent, WarningKind};

/// Severity level for journal lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
struct JournalLine<'a, T: Serialize> {
    ts: String,
    severity: Severity,
    #[serde(flatten)]
    event: &'a T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

struct Inner {
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

/// The journal. Cheap to share by reference; interior mutability keeps the
/// [`ProgressSink`] implementation lock-narrow.
pub struct EventJournal {
    path: PathBuf,
    max_size_bytes: u64,
    inner: Mutex<Inner>,
}

impl EventJournal {
    /// Default cap before the journal rotates to `<path>.1`.
    pub const DEFAULT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;

    /// Open the journal, falling through the degradation chain on failure.
    pub fn open(path: &Path) -> Self {
        Self::with_max_size(path, Self::DEFAULT_MAX_SIZE_BYTES)
    }

    pub fn with_max_size(path: &Path, max_size_bytes: u64) -> Self {
        let inner = match open_append(path) {
            Ok((file, size)) => Inner {
                writer: Some(BufWriter::with_capacity(64 * 1024, file)),
                state: WriterState::Normal,
                bytes_written: size,
            },
            Err(err) => {
                let _ = writeln!(
                    io::stderr(),
                    "[DW-JOURNAL] cannot open {}: {err}; using stderr",
                    path.display()
                );
                Inner {
                    writer: None,
                    state: WriterState::Stderr,
                    bytes_written: 0,
                }
            }
        };
        Self {
            path: path.to_path_buf(),
            max_size_bytes,
            inner: Mutex::new(inner),
        }
    }

    /// Append one event as a JSONL line.
    pub fn append<T: Serialize>(&self, severity: Severity, event: &T) {
        let line = JournalLine {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            severity,
            event,
        };
        let mut encoded = match serde_json::to_string(&line) {
            Ok(json) => json,
            Err(err) => {
                let _ = writeln!(io::stderr(), "[DW-JOURNAL] serialize error: {err}");
                return;
            }
        };
        encoded.push('\n');
        self.write_line(&encoded);
    }

    /// Flush buffered lines to disk.
    pub fn flush(&self) {
        if let Some(writer) = self.inner.lock().writer.as_mut() {
            let _ = writer.flush();
        }
    }

    /// Current degradation state, for diagnostics.
    pub fn state(&self) -> &'static str {
        match self.inner.lock().state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    fn write_line(&self, line: &str) {
        let mut inner = self.inner.lock();

        if inner.state == WriterState::Normal
            && inner.bytes_written + line.len() as u64 > self.max_size_bytes
        {
            self.rotate(&mut inner);
        }

        match inner.state {
            WriterState::Normal => {
                let write_failed = match inner.writer.as_mut() {
                    Some(writer) => writer.write_all(line.as_bytes()).is_err(),
                    None => true,
                };
                if write_failed {
                    inner.writer = None;
                    inner.state = WriterState::Stderr;
                    let _ = write!(io::stderr(), "[DW-JOURNAL] {line}");
                } else {
                    inner.bytes_written += line.len() as u64;
                }
            }
            WriterState::Stderr => {
                // If stderr itself fails there is nowhere left to degrade to.
                if write!(io::stderr(), "[DW-JOURNAL] {line}").is_err() {
                    inner.state = WriterState::Discard;
                }
            }
            WriterState::Discard => {}
        }
    }

    fn rotate(&self, inner: &mut Inner) {
        if let Some(writer) = inner.writer.take() {
            drop(writer);
        }
        let rotated = self.path.with_extension("jsonl.1");
        let _ = std::fs::rename(&self.path, &rotated);
        match open_append(&self.path) {
            Ok((file, size)) => {
                inner.writer = Some(BufWriter::with_capacity(64 * 1024, file));
                inner.bytes_written = size;
            }
            Err(_) => {
                inner.state = WriterState::Stderr;
            }
        }
    }
}

impl ProgressSink for EventJournal {
    fn emit(&self, event: ScanEvent) {
        let severity = match &event {
            ScanEvent::Warning { kind, .. } => match kind {
                WarningKind::LargeDirectory => Severity::Info,
                _ => Severity::Warning,
            },
            _ => Severity::Info,
        };
        self.append(severity, &event);
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}
