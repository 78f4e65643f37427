//! Scan progress and warning events.
//!
//! The scanner pushes structured events to a caller-supplied sink: at least
//! one progress event per configured file interval, warnings as they happen,
//! and exactly one completion event. Emission is a side channel — sinks must
//! never block the walk, so the channel sink drops on back-pressure rather
//! than waiting.

#![allow(missing_docs)]

use std::path::PathBuf;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// Why the scanner logged a warning for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Entry skipped: no permission to read it.
    PermissionDenied,
    /// Entry skipped: unreadable for another reason.
    Unreadable,
    /// Directory revisited through a symlink or hard-link cycle; treated as a
    /// non-descending leaf.
    CycleDetected,
    /// Aggregate size crossed the configured large-directory threshold.
    LargeDirectory,
}

/// Structured events emitted during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Progress {
        files_processed: u64,
        directories_processed: u64,
        elapsed_ms: u64,
        current_path: PathBuf,
    },
    Warning {
        kind: WarningKind,
        path: PathBuf,
        detail: String,
    },
    Completed {
        files_processed: u64,
        directories_processed: u64,
        total_size_bytes: u64,
        elapsed_ms: u64,
        status: String,
    },
}

/// Caller-supplied event sink. Implementations must be cheap and non-blocking.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ScanEvent) {}
}

/// Bounded-channel sink; events are dropped, not awaited, when the consumer
/// falls behind.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ScanEvent>,
}

impl ChannelSink {
    /// Create a sink and its receiving half.
    pub fn bounded(capacity: usize) -> (Self, Receiver<ScanEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ScanEvent) {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Accumulating sink for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: parking_lot::Mutex<Vec<ScanEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().clone()
    }

    pub fn warnings(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ScanEvent::Warning { .. }))
            .cloned()
            .collect()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: ScanEvent) {
        self.events.lock().push(event);
    }
}
