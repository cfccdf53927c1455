//! Scoped verbose capture of transport activity
//!
//! A [`DebugCapture`] is acquired for one configure+execute+teardown cycle.
//! Lines recorded through the paired [`DebugSink`] are buffered and emitted
//! at debug level when the capture is dropped; after that the sink is inert.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct CaptureState {
    active: AtomicBool,
    lines: Mutex<Vec<String>>,
}

/// Write end handed to a transport handle
#[derive(Debug, Clone)]
pub struct DebugSink {
    state: Arc<CaptureState>,
}

impl DebugSink {
    /// Record a line; a no-op once the owning capture has been released
    pub fn record(&self, line: impl Into<String>) {
        if !self.state.active.load(Ordering::Acquire) {
            return;
        }
        let mut lines = match self.state.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(line.into());
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }
}

/// Owning guard for a debug capture
#[derive(Debug)]
pub struct DebugCapture {
    label: String,
    state: Arc<CaptureState>,
}

impl DebugCapture {
    pub fn start(label: impl Into<String>) -> Self {
        let state = Arc::new(CaptureState::default());
        state.active.store(true, Ordering::Release);
        Self {
            label: label.into(),
            state,
        }
    }

    pub fn sink(&self) -> DebugSink {
        DebugSink {
            state: Arc::clone(&self.state),
        }
    }

    /// Lines recorded so far
    pub fn lines(&self) -> Vec<String> {
        match self.state.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Drop for DebugCapture {
    fn drop(&mut self) {
        self.state.active.store(false, Ordering::Release);
        let lines = match self.state.lines.lock() {
            Ok(mut lines) => std::mem::take(&mut *lines),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for line in &lines {
            tracing::debug!(capture = %self.label, "{}", line);
        }
        tracing::debug!(capture = %self.label, lines = lines.len(), "SSL debug capture released");
    }
}
