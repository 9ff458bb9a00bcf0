//! Relays pumping bytes between the child process, the operator and the
//! supervisor's command queue

pub mod input;
pub mod output;

pub use input::InputRelay;
pub use output::OutputRelay;

use crate::detect::DetectedCommand;
use crate::error::{RelayError, RelayKind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Items flowing from the relays to the supervisor, in arrival order
#[derive(Debug)]
pub enum RelayEvent {
    /// A chat command detected in the child's output
    Command(DetectedCommand),
    /// The child's output stream ended
    OutputClosed,
    /// The operator's input device ended
    OperatorClosed,
    /// A relay hit a stream error and stopped
    Failed { relay: RelayKind, error: RelayError },
}

pub type EventSender = mpsc::UnboundedSender<RelayEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<RelayEvent>;

/// Create the queue connecting the relays to the supervisor
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Advisory stop signal for one relay loop
///
/// Setting it does not interrupt a blocked read; the loop exits at its next check.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters shared between the output relay and the supervisor
#[derive(Debug, Default)]
pub struct RelayStats {
    lines: AtomicU64,
    detected: AtomicU64,
}

impl RelayStats {
    pub fn record_line(&self) {
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detected(&self) {
        self.detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Completed output lines seen so far
    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    /// Chat commands detected so far
    pub fn detected(&self) -> u64 {
        self.detected.load(Ordering::Relaxed)
    }
}
