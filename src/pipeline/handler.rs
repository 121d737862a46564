//! Fault policy for pipeline nodes.
//!
//! An [`ErrorHandler`] is handed to every node when the pipeline starts and is
//! called on the faulting node's own thread. Two policies ship with the crate:
//!
//! - [`LoggingErrorHandler`] logs the fault and lets the rest of the pipeline run.
//!   Downstream of the dead node sees end-of-stream.
//! - [`EscalatingErrorHandler`] records the fault and raises an [`AbortSignal`].
//!   The pipeline closes its heads as soon as the signal is raised and refuses
//!   new input from then on.

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Policy invoked when a node's processing fails.
///
/// Must not panic: a panicking handler aborts the process.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, node_name: &str, fault: &anyhow::Error);
}

/// Shared flag that tells a running pipeline to tear itself down.
///
/// Subscribers are woken once, when the signal is first triggered.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AbortState>);

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    subscribers: Mutex<Vec<Sender<()>>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        if self.0.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        for subscriber in self.subscribers().drain(..) {
            let _ = subscriber.try_send(());
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.0.aborted.load(Ordering::SeqCst)
    }

    /// A receiver that becomes ready when the signal is triggered, or right
    /// away if it already was.
    pub fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut subscribers = self.subscribers();
        if self.is_aborted() {
            let _ = tx.try_send(());
        } else {
            subscribers.push(tx);
        }
        rx
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Sender<()>>> {
        match self.0.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Log and continue.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, node_name: &str, fault: &anyhow::Error) {
        tracing::error!(node = node_name, "Node faulted: {:#}", fault);
    }
}

/// A fault as seen by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    pub node: String,
    pub message: String,
}

/// Record every fault and tear the pipeline down on the first one.
#[derive(Debug, Default)]
pub struct EscalatingErrorHandler {
    signal: AbortSignal,
    faults: Mutex<Vec<FaultRecord>>,
}

impl EscalatingErrorHandler {
    pub fn new(signal: AbortSignal) -> Self {
        Self {
            signal,
            faults: Mutex::new(Vec::new()),
        }
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Faults recorded so far, in the order they were handled.
    pub fn faults(&self) -> Vec<FaultRecord> {
        match self.faults.lock() {
            Ok(faults) => faults.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ErrorHandler for EscalatingErrorHandler {
    fn handle(&self, node_name: &str, fault: &anyhow::Error) {
        tracing::error!(node = node_name, "Node faulted, aborting pipeline: {:#}", fault);

        let record = FaultRecord {
            node: node_name.to_string(),
            message: format!("{:#}", fault),
        };
        match self.faults.lock() {
            Ok(mut faults) => faults.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }

        self.signal.trigger();
    }
}
