//! Error handlers for observing faults from integration tests

use flowline::pipeline::ErrorHandler;
use std::sync::Mutex;

/// Records `(node, fault)` for every fault it is handed.
#[derive(Default)]
pub struct RecordingHandler {
    faults: Mutex<Vec<(String, String)>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> Vec<(String, String)> {
        self.faults.lock().unwrap().clone()
    }

    pub fn nodes(&self) -> Vec<String> {
        self.faults().into_iter().map(|(node, _)| node).collect()
    }
}

impl ErrorHandler for RecordingHandler {
    fn handle(&self, node_name: &str, fault: &anyhow::Error) {
        self.faults
            .lock()
            .unwrap()
            .push((node_name.to_string(), format!("{:#}", fault)));
    }
}
