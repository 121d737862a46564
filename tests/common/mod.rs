//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use flowline::pipeline::GenericInputChannel;
use flowline::Message;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Collect every message until end-of-stream.
pub fn drain(input: GenericInputChannel) -> Vec<Message> {
    input.collect()
}

/// Collect every message as `T`, panicking on a type mismatch.
pub fn drain_typed<T: flowline::pipeline::Payload>(input: GenericInputChannel) -> Vec<T> {
    input
        .typed::<T>()
        .map(|r| r.expect("message of unexpected type"))
        .collect()
}
