//! MapStage: a pure one-in, one-out stage built from a closure.

use crate::pipeline::channel::{InputChannel, OutputChannel};
use crate::pipeline::message::Payload;
use crate::pipeline::node::ChannelStage;
use std::marker::PhantomData;

/// Applies `f` to every `T` and pushes the resulting `R`.
///
/// An error from `f` faults the stage; it is not retried.
pub struct MapStage<F, T, R> {
    name: String,
    f: F,
    _marker: PhantomData<fn(T) -> R>,
}

impl<F, T, R> MapStage<F, T, R>
where
    F: Fn(T) -> anyhow::Result<R> + Send + Sync,
    T: Payload,
    R: Payload,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, T, R> ChannelStage for MapStage<F, T, R>
where
    F: Fn(T) -> anyhow::Result<R> + Send + Sync,
    T: Payload,
    R: Payload,
{
    type Input = T;

    fn process(&self, input: InputChannel<T>, output: OutputChannel) -> anyhow::Result<()> {
        for value in input {
            output.push((self.f)(value?)?)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
