//! Single-producer/single-consumer channels between pipeline nodes.
//!
//! Each channel has exactly one [`OutputChannel`] (the producing end) and one
//! [`GenericInputChannel`] (the consuming end). Closing the output end is the
//! only end-of-stream signal: the consumer keeps receiving everything that was
//! buffered before the close, then iteration ends.
//!
//! Channels are built on crossbeam queues. An unbounded channel never blocks the
//! producer; a bounded one blocks `push` while the buffer is full.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::message::{ChunkTuple, Message, Payload};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::marker::PhantomData;
use std::time::Duration;

/// Create a channel. `None` means unbounded.
pub fn channel(capacity: Option<usize>) -> (OutputChannel, GenericInputChannel) {
    let (tx, rx) = match capacity {
        Some(cap) => crossbeam_channel::bounded(cap),
        None => crossbeam_channel::unbounded(),
    };
    (
        OutputChannel { sender: Some(tx) },
        GenericInputChannel { receiver: rx },
    )
}

/// Unbounded channel.
pub fn unbounded() -> (OutputChannel, GenericInputChannel) {
    channel(None)
}

/// Bounded channel; `push` blocks while `capacity` messages are buffered.
pub fn bounded(capacity: usize) -> (OutputChannel, GenericInputChannel) {
    channel(Some(capacity))
}

/// Producing end of a channel.
///
/// Dropping it closes the channel, so a node that unwinds still signals
/// end-of-stream downstream.
#[derive(Debug)]
pub struct OutputChannel {
    sender: Option<Sender<Message>>,
}

impl OutputChannel {
    /// Wrap `value` into a single-chunk message and push it.
    pub fn push<T: Payload>(&self, value: T) -> PipelineResult<()> {
        self.push_message(Message::new(value))
    }

    /// Push a message as-is.
    ///
    /// Fails with [`PipelineError::ChannelClosed`] if this end was closed or the
    /// consumer is gone; the message is dropped in that case.
    pub fn push_message(&self, message: Message) -> PipelineResult<()> {
        let sender = self.sender.as_ref().ok_or(PipelineError::ChannelClosed)?;
        sender
            .send(message)
            .map_err(|_| PipelineError::ChannelClosed)
    }

    /// Signal that no further messages will be pushed. Idempotent.
    pub fn close(&mut self) {
        if self.sender.take().is_some() {
            tracing::trace!("Output channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// Number of messages buffered and not yet received.
    pub fn len(&self) -> usize {
        self.sender.as_ref().map_or(0, |tx| tx.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a non-blocking or timed receive.
#[derive(Debug)]
pub enum PopResult {
    Ready(Message),
    /// Nothing buffered (yet); the channel is still open.
    Empty,
    /// Closed and drained.
    Closed,
}

/// Consuming end of a channel carrying untyped messages.
#[derive(Debug)]
pub struct GenericInputChannel {
    receiver: Receiver<Message>,
}

impl GenericInputChannel {
    /// Block until a message arrives. `None` means end-of-stream.
    pub fn pop(&self) -> Option<Message> {
        self.receiver.recv().ok()
    }

    pub fn try_pop(&self) -> PopResult {
        match self.receiver.try_recv() {
            Ok(msg) => PopResult::Ready(msg),
            Err(TryRecvError::Empty) => PopResult::Empty,
            Err(TryRecvError::Disconnected) => PopResult::Closed,
        }
    }

    pub fn pop_timeout(&self, timeout: Duration) -> PopResult {
        match self.receiver.recv_timeout(timeout) {
            Ok(msg) => PopResult::Ready(msg),
            Err(RecvTimeoutError::Timeout) => PopResult::Empty,
            Err(RecvTimeoutError::Disconnected) => PopResult::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// View this channel as carrying values of type `T`.
    pub fn typed<T: Payload>(self) -> InputChannel<T> {
        InputChannel::new(self)
    }

    /// View this channel as carrying one chunk of each type in the tuple `U`.
    pub fn typed_all<U: ChunkTuple>(self) -> TupleInputChannel<U> {
        TupleInputChannel {
            inner: self,
            _marker: PhantomData,
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<Message> {
        &self.receiver
    }

    /// Second consuming end on the same queue. Keeps the channel connected for
    /// the producer for as long as it lives.
    pub(crate) fn shared(&self) -> GenericInputChannel {
        GenericInputChannel {
            receiver: self.receiver.clone(),
        }
    }
}

impl Iterator for GenericInputChannel {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        self.pop()
    }
}

/// Consuming end of a channel whose messages all hold a `T`.
///
/// Each received message is unpacked into `T`; a message without a `T` chunk
/// yields a [`PipelineError::TypeMismatch`]. Adjacent stages disagreeing on the
/// payload type is a wiring bug, so stages normally propagate it with `?`.
#[derive(Debug)]
pub struct InputChannel<T> {
    inner: GenericInputChannel,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Payload> InputChannel<T> {
    pub fn new(inner: GenericInputChannel) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Block for the next value. `None` means end-of-stream.
    pub fn pop(&self) -> Option<PipelineResult<T>> {
        self.inner.pop().map(Message::force_unpack::<T>)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn into_inner(self) -> GenericInputChannel {
        self.inner
    }
}

impl<T: Payload> Iterator for InputChannel<T> {
    type Item = PipelineResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}

impl<T: Payload> From<GenericInputChannel> for InputChannel<T> {
    fn from(inner: GenericInputChannel) -> Self {
        Self::new(inner)
    }
}

/// Consuming end of a channel whose messages each hold one chunk per type of `U`.
///
/// Chunks may appear in any order within a message; chunks not named by `U`
/// are dropped.
#[derive(Debug)]
pub struct TupleInputChannel<U> {
    inner: GenericInputChannel,
    _marker: PhantomData<fn() -> U>,
}

impl<U: ChunkTuple> TupleInputChannel<U> {
    /// Block for the next tuple. `None` means end-of-stream.
    pub fn pop(&self) -> Option<PipelineResult<U>> {
        self.inner.pop().map(Message::force_unpack_all::<U>)
    }

    pub fn into_inner(self) -> GenericInputChannel {
        self.inner
    }
}

impl<U: ChunkTuple> Iterator for TupleInputChannel<U> {
    type Item = PipelineResult<U>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}
