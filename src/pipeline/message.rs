//! Type-erased messages: the unit of traffic between pipeline nodes.
//!
//! A `Message` is an ordered list of boxed [`Chunk`]s. Any `Clone + Send + 'static`
//! value can become a chunk; its concrete type is only recoverable through a
//! type-checked extraction (`extract`, `unpack`, `force_unpack` and their tuple
//! forms), which compares `TypeId`s exactly. No numeric widening or other
//! conversion is attempted.
//!
//! Extraction is consuming: a successful extraction removes the matching chunks,
//! a failed one leaves the message untouched.

use crate::pipeline::error::{PipelineError, PipelineResult};
use std::any::{type_name, Any, TypeId};
use std::fmt;

/// A value that can travel inside a [`Message`].
pub trait Payload: Any + Clone + Send {}

impl<T: Any + Clone + Send> Payload for T {}

/// One type-erased unit of payload data.
///
/// Implemented for every [`Payload`] type; there is no need to implement it by hand.
pub trait Chunk: Send {
    /// Deep copy of this chunk, boxed behind the same erased interface.
    fn clone_chunk(&self) -> Box<dyn Chunk>;

    /// `TypeId` of the concrete value.
    fn chunk_type_id(&self) -> TypeId;

    /// Name of the concrete type, for diagnostics only.
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Payload> Chunk for T {
    fn clone_chunk(&self) -> Box<dyn Chunk> {
        Box::new(self.clone())
    }

    fn chunk_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl dyn Chunk {
    /// Whether the chunk holds exactly a `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.chunk_type_id() == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl fmt::Debug for dyn Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk<{}>", self.type_name())
    }
}

fn downcast<T: Any>(chunk: Box<dyn Chunk>) -> Option<T> {
    chunk.into_any().downcast::<T>().ok().map(|boxed| *boxed)
}

/// Find one distinct chunk per requested type, in request order.
fn locate(chunks: &[Box<dyn Chunk>], wanted: &[TypeId]) -> Option<Vec<usize>> {
    let mut used = vec![false; chunks.len()];
    let mut positions = Vec::with_capacity(wanted.len());
    for id in wanted {
        let pos = chunks
            .iter()
            .enumerate()
            .position(|(i, c)| !used[i] && c.chunk_type_id() == *id)?;
        used[pos] = true;
        positions.push(pos);
    }
    Some(positions)
}

/// Whether each requested type occurs among `chunks` exactly as often as it is
/// requested, so every element of the request has one unambiguous match.
fn matches_exactly(chunks: &[Box<dyn Chunk>], wanted: &[TypeId]) -> bool {
    wanted.iter().all(|id| {
        let requested = wanted.iter().filter(|w| *w == id).count();
        let present = chunks.iter().filter(|c| c.chunk_type_id() == *id).count();
        requested == present
    })
}

/// Remove the chunks matching `wanted` and return them in request order.
/// Returns `None` without touching `chunks` if any type is missing.
fn take_matching(
    chunks: &mut Vec<Box<dyn Chunk>>,
    wanted: &[TypeId],
) -> Option<Vec<Option<Box<dyn Chunk>>>> {
    let positions = locate(chunks, wanted)?;

    let mut order: Vec<(usize, usize)> = positions.into_iter().enumerate().collect();
    // Remove from the back so earlier indices stay valid.
    order.sort_by(|a, b| b.1.cmp(&a.1));

    let mut slots: Vec<Option<Box<dyn Chunk>>> = (0..wanted.len()).map(|_| None).collect();
    for (slot, pos) in order {
        slots[slot] = Some(chunks.remove(pos));
    }
    Some(slots)
}

/// A tuple of payload types that can be packed into or extracted from a message.
///
/// Implemented for tuples of one to eight [`Payload`] types.
pub trait ChunkTuple: Sized {
    fn type_ids() -> Vec<TypeId>;

    fn type_names() -> Vec<&'static str>;

    /// Remove one chunk per element type. All-or-nothing.
    fn take_from(chunks: &mut Vec<Box<dyn Chunk>>) -> Option<Self>;

    fn into_chunks(self) -> Vec<Box<dyn Chunk>>;
}

macro_rules! impl_chunk_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Payload),+> ChunkTuple for ($($name,)+) {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),+]
            }

            fn type_names() -> Vec<&'static str> {
                vec![$(type_name::<$name>()),+]
            }

            fn take_from(chunks: &mut Vec<Box<dyn Chunk>>) -> Option<Self> {
                let mut slots = take_matching(chunks, &Self::type_ids())?;
                Some(($(downcast::<$name>(slots[$idx].take()?)?,)+))
            }

            fn into_chunks(self) -> Vec<Box<dyn Chunk>> {
                vec![$(Box::new(self.$idx) as Box<dyn Chunk>),+]
            }
        }
    };
}

impl_chunk_tuple!(A: 0);
impl_chunk_tuple!(A: 0, B: 1);
impl_chunk_tuple!(A: 0, B: 1, C: 2);
impl_chunk_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_chunk_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_chunk_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_chunk_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_chunk_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// Ordered, heterogeneous sequence of owned chunks.
///
/// Moving a `Message` moves its chunks without copying. [`Clone`] is an explicit
/// deep copy of every chunk and may be expensive for large payloads.
#[derive(Default)]
pub struct Message {
    chunks: Vec<Box<dyn Chunk>>,
}

impl Message {
    /// Single-chunk message.
    pub fn new<T: Payload>(value: T) -> Self {
        Self {
            chunks: vec![Box::new(value)],
        }
    }

    /// One chunk per tuple element, in tuple order.
    pub fn from_tuple<U: ChunkTuple>(values: U) -> Self {
        Self {
            chunks: values.into_chunks(),
        }
    }

    /// Re-assemble a message from chunks taken out of another one.
    pub fn from_chunks(chunks: Vec<Box<dyn Chunk>>) -> Self {
        Self { chunks }
    }

    /// Append a chunk, builder style.
    pub fn with<T: Payload>(mut self, value: T) -> Self {
        self.push_chunk(value);
        self
    }

    pub fn push_chunk<T: Payload>(&mut self, value: T) {
        self.chunks.push(Box::new(value));
    }

    /// Read-only view of the chunks.
    pub fn messages(&self) -> &[Box<dyn Chunk>] {
        &self.chunks
    }

    /// Move every chunk out, leaving this message empty.
    pub fn take_messages(&mut self) -> Vec<Box<dyn Chunk>> {
        std::mem::take(&mut self.chunks)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.chunks.iter().map(|c| c.type_name()).collect()
    }

    /// Whether a chunk of exactly type `T` is present.
    pub fn convertible_to<T: Payload>(&self) -> bool {
        self.convertible_to_all::<(T,)>()
    }

    /// Whether every type of the tuple `U` is present. Does not consume anything.
    pub fn convertible_to_all<U: ChunkTuple>(&self) -> bool {
        locate(&self.chunks, &U::type_ids()).is_some()
    }

    /// Remove and return the first chunk of type `T`, leaving any others.
    pub fn extract<T: Payload>(&mut self) -> Option<T> {
        self.extract_all::<(T,)>().map(|(value,)| value)
    }

    /// Remove one chunk per element type of `U`; leaves the message untouched on a miss.
    pub fn extract_all<U: ChunkTuple>(&mut self) -> Option<U> {
        U::take_from(&mut self.chunks)
    }

    /// Consume the message and return its `T` chunk. `None` unless exactly one
    /// chunk holds a `T`. Other chunks are dropped.
    pub fn unpack<T: Payload>(self) -> Option<T> {
        self.unpack_all::<(T,)>().map(|(value,)| value)
    }

    /// Like [`unpack`](Self::unpack), but a missing or ambiguous `T` is a fault.
    pub fn force_unpack<T: Payload>(self) -> PipelineResult<T> {
        self.force_unpack_all::<(T,)>().map(|(value,)| value)
    }

    /// Tuple form of [`unpack`](Self::unpack): every type must be present
    /// exactly once per request, in any order.
    pub fn unpack_all<U: ChunkTuple>(mut self) -> Option<U> {
        if !matches_exactly(&self.chunks, &U::type_ids()) {
            return None;
        }
        self.extract_all::<U>()
    }

    pub fn force_unpack_all<U: ChunkTuple>(mut self) -> PipelineResult<U> {
        let found = self.type_names();
        if matches_exactly(&self.chunks, &U::type_ids()) {
            if let Some(values) = self.extract_all::<U>() {
                return Ok(values);
            }
        }
        Err(PipelineError::type_mismatch(
            format!("({})", U::type_names().join(", ")),
            &found,
        ))
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        Self {
            chunks: self.chunks.iter().map(|c| c.clone_chunk()).collect(),
        }
    }
}

impl From<Vec<Box<dyn Chunk>>> for Message {
    fn from(chunks: Vec<Box<dyn Chunk>>) -> Self {
        Self::from_chunks(chunks)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("chunks", &self.type_names())
            .finish()
    }
}
