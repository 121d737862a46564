//! Built-in pipeline node implementations.

pub mod broadcast;
pub mod interleave;
pub mod map;
pub mod passthrough;

pub use broadcast::Broadcast;
pub use interleave::Interleave;
pub use map::MapStage;
pub use passthrough::PassThrough;
