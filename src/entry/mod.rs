//! Entry Module
//!
//! Zero-copy read handles into the memory-mapped log.
//!
//! An [`Entry`] keeps the mapping it was resolved against alive through an
//! `Arc`, so later appends (which publish a fresh mapping) never invalidate
//! it. Its lifetime is tied to the engine borrow it came from, so an entry
//! cannot outlive `Engine::close`.

mod handle;
mod stream;

pub use handle::{Entry, EntryMetadata};
pub use stream::EntryStream;
