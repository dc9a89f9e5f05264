//! Reference corpus ingestion and the chunk store.
//!
//! A text export of the reference document is split into one chunk per code
//! declaration. The resulting store is built once and shared read-only by
//! every query.

mod chapters;
mod chunk;
mod ingest;
mod store;

pub use chapters::chapter_for_code;
pub use chunk::{CODE_GRAMMAR, Chunk, ChunkId, is_valid_code};
pub use ingest::{ingest, ingest_file};
pub use store::ChunkStore;
