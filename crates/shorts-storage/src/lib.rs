//! Persistence for the shorts pipeline.
//!
//! This crate provides:
//! - A key-value store abstraction with filesystem and in-memory backends
//! - Atomic writes (temp file + rename) for the filesystem backend
//! - Job input/render document persistence
//! - The job status store with per-job serialized read-merge-write
//! - Keyed async locks

pub mod documents;
pub mod error;
pub mod fs;
pub mod kv;
pub mod locks;
pub mod memory;
pub mod status;

pub use documents::JobDocuments;
pub use error::{StorageError, StorageResult};
pub use fs::FsStore;
pub use kv::{get_json, put_json, validate_key, KeyValueStore};
pub use locks::KeyedMutex;
pub use memory::MemoryStore;
pub use status::{StatusEvent, StatusStore};
