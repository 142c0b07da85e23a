//! Named cache stores holding request/response pairs.
//!
//! A store is addressed by name only: every call names the store it acts
//! on, and nothing holds a handle between calls. Two backends are provided:
//!
//! - `MemoryCacheStorage`: in-process, for tests and ephemeral hosts
//! - `DiskCacheStorage`: one JSON file per store, persisting across restarts

pub mod disk;
pub mod memory;
pub mod storage;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;
pub use storage::CacheStorage;
