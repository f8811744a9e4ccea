//! # In-Memory Cache
//!
//! TTL-based caching for idempotent lookups served before a dependency is called.
//!
//! Entries expire lazily: a read at or after an entry's expiry is a miss even if the
//! entry is still stored. A background sweep removes expired entries on a fixed
//! interval so keys that are never read again do not accumulate.

pub mod memory;
pub mod registry;

pub use memory::{Cache, CacheConfig, CacheStats};
pub use registry::CacheRegistry;
