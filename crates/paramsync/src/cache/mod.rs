//! Caches owned by a command invocation.
//!
//! Nothing here is process-global: each cache is created by whoever runs
//! the command and handed to the components that need it.

pub mod lookup;
pub mod names;
pub mod registry;

pub use lookup::LookupCache;
pub use names::{CacheSnapshot, FileSnapshotStore, MemorySnapshotStore, ParameterNameCache, SnapshotStore};
pub use registry::{ClientKey, ClientRegistry, StoreFactory};
