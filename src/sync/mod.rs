//! Synchronization primitives scoped to string keys.

mod key_mutex;

pub use key_mutex::{KeyGuard, KeyMutex};
