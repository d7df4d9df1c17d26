use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use notifier_core::SessionHandle;

/// Maps a session handle to the worker that owns it.
///
/// The mapping depends only on the handle and the shard count, so a session
/// stays on one worker for the lifetime of the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardRouter {
    shards: usize,
}

impl ShardRouter {
    /// A router over `shards` workers. Zero is treated as one.
    pub fn new(shards: usize) -> Self {
        Self {
            shards: shards.max(1),
        }
    }

    pub fn route(&self, handle: &SessionHandle) -> usize {
        let mut hasher = DefaultHasher::new();
        handle.as_str().hash(&mut hasher);
        (hasher.finish() % self.shards as u64) as usize
    }
}
