//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache layer between the B+-tree and the
//! space files. It holds decoded pages in LRU order and defers writes until
//! eviction, an explicit flush, or the dirty-page threshold.
//!
//! # Components
//! - [`BufferPool`] - The page cache and its dirty list
//! - [`BufferPoolStats`] / [`StatsSnapshot`] - Performance statistics

mod buffer_pool;
mod stats;

pub use buffer_pool::BufferPool;
pub use stats::{BufferPoolStats, StatsSnapshot};
