//! B+-tree index.
//!
//! - [`BPlusTree`] - search, upsert, update, delete and range scans
//! - [`BPlusNode`] - leaf and internal nodes and their page encoding
//!
//! Leaves hold whole rows and are chained through their `prev`/`next`
//! header links. Internal nodes route with `children[i]` covering keys below
//! `keys[i]`, so a key equal to a separator goes right.

mod node;
mod tree;

pub use node::{BPlusNode, InternalNode, LeafNode, MAX_ENTRY_SIZE};
pub use tree::BPlusTree;
