//! LeafDB - an embedded page-file storage engine.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     StorageContext (context)                    │
//! │          named indexes · Operation → OperationOutcome           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              B+-Tree Index (index/btree)                 │   │
//! │  │   search · insert (upsert) · update · delete · scan      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │            ↓ pages                      ↓ keys / rows           │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐   │
//! │  │   Buffer Pool (buffer)    │  │ Record/Key Codec (record)│   │
//! │  │  LRU cache + dirty list   │  └──────────────────────────┘   │
//! │  └──────────────────────────┘                                  │
//! │            ↓ misses / write-back                                │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Storage Layer (storage)                    │   │
//! │  │   SpaceManager · DiskManager · Page + PageHeader + Slot  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (page ids, errors, configuration)
//! - [`storage`] - Space files, allocation and the slotted page format
//! - [`buffer`] - The LRU buffer pool
//! - [`record`] - Column types, values and the row/key codec
//! - [`index`] - The B+-tree
//! - [`context`] - The engine object tying them together
//!
//! # Quick Start
//! ```no_run
//! use leafdb::record::{Column, ColumnType, Key, TableSchema, Value};
//! use leafdb::{EngineConfig, IndexDescriptor, SpaceId, StorageContext};
//!
//! let ctx = StorageContext::open(EngineConfig::new("./data")).unwrap();
//! let schema = TableSchema::new(
//!     "users",
//!     vec![
//!         Column::new("id", ColumnType::Int).primary_key(),
//!         Column::new("name", ColumnType::Varchar(10)),
//!     ],
//! );
//! ctx.open_index(IndexDescriptor::new("users", SpaceId::new(1), 64, schema)).unwrap();
//!
//! ctx.insert("users", &[Value::Int(7), Value::from("grace")]).unwrap();
//! let row = ctx.search("users", &Key::from(7)).unwrap();
//! assert_eq!(row, Some(vec![Value::Int(7), Value::from("grace")]));
//! ctx.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod context;
pub mod index;
pub mod record;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{EngineConfig, Error, GlobalPageId, PageNo, Result, SpaceId};

pub use buffer::{BufferPool, BufferPoolStats, StatsSnapshot};
pub use context::{IndexDescriptor, Operation, OperationOutcome, StorageContext};
pub use index::BPlusTree;
pub use record::{CodecError, Column, ColumnType, Key, Row, TableSchema, Value};
pub use storage::page::{Page, PageHeader, PageType};
pub use storage::{DiskManager, SpaceManager};
