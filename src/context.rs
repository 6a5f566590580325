//! Storage context - the engine object that owns every shared component.
//!
//! A [`StorageContext`] holds the open spaces, the buffer pool and the
//! registry of named indexes. Its lifetime is the engine's: dropping it
//! flushes the pool and closes the files.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::{BufferPool, StatsSnapshot};
use crate::common::{EngineConfig, Error, PageNo, Result, SpaceId};
use crate::index::BPlusTree;
use crate::record::{Key, Row, TableSchema, Value};
use crate::storage::SpaceManager;

/// Catalog entry for one index, supplied by the metadata store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    /// Table name the index is addressed by.
    pub name: String,
    pub space_id: SpaceId,
    /// Root page the catalog last recorded, or `PageNo::INVALID` for a new
    /// index. The root persisted in the space header wins on disagreement.
    pub root_page: PageNo,
    /// Order used when the index is created. An existing index keeps the
    /// order it was created with.
    pub order: u16,
    pub schema: TableSchema,
}

impl IndexDescriptor {
    /// Descriptor for an index that does not exist yet.
    pub fn new(name: impl Into<String>, space_id: SpaceId, order: u16, schema: TableSchema) -> Self {
        Self {
            name: name.into(),
            space_id,
            root_page: PageNo::INVALID,
            order,
            schema,
        }
    }

    pub fn with_root(mut self, root_page: PageNo) -> Self {
        self.root_page = root_page;
        self
    }
}

/// One tree operation as produced by the statement executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Search { key: Key },
    Insert { row: Row },
    Update { key: Key, row: Row },
    Delete { key: Key },
}

/// Result of an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// `Search`: the row, if the key exists.
    Row(Option<Row>),
    /// `Insert`, `Update`, `Delete`: whether a row was written or removed.
    Applied(bool),
}

type SharedTree = Arc<RwLock<BPlusTree>>;

/// Registered trees by name, and which name owns each space.
#[derive(Default)]
struct Registry {
    trees: HashMap<String, SharedTree>,
    owners: HashMap<SpaceId, String>,
}

/// Owns the space manager, buffer pool and named indexes of one engine.
///
/// # Thread Safety
/// - `indexes`: `RwLock`, taken exclusively only to open or close an index.
///   A space backs at most one registered index.
/// - each tree: its own `RwLock`, so searches share it and writers to one
///   table run one at a time while other tables proceed
pub struct StorageContext {
    config: EngineConfig,
    spaces: Arc<SpaceManager>,
    pool: Arc<BufferPool>,
    indexes: RwLock<Registry>,
}

impl StorageContext {
    /// Start an engine over `config.data_dir`.
    ///
    /// # Errors
    /// `InvalidConfig` for unusable settings, I/O errors creating the directory.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let spaces = Arc::new(SpaceManager::new(&config.data_dir)?);
        let pool = Arc::new(BufferPool::with_config(spaces.clone(), &config));

        tracing::info!(
            data_dir = %config.data_dir.display(),
            pool_capacity = config.pool_capacity,
            "storage context opened"
        );
        Ok(Self {
            config,
            spaces,
            pool,
            indexes: RwLock::new(Registry::default()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn spaces(&self) -> &Arc<SpaceManager> {
        &self.spaces
    }

    // ========================================================================
    // Index registry
    // ========================================================================

    /// Register the index described by `descriptor`, creating it on first use.
    ///
    /// Returns the root page in effect, for the catalog to record.
    ///
    /// # Errors
    /// `TableExists` if the name is already registered, `SpaceInUse` if the
    /// space already backs another index, otherwise anything
    /// [`BPlusTree::create`] or [`BPlusTree::open`] reports.
    pub fn open_index(&self, descriptor: IndexDescriptor) -> Result<PageNo> {
        let mut indexes = self.indexes.write();
        if indexes.trees.contains_key(&descriptor.name) {
            return Err(Error::TableExists(descriptor.name));
        }
        let space_id = descriptor.space_id;
        if let Some(owner) = indexes.owners.get(&space_id) {
            return Err(Error::SpaceInUse {
                space_id,
                table: owner.clone(),
            });
        }

        let header = self.spaces.open_space(space_id)?;

        let tree = if let Some(persisted) = header.root_page.valid() {
            if descriptor.root_page.is_valid() && descriptor.root_page != persisted {
                tracing::warn!(
                    table = %descriptor.name,
                    catalog_root = %descriptor.root_page,
                    persisted_root = %persisted,
                    "catalog root is stale, using the persisted root"
                );
            }
            BPlusTree::open(self.pool.clone(), space_id, descriptor.schema)?
        } else {
            BPlusTree::create(self.pool.clone(), space_id, descriptor.schema, descriptor.order)?
        };

        let root = tree.root();
        indexes.owners.insert(space_id, descriptor.name.clone());
        indexes.trees.insert(descriptor.name, Arc::new(RwLock::new(tree)));
        Ok(root)
    }

    /// Flush and unregister an index, closing its space.
    ///
    /// The registry stays locked until the space is closed, so the space
    /// cannot be registered again while it is still being shut down.
    pub fn close_index(&self, name: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        let tree = indexes
            .trees
            .remove(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        let space_id = tree.read().space_id();
        indexes.owners.remove(&space_id);

        self.pool.flush_space(space_id)?;
        self.spaces.close_space(space_id)?;
        tracing::info!(table = name, space = %space_id, "closed index");
        Ok(())
    }

    /// Registered index names, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().trees.keys().cloned().collect();
        names.sort();
        names
    }

    /// Current root page of an index.
    pub fn root_page(&self, name: &str) -> Result<PageNo> {
        Ok(self.index(name)?.read().root())
    }

    fn index(&self, name: &str) -> Result<SharedTree> {
        self.indexes
            .read()
            .trees
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    // ========================================================================
    // Tree operations
    // ========================================================================

    pub fn search(&self, table: &str, key: &Key) -> Result<Option<Row>> {
        self.index(table)?.read().search(key)
    }

    pub fn insert(&self, table: &str, row: &[Value]) -> Result<()> {
        self.index(table)?.write().insert(row)
    }

    pub fn update(&self, table: &str, key: &Key, row: &[Value]) -> Result<bool> {
        self.index(table)?.write().update(key, row)
    }

    pub fn delete(&self, table: &str, key: &Key) -> Result<bool> {
        self.index(table)?.write().delete(key)
    }

    /// Run one executor operation against `table`.
    pub fn execute(&self, table: &str, operation: Operation) -> Result<OperationOutcome> {
        let outcome = match operation {
            Operation::Search { key } => OperationOutcome::Row(self.search(table, &key)?),
            Operation::Insert { row } => {
                self.insert(table, &row)?;
                OperationOutcome::Applied(true)
            }
            Operation::Update { key, row } => OperationOutcome::Applied(self.update(table, &key, &row)?),
            Operation::Delete { key } => OperationOutcome::Applied(self.delete(table, &key)?),
        };
        Ok(outcome)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Write every dirty page back and sync every open space.
    pub fn flush(&self) -> Result<()> {
        self.pool.flush()?;
        self.spaces.sync_all()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.pool.stats()
    }

    /// Flush, close every space and report any failure.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        self.flush()?;
        *self.indexes.write() = Registry::default();
        for space_id in self.spaces.space_ids() {
            self.spaces.close_space(space_id)?;
        }
        tracing::info!(stats = %self.pool.stats(), "storage context closed");
        Ok(())
    }
}

impl Drop for StorageContext {
    fn drop(&mut self) {
        if self.spaces.space_ids().is_empty() {
            return;
        }
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "failed to flush storage context on drop");
        }
    }
}
