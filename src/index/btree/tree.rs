//! Disk-backed B+-tree over the buffer pool.

use std::ops::Bound;
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::common::config::{MAX_ORDER, MIN_ORDER};
use crate::common::{Error, GlobalPageId, PageNo, Result, SpaceId};
use crate::record::{self, Column, Key, Row, TableSchema, Value};
use crate::storage::page::{Page, PageType};

use super::node::{
    choose_split, internal_entry_len, leaf_entry_len, BPlusNode, InternalNode, LeafNode,
    MAX_ENTRY_SIZE,
};

/// Deepest descent accepted before the tree is declared corrupt.
const MAX_HEIGHT: usize = 64;

/// A B+-tree index storing whole rows keyed by their primary key.
///
/// One tree owns one space. Its root page number lives durably in the space
/// header; nodes are addressed by page number and always re-fetched through
/// the buffer pool, so no node holds a reference to another.
///
/// Parents are never stored. A descent records the internal nodes it passed
/// and split propagation walks back up that path.
///
/// # Concurrency
/// Readers take `&self`. Mutators take `&mut self`, so writers to one tree
/// are serialized by whoever owns it.
pub struct BPlusTree {
    pool: Arc<BufferPool>,
    space_id: SpaceId,
    schema: TableSchema,
    key_columns: Vec<Column>,
    order: u16,
    root: PageNo,
}

impl BPlusTree {
    /// Create an empty tree in an open space that holds no index yet.
    ///
    /// The root leaf is written and the root pointer persisted before
    /// returning.
    ///
    /// # Errors
    /// `InvalidOrder`, `NoPrimaryKey`, `TableExists` if the space already
    /// has a root, or allocation/I/O errors.
    pub fn create(
        pool: Arc<BufferPool>,
        space_id: SpaceId,
        schema: TableSchema,
        order: u16,
    ) -> Result<Self> {
        validate_order(order)?;
        let key_columns = key_columns(&schema)?;
        if pool.spaces().header(space_id)?.root_page.is_valid() {
            return Err(Error::TableExists(schema.name.clone()));
        }

        let page = pool.new_page(space_id, PageType::BTreeLeaf)?;
        let root = page.page_no();
        pool.put_page(page, space_id)?;
        pool.flush_space(space_id)?;
        pool.spaces().set_root(space_id, root, order)?;

        tracing::info!(table = %schema.name, space = %space_id, order, root = %root, "created index");
        Ok(Self {
            pool,
            space_id,
            schema,
            key_columns,
            order,
            root,
        })
    }

    /// Open the tree stored in `space_id`, taking root and order from the
    /// space header.
    ///
    /// # Errors
    /// `Corrupted` if the space holds no index or records an invalid order.
    pub fn open(pool: Arc<BufferPool>, space_id: SpaceId, schema: TableSchema) -> Result<Self> {
        let key_columns = key_columns(&schema)?;
        let header = pool.spaces().header(space_id)?;
        let header_id = GlobalPageId::new(space_id, PageNo::HEADER);

        let root = header.root_page.valid().ok_or_else(|| Error::Corrupted {
            page: header_id,
            reason: "space holds no index".to_string(),
        })?;
        validate_order(header.order).map_err(|_| Error::Corrupted {
            page: header_id,
            reason: format!("recorded order {} is out of range", header.order),
        })?;

        tracing::info!(table = %schema.name, space = %space_id, order = header.order, root = %root, "opened index");
        Ok(Self {
            pool,
            space_id,
            schema,
            key_columns,
            order: header.order,
            root,
        })
    }

    pub fn space_id(&self) -> SpaceId {
        self.space_id
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn order(&self) -> u16 {
        self.order
    }

    pub fn root(&self) -> PageNo {
        self.root
    }

    // ========================================================================
    // Public API: point operations
    // ========================================================================

    /// Find the row stored under `key`.
    pub fn search(&self, key: &Key) -> Result<Option<Row>> {
        let (_, leaf) = self.descend(key)?;
        match leaf.find(key) {
            Ok(i) => Ok(Some(self.decode_row(&leaf.rows[i])?)),
            Err(_) => Ok(None),
        }
    }

    /// Insert `row`, replacing any row with the same primary key.
    ///
    /// # Errors
    /// Codec errors for a row that does not match the schema,
    /// `RecordTooLarge` for an entry that cannot share a page, and
    /// allocation/I/O errors from splits.
    pub fn insert(&mut self, row: &[Value]) -> Result<()> {
        let key = self.schema.key_of(row)?;
        let encoded = self.encode_row(&key, row)?;

        let (path, mut leaf) = self.descend(&key)?;
        leaf.upsert(key, encoded);
        self.store_leaf(path, leaf)
    }

    /// Replace the row stored under `key`. Returns `false` if there is none.
    ///
    /// # Errors
    /// `KeyChanged` if `row` carries a different primary key.
    pub fn update(&mut self, key: &Key, row: &[Value]) -> Result<bool> {
        if self.schema.key_of(row)? != *key {
            return Err(Error::KeyChanged);
        }
        let encoded = self.encode_row(key, row)?;

        let (path, mut leaf) = self.descend(key)?;
        let Ok(i) = leaf.find(key) else {
            return Ok(false);
        };
        leaf.rows[i] = encoded;
        self.store_leaf(path, leaf)?;
        Ok(true)
    }

    /// Remove the row stored under `key`. Returns `false` if there is none.
    ///
    /// Leaves are not merged; a leaf may end up empty.
    pub fn delete(&mut self, key: &Key) -> Result<bool> {
        let (_, mut leaf) = self.descend(key)?;
        if leaf.remove(key).is_none() {
            return Ok(false);
        }
        self.put_leaf(&leaf)?;
        Ok(true)
    }

    // ========================================================================
    // Public API: ordered access
    // ========================================================================

    /// Rows with keys inside the given bounds, in ascending key order.
    pub fn scan(&self, lower: Bound<&Key>, upper: Bound<&Key>) -> Result<Vec<(Key, Row)>> {
        let mut leaf = match lower {
            Bound::Included(key) | Bound::Excluded(key) => self.descend(key)?.1,
            Bound::Unbounded => self.leftmost_leaf()?,
        };

        let mut out = Vec::new();
        loop {
            for (key, row) in leaf.keys.iter().zip(&leaf.rows) {
                let above_lower = match lower {
                    Bound::Included(lo) => key >= lo,
                    Bound::Excluded(lo) => key > lo,
                    Bound::Unbounded => true,
                };
                if !above_lower {
                    continue;
                }
                let below_upper = match upper {
                    Bound::Included(hi) => key <= hi,
                    Bound::Excluded(hi) => key < hi,
                    Bound::Unbounded => true,
                };
                if !below_upper {
                    return Ok(out);
                }
                out.push((key.clone(), self.decode_row(row)?));
            }

            match leaf.next.valid() {
                Some(next) => leaf = self.load_leaf(next)?,
                None => return Ok(out),
            }
        }
    }

    /// Every row in key order.
    pub fn scan_all(&self) -> Result<Vec<(Key, Row)>> {
        self.scan(Bound::Unbounded, Bound::Unbounded)
    }

    /// Number of stored rows. Walks the whole leaf chain.
    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        let mut leaf = self.leftmost_leaf()?;
        loop {
            count += leaf.len();
            match leaf.next.valid() {
                Some(next) => leaf = self.load_leaf(next)?,
                None => return Ok(count),
            }
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of levels, counting the leaf level.
    pub fn height(&self) -> Result<usize> {
        let mut height = 1;
        let mut node = self.load(self.root)?;
        while let BPlusNode::Internal(internal) = node {
            height += 1;
            if height > MAX_HEIGHT {
                return Err(self.corrupted(internal.page_no, "tree deeper than expected"));
            }
            node = self.load(internal.children[0])?;
        }
        Ok(height)
    }

    /// Page numbers of the leaves, left to right along the sibling chain.
    pub fn leaf_pages(&self) -> Result<Vec<PageNo>> {
        let mut pages = Vec::new();
        let mut leaf = self.leftmost_leaf()?;
        loop {
            pages.push(leaf.page_no);
            match leaf.next.valid() {
                Some(next) => leaf = self.load_leaf(next)?,
                None => return Ok(pages),
            }
        }
    }

    // ========================================================================
    // Descent
    // ========================================================================

    /// Walk from the root to the leaf that holds or would hold `key`,
    /// returning the internal nodes passed on the way, root first.
    fn descend(&self, key: &Key) -> Result<(Vec<InternalNode>, LeafNode)> {
        let mut path = Vec::new();
        let mut page_no = self.root;
        loop {
            match self.load(page_no)? {
                BPlusNode::Leaf(leaf) => return Ok((path, leaf)),
                BPlusNode::Internal(internal) => {
                    if path.len() >= MAX_HEIGHT {
                        return Err(self.corrupted(page_no, "tree deeper than expected"));
                    }
                    page_no = internal.child_for(key);
                    path.push(internal);
                }
            }
        }
    }

    fn leftmost_leaf(&self) -> Result<LeafNode> {
        let mut page_no = self.root;
        for _ in 0..MAX_HEIGHT {
            match self.load(page_no)? {
                BPlusNode::Leaf(leaf) => return Ok(leaf),
                BPlusNode::Internal(internal) => page_no = internal.children[0],
            }
        }
        Err(self.corrupted(page_no, "tree deeper than expected"))
    }

    // ========================================================================
    // Splits
    // ========================================================================

    /// Write `leaf` back, splitting it if it holds more than `order` entries
    /// or no longer fits in a page.
    ///
    /// Every page the split cascade needs is allocated before the first page
    /// is written, so an allocation failure leaves the tree untouched.
    fn store_leaf(&mut self, path: Vec<InternalNode>, mut leaf: LeafNode) -> Result<()> {
        if leaf.len() <= self.order as usize {
            if let Some(page) = leaf.to_page(&self.key_columns)? {
                return self.put(page);
            }
        }

        let at = self.leaf_split_point(&leaf)?;
        let neighbour = match leaf.next.valid() {
            Some(next) => Some(self.load_leaf(next)?),
            None => None,
        };
        let mut reserve = self.reserve_pages(self.split_page_count(&path, &leaf)?)?;

        let right_page_no = self.take_page(&mut reserve)?;
        let (separator, right) = leaf.split_at(at, right_page_no);

        self.put_leaf(&right)?;
        self.put_leaf(&leaf)?;
        if let Some(mut neighbour) = neighbour {
            neighbour.prev = right.page_no;
            self.put_leaf(&neighbour)?;
        }

        tracing::debug!(
            space = %self.space_id,
            left = %leaf.page_no,
            right = %right.page_no,
            separator = %separator,
            "split leaf"
        );
        self.insert_into_parent(path, &mut reserve, leaf.page_no, separator, right.page_no)
    }

    /// Write `node` back, splitting it the same way as [`Self::store_leaf`].
    /// New pages come out of `reserve`.
    fn store_internal(
        &mut self,
        path: Vec<InternalNode>,
        reserve: &mut Vec<PageNo>,
        mut node: InternalNode,
    ) -> Result<()> {
        if node.len() <= self.order as usize {
            if let Some(page) = node.to_page(&self.key_columns)? {
                return self.put(page);
            }
        }

        let at = self.internal_split_point(&node)?;
        let right_page_no = self.take_page(reserve)?;
        let (promoted, right) = node.split_at(at, right_page_no);

        self.put_internal(&right)?;
        self.put_internal(&node)?;

        tracing::debug!(
            space = %self.space_id,
            left = %node.page_no,
            right = %right.page_no,
            promoted = %promoted,
            "split internal node"
        );
        self.insert_into_parent(path, reserve, node.page_no, promoted, right.page_no)
    }

    /// Hook a freshly split-off `right` sibling of `left` into the parent,
    /// growing a new root when `left` was the root.
    fn insert_into_parent(
        &mut self,
        mut path: Vec<InternalNode>,
        reserve: &mut Vec<PageNo>,
        left: PageNo,
        separator: Key,
        right: PageNo,
    ) -> Result<()> {
        let Some(mut parent) = path.pop() else {
            return self.grow_root(reserve, left, separator, right);
        };

        let index = self.child_position(&parent, left)?;
        parent.insert_child(index, separator, right);
        self.store_internal(path, reserve, parent)
    }

    /// Put a new internal root above `left` and `right`.
    ///
    /// Every dirty page of the space is flushed before the new root number is
    /// persisted, so the durable root never names a page that is not on disk.
    fn grow_root(
        &mut self,
        reserve: &mut Vec<PageNo>,
        left: PageNo,
        separator: Key,
        right: PageNo,
    ) -> Result<()> {
        let page_no = self.take_page(reserve)?;
        let root = InternalNode::new_root(page_no, left, separator, right);
        self.put_internal(&root)?;

        self.pool.flush_space(self.space_id)?;
        self.pool.spaces().set_root(self.space_id, root.page_no, self.order)?;
        self.root = root.page_no;

        tracing::debug!(space = %self.space_id, root = %self.root, "grew new root");
        Ok(())
    }

    /// Pages a split of `leaf` will allocate: one per node that overflows as
    /// separators travel up `path`, plus a new root if the root splits.
    ///
    /// The cascade is replayed on copies with placeholder page numbers. A
    /// child pointer encodes to the same width whatever its value, so the
    /// replay splits exactly where the real cascade will.
    fn split_page_count(&self, path: &[InternalNode], leaf: &LeafNode) -> Result<usize> {
        let mut leaf = leaf.clone();
        let at = self.leaf_split_point(&leaf)?;
        let (mut separator, _) = leaf.split_at(at, PageNo::INVALID);
        let mut child = leaf.page_no;
        let mut count = 1;

        for parent in path.iter().rev() {
            let mut parent = parent.clone();
            let index = self.child_position(&parent, child)?;
            parent.insert_child(index, separator, PageNo::INVALID);
            if parent.len() <= self.order as usize
                && parent.to_page(&self.key_columns)?.is_some()
            {
                return Ok(count);
            }

            let at = self.internal_split_point(&parent)?;
            count += 1;
            separator = parent.split_at(at, PageNo::INVALID).0;
            child = parent.page_no;
        }
        Ok(count + 1)
    }

    /// Allocate `count` pages for a split. On failure the pages already
    /// taken go back to the free chain.
    fn reserve_pages(&self, count: usize) -> Result<Vec<PageNo>> {
        let mut pages = Vec::with_capacity(count);
        for _ in 0..count {
            match self.pool.new_page(self.space_id, PageType::BTreeLeaf) {
                Ok(page) => pages.push(page.page_no()),
                Err(e) => {
                    for page_no in pages {
                        let page_id = GlobalPageId::new(self.space_id, page_no);
                        if let Err(free_err) = self.pool.free_page(page_id) {
                            tracing::warn!(page = %page_id, error = %free_err, "failed to release reserved page");
                        }
                    }
                    return Err(e);
                }
            }
        }
        // Handed out in allocation order.
        pages.reverse();
        Ok(pages)
    }

    fn take_page(&self, reserve: &mut Vec<PageNo>) -> Result<PageNo> {
        reserve.pop().ok_or_else(|| Error::AllocationFailure {
            space_id: self.space_id,
            reason: "split needed more pages than were reserved".to_string(),
        })
    }

    fn leaf_split_point(&self, leaf: &LeafNode) -> Result<usize> {
        let costs = leaf.entry_costs(&self.key_columns)?;
        choose_split(&costs, false)
            .ok_or_else(|| self.corrupted(leaf.page_no, "leaf cannot be split to fit"))
    }

    fn internal_split_point(&self, node: &InternalNode) -> Result<usize> {
        let costs = node.entry_costs(&self.key_columns)?;
        choose_split(&costs, true)
            .ok_or_else(|| self.corrupted(node.page_no, "internal node cannot be split to fit"))
    }

    fn child_position(&self, parent: &InternalNode, child: PageNo) -> Result<usize> {
        parent
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| self.corrupted(parent.page_no, "split child missing from parent"))
    }

    // ========================================================================
    // Page plumbing
    // ========================================================================

    fn load(&self, page_no: PageNo) -> Result<BPlusNode> {
        let page = self.pool.get_page(GlobalPageId::new(self.space_id, page_no))?;
        BPlusNode::from_page(&page, self.space_id, &self.key_columns)
    }

    fn load_leaf(&self, page_no: PageNo) -> Result<LeafNode> {
        match self.load(page_no)? {
            BPlusNode::Leaf(leaf) => Ok(leaf),
            BPlusNode::Internal(_) => Err(self.corrupted(page_no, "sibling link names an internal node")),
        }
    }

    fn put(&self, page: Page) -> Result<()> {
        self.pool.put_page(page, self.space_id)
    }

    fn put_leaf(&self, leaf: &LeafNode) -> Result<()> {
        let page = leaf
            .to_page(&self.key_columns)?
            .ok_or_else(|| self.corrupted(leaf.page_no, "leaf does not fit in a page"))?;
        self.put(page)
    }

    fn put_internal(&self, node: &InternalNode) -> Result<()> {
        let page = node
            .to_page(&self.key_columns)?
            .ok_or_else(|| self.corrupted(node.page_no, "internal node does not fit in a page"))?;
        self.put(page)
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Encode `row` and check that both its leaf entry and a separator built
    /// from `key` stay within the per-entry limit.
    fn encode_row(&self, key: &Key, row: &[Value]) -> Result<Vec<u8>> {
        let encoded = record::encode(row, self.schema.columns())?;
        let size = leaf_entry_len(key, &encoded, &self.key_columns)?
            .max(internal_entry_len(key, &self.key_columns)?);
        if size > MAX_ENTRY_SIZE {
            return Err(Error::RecordTooLarge {
                size,
                max: MAX_ENTRY_SIZE,
            });
        }
        Ok(encoded)
    }

    fn decode_row(&self, bytes: &[u8]) -> Result<Row> {
        Ok(record::decode(bytes, self.schema.columns())?)
    }

    fn corrupted(&self, page_no: PageNo, reason: &str) -> Error {
        Error::Corrupted {
            page: GlobalPageId::new(self.space_id, page_no),
            reason: reason.to_string(),
        }
    }
}

fn validate_order(order: u16) -> Result<()> {
    if (MIN_ORDER..=MAX_ORDER).contains(&order) {
        Ok(())
    } else {
        Err(Error::InvalidOrder(order))
    }
}

fn key_columns(schema: &TableSchema) -> Result<Vec<Column>> {
    let columns = schema.key_columns();
    if columns.is_empty() {
        return Err(Error::NoPrimaryKey(schema.name.clone()));
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ColumnType;
    use crate::storage::SpaceManager;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const SPACE: SpaceId = SpaceId(1);

    fn schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                Column::new("id", ColumnType::Int).primary_key(),
                Column::new("name", ColumnType::Varchar(10)),
            ],
        )
    }

    fn row(id: i32) -> Row {
        vec![Value::Int(id), Value::Str(format!("user{}", id % 1000))]
    }

    fn setup(order: u16) -> (TempDir, BPlusTree) {
        let dir = TempDir::new().unwrap();
        let spaces = Arc::new(SpaceManager::new(dir.path()).unwrap());
        spaces.open_space(SPACE).unwrap();
        let pool = Arc::new(BufferPool::new(spaces, 64));
        let tree = BPlusTree::create(pool, SPACE, schema(), order).unwrap();
        (dir, tree)
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, tree) = setup(4);
        assert_eq!(tree.search(&Key::from(1)).unwrap(), None);
        assert_eq!(tree.len().unwrap(), 0);
        assert_eq!(tree.height().unwrap(), 1);
    }

    #[test]
    fn test_order_three_scenario() {
        let (_dir, mut tree) = setup(3);
        for id in 1..=10 {
            tree.insert(&row(id)).unwrap();
        }

        assert!(tree.leaf_pages().unwrap().len() >= 3);
        assert!(tree.height().unwrap() >= 2);
        assert_eq!(tree.search(&Key::from(7)).unwrap(), Some(row(7)));

        assert!(tree.delete(&Key::from(5)).unwrap());
        assert_eq!(tree.search(&Key::from(5)).unwrap(), None);
        assert_eq!(tree.search(&Key::from(4)).unwrap(), Some(row(4)));
        assert_eq!(tree.search(&Key::from(6)).unwrap(), Some(row(6)));
    }

    #[test]
    fn test_leaf_chain_is_ordered() {
        let (_dir, mut tree) = setup(4);
        for id in [50, 10, 40, 20, 30, 60, 5, 45, 15, 25, 35, 55] {
            tree.insert(&row(id)).unwrap();
        }

        let keys: Vec<Key> = tree.scan_all().unwrap().into_iter().map(|(k, _)| k).collect();
        let mut expected: Vec<Key> = [5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60]
            .into_iter()
            .map(Key::from)
            .collect();
        expected.sort();
        assert_eq!(keys, expected);

        // prev links mirror next links
        let leaves = tree.leaf_pages().unwrap();
        for pair in leaves.windows(2) {
            let right = tree.load_leaf(pair[1]).unwrap();
            assert_eq!(right.prev, pair[0]);
        }
    }

    #[test]
    fn test_insert_is_upsert() {
        let (_dir, mut tree) = setup(3);
        tree.insert(&row(1)).unwrap();
        let replacement = vec![Value::Int(1), Value::from("again")];
        tree.insert(&replacement).unwrap();
        assert_eq!(tree.len().unwrap(), 1);
        assert_eq!(tree.search(&Key::from(1)).unwrap(), Some(replacement));
    }

    #[test]
    fn test_delete_absent_key() {
        let (_dir, mut tree) = setup(3);
        for id in 1..=5 {
            tree.insert(&row(id)).unwrap();
        }
        assert!(!tree.delete(&Key::from(99)).unwrap());
        assert_eq!(tree.len().unwrap(), 5);
    }

    #[test]
    fn test_update() {
        let (_dir, mut tree) = setup(3);
        for id in 1..=6 {
            tree.insert(&row(id)).unwrap();
        }
        let new_row = vec![Value::Int(4), Value::from("renamed")];
        assert!(tree.update(&Key::from(4), &new_row).unwrap());
        assert_eq!(tree.search(&Key::from(4)).unwrap(), Some(new_row));

        assert!(!tree.update(&Key::from(40), &[Value::Int(40), Value::from("x")]).unwrap());
        assert!(matches!(
            tree.update(&Key::from(4), &row(5)),
            Err(Error::KeyChanged)
        ));
    }

    #[test]
    fn test_scan_bounds() {
        let (_dir, mut tree) = setup(3);
        for id in 1..=20 {
            tree.insert(&row(id)).unwrap();
        }
        let ids = |rows: Vec<(Key, Row)>| -> Vec<Key> { rows.into_iter().map(|(k, _)| k).collect() };

        let (lo, hi) = (Key::from(5), Key::from(9));
        assert_eq!(
            ids(tree.scan(Bound::Included(&lo), Bound::Excluded(&hi)).unwrap()),
            (5..9).map(Key::from).collect::<Vec<_>>()
        );
        assert_eq!(
            ids(tree.scan(Bound::Excluded(&lo), Bound::Included(&hi)).unwrap()),
            (6..=9).map(Key::from).collect::<Vec<_>>()
        );
        assert_eq!(
            ids(tree.scan(Bound::Unbounded, Bound::Excluded(&Key::from(3))).unwrap()),
            vec![Key::from(1), Key::from(2)]
        );
        assert_eq!(
            ids(tree.scan(Bound::Included(&Key::from(19)), Bound::Unbounded).unwrap()),
            vec![Key::from(19), Key::from(20)]
        );
    }

    #[test]
    fn test_rejects_bad_order_and_schema() {
        let dir = TempDir::new().unwrap();
        let spaces = Arc::new(SpaceManager::new(dir.path()).unwrap());
        spaces.open_space(SPACE).unwrap();
        let pool = Arc::new(BufferPool::new(spaces, 16));

        assert!(matches!(
            BPlusTree::create(pool.clone(), SPACE, schema(), 2),
            Err(Error::InvalidOrder(2))
        ));
        assert!(matches!(
            BPlusTree::create(pool.clone(), SPACE, schema(), MAX_ORDER + 1),
            Err(Error::InvalidOrder(_))
        ));

        let keyless = TableSchema::new("t", vec![Column::new("v", ColumnType::Int)]);
        assert!(matches!(
            BPlusTree::create(pool.clone(), SPACE, keyless, 3),
            Err(Error::NoPrimaryKey(_))
        ));

        BPlusTree::create(pool.clone(), SPACE, schema(), 3).unwrap();
        assert!(matches!(
            BPlusTree::create(pool, SPACE, schema(), 3),
            Err(Error::TableExists(_))
        ));
    }

    #[test]
    fn test_oversized_row_is_rejected() {
        let dir = TempDir::new().unwrap();
        let spaces = Arc::new(SpaceManager::new(dir.path()).unwrap());
        spaces.open_space(SPACE).unwrap();
        let pool = Arc::new(BufferPool::new(spaces, 16));
        let wide = TableSchema::new(
            "wide",
            vec![
                Column::new("id", ColumnType::Int).primary_key(),
                Column::new("body", ColumnType::Varchar(4000)),
            ],
        );
        let mut tree = BPlusTree::create(pool, SPACE, wide, 8).unwrap();

        let err = tree
            .insert(&[Value::Int(1), Value::Str("x".repeat(3000))])
            .unwrap_err();
        assert!(matches!(err, Error::RecordTooLarge { .. }));
        assert_eq!(tree.len().unwrap(), 0);

        // entries near the limit still split cleanly
        for id in 0..12 {
            tree.insert(&[Value::Int(id), Value::Str("y".repeat(1900))]).unwrap();
        }
        assert_eq!(tree.len().unwrap(), 12);
        assert!(tree.leaf_pages().unwrap().len() >= 6);
    }

    #[test]
    fn test_root_split_is_durable() {
        let (dir, mut tree) = setup(3);
        for id in 1..=10 {
            tree.insert(&row(id)).unwrap();
        }
        let root = tree.root();
        assert_eq!(tree.pool.spaces().header(SPACE).unwrap().root_page, root);
        drop(tree);

        let spaces = Arc::new(SpaceManager::new(dir.path()).unwrap());
        spaces.open_space(SPACE).unwrap();
        let pool = Arc::new(BufferPool::new(spaces, 64));
        let reopened = BPlusTree::open(pool, SPACE, schema()).unwrap();
        assert_eq!(reopened.root(), root);
        assert_eq!(reopened.order(), 3);
    }

    fn pending_split(tree: &BPlusTree, id: i32) -> usize {
        let key = Key::from(id);
        let (path, mut leaf) = tree.descend(&key).unwrap();
        leaf.upsert(key, record::encode(&row(id), tree.schema.columns()).unwrap());
        tree.split_page_count(&path, &leaf).unwrap()
    }

    #[test]
    fn test_split_page_count_follows_cascade() {
        let (_dir, mut tree) = setup(3);
        for id in 1..=3 {
            tree.insert(&row(id)).unwrap();
        }
        // Root leaf splits and a root grows above it.
        assert_eq!(pending_split(&tree, 4), 2);

        for id in 4..=5 {
            tree.insert(&row(id)).unwrap();
        }
        // Leaf splits, the root absorbs the separator.
        assert_eq!(pending_split(&tree, 6), 1);

        for id in 6..=9 {
            tree.insert(&row(id)).unwrap();
        }
        // Leaf, full root and a new root.
        assert_eq!(pending_split(&tree, 10), 3);
    }

    #[test]
    fn test_splits_allocate_only_pages_they_use() {
        let (_dir, mut tree) = setup(3);
        for id in (1..=300).rev() {
            tree.insert(&row(id)).unwrap();
        }

        let mut reachable = 0;
        let mut pending = vec![tree.root()];
        while let Some(page_no) = pending.pop() {
            reachable += 1;
            if let BPlusNode::Internal(node) = tree.load(page_no).unwrap() {
                pending.extend(node.children);
            }
        }
        let page_count = tree.pool.spaces().page_count(SPACE).unwrap();
        assert_eq!(page_count as usize, reachable + 1);
        assert_eq!(tree.len().unwrap(), 300);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(i32, String),
        Delete(i32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0..200i32, "[a-z]{0,10}").prop_map(|(k, v)| Op::Insert(k, v)),
            1 => (0..200i32).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_matches_btreemap(order in 3u16..8, ops in prop::collection::vec(op(), 1..300)) {
            let (_dir, mut tree) = setup(order);
            let mut model = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(k, v) => {
                        let row = vec![Value::Int(k), Value::Str(v)];
                        tree.insert(&row).unwrap();
                        model.insert(k, row);
                    }
                    Op::Delete(k) => {
                        let removed = tree.delete(&Key::from(k)).unwrap();
                        prop_assert_eq!(removed, model.remove(&k).is_some());
                    }
                }
            }

            for k in 0..200 {
                prop_assert_eq!(tree.search(&Key::from(k)).unwrap(), model.get(&k).cloned());
            }
            let scanned: Vec<Row> = tree.scan_all().unwrap().into_iter().map(|(_, r)| r).collect();
            let expected: Vec<Row> = model.into_values().collect();
            prop_assert_eq!(scanned, expected);
        }
    }
}
