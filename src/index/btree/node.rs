//! B+-tree nodes and their page representation.
//!
//! A node is decoded from its page when a traversal visits it and is
//! re-encoded into a fresh page every time it is written back.
//!
//! # Leaf page
//! ```text
//! header: page_type = BTreeLeaf, prev_page / next_page = sibling links
//! slot i: encode(key_i) ++ encode(row_i)
//! ```
//!
//! # Internal page
//! ```text
//! header: page_type = BTreeInternal, right_pointer = children[n]
//! slot i: encode_key_with_child(key_i, children[i])      for i in 0..n
//! ```
//! `children[i]` holds keys `< keys[i]`; `children[n]` holds keys `>= keys[n-1]`.

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, GlobalPageId, PageNo, Result, SpaceId};
use crate::record::{self, Column, Key};
use crate::storage::page::{Page, PageHeader, PageType, Slot};

/// Sorted keys with their encoded rows, plus sibling links.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub page_no: PageNo,
    pub keys: Vec<Key>,
    /// Encoded row for each key, in the same order.
    pub rows: Vec<Vec<u8>>,
    pub prev: PageNo,
    pub next: PageNo,
}

impl LeafNode {
    pub fn new(page_no: PageNo) -> Self {
        Self {
            page_no,
            keys: Vec::new(),
            rows: Vec::new(),
            prev: PageNo::INVALID,
            next: PageNo::INVALID,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Binary search for `key`.
    pub fn find(&self, key: &Key) -> std::result::Result<usize, usize> {
        self.keys.binary_search(key)
    }

    /// Insert or overwrite. Returns `true` when an existing entry was replaced.
    pub fn upsert(&mut self, key: Key, row: Vec<u8>) -> bool {
        match self.find(&key) {
            Ok(i) => {
                self.rows[i] = row;
                true
            }
            Err(i) => {
                self.keys.insert(i, key);
                self.rows.insert(i, row);
                false
            }
        }
    }

    /// Remove `key`, returning its encoded row.
    pub fn remove(&mut self, key: &Key) -> Option<Vec<u8>> {
        let i = self.find(key).ok()?;
        self.keys.remove(i);
        Some(self.rows.remove(i))
    }

    /// Move entries `at..` into a new leaf at `right_page_no` and return it
    /// with its separator (its first key). Sibling links of both halves are
    /// updated; the old right neighbour's `prev` is the caller's job.
    pub fn split_at(&mut self, at: usize, right_page_no: PageNo) -> (Key, LeafNode) {
        let right = LeafNode {
            page_no: right_page_no,
            keys: self.keys.split_off(at),
            rows: self.rows.split_off(at),
            prev: self.page_no,
            next: self.next,
        };
        self.next = right_page_no;
        (right.keys[0].clone(), right)
    }

    /// Page bytes each entry occupies, slot included.
    pub fn entry_costs(&self, key_columns: &[Column]) -> Result<Vec<usize>> {
        self.keys
            .iter()
            .zip(&self.rows)
            .map(|(key, row)| Ok(leaf_entry_len(key, row, key_columns)? + Slot::SIZE))
            .collect()
    }

    pub fn to_page(&self, key_columns: &[Column]) -> Result<Option<Page>> {
        let mut page = Page::with_type(self.page_no, PageType::BTreeLeaf);
        {
            let header = page.header_mut();
            header.prev_page = self.prev;
            header.next_page = self.next;
        }
        for (key, row) in self.keys.iter().zip(&self.rows) {
            let mut entry = record::encode(key.values(), key_columns)?;
            entry.extend_from_slice(row);
            if !page.add_record(&entry) {
                return Ok(None);
            }
        }
        Ok(Some(page))
    }
}

/// Encoded length of a leaf entry (key followed by row).
pub fn leaf_entry_len(key: &Key, row: &[u8], key_columns: &[Column]) -> Result<usize> {
    Ok(record::encode(key.values(), key_columns)?.len() + row.len())
}

/// Encoded length of an internal entry (key followed by a child page).
pub fn internal_entry_len(key: &Key, key_columns: &[Column]) -> Result<usize> {
    Ok(record::encode(key.values(), key_columns)?.len() + 4)
}

/// Separator keys and child page numbers (`children.len() == keys.len() + 1`).
#[derive(Debug, Clone, PartialEq)]
pub struct InternalNode {
    pub page_no: PageNo,
    pub keys: Vec<Key>,
    pub children: Vec<PageNo>,
}

impl InternalNode {
    /// A new root over two children split apart at `separator`.
    pub fn new_root(page_no: PageNo, left: PageNo, separator: Key, right: PageNo) -> Self {
        Self {
            page_no,
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of the child whose subtree may hold `key`: the first `i` with
    /// `key < keys[i]`, so equal keys route right.
    pub fn child_index(&self, key: &Key) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    pub fn child_for(&self, key: &Key) -> PageNo {
        self.children[self.child_index(key)]
    }

    /// Insert a separator and its right child next to child `index`.
    pub fn insert_child(&mut self, index: usize, separator: Key, right: PageNo) {
        self.keys.insert(index, separator);
        self.children.insert(index + 1, right);
    }

    /// Keep keys `..at`, move keys `at + 1..` into a new node at
    /// `right_page_no`, and return the promoted `keys[at]` with that node.
    ///
    /// `at` must index a key.
    pub fn split_at(&mut self, at: usize, right_page_no: PageNo) -> (Key, InternalNode) {
        let right_keys = self.keys.split_off(at + 1);
        let right_children = self.children.split_off(at + 1);
        let promoted = self.keys.remove(at);
        (
            promoted,
            InternalNode {
                page_no: right_page_no,
                keys: right_keys,
                children: right_children,
            },
        )
    }

    /// Page bytes each separator entry occupies, slot included.
    pub fn entry_costs(&self, key_columns: &[Column]) -> Result<Vec<usize>> {
        self.keys
            .iter()
            .map(|key| Ok(internal_entry_len(key, key_columns)? + Slot::SIZE))
            .collect()
    }

    pub fn to_page(&self, key_columns: &[Column]) -> Result<Option<Page>> {
        let mut page = Page::with_type(self.page_no, PageType::BTreeInternal);
        page.header_mut().right_pointer = self.children.last().copied().unwrap_or(PageNo::INVALID);
        for (key, child) in self.keys.iter().zip(&self.children) {
            let entry = record::encode_key_with_child(key.values(), key_columns, *child)?;
            if !page.add_record(&entry) {
                return Ok(None);
            }
        }
        Ok(Some(page))
    }
}

/// A decoded tree page.
#[derive(Debug, Clone, PartialEq)]
pub enum BPlusNode {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl BPlusNode {
    pub fn page_no(&self) -> PageNo {
        match self {
            BPlusNode::Leaf(leaf) => leaf.page_no,
            BPlusNode::Internal(internal) => internal.page_no,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, BPlusNode::Leaf(_))
    }

    /// Decode a tree page.
    ///
    /// # Errors
    /// `Error::Corrupted` if the page is not a tree page or its entries do not
    /// decode against `key_columns`.
    pub fn from_page(page: &Page, space_id: SpaceId, key_columns: &[Column]) -> Result<Self> {
        let page_id = GlobalPageId::new(space_id, page.page_no());
        let corrupted = |reason: String| Error::Corrupted {
            page: page_id,
            reason,
        };

        match page.page_type() {
            PageType::BTreeLeaf => {
                let mut leaf = LeafNode::new(page.page_no());
                leaf.prev = page.header().prev_page;
                leaf.next = page.header().next_page;
                for (_, bytes) in page.records() {
                    let (key, consumed) = record::decode_prefix(bytes, key_columns)
                        .map_err(|e| corrupted(format!("leaf key: {e}")))?;
                    leaf.keys.push(Key(key));
                    leaf.rows.push(bytes[consumed..].to_vec());
                }
                Ok(BPlusNode::Leaf(leaf))
            }
            PageType::BTreeInternal => {
                let mut keys = Vec::with_capacity(page.record_count() as usize);
                let mut children = Vec::with_capacity(page.record_count() as usize + 1);
                for (_, bytes) in page.records() {
                    let (key, child) = record::decode_key_with_child(bytes, key_columns)
                        .map_err(|e| corrupted(format!("internal entry: {e}")))?;
                    keys.push(Key(key));
                    children.push(child);
                }
                let right = page.header().right_pointer;
                if !right.is_valid() {
                    return Err(corrupted("internal node without right pointer".to_string()));
                }
                children.push(right);
                Ok(BPlusNode::Internal(InternalNode {
                    page_no: page.page_no(),
                    keys,
                    children,
                }))
            }
            other => Err(corrupted(format!("expected a tree page, found {other:?}"))),
        }
    }

    /// Encode into a fresh page, or `Ok(None)` if the entries do not fit.
    ///
    /// # Errors
    /// Codec errors for keys that do not match `key_columns`.
    pub fn to_page(&self, key_columns: &[Column]) -> Result<Option<Page>> {
        match self {
            BPlusNode::Leaf(leaf) => leaf.to_page(key_columns),
            BPlusNode::Internal(internal) => internal.to_page(key_columns),
        }
    }
}

/// Bytes available to slots and records in one page.
pub const PAGE_CAPACITY: usize = PAGE_SIZE - PageHeader::SIZE;

/// Largest entry the tree accepts. Any two entries fit in one page, so a
/// node that overflows by one entry can always be split in two.
pub const MAX_ENTRY_SIZE: usize = PAGE_CAPACITY / 2 - Slot::SIZE;

/// Choose where to split entries with the given costs so both halves fit in
/// a page, preferring the middle.
///
/// With `promote` set the entry at the split index moves to the parent and
/// belongs to neither half (internal nodes); otherwise it starts the right
/// half (leaves). Both halves keep at least one entry.
pub fn choose_split(costs: &[usize], promote: bool) -> Option<usize> {
    let n = costs.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0usize);
    for cost in costs {
        prefix.push(prefix[prefix.len() - 1] + cost);
    }
    let total = prefix[n];

    let (first, last) = if promote { (1, n.checked_sub(2)?) } else { (1, n.checked_sub(1)?) };
    if first > last {
        return None;
    }

    let mid = n / 2;
    let mut candidates: Vec<usize> = (first..=last).collect();
    candidates.sort_by_key(|i| i.abs_diff(mid));
    candidates.into_iter().find(|&at| {
        let left = prefix[at];
        let right = if promote { total - prefix[at + 1] } else { total - prefix[at] };
        left <= PAGE_CAPACITY && right <= PAGE_CAPACITY
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ColumnType, Value};

    fn key_columns() -> Vec<Column> {
        vec![Column::new("id", ColumnType::Int).primary_key()]
    }

    fn leaf_with(page_no: u32, keys: &[i32]) -> LeafNode {
        let mut leaf = LeafNode::new(PageNo::new(page_no));
        for &k in keys {
            leaf.upsert(Key::from(k), vec![1, k as u8]);
        }
        leaf
    }

    #[test]
    fn test_leaf_upsert_keeps_order() {
        let mut leaf = leaf_with(1, &[5, 1, 3]);
        assert_eq!(leaf.keys, vec![Key::from(1), Key::from(3), Key::from(5)]);

        assert!(leaf.upsert(Key::from(3), vec![9]));
        assert_eq!(leaf.len(), 3);
        assert_eq!(leaf.rows[1], vec![9]);

        assert_eq!(leaf.remove(&Key::from(1)), Some(vec![1, 1]));
        assert_eq!(leaf.remove(&Key::from(1)), None);
    }

    #[test]
    fn test_leaf_split_links_siblings() {
        let mut leaf = leaf_with(1, &[1, 2, 3, 4]);
        leaf.next = PageNo::new(9);

        let (separator, right) = leaf.split_at(2, PageNo::new(2));
        assert_eq!(separator, Key::from(3));
        assert_eq!(leaf.keys, vec![Key::from(1), Key::from(2)]);
        assert_eq!(right.keys, vec![Key::from(3), Key::from(4)]);
        assert_eq!(leaf.next, PageNo::new(2));
        assert_eq!(right.prev, PageNo::new(1));
        assert_eq!(right.next, PageNo::new(9));
    }

    #[test]
    fn test_internal_routing_ties_go_right() {
        let node = InternalNode {
            page_no: PageNo::new(1),
            keys: vec![Key::from(10), Key::from(20)],
            children: vec![PageNo::new(2), PageNo::new(3), PageNo::new(4)],
        };
        assert_eq!(node.child_for(&Key::from(5)), PageNo::new(2));
        assert_eq!(node.child_for(&Key::from(10)), PageNo::new(3));
        assert_eq!(node.child_for(&Key::from(19)), PageNo::new(3));
        assert_eq!(node.child_for(&Key::from(20)), PageNo::new(4));
        assert_eq!(node.child_for(&Key::from(99)), PageNo::new(4));
    }

    #[test]
    fn test_internal_split_promotes_key_at_split_point() {
        let mut node = InternalNode {
            page_no: PageNo::new(1),
            keys: (1..=4).map(Key::from).collect(),
            children: (10..15).map(PageNo::new).collect(),
        };
        let (promoted, right) = node.split_at(2, PageNo::new(7));

        assert_eq!(promoted, Key::from(3));
        assert_eq!(node.keys, vec![Key::from(1), Key::from(2)]);
        assert_eq!(node.children, vec![PageNo::new(10), PageNo::new(11), PageNo::new(12)]);
        assert_eq!(right.keys, vec![Key::from(4)]);
        assert_eq!(right.children, vec![PageNo::new(13), PageNo::new(14)]);
    }

    #[test]
    fn test_page_roundtrip() {
        let cols = key_columns();
        let mut leaf = LeafNode::new(PageNo::new(4));
        leaf.prev = PageNo::new(3);
        leaf.next = PageNo::new(5);
        let row = record::encode(&[Value::Int(8)], &cols).unwrap();
        leaf.upsert(Key::from(8), row);
        let leaf = BPlusNode::Leaf(leaf);

        let page = leaf.to_page(&cols).unwrap().unwrap();
        assert_eq!(BPlusNode::from_page(&page, SpaceId::new(1), &cols).unwrap(), leaf);

        let internal = BPlusNode::Internal(InternalNode::new_root(
            PageNo::new(6),
            PageNo::new(4),
            Key::from(8),
            PageNo::new(5),
        ));
        let page = internal.to_page(&cols).unwrap().unwrap();
        assert_eq!(page.header().right_pointer, PageNo::new(5));
        assert_eq!(
            BPlusNode::from_page(&page, SpaceId::new(1), &cols).unwrap(),
            internal
        );
    }

    #[test]
    fn test_to_page_reports_overflow() {
        let cols = vec![Column::new("s", ColumnType::Varchar(2000)).primary_key()];
        let mut leaf = LeafNode::new(PageNo::new(1));
        for c in ['a', 'b', 'c'] {
            let key = Key(vec![Value::Str(c.to_string().repeat(1500))]);
            leaf.upsert(key, Vec::new());
        }
        assert!(BPlusNode::Leaf(leaf).to_page(&cols).unwrap().is_none());
    }

    #[test]
    fn test_choose_split_prefers_middle() {
        assert_eq!(choose_split(&[10; 4], false), Some(2));
        assert_eq!(choose_split(&[10; 5], true), Some(2));
        assert_eq!(choose_split(&[10], false), None);
        assert_eq!(choose_split(&[10, 10], true), None);
    }

    #[test]
    fn test_choose_split_moves_off_middle_for_large_entries() {
        let big = MAX_ENTRY_SIZE + Slot::SIZE;
        // the middle split leaves both large entries and a small one on the right
        let costs = [10, 10, 10, big, big];
        let at = choose_split(&costs, false).unwrap();
        assert_eq!(at, 3);
        assert!(costs[..at].iter().sum::<usize>() <= PAGE_CAPACITY);
        assert!(costs[at..].iter().sum::<usize>() <= PAGE_CAPACITY);
    }

    #[test]
    fn test_from_page_rejects_data_pages() {
        let page = Page::with_type(PageNo::new(1), PageType::Data);
        assert!(matches!(
            BPlusNode::from_page(&page, SpaceId::new(1), &key_columns()),
            Err(Error::Corrupted { .. })
        ));
    }
}
