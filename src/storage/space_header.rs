//! Space header - the contents of page 0 of every space.

use crate::common::PageNo;

use super::page::{Page, PageType};

/// Durable per-space metadata.
///
/// Stored as a regular slotted page of type [`PageType::SpaceHeader`]:
/// - `right_pointer` holds the index root page
/// - `next_free_page` holds the head of the free-page chain
/// - slot 0 holds `magic (4) | version (2) | order (2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceHeader {
    /// Root page of the index stored in this space, if any.
    pub root_page: PageNo,
    /// First page of the free-page chain, if any.
    pub free_head: PageNo,
    /// B+-tree order recorded when the index was created (0 if none).
    pub order: u16,
}

impl SpaceHeader {
    pub const MAGIC: [u8; 4] = *b"LEAF";
    pub const VERSION: u16 = 1;

    pub fn new() -> Self {
        Self {
            root_page: PageNo::INVALID,
            free_head: PageNo::INVALID,
            order: 0,
        }
    }

    pub fn to_page(&self) -> Page {
        let mut page = Page::with_type(PageNo::HEADER, PageType::SpaceHeader);
        {
            let header = page.header_mut();
            header.right_pointer = self.root_page;
            header.next_free_page = self.free_head;
        }

        let mut meta = [0u8; 8];
        meta[..4].copy_from_slice(&Self::MAGIC);
        meta[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
        meta[6..8].copy_from_slice(&self.order.to_le_bytes());
        let stored = page.add_record(&meta);
        debug_assert!(stored, "space header record fits in an empty page");
        page
    }

    /// Decode page 0. The error string describes what is wrong with it.
    pub fn from_page(page: &Page) -> Result<Self, String> {
        if page.page_type() != PageType::SpaceHeader {
            return Err(format!("expected space header, found {:?}", page.page_type()));
        }
        let meta = page
            .record(0)
            .filter(|meta| meta.len() == 8)
            .ok_or_else(|| "missing space header record".to_string())?;
        if meta[..4] != Self::MAGIC {
            return Err("bad space header magic".to_string());
        }
        let version = u16::from_le_bytes([meta[4], meta[5]]);
        if version != Self::VERSION {
            return Err(format!("unsupported space header version {version}"));
        }

        Ok(Self {
            root_page: page.header().right_pointer,
            free_head: page.header().next_free_page,
            order: u16::from_le_bytes([meta[6], meta[7]]),
        })
    }
}

impl Default for SpaceHeader {
    fn default() -> Self {
        Self::new()
    }
}
