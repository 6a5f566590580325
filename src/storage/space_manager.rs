//! Space Manager - open space files, page allocation and the free-page chain.
//!
//! One space is one file holding one table/index. The manager owns the
//! open-file table and each space's header page (root pointer, free-chain
//! head), replacing process-wide registries with an explicit object whose
//! lifetime is the engine's.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::common::{Error, GlobalPageId, PageNo, Result, SpaceId};
use crate::storage::page::{Page, PageDecodeError, PageType};
use crate::storage::{DiskManager, SpaceHeader};

/// One open space: its file and a cached copy of its header page.
struct Space {
    disk: DiskManager,
    /// Guards allocation/free so the chain head and file length move together.
    header: Mutex<SpaceHeader>,
}

/// Owns every open space of an engine instance.
///
/// # Thread Safety
/// - `spaces`: `RwLock`, lookups share it, open/close take it exclusively
/// - per-space `header`: `Mutex`, serializes allocation and free-chain edits
/// - per-space file: `RwLock` inside [`DiskManager`]
pub struct SpaceManager {
    data_dir: PathBuf,
    spaces: RwLock<HashMap<SpaceId, Arc<Space>>>,
}

impl SpaceManager {
    /// Create a manager for space files under `data_dir`, creating the
    /// directory if needed.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        Ok(Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            spaces: RwLock::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File backing `space_id`. Stable for the lifetime of the directory.
    pub fn space_path(&self, space_id: SpaceId) -> PathBuf {
        self.data_dir.join(format!("space_{:08}.leaf", space_id.0))
    }

    // ========================================================================
    // Open / close
    // ========================================================================

    /// Open (or create) the file for `space_id` and return its header.
    ///
    /// A new space gets page 0 written and synced immediately. Opening an
    /// already-open space is a no-op.
    ///
    /// # Errors
    /// I/O errors, or `Error::Corrupted` if page 0 is not a space header.
    pub fn open_space(&self, space_id: SpaceId) -> Result<SpaceHeader> {
        let mut spaces = self.spaces.write();
        if let Some(space) = spaces.get(&space_id) {
            return Ok(*space.header.lock());
        }

        let path = self.space_path(space_id);
        let disk = if path.exists() {
            DiskManager::open(space_id, &path)?
        } else {
            DiskManager::create(space_id, &path)?
        };

        let header = if disk.page_count() == 0 {
            let page_no = disk.allocate_page()?;
            debug_assert_eq!(page_no, PageNo::HEADER);
            let header = SpaceHeader::new();
            disk.write_page(PageNo::HEADER, &header.to_page().to_bytes())?;
            disk.sync()?;
            tracing::info!(space = %space_id, path = %path.display(), "created space");
            header
        } else {
            let header_id = GlobalPageId::new(space_id, PageNo::HEADER);
            let page = decode_page(header_id, &disk.read_page(PageNo::HEADER)?[..])?;
            let header = SpaceHeader::from_page(&page).map_err(|reason| Error::Corrupted {
                page: header_id,
                reason,
            })?;
            tracing::info!(
                space = %space_id,
                pages = disk.page_count(),
                root = %header.root_page,
                "opened space"
            );
            header
        };

        spaces.insert(
            space_id,
            Arc::new(Space {
                disk,
                header: Mutex::new(header),
            }),
        );
        Ok(header)
    }

    /// Sync and forget an open space. Dirty pages cached elsewhere must have
    /// been flushed first.
    pub fn close_space(&self, space_id: SpaceId) -> Result<()> {
        let space = self
            .spaces
            .write()
            .remove(&space_id)
            .ok_or(Error::SpaceNotOpen(space_id))?;
        space.disk.sync()
    }

    pub fn is_open(&self, space_id: SpaceId) -> bool {
        self.spaces.read().contains_key(&space_id)
    }

    /// Ids of all open spaces, ascending.
    pub fn space_ids(&self) -> Vec<SpaceId> {
        let mut ids: Vec<SpaceId> = self.spaces.read().keys().copied().collect();
        ids.sort();
        ids
    }

    // ========================================================================
    // Page I/O
    // ========================================================================

    /// Load and decode a page. A never-written page decodes as an empty,
    /// clean page.
    ///
    /// # Errors
    /// `SpaceNotOpen`, `PageNotFound`, `ChecksumMismatch`, `Corrupted` or I/O.
    pub fn read_page(&self, page_id: GlobalPageId) -> Result<Page> {
        let space = self.space(page_id.space_id)?;
        let bytes = space.disk.read_page(page_id.page_no)?;

        if Page::is_zeroed(&bytes[..]) {
            let mut page = Page::new(page_id.page_no);
            page.clear_dirty();
            return Ok(page);
        }

        let page = decode_page(page_id, &bytes[..])?;
        if page.page_no() != page_id.page_no {
            return Err(Error::Corrupted {
                page: page_id,
                reason: format!("header names page {}", page.page_no()),
            });
        }
        Ok(page)
    }

    /// Write a page to its slot in the space file (no fsync).
    pub fn write_page(&self, space_id: SpaceId, page: &Page) -> Result<()> {
        let space = self.space(space_id)?;
        space.disk.write_page(page.page_no(), &page.to_bytes())
    }

    pub fn sync(&self, space_id: SpaceId) -> Result<()> {
        self.space(space_id)?.disk.sync()
    }

    pub fn sync_all(&self) -> Result<()> {
        let spaces: Vec<Arc<Space>> = self.spaces.read().values().cloned().collect();
        for space in spaces {
            space.disk.sync()?;
        }
        Ok(())
    }

    pub fn page_count(&self, space_id: SpaceId) -> Result<u32> {
        Ok(self.space(space_id)?.disk.page_count())
    }

    // ========================================================================
    // Allocation and the free-page chain
    // ========================================================================

    /// Hand out a page number: the head of the free chain if there is one,
    /// otherwise a new page at the end of the file.
    ///
    /// # Errors
    /// `Error::AllocationFailure` if the file cannot grow; errors reading the
    /// free chain propagate unchanged.
    pub fn allocate_page(&self, space_id: SpaceId) -> Result<PageNo> {
        let space = self.space(space_id)?;
        let mut header = space.header.lock();

        if let Some(head) = header.free_head.valid() {
            let head_id = GlobalPageId::new(space_id, head);
            let page = decode_page(head_id, &space.disk.read_page(head)?[..])?;
            if page.page_type() != PageType::Free {
                return Err(Error::Corrupted {
                    page: head_id,
                    reason: "free chain points at a page in use".to_string(),
                });
            }

            let mut updated = *header;
            updated.free_head = page.header().next_free_page;
            persist_header(&space.disk, &updated)?;
            *header = updated;

            tracing::debug!(space = %space_id, page = %head, "reused free page");
            return Ok(head);
        }

        let page_no = space.disk.allocate_page()?;
        tracing::debug!(space = %space_id, page = %page_no, "extended space");
        Ok(page_no)
    }

    /// Push a page onto the space's free chain.
    ///
    /// Any cached copy of the page must be discarded by the caller.
    ///
    /// # Errors
    /// `Error::ReservedPage` for the header page; I/O errors otherwise.
    pub fn free_page(&self, page_id: GlobalPageId) -> Result<()> {
        if page_id.page_no == PageNo::HEADER || !page_id.page_no.is_valid() {
            return Err(Error::ReservedPage(page_id));
        }
        let space = self.space(page_id.space_id)?;
        let mut header = space.header.lock();

        let mut page = Page::with_type(page_id.page_no, PageType::Free);
        page.header_mut().next_free_page = header.free_head;
        space.disk.write_page(page_id.page_no, &page.to_bytes())?;

        let mut updated = *header;
        updated.free_head = page_id.page_no;
        persist_header(&space.disk, &updated)?;
        *header = updated;

        tracing::debug!(page = %page_id, "freed page");
        Ok(())
    }

    // ========================================================================
    // Root pointer
    // ========================================================================

    pub fn header(&self, space_id: SpaceId) -> Result<SpaceHeader> {
        Ok(*self.space(space_id)?.header.lock())
    }

    /// Durably record the index root and order of a space.
    pub fn set_root(&self, space_id: SpaceId, root_page: PageNo, order: u16) -> Result<()> {
        let space = self.space(space_id)?;
        let mut header = space.header.lock();

        let mut updated = *header;
        updated.root_page = root_page;
        updated.order = order;
        persist_header(&space.disk, &updated)?;
        *header = updated;

        tracing::debug!(space = %space_id, root = %root_page, "persisted root");
        Ok(())
    }

    fn space(&self, space_id: SpaceId) -> Result<Arc<Space>> {
        self.spaces
            .read()
            .get(&space_id)
            .cloned()
            .ok_or(Error::SpaceNotOpen(space_id))
    }
}

fn persist_header(disk: &DiskManager, header: &SpaceHeader) -> Result<()> {
    disk.write_page(PageNo::HEADER, &header.to_page().to_bytes())?;
    disk.sync()
}

fn decode_page(page_id: GlobalPageId, bytes: &[u8]) -> Result<Page> {
    Page::from_bytes(bytes).map_err(|e| match e {
        PageDecodeError::ChecksumMismatch => Error::ChecksumMismatch(page_id),
        other => Error::Corrupted {
            page: page_id,
            reason: other.to_string(),
        },
    })
}
