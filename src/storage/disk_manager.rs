//! Disk Manager - low-level file I/O for one space.
//!
//! The [`DiskManager`] handles all direct file operations of a space:
//! - Reading and writing raw pages
//! - Extending the file by one page
//! - fsync on request

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::common::config::{MAX_PAGES, PAGE_SIZE};
use crate::common::{Error, GlobalPageId, PageNo, Result, SpaceId};

/// Manages disk I/O for a single space file.
///
/// # File Layout
/// The space is stored as a single file with pages laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ header  │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// # Thread Safety
/// One reader/writer lock guards the file: page reads share it, page writes
/// and file extension take it exclusively. Reads use positional I/O so
/// concurrent readers never race on a shared cursor.
///
/// # Durability
/// Writes are not synced individually; callers batch them and call
/// [`DiskManager::sync`].
pub struct DiskManager {
    space_id: SpaceId,
    path: PathBuf,
    state: RwLock<DiskState>,
}

struct DiskState {
    file: File,
    /// Number of pages in the file.
    page_count: u32,
}

impl DiskManager {
    /// Create a new, empty space file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(space_id: SpaceId, path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;

        Ok(Self {
            space_id,
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(DiskState {
                file,
                page_count: 0,
            }),
        })
    }

    /// Open an existing space file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(space_id: SpaceId, path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        // A torn trailing page is ignored; it is overwritten on next extension.
        let page_count = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;

        Ok(Self {
            space_id,
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(DiskState { file, page_count }),
        })
    }

    #[inline]
    pub fn space_id(&self) -> SpaceId {
        self.space_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw bytes of a page.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page is beyond the end of the file.
    pub fn read_page(&self, page_no: PageNo) -> Result<Box<[u8; PAGE_SIZE]>> {
        let state = self.state.read();
        if !page_no.is_valid() || page_no.0 >= state.page_count {
            return Err(Error::PageNotFound(self.global(page_no)));
        }

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        read_at(&state.file, &mut buf[..], page_no.file_offset())?;
        Ok(buf)
    }

    /// Write the raw bytes of a page.
    ///
    /// The page must have been previously allocated with `allocate_page()`.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page hasn't been allocated.
    pub fn write_page(&self, page_no: PageNo, bytes: &[u8; PAGE_SIZE]) -> Result<()> {
        let state = self.state.write();
        if !page_no.is_valid() || page_no.0 >= state.page_count {
            return Err(Error::PageNotFound(self.global(page_no)));
        }

        write_at(&state.file, &bytes[..], page_no.file_offset())?;
        Ok(())
    }

    /// Extend the file by one zeroed page and return its number.
    ///
    /// # Errors
    /// Returns `Error::AllocationFailure` if the file cannot grow or the
    /// space has run out of page numbers.
    pub fn allocate_page(&self) -> Result<PageNo> {
        let mut state = self.state.write();

        if u64::from(state.page_count) >= MAX_PAGES {
            return Err(Error::AllocationFailure {
                space_id: self.space_id,
                reason: "page numbers exhausted".to_string(),
            });
        }

        let page_no = PageNo::new(state.page_count);
        write_at(&state.file, &[0u8; PAGE_SIZE], page_no.file_offset()).map_err(|e| {
            Error::AllocationFailure {
                space_id: self.space_id,
                reason: e.to_string(),
            }
        })?;

        state.page_count += 1;
        Ok(page_no)
    }

    /// fsync the file.
    pub fn sync(&self) -> Result<()> {
        self.state.read().file.sync_all()?;
        Ok(())
    }

    /// Get the number of pages in the space.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.state.read().page_count
    }

    /// Get the total size of the space file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        u64::from(self.page_count()) * PAGE_SIZE as u64
    }

    fn global(&self, page_no: PageNo) -> GlobalPageId {
        GlobalPageId::new(self.space_id, page_no)
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_write(buf, offset)?;
        buf = &buf[n..];
        offset += n as u64;
    }
    Ok(())
}
