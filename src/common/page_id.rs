//! Page and space identifier types.

use std::fmt;

/// Number of a page within one space file.
///
/// Using `u32` allows for 4 billion pages per space:
/// - 4,294,967,295 pages × 4KB ≈ 16TB maximum space size
///
/// Page 0 of every space is the space header page.
///
/// # Example
/// ```
/// use leafdb::PageNo;
///
/// let page_no = PageNo::new(42);
/// assert!(page_no.is_valid());
/// assert_eq!(page_no.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageNo(pub u32);

impl PageNo {
    /// Invalid/sentinel page number ("no page").
    ///
    /// Stored on disk for absent prev/next links, an empty free chain and a
    /// missing root.
    pub const INVALID: PageNo = PageNo(u32::MAX);

    /// The space header page.
    pub const HEADER: PageNo = PageNo(0);

    #[inline]
    pub fn new(no: u32) -> Self {
        PageNo(no)
    }

    /// Check if this page number is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// `None` for the sentinel, `Some(self)` otherwise.
    #[inline]
    pub fn valid(self) -> Option<PageNo> {
        self.is_valid().then_some(self)
    }

    /// Inverse of [`PageNo::valid`].
    #[inline]
    pub fn from_option(page_no: Option<PageNo>) -> PageNo {
        page_no.unwrap_or(Self::INVALID)
    }

    /// Byte offset of this page inside its space file.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        u64::from(self.0) * crate::common::config::PAGE_SIZE as u64
    }
}

impl fmt::Display for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "INVALID")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifies one space (one table/index file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub u32);

impl SpaceId {
    #[inline]
    pub fn new(id: u32) -> Self {
        SpaceId(id)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a page across the whole engine; the buffer pool cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalPageId {
    pub space_id: SpaceId,
    pub page_no: PageNo,
}

impl GlobalPageId {
    #[inline]
    pub fn new(space_id: SpaceId, page_no: PageNo) -> Self {
        Self { space_id, page_no }
    }
}

impl fmt::Display for GlobalPageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space {} page {}", self.space_id, self.page_no)
    }
}
