//! Page header and type definitions.
//!
//! Every page starts with a [`PageHeader`] containing:
//! - [`PageType`] discriminator
//! - slot directory and free-space bookkeeping
//! - prev/next/right links for leaf chaining and index pages
//! - free-page chain link
//! - CRC32 checksum for integrity

use crate::common::config::PAGE_SIZE;
use crate::common::PageNo;

use super::slot::Slot;

/// Type of page stored on disk.
///
/// Uses `#[repr(u8)]` to guarantee a 1-byte representation for serialization.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Uninitialized page.
    #[default]
    Invalid = 0,
    /// Heap page holding table rows.
    Data = 1,
    /// B+-tree internal (non-leaf) node.
    BTreeInternal = 2,
    /// B+-tree leaf node.
    BTreeLeaf = 3,
    /// Page on the space's free-page chain.
    Free = 4,
    /// Page 0 of a space: root pointer, order and free-chain head.
    SpaceHeader = 5,
}

impl PageType {
    /// Convert from u8, returning Invalid for unknown values.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PageType::Data,
            2 => PageType::BTreeInternal,
            3 => PageType::BTreeLeaf,
            4 => PageType::Free,
            5 => PageType::SpaceHeader,
            _ => PageType::Invalid,
        }
    }

    /// Data vs. index distinction used by the space layer.
    pub fn is_index(&self) -> bool {
        matches!(self, PageType::BTreeInternal | PageType::BTreeLeaf)
    }
}

/// Metadata stored at the beginning of every page.
///
/// # Layout (40 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     page_no
/// 4       4     prev_page
/// 8       4     next_page
/// 12      2     record_count
/// 14      2     free_space
/// 16      2     slot_count
/// 18      2     first_free_slot
/// 20      2     last_slot_offset (heap start)
/// 22      1     page_type
/// 23      1     flags
/// 24      4     checksum (CRC32)
/// 28      4     right_pointer
/// 32      4     next_free_page
/// 36      4     next_frag_page
/// ```
///
/// The dirty flag lives only in memory and is never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_no: PageNo,
    pub prev_page: PageNo,
    pub next_page: PageNo,
    /// Number of `Used` slots.
    pub record_count: u16,
    /// Logical free bytes (records and slots not yet accounted for).
    pub free_space: u16,
    /// Number of slots ever allocated; slots are never removed.
    pub slot_count: u16,
    /// Head of the intra-page free-slot list, or [`Slot::NO_SLOT`].
    pub first_free_slot: u8,
    /// Lowest heap offset in use; the heap grows downward from `PAGE_SIZE`.
    pub heap_start: u16,
    pub page_type: PageType,
    pub flags: u8,
    pub checksum: u32,
    /// Rightmost child for internal index pages.
    pub right_pointer: PageNo,
    pub next_free_page: PageNo,
    pub next_frag_page: PageNo,
    /// In-memory only: page differs from its on-disk image.
    pub dirty: bool,
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 40;

    pub const OFFSET_PAGE_NO: usize = 0;
    pub const OFFSET_PREV_PAGE: usize = 4;
    pub const OFFSET_NEXT_PAGE: usize = 8;
    pub const OFFSET_RECORD_COUNT: usize = 12;
    pub const OFFSET_FREE_SPACE: usize = 14;
    pub const OFFSET_SLOT_COUNT: usize = 16;
    pub const OFFSET_FIRST_FREE_SLOT: usize = 18;
    pub const OFFSET_LAST_SLOT_OFFSET: usize = 20;
    pub const OFFSET_PAGE_TYPE: usize = 22;
    pub const OFFSET_FLAGS: usize = 23;
    pub const OFFSET_CHECKSUM: usize = 24;
    pub const OFFSET_RIGHT_POINTER: usize = 28;
    pub const OFFSET_NEXT_FREE_PAGE: usize = 32;
    pub const OFFSET_NEXT_FRAG_PAGE: usize = 36;

    /// Free bytes in an empty page.
    pub const EMPTY_FREE_SPACE: u16 = (PAGE_SIZE - Self::SIZE) as u16;

    /// Header of a freshly allocated page: no links, no records, marked dirty.
    pub fn new(page_no: PageNo) -> Self {
        Self {
            page_no,
            prev_page: PageNo::INVALID,
            next_page: PageNo::INVALID,
            record_count: 0,
            free_space: Self::EMPTY_FREE_SPACE,
            slot_count: 0,
            first_free_slot: Slot::NO_SLOT,
            heap_start: PAGE_SIZE as u16,
            page_type: PageType::Invalid,
            flags: 0,
            checksum: 0,
            right_pointer: PageNo::INVALID,
            next_free_page: PageNo::INVALID,
            next_frag_page: PageNo::INVALID,
            dirty: true,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// The returned header is clean (`dirty == false`).
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        let first_free = read_u16(data, Self::OFFSET_FIRST_FREE_SLOT);

        Self {
            page_no: PageNo(read_u32(data, Self::OFFSET_PAGE_NO)),
            prev_page: PageNo(read_u32(data, Self::OFFSET_PREV_PAGE)),
            next_page: PageNo(read_u32(data, Self::OFFSET_NEXT_PAGE)),
            record_count: read_u16(data, Self::OFFSET_RECORD_COUNT),
            free_space: read_u16(data, Self::OFFSET_FREE_SPACE),
            slot_count: read_u16(data, Self::OFFSET_SLOT_COUNT),
            first_free_slot: u8::try_from(first_free).unwrap_or(Slot::NO_SLOT),
            heap_start: read_u16(data, Self::OFFSET_LAST_SLOT_OFFSET),
            page_type: PageType::from_u8(data[Self::OFFSET_PAGE_TYPE]),
            flags: data[Self::OFFSET_FLAGS],
            checksum: read_u32(data, Self::OFFSET_CHECKSUM),
            right_pointer: PageNo(read_u32(data, Self::OFFSET_RIGHT_POINTER)),
            next_free_page: PageNo(read_u32(data, Self::OFFSET_NEXT_FREE_PAGE)),
            next_frag_page: PageNo(read_u32(data, Self::OFFSET_NEXT_FRAG_PAGE)),
            dirty: false,
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        write_u32(data, Self::OFFSET_PAGE_NO, self.page_no.0);
        write_u32(data, Self::OFFSET_PREV_PAGE, self.prev_page.0);
        write_u32(data, Self::OFFSET_NEXT_PAGE, self.next_page.0);
        write_u16(data, Self::OFFSET_RECORD_COUNT, self.record_count);
        write_u16(data, Self::OFFSET_FREE_SPACE, self.free_space);
        write_u16(data, Self::OFFSET_SLOT_COUNT, self.slot_count);
        write_u16(data, Self::OFFSET_FIRST_FREE_SLOT, u16::from(self.first_free_slot));
        write_u16(data, Self::OFFSET_LAST_SLOT_OFFSET, self.heap_start);
        data[Self::OFFSET_PAGE_TYPE] = self.page_type as u8;
        data[Self::OFFSET_FLAGS] = self.flags;
        write_u32(data, Self::OFFSET_CHECKSUM, self.checksum);
        write_u32(data, Self::OFFSET_RIGHT_POINTER, self.right_pointer.0);
        write_u32(data, Self::OFFSET_NEXT_FREE_PAGE, self.next_free_page.0);
        write_u32(data, Self::OFFSET_NEXT_FRAG_PAGE, self.next_frag_page.0);
    }

    /// End of the slot directory for the current slot count.
    #[inline]
    pub fn slot_array_end(&self) -> usize {
        Self::SIZE + self.slot_count as usize * Slot::SIZE
    }

    /// Compute CRC32 checksum of a serialized page.
    ///
    /// The checksum field itself is hashed as zeros so the checksum does not
    /// include itself.
    pub fn compute_checksum(page_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&page_data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&page_data[Self::OFFSET_CHECKSUM + 4..]);
        hasher.finalize()
    }

    /// Verify that the stored checksum matches the computed checksum.
    pub fn verify_checksum(&self, page_data: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(page_data)
    }
}

#[inline]
pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
pub(crate) fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_from_u8() {
        assert_eq!(PageType::from_u8(0), PageType::Invalid);
        assert_eq!(PageType::from_u8(1), PageType::Data);
        assert_eq!(PageType::from_u8(2), PageType::BTreeInternal);
        assert_eq!(PageType::from_u8(3), PageType::BTreeLeaf);
        assert_eq!(PageType::from_u8(4), PageType::Free);
        assert_eq!(PageType::from_u8(5), PageType::SpaceHeader);
        assert_eq!(PageType::from_u8(255), PageType::Invalid);
        assert!(PageType::BTreeLeaf.is_index());
        assert!(!PageType::Data.is_index());
    }

    #[test]
    fn test_new_header_defaults() {
        let header = PageHeader::new(PageNo::new(9));
        assert_eq!(header.page_no, PageNo::new(9));
        assert!(!header.prev_page.is_valid());
        assert!(!header.next_page.is_valid());
        assert_eq!(header.record_count, 0);
        assert_eq!(header.free_space as usize, PAGE_SIZE - PageHeader::SIZE);
        assert_eq!(header.heap_start as usize, PAGE_SIZE);
        assert_eq!(header.first_free_slot, Slot::NO_SLOT);
        assert_eq!(header.page_type, PageType::Invalid);
        assert!(header.dirty);
    }

    #[test]
    fn test_header_roundtrip_drops_dirty_flag() {
        let mut original = PageHeader::new(PageNo::new(17));
        original.prev_page = PageNo::new(3);
        original.next_page = PageNo::new(5);
        original.record_count = 12;
        original.slot_count = 14;
        original.first_free_slot = 2;
        original.page_type = PageType::BTreeLeaf;
        original.checksum = 0xDEADBEEF;
        original.right_pointer = PageNo::new(77);

        let mut buffer = [0u8; PageHeader::SIZE];
        original.write_to(&mut buffer);

        let recovered = PageHeader::from_bytes(&buffer);
        assert!(!recovered.dirty);
        assert_eq!(recovered, PageHeader { dirty: false, ..original });
    }

    #[test]
    fn test_header_byte_layout() {
        let mut header = PageHeader::new(PageNo::new(0x04030201));
        header.page_type = PageType::Data;

        let mut buffer = [0u8; PageHeader::SIZE];
        header.write_to(&mut buffer);

        assert_eq!(buffer[0], 0x01);
        assert_eq!(buffer[3], 0x04);
        assert_eq!(buffer[PageHeader::OFFSET_PAGE_TYPE], 1);
        assert_eq!(&buffer[4..8], &[0xFF; 4]); // no prev page
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut page_data = [0u8; PAGE_SIZE];
        page_data[100] = 0xAB;

        let checksum1 = PageHeader::compute_checksum(&page_data);
        page_data[PageHeader::OFFSET_CHECKSUM..PageHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&[0xFF; 4]);
        let checksum2 = PageHeader::compute_checksum(&page_data);

        assert_eq!(checksum1, checksum2);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut page_data = [0u8; PAGE_SIZE];
        page_data[500] = 0x10;
        let mut header = PageHeader::new(PageNo::new(1));
        header.checksum = PageHeader::compute_checksum(&page_data);
        assert!(header.verify_checksum(&page_data));

        page_data[500] = 0x11;
        assert!(!header.verify_checksum(&page_data));
    }
}
