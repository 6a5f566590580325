//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is the in-memory form of one slotted page: the decoded
//! [`PageHeader`], the slot directory, and a full-size byte buffer whose tail
//! holds the record heap.
//!
//! # Layout
//! ```text
//! ┌──────────┬──────────────────┬───────────────┬──────────────────────┐
//! │ Header   │ Slot array  ──▶  │  (zero gap)   │  ◀── Record heap     │
//! │ 40 bytes │ 6 bytes / slot   │               │  grows from the tail │
//! └──────────┴──────────────────┴───────────────┴──────────────────────┘
//! 0          40          slot_array_end     heap_start             4096
//! ```
//!
//! Invariant: `slot_array_end <= heap_start`. Every mutator checks it before
//! touching any state and reports a full page by returning `false`.

use thiserror::Error;

use crate::common::config::PAGE_SIZE;
use crate::common::PageNo;

use super::page_header::{PageHeader, PageType};
use super::slot::{Slot, SlotStatus};

/// Why a byte buffer could not be decoded into a [`Page`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageDecodeError {
    #[error("expected a full page, got {0} bytes")]
    WrongSize(usize),
    #[error("stored checksum does not match page contents")]
    ChecksumMismatch,
    #[error("{0}")]
    Malformed(String),
}

/// A slotted page.
///
/// Pages are cloned out of the buffer pool for reading and handed back with
/// `put_page` after mutation.
///
/// # Example
/// ```
/// use leafdb::{Page, PageNo};
///
/// let mut page = Page::new(PageNo::new(1));
/// assert!(page.add_record(b"hello"));
/// assert_eq!(page.get_record(0).as_deref(), Some(&b"hello"[..]));
/// ```
#[derive(Clone)]
pub struct Page {
    header: PageHeader,
    slots: Vec<Slot>,
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Largest record that fits in an empty page.
    pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - PageHeader::SIZE - Slot::SIZE;

    /// A fresh page: defaulted header, no slots, marked dirty.
    pub fn new(page_no: PageNo) -> Self {
        Self {
            header: PageHeader::new(page_no),
            slots: Vec::new(),
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// A fresh page with the given type.
    pub fn with_type(page_no: PageNo, page_type: PageType) -> Self {
        let mut page = Self::new(page_no);
        page.header.page_type = page_type;
        page
    }

    // ========================================================================
    // Header access
    // ========================================================================

    #[inline]
    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    /// Mutable header access; marks the page dirty.
    #[inline]
    pub fn header_mut(&mut self) -> &mut PageHeader {
        self.header.dirty = true;
        &mut self.header
    }

    #[inline]
    pub fn page_no(&self) -> PageNo {
        self.header.page_no
    }

    #[inline]
    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.header.dirty
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.header.dirty = true;
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.header.dirty = false;
    }

    #[inline]
    pub fn record_count(&self) -> u16 {
        self.header.record_count
    }

    #[inline]
    pub fn slot_count(&self) -> u16 {
        self.header.slot_count
    }

    #[inline]
    pub fn free_space(&self) -> u16 {
        self.header.free_space
    }

    // ========================================================================
    // Record operations
    // ========================================================================

    /// Store `bytes` as a new record and return its slot index.
    ///
    /// Reuses the head of the free-slot list when there is one, otherwise
    /// appends a slot. Returns `None` without touching the page when the
    /// record (plus a new slot) does not fit.
    pub fn insert_record(&mut self, bytes: &[u8]) -> Option<u8> {
        let len = bytes.len();
        let reuse = self.header.first_free_slot != Slot::NO_SLOT;
        let slot_cost = if reuse { 0 } else { Slot::SIZE };

        if (self.header.free_space as usize) < len + slot_cost {
            return None;
        }
        if !reuse && self.header.slot_count >= Slot::MAX_SLOTS {
            return None;
        }

        let heap_start = self.header.heap_start as usize;
        let slot_end = self.header.slot_array_end() + slot_cost;
        if heap_start < len || heap_start - len < slot_end {
            return None;
        }

        let offset = heap_start - len;
        self.data[offset..heap_start].copy_from_slice(bytes);
        let slot = Slot::used(offset as u16, len as u16);

        let index = if reuse {
            let index = self.header.first_free_slot;
            self.header.first_free_slot = self.slots[index as usize].next_free;
            self.slots[index as usize] = slot;
            index
        } else {
            let index = self.slots.len() as u8;
            self.slots.push(slot);
            self.header.slot_count += 1;
            index
        };

        self.header.heap_start = offset as u16;
        self.header.free_space -= (len + slot_cost) as u16;
        self.header.record_count += 1;
        self.header.dirty = true;
        Some(index)
    }

    /// Store `bytes` as a new record; `false` means the page is full.
    #[must_use]
    pub fn add_record(&mut self, bytes: &[u8]) -> bool {
        self.insert_record(bytes).is_some()
    }

    /// Borrow the record in `slot`, or `None` for an out-of-range or free slot.
    pub fn record(&self, slot: u8) -> Option<&[u8]> {
        let slot = self.slots.get(slot as usize)?;
        if !slot.is_used() {
            return None;
        }
        let start = slot.offset as usize;
        Some(&self.data[start..start + slot.length as usize])
    }

    /// Copy of the record in `slot`.
    pub fn get_record(&self, slot: u8) -> Option<Vec<u8>> {
        self.record(slot).map(<[u8]>::to_vec)
    }

    /// Release the record in `slot`.
    ///
    /// The slot joins the head of the free-slot list; heap bytes stay where
    /// they are until the slot is reused.
    #[must_use]
    pub fn free_record(&mut self, slot: u8) -> bool {
        let first_free = self.header.first_free_slot;
        let Some(entry) = self.slots.get_mut(slot as usize) else {
            return false;
        };
        if !entry.is_used() {
            return false;
        }

        entry.status = SlotStatus::Free;
        entry.next_free = first_free;
        let length = entry.length;

        self.header.first_free_slot = slot;
        self.header.record_count -= 1;
        self.header.free_space += length;
        self.header.dirty = true;
        true
    }

    /// Replace the record in `slot` with `bytes`.
    ///
    /// A record that shrinks (or keeps its size) is overwritten in place. A
    /// record that grows is moved to the current heap start; the old bytes
    /// are left behind and the heap is not compacted.
    #[must_use]
    pub fn update_record(&mut self, slot: u8, bytes: &[u8]) -> bool {
        let Some(entry) = self.slots.get(slot as usize).copied() else {
            return false;
        };
        if !entry.is_used() {
            return false;
        }

        let new_len = bytes.len();
        let old_len = entry.length as usize;

        if new_len <= old_len {
            let start = entry.offset as usize;
            self.data[start..start + new_len].copy_from_slice(bytes);
            self.slots[slot as usize].length = new_len as u16;
            self.header.free_space += (old_len - new_len) as u16;
            self.header.dirty = true;
            return true;
        }

        let growth = new_len - old_len;
        if (self.header.free_space as usize) < growth {
            return false;
        }
        let heap_start = self.header.heap_start as usize;
        if heap_start < new_len || heap_start - new_len < self.header.slot_array_end() {
            return false;
        }

        let offset = heap_start - new_len;
        self.data[offset..heap_start].copy_from_slice(bytes);
        self.slots[slot as usize].offset = offset as u16;
        self.slots[slot as usize].length = new_len as u16;
        self.header.heap_start = offset as u16;
        self.header.free_space -= growth as u16;
        self.header.dirty = true;
        true
    }

    /// Live records in slot order.
    pub fn records(&self) -> impl Iterator<Item = (u8, &[u8])> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_used())
            .map(|(index, slot)| {
                let start = slot.offset as usize;
                (index as u8, &self.data[start..start + slot.length as usize])
            })
    }

    /// Contiguous bytes between the slot array and the heap.
    pub fn contiguous_free(&self) -> usize {
        self.header.heap_start as usize - self.header.slot_array_end()
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serialize to exactly `PAGE_SIZE` bytes: header, slot array, zeroed
    /// gap, heap. The checksum is computed over the result.
    pub fn to_bytes(&self) -> Box<[u8; PAGE_SIZE]> {
        let mut out = self.data.clone();

        let mut header = self.header;
        header.checksum = 0;
        header.write_to(&mut out[..]);

        let mut cursor = PageHeader::SIZE;
        for slot in &self.slots {
            slot.write_to(&mut out[cursor..cursor + Slot::SIZE]);
            cursor += Slot::SIZE;
        }
        out[cursor..self.header.heap_start as usize].fill(0);

        let checksum = PageHeader::compute_checksum(&out[..]);
        out[PageHeader::OFFSET_CHECKSUM..PageHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum.to_le_bytes());
        out
    }

    /// Decode a page written by [`Page::to_bytes`]. The result is clean.
    ///
    /// # Errors
    /// Fails on a wrong-sized buffer, a checksum mismatch, or a header whose
    /// slot directory and heap overlap.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, PageDecodeError> {
        if buf.len() != PAGE_SIZE {
            return Err(PageDecodeError::WrongSize(buf.len()));
        }

        let header = PageHeader::from_bytes(buf);
        if !header.verify_checksum(buf) {
            return Err(PageDecodeError::ChecksumMismatch);
        }

        let heap_start = header.heap_start as usize;
        if header.slot_count > Slot::MAX_SLOTS {
            return Err(PageDecodeError::Malformed(format!(
                "slot count {} exceeds {}",
                header.slot_count,
                Slot::MAX_SLOTS
            )));
        }
        if heap_start > PAGE_SIZE || header.slot_array_end() > heap_start {
            return Err(PageDecodeError::Malformed(format!(
                "slot array end {} overlaps heap start {}",
                header.slot_array_end(),
                heap_start
            )));
        }

        let mut slots = Vec::with_capacity(header.slot_count as usize);
        for index in 0..header.slot_count as usize {
            let at = PageHeader::SIZE + index * Slot::SIZE;
            let slot = Slot::from_bytes(&buf[at..at + Slot::SIZE]);
            let end = slot.offset as usize + slot.length as usize;
            if slot.is_used() && ((slot.offset as usize) < heap_start || end > PAGE_SIZE) {
                return Err(PageDecodeError::Malformed(format!(
                    "slot {index} points outside the heap"
                )));
            }
            slots.push(slot);
        }

        let mut data = Box::new([0u8; PAGE_SIZE]);
        data.copy_from_slice(buf);

        Ok(Self {
            header,
            slots,
            data,
        })
    }

    /// A buffer that was never written (freshly extended file region).
    pub fn is_zeroed(buf: &[u8]) -> bool {
        buf.iter().all(|&b| b == 0)
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("header", &self.header)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
