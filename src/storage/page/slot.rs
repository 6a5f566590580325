//! Slot directory entries.

use super::page_header::{read_u16, write_u16};

/// Whether a slot currently refers to a live record.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Free = 0,
    Used = 1,
}

/// One entry of a page's slot directory.
///
/// Slots are never removed: a freed slot is marked [`SlotStatus::Free`] and
/// threaded into the page's free-slot list through `next_free`, so a slot
/// index stays a stable handle to its record.
///
/// # Layout (6 bytes)
/// ```text
/// offset: u16 | length: u16 | status: u8 | next_free: u8
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Absolute offset of the record inside the page.
    pub offset: u16,
    pub length: u16,
    pub status: SlotStatus,
    /// Next free slot, or [`Slot::NO_SLOT`].
    pub next_free: u8,
}

impl Slot {
    /// Size of one serialized slot.
    pub const SIZE: usize = 6;

    /// Terminator of the free-slot list.
    pub const NO_SLOT: u8 = u8::MAX;

    /// Slot indices are `u8` and `NO_SLOT` is reserved.
    pub const MAX_SLOTS: u16 = Self::NO_SLOT as u16;

    pub fn used(offset: u16, length: u16) -> Self {
        Self {
            offset,
            length,
            status: SlotStatus::Used,
            next_free: Self::NO_SLOT,
        }
    }

    #[inline]
    pub fn is_used(&self) -> bool {
        self.status == SlotStatus::Used
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= Self::SIZE);
        Self {
            offset: read_u16(bytes, 0),
            length: read_u16(bytes, 2),
            status: if bytes[4] == SlotStatus::Used as u8 {
                SlotStatus::Used
            } else {
                SlotStatus::Free
            },
            next_free: bytes[5],
        }
    }

    pub fn write_to(&self, bytes: &mut [u8]) {
        debug_assert!(bytes.len() >= Self::SIZE);
        write_u16(bytes, 0, self.offset);
        write_u16(bytes, 2, self.length);
        bytes[4] = self.status as u8;
        bytes[5] = self.next_free;
    }
}
