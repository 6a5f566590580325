//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - A slotted 4KB page and its byte codec
//! - [`PageHeader`] - Metadata at the start of every page
//! - [`PageType`] - Discriminator for different page formats
//! - [`Slot`] - Slot directory entries

#[allow(clippy::module_inception)]
mod page;
mod page_header;
mod slot;

pub use page::{Page, PageDecodeError};
pub use page_header::{PageHeader, PageType};
pub use slot::{Slot, SlotStatus};
