//! Storage layer - space files and page formats.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - Raw page I/O for one space file
//! - [`SpaceManager`] - Open spaces, the free-page chain and the space header
//! - [`page`] - Page types and layouts

mod disk_manager;
pub mod page;
mod space_header;
mod space_manager;

pub use disk_manager::DiskManager;
pub use space_header::SpaceHeader;
pub use space_manager::SpaceManager;
