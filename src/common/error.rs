//! Error types for LeafDB.

use thiserror::Error;

use super::page_id::{GlobalPageId, SpaceId};
use crate::record::CodecError;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All fatal errors in LeafDB.
///
/// Expected negative outcomes are not errors: a full page is reported by the
/// page mutators as `false`, and a missing key by `delete`/`update` as `false`
/// or by `search` as `None`.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from a space file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation against a space id that has not been opened.
    #[error("space {0} is not open")]
    SpaceNotOpen(SpaceId),

    /// Requested page is beyond the end of its space file.
    #[error("{0} not found")]
    PageNotFound(GlobalPageId),

    /// The page is owned by the space layer and cannot be used this way.
    #[error("{0} is reserved")]
    ReservedPage(GlobalPageId),

    /// A new page could not be handed out (file extension failed or the
    /// space ran out of page numbers).
    #[error("cannot allocate a page in space {space_id}: {reason}")]
    AllocationFailure { space_id: SpaceId, reason: String },

    /// A row or key could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A page's bytes do not describe a valid page of the expected kind.
    #[error("corrupted {page}: {reason}")]
    Corrupted { page: GlobalPageId, reason: String },

    /// Stored CRC32 does not match the page contents.
    #[error("checksum mismatch on {0}")]
    ChecksumMismatch(GlobalPageId),

    /// A single entry is too large to fit in an empty page.
    #[error("record of {size} bytes exceeds the {max} bytes a page can hold")]
    RecordTooLarge { size: usize, max: usize },

    /// B+-tree order outside the supported range.
    #[error("invalid B+-tree order {0}")]
    InvalidOrder(u16),

    /// Table definition has no primary-key column to build a key from.
    #[error("table '{0}' has no primary key")]
    NoPrimaryKey(String),

    /// `update` was given a row whose primary key differs from the target key.
    #[error("update must not change the primary key")]
    KeyChanged,

    /// No index registered under this name.
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// An index with this name is already registered.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// The space already backs another registered index.
    #[error("space {space_id} already holds table '{table}'")]
    SpaceInUse { space_id: SpaceId, table: String },

    /// Engine settings are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error describes a problem with the request itself rather
    /// than a failure inside the engine.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::TableNotFound(_)
                | Error::TableExists(_)
                | Error::SpaceInUse { .. }
                | Error::KeyChanged
                | Error::NoPrimaryKey(_)
                | Error::InvalidOrder(_)
                | Error::RecordTooLarge { .. }
                | Error::Codec(
                    CodecError::TypeMismatch { .. }
                        | CodecError::ValueTooLong { .. }
                        | CodecError::NullViolation(_)
                        | CodecError::ColumnCountMismatch { .. }
                        | CodecError::UnsupportedType(_)
                )
        )
    }

    /// Message shown at the executor/CLI boundary.
    ///
    /// Request errors are shown as-is; engine failures become a generic
    /// "operation failed" message with the cause attached.
    pub fn user_message(&self) -> String {
        if self.is_user_facing() {
            self.to_string()
        } else {
            format!("operation failed: {self}")
        }
    }
}
