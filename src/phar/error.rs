use std::io;

use thiserror::Error;

/// Errors produced while decoding a PHAR archive or reading one of its entries.
///
/// Structural errors abort [`Archive::parse`](super::Archive::parse) as a whole.
/// The per-entry variants (`UnsupportedCompression`, `SizeMismatch`,
/// `ChecksumMismatch`, `Decompression`) only fail the one
/// [`Entry::contents`](super::Entry::contents) call that hit them.
#[derive(Debug, Error)]
pub enum PharError {
    #[error("truncated input at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedInput {
        offset: u64,
        needed: u64,
        available: u64,
    },

    #[error("stub terminator `__HALT_COMPILER(); ?>` not found")]
    MissingHaltMarker,

    #[error("manifest length mismatch: declared {declared} bytes, parsed {actual}")]
    ManifestLengthMismatch { declared: u32, actual: u64 },

    #[error("duplicate entry in manifest: {0}")]
    DuplicateEntry(String),

    #[error("unsupported compression {kind} for entry {name}")]
    UnsupportedCompression { name: String, kind: String },

    #[error("failed to decompress entry {name}: {source}")]
    Decompression {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("size mismatch for entry {name}: expected {expected} bytes, got {found}")]
    SizeMismatch {
        name: String,
        expected: u64,
        found: u64,
    },

    #[error("checksum mismatch for entry {name}: expected {expected:#010x}, got {found:#010x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        found: u32,
    },

    #[error("missing GBMB end magic, found {found:02x?}")]
    MissingEndMagic { found: Vec<u8> },

    #[error("unknown signature type {0:#x}")]
    UnknownSignatureType(u32),

    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

impl PharError {
    /// Returns `true` for a lookup miss, which callers usually treat as
    /// "does not exist" rather than a broken archive.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PharError::EntryNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, PharError>;
