//! Low-level PHAR manifest parser.
//!
//! ## Parsing Strategy
//!
//! A PHAR file is read front to back:
//! 1. Skip the stub up to `__HALT_COMPILER(); ?>` (and an optional `\r\n`)
//! 2. Read the manifest header and every entry header
//! 3. Lay out entry payloads back to back right after the manifest
//! 4. If the archive is signed, read the signature block from the end
//!
//! [`Archive`](super::Archive) drives these steps; each one either succeeds
//! completely or aborts the parse.

use log::{debug, trace};
use std::io::Cursor;

use super::codec::{read_bytes, read_length_prefixed, read_u16_be, read_u32_le};
use super::error::{PharError, Result};
use super::options::ParseOptions;
use super::structures::*;

/// Smallest possible entry header: name length, five `u32` fields and the
/// metadata length. Used to bound pre-allocation for hostile file counts.
const MIN_ENTRY_HEADER_SIZE: u64 = 4 + 5 * 4 + 4;

/// Manifest header plus the raw entry headers, before payload layout.
#[derive(Debug)]
pub struct Manifest {
    /// Offset of the manifest length field, i.e. the stub length.
    pub offset: u64,
    pub manifest_len: u32,
    pub file_count: u32,
    pub api_version: ApiVersion,
    pub flags: u32,
    pub alias: Vec<u8>,
    pub metadata: Vec<u8>,
    pub entries: Vec<EntryHeader>,
    /// Offset of the first byte after the manifest.
    pub end: u64,
}

/// One entry header as stored in the manifest.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub name: String,
    pub is_dir: bool,
    pub uncompressed_size: u32,
    pub timestamp: u32,
    pub compressed_size: u32,
    pub crc32: u32,
    pub flags: u32,
    pub metadata: Vec<u8>,
}

/// Stateless reader over one archive buffer.
pub struct ManifestParser<'a> {
    data: &'a [u8],
    options: &'a ParseOptions,
}

impl<'a> ManifestParser<'a> {
    pub fn new(data: &'a [u8], options: &'a ParseOptions) -> Self {
        Self { data, options }
    }

    /// Find where the stub ends and the manifest begins.
    ///
    /// The first occurrence of the halt marker wins. A `\r\n` directly after
    /// it belongs to the stub.
    pub fn find_stub_end(&self) -> Result<u64> {
        let window = match self.options.max_stub_len {
            Some(max) => &self.data[..self.data.len().min(max)],
            None => self.data,
        };

        let pos = window
            .windows(HALT_MARKER.len())
            .position(|w| w == HALT_MARKER)
            .ok_or(PharError::MissingHaltMarker)?;

        let mut end = pos + HALT_MARKER.len();
        if self.data[end..].starts_with(HALT_MARKER_EOL) {
            end += HALT_MARKER_EOL.len();
        }

        debug!("stub ends at offset {}", end);
        Ok(end as u64)
    }

    /// Parse the manifest starting at `offset`.
    ///
    /// The declared manifest length counts every byte after the length field
    /// itself and must match what the headers actually occupy.
    pub fn parse_manifest(&self, offset: u64) -> Result<Manifest> {
        let mut cursor = Cursor::new(self.data);
        cursor.set_position(offset);

        let manifest_len = read_u32_le(&mut cursor)?;
        let body_start = cursor.position();

        // Reject a manifest that cannot fit before looking at its contents.
        let available = self.data.len() as u64 - body_start;
        if manifest_len as u64 > available {
            return Err(PharError::TruncatedInput {
                offset: body_start,
                needed: manifest_len as u64,
                available,
            });
        }

        let file_count = read_u32_le(&mut cursor)?;
        let api_version = ApiVersion(read_u16_be(&mut cursor)?);
        let flags = read_u32_le(&mut cursor)?;
        let alias = read_length_prefixed(&mut cursor)?.to_vec();
        let metadata = read_length_prefixed(&mut cursor)?.to_vec();

        debug!(
            "manifest: {} bytes, {} files, api {}, flags {:#010x}",
            manifest_len, file_count, api_version, flags
        );

        let capacity = (file_count as u64).min(manifest_len as u64 / MIN_ENTRY_HEADER_SIZE);
        let mut entries = Vec::with_capacity(capacity as usize);
        for _ in 0..file_count {
            entries.push(self.parse_entry_header(&mut cursor)?);
        }

        let actual = cursor.position() - body_start;
        if actual != manifest_len as u64 {
            return Err(PharError::ManifestLengthMismatch {
                declared: manifest_len,
                actual,
            });
        }

        Ok(Manifest {
            offset,
            manifest_len,
            file_count,
            api_version,
            flags,
            alias,
            metadata,
            entries,
            end: cursor.position(),
        })
    }

    fn parse_entry_header(&self, cursor: &mut Cursor<&'a [u8]>) -> Result<EntryHeader> {
        let raw_name = read_length_prefixed(cursor)?;
        // Non-UTF-8 names are kept readable rather than rejected.
        let raw_name = String::from_utf8_lossy(raw_name);
        let is_dir = raw_name.ends_with('/');
        let name = normalize_name(&raw_name);

        let header = EntryHeader {
            name,
            is_dir,
            uncompressed_size: read_u32_le(cursor)?,
            timestamp: read_u32_le(cursor)?,
            compressed_size: read_u32_le(cursor)?,
            crc32: read_u32_le(cursor)?,
            flags: read_u32_le(cursor)?,
            metadata: read_length_prefixed(cursor)?.to_vec(),
        };
        trace!("entry header: {:?}", header);
        Ok(header)
    }

    /// Parse the signature block that ends the buffer.
    ///
    /// Layout, read backwards: `GBMB`, a `u32` algorithm code, then the digest.
    /// The block has to live entirely after `payload_end`.
    pub fn parse_signature(&self, payload_end: u64) -> Result<Signature> {
        let tail = &self.data[payload_end as usize..];
        let magic_at = tail.len().saturating_sub(END_MAGIC.len());
        if tail.len() < END_MAGIC.len() || &tail[magic_at..] != END_MAGIC {
            return Err(PharError::MissingEndMagic {
                found: tail[magic_at..].to_vec(),
            });
        }

        let mut cursor = Cursor::new(tail);
        let Some(type_at) = magic_at.checked_sub(4) else {
            return Err(PharError::TruncatedInput {
                offset: payload_end,
                needed: 4,
                available: magic_at as u64,
            });
        };
        cursor.set_position(type_at as u64);
        let algorithm = SignatureAlgorithm::from_u32(read_u32_le(&mut cursor)?)?;

        let digest_len = algorithm.digest_len();
        let Some(digest_at) = type_at.checked_sub(digest_len) else {
            return Err(PharError::TruncatedInput {
                offset: payload_end,
                needed: digest_len as u64,
                available: type_at as u64,
            });
        };
        cursor.set_position(digest_at as u64);
        let digest = read_bytes(&mut cursor, digest_len as u64)?.to_vec();

        if digest_at > 0 {
            debug!(
                "{} unaccounted bytes between payload and signature",
                digest_at
            );
        }

        Ok(Signature { algorithm, digest })
    }
}
