use log::debug;
use std::fmt;
use std::ops::Range;
use std::path::{Component, Path};
#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use super::codec;
use super::error::{PharError, Result};

/// Stub terminator. Everything up to and including it is the preamble.
pub const HALT_MARKER: &[u8] = b"__HALT_COMPILER(); ?>";

/// Optional line break following [`HALT_MARKER`].
pub const HALT_MARKER_EOL: &[u8] = b"\r\n";

/// Trailing magic of a signed archive.
pub const END_MAGIC: &[u8] = b"GBMB";

/// Global flag: a signature block follows the payload region.
pub const FLAG_SIGNATURE: u32 = 0x0001_0000;

/// Entry flag bits carrying POSIX permissions.
pub const PERMISSION_MASK: u32 = 0x0000_0fff;

/// PHAR compression kinds, selected by bits `0xF000` of the entry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gz,
    Bzip2,
    Unknown(u32),
}

impl Compression {
    pub const MASK: u32 = 0x0000_f000;

    pub fn from_flags(flags: u32) -> Self {
        match flags & Self::MASK {
            0x0000 => Compression::None,
            0x1000 => Compression::Gz,
            0x2000 => Compression::Bzip2,
            other => Compression::Unknown(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Compression::None => 0x0000,
            Compression::Gz => 0x1000,
            Compression::Bzip2 => 0x2000,
            Compression::Unknown(v) => *v,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => f.write_str("none"),
            Compression::Gz => f.write_str("gz"),
            Compression::Bzip2 => f.write_str("bzip2"),
            Compression::Unknown(v) => write!(f, "{v:#06x}"),
        }
    }
}

/// Digest algorithms a signature block can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl SignatureAlgorithm {
    pub fn from_u32(code: u32) -> Result<Self> {
        match code {
            0x01 => Ok(SignatureAlgorithm::Md5),
            0x02 => Ok(SignatureAlgorithm::Sha1),
            0x03 => Ok(SignatureAlgorithm::Sha256),
            0x04 => Ok(SignatureAlgorithm::Sha512),
            other => Err(PharError::UnknownSignatureType(other)),
        }
    }

    /// Digest length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            SignatureAlgorithm::Md5 => 16,
            SignatureAlgorithm::Sha1 => 20,
            SignatureAlgorithm::Sha256 => 32,
            SignatureAlgorithm::Sha512 => 64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Md5 => "MD5",
            SignatureAlgorithm::Sha1 => "SHA-1",
            SignatureAlgorithm::Sha256 => "SHA-256",
            SignatureAlgorithm::Sha512 => "SHA-512",
        }
    }
}

/// Trailing signature block. Parsed for structure, never verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algorithm: SignatureAlgorithm,
    pub digest: Vec<u8>,
}

impl Signature {
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Manifest API version, stored as nibbles `major minor patch reserved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion(pub u16);

impl ApiVersion {
    pub fn major(&self) -> u8 {
        (self.0 >> 12) as u8
    }

    pub fn minor(&self) -> u8 {
        ((self.0 >> 8) & 0x0f) as u8
    }

    pub fn patch(&self) -> u8 {
        ((self.0 >> 4) & 0x0f) as u8
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Normalize an archive path: forward slashes only between non-empty
/// segments, no leading slash, no `.` segments.
pub fn normalize_name(raw: &str) -> String {
    raw.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// `true` if `name` is a non-empty relative path without `..` segments.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.split(['/', '\\']).any(|segment| segment == "..")
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// One file stored in the archive.
///
/// Holds a shared handle on the archive buffer; contents are decoded on the
/// first call to [`contents`](Entry::contents) and kept for later calls.
pub struct Entry {
    pub name: String,
    /// Stored with a trailing slash, i.e. an explicit directory record.
    pub is_dir: bool,
    pub uncompressed_size: u32,
    pub timestamp: u32,
    pub compressed_size: u32,
    pub crc32: u32,
    pub flags: u32,
    pub metadata: Vec<u8>,
    pub payload_offset: u64,
    pub payload_len: u64,
    data: Arc<[u8]>,
    decoded: OnceLock<Vec<u8>>,
    #[cfg(test)]
    decode_count: AtomicU32,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("is_dir", &self.is_dir)
            .field("uncompressed_size", &self.uncompressed_size)
            .field("timestamp", &self.timestamp)
            .field("compressed_size", &self.compressed_size)
            .field("crc32", &format_args!("{:#010x}", self.crc32))
            .field("flags", &format_args!("{:#x}", self.flags))
            .field("payload_offset", &self.payload_offset)
            .field("payload_len", &self.payload_len)
            .field("decoded", &self.decoded.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Entry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        is_dir: bool,
        uncompressed_size: u32,
        timestamp: u32,
        compressed_size: u32,
        crc32: u32,
        flags: u32,
        metadata: Vec<u8>,
        payload: Range<u64>,
        data: Arc<[u8]>,
    ) -> Self {
        Self {
            name,
            is_dir,
            uncompressed_size,
            timestamp,
            compressed_size,
            crc32,
            flags,
            metadata,
            payload_offset: payload.start,
            payload_len: payload.end - payload.start,
            data,
            decoded: OnceLock::new(),
            #[cfg(test)]
            decode_count: AtomicU32::new(0),
        }
    }

    pub fn compression(&self) -> Compression {
        Compression::from_flags(self.flags)
    }

    /// POSIX permission bits (carried, never enforced).
    pub fn permissions(&self) -> u32 {
        self.flags & PERMISSION_MASK
    }

    /// Whether the name can be joined onto an output directory without
    /// leaving it: no `..` segments, no root or drive prefix.
    pub fn has_safe_path(&self) -> bool {
        is_safe_name(&self.name)
    }

    /// The entry's bytes exactly as stored in the archive.
    pub fn raw_payload(&self) -> &[u8] {
        let start = self.payload_offset as usize;
        &self.data[start..start + self.payload_len as usize]
    }

    /// Decompressed, size- and CRC-checked contents.
    ///
    /// Concurrent first calls may each decode, but only one complete result is
    /// ever stored and every caller sees that same buffer afterwards.
    pub fn contents(&self) -> Result<&[u8]> {
        if let Some(bytes) = self.decoded.get() {
            return Ok(bytes);
        }
        let bytes = self.decode()?;
        Ok(self.decoded.get_or_init(|| bytes))
    }

    fn decode(&self) -> Result<Vec<u8>> {
        #[cfg(test)]
        self.decode_count.fetch_add(1, Ordering::Relaxed);
        debug!(
            "decoding {} ({}, {} bytes on disk)",
            self.name,
            self.compression(),
            self.payload_len
        );

        let bytes = codec::decompress(
            &self.name,
            self.compression(),
            self.raw_payload(),
            self.uncompressed_size,
        )?;

        if bytes.len() as u64 != self.uncompressed_size as u64 {
            return Err(PharError::SizeMismatch {
                name: self.name.clone(),
                expected: self.uncompressed_size as u64,
                found: bytes.len() as u64,
            });
        }

        let found = codec::crc32(&bytes);
        if found != self.crc32 {
            return Err(PharError::ChecksumMismatch {
                name: self.name.clone(),
                expected: self.crc32,
                found,
            });
        }

        Ok(bytes)
    }

    /// Number of times the payload has actually been decoded.
    #[cfg(test)]
    pub(crate) fn decode_count(&self) -> u32 {
        self.decode_count.load(Ordering::Relaxed)
    }
}
