//! Codec primitives shared by the manifest parser and entry reads.
//!
//! Everything here is a pure function over byte slices. Field readers work on
//! a `Cursor<&[u8]>` so the caller always knows how many bytes have been
//! consumed, which the manifest length check relies on.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use log::trace;
use std::io::{Cursor, Read};

use super::error::{PharError, Result};
use super::structures::Compression;

/// Upper bound for the up-front output allocation when inflating.
///
/// The declared size comes from untrusted input, so larger outputs grow the
/// buffer on demand instead of reserving it all at once.
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

fn remaining(cursor: &Cursor<&[u8]>) -> u64 {
    (cursor.get_ref().len() as u64).saturating_sub(cursor.position())
}

fn truncated(cursor: &Cursor<&[u8]>, needed: u64) -> PharError {
    PharError::TruncatedInput {
        offset: cursor.position(),
        needed,
        available: remaining(cursor),
    }
}

fn ensure_remaining(cursor: &Cursor<&[u8]>, needed: u64) -> Result<()> {
    if remaining(cursor) < needed {
        return Err(truncated(cursor, needed));
    }
    Ok(())
}

/// Read a little-endian `u16` at the cursor.
pub fn read_u16_le(cursor: &mut Cursor<&[u8]>) -> Result<u16> {
    ensure_remaining(cursor, 2)?;
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| truncated(cursor, 2))
}

/// Read a big-endian `u16` at the cursor. Only the API version field uses it.
pub fn read_u16_be(cursor: &mut Cursor<&[u8]>) -> Result<u16> {
    ensure_remaining(cursor, 2)?;
    cursor
        .read_u16::<BigEndian>()
        .map_err(|_| truncated(cursor, 2))
}

/// Read a little-endian `u32` at the cursor.
pub fn read_u32_le(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    ensure_remaining(cursor, 4)?;
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| truncated(cursor, 4))
}

/// Borrow `len` raw bytes at the cursor and advance past them.
pub fn read_bytes<'a>(cursor: &mut Cursor<&'a [u8]>, len: u64) -> Result<&'a [u8]> {
    ensure_remaining(cursor, len)?;
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start + len as usize;
    cursor.set_position(end as u64);
    Ok(&data[start..end])
}

/// Read a `u32` length followed by that many bytes.
///
/// A length larger than what is left in the buffer fails before anything is
/// allocated or sliced.
pub fn read_length_prefixed<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a [u8]> {
    let len = read_u32_le(cursor)?;
    read_bytes(cursor, len as u64)
}

/// Turn an entry's on-disk bytes into its contents.
///
/// `name` is only used to give errors some context.
pub fn decompress(
    name: &str,
    kind: Compression,
    raw: &[u8],
    expected_size: u32,
) -> Result<Vec<u8>> {
    match kind {
        Compression::None => Ok(raw.to_vec()),
        Compression::Gz => {
            let expected = expected_size as usize;
            let mut out = Vec::with_capacity(expected.min(MAX_PREALLOC));
            // One byte past the declared size is enough to notice an oversized stream.
            DeflateDecoder::new(raw)
                .take(expected as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|source| PharError::Decompression {
                    name: name.to_string(),
                    source,
                })?;
            trace!("inflated {}: {} -> {} bytes", name, raw.len(), out.len());
            Ok(out)
        }
        other => Err(PharError::UnsupportedCompression {
            name: name.to_string(),
            kind: other.to_string(),
        }),
    }
}

/// Standard CRC-32 (IEEE polynomial).
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as Level;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), Level::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn reads_little_endian_fields() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(read_u16_le(&mut cursor).unwrap(), 0x1234);
        assert_eq!(read_u32_le(&mut cursor).unwrap(), 0x1234_5678);
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn short_read_reports_offset() {
        let data = [1, 2, 3];
        let mut cursor = Cursor::new(&data[..]);
        cursor.set_position(1);
        match read_u32_le(&mut cursor) {
            Err(PharError::TruncatedInput {
                offset,
                needed,
                available,
            }) => {
                assert_eq!((offset, needed, available), (1, 4, 2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn length_prefixed_bytes() {
        let data = [3, 0, 0, 0, b'a', b'b', b'c', b'z'];
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(read_length_prefixed(&mut cursor).unwrap(), b"abc");
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let data = [0xff, 0xff, 0xff, 0xff, b'a'];
        let mut cursor = Cursor::new(&data[..]);
        assert!(matches!(
            read_length_prefixed(&mut cursor),
            Err(PharError::TruncatedInput { needed: 0xffff_ffff, available: 1, .. })
        ));
    }

    #[test]
    fn stored_is_identity() {
        assert_eq!(decompress("a", Compression::None, b"hello", 5).unwrap(), b"hello");
    }

    #[test]
    fn inflates_gz_entries() {
        let text = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let packed = deflate(&text);
        let out = decompress("fox.txt", Compression::Gz, &packed, text.len() as u32).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn gz_output_is_bounded_by_declared_size() {
        let text = vec![b'x'; 4096];
        let packed = deflate(&text);
        let out = decompress("x", Compression::Gz, &packed, 10).unwrap();
        assert_eq!(out.len(), 11);
    }

    #[test]
    fn corrupt_deflate_stream_fails() {
        let err = decompress("bad", Compression::Gz, &[0xff; 8], 8).unwrap_err();
        assert!(matches!(err, PharError::Decompression { .. }));
    }

    #[test]
    fn bzip2_is_unsupported() {
        let err = decompress("b", Compression::Bzip2, b"BZh9", 4).unwrap_err();
        assert!(matches!(err, PharError::UnsupportedCompression { .. }));
    }

    #[test]
    fn crc32_matches_known_value() {
        assert_eq!(crc32(b"hello"), 0x3610_a686);
        assert_eq!(crc32(b""), 0);
    }
}
