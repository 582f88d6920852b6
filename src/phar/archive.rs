use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::error::{PharError, Result};
use super::options::{DuplicatePolicy, ParseOptions};
use super::parser::{EntryHeader, ManifestParser};
use super::structures::*;

/// A fully decoded PHAR archive.
///
/// Built in one go by [`Archive::parse`]; nothing but the per-entry content
/// cache changes afterwards.
pub struct Archive {
    /// Length of the stub, which is also the manifest's offset.
    pub stub_len: u64,
    pub manifest_len: u32,
    pub api_version: ApiVersion,
    pub flags: u32,
    pub alias: Vec<u8>,
    pub metadata: Vec<u8>,
    pub signature: Option<Signature>,
    file_count: u32,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    payload: (u64, u64),
    data: Arc<[u8]>,
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("stub_len", &self.stub_len)
            .field("api_version", &self.api_version)
            .field("flags", &format_args!("{:#010x}", self.flags))
            .field("alias", &String::from_utf8_lossy(&self.alias))
            .field("signature", &self.signature)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl Archive {
    /// Decode `data` with the default [`ParseOptions`].
    pub fn parse(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        Self::parse_with(data, &ParseOptions::default())
    }

    pub fn parse_with(data: impl Into<Arc<[u8]>>, options: &ParseOptions) -> Result<Self> {
        let data: Arc<[u8]> = data.into();
        let parser = ManifestParser::new(&data, options);

        let stub_len = parser.find_stub_end()?;
        let manifest = parser.parse_manifest(stub_len)?;

        // Payloads follow the manifest back to back, in manifest order.
        let total = data.len() as u64;
        let payload_start = manifest.end;
        let mut offset = payload_start;
        let mut laid_out = Vec::with_capacity(manifest.entries.len());
        for header in manifest.entries {
            let len = header.compressed_size as u64;
            if offset + len > total {
                return Err(PharError::TruncatedInput {
                    offset,
                    needed: len,
                    available: total - offset,
                });
            }
            laid_out.push((header, offset..offset + len));
            offset += len;
        }
        let payload_end = offset;

        let signature = if manifest.flags & FLAG_SIGNATURE != 0 {
            Some(parser.parse_signature(payload_end)?)
        } else {
            if payload_end < total {
                debug!("{} trailing bytes after payload", total - payload_end);
            }
            None
        };

        // A name of "/", "." or "" normalizes to nothing; its payload keeps
        // its slot but the record cannot be addressed.
        laid_out.retain(|(header, range)| {
            let keep = !header.name.is_empty();
            if !keep {
                warn!("dropping entry with empty name, payload at {}", range.start);
            }
            keep
        });
        let laid_out = resolve_duplicates(laid_out, options.duplicates)?;

        let mut index = HashMap::with_capacity(laid_out.len());
        let entries: Vec<Entry> = laid_out
            .into_iter()
            .enumerate()
            .map(|(i, (h, range))| {
                index.insert(h.name.clone(), i);
                Entry::new(
                    h.name,
                    h.is_dir,
                    h.uncompressed_size,
                    h.timestamp,
                    h.compressed_size,
                    h.crc32,
                    h.flags,
                    h.metadata,
                    range,
                    Arc::clone(&data),
                )
            })
            .collect();

        debug!(
            "parsed archive: {} entries, payload {}..{}",
            entries.len(),
            payload_start,
            payload_end
        );

        Ok(Self {
            stub_len,
            manifest_len: manifest.manifest_len,
            api_version: manifest.api_version,
            flags: manifest.flags,
            alias: manifest.alias,
            metadata: manifest.metadata,
            signature,
            file_count: manifest.file_count,
            entries,
            index,
            payload: (payload_start, payload_end),
            data,
        })
    }

    /// Entries in manifest order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries the manifest declared, duplicates included.
    pub fn file_count(&self) -> u32 {
        self.file_count
    }

    /// Byte range of the payload region in the original buffer.
    pub fn payload_range(&self) -> std::ops::Range<u64> {
        self.payload.0..self.payload.1
    }

    /// The stub bytes, halt marker included.
    pub fn stub(&self) -> &[u8] {
        &self.data[..self.stub_len as usize]
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Exact lookup by path. Leading slashes and empty segments in `path` are
    /// ignored, the same way entry names are normalized.
    pub fn get_entry(&self, path: &str) -> Option<&Entry> {
        self.index
            .get(&normalize_name(path))
            .map(|&i| &self.entries[i])
    }

    /// Like [`get_entry`](Self::get_entry), but a miss is an
    /// [`PharError::EntryNotFound`].
    pub fn entry(&self, path: &str) -> Result<&Entry> {
        self.get_entry(path)
            .ok_or_else(|| PharError::EntryNotFound(path.to_string()))
    }

    /// Convenience for `entry(path)?.contents()`.
    pub fn read(&self, path: &str) -> Result<&[u8]> {
        self.entry(path)?.contents()
    }
}

type LaidOut = (EntryHeader, std::ops::Range<u64>);

fn resolve_duplicates(entries: Vec<LaidOut>, policy: DuplicatePolicy) -> Result<Vec<LaidOut>> {
    match policy {
        DuplicatePolicy::Reject => {
            let mut seen = HashSet::with_capacity(entries.len());
            for (header, _) in &entries {
                if !seen.insert(header.name.as_str()) {
                    return Err(PharError::DuplicateEntry(header.name.clone()));
                }
            }
            Ok(entries)
        }
        DuplicatePolicy::FirstWins => {
            let mut seen = HashSet::with_capacity(entries.len());
            let mut kept = Vec::with_capacity(entries.len());
            for item in entries {
                if seen.insert(item.0.name.clone()) {
                    kept.push(item);
                } else {
                    warn!("dropping later duplicate entry {}", item.0.name);
                }
            }
            Ok(kept)
        }
        DuplicatePolicy::LastWins => {
            let mut seen = HashSet::with_capacity(entries.len());
            let mut kept = Vec::with_capacity(entries.len());
            for item in entries.into_iter().rev() {
                if seen.insert(item.0.name.clone()) {
                    kept.push(item);
                } else {
                    warn!("dropping earlier duplicate entry {}", item.0.name);
                }
            }
            kept.reverse();
            Ok(kept)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phar::fixture::PharBuilder;
    use std::thread;

    #[test]
    fn parses_header_fields() {
        let data = PharBuilder::new()
            .alias(b"app.phar")
            .file("index.php", b"<?php echo 1;")
            .build();
        let archive = Archive::parse(data).unwrap();

        assert_eq!(archive.alias, b"app.phar");
        assert_eq!(archive.api_version.to_string(), "1.1.1");
        assert_eq!(archive.file_count(), 1);
        assert!(archive.stub().ends_with(b"__HALT_COMPILER(); ?>\r\n"));
        assert!(!archive.is_signed());

        let entry = archive.get_entry("index.php").unwrap();
        assert_eq!(entry.timestamp, 1_700_000_000);
        assert_eq!(entry.permissions(), 0o644);
        assert_eq!(entry.compression(), Compression::None);
    }

    #[test]
    fn payloads_are_contiguous() {
        let data = PharBuilder::new()
            .file("a", b"one")
            .gz_file("b", &b"two".repeat(50))
            .file("c", b"three")
            .build();
        let archive = Archive::parse(data).unwrap();

        let entries = archive.entries();
        assert_eq!(entries.len(), archive.file_count() as usize);

        let range = archive.payload_range();
        let mut offset = range.start;
        for entry in entries {
            assert_eq!(entry.payload_offset, offset);
            assert_eq!(entry.payload_len, entry.compressed_size as u64);
            offset += entry.payload_len;
        }
        assert_eq!(offset, range.end);
        assert_eq!(archive.read("b").unwrap(), b"two".repeat(50).as_slice());
    }

    #[test]
    fn contents_are_decoded_once() {
        let data = PharBuilder::new().gz_file("a.txt", b"hello hello hello").build();
        let archive = Archive::parse(data).unwrap();
        let entry = archive.get_entry("a.txt").unwrap();

        let first = entry.contents().unwrap().to_vec();
        let second = entry.contents().unwrap();
        assert_eq!(first, second);
        assert_eq!(entry.decode_count(), 1);
    }

    #[test]
    fn concurrent_first_reads_agree() {
        let content = b"shared".repeat(1000);
        let data = PharBuilder::new().gz_file("s.bin", &content).build();
        let archive = Archive::parse(data).unwrap();
        let entry = archive.get_entry("s.bin").unwrap();

        thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(move || entry.contents().unwrap())).collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), content.as_slice());
            }
        });
        assert!(entry.decode_count() >= 1);
        assert_eq!(entry.contents().unwrap(), content.as_slice());
    }

    #[test]
    fn failed_decode_is_not_cached() {
        let data = PharBuilder::new().raw("bad", b"hello", 5, 0xdead_beef, 0).build();
        let archive = Archive::parse(data).unwrap();
        let entry = archive.get_entry("bad").unwrap();

        assert!(matches!(entry.contents(), Err(PharError::ChecksumMismatch { .. })));
        assert!(matches!(entry.contents(), Err(PharError::ChecksumMismatch { .. })));
        assert_eq!(entry.decode_count(), 2);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let data = PharBuilder::new()
            .raw("short", b"hey", 5, crate::phar::codec::crc32(b"hey"), 0)
            .build();
        let archive = Archive::parse(data).unwrap();
        assert!(matches!(
            archive.read("short"),
            Err(PharError::SizeMismatch { expected: 5, found: 3, .. })
        ));
    }

    #[test]
    fn duplicate_policies() {
        let data = PharBuilder::new()
            .file("/dup.txt", b"first")
            .file("other", b"x")
            .file("dup.txt", b"second")
            .build();

        let last = Archive::parse(data.clone()).unwrap();
        assert_eq!(last.entries().len(), 2);
        assert_eq!(last.file_count(), 3);
        assert_eq!(last.read("dup.txt").unwrap(), b"second");
        assert_eq!(last.entries()[0].name, "other");

        let options = ParseOptions::default().duplicates(DuplicatePolicy::FirstWins);
        let first = Archive::parse_with(data.clone(), &options).unwrap();
        assert_eq!(first.read("dup.txt").unwrap(), b"first");

        let options = ParseOptions::default().duplicates(DuplicatePolicy::Reject);
        assert!(matches!(
            Archive::parse_with(data, &options),
            Err(PharError::DuplicateEntry(name)) if name == "dup.txt"
        ));
    }

    #[test]
    fn empty_names_are_dropped() {
        let data = PharBuilder::new()
            .file("/", b"root")
            .file(".", b"dot")
            .file("kept.txt", b"kept")
            .build();
        let archive = Archive::parse(data).unwrap();

        assert_eq!(archive.file_count(), 3);
        assert_eq!(archive.entries().len(), 1);
        assert!(archive.get_entry("").is_none());
        assert_eq!(archive.read("kept.txt").unwrap(), b"kept");
    }

    #[test]
    fn lookup_normalizes_query() {
        let data = PharBuilder::new().file("src/lib/a.php", b"a").build();
        let archive = Archive::parse(data).unwrap();
        assert!(archive.get_entry("/src//lib/a.php").is_some());
        assert!(archive.get_entry("src/lib").is_none());
        assert!(archive.entry("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn stub_length_limit() {
        let mut builder = PharBuilder::new().file("a", b"a");
        builder.stub = vec![b' '; 100];
        let data = builder.build();

        assert!(Archive::parse_with(data.clone(), &ParseOptions::default().max_stub_len(200)).is_ok());
        assert!(matches!(
            Archive::parse_with(data, &ParseOptions::default().max_stub_len(110)),
            Err(PharError::MissingHaltMarker)
        ));
    }

    #[test]
    fn marker_without_line_break() {
        let mut builder = PharBuilder::new().file("a", b"abc");
        builder.eol = false;
        let archive = Archive::parse(builder.build()).unwrap();
        assert_eq!(archive.read("a").unwrap(), b"abc");
    }

    #[test]
    fn manifest_length_must_match() {
        let mut builder = PharBuilder::new().file("a", b"abc");
        builder.manifest_len_delta = -1;
        assert!(matches!(
            Archive::parse(builder.build()),
            Err(PharError::ManifestLengthMismatch { .. })
        ));
    }

    #[test]
    fn parses_signature_block() {
        let digest = [0xab; 20];
        let data = PharBuilder::new().file("a", b"abc").signature(0x02, &digest).build();
        let archive = Archive::parse(data).unwrap();

        let sig = archive.signature.as_ref().unwrap();
        assert_eq!(sig.algorithm, SignatureAlgorithm::Sha1);
        assert_eq!(sig.digest, digest);
        assert_eq!(archive.read("a").unwrap(), b"abc");
    }

    #[test]
    fn unknown_signature_type() {
        let data = PharBuilder::new().file("a", b"abc").signature(0x10, &[0; 16]).build();
        assert!(matches!(
            Archive::parse(data),
            Err(PharError::UnknownSignatureType(0x10))
        ));
    }

    #[test]
    fn signature_cannot_overlap_payload() {
        // Declares SHA-512 but only carries a 16 byte digest.
        let data = PharBuilder::new().file("a", b"abc").signature(0x04, &[0; 16]).build();
        assert!(matches!(
            Archive::parse(data),
            Err(PharError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn hostile_file_count_fails_cleanly() {
        let mut data = PharBuilder::new().build();
        // File count sits right after the manifest length field.
        let at = data.len() - (4 + 2 + 4 + 4 + 4);
        data[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Archive::parse(data),
            Err(PharError::TruncatedInput { .. })
        ));
    }
}
