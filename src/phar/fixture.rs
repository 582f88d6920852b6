//! In-memory PHAR writer used by the unit and integration tests.
//!
//! Not part of the supported API.

use flate2::Compression as Level;
use flate2::write::DeflateEncoder;
use std::io::Write;

use super::codec::crc32;
use super::structures::{FLAG_SIGNATURE, HALT_MARKER, HALT_MARKER_EOL, END_MAGIC};

pub struct FixtureEntry {
    pub name: String,
    pub stored: Vec<u8>,
    pub uncompressed_size: u32,
    pub timestamp: u32,
    pub crc32: u32,
    pub flags: u32,
    pub metadata: Vec<u8>,
}

pub struct PharBuilder {
    pub stub: Vec<u8>,
    pub eol: bool,
    pub api_version: [u8; 2],
    pub flags: u32,
    pub alias: Vec<u8>,
    pub metadata: Vec<u8>,
    pub entries: Vec<FixtureEntry>,
    pub signature: Option<(u32, Vec<u8>)>,
    pub manifest_len_delta: i64,
}

impl Default for PharBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PharBuilder {
    pub fn new() -> Self {
        Self {
            stub: b"<?php echo 'stub'; ".to_vec(),
            eol: true,
            api_version: [0x11, 0x10],
            flags: 0,
            alias: Vec::new(),
            metadata: Vec::new(),
            entries: Vec::new(),
            signature: None,
            manifest_len_delta: 0,
        }
    }

    pub fn file(self, name: &str, content: &[u8]) -> Self {
        self.raw(name, content, content.len() as u32, crc32(content), 0o644)
    }

    pub fn gz_file(self, name: &str, content: &[u8]) -> Self {
        let mut enc = DeflateEncoder::new(Vec::new(), Level::default());
        // Writing into a Vec cannot fail.
        enc.write_all(content).expect("deflate into memory");
        let packed = enc.finish().expect("deflate into memory");
        self.raw(name, &packed, content.len() as u32, crc32(content), 0x1000 | 0o644)
    }

    pub fn raw(mut self, name: &str, stored: &[u8], size: u32, crc: u32, flags: u32) -> Self {
        self.entries.push(FixtureEntry {
            name: name.to_string(),
            stored: stored.to_vec(),
            uncompressed_size: size,
            timestamp: 1_700_000_000,
            crc32: crc,
            flags,
            metadata: Vec::new(),
        });
        self
    }

    pub fn alias(mut self, alias: &[u8]) -> Self {
        self.alias = alias.to_vec();
        self
    }

    pub fn signature(mut self, code: u32, digest: &[u8]) -> Self {
        self.flags |= FLAG_SIGNATURE;
        self.signature = Some((code, digest.to_vec()));
        self
    }

    /// Offset of the manifest length field, i.e. the length of stub plus marker.
    pub fn manifest_offset(&self) -> usize {
        let eol = if self.eol { HALT_MARKER_EOL.len() } else { 0 };
        self.stub.len() + HALT_MARKER.len() + eol
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.api_version);
        body.extend_from_slice(&self.flags.to_le_bytes());
        put_bytes(&mut body, &self.alias);
        put_bytes(&mut body, &self.metadata);
        for e in &self.entries {
            put_bytes(&mut body, e.name.as_bytes());
            body.extend_from_slice(&e.uncompressed_size.to_le_bytes());
            body.extend_from_slice(&e.timestamp.to_le_bytes());
            body.extend_from_slice(&(e.stored.len() as u32).to_le_bytes());
            body.extend_from_slice(&e.crc32.to_le_bytes());
            body.extend_from_slice(&e.flags.to_le_bytes());
            put_bytes(&mut body, &e.metadata);
        }

        let mut out = self.stub.clone();
        out.extend_from_slice(HALT_MARKER);
        if self.eol {
            out.extend_from_slice(HALT_MARKER_EOL);
        }
        let manifest_len = (body.len() as i64 + self.manifest_len_delta) as u32;
        out.extend_from_slice(&manifest_len.to_le_bytes());
        out.extend_from_slice(&body);
        for e in &self.entries {
            out.extend_from_slice(&e.stored);
        }
        if let Some((code, digest)) = &self.signature {
            out.extend_from_slice(digest);
            out.extend_from_slice(&code.to_le_bytes());
            out.extend_from_slice(END_MAGIC);
        }
        out
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}
