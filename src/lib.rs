//! # runphar
//!
//! A Rust PHAR reader with HTTP URL support using Range requests.
//!
//! The core of the crate is [`phar::Archive`], a decoder that turns a PHAR
//! file held in memory into a list of entries whose contents are decompressed
//! and checksummed on demand. Around it sit byte sources for local files,
//! HTTP servers and stdin, `phar://` locator resolution and a CLI.
//!
//! ## Features
//!
//! - Stub, manifest and entry table decoding with strict bounds checks
//! - Uncompressed and raw DEFLATE (PHAR gz) compressed entries, CRC32 verified
//! - Signature block parsing (MD5, SHA-1, SHA-256, SHA-512)
//! - Directory tree view over entry names
//! - Remote archives fetched with HTTP Range requests
//!
//! ## Example
//!
//! ```no_run
//! use runphar::Archive;
//!
//! fn main() -> anyhow::Result<()> {
//!     let data = std::fs::read("composer.phar")?;
//!     let archive = Archive::parse(data)?;
//!
//!     for entry in archive.entries() {
//!         println!("{} ({} bytes)", entry.name, entry.uncompressed_size);
//!     }
//!
//!     let manifest = archive.read("composer.json")?;
//!     println!("{}", String::from_utf8_lossy(manifest));
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod io;
pub mod locator;
pub mod phar;

pub use cli::Cli;
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use locator::{Locator, Source};
pub use phar::{Archive, DirTree, Entry, ParseOptions, PharError, PharExtractor};
