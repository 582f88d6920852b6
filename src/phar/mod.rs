//! PHAR archive decoding.
//!
//! ## Architecture
//!
//! - [`codec`]: field readers, decompression and CRC32, no archive knowledge
//! - [`parser`]: stub, manifest and signature parsing over a byte buffer
//! - [`structures`]: constants and the types the parser produces
//! - [`Archive`]: the decoded archive and entry lookup
//! - [`DirTree`]: directory view built from entry names
//! - [`PharExtractor`]: async extraction to files or stdout
//!
//! ## PHAR Format Overview
//!
//! A PHAR file consists of:
//! 1. A stub (usually PHP code) ending in `__HALT_COMPILER(); ?>`
//! 2. The manifest: global header followed by one header per entry
//! 3. Entry payloads, back to back in manifest order
//! 4. An optional signature: digest, algorithm code, `GBMB`
//!
//! ## Supported Features
//!
//! - Uncompressed and raw DEFLATE (PHAR gz) compressed entries
//! - MD5, SHA-1, SHA-256 and SHA-512 signature blocks (structure only)
//!
//! ## Limitations
//!
//! - No bzip2 entries (reported as unsupported)
//! - Signatures are not verified, OpenSSL signatures are not recognized
//! - Tar and zip based phars are not supported

mod archive;
pub mod codec;
mod error;
mod extractor;
mod options;
pub mod parser;
mod structures;
mod tree;

#[doc(hidden)]
pub mod fixture;

pub use archive::Archive;
pub use error::{PharError, Result};
pub use extractor::PharExtractor;
pub use options::{DuplicatePolicy, ParseOptions};
pub use parser::ManifestParser;
pub use structures::*;
pub use tree::{DirTree, TreeNode};
