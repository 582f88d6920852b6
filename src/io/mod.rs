//! Byte sources for archives.
//!
//! The decoder only ever sees a complete in-memory buffer; these readers are
//! how the CLI gets one, from disk or over HTTP.

mod http;
mod local;
mod memory;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::{debug, trace};

/// Size of each request when pulling a whole source into memory.
const READ_CHUNK: u64 = 4 * 1024 * 1024;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// Read the entire source into memory, chunk by chunk.
pub async fn read_all<R: ReadAt + ?Sized>(reader: &R) -> Result<Vec<u8>> {
    let size = reader.size();
    let mut data = vec![0u8; size as usize];

    let mut offset = 0u64;
    while offset < size {
        let end = (offset + READ_CHUNK).min(size);
        let n = reader
            .read_at(offset, &mut data[offset as usize..end as usize])
            .await?;
        if n == 0 {
            bail!("Unexpected end of data at offset {} of {}", offset, size);
        }
        offset += n as u64;
        trace!("fetched {}/{} bytes", offset, size);
    }

    debug!("read {} bytes from source", size);
    Ok(data)
}
