use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{ACCEPT_RANGES, RANGE};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ReadAt;
use anyhow::{Context, Result, anyhow, bail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRY: u32 = 10;

/// Reads a remote PHAR with HTTP Range requests.
///
/// [`read_all`](super::read_all) asks for one chunk per call, so every chunk
/// is a single ranged GET and a dropped connection only repeats that chunk.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
}

impl HttpRangeReader {
    /// Send a HEAD request to learn the archive size and check Range support
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let resp = client
            .head(&url)
            .send()
            .await
            .with_context(|| format!("HEAD {}", url))?;
        if !resp.status().is_success() {
            bail!("HEAD {} failed with status: {}", url, resp.status());
        }

        let ranges = resp
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");
        if !ranges.contains("bytes") {
            bail!("{} does not support Range requests", url);
        }

        let size = resp
            .content_length()
            .ok_or_else(|| anyhow!("{} did not return Content-Length", url))?;
        debug!("{}: {} bytes", url, size);

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// One ranged GET for `start..=end`, retried on timeouts and connect errors.
    async fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let range = format!("bytes={}-{}", start, end);
        let mut attempt = 0;
        loop {
            match self.client.get(&self.url).header(RANGE, &range).send().await {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => {
                    return Ok(resp.bytes().await?.to_vec());
                }
                Ok(resp) => bail!("GET {} ({}) failed with status: {}", self.url, range, resp.status()),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    attempt += 1;
                    if attempt >= MAX_RETRY {
                        return Err(e).context(format!("giving up on {} after {} attempts", range, attempt));
                    }
                    warn!("{} ({}): retry {}/{}: {}", self.url, range, attempt, MAX_RETRY, e);
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }
        let end = (offset + buf.len() as u64).min(self.size) - 1;

        // Servers may answer with less than asked; the caller loops for the rest.
        let body = self.fetch_range(offset, end).await?;
        let n = body.len().min(buf.len());
        buf[..n].copy_from_slice(&body[..n]);

        self.transferred_bytes.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
