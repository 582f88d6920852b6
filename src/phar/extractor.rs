use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::io::{ReadAt, read_all};
use anyhow::{Result, bail};

use super::archive::Archive;
use super::options::ParseOptions;
use super::structures::{Entry, is_safe_name};

/// PHAR file extractor
pub struct PharExtractor {
    archive: Archive,
}

impl PharExtractor {
    /// Fetch the whole source and decode it.
    pub async fn open<R: ReadAt + ?Sized>(reader: Arc<R>, options: &ParseOptions) -> Result<Self> {
        let data = read_all(reader.as_ref()).await?;
        let archive = Archive::parse_with(data, options)?;
        Ok(Self { archive })
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// List all entries in the archive
    pub fn list_files(&self) -> &[Entry] {
        self.archive.entries()
    }

    /// Extract file data to memory
    pub fn extract_to_memory<'a>(&self, entry: &'a Entry) -> Result<&'a [u8]> {
        Ok(entry.contents()?)
    }

    /// Where `entry` lands under `dir`.
    ///
    /// Names that would resolve outside `dir` (`..` segments, absolute or
    /// drive-prefixed paths) are refused. With `junk_paths` only the final
    /// segment is used.
    pub fn output_path(&self, entry: &Entry, dir: &Path, junk_paths: bool) -> Result<PathBuf> {
        let relative = if junk_paths {
            entry.name.rsplit('/').next().unwrap_or(&entry.name)
        } else {
            entry.name.as_str()
        };
        if !is_safe_name(relative) {
            bail!("refusing to extract {}: path escapes the output directory", entry.name);
        }
        Ok(dir.join(relative))
    }

    /// Extract file below `dir`, keeping the archive's directory layout
    pub async fn extract_into(&self, entry: &Entry, dir: &Path) -> Result<PathBuf> {
        let output_path = self.output_path(entry, dir, false)?;
        self.extract_to_file(entry, &output_path).await?;
        Ok(output_path)
    }

    /// Extract file to disk
    pub async fn extract_to_file(&self, entry: &Entry, output_path: &Path) -> Result<()> {
        if entry.is_dir {
            fs::create_dir_all(output_path).await?;
            return Ok(());
        }

        // Create parent directories if needed
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Decode before creating the file so a bad entry leaves nothing behind
        let data = self.extract_to_memory(entry)?;

        let mut file = fs::File::create(output_path).await?;
        file.write_all(data).await?;

        Ok(())
    }

    /// Extract file to stdout
    pub async fn extract_to_stdout(&self, entry: &Entry) -> Result<()> {
        let data = self.extract_to_memory(entry)?;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(data).await?;
        stdout.flush().await?;

        Ok(())
    }
}
