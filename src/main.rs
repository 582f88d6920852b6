//! Main entry point for the runphar CLI application.
//!
//! This binary lists, inspects and extracts PHAR archives from the local
//! filesystem, stdin, or remote HTTP URLs.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::error;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use runphar::phar::{Compression, DirTree};
use runphar::{
    Cli, Entry, HttpRangeReader, LocalFileReader, Locator, MemoryReader, PharExtractor, Source,
};

/// Application entry point.
///
/// Resolves the archive locator, fetches the archive bytes from the matching
/// source and dispatches to listing, inspection or extraction.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let locator = Locator::parse(&cli.file)?;
    let options = cli.parse_options();

    match &locator.source {
        Source::Http(url) => {
            let reader = Arc::new(HttpRangeReader::new(url.clone()).await?);
            let extractor = PharExtractor::open(reader.clone(), &options).await?;

            process_phar(&extractor, &cli, &locator.internal_path).await?;

            if !cli.is_quiet() {
                eprintln!(
                    "\nTotal bytes transferred: {}",
                    format_size(reader.transferred_bytes())
                );
            }
        }
        Source::Local(path) => {
            let reader = Arc::new(LocalFileReader::new(path)?);
            let extractor = PharExtractor::open(reader, &options).await?;
            process_phar(&extractor, &cli, &locator.internal_path).await?;
        }
        Source::Stdin => {
            let mut data = Vec::new();
            tokio::io::stdin().read_to_end(&mut data).await?;
            let reader = Arc::new(MemoryReader::new(data));
            let extractor = PharExtractor::open(reader, &options).await?;
            process_phar(&extractor, &cli, &locator.internal_path).await?;
        }
    }

    Ok(())
}

/// Process a PHAR archive based on CLI options.
///
/// `internal_path` comes from a `phar://` locator and narrows extraction to
/// that file or directory.
async fn process_phar(extractor: &PharExtractor, cli: &Cli, internal_path: &str) -> Result<()> {
    if cli.info {
        print_info(extractor);
        if !(cli.list || cli.verbose || cli.tree) {
            return Ok(());
        }
    }

    if cli.tree {
        print_tree(extractor);
        return Ok(());
    }

    if cli.list || cli.verbose {
        list_files(extractor, cli.verbose);
        return Ok(());
    }

    let internal_path = internal_path.trim_matches('/');
    let selected: Vec<&Entry> = extractor
        .list_files()
        .iter()
        .filter(|e| {
            // A locator path selects that entry or everything below it
            if !internal_path.is_empty()
                && e.name != internal_path
                && !e.name.starts_with(&format!("{}/", internal_path))
            {
                return false;
            }

            if !cli.files.is_empty() {
                let matches = cli.files.iter().any(|f| {
                    if has_glob_chars(f) {
                        glob_match(f, &e.name)
                    } else {
                        e.name == *f || base_name(&e.name) == f.as_str()
                    }
                });
                if !matches {
                    return false;
                }
            }

            !cli
                .exclude
                .iter()
                .any(|x| e.name.contains(x.as_str()) || glob_match(x, &e.name))
        })
        .collect();

    if selected.is_empty() && !internal_path.is_empty() {
        bail!("{} not found in archive", internal_path);
    }

    // Entry errors are scoped to that entry: report and keep going
    let show_filename = cli.pipe && selected.iter().filter(|e| !e.is_dir).count() > 1;
    let mut failed = 0usize;
    for entry in selected {
        if let Err(e) = extract_file(extractor, entry, cli, show_filename).await {
            if !cli.is_very_quiet() {
                error!("{}: {:#}", entry.name, e);
            }
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} file(s) could not be extracted", failed);
    }
    Ok(())
}

/// Print the archive's global information.
fn print_info(extractor: &PharExtractor) {
    let archive = extractor.archive();

    println!("Stub size:     {} bytes", archive.stub_len);
    println!("Manifest size: {} bytes", archive.manifest_len);
    println!("API version:   {}", archive.api_version);
    println!("Flags:         {:#010x}", archive.flags);
    println!("Alias:         {}", String::from_utf8_lossy(&archive.alias));
    println!("Metadata:      {} bytes", archive.metadata.len());
    println!(
        "Files:         {} ({} declared)",
        archive.entries().len(),
        archive.file_count()
    );
    let payload = archive.payload_range();
    println!("Payload:       {} bytes", payload.end - payload.start);
    match &archive.signature {
        Some(sig) => println!("Signature:     {} {}", sig.algorithm.name(), sig.digest_hex()),
        None => println!("Signature:     none"),
    }
    println!();
}

/// Print the archive contents as an indented tree.
fn print_tree(extractor: &PharExtractor) {
    let tree = DirTree::from_archive(extractor.archive());
    for (depth, _, node) in tree.walk() {
        let suffix = if node.is_dir { "/" } else { "" };
        println!("{}{}{}", "  ".repeat(depth), node.name, suffix);
    }
}

/// List files in the PHAR archive.
///
/// Supports two output formats:
/// - Simple format (`-l`): Just file names, one per line
/// - Verbose format (`-v`): Size, compression ratio, mode, UTC timestamp and method
fn list_files(extractor: &PharExtractor, verbose: bool) {
    let entries = extractor.list_files();

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>4}  {:>10}  {:>5}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Mode", "Date", "Time", "Meth"
        );
        println!("{}", "-".repeat(80));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        if !verbose {
            println!("{}", entry.name);
            continue;
        }

        let method = match entry.compression() {
            Compression::None => "Store".to_string(),
            Compression::Gz => "Gz".to_string(),
            Compression::Bzip2 => "Bzip2".to_string(),
            other => other.to_string(),
        };
        let name = if entry.is_dir {
            format!("{}/", entry.name)
        } else {
            entry.name.clone()
        };

        println!(
            "{:>10}  {:>10}  {}  {:04o}  {}  {:>5}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size as u64, entry.uncompressed_size as u64),
            entry.permissions(),
            format_timestamp(entry.timestamp),
            method,
            name
        );

        if !entry.is_dir {
            total_uncompressed += entry.uncompressed_size as u64;
            total_compressed += entry.compressed_size as u64;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(80));
        println!(
            "{:>10}  {:>10}  {}  {:>37}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }
}

/// Extract a single entry from the archive.
///
/// Handles pipe mode (`-p`), output directory (`-d`), junk paths (`-j`) and
/// overwrite control (`-n`, `-o`).
async fn extract_file(
    extractor: &PharExtractor,
    entry: &Entry,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if cli.pipe {
        if entry.is_dir {
            return Ok(());
        }
        if show_filename {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(format!("--- {} ---\n", entry.name).as_bytes())
                .await?;
        }
        return extractor.extract_to_stdout(entry).await;
    }

    if entry.is_dir && cli.junk_paths {
        return Ok(());
    }

    let dir = cli.extract_dir.as_deref().unwrap_or(".");
    let output_path = extractor.output_path(entry, Path::new(dir), cli.junk_paths)?;

    if output_path.exists() && !entry.is_dir {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        let action = if entry.is_dir { "creating" } else { "extracting" };
        println!("  {:>10}: {}", action, entry.name);
    }

    extractor.extract_to_file(entry, &output_path).await
}

fn base_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a Unix timestamp as `YYYY-MM-DD  HH:MM` in UTC.
fn format_timestamp(timestamp: u32) -> String {
    DateTime::<Utc>::from_timestamp(timestamp as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d  %H:%M").to_string())
        .unwrap_or_else(|| "-".repeat(17))
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Glob matching supporting `*` (any run of characters) and `?` (one character).
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if p == t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern, &text)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
