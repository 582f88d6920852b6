use runphar::phar::ParseOptions;
use runphar::phar::codec::crc32;
use runphar::phar::fixture::PharBuilder;
use runphar::{MemoryReader, PharExtractor};
use std::path::PathBuf;
use std::sync::Arc;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("runphar-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

async fn open(data: Vec<u8>) -> PharExtractor {
    let reader = Arc::new(MemoryReader::new(data));
    PharExtractor::open(reader, &ParseOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn opens_from_reader_and_extracts() {
    let data = PharBuilder::new()
        .file("index.php", b"<?php require 'src/App.php';")
        .file("src/", b"")
        .gz_file("src/App.php", &b"<?php class App {}\n".repeat(10))
        .build();
    let extractor = open(data).await;
    assert_eq!(extractor.list_files().len(), 3);

    let out = scratch_dir("extract");
    for entry in extractor.list_files() {
        extractor.extract_into(entry, &out).await.unwrap();
    }

    assert!(out.join("src").is_dir());
    assert_eq!(
        std::fs::read(out.join("src/App.php")).unwrap(),
        b"<?php class App {}\n".repeat(10)
    );
    assert_eq!(
        std::fs::read(out.join("index.php")).unwrap(),
        b"<?php require 'src/App.php';"
    );
    std::fs::remove_dir_all(&out).unwrap();
}

#[tokio::test]
async fn parent_segments_stay_inside_output_dir() {
    let data = PharBuilder::new()
        .file("../../escape.txt", b"pwn")
        .file("ok.txt", b"fine")
        .build();
    let extractor = open(data).await;

    let base = scratch_dir("escape");
    let out = base.join("a/b/out");
    let mut failures = 0;
    for entry in extractor.list_files() {
        if extractor.extract_into(entry, &out).await.is_err() {
            failures += 1;
        }
    }

    assert_eq!(failures, 1);
    assert!(!base.join("a/escape.txt").exists());
    assert_eq!(std::fs::read(out.join("ok.txt")).unwrap(), b"fine");

    // Junk paths keep only the last segment, which is safe.
    let entry = extractor.archive().get_entry("../../escape.txt").unwrap();
    let path = extractor.output_path(entry, &out, true).unwrap();
    assert_eq!(path, out.join("escape.txt"));

    std::fs::remove_dir_all(&base).unwrap();
}

#[tokio::test]
async fn corrupt_entry_leaves_no_file() {
    let data = PharBuilder::new()
        .raw("bad.txt", b"payload", 7, crc32(b"payload") ^ 0xff, 0o644)
        .build();
    let extractor = open(data).await;

    let out = scratch_dir("corrupt");
    let entry = &extractor.list_files()[0];
    assert!(extractor.extract_into(entry, &out).await.is_err());
    assert!(!out.join("bad.txt").exists());
    let _ = std::fs::remove_dir_all(&out);
}

#[tokio::test]
async fn open_rejects_non_phar() {
    let reader = Arc::new(MemoryReader::new(b"PK\x03\x04 not a phar".to_vec()));
    assert!(
        PharExtractor::open(reader, &ParseOptions::default())
            .await
            .is_err()
    );
}
