//! Build a container from a mixed source set, wrap it, unwrap it and extract
//! it again; the restored tree must match the sources.

use std::fs;
use std::path::Path;

use safearchive_archive::{extract, open_wrapper, wrap_single_entry, ArchiveBuilder, EntryRoot, WrappedEntry};
use safearchive_core::{CompressionConfig, CompressionMethod};
use tempfile::TempDir;

fn write(dir: &Path, rel: &str, content: &[u8]) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn folder_and_loose_file_survive_the_trip() {
    let src = TempDir::new().unwrap();
    write(src.path(), "album/cover.png", &[0x89, b'P', b'N', b'G']);
    write(src.path(), "album/tracks/01.flac", &vec![7u8; 10_000]);
    write(src.path(), "notes.txt", b"remember the milk");

    let builder = ArchiveBuilder::new(CompressionConfig::new(CompressionMethod::Bzip2, 9).unwrap())
        .unwrap();
    let container = builder
        .build(&[src.path().join("album"), src.path().join("notes.txt")])
        .unwrap();

    let wrapped = wrap_single_entry("album.zip", &container).unwrap();
    let WrappedEntry::Envelope(unwrapped) = open_wrapper(&wrapped, b"").unwrap() else {
        panic!("stored entry came back as zip-encrypted");
    };
    assert_eq!(unwrapped, container);

    let dest = TempDir::new().unwrap();
    let summary = extract(&unwrapped, dest.path()).unwrap();
    assert_eq!(summary.files, 3);

    assert_eq!(
        fs::read(dest.path().join("album/tracks/01.flac")).unwrap(),
        vec![7u8; 10_000]
    );
    assert_eq!(
        fs::read(dest.path().join("notes.txt")).unwrap(),
        b"remember the milk"
    );
    assert!(dest.path().join("album/tracks").is_dir());
}

#[test]
fn inside_root_restores_folder_contents_in_place() {
    let src = TempDir::new().unwrap();
    write(src.path(), "project/Cargo.toml", b"[package]");
    write(src.path(), "project/src/main.rs", b"fn main() {}");

    let container = ArchiveBuilder::new(CompressionConfig::default())
        .unwrap()
        .entry_root(EntryRoot::Inside)
        .build(&[src.path().join("project")])
        .unwrap();

    let dest = TempDir::new().unwrap();
    extract(&container, dest.path()).unwrap();
    assert_eq!(fs::read(dest.path().join("src/main.rs")).unwrap(), b"fn main() {}");
    assert!(!dest.path().join("project").exists());
}
