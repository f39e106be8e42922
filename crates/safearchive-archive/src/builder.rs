//! Source paths → zip container.
//!
//! Entry naming:
//! - a regular file becomes one entry named by its file name
//! - a directory contributes every file and sub-directory beneath it, named
//!   relative to the directory's parent (`photos/2024/a.jpg`), or relative
//!   to the directory itself with [`EntryRoot::Inside`]
//! - missing paths and special files are skipped with a warning
//!
//! Two sources mapping to the same entry name are not disambiguated: the
//! later one replaces the earlier one's content.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Seek, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use safearchive_core::config::ArchiveConfig;
use safearchive_core::{CompressionConfig, CompressionMethod, SaResult};

use crate::zip_err;

/// Where directory entry names are rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryRoot {
    /// `<dir>/file`: names include the directory's own name
    #[default]
    Parent,
    /// `file`: names relative to the directory itself
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry the builder will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    /// `/`-separated; directory names end in `/`
    pub name: String,
    pub source: PathBuf,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub files: usize,
    pub directories: usize,
    /// Uncompressed bytes read from sources
    pub bytes_in: u64,
    /// Source paths that were missing or not a file/directory
    pub skipped: Vec<PathBuf>,
}

/// Ordered entry list with last-wins replacement by name.
#[derive(Default)]
struct Plan {
    entries: Vec<PlannedEntry>,
    index: HashMap<String, usize>,
    skipped: Vec<PathBuf>,
}

impl Plan {
    fn insert(&mut self, entry: PlannedEntry) {
        match self.index.get(&entry.name) {
            Some(&i) => {
                debug!(name = %entry.name, source = %entry.source.display(), "entry name reused, later source wins");
                self.entries[i] = entry;
            }
            None => {
                self.index.insert(entry.name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn skip(&mut self, path: &Path, reason: &str) {
        warn!(path = %path.display(), "skipping source: {reason}");
        self.skipped.push(path.to_path_buf());
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    compression: CompressionConfig,
    allow_zip64: bool,
    preserve_mtime: bool,
    root: EntryRoot,
}

impl ArchiveBuilder {
    /// Fails with `InvalidInput` when the level is outside 1..=9.
    pub fn new(compression: CompressionConfig) -> SaResult<Self> {
        compression.validate()?;
        let compression = if compression.method == CompressionMethod::Lzma {
            // the zip writer can read LZMA entries but not produce them
            warn!("lzma compression is extract-only, writing deflate instead");
            CompressionConfig {
                method: CompressionMethod::Deflate,
                ..compression
            }
        } else {
            compression
        };

        Ok(Self {
            compression,
            allow_zip64: true,
            preserve_mtime: true,
            root: EntryRoot::Parent,
        })
    }

    pub fn from_config(config: &ArchiveConfig) -> SaResult<Self> {
        Ok(Self::new(config.compression()?)?
            .allow_zip64(config.allow_zip64)
            .preserve_mtime(config.preserve_mtime))
    }

    pub fn allow_zip64(mut self, allow: bool) -> Self {
        self.allow_zip64 = allow;
        self
    }

    /// With `false` every entry carries the zip epoch, making output
    /// byte-identical across runs.
    pub fn preserve_mtime(mut self, preserve: bool) -> Self {
        self.preserve_mtime = preserve;
        self
    }

    pub fn entry_root(mut self, root: EntryRoot) -> Self {
        self.root = root;
        self
    }

    pub fn compression(&self) -> CompressionConfig {
        self.compression
    }

    /// Entries that `build` would write, in order.
    pub fn plan<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<PlannedEntry> {
        self.make_plan(paths).entries
    }

    /// Build the container in memory.
    pub fn build<P: AsRef<Path>>(&self, paths: &[P]) -> SaResult<Vec<u8>> {
        let (cursor, _) = self.write_container(paths, Cursor::new(Vec::new()))?;
        Ok(cursor.into_inner())
    }

    /// Build the container straight into `output`, which is created or
    /// truncated.
    pub fn build_to_path<P: AsRef<Path>>(&self, paths: &[P], output: &Path) -> SaResult<BuildSummary> {
        let file = File::create(output)?;
        let (file, summary) = self.write_container(paths, file)?;
        file.sync_all()?;
        Ok(summary)
    }

    fn write_container<P: AsRef<Path>, W: Write + Seek>(
        &self,
        paths: &[P],
        sink: W,
    ) -> SaResult<(W, BuildSummary)> {
        let plan = self.make_plan(paths);
        let mut summary = BuildSummary {
            skipped: plan.skipped,
            ..BuildSummary::default()
        };

        let mut zip = ZipWriter::new(sink);
        for entry in &plan.entries {
            let meta = fs::metadata(&entry.source).ok();
            let options = self.options(meta.as_ref());
            match entry.kind {
                EntryKind::Directory => {
                    zip.add_directory(entry.name.as_str(), options)
                        .map_err(zip_err)?;
                    summary.directories += 1;
                }
                EntryKind::File => {
                    zip.start_file(entry.name.as_str(), options)
                        .map_err(zip_err)?;
                    let mut source = File::open(&entry.source)?;
                    summary.bytes_in += io::copy(&mut source, &mut zip)?;
                    summary.files += 1;
                }
            }
            debug!(name = %entry.name, "entry written");
        }
        let sink = zip.finish().map_err(zip_err)?;

        info!(
            files = summary.files,
            directories = summary.directories,
            bytes_in = summary.bytes_in,
            method = %self.compression.method,
            "container built"
        );
        Ok((sink, summary))
    }

    fn make_plan<P: AsRef<Path>>(&self, paths: &[P]) -> Plan {
        let mut plan = Plan::default();
        for path in paths {
            let path = path.as_ref();
            let meta = match fs::metadata(path) {
                Ok(meta) => meta,
                Err(e) => {
                    plan.skip(path, &e.to_string());
                    continue;
                }
            };

            if meta.is_file() {
                match path.file_name() {
                    Some(name) => plan.insert(PlannedEntry {
                        name: name.to_string_lossy().into_owned(),
                        source: path.to_path_buf(),
                        kind: EntryKind::File,
                    }),
                    None => plan.skip(path, "no file name"),
                }
            } else if meta.is_dir() {
                self.plan_directory(path, &mut plan);
            } else {
                plan.skip(path, "not a regular file or directory");
            }
        }
        plan
    }

    fn plan_directory(&self, dir: &Path, plan: &mut Plan) {
        // Walk the path as given so a symlinked folder keeps its own name.
        let dir = if dir.file_name().is_some() {
            dir.to_path_buf()
        } else {
            match fs::canonicalize(dir) {
                Ok(dir) => dir,
                Err(e) => return plan.skip(dir, &e.to_string()),
            }
        };
        let base = match self.root {
            EntryRoot::Parent => dir.parent().map(Path::to_path_buf).unwrap_or_else(|| dir.clone()),
            EntryRoot::Inside => dir.clone(),
        };

        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };
            let Some(name) = relative_name(entry.path(), &base) else {
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                plan.insert(PlannedEntry {
                    name: format!("{name}/"),
                    source: entry.into_path(),
                    kind: EntryKind::Directory,
                });
            } else if file_type.is_file() {
                plan.insert(PlannedEntry {
                    name,
                    source: entry.into_path(),
                    kind: EntryKind::File,
                });
            } else {
                debug!(path = %entry.path().display(), "skipping special file");
            }
        }
    }

    fn options(&self, meta: Option<&fs::Metadata>) -> SimpleFileOptions {
        let (method, level) = match self.compression.method {
            CompressionMethod::Stored => (zip::CompressionMethod::Stored, None),
            CompressionMethod::Deflate | CompressionMethod::Lzma => (
                zip::CompressionMethod::Deflated,
                Some(i64::from(self.compression.level)),
            ),
            CompressionMethod::Bzip2 => (
                zip::CompressionMethod::Bzip2,
                Some(i64::from(self.compression.level)),
            ),
        };

        let mtime = if self.preserve_mtime {
            meta.and_then(|m| m.modified().ok())
                .and_then(zip_time)
                .unwrap_or_default()
        } else {
            zip::DateTime::default()
        };
        let large = meta.is_some_and(|m| m.is_file() && m.len() > u64::from(u32::MAX));

        SimpleFileOptions::default()
            .compression_method(method)
            .compression_level(level)
            .last_modified_time(mtime)
            .large_file(self.allow_zip64 && large)
    }
}

fn relative_name(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Local wall-clock time, as zip tools expect. `None` outside 1980..=2107.
fn zip_time(t: SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = t.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn builder() -> ArchiveBuilder {
        ArchiveBuilder::new(CompressionConfig::default()).unwrap()
    }

    fn names(container: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(container)).unwrap();
        archive.file_names().map(str::to_string).collect::<Vec<_>>()
    }

    fn read_entry(container: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(container)).unwrap();
        let mut out = Vec::new();
        archive.by_name(name).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_file_dir_and_missing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, b"alpha").unwrap();
        let dir = tmp.path().join("docs");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("x.txt"), b"x").unwrap();
        fs::write(dir.join("y.txt"), b"y").unwrap();
        let missing = tmp.path().join("nope");

        let container = builder().build(&[file, dir, missing]).unwrap();

        let mut got = names(&container);
        got.sort();
        assert_eq!(got, vec!["a.txt", "docs/x.txt", "docs/y.txt"]);
        assert_eq!(read_entry(&container, "docs/y.txt"), b"y");
    }

    #[test]
    fn test_subdirectories_are_materialized() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("root");
        fs::create_dir_all(dir.join("sub/empty")).unwrap();
        fs::write(dir.join("sub/deep.txt"), b"deep").unwrap();

        let plan = builder().plan(&[&dir]);
        let plan_names: Vec<_> = plan.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(plan_names, vec!["root/sub/", "root/sub/deep.txt", "root/sub/empty/"]);

        let container = builder().build(&[&dir]).unwrap();
        assert_eq!(read_entry(&container, "root/sub/deep.txt"), b"deep");
    }

    #[test]
    fn test_inside_root_drops_folder_name() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("project");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("readme.md"), b"hi").unwrap();

        let container = builder()
            .entry_root(EntryRoot::Inside)
            .build(&[&dir])
            .unwrap();
        assert_eq!(names(&container), vec!["readme.md"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_keeps_link_name() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir(&real).unwrap();
        fs::write(real.join("f.txt"), b"f").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let plan = builder().plan(&[&link]);
        let plan_names: Vec<_> = plan.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(plan_names, vec!["link/f.txt"]);
    }

    #[test]
    fn test_parent_dir_path_is_named_after_the_real_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("project");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("a.txt"), b"a").unwrap();

        let plan = builder().plan(&[dir.join("sub").join("..")]);
        let plan_names: Vec<_> = plan.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(plan_names, vec!["project/a.txt", "project/sub/"]);
    }

    #[test]
    fn test_basename_collision_last_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("one/same.txt");
        let second = tmp.path().join("two/same.txt");
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::create_dir_all(second.parent().unwrap()).unwrap();
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();

        let container = builder().build(&[first, second]).unwrap();
        assert_eq!(names(&container), vec!["same.txt"]);
        assert_eq!(read_entry(&container, "same.txt"), b"second");
    }

    #[test]
    fn test_invalid_level_rejected() {
        let bad = CompressionConfig {
            method: CompressionMethod::Deflate,
            level: 0,
        };
        assert!(ArchiveBuilder::new(bad).is_err());
        let bad = CompressionConfig {
            method: CompressionMethod::Bzip2,
            level: 10,
        };
        assert!(ArchiveBuilder::new(bad).is_err());
    }

    #[test]
    fn test_stored_and_bzip2_methods() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("data.bin");
        fs::write(&file, vec![b'z'; 4096]).unwrap();

        for (method, expected) in [
            (CompressionMethod::Stored, zip::CompressionMethod::Stored),
            (CompressionMethod::Bzip2, zip::CompressionMethod::Bzip2),
            (CompressionMethod::Deflate, zip::CompressionMethod::Deflated),
        ] {
            let b = ArchiveBuilder::new(CompressionConfig::new(method, 9).unwrap()).unwrap();
            let container = b.build(&[&file]).unwrap();
            let mut archive = ZipArchive::new(Cursor::new(&container)).unwrap();
            assert_eq!(archive.by_index(0).unwrap().compression(), expected);
            assert_eq!(read_entry(&container, "data.bin").len(), 4096);
        }
    }

    #[test]
    fn test_lzma_writes_deflate() {
        let b = ArchiveBuilder::new(CompressionConfig::new(CompressionMethod::Lzma, 5).unwrap())
            .unwrap();
        assert_eq!(b.compression().method, CompressionMethod::Deflate);
        assert_eq!(b.compression().level, 5);
    }

    #[test]
    fn test_output_is_reproducible_without_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("d");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("f"), b"content").unwrap();

        let b = builder().preserve_mtime(false);
        assert_eq!(b.build(&[&dir]).unwrap(), b.build(&[&dir]).unwrap());
    }

    #[test]
    fn test_build_to_path_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("src");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("one"), b"12345").unwrap();
        fs::write(dir.join("nested/two"), b"678").unwrap();
        let out = tmp.path().join("out.zip");

        let summary = builder()
            .build_to_path(&[dir, tmp.path().join("ghost")], &out)
            .unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 1);
        assert_eq!(summary.bytes_in, 8);
        assert_eq!(summary.skipped, vec![tmp.path().join("ghost")]);

        let container = fs::read(&out).unwrap();
        assert_eq!(read_entry(&container, "src/nested/two"), b"678");
    }

    #[test]
    fn test_empty_input_builds_empty_container() {
        let container = builder().build::<PathBuf>(&[]).unwrap();
        assert!(names(&container).is_empty());
    }
}
