//! Backup store: a flat directory of finished backups.
//!
//! Writes go to a `.partial-*` temp file inside the store, are synced, and
//! then linked to their final name with no-clobber semantics. A taken name
//! moves on to the next `_<n>` disambiguator, so concurrent writers never
//! overwrite each other and a crash never leaves a truncated file under a
//! final name.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use safearchive_core::{SaError, SaResult, StorageConvention};

use crate::naming::stored_name;

/// Prefix of in-flight writes; never listed or resolvable.
pub const PARTIAL_PREFIX: &str = ".partial-";

/// Upper bound on `_<n>` disambiguators tried for one stem.
const MAX_DISAMBIGUATORS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredBackup {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub convention: StorageConvention,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    /// Open (creating if needed) the store directory.
    pub fn open(root: impl Into<PathBuf>) -> SaResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "backup store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Atomically store `bytes` as `<stem><suffix>`, or `<stem>_<n><suffix>`
    /// when that name is taken.
    ///
    /// `stem` must already be sanitized.
    pub fn persist(
        &self,
        bytes: &[u8],
        stem: &str,
        convention: StorageConvention,
    ) -> SaResult<StoredBackup> {
        validate_name(stem)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        for n in 0..MAX_DISAMBIGUATORS {
            let name = stored_name(stem, convention, n);
            let path = self.root.join(&name);
            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    info!(name = %name, size = bytes.len(), %convention, "backup stored");
                    return Ok(StoredBackup {
                        name,
                        path,
                        size: bytes.len() as u64,
                        convention,
                    });
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(name = %name, "name taken, trying next");
                    tmp = e.file;
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        Err(SaError::invalid(format!(
            "no free name for {stem:?} after {MAX_DISAMBIGUATORS} attempts"
        )))
    }

    /// Full path of an existing stored backup.
    ///
    /// Rejects anything that is not a bare file name (`InvalidInput`) and
    /// missing files (`NotFound`).
    pub fn path_of(&self, name: &str) -> SaResult<PathBuf> {
        validate_name(name)?;
        if name.starts_with(PARTIAL_PREFIX) {
            return Err(SaError::NotFound(name.to_string()));
        }
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(SaError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Raw stored bytes.
    pub fn resolve(&self, name: &str) -> SaResult<Vec<u8>> {
        let path = self.path_of(name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SaError::NotFound(name.to_string()),
            _ => SaError::Io(e),
        })
    }

    /// Stored backups sorted by name. Files without a known suffix and
    /// in-flight writes are left out.
    pub fn list(&self) -> SaResult<Vec<StoredBackup>> {
        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(PARTIAL_PREFIX) {
                continue;
            }
            let Some(convention) = StorageConvention::detect(&name) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            backups.push(StoredBackup {
                name,
                path: entry.path(),
                size: meta.len(),
                convention,
            });
        }
        backups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(backups)
    }
}

/// A name must be exactly one normal path component.
fn validate_name(name: &str) -> SaResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('\\') => Ok(()),
        _ => Err(SaError::invalid(format!("not a plain backup name: {name:?}"))),
    }
}
