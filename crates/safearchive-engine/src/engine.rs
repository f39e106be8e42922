//! Backup engine: archive builder, dispatcher and stores wired together.
//!
//! Two stores are involved:
//!   - the backup store (`[store] backup_dir`) for labelled backups
//!     (`<label>.enc.zip` / `<label>.zip`)
//!   - the folder store (`<destination_dir>/SafeArchive`) for timestamped
//!     folder backups (`<folder>_<YYYYMMDDHHMMSS>.zip.enc` / `.zip`)
//!
//! Lookups by name check the backup store first, then the folder store.
//!
//! Every operation builds its intermediate container inside its own
//! temporary directory, removed when the operation returns.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tempfile::TempDir;
use tracing::{info, warn};

use safearchive_archive::{extract, wrap_single_entry, ArchiveBuilder, EntryRoot, ExtractSummary};
use safearchive_core::config::SafeArchiveConfig;
use safearchive_core::{BackendTag, SaError, SaResult, StorageConvention, Warning};
use safearchive_crypto::{DispatchOptions, Dispatcher, EncryptOutcome, Password};
use safearchive_store::{sanitize_label, timestamped_stem, BackupStore, StoredBackup};

use crate::restore::restore;

const CONTAINER_NAME: &str = "container.zip";

/// What a stored backup ended up as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReceipt {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// BLAKE3 of the stored bytes, hex
    pub blake3: String,
    pub convention: StorageConvention,
    pub backend: Option<BackendTag>,
    pub warnings: Vec<Warning>,
}

/// A downloadable archive that was not stored.
#[derive(Debug)]
pub struct ArchiveOutput {
    /// Plain container, or a raw envelope when `backend` is set
    pub bytes: Vec<u8>,
    pub backend: Option<BackendTag>,
    pub warnings: Vec<Warning>,
}

pub struct Engine {
    builder: ArchiveBuilder,
    dispatcher: Dispatcher,
    store: BackupStore,
    folder_dir: PathBuf,
}

impl Engine {
    /// Wire everything from configuration. Opens (and creates) the backup
    /// store; the folder store is created on first folder backup.
    pub fn new(config: &SafeArchiveConfig) -> SaResult<Self> {
        Ok(Self {
            builder: ArchiveBuilder::from_config(&config.archive)?,
            dispatcher: Dispatcher::new(DispatchOptions::from_config(&config.crypto)),
            store: BackupStore::open(config.store.resolved_backup_dir())?,
            folder_dir: config.store.folder_backup_dir(),
        })
    }

    pub fn with_parts(
        builder: ArchiveBuilder,
        dispatcher: Dispatcher,
        store: BackupStore,
        folder_dir: PathBuf,
    ) -> Self {
        Self {
            builder,
            dispatcher,
            store,
            folder_dir,
        }
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn folder_dir(&self) -> &Path {
        &self.folder_dir
    }

    /// Build an archive from already-saved files and optionally encrypt it.
    /// Nothing is written to either store.
    pub fn create_archive<P: AsRef<Path>>(
        &self,
        paths: &[P],
        password: Option<&Password>,
    ) -> SaResult<ArchiveOutput> {
        let container = self.build_container(&self.builder, paths)?;
        let Some(password) = requested(password) else {
            return Ok(ArchiveOutput {
                bytes: container,
                backend: None,
                warnings: Vec::new(),
            });
        };

        let outcome = self.dispatcher.encrypt(container, password)?;
        let backend = outcome.backend();
        let warnings = outcome.warning().cloned().into_iter().collect();
        Ok(ArchiveOutput {
            bytes: outcome.into_bytes(),
            backend,
            warnings,
        })
    }

    /// Labelled backup into the backup store: `<label>.enc.zip` when
    /// encrypted (envelope wrapped as `<label>.zip`), `<label>.zip` otherwise.
    pub fn save_backup<P: AsRef<Path>>(
        &self,
        paths: &[P],
        label: &str,
        password: Option<&Password>,
    ) -> SaResult<BackupReceipt> {
        let stem = sanitize_label(label);
        let container = self.build_container(&self.builder, paths)?;

        let Some(password) = requested(password) else {
            return self.persist(&self.store, &container, &stem, StorageConvention::Plain, None, Vec::new());
        };

        match self.dispatcher.encrypt(container, password)? {
            EncryptOutcome::Encrypted { envelope, backend } => {
                let wrapped = wrap_single_entry(&format!("{stem}.zip"), &envelope)?;
                self.persist(
                    &self.store,
                    &wrapped,
                    &stem,
                    StorageConvention::WrappedEnvelope,
                    Some(backend),
                    Vec::new(),
                )
            }
            EncryptOutcome::Unencrypted { container, warning } => self.persist(
                &self.store,
                &container,
                &stem,
                StorageConvention::Plain,
                None,
                vec![warning],
            ),
        }
    }

    /// Timestamped backup of one folder's contents into the folder store:
    /// `<folder>_<YYYYMMDDHHMMSS>.zip.enc` holding the raw envelope, or
    /// `.zip` when unencrypted.
    pub fn backup_folder(&self, folder: &Path, password: Option<&Password>) -> SaResult<BackupReceipt> {
        let meta = fs::metadata(folder).map_err(|_| SaError::NotFound(folder.display().to_string()))?;
        if !meta.is_dir() {
            return Err(SaError::invalid(format!("not a directory: {}", folder.display())));
        }
        let folder_name = match folder.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => fs::canonicalize(folder)?
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let stem = timestamped_stem(&folder_name, Local::now());

        let builder = self.builder.clone().entry_root(EntryRoot::Inside);
        let container = self.build_container(&builder, &[folder])?;
        let store = BackupStore::open(&self.folder_dir)?;

        let Some(password) = requested(password) else {
            return self.persist(&store, &container, &stem, StorageConvention::Plain, None, Vec::new());
        };

        match self.dispatcher.encrypt(container, password)? {
            EncryptOutcome::Encrypted { envelope, backend } => self.persist(
                &store,
                &envelope,
                &stem,
                StorageConvention::RawEnvelope,
                Some(backend),
                Vec::new(),
            ),
            EncryptOutcome::Unencrypted { container, warning } => {
                self.persist(&store, &container, &stem, StorageConvention::Plain, None, vec![warning])
            }
        }
    }

    /// Backups from both stores, sorted by name.
    pub fn list(&self) -> SaResult<Vec<StoredBackup>> {
        let mut backups = self.store.list()?;
        if self.folder_dir.is_dir() && self.folder_dir != self.store.root() {
            backups.extend(BackupStore::open(&self.folder_dir)?.list()?);
        }
        backups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(backups)
    }

    /// Raw stored bytes, exactly as persisted.
    pub fn fetch(&self, name: &str) -> SaResult<Vec<u8>> {
        self.locate(name)?.resolve(name)
    }

    /// Stored backup → plain container.
    pub fn restore_backup(&self, name: &str, password: Option<&Password>) -> SaResult<Vec<u8>> {
        let stored = self.fetch(name)?;
        restore(&stored, Some(name), password, &self.dispatcher)
    }

    /// Stored backup → files under `dest`.
    pub fn restore_to_dir(
        &self,
        name: &str,
        password: Option<&Password>,
        dest: &Path,
    ) -> SaResult<ExtractSummary> {
        let container = self.restore_backup(name, password)?;
        let summary = extract(&container, dest)?;
        info!(name, dest = %dest.display(), files = summary.files, "backup restored");
        Ok(summary)
    }

    fn locate(&self, name: &str) -> SaResult<BackupStore> {
        match self.store.path_of(name) {
            Ok(_) => Ok(self.store.clone()),
            Err(SaError::NotFound(_)) if self.folder_dir.is_dir() => {
                let folder_store = BackupStore::open(&self.folder_dir)?;
                folder_store.path_of(name)?;
                Ok(folder_store)
            }
            Err(e) => Err(e),
        }
    }

    fn build_container<P: AsRef<Path>>(&self, builder: &ArchiveBuilder, paths: &[P]) -> SaResult<Vec<u8>> {
        let scratch = TempDir::new()?;
        let path = scratch.path().join(CONTAINER_NAME);
        let summary = builder.build_to_path(paths, &path)?;
        if summary.files == 0 && summary.directories == 0 {
            warn!("no source files found, container is empty");
        }
        Ok(fs::read(&path)?)
    }

    fn persist(
        &self,
        store: &BackupStore,
        bytes: &[u8],
        stem: &str,
        convention: StorageConvention,
        backend: Option<BackendTag>,
        warnings: Vec<Warning>,
    ) -> SaResult<BackupReceipt> {
        let stored = store.persist(bytes, stem, convention)?;
        Ok(BackupReceipt {
            name: stored.name,
            path: stored.path,
            size: stored.size,
            blake3: blake3::hash(bytes).to_hex().to_string(),
            convention,
            backend,
            warnings,
        })
    }
}

/// An empty password means no encryption was asked for.
fn requested(password: Option<&Password>) -> Option<&Password> {
    password.filter(|p| !p.is_empty())
}

#[cfg(all(test, feature = "token-cipher", feature = "block-cipher"))]
mod tests {
    use super::*;
    use safearchive_core::CompressionConfig;
    use safearchive_crypto::KdfParams;

    fn engine(dir: &Path, options: DispatchOptions) -> Engine {
        Engine::with_parts(
            ArchiveBuilder::new(CompressionConfig::default()).unwrap(),
            Dispatcher::new(DispatchOptions {
                kdf: KdfParams::new(1_000).unwrap(),
                ..options
            }),
            BackupStore::open(dir.join("backups")).unwrap(),
            dir.join("dest/SafeArchive"),
        )
    }

    fn sources(dir: &Path) -> PathBuf {
        let src = dir.join("Documents");
        fs::create_dir_all(src.join("tax")).unwrap();
        fs::write(src.join("tax/2023.pdf"), b"%PDF-1.7").unwrap();
        fs::write(src.join("todo.txt"), b"- backups").unwrap();
        src
    }

    #[test]
    fn test_requested_password() {
        assert!(requested(None).is_none());
        assert!(requested(Some(&Password::from(""))).is_none());
        assert!(requested(Some(&Password::from("x"))).is_some());
    }

    #[test]
    fn test_save_backup_plain_without_password() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path(), DispatchOptions::default());
        let src = sources(tmp.path());

        let receipt = engine.save_backup(&[&src], "My Docs!", None).unwrap();
        assert_eq!(receipt.name, "MyDocs.zip");
        assert_eq!(receipt.convention, StorageConvention::Plain);
        assert_eq!(receipt.backend, None);
        assert!(receipt.warnings.is_empty());
        assert_eq!(receipt.blake3, blake3::hash(&engine.fetch("MyDocs.zip").unwrap()).to_hex().to_string());
    }

    #[test]
    fn test_no_backend_saves_plain_with_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(
            tmp.path(),
            DispatchOptions {
                disabled: vec![BackendTag::Token, BackendTag::Block],
                ..DispatchOptions::default()
            },
        );
        let src = sources(tmp.path());

        let receipt = engine
            .save_backup(&[&src], "docs", Some(&Password::from("pw")))
            .unwrap();
        assert_eq!(receipt.name, "docs.zip");
        assert_eq!(receipt.warnings, vec![Warning::NoEncryptionAvailable]);
    }

    #[test]
    fn test_folder_backup_name_and_location() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path(), DispatchOptions::default());
        let src = sources(tmp.path());

        let receipt = engine.backup_folder(&src, Some(&Password::from("pw"))).unwrap();
        assert!(receipt.name.starts_with("Documents_"));
        assert!(receipt.name.ends_with(".zip.enc"));
        assert_eq!(receipt.name.len(), "Documents_".len() + 14 + ".zip.enc".len());
        assert!(receipt.path.starts_with(tmp.path().join("dest/SafeArchive")));
        assert_eq!(receipt.backend, Some(BackendTag::Token));
    }

    #[test]
    fn test_folder_backup_keeps_folder_name_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path(), DispatchOptions::default());
        let src = tmp.path().join("My Docs");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("note.txt"), b"keep me").unwrap();
        let password = Password::from("pw");

        let receipt = engine.backup_folder(&src, Some(&password)).unwrap();
        assert!(receipt.name.starts_with("My Docs_"));
        assert!(receipt.name.ends_with(".zip.enc"));

        let out = tmp.path().join("restored");
        engine.restore_to_dir(&receipt.name, Some(&password), &out).unwrap();
        assert_eq!(fs::read(out.join("note.txt")).unwrap(), b"keep me");
    }

    #[cfg(unix)]
    #[test]
    fn test_folder_backup_through_symlink_uses_link_name() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path(), DispatchOptions::default());
        let src = sources(tmp.path());
        let link = tmp.path().join("Shortcut");
        std::os::unix::fs::symlink(&src, &link).unwrap();

        let receipt = engine.backup_folder(&link, None).unwrap();
        assert!(receipt.name.starts_with("Shortcut_"));
        assert!(receipt.name.ends_with(".zip"));
    }

    #[test]
    fn test_folder_backup_requires_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path(), DispatchOptions::default());
        let file = tmp.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            engine.backup_folder(&tmp.path().join("missing"), None),
            Err(SaError::NotFound(_))
        ));
        assert!(matches!(
            engine.backup_folder(&file, None),
            Err(SaError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_create_archive_encrypted_is_raw_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path(), DispatchOptions::default());
        let src = sources(tmp.path());
        let password = Password::from("pw");

        let out = engine.create_archive(&[&src], Some(&password)).unwrap();
        assert_eq!(out.backend, Some(BackendTag::Token));
        let container = engine.dispatcher().decrypt(&out.bytes, &password).unwrap();
        assert!(container.starts_with(b"PK"));
        assert!(engine.list().unwrap().is_empty());
    }

    #[test]
    fn test_receipt_serializes() {
        let receipt = BackupReceipt {
            name: "a.zip".into(),
            path: PathBuf::from("/tmp/a.zip"),
            size: 3,
            blake3: "00".into(),
            convention: StorageConvention::Plain,
            backend: Some(BackendTag::Block),
            warnings: vec![Warning::NoEncryptionAvailable],
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["backend"], "block");
        assert_eq!(json["convention"], "plain");
        assert_eq!(json["warnings"][0], "no_encryption_available");
    }
}
