use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SaError, SaResult};
use crate::types::{BackendTag, CompressionConfig, CompressionMethod};

/// Top-level configuration (loaded from safearchive.toml)
///
/// Constructed once at process start and passed by reference into the
/// archive builder, dispatcher and store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeArchiveConfig {
    pub store: StoreConfig,
    pub archive: ArchiveConfig,
    pub crypto: CryptoConfig,
    pub sources: SourcesConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backup store for labelled backups (default: ~/.local/share/safearchive/backups)
    pub backup_dir: PathBuf,
    /// Parent of the `SafeArchive/` folder that receives timestamped folder backups
    pub destination_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// stored, deflate, bzip2 or lzma (unknown names fall back to deflate)
    pub compression_method: CompressionMethod,
    /// 1..=9
    pub compression_level: u8,
    /// Permit zip64 records for entries over 4 GiB
    pub allow_zip64: bool,
    /// Copy file modification times into entry headers
    pub preserve_mtime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Prefix new envelopes with the format/backend header (default: true).
    /// Disable to write files readable by tools that only know the bare layout.
    pub tagged_envelopes: bool,
    /// Fail instead of storing plaintext when no backend is available
    pub require_encryption: bool,
    /// Backends treated as unavailable even when compiled in
    pub disabled_backends: Vec<BackendTag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Folders offered for backup, in insertion order
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("~/.local/share/safearchive/backups"),
            destination_dir: PathBuf::from("~/.local/share/safearchive"),
        }
    }
}

impl StoreConfig {
    /// Directory holding timestamped folder backups: `<destination_dir>/SafeArchive`
    pub fn folder_backup_dir(&self) -> PathBuf {
        expand_tilde(&self.destination_dir).join("SafeArchive")
    }

    pub fn resolved_backup_dir(&self) -> PathBuf {
        expand_tilde(&self.backup_dir)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_method: CompressionMethod::Deflate,
            compression_level: 6,
            allow_zip64: true,
            preserve_mtime: true,
        }
    }
}

impl ArchiveConfig {
    pub fn compression(&self) -> SaResult<CompressionConfig> {
        CompressionConfig::new(self.compression_method, self.compression_level)
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            tagged_envelopes: true,
            require_encryption: false,
            disabled_backends: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl SourcesConfig {
    /// Append a source folder. The path must be an existing directory that
    /// is not already configured.
    pub fn add(&mut self, path: &Path) -> SaResult<PathBuf> {
        let abs = std::fs::canonicalize(path)
            .map_err(|_| SaError::NotFound(path.display().to_string()))?;
        if !abs.is_dir() {
            return Err(SaError::invalid(format!("not a directory: {}", abs.display())));
        }
        if self.paths.contains(&abs) {
            return Err(SaError::invalid(format!(
                "already a source path: {}",
                abs.display()
            )));
        }
        self.paths.push(abs.clone());
        Ok(abs)
    }

    /// Remove the source at zero-based `index`.
    pub fn remove(&mut self, index: usize) -> SaResult<PathBuf> {
        if index >= self.paths.len() {
            return Err(SaError::invalid(format!(
                "no source path at position {} (have {})",
                index + 1,
                self.paths.len()
            )));
        }
        Ok(self.paths.remove(index))
    }
}

impl SafeArchiveConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> SaResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| SaError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> SaResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| SaError::Config(format!("serializing config: {e}")))?;
        std::fs::write(path, rendered)?;
        Ok(())
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
