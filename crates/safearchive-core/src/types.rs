use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SaError, SaResult};

/// Zip compression method for new containers.
///
/// Parsing is lenient: both the short names (`deflate`) and the legacy
/// preference names (`ZIP_DEFLATED`) are accepted, and anything unknown falls
/// back to [`CompressionMethod::Deflate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CompressionMethod {
    Stored,
    #[default]
    Deflate,
    Bzip2,
    Lzma,
}

impl CompressionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMethod::Stored => "stored",
            CompressionMethod::Deflate => "deflate",
            CompressionMethod::Bzip2 => "bzip2",
            CompressionMethod::Lzma => "lzma",
        }
    }

    /// Parse a method name. Returns `None` for unrecognized names so callers
    /// can log before falling back.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stored" | "store" | "zip_stored" => Some(CompressionMethod::Stored),
            "deflate" | "deflated" | "zip_deflated" => Some(CompressionMethod::Deflate),
            "bzip2" | "zip_bzip2" => Some(CompressionMethod::Bzip2),
            "lzma" | "zip_lzma" => Some(CompressionMethod::Lzma),
            _ => None,
        }
    }

    pub fn parse_or_default(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            tracing::warn!(method = name, "unknown compression method, using deflate");
            CompressionMethod::Deflate
        })
    }
}

impl From<String> for CompressionMethod {
    fn from(s: String) -> Self {
        Self::parse_or_default(&s)
    }
}

impl From<CompressionMethod> for String {
    fn from(m: CompressionMethod) -> Self {
        m.as_str().to_string()
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression method + level handed to the archive builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    pub method: CompressionMethod,
    /// 1..=9
    pub level: u8,
}

impl CompressionConfig {
    pub const MIN_LEVEL: u8 = 1;
    pub const MAX_LEVEL: u8 = 9;

    pub fn new(method: CompressionMethod, level: u8) -> SaResult<Self> {
        let cfg = Self { method, level };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> SaResult<()> {
        if !(Self::MIN_LEVEL..=Self::MAX_LEVEL).contains(&self.level) {
            return Err(SaError::invalid(format!(
                "compression level {} outside {}..={}",
                self.level,
                Self::MIN_LEVEL,
                Self::MAX_LEVEL
            )));
        }
        Ok(())
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Deflate,
            level: 6,
        }
    }
}

/// Identifies which cryptographic backend produced an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendTag {
    /// Authenticated token cipher (Fernet token)
    Token,
    /// AES-256-CBC fallback without integrity check
    Block,
}

impl BackendTag {
    /// Discriminator byte written into tagged envelope headers.
    pub fn id(&self) -> u8 {
        match self {
            BackendTag::Token => 1,
            BackendTag::Block => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(BackendTag::Token),
            2 => Some(BackendTag::Block),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendTag::Token => "token",
            BackendTag::Block => "block",
        }
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stored backup is laid out on disk, recoverable from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageConvention {
    /// `<name>.zip`, an unencrypted container
    Plain,
    /// `<name>.zip.enc`, the raw envelope bytes (CLI path)
    RawEnvelope,
    /// `<name>.enc.zip`, a zip holding one entry whose bytes are the envelope (API path)
    WrappedEnvelope,
}

impl StorageConvention {
    pub fn suffix(&self) -> &'static str {
        match self {
            StorageConvention::Plain => ".zip",
            StorageConvention::RawEnvelope => ".zip.enc",
            StorageConvention::WrappedEnvelope => ".enc.zip",
        }
    }

    /// Classify a stored file name by suffix. `.enc.zip` is checked before
    /// `.zip` since it ends with it.
    pub fn detect(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".enc.zip") {
            Some(StorageConvention::WrappedEnvelope)
        } else if lower.ends_with(".zip.enc") {
            Some(StorageConvention::RawEnvelope)
        } else if lower.ends_with(".zip") {
            Some(StorageConvention::Plain)
        } else {
            None
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, StorageConvention::Plain)
    }

    /// Strip this convention's suffix from `name`, if present.
    pub fn stem<'a>(&self, name: &'a str) -> &'a str {
        let suffix = self.suffix();
        let Some(split) = name.len().checked_sub(suffix.len()) else {
            return name;
        };
        match name.get(split..) {
            Some(tail) if tail.eq_ignore_ascii_case(suffix) => &name[..split],
            _ => name,
        }
    }
}

impl fmt::Display for StorageConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageConvention::Plain => "plain",
            StorageConvention::RawEnvelope => "raw-envelope",
            StorageConvention::WrappedEnvelope => "wrapped-envelope",
        };
        f.write_str(s)
    }
}

/// Non-fatal conditions reported next to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    /// Encryption was requested but no backend is available; the archive was
    /// kept unencrypted.
    NoEncryptionAvailable,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NoEncryptionAvailable => {
                f.write_str("no encryption backend available; archive saved unencrypted")
            }
        }
    }
}
