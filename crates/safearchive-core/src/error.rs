use thiserror::Error;

use crate::types::BackendTag;

pub type SaResult<T> = Result<T, SaError>;

/// Structured error kinds shared by every SafeArchive library crate.
///
/// Human-readable prose is produced at the binary boundary; callers should
/// match on the variant rather than the message.
#[derive(Debug, Error)]
pub enum SaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("encryption backend unavailable: {0}")]
    BackendUnavailable(BackendTag),

    /// Integrity tag did not verify (wrong password or corrupted token).
    #[error("authentication failed")]
    Authentication,

    /// Decrypted block data carried an impossible pad length.
    #[error("invalid padding")]
    Padding,

    /// Every backend rejected the envelope. Carries no detail
    /// about which backend got furthest.
    #[error("decryption failed (wrong password or corrupted data)")]
    DecryptionFailed,

    #[error("encryption failed: every available backend returned an error")]
    EncryptionFailed,

    /// No backend is compiled in or enabled, and the caller refused to
    /// store plaintext.
    #[error("no encryption backend available")]
    NoEncryptionAvailable,

    #[error("password required to restore {0}")]
    PasswordRequired(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("archive contains no entries")]
    EmptyArchive,

    #[error("archive error: {0}")]
    Archive(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SaError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SaError::InvalidInput(msg.into())
    }

    /// True for the decryption-time rejections that the dispatcher folds
    /// into [`SaError::DecryptionFailed`].
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SaError::Authentication | SaError::Padding | SaError::DecryptionFailed
        )
    }
}
