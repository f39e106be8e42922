//! Backend selection for encryption and decryption.
//!
//! Encryption walks the available backends in preference order (token, then
//! block) and falls back to an unencrypted container with a warning when none
//! is available. Decryption routes tagged envelopes straight to the named
//! backend and blind-trials legacy ones in the same preference order.

use tracing::{debug, info, warn};

use safearchive_core::config::CryptoConfig;
use safearchive_core::{BackendTag, SaError, SaResult, Warning};

use crate::envelope::EnvelopeHeader;
use crate::kdf::{KdfParams, Password};

// ── Backends ──────────────────────────────────────────────────────────────────

/// One envelope format. Implementations own their layout after the header.
pub trait CipherBackend: Send + Sync {
    fn tag(&self) -> BackendTag;

    fn encrypt(&self, plaintext: &[u8], password: &Password, kdf: &KdfParams)
        -> SaResult<Vec<u8>>;

    fn decrypt(&self, envelope: &[u8], password: &Password, kdf: &KdfParams)
        -> SaResult<Vec<u8>>;
}

#[cfg(feature = "token-cipher")]
pub struct TokenBackend;

#[cfg(feature = "token-cipher")]
impl CipherBackend for TokenBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Token
    }

    fn encrypt(&self, plaintext: &[u8], password: &Password, kdf: &KdfParams) -> SaResult<Vec<u8>> {
        crate::token::encrypt(plaintext, password, kdf)
    }

    fn decrypt(&self, envelope: &[u8], password: &Password, kdf: &KdfParams) -> SaResult<Vec<u8>> {
        crate::token::decrypt(envelope, password, kdf)
    }
}

#[cfg(feature = "block-cipher")]
pub struct BlockBackend;

#[cfg(feature = "block-cipher")]
impl CipherBackend for BlockBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Block
    }

    fn encrypt(&self, plaintext: &[u8], password: &Password, kdf: &KdfParams) -> SaResult<Vec<u8>> {
        crate::block::encrypt(plaintext, password, kdf)
    }

    fn decrypt(&self, envelope: &[u8], password: &Password, kdf: &KdfParams) -> SaResult<Vec<u8>> {
        crate::block::decrypt(envelope, password, kdf)
    }
}

/// Backends built into this binary, in preference order.
pub fn compiled_backends() -> Vec<Box<dyn CipherBackend>> {
    #[allow(unused_mut)]
    let mut backends: Vec<Box<dyn CipherBackend>> = Vec::new();
    #[cfg(feature = "token-cipher")]
    backends.push(Box::new(TokenBackend));
    #[cfg(feature = "block-cipher")]
    backends.push(Box::new(BlockBackend));
    backends
}

// ── Options / outcome ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Prefix new envelopes with an [`EnvelopeHeader`]
    pub tagged_envelopes: bool,
    /// Return [`SaError::NoEncryptionAvailable`] instead of plaintext
    pub require_encryption: bool,
    /// Backends skipped even when compiled in
    pub disabled: Vec<BackendTag>,
    /// KDF rounds for new envelopes and for legacy (headerless) ones
    pub kdf: KdfParams,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            tagged_envelopes: true,
            require_encryption: false,
            disabled: Vec::new(),
            kdf: KdfParams::default(),
        }
    }
}

impl DispatchOptions {
    pub fn from_config(config: &CryptoConfig) -> Self {
        Self {
            tagged_envelopes: config.tagged_envelopes,
            require_encryption: config.require_encryption,
            disabled: config.disabled_backends.clone(),
            kdf: KdfParams::default(),
        }
    }
}

/// Result of [`Dispatcher::encrypt`].
#[derive(Debug)]
pub enum EncryptOutcome {
    Encrypted {
        envelope: Vec<u8>,
        backend: BackendTag,
    },
    /// No backend was available; the container is returned as given.
    Unencrypted { container: Vec<u8>, warning: Warning },
}

impl EncryptOutcome {
    pub fn bytes(&self) -> &[u8] {
        match self {
            EncryptOutcome::Encrypted { envelope, .. } => envelope,
            EncryptOutcome::Unencrypted { container, .. } => container,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            EncryptOutcome::Encrypted { envelope, .. } => envelope,
            EncryptOutcome::Unencrypted { container, .. } => container,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, EncryptOutcome::Encrypted { .. })
    }

    pub fn backend(&self) -> Option<BackendTag> {
        match self {
            EncryptOutcome::Encrypted { backend, .. } => Some(*backend),
            EncryptOutcome::Unencrypted { .. } => None,
        }
    }

    pub fn warning(&self) -> Option<&Warning> {
        match self {
            EncryptOutcome::Encrypted { .. } => None,
            EncryptOutcome::Unencrypted { warning, .. } => Some(warning),
        }
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

pub struct Dispatcher {
    backends: Vec<Box<dyn CipherBackend>>,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Compiled-in backends minus those disabled in `options`.
    pub fn new(options: DispatchOptions) -> Self {
        Self::with_backends(compiled_backends(), options)
    }

    pub fn with_backends(backends: Vec<Box<dyn CipherBackend>>, options: DispatchOptions) -> Self {
        let backends = backends
            .into_iter()
            .filter(|b| !options.disabled.contains(&b.tag()))
            .collect();
        Self { backends, options }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn available(&self) -> Vec<BackendTag> {
        self.backends.iter().map(|b| b.tag()).collect()
    }

    /// Encrypt `container` with the first backend that succeeds.
    ///
    /// A backend error is logged and the next one is tried. If backends
    /// exist but all of them fail, the result is
    /// [`SaError::EncryptionFailed`]; plaintext is only ever returned when no
    /// backend is available at all.
    pub fn encrypt(&self, container: Vec<u8>, password: &Password) -> SaResult<EncryptOutcome> {
        if self.backends.is_empty() {
            if self.options.require_encryption {
                return Err(SaError::NoEncryptionAvailable);
            }
            warn!("{}", Warning::NoEncryptionAvailable);
            return Ok(EncryptOutcome::Unencrypted {
                container,
                warning: Warning::NoEncryptionAvailable,
            });
        }

        let kdf = self.options.kdf;
        for backend in &self.backends {
            match backend.encrypt(&container, password, &kdf) {
                Ok(body) => {
                    let tag = backend.tag();
                    let envelope = if self.options.tagged_envelopes {
                        EnvelopeHeader::new(tag, kdf).wrap(&body)
                    } else {
                        body
                    };
                    info!(backend = %tag, bytes = envelope.len(), "container encrypted");
                    return Ok(EncryptOutcome::Encrypted {
                        envelope,
                        backend: tag,
                    });
                }
                Err(e) => {
                    warn!(backend = %backend.tag(), "encryption backend failed, trying next: {e}");
                }
            }
        }

        Err(SaError::EncryptionFailed)
    }

    /// Recover the container from an envelope.
    ///
    /// Every rejection surfaces as [`SaError::DecryptionFailed`] regardless of
    /// which backend produced it. A tagged envelope whose backend is not
    /// available is [`SaError::BackendUnavailable`]; with no backends at all a
    /// legacy envelope has nothing to try and is `DecryptionFailed`.
    pub fn decrypt(&self, envelope: &[u8], password: &Password) -> SaResult<Vec<u8>> {
        match EnvelopeHeader::parse(envelope) {
            Ok(Some((header, body))) => {
                let backend = self
                    .backends
                    .iter()
                    .find(|b| b.tag() == header.backend)
                    .ok_or(SaError::BackendUnavailable(header.backend))?;
                return backend
                    .decrypt(body, password, &header.kdf)
                    .map_err(|e| if e.is_rejection() { SaError::DecryptionFailed } else { e });
            }
            Ok(None) => {}
            // A legacy salt can begin with the magic bytes by chance
            Err(e) => debug!("envelope header unreadable, treating as legacy: {e}"),
        }

        let kdf = self.options.kdf;
        for backend in &self.backends {
            if let Ok(container) = backend.decrypt(envelope, password, &kdf) {
                debug!(bytes = container.len(), "legacy envelope decrypted");
                return Ok(container);
            }
        }
        Err(SaError::DecryptionFailed)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatchOptions::default())
    }
}

#[cfg(all(test, feature = "token-cipher", feature = "block-cipher"))]
mod tests {
    use super::*;

    fn fast_options() -> DispatchOptions {
        DispatchOptions {
            kdf: KdfParams::new(1_000).unwrap(),
            ..DispatchOptions::default()
        }
    }

    struct BrokenBackend(BackendTag);

    impl CipherBackend for BrokenBackend {
        fn tag(&self) -> BackendTag {
            self.0
        }

        fn encrypt(&self, _: &[u8], _: &Password, _: &KdfParams) -> SaResult<Vec<u8>> {
            Err(SaError::invalid("backend offline"))
        }

        fn decrypt(&self, _: &[u8], _: &Password, _: &KdfParams) -> SaResult<Vec<u8>> {
            Err(SaError::Authentication)
        }
    }

    #[test]
    fn test_prefers_token_backend() {
        let dispatcher = Dispatcher::new(fast_options());
        assert_eq!(dispatcher.available(), vec![BackendTag::Token, BackendTag::Block]);

        let password = Password::from("pw");
        let outcome = dispatcher.encrypt(b"container".to_vec(), &password).unwrap();
        assert_eq!(outcome.backend(), Some(BackendTag::Token));
        assert!(outcome.warning().is_none());

        let container = dispatcher.decrypt(outcome.bytes(), &password).unwrap();
        assert_eq!(container, b"container");
    }

    #[test]
    fn test_falls_back_when_first_backend_fails() {
        let dispatcher = Dispatcher::with_backends(
            vec![Box::new(BrokenBackend(BackendTag::Token)), Box::new(BlockBackend)],
            fast_options(),
        );
        let password = Password::from("pw");

        let outcome = dispatcher.encrypt(b"data".to_vec(), &password).unwrap();
        assert_eq!(outcome.backend(), Some(BackendTag::Block));
        assert_eq!(dispatcher.decrypt(outcome.bytes(), &password).unwrap(), b"data");
    }

    #[test]
    fn test_all_backends_failing_is_an_error() {
        let dispatcher = Dispatcher::with_backends(
            vec![
                Box::new(BrokenBackend(BackendTag::Token)),
                Box::new(BrokenBackend(BackendTag::Block)),
            ],
            fast_options(),
        );
        let result = dispatcher.encrypt(b"data".to_vec(), &Password::from("pw"));
        assert!(matches!(result, Err(SaError::EncryptionFailed)));
    }

    #[test]
    fn test_no_backend_returns_plaintext_with_warning() {
        let dispatcher = Dispatcher::with_backends(Vec::new(), fast_options());
        let outcome = dispatcher.encrypt(b"plain".to_vec(), &Password::from("pw")).unwrap();

        assert!(!outcome.is_encrypted());
        assert_eq!(outcome.warning(), Some(&Warning::NoEncryptionAvailable));
        assert_eq!(outcome.into_bytes(), b"plain");
    }

    #[test]
    fn test_require_encryption_refuses_plaintext() {
        let options = DispatchOptions {
            require_encryption: true,
            ..fast_options()
        };
        let dispatcher = Dispatcher::with_backends(Vec::new(), options);
        assert!(matches!(
            dispatcher.encrypt(b"plain".to_vec(), &Password::from("pw")),
            Err(SaError::NoEncryptionAvailable)
        ));
    }

    #[test]
    fn test_disabled_backend_is_skipped() {
        let options = DispatchOptions {
            disabled: vec![BackendTag::Token],
            ..fast_options()
        };
        let dispatcher = Dispatcher::new(options);
        assert_eq!(dispatcher.available(), vec![BackendTag::Block]);

        let outcome = dispatcher.encrypt(b"x".to_vec(), &Password::from("pw")).unwrap();
        assert_eq!(outcome.backend(), Some(BackendTag::Block));
    }

    #[test]
    fn test_tagged_envelope_for_missing_backend() {
        let password = Password::from("pw");
        let envelope = Dispatcher::new(fast_options())
            .encrypt(b"x".to_vec(), &password)
            .unwrap()
            .into_bytes();

        let block_only = Dispatcher::new(DispatchOptions {
            disabled: vec![BackendTag::Token],
            ..fast_options()
        });
        assert!(matches!(
            block_only.decrypt(&envelope, &password),
            Err(SaError::BackendUnavailable(BackendTag::Token))
        ));
    }

    #[test]
    fn test_tagged_wrong_password() {
        let dispatcher = Dispatcher::new(fast_options());
        let envelope = dispatcher
            .encrypt(b"secret".to_vec(), &Password::from("right"))
            .unwrap()
            .into_bytes();

        assert!(matches!(
            dispatcher.decrypt(&envelope, &Password::from("wrong")),
            Err(SaError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_legacy_envelopes_of_either_backend() {
        let options = fast_options();
        let password = Password::from("legacy");
        let dispatcher = Dispatcher::new(options.clone());

        let token_env = crate::token::encrypt(b"from token", &password, &options.kdf).unwrap();
        assert_eq!(dispatcher.decrypt(&token_env, &password).unwrap(), b"from token");

        let block_env = crate::block::encrypt(b"from block", &password, &options.kdf).unwrap();
        assert_eq!(dispatcher.decrypt(&block_env, &password).unwrap(), b"from block");
    }

    #[test]
    fn test_untagged_encrypt_reads_back() {
        let options = DispatchOptions {
            tagged_envelopes: false,
            ..fast_options()
        };
        let dispatcher = Dispatcher::new(options);
        let password = Password::from("pw");

        let envelope = dispatcher.encrypt(b"bare".to_vec(), &password).unwrap().into_bytes();
        assert!(!crate::envelope::has_magic(&envelope));
        assert_eq!(dispatcher.decrypt(&envelope, &password).unwrap(), b"bare");
    }

    #[test]
    fn test_decrypt_without_backends() {
        let password = Password::from("pw");
        let envelope = Dispatcher::new(fast_options())
            .encrypt(b"x".to_vec(), &password)
            .unwrap()
            .into_bytes();
        let dispatcher = Dispatcher::with_backends(Vec::new(), fast_options());

        assert!(matches!(
            dispatcher.decrypt(&envelope, &password),
            Err(SaError::BackendUnavailable(BackendTag::Token))
        ));
        assert!(matches!(
            dispatcher.decrypt(b"anything", &password),
            Err(SaError::DecryptionFailed)
        ));
    }
}
