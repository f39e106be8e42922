//! safearchive-crypto: password-based envelopes for SafeArchive containers
//!
//! Two incompatible on-disk layouts exist, one per backend:
//! ```text
//! Token (Backend A):  salt(16) || fernet-token (base64url ASCII)
//! Block (Backend B):  salt(16) || iv(16) || AES-256-CBC ciphertext (PKCS#7)
//! ```
//! Both derive their key with PBKDF2-HMAC-SHA256 (390000 rounds) from the
//! password and the envelope's salt.
//!
//! New envelopes are prefixed with an [`envelope::EnvelopeHeader`] naming the
//! backend and KDF rounds. Headerless envelopes written by older releases are
//! still opened by trying backends in the order encryption prefers them.

mod cbc;

pub mod dispatch;
pub mod envelope;
pub mod kdf;

#[cfg(feature = "block-cipher")]
pub mod block;
#[cfg(feature = "token-cipher")]
pub mod token;

pub use dispatch::{compiled_backends, CipherBackend, DispatchOptions, Dispatcher, EncryptOutcome};
pub use envelope::EnvelopeHeader;
pub use kdf::{derive_key, generate_salt, DerivedKey, KdfParams, Password};

/// Size of the derived symmetric key (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the random salt stored at the front of every envelope
pub const SALT_SIZE: usize = 16;

/// AES block size, also the CBC IV size
pub const BLOCK_SIZE: usize = 16;

/// PBKDF2-HMAC-SHA256 rounds. Changing this breaks headerless envelopes.
pub const PBKDF2_ITERATIONS: u32 = 390_000;
