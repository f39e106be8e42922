//! Stored bytes → plain container.

use tracing::debug;

use safearchive_archive::{inspect_wrapper, open_wrapper, WrappedEntry};
use safearchive_core::{SaError, SaResult, StorageConvention};
use safearchive_crypto::envelope::has_magic;
use safearchive_crypto::{Dispatcher, Password, SALT_SIZE};

/// Local file header signature
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Fernet version byte and the top of its timestamp, base64url encoded
const TOKEN_PREFIX: &[u8; 6] = b"gAAAAA";

/// Decide how stored bytes are laid out.
///
/// The name suffix wins when it is one of the known ones. Otherwise the bytes
/// decide: envelope magic or anything that is not a zip is an envelope. A zip
/// holding exactly one file that is zip-encrypted or looks like an envelope
/// is a wrapper; any other zip is a plain container.
pub fn detect_convention(name_hint: Option<&str>, bytes: &[u8]) -> StorageConvention {
    if let Some(convention) = name_hint.and_then(StorageConvention::detect) {
        return convention;
    }
    if has_magic(bytes) {
        StorageConvention::RawEnvelope
    } else if bytes.starts_with(ZIP_MAGIC) {
        if wraps_envelope(bytes) {
            StorageConvention::WrappedEnvelope
        } else {
            StorageConvention::Plain
        }
    } else {
        StorageConvention::RawEnvelope
    }
}

fn wraps_envelope(bytes: &[u8]) -> bool {
    match inspect_wrapper(bytes, SALT_SIZE + TOKEN_PREFIX.len()) {
        Ok(info) => info.files == 1 && (info.encrypted || looks_like_envelope(&info.head)),
        Err(_) => false,
    }
}

/// Tagged envelope, or a headerless token envelope (`salt ‖ "gAAAAA…"`).
fn looks_like_envelope(head: &[u8]) -> bool {
    has_magic(head) || head.get(SALT_SIZE..) == Some(&TOKEN_PREFIX[..])
}

/// Turn stored backup bytes back into a plain container.
///
/// Plain backups come back unchanged and the password is ignored. Encrypted
/// ones need a non-empty password (`PasswordRequired`). A wrapper whose entry
/// is zip-encrypted already holds the container and is opened with the
/// password directly. A `.enc.zip` whose outer zip cannot be read is retried
/// as a bare envelope, since early API releases stored the envelope without
/// the wrapper.
pub fn restore(
    stored: &[u8],
    name_hint: Option<&str>,
    password: Option<&Password>,
    dispatcher: &Dispatcher,
) -> SaResult<Vec<u8>> {
    let convention = detect_convention(name_hint, stored);
    debug!(%convention, bytes = stored.len(), "restoring");

    if !convention.is_encrypted() {
        return Ok(stored.to_vec());
    }
    let password = password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| SaError::PasswordRequired(name_hint.unwrap_or("backup").to_string()))?;

    match convention {
        StorageConvention::WrappedEnvelope => match open_wrapper(stored, password.expose()) {
            Ok(WrappedEntry::Envelope(envelope)) => dispatcher.decrypt(&envelope, password),
            Ok(WrappedEntry::Container(container)) => Ok(container),
            Err(e @ (SaError::EmptyArchive | SaError::DecryptionFailed)) => Err(e),
            Err(e) => {
                debug!("wrapper unreadable, trying bare envelope: {e}");
                dispatcher.decrypt(stored, password)
            }
        },
        _ => dispatcher.decrypt(stored, password),
    }
}
