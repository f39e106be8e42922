//! Single-entry outer zip used by `.enc.zip` backups.
//!
//! Current releases store the envelope (not compressed) as one entry named
//! `<label>.zip`. Older releases instead stored the plain container as one
//! WinZip-AES encrypted entry keyed by the backup password. Readers take the
//! first file entry and ignore the rest.

use std::io::{Cursor, Read, Write};

use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use safearchive_core::{SaError, SaResult};

use crate::zip_err;

/// What the first file entry of a wrapper holds.
#[derive(Debug, PartialEq, Eq)]
pub enum WrappedEntry {
    /// Envelope bytes, still to be decrypted
    Envelope(Vec<u8>),
    /// Zip-encrypted entry, already decrypted: the plain container
    Container(Vec<u8>),
}

/// Shape of a zip that may be a wrapper. Nothing is decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperInfo {
    /// Non-directory entries
    pub files: usize,
    /// First file entry is zip-encrypted
    pub encrypted: bool,
    /// Leading bytes of the first file entry; empty when encrypted
    pub head: Vec<u8>,
}

pub fn wrap_single_entry(entry_name: &str, payload: &[u8]) -> SaResult<Vec<u8>> {
    if entry_name.is_empty() || entry_name.contains(|c: char| c == '/' || c == '\\') {
        return Err(SaError::invalid(format!(
            "wrapper entry name must be a bare file name: {entry_name:?}"
        )));
    }

    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .large_file(payload.len() as u64 > u64::from(u32::MAX));

    let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(payload.len() + 256)));
    zip.start_file(entry_name, options).map_err(zip_err)?;
    zip.write_all(payload)?;
    Ok(zip.finish().map_err(zip_err)?.into_inner())
}

/// Open a wrapper of either generation.
///
/// A zip-encrypted first entry is decrypted with `password`; a wrong
/// password or a failed integrity check is `DecryptionFailed`. An
/// unencrypted entry comes back as an envelope for the dispatcher.
pub fn open_wrapper(wrapper: &[u8], password: &[u8]) -> SaResult<WrappedEntry> {
    let mut archive = ZipArchive::new(Cursor::new(wrapper)).map_err(zip_err)?;
    let index = first_file(&mut archive)?;
    if archive.len() > 1 {
        warn!(entries = archive.len(), "wrapper holds more than one entry, using the first file");
    }

    let encrypted = archive.by_index_raw(index).map_err(zip_err)?.encrypted();
    if !encrypted {
        let mut entry = archive.by_index(index).map_err(zip_err)?;
        let mut envelope = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut envelope)?;
        return Ok(WrappedEntry::Envelope(envelope));
    }

    let mut entry = match archive.by_index_decrypt(index, password) {
        Ok(entry) => entry,
        Err(ZipError::InvalidPassword) => return Err(SaError::DecryptionFailed),
        Err(e) => return Err(zip_err(e)),
    };
    let mut container = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut container)
        .map_err(|_| SaError::DecryptionFailed)?;
    debug!(bytes = container.len(), "zip-encrypted wrapper entry decrypted");
    Ok(WrappedEntry::Container(container))
}

/// Count file entries and peek at up to `head_len` bytes of the first one.
pub fn inspect_wrapper(wrapper: &[u8], head_len: usize) -> SaResult<WrapperInfo> {
    let mut archive = ZipArchive::new(Cursor::new(wrapper)).map_err(zip_err)?;
    let index = first_file(&mut archive)?;

    let mut files = 0;
    for i in 0..archive.len() {
        if !archive.by_index_raw(i).map_err(zip_err)?.is_dir() {
            files += 1;
        }
    }

    let encrypted = archive.by_index_raw(index).map_err(zip_err)?.encrypted();
    let mut head = Vec::with_capacity(head_len);
    if !encrypted {
        let entry = archive.by_index(index).map_err(zip_err)?;
        entry.take(head_len as u64).read_to_end(&mut head)?;
    }

    Ok(WrapperInfo {
        files,
        encrypted,
        head,
    })
}

fn first_file(archive: &mut ZipArchive<Cursor<&[u8]>>) -> SaResult<usize> {
    for i in 0..archive.len() {
        if !archive.by_index_raw(i).map_err(zip_err)?.is_dir() {
            return Ok(i);
        }
    }
    Err(SaError::EmptyArchive)
}
