//! safearchive-archive: the zip container side of SafeArchive
//!
//! # Overview
//! - `builder`: source paths → zip container, entries in walk order
//! - `wrap`: the `.enc.zip` outer zip holding one envelope (or zip-encrypted) entry
//! - `extract`: container → directory, refusing entries that escape it

pub mod builder;
pub mod extract;
pub mod wrap;

pub use builder::{ArchiveBuilder, BuildSummary, EntryKind, EntryRoot, PlannedEntry};
pub use extract::{entry_names, extract, ExtractSummary};
pub use wrap::{inspect_wrapper, open_wrapper, wrap_single_entry, WrappedEntry, WrapperInfo};

use safearchive_core::SaError;

pub(crate) fn zip_err(e: zip::result::ZipError) -> SaError {
    match e {
        zip::result::ZipError::Io(io) => SaError::Io(io),
        other => SaError::Archive(other.to_string()),
    }
}
