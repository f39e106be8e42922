//! safearchive-store: where finished backups live
//!
//! Names are `<sanitized-label><suffix>` with the suffix chosen by
//! [`StorageConvention`](safearchive_core::StorageConvention):
//! `.zip` (plain), `.zip.enc` (raw envelope), `.enc.zip` (wrapped envelope).

pub mod naming;
pub mod store;

pub use naming::{sanitize_label, stored_name, timestamped_stem};
pub use store::{BackupStore, StoredBackup, PARTIAL_PREFIX};
