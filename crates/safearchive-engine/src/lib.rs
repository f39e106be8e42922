//! safearchive-engine: the backup and restore pipeline
//!
//! Backup: sources → [`ArchiveBuilder`](safearchive_archive::ArchiveBuilder)
//! → [`Dispatcher`](safearchive_crypto::Dispatcher) → [`BackupStore`](safearchive_store::BackupStore).
//! Restore runs the other way through [`restore::restore`].

pub mod engine;
pub mod restore;

pub use engine::{ArchiveOutput, BackupReceipt, Engine};
pub use restore::{detect_convention, restore};
