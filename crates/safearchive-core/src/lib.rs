pub mod config;
pub mod error;
pub mod types;

pub use error::{SaError, SaResult};
pub use types::{BackendTag, CompressionConfig, CompressionMethod, StorageConvention, Warning};
