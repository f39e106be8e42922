//! Container → directory.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::Path;

use tracing::{debug, info};
use zip::ZipArchive;

use safearchive_core::{SaError, SaResult};

use crate::zip_err;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes_out: u64,
}

/// Unpack a plain container into `dest`, creating it if needed.
///
/// An entry whose name is absolute or climbs out with `..` aborts the
/// extraction with `InvalidInput`; entries already written stay on disk.
/// Existing files are overwritten.
pub fn extract(container: &[u8], dest: &Path) -> SaResult<ExtractSummary> {
    let mut archive = ZipArchive::new(Cursor::new(container)).map_err(zip_err)?;
    fs::create_dir_all(dest)?;

    let mut summary = ExtractSummary::default();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_err)?;
        let Some(rel) = entry.enclosed_name() else {
            return Err(SaError::invalid(format!(
                "entry escapes the destination: {}",
                entry.name()
            )));
        };
        let out = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        summary.bytes_out += io::copy(&mut entry, &mut file)?;
        summary.files += 1;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o777))?;
        }
        debug!(path = %out.display(), "extracted");
    }

    info!(
        dest = %dest.display(),
        files = summary.files,
        directories = summary.directories,
        "container extracted"
    );
    Ok(summary)
}

/// Entry names in archive order.
pub fn entry_names(container: &[u8]) -> SaResult<Vec<String>> {
    let mut archive = ZipArchive::new(Cursor::new(container)).map_err(zip_err)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i).map_err(zip_err)?.name().to_string());
    }
    Ok(names)
}
