//! Stored backup names.

use chrono::{DateTime, Local};

use safearchive_core::StorageConvention;

/// Label used when sanitizing leaves nothing or a folder has no name.
pub const DEFAULT_LABEL: &str = "backup";

/// Keep ASCII letters, digits, `-` and `_`; drop everything else.
pub fn sanitize_label(label: &str) -> String {
    let clean: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if clean.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        clean
    }
}

/// `<folder>_<YYYYMMDDHHMMSS>` in local time. The folder name is used as is.
pub fn timestamped_stem(folder_name: &str, at: DateTime<Local>) -> String {
    let folder = if folder_name.is_empty() { DEFAULT_LABEL } else { folder_name };
    format!("{folder}_{}", at.format("%Y%m%d%H%M%S"))
}

/// `stem` + suffix, with `_<n>` before the suffix for `n > 0`.
pub fn stored_name(stem: &str, convention: StorageConvention, n: u32) -> String {
    if n == 0 {
        format!("{stem}{}", convention.suffix())
    } else {
        format!("{stem}_{n}{}", convention.suffix())
    }
}
