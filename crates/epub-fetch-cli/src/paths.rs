//! Input validation and output path derivation.

use std::path::{Path, PathBuf};

use anyhow::bail;

pub const EXTENSION: &str = "epub";
pub const OUTPUT_SUFFIX: &str = "_fetched";

/// `book.epub` -> `book_fetched.epub`, in the same directory.
pub fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{OUTPUT_SUFFIX}.{EXTENSION}"))
}

/// Check that `input` is an existing, not yet processed archive and return
/// the output path it maps to.
pub fn validate_input(input: &Path) -> anyhow::Result<PathBuf> {
    if !input.exists() {
        bail!("the file {} does not exist", input.display());
    }
    if !input.is_file() {
        bail!("{} is not a file", input.display());
    }

    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.ends_with(&format!("{OUTPUT_SUFFIX}.{EXTENSION}")) {
        bail!(
            "the file {} already seems to be fetched, pass the original archive",
            input.display()
        );
    }
    if input.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
        bail!("the file {} is not an .{EXTENSION} archive", input.display());
    }

    Ok(output_path(input))
}
