use crate::core::hash::HasherRegistry;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively walk `dir`, returning every file some registered hasher can
/// fingerprint, sorted by path.
pub fn find_image_files(dir: &Path, registry: &HasherRegistry) -> Result<Vec<PathBuf>> {
    log::debug!("Searching for image files in {}", dir.display());

    let mut images = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() && registry.supports(entry.path()) {
            images.push(entry.into_path());
        }
    }
    images.sort();

    log::debug!("Found {} image files", images.len());
    Ok(images)
}
