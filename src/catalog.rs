//! Image discovery and validation.
//!
//! The catalog is the ordered list of labeled images every later stage is
//! aligned to. Order comes from a file-name-sorted depth-first walk, so an
//! unchanged tree always yields the same catalog.

use crate::error::{AtlasError, Result};
use image::{DynamicImage, ImageReader, ImageResult};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Accepted image extensions (matched case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One discovered image and the class it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub path: PathBuf,
    /// Name of the directory directly containing the image. Never empty.
    pub label: String,
}

/// An image dropped by validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub path: PathBuf,
    pub reason: String,
}

/// Walk `root` and collect every accepted image, in traversal order.
///
/// With `max_images`, the walk stops as soon as that many entries exist, so
/// the result is always a prefix of the unbounded catalog.
pub fn build_catalog(root: &Path, max_images: Option<usize>) -> Result<Vec<CatalogEntry>> {
    // Surface a missing or unreadable root as a discovery failure up front
    std::fs::read_dir(root).map_err(|source| AtlasError::Discovery {
        path: root.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    let entries = collect_entries(walker, max_images);

    debug!("Discovered {} images under {}", entries.len(), root.display());
    Ok(entries)
}

/// Pull walk results until `max_images` entries are collected. Nothing past
/// the entry that reaches the limit is read.
fn collect_entries<I>(walker: I, max_images: Option<usize>) -> Vec<CatalogEntry>
where
    I: Iterator<Item = walkdir::Result<walkdir::DirEntry>>,
{
    let mut entries = Vec::new();
    if max_images == Some(0) {
        return entries;
    }

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable path during discovery: {}", err);
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_image_file(entry.path()) {
            continue;
        }

        let path = entry.into_path();
        match label_for(&path) {
            Some(label) => entries.push(CatalogEntry { path, label }),
            None => {
                warn!("No label directory for {}, skipping", path.display());
                continue;
            }
        }

        if max_images.is_some_and(|max| entries.len() >= max) {
            break;
        }
    }

    entries
}

/// Decode every entry and split off the ones that fail.
///
/// Corruption is expected in scraped datasets, so this never errors. Order of
/// the surviving entries is preserved.
pub fn validate_catalog(entries: Vec<CatalogEntry>) -> (Vec<CatalogEntry>, Vec<Rejection>) {
    let checks: Vec<std::result::Result<(), String>> = entries
        .par_iter()
        .map(|entry| verify_image(&entry.path))
        .collect();

    let mut valid = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();

    for (entry, check) in entries.into_iter().zip(checks) {
        match check {
            Ok(()) => valid.push(entry),
            Err(reason) => {
                warn!("Dropping corrupt image {}: {}", entry.path.display(), reason);
                rejected.push(Rejection {
                    path: entry.path,
                    reason,
                });
            }
        }
    }

    (valid, rejected)
}

/// Check that a file has an accepted image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

/// Directory name directly above `path`.
///
/// Falls back to the canonical path when the parent is spelled `.` or empty.
fn label_for(path: &Path) -> Option<String> {
    let parent = path.parent()?;

    let name = match parent.file_name().and_then(|n| n.to_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => parent
            .canonicalize()
            .ok()?
            .file_name()?
            .to_str()?
            .to_string(),
    };

    (!name.is_empty()).then_some(name)
}

/// Decode an image, picking the format from its contents rather than its
/// extension. Validation and extraction both go through here.
pub fn open_image(path: &Path) -> ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

fn verify_image(path: &Path) -> std::result::Result<(), String> {
    open_image(path).map(|_| ()).map_err(|e| e.to_string())
}
