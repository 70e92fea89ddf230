//! Catalog command - Show what the pipeline would embed

use anyhow::{Context, Result};
use atlas::catalog::{build_catalog, validate_catalog};
use atlas::config::AtlasConfig;
use std::collections::BTreeMap;
use std::path::Path;

pub fn execute(
    config_path: Option<&Path>,
    root: Option<String>,
    max_images: Option<usize>,
    validate: bool,
) -> Result<()> {
    let mut config = AtlasConfig::load(config_path).context("Failed to load configuration")?;
    if let Some(root) = root {
        config.dataset.root_dir = root;
    }
    if max_images.is_some() {
        config.dataset.max_images = max_images;
    }
    config.validate()?;

    let root = config.root_dir();
    let entries = build_catalog(&root, config.dataset.max_images)?;
    println!("📂 Found {} images under {}", entries.len(), root.display());

    let (entries, rejected) = if validate {
        validate_catalog(entries)
    } else {
        (entries, Vec::new())
    };

    let mut per_label: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &entries {
        *per_label.entry(entry.label.as_str()).or_default() += 1;
    }

    println!();
    for (label, count) in &per_label {
        println!("   {:<24} {:>6}", label, count);
    }

    if !rejected.is_empty() {
        println!();
        println!("⚠️  {} unreadable images skipped:", rejected.len());
        for r in &rejected {
            println!("   {} ({})", r.path.display(), r.reason);
        }
    }

    println!();
    println!(
        "✓ {} usable images in {} classes",
        entries.len(),
        per_label.len()
    );

    Ok(())
}
