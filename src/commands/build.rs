//! Build command - Run the pipeline and write the embedding table

use crate::BuildArgs;
use anyhow::{Context, Result};
use atlas::config::AtlasConfig;
use atlas::embeddings::create_embedder;
use atlas::pipeline;
use std::path::Path;
use std::time::Instant;
use tracing::info;

pub fn execute(config_path: Option<&Path>, args: BuildArgs) -> Result<()> {
    let mut config = AtlasConfig::load(config_path).context("Failed to load configuration")?;
    apply_overrides(&mut config, args);
    config.validate()?;

    log_settings(&config);

    let start = Instant::now();
    let mut embedder = create_embedder(&config).context("Failed to create image embedder")?;
    info!("Loaded {} in {:.2?}", embedder.model_name(), start.elapsed());

    let report = pipeline::run(&config, embedder.as_mut())?;

    let output = config.table_path();
    report
        .table
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!();
    println!("✅ Embedding table written to {}", output.display());
    println!("   Images discovered:  {}", report.discovered);
    println!("   Unreadable skipped: {}", report.rejected.len());
    println!("   Rows:               {}", report.table.len());
    println!("   Feature length:     {}", report.feature_length);
    println!(
        "   Dimensions:         {}D ({} PCA)",
        report.table.dims(),
        config.reduction.mode
    );
    let ratios: Vec<String> = report
        .explained_variance_ratio
        .iter()
        .map(|r| format!("{:.1}%", r * 100.0))
        .collect();
    println!(
        "   Variance kept:      {} (total {:.1}%)",
        ratios.join(" / "),
        report.explained_variance_ratio.iter().sum::<f64>() * 100.0
    );
    println!("   Extraction time:    {:.2?}", report.extraction_time);
    println!("   Reduction time:     {:.2?}", report.reduction_time);

    let labels = report.table.labels();
    println!("   Classes:            {}", labels.len());

    Ok(())
}

fn apply_overrides(config: &mut AtlasConfig, args: BuildArgs) {
    if let Some(root) = args.root {
        config.dataset.root_dir = root;
    }
    if args.max_images.is_some() {
        config.dataset.max_images = args.max_images;
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if let Some(n) = args.components {
        config.reduction.n_components = n;
    }
    if let Some(mode) = args.mode {
        config.reduction.mode = mode;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.reduction.chunk_size = chunk_size;
    }
    if let Some(backend) = args.backend {
        config.model.backend = backend;
    }
    if let Some(model) = args.model {
        config.model.path = model;
    }
    if let Some(output) = args.output {
        config.output.table = output;
    }
}

/// One entry per setting so a run can be reproduced from its log.
fn settings_summary(config: &AtlasConfig) -> Vec<(&'static str, String)> {
    vec![
        ("Root directory", config.root_dir().display().to_string()),
        (
            "Max images",
            config
                .dataset
                .max_images
                .map_or_else(|| "unlimited".to_string(), |max| max.to_string()),
        ),
        ("Batch size", config.pipeline.batch_size.to_string()),
        ("Backend", format!("{:?}", config.model.backend)),
        ("Model", config.model.name.clone()),
        ("Model path", config.model_path().display().to_string()),
        ("Components", config.reduction.n_components.to_string()),
        ("Reduction", config.reduction.mode.to_string()),
        ("Chunk size", config.reduction.chunk_size.to_string()),
        ("Output", config.table_path().display().to_string()),
    ]
}

fn log_settings(config: &AtlasConfig) {
    for (name, value) in settings_summary(config) {
        info!("{}: {}", name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas::config::ReductionMode;

    #[test]
    fn test_settings_summary_names_model_and_mode() {
        let mut config = AtlasConfig::default();
        config.model.name = "vit-small-patch16".to_string();
        config.reduction.mode = ReductionMode::Incremental;
        config.dataset.max_images = Some(250);

        let summary = settings_summary(&config);
        let value = |key: &str| {
            summary
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(value("Model").as_deref(), Some("vit-small-patch16"));
        assert_eq!(value("Reduction").as_deref(), Some("incremental"));
        assert_eq!(value("Max images").as_deref(), Some("250"));
        assert_eq!(value("Batch size").as_deref(), Some("100"));
        assert_eq!(value("Components").as_deref(), Some("3"));
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = AtlasConfig::default();
        apply_overrides(
            &mut config,
            BuildArgs {
                components: Some(2),
                mode: Some(ReductionMode::Incremental),
                output: Some("out/map.csv".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(config.reduction.n_components, 2);
        assert_eq!(config.reduction.mode, ReductionMode::Incremental);
        assert_eq!(config.output.table, "out/map.csv");
        assert_eq!(config.pipeline.batch_size, 100);
    }
}
