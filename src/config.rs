//! Pipeline and viewer configuration.
//!
//! Loaded from `atlas.toml` (or an explicit `--config` path) and then
//! overridden by CLI flags. Every stage receives the pieces it needs from
//! here; nothing reads settings from globals.

use crate::error::{AtlasError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "atlas.toml";

/// How the projection is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMode {
    /// One global PCA fit over every vector at once.
    #[default]
    Batch,
    /// Chunked PCA fit followed by a separate projection pass.
    Incremental,
}

impl FromStr for ReductionMode {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "batch" | "pca" => Ok(ReductionMode::Batch),
            "incremental" | "ipca" => Ok(ReductionMode::Incremental),
            other => Err(AtlasError::Configuration(format!(
                "unknown reduction mode '{}' (expected batch or incremental)",
                other
            ))),
        }
    }
}

impl fmt::Display for ReductionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReductionMode::Batch => write!(f, "batch"),
            ReductionMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Number of output axes. Fixed for a whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Components {
    Two,
    Three,
}

impl Components {
    pub fn count(self) -> usize {
        match self {
            Components::Two => 2,
            Components::Three => 3,
        }
    }
}

impl TryFrom<usize> for Components {
    type Error = AtlasError;

    fn try_from(n: usize) -> Result<Self> {
        match n {
            2 => Ok(Components::Two),
            3 => Ok(Components::Three),
            other => Err(AtlasError::Configuration(format!(
                "n_components must be 2 or 3, got {}",
                other
            ))),
        }
    }
}

/// Which embedder turns decoded images into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pretrained vision model exported to ONNX.
    #[default]
    Onnx,
    /// Per-channel colour histogram. Needs no weights.
    Histogram,
}

/// How token outputs of the vision model collapse into one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    /// Every token's hidden state concatenated.
    #[default]
    Flatten,
    /// Only the leading [CLS] token.
    Cls,
    /// Average over tokens.
    Mean,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
    pub reduction: ReductionConfig,
    pub viewer: ViewerConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub root_dir: String,
    pub max_images: Option<usize>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root_dir: "images".to_string(),
            max_images: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: Backend,
    /// Path to the ONNX export of the vision model.
    pub path: String,
    /// Human-readable name for logs.
    pub name: String,
    /// Square input resolution expected by the model.
    pub image_size: u32,
    pub input_name: String,
    pub output_name: String,
    pub pooling: Pooling,
    /// Intra-op threads for ONNX Runtime (0 = runtime default).
    pub num_threads: usize,
    /// Bins per channel for the histogram backend.
    pub histogram_bins: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Onnx,
            path: "models/vit-base-patch16-224/model.onnx".to_string(),
            name: "vit-base-patch16-224".to_string(),
            image_size: 224,
            input_name: "pixel_values".to_string(),
            output_name: "last_hidden_state".to_string(),
            pooling: Pooling::Flatten,
            num_threads: 0,
            histogram_bins: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    pub n_components: usize,
    pub mode: ReductionMode,
    /// Vectors per partial fit in incremental mode.
    pub chunk_size: usize,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            n_components: 3,
            mode: ReductionMode::Batch,
            chunk_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub page_size: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self { page_size: 12 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub table: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            table: "embeddings.csv".to_string(),
        }
    }
}

impl AtlasConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `atlas.toml` in the working
    /// directory is used when present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content).map_err(|e| match e {
            AtlasError::Configuration(msg) => {
                AtlasError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AtlasError::Configuration(e.to_string()))
    }

    /// Reject values no stage can work with. Runs before any I/O.
    pub fn validate(&self) -> Result<()> {
        let components = self.components()?;

        if self.pipeline.batch_size == 0 {
            return Err(AtlasError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.reduction.chunk_size < components.count() {
            return Err(AtlasError::Configuration(format!(
                "chunk_size must be at least n_components ({}), got {}",
                components.count(),
                self.reduction.chunk_size
            )));
        }
        if self.viewer.page_size == 0 {
            return Err(AtlasError::Configuration(
                "page_size must be at least 1".to_string(),
            ));
        }
        if self.model.image_size == 0 {
            return Err(AtlasError::Configuration(
                "image_size must be at least 1".to_string(),
            ));
        }
        if self.model.backend == Backend::Histogram && self.model.histogram_bins == 0 {
            return Err(AtlasError::Configuration(
                "histogram_bins must be at least 1".to_string(),
            ));
        }
        if self.dataset.max_images == Some(0) {
            return Err(AtlasError::Configuration(
                "max_images must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn components(&self) -> Result<Components> {
        Components::try_from(self.reduction.n_components)
    }

    pub fn root_dir(&self) -> PathBuf {
        expand(&self.dataset.root_dir)
    }

    pub fn model_path(&self) -> PathBuf {
        expand(&self.model.path)
    }

    pub fn table_path(&self) -> PathBuf {
        expand(&self.output.table)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
