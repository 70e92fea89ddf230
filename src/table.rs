//! The embedding table: coordinates joined with image path and label.
//!
//! This is the only artifact shared by the pipeline and the viewer. On disk
//! it is a comma-separated file with one of two exact headers:
//!
//! ```text
//! x,y,image_path,label
//! x,y,z,image_path,label
//! ```
//!
//! The presence of `z` is how a reader tells a 3-D table from a 2-D one.
//! Row `i` belongs to catalog entry `i`; there is no other join key.

use crate::catalog::CatalogEntry;
use crate::config::Components;
use crate::error::{AtlasError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const HEADER_2D: [&str; 4] = ["x", "y", "image_path", "label"];
pub const HEADER_3D: [&str; 5] = ["x", "y", "z", "image_path", "label"];

/// Above this many rows a table is refused for 3-D viewing.
pub const MAX_3D_ROWS: usize = 500_000;

/// Position of one point in the reduced space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingRow {
    pub coordinates: Coordinates,
    pub image_path: String,
    pub label: String,
}

/// Number of rows carrying a label, for the legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    components: Components,
    rows: Vec<EmbeddingRow>,
}

#[derive(Serialize, Deserialize)]
struct FlatRow2 {
    x: f64,
    y: f64,
    image_path: String,
    label: String,
}

#[derive(Serialize, Deserialize)]
struct FlatRow3 {
    x: f64,
    y: f64,
    z: f64,
    image_path: String,
    label: String,
}

/// Join reduced coordinates with the catalog they were computed from.
pub fn assemble(coordinates: ArrayView2<'_, f64>, entries: &[CatalogEntry]) -> Result<EmbeddingTable> {
    if coordinates.nrows() != entries.len() {
        return Err(AtlasError::Schema(format!(
            "{} coordinate rows for {} catalog entries",
            coordinates.nrows(),
            entries.len()
        )));
    }

    let components = Components::try_from(coordinates.ncols()).map_err(|_| {
        AtlasError::Schema(format!(
            "coordinates must have 2 or 3 columns, got {}",
            coordinates.ncols()
        ))
    })?;

    let rows = coordinates
        .rows()
        .into_iter()
        .zip(entries)
        .map(|(point, entry)| EmbeddingRow {
            coordinates: Coordinates {
                x: point[0],
                y: point[1],
                z: (components == Components::Three).then(|| point[2]),
            },
            image_path: entry.path.to_string_lossy().into_owned(),
            label: entry.label.clone(),
        })
        .collect();

    Ok(EmbeddingTable { components, rows })
}

impl EmbeddingTable {
    pub fn components(&self) -> Components {
        self.components
    }

    /// Coordinate columns per row: 2 or 3.
    pub fn dims(&self) -> usize {
        self.components.count()
    }

    pub fn is_3d(&self) -> bool {
        self.components == Components::Three
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[EmbeddingRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&EmbeddingRow> {
        self.rows.get(index)
    }

    /// Distinct labels in order of first appearance, with row counts.
    pub fn labels(&self) -> Vec<LabelCount> {
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut counts: Vec<LabelCount> = Vec::new();

        for row in &self.rows {
            match position.get(row.label.as_str()) {
                Some(&i) => counts[i].count += 1,
                None => {
                    position.insert(&row.label, counts.len());
                    counts.push(LabelCount {
                        label: row.label.clone(),
                        count: 1,
                    });
                }
            }
        }
        counts
    }

    /// Refuse tables too large to plot in three dimensions.
    pub fn check_viewable(&self) -> Result<()> {
        if self.is_3d() && self.len() > MAX_3D_ROWS {
            return Err(AtlasError::Configuration(format!(
                "{} rows is too many for a 3D plot (limit {}); reduce to 2 components",
                self.len(),
                MAX_3D_ROWS
            )));
        }
        Ok(())
    }

    /// Serialize to the delimited text format.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        match self.components {
            Components::Two => {
                csv.write_record(HEADER_2D)?;
                for row in &self.rows {
                    csv.serialize(FlatRow2 {
                        x: row.coordinates.x,
                        y: row.coordinates.y,
                        image_path: row.image_path.clone(),
                        label: row.label.clone(),
                    })?;
                }
            }
            Components::Three => {
                csv.write_record(HEADER_3D)?;
                for row in &self.rows {
                    csv.serialize(FlatRow3 {
                        x: row.coordinates.x,
                        y: row.coordinates.y,
                        z: row.coordinates.z.unwrap_or_default(),
                        image_path: row.image_path.clone(),
                        label: row.label.clone(),
                    })?;
                }
            }
        }

        csv.flush()?;
        Ok(())
    }

    /// Parse the delimited text format. The header must match one of the two
    /// schemas exactly.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Self::read_from(bytes)
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let header: Vec<String> = csv.headers()?.iter().map(str::to_string).collect();
        let components = if header == HEADER_2D {
            Components::Two
        } else if header == HEADER_3D {
            Components::Three
        } else {
            return Err(AtlasError::Schema(format!(
                "unrecognized header [{}]; expected [{}] or [{}]",
                header.join(","),
                HEADER_2D.join(","),
                HEADER_3D.join(",")
            )));
        };

        let mut rows = Vec::new();
        match components {
            Components::Two => {
                for record in csv.deserialize::<FlatRow2>() {
                    let r = record?;
                    rows.push(EmbeddingRow {
                        coordinates: Coordinates {
                            x: r.x,
                            y: r.y,
                            z: None,
                        },
                        image_path: r.image_path,
                        label: r.label,
                    });
                }
            }
            Components::Three => {
                for record in csv.deserialize::<FlatRow3>() {
                    let r = record?;
                    rows.push(EmbeddingRow {
                        coordinates: Coordinates {
                            x: r.x,
                            y: r.y,
                            z: Some(r.z),
                        },
                        image_path: r.image_path,
                        label: r.label,
                    });
                }
            }
        }

        if let Some(index) = rows.iter().position(|r| r.label.is_empty()) {
            return Err(AtlasError::Schema(format!("row {} has an empty label", index)));
        }

        Ok(Self { components, rows })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }
}
