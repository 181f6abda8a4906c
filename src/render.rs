//! Terminal rendering of a detection result.
//!
//! Purely presentational: each present field becomes one block, absent
//! fields produce nothing. Values are not validated.

use anyhow::{Context, Result};
use image::GenericImageView;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::response::DetectionResult;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultBlock {
    AnnotatedImage {
        bytes: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    ShipCount {
        count: u64,
    },
    Probabilities {
        values: Vec<f64>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Report {
    pub blocks: Vec<ResultBlock>,
}

impl Report {
    /// Blocks in output-panel order: image, count, probabilities.
    ///
    /// `image_path` is where the annotated image was written, if it was.
    pub fn from_result(result: &DetectionResult, image_path: Option<&Path>) -> Self {
        let mut blocks = Vec::new();
        if let Some(bytes) = &result.annotated_image {
            let dimensions = image::load_from_memory(bytes)
                .map(|img| img.dimensions())
                .ok();
            blocks.push(ResultBlock::AnnotatedImage {
                bytes: bytes.len(),
                path: image_path.map(Path::to_path_buf),
                width: dimensions.map(|(w, _)| w),
                height: dimensions.map(|(_, h)| h),
            });
        }
        if let Some(count) = result.ship_count {
            blocks.push(ResultBlock::ShipCount { count });
        }
        if let Some(values) = &result.probabilities {
            blocks.push(ResultBlock::Probabilities {
                values: values.clone(),
            });
        }
        Self { blocks }
    }

    pub fn write_text<W: Write>(&self, out: &mut W) -> Result<()> {
        if self.blocks.is_empty() {
            writeln!(out, "No results returned.")?;
            return Ok(());
        }
        for block in &self.blocks {
            match block {
                ResultBlock::AnnotatedImage {
                    bytes,
                    path,
                    width,
                    height,
                } => {
                    let location = path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "not saved".to_string());
                    match (width, height) {
                        (Some(w), Some(h)) => writeln!(
                            out,
                            "Processed Image: {} ({}x{}, {} bytes)",
                            location, w, h, bytes
                        )?,
                        _ => writeln!(out, "Processed Image: {} ({} bytes)", location, bytes)?,
                    }
                }
                ResultBlock::ShipCount { count } => {
                    writeln!(out, "Total Ships Detected: {}", count)?
                }
                ResultBlock::Probabilities { values } => {
                    writeln!(out, "Detection Probabilities:")?;
                    for (i, confidence) in values.iter().enumerate() {
                        writeln!(out, "  Ship {}: {}", i + 1, format_percentage(*confidence))?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn to_text(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_text(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Confidence as a percentage with one decimal. Purely cosmetic.
pub fn format_percentage(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}

/// Write the annotated image bytes verbatim. Returns the path written, if any.
pub fn save_annotated_image(result: &DetectionResult, path: &Path) -> Result<Option<PathBuf>> {
    let Some(bytes) = &result.annotated_image else {
        return Ok(None);
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output directory {}", parent.display()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("write annotated image {}", path.display()))?;
    Ok(Some(path.to_path_buf()))
}
