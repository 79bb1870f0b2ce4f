//! Hands a generated image to the host's node graph.
//!
//! Once the image exists on disk the generation counts as a success. Anything
//! that goes wrong afterwards is collected as a warning.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::pipeline::GenerationOutcome;
use crate::sniff::{self, SniffResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Grayscale,
    Color,
}

impl ColorMode {
    pub fn from_grayscale(is_grayscale: bool) -> Self {
        if is_grayscale {
            Self::Grayscale
        } else {
            Self::Color
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Color => "color",
        }
    }
}

/// Host-side node creation. Implemented by whatever owns the graph.
pub trait BitmapNodeSink {
    /// Creates a bitmap node backed by `image_path` and returns its id.
    fn create_bitmap_node(&mut self, image_path: &Path) -> anyhow::Result<String>;

    fn set_color_mode(&mut self, node_id: &str, mode: ColorMode) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub path: PathBuf,
    pub node_id: String,
    pub sniff: Option<SniffResult>,
    /// `None` leaves the node's color mode untouched.
    pub color_mode: Option<ColorMode>,
    pub removed_file: bool,
    pub warnings: Vec<String>,
}

/// Creates the node, applies the sniffed color mode and optionally removes the
/// generated file. Only node creation itself is fatal.
pub fn ingest_generated_image(
    sink: &mut dyn BitmapNodeSink,
    path: &Path,
    keep_file: bool,
) -> anyhow::Result<IngestReport> {
    let node_id = sink
        .create_bitmap_node(path)
        .with_context(|| format!("failed creating bitmap node for {}", path.display()))?;
    let mut warnings = Vec::new();

    let sniff = match sniff::classify(path) {
        Ok(result) => Some(result),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not read image for color mode");
            warnings.push(format!("Could not inspect {}: {err}", path.display()));
            None
        }
    };

    let mut color_mode = None;
    if let Some(is_grayscale) = sniff.and_then(|result| result.is_grayscale) {
        let mode = ColorMode::from_grayscale(is_grayscale);
        match sink.set_color_mode(&node_id, mode) {
            Ok(()) => color_mode = Some(mode),
            Err(err) => {
                tracing::warn!(node_id = %node_id, error = %format!("{err:#}"), "failed to set color mode");
                warnings.push(format!("Failed to set color mode on {node_id}: {err:#}"));
            }
        }
    }

    let mut removed_file = false;
    if !keep_file {
        match std::fs::remove_file(path) {
            Ok(()) => removed_file = true,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to delete generated image");
                warnings.push(format!("Failed to delete {}: {err}", path.display()));
            }
        }
    }

    Ok(IngestReport {
        path: path.to_path_buf(),
        node_id,
        sniff,
        color_mode,
        removed_file,
        warnings,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Imported(IngestReport),
    /// The image was generated but could not be placed in the graph.
    GeneratedWithWarning { path: PathBuf, warning: String },
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

pub fn deliver(
    sink: &mut dyn BitmapNodeSink,
    outcome: GenerationOutcome,
    keep_file: bool,
) -> DeliveryOutcome {
    match outcome {
        GenerationOutcome::Failure(message) => DeliveryOutcome::Failed(message),
        GenerationOutcome::Success(path) => match ingest_generated_image(sink, &path, keep_file) {
            Ok(report) => DeliveryOutcome::Imported(report),
            Err(err) => DeliveryOutcome::GeneratedWithWarning {
                path,
                warning: format!("{err:#}"),
            },
        },
    }
}
