//! Error handling for pcb-preview
//!
//! Every fallible operation returns `anyhow::Result`. Failures the caller
//! may want to tell apart (missing tools, bad board files, unreadable plots,
//! rasterizer errors) are `PreviewError` values inside it.

use anyhow::Context;
use std::path::Path;

pub type Result<T> = anyhow::Result<T>;

/// Extension trait for Results to add context with file paths
pub trait ResultExt<T> {
    /// Add context with file path information
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T>;

    /// Add context naming the board layer being processed
    fn with_layer_context(self, layer: &str) -> Result<T>;

    /// Add context naming the render pass
    fn with_pass_context(self, pass: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error> + Send + Sync + 'static,
{
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Failed to {} file: {}", operation, path.as_ref().display()))
    }

    fn with_layer_context(self, layer: &str) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error compositing layer {}", layer))
    }

    fn with_pass_context(self, pass: &str) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error rendering {} pass", pass))
    }
}

/// Specific error types for pcb-preview operations
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("Board model provider unavailable ({tool}): {reason}")]
    ProviderUnavailable { tool: String, reason: String },

    #[error("Invalid board file: {reason}")]
    BoardParse { reason: String },

    #[error("Board has no Edge.Cuts outline to derive bounds from")]
    NoBoardOutline,

    #[error("Layer plot could not be loaded from {path}: {reason}")]
    LayerPlotUnreadable { path: String, reason: String },

    #[error("Rasterizer '{program}' not found in search path")]
    RasterizerNotFound { program: String },

    #[error("Rasterizer exited with {status}")]
    RasterizerFailed { status: String },

    #[error("Rasterizer reported success but produced no image at {path}")]
    RasterOutputMissing { path: String },

    #[error("Unknown palette: {name}")]
    UnknownPalette { name: String },

    #[error("Invalid color value: {value}")]
    InvalidColor { value: String },
}
