//! Top-level preview run for one board
//!
//! This module ties configuration, the board provider and the render
//! pipeline together: it prepares the output and scratch directories and
//! renders the front view followed by the back view.

use crate::{
    board::{BoardProvider, KicadBoard},
    config::Config,
    error::{Result, ResultExt},
    palette::Palette,
    pipeline::{RenderPass, RenderPipeline, RenderReport, ScratchDir},
    progress::ProgressTracker,
    rasterizer::{InkscapeRasterizer, Rasterizer},
};
use anyhow::Context;
use std::{fs, path::PathBuf};
use tracing::{debug, info};

/// Renders the preview images of one board
pub struct Previewer {
    config: Config,
    progress_tracker: ProgressTracker,
    reports: Vec<RenderReport>,
}

impl Previewer {
    pub fn new(config: Config) -> Self {
        let progress_enabled = !config.no_progress;

        Self {
            config,
            progress_tracker: ProgressTracker::new(progress_enabled),
            reports: Vec::new(),
        }
    }

    /// Open the configured board with KiCad and render it with Inkscape
    pub fn run(&mut self) -> Result<()> {
        let start = std::time::Instant::now();

        self.config
            .validate()
            .context("Configuration validation failed")?;

        let board = KicadBoard::open(&self.config.board_path)
            .context("Failed to open board")?;

        self.render_board(board, InkscapeRasterizer::new())?;

        info!("Preview completed in {} ms", start.elapsed().as_millis());
        Ok(())
    }

    /// Render the front and back views of `board`.
    ///
    /// The scratch directory is removed when this returns, whether or not a
    /// pass failed.
    pub fn render_board<B, R>(&mut self, board: B, rasterizer: R) -> Result<()>
    where
        B: BoardProvider,
        R: Rasterizer,
    {
        let output_dir = self.config.output_dir();
        fs::create_dir_all(&output_dir).with_path_context("create output directory", &output_dir)?;

        let scratch = ScratchDir::create(self.config.scratch_dir())?;
        let palette = Palette::new(self.config.palette);
        debug!("Using palette {}", palette.kind().as_str());

        let mut pipeline = RenderPipeline::new(
            board,
            rasterizer,
            self.config.project_name(),
            scratch.path(),
            &output_dir,
        )
        .with_palette(palette)
        .with_progress(self.progress_tracker.clone());

        info!("Board bounds: {:?}", pipeline.bounds());

        for pass in [RenderPass::front(), RenderPass::back()] {
            let report = pipeline.render(&pass)?;
            info!(
                "{} view: {} layers -> {}",
                pass.side,
                report.layers_composited,
                report.image.display()
            );
            self.reports.push(report);
        }

        Ok(())
    }

    /// Reports of the passes rendered so far
    pub fn reports(&self) -> &[RenderReport] {
        &self.reports
    }

    /// Get statistics about the preview run
    pub fn get_preview_stats(&self) -> PreviewStats {
        PreviewStats {
            images: self.reports.iter().map(|r| r.image.clone()).collect(),
            layers_composited: self.reports.iter().map(|r| r.layers_composited).sum(),
        }
    }
}

/// Statistics about the preview run
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewStats {
    pub images: Vec<PathBuf>,
    pub layers_composited: usize,
}
