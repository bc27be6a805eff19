//! Render pipeline for one board
//!
//! A pass plots every configured layer, composites it onto a fresh canvas,
//! attaches the drill overlay, writes the merged SVG and hands it to the
//! rasterizer. Passes run strictly one after another.

use crate::board::{BoardBounds, BoardProvider, LayerId};
use crate::compositor::{BlendMode, LayerCompositor, Mirror};
use crate::config::{output_file_name, RenderSettings};
use crate::error::{Result, ResultExt};
use crate::holes::build_hole_overlay;
use crate::palette::{ColorRole, Palette};
use crate::progress::ProgressTracker;
use crate::rasterizer::{CropWindow, RasterJob, Rasterizer};
use crate::svg::{IdAllocator, VectorDocument};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One entry of a layer stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub layer: LayerId,
    pub blend: BlendMode,
    pub role: ColorRole,
}

impl LayerDescriptor {
    pub const fn new(layer: LayerId, blend: BlendMode, role: ColorRole) -> Self {
        Self { layer, blend, role }
    }
}

/// Front view stack, bottom to top
pub const FRONT_STACK: &[LayerDescriptor] = &[
    LayerDescriptor::new(LayerId::InnerCopper(1), BlendMode::Opaque, ColorRole::CopperInner),
    LayerDescriptor::new(LayerId::FrontCopper, BlendMode::Opaque, ColorRole::Copper),
    LayerDescriptor::new(LayerId::FrontMask, BlendMode::MaskInvert, ColorRole::SolderMask),
    LayerDescriptor::new(LayerId::FrontPaste, BlendMode::Opaque, ColorRole::Paste),
    LayerDescriptor::new(LayerId::FrontSilk, BlendMode::Opaque, ColorRole::Silk),
    LayerDescriptor::new(LayerId::EdgeCuts, BlendMode::Opaque, ColorRole::Edge),
];

/// Back view stack, bottom to top
pub const BACK_STACK: &[LayerDescriptor] = &[
    LayerDescriptor::new(LayerId::InnerCopper(2), BlendMode::Opaque, ColorRole::CopperInner),
    LayerDescriptor::new(LayerId::BackCopper, BlendMode::Opaque, ColorRole::Copper),
    LayerDescriptor::new(LayerId::BackMask, BlendMode::MaskInvert, ColorRole::SolderMask),
    LayerDescriptor::new(LayerId::BackPaste, BlendMode::Opaque, ColorRole::Paste),
    LayerDescriptor::new(LayerId::BackSilk, BlendMode::Opaque, ColorRole::Silk),
    LayerDescriptor::new(LayerId::EdgeCuts, BlendMode::Opaque, ColorRole::Edge),
];

/// One full render producing one image
#[derive(Debug, Clone)]
pub struct RenderPass<'a> {
    /// `Front` or `Back`, used in messages and file names
    pub side: &'a str,
    pub layers: &'a [LayerDescriptor],
    pub mirror: Mirror,
}

impl RenderPass<'static> {
    pub fn front() -> Self {
        Self {
            side: "Front",
            layers: FRONT_STACK,
            mirror: Mirror::Unmirrored,
        }
    }

    pub fn back() -> Self {
        Self {
            side: "Back",
            layers: BACK_STACK,
            mirror: Mirror::Horizontal,
        }
    }
}

/// What a finished pass produced
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub image: PathBuf,
    pub merged_svg: PathBuf,
    pub layers_composited: usize,
    pub crop: CropWindow,
}

/// Scratch directory emptied on creation and removed on drop
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        remove_dir_if_present(&path).with_path_context("clear scratch directory", &path)?;
        fs::create_dir_all(&path).with_path_context("create scratch directory", &path)?;
        debug!("Scratch directory ready: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = remove_dir_if_present(&self.path) {
            warn!(
                "Failed to remove scratch directory {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Drives compositing and rasterization for every pass of one board
pub struct RenderPipeline<B, R> {
    board: B,
    rasterizer: R,
    palette: Palette,
    settings: RenderSettings,
    bounds: BoardBounds,
    ids: IdAllocator,
    project: String,
    scratch_dir: PathBuf,
    output_dir: PathBuf,
    progress: ProgressTracker,
}

impl<B: BoardProvider, R: Rasterizer> RenderPipeline<B, R> {
    pub fn new(
        board: B,
        rasterizer: R,
        project: impl Into<String>,
        scratch_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let bounds = board.bounds();
        Self {
            board,
            rasterizer,
            palette: Palette::default(),
            settings: RenderSettings::default(),
            bounds,
            ids: IdAllocator::new(),
            project: project.into(),
            scratch_dir: scratch_dir.into(),
            output_dir: output_dir.into(),
            progress: ProgressTracker::new(false),
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn bounds(&self) -> BoardBounds {
        self.bounds
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    /// Composite every layer of the pass onto a new canvas, drill overlay last
    pub fn composite(&mut self, pass: &RenderPass<'_>) -> Result<LayerCompositor> {
        let mut compositor = LayerCompositor::new(self.bounds, pass.mirror);
        let progress = self.progress.create_layer_progress(pass.layers.len(), pass.side);

        for descriptor in pass.layers {
            let name = descriptor.layer.kicad_name();
            ProgressTracker::update_progress(&progress, 0, Some(name.as_str()));

            if !self.board.has_layer(descriptor.layer) {
                debug!("Board has no {} layer, skipping", name);
                ProgressTracker::update_progress(&progress, 1, None);
                continue;
            }

            let loaded = self
                .palette
                .color(descriptor.role)
                .and_then(|color| Ok((self.load_layer(descriptor.layer)?, color)));
            let (layer, color) = match loaded {
                Ok(loaded) => loaded,
                Err(e) => {
                    ProgressTracker::finish_with_error(progress, &name);
                    return Err(e).with_layer_context(&name);
                }
            };

            debug!(
                "Compositing {} as {} ({:?})",
                name,
                descriptor.role.as_str(),
                descriptor.blend
            );
            compositor.add_layer(layer, descriptor.blend, color);
            ProgressTracker::update_progress(&progress, 1, None);
        }

        // Drills are not part of any plotted layer
        compositor.add_hole_overlay(build_hole_overlay(&self.board));

        ProgressTracker::finish_progress(
            progress,
            &format!(
                "{} pass: {} layers composited",
                pass.side,
                compositor.layer_count()
            ),
        );
        Ok(compositor)
    }

    fn load_layer(&mut self, layer: LayerId) -> Result<VectorDocument> {
        let path = self.board.plot_layer(layer, &self.scratch_dir)?;
        // The plotter may still be flushing the file
        std::thread::sleep(self.settings.plot_settle);
        VectorDocument::load(&path, &mut self.ids)
    }

    /// Run one full pass and return what it produced
    pub fn render(&mut self, pass: &RenderPass<'_>) -> Result<RenderReport> {
        info!("Rendering {} view of {}", pass.side, self.project);

        let compositor = self.composite(pass).with_pass_context(pass.side)?;
        let layers_composited = compositor.layer_count();

        info!("Merging layers...");
        let merged_svg = self
            .scratch_dir
            .join(format!("{}-{}-merged.svg", self.project, pass.side));
        compositor.serialize(&merged_svg)?;

        info!("Rasterizing...");
        let crop = CropWindow::from_bounds(&self.bounds, &self.settings, pass.mirror);
        let image = self
            .output_dir
            .join(output_file_name(&self.project, pass.side));
        let background = self.palette.background()?;
        let job = RasterJob {
            input: merged_svg.clone(),
            output: image.clone(),
            area: crop,
            dpi: self.settings.dpi,
            background,
        };

        let spinner = self
            .progress
            .create_spinner(&format!("Rasterizing {} view...", pass.side));
        if let Err(e) = self.rasterizer.rasterize(&job) {
            ProgressTracker::finish_with_error(spinner, "Rasterization failed");
            return Err(e).with_pass_context(pass.side);
        }
        ProgressTracker::finish_progress(spinner, &format!("Wrote {}", image.display()));

        Ok(RenderReport {
            image,
            merged_svg,
            layers_composited,
            crop,
        })
    }
}
