// SPDX-FileCopyrightText: 2025 HalfSweet
// SPDX-License-Identifier: Apache-2.0

//! pcb-preview renders realistic front and back preview images of a board by
//! compositing its per-layer SVG plots into one document and rasterizing it.

pub mod board;
pub mod compositor;
pub mod config;
pub mod error;
pub mod holes;
pub mod palette;
pub mod pipeline;
pub mod previewer;
pub mod progress;
pub mod rasterizer;
pub mod svg;

pub use board::{BoardBounds, BoardProvider, KicadBoard, LayerId};
pub use compositor::{BlendMode, LayerCompositor, Mirror};
pub use error::{PreviewError, Result};
pub use palette::{Palette, PaletteKind};
pub use pipeline::{RenderPass, RenderPipeline, RenderReport};
pub use previewer::Previewer;
pub use rasterizer::{InkscapeRasterizer, Rasterizer};
