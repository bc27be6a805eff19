//! SVG document model used for layer compositing
//!
//! Layer plots are parsed into a typed element tree, their identifiers are
//! made unique, and their drawable content is extracted and recolored before
//! being merged into the output canvas.

mod document;
mod node;
mod style;

pub use document::{IdAllocator, VectorDocument, BOARD_MASK_ID, RESERVED_ID};
pub use node::{Element, Node};
pub use style::{recolor, ColorTransform, StyleDecls};

use crate::board::BoardBounds;

/// Format a coordinate for an SVG attribute, never producing `-0`
pub fn fmt_num(value: f64) -> String {
    (value + 0.0).to_string()
}

/// Stamp `width`, `height`, `x` and `y` from the board bounds in decimils
pub fn with_bounds(element: Element, bounds: &BoardBounds) -> Element {
    let (x, y, width, height) = bounds.decimils();
    element
        .with_attr("width", fmt_num(width))
        .with_attr("height", fmt_num(height))
        .with_attr("x", fmt_num(x))
        .with_attr("y", fmt_num(y))
}

/// A rectangle covering the board bounds
pub fn board_rect(bounds: &BoardBounds) -> Element {
    with_bounds(Element::new("rect"), bounds)
}
