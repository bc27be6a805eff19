//! Layer compositing onto a single canvas
//!
//! Each render pass owns one [`LayerCompositor`]. Layers are appended in the
//! order they are added, so later layers draw over earlier ones, and the
//! drill overlay is added last.

use crate::board::BoardBounds;
use crate::error::Result;
use crate::palette::Color;
use crate::svg::{
    board_rect, recolor, with_bounds, ColorTransform, Element, VectorDocument, BOARD_MASK_ID,
};
use std::path::Path;
use tracing::debug;

const MIRROR_TRANSFORM: &str = "scale(-1,1)";
const INVERTED_LAYER_OPACITY: &str = "0.75";

/// Whether a pass is rendered as seen from the back of the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mirror {
    #[default]
    Unmirrored,
    Horizontal,
}

impl Mirror {
    pub fn is_mirrored(&self) -> bool {
        matches!(self, Mirror::Horizontal)
    }

    pub fn transform(&self) -> Option<&'static str> {
        match self {
            Mirror::Unmirrored => None,
            Mirror::Horizontal => Some(MIRROR_TRANSFORM),
        }
    }

    /// Set the flip transform on `element` when mirrored
    pub fn apply(&self, element: &mut Element) {
        if let Some(transform) = self.transform() {
            element.set_attr("transform", transform);
        }
    }
}

/// How a layer's plotted geometry maps to color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Paint the geometry
    Opaque,
    /// Paint everywhere the geometry is absent
    MaskInvert,
}

/// Builds the merged canvas of one render pass
#[derive(Debug)]
pub struct LayerCompositor {
    canvas: VectorDocument,
    bounds: BoardBounds,
    mirror: Mirror,
    layers: usize,
    inverted_masks: usize,
}

impl LayerCompositor {
    pub fn new(bounds: BoardBounds, mirror: Mirror) -> Self {
        Self {
            canvas: VectorDocument::blank(&bounds, mirror),
            bounds,
            mirror,
            layers: 0,
            inverted_masks: 0,
        }
    }

    pub fn mirror(&self) -> Mirror {
        self.mirror
    }

    /// Number of color layers composited so far
    pub fn layer_count(&self) -> usize {
        self.layers
    }

    /// Composite `layer` with the given blend mode
    pub fn add_layer(&mut self, layer: VectorDocument, blend: BlendMode, color: Color) {
        match blend {
            BlendMode::Opaque => self.add_opaque_layer(layer, color),
            BlendMode::MaskInvert => self.add_inverted_layer(layer, color),
        }
    }

    /// Paint the layer's geometry in one flat color
    pub fn add_opaque_layer(&mut self, layer: VectorDocument, color: Color) {
        let mut wrapper =
            Element::new("g").with_attr("style", format!("fill:{}; fill-opacity:1.0;", color));
        wrapper.push(layer.extract_as_group(&self.bounds));

        recolor(&mut wrapper, &ColorTransform::flat(color));
        self.mirror.apply(&mut wrapper);

        debug!("Added opaque layer in {}", color);
        self.canvas.append(wrapper);
        self.layers += 1;
    }

    /// Paint the board everywhere the layer's geometry is absent
    pub fn add_inverted_layer(&mut self, layer: VectorDocument, color: Color) {
        self.inverted_masks += 1;
        let mask_id = format!("invertMask{}", self.inverted_masks);

        let mut mask = with_bounds(Element::new("mask").with_attr("id", &mask_id), &self.bounds);
        self.mirror.apply(&mut mask);
        // White backing shows through, the black plotted geometry cuts out
        mask.push(board_rect(&self.bounds).with_attr("style", "fill:#FFFFFF; fill-opacity:1.0;"));
        mask.push(layer.extract_as_group(&self.bounds));
        self.canvas.defs_mut().push(mask);

        let mut wrapper = Element::new("g")
            .with_attr(
                "style",
                format!("fill:{}; fill-opacity:{};", color, INVERTED_LAYER_OPACITY),
            )
            .with_attr("mask", format!("url(#{})", mask_id));
        wrapper.push(board_rect(&self.bounds));
        self.mirror.apply(&mut wrapper);

        debug!("Added inverted layer in {} through {}", color, mask_id);
        self.canvas.append(wrapper);
        self.layers += 1;
    }

    /// Attach the drill overlay, clipped to the board
    pub fn add_hole_overlay(&mut self, mut holes: Element) {
        holes.set_attr("mask", format!("url(#{})", BOARD_MASK_ID));
        self.mirror.apply(&mut holes);
        self.canvas.append(holes);
    }

    pub fn canvas(&self) -> &VectorDocument {
        &self.canvas
    }

    pub fn into_canvas(self) -> VectorDocument {
        self.canvas
    }

    /// Write the merged canvas to `path`
    pub fn serialize(&self, path: &Path) -> Result<()> {
        self.canvas.write(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svg::IdAllocator;

    const LAYER: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
<g id="plot" style="fill:#000000; fill-opacity:1.0; stroke:#000000; stroke-width:10;">
  <path d="M 0 0 L 100 100"/>
</g>
</svg>"#;

    fn bounds() -> BoardBounds {
        BoardBounds::new(0, 0, 2_540_000, 2_032_000)
    }

    fn layer(ids: &mut IdAllocator) -> VectorDocument {
        VectorDocument::parse_uniquified(LAYER, ids).expect("layer")
    }

    fn drawn_groups(compositor: &LayerCompositor) -> Vec<&Element> {
        compositor
            .canvas()
            .root()
            .elements()
            .filter(|e| e.name == "g")
            .collect()
    }

    #[test]
    fn test_opaque_layer_is_flat_colored() {
        let mut ids = IdAllocator::new();
        let mut compositor = LayerCompositor::new(bounds(), Mirror::Unmirrored);
        let color = Color::rgb(0xE8, 0xD9, 0x59);
        compositor.add_opaque_layer(layer(&mut ids), color);

        let groups = drawn_groups(&compositor);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].attr("style"), Some("fill:#E8D959; fill-opacity:1.0;"));
        assert!(groups[0].attr("transform").is_none());

        for element in groups[0].descendants() {
            let style = element.attr("style").expect("every node is styled");
            assert!(!style.contains("#000000"), "unrecolored style: {}", style);
        }
    }

    #[test]
    fn test_inverted_layer_registers_mask() {
        let mut ids = IdAllocator::new();
        let mut compositor = LayerCompositor::new(bounds(), Mirror::Unmirrored);
        compositor.add_inverted_layer(layer(&mut ids), Color::rgb(0x1D, 0x5D, 0x17));
        compositor.add_inverted_layer(layer(&mut ids), Color::rgb(0x1D, 0x5D, 0x17));

        let defs = compositor.canvas().root().find("defs").expect("defs");
        let mask_ids: Vec<_> = defs.elements().filter_map(|m| m.attr("id")).collect();
        assert_eq!(mask_ids, [BOARD_MASK_ID, "invertMask1", "invertMask2"]);

        let mask = defs.elements().nth(1).expect("mask");
        let contents: Vec<_> = mask.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(contents, ["rect", "g"]);

        let groups = drawn_groups(&compositor);
        assert_eq!(groups[0].attr("mask"), Some("url(#invertMask1)"));
        assert_eq!(groups[0].attr("style"), Some("fill:#1D5D17; fill-opacity:0.75;"));
        assert_eq!(groups[0].find("rect").and_then(|r| r.attr("width")), Some("1000"));
        assert_eq!(groups[1].attr("mask"), Some("url(#invertMask2)"));
    }

    #[test]
    fn test_hole_overlay_references_board_mask() {
        let mut compositor = LayerCompositor::new(bounds(), Mirror::Unmirrored);
        compositor.add_hole_overlay(Element::new("g").with_attr("id", "hole-mask"));

        let overlay = drawn_groups(&compositor).pop().expect("overlay");
        assert_eq!(overlay.attr("mask"), Some("url(#boardMask)"));
        assert!(overlay.attr("transform").is_none());
    }

    #[test]
    fn test_mirrored_pass_flips_every_group() {
        let mut ids = IdAllocator::new();
        let mut compositor = LayerCompositor::new(bounds(), Mirror::Horizontal);
        compositor.add_layer(layer(&mut ids), BlendMode::Opaque, Color::WHITE);
        compositor.add_layer(layer(&mut ids), BlendMode::MaskInvert, Color::BLACK);
        compositor.add_hole_overlay(Element::new("g"));

        let groups = drawn_groups(&compositor);
        assert_eq!(groups.len(), 3);
        assert_eq!(compositor.layer_count(), 2);
        assert!(groups
            .iter()
            .all(|g| g.attr("transform") == Some(MIRROR_TRANSFORM)));

        let defs = compositor.canvas().root().find("defs").expect("defs");
        assert!(defs
            .elements()
            .all(|mask| mask.attr("transform") == Some(MIRROR_TRANSFORM)));
    }

    #[test]
    fn test_layers_keep_insertion_order() {
        let mut ids = IdAllocator::new();
        let mut compositor = LayerCompositor::new(bounds(), Mirror::Unmirrored);
        let colors = [Color::rgb(1, 0, 0), Color::rgb(2, 0, 0), Color::rgb(3, 0, 0)];
        for color in colors {
            compositor.add_opaque_layer(layer(&mut ids), color);
        }

        let styles: Vec<_> = drawn_groups(&compositor)
            .iter()
            .filter_map(|g| g.attr("style"))
            .map(str::to_string)
            .collect();
        assert_eq!(
            styles,
            [
                "fill:#010000; fill-opacity:1.0;",
                "fill:#020000; fill-opacity:1.0;",
                "fill:#030000; fill-opacity:1.0;"
            ]
        );
    }
}
