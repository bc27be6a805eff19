use super::node::{Element, Node};
use super::{board_rect, with_bounds};
use crate::board::BoardBounds;
use crate::compositor::Mirror;
use crate::error::{PreviewError, Result, ResultExt};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Identifier that is never rewritten on load
pub const RESERVED_ID: &str = "origin";

/// Identifier of the board-shaped mask in every canvas
pub const BOARD_MASK_ID: &str = "boardMask";

const PAGE_WIDTH: &str = "29.7002cm";
const PAGE_HEIGHT: &str = "21.0007cm";
const PAGE_VIEWBOX: &str = "0 0 116930 82680";

const EXTRACTED_GROUP_STYLE: &str =
    "fill:#000000; fill-opacity:1.0; stroke:#000000; stroke-opacity:1.0;";
const WHITE_FILL_STYLE: &str = "fill:#FFFFFF; fill-opacity:1.0;";

lazy_static! {
    /// `#` followed by the longest run that can belong to an identifier
    static ref ID_REFERENCE: Regex = Regex::new(r##"#([^\s"'()#;,<>&]+)"##).unwrap();
}

/// Hands out identifier prefixes that are unique for the allocator's lifetime
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_prefix(&mut self) -> String {
        self.counter += 1;
        format!("pref_{}_", self.counter)
    }
}

/// An SVG drawing: either the output canvas of a pass or one loaded layer plot
#[derive(Debug, Clone)]
pub struct VectorDocument {
    root: Element,
}

impl VectorDocument {
    /// Load a layer plot, rewriting its identifiers to be unique
    pub fn load(path: &Path, ids: &mut IdAllocator) -> Result<Self> {
        let unreadable = |reason: String| PreviewError::LayerPlotUnreadable {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let document = Self::parse_uniquified(&content, ids)
            .map_err(|e| unreadable(format!("{:#}", e)))?;

        debug!("Loaded layer plot {}", path.display());
        Ok(document)
    }

    /// Parse SVG text, prefixing every identifier and every `#id` reference
    /// with a fresh prefix from `ids`
    pub fn parse_uniquified(content: &str, ids: &mut IdAllocator) -> Result<Self> {
        let originals = collect_ids(content)?;
        let prefix = ids.next_prefix();

        let rewritten = ID_REFERENCE.replace_all(content, |caps: &Captures| {
            if originals.contains(&caps[1]) {
                format!("#{}{}", prefix, &caps[1])
            } else {
                caps[0].to_string()
            }
        });

        let mut root = Element::parse(&rewritten)?;
        root.visit_mut(&mut |element: &mut Element| {
            if let Some(id) = element.attr("id").map(str::to_string) {
                if originals.contains(&id) {
                    element.set_attr("id", format!("{}{}", prefix, id));
                }
            }
        });

        Ok(Self { root })
    }

    /// An empty canvas holding the board mask in its defs
    pub fn blank(bounds: &BoardBounds, mirror: Mirror) -> Self {
        let mut root = Element::new("svg")
            .with_attr("width", PAGE_WIDTH)
            .with_attr("height", PAGE_HEIGHT)
            .with_attr("viewBox", PAGE_VIEWBOX);
        root.push(Element::new("title").with_text("Picture generated by pcb-preview"));
        root.push(Element::new("desc").with_text("Picture generated by pcb-preview"));

        let mut mask = with_bounds(
            Element::new("mask").with_attr("id", BOARD_MASK_ID),
            bounds,
        );
        mirror.apply(&mut mask);
        mask.push(board_rect(bounds).with_attr("style", WHITE_FILL_STYLE));

        let mut defs = Element::new("defs");
        defs.push(mask);
        root.push(defs);

        Self { root }
    }

    /// Consume the document, wrapping its top-level groups in one group
    pub fn extract_as_group(self, bounds: &BoardBounds) -> Element {
        let mut wrapper =
            with_bounds(Element::new("g"), bounds).with_attr("style", EXTRACTED_GROUP_STYLE);
        wrapper.children = self
            .root
            .children
            .into_iter()
            .filter(|child| matches!(child, Node::Element(element) if element.name == "g"))
            .collect();
        wrapper
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// The `defs` element, created if missing
    pub fn defs_mut(&mut self) -> &mut Element {
        if self.root.find("defs").is_none() {
            self.root.push(Element::new("defs"));
        }
        self.root
            .find_mut("defs")
            .expect("defs element was just ensured")
    }

    /// Append a drawable element to the root
    pub fn append(&mut self, element: Element) {
        self.root.push(element);
    }

    pub fn to_svg_string(&self) -> String {
        self.root.to_svg_string()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_svg_string()).with_path_context("write SVG", path)?;
        debug!("Written SVG document: {}", path.display());
        Ok(())
    }
}

fn collect_ids(content: &str) -> Result<HashSet<String>> {
    let root = Element::parse(content)?;
    Ok(root
        .descendants()
        .into_iter()
        .filter_map(|element| element.attr("id"))
        .filter(|id| *id != RESERVED_ID)
        .map(str::to_string)
        .collect())
}
