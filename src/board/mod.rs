//! Board model consumed by the renderer
//!
//! The renderer never computes board geometry itself. It asks a
//! [`BoardProvider`] for per-layer vector plots, pad and track drill data,
//! and the board bounds.

use crate::error::Result;
use std::path::{Path, PathBuf};

pub mod kicad;
mod sexpr;

pub use kicad::KicadBoard;

/// Board length unit: nanometres
pub type Nm = i64;

/// Nanometres per decimil (1/10000 inch), the plot coordinate unit
pub const NM_PER_DECIMIL: f64 = 2540.0;

/// Convert board units to decimils
pub fn to_decimils(value: Nm) -> f64 {
    value as f64 / NM_PER_DECIMIL
}

/// Axis-aligned bounding box of the physical board in nanometres
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardBounds {
    pub x: Nm,
    pub y: Nm,
    pub width: Nm,
    pub height: Nm,
}

impl BoardBounds {
    pub fn new(x: Nm, y: Nm, width: Nm, height: Nm) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box enclosing all points, or `None` for an empty set
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (Nm, Nm)>,
    {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for (x, y) in iter {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// `(x, y, width, height)` in decimils, as stamped on SVG elements
    pub fn decimils(&self) -> (f64, f64, f64, f64) {
        (
            to_decimils(self.x),
            to_decimils(self.y),
            to_decimils(self.width),
            to_decimils(self.height),
        )
    }
}

/// A component pad
#[derive(Debug, Clone, PartialEq)]
pub struct Pad {
    pub position: (Nm, Nm),
    /// Drill hole size `(x, y)`; `(0, 0)` for surface pads
    pub drill: (Nm, Nm),
    /// Orientation in tenths of a degree
    pub orientation: f64,
}

impl Pad {
    pub fn has_drill(&self) -> bool {
        self.drill.0 > 0 || self.drill.1 > 0
    }
}

/// A routed track item. Vias carry a drill value, plain traces do not.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub position: (Nm, Nm),
    pub drill: Option<Nm>,
}

/// Board layers the renderer knows how to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerId {
    FrontCopper,
    BackCopper,
    InnerCopper(u8),
    FrontMask,
    BackMask,
    FrontPaste,
    BackPaste,
    FrontSilk,
    BackSilk,
    EdgeCuts,
}

impl LayerId {
    /// Canonical KiCad layer name
    pub fn kicad_name(&self) -> String {
        match self {
            LayerId::FrontCopper => "F.Cu".to_string(),
            LayerId::BackCopper => "B.Cu".to_string(),
            LayerId::InnerCopper(n) => format!("In{}.Cu", n),
            LayerId::FrontMask => "F.Mask".to_string(),
            LayerId::BackMask => "B.Mask".to_string(),
            LayerId::FrontPaste => "F.Paste".to_string(),
            LayerId::BackPaste => "B.Paste".to_string(),
            LayerId::FrontSilk => "F.SilkS".to_string(),
            LayerId::BackSilk => "B.SilkS".to_string(),
            LayerId::EdgeCuts => "Edge.Cuts".to_string(),
        }
    }

    /// Alternate names used by newer KiCad versions
    pub fn matches_kicad_name(&self, name: &str) -> bool {
        if name == self.kicad_name() {
            return true;
        }
        matches!(
            (self, name),
            (LayerId::FrontSilk, "F.Silkscreen")
                | (LayerId::BackSilk, "B.Silkscreen")
        )
    }
}

/// Source of board geometry and per-layer plots
pub trait BoardProvider {
    /// Board outline bounds
    fn bounds(&self) -> BoardBounds;

    /// All component pads, in board order
    fn pads(&self) -> &[Pad];

    /// All routed tracks and vias, in board order
    fn tracks(&self) -> &[Track];

    /// Whether the board carries this layer at all
    fn has_layer(&self, _layer: LayerId) -> bool {
        true
    }

    /// Plot one layer as SVG into `out_dir` and return the written file
    fn plot_layer(&mut self, layer: LayerId, out_dir: &Path) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimil_conversion() {
        assert_eq!(to_decimils(2540), 1.0);
        assert_eq!(to_decimils(25_400_000), 10_000.0);
    }

    #[test]
    fn test_enclosing_bounds() {
        let bounds =
            BoardBounds::enclosing(vec![(10, 20), (110, 5), (60, 220)]).expect("bounds");

        assert_eq!(bounds, BoardBounds::new(10, 5, 100, 215));
        assert!(BoardBounds::enclosing(Vec::new()).is_none());
    }

    #[test]
    fn test_layer_names() {
        assert_eq!(LayerId::InnerCopper(2).kicad_name(), "In2.Cu");
        assert!(LayerId::FrontSilk.matches_kicad_name("F.SilkS"));
        assert!(LayerId::FrontSilk.matches_kicad_name("F.Silkscreen"));
        assert!(!LayerId::BackSilk.matches_kicad_name("F.Silkscreen"));
    }

    #[test]
    fn test_surface_pad_has_no_drill() {
        let pad = Pad {
            position: (0, 0),
            drill: (0, 0),
            orientation: 0.0,
        };
        assert!(!pad.has_drill());
    }
}
