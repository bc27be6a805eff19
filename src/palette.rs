//! Color roles and palette tables
//!
//! A palette maps each color role to a color and opacity. Switching palettes
//! changes the look of the preview without touching the layer stack.

use crate::error::{PreviewError, Result};
use std::fmt;
use std::str::FromStr;

/// The part of the board a layer is painted as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRole {
    Copper,
    CopperInner,
    SolderMask,
    Paste,
    Silk,
    Edge,
    BackGround,
}

impl ColorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorRole::Copper => "Copper",
            ColorRole::CopperInner => "CopperInner",
            ColorRole::SolderMask => "SolderMask",
            ColorRole::Paste => "Paste",
            ColorRole::Silk => "Silk",
            ColorRole::Edge => "Edge",
            ColorRole::BackGround => "BackGround",
        }
    }
}

/// An sRGB color parsed from `#rgb` or `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(0xFF, 0xFF, 0xFF);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a hex color, with or without the leading `#`
    pub fn from_hex(value: &str) -> Result<Self> {
        let invalid = || PreviewError::InvalidColor {
            value: value.to_string(),
        };
        let hex = value.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid().into());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());

        match hex.len() {
            3 => {
                // #abc expands to #aabbcc
                let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 0x11);
                Ok(Color::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Color::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(invalid().into()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Color and opacity assigned to a role
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swatch {
    pub color: Color,
    pub opacity: f64,
}

/// Table entry: role, hex color, opacity
type Entry = (ColorRole, &'static str, f64);

/// The built-in palette tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaletteKind {
    #[default]
    GreenStandard,
    OshPark,
    /// Greyscale values for texture and bump mapping
    BumpMap,
}

impl PaletteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaletteKind::GreenStandard => "green-standard",
            PaletteKind::OshPark => "osh-park",
            PaletteKind::BumpMap => "bump-map",
        }
    }
}

impl FromStr for PaletteKind {
    type Err = PreviewError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "green-standard" | "green" => Ok(PaletteKind::GreenStandard),
            "osh-park" | "oshpark" => Ok(PaletteKind::OshPark),
            "bump-map" | "bumpmap" => Ok(PaletteKind::BumpMap),
            other => Err(PreviewError::UnknownPalette {
                name: other.to_string(),
            }),
        }
    }
}

const GREEN_STANDARD: &[Entry] = &[
    (ColorRole::Copper, "#E8D959", 0.85),
    (ColorRole::CopperInner, "#402400", 0.80),
    (ColorRole::SolderMask, "#1D5D17", 0.80),
    (ColorRole::Paste, "#9E9E9E", 0.95),
    (ColorRole::Silk, "#EAEBE5", 1.00),
    (ColorRole::Edge, "#000000", 0.20),
    (ColorRole::BackGround, "#998060", 1.00),
];

const OSH_PARK: &[Entry] = &[
    (ColorRole::Copper, "#E8D959", 0.85),
    (ColorRole::SolderMask, "#3A0E97", 0.83),
    (ColorRole::Paste, "#9E9E9E", 0.05),
    (ColorRole::Silk, "#D8DAE7", 1.00),
    (ColorRole::Edge, "#000000", 0.20),
    (ColorRole::BackGround, "#3A0E97", 1.00),
];

const BUMP_MAP: &[Entry] = &[
    (ColorRole::Copper, "#666666", 0.85),
    (ColorRole::SolderMask, "#777777", 0.80),
    (ColorRole::Paste, "#FFFFFF", 0.95),
    (ColorRole::Silk, "#BBBBBB", 1.00),
    (ColorRole::Edge, "#EEEEEE", 0.20),
    (ColorRole::BackGround, "#555555", 1.00),
];

/// The active color role table for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    kind: PaletteKind,
}

impl Palette {
    pub fn new(kind: PaletteKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> PaletteKind {
        self.kind
    }

    fn table(&self) -> &'static [Entry] {
        match self.kind {
            PaletteKind::GreenStandard => GREEN_STANDARD,
            PaletteKind::OshPark => OSH_PARK,
            PaletteKind::BumpMap => BUMP_MAP,
        }
    }

    /// Resolve a role, falling back to the green standard entry for roles
    /// the active table does not define
    pub fn swatch(&self, role: ColorRole) -> Result<Swatch> {
        let (hex, opacity) = lookup(self.table(), role)
            .or_else(|| lookup(GREEN_STANDARD, role))
            .unwrap_or(("#000000", 1.0));
        Ok(Swatch {
            color: Color::from_hex(hex)?,
            opacity,
        })
    }

    pub fn color(&self, role: ColorRole) -> Result<Color> {
        Ok(self.swatch(role)?.color)
    }

    pub fn background(&self) -> Result<Color> {
        self.color(ColorRole::BackGround)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(PaletteKind::default())
    }
}

fn lookup(table: &[Entry], role: ColorRole) -> Option<(&'static str, f64)> {
    table
        .iter()
        .find(|(candidate, _, _)| *candidate == role)
        .map(|(_, hex, opacity)| (*hex, *opacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parsing() {
        assert_eq!(Color::from_hex("#E8D959").unwrap(), Color::rgb(0xE8, 0xD9, 0x59));
        assert_eq!(Color::from_hex("eaebe5").unwrap(), Color::rgb(0xEA, 0xEB, 0xE5));
        assert_eq!(Color::from_hex("#666").unwrap(), Color::rgb(0x66, 0x66, 0x66));
        assert_eq!(Color::from_hex("#fff").unwrap(), Color::WHITE);
    }

    #[test]
    fn test_invalid_hex_is_rejected() {
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#GGGGGG").is_err());
        assert!(Color::from_hex("").is_err());
        assert!(Color::from_hex("#ééé").is_err());
        assert!(Color::from_hex("#+F+F+F").is_err());
        assert!(Color::from_hex("+1+2+3").is_err());
        assert!(Color::from_hex("##123456").is_err());
    }

    #[test]
    fn test_color_display_is_uppercase_hex() {
        assert_eq!(Color::rgb(0x1D, 0x5D, 0x17).to_string(), "#1D5D17");
        assert_eq!(Color::from_hex("#abc").unwrap().to_string(), "#AABBCC");
    }

    #[test]
    fn test_green_standard_entries() {
        let palette = Palette::default();
        let copper = palette.swatch(ColorRole::Copper).unwrap();

        assert_eq!(copper.color.to_string(), "#E8D959");
        assert_eq!(copper.opacity, 0.85);
        assert_eq!(palette.background().unwrap().to_string(), "#998060");
    }

    #[test]
    fn test_missing_role_falls_back_to_green_standard() {
        let palette = Palette::new(PaletteKind::OshPark);

        assert_eq!(palette.color(ColorRole::CopperInner).unwrap().to_string(), "#402400");
        assert_eq!(palette.color(ColorRole::SolderMask).unwrap().to_string(), "#3A0E97");
    }

    #[test]
    fn test_palette_kind_from_str() {
        assert_eq!("osh-park".parse::<PaletteKind>().unwrap(), PaletteKind::OshPark);
        assert_eq!("BUMP-MAP".parse::<PaletteKind>().unwrap(), PaletteKind::BumpMap);
        assert!(matches!(
            "purple".parse::<PaletteKind>(),
            Err(PreviewError::UnknownPalette { .. })
        ));
    }

    #[test]
    fn test_every_table_entry_parses() {
        let roles = [
            ColorRole::Copper,
            ColorRole::CopperInner,
            ColorRole::SolderMask,
            ColorRole::Paste,
            ColorRole::Silk,
            ColorRole::Edge,
            ColorRole::BackGround,
        ];
        for kind in [PaletteKind::GreenStandard, PaletteKind::OshPark, PaletteKind::BumpMap] {
            let palette = Palette::new(kind);
            for role in roles {
                assert!(palette.swatch(role).is_ok(), "{} {}", kind.as_str(), role.as_str());
            }
        }
    }
}
