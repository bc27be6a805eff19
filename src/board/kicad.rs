//! KiCad board provider
//!
//! Board data is read straight from the `.kicad_pcb` S-expression file.
//! Layer plots are produced by `kicad-cli pcb export svg` and rescaled into
//! decimils when the installed KiCad writes them in millimetres.

use super::sexpr::{self, Sexpr};
use super::{BoardBounds, BoardProvider, LayerId, Nm, Pad, Track};
use crate::error::{PreviewError, Result, ResultExt};
use crate::svg::{fmt_num, Element, Node};
use anyhow::anyhow;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

const KICAD_CLI: &str = "kicad-cli";
const EDGE_CUTS: &str = "Edge.Cuts";
const NM_PER_MM: f64 = 1_000_000.0;
const DECIMILS_PER_INCH: f64 = 10_000.0;
/// Segments used to trace a legacy center/angle arc
const ARC_SAMPLES: usize = 16;

/// A `.kicad_pcb` board with `kicad-cli` as its plotter
#[derive(Debug, Clone)]
pub struct KicadBoard {
    path: PathBuf,
    cli: PathBuf,
    layer_names: Vec<String>,
    bounds: BoardBounds,
    pads: Vec<Pad>,
    tracks: Vec<Track>,
}

impl KicadBoard {
    /// Open a board, failing early when `kicad-cli` is not usable
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_cli(path, KICAD_CLI)
    }

    pub fn open_with_cli(path: &Path, cli: impl Into<PathBuf>) -> Result<Self> {
        let cli = cli.into();
        let version = query_cli_version(&cli)?;
        info!("Using {} {}", cli.display(), version);

        let content = fs::read_to_string(path).with_path_context("read board", path)?;
        let mut board = Self::parse(path, &content)?;
        board.cli = cli;
        Ok(board)
    }

    /// Build the board model from file content without touching `kicad-cli`
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let tree = sexpr::parse(content)?;
        if tree.head() != Some("kicad_pcb") {
            return Err(PreviewError::BoardParse {
                reason: format!("expected a kicad_pcb document, found {:?}", tree.head()),
            }
            .into());
        }

        let layer_names = read_layer_names(&tree);
        let pads = read_pads(&tree);
        let tracks = read_tracks(&tree);
        let bounds =
            BoardBounds::enclosing(outline_points(&tree)).ok_or(PreviewError::NoBoardOutline)?;

        debug!(
            "Parsed {}: {} layers, {} pads, {} tracks, bounds {:?}",
            path.display(),
            layer_names.len(),
            pads.len(),
            tracks.len(),
            bounds
        );

        Ok(Self {
            path: path.to_path_buf(),
            cli: PathBuf::from(KICAD_CLI),
            layer_names,
            bounds,
            pads,
            tracks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layer names as listed in the board's layer table
    pub fn layer_names(&self) -> &[String] {
        &self.layer_names
    }

    /// Name the board itself uses for `layer`
    fn layer_name(&self, layer: LayerId) -> String {
        self.layer_names
            .iter()
            .find(|name| layer.matches_kicad_name(name))
            .cloned()
            .unwrap_or_else(|| layer.kicad_name())
    }

    fn plot_path(&self, layer_name: &str, out_dir: &Path) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "board".to_string());
        out_dir.join(format!("{}-{}.svg", stem, layer_name.replace('.', "_")))
    }
}

impl BoardProvider for KicadBoard {
    fn bounds(&self) -> BoardBounds {
        self.bounds
    }

    fn pads(&self) -> &[Pad] {
        &self.pads
    }

    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn has_layer(&self, layer: LayerId) -> bool {
        self.layer_names
            .iter()
            .any(|name| layer.matches_kicad_name(name))
    }

    fn plot_layer(&mut self, layer: LayerId, out_dir: &Path) -> Result<PathBuf> {
        let name = self.layer_name(layer);
        let output = self.plot_path(&name, out_dir);
        debug!("Plotting {} to {}", name, output.display());

        let result = Command::new(&self.cli)
            .args(["pcb", "export", "svg", "--output"])
            .arg(&output)
            .args(["--layers", name.as_str()])
            .args(["--exclude-drawing-sheet", "--black-and-white"])
            .args(["--page-size-mode", "0", "--drill-shape-opt", "2"])
            .arg(&self.path)
            .output()
            .map_err(|e| PreviewError::ProviderUnavailable {
                tool: self.cli.display().to_string(),
                reason: e.to_string(),
            })?;

        if !result.status.success() {
            return Err(anyhow!(
                "{} failed to plot {} ({}): {}",
                self.cli.display(),
                name,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }

        normalize_plot_file(&output)?;
        Ok(output)
    }
}

/// Run `kicad-cli version` and return the reported version
fn query_cli_version(cli: &Path) -> Result<String> {
    let unavailable = |reason: String| PreviewError::ProviderUnavailable {
        tool: cli.display().to_string(),
        reason,
    };

    let output = Command::new(cli)
        .arg("version")
        .output()
        .map_err(|e| unavailable(e.to_string()))?;
    if !output.status.success() {
        return Err(unavailable(format!("version query exited with {}", output.status)).into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn mm_to_nm(mm: f64) -> Nm {
    (mm * NM_PER_MM).round() as Nm
}

fn xy(expr: &Sexpr) -> Option<(f64, f64)> {
    Some((expr.arg_f64(0)?, expr.arg_f64(1)?))
}

fn child_xy(expr: &Sexpr, name: &str) -> Option<(f64, f64)> {
    expr.child(name).and_then(xy)
}

fn to_nm((x, y): (f64, f64)) -> (Nm, Nm) {
    (mm_to_nm(x), mm_to_nm(y))
}

/// KiCad's y-down rotation of `(x, y)` by `degrees`
fn rotate((x, y): (f64, f64), degrees: f64) -> (f64, f64) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    (x * cos + y * sin, y * cos - x * sin)
}

fn read_layer_names(tree: &Sexpr) -> Vec<String> {
    tree.child("layers")
        .map(|layers| {
            layers
                .items()
                .iter()
                .skip(1)
                .filter_map(|entry| entry.arg(0))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn read_pads(tree: &Sexpr) -> Vec<Pad> {
    let footprints = tree
        .items()
        .iter()
        .filter(|item| matches!(item.head(), Some("footprint") | Some("module")));

    let mut pads = Vec::new();
    for footprint in footprints {
        let at = footprint.child("at");
        let origin = at.and_then(xy).unwrap_or((0.0, 0.0));
        let angle = at.and_then(|at| at.arg_f64(2)).unwrap_or(0.0);

        for pad in footprint.children("pad") {
            let pad_at = pad.child("at");
            let local = pad_at.and_then(xy).unwrap_or((0.0, 0.0));
            let (dx, dy) = rotate(local, angle);
            // Pad angles in the file already include the footprint rotation
            let orientation = pad_at.and_then(|at| at.arg_f64(2)).unwrap_or(0.0);

            pads.push(Pad {
                position: to_nm((origin.0 + dx, origin.1 + dy)),
                drill: pad.child("drill").map(read_drill).unwrap_or((0, 0)),
                orientation: orientation * 10.0,
            });
        }
    }
    pads
}

/// `(drill d)` or `(drill oval w h)`
fn read_drill(drill: &Sexpr) -> (Nm, Nm) {
    let mut sizes = drill
        .atom_args()
        .filter(|arg| *arg != "oval")
        .filter_map(|arg| arg.parse::<f64>().ok());
    let width = sizes.next().unwrap_or(0.0);
    let height = sizes.next().unwrap_or(width);
    (mm_to_nm(width), mm_to_nm(height))
}

fn read_tracks(tree: &Sexpr) -> Vec<Track> {
    tree.items()
        .iter()
        .filter_map(|item| match item.head()? {
            "segment" | "arc" => Some(Track {
                position: to_nm(child_xy(item, "start")?),
                drill: None,
            }),
            "via" => Some(Track {
                position: to_nm(child_xy(item, "at")?),
                drill: item.child("drill").and_then(|d| d.arg_f64(0)).map(mm_to_nm),
            }),
            _ => None,
        })
        .collect()
}

fn on_edge_cuts(item: &Sexpr) -> bool {
    item.child("layer").and_then(|layer| layer.arg(0)) == Some(EDGE_CUTS)
}

/// Every point needed to bound the Edge.Cuts drawings
fn outline_points(tree: &Sexpr) -> Vec<(Nm, Nm)> {
    let mut points = Vec::new();

    for item in tree.items().iter().filter(|item| on_edge_cuts(item)) {
        match item.head() {
            Some("gr_line") | Some("gr_rect") => {
                points.extend(child_xy(item, "start"));
                points.extend(child_xy(item, "end"));
            }
            Some("gr_arc") => points.extend(arc_points(item)),
            Some("gr_circle") => {
                if let (Some((cx, cy)), Some((ex, ey))) =
                    (child_xy(item, "center"), child_xy(item, "end"))
                {
                    let r = (ex - cx).hypot(ey - cy);
                    points.push((cx - r, cy - r));
                    points.push((cx + r, cy + r));
                }
            }
            Some("gr_poly") => {
                if let Some(pts) = item.child("pts") {
                    points.extend(pts.children("xy").filter_map(xy));
                }
            }
            _ => {}
        }
    }

    points.into_iter().map(to_nm).collect()
}

fn arc_points(arc: &Sexpr) -> Vec<(f64, f64)> {
    let start = child_xy(arc, "start");
    let end = child_xy(arc, "end");

    if let Some(mid) = child_xy(arc, "mid") {
        return start.into_iter().chain(Some(mid)).chain(end).collect();
    }

    // KiCad 5: start is the center, end the first arc point
    let (Some(center), Some(first)) = (start, end) else {
        return Vec::new();
    };
    let sweep = arc.child("angle").and_then(|a| a.arg_f64(0)).unwrap_or(0.0);
    let offset = (first.0 - center.0, first.1 - center.1);

    (0..=ARC_SAMPLES)
        .map(|i| {
            let (dx, dy) = rotate(offset, -sweep * i as f64 / ARC_SAMPLES as f64);
            (center.0 + dx, center.1 + dy)
        })
        .collect()
}

/// Rewrite a plot in place so that its user units are decimils
fn normalize_plot_file(path: &Path) -> Result<()> {
    let unreadable = |reason: String| PreviewError::LayerPlotUnreadable {
        path: path.display().to_string(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    let mut root = Element::parse(&content).map_err(|e| unreadable(e.to_string()))?;

    if let Some(scale) = normalize_plot_units(&mut root) {
        debug!("Rescaled {} by {}", path.display(), scale);
        fs::write(path, root.to_svg_string()).with_path_context("write rescaled plot", path)?;
    }
    Ok(())
}

/// Scale the top-level groups so one user unit is one decimil.
/// Returns the applied factor, or `None` when the plot already uses decimils.
pub(crate) fn normalize_plot_units(root: &mut Element) -> Option<f64> {
    let width_in = root.attr("width").and_then(length_in_inches)?;
    let view_box: Vec<f64> = root
        .attr("viewBox")?
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if view_box.len() != 4 || view_box[2] <= 0.0 {
        warn!("Plot has an unusable viewBox, leaving its units alone");
        return None;
    }

    let scale = width_in * DECIMILS_PER_INCH / view_box[2];
    if (scale - 1.0).abs() < 1e-3 {
        return None;
    }

    let scaled: Vec<String> = view_box
        .iter()
        .map(|v| fmt_num((v * scale * 1e4).round() / 1e4))
        .collect();
    root.set_attr("viewBox", scaled.join(" "));

    let factor = format!("scale({})", fmt_num(scale));
    for child in root.children.iter_mut() {
        if let Node::Element(group) = child {
            if group.name != "g" {
                continue;
            }
            let transform = match group.attr("transform") {
                Some(existing) => format!("{} {}", factor, existing),
                None => factor.clone(),
            };
            group.set_attr("transform", transform);
        }
    }

    Some(scale)
}

/// `297mm`, `29.7cm`, `11.69in`; anything else is not a physical length
fn length_in_inches(value: &str) -> Option<f64> {
    let value = value.trim();
    let (number, per_inch) = if let Some(v) = value.strip_suffix("mm") {
        (v, 25.4)
    } else if let Some(v) = value.strip_suffix("cm") {
        (v, 2.54)
    } else if let Some(v) = value.strip_suffix("in") {
        (v, 1.0)
    } else {
        return None;
    };
    number.trim().parse::<f64>().ok().map(|n| n / per_inch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"(kicad_pcb (version 20221018) (generator pcbnew)
  (layers
    (0 "F.Cu" signal)
    (31 "B.Cu" signal)
    (36 "B.SilkS" user "B.Silkscreen")
    (37 "F.Silkscreen" user)
    (38 "B.Mask" user)
    (39 "F.Mask" user)
    (44 "Edge.Cuts" user)
  )
  (footprint "Connector:Pin" (layer "F.Cu")
    (at 100 50 90)
    (pad "1" thru_hole circle (at 2 0 90) (size 1.7 1.7) (drill 1) (layers "*.Cu" "*.Mask"))
    (pad "2" thru_hole oval (at 0 0 180) (size 1.7 2.4) (drill oval 1.2 0.6) (layers "*.Cu"))
    (pad "3" smd rect (at -1 0 90) (size 1 1) (layers "F.Cu" "F.Paste" "F.Mask"))
  )
  (segment (start 10 10) (end 20 10) (width 0.25) (layer "F.Cu") (net 1))
  (via (at 20 10) (size 0.8) (drill 0.4) (layers "F.Cu" "B.Cu") (net 1))
  (arc (start 20 10) (mid 21 11) (end 22 10) (width 0.25) (layer "B.Cu") (net 1))
  (gr_rect (start 0 0) (end 150 80) (stroke (width 0.1) (type default)) (layer "Edge.Cuts"))
  (gr_line (start 150 80) (end 160 90) (layer "F.SilkS"))
  (gr_circle (center 150 40) (end 155 40) (layer "Edge.Cuts"))
)"#;

    fn board() -> KicadBoard {
        KicadBoard::parse(Path::new("/work/demo/demo.kicad_pcb"), BOARD).expect("parse board")
    }

    #[test]
    fn test_layer_table_and_lookup() {
        let board = board();

        assert_eq!(board.layer_names().len(), 7);
        assert!(board.has_layer(LayerId::FrontCopper));
        assert!(board.has_layer(LayerId::FrontSilk));
        assert!(board.has_layer(LayerId::BackSilk));
        assert!(!board.has_layer(LayerId::InnerCopper(1)));
        assert!(!board.has_layer(LayerId::FrontPaste));
        assert_eq!(board.layer_name(LayerId::FrontSilk), "F.Silkscreen");
        assert_eq!(board.layer_name(LayerId::BackSilk), "B.SilkS");
    }

    #[test]
    fn test_pads_are_placed_in_board_space() {
        let pads = board().pads().to_vec();
        assert_eq!(pads.len(), 3);

        // (2, 0) rotated by 90 degrees lands at (0, -2)
        assert_eq!(pads[0].position, (100_000_000, 48_000_000));
        assert_eq!(pads[0].drill, (1_000_000, 1_000_000));
        assert_eq!(pads[0].orientation, 900.0);

        assert_eq!(pads[1].position, (100_000_000, 50_000_000));
        assert_eq!(pads[1].drill, (1_200_000, 600_000));
        assert_eq!(pads[1].orientation, 1800.0);

        assert!(!pads[2].has_drill());
    }

    #[test]
    fn test_tracks_keep_file_order() {
        let tracks = board().tracks().to_vec();

        assert_eq!(
            tracks,
            vec![
                Track {
                    position: (10_000_000, 10_000_000),
                    drill: None
                },
                Track {
                    position: (20_000_000, 10_000_000),
                    drill: Some(400_000)
                },
                Track {
                    position: (20_000_000, 10_000_000),
                    drill: None
                },
            ]
        );
    }

    #[test]
    fn test_bounds_cover_edge_cuts_only() {
        // The circle reaches x = 155; the silk line to (160, 90) is ignored
        assert_eq!(
            board().bounds(),
            BoardBounds::new(0, 0, 155_000_000, 80_000_000)
        );
    }

    #[test]
    fn test_legacy_module_and_arc_outline() {
        let content = r#"(kicad_pcb (version 20171130)
  (layers (0 F.Cu signal) (31 B.Cu signal) (44 Edge.Cuts user))
  (module Pin (layer F.Cu) (at 10 10)
    (pad 1 thru_hole circle (at 1 1) (size 2 2) (drill 0.9) (layers *.Cu)))
  (gr_arc (start 10 10) (end 20 10) (angle 90) (layer Edge.Cuts) (width 0.1))
)"#;
        let board = KicadBoard::parse(Path::new("legacy.kicad_pcb"), content).expect("parse");

        assert_eq!(board.pads()[0].position, (11_000_000, 11_000_000));
        // Quarter arc from (20, 10) around (10, 10) sweeps to (10, 20)
        assert_eq!(board.bounds(), BoardBounds::new(10_000_000, 10_000_000, 10_000_000, 10_000_000));
    }

    #[test]
    fn test_board_without_outline_is_rejected() {
        let err = KicadBoard::parse(
            Path::new("empty.kicad_pcb"),
            r#"(kicad_pcb (layers (0 "F.Cu" signal)))"#,
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PreviewError>(),
            Some(PreviewError::NoBoardOutline)
        ));
    }

    #[test]
    fn test_other_documents_are_rejected() {
        let err = KicadBoard::parse(Path::new("x.kicad_sch"), "(kicad_sch (version 1))").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PreviewError>(),
            Some(PreviewError::BoardParse { .. })
        ));
    }

    #[test]
    fn test_missing_cli_is_an_environment_error() {
        let err = KicadBoard::open_with_cli(
            Path::new("demo.kicad_pcb"),
            "pcb-preview-no-such-kicad-cli",
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PreviewError>(),
            Some(PreviewError::ProviderUnavailable { .. })
        ));
    }

    #[test]
    fn test_plot_file_name() {
        let board = board();
        assert_eq!(
            board.plot_path("F.Cu", Path::new("/tmp/plot")),
            PathBuf::from("/tmp/plot/demo-F_Cu.svg")
        );
    }

    #[test]
    fn test_millimetre_plot_is_rescaled() {
        let mut root = Element::parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="254mm" height="127mm" viewBox="0 0 254 127">
<g transform="translate(1 2)"><path d="M 0 0 L 1 1"/></g>
<g><circle r="1"/></g>
</svg>"#,
        )
        .expect("parse");

        let scale = normalize_plot_units(&mut root).expect("rescaled");
        assert!((scale - 393.7007874015748).abs() < 1e-9);

        let groups: Vec<_> = root.elements().filter(|e| e.name == "g").collect();
        assert!(groups[0]
            .attr("transform")
            .is_some_and(|t| t.starts_with("scale(") && t.ends_with(") translate(1 2)")));
        assert!(groups[1].attr("transform").is_some_and(|t| t.starts_with("scale(")));
        assert_eq!(root.attr("viewBox"), Some("0 0 100000 50000"));
    }

    #[test]
    fn test_decimil_plot_is_left_alone() {
        let mut root = Element::parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="29.7002cm" height="21.0007cm" viewBox="0 0 116930 82680"><g/></svg>"#,
        )
        .expect("parse");

        assert_eq!(normalize_plot_units(&mut root), None);
        assert!(root.find("g").and_then(|g| g.attr("transform")).is_none());
    }

    #[test]
    fn test_length_units() {
        assert_eq!(length_in_inches("25.4mm"), Some(1.0));
        assert_eq!(length_in_inches("2.54cm"), Some(1.0));
        assert_eq!(length_in_inches("3in"), Some(3.0));
        assert_eq!(length_in_inches("100"), None);
    }
}
