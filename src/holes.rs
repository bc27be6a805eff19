//! Drill and via overlay
//!
//! Drill holes are not part of any plotted layer. They are drawn as thick
//! round-capped strokes, one per pad drill or via, in a single group that is
//! composited on top of every color layer.

use crate::board::{to_decimils, BoardProvider, Pad, Track};
use crate::svg::{fmt_num, Element};
use tracing::debug;

pub const HOLE_MASK_ID: &str = "hole-mask";
const HOLE_OPACITY_STYLE: &str = "opacity:0.8;";

/// Build the overlay group for every drilled pad and via of the board
pub fn build_hole_overlay<B: BoardProvider + ?Sized>(board: &B) -> Element {
    let mut container = Element::new("g").with_attr("style", HOLE_OPACITY_STYLE);

    let mut pad_holes = 0;
    for pad in board.pads().iter().filter(|pad| pad.has_drill()) {
        container.push(pad_hole(pad));
        pad_holes += 1;
    }

    let mut vias = 0;
    for track in board.tracks() {
        // Plain traces carry no drill
        if let Some(hole) = via_hole(track) {
            container.push(hole);
            vias += 1;
        }
    }

    debug!("Built hole overlay: {} pad drills, {} vias", pad_holes, vias);

    let mut mask = Element::new("g").with_attr("id", HOLE_MASK_ID);
    mask.push(container);
    mask
}

/// A pad drill: a stroke as wide as the narrow side of the hole, as long as
/// the difference between its sides, along the long side
fn pad_hole(pad: &Pad) -> Element {
    let (dx, dy) = pad.drill;
    let width = to_decimils(dx.min(dy));
    let length = to_decimils((dx - dy).abs());
    let half = length / 2.0;

    let points = if dx >= dy {
        format!("{} 0 {} 0", fmt_num(half), fmt_num(-half))
    } else {
        format!("0 {} 0 {}", fmt_num(-half), fmt_num(half))
    };

    let (x, y) = pad.position;
    let transform = format!(
        "translate({} {}) rotate({})",
        fmt_num(to_decimils(x)),
        fmt_num(to_decimils(y)),
        fmt_num(-pad.orientation / 10.0)
    );

    hole_stroke(width, points, transform)
}

fn via_hole(track: &Track) -> Option<Element> {
    let drill = track.drill?;
    let (x, y) = track.position;
    let transform = format!(
        "translate({} {})",
        fmt_num(to_decimils(x)),
        fmt_num(to_decimils(y))
    );
    Some(hole_stroke(to_decimils(drill), "0 0 0 0".to_string(), transform))
}

fn hole_stroke(width: f64, points: String, transform: String) -> Element {
    Element::new("polyline")
        .with_attr("stroke-linecap", "round")
        .with_attr("stroke", "black")
        .with_attr("stroke-width", fmt_num(width))
        .with_attr("points", points)
        .with_attr("transform", transform)
}
