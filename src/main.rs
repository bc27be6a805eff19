//! pcb-preview - Render front and back preview images of a KiCad board
//!
//! Plots every visible layer through KiCad, composites them into one SVG per
//! side and rasterizes the result with Inkscape.

use pcb_preview::{config::Config, error::Result, previewer::Previewer};
use tracing::{error, info};

fn main() -> Result<()> {
    // Parse configuration and initialize logging
    let config = Config::from_args().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    info!("Starting preview of {}", config.board_path.display());

    let mut previewer = Previewer::new(config);

    match previewer.run() {
        Ok(()) => {
            let stats = previewer.get_preview_stats();
            info!("Composited {} layers", stats.layers_composited);

            for image in &stats.images {
                println!("Wrote {}", image.display());
            }
            Ok(())
        }
        Err(e) => {
            error!("Preview failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
