//! Configuration management for pcb-preview
//!
//! This module handles CLI argument parsing, output locations and the fixed
//! render constants.

use crate::palette::PaletteKind;
use anyhow::{anyhow, Result};
use clap::builder::styling;
use clap::{value_parser, Arg, ColorChoice, Command};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the palette, e.g. `PCB_PREVIEW_PALETTE=osh-park`
pub const PALETTE_ENV: &str = "PCB_PREVIEW_PALETTE";

/// Build the CLI command
pub fn build_cli() -> Command {
    let styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Blue.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default());

    Command::new("pcb-preview")
        .about("pcb-preview - Render front and back preview images of a KiCad board")
        .after_help("Set PCB_PREVIEW_PALETTE to green-standard, osh-park or bump-map to change colors.")
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("board")
                .help("Path to the .kicad_pcb board file")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Board design file
    pub board_path: PathBuf,

    /// Color role table used for every pass
    pub palette: PaletteKind,

    /// Disable progress bars
    pub no_progress: bool,
}

impl Config {
    pub fn new(board_path: impl Into<PathBuf>) -> Self {
        Self {
            board_path: board_path.into(),
            palette: PaletteKind::default(),
            no_progress: true,
        }
    }

    /// Parse arguments and apply initial configuration
    pub fn from_args() -> Result<Self> {
        let matches = build_cli().get_matches();

        let board_path = matches
            .get_one::<PathBuf>("board")
            .cloned()
            .ok_or_else(|| anyhow!("Board file is required"))?;

        let mut config = Config {
            board_path,
            palette: PaletteKind::default(),
            no_progress: !std::io::stderr().is_terminal(),
        };
        if let Ok(name) = std::env::var(PALETTE_ENV) {
            config = config.with_palette(&name)?;
        }

        // RUST_LOG controls logging; silent by default
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();

        info!("Configuration: {:?}", config);
        Ok(config)
    }

    /// Select a palette by name, e.g. `osh-park`
    pub fn with_palette(mut self, name: &str) -> Result<Self> {
        self.palette = name.parse()?;
        Ok(self)
    }

    /// Board file name without extension
    pub fn project_name(&self) -> String {
        self.board_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "board".to_string())
    }

    /// Directory holding the board file
    pub fn project_dir(&self) -> PathBuf {
        match self.board_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// `<project>/plot`
    pub fn output_dir(&self) -> PathBuf {
        self.project_dir().join("plot")
    }

    /// `<project>/plot/temp`
    pub fn scratch_dir(&self) -> PathBuf {
        self.output_dir().join("temp")
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if !self.board_path.is_file() {
            return Err(anyhow!(
                "Board file does not exist: {}",
                self.board_path.display()
            ));
        }

        if !is_board_file(&self.board_path) {
            warn!(
                "{} does not have a .kicad_pcb extension",
                self.board_path.display()
            );
        }

        info!("Configuration validation completed successfully");
        Ok(())
    }
}

/// Fixed physical scale and resolution of the rendered previews
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Raster resolution
    pub dpi: u32,
    /// Export pixels per millimetre of the plotted page
    pub px_per_mm: f64,
    /// Board units per millimetre
    pub nm_per_mm: f64,
    /// Height of the plotted page; A4 landscape
    pub page_height_nm: f64,
    /// Wait after each layer plot before reading it back
    pub plot_settle: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            dpi: 1200,
            px_per_mm: 3.779,
            nm_per_mm: 1_000_000.0,
            page_height_nm: 210_070_000.0,
            plot_settle: Duration::from_millis(10),
        }
    }
}

/// Output image name for a pass, e.g. `board-Front.png`
pub fn output_file_name(project: &str, side: &str) -> String {
    format!("{}-{}.png", project, side)
}

/// Whether `path` looks like a KiCad board file
pub fn is_board_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("kicad_pcb"))
        .unwrap_or(false)
}
