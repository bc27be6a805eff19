//! Rasterization of the merged canvas through an external Inkscape process

use crate::board::BoardBounds;
use crate::compositor::Mirror;
use crate::config::RenderSettings;
use crate::error::{PreviewError, Result};
use crate::palette::Color;
use anyhow::Context;
use image::ImageReader;
use std::ffi::OsString;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Common install locations appended to the child's search path
const FALLBACK_SEARCH_PATHS: &[&str] = &[
    r"C:\Program Files\Inkscape",
    r"C:\Program Files (x86)\Inkscape",
    "/usr/local/bin",
    "/usr/bin/",
];

/// Export area in px, `(x0, y0)` bottom left and `(x1, y1)` top right
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropWindow {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl CropWindow {
    /// Crop window of the board on the plotted page
    pub fn from_bounds(bounds: &BoardBounds, settings: &RenderSettings, mirror: Mirror) -> Self {
        let to_px = |nm: f64| nm / settings.nm_per_mm * settings.px_per_mm;
        let (x, y) = (bounds.x as f64, bounds.y as f64);
        let (w, h) = (bounds.width as f64, bounds.height as f64);
        let page = settings.page_height_nm;

        let mut x0 = to_px(x);
        let mut x1 = to_px(x + w);
        let y0 = to_px(page - (y + h));
        let y1 = to_px(page - y);

        if mirror.is_mirrored() {
            // The flipped board lies on the negative x side; keep x0 < x1
            (x0, x1) = (-x1, -x0);
        }

        Self { x0, y0, x1, y1 }
    }
}

impl fmt::Display for CropWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.x0, self.y0, self.x1, self.y1)
    }
}

/// One rasterization request
#[derive(Debug, Clone, PartialEq)]
pub struct RasterJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub area: CropWindow,
    pub dpi: u32,
    pub background: Color,
}

/// Converts a merged SVG into a PNG
pub trait Rasterizer {
    /// Block until the image is written or the conversion fails
    fn rasterize(&mut self, job: &RasterJob) -> Result<()>;
}

/// Command line dialect of the installed Inkscape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationForm {
    /// Inkscape 0.x: `--export-png`
    Legacy,
    /// Inkscape 1.0+: `--export-type` and `--export-filename`
    Current,
}

impl InvocationForm {
    /// Select the form from `inkscape --version` output,
    /// e.g. `Inkscape 0.92.4 (5da689c313, 2019-01-14)`
    pub fn from_version_output(output: &str) -> Self {
        match output.split_whitespace().nth(1) {
            Some(version) if version.starts_with("0.") => InvocationForm::Legacy,
            _ => InvocationForm::Current,
        }
    }

    /// Arguments for one export, input file last
    pub fn export_args(&self, job: &RasterJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            format!("--export-area={}", job.area).into(),
            format!("--export-dpi={}", job.dpi).into(),
        ];

        match self {
            InvocationForm::Legacy => {
                args.push("--export-png".into());
                args.push(job.output.clone().into_os_string());
            }
            InvocationForm::Current => {
                args.push("--export-type=png".into());
                let mut filename = OsString::from("--export-filename=");
                filename.push(&job.output);
                args.push(filename);
            }
        }

        args.push("--export-background".into());
        args.push(job.background.to_string().into());
        args.push(job.input.clone().into_os_string());
        args
    }
}

/// Rasterizer backed by the `inkscape` executable
#[derive(Debug)]
pub struct InkscapeRasterizer {
    program: PathBuf,
    search_path: OsString,
    form: Option<InvocationForm>,
}

impl Default for InkscapeRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl InkscapeRasterizer {
    pub fn new() -> Self {
        Self::with_program("inkscape")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            search_path: widened_search_path(),
            form: None,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.env("PATH", &self.search_path);
        command
    }

    fn not_found(&self) -> PreviewError {
        PreviewError::RasterizerNotFound {
            program: self.program.display().to_string(),
        }
    }

    /// Query the installed version once and remember the invocation form
    pub fn invocation_form(&mut self) -> Result<InvocationForm> {
        if let Some(form) = self.form {
            return Ok(form);
        }

        let output = self.command().arg("--version").output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                anyhow::Error::from(self.not_found())
            } else {
                anyhow::Error::from(e).context("Failed to query rasterizer version")
            }
        })?;

        if !output.status.success() {
            return Err(anyhow::Error::from(PreviewError::RasterizerFailed {
                status: output.status.to_string(),
            })
            .context("Rasterizer version query failed"));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let form = InvocationForm::from_version_output(&version);
        match form {
            InvocationForm::Legacy => info!("Detected Inkscape version < 1.0"),
            InvocationForm::Current => info!("Detected Inkscape version 1.0+"),
        }

        self.form = Some(form);
        Ok(form)
    }
}

impl Rasterizer for InkscapeRasterizer {
    fn rasterize(&mut self, job: &RasterJob) -> Result<()> {
        let form = self.invocation_form()?;
        let args = form.export_args(job);
        debug!("Running {} {:?}", self.program.display(), args);

        let status = self.command().args(&args).status().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                anyhow::Error::from(self.not_found())
            } else {
                anyhow::Error::from(e).context("Failed to run rasterizer")
            }
        })?;

        if !status.success() {
            return Err(PreviewError::RasterizerFailed {
                status: status.to_string(),
            }
            .into());
        }

        let (width, height) = image_dimensions(&job.output)?;
        info!(
            "Rasterized {} ({}x{} px)",
            job.output.display(),
            width,
            height
        );
        Ok(())
    }
}

/// The current `PATH` followed by the common install locations
fn widened_search_path() -> OsString {
    let mut paths: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default();
    paths.extend(FALLBACK_SEARCH_PATHS.iter().map(PathBuf::from));

    std::env::join_paths(paths).unwrap_or_else(|_| std::env::var_os("PATH").unwrap_or_default())
}

/// Dimensions of the written image, failing if it does not exist
pub fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    if !path.is_file() {
        return Err(PreviewError::RasterOutputMissing {
            path: path.display().to_string(),
        }
        .into());
    }

    ImageReader::open(path)
        .with_context(|| format!("Open rasterized image {}", path.display()))?
        .with_guessed_format()
        .context("Guess image format")?
        .into_dimensions()
        .context("Read image dimensions")
}
