//! OCR for image-dominated PDF pages.
//!
//! Two seams: a [`PageRasterizer`] turns one PDF page into a PNG, and an
//! [`OcrEngine`] reads text back out of it. The shipped implementations
//! shell out to poppler's `pdftoppm` and to `tesseract`, the same way the
//! git connector drives the `git` binary.
//!
//! [`PageOcr`] combines the two and never fails: any rasterisation or
//! recognition error is logged and the page contributes an empty string.
//! The PDF is written to a scratch file once per document, however many
//! of its pages need OCR.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::config::ExtractionConfig;

/// Base resolution of a PDF user-space unit.
const PDF_BASE_DPI: f32 = 72.0;

/// Tesseract page segmentation mode 6: a single uniform block of text.
pub const PSM_SINGLE_BLOCK: u8 = 6;

/// Renders a single page (1-based) of the PDF at `pdf` to PNG bytes at
/// `scale` × 72 DPI.
pub trait PageRasterizer: Send + Sync {
    fn render_page(&self, pdf: &Path, page_number: u32, scale: f32) -> Result<Vec<u8>>;
}

/// Best-effort text recognition over a PNG image. May return an empty string.
pub trait OcrEngine: Send + Sync {
    fn recognize_text(&self, png: &[u8]) -> Result<String>;
}

/// Rasterizer backed by poppler's `pdftoppm`.
pub struct PdftoppmRasterizer {
    bin: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    fn render_page(&self, pdf: &Path, page_number: u32, scale: f32) -> Result<Vec<u8>> {
        let dir = tempfile::TempDir::new().context("Failed to create OCR scratch directory")?;
        let prefix = dir.path().join("page");
        let dpi = (PDF_BASE_DPI * scale).round() as u32;
        let page = page_number.to_string();

        let output = Command::new(&self.bin)
            .args(["-f", &page, "-l", &page, "-r", &dpi.to_string(), "-png", "-singlefile"])
            .arg(pdf)
            .arg(&prefix)
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute '{}'. Is poppler-utils installed?",
                    self.bin.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("pdftoppm failed on page {}: {}", page_number, stderr.trim());
        }

        let png = std::fs::read(prefix.with_extension("png"))
            .with_context(|| format!("pdftoppm produced no image for page {}", page_number))?;
        debug!(page = page_number, dpi, bytes = png.len(), "rendered page");
        Ok(png)
    }
}

/// OCR engine backed by the `tesseract` CLI.
pub struct TesseractOcr {
    bin: PathBuf,
    psm: u8,
}

impl TesseractOcr {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            psm: PSM_SINGLE_BLOCK,
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize_text(&self, png: &[u8]) -> Result<String> {
        let dir = tempfile::TempDir::new().context("Failed to create OCR scratch directory")?;
        let image = dir.path().join("page.png");
        std::fs::write(&image, png)?;

        let output = Command::new(&self.bin)
            .arg(&image)
            .arg("stdout")
            .args(["--psm", &self.psm.to_string()])
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute '{}'. Is tesseract installed?",
                    self.bin.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tesseract failed: {}", stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// OCR turned off: every page that needs OCR comes back empty.
pub struct DisabledOcr;

impl OcrEngine for DisabledOcr {
    fn recognize_text(&self, _png: &[u8]) -> Result<String> {
        bail!("OCR is disabled")
    }
}

/// Rasterise-then-recognise for a single page, with per-page fault isolation.
pub struct PageOcr {
    rasterizer: Arc<dyn PageRasterizer>,
    engine: Arc<dyn OcrEngine>,
    scale: f32,
}

impl PageOcr {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, engine: Arc<dyn OcrEngine>, scale: f32) -> Self {
        Self {
            rasterizer,
            engine,
            scale,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        let engine: Arc<dyn OcrEngine> = match config.ocr.as_str() {
            "disabled" => Arc::new(DisabledOcr),
            _ => Arc::new(TesseractOcr::new(&config.tesseract_bin)),
        };
        Self::new(
            Arc::new(PdftoppmRasterizer::new(&config.pdftoppm_bin)),
            engine,
            config.render_scale,
        )
    }

    /// OCR text for each of `page_numbers`, in order. The PDF is staged to
    /// disk once; a page that fails comes back as an empty string.
    pub fn ocr_pages(&self, pdf: &[u8], page_numbers: &[u32]) -> Vec<String> {
        if page_numbers.is_empty() {
            return Vec::new();
        }
        let staged = match stage_pdf(pdf) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "could not stage PDF for OCR");
                return vec![String::new(); page_numbers.len()];
            }
        };
        page_numbers
            .iter()
            .map(|&page| self.ocr_page(staged.path(), page))
            .collect()
    }

    /// OCR text for `page_number`, or an empty string if anything fails.
    pub fn ocr_page(&self, pdf: &Path, page_number: u32) -> String {
        match self.try_ocr_page(pdf, page_number) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = page_number, error = %e, "OCR failed for page");
                String::new()
            }
        }
    }

    fn try_ocr_page(&self, pdf: &Path, page_number: u32) -> Result<String> {
        let png = self.rasterizer.render_page(pdf, page_number, self.scale)?;
        self.engine.recognize_text(&png)
    }
}

fn stage_pdf(pdf: &[u8]) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("docqa-ocr-")
        .suffix(".pdf")
        .tempfile()
        .context("Failed to create OCR scratch file")?;
    file.write_all(pdf)?;
    file.flush()?;
    Ok(file)
}
