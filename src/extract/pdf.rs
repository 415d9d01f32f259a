//! PDF text extraction with page-level OCR fallback.
//!
//! Extraction runs an ordered list of [`PdfPageStrategy`] parsers. The first
//! strategy that can open the document wins; a structural failure moves on
//! to the next one. Every page the winning strategy produces is classified
//! as a [`PageOutcome`]: enough text, too little text (sent to OCR), or an
//! error (skipped). Page texts are joined with `\n` in page order.

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use super::ocr::PageOcr;
use crate::error::ExtractError;

/// Classification of one page's extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Text(String),
    /// Trimmed text shorter than the OCR threshold: likely a scanned page.
    NeedsOcr,
    Failed(String),
}

/// Classify a page's raw text against the minimum-text threshold (in chars).
pub fn classify_page(raw: Result<String>, ocr_min_text_threshold: usize) -> PageOutcome {
    match raw {
        Ok(text) if text.trim().chars().count() < ocr_min_text_threshold => PageOutcome::NeedsOcr,
        Ok(text) => PageOutcome::Text(text),
        Err(e) => PageOutcome::Failed(e.to_string()),
    }
}

/// A PDF parser producing raw per-page text.
///
/// `Err` means the document could not be opened at all; per-page errors are
/// returned inside the vec so sibling pages still count.
pub trait PdfPageStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn page_texts(&self, pdf: &[u8]) -> Result<Vec<Result<String>>>;
}

/// Layout-aware per-page extraction via `pdf-extract`.
pub struct PdfExtractPages;

impl PdfPageStrategy for PdfExtractPages {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn page_texts(&self, pdf: &[u8]) -> Result<Vec<Result<String>>> {
        // pdf-extract panics on some malformed inputs; treat that as a
        // structural failure so the next strategy gets a chance.
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(pdf))
            .map_err(|_| anyhow!("pdf-extract panicked while parsing document"))?
            .map_err(|e| anyhow!("pdf-extract: {}", e))?;
        Ok(pages.into_iter().map(Ok).collect())
    }
}

/// Alternate parser: `lopdf`'s content-stream text extraction.
pub struct LopdfPages;

impl PdfPageStrategy for LopdfPages {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn page_texts(&self, pdf: &[u8]) -> Result<Vec<Result<String>>> {
        let doc = lopdf::Document::load_mem(pdf).map_err(|e| anyhow!("lopdf: {}", e))?;
        let pages = doc.get_pages();
        Ok(pages
            .keys()
            .map(|&n| doc.extract_text(&[n]).map_err(|e| anyhow!("lopdf page {}: {}", n, e)))
            .collect())
    }
}

/// The default strategy order: `pdf-extract`, then `lopdf`.
pub fn default_strategies() -> Vec<Box<dyn PdfPageStrategy>> {
    vec![Box::new(PdfExtractPages), Box::new(LopdfPages)]
}

/// Strategy list plus OCR policy for PDF documents.
pub struct PdfExtractor {
    strategies: Vec<Box<dyn PdfPageStrategy>>,
    ocr: PageOcr,
    ocr_min_text_threshold: usize,
}

impl PdfExtractor {
    pub fn new(
        strategies: Vec<Box<dyn PdfPageStrategy>>,
        ocr: PageOcr,
        ocr_min_text_threshold: usize,
    ) -> Self {
        Self {
            strategies,
            ocr,
            ocr_min_text_threshold,
        }
    }

    pub fn extract(&self, pdf: &[u8]) -> Result<String, ExtractError> {
        let mut last_err = None;
        for strategy in &self.strategies {
            match strategy.page_texts(pdf) {
                Ok(pages) => {
                    debug!(strategy = strategy.name(), pages = pages.len(), "parsed PDF");
                    return Ok(self.resolve_pages(pdf, pages));
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "PDF strategy failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(ExtractError::failed(
            "no PDF parser could read the document",
            last_err.unwrap_or_else(|| anyhow!("no PDF strategies configured")),
        ))
    }

    fn resolve_pages(&self, pdf: &[u8], pages: Vec<Result<String>>) -> String {
        let outcomes: Vec<PageOutcome> = pages
            .into_iter()
            .map(|raw| classify_page(raw, self.ocr_min_text_threshold))
            .collect();
        let sparse: Vec<u32> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| matches!(outcome, PageOutcome::NeedsOcr))
            .map(|(idx, _)| idx as u32 + 1)
            .collect();
        if !sparse.is_empty() {
            info!(pages = ?sparse, "pages have minimal text, applying OCR");
        }
        let mut recognized = self.ocr.ocr_pages(pdf, &sparse).into_iter();

        let mut out = String::new();
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            let page_number = idx as u32 + 1;
            let text = match outcome {
                PageOutcome::Text(text) => text,
                PageOutcome::NeedsOcr => recognized.next().unwrap_or_default(),
                PageOutcome::Failed(reason) => {
                    warn!(page = page_number, %reason, "skipping unreadable page");
                    continue;
                }
            };
            out.push_str(&text);
            out.push('\n');
        }
        out.trim().to_string()
    }
}
