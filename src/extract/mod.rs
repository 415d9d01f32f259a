//! Plain-text extraction from uploaded documents.
//!
//! | Type        | Method                                                  |
//! |-------------|---------------------------------------------------------|
//! | `pdf`       | per-page text via [`pdf`] strategies, OCR on sparse pages |
//! | `docx`/`doc`| `w:p` paragraphs of `word/document.xml` (zip + quick-xml) |
//! | `txt`       | first encoding in [`ENCODING_PRIORITY`] that decodes     |
//!
//! Extraction is synchronous and CPU/IO bound; async callers run it on a
//! blocking thread (see [`crate::ingest`]).

pub mod ocr;
pub mod pdf;

use std::io::Read;

use encoding_rs::WINDOWS_1252;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::models::DocumentType;

use self::ocr::PageOcr;
use self::pdf::{default_strategies, PdfExtractor, PdfPageStrategy};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";

/// Map a declared type string (`"PDF"`, `".docx"`, …) to a [`DocumentType`].
pub fn parse_document_type(declared: &str) -> Result<DocumentType, ExtractError> {
    declared.parse()
}

/// Document-to-text extractor with a configured PDF/OCR pipeline.
pub struct Extractor {
    pdf: PdfExtractor,
}

impl Extractor {
    pub fn new(
        strategies: Vec<Box<dyn PdfPageStrategy>>,
        ocr: PageOcr,
        ocr_min_text_threshold: usize,
    ) -> Self {
        Self {
            pdf: PdfExtractor::new(strategies, ocr, ocr_min_text_threshold),
        }
    }

    /// Default PDF strategies with the OCR backend named in config.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            default_strategies(),
            PageOcr::from_config(config),
            config.ocr_min_text_threshold,
        )
    }

    pub fn extract_text(&self, bytes: &[u8], doc_type: DocumentType) -> Result<String, ExtractError> {
        let text = match doc_type {
            DocumentType::Pdf => self.pdf.extract(bytes)?,
            DocumentType::Docx | DocumentType::Doc => extract_docx(bytes)?,
            DocumentType::Txt => decode_text(bytes)?,
        };
        debug!(doc_type = %doc_type, chars = text.chars().count(), "extracted text");
        Ok(text)
    }

    /// [`Extractor::extract_text`] with the type given as a string.
    pub fn extract(&self, bytes: &[u8], declared_type: &str) -> Result<String, ExtractError> {
        self.extract_text(bytes, parse_document_type(declared_type)?)
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::failed(format!("{} not found in archive", name), e))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::failed(format!("reading {}", name), e))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::failed(
            format!("{} exceeds size limit", name),
            anyhow::anyhow!("entry reached {} bytes", max_bytes),
        ));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::failed("not a valid Word archive", e))?;
    let xml = read_zip_entry_bounded(&mut archive, DOCX_BODY, MAX_XML_ENTRY_BYTES)?;
    let paragraphs = docx_paragraphs(&xml)?;
    Ok(paragraphs
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Text of every `w:p` in document order, including table cells.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    // Run boundaries can fall mid-word; whitespace inside w:t is content.
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    // Text boxes nest w:p inside w:p; their text joins the outer paragraph.
    let mut depth = 0usize;
    // Tab and break marks count only inside runs; w:pPr/w:tabs holds tab stops.
    let mut run_depth = 0usize;
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => depth += 1,
                b"r" => run_depth += 1,
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if depth > 0 && run_depth > 0 => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text && depth > 0 => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::failed("malformed text in word/document.xml", e))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => run_depth = run_depth.saturating_sub(1),
                b"p" if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::failed("malformed word/document.xml", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Candidate encodings for plain-text uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Cp1252,
    Iso8859_1,
}

/// Tried in order; the first that decodes wins.
pub const ENCODING_PRIORITY: [TextEncoding; 4] = [
    TextEncoding::Utf8,
    TextEncoding::Latin1,
    TextEncoding::Cp1252,
    TextEncoding::Iso8859_1,
];

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(str::to_owned)
            }
            // ISO-8859-1 maps every byte to the code point of the same value.
            TextEncoding::Latin1 | TextEncoding::Iso8859_1 => {
                Some(bytes.iter().map(|&b| b as char).collect())
            }
            TextEncoding::Cp1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|s| s.into_owned()),
        }
    }
}

/// Decode a text upload with [`ENCODING_PRIORITY`].
pub fn decode_text(bytes: &[u8]) -> Result<String, ExtractError> {
    decode_text_with(bytes, &ENCODING_PRIORITY)
}

pub fn decode_text_with(bytes: &[u8], encodings: &[TextEncoding]) -> Result<String, ExtractError> {
    for &encoding in encodings {
        if let Some(text) = encoding.decode(bytes) {
            debug!(?encoding, "decoded text file");
            return Ok(normalize_newlines(&text));
        }
    }
    Err(ExtractError::UndecodableText)
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", opts).unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file(DOCX_BODY, opts).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn text_only_extractor() -> Extractor {
        Extractor::new(
            default_strategies(),
            PageOcr::new(
                Arc::new(ocr::PdftoppmRasterizer::new("pdftoppm")),
                Arc::new(ocr::DisabledOcr),
                2.0,
            ),
            50,
        )
    }

    #[test]
    fn unsupported_declared_type() {
        let err = text_only_extractor().extract(b"a,b", "xlsx").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn docx_paragraphs_in_order_skipping_blank() {
        let bytes = docx_with_body(
            r#"<w:p><w:r><w:t>Quarterly </w:t></w:r><w:r><w:t>results</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">   </w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>Col A</w:t><w:tab/><w:t>Col B</w:t></w:r></w:p>
<w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>"#,
        );
        let text = text_only_extractor()
            .extract_text(&bytes, DocumentType::Docx)
            .unwrap();
        assert_eq!(text, "Quarterly results\nCol A\tCol B\nFish & chips");
    }

    #[test]
    fn doc_type_uses_docx_path() {
        let bytes = docx_with_body("<w:p><w:r><w:t>Legacy</w:t></w:r></w:p>");
        let text = text_only_extractor().extract(&bytes, "DOC").unwrap();
        assert_eq!(text, "Legacy");
    }

    #[test]
    fn docx_tab_stop_definitions_are_not_text() {
        let bytes = docx_with_body(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/><w:tabs><w:tab w:val="left" w:pos="720"/><w:tab w:val="right" w:pos="9360"/></w:tabs></w:pPr><w:r><w:t>Heading</w:t></w:r></w:p>
<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="1440"/></w:tabs></w:pPr><w:r><w:t>Name</w:t><w:tab/><w:t>Value</w:t><w:br/><w:t>Next</w:t></w:r></w:p>"#,
        );
        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "Heading\nName\tValue\nNext");
    }

    #[test]
    fn docx_table_cells_are_paragraphs() {
        let bytes = docx_with_body(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell one</w:t></w:r></w:p></w:tc>\
             <w:tc><w:p><w:r><w:t>cell two</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "cell one\ncell two");
    }

    #[test]
    fn invalid_zip_is_extraction_failed() {
        let err = extract_docx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionFailed { .. }));
    }

    #[test]
    fn zip_without_body_is_extraction_failed() {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<x/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let err = extract_docx(&bytes).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn utf8_text_with_bom_and_crlf() {
        let text = decode_text(b"\xEF\xBB\xBFline one\r\nline two\rline three").unwrap();
        assert_eq!(text, "line one\nline two\nline three");
    }

    #[test]
    fn invalid_utf8_falls_back_to_latin1() {
        // "café" in Latin-1
        let text = decode_text(b"caf\xE9").unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn cp1252_decodes_smart_quotes() {
        let text = decode_text_with(b"\x93quoted\x94", &[TextEncoding::Cp1252]).unwrap();
        assert_eq!(text, "\u{201C}quoted\u{201D}");
    }

    #[test]
    fn exhausting_encodings_is_undecodable() {
        let err = decode_text_with(b"\xFF\xFE\xFD", &[TextEncoding::Utf8]).unwrap_err();
        assert!(matches!(err, ExtractError::UndecodableText));
    }

    #[test]
    fn garbage_pdf_is_extraction_failed() {
        let err = text_only_extractor()
            .extract_text(b"definitely not a pdf", DocumentType::Pdf)
            .unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionFailed { .. }));
    }
}
