//! Sentence segmentation and subword tokenization.
//!
//! Chunk sizes are denominated in the same BPE tokens the embedding and
//! chat models bill for, so [`Cl100kTokenizer`] wraps the `cl100k_base`
//! encoding from `tiktoken-rs` rather than approximating by characters or
//! words. Both seams are traits so the chunker can be exercised with
//! deterministic test doubles.

use std::collections::HashSet;

use anyhow::Result;
use tiktoken_rs::CoreBPE;
use unicode_segmentation::UnicodeSegmentation;

/// Subword tokenizer: `decode(encode(s)) == s` for ASCII text.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
    fn decode(&self, ids: &[u32]) -> Result<String>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// The `cl100k_base` BPE used by `text-embedding-3-*` and GPT-4 class models.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        // Special-token markup in documents is ordinary text.
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect()
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.bpe.decode(ids.iter().map(|&t| t as _).collect())
    }
}

/// Splits text into sentences, trimmed and non-empty, in input order.
pub trait SentenceSegmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<String>;
}

/// Lowercased, period-less abbreviations that never end an English sentence
/// when followed by a capitalised word.
const ENGLISH_ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "mt", "vs", "fig", "figs", "eq", "al",
    "approx", "dept", "est", "inc", "ltd", "co", "corp", "jan", "feb", "mar", "apr", "jun",
    "jul", "aug", "sep", "sept", "oct", "nov", "dec", "gen", "col", "lt", "sgt", "capt", "rev",
    "hon", "ave", "blvd", "rd", "ph", "cf", "viz",
];

/// UAX #29 sentence boundaries refined with an abbreviation table.
///
/// UAX #29 already keeps decimals (`3.14`) and lowercase continuations
/// (`e.g. the`) together; the abbreviation pass rejoins boundaries that
/// follow titles (`Dr.`), single-letter initials (`J.`), and dotted
/// acronyms (`U.S.`). Line breaks inside a sentence are joined with a
/// space; only terminal punctuation or a blank line ends a sentence.
pub struct UnicodeSentenceSegmenter {
    abbreviations: HashSet<String>,
}

impl UnicodeSentenceSegmenter {
    pub fn english() -> Self {
        Self::with_abbreviations(ENGLISH_ABBREVIATIONS.iter().copied())
    }

    pub fn with_abbreviations<'a, I>(abbreviations: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            abbreviations: abbreviations
                .into_iter()
                .map(|a| a.trim_end_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn ends_with_abbreviation(&self, segment: &str) -> bool {
        let Some(last) = segment.split_whitespace().last() else {
            return false;
        };
        let Some(word) = last.strip_suffix('.') else {
            return false;
        };
        let word = word.trim_start_matches(|c: char| !c.is_alphanumeric());
        if word.is_empty() {
            return false;
        }
        // Initials: "J." in "J. R. R. Tolkien".
        let mut chars = word.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_alphabetic() {
                return true;
            }
        }
        // Dotted acronyms: "U.S." or "e.g." when a capital follows.
        if word.contains('.') && word.split('.').all(|p| p.chars().count() == 1) {
            return true;
        }
        self.abbreviations.contains(&word.to_lowercase())
    }
}

impl Default for UnicodeSentenceSegmenter {
    fn default() -> Self {
        Self::english()
    }
}

impl SentenceSegmenter for UnicodeSentenceSegmenter {
    fn segment(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut pending = String::new();

        for bound in text.split_sentence_bounds() {
            pending.push_str(bound);
            let body = pending.trim_end();
            if body.trim_start().is_empty() {
                pending.clear();
                continue;
            }
            if self.ends_with_abbreviation(body) {
                continue;
            }
            // UAX #29 breaks after every line feed; a wrapped line without
            // terminal punctuation continues its sentence.
            if !ends_with_terminal(body) && !ends_paragraph(&pending[body.len()..]) {
                continue;
            }
            sentences.push(join_wrapped_lines(pending.trim()));
            pending.clear();
        }

        let trimmed = pending.trim();
        if !trimmed.is_empty() {
            sentences.push(join_wrapped_lines(trimmed));
        }
        sentences
    }
}

/// `.`, `!`, `?` or an ellipsis, optionally followed by closing quotes or brackets.
fn ends_with_terminal(segment: &str) -> bool {
    let core = segment.trim_end_matches(|c: char| {
        matches!(c, '"' | '\'' | '\u{201D}' | '\u{2019}' | '\u{BB}' | ')' | ']' | '}')
    });
    core.ends_with(['.', '!', '?', '\u{2026}', '\u{3002}', '\u{FF01}', '\u{FF1F}'])
}

/// Two or more line feeds: a blank line between paragraphs.
fn ends_paragraph(trailing: &str) -> bool {
    trailing.matches('\n').count() >= 2
}

/// Collapse whitespace runs that contain a line break into one space.
fn join_wrapped_lines(sentence: &str) -> String {
    let mut out = String::with_capacity(sentence.len());
    let mut gap = String::new();
    for c in sentence.chars() {
        if c.is_whitespace() {
            gap.push(c);
            continue;
        }
        if gap.contains(['\n', '\r']) {
            out.push(' ');
        } else {
            out.push_str(&gap);
        }
        gap.clear();
        out.push(c);
    }
    out
}
