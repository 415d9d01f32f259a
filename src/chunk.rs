//! Sentence-boundary, token-bounded text chunker.
//!
//! Splits extracted document text into overlapping [`Chunk`]s whose size is
//! measured in BPE tokens. Sentences are never split: a single sentence
//! longer than the bound becomes its own oversized chunk.
//!
//! # Algorithm
//!
//! 1. Segment the text into sentences.
//! 2. Accumulate sentences (space-joined) into a buffer while the buffer's
//!    token count stays within `chunk_size_tokens`.
//! 3. When the next sentence would overflow a non-empty buffer, emit the
//!    buffer and seed the next one with the last `overlap_tokens` tokens of
//!    the emitted chunk, decoded back to text, followed by the sentence.
//! 4. Emit whatever remains.
//!
//! Chunk IDs are contiguous emission indices `0, 1, 2, …`.
//!
//! # Example
//!
//! ```rust
//! use docqa::chunk::chunk_text;
//!
//! let chunks = chunk_text("One sentence. Another sentence.", 800, 100).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_id, 0);
//! ```

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::config::ChunkingConfig;
use crate::models::Chunk;
use crate::tokenize::{Cl100kTokenizer, SentenceSegmenter, Tokenizer, UnicodeSentenceSegmenter};

/// Token-bounded chunker over pluggable segmenter and tokenizer.
pub struct Chunker {
    segmenter: Arc<dyn SentenceSegmenter>,
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size_tokens: usize,
    overlap_tokens: usize,
}

impl Chunker {
    pub fn new(
        segmenter: Arc<dyn SentenceSegmenter>,
        tokenizer: Arc<dyn Tokenizer>,
        chunk_size_tokens: usize,
        overlap_tokens: usize,
    ) -> Self {
        Self {
            segmenter,
            tokenizer,
            chunk_size_tokens,
            overlap_tokens,
        }
    }

    /// English sentence boundaries and the `cl100k_base` tokenizer.
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(UnicodeSentenceSegmenter::english()),
            Arc::new(Cl100kTokenizer::new()?),
            config.chunk_size_tokens,
            config.overlap_tokens,
        ))
    }

    /// Split `text` into chunks. Blank input yields an empty vec.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for sentence in self.segmenter.segment(text) {
            let sentence_tokens = self.tokenizer.count(&sentence);
            // Trimmed text followed by " sentence" splits into the same
            // pre-tokens as its two halves, so counts add up exactly.
            let candidate_tokens = if current.is_empty() {
                sentence_tokens
            } else {
                current_tokens + self.tokenizer.count(&format!(" {}", sentence))
            };

            if candidate_tokens > self.chunk_size_tokens && !current.is_empty() {
                let closed = self.emit(&mut chunks, &current);
                (current, current_tokens) = self.seed_next(&closed, sentence, sentence_tokens);
            } else {
                // An empty buffer takes the sentence even when it alone
                // exceeds the bound; sentences are never truncated.
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&sentence);
                current_tokens = candidate_tokens;
            }
        }

        if !current.trim().is_empty() {
            self.emit(&mut chunks, &current);
        }

        debug!(
            chunks = chunks.len(),
            last_tokens = current_tokens,
            "chunked text"
        );
        chunks
    }

    fn emit(&self, chunks: &mut Vec<Chunk>, text: &str) -> String {
        let text = text.trim().to_string();
        chunks.push(Chunk {
            chunk_id: chunks.len(),
            token_count: self.tokenizer.count(&text),
            text: text.clone(),
        });
        text
    }

    /// Start the next buffer with the overlap tail of `closed` and `sentence`.
    ///
    /// The tail shrinks until the seeded buffer fits the bound; a sentence
    /// that alone exceeds the bound gets no tail at all.
    fn seed_next(&self, closed: &str, sentence: String, sentence_tokens: usize) -> (String, usize) {
        let budget = self.chunk_size_tokens.saturating_sub(sentence_tokens);
        let mut overlap = self.overlap_tokens.min(budget);
        while overlap > 0 {
            let seed = self.overlap_tail(closed, overlap);
            if !seed.is_empty() {
                let seeded = format!("{} {}", seed, sentence);
                let tokens = self.tokenizer.count(&seeded);
                if tokens <= self.chunk_size_tokens {
                    return (seeded, tokens);
                }
            }
            overlap -= 1;
        }
        (sentence, sentence_tokens)
    }

    /// The last `overlap` tokens of `text`, decoded. Short chunks are reused whole.
    fn overlap_tail(&self, text: &str, overlap: usize) -> String {
        if overlap == 0 {
            return String::new();
        }
        let ids = self.tokenizer.encode(text);
        if ids.len() <= overlap {
            return text.to_string();
        }
        // A cut inside a multi-byte character does not decode; move forward
        // to the next decodable boundary.
        for start in ids.len() - overlap..ids.len() {
            if let Ok(tail) = self.tokenizer.decode(&ids[start..]) {
                let tail = tail.trim();
                if !tail.is_empty() {
                    return tail.to_string();
                }
            }
        }
        String::new()
    }
}

/// Chunk with the default segmenter and the `cl100k_base` tokenizer.
pub fn chunk_text(text: &str, chunk_size_tokens: usize, overlap_tokens: usize) -> Result<Vec<Chunk>> {
    let chunker = Chunker::from_config(&ChunkingConfig {
        chunk_size_tokens,
        overlap_tokens,
    })?;
    Ok(chunker.chunk(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word.
    struct WordTokenizer {
        vocab: std::sync::Mutex<Vec<String>>,
    }

    impl WordTokenizer {
        fn new() -> Self {
            Self {
                vocab: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            let mut vocab = self.vocab.lock().unwrap();
            text.split_whitespace()
                .map(|w| {
                    let known = vocab.iter().position(|v| v == w);
                    match known {
                        Some(i) => i as u32,
                        None => {
                            vocab.push(w.to_string());
                            (vocab.len() - 1) as u32
                        }
                    }
                })
                .collect()
        }

        fn decode(&self, ids: &[u32]) -> Result<String> {
            let vocab = self.vocab.lock().unwrap();
            Ok(ids
                .iter()
                .map(|&i| vocab[i as usize].as_str())
                .collect::<Vec<_>>()
                .join(" "))
        }
    }

    fn word_chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(
            Arc::new(UnicodeSentenceSegmenter::english()),
            Arc::new(WordTokenizer::new()),
            size,
            overlap,
        )
    }

    /// A sentence of exactly ten word tokens.
    fn ten_words(tag: &str) -> String {
        let words: Vec<String> = (2..=9).map(|i| format!("{}{}", tag, i)).collect();
        format!("{}1 {} end{}.", tag.to_uppercase(), words.join(" "), tag)
    }

    #[test]
    fn empty_and_blank_text_yield_no_chunks() {
        let chunker = word_chunker(25, 5);
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("  \n\t  ").is_empty());
    }

    #[test]
    fn three_ten_token_sentences_split_with_overlap() {
        let (s1, s2, s3) = (ten_words("a"), ten_words("b"), ten_words("c"));
        let text = format!("{} {} {}", s1, s2, s3);
        let chunks = word_chunker(25, 5).chunk(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{} {}", s1, s2));
        assert_eq!(chunks[0].token_count, 20);
        assert_eq!(chunks[1].text, format!("b6 b7 b8 b9 endb. {}", s3));
        assert_eq!(chunks[1].token_count, 15);
        assert_eq!(chunks[1].chunk_id, 1);
    }

    #[test]
    fn zero_overlap_disables_seeding() {
        let text = format!("{} {} {}", ten_words("a"), ten_words("b"), ten_words("c"));
        let chunks = word_chunker(25, 0).chunk(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, ten_words("c"));
    }

    #[test]
    fn overlap_tail_takes_trailing_tokens_or_whole_text() {
        let chunker = word_chunker(25, 5);
        assert_eq!(chunker.overlap_tail("one two three four", 2), "three four");
        assert_eq!(chunker.overlap_tail("Tiny one.", 20), "Tiny one.");
        assert_eq!(chunker.overlap_tail("Tiny one.", 0), "");
    }

    #[test]
    fn oversized_sentence_is_kept_whole() {
        let long = ten_words("z");
        let chunks = word_chunker(4, 2).chunk(&format!("{} Short one.", long));
        assert_eq!(chunks[0].text, long);
        assert_eq!(chunks[0].token_count, 10);
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
    }

    #[test]
    fn line_wrapped_sentence_is_not_split_between_chunks() {
        let text = "First short sentence here.\nThe payment is due within\nthirty days of the invoice date. Last one.";
        let chunks = word_chunker(12, 0).chunk(text);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "First short sentence here.",
                "The payment is due within thirty days of the invoice date.",
                "Last one."
            ]
        );
        assert_eq!(chunks[1].token_count, 11);
    }

    #[test]
    fn wrapped_oversized_sentence_stays_whole() {
        let first: Vec<String> = (0..15).map(|i| format!("w{}", i)).collect();
        let second: Vec<String> = (15..28).map(|i| format!("w{}", i)).collect();
        let text = format!("Alpha {}\n{} end.", first.join(" "), second.join(" "));
        let chunks = word_chunker(20, 0).chunk(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 30);
        assert!(!chunks[0].text.contains('\n'));
    }

    #[test]
    fn incremental_counts_match_emitted_chunks() {
        let tok = Cl100kTokenizer::new().unwrap();
        let text = "Revenue rose 12% in Q3.\n\"Guidance\" stays at $4.5bn (unchanged). \
                    Costs fell: 3,200 jobs were cut!\n2024 closes soon? Yes.";
        let chunks = chunk_text(text, 14, 0).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(tok.count(&c.text), c.token_count);
            let sentences = UnicodeSentenceSegmenter::english().segment(&c.text);
            if sentences.len() > 1 {
                assert!(c.token_count <= 14, "{:?}", c.text);
            }
        }
    }

    #[test]
    fn overlap_shrinks_to_keep_chunks_within_bound() {
        let text = format!("{} {} {}", ten_words("a"), ten_words("b"), ten_words("c"));
        let chunks = word_chunker(22, 15).chunk(&text);
        for c in &chunks {
            assert!(c.token_count <= 22, "chunk {} has {} tokens", c.chunk_id, c.token_count);
        }
    }

    #[test]
    fn ids_are_contiguous_and_no_sentence_is_dropped() {
        let sentences: Vec<String> = (0..40)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i * 7))
            .collect();
        let text = sentences.join(" ");
        let chunks = word_chunker(30, 6).chunk(&text);

        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_id, i);
            assert!(c.token_count <= 30);
        }
        let all = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
        let mut cursor = 0;
        for s in &sentences {
            let found = all[cursor..].find(s.as_str()).expect("sentence missing");
            cursor += found;
        }
    }

    #[test]
    fn cl100k_chunks_respect_token_bound() {
        let tok = Cl100kTokenizer::new().unwrap();
        let text = (0..120)
            .map(|i| format!("The quarterly report lists {} items, priced at {}.50 each.", i, i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 60, 10).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(tok.count(&c.text), c.token_count);
            assert!(c.token_count <= 60);
        }
    }

    #[test]
    fn deterministic() {
        let text = "Alpha beta gamma. Delta epsilon. Zeta eta theta iota.";
        let a = chunk_text(text, 6, 2).unwrap();
        let b = chunk_text(text, 6, 2).unwrap();
        assert_eq!(a, b);
    }
}
