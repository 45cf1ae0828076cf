//! Paragraph-boundary text chunker.
//!
//! Splits an item's body into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! so each chunk stays semantically coherent; a single paragraph longer
//! than the limit is hard-split at the last newline or space before it.
//!
//! Chunking is deterministic: the same text and limit always produce the
//! same chunk texts, indices and hashes, which is what makes upserts keyed
//! by `(source, source_id, chunk_index)` idempotent.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0, or no chunks at
/// all for blank text.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);

    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // If adding this paragraph would exceed max, flush current buffer
        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            push_chunk(&mut chunks, &current_buf);
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, max_chars);
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    push_chunk(&mut chunks, piece);
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        push_chunk(&mut chunks, &current_buf);
    }

    chunks
}

/// SHA-256 hex digest of a string.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str) {
    chunks.push(Chunk {
        chunk_index: chunks.len() as i64,
        text: text.to_string(),
        hash: sha256_hex(text),
    });
}

/// Largest byte index `<= max` that lies on a char boundary (at least one
/// whole char, so the split always makes progress).
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    if idx == 0 {
        s.chars().next().map(char::len_utf8).unwrap_or(s.len())
    } else {
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(chunk_text("", 700).is_empty());
        assert!(chunk_text("  \n\n \n\n", 700).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 700);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_multiple_paragraphs_exceed_limit() {
        // max_tokens=5 => max_chars=20
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text(text, 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn test_oversized_paragraph_split_on_space() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = chunk_text(text, 3); // 12 chars
        assert!(chunks.len() > 2);
        for c in &chunks {
            assert!(c.text.len() <= 12, "chunk too long: {:?}", c.text);
        }
        let rejoined: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined.join(" "), text);
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "ééééééééééééééééééééééééééééééééééééééééé";
        let chunks = chunk_text(text, 2);
        assert!(!chunks.is_empty());
        let total: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(total, text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text(text, 5);
        let c2 = chunk_text(text, 5);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }
}
