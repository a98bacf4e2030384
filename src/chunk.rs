//! Deterministic fixed-window chunking.
//!
//! Splits normalized document text into overlapping character windows of
//! size `window_chars` with `overlap_chars` of shared text between adjacent
//! chunks. Chunk `k` spans `[k*(W-O), min(k*(W-O)+W, L))` in character
//! offsets; emission stops once a chunk's end reaches the text length. Every
//! character is covered by at least one chunk, adjacent chunks overlap by
//! exactly `O` characters, and the same input with the same parameters
//! always yields the same boundaries. That reproducibility is what makes
//! re-ingestion idempotent.

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Chunk `text` into overlapping windows attributed to `document_id`.
///
/// Offsets are in characters, not bytes; slicing respects UTF-8 boundaries.
/// Empty text yields no chunks. Text shorter than one window yields exactly
/// one chunk holding the whole text.
pub fn chunk_text(document_id: &str, text: &str, chunking: &ChunkingConfig) -> Vec<Chunk> {
    let window = chunking.window_chars;
    let overlap = chunking.overlap_chars;
    debug_assert!(window > overlap, "window must exceed overlap");

    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every character, so char-indexed windows can slice
    // without landing inside a multi-byte sequence.
    let byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let total_chars = byte_offsets.len();
    let stride = window - overlap;

    let mut chunks = Vec::new();
    let mut k = 0usize;
    loop {
        let char_start = k * stride;
        let char_end = (char_start + window).min(total_chars);

        let byte_start = byte_offsets[char_start];
        let byte_end = if char_end == total_chars {
            text.len()
        } else {
            byte_offsets[char_end]
        };

        chunks.push(Chunk {
            document_id: document_id.to_string(),
            seq: k as i64,
            text: text[byte_start..byte_end].to_string(),
            char_start,
            char_end,
        });

        if char_end == total_chars {
            break;
        }
        k += 1;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(window: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            window_chars: window,
            overlap_chars: overlap,
        }
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let chunks = chunk_text("d1", "", &cfg(10, 3));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_text_yields_single_whole_chunk() {
        let chunks = chunk_text("d1", "hello", &cfg(10, 3));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks[0].char_end, 5);
    }

    #[test]
    fn test_exact_window_length_yields_single_chunk() {
        let text = "a".repeat(10);
        let chunks = chunk_text("d1", &text, &cfg(10, 3));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_end, 10);
    }

    #[test]
    fn test_window_boundaries_follow_stride() {
        // W=10, O=3, stride 7: spans [0,10), [7,17), [14,20)
        let text: String = ('a'..='t').collect();
        let chunks = chunk_text("d1", &text, &cfg(10, 3));
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].char_start, chunks[0].char_end), (0, 10));
        assert_eq!((chunks[1].char_start, chunks[1].char_end), (7, 17));
        assert_eq!((chunks[2].char_start, chunks[2].char_end), (14, 20));
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert_eq!(chunks[2].text, "opqrst");
    }

    #[test]
    fn test_zero_overlap_tiles_text_without_gaps() {
        let text = "abcdefghij";
        let chunks = chunk_text("d1", text, &cfg(4, 0));
        let spans: Vec<_> = chunks.iter().map(|c| (c.char_start, c.char_end)).collect();
        assert_eq!(spans, vec![(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn test_coverage_is_total_and_overlap_exact() {
        let text: String = std::iter::repeat("lorem ipsum dolor sit amet ")
            .take(40)
            .collect();
        let total_chars = text.chars().count();
        let chunking = cfg(100, 25);
        let chunks = chunk_text("d1", &text, &chunking);

        assert_eq!(chunks[0].char_start, 0);
        assert_eq!(chunks.last().unwrap().char_end, total_chars);
        for pair in chunks.windows(2) {
            // Every non-final boundary overlaps the next chunk by exactly O.
            assert_eq!(pair[0].char_end - pair[1].char_start, 25);
            assert!(pair[1].char_start < pair[0].char_end, "no gaps");
        }
        for (k, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.seq, k as i64);
        }
    }

    #[test]
    fn test_multibyte_text_slices_on_char_boundaries() {
        let text = "héllo wörld 🦀 ünïcode çhünks everywhere ダミーテキスト";
        let chunks = chunk_text("d1", text, &cfg(12, 4));
        let reassembled: String = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    c.text.clone()
                } else {
                    // Drop the overlapping prefix when reassembling.
                    c.text.chars().skip(4).collect()
                }
            })
            .collect();
        assert_eq!(reassembled, text);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text: String = std::iter::repeat("the quick brown fox ").take(100).collect();
        let chunking = cfg(256, 64);
        let first = chunk_text("d1", &text, &chunking);
        let second = chunk_text("d1", &text, &chunking);
        assert_eq!(first, second);
    }
}
