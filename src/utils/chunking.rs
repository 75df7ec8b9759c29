use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

lazy_static! {
    static ref DISALLOWED_CHARS: Regex =
        Regex::new(r"[^\w\s.,;:!?\-()\[\]]").expect("DISALLOWED_CHARS regex is valid");
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkingError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// Window `i` starts at `i * (chunk_size - overlap)`; the last window may be
/// shorter and no window is emitted once one has reached the end of the text.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::ZeroChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            chunk_size,
            overlap,
        });
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Collapse whitespace runs to single spaces and drop characters outside
/// word characters, whitespace and `. , ; : ! ? - ( ) [ ]`.
pub fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    DISALLOWED_CHARS.replace_all(&collapsed, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_advance_by_size_minus_overlap() {
        let text = "x".repeat(2500);
        let chunks = chunk_text(&text, 1000, 200).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![1000, 1000, 900]);
    }

    #[test]
    fn window_starts_follow_the_step() {
        let text: String = (0..30).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, 10, 4).unwrap();
        assert_eq!(chunks[0], text[0..10]);
        assert_eq!(chunks[1], text[6..16]);
        assert_eq!(chunks[2], text[12..22]);
        assert_eq!(chunks.last().unwrap(), &text[24..30]);
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        assert_eq!(
            chunk_text("abc", 100, 100),
            Err(ChunkingError::OverlapTooLarge {
                chunk_size: 100,
                overlap: 100
            })
        );
        assert!(chunk_text("abc", 100, 250).is_err());
        assert_eq!(chunk_text("abc", 0, 0), Err(ChunkingError::ZeroChunkSize));
    }

    #[test]
    fn short_and_empty_inputs() {
        assert!(chunk_text("", 1000, 200).unwrap().is_empty());
        assert_eq!(chunk_text("short", 1000, 200).unwrap(), vec!["short"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "ş".repeat(15);
        let chunks = chunk_text(&text, 10, 2).unwrap();
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks[1].chars().count(), 7);
    }

    #[test]
    fn clean_text_normalises_whitespace_and_symbols() {
        let cleaned = clean_text("  Deep\t\tlearning\n(2021) — results: 95% «good» [1]!  ");
        assert_eq!(cleaned, "Deep learning (2021)  results: 95 good [1]!");
    }

    #[test]
    fn clean_text_keeps_unicode_word_characters() {
        assert_eq!(clean_text("Öğrenme  ağları"), "Öğrenme ağları");
    }
}
