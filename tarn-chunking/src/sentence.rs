use tarn_common::AppError;

use crate::assemble::assemble_windows;
use crate::types::Chunk;

/// `sentence(max_chars)`: splits on sentence-ending punctuation
/// (`.`, `!`, `?`) followed by whitespace or end of text, then merges
/// consecutive sentences into windows that never exceed `max_chars`.
pub fn sentence(text: &str, max_chars: usize) -> Result<Vec<Chunk>, AppError> {
    assemble_windows(text, sentence_spans(text), max_chars)
}

/// Byte-level scan is safe here: the only bytes inspected (`.`, `!`, `?`,
/// ASCII whitespace) are all below 0x80, which can never occur as a
/// continuation byte of a multi-byte UTF-8 sequence.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        if matches!(c, b'.' | b'!' | b'?') {
            let next = bytes.get(i + 1).copied();
            let boundary = next.is_none() || next.is_some_and(|b| b.is_ascii_whitespace());
            if boundary {
                let end = i + 1;
                spans.push((start, end));
                let mut j = end;
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if start < bytes.len() {
        spans.push((start, bytes.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_sentence_boundaries() {
        let text = "One. Two! Three? Four.";
        let spans = sentence_spans(text);
        let texts: Vec<&str> = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(texts, vec!["One.", "Two!", "Three?", "Four."]);
    }

    #[test]
    fn chunks_never_exceed_max_chars() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota. Kappa lambda mu.";
        let chunks = sentence(text, 30).unwrap();
        assert!(chunks.iter().all(|c| c.text.len() <= 30));
        for pair in chunks.windows(2) {
            assert!(pair[0].index < pair[1].index);
        }
    }

    #[test]
    fn single_oversized_sentence_is_hard_split() {
        let text = format!("{}.", "word ".repeat(20));
        let chunks = sentence(&text, 25).unwrap();
        assert!(chunks.iter().all(|c| c.text.len() <= 25));
    }
}
