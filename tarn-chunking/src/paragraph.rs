use tarn_common::AppError;

use crate::assemble::assemble_windows;
use crate::types::Chunk;

/// `paragraph(max_chars)`: splits on blank lines, then merges
/// consecutive paragraphs into windows up to `max_chars`.
pub fn paragraph(text: &str, max_chars: usize) -> Result<Vec<Chunk>, AppError> {
    assemble_windows(text, paragraph_spans(text), max_chars)
}

fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'\n' && bytes.get(i + 1) == Some(&b'\n') {
            spans.push((start, i));
            let mut j = i;
            while j < bytes.len() && bytes[j] == b'\n' {
                j += 1;
            }
            start = j;
            i = j;
            continue;
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
    fn splits_on_blank_lines() {
        let text = "Para one.\n\nPara two.\n\nPara three.";
        let spans = paragraph_spans(text);
        let texts: Vec<&str> = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(texts, vec!["Para one.", "Para two.", "Para three."]);
    }

    #[test]
    fn merges_paragraphs_until_max_chars() {
        let text = "Short one.\n\nShort two.\n\nShort three.\n\nShort four.";
        let chunks = paragraph(text, 25).unwrap();
        assert!(chunks.iter().all(|c| c.text.len() <= 25));
        assert!(chunks.len() > 1);
    }
}
