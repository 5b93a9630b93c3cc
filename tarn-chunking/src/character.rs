use tarn_common::AppError;
use text_splitter::{ChunkConfig, TextSplitter};

use crate::types::Chunk;

/// `character(size, overlap)`: fixed-width windows over the text by
/// character count, the same `TextSplitter`/`ChunkConfig` pairing the
/// teacher's `prepare_chunks` uses for token budgets, swapped to the
/// splitter's default character sizer instead of a tokenizer.
pub fn character(text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>, AppError> {
    if size == 0 {
        return Err(AppError::Validation("character chunk size must be > 0".into()));
    }
    if overlap >= size {
        return Err(AppError::Validation(format!(
            "character chunk overlap ({overlap}) must be smaller than size ({size})"
        )));
    }

    let config = ChunkConfig::new(size)
        .with_overlap(overlap)
        .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?;
    let splitter = TextSplitter::new(config);

    let chunks = splitter
        .chunk_indices(text)
        .enumerate()
        .map(|(index, (start, slice))| Chunk {
            index,
            start_offset: start,
            end_offset: start + slice.len(),
            text: slice.to_string(),
            heading_path: None,
        })
        .collect();

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_monotonic_and_cover_the_text() {
        let text = "a".repeat(250);
        let chunks = character(&text, 100, 20).unwrap();
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[0].index < pair[1].index);
            assert!(pair[0].start_offset <= pair[1].start_offset);
        }
        assert_eq!(chunks.last().unwrap().end_offset, text.len());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = character("hello world", 10, 10).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
