use tarn_common::AppError;
use text_splitter::{ChunkConfig, MarkdownSplitter};

use crate::types::Chunk;

struct Heading {
    offset: usize,
    level: usize,
    text: String,
}

/// `markdown`: parses the heading tree and prefixes each chunk with
/// its heading path (`"H1 > H2 > H3: text…"`); contiguous pipe-table blocks
/// are extracted as their own chunk with the header row preserved, rather
/// than being split mid-table by the prose splitter.
pub fn markdown(text: &str, max_chars: usize) -> Result<Vec<Chunk>, AppError> {
    if max_chars == 0 {
        return Err(AppError::Validation("max_chars must be > 0".into()));
    }

    let headings = collect_headings(text);
    let table_spans = collect_table_spans(text);

    let mut raw_chunks: Vec<(usize, usize, String)> = Vec::new();

    let mut cursor = 0usize;
    for &(table_start, table_end) in &table_spans {
        if table_start > cursor {
            raw_chunks.extend(split_prose(&text[cursor..table_start], cursor, max_chars)?);
        }
        raw_chunks.push((table_start, table_end, text[table_start..table_end].to_string()));
        cursor = table_end;
    }
    if cursor < text.len() {
        raw_chunks.extend(split_prose(&text[cursor..], cursor, max_chars)?);
    }

    raw_chunks.sort_by_key(|(start, ..)| *start);

    let chunks = raw_chunks
        .into_iter()
        .enumerate()
        .map(|(index, (start, end, body))| {
            let path = heading_path_at(&headings, start);
            let text = match &path {
                Some(path) => format!("{path}: {body}"),
                None => body,
            };
            Chunk {
                index,
                start_offset: start,
                end_offset: end,
                text,
                heading_path: path,
            }
        })
        .collect();

    Ok(chunks)
}

fn split_prose(
    segment: &str,
    base_offset: usize,
    max_chars: usize,
) -> Result<Vec<(usize, usize, String)>, AppError> {
    if segment.trim().is_empty() {
        return Ok(Vec::new());
    }
    let config = ChunkConfig::new(max_chars);
    let splitter = MarkdownSplitter::new(config);
    Ok(splitter
        .chunk_indices(segment)
        .map(|(start, slice)| (base_offset + start, base_offset + start + slice.len(), slice.to_string()))
        .collect())
}

fn collect_headings(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n');
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        if hashes > 0 && hashes <= 6 && trimmed.as_bytes().get(hashes) == Some(&b' ') {
            headings.push(Heading {
                offset,
                level: hashes,
                text: trimmed[hashes..].trim().to_string(),
            });
        }
        offset += line.len();
    }
    headings
}

fn heading_path_at(headings: &[Heading], offset: usize) -> Option<String> {
    let mut stack: Vec<(usize, &str)> = Vec::new();
    let mut last: Option<Vec<(usize, &str)>> = None;

    for heading in headings {
        if heading.offset > offset {
            break;
        }
        stack.retain(|&(level, _)| level < heading.level);
        stack.push((heading.level, heading.text.as_str()));
        last = Some(stack.clone());
    }

    last.map(|path| {
        path.into_iter()
            .map(|(_, text)| text.to_string())
            .collect::<Vec<_>>()
            .join(" > ")
    })
}

fn collect_table_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0usize;
    let mut table_start: Option<usize> = None;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with('|') {
            if table_start.is_none() {
                table_start = Some(offset);
            }
        } else if let Some(start) = table_start.take() {
            spans.push((start, offset));
        }
        offset += line.len();
    }
    if let Some(start) = table_start {
        spans.push((start, text.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_path_tracks_nesting_by_offset() {
        let headings = vec![
            Heading { offset: 0, level: 1, text: "Intro".into() },
            Heading { offset: 40, level: 2, text: "Details".into() },
            Heading { offset: 100, level: 2, text: "More".into() },
            Heading { offset: 150, level: 1, text: "Conclusion".into() },
        ];
        assert_eq!(heading_path_at(&headings, 10).as_deref(), Some("Intro"));
        assert_eq!(heading_path_at(&headings, 50).as_deref(), Some("Intro > Details"));
        assert_eq!(heading_path_at(&headings, 120).as_deref(), Some("Intro > More"));
        assert_eq!(heading_path_at(&headings, 200).as_deref(), Some("Conclusion"));
    }

    #[test]
    fn chunks_are_prefixed_with_heading_path() {
        let text = "# Intro\n\nSome text about the project.\n\n## Details\n\nMore specific text here.\n";
        let chunks = markdown(text, 30).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.heading_path.is_some());
            let path = chunk.heading_path.as_ref().unwrap();
            assert!(chunk.text.starts_with(&format!("{path}:")));
        }
        assert!(chunks.iter().any(|c| c.heading_path.as_deref() == Some("Intro")));
    }

    #[test]
    fn table_is_extracted_as_single_chunk_with_header_preserved() {
        let text = "# Data\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\nAfter table text.";
        let chunks = markdown(text, 200).unwrap();
        let table_chunk = chunks
            .iter()
            .find(|c| c.text.contains("| a | b |"))
            .expect("table chunk present");
        assert!(table_chunk.text.contains("|---|---|"));
        assert!(table_chunk.text.contains("| 1 | 2 |"));
    }

    #[test]
    fn offsets_are_monotonic_by_index() {
        let text = "# A\n\nFirst paragraph.\n\n## B\n\nSecond paragraph.\n";
        let chunks = markdown(text, 200).unwrap();
        for pair in chunks.windows(2) {
            assert!(pair[0].index < pair[1].index);
            assert!(pair[0].start_offset <= pair[1].start_offset);
        }
    }
}
