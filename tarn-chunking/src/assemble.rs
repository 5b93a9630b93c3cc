use tarn_common::AppError;

use crate::character::character;
use crate::types::Chunk;

/// Shared window assembly for the `sentence` and `paragraph` strategies:
/// greedily merges consecutive boundary-detected spans into a chunk
/// as long as the running span stays within `max_chars`. A single unit
/// wider than `max_chars` is hard-split via the `character` strategy so the
/// "never exceeds `max_chars`" invariant holds even for one outsized
/// sentence or paragraph.
pub(crate) fn assemble_windows(
    text: &str,
    spans: Vec<(usize, usize)>,
    max_chars: usize,
) -> Result<Vec<Chunk>, AppError> {
    if max_chars == 0 {
        return Err(AppError::Validation("max_chars must be > 0".into()));
    }

    let mut chunks = Vec::new();
    let mut window: Option<(usize, usize)> = None;

    for (s, e) in spans {
        if e <= s {
            continue;
        }
        if e - s > max_chars {
            flush(text, &mut window, &mut chunks);
            for sub in character(&text[s..e], max_chars, 0)? {
                chunks.push(Chunk {
                    index: chunks.len(),
                    start_offset: s + sub.start_offset,
                    end_offset: s + sub.end_offset,
                    text: sub.text,
                    heading_path: None,
                });
            }
            continue;
        }

        window = match window {
            None => Some((s, e)),
            Some((start, _)) if e - start <= max_chars => Some((start, e)),
            Some((start, end)) => {
                chunks.push(Chunk {
                    index: chunks.len(),
                    start_offset: start,
                    end_offset: end,
                    text: text[start..end].to_string(),
                    heading_path: None,
                });
                Some((s, e))
            }
        };
    }
    flush(text, &mut window, &mut chunks);

    Ok(chunks)
}

fn flush(text: &str, window: &mut Option<(usize, usize)>, chunks: &mut Vec<Chunk>) {
    if let Some((start, end)) = window.take() {
        chunks.push(Chunk {
            index: chunks.len(),
            start_offset: start,
            end_offset: end,
            text: text[start..end].to_string(),
            heading_path: None,
        });
    }
}
