use serde::{Deserialize, Serialize};

/// A single chunk. `(start_offset, end_offset)` index byte offsets
/// into the source text; offsets are monotonic in `index`, and across a
/// document the union of `[start_offset, end_offset)` spans covers the
/// source text (adjacent chunks may overlap, per strategy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    /// Set only by the `markdown` strategy: the heading path the chunk sits
    /// under (`"H1 > H2 > H3"`).
    pub heading_path: Option<String>,
}
