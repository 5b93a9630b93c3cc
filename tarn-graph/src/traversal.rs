use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};

use tarn_common::AppError;

use crate::store::GraphStore;
use crate::types::{EdgeFilter, GraphRelationship, Subgraph};

/// `ExpandGraph`: breadth-first from `seeds` up to `depth` hops. When
/// `query_embedding` is given, the frontier becomes a priority queue ordered
/// by cosine similarity between the query vector and each edge's embedding
/// (descending), ties broken by edge id for determinism. Otherwise it is
/// plain BFS order.
pub async fn expand_graph(
    store: &GraphStore,
    ctx: &tarn_common::TenantContext,
    seeds: &[String],
    depth: usize,
    edge_filter: Option<&EdgeFilter>,
    query_embedding: Option<&[f32]>,
) -> Result<Subgraph, AppError> {
    let default_filter = EdgeFilter::default();
    let filter = edge_filter.unwrap_or(&default_filter);

    let mut visited_objects: HashSet<String> = seeds.iter().cloned().collect();
    let mut visited_edges: HashSet<String> = HashSet::new();
    let mut relationships: Vec<GraphRelationship> = Vec::new();

    match query_embedding {
        Some(query) => {
            let mut heap: BinaryHeap<ScoredFrontierEdge> = BinaryHeap::new();
            for seed in seeds {
                seed_frontier(store, ctx, seed, 1, depth, filter, query, &mut heap).await?;
            }
            while let Some(ScoredFrontierEdge { edge, hop, .. }) = heap.pop() {
                if !visited_edges.insert(edge.id.clone()) {
                    continue;
                }
                let next_canonical = other_side(&edge, &visited_objects);
                relationships.push(edge.clone());
                if let Some(next) = next_canonical {
                    if visited_objects.insert(next.clone()) && hop < depth {
                        seed_frontier(store, ctx, &next, hop + 1, depth, filter, query, &mut heap)
                            .await?;
                    }
                }
            }
        }
        None => {
            let mut queue: VecDeque<(String, usize)> =
                seeds.iter().cloned().map(|s| (s, 0)).collect();
            while let Some((canonical_id, hop)) = queue.pop_front() {
                if hop >= depth {
                    continue;
                }
                let edges = store.relationships_touching(ctx, &canonical_id).await?;
                for edge in edges {
                    if !filter.allows(&edge.rel_type) || !visited_edges.insert(edge.id.clone()) {
                        continue;
                    }
                    let next = if edge.source_canonical_id == canonical_id {
                        edge.target_canonical_id.clone()
                    } else {
                        edge.source_canonical_id.clone()
                    };
                    relationships.push(edge);
                    if visited_objects.insert(next.clone()) {
                        queue.push_back((next, hop + 1));
                    }
                }
            }
        }
    }

    let mut objects = Vec::new();
    for canonical_id in &visited_objects {
        if let Some(object) = store.get_current_object(ctx, canonical_id).await? {
            objects.push(object);
        }
    }

    Ok(Subgraph { objects, relationships })
}

#[allow(clippy::too_many_arguments)]
async fn seed_frontier(
    store: &GraphStore,
    ctx: &tarn_common::TenantContext,
    canonical_id: &str,
    hop: usize,
    depth: usize,
    filter: &EdgeFilter,
    query_embedding: &[f32],
    heap: &mut BinaryHeap<ScoredFrontierEdge>,
) -> Result<(), AppError> {
    if hop > depth {
        return Ok(());
    }
    let edges = store.relationships_touching(ctx, canonical_id).await?;
    for edge in edges {
        if !filter.allows(&edge.rel_type) {
            continue;
        }
        let score = edge
            .embedding
            .as_deref()
            .map(|v| cosine_similarity(query_embedding, v))
            .unwrap_or(f32::NEG_INFINITY);
        heap.push(ScoredFrontierEdge { score, edge, hop });
    }
    Ok(())
}

fn other_side(edge: &GraphRelationship, visited: &HashSet<String>) -> Option<String> {
    if !visited.contains(&edge.target_canonical_id) {
        Some(edge.target_canonical_id.clone())
    } else if !visited.contains(&edge.source_canonical_id) {
        Some(edge.source_canonical_id.clone())
    } else {
        None
    }
}

struct ScoredFrontierEdge {
    score: f32,
    edge: GraphRelationship,
    hop: usize,
}

impl PartialEq for ScoredFrontierEdge {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.edge.id == other.edge.id
    }
}
impl Eq for ScoredFrontierEdge {}

impl PartialOrd for ScoredFrontierEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredFrontierEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.edge.id.cmp(&other.edge.id))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn scored_frontier_orders_by_score_then_edge_id() {
        use chrono::Utc;
        use tarn_common::PropertyMap;

        let make_edge = |id: &str| GraphRelationship {
            id: id.to_string(),
            project_id: "p1".into(),
            rel_type: "knows".into(),
            source_canonical_id: "a".into(),
            target_canonical_id: "b".into(),
            properties: PropertyMap::new(),
            triplet_text: String::new(),
            embedding: None,
            valid_at: Utc::now(),
            invalid_at: None,
            created_at: Utc::now(),
        };

        let mut heap = BinaryHeap::new();
        heap.push(ScoredFrontierEdge { score: 0.5, edge: make_edge("z"), hop: 1 });
        heap.push(ScoredFrontierEdge { score: 0.9, edge: make_edge("a"), hop: 1 });
        heap.push(ScoredFrontierEdge { score: 0.9, edge: make_edge("b"), hop: 1 });

        let first = heap.pop().unwrap();
        assert_eq!(first.score, 0.9);
        assert_eq!(first.edge.id, "b", "ties broken by edge id, higher id pops first from max-heap");
    }
}
