// Score fusion for the two retrieval arms
// Pure functions, keyed on content hash so identical content from either
// arm collapses to a single result.

use std::cmp::Ordering;
use std::collections::HashMap;

/// Weighted blend of the two arm scores for one chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    pub combined: f32,
    pub vector: Option<f32>,
    pub text: Option<f32>,
}

/// Blend vector and full-text scores into one ranking.
///
/// Each arm contributes `weight * score`; a chunk found by only one arm
/// simply lacks the other contribution. The result is sorted by combined
/// score descending, with ties broken by content hash ascending so equal
/// scores always rank deterministically.
pub fn fuse(
    vector_hits: &[(String, f32)],
    text_hits: &[(String, f32)],
    vector_weight: f32,
    text_weight: f32,
) -> Vec<(String, FusedScore)> {
    let mut by_hash: HashMap<&str, FusedScore> = HashMap::new();

    for (hash, score) in vector_hits {
        let entry = by_hash.entry(hash).or_insert(FusedScore {
            combined: 0.0,
            vector: None,
            text: None,
        });
        entry.vector = Some(*score);
        entry.combined += vector_weight * score;
    }

    for (hash, score) in text_hits {
        let entry = by_hash.entry(hash).or_insert(FusedScore {
            combined: 0.0,
            vector: None,
            text: None,
        });
        entry.text = Some(*score);
        entry.combined += text_weight * score;
    }

    let mut fused: Vec<(String, FusedScore)> = by_hash
        .into_iter()
        .map(|(hash, score)| (hash.to_string(), score))
        .collect();

    fused.sort_by(|a, b| {
        b.1.combined
            .partial_cmp(&a.1.combined)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    fused
}
