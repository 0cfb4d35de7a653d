//! Reciprocal Rank Fusion
//!
//! Merges several ranked lists into one. A chunk at 0-based rank `r` in a
//! list contributes `1 / (r + k)` to its fused score; contributions from
//! every list containing the chunk are summed.

use std::collections::HashMap;

use ragchat_core::{DocumentChunk, FusedChunk};

/// Fuse ranked lists into a single list sorted by descending score.
///
/// Every chunk appearing in at least one input is kept. Ties keep the order
/// in which chunks were first seen (list by list, rank by rank), so the
/// output is deterministic for a given input.
pub fn fuse(lists: &[Vec<DocumentChunk>], k: f64) -> Vec<FusedChunk> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut fused: Vec<FusedChunk> = Vec::new();

    for list in lists {
        for (rank, chunk) in list.iter().enumerate() {
            let contribution = 1.0 / (rank as f64 + k);
            match index.get(chunk.identity()) {
                Some(&slot) => fused[slot].score += contribution,
                None => {
                    index.insert(chunk.identity(), fused.len());
                    fused.push(FusedChunk {
                        chunk: chunk.clone(),
                        score: contribution,
                    });
                }
            }
        }
    }

    // sort_by is stable
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str) -> DocumentChunk {
        DocumentChunk::new(id, format!("content of {}", id))
    }

    fn ids(fused: &[FusedChunk]) -> Vec<&str> {
        fused.iter().map(|f| f.chunk.id.as_str()).collect()
    }

    #[test]
    fn test_fuse_reference_example() {
        let lists = vec![
            vec![chunk("A"), chunk("B"), chunk("C")],
            vec![chunk("B"), chunk("C"), chunk("A")],
        ];

        let fused = fuse(&lists, 1.0);
        assert_eq!(ids(&fused), vec!["B", "A", "C"]);

        // B: 1/2 + 1/1, A: 1/1 + 1/3, C: 1/3 + 1/2
        assert!((fused[0].score - 1.5).abs() < 1e-9);
        assert!((fused[1].score - 4.0 / 3.0).abs() < 1e-9);
        assert!((fused[2].score - 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_keeps_union() {
        let lists = vec![
            vec![chunk("A"), chunk("B")],
            vec![chunk("C")],
            vec![],
        ];

        let fused = fuse(&lists, 60.0);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_fuse_invariant_under_list_permutation() {
        let a = vec![chunk("A"), chunk("B"), chunk("C"), chunk("D")];
        let b = vec![chunk("D"), chunk("A"), chunk("E")];
        let c = vec![chunk("C"), chunk("E")];

        let forward = fuse(&[a.clone(), b.clone(), c.clone()], 60.0);
        let backward = fuse(&[c, b, a], 60.0);

        let score_of = |fused: &[FusedChunk], id: &str| {
            fused
                .iter()
                .find(|f| f.chunk.id == id)
                .map(|f| f.score)
                .unwrap()
        };

        assert_eq!(forward.len(), backward.len());
        for id in ["A", "B", "C", "D", "E"] {
            assert!((score_of(&forward, id) - score_of(&backward, id)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fuse_ties_keep_first_seen_order() {
        let lists = vec![vec![chunk("X")], vec![chunk("Y")], vec![chunk("Z")]];
        let fused = fuse(&lists, 60.0);
        assert_eq!(ids(&fused), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_fuse_merges_anonymous_chunks_by_content() {
        let lists = vec![
            vec![DocumentChunk::new("", "same text")],
            vec![DocumentChunk::new("", "same text")],
        ];

        let fused = fuse(&lists, 60.0);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 2.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_fuse_empty_input() {
        assert!(fuse(&[], 60.0).is_empty());
    }
}
