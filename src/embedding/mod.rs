//! Embedding adapter: deterministic candidate serialization plus similarity
//! utilities over whatever vectors the embedding collaborator returns.
//!
//! The adapter's only contract is that identical candidate content produces
//! identical text; the vector itself is an opaque passthrough from the
//! [`EmbeddingProvider`](crate::collab::EmbeddingProvider).

use tracing::debug;

use crate::candidate::{CandidatePool, StrategyCandidate};
use crate::collab::EmbeddingProvider;
use crate::error::CollaboratorResult;

/// Serialize a candidate into the text handed to the embedding service.
///
/// Concatenates title, timeline, resources, then per step the action,
/// outcome, prerequisites, and risks, and finally one `dimension: score`
/// line per alignment entry. `alignment_scores` is a `BTreeMap`, so the
/// output is deterministic for identical content.
pub fn candidate_text(candidate: &StrategyCandidate) -> String {
    let mut parts = Vec::new();

    parts.push(candidate.title.clone());
    parts.push(candidate.estimated_timeline.clone());
    parts.push(candidate.resource_requirements.join(" "));

    for step in &candidate.steps {
        parts.push(step.action.clone());
        parts.push(step.outcome.clone());
        parts.push(step.prerequisites.join(" "));
        parts.push(step.risks.join(" "));
    }

    for (dimension, score) in &candidate.alignment_scores {
        parts.push(format!("{}: {}", dimension, score));
    }

    parts.retain(|p| !p.is_empty());
    parts.join("\n")
}

/// Embed every candidate in the pool, writing vectors into metadata.
pub async fn embed_pool(
    provider: &dyn EmbeddingProvider,
    pool: &mut CandidatePool,
) -> CollaboratorResult<()> {
    let texts: Vec<String> = pool.iter().map(|p| candidate_text(&p.candidate)).collect();
    let vectors = provider.embed(&texts).await?;

    debug!(candidates = pool.len(), "Embedded candidate pool");

    for (pooled, vector) in pool.iter_mut().zip(vectors) {
        pooled.meta.embedding = Some(vector);
    }
    Ok(())
}

/// Cosine similarity between two vectors; 0.0 when either has zero norm.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Indices and similarities of the `k` candidates most similar to
/// `index`, by cosine similarity, excluding the candidate itself.
/// Candidates without an embedding are skipped.
pub fn top_k_similar(pool: &CandidatePool, index: usize, k: usize) -> Vec<(usize, f64)> {
    let Some(anchor) = pool.get(index).and_then(|p| p.meta.embedding.as_ref()) else {
        return Vec::new();
    };

    let mut scored: Vec<(usize, f64)> = pool
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .filter_map(|(i, p)| {
            p.meta
                .embedding
                .as_ref()
                .map(|e| (i, cosine_similarity(anchor, e)))
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{CandidateMetadata, PlanStep};

    fn sample_candidate() -> StrategyCandidate {
        StrategyCandidate::new(
            "Expansion plan",
            vec![PlanStep::new("Survey the market", "Market report ready")
                .with_prerequisites(vec!["Budget approved".to_string()])
                .with_risks(vec!["Stale data".to_string()])],
        )
        .with_alignment("feasibility", 7.5)
        .with_alignment("coherence", 8.0)
        .with_timeline("2 quarters")
        .with_resources(vec!["analyst".to_string()])
    }

    #[test]
    fn test_candidate_text_deterministic() {
        let a = candidate_text(&sample_candidate());
        let b = candidate_text(&sample_candidate());
        assert_eq!(a, b);
    }

    #[test]
    fn test_candidate_text_contents() {
        let text = candidate_text(&sample_candidate());
        assert!(text.contains("Expansion plan"));
        assert!(text.contains("2 quarters"));
        assert!(text.contains("Survey the market"));
        assert!(text.contains("Budget approved"));
        assert!(text.contains("Stale data"));
        // Alignment entries appear in sorted dimension order
        let coherence_pos = text.find("coherence: 8").unwrap();
        let feasibility_pos = text.find("feasibility: 7.5").unwrap();
        assert!(coherence_pos < feasibility_pos);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_top_k_excludes_self() {
        let mut pool = CandidatePool::new();
        for (i, vector) in [
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.0, 1.0],
        ]
        .into_iter()
        .enumerate()
        {
            let mut meta = CandidateMetadata::new(i, 0.7);
            meta.embedding = Some(vector);
            pool.push(sample_candidate(), meta);
        }

        let nearest = top_k_similar(&pool, 0, 2);
        assert_eq!(nearest.len(), 2);
        assert_eq!(nearest[0].0, 1);
        assert!(nearest.iter().all(|(i, _)| *i != 0));
    }

    #[tokio::test]
    async fn test_embed_pool_populates_metadata() {
        use crate::collab::fixed::HashEmbedder;

        let mut pool = CandidatePool::from_candidates(
            vec![sample_candidate(), sample_candidate()],
            0.7,
        );
        let embedder = HashEmbedder::new(16);
        embed_pool(&embedder, &mut pool).await.unwrap();

        assert_eq!(pool.embedded_indices().len(), 2);
        // Identical content embeds identically
        let a = pool.get(0).unwrap().meta.embedding.clone().unwrap();
        let b = pool.get(1).unwrap().meta.embedding.clone().unwrap();
        assert_eq!(a, b);
    }
}
