use anyhow::Result;
use futures::future::try_join_all;

use crate::providers::traits::CompletionProvider;
use super::document::InvoiceDocument;

#[derive(Debug, Clone)]
pub struct RankedDocument {
    pub document: InvoiceDocument,
    pub score: f32,
}

/// In-memory similarity index over the invoice corpus, rebuilt from scratch
/// for every query. Ranking always returns the whole corpus ordered by
/// similarity (k = corpus size): the answer prompt needs every document to
/// resolve position-based and aggregate questions, so this is a re-ranking
/// step, not a filter.
pub struct Retriever {
    entries: Vec<(InvoiceDocument, Vec<f32>)>,
}

impl Retriever {
    pub async fn build(
        documents: Vec<InvoiceDocument>,
        provider: &(dyn CompletionProvider + Send + Sync),
    ) -> Result<Self> {
        let embeddings = try_join_all(
            documents
                .iter()
                .map(|doc| provider.generate_embedding(&doc.content)),
        )
        .await?;

        Ok(Self {
            entries: documents.into_iter().zip(embeddings).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Relevance-ordered permutation of the full corpus, most similar first.
    /// Ordering among ties is not guaranteed stable.
    pub fn rank_all(&self, query_embedding: &[f32]) -> Vec<RankedDocument> {
        let mut ranked: Vec<RankedDocument> = self
            .entries
            .iter()
            .map(|(document, embedding)| RankedDocument {
                document: document.clone(),
                score: cosine_similarity(query_embedding, embedding),
            })
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

/// Cosine similarity; mismatched dimensions or a zero-magnitude vector
/// score 0.0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
