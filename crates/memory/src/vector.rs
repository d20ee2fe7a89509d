//! Vector similarity and hybrid ranking utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Keyword overlap scoring
//! - Reciprocal Rank Fusion (RRF) for merging ranked result lists

use std::collections::HashMap;

use ragrelay_core::document::Document;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank documents by cosine similarity to a query embedding.
///
/// Documents without an embedding or below `min_score` are dropped; the
/// result is sorted by descending similarity with `similarity` filled in.
pub fn vector_search<'a, I>(docs: I, query_embedding: &[f32], limit: usize, min_score: f32) -> Vec<Document>
where
    I: IntoIterator<Item = (&'a Document, Option<&'a [f32]>)>,
{
    let mut scored: Vec<Document> = docs
        .into_iter()
        .filter_map(|(doc, embedding)| {
            let sim = cosine_similarity(embedding?, query_embedding);
            (sim >= min_score).then(|| {
                let mut d = doc.clone();
                d.similarity = sim;
                d
            })
        })
        .collect();

    sort_by_similarity(&mut scored);
    scored.truncate(limit);
    scored
}

/// Rank documents by the share of query terms found in their text.
pub fn keyword_search<'a, I>(docs: I, question: &str, limit: usize) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    let terms = terms(question);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<Document> = docs
        .into_iter()
        .filter_map(|doc| {
            let haystack =
                format!("{} {} {}", doc.title, doc.heading, doc.content).to_lowercase();
            let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            (hits > 0).then(|| {
                let mut d = doc.clone();
                d.similarity = hits as f32 / terms.len() as f32;
                d
            })
        })
        .collect();

    sort_by_similarity(&mut scored);
    scored.truncate(limit);
    scored
}

fn terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect();
    out.sort();
    out.dedup();
    out
}

fn sort_by_similarity(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Reciprocal Rank Fusion (RRF): merge two ranked result lists.
///
/// Each document's fused rank = sum of 1/(k + rank) across both lists.
/// Standard value is k=60. The returned documents keep the best
/// `similarity` they had in either list, ordered by fused rank.
pub fn reciprocal_rank_fusion(
    keyword_results: &[Document],
    vector_results: &[Document],
    k: u32,
    limit: usize,
) -> Vec<Document> {
    let k = k as f32;

    // Map: id → (rrf_score, best_document)
    let mut scores: HashMap<String, (f32, Document)> = HashMap::new();

    for list in [keyword_results, vector_results] {
        for (rank, doc) in list.iter().enumerate() {
            let rrf_score = 1.0 / (k + rank as f32 + 1.0);
            scores
                .entry(doc.id.clone())
                .and_modify(|(score, best)| {
                    *score += rrf_score;
                    if doc.similarity > best.similarity {
                        best.similarity = doc.similarity;
                    }
                })
                .or_insert_with(|| (rrf_score, doc.clone()));
        }
    }

    let mut fused: Vec<(f32, Document)> = scores.into_values().collect();
    fused.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(limit);
    fused.into_iter().map(|(_, d)| d).collect()
}
