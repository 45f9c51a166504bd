//! Multi-factor reranking of fused results.
//!
//! Folds in two signals the first-stage retrievers cannot see, recency and a
//! status-based feedback heuristic, next to the normalized similarity, BM25,
//! and centrality scores.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use helpdesk_models::retrieval::{HybridResult, RankedResult, RerankScores};

/// Factor weights, stored normalized to sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct RerankWeights {
    pub similarity: f32,
    pub bm25: f32,
    pub centrality: f32,
    pub recency: f32,
    pub feedback: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            similarity: 0.40,
            bm25: 0.20,
            centrality: 0.15,
            recency: 0.15,
            feedback: 0.10,
        }
    }
}

pub struct Reranker {
    weights: RerankWeights,
}

impl Reranker {
    pub fn new() -> Self {
        Self {
            weights: RerankWeights::default(),
        }
    }

    pub fn weights(&self) -> RerankWeights {
        self.weights
    }

    /// Replace the factor weights; they are renormalized to sum to 1.
    pub fn set_weights(
        &mut self,
        similarity: f32,
        bm25: f32,
        centrality: f32,
        recency: f32,
        feedback: f32,
    ) {
        let total = similarity + bm25 + centrality + recency + feedback;
        if total <= 0.0 {
            self.weights = RerankWeights::default();
            return;
        }
        self.weights = RerankWeights {
            similarity: similarity / total,
            bm25: bm25 / total,
            centrality: centrality / total,
            recency: recency / total,
            feedback: feedback / total,
        };
    }

    /// Recompute the final order from the five factors and return the top n.
    pub fn rerank(&self, results: Vec<HybridResult>, top_n: usize) -> Vec<RankedResult> {
        debug!("Reranking {} results...", results.len());

        let mut ranked: Vec<RankedResult> = results
            .into_iter()
            .map(|result| {
                let rerank_scores = RerankScores {
                    similarity: result.scores.vector.unwrap_or(0.0),
                    bm25: result.scores.bm25.unwrap_or(0.0),
                    centrality: result.scores.graph.unwrap_or(0.0),
                    recency: recency_score(&result.metadata),
                    feedback: feedback_score(&result.metadata),
                };

                let final_score = rerank_scores.similarity * self.weights.similarity
                    + rerank_scores.bm25 * self.weights.bm25
                    + rerank_scores.centrality * self.weights.centrality
                    + rerank_scores.recency * self.weights.recency
                    + rerank_scores.feedback * self.weights.feedback;

                RankedResult {
                    id: result.id,
                    document: result.document,
                    metadata: result.metadata,
                    collection: result.collection,
                    scores: result.scores,
                    combined_score: result.combined_score,
                    rerank_scores,
                    final_score,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_n);

        debug!("Reranking complete, returning top {} results", ranked.len());
        ranked
    }
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new()
    }
}

/// Recency factor: 1.0 for a document updated now, linearly decaying to 0.0
/// at 365 days old. Missing or unparseable dates score neutral 0.5.
fn recency_score(metadata: &Map<String, Value>) -> f32 {
    let date_value = ["updated_at", "created_at", "date"]
        .iter()
        .find_map(|field| metadata.get(*field).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty());

    let Some(raw) = date_value else {
        return 0.5;
    };
    let Some(parsed) = parse_datetime(raw) else {
        return 0.5;
    };

    let days_ago = (Utc::now() - parsed).num_days();
    if days_ago < 0 {
        1.0
    } else if days_ago > 365 {
        0.0
    } else {
        1.0 - days_ago as f32 / 365.0
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Feedback placeholder: resolved tickets make better sources than open ones.
/// Real interaction signals are out of scope; status is the stand-in.
fn feedback_score(metadata: &Map<String, Value>) -> f32 {
    let status = metadata
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_lowercase();

    match status.as_str() {
        "closed" | "resolved" | "gesloten" | "opgelost" => 0.8,
        "in progress" | "in_progress" | "in behandeling" => 0.5,
        _ => 0.3,
    }
}
