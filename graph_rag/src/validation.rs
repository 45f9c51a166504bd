//! Validation metrics for the extraction pipeline.
//!
//! Human reviewers mark sampled extractions correct or incorrect in the
//! `entity_validations` and `relationship_validations` tables; this module
//! turns those marks into precision / recall / F1 and a confidence-threshold
//! recommendation.
//!
//! False negatives are approximated: a sample marked incorrect that carries a
//! corrected target type is counted as a missed extraction. That undercounts
//! real misses (nothing is sampled for text the extractor never flagged), but
//! it is the best signal the review workflow produces, so the approximation
//! is kept deliberately.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::errors::GraphResult;

/// One reviewed extraction sample.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ValidationSample {
    pub entity_type: String,
    pub confidence: f64,
    pub is_correct: Option<bool>,
    pub corrected_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeAccuracy {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMetrics {
    pub total_validated: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
    pub by_type: HashMap<String, TypeAccuracy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub threshold: f64,
    pub precision: f64,
    pub coverage: f64,
    pub entities_kept: usize,
    pub entities_filtered: usize,
    pub f1: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub points: Vec<ThresholdPoint>,
    pub current_average_confidence: f64,
    pub recommended_threshold: Option<f64>,
    pub total_validations: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationProgress {
    pub entities_total: i64,
    pub entities_validated: i64,
    pub relationships_total: i64,
    pub relationships_validated: i64,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub entities: ExtractionMetrics,
    pub relationships: ExtractionMetrics,
    pub thresholds: ThresholdReport,
    pub progress: ValidationProgress,
}

/// Compute precision / recall / F1 from reviewed samples.
pub fn compute_metrics(samples: &[ValidationSample]) -> ExtractionMetrics {
    let reviewed: Vec<&ValidationSample> =
        samples.iter().filter(|s| s.is_correct.is_some()).collect();

    if reviewed.is_empty() {
        return ExtractionMetrics::default();
    }

    let true_positives = reviewed.iter().filter(|s| s.is_correct == Some(true)).count();
    let false_positives = reviewed.iter().filter(|s| s.is_correct == Some(false)).count();
    // FN proxy: incorrect with a corrected target type.
    let false_negatives = reviewed
        .iter()
        .filter(|s| s.is_correct == Some(false) && s.corrected_type.is_some())
        .count();

    let precision = ratio(true_positives, true_positives + false_positives);
    let recall = ratio(true_positives, true_positives + false_negatives);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let mut by_type: HashMap<String, TypeAccuracy> = HashMap::new();
    for sample in &reviewed {
        let entry = by_type.entry(sample.entity_type.clone()).or_default();
        entry.total += 1;
        if sample.is_correct == Some(true) {
            entry.correct += 1;
        } else {
            entry.incorrect += 1;
        }
    }
    for entry in by_type.values_mut() {
        entry.accuracy = ratio(entry.correct, entry.total);
    }

    ExtractionMetrics {
        total_validated: reviewed.len(),
        true_positives,
        false_positives,
        false_negatives,
        precision,
        recall,
        f1_score,
        accuracy: ratio(true_positives, reviewed.len()),
        by_type,
    }
}

/// Sweep confidence thresholds and recommend the one with the best balance
/// between precision and coverage.
pub fn analyze_thresholds(samples: &[ValidationSample]) -> ThresholdReport {
    let reviewed: Vec<&ValidationSample> =
        samples.iter().filter(|s| s.is_correct.is_some()).collect();

    let mut points = Vec::new();
    let mut best: Option<(f64, f64)> = None; // (threshold, f1)

    for threshold in [0.5, 0.6, 0.7, 0.75, 0.8, 0.85, 0.9, 0.95] {
        let kept: Vec<&&ValidationSample> = reviewed
            .iter()
            .filter(|s| s.confidence >= threshold)
            .collect();
        if kept.is_empty() {
            continue;
        }

        let tp = kept.iter().filter(|s| s.is_correct == Some(true)).count();
        let fp = kept.iter().filter(|s| s.is_correct == Some(false)).count();
        let precision = ratio(tp, tp + fp);
        let coverage = ratio(kept.len(), reviewed.len());
        let f1 = if precision + coverage > 0.0 {
            2.0 * precision * coverage / (precision + coverage)
        } else {
            0.0
        };

        if best.map_or(true, |(_, best_f1)| f1 > best_f1) {
            best = Some((threshold, f1));
        }

        points.push(ThresholdPoint {
            threshold,
            precision,
            coverage,
            entities_kept: kept.len(),
            entities_filtered: reviewed.len() - kept.len(),
            f1,
        });
    }

    let current_average_confidence = if reviewed.is_empty() {
        0.0
    } else {
        reviewed.iter().map(|s| s.confidence).sum::<f64>() / reviewed.len() as f64
    };

    ThresholdReport {
        points,
        current_average_confidence,
        recommended_threshold: best.map(|(t, _)| t),
        total_validations: reviewed.len(),
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Metrics calculator backed by the validation tables.
pub struct ValidationMetrics {
    pool: PgPool,
}

impl ValidationMetrics {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn entity_metrics(
        &self,
        entity_type: Option<&str>,
    ) -> GraphResult<ExtractionMetrics> {
        let samples = self.fetch_entity_samples(entity_type).await?;
        if samples.is_empty() {
            warn!("No validated entities found");
        }
        let metrics = compute_metrics(&samples);
        info!(
            "Entity metrics: precision={:.2} recall={:.2} f1={:.2}",
            metrics.precision, metrics.recall, metrics.f1_score
        );
        Ok(metrics)
    }

    pub async fn relationship_metrics(
        &self,
        edge_type: Option<&str>,
    ) -> GraphResult<ExtractionMetrics> {
        let samples: Vec<ValidationSample> = match edge_type {
            Some(edge_type) => {
                sqlx::query_as(
                    r#"
                    SELECT edge_type AS entity_type, confidence, is_correct,
                           corrected_target AS corrected_type
                    FROM relationship_validations
                    WHERE is_correct IS NOT NULL AND edge_type = $1
                    "#,
                )
                .bind(edge_type)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT edge_type AS entity_type, confidence, is_correct,
                           corrected_target AS corrected_type
                    FROM relationship_validations
                    WHERE is_correct IS NOT NULL
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(compute_metrics(&samples))
    }

    pub async fn threshold_analysis(
        &self,
        entity_type: Option<&str>,
    ) -> GraphResult<ThresholdReport> {
        let samples = self.fetch_entity_samples(entity_type).await?;
        Ok(analyze_thresholds(&samples))
    }

    pub async fn progress(&self) -> GraphResult<ValidationProgress> {
        let (entities_total, entities_validated): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE is_correct IS NOT NULL)
            FROM entity_validations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let (relationships_total, relationships_validated): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE is_correct IS NOT NULL)
            FROM relationship_validations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let total = entities_total + relationships_total;
        let validated = entities_validated + relationships_validated;
        Ok(ValidationProgress {
            entities_total,
            entities_validated,
            relationships_total,
            relationships_validated,
            completion_percentage: if total > 0 {
                validated as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        })
    }

    pub async fn full_report(&self) -> GraphResult<ValidationReport> {
        Ok(ValidationReport {
            entities: self.entity_metrics(None).await?,
            relationships: self.relationship_metrics(None).await?,
            thresholds: self.threshold_analysis(None).await?,
            progress: self.progress().await?,
        })
    }

    async fn fetch_entity_samples(
        &self,
        entity_type: Option<&str>,
    ) -> GraphResult<Vec<ValidationSample>> {
        let samples = match entity_type {
            Some(entity_type) => {
                sqlx::query_as(
                    r#"
                    SELECT entity_type, confidence, is_correct, corrected_type
                    FROM entity_validations
                    WHERE is_correct IS NOT NULL AND entity_type = $1
                    "#,
                )
                .bind(entity_type)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT entity_type, confidence, is_correct, corrected_type
                    FROM entity_validations
                    WHERE is_correct IS NOT NULL
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(samples)
    }
}
