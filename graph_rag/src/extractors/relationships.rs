//! Relationship extraction: turns ticket, CI, and KB facts plus extracted
//! entities into typed, confidence-scored graph edges.
//!
//! Confidence follows the source of the relationship: direct foreign keys and
//! structured fields are 1.0, text extraction 0.85, keyword inference 0.70,
//! and SIMILAR_TO carries the cosine score itself (accepted at >= 0.75).

use serde_json::json;
use tracing::warn;

use helpdesk_models::graph::{
    node_id, EdgeType, GraphEdge, CONFIDENCE_DIRECT, CONFIDENCE_INFERRED, CONFIDENCE_PATTERN,
    SIMILARITY_THRESHOLD,
};

use super::entities::{EntityMap, EntityType};

/// Link between a ticket and a configuration item.
#[derive(Debug, Clone)]
pub struct CiLink {
    pub ci_id: i64,
    pub impact_level: Option<String>,
    /// True when the link was pulled out of free text instead of the link
    /// table; lowers the edge confidence to 0.85.
    pub from_text: bool,
}

/// The slice of a ticket row the relationship extractor needs.
#[derive(Debug, Clone, Default)]
pub struct TicketFacts {
    pub ticket_id: i64,
    pub user_id: Option<i64>,
    pub assigned_to: Option<i64>,
    pub category: Option<String>,
    pub status: String,
    pub resolution: Option<String>,
    pub created_at: Option<String>,
    pub related_cis: Vec<CiLink>,
}

#[derive(Debug, Clone, Default)]
pub struct CiFacts {
    pub ci_id: i64,
    pub location: Option<String>,
    pub department: Option<String>,
    pub assigned_user_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct KbFacts {
    pub kb_id: i64,
    pub author_id: Option<i64>,
    pub category: Option<String>,
    pub created_at: Option<String>,
}

pub struct RelationshipExtractor;

impl RelationshipExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Node id for an extracted entity: `{type}_{slug}`.
    pub fn entity_node_id(entity_type: EntityType, text: &str) -> String {
        node_id(entity_type.as_str(), text)
    }

    /// All edges derived from one ticket and its extracted entities.
    pub fn ticket_edges(&self, facts: &TicketFacts, entities: &EntityMap) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        let ticket_node = format!("ticket_{}", facts.ticket_id);

        if let Some(user_id) = facts.user_id {
            let mut edge = GraphEdge::new(
                &ticket_node,
                format!("user_{}", user_id),
                EdgeType::CreatedBy,
                CONFIDENCE_DIRECT,
            );
            if let Some(created_at) = &facts.created_at {
                edge = edge.with_property("created_at", json!(created_at));
            }
            edges.push(edge);
        }

        if let Some(assignee) = facts.assigned_to {
            edges.push(GraphEdge::new(
                &ticket_node,
                format!("user_{}", assignee),
                EdgeType::AssignedTo,
                CONFIDENCE_DIRECT,
            ));
        }

        if let Some(category) = facts.category.as_deref().filter(|c| !c.is_empty()) {
            edges.push(
                GraphEdge::new(
                    &ticket_node,
                    node_id("category", category),
                    EdgeType::BelongsTo,
                    CONFIDENCE_DIRECT,
                )
                .with_property("category_name", json!(category)),
            );
        }

        for link in &facts.related_cis {
            let confidence = if link.from_text {
                CONFIDENCE_PATTERN
            } else {
                CONFIDENCE_DIRECT
            };
            edges.push(
                GraphEdge::new(
                    &ticket_node,
                    format!("ci_{}", link.ci_id),
                    EdgeType::Affects,
                    confidence,
                )
                .with_property(
                    "impact_level",
                    json!(link.impact_level.as_deref().unwrap_or("medium")),
                ),
            );
        }

        for (entity_type, list) in entities {
            for entity in list {
                edges.push(
                    GraphEdge::new(
                        &ticket_node,
                        Self::entity_node_id(*entity_type, &entity.text),
                        EdgeType::Mentions,
                        entity.confidence,
                    )
                    .with_property("entity_text", json!(entity.text))
                    .with_property("entity_type", json!(entity_type.as_str())),
                );
            }
        }

        edges
    }

    /// RESOLVED_BY edge from a closed ticket to a KB article matched on the
    /// resolution text. The match itself is a keyword inference, hence 0.70.
    pub fn resolved_by_edge(&self, facts: &TicketFacts, kb_id: i64) -> Option<GraphEdge> {
        let resolution = facts.resolution.as_deref()?.trim();
        if resolution.is_empty() || !is_closed(&facts.status) {
            return None;
        }
        let snippet: String = resolution.chars().take(200).collect();
        Some(
            GraphEdge::new(
                format!("ticket_{}", facts.ticket_id),
                format!("kb_{}", kb_id),
                EdgeType::ResolvedBy,
                CONFIDENCE_INFERRED,
            )
            .with_property("resolution_text", json!(snippet)),
        )
    }

    /// SIMILAR_TO edge carrying the cosine score. Scores below the threshold
    /// yield no edge.
    pub fn similar_to_edge(
        &self,
        ticket_id: i64,
        other_ticket_id: i64,
        cosine: f32,
    ) -> Option<GraphEdge> {
        if cosine < SIMILARITY_THRESHOLD || ticket_id == other_ticket_id {
            return None;
        }
        Some(
            GraphEdge::new(
                format!("ticket_{}", ticket_id),
                format!("ticket_{}", other_ticket_id),
                EdgeType::SimilarTo,
                cosine,
            )
            .with_property("similarity_score", json!(cosine))
            .with_property("method", json!("vector_similarity")),
        )
    }

    /// Edges for a configuration item: location, department, owner.
    pub fn ci_edges(&self, facts: &CiFacts) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        let ci_node = format!("ci_{}", facts.ci_id);

        if let Some(location) = facts.location.as_deref().filter(|l| !l.is_empty()) {
            edges.push(
                GraphEdge::new(
                    &ci_node,
                    node_id("location", location),
                    EdgeType::LocatedAt,
                    CONFIDENCE_DIRECT,
                )
                .with_property("location_name", json!(location)),
            );
        }

        if let Some(department) = facts.department.as_deref().filter(|d| !d.is_empty()) {
            edges.push(
                GraphEdge::new(
                    &ci_node,
                    node_id("department", department),
                    EdgeType::BelongsTo,
                    CONFIDENCE_DIRECT,
                )
                .with_property("department_name", json!(department)),
            );
        }

        if let Some(user_id) = facts.assigned_user_id {
            edges.push(
                GraphEdge::new(
                    &ci_node,
                    format!("user_{}", user_id),
                    EdgeType::AssignedTo,
                    CONFIDENCE_DIRECT,
                )
                .with_property("assignment_type", json!("ci_ownership")),
            );
        }

        edges
    }

    /// Edges for a KB article: author and category.
    pub fn kb_edges(&self, facts: &KbFacts) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        let kb_node = format!("kb_{}", facts.kb_id);

        if let Some(author_id) = facts.author_id {
            let mut edge = GraphEdge::new(
                &kb_node,
                format!("user_{}", author_id),
                EdgeType::CreatedBy,
                CONFIDENCE_DIRECT,
            );
            if let Some(created_at) = &facts.created_at {
                edge = edge.with_property("created_at", json!(created_at));
            }
            edges.push(edge);
        }

        if let Some(category) = facts.category.as_deref().filter(|c| !c.is_empty()) {
            edges.push(
                GraphEdge::new(
                    &kb_node,
                    node_id("category", category),
                    EdgeType::BelongsTo,
                    CONFIDENCE_DIRECT,
                )
                .with_property("category_name", json!(category)),
            );
        }

        edges
    }

    /// Validate an edge before insertion. Invalid edges are dropped by the
    /// caller after logging.
    pub fn validate(&self, edge: &GraphEdge) -> Result<(), String> {
        if edge.source_id.is_empty() {
            return Err("Missing required field: source_id".to_string());
        }
        if edge.target_id.is_empty() {
            return Err("Missing required field: target_id".to_string());
        }
        if !(0.0..=1.0).contains(&edge.confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                edge.confidence
            ));
        }
        if edge.source_id == edge.target_id {
            return Err("Source and target cannot be the same".to_string());
        }
        Ok(())
    }

    /// Filter a batch through validation, logging rejects.
    pub fn validated(&self, edges: Vec<GraphEdge>) -> Vec<GraphEdge> {
        edges
            .into_iter()
            .filter(|edge| match self.validate(edge) {
                Ok(()) => true,
                Err(reason) => {
                    warn!(
                        "Invalid edge skipped ({} -> {}): {}",
                        edge.source_id, edge.target_id, reason
                    );
                    false
                }
            })
            .collect()
    }
}

impl Default for RelationshipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_closed(status: &str) -> bool {
    matches!(
        status.to_lowercase().as_str(),
        "closed" | "gesloten" | "resolved" | "opgelost"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::entities::ExtractedEntity;
    use std::collections::HashMap;

    fn sample_facts() -> TicketFacts {
        TicketFacts {
            ticket_id: 123,
            user_id: Some(45),
            assigned_to: Some(12),
            category: Some("Hardware".to_string()),
            status: "Closed".to_string(),
            resolution: Some("BIOS update uitgevoerd".to_string()),
            created_at: Some("2024-10-20 10:30:00".to_string()),
            related_cis: vec![CiLink {
                ci_id: 789,
                impact_level: Some("high".to_string()),
                from_text: false,
            }],
        }
    }

    fn sample_entities() -> EntityMap {
        let mut map: EntityMap = HashMap::new();
        map.insert(
            EntityType::Product,
            vec![ExtractedEntity {
                text: "Dell Latitude 5520".to_string(),
                label: "PRODUCT".to_string(),
                confidence: 0.85,
                start: None,
                end: None,
                source: Some("pattern".to_string()),
            }],
        );
        map
    }

    #[test]
    fn test_ticket_edges() {
        let extractor = RelationshipExtractor::new();
        let edges = extractor.ticket_edges(&sample_facts(), &sample_entities());

        let find = |edge_type: EdgeType| edges.iter().find(|e| e.edge_type == edge_type);

        let created_by = find(EdgeType::CreatedBy).unwrap();
        assert_eq!(created_by.source_id, "ticket_123");
        assert_eq!(created_by.target_id, "user_45");
        assert_eq!(created_by.confidence, 1.0);

        assert_eq!(find(EdgeType::AssignedTo).unwrap().target_id, "user_12");
        assert_eq!(
            find(EdgeType::BelongsTo).unwrap().target_id,
            "category_hardware"
        );
        assert_eq!(find(EdgeType::Affects).unwrap().target_id, "ci_789");

        let mentions = find(EdgeType::Mentions).unwrap();
        assert_eq!(mentions.target_id, "product_dell_latitude_5520");
        assert_eq!(mentions.confidence, 0.85);
    }

    #[test]
    fn test_text_extracted_ci_gets_lower_confidence() {
        let extractor = RelationshipExtractor::new();
        let mut facts = sample_facts();
        facts.related_cis = vec![CiLink {
            ci_id: 5,
            impact_level: None,
            from_text: true,
        }];

        let edges = extractor.ticket_edges(&facts, &HashMap::new());
        let affects = edges
            .iter()
            .find(|e| e.edge_type == EdgeType::Affects)
            .unwrap();
        assert_eq!(affects.confidence, 0.85);
    }

    #[test]
    fn test_resolved_by_requires_closed_status() {
        let extractor = RelationshipExtractor::new();

        let edge = extractor.resolved_by_edge(&sample_facts(), 7).unwrap();
        assert_eq!(edge.source_id, "ticket_123");
        assert_eq!(edge.target_id, "kb_7");
        assert_eq!(edge.confidence, 0.70);

        let mut open = sample_facts();
        open.status = "Open".to_string();
        assert!(extractor.resolved_by_edge(&open, 7).is_none());

        let mut empty = sample_facts();
        empty.resolution = None;
        assert!(extractor.resolved_by_edge(&empty, 7).is_none());
    }

    #[test]
    fn test_similar_to_threshold() {
        let extractor = RelationshipExtractor::new();

        let edge = extractor.similar_to_edge(1, 2, 0.82).unwrap();
        assert_eq!(edge.confidence, 0.82);

        assert!(extractor.similar_to_edge(1, 2, 0.74).is_none());
        assert!(extractor.similar_to_edge(1, 1, 0.99).is_none());
    }

    #[test]
    fn test_ci_and_kb_edges() {
        let extractor = RelationshipExtractor::new();

        let ci_edges = extractor.ci_edges(&CiFacts {
            ci_id: 789,
            location: Some("Kantoor Hengelo".to_string()),
            department: Some("Sales".to_string()),
            assigned_user_id: Some(45),
        });
        assert_eq!(ci_edges.len(), 3);
        assert!(ci_edges
            .iter()
            .any(|e| e.edge_type == EdgeType::LocatedAt
                && e.target_id == "location_kantoor_hengelo"));

        let kb_edges = extractor.kb_edges(&KbFacts {
            kb_id: 3,
            author_id: Some(9),
            category: Some("Software".to_string()),
            created_at: None,
        });
        assert_eq!(kb_edges.len(), 2);
        assert!(kb_edges
            .iter()
            .any(|e| e.edge_type == EdgeType::CreatedBy && e.target_id == "user_9"));
    }

    #[test]
    fn test_validation_rules() {
        let extractor = RelationshipExtractor::new();

        let valid = GraphEdge::new("ticket_1", "user_2", EdgeType::CreatedBy, 1.0);
        assert!(extractor.validate(&valid).is_ok());

        let self_loop = GraphEdge::new("ticket_1", "ticket_1", EdgeType::SimilarTo, 0.9);
        assert!(extractor.validate(&self_loop).is_err());

        let bad_confidence = GraphEdge::new("ticket_1", "user_2", EdgeType::CreatedBy, 1.5);
        assert!(extractor.validate(&bad_confidence).is_err());

        let missing = GraphEdge::new("", "user_2", EdgeType::CreatedBy, 1.0);
        assert!(extractor.validate(&missing).is_err());

        let filtered = extractor.validated(vec![valid, self_loop, bad_confidence, missing]);
        assert_eq!(filtered.len(), 1);
    }
}
