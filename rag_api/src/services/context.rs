//! Context assembly with provenance: numbered source blocks, the source
//! document list, and relationship chains for the top ticket hits.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

use graph_rag::{Direction, KnowledgeGraph};
use helpdesk_models::api::{RelationshipChain, SourceDocument};
use helpdesk_models::retrieval::{Collection, RankedResult};

const MAX_SOURCES: usize = 10;
const MAX_RELATIONSHIP_TICKETS: usize = 5;
const MAX_NEIGHBORS_PER_TICKET: usize = 3;
const SNIPPET_LENGTH: usize = 500;

pub struct ContextBuilder {
    max_context_length: usize,
}

impl ContextBuilder {
    pub fn new(max_context_length: usize) -> Self {
        Self { max_context_length }
    }

    /// Build the context text, the provenance-tagged source list, and the
    /// relationship chains for the top ticket hits.
    pub fn build(
        &self,
        results: &[RankedResult],
        graph: &Arc<RwLock<KnowledgeGraph>>,
    ) -> (String, Vec<SourceDocument>, Vec<RelationshipChain>) {
        let mut context_parts = Vec::new();
        let mut sources = Vec::new();

        for (i, result) in results.iter().take(MAX_SOURCES).enumerate() {
            let metadata = &result.metadata;
            let get = |key: &str| {
                metadata
                    .get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };

            let ticket_number = get("ticket_number");
            let title = {
                let t = get("title");
                if t.is_empty() {
                    get("name")
                } else {
                    t
                }
            };
            let category = get("category");

            let mut entry = format!("[Bron {}] ", i + 1);
            if !ticket_number.is_empty() {
                entry.push_str(&format!("Ticket {}: ", ticket_number));
            }
            entry.push_str(&title);
            entry.push('\n');
            entry.push_str(&snippet(&result.document, SNIPPET_LENGTH));
            entry.push('\n');
            context_parts.push(entry);

            sources.push(SourceDocument {
                id: result.id.clone(),
                title: if title.is_empty() {
                    "Untitled".to_string()
                } else {
                    title
                },
                content: result.document.clone(),
                category: if category.is_empty() {
                    None
                } else {
                    Some(category)
                },
                ticket_number: if ticket_number.is_empty() {
                    None
                } else {
                    Some(ticket_number)
                },
                score: result.final_score,
                source_type: result.collection.as_str().to_string(),
            });
        }

        let relationships = self.collect_relationships(results, graph);

        let mut context_text = context_parts.join("\n\n");
        if context_text.len() > self.max_context_length {
            context_text = format!(
                "{}...",
                truncate_at_boundary(&context_text, self.max_context_length)
            );
        }

        (context_text, sources, relationships)
    }

    /// Up to three neighbors per top-5 ticket hit, in either direction.
    /// Missing ticket ids are skipped with a warning.
    fn collect_relationships(
        &self,
        results: &[RankedResult],
        graph: &Arc<RwLock<KnowledgeGraph>>,
    ) -> Vec<RelationshipChain> {
        let mut relationships = Vec::new();
        let graph = graph.read();

        for result in results
            .iter()
            .filter(|r| r.collection == Collection::Tickets)
            .take(MAX_RELATIONSHIP_TICKETS)
        {
            let Some(ticket_id) = result.metadata.get("ticket_id").and_then(|v| v.as_str()) else {
                warn!("Result {} has no ticket_id, skipping relationships", result.id);
                continue;
            };
            if ticket_id.is_empty() {
                continue;
            }
            let ticket_node_id = format!("ticket_{}", ticket_id);
            if !graph.has_node(&ticket_node_id) {
                warn!("Ticket node {} not in graph, skipping relationships", ticket_node_id);
                continue;
            }

            let neighbors = graph.get_neighbors(&ticket_node_id, None, Direction::Both);
            for neighbor in neighbors.into_iter().take(MAX_NEIGHBORS_PER_TICKET) {
                if let Some((edge_type, confidence)) = graph.edge_between(&ticket_node_id, &neighbor)
                {
                    relationships.push(RelationshipChain {
                        source: ticket_node_id.clone(),
                        target: neighbor,
                        relationship: edge_type.as_str().to_string(),
                        confidence,
                    });
                }
            }
        }

        relationships
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Byte-safe truncation that backs off to the previous char boundary.
fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_models::graph::{EdgeType, NodeType};
    use helpdesk_models::retrieval::MethodScores;
    use serde_json::{json, Map, Value};

    fn ranked(id: &str, collection: Collection, metadata: Map<String, Value>, document: &str) -> RankedResult {
        RankedResult {
            id: id.to_string(),
            document: document.to_string(),
            metadata,
            collection,
            scores: MethodScores::default(),
            combined_score: 0.9,
            rerank_scores: Default::default(),
            final_score: 0.9,
        }
    }

    fn meta(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
    }

    async fn graph_with_ticket() -> Arc<RwLock<KnowledgeGraph>> {
        let mut g = KnowledgeGraph::new();
        g.add_node("ticket_123", NodeType::Ticket, Map::new()).await.unwrap();
        g.add_node("kb_7", NodeType::KbArticle, Map::new()).await.unwrap();
        g.add_node("user_45", NodeType::User, Map::new()).await.unwrap();
        g.add_edge("ticket_123", "kb_7", EdgeType::ResolvedBy, 0.7, None)
            .await
            .unwrap();
        g.add_edge("ticket_123", "user_45", EdgeType::CreatedBy, 1.0, None)
            .await
            .unwrap();
        Arc::new(RwLock::new(g))
    }

    #[tokio::test]
    async fn test_numbered_source_blocks() {
        let graph = graph_with_ticket().await;
        let builder = ContextBuilder::new(4000);

        let results = vec![
            ranked(
                "ticket_123_header_0",
                Collection::Tickets,
                meta(&[
                    ("ticket_id", "123"),
                    ("ticket_number", "T-2024-001"),
                    ("title", "Laptop start niet op"),
                    ("category", "Hardware"),
                ]),
                "Ticket T-2024-001: Laptop start niet op\nBlue screen",
            ),
            ranked(
                "kb_7_kb_article_0",
                Collection::KnowledgeBase,
                meta(&[("kb_id", "7"), ("title", "BIOS reset")]),
                "BIOS reset\nHoud F2 ingedrukt",
            ),
        ];

        let (context, sources, relationships) = builder.build(&results, &graph);

        assert!(context.starts_with("[Bron 1] Ticket T-2024-001: Laptop start niet op"));
        assert!(context.contains("[Bron 2] BIOS reset"));

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].ticket_number.as_deref(), Some("T-2024-001"));
        assert_eq!(sources[0].category.as_deref(), Some("Hardware"));
        assert_eq!(sources[1].ticket_number, None);
        assert_eq!(sources[1].source_type, "knowledge_base");

        assert_eq!(relationships.len(), 2);
        assert!(relationships
            .iter()
            .any(|r| r.relationship == "RESOLVED_BY" && r.target == "kb_7"));
    }

    #[tokio::test]
    async fn test_context_is_clipped() {
        let graph = graph_with_ticket().await;
        let builder = ContextBuilder::new(100);

        let long_text = "woord ".repeat(200);
        let results = vec![ranked(
            "ticket_123_description_0",
            Collection::Tickets,
            meta(&[("ticket_id", "123"), ("title", "Lang verhaal")]),
            &long_text,
        )];

        let (context, _, _) = builder.build(&results, &graph);
        assert!(context.len() <= 103); // limit plus ellipsis
        assert!(context.ends_with("..."));
    }

    #[tokio::test]
    async fn test_missing_ticket_id_skips_relationships() {
        let graph = graph_with_ticket().await;
        let builder = ContextBuilder::new(4000);

        let results = vec![ranked(
            "ticket_999_header_0",
            Collection::Tickets,
            meta(&[("ticket_id", "999"), ("title", "Onbekend")]),
            "tekst",
        )];

        let (_, sources, relationships) = builder.build(&results, &graph);
        assert_eq!(sources.len(), 1);
        assert!(relationships.is_empty());
    }

    #[tokio::test]
    async fn test_empty_results() {
        let graph = graph_with_ticket().await;
        let builder = ContextBuilder::new(4000);
        let (context, sources, relationships) = builder.build(&[], &graph);
        assert!(context.is_empty());
        assert!(sources.is_empty());
        assert!(relationships.is_empty());
    }
}
