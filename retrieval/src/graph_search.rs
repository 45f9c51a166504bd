//! Graph retriever: seed nodes from query tokens, traverse outward over a
//! whitelist of edge types, score reached tickets by centrality.

use serde_json::Value;
use tracing::debug;

use graph_rag::KnowledgeGraph;
use helpdesk_models::documents::sanitize_metadata;
use helpdesk_models::graph::{EdgeType, NodeType};
use helpdesk_models::retrieval::{Collection, RetrievalSource, RetrievedDocument};

use crate::bm25::tokenize;

/// Edge types followed during retrieval traversal.
const TRAVERSAL_EDGE_TYPES: [EdgeType; 4] = [
    EdgeType::SimilarTo,
    EdgeType::Affects,
    EdgeType::ResolvedBy,
    EdgeType::Mentions,
];

const MAX_STARTING_NODES: usize = 5;

pub struct GraphRetriever;

impl GraphRetriever {
    /// Traversal search over the knowledge graph. Matches query tokens
    /// against node string properties to pick at most five seeds, walks up to
    /// `max_hops` outward, and returns reached ticket nodes ranked by degree
    /// centrality.
    pub fn search(
        graph: &KnowledgeGraph,
        query: &str,
        max_hops: usize,
        top_k: usize,
    ) -> Vec<RetrievedDocument> {
        debug!(
            "Graph search: query='{}', max_hops={}, top_k={}",
            query.chars().take(50).collect::<String>(),
            max_hops,
            top_k
        );

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let starting_nodes = Self::find_starting_nodes(graph, &query_tokens);
        if starting_nodes.is_empty() {
            debug!("No starting nodes found for query");
            return Vec::new();
        }

        let mut related_tickets: Vec<String> = Vec::new();
        for start_node in starting_nodes.iter().take(MAX_STARTING_NODES) {
            let subgraph = graph.traverse(start_node, max_hops, Some(&TRAVERSAL_EDGE_TYPES));
            for node in subgraph.nodes {
                if node.node_type == NodeType::Ticket && !related_tickets.contains(&node.id) {
                    related_tickets.push(node.id);
                }
            }
        }

        let mut results: Vec<RetrievedDocument> = related_tickets
            .into_iter()
            .filter_map(|ticket_node_id| {
                let entry = graph.node(&ticket_node_id)?;
                let centrality = graph.compute_centrality(&ticket_node_id) as f32;
                Some(RetrievedDocument {
                    id: ticket_node_id,
                    document: Self::format_ticket_document(&entry.properties),
                    metadata: sanitize_metadata(&entry.properties),
                    collection: Collection::Tickets,
                    source: RetrievalSource::GraphSearch,
                    score: centrality,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        debug!("Graph search returned {} results", results.len());
        results
    }

    /// Direct SIMILAR_TO neighborhood of one ticket, both directions, by
    /// descending edge confidence.
    pub fn find_similar_tickets(
        graph: &KnowledgeGraph,
        ticket_id: i64,
        top_k: usize,
    ) -> Vec<RetrievedDocument> {
        let ticket_node_id = format!("ticket_{}", ticket_id);
        if !graph.has_node(&ticket_node_id) {
            debug!("Ticket node {} not found in graph", ticket_node_id);
            return Vec::new();
        }

        graph
            .get_similar_nodes(&ticket_node_id, top_k)
            .into_iter()
            .filter_map(|(node_id, confidence)| {
                let entry = graph.node(&node_id)?;
                Some(RetrievedDocument {
                    id: node_id,
                    document: Self::format_ticket_document(&entry.properties),
                    metadata: sanitize_metadata(&entry.properties),
                    collection: Collection::Tickets,
                    source: RetrievalSource::GraphSearch,
                    score: confidence,
                })
            })
            .collect()
    }

    /// Nodes whose string properties contain any query token.
    fn find_starting_nodes(graph: &KnowledgeGraph, query_tokens: &[String]) -> Vec<String> {
        let mut matching = Vec::new();

        for (node_id, entry) in graph.iter_nodes() {
            let matches = entry.properties.values().any(|value| match value {
                Value::String(text) => {
                    let lower = text.to_lowercase();
                    query_tokens.iter().any(|token| lower.contains(token))
                }
                _ => false,
            });
            if matches {
                matching.push(node_id.clone());
            }
        }

        matching.sort();
        matching
    }

    fn format_ticket_document(properties: &serde_json::Map<String, Value>) -> String {
        let get = |key: &str| {
            properties
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
        };
        format!(
            "Ticket {}: {}\nCategory: {}\nPriority: {}\nStatus: {}",
            get("ticket_number"),
            properties.get("title").and_then(|v| v.as_str()).unwrap_or(""),
            get("category"),
            get("priority"),
            get("status")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn sample_graph() -> KnowledgeGraph {
        let mut g = KnowledgeGraph::new();
        let props = |pairs: &[(&str, &str)]| -> serde_json::Map<String, Value> {
            pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
        };

        g.add_node(
            "ticket_1",
            NodeType::Ticket,
            props(&[
                ("ticket_number", "T-2024-001"),
                ("title", "Laptop start niet op"),
                ("status", "Open"),
            ]),
        )
        .await
        .unwrap();
        g.add_node(
            "ticket_2",
            NodeType::Ticket,
            props(&[
                ("ticket_number", "T-2024-002"),
                ("title", "Blue screen na update"),
                ("status", "Closed"),
            ]),
        )
        .await
        .unwrap();
        g.add_node("ci_789", NodeType::Ci, props(&[("name", "Dell Latitude 5520")]))
            .await
            .unwrap();
        g.add_node("user_45", NodeType::User, props(&[("name", "Jan Jansen")]))
            .await
            .unwrap();

        g.add_edge("ticket_1", "ticket_2", EdgeType::SimilarTo, 0.82, None)
            .await
            .unwrap();
        g.add_edge("ticket_1", "ci_789", EdgeType::Affects, 1.0, None)
            .await
            .unwrap();
        g.add_edge("ticket_1", "user_45", EdgeType::CreatedBy, 1.0, None)
            .await
            .unwrap();
        g
    }

    #[tokio::test]
    async fn test_search_reaches_tickets_via_whitelisted_edges() {
        let graph = sample_graph().await;
        let results = GraphRetriever::search(&graph, "laptop start niet", 2, 10);

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"ticket_1"));
        // Reached over the SIMILAR_TO edge.
        assert!(ids.contains(&"ticket_2"));
        assert!(results.iter().all(|r| r.source == RetrievalSource::GraphSearch));
        // Ranked by centrality: ticket_1 has the higher degree.
        assert_eq!(results[0].id, "ticket_1");
    }

    #[tokio::test]
    async fn test_search_without_matches_is_empty() {
        let graph = sample_graph().await;
        assert!(GraphRetriever::search(&graph, "koffiezetapparaat", 2, 10).is_empty());
        assert!(GraphRetriever::search(&graph, "", 2, 10).is_empty());
    }

    #[tokio::test]
    async fn test_find_similar_tickets() {
        let graph = sample_graph().await;
        let similar = GraphRetriever::find_similar_tickets(&graph, 1, 5);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].id, "ticket_2");
        assert!((similar[0].score - 0.82).abs() < 1e-6);

        assert!(GraphRetriever::find_similar_tickets(&graph, 999, 5).is_empty());
    }
}
