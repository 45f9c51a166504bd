pub mod store;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{info, warn};

use helpdesk_models::graph::{
    EdgeType, GraphStats, NodeType, Subgraph, SubgraphEdge, SubgraphNode,
};

use crate::errors::GraphResult;
use store::GraphStore;

/// Traversal direction for neighbor queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone)]
pub struct NodeEntry {
    pub node_type: NodeType,
    pub properties: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct EdgeEntry {
    target: String,
    edge_type: EdgeType,
    confidence: f32,
    properties: Map<String, Value>,
}

/// Directed multigraph over stable node ids with synchronous Postgres
/// persistence.
///
/// Nodes and edges live in an arena keyed by id; traversal keeps a visited
/// set, so cycles in the data (SIMILAR_TO between tickets, shared hardware)
/// never become ownership cycles. With no store attached the graph is purely
/// in-memory, which is what the unit tests use.
pub struct KnowledgeGraph {
    store: Option<GraphStore>,
    nodes: HashMap<String, NodeEntry>,
    out: HashMap<String, Vec<EdgeEntry>>,
    /// target -> source ids, one entry per stored edge.
    incoming: HashMap<String, Vec<String>>,
    edge_count: usize,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self {
            store: None,
            nodes: HashMap::new(),
            out: HashMap::new(),
            incoming: HashMap::new(),
            edge_count: 0,
        }
    }

    pub fn with_store(store: GraphStore) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    pub fn has_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeEntry> {
        self.nodes.get(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Iterate over `(node_id, entry)` pairs; used by the graph retriever to
    /// match query tokens against node properties.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (&String, &NodeEntry)> {
        self.nodes.iter()
    }

    /// Upsert a node. Re-adding an existing id overwrites its type and
    /// properties; `created_at` is preserved. Persists in the same call when a
    /// store is attached.
    pub async fn add_node(
        &mut self,
        node_id: &str,
        node_type: NodeType,
        properties: Map<String, Value>,
    ) -> GraphResult<()> {
        let created_at = self
            .nodes
            .get(node_id)
            .map(|n| n.created_at)
            .unwrap_or_else(Utc::now);

        self.nodes.insert(
            node_id.to_string(),
            NodeEntry {
                node_type,
                properties: properties.clone(),
                created_at,
            },
        );

        if let Some(store) = &self.store {
            store.upsert_node(node_id, node_type, &properties).await?;
        }

        Ok(())
    }

    /// Upsert an edge. Returns `Ok(false)` when the edge is rejected: missing
    /// endpoint, self-loop, or confidence outside [0, 1]. Rejections are
    /// logged and dropped, never fatal.
    pub async fn add_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        edge_type: EdgeType,
        confidence: f32,
        properties: Option<Map<String, Value>>,
    ) -> GraphResult<bool> {
        if !self.nodes.contains_key(source_id) {
            warn!("Source node {} not found in graph", source_id);
            return Ok(false);
        }
        if !self.nodes.contains_key(target_id) {
            warn!("Target node {} not found in graph", target_id);
            return Ok(false);
        }
        if source_id == target_id {
            warn!("Rejected self-loop on {}", source_id);
            return Ok(false);
        }
        if !(0.0..=1.0).contains(&confidence) {
            warn!(
                "Rejected edge {} -> {} with confidence {}",
                source_id, target_id, confidence
            );
            return Ok(false);
        }

        let properties = properties.unwrap_or_default();
        let edges = self.out.entry(source_id.to_string()).or_default();

        match edges
            .iter_mut()
            .find(|e| e.target == target_id && e.edge_type == edge_type)
        {
            Some(existing) => {
                existing.confidence = confidence;
                existing.properties = properties.clone();
            }
            None => {
                edges.push(EdgeEntry {
                    target: target_id.to_string(),
                    edge_type,
                    confidence,
                    properties: properties.clone(),
                });
                self.incoming
                    .entry(target_id.to_string())
                    .or_default()
                    .push(source_id.to_string());
                self.edge_count += 1;
            }
        }

        if let Some(store) = &self.store {
            store
                .upsert_edge(source_id, target_id, edge_type, confidence, &properties)
                .await?;
        }

        Ok(true)
    }

    /// Neighbor ids, optionally filtered by edge type and direction.
    pub fn get_neighbors(
        &self,
        node_id: &str,
        edge_type: Option<EdgeType>,
        direction: Direction,
    ) -> Vec<String> {
        if !self.nodes.contains_key(node_id) {
            return Vec::new();
        }

        let mut neighbors = Vec::new();

        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(edges) = self.out.get(node_id) {
                for edge in edges {
                    if edge_type.map_or(true, |t| edge.edge_type == t) {
                        neighbors.push(edge.target.clone());
                    }
                }
            }
        }

        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(sources) = self.incoming.get(node_id) {
                for source in sources {
                    if let Some(edges) = self.out.get(source) {
                        for edge in edges {
                            if edge.target == node_id
                                && edge_type.map_or(true, |t| edge.edge_type == t)
                            {
                                neighbors.push(source.clone());
                            }
                        }
                    }
                }
            }
        }

        neighbors
    }

    /// Look up one edge between two nodes, in either direction. SIMILAR_TO is
    /// stored directed but queried both ways, so callers use this for edge
    /// metadata.
    pub fn edge_between(
        &self,
        a: &str,
        b: &str,
    ) -> Option<(EdgeType, f32)> {
        let forward = self
            .out
            .get(a)
            .and_then(|edges| edges.iter().find(|e| e.target == b));
        if let Some(edge) = forward {
            return Some((edge.edge_type, edge.confidence));
        }
        self.out
            .get(b)
            .and_then(|edges| edges.iter().find(|e| e.target == a))
            .map(|edge| (edge.edge_type, edge.confidence))
    }

    /// BFS over outgoing edges up to `max_depth`, with an optional edge-type
    /// whitelist. Returns the visited nodes and the matching edges.
    pub fn traverse(
        &self,
        start_node: &str,
        max_depth: usize,
        edge_types: Option<&[EdgeType]>,
    ) -> Subgraph {
        if !self.nodes.contains_key(start_node) {
            return Subgraph::default();
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut visited_order: Vec<String> = Vec::new();
        let mut edges = Vec::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((start_node.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if visited.contains(&current) || depth > max_depth {
                continue;
            }
            visited.insert(current.clone());
            visited_order.push(current.clone());

            if let Some(out_edges) = self.out.get(&current) {
                for edge in out_edges {
                    let allowed = edge_types.map_or(true, |types| types.contains(&edge.edge_type));
                    if !allowed {
                        continue;
                    }
                    edges.push(SubgraphEdge {
                        source: current.clone(),
                        target: edge.target.clone(),
                        edge_type: edge.edge_type,
                        confidence: edge.confidence,
                    });
                    if depth < max_depth {
                        queue.push_back((edge.target.clone(), depth + 1));
                    }
                }
            }
        }

        let nodes = visited_order
            .into_iter()
            .filter_map(|id| {
                self.nodes.get(&id).map(|entry| SubgraphNode {
                    id: id.clone(),
                    node_type: entry.node_type,
                    properties: entry.properties.clone(),
                })
            })
            .collect();

        Subgraph { nodes, edges }
    }

    /// All simple directed paths from `source_id` to `target_id` with at most
    /// `max_length` edges. Empty when either endpoint is missing.
    pub fn find_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Vec<Vec<String>> {
        if !self.nodes.contains_key(source_id) || !self.nodes.contains_key(target_id) {
            return Vec::new();
        }

        let mut paths = Vec::new();
        let mut current = vec![source_id.to_string()];
        let mut on_path: HashSet<String> = HashSet::new();
        on_path.insert(source_id.to_string());
        self.dfs_paths(source_id, target_id, max_length, &mut current, &mut on_path, &mut paths);
        paths
    }

    fn dfs_paths(
        &self,
        current: &str,
        target: &str,
        remaining: usize,
        path: &mut Vec<String>,
        on_path: &mut HashSet<String>,
        paths: &mut Vec<Vec<String>>,
    ) {
        if remaining == 0 {
            return;
        }
        if let Some(edges) = self.out.get(current) {
            // Successor set: a multigraph can reach the same neighbor via
            // several edge types, which is still one simple path.
            let mut seen_targets: HashSet<&str> = HashSet::new();
            for edge in edges {
                if !seen_targets.insert(edge.target.as_str()) {
                    continue;
                }
                if edge.target == target {
                    let mut complete = path.clone();
                    complete.push(target.to_string());
                    paths.push(complete);
                    continue;
                }
                if on_path.contains(&edge.target) {
                    continue;
                }
                path.push(edge.target.clone());
                on_path.insert(edge.target.clone());
                self.dfs_paths(&edge.target, target, remaining - 1, path, on_path, paths);
                on_path.remove(&edge.target);
                path.pop();
            }
        }
    }

    /// Normalized degree centrality: `deg / (|V| - 1)`. Zero for missing
    /// nodes and singleton graphs.
    pub fn compute_centrality(&self, node_id: &str) -> f64 {
        if !self.nodes.contains_key(node_id) {
            return 0.0;
        }
        let max_degree = self.nodes.len().saturating_sub(1);
        if max_degree == 0 {
            return 0.0;
        }
        self.degree(node_id) as f64 / max_degree as f64
    }

    fn degree(&self, node_id: &str) -> usize {
        let out_deg = self.out.get(node_id).map_or(0, |e| e.len());
        let in_deg = self.incoming.get(node_id).map_or(0, |e| e.len());
        out_deg + in_deg
    }

    /// Most similar nodes along SIMILAR_TO edges, both directions, by
    /// descending edge confidence.
    pub fn get_similar_nodes(&self, node_id: &str, top_k: usize) -> Vec<(String, f32)> {
        let mut similar: Vec<(String, f32)> = self
            .get_neighbors(node_id, Some(EdgeType::SimilarTo), Direction::Both)
            .into_iter()
            .filter_map(|neighbor| {
                self.edge_between(node_id, &neighbor)
                    .map(|(_, confidence)| (neighbor, confidence))
            })
            .collect();

        similar.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        similar.truncate(top_k);
        similar
    }

    /// Counts by node and edge type, average degree, and density.
    pub fn get_stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edge_count,
            ..GraphStats::default()
        };

        for entry in self.nodes.values() {
            *stats
                .node_types
                .entry(entry.node_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        for edges in self.out.values() {
            for edge in edges {
                *stats
                    .edge_types
                    .entry(edge.edge_type.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }

        let n = self.nodes.len();
        if n > 0 {
            stats.avg_degree = (2 * self.edge_count) as f64 / n as f64;
        }
        if n > 1 {
            stats.density = self.edge_count as f64 / (n as f64 * (n as f64 - 1.0));
        }

        stats
    }

    /// Repopulate the in-memory graph from the persistent store. Edges below
    /// `min_confidence` are filtered at load time, not deleted. Edges whose
    /// endpoints fall outside the node filter are skipped with a warning.
    pub async fn load_from_db(
        &mut self,
        node_types: Option<&[NodeType]>,
        min_confidence: f32,
    ) -> GraphResult<()> {
        let store = self
            .store
            .clone()
            .ok_or(crate::errors::GraphError::StoreMissing)?;

        info!("Loading knowledge graph from database...");

        let nodes = store.load_nodes(node_types).await?;
        let edges = store.load_edges(min_confidence).await?;

        self.nodes.clear();
        self.out.clear();
        self.incoming.clear();
        self.edge_count = 0;

        for node in nodes {
            self.nodes.insert(
                node.node_id,
                NodeEntry {
                    node_type: node.node_type,
                    properties: node.properties,
                    created_at: node.created_at,
                },
            );
        }
        let node_count = self.nodes.len();
        info!("Loaded {} nodes", node_count);

        let mut loaded_edges = 0usize;
        for edge in edges {
            if !self.nodes.contains_key(&edge.source_id) || !self.nodes.contains_key(&edge.target_id)
            {
                warn!(
                    "Skipping edge {} -> {}: endpoint not loaded",
                    edge.source_id, edge.target_id
                );
                continue;
            }
            let source = edge.source_id.clone();
            let entries = self.out.entry(source.clone()).or_default();
            entries.push(EdgeEntry {
                target: edge.target_id.clone(),
                edge_type: edge.edge_type,
                confidence: edge.confidence,
                properties: edge.properties,
            });
            self.incoming.entry(edge.target_id).or_default().push(source);
            self.edge_count += 1;
            loaded_edges += 1;
        }
        info!(
            "Loaded {} edges (min_confidence={})",
            loaded_edges, min_confidence
        );

        Ok(())
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    async fn sample_graph() -> KnowledgeGraph {
        let mut g = KnowledgeGraph::new();
        g.add_node("ticket_1", NodeType::Ticket, props(&[("title", "Laptop start niet op")]))
            .await
            .unwrap();
        g.add_node("ticket_2", NodeType::Ticket, props(&[("title", "Blue screen na update")]))
            .await
            .unwrap();
        g.add_node("user_45", NodeType::User, props(&[("name", "Jan Jansen")]))
            .await
            .unwrap();
        g.add_node("ci_789", NodeType::Ci, props(&[("name", "Dell Latitude 5520")]))
            .await
            .unwrap();

        g.add_edge("ticket_1", "user_45", EdgeType::CreatedBy, 1.0, None)
            .await
            .unwrap();
        g.add_edge("ticket_1", "ci_789", EdgeType::Affects, 0.9, None)
            .await
            .unwrap();
        g.add_edge("ticket_1", "ticket_2", EdgeType::SimilarTo, 0.82, None)
            .await
            .unwrap();
        g
    }

    #[tokio::test]
    async fn test_add_node_upserts_properties() {
        let mut g = KnowledgeGraph::new();
        g.add_node("ticket_1", NodeType::Ticket, props(&[("title", "eerste")]))
            .await
            .unwrap();
        let created = g.node("ticket_1").unwrap().created_at;

        g.add_node("ticket_1", NodeType::Ticket, props(&[("title", "tweede")]))
            .await
            .unwrap();

        let entry = g.node("ticket_1").unwrap();
        assert_eq!(entry.properties["title"], json!("tweede"));
        assert_eq!(entry.created_at, created);
        assert_eq!(g.node_count(), 1);
    }

    #[tokio::test]
    async fn test_edge_requires_both_endpoints() {
        let mut g = KnowledgeGraph::new();
        g.add_node("ticket_1", NodeType::Ticket, Map::new()).await.unwrap();

        let added = g
            .add_edge("ticket_1", "user_404", EdgeType::CreatedBy, 1.0, None)
            .await
            .unwrap();
        assert!(!added);
        assert_eq!(g.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_edge_rejects_self_loop_and_bad_confidence() {
        let mut g = KnowledgeGraph::new();
        g.add_node("ticket_1", NodeType::Ticket, Map::new()).await.unwrap();
        g.add_node("ticket_2", NodeType::Ticket, Map::new()).await.unwrap();

        assert!(!g
            .add_edge("ticket_1", "ticket_1", EdgeType::SimilarTo, 0.9, None)
            .await
            .unwrap());
        assert!(!g
            .add_edge("ticket_1", "ticket_2", EdgeType::SimilarTo, 1.3, None)
            .await
            .unwrap());
        assert_eq!(g.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_edge_upsert_overwrites_confidence() {
        let mut g = sample_graph().await;
        let before = g.edge_count();

        g.add_edge("ticket_1", "ticket_2", EdgeType::SimilarTo, 0.95, None)
            .await
            .unwrap();

        assert_eq!(g.edge_count(), before);
        let (_, confidence) = g.edge_between("ticket_1", "ticket_2").unwrap();
        assert!((confidence - 0.95).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_get_neighbors_directions() {
        let g = sample_graph().await;

        let out = g.get_neighbors("ticket_1", None, Direction::Out);
        assert_eq!(out.len(), 3);

        let incoming = g.get_neighbors("user_45", None, Direction::In);
        assert_eq!(incoming, vec!["ticket_1".to_string()]);

        let created_by = g.get_neighbors("ticket_1", Some(EdgeType::CreatedBy), Direction::Out);
        assert_eq!(created_by, vec!["user_45".to_string()]);

        assert!(g.get_neighbors("nergens", None, Direction::Both).is_empty());
    }

    #[tokio::test]
    async fn test_traverse_filters_edge_types_and_handles_cycles() {
        let mut g = sample_graph().await;
        // Close a cycle between the two tickets.
        g.add_edge("ticket_2", "ticket_1", EdgeType::SimilarTo, 0.82, None)
            .await
            .unwrap();

        let subgraph = g.traverse("ticket_1", 2, Some(&[EdgeType::SimilarTo]));
        let node_ids: Vec<&str> = subgraph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(node_ids.contains(&"ticket_1"));
        assert!(node_ids.contains(&"ticket_2"));
        assert!(!node_ids.contains(&"user_45"));
        assert!(subgraph
            .edges
            .iter()
            .all(|e| e.edge_type == EdgeType::SimilarTo));
    }

    #[tokio::test]
    async fn test_find_paths() {
        let mut g = sample_graph().await;
        g.add_edge("ticket_2", "ci_789", EdgeType::Affects, 0.85, None)
            .await
            .unwrap();

        let paths = g.find_paths("ticket_1", "ci_789", 3);
        assert!(paths.contains(&vec!["ticket_1".to_string(), "ci_789".to_string()]));
        assert!(paths.contains(&vec![
            "ticket_1".to_string(),
            "ticket_2".to_string(),
            "ci_789".to_string()
        ]));

        assert!(g.find_paths("ticket_1", "onbekend", 3).is_empty());
        // Length bound excludes the two-hop path.
        assert_eq!(g.find_paths("ticket_1", "ci_789", 1).len(), 1);
    }

    #[tokio::test]
    async fn test_centrality() {
        let g = sample_graph().await;
        // ticket_1 has degree 3 of max 3.
        assert!((g.compute_centrality("ticket_1") - 1.0).abs() < 1e-9);
        // user_45 has degree 1 of max 3.
        assert!((g.compute_centrality("user_45") - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(g.compute_centrality("nergens"), 0.0);

        let mut singleton = KnowledgeGraph::new();
        singleton
            .add_node("ticket_9", NodeType::Ticket, Map::new())
            .await
            .unwrap();
        assert_eq!(singleton.compute_centrality("ticket_9"), 0.0);
    }

    #[tokio::test]
    async fn test_similar_nodes_both_directions() {
        let mut g = sample_graph().await;
        g.add_node("ticket_3", NodeType::Ticket, Map::new()).await.unwrap();
        // Incoming SIMILAR_TO edge: queries must see it too.
        g.add_edge("ticket_3", "ticket_1", EdgeType::SimilarTo, 0.91, None)
            .await
            .unwrap();

        let similar = g.get_similar_nodes("ticket_1", 5);
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].0, "ticket_3");
        assert!(similar[0].1 > similar[1].1);
    }

    #[tokio::test]
    async fn test_stats() {
        let g = sample_graph().await;
        let stats = g.get_stats();
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.total_edges, 3);
        assert_eq!(stats.node_types["ticket"], 2);
        assert_eq!(stats.edge_types["SIMILAR_TO"], 1);
        assert!((stats.avg_degree - 1.5).abs() < 1e-9);
        assert!((stats.density - 3.0 / 12.0).abs() < 1e-9);
    }
}
