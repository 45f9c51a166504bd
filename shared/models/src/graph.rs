use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Confidence assigned to edges derived from foreign keys or structured fields.
pub const CONFIDENCE_DIRECT: f32 = 1.0;
/// Confidence assigned to edges extracted from free text via patterns.
pub const CONFIDENCE_PATTERN: f32 = 0.85;
/// Confidence assigned to entities produced by the NER model.
pub const CONFIDENCE_NER: f32 = 0.80;
/// Confidence assigned to inferred edges (e.g. resolution -> KB keyword match).
pub const CONFIDENCE_INFERRED: f32 = 0.70;
/// Minimum cosine similarity for SIMILAR_TO edges.
pub const SIMILARITY_THRESHOLD: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Ticket,
    User,
    Ci,
    KbArticle,
    Category,
    Location,
    Department,
    Product,
    Error,
    Person,
    Organization,
    Misc,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Ticket => "ticket",
            NodeType::User => "user",
            NodeType::Ci => "ci",
            NodeType::KbArticle => "kb_article",
            NodeType::Category => "category",
            NodeType::Location => "location",
            NodeType::Department => "department",
            NodeType::Product => "product",
            NodeType::Error => "error",
            NodeType::Person => "person",
            NodeType::Organization => "organization",
            NodeType::Misc => "misc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket" => Some(NodeType::Ticket),
            "user" => Some(NodeType::User),
            "ci" => Some(NodeType::Ci),
            "kb_article" => Some(NodeType::KbArticle),
            "category" => Some(NodeType::Category),
            "location" => Some(NodeType::Location),
            "department" => Some(NodeType::Department),
            "product" => Some(NodeType::Product),
            "error" => Some(NodeType::Error),
            "person" => Some(NodeType::Person),
            "organization" => Some(NodeType::Organization),
            "misc" => Some(NodeType::Misc),
            _ => None,
        }
    }
}

/// Closed set of relationship types. Edges carrying anything else are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    #[serde(rename = "CREATED_BY")]
    CreatedBy,
    #[serde(rename = "ASSIGNED_TO")]
    AssignedTo,
    #[serde(rename = "AFFECTS")]
    Affects,
    #[serde(rename = "SIMILAR_TO")]
    SimilarTo,
    #[serde(rename = "RESOLVED_BY")]
    ResolvedBy,
    #[serde(rename = "BELONGS_TO")]
    BelongsTo,
    #[serde(rename = "MENTIONS")]
    Mentions,
    #[serde(rename = "LOCATED_AT")]
    LocatedAt,
    #[serde(rename = "DOCUMENTED_IN")]
    DocumentedIn,
    #[serde(rename = "DUPLICATE_OF")]
    DuplicateOf,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::CreatedBy => "CREATED_BY",
            EdgeType::AssignedTo => "ASSIGNED_TO",
            EdgeType::Affects => "AFFECTS",
            EdgeType::SimilarTo => "SIMILAR_TO",
            EdgeType::ResolvedBy => "RESOLVED_BY",
            EdgeType::BelongsTo => "BELONGS_TO",
            EdgeType::Mentions => "MENTIONS",
            EdgeType::LocatedAt => "LOCATED_AT",
            EdgeType::DocumentedIn => "DOCUMENTED_IN",
            EdgeType::DuplicateOf => "DUPLICATE_OF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED_BY" => Some(EdgeType::CreatedBy),
            "ASSIGNED_TO" => Some(EdgeType::AssignedTo),
            "AFFECTS" => Some(EdgeType::Affects),
            "SIMILAR_TO" => Some(EdgeType::SimilarTo),
            "RESOLVED_BY" => Some(EdgeType::ResolvedBy),
            "BELONGS_TO" => Some(EdgeType::BelongsTo),
            "MENTIONS" => Some(EdgeType::Mentions),
            "LOCATED_AT" => Some(EdgeType::LocatedAt),
            "DOCUMENTED_IN" => Some(EdgeType::DocumentedIn),
            "DUPLICATE_OF" => Some(EdgeType::DuplicateOf),
            _ => None,
        }
    }
}

/// Lowercase a display value and replace spaces with underscores for use in
/// node ids.
pub fn slugify(value: &str) -> String {
    value.trim().to_lowercase().replace(' ', "_")
}

/// Compose a node id following the `{type}_{slug}` convention.
pub fn node_id(prefix: &str, value: &str) -> String {
    format!("{}_{}", prefix, slugify(value))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_id: String,
    pub node_type: NodeType,
    pub properties: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub confidence: f32,
    pub properties: Map<String, Value>,
}

impl GraphEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: EdgeType,
        confidence: f32,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            confidence,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

/// Node view returned by traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub properties: Map<String, Value>,
}

/// Edge view returned by traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<SubgraphEdge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_types: HashMap<String, usize>,
    pub edge_types: HashMap<String, usize>,
    pub avg_degree: f64,
    pub density: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_type_round_trip() {
        for edge_type in [
            EdgeType::CreatedBy,
            EdgeType::AssignedTo,
            EdgeType::Affects,
            EdgeType::SimilarTo,
            EdgeType::ResolvedBy,
            EdgeType::BelongsTo,
            EdgeType::Mentions,
            EdgeType::LocatedAt,
            EdgeType::DocumentedIn,
            EdgeType::DuplicateOf,
        ] {
            assert_eq!(EdgeType::parse(edge_type.as_str()), Some(edge_type));
        }
        assert_eq!(EdgeType::parse("RELATED_TO"), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Kantoor Hengelo"), "kantoor_hengelo");
        assert_eq!(node_id("category", "Hardware"), "category_hardware");
    }
}
