use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of source entity a chunk was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ticket,
    Kb,
    Ci,
}

impl EntityKind {
    /// Prefix used in chunk ids and graph node ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Ticket => "ticket",
            EntityKind::Kb => "kb",
            EntityKind::Ci => "ci",
        }
    }

    /// Vector-store collection this entity kind is indexed in.
    pub fn collection_name(&self) -> &'static str {
        match self {
            EntityKind::Ticket => "tickets",
            EntityKind::Kb => "knowledge_base",
            EntityKind::Ci => "configuration_items",
        }
    }
}

/// Semantic chunk kinds. Tickets produce several; KB articles and CI items
/// are single-chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Header,
    Description,
    DynamicFields,
    Comment,
    Resolution,
    RelatedCis,
    KbArticle,
    CiItem,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Header => "header",
            ChunkKind::Description => "description",
            ChunkKind::DynamicFields => "dynamic_fields",
            ChunkKind::Comment => "comment",
            ChunkKind::Resolution => "resolution",
            ChunkKind::RelatedCis => "related_cis",
            ChunkKind::KbArticle => "kb_article",
            ChunkKind::CiItem => "ci_item",
        }
    }
}

/// A semantic chunk ready for embedding and upsert.
///
/// The id is deterministic: `{kind}_{entity_id}_{chunk_kind}_{index}`, so
/// re-ingesting the same entity overwrites its chunks in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocChunk {
    pub chunk_id: String,
    pub entity_kind: EntityKind,
    pub entity_id: i64,
    pub kind: ChunkKind,
    pub index: u32,
    pub content: String,
    /// Sanitized metadata map (string values only) stored as the point payload.
    pub payload: Map<String, Value>,
}

impl DocChunk {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: i64,
        kind: ChunkKind,
        index: u32,
        content: String,
        payload: Map<String, Value>,
    ) -> Self {
        let chunk_id = format!(
            "{}_{}_{}_{}",
            entity_kind.as_str(),
            entity_id,
            kind.as_str(),
            index
        );
        Self {
            chunk_id,
            entity_kind,
            entity_id,
            kind,
            index,
            content,
            payload,
        }
    }
}
