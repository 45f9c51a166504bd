//! Knowledge graph construction and traversal for the helpdesk RAG platform.
//!
//! The graph lives in memory as an adjacency map keyed by stable node ids and
//! is mirrored to Postgres (`graph_nodes` / `graph_edges`) on every mutation.
//! Entity and relationship extractors turn ticket, KB, and CI payloads into
//! typed, confidence-scored nodes and edges.

pub mod errors;
pub mod extractors;
pub mod graph;
pub mod validation;

pub use errors::{GraphError, GraphResult};
pub use extractors::entities::{
    EntityExtractor, EntityMap, EntityType, ExtractedEntity, NerModel, NerSpan,
};
pub use extractors::relationships::{CiFacts, CiLink, KbFacts, RelationshipExtractor, TicketFacts};
pub use graph::store::GraphStore;
pub use graph::{Direction, KnowledgeGraph};
