pub mod api;
pub mod chunking;
pub mod documents;
pub mod graph;
pub mod retrieval;

pub use chunking::{ChunkKind, DocChunk, EntityKind};
pub use documents::DocumentPayload;
pub use graph::{EdgeType, GraphEdge, GraphNode, GraphStats, NodeType};
pub use retrieval::{Collection, HybridResult, RankedResult, RetrievedDocument};
