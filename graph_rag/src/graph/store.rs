use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::warn;

use helpdesk_models::graph::{EdgeType, GraphNode, NodeType};

use crate::errors::GraphResult;

/// Persistent mirror of the knowledge graph in Postgres.
///
/// Uniqueness: `graph_nodes.node_id` and `(source_id, target_id, edge_type)`
/// on `graph_edges`; upserts overwrite properties, confidence, and
/// `updated_at`.
#[derive(Clone)]
pub struct GraphStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    node_id: String,
    node_type: String,
    properties: Value,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EdgeRow {
    source_id: String,
    target_id: String,
    edge_type: String,
    confidence: f64,
    properties: Option<Value>,
}

/// An edge as loaded from the store.
pub struct StoredEdge {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub confidence: f32,
    pub properties: Map<String, Value>,
}

impl GraphStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the graph and validation tables when they do not exist yet.
    pub async fn ensure_schema(&self) -> GraphResult<()> {
        let ddl = include_str!("../../migrations/0001_graph.sql");
        for statement in ddl.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn upsert_node(
        &self,
        node_id: &str,
        node_type: NodeType,
        properties: &Map<String, Value>,
    ) -> GraphResult<()> {
        sqlx::query(
            r#"
            INSERT INTO graph_nodes (node_id, node_type, properties, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (node_id) DO UPDATE SET
                node_type = EXCLUDED.node_type,
                properties = EXCLUDED.properties,
                updated_at = NOW()
            "#,
        )
        .bind(node_id)
        .bind(node_type.as_str())
        .bind(Value::Object(properties.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_edge(
        &self,
        source_id: &str,
        target_id: &str,
        edge_type: EdgeType,
        confidence: f32,
        properties: &Map<String, Value>,
    ) -> GraphResult<()> {
        sqlx::query(
            r#"
            INSERT INTO graph_edges (source_id, target_id, edge_type, confidence, properties, created_at, updated_at)
            VALUES ($1, $2, $3, CAST($4 AS numeric(3,2)), $5, NOW(), NOW())
            ON CONFLICT (source_id, target_id, edge_type) DO UPDATE SET
                confidence = EXCLUDED.confidence,
                properties = EXCLUDED.properties,
                updated_at = NOW()
            "#,
        )
        .bind(source_id)
        .bind(target_id)
        .bind(edge_type.as_str())
        .bind(confidence as f64)
        .bind(Value::Object(properties.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_nodes(&self, node_types: Option<&[NodeType]>) -> GraphResult<Vec<GraphNode>> {
        let rows: Vec<NodeRow> = match node_types {
            Some(types) => {
                let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
                sqlx::query_as(
                    r#"
                    SELECT node_id, node_type, properties, created_at
                    FROM graph_nodes
                    WHERE node_type = ANY($1)
                    "#,
                )
                .bind(&names)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT node_id, node_type, properties, created_at FROM graph_nodes",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(node_type) = NodeType::parse(&row.node_type) else {
                warn!("Skipping node {} with unknown type {}", row.node_id, row.node_type);
                continue;
            };
            let properties = match row.properties {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            nodes.push(GraphNode {
                node_id: row.node_id,
                node_type,
                properties,
                created_at: row.created_at,
            });
        }
        Ok(nodes)
    }

    pub async fn load_edges(&self, min_confidence: f32) -> GraphResult<Vec<StoredEdge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(
            r#"
            SELECT source_id, target_id, edge_type, confidence::float8 AS confidence, properties
            FROM graph_edges
            WHERE confidence::float8 >= $1
            "#,
        )
        .bind(min_confidence as f64)
        .fetch_all(&self.pool)
        .await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(edge_type) = EdgeType::parse(&row.edge_type) else {
                warn!(
                    "Skipping edge {} -> {} with unknown type {}",
                    row.source_id, row.target_id, row.edge_type
                );
                continue;
            };
            let properties = match row.properties {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            edges.push(StoredEdge {
                source_id: row.source_id,
                target_id: row.target_id,
                edge_type,
                confidence: row.confidence as f32,
                properties,
            });
        }
        Ok(edges)
    }
}
