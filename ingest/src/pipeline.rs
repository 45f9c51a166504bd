//! The sync pipeline: source rows -> chunks -> embeddings -> vector store,
//! plus entity/relationship extraction into the knowledge graph.
//!
//! Failures are contained per entity: a ticket that cannot be processed is
//! counted and skipped, the sync itself keeps going.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{error, info, warn};

use graph_rag::{
    CiFacts, CiLink, EntityExtractor, EntityMap, GraphStore, KbFacts, KnowledgeGraph,
    RelationshipExtractor, TicketFacts,
};
use helpdesk_config::AppConfig;
use helpdesk_models::chunking::DocChunk;
use helpdesk_models::graph::{GraphEdge, NodeType, SIMILARITY_THRESHOLD};
use helpdesk_models::retrieval::Collection;
use retrieval::vector::point_id;
use retrieval::{EmbeddingClient, VectorPoint, VectorStore};
use sqlx::PgPool;

use crate::chunker::{chunk_ci_item, chunk_kb_article, chunk_ticket};
use crate::source::{CiItemRow, KbArticleRow, SourceDb, TicketBundle};

#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub tickets_synced: usize,
    pub kb_synced: usize,
    pub ci_synced: usize,
    pub entities_extracted: usize,
    pub relationships_created: usize,
    pub errors: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct SyncPipeline {
    source: SourceDb,
    embedding: EmbeddingClient,
    vector_store: VectorStore,
    graph: KnowledgeGraph,
    entity_extractor: EntityExtractor,
    relationship_extractor: RelationshipExtractor,
    embedding_batch_size: usize,
    upsert_batch_size: usize,
    embedding_dimension: usize,
    pub stats: SyncStats,
}

impl SyncPipeline {
    pub fn new(config: &AppConfig, pool: PgPool) -> Self {
        let store = GraphStore::new(pool.clone());
        Self {
            source: SourceDb::new(pool),
            embedding: EmbeddingClient::new(
                &config.ollama.url,
                &config.ollama.embedding_model,
                config.embedding_dimension,
            ),
            vector_store: VectorStore::new(&config.qdrant_url),
            graph: KnowledgeGraph::with_store(store.clone()),
            entity_extractor: EntityExtractor::from_env(),
            relationship_extractor: RelationshipExtractor::new(),
            embedding_batch_size: config.embedding_batch_size,
            upsert_batch_size: config.upsert_batch_size,
            embedding_dimension: config.embedding_dimension,
            stats: SyncStats::default(),
        }
    }

    /// Run a full sync: tickets within the window, all published KB articles,
    /// all active CI items.
    pub async fn run(
        &mut self,
        since_hours: Option<i64>,
        limit: Option<i64>,
    ) -> anyhow::Result<SyncStats> {
        self.stats = SyncStats {
            started_at: Some(Utc::now()),
            ..SyncStats::default()
        };

        info!("============================================================");
        info!("Starting sync (since_hours={:?}, limit={:?})", since_hours, limit);
        info!("============================================================");

        GraphStore::new(self.source.pool().clone()).ensure_schema().await?;
        for collection in Collection::all() {
            self.vector_store
                .ensure_collection(collection, self.embedding_dimension)
                .await?;
        }

        // Start from the persisted graph so re-syncs upsert instead of
        // duplicating.
        self.graph.load_from_db(None, 0.0).await?;

        self.sync_kb_articles().await;
        self.sync_tickets(since_hours, limit).await;
        self.sync_ci_items().await;

        self.stats.finished_at = Some(Utc::now());
        self.log_summary();
        Ok(self.stats.clone())
    }

    /// Incremental sync: the last hour only.
    pub async fn run_incremental(&mut self) -> anyhow::Result<SyncStats> {
        self.run(Some(1), None).await
    }

    async fn sync_tickets(&mut self, since_hours: Option<i64>, limit: Option<i64>) {
        let bundles = match self.source.fetch_ticket_bundles(since_hours, limit).await {
            Ok(bundles) => bundles,
            Err(e) => {
                error!("Error fetching tickets: {}", e);
                self.stats.errors += 1;
                return;
            }
        };

        if bundles.is_empty() {
            info!("No tickets to sync");
            return;
        }

        info!("Processing {} tickets...", bundles.len());
        for bundle in &bundles {
            match self.process_ticket(bundle).await {
                Ok(()) => self.stats.tickets_synced += 1,
                Err(e) => {
                    error!("Error processing ticket {}: {}", bundle.ticket.ticket_id, e);
                    self.stats.errors += 1;
                }
            }
        }
        info!("Ticket sync completed: {} tickets synced", self.stats.tickets_synced);
    }

    async fn process_ticket(&mut self, bundle: &TicketBundle) -> anyhow::Result<()> {
        let ticket = &bundle.ticket;
        let chunks = chunk_ticket(bundle);
        let embeddings = self
            .upsert_entity_chunks(Collection::Tickets, "ticket_id", ticket.ticket_id, &chunks)
            .await?;

        // Entity extraction over every free-text field of the ticket.
        let mut text_parts = vec![ticket.title.clone()];
        if let Some(description) = &ticket.description {
            text_parts.push(description.clone());
        }
        for comment in &bundle.comments {
            text_parts.push(comment.comment.clone());
        }
        if let Some(resolution) = &ticket.resolution {
            text_parts.push(resolution.clone());
        }
        let structured: HashMap<String, String> = bundle
            .dynamic_fields
            .iter()
            .filter_map(|f| {
                f.field_value
                    .as_ref()
                    .map(|v| (f.field_name.clone(), v.clone()))
            })
            .collect();

        let entities = self
            .entity_extractor
            .extract(&text_parts.join(" "), Some(&structured))
            .await;

        self.populate_ticket_graph(bundle, &entities).await?;

        // SIMILAR_TO candidates from the header embedding. Zero vectors are
        // placeholders and never produce similarity edges.
        if let Some(header_embedding) = embeddings.first() {
            if header_embedding.iter().any(|v| *v != 0.0) {
                self.link_similar_tickets(ticket.ticket_id, header_embedding.clone())
                    .await;
            }
        }

        Ok(())
    }

    async fn populate_ticket_graph(
        &mut self,
        bundle: &TicketBundle,
        entities: &EntityMap,
    ) -> anyhow::Result<()> {
        let ticket = &bundle.ticket;
        let ticket_node = format!("ticket_{}", ticket.ticket_id);

        self.add_node_counted(
            &ticket_node,
            NodeType::Ticket,
            object(&[
                ("ticket_number", json!(ticket.ticket_number)),
                ("title", json!(ticket.title)),
                ("priority", json!(ticket.priority.as_deref().unwrap_or(""))),
                ("status", json!(ticket.status.as_deref().unwrap_or(""))),
                ("category", json!(ticket.category.as_deref().unwrap_or(""))),
                (
                    "created_at",
                    json!(ticket.created_at.map(|d| d.to_rfc3339()).unwrap_or_default()),
                ),
                (
                    "updated_at",
                    json!(ticket.updated_at.map(|d| d.to_rfc3339()).unwrap_or_default()),
                ),
            ]),
        )
        .await?;

        if let Some(user_id) = ticket.user_id {
            self.add_node_counted(
                &format!("user_{}", user_id),
                NodeType::User,
                object(&[
                    ("name", json!(ticket.user_name.as_deref().unwrap_or(""))),
                    ("email", json!(ticket.user_email.as_deref().unwrap_or(""))),
                ]),
            )
            .await?;
        }
        if let Some(assignee) = ticket.assigned_to {
            self.add_node_counted(&format!("user_{}", assignee), NodeType::User, Map::new())
                .await?;
        }
        if let Some(category) = ticket.category.as_deref().filter(|c| !c.is_empty()) {
            self.add_node_counted(
                &helpdesk_models::graph::node_id("category", category),
                NodeType::Category,
                object(&[("name", json!(category))]),
            )
            .await?;
        }

        for (entity_type, list) in entities {
            for entity in list {
                let node_id = RelationshipExtractor::entity_node_id(*entity_type, &entity.text);
                self.add_node_counted(
                    &node_id,
                    entity_type.node_type(),
                    object(&[
                        ("name", json!(entity.text)),
                        ("confidence", json!(entity.confidence.to_string())),
                        ("label", json!(entity.label)),
                    ]),
                )
                .await?;
            }
        }

        for ci in &bundle.related_cis {
            self.add_node_counted(
                &format!("ci_{}", ci.ci_id),
                NodeType::Ci,
                object(&[
                    ("ci_number", json!(ci.ci_number)),
                    ("name", json!(ci.ci_name)),
                    ("type", json!(ci.ci_type.as_deref().unwrap_or(""))),
                ]),
            )
            .await?;
        }

        let facts = TicketFacts {
            ticket_id: ticket.ticket_id,
            user_id: ticket.user_id,
            assigned_to: ticket.assigned_to,
            category: ticket.category.clone(),
            status: ticket.status.clone().unwrap_or_default(),
            resolution: ticket.resolution.clone(),
            created_at: ticket.created_at.map(|d| d.to_rfc3339()),
            related_cis: bundle
                .related_cis
                .iter()
                .map(|ci| CiLink {
                    ci_id: ci.ci_id,
                    impact_level: ci.impact_level.clone(),
                    from_text: false,
                })
                .collect(),
        };

        let mut edges = self.relationship_extractor.ticket_edges(&facts, entities);

        // RESOLVED_BY: closed tickets whose resolution matches a published KB
        // article by keyword.
        if let Some(edge) = self.resolve_kb_edge(&facts).await {
            edges.push(edge);
        }

        self.add_edges_counted(edges).await?;
        Ok(())
    }

    async fn resolve_kb_edge(&mut self, facts: &TicketFacts) -> Option<GraphEdge> {
        let resolution = facts.resolution.clone()?;
        let resolution = resolution.trim();
        if resolution.is_empty() {
            return None;
        }

        let (kb_id, title) = self.source.find_kb_by_keywords(resolution).await?;
        // Status and resolution gates live in the extractor.
        let edge = self.relationship_extractor.resolved_by_edge(facts, kb_id)?;

        let kb_node = format!("kb_{}", kb_id);
        if !self.graph.has_node(&kb_node) {
            if let Err(e) = self
                .add_node_counted(
                    &kb_node,
                    NodeType::KbArticle,
                    object(&[("title", json!(title))]),
                )
                .await
            {
                warn!("Could not add KB node {}: {}", kb_node, e);
                return None;
            }
        }
        Some(edge)
    }

    async fn link_similar_tickets(&mut self, ticket_id: i64, embedding: Vec<f32>) {
        let mut filter = HashMap::new();
        filter.insert("chunk_type".to_string(), "header".to_string());

        let hits = match self
            .vector_store
            .search(Collection::Tickets, embedding, 6, Some(&filter))
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Similarity lookup failed for ticket {}: {}", ticket_id, e);
                return;
            }
        };

        let mut edges = Vec::new();
        for (score, payload) in hits {
            if score < SIMILARITY_THRESHOLD {
                continue;
            }
            let Some(other_id) = payload
                .get("ticket_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<i64>().ok())
            else {
                continue;
            };
            if let Some(edge) = self
                .relationship_extractor
                .similar_to_edge(ticket_id, other_id, score)
            {
                edges.push(edge);
            }
        }

        if let Err(e) = self.add_edges_counted(edges).await {
            warn!("Similarity edges failed for ticket {}: {}", ticket_id, e);
        }
    }

    async fn sync_kb_articles(&mut self) {
        let articles = match self.source.fetch_kb_articles().await {
            Ok(articles) => articles,
            Err(e) => {
                error!("Error fetching KB articles: {}", e);
                self.stats.errors += 1;
                return;
            }
        };

        if articles.is_empty() {
            info!("No KB articles to sync");
            return;
        }

        for article in &articles {
            match self.process_kb_article(article).await {
                Ok(()) => self.stats.kb_synced += 1,
                Err(e) => {
                    error!("Error processing KB article {}: {}", article.kb_id, e);
                    self.stats.errors += 1;
                }
            }
        }
        info!("KB sync completed: {} articles synced", self.stats.kb_synced);
    }

    async fn process_kb_article(&mut self, article: &KbArticleRow) -> anyhow::Result<()> {
        let chunks = chunk_kb_article(article);
        self.upsert_entity_chunks(Collection::KnowledgeBase, "kb_id", article.kb_id, &chunks)
            .await?;

        let kb_node = format!("kb_{}", article.kb_id);
        self.add_node_counted(
            &kb_node,
            NodeType::KbArticle,
            object(&[
                ("title", json!(article.title)),
                ("tags", json!(article.tags.as_deref().unwrap_or(""))),
                (
                    "updated_at",
                    json!(article.updated_at.map(|d| d.to_rfc3339()).unwrap_or_default()),
                ),
            ]),
        )
        .await?;

        let entities = self.entity_extractor.extract(&article.content, None).await;
        let mut edges = Vec::new();
        for (entity_type, list) in &entities {
            for entity in list {
                let node_id = RelationshipExtractor::entity_node_id(*entity_type, &entity.text);
                self.add_node_counted(
                    &node_id,
                    entity_type.node_type(),
                    object(&[
                        ("name", json!(entity.text)),
                        ("confidence", json!(entity.confidence.to_string())),
                    ]),
                )
                .await?;
                edges.push(
                    GraphEdge::new(
                        &kb_node,
                        node_id,
                        helpdesk_models::graph::EdgeType::Mentions,
                        entity.confidence,
                    )
                    .with_property("entity_type", json!(entity_type.as_str())),
                );
            }
        }

        let facts = KbFacts {
            kb_id: article.kb_id,
            author_id: article.author_id,
            category: article.category.clone(),
            created_at: article.created_at.map(|d| d.to_rfc3339()),
        };
        if let Some(author_id) = facts.author_id {
            self.add_node_counted(&format!("user_{}", author_id), NodeType::User, Map::new())
                .await?;
        }
        if let Some(category) = facts.category.as_deref().filter(|c| !c.is_empty()) {
            self.add_node_counted(
                &helpdesk_models::graph::node_id("category", category),
                NodeType::Category,
                object(&[("name", json!(category))]),
            )
            .await?;
        }
        edges.extend(self.relationship_extractor.kb_edges(&facts));

        self.add_edges_counted(edges).await?;
        Ok(())
    }

    async fn sync_ci_items(&mut self) {
        let items = match self.source.fetch_ci_items().await {
            Ok(items) => items,
            Err(e) => {
                error!("Error fetching CI items: {}", e);
                self.stats.errors += 1;
                return;
            }
        };

        if items.is_empty() {
            info!("No CI items to sync");
            return;
        }

        for item in &items {
            match self.process_ci_item(item).await {
                Ok(()) => self.stats.ci_synced += 1,
                Err(e) => {
                    error!("Error processing CI item {}: {}", item.ci_id, e);
                    self.stats.errors += 1;
                }
            }
        }
        info!("CI sync completed: {} items synced", self.stats.ci_synced);
    }

    async fn process_ci_item(&mut self, item: &CiItemRow) -> anyhow::Result<()> {
        let chunks = chunk_ci_item(item);
        self.upsert_entity_chunks(Collection::ConfigurationItems, "ci_id", item.ci_id, &chunks)
            .await?;

        self.add_node_counted(
            &format!("ci_{}", item.ci_id),
            NodeType::Ci,
            object(&[
                ("ci_number", json!(item.ci_number)),
                ("name", json!(item.name)),
                ("type", json!(item.ci_type.as_deref().unwrap_or(""))),
                ("brand", json!(item.brand.as_deref().unwrap_or(""))),
                ("model", json!(item.model.as_deref().unwrap_or(""))),
                ("status", json!(item.status.as_deref().unwrap_or(""))),
                ("location", json!(item.location.as_deref().unwrap_or(""))),
            ]),
        )
        .await?;

        if let Some(location) = item.location.as_deref().filter(|l| !l.is_empty()) {
            self.add_node_counted(
                &helpdesk_models::graph::node_id("location", location),
                NodeType::Location,
                object(&[("name", json!(location))]),
            )
            .await?;
        }
        if let Some(department) = item.category.as_deref().filter(|d| !d.is_empty()) {
            self.add_node_counted(
                &helpdesk_models::graph::node_id("department", department),
                NodeType::Department,
                object(&[("name", json!(department))]),
            )
            .await?;
        }

        let facts = CiFacts {
            ci_id: item.ci_id,
            location: item.location.clone(),
            // The source schema has no separate department column; the CI
            // category fills that role.
            department: item.category.clone(),
            assigned_user_id: None,
        };
        let edges = self.relationship_extractor.ci_edges(&facts);
        self.add_edges_counted(edges).await?;
        Ok(())
    }

    /// Embed and upsert one entity's chunks, replacing anything previously
    /// stored for it. Returns the embeddings so callers can reuse them.
    async fn upsert_entity_chunks(
        &mut self,
        collection: Collection,
        id_key: &str,
        entity_id: i64,
        chunks: &[DocChunk],
    ) -> anyhow::Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let (embeddings, failed_batches) = self
            .embedding
            .embed_batch(&texts, self.embedding_batch_size)
            .await;
        self.stats.errors += failed_batches;

        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                let mut payload = chunk.payload.clone();
                payload.insert("chunk_id".to_string(), json!(chunk.chunk_id));
                if embedding.iter().all(|v| *v == 0.0) {
                    payload.insert("embedding_failed".to_string(), json!("true"));
                }
                VectorPoint {
                    id: point_id(&chunk.chunk_id),
                    vector: embedding.clone(),
                    payload,
                }
            })
            .collect();

        // Deterministic ids overwrite in place; the delete removes chunks the
        // entity no longer produces (a dropped comment, a cleared resolution).
        let mut filter = HashMap::new();
        filter.insert(id_key.to_string(), entity_id.to_string());
        self.vector_store.delete_by_filter(collection, &filter).await?;
        self.vector_store
            .upsert(collection, points, self.upsert_batch_size)
            .await?;

        Ok(embeddings)
    }

    async fn add_node_counted(
        &mut self,
        node_id: &str,
        node_type: NodeType,
        properties: Map<String, Value>,
    ) -> anyhow::Result<()> {
        self.graph.add_node(node_id, node_type, properties).await?;
        self.stats.entities_extracted += 1;
        Ok(())
    }

    async fn add_edges_counted(&mut self, edges: Vec<GraphEdge>) -> anyhow::Result<()> {
        for edge in self.relationship_extractor.validated(edges) {
            let added = self
                .graph
                .add_edge(
                    &edge.source_id,
                    &edge.target_id,
                    edge.edge_type,
                    edge.confidence,
                    Some(edge.properties),
                )
                .await?;
            if added {
                self.stats.relationships_created += 1;
            }
        }
        Ok(())
    }

    fn log_summary(&self) {
        let duration = match (self.stats.started_at, self.stats.finished_at) {
            (Some(start), Some(end)) => (end - start).num_seconds(),
            _ => 0,
        };
        info!("============================================================");
        info!("Sync finished in {}s", duration);
        info!(
            "Tickets: {}, KB articles: {}, CI items: {}",
            self.stats.tickets_synced, self.stats.kb_synced, self.stats.ci_synced
        );
        info!(
            "Graph writes: {} nodes, {} edges",
            self.stats.entities_extracted, self.stats.relationships_created
        );
        info!("Errors: {}", self.stats.errors);
        info!("============================================================");
    }
}

fn object(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
