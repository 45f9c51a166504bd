//! Read side of the ingestion pipeline: rows from the relational source
//! store. The source store is the sole system of record; everything the
//! indices and the graph hold is derived from these queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TicketRow {
    pub ticket_id: i64,
    pub ticket_number: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub resolution: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub user_id: Option<i64>,
    pub assigned_to: Option<i64>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub comment_id: i64,
    pub comment: String,
    pub created_at: Option<DateTime<Utc>>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DynamicFieldRow {
    pub field_name: String,
    pub field_value: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CiLinkRow {
    pub ci_id: i64,
    pub ci_number: String,
    pub ci_name: String,
    pub ci_type: Option<String>,
    pub impact_level: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KbArticleRow {
    pub kb_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Option<String>,
    pub category: Option<String>,
    pub author_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CiItemRow {
    pub ci_id: i64,
    pub ci_number: String,
    pub name: String,
    pub ci_type: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A ticket with all its related rows.
#[derive(Debug, Clone)]
pub struct TicketBundle {
    pub ticket: TicketRow,
    pub comments: Vec<CommentRow>,
    pub dynamic_fields: Vec<DynamicFieldRow>,
    pub related_cis: Vec<CiLinkRow>,
}

pub struct SourceDb {
    pool: PgPool,
}

impl SourceDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Tickets updated (or created) within the window, newest first, with
    /// their comments, dynamic fields, and CI links.
    pub async fn fetch_ticket_bundles(
        &self,
        since_hours: Option<i64>,
        limit: Option<i64>,
    ) -> anyhow::Result<Vec<TicketBundle>> {
        info!(
            "Fetching tickets (since_hours={:?}, limit={:?})...",
            since_hours, limit
        );

        let base = r#"
            SELECT
                t.ticket_id, t.ticket_number, t.title, t.description,
                t.priority, t.status, t.category, t.resolution,
                t.created_at, t.updated_at, t.user_id, t.assigned_to,
                TRIM(CONCAT(u.first_name, ' ', u.last_name)) AS user_name,
                u.email AS user_email
            FROM tickets t
            LEFT JOIN users u ON t.user_id = u.user_id
        "#;

        let tickets: Vec<TicketRow> = match (since_hours, limit) {
            (Some(hours), Some(limit)) => {
                sqlx::query_as(&format!(
                    "{base} WHERE t.updated_at >= NOW() - make_interval(hours => $1) \
                     OR t.created_at >= NOW() - make_interval(hours => $1) \
                     ORDER BY t.updated_at DESC LIMIT $2"
                ))
                .bind(hours as i32)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(hours), None) => {
                sqlx::query_as(&format!(
                    "{base} WHERE t.updated_at >= NOW() - make_interval(hours => $1) \
                     OR t.created_at >= NOW() - make_interval(hours => $1) \
                     ORDER BY t.updated_at DESC"
                ))
                .bind(hours as i32)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(limit)) => {
                sqlx::query_as(&format!("{base} ORDER BY t.updated_at DESC LIMIT $1"))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, None) => {
                sqlx::query_as(&format!("{base} ORDER BY t.updated_at DESC"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut bundles = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let comments = self.fetch_comments(ticket.ticket_id).await?;
            let dynamic_fields = self.fetch_dynamic_fields(ticket.ticket_id).await;
            let related_cis = self.fetch_related_cis(ticket.ticket_id).await;
            bundles.push(TicketBundle {
                ticket,
                comments,
                dynamic_fields,
                related_cis,
            });
        }

        info!("Fetched {} tickets", bundles.len());
        Ok(bundles)
    }

    async fn fetch_comments(&self, ticket_id: i64) -> anyhow::Result<Vec<CommentRow>> {
        let comments = sqlx::query_as(
            r#"
            SELECT tc.comment_id, tc.comment, tc.created_at,
                   TRIM(CONCAT(cu.first_name, ' ', cu.last_name)) AS user_name
            FROM ticket_comments tc
            JOIN users cu ON tc.user_id = cu.user_id
            WHERE tc.ticket_id = $1
            ORDER BY tc.created_at
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    /// Dynamic field values. A missing table yields the empty list.
    async fn fetch_dynamic_fields(&self, ticket_id: i64) -> Vec<DynamicFieldRow> {
        let result = sqlx::query_as(
            r#"
            SELECT cf.field_name, tfv.field_value
            FROM ticket_field_values tfv
            JOIN category_fields cf ON tfv.field_id = cf.field_id
            WHERE tfv.ticket_id = $1
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Dynamic fields unavailable for ticket {}: {}", ticket_id, e);
                Vec::new()
            }
        }
    }

    /// CI link rows. A missing table yields the empty list.
    async fn fetch_related_cis(&self, ticket_id: i64) -> Vec<CiLinkRow> {
        let result = sqlx::query_as(
            r#"
            SELECT ci.ci_id, ci.ci_number, ci.name AS ci_name, ci.type AS ci_type,
                   tcr.impact_level
            FROM ticket_ci_relations tcr
            JOIN configuration_items ci ON tcr.ci_id = ci.ci_id
            WHERE tcr.ticket_id = $1
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(links) => links,
            Err(e) => {
                warn!("CI relations unavailable for ticket {}: {}", ticket_id, e);
                Vec::new()
            }
        }
    }

    /// Published KB articles, newest first.
    pub async fn fetch_kb_articles(&self) -> anyhow::Result<Vec<KbArticleRow>> {
        info!("Fetching KB articles...");
        let articles: Vec<KbArticleRow> = sqlx::query_as(
            r#"
            SELECT kb_id, title, content, tags, category, author_id, created_at, updated_at
            FROM knowledge_base
            WHERE is_published = TRUE
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        info!("Fetched {} KB articles", articles.len());
        Ok(articles)
    }

    /// Active configuration items (written-off CIs are skipped).
    pub async fn fetch_ci_items(&self) -> anyhow::Result<Vec<CiItemRow>> {
        info!("Fetching CI items...");
        let items: Vec<CiItemRow> = sqlx::query_as(
            r#"
            SELECT ci_id, ci_number, name, type AS ci_type, brand, model,
                   serial_number, category, status, location, notes,
                   created_at, updated_at
            FROM configuration_items
            WHERE status <> 'Afgeschreven'
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        info!("Fetched {} CI items", items.len());
        Ok(items)
    }

    /// Keyword match from a resolution text to a published KB article: the
    /// first three words of the resolution against title and content.
    pub async fn find_kb_by_keywords(&self, resolution: &str) -> Option<(i64, String)> {
        let keywords: Vec<&str> = resolution.split_whitespace().take(3).collect();
        if keywords.is_empty() {
            return None;
        }
        let pattern = format!("%{}%", keywords.join(" ").to_lowercase());

        let result: Result<Option<(i64, String)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT kb_id, title
            FROM knowledge_base
            WHERE is_published = TRUE
              AND (LOWER(title) LIKE $1 OR LOWER(content) LIKE $1)
            LIMIT 1
            "#,
        )
        .bind(&pattern)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Error finding related KB: {}", e);
                None
            }
        }
    }
}
