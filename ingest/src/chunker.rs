//! Semantic chunking of source entities.
//!
//! Tickets split into header, description, dynamic-field group, one chunk per
//! comment (source order preserved), resolution (closed tickets only), and a
//! related-CI list. KB articles and CI items are single-chunk. Only non-empty
//! chunks are emitted, and chunk ids are deterministic, so re-ingesting an
//! entity produces the same ids every time.

use serde_json::{json, Map, Value};

use helpdesk_models::chunking::{ChunkKind, DocChunk, EntityKind};
use helpdesk_models::documents::sanitize_metadata;

use crate::source::{CiItemRow, KbArticleRow, TicketBundle};

fn is_closed(status: &str) -> bool {
    matches!(
        status.to_lowercase().as_str(),
        "closed" | "gesloten" | "resolved" | "opgelost"
    )
}

fn ticket_base_payload(bundle: &TicketBundle) -> Map<String, Value> {
    let t = &bundle.ticket;
    let mut payload = Map::new();
    payload.insert("type".to_string(), json!("ticket"));
    payload.insert("ticket_id".to_string(), json!(t.ticket_id));
    payload.insert("ticket_number".to_string(), json!(t.ticket_number));
    payload.insert("title".to_string(), json!(t.title));
    payload.insert("description".to_string(), json!(t.description));
    payload.insert("priority".to_string(), json!(t.priority));
    payload.insert("status".to_string(), json!(t.status));
    payload.insert("category".to_string(), json!(t.category));
    payload.insert(
        "created_at".to_string(),
        json!(t.created_at.map(|d| d.to_rfc3339())),
    );
    payload.insert(
        "updated_at".to_string(),
        json!(t.updated_at.map(|d| d.to_rfc3339())),
    );
    payload
}

fn with_chunk_type(mut payload: Map<String, Value>, kind: ChunkKind) -> Map<String, Value> {
    payload.insert("chunk_type".to_string(), json!(kind.as_str()));
    sanitize_metadata(&payload)
}

/// Split a ticket into semantic chunks.
pub fn chunk_ticket(bundle: &TicketBundle) -> Vec<DocChunk> {
    let t = &bundle.ticket;
    let mut chunks = Vec::new();

    let header = format!(
        "Ticket {}: {}\nPriority: {}\nStatus: {}",
        t.ticket_number,
        t.title,
        t.priority.as_deref().unwrap_or(""),
        t.status.as_deref().unwrap_or("")
    );
    chunks.push(DocChunk::new(
        EntityKind::Ticket,
        t.ticket_id,
        ChunkKind::Header,
        0,
        header,
        with_chunk_type(ticket_base_payload(bundle), ChunkKind::Header),
    ));

    if let Some(description) = t.description.as_deref().filter(|d| !d.trim().is_empty()) {
        chunks.push(DocChunk::new(
            EntityKind::Ticket,
            t.ticket_id,
            ChunkKind::Description,
            0,
            format!("Problem Description:\n{}", description),
            with_chunk_type(ticket_base_payload(bundle), ChunkKind::Description),
        ));
    }

    let fields: Vec<String> = bundle
        .dynamic_fields
        .iter()
        .filter_map(|field| {
            field
                .field_value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(|value| format!("- {}: {}", field.field_name, value))
        })
        .collect();
    if !fields.is_empty() {
        chunks.push(DocChunk::new(
            EntityKind::Ticket,
            t.ticket_id,
            ChunkKind::DynamicFields,
            0,
            format!("Additional Details:\n{}", fields.join("\n")),
            with_chunk_type(ticket_base_payload(bundle), ChunkKind::DynamicFields),
        ));
    }

    for (index, comment) in bundle.comments.iter().enumerate() {
        if comment.comment.trim().is_empty() {
            continue;
        }
        let author = comment.user_name.as_deref().unwrap_or("onbekend");
        let timestamp = comment
            .created_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let content = format!("Comment by {} ({}):\n{}", author, timestamp, comment.comment);

        let mut payload = ticket_base_payload(bundle);
        payload.insert("comment_index".to_string(), json!(index));
        payload.insert("comment_author".to_string(), json!(author));
        chunks.push(DocChunk::new(
            EntityKind::Ticket,
            t.ticket_id,
            ChunkKind::Comment,
            index as u32,
            content,
            with_chunk_type(payload, ChunkKind::Comment),
        ));
    }

    let status = t.status.as_deref().unwrap_or("");
    if is_closed(status) {
        if let Some(resolution) = t.resolution.as_deref().filter(|r| !r.trim().is_empty()) {
            chunks.push(DocChunk::new(
                EntityKind::Ticket,
                t.ticket_id,
                ChunkKind::Resolution,
                0,
                format!("Resolution:\n{}", resolution),
                with_chunk_type(ticket_base_payload(bundle), ChunkKind::Resolution),
            ));
        }
    }

    if !bundle.related_cis.is_empty() {
        let lines: Vec<String> = bundle
            .related_cis
            .iter()
            .map(|ci| {
                format!(
                    "- {}: {} ({})",
                    ci.ci_number,
                    ci.ci_name,
                    ci.ci_type.as_deref().unwrap_or("")
                )
            })
            .collect();
        chunks.push(DocChunk::new(
            EntityKind::Ticket,
            t.ticket_id,
            ChunkKind::RelatedCis,
            0,
            format!("Related Configuration Items:\n{}", lines.join("\n")),
            with_chunk_type(ticket_base_payload(bundle), ChunkKind::RelatedCis),
        ));
    }

    chunks
}

/// A KB article becomes one chunk.
pub fn chunk_kb_article(article: &KbArticleRow) -> Vec<DocChunk> {
    let mut content = format!("KB Article: {}\n\n", article.title);
    if let Some(tags) = article.tags.as_deref().filter(|t| !t.is_empty()) {
        content.push_str(&format!("Tags: {}\n\n", tags));
    }
    content.push_str(&article.content);

    let mut payload = Map::new();
    payload.insert("type".to_string(), json!("kb_article"));
    payload.insert("kb_id".to_string(), json!(article.kb_id));
    payload.insert("title".to_string(), json!(article.title));
    payload.insert("content".to_string(), json!(article.content));
    payload.insert("tags".to_string(), json!(article.tags));
    payload.insert("category".to_string(), json!(article.category));
    payload.insert(
        "updated_at".to_string(),
        json!(article.updated_at.map(|d| d.to_rfc3339())),
    );

    vec![DocChunk::new(
        EntityKind::Kb,
        article.kb_id,
        ChunkKind::KbArticle,
        0,
        content,
        with_chunk_type(payload, ChunkKind::KbArticle),
    )]
}

/// A CI item becomes one chunk.
pub fn chunk_ci_item(item: &CiItemRow) -> Vec<DocChunk> {
    let mut content = format!("CI: {}\n", item.ci_number);
    content.push_str(&format!("Type: {}\n", item.ci_type.as_deref().unwrap_or("")));
    content.push_str(&format!("Name: {}\n", item.name));
    for (label, value) in [
        ("Brand", item.brand.as_deref()),
        ("Model", item.model.as_deref()),
        ("Serial Number", item.serial_number.as_deref()),
        ("Category", item.category.as_deref()),
        ("Location", item.location.as_deref()),
    ] {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            content.push_str(&format!("{}: {}\n", label, value));
        }
    }
    if let Some(notes) = item.notes.as_deref().filter(|n| !n.is_empty()) {
        content.push_str(&format!("\nNotes: {}", notes));
    }

    let mut payload = Map::new();
    payload.insert("type".to_string(), json!("ci_item"));
    payload.insert("ci_id".to_string(), json!(item.ci_id));
    payload.insert("ci_number".to_string(), json!(item.ci_number));
    payload.insert("name".to_string(), json!(item.name));
    payload.insert("ci_type".to_string(), json!(item.ci_type));
    payload.insert("brand".to_string(), json!(item.brand));
    payload.insert("model".to_string(), json!(item.model));
    payload.insert("status".to_string(), json!(item.status));
    payload.insert("location".to_string(), json!(item.location));
    payload.insert("notes".to_string(), json!(item.notes));
    payload.insert(
        "updated_at".to_string(),
        json!(item.updated_at.map(|d| d.to_rfc3339())),
    );

    vec![DocChunk::new(
        EntityKind::Ci,
        item.ci_id,
        ChunkKind::CiItem,
        0,
        content,
        with_chunk_type(payload, ChunkKind::CiItem),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CiLinkRow, CommentRow, DynamicFieldRow, TicketRow};
    use chrono::{TimeZone, Utc};

    fn sample_bundle() -> TicketBundle {
        TicketBundle {
            ticket: TicketRow {
                ticket_id: 123,
                ticket_number: "T-2024-001".to_string(),
                title: "Laptop start niet op".to_string(),
                description: Some("Blue screen bij opstarten".to_string()),
                priority: Some("High".to_string()),
                status: Some("Closed".to_string()),
                category: Some("Hardware".to_string()),
                resolution: Some("BIOS update uitgevoerd".to_string()),
                created_at: Utc.with_ymd_and_hms(2024, 10, 20, 10, 30, 0).single(),
                updated_at: Utc.with_ymd_and_hms(2024, 10, 21, 9, 0, 0).single(),
                user_id: Some(45),
                assigned_to: Some(12),
                user_name: Some("Jan Jansen".to_string()),
                user_email: Some("jan@voorbeeld.nl".to_string()),
            },
            comments: vec![
                CommentRow {
                    comment_id: 1,
                    comment: "Herstart geprobeerd, geen effect".to_string(),
                    created_at: Utc.with_ymd_and_hms(2024, 10, 20, 11, 0, 0).single(),
                    user_name: Some("Piet Peters".to_string()),
                },
                CommentRow {
                    comment_id: 2,
                    comment: "BIOS versie gecontroleerd".to_string(),
                    created_at: Utc.with_ymd_and_hms(2024, 10, 20, 12, 0, 0).single(),
                    user_name: Some("Jan Jansen".to_string()),
                },
            ],
            dynamic_fields: vec![DynamicFieldRow {
                field_name: "Merk".to_string(),
                field_value: Some("Dell".to_string()),
            }],
            related_cis: vec![CiLinkRow {
                ci_id: 789,
                ci_number: "CI-2024-789".to_string(),
                ci_name: "Dell Latitude 5520".to_string(),
                ci_type: Some("Laptop".to_string()),
                impact_level: Some("high".to_string()),
            }],
        }
    }

    #[test]
    fn test_full_ticket_produces_all_chunk_kinds() {
        let chunks = chunk_ticket(&sample_bundle());
        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                "ticket_123_header_0",
                "ticket_123_description_0",
                "ticket_123_dynamic_fields_0",
                "ticket_123_comment_0",
                "ticket_123_comment_1",
                "ticket_123_resolution_0",
                "ticket_123_related_cis_0",
            ]
        );
    }

    #[test]
    fn test_chunk_ids_are_stable_across_runs() {
        let first: Vec<String> = chunk_ticket(&sample_bundle())
            .into_iter()
            .map(|c| c.chunk_id)
            .collect();
        let second: Vec<String> = chunk_ticket(&sample_bundle())
            .into_iter()
            .map(|c| c.chunk_id)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let mut bundle = sample_bundle();
        bundle.ticket.description = Some("   ".to_string());
        bundle.ticket.status = Some("Open".to_string());
        bundle.comments.clear();
        bundle.dynamic_fields.clear();
        bundle.related_cis.clear();

        let chunks = chunk_ticket(&bundle);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "ticket_123_header_0");
    }

    #[test]
    fn test_resolution_only_for_closed_tickets() {
        let mut bundle = sample_bundle();
        bundle.ticket.status = Some("Open".to_string());
        let chunks = chunk_ticket(&bundle);
        assert!(chunks.iter().all(|c| c.kind != ChunkKind::Resolution));

        bundle.ticket.status = Some("Gesloten".to_string());
        let chunks = chunk_ticket(&bundle);
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Resolution));
    }

    #[test]
    fn test_comment_chunks_carry_author_and_order() {
        let chunks = chunk_ticket(&sample_bundle());
        let comments: Vec<&DocChunk> = chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::Comment)
            .collect();

        assert_eq!(comments.len(), 2);
        assert!(comments[0].content.contains("Comment by Piet Peters (2024-10-20 11:00)"));
        assert!(comments[1].content.contains("BIOS versie gecontroleerd"));
        assert_eq!(
            comments[0].payload["comment_author"],
            serde_json::json!("Piet Peters")
        );
    }

    #[test]
    fn test_payload_values_are_sanitized_strings() {
        let chunks = chunk_ticket(&sample_bundle());
        for chunk in &chunks {
            for (key, value) in &chunk.payload {
                assert!(value.is_string(), "payload key {} is not a string", key);
            }
        }
        assert_eq!(chunks[0].payload["ticket_id"], serde_json::json!("123"));
    }

    #[test]
    fn test_kb_and_ci_are_single_chunk() {
        let article = KbArticleRow {
            kb_id: 7,
            title: "BIOS reset".to_string(),
            content: "Houd F2 ingedrukt".to_string(),
            tags: Some("bios,hardware".to_string()),
            category: Some("Hardware".to_string()),
            author_id: Some(9),
            created_at: None,
            updated_at: None,
        };
        let chunks = chunk_kb_article(&article);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "kb_7_kb_article_0");
        assert!(chunks[0].content.contains("Tags: bios,hardware"));

        let item = CiItemRow {
            ci_id: 789,
            ci_number: "CI-2024-789".to_string(),
            name: "Dell Latitude 5520".to_string(),
            ci_type: Some("Laptop".to_string()),
            brand: Some("Dell".to_string()),
            model: Some("Latitude 5520".to_string()),
            serial_number: None,
            category: None,
            status: Some("In gebruik".to_string()),
            location: Some("Kantoor Hengelo".to_string()),
            notes: Some("Vervanging gepland".to_string()),
            created_at: None,
            updated_at: None,
        };
        let chunks = chunk_ci_item(&item);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "ci_789_ci_item_0");
        assert!(chunks[0].content.contains("Notes: Vervanging gepland"));
        assert_eq!(chunks[0].payload["ci_type"], serde_json::json!("Laptop"));
    }
}
