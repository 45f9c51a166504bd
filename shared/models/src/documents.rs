use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Typed view over a vector-store payload.
///
/// Payloads arrive as flat string maps with a `type` discriminator; decoding
/// into this sum type is the only place the discriminator is interpreted.
/// All downstream text extraction goes through [`DocumentPayload::display_text`]
/// and [`DocumentPayload::searchable_text`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentPayload {
    Ticket(TicketPayload),
    KbArticle(KbArticlePayload),
    CiItem(CiItemPayload),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketPayload {
    #[serde(default)]
    pub ticket_id: String,
    #[serde(default)]
    pub ticket_number: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub chunk_type: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbArticlePayload {
    #[serde(default)]
    pub kb_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub chunk_type: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiItemPayload {
    #[serde(default)]
    pub ci_id: String,
    #[serde(default)]
    pub ci_number: String,
    #[serde(default)]
    pub name: String,
    /// CI type lives under `ci_type` so it cannot collide with the payload
    /// discriminator key.
    #[serde(default)]
    pub ci_type: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub chunk_type: String,
    #[serde(default)]
    pub updated_at: String,
}

impl DocumentPayload {
    /// Decode a raw payload map. Unknown or missing discriminators yield `None`;
    /// callers fall back to generic text extraction in that case.
    pub fn from_map(payload: &Map<String, Value>) -> Option<Self> {
        serde_json::from_value(Value::Object(payload.clone())).ok()
    }

    /// Human-readable document text for presenting a hit to the agent.
    pub fn display_text(&self) -> String {
        match self {
            DocumentPayload::Ticket(t) => {
                let number = if t.ticket_number.is_empty() {
                    "N/A"
                } else {
                    &t.ticket_number
                };
                format!("Ticket {}: {}\n{}", number, t.title, t.description)
            }
            DocumentPayload::KbArticle(kb) => format!("{}\n{}", kb.title, kb.content),
            DocumentPayload::CiItem(ci) => {
                format!("{} ({})\n{}", ci.name, ci.ci_type, ci.notes)
            }
        }
    }

    /// Whitespace-joined text fed to the keyword index.
    pub fn searchable_text(&self) -> String {
        let parts: Vec<&str> = match self {
            DocumentPayload::Ticket(t) => {
                vec![&t.title, &t.description, &t.ticket_number]
            }
            DocumentPayload::KbArticle(kb) => vec![&kb.title, &kb.content, &kb.tags],
            DocumentPayload::CiItem(ci) => vec![&ci.name, &ci.ci_type, &ci.notes],
        };
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Fallback text extraction for payloads without a usable discriminator:
/// concatenates the conventional text-bearing fields that are present.
pub fn generic_text(payload: &Map<String, Value>) -> String {
    let mut parts = Vec::new();
    for key in ["title", "name", "description", "content", "notes"] {
        if let Some(value) = payload.get(key).and_then(|v| v.as_str()) {
            if !value.is_empty() {
                parts.push(value.to_string());
            }
        }
    }
    if parts.is_empty() {
        Value::Object(payload.clone()).to_string()
    } else {
        parts.join("\n")
    }
}

/// Sanitize a metadata map so every value is a string. Nulls become empty
/// strings, scalars are stringified. This is a contract with both the vector
/// store and the JSON API.
pub fn sanitize_metadata(payload: &Map<String, Value>) -> Map<String, Value> {
    let mut sanitized = Map::new();
    for (key, value) in payload {
        let text = match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        sanitized.insert(key.clone(), Value::String(text));
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_decode_ticket_payload() {
        let payload = map(json!({
            "type": "ticket",
            "ticket_number": "T-2024-001",
            "title": "Laptop start niet op",
            "description": "Blue screen bij opstarten",
            "status": "Open"
        }));

        let doc = DocumentPayload::from_map(&payload).unwrap();
        let text = doc.display_text();
        assert!(text.starts_with("Ticket T-2024-001: Laptop start niet op"));
        assert!(text.contains("Blue screen"));
    }

    #[test]
    fn test_decode_unknown_type_falls_back() {
        let payload = map(json!({ "type": "mystery", "title": "Iets" }));
        assert!(DocumentPayload::from_map(&payload).is_none());
        assert_eq!(generic_text(&payload), "Iets");
    }

    #[test]
    fn test_searchable_text_skips_empty_fields() {
        let payload = map(json!({
            "type": "kb_article",
            "title": "BIOS reset",
            "content": "Houd F2 ingedrukt tijdens het opstarten",
            "tags": ""
        }));
        let doc = DocumentPayload::from_map(&payload).unwrap();
        assert_eq!(
            doc.searchable_text(),
            "BIOS reset Houd F2 ingedrukt tijdens het opstarten"
        );
    }

    #[test]
    fn test_sanitize_metadata_stringifies_everything() {
        let payload = map(json!({
            "ticket_id": 42,
            "resolution": null,
            "is_published": true,
            "title": "Printer kapot"
        }));

        let sanitized = sanitize_metadata(&payload);
        assert_eq!(sanitized["ticket_id"], json!("42"));
        assert_eq!(sanitized["resolution"], json!(""));
        assert_eq!(sanitized["is_published"], json!("true"));
        assert_eq!(sanitized["title"], json!("Printer kapot"));
    }
}
