//! Entity extraction from ticket free text and structured fields.
//!
//! Combines an optional external NER model with regex passes for error codes,
//! network identifiers, brand/model mentions, and location keywords. When the
//! NER model is unavailable the extractor degrades to regex-only with a
//! warning; it never fails construction.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use helpdesk_models::graph::{NodeType, CONFIDENCE_DIRECT, CONFIDENCE_NER, CONFIDENCE_PATTERN};

/// Internal entity buckets. These map 1:1 onto extracted-entity node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
    Error,
    Person,
    Organization,
    Location,
    Misc,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Error => "error",
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Misc => "misc",
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            EntityType::Product => NodeType::Product,
            EntityType::Error => NodeType::Error,
            EntityType::Person => NodeType::Person,
            EntityType::Organization => NodeType::Organization,
            EntityType::Location => NodeType::Location,
            EntityType::Misc => NodeType::Misc,
        }
    }
}

/// A single extracted mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    pub label: String,
    pub confidence: f32,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub source: Option<String>,
}

/// Span produced by the external NER model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NerSpan {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// External NER model. Only the interface is part of this system; the model
/// itself runs elsewhere.
#[async_trait]
pub trait NerModel: Send + Sync {
    async fn annotate(&self, text: &str) -> anyhow::Result<Vec<NerSpan>>;
}

/// NER model behind an HTTP endpoint (`POST {base}/annotate`).
pub struct HttpNerModel {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNerModel {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl NerModel for HttpNerModel {
    async fn annotate(&self, text: &str) -> anyhow::Result<Vec<NerSpan>> {
        let url = format!("{}/annotate", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("NER service returned status {}", response.status());
        }

        Ok(response.json().await?)
    }
}

lazy_static! {
    static ref RE_HEX_ERROR: Regex = Regex::new(r"\b0x[0-9A-Fa-f]{8}\b").unwrap();
    static ref RE_BSOD: Regex = Regex::new(r"(?i)\b(blue\s*screen|bsod)\b").unwrap();
    static ref RE_HTTP_STATUS: Regex =
        Regex::new(r"(?i)\b(?:error|status)\s*:?\s*([45]\d{2})\b").unwrap();
    static ref RE_HTTP_CODE: Regex = Regex::new(r"(?i)\bhttp\s+([45]\d{2})\b").unwrap();
    static ref RE_FATAL: Regex =
        Regex::new(r"(?i)\b(fatal error|kernel panic|failed with code \d+)\b").unwrap();
    static ref RE_ERROR_CODE: Regex =
        Regex::new(r"(?i)error\s+code\s*:?\s*([A-Z0-9][A-Z0-9-]{2,})").unwrap();
    static ref RE_IPV4: Regex = Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap();
    static ref RE_EMAIL: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref RE_MODEL_SERIES: Regex =
        Regex::new(r"\b(?:Latitude|Optiplex|ThinkPad|Pavilion|ProBook|LaserJet)\s+\d{3,4}\b")
            .unwrap();
}

const KNOWN_BRANDS: &[&str] = &[
    "dell", "hp", "lenovo", "asus", "acer", "microsoft", "apple", "cisco", "netgear", "tp-link",
    "canon", "epson", "brother", "samsung", "lg", "intel", "amd", "nvidia", "adobe", "oracle",
];

const KNOWN_LOCATIONS: &[&str] = &[
    "hengelo",
    "enschede",
    "kantoor hengelo",
    "kantoor enschede",
    "magazijn",
    "serverruimte",
    "server room",
    "warehouse",
];

/// Extracted entities grouped per type, deduplicated by lowercased text with
/// the highest confidence kept.
pub type EntityMap = HashMap<EntityType, Vec<ExtractedEntity>>;

pub struct EntityExtractor {
    ner: Option<Arc<dyn NerModel>>,
    brands: HashSet<&'static str>,
    brand_patterns: Vec<Regex>,
}

impl EntityExtractor {
    pub fn new(ner: Option<Arc<dyn NerModel>>) -> Self {
        let brand_patterns = KNOWN_BRANDS
            .iter()
            .map(|brand| {
                Regex::new(&format!(r"(?i)\b{}\s+[A-Za-z0-9][A-Za-z0-9 -]*\d\b", brand)).unwrap()
            })
            .collect();

        Self {
            ner,
            brands: KNOWN_BRANDS.iter().copied().collect(),
            brand_patterns,
        }
    }

    /// Regex-only extractor, used when no NER endpoint is configured.
    pub fn regex_only() -> Self {
        Self::new(None)
    }

    /// Build from the `NER_URL` environment variable when set. A missing
    /// variable is not an error; extraction falls back to regex-only.
    pub fn from_env() -> Self {
        match std::env::var("NER_URL") {
            Ok(url) if !url.is_empty() => Self::new(Some(Arc::new(HttpNerModel::new(url)))),
            _ => {
                warn!("NER_URL not set, entity extraction runs regex-only");
                Self::regex_only()
            }
        }
    }

    /// Extract typed entity mentions from free text plus an optional map of
    /// structured field values.
    pub async fn extract(
        &self,
        text: &str,
        structured_fields: Option<&HashMap<String, String>>,
    ) -> EntityMap {
        let mut entities: Vec<(EntityType, ExtractedEntity)> = Vec::new();

        if !text.trim().is_empty() {
            self.run_ner(text, &mut entities).await;
            self.run_patterns(text, &mut entities);
        }

        if let Some(fields) = structured_fields {
            for (name, value) in fields {
                if value.trim().is_empty() {
                    continue;
                }
                let bucket = structured_field_bucket(name);
                if let Some(entity_type) = bucket {
                    entities.push((
                        entity_type,
                        ExtractedEntity {
                            text: value.clone(),
                            label: "FIELD".to_string(),
                            confidence: CONFIDENCE_DIRECT,
                            start: None,
                            end: None,
                            source: Some("dynamic_field".to_string()),
                        },
                    ));
                }
            }
        }

        let deduplicated = deduplicate(entities);
        debug!(
            "Extracted entities: {}",
            deduplicated.values().map(|v| v.len()).sum::<usize>()
        );
        deduplicated
    }

    async fn run_ner(&self, text: &str, out: &mut Vec<(EntityType, ExtractedEntity)>) {
        let Some(ner) = &self.ner else {
            return;
        };

        let spans = match ner.annotate(text).await {
            Ok(spans) => spans,
            Err(e) => {
                warn!("NER annotation failed, continuing regex-only: {}", e);
                return;
            }
        };

        for span in spans {
            let entity_type = self.map_ner_label(&span.label, &span.text);
            out.push((
                entity_type,
                ExtractedEntity {
                    text: span.text,
                    label: span.label,
                    confidence: CONFIDENCE_NER,
                    start: Some(span.start),
                    end: Some(span.end),
                    source: Some("ner".to_string()),
                },
            ));
        }
    }

    /// NER label mapping: PER/PERSON -> person, ORG -> organization (unless
    /// the surface form is a known hardware/software brand, then product),
    /// LOC/GPE -> location, PRODUCT -> product, everything else -> misc.
    fn map_ner_label(&self, label: &str, surface: &str) -> EntityType {
        match label {
            "PER" | "PERSON" => EntityType::Person,
            "ORG" => {
                if self.brands.contains(surface.to_lowercase().as_str()) {
                    EntityType::Product
                } else {
                    EntityType::Organization
                }
            }
            "LOC" | "GPE" => EntityType::Location,
            "PRODUCT" => EntityType::Product,
            _ => EntityType::Misc,
        }
    }

    fn run_patterns(&self, text: &str, out: &mut Vec<(EntityType, ExtractedEntity)>) {
        let mut push = |entity_type: EntityType, text: String, label: &str| {
            out.push((
                entity_type,
                ExtractedEntity {
                    text,
                    label: label.to_string(),
                    confidence: CONFIDENCE_PATTERN,
                    start: None,
                    end: None,
                    source: Some("pattern".to_string()),
                },
            ));
        };

        for m in RE_HEX_ERROR.find_iter(text) {
            push(EntityType::Error, m.as_str().to_string(), "ERROR_CODE");
        }
        for m in RE_BSOD.find_iter(text) {
            push(EntityType::Error, m.as_str().to_string(), "ERROR");
        }
        for caps in RE_HTTP_STATUS.captures_iter(text) {
            push(
                EntityType::Error,
                format!("HTTP {}", &caps[1]),
                "HTTP_ERROR",
            );
        }
        for caps in RE_HTTP_CODE.captures_iter(text) {
            push(
                EntityType::Error,
                format!("HTTP {}", &caps[1]),
                "HTTP_ERROR",
            );
        }
        for m in RE_FATAL.find_iter(text) {
            push(EntityType::Error, m.as_str().to_string(), "ERROR");
        }
        for caps in RE_ERROR_CODE.captures_iter(text) {
            push(EntityType::Error, caps[1].to_string(), "ERROR_CODE");
        }

        for m in RE_IPV4.find_iter(text) {
            if is_valid_ipv4(m.as_str()) {
                push(EntityType::Misc, m.as_str().to_string(), "IP_ADDRESS");
            }
        }
        for m in RE_EMAIL.find_iter(text) {
            push(EntityType::Misc, m.as_str().to_string(), "EMAIL");
        }

        for pattern in &self.brand_patterns {
            for m in pattern.find_iter(text) {
                push(EntityType::Product, m.as_str().to_string(), "PRODUCT");
            }
        }
        for m in RE_MODEL_SERIES.find_iter(text) {
            push(EntityType::Product, m.as_str().to_string(), "MODEL");
        }

        let text_lower = text.to_lowercase();
        for location in KNOWN_LOCATIONS {
            if text_lower.contains(location) {
                push(EntityType::Location, location.to_string(), "LOCATION");
            }
        }
    }
}

fn structured_field_bucket(field_name: &str) -> Option<EntityType> {
    let name = field_name.to_lowercase();
    if name.contains("merk") || name.contains("brand") || name.contains("model") {
        Some(EntityType::Product)
    } else if name.contains("locatie") || name.contains("location") {
        Some(EntityType::Location)
    } else if name.contains("leverancier") || name.contains("supplier") {
        Some(EntityType::Organization)
    } else {
        None
    }
}

fn is_valid_ipv4(candidate: &str) -> bool {
    candidate
        .split('.')
        .all(|octet| octet.parse::<u32>().map_or(false, |n| n <= 255))
}

/// Deduplicate per type by lowercased text, keeping the highest confidence.
fn deduplicate(entities: Vec<(EntityType, ExtractedEntity)>) -> EntityMap {
    let mut buckets: HashMap<EntityType, HashMap<String, ExtractedEntity>> = HashMap::new();

    for (entity_type, entity) in entities {
        let key = entity.text.to_lowercase();
        let bucket = buckets.entry(entity_type).or_default();
        match bucket.get(&key) {
            Some(existing) if existing.confidence >= entity.confidence => {}
            _ => {
                bucket.insert(key, entity);
            }
        }
    }

    buckets
        .into_iter()
        .map(|(entity_type, bucket)| {
            let mut list: Vec<ExtractedEntity> = bucket.into_values().collect();
            list.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.text.cmp(&b.text))
            });
            (entity_type, list)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_extraction() {
        let extractor = EntityExtractor::regex_only();
        let text = "Laptop Dell Latitude 5520 start niet op na Windows update.\n\
                    Error code: 0x0000007B\n\
                    IP adres: 192.168.1.100\n\
                    Contact: jan.jansen@voorbeeld.nl\n\
                    Status: HTTP 500 error bij printen in kantoor Hengelo.";

        let entities = extractor.extract(text, None).await;

        let errors = &entities[&EntityType::Error];
        assert!(errors.iter().any(|e| e.text == "0x0000007B"));
        assert!(errors.iter().any(|e| e.text == "HTTP 500"));

        let misc = &entities[&EntityType::Misc];
        assert!(misc.iter().any(|e| e.text == "192.168.1.100"));
        assert!(misc.iter().any(|e| e.text == "jan.jansen@voorbeeld.nl"));

        let products = &entities[&EntityType::Product];
        assert!(products.iter().any(|e| e.text.contains("Latitude 5520")));

        let locations = &entities[&EntityType::Location];
        assert!(locations.iter().any(|e| e.text == "kantoor hengelo"));
    }

    #[tokio::test]
    async fn test_invalid_ip_rejected() {
        let extractor = EntityExtractor::regex_only();
        let entities = extractor.extract("server op 300.1.2.999 reageert niet", None).await;
        assert!(entities
            .get(&EntityType::Misc)
            .map_or(true, |misc| misc.iter().all(|e| e.label != "IP_ADDRESS")));
    }

    #[tokio::test]
    async fn test_structured_fields_take_precedence() {
        let extractor = EntityExtractor::regex_only();
        let mut fields = HashMap::new();
        fields.insert("Merk".to_string(), "Dell".to_string());
        fields.insert("Locatie".to_string(), "Kantoor Enschede".to_string());
        fields.insert("Prioriteit".to_string(), "Hoog".to_string());

        let entities = extractor.extract("", Some(&fields)).await;

        let products = &entities[&EntityType::Product];
        let dell = products.iter().find(|e| e.text == "Dell").unwrap();
        assert_eq!(dell.confidence, 1.0);
        assert_eq!(dell.source.as_deref(), Some("dynamic_field"));

        let locations = &entities[&EntityType::Location];
        assert!(locations.iter().any(|e| e.text == "Kantoor Enschede"));
        // Unmapped field names are ignored.
        assert!(entities
            .values()
            .flatten()
            .all(|e| e.text != "Hoog"));
    }

    #[tokio::test]
    async fn test_dedup_keeps_highest_confidence() {
        struct StubNer;

        #[async_trait]
        impl NerModel for StubNer {
            async fn annotate(&self, _text: &str) -> anyhow::Result<Vec<NerSpan>> {
                Ok(vec![NerSpan {
                    text: "BSOD".to_string(),
                    label: "MISC".to_string(),
                    start: 0,
                    end: 4,
                }])
            }
        }

        let extractor = EntityExtractor::regex_only();
        // The same surface form in two cases: one occurrence survives.
        let entities = extractor.extract("bsod gezien, daarna nog een BSOD", None).await;
        let errors = &entities[&EntityType::Error];
        let bsod_count = errors
            .iter()
            .filter(|e| e.text.to_lowercase() == "bsod")
            .count();
        assert_eq!(bsod_count, 1);

        // NER failure path: a working stub routes MISC to the misc bucket.
        let with_ner = EntityExtractor::new(Some(Arc::new(StubNer)));
        let entities = with_ner.extract("bsod", None).await;
        // Pattern confidence (0.85) beats NER (0.80) for the error bucket;
        // the NER span lands in misc.
        assert!(entities[&EntityType::Error]
            .iter()
            .any(|e| e.confidence == CONFIDENCE_PATTERN));
        assert!(entities[&EntityType::Misc]
            .iter()
            .any(|e| e.source.as_deref() == Some("ner")));
    }
}
