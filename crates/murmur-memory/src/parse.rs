// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strict parsing of LLM extraction output.
//!
//! Model output is untrusted. It is located (code fences and surrounding
//! prose are tolerated), parsed as JSON, and every array element is checked
//! against a JSON Schema before it is deserialized. Elements that fail the
//! schema are dropped; output that is not a JSON array at all is a
//! [`MurmurError::ParseFailure`].

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use murmur_core::MurmurError;
use murmur_core::types::{EntityType, ExtractedEntity, MemoryCategory, clamp_importance};

/// Strip a Markdown code fence and any prose around the outermost JSON array.
pub fn locate_json_array(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
            rest.rsplit_once("```").map(|(body, _)| body).unwrap_or(rest)
        }
        None => trimmed,
    };
    let start = body.find('[')?;
    let end = body.rfind(']')?;
    (start < end).then(|| &body[start..=end])
}

/// A compiled item schema plus the target type it guards.
pub struct SchemaParser {
    label: &'static str,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for SchemaParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaParser")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl SchemaParser {
    fn compile(label: &'static str, schema: Value) -> Result<Self, MurmurError> {
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| MurmurError::Internal(format!("invalid {label} schema: {e}")))?;
        Ok(Self { label, validator })
    }

    /// Parse `raw` into the schema-valid items it contains.
    pub fn parse_items<T: DeserializeOwned>(&self, raw: &str) -> Result<Vec<T>, MurmurError> {
        let json = locate_json_array(raw).ok_or_else(|| {
            MurmurError::ParseFailure(format!("{} output contains no JSON array", self.label))
        })?;
        let value: Value = serde_json::from_str(json)
            .map_err(|e| MurmurError::ParseFailure(format!("{} output: {e}", self.label)))?;
        let Value::Array(items) = value else {
            return Err(MurmurError::ParseFailure(format!(
                "{} output is not a JSON array",
                self.label
            )));
        };

        let mut parsed = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            if !self.validator.is_valid(&item) {
                let reasons: Vec<String> = self
                    .validator
                    .iter_errors(&item)
                    .map(|e| e.to_string())
                    .collect();
                debug!(label = self.label, index, ?reasons, "dropping schema-invalid item");
                continue;
            }
            match serde_json::from_value(item) {
                Ok(value) => parsed.push(value),
                Err(e) => debug!(label = self.label, index, error = %e, "dropping undecodable item"),
            }
        }
        Ok(parsed)
    }
}

// --- Entities ---

#[derive(Debug, Deserialize)]
struct RawEntity {
    text: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    context: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// Parser for entity extraction output.
#[derive(Debug)]
pub struct EntityParser(SchemaParser);

impl EntityParser {
    pub fn new() -> Result<Self, MurmurError> {
        let schema = json!({
            "type": "object",
            "required": ["text", "type"],
            "properties": {
                "text": { "type": "string", "minLength": 1, "maxLength": 200 },
                "type": { "type": "string", "minLength": 1 },
                "confidence": { "type": "number" },
                "context": { "type": "string" }
            }
        });
        SchemaParser::compile("entity", schema).map(Self)
    }

    /// Unknown types become `OTHER`; confidence is clamped into `[0, 1]`.
    pub fn parse(&self, raw: &str) -> Result<Vec<ExtractedEntity>, MurmurError> {
        let items: Vec<RawEntity> = self.0.parse_items(raw)?;
        Ok(items
            .into_iter()
            .filter_map(|e| {
                let text = e.text.trim().to_string();
                (!text.is_empty()).then(|| ExtractedEntity {
                    text,
                    entity_type: EntityType::parse_lenient(&e.entity_type),
                    confidence: e.confidence.clamp(0.0, 1.0),
                    context: e.context,
                })
            })
            .collect())
    }
}

// --- Facts ---

/// A durable fact proposed by the extraction model.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFact {
    pub category: MemoryCategory,
    pub content: String,
    pub importance: u8,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(default)]
    category: String,
    content: String,
    #[serde(default = "default_importance")]
    importance: f64,
    #[serde(default)]
    tags: Vec<String>,
}

fn default_importance() -> f64 {
    5.0
}

/// Parser for fact extraction output.
#[derive(Debug)]
pub struct FactParser(SchemaParser);

impl FactParser {
    pub fn new() -> Result<Self, MurmurError> {
        let schema = json!({
            "type": "object",
            "required": ["content"],
            "properties": {
                "category": { "type": "string" },
                "content": { "type": "string", "minLength": 1 },
                "importance": { "type": "number" },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        });
        SchemaParser::compile("fact", schema).map(Self)
    }

    /// Unknown categories become `other`; importance is rounded and clamped to 1..=10.
    pub fn parse(&self, raw: &str) -> Result<Vec<ExtractedFact>, MurmurError> {
        let items: Vec<RawFact> = self.0.parse_items(raw)?;
        Ok(items
            .into_iter()
            .filter_map(|f| {
                let content = f.content.trim().to_string();
                (!content.is_empty()).then(|| ExtractedFact {
                    category: MemoryCategory::parse_lenient(&f.category),
                    content,
                    importance: clamp_importance(f.importance.round() as i64),
                    tags: f
                        .tags
                        .into_iter()
                        .map(|t| t.trim().to_lowercase())
                        .filter(|t| !t.is_empty())
                        .collect(),
                })
            })
            .collect())
    }
}

/// Clean a free-text summary returned by the summarization call.
pub fn parse_summary(raw: &str) -> Result<String, MurmurError> {
    let text = raw.trim().trim_matches('`').trim();
    if text.is_empty() {
        return Err(MurmurError::ParseFailure("empty summary".into()));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_fenced_array() {
        let raw = "```json\n[{\"a\": 1}]\n```";
        assert_eq!(locate_json_array(raw), Some("[{\"a\": 1}]"));
    }

    #[test]
    fn locates_array_in_prose() {
        let raw = "Here you go:\n[1, 2]\nDone.";
        assert_eq!(locate_json_array(raw), Some("[1, 2]"));
        assert_eq!(locate_json_array("no json here"), None);
    }

    #[test]
    fn entities_parse_and_normalize() {
        let parser = EntityParser::new().unwrap();
        let raw = r#"[
            {"text": "Dr. Smith", "type": "person", "confidence": 1.7, "context": "see Dr. Smith"},
            {"text": "Tuesday", "type": "WEEKDAY", "confidence": 0.8}
        ]"#;
        let entities = parser.parse(raw).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_type, EntityType::Person);
        assert_eq!(entities[0].confidence, 1.0);
        assert_eq!(entities[1].entity_type, EntityType::Other);
        assert_eq!(entities[1].context, "");
    }

    #[test]
    fn schema_invalid_items_are_dropped() {
        let parser = EntityParser::new().unwrap();
        let raw = r#"[
            {"text": "Paris", "type": "PLACE"},
            {"text": 42, "type": "PLACE"},
            {"type": "PERSON"},
            "just a string"
        ]"#;
        let entities = parser.parse(raw).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Paris");
    }

    #[test]
    fn malformed_output_is_a_parse_failure() {
        let parser = EntityParser::new().unwrap();
        assert!(matches!(
            parser.parse("I could not find any entities."),
            Err(MurmurError::ParseFailure(_))
        ));
        assert!(matches!(
            parser.parse("[{\"text\": \"x\", "),
            Err(MurmurError::ParseFailure(_))
        ));
    }

    #[test]
    fn facts_clamp_importance_and_category() {
        let parser = FactParser::new().unwrap();
        let raw = r#"```
[
  {"category": "Schedule", "content": "Dentist on Friday at 3pm", "importance": 14, "tags": ["Health", " "]},
  {"category": "hobby", "content": "Likes chess", "importance": 0.2},
  {"category": "fact", "content": "   "}
]
```"#;
        let facts = parser.parse(raw).unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].category, MemoryCategory::Schedule);
        assert_eq!(facts[0].importance, 10);
        assert_eq!(facts[0].tags, vec!["health".to_string()]);
        assert_eq!(facts[1].category, MemoryCategory::Other);
        assert_eq!(facts[1].importance, 1);
    }

    #[test]
    fn summary_must_not_be_empty() {
        assert_eq!(parse_summary("  A short summary. \n").unwrap(), "A short summary.");
        assert!(parse_summary(" ``` ").is_err());
    }
}
