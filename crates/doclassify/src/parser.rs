//! Turns the model's raw reply into a validated classification.
//!
//! Parsing happens in three steps:
//!
//! 1. **JSON recovery**: the reply is parsed as-is; if that fails, exactly one
//!    recovery attempt is made on the contents of a fenced code block (or, if
//!    there is none, on the outermost `{...}` slice).
//! 2. **Shape detection**: a reply containing any legacy-only key is a
//!    [`RawPayload::Legacy`] and is renamed through [`LEGACY_FIELD_MAP`].
//!    Keys with no canonical counterpart are kept in `extras`.
//! 3. **Validation**: scores must lie in `[0, 1]` and the status must be one
//!    of the four recommendations. A missing status is filled in and flagged.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;

static RE_FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*(?i:json)?[ \t]*\r?\n?(.*?)```").unwrap());

const SNIPPET_CHARS: usize = 200;

/// Legacy key to canonical key. The only place legacy names are known.
pub const LEGACY_FIELD_MAP: &[(&str, &str)] = &[
    ("generalCategory", "category"),
    ("specificDocumentType", "name"),
    ("keyConcepts", "key_topics"),
    ("confidence", "classification_confidence"),
    ("reasoning", "classification_reasoning"),
];

/// Keys that only ever appear in legacy-shaped replies.
const LEGACY_ONLY_KEYS: &[&str] = &["generalCategory", "specificDocumentType", "keyConcepts"];

const UNCLASSIFIED: &str = "UNCLASSIFIED";

mod field {
    pub const NAME: &str = "name";
    pub const DOCUMENT_TYPE_ID: &str = "document_type_id";
    pub const CATEGORY: &str = "category";
    pub const CONFIDENCE: &str = "classification_confidence";
    pub const REASONING: &str = "classification_reasoning";
    pub const SUMMARY: &str = "document_summary";
    pub const KEY_TOPICS: &str = "key_topics";
    pub const TARGET_AUDIENCE: &str = "target_audience";
    pub const UNIQUE_INSIGHTS: &str = "unique_insights";
    pub const STATUS: &str = "status_recommendation";
    pub const QUALITY_SCORE: &str = "assessment_quality_score";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusRecommendation {
    Keep,
    Update,
    Archive,
    Delete,
}

impl StatusRecommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusRecommendation::Keep => "KEEP",
            StatusRecommendation::Update => "UPDATE",
            StatusRecommendation::Archive => "ARCHIVE",
            StatusRecommendation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for StatusRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusRecommendation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KEEP" => Ok(StatusRecommendation::Keep),
            "UPDATE" => Ok(StatusRecommendation::Update),
            "ARCHIVE" => Ok(StatusRecommendation::Archive),
            "DELETE" => Ok(StatusRecommendation::Delete),
            other => Err(ParseError::invalid(
                field::STATUS,
                format!("'{}' is not one of KEEP, UPDATE, ARCHIVE, DELETE", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    Canonical,
    Legacy,
}

/// A reply object tagged with the field naming it uses.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Canonical(Map<String, Value>),
    Legacy(Map<String, Value>),
}

impl RawPayload {
    pub fn detect(object: Map<String, Value>) -> Self {
        if LEGACY_ONLY_KEYS.iter().any(|key| object.contains_key(*key)) {
            RawPayload::Legacy(object)
        } else {
            RawPayload::Canonical(object)
        }
    }

    pub fn shape(&self) -> PayloadShape {
        match self {
            RawPayload::Canonical(_) => PayloadShape::Canonical,
            RawPayload::Legacy(_) => PayloadShape::Legacy,
        }
    }

    /// Renames legacy keys to canonical ones. Nothing is dropped: when both a
    /// legacy key and its canonical counterpart are present, the canonical
    /// value wins and the legacy one stays under its own key.
    pub fn into_canonical(self) -> Map<String, Value> {
        match self {
            RawPayload::Canonical(object) => object,
            RawPayload::Legacy(object) => {
                let mut canonical = Map::with_capacity(object.len());
                let mut displaced = Vec::new();

                for (key, value) in object {
                    match LEGACY_FIELD_MAP.iter().find(|(legacy, _)| *legacy == key) {
                        Some((_, target)) => displaced.push((key, target.to_string(), value)),
                        None => {
                            canonical.insert(key, value);
                        }
                    }
                }

                for (legacy_key, target, value) in displaced {
                    if canonical.contains_key(&target) {
                        canonical.insert(legacy_key, value);
                    } else {
                        canonical.insert(target, value);
                    }
                }

                canonical
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedClassification {
    pub name: Option<String>,
    pub document_type_id: Option<String>,
    pub category: Option<String>,
    pub classification_confidence: f64,
    pub classification_reasoning: Option<String>,
    pub document_summary: Option<String>,
    pub key_topics: Vec<String>,
    pub target_audience: Option<String>,
    pub unique_insights: Vec<String>,
    pub status_recommendation: StatusRecommendation,
    /// True when the model omitted the status and it was filled in.
    pub status_defaulted: bool,
    pub assessment_quality_score: Option<f64>,
    /// Fields the model returned that have no canonical column.
    pub extras: Map<String, Value>,
    pub shape: PayloadShape,
}

impl ParsedClassification {
    pub fn is_unclassified(&self) -> bool {
        match &self.name {
            None => true,
            Some(name) => name.trim().is_empty() || name.eq_ignore_ascii_case(UNCLASSIFIED),
        }
    }

    pub fn from_payload(payload: RawPayload) -> Result<Self, ParseError> {
        let shape = payload.shape();
        let mut object = payload.into_canonical();

        let name = take_string(&mut object, field::NAME)?;
        let document_type_id = take_identifier(&mut object, field::DOCUMENT_TYPE_ID)?;
        let category = take_string(&mut object, field::CATEGORY)?;
        let classification_confidence = take_score(&mut object, field::CONFIDENCE)?
            .ok_or_else(|| ParseError::invalid(field::CONFIDENCE, "missing"))?;
        let classification_reasoning = take_string(&mut object, field::REASONING)?;
        let document_summary = take_string(&mut object, field::SUMMARY)?;
        let key_topics = take_string_list(&mut object, field::KEY_TOPICS)?;
        let target_audience = take_string(&mut object, field::TARGET_AUDIENCE)?;
        let unique_insights = take_string_list(&mut object, field::UNIQUE_INSIGHTS)?;
        let assessment_quality_score = take_score(&mut object, field::QUALITY_SCORE)?;
        let status = take_string(&mut object, field::STATUS)?
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<StatusRecommendation>())
            .transpose()?;

        let mut parsed = ParsedClassification {
            name,
            document_type_id,
            category,
            classification_confidence,
            classification_reasoning,
            document_summary,
            key_topics,
            target_audience,
            unique_insights,
            status_recommendation: StatusRecommendation::Keep,
            status_defaulted: false,
            assessment_quality_score,
            extras: object,
            shape,
        };

        match status {
            Some(status) => parsed.status_recommendation = status,
            None => {
                parsed.status_recommendation = if parsed.is_unclassified() {
                    StatusRecommendation::Update
                } else {
                    StatusRecommendation::Keep
                };
                parsed.status_defaulted = true;
            }
        }

        Ok(parsed)
    }
}

/// Parses a raw model reply.
pub fn parse(raw: &str) -> Result<ParsedClassification, ParseError> {
    let value = parse_json_with_recovery(raw)?;
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(ParseError::invalid(
                "$root",
                format!("expected a JSON object, got {}", json_type(&other)),
            ))
        }
    };

    ParsedClassification::from_payload(RawPayload::detect(object))
}

pub fn parse_json_with_recovery(raw: &str) -> Result<Value, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(value);
    }

    if let Some(candidate) = recovery_candidate(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            tracing::debug!("Recovered JSON from wrapped model output");
            return Ok(value);
        }
    }

    Err(ParseError::MalformedJson {
        raw_snippet: raw.chars().take(SNIPPET_CHARS).collect(),
    })
}

/// The fenced block's contents, or failing that the outermost braces.
fn recovery_candidate(raw: &str) -> Option<&str> {
    if let Some(inner) = RE_FENCED_BLOCK
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
    {
        return Some(inner);
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Result<Option<String>, ParseError> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(ParseError::invalid(
            key,
            format!("expected a string, got {}", json_type(&other)),
        )),
    }
}

/// Ids may come back as strings or bare numbers.
fn take_identifier(
    object: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ParseError> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(ParseError::invalid(
            key,
            format!("expected a string or number, got {}", json_type(&other)),
        )),
    }
}

/// A score in `[0, 1]`. Numeric strings are accepted.
fn take_score(object: &mut Map<String, Value>, key: &str) -> Result<Option<f64>, ParseError> {
    let score = match object.remove(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ParseError::invalid(key, "not representable as a number"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::invalid(key, format!("'{}' is not a number", s)))?,
        Some(other) => {
            return Err(ParseError::invalid(
                key,
                format!("expected a number, got {}", json_type(&other)),
            ))
        }
    };

    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(ParseError::invalid(
            key,
            format!("{} is outside [0, 1]", score),
        ));
    }
    Ok(Some(score))
}

/// A list of strings. A single string becomes a one-element list.
fn take_string_list(
    object: &mut Map<String, Value>,
    key: &str,
) -> Result<Vec<String>, ParseError> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s]),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(ParseError::invalid(
                    key,
                    format!("list items must be strings, got {}", json_type(&other)),
                )),
            })
            .collect(),
        Some(other) => Err(ParseError::invalid(
            key,
            format!("expected a list, got {}", json_type(&other)),
        )),
    }
}
