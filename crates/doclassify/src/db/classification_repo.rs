//! Classification history: one row per classification attempt, versioned
//! per document.

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::{Map, Value};

use super::document_repo::STATUS_CLASSIFIED;
use super::{now_rfc3339, Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRow {
    pub id: String,
    pub document_id: String,
    /// Assigned on insert; ignored by [`insert_versioned`].
    pub assessment_version: u32,
    pub name: Option<String>,
    pub document_type_id: Option<String>,
    pub category: Option<String>,
    pub classification_confidence: f64,
    pub classification_reasoning: Option<String>,
    pub document_summary: Option<String>,
    pub key_topics: Vec<String>,
    pub target_audience: Option<String>,
    pub unique_insights: Vec<String>,
    pub status_recommendation: String,
    pub status_defaulted: bool,
    pub assessment_quality_score: Option<f64>,
    pub prompt_name: String,
    pub model_id: String,
    pub assessed_at: String,
    pub extras: Map<String, Value>,
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, column: &str) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(column)?;
    let index = row.as_ref().column_index(column)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn to_json<T: serde::Serialize>(value: &T, column: &'static str) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|source| DatabaseError::Json { column, source })
}

impl ClassificationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            assessment_version: row.get("assessment_version")?,
            name: row.get("name")?,
            document_type_id: row.get("document_type_id")?,
            category: row.get("category")?,
            classification_confidence: row.get("classification_confidence")?,
            classification_reasoning: row.get("classification_reasoning")?,
            document_summary: row.get("document_summary")?,
            key_topics: json_column(row, "key_topics")?,
            target_audience: row.get("target_audience")?,
            unique_insights: json_column(row, "unique_insights")?,
            status_recommendation: row.get("status_recommendation")?,
            status_defaulted: row.get("status_defaulted")?,
            assessment_quality_score: row.get("assessment_quality_score")?,
            prompt_name: row.get("prompt_name")?,
            model_id: row.get("model_id")?,
            assessed_at: row.get("assessed_at")?,
            extras: json_column(row, "extras")?,
        })
    }
}

/// Inserts `row` as the document's next version and marks the document
/// classified, in one transaction. Returns the assigned version.
pub fn insert_versioned(db: &Database, row: &ClassificationRow) -> Result<u32, DatabaseError> {
    let key_topics = to_json(&row.key_topics, "key_topics")?;
    let unique_insights = to_json(&row.unique_insights, "unique_insights")?;
    let extras = to_json(&row.extras, "extras")?;

    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        let version: u32 = tx.query_row(
            "SELECT COALESCE(MAX(assessment_version), 0) + 1
             FROM classifications WHERE document_id = ?1",
            params![row.document_id],
            |r| r.get(0),
        )?;

        tx.execute(
            "INSERT INTO classifications (id, document_id, assessment_version, name,
             document_type_id, category, classification_confidence, classification_reasoning,
             document_summary, key_topics, target_audience, unique_insights,
             status_recommendation, status_defaulted, assessment_quality_score, prompt_name,
             model_id, assessed_at, extras)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19)",
            params![
                row.id,
                row.document_id,
                version,
                row.name,
                row.document_type_id,
                row.category,
                row.classification_confidence,
                row.classification_reasoning,
                row.document_summary,
                key_topics,
                row.target_audience,
                unique_insights,
                row.status_recommendation,
                row.status_defaulted,
                row.assessment_quality_score,
                row.prompt_name,
                row.model_id,
                row.assessed_at,
                extras,
            ],
        )?;

        let changed = tx.execute(
            "UPDATE documents SET pipeline_status = ?2, is_deleted = 0, document_type = ?3,
             updated_at = ?4 WHERE id = ?1",
            params![row.document_id, STATUS_CLASSIFIED, row.name, now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                table: "documents",
                id: row.document_id.clone(),
            });
        }

        tx.commit()?;
        Ok(version)
    })
}

/// All classifications of a document, oldest version first.
pub fn list_for_document(
    db: &Database,
    document_id: &str,
) -> Result<Vec<ClassificationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM classifications WHERE document_id = ?1
             ORDER BY assessment_version ASC",
        )?;
        let rows = stmt
            .query_map(params![document_id], ClassificationRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn latest_for_document(
    db: &Database,
    document_id: &str,
) -> Result<Option<ClassificationRow>, DatabaseError> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT * FROM classifications WHERE document_id = ?1
             ORDER BY assessment_version DESC LIMIT 1",
            params![document_id],
            ClassificationRow::from_row,
        )
        .optional()
        .map_err(DatabaseError::from)
    })
}
