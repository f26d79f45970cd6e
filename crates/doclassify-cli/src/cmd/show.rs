use anyhow::{bail, Result};
use doclassify::db::classification_repo;
use doclassify::db::document_repo;
use serde_json::json;

use super::{open_database, GlobalOptions};

pub fn run(options: &GlobalOptions, document_id: &str, as_json: bool) -> Result<bool> {
    let config = options.load_config()?;
    let db = open_database(&config)?;

    let Some(doc) = document_repo::find_by_id(&db, document_id)? else {
        bail!("no document with id {}", document_id);
    };
    let history = classification_repo::list_for_document(&db, document_id)?;

    if as_json {
        let versions: Vec<_> = history
            .iter()
            .map(|c| {
                json!({
                    "assessmentVersion": c.assessment_version,
                    "name": c.name,
                    "category": c.category,
                    "classificationConfidence": c.classification_confidence,
                    "statusRecommendation": c.status_recommendation,
                    "statusDefaulted": c.status_defaulted,
                    "keyTopics": c.key_topics,
                    "promptName": c.prompt_name,
                    "modelId": c.model_id,
                    "assessedAt": c.assessed_at,
                    "extras": c.extras,
                })
            })
            .collect();
        let out = json!({
            "id": doc.id,
            "filePath": doc.file_path,
            "fileName": doc.file_name,
            "mimeType": doc.mime_type,
            "pipelineStatus": doc.pipeline_status,
            "isDeleted": doc.is_deleted,
            "documentType": doc.document_type,
            "classifications": versions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(true);
    }

    println!("{} ({})", doc.file_name, doc.id);
    println!("  path:   {}", doc.file_path);
    println!("  type:   {}", doc.mime_type);
    println!(
        "  status: {}{}",
        doc.pipeline_status,
        if doc.is_deleted { " [deleted]" } else { "" }
    );
    if history.is_empty() {
        println!("  no classifications yet");
    }
    for c in &history {
        println!(
            "  v{}  {}  {} (confidence {:.2}, {}{})  via {} on {}",
            c.assessment_version,
            c.name.as_deref().unwrap_or("UNCLASSIFIED"),
            c.category.as_deref().unwrap_or("-"),
            c.classification_confidence,
            c.status_recommendation,
            if c.status_defaulted { ", defaulted" } else { "" },
            c.prompt_name,
            c.assessed_at
        );
    }
    Ok(true)
}
