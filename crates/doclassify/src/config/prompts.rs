//! Classification prompt catalog.
//!
//! The catalog is built once at startup from the built-in templates and the
//! configured overrides, then shared read-only (`Arc<PromptCatalog>`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::schema::PromptsConfig;
use crate::error::ConfigError;

/// Which JSON field naming a prompt asks the model for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSchema {
    #[default]
    Canonical,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationPrompt {
    pub name: String,
    pub mime_types: Vec<String>,
    pub body: String,
    pub schema: OutputSchema,
}

#[derive(Debug, Clone)]
pub struct PromptCatalog {
    prompts: HashMap<String, ClassificationPrompt>,
    /// Normalized MIME type (or `type/*` wildcard) to prompt name.
    mappings: HashMap<String, String>,
    default_prompt: String,
    transcript_prompt: String,
}

const CANONICAL_OUTPUT: &str = r#"Respond with a JSON object using exactly these fields:
{
  "name": "document type name, or UNCLASSIFIED",
  "document_type_id": "id of the matched document type, or null",
  "category": "broad category",
  "classification_confidence": 0.0,
  "classification_reasoning": "why this type was chosen",
  "document_summary": "two or three sentence summary",
  "key_topics": ["topic"],
  "target_audience": "who the document is for",
  "unique_insights": ["insight"],
  "status_recommendation": "KEEP | UPDATE | ARCHIVE | DELETE"
}
classification_confidence is a number between 0 and 1."#;

const LEGACY_OUTPUT: &str = r#"Respond with a JSON object using exactly these fields:
{
  "generalCategory": "broad category",
  "specificDocumentType": "document type name, or UNCLASSIFIED",
  "keyConcepts": ["concept"],
  "confidence": 0.0,
  "reasoning": "why this type was chosen",
  "document_summary": "two or three sentence summary",
  "target_audience": "who the document is for",
  "status_recommendation": "KEEP | UPDATE | ARCHIVE | DELETE"
}
confidence is a number between 0 and 1."#;

struct BuiltinPrompt {
    name: &'static str,
    mime_types: &'static [&'static str],
    instructions: &'static str,
    schema: OutputSchema,
}

const BUILTIN_PROMPTS: &[BuiltinPrompt] = &[
    BuiltinPrompt {
        name: "document-classification-prompt-new",
        mime_types: &[
            "text/plain",
            "application/vnd.google-apps.document",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.google-apps.spreadsheet",
            "text/csv",
        ],
        instructions: "You classify documents from a research organisation's shared drive. \
Decide which document type best describes the content below, summarise it, and recommend \
whether the document should be kept, updated, archived or deleted.",
        schema: OutputSchema::Canonical,
    },
    BuiltinPrompt {
        name: "markdown-document-classification-prompt",
        mime_types: &["text/markdown", "text/x-markdown"],
        instructions: "You classify markdown documentation from a software monorepo \
(technical specs, guides, planning documents, prompt templates). Decide which documentation \
type it is, summarise it, and recommend whether it is current (KEEP), stale (UPDATE), \
historical (ARCHIVE) or obsolete (DELETE).",
        schema: OutputSchema::Canonical,
    },
    BuiltinPrompt {
        name: "script-analysis-prompt",
        mime_types: &[
            "application/x-sh",
            "text/x-shellscript",
            "application/x-shellscript",
            "text/x-python",
            "application/javascript",
            "text/javascript",
            "application/typescript",
        ],
        instructions: "You classify scripts from a monorepo's CLI pipelines. Identify the \
script's purpose and the pipeline it belongs to, summarise what it does, and recommend \
whether it is still useful (KEEP), needs refactoring (UPDATE), is superseded (ARCHIVE) or \
is dead code (DELETE).",
        schema: OutputSchema::Canonical,
    },
    BuiltinPrompt {
        name: "scientific-document-analysis-prompt",
        mime_types: &[
            "application/pdf",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/msword",
        ],
        instructions: "You analyse scientific and clinical documents. Identify the general \
category and specific document type, list the key concepts, and explain your reasoning.",
        schema: OutputSchema::Legacy,
    },
    BuiltinPrompt {
        name: "scientific-powerpoint",
        mime_types: &[
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.ms-powerpoint",
            "application/vnd.google-apps.presentation",
        ],
        instructions: "You analyse presentation decks. The content lists slide text followed \
by speaker notes. Identify the general category and specific document type, list the key \
concepts, and explain your reasoning.",
        schema: OutputSchema::Legacy,
    },
    BuiltinPrompt {
        name: "media-classification-prompt",
        mime_types: &["audio/*", "video/*", "image/*"],
        instructions: "You classify media files using metadata only (no transcript or pixels \
are available). Infer the most likely document type from the file name and metadata and \
keep confidence low unless the metadata is unambiguous.",
        schema: OutputSchema::Canonical,
    },
    BuiltinPrompt {
        name: "transcript-classification-prompt",
        mime_types: &[],
        instructions: "You classify meeting and presentation transcripts. Identify the kind \
of session, the speakers' main topics, the intended audience, and summarise the discussion.",
        schema: OutputSchema::Canonical,
    },
];

fn builtin_body(prompt: &BuiltinPrompt) -> String {
    let output = match prompt.schema {
        OutputSchema::Canonical => CANONICAL_OUTPUT,
        OutputSchema::Legacy => LEGACY_OUTPUT,
    };
    format!("{}\n\n{}", prompt.instructions, output)
}

/// Lowercases and strips MIME parameters (`text/plain; charset=utf-8` -> `text/plain`).
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

impl PromptCatalog {
    /// Built-in catalog with no overrides.
    pub fn builtin() -> Self {
        let mut prompts = HashMap::new();
        let mut mappings = HashMap::new();

        for builtin in BUILTIN_PROMPTS {
            for mime in builtin.mime_types {
                mappings.insert(normalize_mime(mime), builtin.name.to_string());
            }
            prompts.insert(
                builtin.name.to_string(),
                ClassificationPrompt {
                    name: builtin.name.to_string(),
                    mime_types: builtin.mime_types.iter().map(|m| m.to_string()).collect(),
                    body: builtin_body(builtin),
                    schema: builtin.schema,
                },
            );
        }

        Self {
            prompts,
            mappings,
            default_prompt: crate::config::schema::default_prompt_name(),
            transcript_prompt: crate::config::schema::default_transcript_prompt_name(),
        }
    }

    /// Builds the catalog from configuration, validating every reference.
    pub fn from_config(config: &PromptsConfig) -> Result<Self, ConfigError> {
        let mut catalog = Self::builtin();

        for template in &config.templates {
            let mime_types = catalog
                .prompts
                .get(&template.name)
                .map(|p| p.mime_types.clone())
                .unwrap_or_default();
            catalog.prompts.insert(
                template.name.clone(),
                ClassificationPrompt {
                    name: template.name.clone(),
                    mime_types,
                    body: template.body.clone(),
                    schema: template.schema,
                },
            );
        }

        for mapping in &config.mappings {
            if !catalog.prompts.contains_key(&mapping.prompt) {
                return Err(ConfigError::UnknownPrompt {
                    mime_type: mapping.mime_type.clone(),
                    prompt: mapping.prompt.clone(),
                });
            }
            let mime = normalize_mime(&mapping.mime_type);
            if let Some(prompt) = catalog.prompts.get_mut(&mapping.prompt) {
                if !prompt.mime_types.contains(&mime) {
                    prompt.mime_types.push(mime.clone());
                }
            }
            catalog.mappings.insert(mime, mapping.prompt.clone());
        }

        for (role, name) in [
            ("default", &config.default_prompt),
            ("transcript", &config.transcript_prompt),
        ] {
            if !catalog.prompts.contains_key(name) {
                return Err(ConfigError::UnknownPrompt {
                    mime_type: format!("<{}>", role),
                    prompt: name.clone(),
                });
            }
        }
        catalog.default_prompt = config.default_prompt.clone();
        catalog.transcript_prompt = config.transcript_prompt.clone();

        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&ClassificationPrompt> {
        self.prompts.get(name)
    }

    /// Prompt name mapped for a MIME type: exact match first, then `type/*`.
    pub fn lookup_mime(&self, mime_type: &str) -> Option<&str> {
        let mime = normalize_mime(mime_type);
        if mime.is_empty() {
            return None;
        }
        if let Some(name) = self.mappings.get(&mime) {
            return Some(name);
        }
        let top_level = mime.split('/').next()?;
        self.mappings
            .get(&format!("{}/*", top_level))
            .map(String::as_str)
    }

    pub fn default_prompt(&self) -> &ClassificationPrompt {
        &self.prompts[&self.default_prompt]
    }

    pub fn transcript_prompt(&self) -> &ClassificationPrompt {
        &self.prompts[&self.transcript_prompt]
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PromptMapping, PromptTemplateConfig};

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let catalog = PromptCatalog::builtin();
        assert_eq!(catalog.len(), BUILTIN_PROMPTS.len());
        assert_eq!(catalog.default_prompt().name, "document-classification-prompt-new");
        assert_eq!(
            catalog.transcript_prompt().name,
            "transcript-classification-prompt"
        );
        assert!(catalog
            .get("scientific-powerpoint")
            .unwrap()
            .body
            .contains("specificDocumentType"));
    }

    #[test]
    fn test_lookup_strips_parameters_and_case() {
        let catalog = PromptCatalog::builtin();
        assert_eq!(
            catalog.lookup_mime("Text/Markdown; charset=UTF-8"),
            Some("markdown-document-classification-prompt")
        );
        assert_eq!(catalog.lookup_mime(""), None);
        assert_eq!(catalog.lookup_mime("application/x-unknown"), None);
    }

    #[test]
    fn test_lookup_wildcard() {
        let catalog = PromptCatalog::builtin();
        assert_eq!(
            catalog.lookup_mime("audio/x-m4a"),
            Some("media-classification-prompt")
        );
    }

    #[test]
    fn test_config_overrides() {
        let config = PromptsConfig {
            mappings: vec![PromptMapping {
                mime_type: "application/json".to_string(),
                prompt: "json-config-prompt".to_string(),
            }],
            templates: vec![PromptTemplateConfig {
                name: "json-config-prompt".to_string(),
                body: "Classify this JSON config".to_string(),
                schema: OutputSchema::Canonical,
            }],
            ..PromptsConfig::default()
        };

        let catalog = PromptCatalog::from_config(&config).unwrap();
        assert_eq!(
            catalog.lookup_mime("application/json"),
            Some("json-config-prompt")
        );
        assert_eq!(
            catalog.get("json-config-prompt").unwrap().mime_types,
            vec!["application/json".to_string()]
        );
    }

    #[test]
    fn test_unknown_prompt_reference_rejected() {
        let config = PromptsConfig {
            mappings: vec![PromptMapping {
                mime_type: "application/json".to_string(),
                prompt: "missing".to_string(),
            }],
            ..PromptsConfig::default()
        };
        assert!(matches!(
            PromptCatalog::from_config(&config),
            Err(ConfigError::UnknownPrompt { .. })
        ));

        let config = PromptsConfig {
            default_prompt: "missing".to_string(),
            ..PromptsConfig::default()
        };
        assert!(PromptCatalog::from_config(&config).is_err());
    }
}
