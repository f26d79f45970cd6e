//! MIME type / filename to prompt resolution.

use std::sync::Arc;

use crate::config::prompts::{ClassificationPrompt, PromptCatalog};

const TRANSCRIPT_MARKER: &str = "transcript";

/// Resolves the prompt for a document. Pure: the same `(mime_type, file_name)`
/// always yields the same prompt, and resolution never fails.
#[derive(Debug, Clone)]
pub struct PromptResolver {
    catalog: Arc<PromptCatalog>,
}

impl PromptResolver {
    pub fn new(catalog: Arc<PromptCatalog>) -> Self {
        Self { catalog }
    }

    /// 1. a file name containing "transcript" (any case) selects the transcript prompt;
    /// 2. otherwise the MIME mapping table;
    /// 3. otherwise the default prompt.
    pub fn resolve(&self, mime_type: &str, file_name: &str) -> &ClassificationPrompt {
        if file_name.to_lowercase().contains(TRANSCRIPT_MARKER) {
            return self.catalog.transcript_prompt();
        }

        self.catalog
            .lookup_mime(mime_type)
            .and_then(|name| self.catalog.get(name))
            .unwrap_or_else(|| self.catalog.default_prompt())
    }

    pub fn resolve_name(&self, mime_type: &str, file_name: &str) -> &str {
        &self.resolve(mime_type, file_name).name
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PromptResolver {
        PromptResolver::new(Arc::new(PromptCatalog::builtin()))
    }

    #[test]
    fn test_transcript_overrides_markdown_mapping() {
        let r = resolver();
        assert_eq!(
            r.resolve_name("text/markdown", "meeting-transcript-2024.md"),
            "transcript-classification-prompt"
        );
    }

    #[test]
    fn test_transcript_match_is_case_insensitive() {
        let r = resolver();
        for name in ["TRANSCRIPT.txt", "Board_Transcript.docx", "x-tRaNsCrIpT-y"] {
            assert_eq!(
                r.resolve_name("application/pdf", name),
                "transcript-classification-prompt",
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_mime_mapping() {
        let r = resolver();
        assert_eq!(
            r.resolve_name("text/markdown", "README.md"),
            "markdown-document-classification-prompt"
        );
        assert_eq!(
            r.resolve_name(
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                "grand-rounds.pptx"
            ),
            "scientific-powerpoint"
        );
        assert_eq!(r.resolve_name("text/x-python", "sync.py"), "script-analysis-prompt");
    }

    #[test]
    fn test_unknown_and_empty_mime_fall_back_to_default() {
        let r = resolver();
        assert_eq!(
            r.resolve_name("application/x-weird", "blob.bin"),
            "document-classification-prompt-new"
        );
        assert_eq!(r.resolve_name("", "notes"), "document-classification-prompt-new");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let r = resolver();
        let inputs = [
            ("text/markdown", "guide.md"),
            ("", ""),
            ("audio/mpeg", "call.mp3"),
            ("text/plain", "Transcript.txt"),
        ];
        for (mime, name) in inputs {
            assert_eq!(r.resolve_name(mime, name), r.resolve_name(mime, name));
        }
    }
}
