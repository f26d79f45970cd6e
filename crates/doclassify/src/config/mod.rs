pub mod loader;
pub mod prompts;
pub mod schema;

pub use loader::{default_config_path, load_config, load_config_from_str, load_config_or_default};
pub use prompts::{normalize_mime, ClassificationPrompt, OutputSchema, PromptCatalog};
pub use schema::{
    ApiConfig, BatchConfig, Config, ExtractionConfig, PromptMapping, PromptTemplateConfig,
    PromptsConfig,
};
