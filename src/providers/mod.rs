pub mod anthropic;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod prompts;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::AppConfig;

pub use anthropic::AnthropicProvider;
pub use error::ProviderError;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use registry::{ModelCatalogEntry, ModelRegistry};

/// Environment variable consulted when neither the call nor the config names
/// a model.
pub const MODEL_ENV_VAR: &str = "REPO_SCRIBE_MODEL";

/// A lazy, single-pass, forward-only sequence of response fragments.
pub type InferenceStream = UnboundedReceiver<Result<String, ProviderError>>;

/// The result shape of one inference call.
///
/// Exactly one variant is produced per call: `Stream` when the caller allowed
/// streaming and the transport supports it, `Text` otherwise. Structured
/// classification output never streams.
#[derive(Debug)]
pub enum InferenceOutput {
    Text(String),
    Stream(InferenceStream),
}

impl InferenceOutput {
    /// Collects the full response text, draining a stream to completion.
    pub async fn into_text(self) -> Result<String, ProviderError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Stream(mut stream) => {
                let mut collected = String::new();
                while let Some(chunk) = stream.recv().await {
                    collected.push_str(&chunk?);
                }
                Ok(collected)
            }
        }
    }
}

/// Per-call options shared by every provider operation.
#[derive(Debug, Clone, Default)]
pub struct InferenceOptions {
    /// Allow a streamed response where the operation and transport permit it.
    pub allow_streaming: bool,
    /// Emit extra diagnostics about the request being composed.
    pub verbose: bool,
    /// Free-text description of the reader's background, injected into every
    /// system prompt when present.
    pub user_expertise: Option<String>,
    /// Explicit model name; overrides the configured and environment defaults.
    pub model: Option<String>,
}

/// One entry in a provider's static model table.
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    /// Short human-facing name, the key users type.
    pub alias: &'static str,
    /// Exact identifier the vendor API expects.
    pub id: &'static str,
    /// Context window in tokens, used for the pre-flight budget check.
    pub context_window: usize,
}

/// The normalized capability set every vendor implementation exposes.
///
/// The orchestrator never branches on vendor identity; it only relies on this
/// contract and on the result shapes documented per operation.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable provider identifier, also used as the catalog's provider id.
    fn name(&self) -> &'static str;

    /// Returns the models this provider can serve.
    async fn list_models(&self, verbose: bool) -> Result<Vec<ModelCatalogEntry>, ProviderError>;

    /// Classifies the project described by the serialized tree.
    ///
    /// Always returns one atomic JSON string (possibly empty), never a
    /// stream: the caller parses the result immediately and a partial JSON
    /// document would be unusable.
    async fn infer_project_shape(
        &self,
        tree_json: &str,
        opts: &InferenceOptions,
    ) -> Result<String, ProviderError>;

    /// Summarizes the declared dependencies of one codebase.
    async fn infer_dependency(
        &self,
        dependency_file: &str,
        workflow: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError>;

    /// Explains what the codebase does, file by file.
    async fn infer_code(
        &self,
        tree_json: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError>;

    /// Highlights the parts of the codebase worth a closer look.
    async fn infer_interesting_code(
        &self,
        tree_json: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError>;

    /// Drafts a README from previously produced analysis artifacts.
    async fn generate_readme(
        &self,
        directory_structure: &str,
        dependency_inference: &str,
        code_inference: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError>;
}

/// Constructs every known provider from the persisted config.
pub fn all_providers(config: &AppConfig) -> Vec<Arc<dyn ModelProvider>> {
    vec![
        Arc::new(OpenAiProvider::new(
            config.openai_api_key.clone(),
            config.default_model.clone(),
        )),
        Arc::new(AnthropicProvider::new(
            config.anthropic_api_key.clone(),
            config.default_model.clone(),
        )),
        Arc::new(GeminiProvider::new(
            config.gemini_api_key.clone(),
            config.default_model.clone(),
        )),
    ]
}

/// Fails fast on blank required inputs, before any network activity.
pub(crate) fn require_non_blank(value: &str, field: &'static str) -> Result<(), ProviderError> {
    if value.trim().is_empty() {
        return Err(ProviderError::EmptyInput(field));
    }
    Ok(())
}

/// Resolves the model for one call: explicit argument, then the configured
/// default, then `REPO_SCRIBE_MODEL`, then the provider's fallback.
///
/// An explicit argument that is not in the table is an error; configured and
/// environment defaults that name another provider's model fall through
/// silently.
pub(crate) fn resolve_model_spec<'a>(
    table: &'a [ModelSpec],
    requested: Option<&str>,
    configured_default: Option<&str>,
    fallback_alias: &str,
) -> Result<&'a ModelSpec, ProviderError> {
    if let Some(name) = requested.map(str::trim).filter(|n| !n.is_empty()) {
        return lookup_model(table, name).ok_or_else(|| ProviderError::UnknownModel {
            requested: name.to_string(),
            known: known_aliases(table),
        });
    }
    if let Some(name) = configured_default.map(str::trim).filter(|n| !n.is_empty()) {
        if let Some(spec) = lookup_model(table, name) {
            return Ok(spec);
        }
    }
    if let Ok(name) = std::env::var(MODEL_ENV_VAR) {
        if let Some(spec) = lookup_model(table, name.trim()) {
            return Ok(spec);
        }
    }
    lookup_model(table, fallback_alias).ok_or_else(|| ProviderError::UnknownModel {
        requested: fallback_alias.to_string(),
        known: known_aliases(table),
    })
}

fn lookup_model<'a>(table: &'a [ModelSpec], name: &str) -> Option<&'a ModelSpec> {
    table
        .iter()
        .find(|spec| spec.alias.eq_ignore_ascii_case(name) || spec.id.eq_ignore_ascii_case(name))
}

fn known_aliases(table: &[ModelSpec]) -> String {
    table
        .iter()
        .map(|spec| spec.alias)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[ModelSpec] = &[
        ModelSpec {
            alias: "small",
            id: "vendor-small-001",
            context_window: 1000,
        },
        ModelSpec {
            alias: "large",
            id: "vendor-large-001",
            context_window: 2000,
        },
    ];

    #[test]
    fn test_explicit_model_wins_over_default() {
        let spec = resolve_model_spec(TABLE, Some("large"), Some("small"), "small").unwrap();
        assert_eq!(spec.id, "vendor-large-001");
    }

    #[test]
    fn test_explicit_unknown_model_is_an_error() {
        let result = resolve_model_spec(TABLE, Some("missing"), None, "small");
        match result {
            Err(ProviderError::UnknownModel { requested, known }) => {
                assert_eq!(requested, "missing");
                assert!(known.contains("small"));
                assert!(known.contains("large"));
            }
            other => panic!("expected UnknownModel, got {other:?}"),
        }
    }

    #[test]
    fn test_foreign_configured_default_falls_through_to_fallback() {
        let spec = resolve_model_spec(TABLE, None, Some("other-vendor-model"), "small").unwrap();
        assert_eq!(spec.alias, "small");
    }

    #[test]
    fn test_vendor_id_resolves_like_an_alias() {
        let spec = resolve_model_spec(TABLE, Some("vendor-small-001"), None, "large").unwrap();
        assert_eq!(spec.alias, "small");
    }

    #[test]
    fn test_blank_input_fails_fast() {
        assert!(require_non_blank("  \n", "workflow").is_err());
        assert!(require_non_blank("nodejs", "workflow").is_ok());
    }

    #[tokio::test]
    async fn test_into_text_drains_a_stream() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(Ok("hello ".to_string())).unwrap();
        tx.send(Ok("world".to_string())).unwrap();
        drop(tx);

        let text = InferenceOutput::Stream(rx).into_text().await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_into_text_propagates_stream_errors() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(Ok("partial".to_string())).unwrap();
        tx.send(Err(ProviderError::Stream("cut off".to_string())))
            .unwrap();
        drop(tx);

        let result = InferenceOutput::Stream(rx).into_text().await;
        assert!(matches!(result, Err(ProviderError::Stream(_))));
    }
}
