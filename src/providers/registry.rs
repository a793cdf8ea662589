//! Name-to-provider catalog, built once per invocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::{ModelProvider, ProviderError};

/// One model in the merged catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ModelCatalogEntry {
    pub name: String,
    pub provider_id: String,
    pub token_limit: usize,
}

struct CatalogSlot {
    entry: ModelCatalogEntry,
    provider_idx: usize,
}

/// Shared lookup from model name to the owning provider instance.
///
/// Built explicitly and handed to the orchestrator rather than living in
/// process-global state. The catalog is read-only after `initialize`; a
/// short-lived CLI run simply goes stale if a provider's table changes
/// underneath it.
pub struct ModelRegistry {
    providers: Vec<Arc<dyn ModelProvider>>,
    catalog: BTreeMap<String, CatalogSlot>,
    default_model: Option<String>,
}

impl ModelRegistry {
    /// Queries every provider's model list once and merges the results into
    /// one name-keyed catalog. On a name collision the later provider wins.
    pub async fn initialize(
        providers: Vec<Arc<dyn ModelProvider>>,
        default_model: Option<String>,
        verbose: bool,
    ) -> Result<Self, ProviderError> {
        let mut catalog = BTreeMap::new();
        for (provider_idx, provider) in providers.iter().enumerate() {
            for entry in provider.list_models(verbose).await? {
                catalog.insert(
                    entry.name.clone(),
                    CatalogSlot {
                        entry,
                        provider_idx,
                    },
                );
            }
        }
        tracing::debug!("Model registry initialized with {} models", catalog.len());
        Ok(Self {
            providers,
            catalog,
            default_model,
        })
    }

    /// Resolves a model name to its owning provider and canonical name. An
    /// empty name substitutes the configured default model. Unknown names
    /// fail with a message enumerating every known model.
    pub fn resolve(
        &self,
        model_name: &str,
    ) -> Result<(Arc<dyn ModelProvider>, String), ProviderError> {
        let requested = if model_name.trim().is_empty() {
            self.default_model
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
        } else {
            model_name.trim()
        };
        match self.catalog.get(requested) {
            Some(slot) => Ok((
                Arc::clone(&self.providers[slot.provider_idx]),
                slot.entry.name.clone(),
            )),
            None => Err(ProviderError::UnknownModel {
                requested: if requested.is_empty() {
                    "(none)".to_string()
                } else {
                    requested.to_string()
                },
                known: self.known_names(),
            }),
        }
    }

    /// The merged catalog, sorted by model name.
    pub fn catalog(&self) -> Vec<&ModelCatalogEntry> {
        self.catalog.values().map(|slot| &slot.entry).collect()
    }

    fn known_names(&self) -> String {
        self.catalog
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{InferenceOptions, InferenceOutput};
    use async_trait::async_trait;

    struct StubProvider {
        id: &'static str,
        models: Vec<&'static str>,
    }

    #[async_trait]
    impl ModelProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.id
        }

        async fn list_models(
            &self,
            _verbose: bool,
        ) -> Result<Vec<ModelCatalogEntry>, ProviderError> {
            Ok(self
                .models
                .iter()
                .map(|name| ModelCatalogEntry {
                    name: name.to_string(),
                    provider_id: self.id.to_string(),
                    token_limit: 1000,
                })
                .collect())
        }

        async fn infer_project_shape(
            &self,
            _tree_json: &str,
            _opts: &InferenceOptions,
        ) -> Result<String, ProviderError> {
            Ok(String::new())
        }

        async fn infer_dependency(
            &self,
            _dependency_file: &str,
            _workflow: &str,
            _opts: &InferenceOptions,
        ) -> Result<InferenceOutput, ProviderError> {
            Ok(InferenceOutput::Text(String::new()))
        }

        async fn infer_code(
            &self,
            _tree_json: &str,
            _opts: &InferenceOptions,
        ) -> Result<InferenceOutput, ProviderError> {
            Ok(InferenceOutput::Text(String::new()))
        }

        async fn infer_interesting_code(
            &self,
            _tree_json: &str,
            _opts: &InferenceOptions,
        ) -> Result<InferenceOutput, ProviderError> {
            Ok(InferenceOutput::Text(String::new()))
        }

        async fn generate_readme(
            &self,
            _directory_structure: &str,
            _dependency_inference: &str,
            _code_inference: &str,
            _opts: &InferenceOptions,
        ) -> Result<InferenceOutput, ProviderError> {
            Ok(InferenceOutput::Text(String::new()))
        }
    }

    fn two_providers() -> Vec<Arc<dyn ModelProvider>> {
        vec![
            Arc::new(StubProvider {
                id: "alpha",
                models: vec!["alpha-small", "shared"],
            }),
            Arc::new(StubProvider {
                id: "beta",
                models: vec!["beta-large", "shared"],
            }),
        ]
    }

    #[tokio::test]
    async fn test_resolve_finds_the_owning_provider() {
        let registry = ModelRegistry::initialize(two_providers(), None, false)
            .await
            .unwrap();
        let (provider, name) = registry.resolve("beta-large").unwrap();
        assert_eq!(provider.name(), "beta");
        assert_eq!(name, "beta-large");
    }

    #[tokio::test]
    async fn test_name_collision_is_won_by_the_later_provider() {
        let registry = ModelRegistry::initialize(two_providers(), None, false)
            .await
            .unwrap();
        let (provider, _) = registry.resolve("shared").unwrap();
        assert_eq!(provider.name(), "beta");
    }

    #[tokio::test]
    async fn test_empty_name_substitutes_the_configured_default() {
        let registry =
            ModelRegistry::initialize(two_providers(), Some("alpha-small".to_string()), false)
                .await
                .unwrap();
        let (provider, name) = registry.resolve("").unwrap();
        assert_eq!(provider.name(), "alpha");
        assert_eq!(name, "alpha-small");
    }

    #[tokio::test]
    async fn test_unknown_name_enumerates_every_known_model() {
        let registry = ModelRegistry::initialize(two_providers(), None, false)
            .await
            .unwrap();
        match registry.resolve("missing") {
            Err(ProviderError::UnknownModel { requested, known }) => {
                assert_eq!(requested, "missing");
                for name in ["alpha-small", "beta-large", "shared"] {
                    assert!(known.contains(name), "missing {name} in: {known}");
                }
            }
            other => panic!("expected UnknownModel, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_catalog_is_sorted_and_deduplicated() {
        let registry = ModelRegistry::initialize(two_providers(), None, false)
            .await
            .unwrap();
        let names: Vec<&str> = registry
            .catalog()
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha-small", "beta-large", "shared"]);
    }
}
