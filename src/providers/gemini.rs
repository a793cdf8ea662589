//! Gemini-flavored transport: `generateContent` with key-in-query auth and
//! function-declaration structured output.
//!
//! The vendor's "streaming" endpoint answers with a JSON array of pre-chunked
//! response objects rather than true delta events; the fragments are re-sent
//! through the stream channel so callers see the same contract as the other
//! providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::prompts::{self, CLASSIFICATION_TOOL_NAME};
use super::registry::ModelCatalogEntry;
use super::{
    require_non_blank, resolve_model_spec, InferenceOptions, InferenceOutput, ModelProvider,
    ModelSpec, ProviderError,
};
use crate::utils::tokens;

const PROVIDER_ID: &str = "gemini";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_ENV: &str = "GEMINI_API_KEY";
const FALLBACK_MODEL: &str = "gemini-1.5-flash";
const MAX_OUTPUT_TOKENS: u32 = 8192;

const MODELS: &[ModelSpec] = &[
    ModelSpec {
        alias: "gemini-1.5-flash",
        id: "gemini-1.5-flash",
        context_window: 1_000_000,
    },
    ModelSpec {
        alias: "gemini-1.5-pro",
        id: "gemini-1.5-pro",
        context_window: 2_000_000,
    },
    ModelSpec {
        alias: "gemini-2.0-flash",
        id: "gemini-2.0-flash",
        context_window: 1_000_000,
    },
];

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    default_model: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    args: Value,
}

/// Pulls the usable text out of one response object: the first function
/// call's args when present, otherwise the first candidate's concatenated
/// text parts, otherwise "".
fn response_text(response: GenerateResponse) -> Result<String, ProviderError> {
    let mut text = String::new();
    if let Some(candidate) = response.candidates.into_iter().next() {
        let content = candidate.content.unwrap_or_default();
        for part in content.parts {
            if let Some(call) = part.function_call {
                return Ok(serde_json::to_string(&call.args)?);
            }
            if let Some(fragment) = part.text {
                text.push_str(&fragment);
            }
        }
    }
    Ok(text)
}

/// Decodes the `:streamGenerateContent` body, a JSON array of pre-chunked
/// response objects, into ordered text fragments.
fn fragments_from_body(body: &str) -> Result<Vec<String>, ProviderError> {
    let responses: Vec<GenerateResponse> = serde_json::from_str(body)
        .map_err(|e| ProviderError::Stream(format!("bad chunked response: {e}")))?;
    let mut fragments = Vec::new();
    for response in responses {
        let fragment = response_text(response)?;
        if !fragment.is_empty() {
            fragments.push(fragment);
        }
    }
    Ok(fragments)
}

fn classification_tools() -> (Value, Value) {
    let tools = json!([{
        "functionDeclarations": [{
            "name": CLASSIFICATION_TOOL_NAME,
            "description": prompts::CLASSIFICATION_TOOL_DESCRIPTION,
            "parameters": prompts::classification_schema(),
        }]
    }]);
    let config = json!({
        "functionCallingConfig": {
            "mode": "ANY",
            "allowedFunctionNames": [CLASSIFICATION_TOOL_NAME],
        }
    });
    (tools, config)
}

fn build_request<'a>(
    system: &'a str,
    user: &'a str,
    tools: Option<(Value, Value)>,
) -> GenerateRequest<'a> {
    let (tools, tool_config) = match tools {
        Some((tools, config)) => (Some(tools), Some(config)),
        None => (None, None),
    };
    GenerateRequest {
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: user }],
        }],
        system_instruction: Content {
            role: None,
            parts: vec![Part { text: system }],
        },
        generation_config: GenerationConfig {
            temperature: 0.2,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
        tools,
        tool_config,
    }
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>, default_model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            default_model,
        }
    }

    fn api_key(&self) -> Result<String, ProviderError> {
        if let Some(key) = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
        {
            return Ok(key.to_string());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::MissingApiKey {
                provider: PROVIDER_ID,
                env_var: API_KEY_ENV,
            })
    }

    fn resolve_model(&self, opts: &InferenceOptions) -> Result<&'static ModelSpec, ProviderError> {
        resolve_model_spec(
            MODELS,
            opts.model.as_deref(),
            self.default_model.as_deref(),
            FALLBACK_MODEL,
        )
    }

    fn check_budget(model: &ModelSpec, system: &str, user: &str) -> Result<(), ProviderError> {
        let counted = tokens::approximate_tokens(system) + tokens::approximate_tokens(user);
        if counted > model.context_window {
            return Err(ProviderError::TokenBudget {
                model: model.id.to_string(),
                counted,
                limit: model.context_window,
            });
        }
        Ok(())
    }

    async fn send(
        &self,
        url: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn fetch_text(
        &self,
        model: &ModelSpec,
        system: &str,
        user: &str,
        tools: Option<(Value, Value)>,
    ) -> Result<String, ProviderError> {
        let request = build_request(system, user, tools);
        let url = format!(
            "{API_BASE}/{}:generateContent?key={}",
            model.id,
            self.api_key()?
        );
        let response = self.send(&url, &request).await?;
        let parsed: GenerateResponse = response.json().await?;
        response_text(parsed)
    }

    async fn stream_text(
        &self,
        model: &ModelSpec,
        system: &str,
        user: &str,
    ) -> Result<InferenceOutput, ProviderError> {
        let request = build_request(system, user, None);
        let url = format!(
            "{API_BASE}/{}:streamGenerateContent?key={}",
            model.id,
            self.api_key()?
        );
        let response = self.send(&url, &request).await?;
        let body = response.text().await?;
        let fragments = fragments_from_body(&body)?;

        let (tx, rx) = mpsc::unbounded_channel();
        for fragment in fragments {
            let _ = tx.send(Ok(fragment));
        }
        Ok(InferenceOutput::Stream(rx))
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError> {
        let model = self.resolve_model(opts)?;
        Self::check_budget(model, system, user)?;
        if opts.verbose {
            tracing::debug!("Requesting completion from {} model {}", PROVIDER_ID, model.id);
        }
        if opts.allow_streaming {
            self.stream_text(model, system, user).await
        } else {
            let text = self.fetch_text(model, system, user, None).await?;
            Ok(InferenceOutput::Text(text))
        }
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn list_models(&self, verbose: bool) -> Result<Vec<ModelCatalogEntry>, ProviderError> {
        if verbose {
            tracing::debug!("Listing {} model catalog", PROVIDER_ID);
        }
        Ok(MODELS
            .iter()
            .map(|spec| ModelCatalogEntry {
                name: spec.alias.to_string(),
                provider_id: PROVIDER_ID.to_string(),
                token_limit: spec.context_window,
            })
            .collect())
    }

    async fn infer_project_shape(
        &self,
        tree_json: &str,
        opts: &InferenceOptions,
    ) -> Result<String, ProviderError> {
        require_non_blank(tree_json, "directory tree")?;
        let system =
            prompts::compose_system_prompt(prompts::CLASSIFY_SYSTEM, opts.user_expertise.as_deref());
        let user = prompts::classify_user_prompt(tree_json);
        let model = self.resolve_model(opts)?;
        Self::check_budget(model, &system, &user)?;
        // The result is parsed as JSON immediately after this call, so the
        // transport stays non-streaming regardless of `allow_streaming`.
        self.fetch_text(model, &system, &user, Some(classification_tools()))
            .await
    }

    async fn infer_dependency(
        &self,
        dependency_file: &str,
        workflow: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError> {
        require_non_blank(dependency_file, "dependency file")?;
        require_non_blank(workflow, "workflow")?;
        let system = prompts::compose_system_prompt(
            prompts::DEPENDENCY_SYSTEM,
            opts.user_expertise.as_deref(),
        );
        let user = prompts::dependency_user_prompt(dependency_file, workflow);
        self.complete(&system, &user, opts).await
    }

    async fn infer_code(
        &self,
        tree_json: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError> {
        require_non_blank(tree_json, "directory tree")?;
        let system =
            prompts::compose_system_prompt(prompts::CODE_SYSTEM, opts.user_expertise.as_deref());
        let user = prompts::code_user_prompt(tree_json);
        self.complete(&system, &user, opts).await
    }

    async fn infer_interesting_code(
        &self,
        tree_json: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError> {
        require_non_blank(tree_json, "directory tree")?;
        let system = prompts::compose_system_prompt(
            prompts::INTERESTING_CODE_SYSTEM,
            opts.user_expertise.as_deref(),
        );
        let user = prompts::code_user_prompt(tree_json);
        self.complete(&system, &user, opts).await
    }

    async fn generate_readme(
        &self,
        directory_structure: &str,
        dependency_inference: &str,
        code_inference: &str,
        opts: &InferenceOptions,
    ) -> Result<InferenceOutput, ProviderError> {
        require_non_blank(directory_structure, "directory structure")?;
        require_non_blank(dependency_inference, "dependency inference")?;
        require_non_blank(code_inference, "code inference")?;
        let system =
            prompts::compose_system_prompt(prompts::README_SYSTEM, opts.user_expertise.as_deref());
        let user =
            prompts::readme_user_prompt(directory_structure, dependency_inference, code_inference);
        self.complete(&system, &user, opts).await
    }
}
