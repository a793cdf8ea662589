//! Anthropic-flavored transport: the messages API with `x-api-key` auth,
//! SSE event streaming and tool-use structured output.

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

const PROVIDER_ID: &str = "anthropic";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const FALLBACK_MODEL: &str = "sonnet-3.5";
const MAX_OUTPUT_TOKENS: u32 = 8192;

const MODELS: &[ModelSpec] = &[
    ModelSpec {
        alias: "sonnet-3.5",
        id: "claude-3-5-sonnet-latest",
        context_window: 200_000,
    },
    ModelSpec {
        alias: "haiku-3.5",
        id: "claude-3-5-haiku-latest",
        context_window: 200_000,
    },
    ModelSpec {
        alias: "opus-3",
        id: "claude-3-opus-latest",
        context_window: 200_000,
    },
];

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    default_model: Option<String>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<MessageParam<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    stream: bool,
}

#[derive(Serialize)]
struct MessageParam<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { input: Value },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: BlockDelta },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum BlockDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

enum LineEvent {
    Chunk(String),
    Stop,
    Ignore,
}

/// Decodes one SSE line. Only `content_block_delta` events with a
/// `text_delta` carry text; `message_stop` ends the sequence; every other
/// event kind (pings, block boundaries, usage deltas) is skipped.
fn parse_stream_line(line: &str) -> Result<LineEvent, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(LineEvent::Ignore);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(LineEvent::Ignore);
    }
    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| ProviderError::Stream(format!("bad stream event: {e}")))?;
    match event {
        StreamEvent::ContentBlockDelta {
            delta: BlockDelta::TextDelta { text },
        } if !text.is_empty() => Ok(LineEvent::Chunk(text)),
        StreamEvent::MessageStop => Ok(LineEvent::Stop),
        _ => Ok(LineEvent::Ignore),
    }
}

/// Pulls the usable text out of a non-streaming response: the first
/// `tool_use` block's input when present, otherwise the concatenated text
/// blocks, otherwise "".
fn response_text(response: MessagesResponse) -> Result<String, ProviderError> {
    let mut text = String::new();
    for block in response.content {
        match block {
            ContentBlock::ToolUse { input } => return Ok(serde_json::to_string(&input)?),
            ContentBlock::Text { text: fragment } => text.push_str(&fragment),
            ContentBlock::Other => {}
        }
    }
    Ok(text)
}

fn classification_tools() -> (Value, Value) {
    let tools = json!([{
        "name": CLASSIFICATION_TOOL_NAME,
        "description": prompts::CLASSIFICATION_TOOL_DESCRIPTION,
        "input_schema": prompts::classification_schema(),
    }]);
    let choice = json!({"type": "tool", "name": CLASSIFICATION_TOOL_NAME});
    (tools, choice)
}

impl AnthropicProvider {
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

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await?;
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
        let (tools, tool_choice) = match tools {
            Some((tools, choice)) => (Some(tools), Some(choice)),
            None => (None, None),
        };
        let request = MessagesRequest {
            model: model.id,
            max_tokens: MAX_OUTPUT_TOKENS,
            system,
            messages: vec![MessageParam {
                role: "user",
                content: user,
            }],
            tools,
            tool_choice,
            stream: false,
        };
        let response = self.send(&request).await?;
        let parsed: MessagesResponse = response.json().await?;
        response_text(parsed)
    }

    async fn stream_text(
        &self,
        model: &ModelSpec,
        system: &str,
        user: &str,
    ) -> Result<InferenceOutput, ProviderError> {
        let request = MessagesRequest {
            model: model.id,
            max_tokens: MAX_OUTPUT_TOKENS,
            system,
            messages: vec![MessageParam {
                role: "user",
                content: user,
            }],
            tools: None,
            tool_choice: None,
            stream: true,
        };
        let mut response = self.send(&request).await?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut buffer = String::new();
            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(newline) = buffer.find('\n') {
                            let line = buffer[..newline].trim_end_matches('\r').to_string();
                            buffer.drain(..=newline);
                            match parse_stream_line(&line) {
                                Ok(LineEvent::Chunk(text)) => {
                                    if tx.send(Ok(text)).is_err() {
                                        return; // consumer abandoned the stream
                                    }
                                }
                                Ok(LineEvent::Stop) => return,
                                Ok(LineEvent::Ignore) => {}
                                Err(e) => {
                                    let _ = tx.send(Err(e));
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e.into()));
                        return;
                    }
                }
            }
        });

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
impl ModelProvider for AnthropicProvider {
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
