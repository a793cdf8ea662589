//! OpenAI-flavored transport: chat completions with bearer auth, SSE
//! streaming and function-call structured output.

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

const PROVIDER_ID: &str = "openai";
const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const API_KEY_ENV: &str = "OPENAI_API_KEY";
const FALLBACK_MODEL: &str = "gpt-4o-mini";

const MODELS: &[ModelSpec] = &[
    ModelSpec {
        alias: "gpt-4o",
        id: "gpt-4o",
        context_window: 128_000,
    },
    ModelSpec {
        alias: "gpt-4o-mini",
        id: "gpt-4o-mini",
        context_window: 128_000,
    },
    ModelSpec {
        alias: "gpt-4.1",
        id: "gpt-4.1",
        context_window: 1_047_576,
    },
    ModelSpec {
        alias: "gpt-4.1-mini",
        id: "gpt-4.1-mini",
        context_window: 1_047_576,
    },
];

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    default_model: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize, Default)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    arguments: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

enum LineEvent {
    Chunk(String),
    Done,
    Ignore,
}

/// Decodes one SSE line. Only content deltas carry text; the `[DONE]`
/// sentinel ends the sequence and everything else is skipped.
fn parse_stream_line(line: &str) -> Result<LineEvent, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(LineEvent::Ignore);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(LineEvent::Ignore);
    }
    if data == "[DONE]" {
        return Ok(LineEvent::Done);
    }
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| ProviderError::Stream(format!("bad delta event: {e}")))?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    if text.is_empty() {
        Ok(LineEvent::Ignore)
    } else {
        Ok(LineEvent::Chunk(text))
    }
}

/// Pulls the usable text out of a non-streaming response: function-call
/// arguments when present, otherwise the plain message content, otherwise "".
fn response_text(response: ChatResponse) -> String {
    let Some(choice) = response.choices.into_iter().next() else {
        return String::new();
    };
    if let Some(call) = choice
        .message
        .tool_calls
        .and_then(|calls| calls.into_iter().next())
    {
        return call.function.arguments;
    }
    choice.message.content.unwrap_or_default()
}

fn classification_tools() -> (Value, Value) {
    let tools = json!([{
        "type": "function",
        "function": {
            "name": CLASSIFICATION_TOOL_NAME,
            "description": prompts::CLASSIFICATION_TOOL_DESCRIPTION,
            "parameters": prompts::classification_schema(),
        }
    }]);
    let choice = json!({"type": "function", "function": {"name": CLASSIFICATION_TOOL_NAME}});
    (tools, choice)
}

impl OpenAiProvider {
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
        let counted = tokens::count_openai_tokens(system) + tokens::count_openai_tokens(user);
        if counted > model.context_window {
            return Err(ProviderError::TokenBudget {
                model: model.id.to_string(),
                counted,
                limit: model.context_window,
            });
        }
        Ok(())
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(API_URL)
            .bearer_auth(self.api_key()?)
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
        let request = ChatRequest {
            model: model.id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            tools,
            tool_choice,
            stream: false,
        };
        let response = self.send(&request).await?;
        let parsed: ChatResponse = response.json().await?;
        Ok(response_text(parsed))
    }

    async fn stream_text(
        &self,
        model: &ModelSpec,
        system: &str,
        user: &str,
    ) -> Result<InferenceOutput, ProviderError> {
        let request = ChatRequest {
            model: model.id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
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
                                Ok(LineEvent::Done) => return,
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
impl ModelProvider for OpenAiProvider {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_delta_line_yields_a_chunk() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        match parse_stream_line(line).unwrap() {
            LineEvent::Chunk(text) => assert_eq!(text, "Hello"),
            _ => panic!("expected a chunk"),
        }
    }

    #[test]
    fn test_done_sentinel_terminates_the_stream() {
        assert!(matches!(
            parse_stream_line("data: [DONE]").unwrap(),
            LineEvent::Done
        ));
    }

    #[test]
    fn test_textless_events_are_skipped() {
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(
            parse_stream_line(role_only).unwrap(),
            LineEvent::Ignore
        ));
        assert!(matches!(parse_stream_line("").unwrap(), LineEvent::Ignore));
        assert!(matches!(
            parse_stream_line(": keep-alive").unwrap(),
            LineEvent::Ignore
        ));
    }

    #[test]
    fn test_malformed_delta_is_a_stream_error() {
        assert!(parse_stream_line("data: {not json").is_err());
    }

    #[test]
    fn test_tool_call_arguments_win_over_content() {
        let raw = r#"{"choices":[{"message":{
            "content":"ignored",
            "tool_calls":[{"function":{"name":"classify_project","arguments":"{\"isMonorepo\":false}"}}]
        }}]}"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response_text(response), "{\"isMonorepo\":false}");
    }

    #[test]
    fn test_plain_text_fallback_is_returned_as_is() {
        let raw = r#"{"choices":[{"message":{"content":"just text"}}]}"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response_text(response), "just text");
    }

    #[test]
    fn test_empty_response_becomes_empty_string() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(response_text(response), "");
    }

    #[test]
    fn test_classification_tools_reference_the_shared_schema() {
        let (tools, choice) = classification_tools();
        assert_eq!(tools[0]["function"]["name"], CLASSIFICATION_TOOL_NAME);
        assert!(tools[0]["function"]["parameters"]["properties"]
            .as_object()
            .unwrap()
            .contains_key("isMonorepo"));
        assert_eq!(choice["function"]["name"], CLASSIFICATION_TOOL_NAME);
    }
}
