//! Model invocation: resolve a model, call the completion service, pull the
//! reply text out of the response envelope.
//!
//! The call is made once with `temperature = 0`. There is no retry and no
//! timeout: a transport or provider error surfaces as
//! [`CvMatchError::ModelInvocation`] and the task aborts.
//!
//! ## Backends
//!
//! * [`ProviderCompletion`] routes `provider/model` identifiers
//!   (`mistral/mistral-small-latest`, `anthropic/claude-...`, bare `gpt-4o-mini`
//!   for OpenAI) through `edgequake_llm::ProviderFactory`, and wraps the reply
//!   in an OpenAI-shaped envelope.
//! * [`HttpCompletion`] posts to any OpenAI-compatible `/chat/completions`
//!   endpoint (a LiteLLM proxy, vLLM, Ollama) and returns the body unchanged.
//!
//! Both implement [`CompletionService`]; tests plug in their own.

use crate::config::{Backend, MatchConfig, ModelEnv};
use crate::error::{ClientLoadError, CvMatchError};
use crate::prompts::{Message, Role};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Sampling temperature for every call.
pub const TEMPERATURE: f32 = 0.0;

/// Provider used for model identifiers without a `provider/` prefix.
pub const DEFAULT_PROVIDER: &str = "openai";

/// One chat-completions request, serialisable as an OpenAI-compatible body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

/// Anything that can answer a [`CompletionRequest`] with a provider envelope.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Short backend name for logs and errors.
    fn name(&self) -> &str;

    /// Send the request; return the raw response object.
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, CvMatchError>;
}

/// Pull `choices[0].message.content` out of a response envelope.
pub fn reply_content(envelope: &Value) -> Option<&str> {
    envelope.pointer("/choices/0/message/content")?.as_str()
}

/// Split `provider/model`; bare identifiers go to [`DEFAULT_PROVIDER`].
pub fn split_model_id(model_id: &str) -> (&str, &str) {
    match model_id.split_once('/') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => (provider, model),
        _ => (DEFAULT_PROVIDER, model_id),
    }
}

// ── Invoker ──────────────────────────────────────────────────────────────

/// Resolves the model and calls the completion service.
///
/// The client is constructed when the invoker is; if that fails the error is
/// kept and returned as [`CvMatchError::DependencyMissing`] on the first call,
/// so PDF extraction and prompt rendering still work without a client.
#[derive(Clone)]
pub struct ModelInvoker {
    client: Result<Arc<dyn CompletionService>, Arc<ClientLoadError>>,
    backend: String,
    env: ModelEnv,
    max_tokens: Option<usize>,
    strict_reply: bool,
}

impl ModelInvoker {
    /// Build the backend selected by `config`.
    pub fn new(config: &MatchConfig) -> Self {
        let client: Result<Arc<dyn CompletionService>, ClientLoadError> = match config.backend {
            Backend::Provider => Ok(Arc::new(match config.provider {
                Some(ref provider) => ProviderCompletion::with_provider(Arc::clone(provider)),
                None => ProviderCompletion::routed(),
            })),
            Backend::Http => HttpCompletion::new(config.api_base.as_deref(), config.api_key.clone())
                .map(|c| Arc::new(c) as Arc<dyn CompletionService>),
        };
        if let Err(ref e) = client {
            warn!("Completion client '{}' unavailable: {}", config.backend.as_str(), e);
        }

        Self {
            client: client.map_err(Arc::new),
            backend: config.backend.as_str().to_string(),
            env: config.env.clone(),
            max_tokens: config.max_tokens,
            strict_reply: config.strict_reply,
        }
    }

    /// Use a caller-supplied service (custom middleware, tests).
    pub fn with_service(service: Arc<dyn CompletionService>, config: &MatchConfig) -> Self {
        Self {
            backend: service.name().to_string(),
            client: Ok(service),
            env: config.env.clone(),
            max_tokens: config.max_tokens,
            strict_reply: config.strict_reply,
        }
    }

    /// The model a call with this hint would use.
    pub fn resolve_model(&self, hint: Option<&str>) -> String {
        self.env.resolve_model(hint)
    }

    /// Send `messages` and return the reply text.
    pub async fn invoke(
        &self,
        messages: &[Message],
        model_hint: Option<&str>,
    ) -> Result<String, CvMatchError> {
        let client = self
            .client
            .as_ref()
            .map_err(|e| CvMatchError::DependencyMissing {
                backend: self.backend.clone(),
                source: Arc::clone(e),
            })?;

        let request = CompletionRequest {
            model: self.resolve_model(model_hint),
            messages: messages.to_vec(),
            temperature: TEMPERATURE,
            max_tokens: self.max_tokens,
        };
        debug!(
            "Calling '{}' via {} with {} messages",
            request.model,
            client.name(),
            request.messages.len()
        );

        let start = Instant::now();
        let envelope = client.complete(&request).await?;
        debug!("Reply from '{}' in {:?}", request.model, start.elapsed());

        match reply_content(&envelope) {
            Some(text) => Ok(text.to_string()),
            None if self.strict_reply => Err(CvMatchError::UnexpectedReplyShape {
                model: request.model,
            }),
            None => {
                warn!(
                    "Reply from '{}' has no choices[0].message.content; using the whole response",
                    request.model
                );
                Ok(envelope.to_string())
            }
        }
    }
}

// ── edgequake-llm backend ────────────────────────────────────────────────

/// Native providers via `edgequake-llm`.
pub struct ProviderCompletion {
    fixed: Option<Arc<dyn LLMProvider>>,
}

impl ProviderCompletion {
    /// Create a provider per call from the model identifier's prefix.
    pub fn routed() -> Self {
        Self { fixed: None }
    }

    /// Send every call to `provider`, whatever the model identifier says.
    pub fn with_provider(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            fixed: Some(provider),
        }
    }

    fn provider_for(&self, model_id: &str) -> Result<Arc<dyn LLMProvider>, CvMatchError> {
        if let Some(ref provider) = self.fixed {
            return Ok(Arc::clone(provider));
        }
        let (provider_name, model) = split_model_id(model_id);
        ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            CvMatchError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.as_str()),
        Role::User => ChatMessage::user(message.content.as_str()),
        Role::Assistant => ChatMessage::assistant(message.content.as_str()),
    }
}

#[async_trait]
impl CompletionService for ProviderCompletion {
    fn name(&self) -> &str {
        "provider"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Value, CvMatchError> {
        let provider = self.provider_for(&request.model)?;
        let messages: Vec<ChatMessage> = request.messages.iter().map(to_chat_message).collect();
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: request.max_tokens,
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| CvMatchError::ModelInvocation {
                model: request.model.clone(),
                message: format!("{e}"),
            })?;

        Ok(json!({
            "object": "chat.completion",
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": response.content },
            }],
            "usage": {
                "prompt_tokens": response.prompt_tokens,
                "completion_tokens": response.completion_tokens,
            },
        }))
    }
}

// ── OpenAI-compatible HTTP backend ───────────────────────────────────────

/// Plain `POST {api_base}/chat/completions`.
pub struct HttpCompletion {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCompletion {
    pub fn new(api_base: Option<&str>, api_key: Option<String>) -> Result<Self, ClientLoadError> {
        let base = api_base
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or(ClientLoadError::MissingApiBase)?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionService for HttpCompletion {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Value, CvMatchError> {
        let fail = |message: String| CvMatchError::ModelInvocation {
            model: request.model.clone(),
            message,
        };

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(format!("HTTP {status}: {body}")));
        }

        response.json::<Value>().await.map_err(|e| fail(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Canned {
        envelope: Value,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionService for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<Value, CvMatchError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.envelope.clone())
        }
    }

    fn invoker(envelope: Value, strict: bool) -> (ModelInvoker, Arc<Canned>) {
        let service = Arc::new(Canned {
            envelope,
            seen: Mutex::new(Vec::new()),
        });
        let config = MatchConfig::builder().strict_reply(strict).build().unwrap();
        (ModelInvoker::with_service(service.clone(), &config), service)
    }

    #[test]
    fn reply_content_reads_first_choice() {
        let env = json!({"choices": [{"message": {"content": "hi"}}, {"message": {"content": "no"}}]});
        assert_eq!(reply_content(&env), Some("hi"));
        assert_eq!(reply_content(&json!({"choices": []})), None);
        assert_eq!(reply_content(&json!({"choices": [{"message": {"content": null}}]})), None);
    }

    #[test]
    fn model_ids_are_split_on_first_slash() {
        assert_eq!(
            split_model_id("mistral/mistral-small-latest"),
            ("mistral", "mistral-small-latest")
        );
        assert_eq!(split_model_id("gpt-4o-mini"), ("openai", "gpt-4o-mini"));
        assert_eq!(
            split_model_id("openrouter/meta/llama"),
            ("openrouter", "meta/llama")
        );
        assert_eq!(split_model_id("/odd"), ("openai", "/odd"));
    }

    #[test]
    fn request_body_is_openai_shaped() {
        let req = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::system("s"), Message::user("u")],
            temperature: TEMPERATURE,
            max_tokens: None,
        };
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "s"},
                    {"role": "user", "content": "u"}
                ],
                "temperature": 0.0
            })
        );
    }

    #[tokio::test]
    async fn invoke_sends_zero_temperature_and_resolved_model() {
        let (inv, service) = invoker(json!({"choices": [{"message": {"content": "ok"}}]}), false);
        let reply = inv.invoke(&[Message::user("hello")], Some("m1")).await.unwrap();
        assert_eq!(reply, "ok");

        let requests = service.seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "m1");
        assert_eq!(requests[0].temperature, 0.0);
    }

    #[tokio::test]
    async fn missing_content_is_stringified() {
        let envelope = json!({"id": "x", "error": "weird"});
        let (inv, _) = invoker(envelope.clone(), false);
        let reply = inv.invoke(&[Message::user("hello")], None).await.unwrap();
        assert_eq!(reply, envelope.to_string());
    }

    #[tokio::test]
    async fn missing_content_raises_in_strict_mode() {
        let (inv, _) = invoker(json!({"id": "x"}), true);
        let err = inv.invoke(&[Message::user("hello")], None).await.unwrap_err();
        assert!(matches!(err, CvMatchError::UnexpectedReplyShape { .. }));
    }

    #[tokio::test]
    async fn unloadable_client_fails_lazily() {
        let config = MatchConfig::builder().backend(Backend::Http).build().unwrap();
        let inv = ModelInvoker::new(&config);
        // Resolution still works without a client.
        assert_eq!(inv.resolve_model(Some("m1")), "m1");

        let err = inv.invoke(&[Message::user("hello")], None).await.unwrap_err();
        match err {
            CvMatchError::DependencyMissing { backend, source } => {
                assert_eq!(backend, "http");
                assert!(matches!(*source, ClientLoadError::MissingApiBase));
            }
            other => panic!("expected DependencyMissing, got {other:?}"),
        }
    }

    #[test]
    fn http_endpoint_is_joined_once() {
        let c = HttpCompletion::new(Some("http://localhost:4000/v1/"), None).unwrap();
        assert_eq!(c.endpoint(), "http://localhost:4000/v1/chat/completions");
    }
}
