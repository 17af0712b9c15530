//! OpenRouter chat-completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use secq_shared::{OpenRouterConfig, Result, SecqError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::{Completion, GenerationService};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("SecQ/", env!("CARGO_PKG_VERSION"));

/// Application title reported to OpenRouter.
const APP_TITLE: &str = "SecQ";

/// Longest error body excerpt carried into an error message.
const MAX_ERROR_EXCERPT: usize = 300;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Resolved client settings (config file values plus the API key from the env).
#[derive(Debug, Clone)]
pub struct OpenRouterSettings {
    /// Bearer token. `None` means no credential is configured.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&OpenRouterConfig> for OpenRouterSettings {
    fn from(config: &OpenRouterConfig) -> Self {
        Self {
            api_key: config.api_key(),
            model: config.default_model.clone(),
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for `POST {base_url}/chat/completions`.
pub struct OpenRouterClient {
    client: Client,
    endpoint: Url,
    settings: OpenRouterSettings,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.settings.model)
            .field("has_credential", &self.settings.api_key.is_some())
            .finish()
    }
}

impl OpenRouterClient {
    /// Build a client. Fails on an unparseable base URL or zero timeout.
    pub fn new(settings: OpenRouterSettings) -> Result<Self> {
        if settings.timeout_secs == 0 {
            return Err(SecqError::config("openrouter timeout must be positive"));
        }

        let base = settings.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/chat/completions")).map_err(|e| {
            SecqError::config(format!("invalid openrouter base_url '{}': {e}", settings.base_url))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| SecqError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            settings,
        })
    }

    /// Model requested on every call.
    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

#[async_trait]
impl GenerationService for OpenRouterClient {
    fn has_credential(&self) -> bool {
        self.settings.api_key.is_some()
    }

    #[instrument(skip_all, fields(model = %self.settings.model))]
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| SecqError::config("OpenRouter API key is not configured"))?;

        let request = ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .header("X-Title", APP_TITLE)
            .json(&request)
            .send()
            .await
            .map_err(|e| SecqError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SecqError::Generation(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(SecqError::Generation(format!(
                "HTTP {status}: {}",
                excerpt(&body)
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            SecqError::Generation(format!("invalid response: {e} (got: {})", excerpt(&body)))
        })?;

        if let Some(err) = parsed.error {
            let code = err.code.map(|c| format!(" [{c}]")).unwrap_or_default();
            return Err(SecqError::Generation(format!("{}{code}", err.message)));
        }

        // No choices is an empty answer, left to the caller's fallback.
        let text = match parsed.choices.into_iter().next() {
            Some(choice) => choice.message.content.unwrap_or_default(),
            None => {
                debug!("response contained no choices");
                String::new()
            }
        };

        let usage = parsed.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });
        let completion = Completion {
            text,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            model: parsed.model.unwrap_or_else(|| self.settings.model.clone()),
            latency_ms: start.elapsed().as_millis() as u64,
        };

        debug!(
            tokens_in = completion.tokens_in,
            tokens_out = completion.tokens_out,
            latency_ms = completion.latency_ms,
            "completion received"
        );

        Ok(completion)
    }
}

/// First few hundred characters of a response body.
fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str, api_key: Option<&str>) -> OpenRouterSettings {
        OpenRouterSettings {
            api_key: api_key.map(String::from),
            model: "test/model".into(),
            base_url: base_url.into(),
            timeout_secs: 5,
            temperature: 0.2,
            max_tokens: 256,
        }
    }

    #[test]
    fn request_serializes_non_streaming_chat() {
        let request = ChatRequest {
            model: "test/model",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "usr",
                },
            ],
            temperature: 0.0,
            max_tokens: 10,
            stream: false,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""stream":false"#));
        assert!(json.contains(r#"{"role":"system","content":"sys"}"#));
        assert!(json.contains(r#"{"role":"user","content":"usr"}"#));
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = OpenRouterClient::new(settings("not a url", Some("k"))).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn credential_presence() {
        let with = OpenRouterClient::new(settings("http://localhost:1", Some("k"))).unwrap();
        let without = OpenRouterClient::new(settings("http://localhost:1", None)).unwrap();
        assert!(with.has_credential());
        assert!(!without.has_credential());
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(MAX_ERROR_EXCERPT + 10);
        assert_eq!(excerpt(&long).chars().count(), MAX_ERROR_EXCERPT);
        assert_eq!(excerpt("short"), "short");
    }

    #[tokio::test]
    async fn complete_parses_success_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "model": "test/model",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "be grounded"},
                    {"role": "user", "content": "Is MFA enforced?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "gen-1",
                "model": "test/model-2024",
                "choices": [{"message": {"role": "assistant", "content": "Yes, MFA is enforced."}}],
                "usage": {"prompt_tokens": 120, "completion_tokens": 8}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/api/v1/", server.uri());
        let client = OpenRouterClient::new(settings(&base, Some("secret"))).unwrap();
        let completion = client
            .complete("be grounded", "Is MFA enforced?")
            .await
            .expect("complete");

        assert_eq!(completion.text, "Yes, MFA is enforced.");
        assert_eq!(completion.tokens_in, 120);
        assert_eq!(completion.tokens_out, 8);
        assert_eq!(completion.model, "test/model-2024");
    }

    #[tokio::test]
    async fn null_content_becomes_empty_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(settings(&server.uri(), Some("k"))).unwrap();
        let completion = client.complete("s", "u").await.expect("complete");
        assert_eq!(completion.text, "");
        assert_eq!(completion.model, "test/model");
        assert_eq!(completion.tokens_in, 0);
    }

    #[tokio::test]
    async fn empty_choices_become_empty_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "test/model",
                "choices": [],
                "usage": {"prompt_tokens": 42, "completion_tokens": 0}
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(settings(&server.uri(), Some("k"))).unwrap();
        let completion = client.complete("s", "u").await.expect("complete");
        assert_eq!(completion.text, "");
        assert_eq!(completion.tokens_in, 42);
    }

    #[tokio::test]
    async fn http_error_maps_to_generation_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(settings(&server.uri(), Some("k"))).unwrap();
        let err = client.complete("s", "u").await.unwrap_err();
        match err {
            SecqError::Generation(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("quota exceeded"));
            }
            other => panic!("expected Generation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_body_with_ok_status_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"message": "model overloaded", "code": 503}
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(settings(&server.uri(), Some("k"))).unwrap();
        let err = client.complete("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("model overloaded [503]"));
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(settings(&server.uri(), Some("k"))).unwrap();
        let err = client.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, SecqError::Generation(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(settings(&server.uri(), None)).unwrap();
        let err = client.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, SecqError::Config { .. }));
    }
}
