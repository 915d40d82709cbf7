//! Google Generative Language API client
//!
//! Calls `models/{name}:generateContent` with the image as inline base64
//! data and the prompt as a text part.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::provider::{ExtractionError, GenerativeModel, ModelInfo, ModelProvider};
use crate::config::ExtractionConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";
const LIST_PAGE_SIZE: u32 = 1000;
const MAX_LIST_PAGES: usize = 50;

/// Provider for Gemini models
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiProvider {
    /// Create a provider from extraction configuration
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ExtractionError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key().map(str::to_string),
            base_url: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn api_key(&self) -> Result<&str, ExtractionError> {
        self.api_key
            .as_deref()
            .ok_or(ExtractionError::MissingCredential)
    }
}

/// Normalize a model identifier, accepting an optional `models/` prefix
fn validate_model_name(name: &str) -> Result<String, ExtractionError> {
    let trimmed = name.trim();
    let bare = trimmed.strip_prefix("models/").unwrap_or(trimmed);

    let invalid = |reason: &str| ExtractionError::InvalidModel {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if bare.is_empty() {
        return Err(invalid("name is empty"));
    }
    if bare
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | ':'))
    {
        return Err(invalid("name contains reserved characters"));
    }

    Ok(bare.to_string())
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn model(&self, name: &str) -> Result<Arc<dyn GenerativeModel>, ExtractionError> {
        let api_key = self.api_key()?.to_string();
        let name = validate_model_name(name)?;

        Ok(Arc::new(GeminiModel {
            client: self.client.clone(),
            api_key,
            endpoint: format!("{}/models/{}:generateContent", self.base_url, name),
            name,
        }))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ExtractionError> {
        let api_key = self.api_key()?;
        let url = format!("{}/models", self.base_url);

        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        for page_number in 1..=MAX_LIST_PAGES {
            let mut request = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, api_key)
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await.map_err(|e| ExtractionError::Request {
                model: "models.list".to_string(),
                source: e,
            })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ExtractionError::Api {
                    model: "models.list".to_string(),
                    status: status.as_u16(),
                    body,
                });
            }

            let page: ListModelsResponse =
                response.json().await.map_err(|e| ExtractionError::Request {
                    model: "models.list".to_string(),
                    source: e,
                })?;

            models.extend(page.models.into_iter().map(|m| ModelInfo {
                name: m.name,
                display_name: m.display_name,
                supported_generation_methods: m.supported_generation_methods,
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) if seen_tokens.insert(token.clone()) => page_token = Some(token),
                Some(token) => {
                    tracing::warn!(token = %token, "Model listing repeated a page token; stopping");
                    break;
                }
                None => break,
            }

            if page_number == MAX_LIST_PAGES {
                tracing::warn!(pages = MAX_LIST_PAGES, "Model listing page limit reached; stopping");
            }
        }

        tracing::debug!(count = models.len(), "Listed models");
        Ok(models)
    }
}

/// Handle to one Gemini model
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    name: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<RemoteModel>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteModel {
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, or why there is none
    fn into_text(self) -> Result<String, String> {
        let blocked = self.prompt_feedback.and_then(|f| f.block_reason);

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(match blocked {
                Some(reason) => format!("prompt blocked ({reason})"),
                None => "no candidates".to_string(),
            });
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = candidate
                .finish_reason
                .unwrap_or_else(|| "empty content".to_string());
            return Err(format!("finish reason {reason}"));
        }

        Ok(text)
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, ExtractionError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: STANDARD.encode(image),
                        },
                    },
                    Part::Text { text: prompt },
                ],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Request {
                model: self.name.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                model: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let result: GenerateResponse =
            response.json().await.map_err(|e| ExtractionError::Request {
                model: self.name.clone(),
                source: e,
            })?;

        result
            .into_text()
            .map_err(|reason| ExtractionError::EmptyResponse {
                model: self.name.clone(),
                reason,
            })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    const TEST_KEY: &str = "test-key";

    async fn spawn_fake_api() -> String {
        async fn generate(
            Path(rest): Path<String>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            if headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some(TEST_KEY) {
                return (StatusCode::FORBIDDEN, Json(json!({"error": "bad key"})));
            }

            let model = rest.trim_end_matches(":generateContent");
            match model {
                "good-model" => {
                    let parts = &body["contents"][0]["parts"];
                    let echoed = format!(
                        "{}|{}",
                        parts[0]["inlineData"]["mimeType"].as_str().unwrap_or(""),
                        parts[0]["inlineData"]["data"].as_str().unwrap_or("")
                    );
                    (
                        StatusCode::OK,
                        Json(json!({
                            "candidates": [{
                                "content": {"parts": [{"text": echoed}, {"text": "|done"}]},
                                "finishReason": "STOP"
                            }]
                        })),
                    )
                }
                "blocked-model" => (
                    StatusCode::OK,
                    Json(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
                ),
                _ => (
                    StatusCode::NOT_FOUND,
                    Json(json!({"error": {"message": format!("models/{model} is not found")}})),
                ),
            }
        }

        async fn list() -> Json<Value> {
            Json(json!({
                "models": [
                    {
                        "name": "models/gemini-2.0-flash",
                        "displayName": "Gemini 2.0 Flash",
                        "supportedGenerationMethods": ["generateContent", "countTokens"]
                    },
                    {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]}
                ]
            }))
        }

        let router = Router::new()
            .route("/v1beta/models", get(list))
            .route("/v1beta/models/{*rest}", post(generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{}/v1beta", addr)
    }

    fn config(api_base: String, api_key: Option<&str>) -> ExtractionConfig {
        ExtractionConfig {
            api_key: api_key.map(str::to_string),
            api_base,
            timeout_secs: 5,
            ..ExtractionConfig::default()
        }
    }

    #[test]
    fn test_model_name_validation() {
        assert_eq!(validate_model_name("gemini-2.5-pro").unwrap(), "gemini-2.5-pro");
        assert_eq!(validate_model_name("models/gemini-2.5-pro").unwrap(), "gemini-2.5-pro");
        assert!(matches!(
            validate_model_name("  "),
            Err(ExtractionError::InvalidModel { .. })
        ));
        assert!(matches!(
            validate_model_name("gemini pro"),
            Err(ExtractionError::InvalidModel { .. })
        ));
        assert!(matches!(
            validate_model_name("../admin"),
            Err(ExtractionError::InvalidModel { .. })
        ));
    }

    #[test]
    fn test_model_requires_credential() {
        let provider = GeminiProvider::new(&config("http://localhost".into(), None)).unwrap();
        assert!(matches!(
            provider.model("gemini-2.0-flash"),
            Err(ExtractionError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn test_generate_sends_inline_image_and_joins_parts() {
        let base = spawn_fake_api().await;
        let provider = GeminiProvider::new(&config(base, Some(TEST_KEY))).unwrap();

        let model = provider.model("good-model").unwrap();
        assert_eq!(model.name(), "good-model");

        let text = model.generate(b"abc", "image/png", "prompt").await.unwrap();
        assert_eq!(text, format!("image/png|{}|done", STANDARD.encode(b"abc")));
    }

    #[tokio::test]
    async fn test_generate_reports_api_status() {
        let base = spawn_fake_api().await;
        let provider = GeminiProvider::new(&config(base, Some(TEST_KEY))).unwrap();

        let err = provider
            .model("gemini-exp-1206")
            .unwrap()
            .generate(b"abc", "image/jpeg", "prompt")
            .await
            .unwrap_err();

        match err {
            ExtractionError::Api { model, status, body } => {
                assert_eq!(model, "gemini-exp-1206");
                assert_eq!(status, 404);
                assert!(body.contains("is not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_empty_response() {
        let base = spawn_fake_api().await;
        let provider = GeminiProvider::new(&config(base, Some(TEST_KEY))).unwrap();

        let err = provider
            .model("blocked-model")
            .unwrap()
            .generate(b"abc", "image/jpeg", "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::EmptyResponse { .. }));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let base = spawn_fake_api().await;
        let provider = GeminiProvider::new(&config(base, Some("other-key"))).unwrap();

        let err = provider
            .model("good-model")
            .unwrap()
            .generate(b"abc", "image/jpeg", "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_list_models() {
        let base = spawn_fake_api().await;
        let provider = GeminiProvider::new(&config(base, Some(TEST_KEY))).unwrap();

        let models = provider.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "models/gemini-2.0-flash");
        assert_eq!(models[0].display_name.as_deref(), Some("Gemini 2.0 Flash"));
        assert!(models[0]
            .supported_generation_methods
            .contains(&"generateContent".to_string()));
        assert!(models[1].display_name.is_none());
    }

    #[tokio::test]
    async fn test_list_models_stops_on_repeated_page_token() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let router = Router::new().route(
            "/v1beta/models",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "models": [{"name": format!("models/m{n}")}],
                        "nextPageToken": "again"
                    }))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let provider =
            GeminiProvider::new(&config(format!("http://{}/v1beta", addr), Some(TEST_KEY))).unwrap();
        let models = provider.list_models().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(models.len(), 2);
        assert_eq!(models[1].name, "models/m1");
    }
}
