//! Candidate fallback extractor
//!
//! Tries each configured model in order until one answers, then normalizes
//! the answer. Every failure is returned as a value: callers always get a
//! JSON object carrying either `fields` or `error`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::gemini::GeminiProvider;
use super::normalize::parse_model_output;
use super::prompt::EXTRACTION_PROMPT;
use super::provider::{ExtractionError, ModelInfo, ModelProvider};
use crate::config::ExtractionConfig;
use crate::metrics;

/// Which stage of extraction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No credential configured
    Configuration,
    /// Every candidate model failed
    ModelsUnavailable,
    /// A model answered with text that is not a usable extraction object
    MalformedOutput,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Configuration => "configuration",
            FailureKind::ModelsUnavailable => "models_unavailable",
            FailureKind::MalformedOutput => "malformed_output",
        }
    }
}

/// Error object returned in place of an extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionFailure {
    pub error: String,

    /// Present (as null) only for configuration failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Option<String>>,

    #[serde(skip)]
    pub kind: FailureKind,
}

/// Either a normalized extraction object or an error object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Extracted(Map<String, Value>),
    Failed(ExtractionFailure),
}

impl ExtractionOutcome {
    fn failed(kind: FailureKind, error: impl Into<String>) -> Self {
        let raw_response = match kind {
            FailureKind::Configuration => Some(None),
            _ => None,
        };
        ExtractionOutcome::Failed(ExtractionFailure {
            error: error.into(),
            raw_response,
            kind,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExtractionOutcome::Failed(_))
    }

    /// The failure category, if this is an error object
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExtractionOutcome::Failed(failure) => Some(failure.kind),
            ExtractionOutcome::Extracted(_) => None,
        }
    }

    /// Convert into a JSON value
    pub fn into_value(self) -> Value {
        match self {
            ExtractionOutcome::Extracted(map) => Value::Object(map),
            ExtractionOutcome::Failed(failure) => {
                let mut map = Map::new();
                map.insert("error".to_string(), Value::String(failure.error));
                if let Some(raw) = failure.raw_response {
                    map.insert(
                        "raw_response".to_string(),
                        raw.map(Value::String).unwrap_or(Value::Null),
                    );
                }
                Value::Object(map)
            }
        }
    }
}

/// One candidate that did not produce a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub model: String,
    pub error: String,
}

/// Result of one extraction call, with the attempts made along the way
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub outcome: ExtractionOutcome,
    /// Model whose response was used, if any answered
    pub model: Option<String>,
    /// Candidates that failed before `model` answered (or all of them)
    pub failed_attempts: Vec<FailedAttempt>,
}

/// Extracts claim-form fields from document images
pub struct Extractor {
    provider: Arc<dyn ModelProvider>,
    candidates: Vec<String>,
    configured: bool,
    deadline: Duration,
}

impl Extractor {
    /// Create an extractor over the given provider.
    ///
    /// A missing credential does not fail construction; it is logged here and
    /// every later call reports it without touching the provider.
    pub fn new(config: &ExtractionConfig, provider: Arc<dyn ModelProvider>) -> Self {
        let configured = config.api_key().is_some();
        if !configured {
            warn!("No model API key configured; extraction requests will be rejected");
        }
        if config.candidate_models.is_empty() {
            warn!("No candidate models configured");
        }
        if config.deadline() < config.worst_case() {
            warn!(
                deadline_secs = config.deadline_secs,
                worst_case_secs = config.worst_case().as_secs(),
                "Extraction deadline is shorter than every candidate timing out; later candidates may be skipped"
            );
        }

        Self {
            provider,
            candidates: config.candidate_models.clone(),
            configured,
            deadline: config.deadline(),
        }
    }

    /// Create an extractor backed by the Gemini API
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let provider = GeminiProvider::new(config)?;
        Ok(Self::new(config, Arc::new(provider)))
    }

    /// Whether a credential is present
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Candidate models, most preferred first
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// List the models the provider can reach
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ExtractionError> {
        if !self.configured {
            return Err(ExtractionError::MissingCredential);
        }
        self.provider.list_models().await
    }

    /// Extract fields from one document image
    #[instrument(skip(self, image), fields(image_bytes = image.len()))]
    pub async fn extract(&self, image: &[u8], mime_type: &str) -> ExtractionReport {
        let start = Instant::now();
        let report = self.run(image, mime_type).await;

        let outcome = report
            .outcome
            .failure_kind()
            .map(|kind| kind.as_str())
            .unwrap_or("extracted");
        metrics::record_extraction(start.elapsed().as_secs_f64(), outcome);

        report
    }

    async fn run(&self, image: &[u8], mime_type: &str) -> ExtractionReport {
        if !self.configured {
            return ExtractionReport {
                outcome: ExtractionOutcome::failed(
                    FailureKind::Configuration,
                    ExtractionError::MissingCredential.to_string(),
                ),
                model: None,
                failed_attempts: Vec::new(),
            };
        }

        let started = Instant::now();
        let mut failed_attempts = Vec::new();
        let mut answer = None;

        for name in &self.candidates {
            let remaining = self.deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(model = %name, "Extraction deadline reached; skipping remaining candidates");
                failed_attempts.push(FailedAttempt {
                    model: name.clone(),
                    error: format!(
                        "extraction deadline of {}s exceeded before {} was tried",
                        self.deadline.as_secs_f64(),
                        name
                    ),
                });
                break;
            }

            let attempt = match self.provider.model(name) {
                Ok(model) => {
                    match tokio::time::timeout(
                        remaining,
                        model.generate(image, mime_type, EXTRACTION_PROMPT),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ExtractionError::DeadlineExceeded {
                            model: name.clone(),
                            deadline_secs: self.deadline.as_secs_f64(),
                        }),
                    }
                }
                Err(e) => Err(e),
            };

            match attempt {
                Ok(text) => {
                    metrics::record_model_attempt(name, true);
                    answer = Some((name.clone(), text));
                    break;
                }
                Err(e) => {
                    metrics::record_model_attempt(name, false);
                    warn!(model = %name, error = %e, "Model failed");
                    failed_attempts.push(FailedAttempt {
                        model: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let Some((model, text)) = answer else {
            let last_error = failed_attempts
                .last()
                .map(|a| a.error.as_str())
                .unwrap_or("no candidate models configured");
            return ExtractionReport {
                outcome: ExtractionOutcome::failed(
                    FailureKind::ModelsUnavailable,
                    format!("All models failed. Last error: {}", last_error),
                ),
                model: None,
                failed_attempts,
            };
        };

        debug!(model = %model, response_len = text.len(), "Model responded");

        let outcome = match parse_model_output(&text) {
            Ok(object) => {
                info!(
                    model = %model,
                    failed_attempts = failed_attempts.len(),
                    "Extraction complete"
                );
                ExtractionOutcome::Extracted(object)
            }
            Err(e) => {
                warn!(model = %model, error = %e, "Model output could not be parsed");
                ExtractionOutcome::failed(FailureKind::MalformedOutput, e.to_string())
            }
        };

        ExtractionReport {
            outcome,
            model: Some(model),
            failed_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ScriptedProvider;
    use serde_json::json;

    const CLAIM_RESPONSE: &str = r#"{"document_type":"Motor Insurance Claim Form","fields":{"Policy Number":{"value":null,"confidence":"low"},"Claim Number":{"value":"CL123","confidence":"high"}}}"#;

    fn config(candidates: &[&str], api_key: Option<&str>) -> ExtractionConfig {
        ExtractionConfig {
            api_key: api_key.map(str::to_string),
            candidate_models: candidates.iter().map(|c| c.to_string()).collect(),
            ..ExtractionConfig::default()
        }
    }

    fn extractor(candidates: &[&str], provider: Arc<ScriptedProvider>) -> Extractor {
        Extractor::new(&config(candidates, Some("key")), provider)
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_model_calls() {
        let provider = Arc::new(ScriptedProvider::new().with_text("m1", CLAIM_RESPONSE));
        let extractor = Extractor::new(&config(&["m1"], None), provider.clone());

        assert!(!extractor.is_configured());
        let report = extractor.extract(b"image", "image/jpeg").await;

        assert_eq!(report.outcome.failure_kind(), Some(FailureKind::Configuration));
        assert_eq!(
            report.outcome.into_value(),
            json!({
                "error": "API Key not found. Please set GOOGLE_API_KEY in .env file.",
                "raw_response": null
            })
        );
        assert!(provider.constructed().is_empty());
        assert!(provider.generated().is_empty());
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text("m1", CLAIM_RESPONSE)
                .with_text("m2", r#"{"fields":{}}"#),
        );
        let report = extractor(&["m1", "m2"], provider.clone())
            .extract(b"image", "image/jpeg")
            .await;

        assert_eq!(report.model.as_deref(), Some("m1"));
        assert!(report.failed_attempts.is_empty());
        assert_eq!(provider.generated(), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_falls_back_after_n_failures() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .failing("m1", "404 not found")
                .unbuildable("m2", "unsupported")
                .failing("m3", "quota exceeded")
                .with_text("m4", CLAIM_RESPONSE)
                .with_text("m5", r#"{"fields":{"Other":{"value":"x"}}}"#),
        );
        let report = extractor(&["m1", "m2", "m3", "m4", "m5"], provider.clone())
            .extract(b"image", "image/jpeg")
            .await;

        assert_eq!(report.model.as_deref(), Some("m4"));
        assert_eq!(report.failed_attempts.len(), 3);
        assert_eq!(
            report.failed_attempts.iter().map(|a| a.model.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m2", "m3"]
        );
        // no candidate is retried, and nothing after the winner is touched
        assert_eq!(provider.constructed(), vec!["m1", "m2", "m3", "m4"]);
        assert_eq!(provider.generated(), vec!["m1", "m3", "m4"]);

        let value = report.outcome.into_value();
        assert_eq!(value["fields"]["Claim Number"]["value"], json!("CL123"));
        assert!(value["fields"].get("Other").is_none());
    }

    #[tokio::test]
    async fn test_all_models_failed_reports_last_error() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .failing("m1", "first")
                .failing("m2", "second"),
        );
        let report = extractor(&["m1", "m2"], provider)
            .extract(b"image", "image/jpeg")
            .await;

        assert_eq!(report.outcome.failure_kind(), Some(FailureKind::ModelsUnavailable));
        assert_eq!(report.failed_attempts.len(), 2);
        assert!(report.model.is_none());

        let value = report.outcome.into_value();
        assert_eq!(
            value,
            json!({"error": "All models failed. Last error: m2 returned 503: second"})
        );
    }

    #[tokio::test]
    async fn test_deadline_bounds_slow_candidates() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .failing("m1", "first")
                .failing("m2", "second")
                .failing("m3", "third")
                .with_delay(Duration::from_millis(700)),
        );
        let config = ExtractionConfig {
            deadline_secs: 1,
            ..config(&["m1", "m2", "m3"], Some("key"))
        };
        let extractor = Extractor::new(&config, provider.clone());

        let start = Instant::now();
        let report = extractor.extract(b"image", "image/jpeg").await;

        assert!(start.elapsed() < Duration::from_millis(1900));
        assert_eq!(report.outcome.failure_kind(), Some(FailureKind::ModelsUnavailable));
        assert_eq!(report.failed_attempts.len(), 3);
        assert_eq!(report.failed_attempts[0].error, "m1 returned 503: first");
        assert!(report.failed_attempts[1].error.contains("deadline"));
        assert_eq!(&provider.generated()[..2], ["m1", "m2"]);

        let error = report.outcome.into_value()["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("All models failed. Last error: "));
        assert!(error.contains("deadline"));
    }

    #[tokio::test]
    async fn test_empty_candidate_list_fails_soft() {
        let provider = Arc::new(ScriptedProvider::new());
        let report = extractor(&[], provider).extract(b"image", "image/jpeg").await;

        assert_eq!(
            report.outcome.into_value(),
            json!({"error": "All models failed. Last error: no candidate models configured"})
        );
    }

    #[tokio::test]
    async fn test_malformed_output_is_not_retried() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_text("m1", "Sorry, I cannot read this document.")
                .with_text("m2", CLAIM_RESPONSE),
        );
        let report = extractor(&["m1", "m2"], provider.clone())
            .extract(b"image", "image/jpeg")
            .await;

        assert_eq!(report.outcome.failure_kind(), Some(FailureKind::MalformedOutput));
        assert_eq!(report.model.as_deref(), Some("m1"));
        assert_eq!(provider.generated(), vec!["m1"]);

        let value = report.outcome.into_value();
        assert!(value["error"].as_str().unwrap().contains("expected"));
        assert!(value.get("raw_response").is_none());
    }

    #[tokio::test]
    async fn test_fenced_response_is_reconciled() {
        let fenced = format!("```json\n{}\n```", CLAIM_RESPONSE);
        let provider = Arc::new(ScriptedProvider::new().with_text("m1", fenced));
        let report = extractor(&["m1"], provider).extract(b"image", "image/jpeg").await;

        let value = report.outcome.into_value();
        assert_eq!(value["missing_fields"], json!(["Policy Number"]));
        assert_eq!(value["document_type"], json!("Motor Insurance Claim Form"));
    }

    #[tokio::test]
    async fn test_outcome_always_has_error_or_fields() {
        let responses = [
            CLAIM_RESPONSE,
            "```json\n{\"fields\":{}}\n```",
            "[]",
            "{\"document_type\":\"Unknown\"}",
            "",
        ];

        for response in responses {
            let provider = Arc::new(ScriptedProvider::new().with_text("m1", response));
            let value = extractor(&["m1"], provider)
                .extract(b"image", "image/jpeg")
                .await
                .outcome
                .into_value();

            let has_error = value.get("error").is_some();
            let has_fields = value.get("fields").is_some();
            assert!(has_error ^ has_fields, "bad outcome for {response:?}: {value}");
        }
    }

    #[tokio::test]
    async fn test_serialized_outcome_matches_value() {
        let provider = Arc::new(ScriptedProvider::new().with_text("m1", CLAIM_RESPONSE));
        let outcome = extractor(&["m1"], provider)
            .extract(b"image", "image/jpeg")
            .await
            .outcome;

        let serialized: Value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(serialized, outcome.into_value());

        let failure = ExtractionOutcome::failed(FailureKind::Configuration, "no key");
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"error": "no key", "raw_response": null})
        );
    }

    #[tokio::test]
    async fn test_list_models_requires_credential() {
        let provider = Arc::new(ScriptedProvider::new().with_text("m1", "{}"));
        let extractor = Extractor::new(&config(&["m1"], None), provider);
        assert!(matches!(
            extractor.list_models().await,
            Err(ExtractionError::MissingCredential)
        ));
    }
}
