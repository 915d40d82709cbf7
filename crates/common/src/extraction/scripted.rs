//! Scripted provider for testing
//!
//! Answers each model name with a canned response and records every call,
//! so fallback order and attempt counts can be asserted without a network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::provider::{ExtractionError, GenerativeModel, ModelInfo, ModelProvider};

/// Canned behaviour for one model name
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Generation succeeds with this text
    Text(String),
    /// Handle builds, generation fails with this message
    GenerationError(String),
    /// Handle construction fails with this message
    ConstructionError(String),
}

/// Mock provider driven by a script of per-model responses
#[derive(Default)]
pub struct ScriptedProvider {
    script: HashMap<String, ScriptedResponse>,
    delay: Option<Duration>,
    log: Arc<Mutex<CallLog>>,
}

#[derive(Default)]
struct CallLog {
    constructed: Vec<String>,
    generated: Vec<String>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful response
    pub fn with_text(self, model: &str, text: impl Into<String>) -> Self {
        self.with(model, ScriptedResponse::Text(text.into()))
    }

    /// Script a generation failure
    pub fn failing(self, model: &str, message: impl Into<String>) -> Self {
        self.with(model, ScriptedResponse::GenerationError(message.into()))
    }

    /// Script a construction failure
    pub fn unbuildable(self, model: &str, message: impl Into<String>) -> Self {
        self.with(model, ScriptedResponse::ConstructionError(message.into()))
    }

    pub fn with(mut self, model: &str, response: ScriptedResponse) -> Self {
        self.script.insert(model.to_string(), response);
        self
    }

    /// Sleep this long in every generation call before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn scripted_model(&self, name: &str, outcome: Result<String, String>) -> Arc<dyn GenerativeModel> {
        Arc::new(ScriptedModel {
            name: name.to_string(),
            outcome,
            delay: self.delay,
            log: Arc::clone(&self.log),
        })
    }

    /// Model names whose handles were requested, in order
    pub fn constructed(&self) -> Vec<String> {
        self.log.lock().map(|log| log.constructed.clone()).unwrap_or_default()
    }

    /// Model names that received a generation call, in order
    pub fn generated(&self) -> Vec<String> {
        self.log.lock().map(|log| log.generated.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn model(&self, name: &str) -> Result<Arc<dyn GenerativeModel>, ExtractionError> {
        if let Ok(mut log) = self.log.lock() {
            log.constructed.push(name.to_string());
        }

        match self.script.get(name) {
            Some(ScriptedResponse::ConstructionError(message)) => {
                Err(ExtractionError::InvalidModel {
                    name: name.to_string(),
                    reason: message.clone(),
                })
            }
            Some(ScriptedResponse::Text(text)) => Ok(self.scripted_model(name, Ok(text.clone()))),
            Some(ScriptedResponse::GenerationError(message)) => {
                Ok(self.scripted_model(name, Err(message.clone())))
            }
            None => Err(ExtractionError::InvalidModel {
                name: name.to_string(),
                reason: "not scripted".to_string(),
            }),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ExtractionError> {
        let mut names: Vec<&String> = self.script.keys().collect();
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| ModelInfo {
                name: format!("models/{}", name),
                display_name: None,
                supported_generation_methods: vec!["generateContent".to_string()],
            })
            .collect())
    }
}

struct ScriptedModel {
    name: String,
    outcome: Result<String, String>,
    delay: Option<Duration>,
    log: Arc<Mutex<CallLog>>,
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(
        &self,
        _image: &[u8],
        _mime_type: &str,
        _prompt: &str,
    ) -> Result<String, ExtractionError> {
        if let Ok(mut log) = self.log.lock() {
            log.generated.push(self.name.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.outcome.clone().map_err(|message| ExtractionError::Api {
            model: self.name.clone(),
            status: 503,
            body: message,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_provider_records_calls() {
        let provider = ScriptedProvider::new()
            .failing("a", "overloaded")
            .with_text("b", "{}");

        let a = provider.model("a").unwrap();
        assert!(a.generate(b"", "image/jpeg", "").await.is_err());

        let b = provider.model("b").unwrap();
        assert_eq!(b.generate(b"", "image/jpeg", "").await.unwrap(), "{}");

        assert!(provider.model("c").is_err());

        assert_eq!(provider.constructed(), vec!["a", "b", "c"]);
        assert_eq!(provider.generated(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_scripted_list_models() {
        let provider = ScriptedProvider::new().with_text("b", "{}").failing("a", "x");
        let models = provider.list_models().await.unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["models/a", "models/b"]);
    }
}
