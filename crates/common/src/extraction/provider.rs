//! Generative model abstraction
//!
//! A `ModelProvider` builds handles to named models; a `GenerativeModel`
//! answers one image-plus-prompt request with text. Building a handle and
//! generating are separate steps so either can fail independently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Failures raised while talking to a model service or reading its output
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("API Key not found. Please set GOOGLE_API_KEY in .env file.")]
    MissingCredential,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Invalid model name '{name}': {reason}")]
    InvalidModel { name: String, reason: String },

    #[error("Request to {model} failed: {source}")]
    Request {
        model: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{model} returned {status}: {body}")]
    Api {
        model: String,
        status: u16,
        body: String,
    },

    #[error("{model} returned no text: {reason}")]
    EmptyResponse { model: String, reason: String },

    #[error("{model} did not answer within the {deadline_secs}s extraction deadline")]
    DeadlineExceeded { model: String, deadline_secs: f64 },

    #[error("{0}")]
    MalformedOutput(String),
}

/// A model visible to the configured credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

/// Handle to a single named model
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Send the image inline with the prompt and return the model's text
    async fn generate(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, ExtractionError>;

    /// Get the model name
    fn name(&self) -> &str;
}

/// Factory for model handles
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Build a handle to the named model
    fn model(&self, name: &str) -> Result<Arc<dyn GenerativeModel>, ExtractionError>;

    /// List the models this provider can reach
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ExtractionError>;
}
