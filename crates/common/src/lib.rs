//! ClaimForge Common Library
//!
//! Shared code for the ClaimForge services including:
//! - Configuration management
//! - Error types and handling
//! - Document persistence (entity, pool, repository)
//! - Model-backed field extraction with candidate fallback
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod extraction;
pub mod metrics;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use extraction::{Extractor, ExtractionOutcome, ExtractionReport};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default generative model endpoint
pub const DEFAULT_MODEL_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default candidate models, most preferred first
pub const DEFAULT_CANDIDATE_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-2.5-flash",
    "gemini-flash-latest",
    "gemini-2.5-pro",
    "gemini-exp-1206",
];
