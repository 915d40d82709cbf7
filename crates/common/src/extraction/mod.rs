//! Model-backed field extraction
//!
//! Turns document image bytes into the fixed claim-form JSON shape:
//! - `prompt`: the instruction sent with every image
//! - `provider`: the capability interface over a hosted model family
//! - `gemini`: the Generative Language REST implementation
//! - `normalize`: fence stripping, parsing, `missing_fields` reconciliation
//! - `extractor`: ordered candidate fallback and fail-soft reporting

mod extractor;
mod gemini;
mod normalize;
mod prompt;
mod provider;
mod scripted;

pub use extractor::{
    ExtractionFailure, ExtractionOutcome, ExtractionReport, Extractor, FailedAttempt, FailureKind,
};
pub use gemini::{GeminiModel, GeminiProvider};
pub use normalize::{parse_model_output, reconcile_missing_fields, strip_fences};
pub use prompt::{EXTRACTION_PROMPT, TARGET_FIELDS};
pub use provider::{ExtractionError, GenerativeModel, ModelInfo, ModelProvider};
pub use scripted::{ScriptedProvider, ScriptedResponse};
