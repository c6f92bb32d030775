//! Formula generation
//!
//! The downstream operation gated by the quota. The rest of the crate only
//! sees the [`Generator`] trait; it runs after the request has been counted.

pub mod fallback;
pub mod heuristic;
pub mod openai;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppResult;

pub use fallback::FallbackGenerator;
pub use heuristic::HeuristicGenerator;
pub use openai::OpenAiGenerator;

/// Input to a generation call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Natural-language description of the formula wanted
    #[serde(default)]
    pub query: String,
    /// Optional workbook structure sent by the client
    #[serde(default)]
    pub sheet_details: Option<serde_json::Value>,
    /// Optional description of the active sheet
    #[serde(default)]
    pub current_sheet: Option<serde_json::Value>,
}

impl GenerationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// A formula and the backend that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub formula: String,
    pub generator: &'static str,
}

impl Generated {
    pub fn new(generator: &'static str, formula: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
            generator,
        }
    }
}

/// A text-generation backend
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    /// Produce a formula for `request`
    async fn generate(&self, request: &GenerationRequest) -> AppResult<Generated>;
}
