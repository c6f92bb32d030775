//! Primary generator with a heuristic safety net

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::{
    error::AppResult,
    generation::{Generated, GenerationRequest, Generator, HeuristicGenerator},
};

/// Runs `primary`, answering with the keyword heuristic when it fails
pub struct FallbackGenerator {
    primary: Arc<dyn Generator>,
    fallback: HeuristicGenerator,
}

impl FallbackGenerator {
    pub fn new(primary: Arc<dyn Generator>) -> Self {
        Self {
            primary,
            fallback: HeuristicGenerator,
        }
    }
}

#[async_trait]
impl Generator for FallbackGenerator {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    /// The result names whichever backend actually answered
    async fn generate(&self, request: &GenerationRequest) -> AppResult<Generated> {
        match self.primary.generate(request).await {
            Ok(generated) => Ok(generated),
            Err(e) => {
                warn!(
                    generator = self.primary.name(),
                    error = %e,
                    "Generation failed, using heuristic fallback"
                );
                self.fallback.generate(request).await
            }
        }
    }
}
