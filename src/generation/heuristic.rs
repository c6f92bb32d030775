//! Keyword-based formula fallback

use async_trait::async_trait;

use crate::{
    error::AppResult,
    generation::{Generated, GenerationRequest, Generator},
};

/// Picks a canned formula from keywords in the query
///
/// Used when no model is configured or the model call fails. Never errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicGenerator;

impl HeuristicGenerator {
    pub fn formula_for(query: &str) -> &'static str {
        let query = query.to_lowercase();

        if query.contains("sum") && query.contains("region") {
            "=SUMIFS(C2:C100, A2:A100, \"North\")"
        } else if query.contains("average") || query.contains("avg") {
            "=AVERAGE(B2:B100)"
        } else if query.contains("count") {
            "=COUNTIF(A2:A100, \"Value\")"
        } else {
            "=SUM(A1:A10)"
        }
    }
}

#[async_trait]
impl Generator for HeuristicGenerator {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn generate(&self, request: &GenerationRequest) -> AppResult<Generated> {
        Ok(Generated::new(self.name(), Self::formula_for(&request.query)))
    }
}
