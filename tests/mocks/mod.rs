//! Mock infrastructure for testing external services
//!
//! - OpenAI-compatible chat completions API (formula generation)


pub use openai::*;
