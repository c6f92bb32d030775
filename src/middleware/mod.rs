//! Middleware module
//!
//! Contains Tower middleware for API key resolution.

pub mod api_key;
