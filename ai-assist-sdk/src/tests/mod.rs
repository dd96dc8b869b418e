//! Cross-module tests for the AI assist SDK
//!
//! Inline `#[cfg(test)]` modules cover single components; these exercise
//! components together against mocks and local HTTP servers.

pub mod completion_mock_tests;
pub mod recovery_tests;
