//! # AI Assist SDK
//!
//! The suggestion pipeline behind the labeling workbench's AI features, plus
//! the resilient client that carries its generic API traffic.
//!
//! This crate provides:
//!
//! - Prompt templates per task type, with `{{name}}` placeholders, simplified
//!   fallback prompts and structural validation rules
//! - A completion provider adapter for OpenAI-compatible chat endpoints
//! - A response recovery parser that salvages JSON from free-form completions
//! - A retry orchestrator returning a uniform `ProcessingResult`
//! - A request layer with timeouts, backoff and a durable offline queue
//!
//! ## Architecture
//!
//! - `TaskType` / `PromptTemplate`: what to ask and how to check the answer
//! - `CompletionProvider`: the seam to the text-completion service
//! - `ResponseParser`: ordered recovery strategies, never fails loudly
//! - `Orchestrator`: attempts, backoff, fallback, typed deserialization
//! - `ApiClient`: generic HTTP traffic with offline durability
//! - `KeyValueStore`: durable state (offline queue, custom prompts, settings)

pub mod api;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prompts;
pub mod recovery;
pub mod services;
pub mod storage;

mod util;

pub use api::{ApiClient, ApiClientBuilder, ApiResponse, ConnectivityMonitor, HttpMethod, RequestOptions};
pub use config::{AiSettings, ConfigProvider, ProviderKind, SettingsLoader};
pub use error::{ApiError, ApiErrorType, ErrorContext, ProviderError};
pub use orchestrator::{Orchestrator, ProcessingResult, RetryConfig};
pub use prompts::{CustomPromptStore, Prompt, PromptData, PromptTemplate, TaskType, ValidationRule};
pub use recovery::{ParseError, RecoveryStrategy, ResponseParser};
pub use services::{CompletionClient, CompletionProvider};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

#[cfg(test)]
mod tests;
