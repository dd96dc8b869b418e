//! Retry orchestrator
//!
//! Drives one structured-suggestion request end to end: build the prompt from
//! a template, call the completion provider, recover JSON from the raw text,
//! deserialize it into the caller's type. Failed attempts are retried with
//! backoff, a stricter admonition is appended from the second attempt on, and
//! a template's simplified fallback prompt gets one final call.
//!
//! Provider failures and parse failures are soft. Every call returns a
//! `ProcessingResult`, never an `Err` and never a panic.

mod result;

pub use result::{ProcessingResult, RetryConfig};

use std::sync::Arc;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::prompts::{CustomPromptStore, Prompt, PromptData, PromptTemplate, TaskType};
use crate::recovery::{RecoveryStrategy, ResponseParser};
use crate::services::CompletionProvider;

/// Error reported when a cancellation token fires mid-request
pub const CANCELLED: &str = "cancelled";

/// One provider call followed by recovery and deserialization
enum Outcome<T> {
    Parsed(T, RecoveryStrategy, String),
    Failed(String),
    Cancelled,
}

/// Bookkeeping across the attempts of one request
#[derive(Default)]
struct Progress {
    calls: u32,
    last_raw: Option<String>,
    last_error: Option<String>,
}

impl Progress {
    fn fail<T>(self, error: String) -> ProcessingResult<T> {
        ProcessingResult::failed(error, self.calls, self.last_raw)
    }
}

pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    custom_prompts: Option<CustomPromptStore>,
    parser: ResponseParser,
    default_retry: RetryConfig,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            custom_prompts: None,
            parser: ResponseParser::new(),
            default_retry: RetryConfig::default(),
        }
    }

    /// Consult `store` for system-message overrides on every call
    pub fn with_custom_prompts(mut self, store: CustomPromptStore) -> Self {
        self.custom_prompts = Some(store);
        self
    }

    /// Policy used when a call passes no `RetryConfig`
    pub fn with_default_retry(mut self, retry: RetryConfig) -> Self {
        self.default_retry = retry.normalized();
        self
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = parser;
        self
    }

    /// Run a built-in task
    pub async fn process_task<T: DeserializeOwned>(
        &self,
        task: TaskType,
        data: &PromptData,
        retry: Option<RetryConfig>,
    ) -> ProcessingResult<T> {
        self.process_with_retry(task.template(), data, retry).await
    }

    /// Request a structured answer for `template`, retrying per `retry`
    pub async fn process_with_retry<T: DeserializeOwned>(
        &self,
        template: &PromptTemplate,
        data: &PromptData,
        retry: Option<RetryConfig>,
    ) -> ProcessingResult<T> {
        self.process_with_retry_cancellable(template, data, retry, &CancellationToken::new())
            .await
    }

    /// Like `process_with_retry`, aborting as soon as `cancel` fires
    #[tracing::instrument(skip_all, fields(task = %template.id))]
    pub async fn process_with_retry_cancellable<T: DeserializeOwned>(
        &self,
        template: &PromptTemplate,
        data: &PromptData,
        retry: Option<RetryConfig>,
        cancel: &CancellationToken,
    ) -> ProcessingResult<T> {
        let retry = retry.unwrap_or_else(|| self.default_retry.clone()).normalized();
        let system_override = self
            .custom_prompts
            .as_ref()
            .and_then(|store| store.system_message_for(&template.id));

        if system_override.is_some() {
            debug!("Using custom system message for '{}'", template.id);
        }

        let (prompt, unresolved) = template.build_prompt(data, system_override.as_deref());
        if !unresolved.is_empty() {
            warn!(
                "Unresolved placeholders in '{}' prompt: {}",
                template.id,
                unresolved.join(", ")
            );
        }

        let mut progress = Progress::default();

        for attempt in 1..=retry.max_attempts {
            let prompt = if attempt > 1 {
                with_admonition(&prompt, template)
            } else {
                prompt.clone()
            };

            match self.attempt::<T>(&prompt, template, cancel, &mut progress).await {
                Outcome::Parsed(value, strategy, raw) => {
                    if attempt > 1 {
                        info!("'{}' succeeded on attempt {}", template.id, attempt);
                    }
                    return ProcessingResult::succeeded(value, progress.calls, raw, strategy);
                }
                Outcome::Cancelled => return progress.fail(CANCELLED.to_string()),
                Outcome::Failed(error) => {
                    warn!(
                        "'{}' attempt {}/{} failed: {}",
                        template.id, attempt, retry.max_attempts, error
                    );
                    progress.last_error = Some(error);
                }
            }

            if attempt < retry.max_attempts {
                let delay = retry.delay_for(attempt);
                debug!("Retrying '{}' in {:?}", template.id, delay);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return progress.fail(CANCELLED.to_string()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        if let Some((fallback, _)) = template.build_fallback_prompt(data, system_override.as_deref()) {
            info!("Trying fallback prompt for '{}'", template.id);

            match self.attempt::<T>(&fallback, template, cancel, &mut progress).await {
                Outcome::Parsed(value, strategy, raw) => {
                    return ProcessingResult::succeeded(value, progress.calls, raw, strategy);
                }
                Outcome::Cancelled => return progress.fail(CANCELLED.to_string()),
                Outcome::Failed(error) => {
                    warn!("Fallback prompt for '{}' failed: {}", template.id, error);
                }
            }
        }

        let error = progress
            .last_error
            .take()
            .unwrap_or_else(|| "Unknown error".to_string());
        progress.fail(error)
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        prompt: &Prompt,
        template: &PromptTemplate,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Outcome<T> {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        progress.calls += 1;
        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Outcome::Cancelled,
            completion = self.provider.generate_completion(prompt) => completion,
        };

        let raw = match completion {
            Ok(raw) => raw,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        progress.last_raw = Some(raw.clone());

        let recovered = match self.parser.parse(&raw, template) {
            Ok(recovered) => recovered,
            Err(e) => return Outcome::Failed(e.to_string()),
        };

        match serde_json::from_value::<T>(recovered.value) {
            Ok(value) => Outcome::Parsed(value, recovered.strategy, raw),
            Err(e) => Outcome::Failed(format!("Response did not match the expected format: {}", e)),
        }
    }
}

/// Append the strict JSON-only reminder used on retries
fn with_admonition(prompt: &Prompt, template: &PromptTemplate) -> Prompt {
    let mut user_prompt = prompt.user_prompt.clone();
    user_prompt.push_str(
        "\n\nIMPORTANT: Your previous answer could not be used. Respond ONLY with valid JSON",
    );
    if !template.expected_format.is_empty() {
        user_prompt.push_str(" in this format: ");
        user_prompt.push_str(&template.expected_format);
    }
    user_prompt.push_str(". No markdown, no code fences, no text before or after the JSON.");

    Prompt {
        system_message: prompt.system_message.clone(),
        user_prompt,
    }
}
