//! Completion provider adapter
//!
//! `CompletionClient` speaks the chat-completions protocol shared by OpenAI
//! and OpenRouter. It performs exactly one HTTP call per
//! `generate_completion`; retrying is the orchestrator's job.

mod models;
pub use models::*;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use tokio::sync::RwLock;

use crate::config::{AiSettings, SettingsLoader};
use crate::error::mapping::map_provider_status;
use crate::error::{ConfigResult, ProviderError, ProviderResult};
use crate::prompts::Prompt;
use crate::services::common::{build_http_client, join_url, UserAgent};
use crate::util::{sanitize_for_logging, truncate_string};

/// Anything that turns a prompt into raw completion text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send one prompt and return the raw text of the first choice
    async fn generate_completion(&self, prompt: &Prompt) -> ProviderResult<String>;
}

/// Settings and the HTTP client built from them, swapped together on reload
struct ClientState {
    settings: AiSettings,
    http_client: Client,
}

impl ClientState {
    fn build(settings: AiSettings) -> ProviderResult<Self> {
        let http_client = build_http_client(
            Some(UserAgent::component("completion-client")),
            Some(settings.timeout()),
        )
        .map_err(ProviderError::Configuration)?;

        Ok(Self {
            settings,
            http_client,
        })
    }
}

/// HTTP adapter for OpenAI-compatible chat-completions endpoints
pub struct CompletionClient {
    state: RwLock<ClientState>,
    loader: Option<SettingsLoader>,
}

impl CompletionClient {
    /// Create a client from already resolved settings
    pub fn new(settings: AiSettings) -> ProviderResult<Self> {
        Ok(Self {
            state: RwLock::new(ClientState::build(settings)?),
            loader: None,
        })
    }

    /// Create a client whose settings come from `loader` and can be reloaded
    pub fn from_loader(loader: SettingsLoader) -> ProviderResult<Self> {
        let settings = loader
            .load()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            state: RwLock::new(ClientState::build(settings)?),
            loader: Some(loader),
        })
    }

    /// Snapshot of the settings currently in use
    pub async fn settings(&self) -> AiSettings {
        self.state.read().await.settings.clone()
    }

    /// Replace the settings explicitly
    pub async fn update_settings(&self, settings: AiSettings) -> ProviderResult<()> {
        let state = ClientState::build(settings)?;
        *self.state.write().await = state;
        Ok(())
    }

    /// Re-resolve settings from the loader. Without a loader this is a no-op.
    pub async fn reload(&self) -> ConfigResult<()> {
        let Some(ref loader) = self.loader else {
            return Ok(());
        };

        let settings = loader.load()?;
        match ClientState::build(settings) {
            Ok(state) => {
                debug!("Reloaded AI settings, provider is now '{}'", state.settings.provider);
                *self.state.write().await = state;
            }
            Err(e) => warn!("Keeping previous AI settings: {}", e),
        }
        Ok(())
    }

    fn build_request(settings: &AiSettings, prompt: &Prompt) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: settings.active().model.clone(),
            messages: vec![
                ChatMessage::system(prompt.system_message.as_str()),
                ChatMessage::user(prompt.user_prompt.as_str()),
            ],
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionProvider for CompletionClient {
    async fn generate_completion(&self, prompt: &Prompt) -> ProviderResult<String> {
        let (settings, http_client) = {
            let state = self.state.read().await;
            (state.settings.clone(), state.http_client.clone())
        };

        let active = settings.active();
        if !active.has_credential() {
            return Err(ProviderError::MissingCredential(settings.provider));
        }

        let url = join_url(&active.base_url, "chat/completions");
        let request = Self::build_request(&settings, prompt);
        debug!("Sending completion request to {}: POST {}", settings.provider, url);

        let response = http_client
            .post(&url)
            .bearer_auth(active.api_key.trim())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            warn!(
                "{} returned {}: {}",
                settings.provider,
                status,
                sanitize_for_logging(&truncate_string(&body, 200))
            );
            return Err(map_provider_status(status, &body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        parsed
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidResponse("No completion content returned".to_string()))
    }
}
