//! Configuration management
//!
//! Settings are resolved from a `ConfigProvider` chain (environment
//! variables, in-memory maps) and then overlaid with overrides the user saved
//! from the settings dialog, which live in the key-value store under
//! `storage::AI_SETTINGS_KEY`. The resolved `AiSettings` value is passed
//! explicitly to the completion client; `SettingsLoader` re-runs the
//! resolution whenever the client is asked to reload.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::storage::{KeyValueStore, KeyValueStoreExt, AI_SETTINGS_KEY};
use crate::util::parse_duration;

/// Prefix applied to every environment variable read by the default provider
pub const DEFAULT_ENV_PREFIX: &str = "LABELING";

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> ConfigResult<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a value parsed through `FromStr`
    fn get_parsed<T>(&self, key: &str) -> ConfigResult<T>
    where
        T: FromStr,
        <T as FromStr>::Err: fmt::Display,
    {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::invalid(key, e))
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> ConfigResult<bool> {
        let value = self.get_string(key)?;
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ConfigError::invalid(key, format!("not a boolean: {}", value))),
        }
    }

    /// Get a duration such as `30s`, `500ms` or `2m`
    fn get_duration(&self, key: &str) -> ConfigResult<Duration> {
        let value = self.get_string(key)?;
        parse_duration(&value)
            .ok_or_else(|| ConfigError::invalid(key, format!("not a duration: {}", value)))
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get a parsed value with a default, failing only on malformed values
    fn get_parsed_or<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        <T as FromStr>::Err: fmt::Display,
    {
        match self.get_parsed(key) {
            Ok(value) => Ok(value),
            Err(ConfigError::Missing(_)) => Ok(default),
            Err(e) => Err(e),
        }
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,

    /// Optional namespace for variables (e.g., "AI")
    namespace: Option<String>,
}

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Format a configuration key as an environment variable
    pub(crate) fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        if let Some(ref namespace) = self.namespace {
            env_key.push_str(namespace);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> ConfigResult<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => ConfigError::Missing(env_key),
            env::VarError::NotUnicode(_) => ConfigError::invalid(env_key, "not valid unicode"),
        })
    }
}

/// Environment provider using the application prefix
pub fn default_env_provider() -> EnvConfigProvider {
    EnvConfigProvider::new().with_prefix(DEFAULT_ENV_PREFIX)
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> ConfigResult<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }
}

/// A composite config provider that tries multiple providers in order
#[derive(Default)]
pub struct CompositeConfigProvider {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the end of the chain
    pub fn add_provider(&mut self, provider: impl ConfigProvider + 'static) {
        self.providers.push(Box::new(provider));
    }

    /// Builder form of `add_provider`
    pub fn with(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.add_provider(provider);
        self
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> ConfigResult<String> {
        for provider in &self.providers {
            if let Ok(value) = provider.get_string(key) {
                return Ok(value);
            }
        }

        Err(ConfigError::Missing(key.to_string()))
    }
}

/// Completion providers sharing the chat-completions wire shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    OpenRouter,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::OpenRouter => "openai/gpt-4o-mini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Credential, model and endpoint for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key; empty means not configured
    pub api_key: String,

    /// Model identifier sent in the request body
    pub model: String,

    /// Base URL, `/chat/completions` is appended
    pub base_url: String,
}

impl ProviderSettings {
    pub fn defaults_for(kind: ProviderKind) -> Self {
        Self {
            api_key: String::new(),
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Resolved settings for the completion provider adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSettings {
    /// Provider used for every completion
    pub provider: ProviderKind,

    pub openai: ProviderSettings,

    pub openrouter: ProviderSettings,

    /// Sampling temperature (0.0-2.0)
    pub temperature: f32,

    /// Maximum number of tokens to generate
    pub max_tokens: u32,

    /// Timeout in seconds for a single completion call
    pub timeout_seconds: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            openai: ProviderSettings::defaults_for(ProviderKind::OpenAi),
            openrouter: ProviderSettings::defaults_for(ProviderKind::OpenRouter),
            temperature: 0.3,
            max_tokens: 2000,
            timeout_seconds: 60,
        }
    }
}

impl AiSettings {
    /// Load settings from a config provider, falling back to defaults per key
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let defaults = Self::default();

        let kind = provider.get_parsed_or("ai_provider", defaults.provider)?;
        let openai = Self::provider_from(provider, ProviderKind::OpenAi);
        let openrouter = Self::provider_from(provider, ProviderKind::OpenRouter);

        let timeout_seconds = match provider.get_duration("ai_timeout") {
            Ok(timeout) => timeout.as_secs(),
            Err(ConfigError::Missing(_)) => defaults.timeout_seconds,
            Err(e) => return Err(e),
        };

        let settings = Self {
            provider: kind,
            openai,
            openrouter,
            temperature: provider.get_parsed_or("ai_temperature", defaults.temperature)?,
            max_tokens: provider.get_parsed_or("ai_max_tokens", defaults.max_tokens)?,
            timeout_seconds,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn provider_from<P: ConfigProvider + ?Sized>(provider: &P, kind: ProviderKind) -> ProviderSettings {
        let name = kind.as_str();
        ProviderSettings {
            api_key: provider.get_string_or(&format!("{}_api_key", name), ""),
            model: provider.get_string_or(&format!("{}_model", name), kind.default_model()),
            base_url: provider.get_string_or(&format!("{}_base_url", name), kind.default_base_url()),
        }
    }

    /// Settings of the currently selected provider
    pub fn active(&self) -> &ProviderSettings {
        match self.provider {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::OpenRouter => &self.openrouter,
        }
    }

    fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::OpenRouter => &mut self.openrouter,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Validate value ranges; a missing API key is reported at call time instead
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid("ai_temperature", "must be between 0.0 and 2.0"));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::invalid("ai_max_tokens", "must be greater than zero"));
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::invalid("ai_timeout", "must be greater than zero"));
        }

        for kind in [ProviderKind::OpenAi, ProviderKind::OpenRouter] {
            let settings = match kind {
                ProviderKind::OpenAi => &self.openai,
                ProviderKind::OpenRouter => &self.openrouter,
            };
            if settings.base_url.trim().is_empty() {
                return Err(ConfigError::invalid(format!("{}_base_url", kind), "must not be empty"));
            }
            Url::parse(settings.base_url.trim())
                .map_err(|e| ConfigError::invalid(format!("{}_base_url", kind), e))?;
        }

        Ok(())
    }
}

/// Overrides saved from the settings dialog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsOverrides {
    pub provider: Option<ProviderKind>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: Option<String>,
    pub openrouter_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl SettingsOverrides {
    /// Overlay non-blank values onto `settings`
    pub fn apply(&self, settings: &mut AiSettings) {
        fn overlay(target: &mut String, value: &Option<String>) {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *target = v.to_string();
            }
        }

        if let Some(provider) = self.provider {
            settings.provider = provider;
        }

        let openai = settings.provider_mut(ProviderKind::OpenAi);
        overlay(&mut openai.api_key, &self.openai_api_key);
        overlay(&mut openai.model, &self.openai_model);
        overlay(&mut openai.base_url, &self.openai_base_url);

        let openrouter = settings.provider_mut(ProviderKind::OpenRouter);
        overlay(&mut openrouter.api_key, &self.openrouter_api_key);
        overlay(&mut openrouter.model, &self.openrouter_model);
        overlay(&mut openrouter.base_url, &self.openrouter_base_url);

        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }

        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = max_tokens;
        }
    }
}

/// Re-resolves `AiSettings` from configuration plus persisted overrides
#[derive(Clone)]
pub struct SettingsLoader {
    config: Arc<dyn ConfigProvider>,
    overrides: Option<Arc<dyn KeyValueStore>>,
}

impl SettingsLoader {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            config,
            overrides: None,
        }
    }

    /// Loader reading `LABELING_*` environment variables
    pub fn from_env() -> Self {
        Self::new(Arc::new(default_env_provider()))
    }

    /// Also apply overrides persisted under `AI_SETTINGS_KEY`
    pub fn with_overrides(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.overrides = Some(store);
        self
    }

    pub fn load(&self) -> ConfigResult<AiSettings> {
        let mut settings = AiSettings::from_provider(self.config.as_ref())?;

        if let Some(ref store) = self.overrides {
            match store.get_json::<SettingsOverrides>(AI_SETTINGS_KEY) {
                Ok(Some(overrides)) => overrides.apply(&mut settings),
                Ok(None) => {}
                Err(crate::error::StorageError::Serialization(e)) => {
                    warn!("Ignoring malformed persisted AI settings: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        settings.validate()?;
        Ok(settings)
    }
}

impl fmt::Debug for SettingsLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsLoader")
            .field("overrides", &self.overrides.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_env_key_formatting() {
        let provider = EnvConfigProvider::new()
            .with_prefix("TEST")
            .with_namespace("CONFIG");

        assert_eq!(provider.format_key("api_key"), "TEST_CONFIG_API_KEY");
        assert_eq!(provider.format_key("base-url"), "TEST_CONFIG_BASE_URL");
    }

    #[test]
    fn test_settings_defaults_when_unset() {
        let settings = AiSettings::from_provider(&MemoryConfigProvider::new()).unwrap();
        assert_eq!(settings, AiSettings::default());
        assert!(!settings.active().has_credential());
    }

    #[test]
    fn test_settings_from_provider() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("ai_provider", "openrouter");
        provider.set("openrouter_api_key", "or-key");
        provider.set("openrouter_model", "anthropic/claude-3.5-sonnet");
        provider.set("ai_timeout", "45s");
        provider.set("ai_max_tokens", "1500");

        let settings = AiSettings::from_provider(&provider).unwrap();
        assert_eq!(settings.provider, ProviderKind::OpenRouter);
        assert_eq!(settings.active().api_key, "or-key");
        assert_eq!(settings.active().model, "anthropic/claude-3.5-sonnet");
        assert_eq!(settings.active().base_url, "https://openrouter.ai/api/v1");
        assert_eq!(settings.timeout_seconds, 45);
        assert_eq!(settings.max_tokens, 1500);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("ai_provider", "watson");
        assert!(AiSettings::from_provider(&provider).is_err());

        let mut provider = MemoryConfigProvider::new();
        provider.set("ai_temperature", "3.5");
        assert!(matches!(
            AiSettings::from_provider(&provider),
            Err(ConfigError::Invalid { .. })
        ));

        let mut provider = MemoryConfigProvider::new();
        provider.set("openrouter_base_url", "openrouter.ai/api/v1");
        assert!(matches!(
            AiSettings::from_provider(&provider),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_loader_applies_persisted_overrides() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("openai_api_key", "env-key");

        let store = Arc::new(MemoryStore::new());
        store
            .set_json(
                AI_SETTINGS_KEY,
                &json!({"provider": "openrouter", "openrouterApiKey": "saved-key", "openaiApiKey": "  "}),
            )
            .unwrap();

        let loader = SettingsLoader::new(Arc::new(provider)).with_overrides(store);
        let settings = loader.load().unwrap();

        assert_eq!(settings.provider, ProviderKind::OpenRouter);
        assert_eq!(settings.openrouter.api_key, "saved-key");
        // Blank overrides never clear a configured value
        assert_eq!(settings.openai.api_key, "env-key");
    }

    #[test]
    fn test_loader_ignores_malformed_overrides() {
        let store = Arc::new(MemoryStore::new());
        store.set(AI_SETTINGS_KEY, "{not json").unwrap();

        let loader = SettingsLoader::new(Arc::new(MemoryConfigProvider::new())).with_overrides(store);
        assert_eq!(loader.load().unwrap(), AiSettings::default());
    }

    #[test]
    fn test_composite_prefers_first_provider() {
        let mut first = MemoryConfigProvider::new();
        first.set("common", "first");
        let mut second = MemoryConfigProvider::new();
        second.set("common", "second");
        second.set("only_second", "second");

        let composite = CompositeConfigProvider::new().with(first).with(second);
        assert_eq!(composite.get_string("common").unwrap(), "first");
        assert_eq!(composite.get_string("only_second").unwrap(), "second");
        assert!(composite.get_string("missing").is_err());
    }
}
