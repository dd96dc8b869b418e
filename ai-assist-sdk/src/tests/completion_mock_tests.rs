//! Mock tests for the completion provider adapter
//!
//! These tests use WireMock to simulate OpenAI-compatible endpoints and
//! verify the request shape and the mapping of provider failures.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{AiSettings, MemoryConfigProvider, ProviderKind, SettingsLoader};
    use crate::error::ProviderError;
    use crate::prompts::Prompt;
    use crate::services::{CompletionClient, CompletionProvider};
    use crate::storage::{KeyValueStoreExt, MemoryStore, AI_SETTINGS_KEY};

    fn settings_for(server: &MockServer, api_key: &str) -> AiSettings {
        let mut settings = AiSettings::default();
        settings.openai.api_key = api_key.to_string();
        settings.openai.base_url = server.uri();
        settings.timeout_seconds = 5;
        settings
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-mock123",
            "object": "chat.completion",
            "created": 1677858242,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
        })
    }

    #[tokio::test]
    async fn test_generate_completion_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 2000,
                "messages": [
                    {"role": "system", "content": "You are terse."},
                    {"role": "user", "content": "Label this."}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("{\"ok\": true}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(settings_for(&server, "sk-test")).unwrap();
        let raw = client
            .generate_completion(&Prompt::new("You are terse.", "Label this."))
            .await
            .unwrap();

        assert_eq!(raw, "{\"ok\": true}");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let client = CompletionClient::new(settings_for(&server, "sk-wrong")).unwrap();
        let err = client
            .generate_completion(&Prompt::new("sys", "user"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProviderError::Authentication("Incorrect API key provided".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_error_keeps_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(settings_for(&server, "sk-test")).unwrap();
        let err = client
            .generate_completion(&Prompt::new("sys", "user"))
            .await
            .unwrap_err();

        // No retry inside the adapter
        match err {
            ProviderError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_never_calls_provider() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("x")))
            .expect(0)
            .mount(&server)
            .await;

        let client = CompletionClient::new(settings_for(&server, "   ")).unwrap();
        let err = client
            .generate_completion(&Prompt::new("sys", "user"))
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::MissingCredential(ProviderKind::OpenAi));
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = CompletionClient::new(settings_for(&server, "sk-test")).unwrap();
        let err = client
            .generate_completion(&Prompt::new("sys", "user"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_openrouter_uses_its_own_settings() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer or-key"))
            .and(body_partial_json(json!({"model": "meta-llama/llama-3-70b"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "[]"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = AiSettings::default();
        settings.provider = ProviderKind::OpenRouter;
        settings.openai.api_key = "sk-unused".into();
        settings.openrouter.api_key = "or-key".into();
        settings.openrouter.model = "meta-llama/llama-3-70b".into();
        settings.openrouter.base_url = format!("{}/api/v1/", server.uri());

        let client = CompletionClient::new(settings).unwrap();
        let raw = client
            .generate_completion(&Prompt::new("sys", "user"))
            .await
            .unwrap();
        assert_eq!(raw, "[]");
    }

    #[tokio::test]
    async fn test_reload_applies_saved_settings() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-saved"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("done")))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = MemoryConfigProvider::new();
        config.set("openai_base_url", server.uri());

        let store = Arc::new(MemoryStore::new());
        let loader = SettingsLoader::new(Arc::new(config)).with_overrides(store.clone());
        let client = CompletionClient::from_loader(loader).unwrap();

        let err = client
            .generate_completion(&Prompt::new("sys", "user"))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingCredential(ProviderKind::OpenAi));

        store
            .set_json(AI_SETTINGS_KEY, &json!({"openaiApiKey": "sk-saved"}))
            .unwrap();
        client.reload().await.unwrap();

        let raw = client
            .generate_completion(&Prompt::new("sys", "user"))
            .await
            .unwrap();
        assert_eq!(raw, "done");
        assert_eq!(client.settings().await.openai.api_key, "sk-saved");
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_network_error() {
        let mut settings = AiSettings::default();
        settings.openai.api_key = "sk-test".into();
        // Nothing listens on the discard port
        settings.openai.base_url = "http://127.0.0.1:9".into();
        settings.timeout_seconds = 2;

        let client = CompletionClient::new(settings).unwrap();
        let err = client
            .generate_completion(&Prompt::new("sys", "user"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Network(_)));
    }
}
