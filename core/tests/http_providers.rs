//! HTTP mock tests for the hosted and local provider adapters.

use llmfight_core::config::{LocalProviderConfig, RemoteProviderConfig};
use llmfight_core::providers::{
    AnthropicProvider, LocalModelProvider, ModelProvider, OpenAiProvider, ERROR_PREFIX,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote(server: &MockServer) -> RemoteProviderConfig {
    RemoteProviderConfig {
        api_key: Some("test-key".into()),
        base_url: Some(server.uri()),
        timeout_secs: 5,
        ..Default::default()
    }
}

// =============================================================================
// OpenAI
// =============================================================================

#[tokio::test]
async fn openai_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "messages": [{ "role": "user", "content": "Explain recursion" }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "A function calling itself." } }]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(remote(&server)).unwrap();
    let result = provider.generate("Explain recursion", "gpt-4").await;
    assert!(!result.is_error);
    assert_eq!(result.model, "gpt-4");
    assert_eq!(result.response_text, "A function calling itself.");
}

#[tokio::test]
async fn openai_rate_limit_is_embedded_in_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(remote(&server)).unwrap();
    let result = provider.generate("hi", "gpt-4").await;
    assert!(result.is_error);
    assert_eq!(result.model, "gpt-4");
    assert!(result.response_text.starts_with(ERROR_PREFIX));
    assert!(result.response_text.contains("429"));
    assert!(result.response_text.contains("Rate limit exceeded"));
}

#[tokio::test]
async fn openai_malformed_body_is_embedded_in_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(remote(&server)).unwrap();
    let result = provider.generate("hi", "gpt-4").await;
    assert!(result.is_error);
    assert!(result.response_text.contains("choices[0].message.content"));
}

#[tokio::test]
async fn openai_catalogue_filters_and_names_gpt_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("OpenAI-Organization", "org-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "gpt-4-1106-preview" },
                { "id": "gpt-4-0613" },
                { "id": "gpt-3.5-turbo" },
                { "id": "whisper-1" },
                { "id": "dall-e-3" }
            ]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(RemoteProviderConfig {
        org_id: Some("org-42".into()),
        ..remote(&server)
    })
    .unwrap();
    let catalog = provider.list_models().await;
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog["gpt-4-1106-preview"], "GPT-4 Turbo");
    assert_eq!(catalog["gpt-4-0613"], "GPT-4");
    assert_eq!(catalog["gpt-3.5-turbo"], "GPT-3.5 Turbo");
}

#[tokio::test]
async fn openai_catalogue_falls_back_when_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(remote(&server)).unwrap();
    let catalog = provider.list_models().await;
    assert_eq!(catalog["gpt-4-1106-preview"], "GPT-4 Turbo");
    assert_eq!(catalog["gpt-4"], "GPT-4");
    assert_eq!(catalog["gpt-3.5-turbo"], "GPT-3.5 Turbo");
}

// =============================================================================
// Anthropic
// =============================================================================

#[tokio::test]
async fn anthropic_sends_version_header_and_reads_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({ "model": "claude-2.1", "max_tokens": 1024 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "Recursion is self-reference." }]
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(remote(&server)).unwrap();
    let result = provider.generate("Explain recursion", "claude-2.1").await;
    assert!(!result.is_error);
    assert_eq!(result.model, "claude-2.1");
    assert_eq!(result.response_text, "Recursion is self-reference.");
}

#[tokio::test]
async fn anthropic_auth_failure_is_embedded_in_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(remote(&server)).unwrap();
    let result = provider.generate("hi", "").await;
    assert!(result.is_error);
    assert_eq!(result.model, "claude-3-opus-20240229");
    assert!(result.response_text.contains("401"));
}

#[tokio::test]
async fn anthropic_catalogue_is_static() {
    let provider = AnthropicProvider::new(RemoteProviderConfig::default()).unwrap();
    let catalog = provider.list_models().await;
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog["claude-3-opus-20240229"], "Claude 3 Opus");
}

// =============================================================================
// Local model
// =============================================================================

fn local(server: &MockServer) -> LocalProviderConfig {
    LocalProviderConfig {
        endpoint: server.uri(),
        model_name: "llama3.2".into(),
        timeout_secs: 5,
        ..Default::default()
    }
}

#[tokio::test]
async fn local_model_loads_once_then_serves() {
    let server = MockServer::start().await;
    // Warm-up request carries no prompt.
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "prompt": "Explain recursion" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "It calls itself.", "done": true
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "llama3.2",
            "options": { "num_ctx": 2048, "num_batch": 512 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "done": true })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = LocalModelProvider::ollama(local(&server)).unwrap();
    assert!(!provider.is_loaded());
    for _ in 0..2 {
        let result = provider.generate("Explain recursion", "").await;
        assert!(!result.is_error, "{}", result.response_text);
        assert_eq!(result.model, "llama3.2");
        assert_eq!(result.response_text, "It calls itself.");
    }
    assert!(provider.is_loaded());
}

#[tokio::test]
async fn local_model_load_failure_is_embedded_in_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let provider = LocalModelProvider::ollama(local(&server)).unwrap();
    let result = provider.generate("hi", "").await;
    assert!(result.is_error);
    assert!(result.response_text.contains("failed to initialise"));
    assert!(!provider.is_loaded());
}

#[tokio::test]
async fn local_catalogue_offers_only_the_configured_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "llama3.2" }, { "name": "mistral" }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "llama3.2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "ok" })))
        .mount(&server)
        .await;

    let provider = LocalModelProvider::ollama(local(&server)).unwrap();
    let catalog = provider.list_models().await;
    assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["llama3.2"]);

    let result = provider.generate("hi", "llama3.2").await;
    assert!(!result.is_error, "{}", result.response_text);
    assert_eq!(result.model, "llama3.2");
}
