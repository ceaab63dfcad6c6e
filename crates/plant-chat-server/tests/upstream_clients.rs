use plant_chat_server::config::{EmbeddingConfig, LlmConfig};
use plant_chat_server::models::chat::ChatMessage;
use plant_chat_server::services::conversation::{EmbeddingProvider, LlmProvider};
use plant_chat_server::services::{EmbeddingService, LlmService};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn embedding_config(base_url: &str, dimension: usize) -> EmbeddingConfig {
    EmbeddingConfig {
        model: "text-embedding-3-small".to_string(),
        base_url: base_url.to_string(),
        api_key: "emb-key".to_string(),
        dimension,
        timeout_seconds: 5,
    }
}

fn llm_config(base_url: &str) -> LlmConfig {
    LlmConfig {
        model: "gpt-4o-mini".to_string(),
        base_url: base_url.to_string(),
        api_key: "llm-key".to_string(),
        timeout_seconds: 5,
        max_tokens: 200,
        temperature: 0.2,
    }
}

#[tokio::test]
async fn embedding_openai_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer emb-key"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "Why are my tomato leaves yellow?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{ "object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3] }],
            "model": "text-embedding-3-small"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = EmbeddingService::new(embedding_config(&server.uri(), 3));
    let vector = service.embed("Why are my tomato leaves yellow?").await.unwrap();

    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn embedding_llama_cpp_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [1.0, 0.0] })))
        .mount(&server)
        .await;

    let service = EmbeddingService::new(embedding_config(&server.uri(), 2));
    assert_eq!(service.embed("basil").await.unwrap(), vec![1.0, 0.0]);
}

#[tokio::test]
async fn embedding_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let service = EmbeddingService::new(embedding_config(&server.uri(), 3));
    let err = service.embed("hello").await.unwrap_err();

    assert!(format!("{:#}", err).contains("429"));
}

#[tokio::test]
async fn embedding_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vectors": "nope" })))
        .mount(&server)
        .await;

    let service = EmbeddingService::new(embedding_config(&server.uri(), 3));
    assert!(service.embed("hello").await.is_err());
}

#[tokio::test]
async fn embedding_dimension_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2] }]
        })))
        .mount(&server)
        .await;

    let service = EmbeddingService::new(embedding_config(&server.uri(), 1536));
    let err = service.embed("hello").await.unwrap_err();

    assert!(err.to_string().contains("dimension mismatch"));
}

#[tokio::test]
async fn completion_returns_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer llm-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "stream": false,
            "max_tokens": 200,
            "messages": [
                { "role": "system", "content": "Be kind." },
                { "role": "user", "content": "Hi" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello, gardener!" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = LlmService::new(llm_config(&server.uri()));
    let completion = service
        .complete(&[ChatMessage::system("Be kind."), ChatMessage::user("Hi")])
        .await
        .unwrap();

    assert_eq!(completion.text, "Hello, gardener!");
    let usage = completion.usage.unwrap();
    assert_eq!(usage.total_tokens, 16);
}

#[tokio::test]
async fn completion_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let service = LlmService::new(llm_config(&server.uri()));
    let err = service.complete(&[ChatMessage::user("Hi")]).await.unwrap_err();

    let text = format!("{:#}", err);
    assert!(text.contains("503"));
    assert!(text.contains("overloaded"));
}

#[tokio::test]
async fn completion_without_choices_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let service = LlmService::new(llm_config(&server.uri()));
    assert!(service.complete(&[ChatMessage::user("Hi")]).await.is_err());
}

#[tokio::test]
async fn completion_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let service = LlmService::new(llm_config(&server.uri()));
    assert!(service.complete(&[ChatMessage::user("Hi")]).await.is_err());
}
