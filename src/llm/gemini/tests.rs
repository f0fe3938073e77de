use super::*;
use crate::chat::session::ChatMessage;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_for(server: &MockServer) -> GeminiChat {
    let mut config = Config::default();
    config.gemini.base_url = format!("{}/", server.uri());
    config.gemini.api_key = Some("test-key".to_string());
    let chain = ChainConfig {
        provider: crate::llm::Provider::Gemini,
        model: "gemini-2.5-flash".to_string(),
        temperature: 0.2,
    };

    GeminiChat::new(&config, &chain)
        .expect("key is configured")
        .with_http_client(
            HttpClient::new("Gemini")
                .with_timeout(Duration::from_secs(5))
                .with_retry_attempts(2)
                .with_backoff(Duration::from_millis(10)),
        )
}

fn prompt() -> Prompt {
    Prompt {
        system: "Answer from the context.".to_string(),
        messages: vec![
            ChatMessage::user("Earlier question"),
            ChatMessage::assistant("Earlier answer"),
            ChatMessage::user("What is the capital?"),
        ],
    }
}

#[test]
fn endpoint_building() {
    assert_eq!(
        model_endpoint("https://example.com/", "m", "generateContent"),
        "https://example.com/v1beta/models/m:generateContent"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_content_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "Answer from the context."}]},
            "contents": [
                {"role": "user", "parts": [{"text": "Earlier question"}]},
                {"role": "model", "parts": [{"text": "Earlier answer"}]},
                {"role": "user", "parts": [{"text": "What is the capital?"}]}
            ],
            "generationConfig": {"temperature": 0.2}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Paris"}, {"text": " is the capital."}]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = chat_for(&server)
        .complete(&prompt())
        .await
        .expect("completion should succeed");
    assert_eq!(answer, "Paris is the capital.");
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_prompt_is_a_model_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&server)
        .await;

    let err = chat_for(&server)
        .complete(&prompt())
        .await
        .expect_err("blocked prompt has no answer");
    assert!(matches!(err, RagError::Model(ref m) if m.contains("SAFETY")), "got {:?}", err);
}

#[tokio::test(flavor = "multi_thread")]
async fn quota_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    assert!(matches!(
        chat_for(&server).complete(&prompt()).await,
        Err(RagError::RateLimit { .. })
    ));
}
