//! HTTP-level tests for the provider adapters against a mock server

use futures::StreamExt;
use promptcall_llm::providers::{
    AnthropicConfig, AnthropicProvider, GeminiConfig, GeminiProvider, OpenAIConfig,
    OpenAIProvider,
};
use promptcall_llm::{
    CompletionRequest, LLMError, LLMProvider, Message, StopReason, collect_chunks,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn book_request(model: &str) -> CompletionRequest {
    CompletionRequest::builder(model)
        .add_message(Message::system("You are a librarian"))
        .add_message(Message::user("Recommend a fantasy book"))
        .max_tokens(64)
        .build()
}

fn sse(events: &[serde_json::Value], done: bool) -> ResponseTemplate {
    let mut body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn openai(server: &MockServer) -> OpenAIProvider {
    OpenAIProvider::with_config(OpenAIConfig::new("sk-test").with_api_base(server.uri())).unwrap()
}

#[tokio::test]
async fn openai_complete_sends_chat_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 64,
            "messages": [
                {"role": "system", "content": "You are a librarian"},
                {"role": "user", "content": "Recommend a fantasy book"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Mistborn by Brandon Sanderson"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 7, "total_tokens": 27}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = openai(&server)
        .complete(book_request("gpt-4o-mini"))
        .await
        .unwrap();

    assert_eq!(response.content(), "Mistborn by Brandon Sanderson");
    assert_eq!(response.stop_reason, StopReason::EndTurn);
    assert_eq!(response.usage.total(), 27);
    assert_eq!(response.raw["id"], "chatcmpl-1");
}

#[tokio::test]
async fn openai_status_codes_map_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = openai(&server)
        .complete(book_request("gpt-4o-mini"))
        .await
        .unwrap_err();
    assert!(matches!(&err, LLMError::RateLimitExceeded(body) if body == "slow down"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn openai_unauthorized_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = openai(&server)
        .complete(book_request("gpt-4o-mini"))
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::AuthenticationFailed));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn openai_malformed_body_is_unexpected_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = openai(&server)
        .complete(book_request("gpt-4o-mini"))
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::UnexpectedResponse(_)));
}

#[tokio::test]
async fn openai_stream_yields_chunks_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse(
            &[
                json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]}),
                json!({"choices": [{"index": 0, "delta": {"content": "Mist"}}]}),
                json!({"choices": [{"index": 0, "delta": {"content": "born"}, "finish_reason": "stop"}]}),
                json!({"choices": [], "usage": {"prompt_tokens": 20, "completion_tokens": 2, "total_tokens": 22}}),
            ],
            true,
        ))
        .mount(&server)
        .await;

    let stream = openai(&server)
        .stream(book_request("gpt-4o-mini"))
        .await
        .unwrap();
    let collected = collect_chunks(stream).await.unwrap();

    assert_eq!(collected.content, "Mistborn");
    assert_eq!(collected.finish_reason, Some(StopReason::EndTurn));
    assert_eq!(collected.usage.unwrap().total(), 22);
}

#[tokio::test]
async fn anthropic_complete_hoists_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "system": "You are a librarian",
            "messages": [{"role": "user", "content": "Recommend a fantasy book"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-haiku-latest",
            "content": [{"type": "text", "text": "The Hobbit"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 14, "output_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        AnthropicProvider::with_config(AnthropicConfig::new("ak-test").with_api_base(server.uri()))
            .unwrap();
    let response = provider
        .complete(book_request("claude-3-5-haiku-latest"))
        .await
        .unwrap();

    assert_eq!(response.content(), "The Hobbit");
    assert_eq!(response.usage.input_tokens, 14);
}

#[tokio::test]
async fn anthropic_stream_sums_usage_across_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(sse(
            &[
                json!({"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 14, "output_tokens": 1}}}),
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "The "}}),
                json!({"type": "ping"}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hobbit"}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 4}}),
                json!({"type": "message_stop"}),
            ],
            false,
        ))
        .mount(&server)
        .await;

    let provider =
        AnthropicProvider::with_config(AnthropicConfig::new("ak-test").with_api_base(server.uri()))
            .unwrap();
    let chunks: Vec<_> = provider
        .stream(book_request("claude-3-5-haiku-latest"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.len(), 4);
    let text: String = chunks
        .iter()
        .map(|c| c.as_ref().unwrap().content.as_str())
        .collect();
    assert_eq!(text, "The Hobbit");

    let total = chunks
        .iter()
        .filter_map(|c| c.as_ref().unwrap().usage)
        .fold(0, |sum, u| sum + u.total());
    assert_eq!(total, 18);
}

#[tokio::test]
async fn gemini_complete_uses_model_path_and_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", "g-test"))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "You are a librarian"}]},
            "generationConfig": {"maxOutputTokens": 64}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Elantris"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 11, "candidatesTokenCount": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        GeminiProvider::with_config(GeminiConfig::new("g-test").with_api_base(server.uri()))
            .unwrap();
    let response = provider
        .complete(book_request("gemini-2.0-flash"))
        .await
        .unwrap();

    assert_eq!(response.content(), "Elantris");
    assert_eq!(response.usage.total(), 14);
}

#[tokio::test]
async fn gemini_missing_model_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let provider =
        GeminiProvider::with_config(GeminiConfig::new("g-test").with_api_base(server.uri()))
            .unwrap();
    let err = provider
        .complete(book_request("gemini-9"))
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::ModelNotFound(model) if model == "gemini-9"));
}
