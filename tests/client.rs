use rovo_stream::app::router;
use rovo_stream::client::{ChatClient, FALLBACK_REPLY};
use rovo_stream::config::{AppConfig, DEFAULT_SYSTEM_PROMPT};
use rovo_stream::state::AppState;
use rovo_stream::store::{ChatStore, MessageRole};
use rovo_stream::token::StaticToken;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Relay-shaped event stream: one `{"text"}` frame per delta, then `[DONE]`.
fn relay_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for d in deltas {
        body.push_str(&format!("data: {}\n\n", json!({ "text": d })));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

#[tokio::test]
async fn reply_with_widget_lands_in_the_store() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rovo-chat"))
        .and(body_partial_json(json!({"message": "What's on my plate?"})))
        .respond_with(sse(relay_body(&[
            "Here are your items.\n",
            "WIDGET_DATA:{\"type\":\"work-items\",\"data\":{\"items\":[{\"key\":\"PROJ-7\"}]}}",
        ])))
        .expect(1)
        .mount(&relay)
        .await;

    let client = ChatClient::new(relay.uri(), ChatStore::new());
    let id = client.send("What's on my plate?").await;

    let messages = client.store().snapshot();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "What's on my plate?");

    let reply = client.store().get(&id).unwrap();
    assert_eq!(reply.role, MessageRole::Assistant);
    assert_eq!(reply.content, "Here are your items.");
    assert!(!reply.widget_loading);
    let widget = reply.widget.unwrap();
    assert_eq!(widget.widget_type, "work-items");
    assert_eq!(widget.data()["items"][0]["key"], "PROJ-7");
}

#[tokio::test]
async fn earlier_messages_are_sent_as_history() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"message": "first", "conversationHistory": []})))
        .respond_with(sse(relay_body(&["one"])))
        .expect(1)
        .mount(&relay)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "message": "second",
            "conversationHistory": [
                {"type": "user", "content": "first"},
                {"type": "assistant", "content": "one"},
            ],
            "customSystemPrompt": "Be brief",
        })))
        .respond_with(sse(relay_body(&["two"])))
        .expect(1)
        .mount(&relay)
        .await;

    let client = ChatClient::new(relay.uri(), ChatStore::new()).with_system_prompt("Be brief");
    client.send("first").await;
    let id = client.send("second").await;
    assert_eq!(client.store().get(&id).unwrap().content, "two");
    assert_eq!(client.store().snapshot().len(), 4);
}

#[tokio::test]
async fn failed_request_shows_the_fallback_reply() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .mount(&relay)
        .await;

    let client = ChatClient::new(relay.uri(), ChatStore::new());
    let id = client.send("hello").await;
    let reply = client.store().get(&id).unwrap();
    assert_eq!(reply.content, FALLBACK_REPLY);
    assert!(reply.widget.is_none());
}

#[tokio::test]
async fn unreachable_relay_shows_the_fallback_reply() {
    // nothing listens on the discard port
    let client = ChatClient::new("http://127.0.0.1:9", ChatStore::new());
    let id = client.send("hello").await;
    assert_eq!(client.store().get(&id).unwrap().content, FALLBACK_REPLY);
}

#[tokio::test]
async fn stop_reports_whether_a_stream_was_running() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/stop"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&relay)
        .await;

    let client = ChatClient::new(relay.uri(), ChatStore::new());
    assert!(!client.stop().await.unwrap());
}

#[tokio::test]
async fn end_to_end_through_the_relay() {
    let gateway = MockServer::start().await;
    let system = format!("{DEFAULT_SYSTEM_PROMPT}\n\n**CUSTOM INSTRUCTIONS:**\nBe brief");
    let deltas = [
        "Here is ",
        "what you have.\nWIDGET_",
        "DATA:{\"type\":\"work-items\",",
        "\"data\":{\"items\":[]}}",
    ];
    let mut upstream = String::new();
    for d in deltas {
        let event = json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": d}});
        upstream.push_str(&format!("data: {event}\n\n"));
    }
    Mock::given(method("POST"))
        .and(path("/v1/invoke-with-response-stream"))
        .and(body_partial_json(json!({"system": system})))
        .respond_with(sse(upstream))
        .expect(1)
        .mount(&gateway)
        .await;

    let mut vars = HashMap::new();
    vars.insert("AI_GATEWAY_URL".to_string(), format!("{}/v1/invoke", gateway.uri()));
    let config = AppConfig::from_map(&vars).unwrap();
    let app = router(AppState::with_token_source(
        config,
        Arc::new(StaticToken::new("test-token")),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = ChatClient::new(format!("http://{addr}"), ChatStore::new())
        .with_system_prompt("Be brief");
    let mut updates = client.store().subscribe();
    let id = client.send("my work?").await;

    let reply = client.store().get(&id).unwrap();
    assert_eq!(reply.content, "Here is what you have.");
    assert_eq!(reply.widget.unwrap().widget_type, "work-items");
    assert!(!reply.widget_loading);

    // both appends plus at least one patch were broadcast
    let mut ops = 0;
    while updates.try_recv().is_ok() {
        ops += 1;
    }
    assert!(ops >= 3);
}
