//! End-to-end tests: signed LINE webhook → responder → LINE reply API.
//!
//! LINE and OpenAI are both served by a local wiremock server.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use faq_channels::{build_channels_router, build_responder, AssistantBridge};
use faq_common::config::Config;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

const SECRET: &str = "integration-secret";

struct Harness {
    app: axum::Router,
    line: Arc<faq_channels::LineChannel>,
    _faq: NamedTempFile,
    _processor: tokio::task::JoinHandle<()>,
}

fn write_faq() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!([
            { "question": "營業時間", "answer": "9am-6pm" },
            { "question": "地址", "answer": "台北市信義區" }
        ])
    )
    .unwrap();
    file
}

fn start(server: &MockServer) -> Harness {
    let faq = write_faq();

    let mut config = Config::default();
    config.line.channel_access_token = Some("line-token".into());
    config.line.channel_secret = Some(SECRET.into());
    config.line.api_base = server.uri();
    config.llm.api_key = Some("sk-test".into());
    config.llm.base_url = server.uri();
    config.llm.system_prompt = "You are the clinic assistant.".into();
    config.faq.path = faq.path().to_path_buf();

    let responder = build_responder(&config).unwrap();
    let (app, rx, line) = build_channels_router(&config);
    let bridge = Arc::new(AssistantBridge::new(responder, line.clone()));
    let processor = AssistantBridge::spawn_processor(bridge, rx);

    Harness {
        app,
        line,
        _faq: faq,
        _processor: processor,
    }
}

fn text_webhook(user_id: &str, reply_token: &str, text: &str) -> String {
    json!({
        "destination": "Ubot",
        "events": [{
            "type": "message",
            "mode": "active",
            "timestamp": 1_700_000_000_000_i64,
            "replyToken": reply_token,
            "source": { "type": "user", "userId": user_id },
            "message": { "id": "325708", "type": "text", "text": text }
        }]
    })
    .to_string()
}

async fn post_callback(harness: &Harness, body: &str, signature: &str) -> StatusCode {
    let request = Request::builder()
        .method("POST")
        .uri("/callback")
        .header("content-type", "application/json")
        .header("X-Line-Signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap();

    harness.app.clone().oneshot(request).await.unwrap().status()
}

async fn signed_callback(harness: &Harness, body: &str) -> StatusCode {
    let signature = harness.line.sign(body.as_bytes()).unwrap();
    post_callback(harness, body, &signature).await
}

/// Wait until `count` requests hit `route` on the mock server, returning their bodies.
async fn wait_for_requests(server: &MockServer, route: &str, count: usize) -> Vec<Value> {
    for _ in 0..200 {
        let bodies: Vec<Value> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect();
        if bodies.len() >= count {
            return bodies;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} request(s) to {route}");
}

fn reply_api() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/reply"))
        .and(header("authorization", "Bearer line-token"))
}

fn reply_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "sentMessages": [] }))
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "gpt-3.5-turbo",
        "choices": [{ "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25 }
    }))
}

#[tokio::test]
async fn faq_question_is_answered_without_completion() {
    let server = MockServer::start().await;
    reply_api()
        .and(body_partial_json(json!({ "replyToken": "rt-1" })))
        .respond_with(reply_ok())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(completion("should not be used"))
        .expect(0)
        .mount(&server)
        .await;

    let harness = start(&server);
    let status = signed_callback(&harness, &text_webhook("U1", "rt-1", "請問營業時間是?")).await;
    assert_eq!(status, StatusCode::OK);

    let replies = wait_for_requests(&server, "/v2/bot/message/reply", 1).await;
    assert_eq!(
        replies[0],
        json!({
            "replyToken": "rt-1",
            "messages": [{ "type": "text", "text": "9am-6pm" }]
        })
    );
}

#[tokio::test]
async fn unmatched_question_goes_to_completion_with_history() {
    let server = MockServer::start().await;
    reply_api().respond_with(reply_ok()).mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(completion(" 請留下您的電話，我們會儘快聯絡您。 "))
        .expect(2)
        .mount(&server)
        .await;

    let harness = start(&server);

    let status = signed_callback(&harness, &text_webhook("U9", "rt-a", "可以預約洗牙嗎?")).await;
    assert_eq!(status, StatusCode::OK);
    wait_for_requests(&server, "/v2/bot/message/reply", 1).await;

    let status = signed_callback(&harness, &text_webhook("U9", "rt-b", "明天下午呢?")).await;
    assert_eq!(status, StatusCode::OK);
    let replies = wait_for_requests(&server, "/v2/bot/message/reply", 2).await;

    let calls = wait_for_requests(&server, "/v1/chat/completions", 2).await;
    assert_eq!(
        calls[1]["messages"],
        json!([
            { "role": "system", "content": "You are the clinic assistant." },
            { "role": "user", "content": "可以預約洗牙嗎?" },
            { "role": "assistant", "content": "請留下您的電話，我們會儘快聯絡您。" },
            { "role": "user", "content": "明天下午呢?" }
        ])
    );
    assert_eq!(calls[1]["model"], "gpt-3.5-turbo");

    assert!(replies
        .iter()
        .any(|r| r["replyToken"] == "rt-b"
            && r["messages"][0]["text"] == "請留下您的電話，我們會儘快聯絡您。"));
}

#[tokio::test]
async fn invalid_signature_reaches_nothing_downstream() {
    let server = MockServer::start().await;
    reply_api().respond_with(reply_ok()).expect(0).mount(&server).await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(completion("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let harness = start(&server);
    let body = text_webhook("U1", "rt-1", "請問營業時間是?");

    let status = post_callback(&harness, &body, "Zm9yZ2VkLXNpZ25hdHVyZQ==").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Give a misrouted message time to surface before the mocks are verified
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn completion_failure_sends_no_reply() {
    let server = MockServer::start().await;
    reply_api().respond_with(reply_ok()).expect(0).mount(&server).await;
    Mock::given(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = start(&server);
    let status = signed_callback(&harness, &text_webhook("U1", "rt-1", "hello")).await;
    assert_eq!(status, StatusCode::OK);

    wait_for_requests(&server, "/v1/chat/completions", 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn missing_faq_file_fails_startup() {
    let mut config = Config::default();
    config.faq.path = tempfile::tempdir().unwrap().path().join("faq_data.json");

    let err = build_responder(&config).err().unwrap();
    assert!(format!("{err:#}").contains("Failed to read FAQ data"));
}
