//! Integration tests against in-process mock services.
//!
//! Each test binds an axum router to `127.0.0.1:0` and points the Gemini
//! client or the page fetcher at it, so request bodies, streaming and
//! failure statuses are exercised over real HTTP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};

use llm_suite::config::{Config, EmbeddingConfig, FetchConfig, GenerationConfig};
use llm_suite::embedding::{DisabledEmbedder, GeminiEmbedder};
use llm_suite::generation::GeminiClient;
use llm_suite::pipeline::Pipeline;
use llm_suite::web::WebFetcher;
use llm_suite_core::embedding::Embedder;
use llm_suite_core::generation::{collect_stream, Generator};
use llm_suite_core::models::SourceKind;
use llm_suite_core::session::ToolSession;
use llm_suite_core::{ErrorKind, PipelineError, RejectionReason, TransportKind};

// ─── Mock Gemini ────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
    api_keys: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

fn text_event(text: &str) -> String {
    let payload = json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    });
    format!("data: {}\r\n\r\n", payload)
}

/// Answers `generateContent` with a fixed reply and
/// `streamGenerateContent` with five increments.
async fn gemini_handler(
    State(recorder): State<Recorder>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    recorder.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(key) = headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) {
        recorder.api_keys.lock().unwrap().push(key.to_string());
    }
    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    recorder.prompts.lock().unwrap().push(prompt);

    if call.ends_with(":streamGenerateContent") {
        let events: String = ["Hello", ", ", "wor", "ld", "!"]
            .iter()
            .map(|t| text_event(t))
            .collect();
        return ([(header::CONTENT_TYPE, "text/event-stream")], events).into_response();
    }

    Json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": "A short summary." }] },
            "finishReason": "STOP"
        }]
    }))
    .into_response()
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_gemini() -> (String, Recorder) {
    let recorder = Recorder::default();
    let router = Router::new()
        .route("/models/{call}", post(gemini_handler))
        .with_state(recorder.clone());
    (spawn(router).await, recorder)
}

fn generation_config(base_url: &str) -> GenerationConfig {
    GenerationConfig {
        base_url: Some(base_url.to_string()),
        api_key: Some("test-key".to_string()),
        timeout_secs: 5,
        ..GenerationConfig::default()
    }
}

fn pipeline_with_gemini(base_url: &str) -> Pipeline {
    let generator = GeminiClient::new(&generation_config(base_url)).unwrap();
    Pipeline::with_services(
        Config::default(),
        Arc::new(DisabledEmbedder),
        Arc::new(generator),
    )
    .unwrap()
}

// ─── Generation ─────────────────────────────────────────────────────

#[tokio::test]
async fn gemini_generate_sends_prompt_and_key() {
    let (base, recorder) = spawn_gemini().await;
    let client = GeminiClient::new(&generation_config(&base)).unwrap();

    let text = client.generate("Summarize this.").await.unwrap();

    assert_eq!(text, "A short summary.");
    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.last_prompt(), "Summarize this.");
    assert_eq!(recorder.api_keys.lock().unwrap().as_slice(), ["test-key"]);
}

#[tokio::test]
async fn gemini_stream_yields_increments_in_order() {
    let (base, _recorder) = spawn_gemini().await;
    let client = GeminiClient::new(&generation_config(&base)).unwrap();

    let stream = client.generate_stream("Say hello").await.unwrap();
    let text = collect_stream(stream).await.unwrap();

    assert_eq!(text, "Hello, world!");
}

#[tokio::test]
async fn slow_stream_outlasting_timeout_completes() {
    let router = Router::new().route(
        "/models/{call}",
        post(|| async {
            let events = futures::stream::iter(["Slow", " and", " steady", "."]).then(|text| async move {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Ok::<_, std::io::Error>(text_event(text))
            });
            ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(events))
        }),
    );
    let base = spawn(router).await;
    let config = GenerationConfig {
        timeout_secs: 1,
        ..generation_config(&base)
    };
    let client = GeminiClient::new(&config).unwrap();

    let stream = client.generate_stream("Take your time").await.unwrap();
    let text = collect_stream(stream).await.unwrap();

    assert_eq!(text, "Slow and steady.");
}

#[tokio::test]
async fn rate_limit_is_reported_as_rejection() {
    let router = Router::new().route(
        "/models/{call}",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#,
            )
        }),
    );
    let base = spawn(router).await;
    let client = GeminiClient::new(&generation_config(&base)).unwrap();

    let err = client.generate("hi").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteRejection);
    assert_eq!(err.rejection_reason(), Some(RejectionReason::RateLimited));
    assert!(matches!(
        err,
        PipelineError::RemoteRejection {
            status: Some(429),
            ..
        }
    ));
}

#[tokio::test]
async fn unauthorized_is_a_configuration_error() {
    let router = Router::new().route(
        "/models/{call}",
        post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
    );
    let base = spawn(router).await;
    let client = GeminiClient::new(&generation_config(&base)).unwrap();

    let err = client.generate("hi").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn missing_credential_sends_nothing() {
    let (base, recorder) = spawn_gemini().await;
    let mut config = Config::default();
    config.generation = GenerationConfig {
        base_url: Some(base),
        api_key: None,
        api_key_env: "LLMSUITE_IT_UNSET_GENERATION_KEY".to_string(),
        ..GenerationConfig::default()
    };

    let err = match Pipeline::from_config(config) {
        Err(err) => err,
        Ok(_) => panic!("pipeline built without a credential"),
    };

    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn chat_needs_no_embedding_credential() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/chat/completions",
            post(|State(recorder): State<Recorder>, Json(body): Json<Value>| async move {
                recorder.requests.fetch_add(1, Ordering::SeqCst);
                let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
                recorder.prompts.lock().unwrap().push(prompt.to_string());
                Json(json!({
                    "choices": [{
                        "message": { "role": "assistant", "content": "Hi there." },
                        "finish_reason": "stop"
                    }]
                }))
            }),
        )
        .with_state(recorder.clone());
    let base = spawn(router).await;

    let mut config = Config::default();
    config.generation = GenerationConfig {
        provider: "openai".to_string(),
        base_url: Some(base),
        api_key: Some("sk-test".to_string()),
        timeout_secs: 5,
        ..GenerationConfig::default()
    };
    config.embedding = EmbeddingConfig {
        provider: "gemini".to_string(),
        api_key: None,
        api_key_env: Some("LLMSUITE_IT_UNSET_EMBEDDING_KEY".to_string()),
        ..EmbeddingConfig::default()
    };
    let pipeline = Pipeline::from_config(config).unwrap();
    let mut session = ToolSession::new();

    let reply = pipeline.chat(&mut session, "hello").await.unwrap();
    assert_eq!(reply, "Hi there.");
    assert!(recorder.last_prompt().contains("hello"));

    let err = pipeline
        .load_document(&mut session, b"name,score\nada,3\n", SourceKind::Csv, "scores.csv")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("LLMSUITE_IT_UNSET_EMBEDDING_KEY"));
    assert_eq!(recorder.count(), 1);
    assert_eq!(session.conversation.len(), 2);
}

#[tokio::test]
async fn invalid_embedding_key_is_a_configuration_error() {
    let router = Router::new().route(
        "/models/{call}",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#,
            )
        }),
    );
    let base = spawn(router).await;
    let embedder = GeminiEmbedder::new(&EmbeddingConfig {
        url: Some(base),
        api_key: Some("wrong-key".to_string()),
        ..EmbeddingConfig::default()
    })
    .unwrap();

    let err = embedder.embed(&["some text".to_string()]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
}

// ─── Streaming chat ─────────────────────────────────────────────────

#[tokio::test]
async fn streamed_chat_is_recorded_after_completion() {
    let (base, _recorder) = spawn_gemini().await;
    let pipeline = pipeline_with_gemini(&base);
    let mut session = ToolSession::new();

    let mut reply = pipeline.chat_stream(&mut session, "hello?").await.unwrap();
    let mut increments = Vec::new();
    while let Some(item) = reply.next().await {
        increments.push(item.unwrap());
    }
    drop(reply);

    assert_eq!(increments, vec!["Hello", ", ", "wor", "ld", "!"]);
    assert_eq!(session.conversation.len(), 2);
    assert_eq!(session.conversation.last_reply(), Some("Hello, world!"));
    assert_eq!(session.last_output(), Some("Hello, world!"));
}

#[tokio::test]
async fn abandoned_stream_leaves_conversation_unchanged() {
    let (base, recorder) = spawn_gemini().await;
    let pipeline = pipeline_with_gemini(&base);
    let mut session = ToolSession::new();
    session.conversation.append_exchange("earlier", "reply");

    {
        let mut reply = pipeline.chat_stream(&mut session, "tell me").await.unwrap();
        assert_eq!(reply.next().await.unwrap().unwrap(), "Hello");
        assert_eq!(reply.next().await.unwrap().unwrap(), ", ");
        // Dropped after two of five increments.
    }

    assert_eq!(session.conversation.len(), 2);
    assert_eq!(session.conversation.last_reply(), Some("reply"));
    assert!(recorder.last_prompt().contains("earlier"));
}

// ─── Web pages ──────────────────────────────────────────────────────

const ARTICLE_HTML: &str = r#"<!doctype html>
<html>
<head><title>Tide Pools</title><script>var tracking = 1;</script></head>
<body>
  <nav>Menu Links Home About</nav>
  <article>
    <h1>Tide Pools</h1>
    <p>Tide pools form where the sea retreats and leaves water trapped among rocks.
    They shelter anemones, sea stars and small fish that tolerate changing salinity.</p>
    <p>Visitors should step only on bare rock and return any stone they lift to its
    original place so the creatures beneath it survive the next low tide.</p>
  </article>
  <footer>Copyright footer text</footer>
</body>
</html>"#;

async fn spawn_site_and_gemini() -> (String, Recorder) {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/article",
            get(|| async { ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], ARTICLE_HTML) }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "no such page") }),
        )
        .route("/models/{call}", post(gemini_handler))
        .with_state(recorder.clone());
    (spawn(router).await, recorder)
}

#[tokio::test]
async fn website_summary_uses_main_content() {
    let (base, recorder) = spawn_site_and_gemini().await;
    let pipeline = pipeline_with_gemini(&base);
    let mut session = ToolSession::new();

    let summary = pipeline
        .summarize_website(&mut session, &format!("{}/article", base))
        .await
        .unwrap();

    assert_eq!(summary.summary, "A short summary.");
    assert_eq!(summary.title.as_deref(), Some("Tide Pools"));
    assert!(!summary.truncated);

    let prompt = recorder.last_prompt();
    assert!(prompt.contains("\"Tide Pools\""));
    assert!(prompt.contains("anemones, sea stars"));
    assert!(!prompt.contains("Menu Links"));
    assert!(!prompt.contains("tracking"));
    assert!(!prompt.contains("Copyright footer"));
    assert_eq!(session.last_output(), Some("A short summary."));
}

#[tokio::test]
async fn website_fragments_do_not_repeat_text() {
    let recorder = Recorder::default();
    let page = format!(
        "<html><body><article><p>{}</p></article></body></html>",
        (1..=80).map(|i| format!("tok{:02}", i)).collect::<Vec<_>>().join(" ")
    );
    let router = Router::new()
        .route(
            "/tokens",
            get(move || async move { ([(header::CONTENT_TYPE, "text/html")], page) }),
        )
        .route("/models/{call}", post(gemini_handler))
        .with_state(recorder.clone());
    let base = spawn(router).await;

    let mut config = Config::default();
    config.chunking.max_chars = 100;
    config.chunking.overlap_chars = 40;
    let generator = GeminiClient::new(&generation_config(&base)).unwrap();
    let pipeline =
        Pipeline::with_services(config, Arc::new(DisabledEmbedder), Arc::new(generator)).unwrap();
    let mut session = ToolSession::new();

    pipeline
        .summarize_website(&mut session, &format!("{}/tokens", base))
        .await
        .unwrap();

    let prompt = recorder.last_prompt();
    for i in 1..=80 {
        let token = format!("tok{:02}", i);
        assert_eq!(prompt.matches(&token).count(), 1, "{}", token);
    }
}

#[tokio::test]
async fn missing_page_is_http_status_rejection() {
    let (base, recorder) = spawn_site_and_gemini().await;
    let pipeline = pipeline_with_gemini(&base);
    let mut session = ToolSession::new();

    let err = pipeline
        .summarize_website(&mut session, &format!("{}/missing", base))
        .await
        .unwrap_err();

    assert_eq!(err.rejection_reason(), Some(RejectionReason::HttpStatus));
    assert!(matches!(
        err,
        PipelineError::RemoteRejection {
            status: Some(404),
            ..
        }
    ));
    assert_eq!(recorder.count(), 0);
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let fetcher = WebFetcher::new(&FetchConfig::default()).unwrap();

    let err = fetcher
        .fetch(&format!("http://127.0.0.1:{}/", port))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.transport_kind(), Some(TransportKind::ConnectionRefused));
}

#[tokio::test]
async fn unknown_host_is_dns_error() {
    let fetcher = WebFetcher::new(&FetchConfig::default()).unwrap();

    let err = fetcher.fetch("http://no-such-host.invalid/").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.transport_kind(), Some(TransportKind::Dns));

    let err = fetcher.fetch("no-such-host.invalid/page").await.unwrap_err();
    assert_eq!(err.transport_kind(), Some(TransportKind::MalformedUrl));
}

#[tokio::test]
async fn malformed_url_fails_before_any_request() {
    let fetcher = WebFetcher::new(&FetchConfig::default()).unwrap();

    for url in ["example.com/page", "ftp://example.com/file", "http://"] {
        let err = fetcher.fetch(url).await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportKind::MalformedUrl), "{}", url);
    }
}
