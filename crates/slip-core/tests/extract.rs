//! End-to-end extraction tests against a local mock of the inference API.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use slip_core::{Category, ExpenseItem, ReceiptError, ReceiptExtractor, ScannedExpense, SlipConfig};

const API_KEY: &str = "test-key";

const CAFE_RECEIPT: &str = r#"{"merchant":"Cafe X","amount":12.5,"date":"2024-03-01","category":"food","description":"lunch","items":[{"name":"coffee","quantity":1,"price":3.5}]}"#;

/// JPEG magic followed by a few payload bytes.
const IMAGE_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01];

#[derive(Debug, Clone)]
struct CapturedRequest {
    path: String,
    query: String,
    content_type: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct MockApi {
    status: StatusCode,
    body: String,
    delay: Duration,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockApi {
    fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn ok_with_text(text: &str) -> Self {
        Self::new(StatusCode::OK, envelope(text))
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Serve on an ephemeral port and return a config pointing at it.
    async fn start(&self) -> SlipConfig {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(handle).with_state(self.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = SlipConfig::default();
        config.api.base_url = format!("http://{addr}/v1beta");
        config
    }
}

async fn handle(State(mock): State<MockApi>, uri: Uri, headers: HeaderMap, body: String) -> impl IntoResponse {
    mock.requests.lock().unwrap().push(CapturedRequest {
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
    });

    if !mock.delay.is_zero() {
        tokio::time::sleep(mock.delay).await;
    }

    (mock.status, mock.body.clone())
}

fn envelope(text: &str) -> String {
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" },
            "finishReason": "STOP"
        }],
        "modelVersion": "gemini-2.0-flash"
    })
    .to_string()
}

fn receipt_image() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(IMAGE_BYTES).unwrap();
    file.flush().unwrap();
    file
}

fn today_candidates() -> [String; 2] {
    let before = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
    let after = (chrono::Local::now().date_naive() + chrono::Days::new(1))
        .format("%Y-%m-%d")
        .to_string();
    [before, after]
}

#[tokio::test]
async fn test_extracts_well_formed_expense() {
    let mock = MockApi::ok_with_text(CAFE_RECEIPT);
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let expense = extractor.extract(image.path()).await.unwrap();

    assert!(!expense.id.is_empty());
    assert_eq!(
        expense,
        ScannedExpense {
            id: expense.id.clone(),
            merchant: "Cafe X".to_string(),
            amount: Decimal::new(125, 1),
            date: "2024-03-01".to_string(),
            category: Category::Food,
            description: "lunch".to_string(),
            items: vec![ExpenseItem {
                name: "coffee".to_string(),
                quantity: 1,
                price: Decimal::new(35, 1),
            }],
        }
    );
}

#[tokio::test]
async fn test_sends_single_two_part_request() {
    let mock = MockApi::ok_with_text(CAFE_RECEIPT);
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    extractor.extract(image.path()).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    assert_eq!(request.path, "/v1beta/models/gemini-2.0-flash:generateContent");
    assert_eq!(request.query, "key=test-key");
    assert_eq!(request.content_type.as_deref(), Some("application/json"));

    let contents = request.body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 1);

    let parts = contents[0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
    assert_eq!(parts[0]["inlineData"]["data"], STANDARD.encode(IMAGE_BYTES));
    assert!(parts[0].get("text").is_none());
    assert_eq!(parts[1]["text"], json!(config.prompt.instruction));
    assert!(parts[1].get("inlineData").is_none());
}

#[tokio::test]
async fn test_png_file_still_declared_as_jpeg() {
    let mock = MockApi::ok_with_text(CAFE_RECEIPT);
    let config = mock.start().await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("receipt.png");
    std::fs::write(&path, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    extractor.extract(&path).await.unwrap();

    assert_eq!(mock.requests()[0].body["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
}

#[tokio::test]
async fn test_configured_mime_type_is_sent() {
    let mock = MockApi::ok_with_text(CAFE_RECEIPT);
    let mut config = mock.start().await;
    config.api.mime_type = "image/png".to_string();
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    extractor.extract(image.path()).await.unwrap();

    assert_eq!(mock.requests()[0].body["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/png");
}

#[tokio::test]
async fn test_empty_date_and_category_are_defaulted() {
    let mock = MockApi::ok_with_text(
        r#"{"merchant":"Corner Shop","amount":4,"date":"","category":"","description":"","items":[]}"#,
    );
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let expense = extractor.extract(image.path()).await.unwrap();

    assert!(today_candidates().contains(&expense.date), "unexpected date {}", expense.date);
    assert_eq!(expense.category, Category::Other);
    assert_eq!(expense.merchant, "Corner Shop");
}

#[tokio::test]
async fn test_missing_file_is_io_error_without_request() {
    let mock = MockApi::ok_with_text(CAFE_RECEIPT);
    let config = mock.start().await;
    let dir = tempfile::tempdir().unwrap();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(dir.path().join("missing.jpg")).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Io { .. }), "got {err:?}");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_server_error_is_api_error_with_body() {
    let mock = MockApi::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"error":{"code":500,"message":"internal failure","status":"INTERNAL"}}"#,
    );
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(image.path()).await.unwrap_err();

    match &err {
        ReceiptError::Api { status, body } => {
            assert_eq!(status, "500 Internal Server Error");
            assert!(body.contains("internal failure"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
    assert!(err.to_string().contains("internal failure"));
}

#[tokio::test]
async fn test_non_200_success_status_is_api_error() {
    let mock = MockApi::new(StatusCode::ACCEPTED, envelope(CAFE_RECEIPT));
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(image.path()).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Api { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_zero_candidates_is_empty_response() {
    let mock = MockApi::new(StatusCode::OK, r#"{"candidates":[]}"#);
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(image.path()).await.unwrap_err();

    assert!(matches!(err, ReceiptError::EmptyResponse), "got {err:?}");
}

#[tokio::test]
async fn test_candidate_without_parts_is_empty_response() {
    let mock = MockApi::new(StatusCode::OK, r#"{"candidates":[{"content":{"parts":[]}}]}"#);
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(image.path()).await.unwrap_err();

    assert!(matches!(err, ReceiptError::EmptyResponse), "got {err:?}");
}

#[tokio::test]
async fn test_invalid_envelope_is_decode_error() {
    let mock = MockApi::new(StatusCode::OK, "<html>gateway</html>");
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(image.path()).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn test_fenced_candidate_text_is_parse_error() {
    let fenced = format!("```json\n{CAFE_RECEIPT}\n```");
    let mock = MockApi::ok_with_text(&fenced);
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(image.path()).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn test_repeated_calls_differ_only_in_id() {
    let mock = MockApi::ok_with_text(CAFE_RECEIPT);
    let config = mock.start().await;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let first = extractor.extract(image.path()).await.unwrap();
    let second = extractor.extract(image.path()).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(ScannedExpense { id: first.id.clone(), ..second }, first);
    assert_eq!(mock.requests().len(), 2);
}

#[tokio::test]
async fn test_slow_api_times_out_as_network_error() {
    let mock = MockApi::ok_with_text(CAFE_RECEIPT).with_delay(Duration::from_secs(5));
    let mut config = mock.start().await;
    config.api.timeout_secs = 1;
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(image.path()).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Network(_)), "got {err:?}");
    assert!(err.is_timeout());
    assert!(!err.to_string().contains(API_KEY));
}

#[tokio::test]
async fn test_refused_connection_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = SlipConfig::default();
    config.api.base_url = format!("http://{addr}/v1beta");
    let image = receipt_image();

    let extractor = ReceiptExtractor::new(&config, API_KEY).unwrap();
    let err = extractor.extract(image.path()).await.unwrap_err();

    assert!(matches!(err, ReceiptError::Network(_)), "got {err:?}");
    assert!(!err.is_timeout());
    assert!(!err.to_string().contains(API_KEY), "key leaked: {err}");
    assert!(!format!("{err:?}").contains(API_KEY), "key leaked: {err:?}");
}

#[tokio::test]
async fn test_from_config_sends_key_from_environment() {
    const KEY_VAR: &str = "SLIP_EXTRACT_TEST_API_KEY";

    let mock = MockApi::ok_with_text(CAFE_RECEIPT);
    let mut config = mock.start().await;
    config.api.api_key_env = KEY_VAR.to_string();
    let image = receipt_image();

    // Only this test reads the variable.
    unsafe { std::env::set_var(KEY_VAR, "env-key") };

    let extractor = ReceiptExtractor::from_config(&config).unwrap();
    let expense = extractor.extract(image.path()).await.unwrap();

    assert_eq!(expense.merchant, "Cafe X");
    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query, "key=env-key");
}
