// Gemini adapter against a local stand-in for the generateContent endpoint

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rescue_desk::{AiCollaborator, AiError, GeminiClient};

const TEST_KEY: &str = "test-key";

/// Behaviour is picked by the model name in the URL.
async fn generate_content(
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(model) = call.strip_suffix(":generateContent") else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some(TEST_KEY) {
        let error = json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT"
            }
        });
        return (StatusCode::BAD_REQUEST, Json(error)).into_response();
    }

    match model {
        "quota" => {
            let error = json!({
                "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
            });
            (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response()
        }
        "unauthorized" => StatusCode::UNAUTHORIZED.into_response(),
        "forbidden" => (StatusCode::FORBIDDEN, "denied").into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response(),
        _ => {
            let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or("");
            Json(json!({
                "candidates": [
                    { "content": { "parts": [ { "text": format!("{} trả lời: {}", model, prompt) } ], "role": "model" } }
                ]
            }))
            .into_response()
        }
    }
}

/// Serve the stand-in on its own runtime thread; returns the API base URL.
fn spawn_endpoint() -> String {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            let app = Router::new().route("/v1beta/models/:call", post(generate_content));
            axum::serve(listener, app).await.unwrap();
        });
    });
    format!("http://{}/v1beta", rx.recv().unwrap())
}

fn client(endpoint: &str, key: &str, model: &str) -> GeminiClient {
    GeminiClient::with_options(key, model, endpoint, Duration::from_secs(5)).unwrap()
}

#[test]
fn test_successful_call_sends_key_and_prompt() {
    let endpoint = spawn_endpoint();

    let reply = client(&endpoint, TEST_KEY, "gemini-test").generate("Địa chỉ: Diên Khánh").unwrap();
    assert_eq!(reply, "gemini-test trả lời: Địa chỉ: Diên Khánh");
}

#[test]
fn test_http_failures_map_to_structured_errors() {
    let endpoint = spawn_endpoint();

    assert_eq!(
        client(&endpoint, TEST_KEY, "quota").generate("x").unwrap_err(),
        AiError::QuotaExhausted
    );
    assert_eq!(
        client(&endpoint, TEST_KEY, "unauthorized").generate("x").unwrap_err(),
        AiError::InvalidCredential
    );
    assert_eq!(
        client(&endpoint, TEST_KEY, "forbidden").generate("x").unwrap_err(),
        AiError::InvalidCredential
    );
    // 400 whose body names the bad key
    assert_eq!(
        client(&endpoint, "wrong-key", "gemini-test").generate("x").unwrap_err(),
        AiError::InvalidCredential
    );

    match client(&endpoint, TEST_KEY, "broken").generate("x").unwrap_err() {
        AiError::Failed(detail) => assert!(detail.contains("internal error"), "{}", detail),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_wrong_endpoint_path_is_a_plain_failure() {
    let endpoint = spawn_endpoint();
    let misrouted = endpoint.replace("/v1beta", "/v1");

    match client(&misrouted, TEST_KEY, "gemini-test").generate("x").unwrap_err() {
        AiError::Failed(detail) => assert!(detail.contains("404"), "{}", detail),
        other => panic!("unexpected {:?}", other),
    }
}
