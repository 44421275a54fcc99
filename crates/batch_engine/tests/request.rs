mod common;

use batch_engine::{EngineConfig, HttpRequestExecutor, RequestError, RequestExecutor};
use common::row;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: String) -> EngineConfig {
    EngineConfig {
        base_url,
        api_key: "test-key".to_string(),
        email: "ops@example.com".to_string(),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn posts_row_fields_with_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/sct/consulta"))
        .and(header("x-api-key", "test-key"))
        .and(header("email", "ops@example.com"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "cuit": "20111111112", "clave": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    // No trailing slash on the base; glue columns stay out of the body.
    let executor = HttpRequestExecutor::new(&config(server.uri()), "api/v1/sct/consulta").unwrap();
    assert_eq!(executor.url(), format!("{}/api/v1/sct/consulta", server.uri()));
    let row = row(
        0,
        &[
            ("cuit", "20111111112"),
            ("clave", "pw"),
            ("procesar", "si"),
            ("retry", "2"),
            ("ubicacion_descarga", ""),
        ],
    );

    assert_eq!(
        executor.request_body(&row),
        json!({ "cuit": "20111111112", "clave": "pw" })
    );
    let response = executor.execute(&row).await.unwrap();
    assert_eq!(response.http_status, 200);
    assert!(response.is_success());
}

#[tokio::test]
async fn non_json_body_is_wrapped_as_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/consulta"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let executor = HttpRequestExecutor::new(&config(server.uri()), "/consulta").unwrap();
    let response = executor.execute(&row(0, &[("cuit", "1")])).await.unwrap();

    assert_eq!(response.http_status, 502);
    assert_eq!(response.payload, json!({ "raw_text": "Bad Gateway" }));
    assert!(!response.is_success());
    assert_eq!(response.failure_message(), "HTTP 502");
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let executor =
        HttpRequestExecutor::new(&config("http://127.0.0.1:1".to_string()), "consulta").unwrap();
    let err = executor.execute(&row(0, &[("cuit", "1")])).await.unwrap_err();
    assert!(err.is_transport());
    assert!(matches!(err, RequestError::Transport(_)));
}
