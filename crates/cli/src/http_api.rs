use crate::service::{RagService, ServiceError};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart, State},
    http::{Response as HttpResponse, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use docrag_protocol::{serialize_json, ErrorEnvelope, QueryRequest};
use serde::Serialize;
use std::sync::Arc;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn router(service: Arc<RagService>) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

pub(crate) fn error_response(code: &str, message: String, hint: Option<String>) -> ErrorEnvelope {
    let hint = hint.or_else(|| match code {
        "invalid_request" => Some(
            "Send JSON like {\"question\": \"...\", \"top_k\": 4} with Content-Type: application/json"
                .to_string(),
        ),
        "missing_file" => {
            Some("Send multipart/form-data with a 'file' field that has a filename".to_string())
        }
        _ => None,
    });

    ErrorEnvelope {
        code: code.to_string(),
        message,
        hint,
    }
}

pub(crate) fn status_for(error: &ServiceError) -> StatusCode {
    match error {
        _ if error.is_client_error() => StatusCode::BAD_REQUEST,
        ServiceError::Generation(_) => StatusCode::BAD_GATEWAY,
        ServiceError::EmbeddingTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn service_error(error: &ServiceError) -> Result<Response, StatusCode> {
    let status = status_for(error);
    if status.is_server_error() {
        log::error!("Request failed: {error}");
    } else {
        log::debug!("Request rejected: {error}");
    }
    build_response(
        status,
        &error_response(error.code(), error.to_string(), error.hint()),
    )
}

pub(crate) fn build_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response, StatusCode> {
    let bytes = serialize_json(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_bytes();

    HttpResponse::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn upload_handler(
    State(service): State<Arc<RagService>>,
    mut multipart: Multipart,
) -> Result<Response, StatusCode> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return build_response(
                    StatusCode::BAD_REQUEST,
                    &error_response("invalid_request", format!("Invalid multipart body: {err}"), None),
                );
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let Some(filename) = field.file_name().map(str::to_string) else {
            break;
        };
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return build_response(
                    StatusCode::BAD_REQUEST,
                    &error_response("invalid_request", format!("Failed to read upload: {err}"), None),
                );
            }
        };

        return match service.ingest(&filename, &bytes).await {
            Ok(response) => build_response(StatusCode::OK, &response),
            Err(err) => service_error(&err),
        };
    }

    build_response(
        StatusCode::BAD_REQUEST,
        &error_response("missing_file", "No file uploaded".to_string(), None),
    )
}

async fn query_handler(
    State(service): State<Arc<RagService>>,
    body: Bytes,
) -> Result<Response, StatusCode> {
    let request: QueryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return build_response(
                StatusCode::BAD_REQUEST,
                &error_response("invalid_request", format!("Invalid JSON request: {err}"), None),
            );
        }
    };

    match service.query(&request).await {
        Ok(response) => build_response(StatusCode::OK, &response),
        Err(err) => service_error(&err),
    }
}

async fn health_handler(State(service): State<Arc<RagService>>) -> Result<Response, StatusCode> {
    build_response(StatusCode::OK, &service.health())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::AnswerGenerator;
    use async_trait::async_trait;
    use axum::http::Request;
    use docrag_protocol::{HealthResponse, QueryResponse, UploadResponse, UploadStatus};
    use docrag_text_chunker::{Chunker, ChunkingConfig};
    use docrag_vector_store::{HashEmbedder, SearchMode, VectorStore};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docrag-test-boundary";

    struct FailingGenerator;

    #[async_trait]
    impl AnswerGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            Err(ServiceError::Generation("upstream returned 503".to_string()))
        }
    }

    fn service() -> RagService {
        RagService::new(
            VectorStore::new(Arc::new(HashEmbedder::new(8).unwrap()), SearchMode::BruteForce),
            Chunker::new(ChunkingConfig::new(4, 1)).unwrap(),
            Duration::from_secs(5),
        )
    }

    fn multipart_request(filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\
             \r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::post("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn upload_then_query() {
        let app = router(Arc::new(service()));

        let (status, body) = send(
            app.clone(),
            multipart_request("notes.txt", "one two three four five six seven"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let upload: UploadResponse = serde_json::from_value(body).unwrap();
        assert_eq!(upload.status, UploadStatus::Success);
        assert_eq!(upload.chunks_added, 2);

        let (status, body) = send(
            app.clone(),
            json_request("/query", r#"{"question": "seven", "top_k": 5}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let query: QueryResponse = serde_json::from_value(body).unwrap();
        assert_eq!(query.question, "seven");
        assert_eq!(query.answer, None);
        assert_eq!(query.sources.len(), 2);
        assert_eq!(query.sources[0]["filename"], "notes.txt");

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health.entries, 2);
        assert_eq!(health.search_mode, "brute-force");
    }

    #[tokio::test]
    async fn malformed_query_is_bad_request() {
        let app = router(Arc::new(service()));
        let (status, body) = send(app, json_request("/query", r#"{"top_k": 2}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");
        assert!(body["hint"].is_string());
    }

    #[tokio::test]
    async fn unsupported_upload_is_bad_request() {
        let app = router(Arc::new(service()));
        let (status, body) = send(app, multipart_request("scan.pdf", "%PDF-1.7")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "unsupported_file");
        assert_eq!(body["message"], "Unsupported file type: pdf");
    }

    #[tokio::test]
    async fn image_query_is_bad_request() {
        let app = router(Arc::new(service()));
        let (status, body) = send(
            app,
            json_request("/query", r#"{"question": "q", "image_base64": "aGk="}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "unsupported_feature");
    }

    #[tokio::test]
    async fn generator_failure_is_bad_gateway() {
        let app = router(Arc::new(
            service().with_generator(Arc::new(FailingGenerator)),
        ));
        let (status, body) = send(app, json_request("/query", r#"{"question": "q"}"#)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "generation_failed");
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err = ServiceError::EmbeddingTimeout(Duration::from_secs(1));
        assert_eq!(status_for(&err), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(&ServiceError::Internal("boom".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
