use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::Method,
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::limit::GlobalConcurrencyLimitLayer;

use crate::error::ApiError;
use crate::extract;
use crate::fields::FieldExtractor;
use crate::models::{ExtractRequest, ExtractResponse};
use crate::ocr::OcrProvider;

/// Per-process handles shared by every request. Nothing in here is mutated
/// after startup.
#[derive(Clone)]
pub struct AppState {
    pub ocr: Arc<dyn OcrProvider>,
    pub extractor: Arc<dyn FieldExtractor>,
    pub request_timeout: Duration,
}

pub struct Limits {
    pub max_instances: usize,
    pub max_body_bytes: usize,
}

/// Only `/ocrExtract` is bounded by `max_instances`; `/health` must keep
/// answering while every slot is busy.
pub fn router(state: AppState, limits: Limits) -> Router {
    let extract_route = any(ocr_extract)
        .layer(GlobalConcurrencyLimitLayer::new(limits.max_instances));

    Router::new()
        .route("/health", get(health))
        .route("/ocrExtract", extract_route)
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn ocr_extract(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ExtractResponse>, ApiError> {
    if method != Method::POST {
        tracing::warn!(%method, "rejected non-POST request");
        return Err(ApiError::MethodNotAllowed);
    }

    let body = body.map_err(|e| {
        tracing::error!(error = %e, "failed to read request body");
        ApiError::Internal(format!("failed to read request body: {}", e.body_text()))
    })?;

    let request = ExtractRequest::from_body(&body);
    let Some(image) = request.image() else {
        tracing::warn!("rejected request without image_base64");
        return Err(ApiError::InvalidArgument);
    };

    match extract::extract_card(
        image,
        state.ocr.as_ref(),
        state.extractor.as_ref(),
        state.request_timeout,
    )
    .await
    {
        Ok(response) => {
            tracing::info!(
                provider = state.ocr.name(),
                text_len = response.text.len(),
                business_type = ?response.data.business_type,
                "card extracted"
            );
            Ok(Json(response))
        }
        Err(e) => {
            tracing::error!(provider = state.ocr.name(), error = %e, "card extraction failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldError, HeuristicExtractor};
    use crate::models::{BusinessType, ContactRecord};
    use crate::ocr::{OcrError, PlaceholderOcr};
    use async_trait::async_trait;
    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    const IMAGE: &str = "aGVsbG8="; // "hello"

    struct FakeOcr {
        text: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrProvider for FakeOcr {
        async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
            assert_eq!(image, b"hello");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct FailingOcr;

    #[async_trait]
    impl OcrProvider for FailingOcr {
        async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
            Err(OcrError::Provider("quota exceeded".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct StalledOcr;

    #[async_trait]
    impl OcrProvider for StalledOcr {
        async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    struct FixedFields(ContactRecord);

    impl FieldExtractor for FixedFields {
        fn extract(&self, _text: &str) -> Result<ContactRecord, FieldError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenFields;

    impl FieldExtractor for BrokenFields {
        fn extract(&self, _text: &str) -> Result<ContactRecord, FieldError> {
            Err(FieldError("unreadable layout".into()))
        }
    }

    fn sample_record() -> ContactRecord {
        ContactRecord {
            name: "Jane Doe".into(),
            company: "Acme Inc.".into(),
            phone: "555-123-4567".into(),
            email: "jane@acme.com".into(),
            website: "acme.com".into(),
            address: "1 Main St".into(),
            business_type: BusinessType::Technology,
        }
    }

    /// Blocks every recognition until the test hands out a permit.
    struct GatedOcr {
        started: AtomicUsize,
        gate: Semaphore,
    }

    impl GatedOcr {
        fn new() -> Self {
            Self {
                started: AtomicUsize::new(0),
                gate: Semaphore::new(0),
            }
        }

        async fn wait_started(&self, n: usize) {
            while self.started.load(Ordering::SeqCst) < n {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl OcrProvider for GatedOcr {
        async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate
                .acquire()
                .await
                .map_err(|e| OcrError::Provider(e.to_string()))?
                .forget();
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    fn app_with(ocr: Arc<dyn OcrProvider>, extractor: Arc<dyn FieldExtractor>) -> Router {
        app_with_instances(ocr, extractor, 4)
    }

    fn app_with_instances(
        ocr: Arc<dyn OcrProvider>,
        extractor: Arc<dyn FieldExtractor>,
        max_instances: usize,
    ) -> Router {
        let state = AppState {
            ocr,
            extractor,
            request_timeout: Duration::from_secs(5),
        };
        router(
            state,
            Limits {
                max_instances,
                max_body_bytes: 1024,
            },
        )
    }

    fn placeholder_app() -> Router {
        app_with(Arc::new(PlaceholderOcr), Arc::new(HeuristicExtractor))
    }

    async fn send(app: Router, method: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri("/ocrExtract")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).expect("body is always JSON");
        (status, value)
    }

    fn post_body(image: &str) -> String {
        json!({ "image_base64": image }).to_string()
    }

    #[tokio::test]
    async fn non_post_methods_are_rejected() {
        for method in ["GET", "PUT", "DELETE", "PATCH", "OPTIONS"] {
            let (status, body) = send(placeholder_app(), method, post_body(IMAGE)).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(body, json!({"error": "Method not allowed"}));
        }
    }

    #[tokio::test]
    async fn non_post_is_rejected_even_with_garbage_body() {
        let (status, body) = send(placeholder_app(), "GET", "}{ not json").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({"error": "Method not allowed"}));
    }

    #[tokio::test]
    async fn missing_or_empty_image_is_bad_request() {
        let bodies = [
            String::new(),
            "not json".to_string(),
            "{}".to_string(),
            json!({"image_base64": null}).to_string(),
            json!({"image_base64": ""}).to_string(),
            json!({"image_base64": 7}).to_string(),
            json!({"other": IMAGE}).to_string(),
        ];
        for body in bodies {
            let (status, value) = send(placeholder_app(), "POST", body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(value, json!({"error": "image_base64 is required"}));
        }
    }

    #[tokio::test]
    async fn success_returns_provider_text_and_fields() {
        let ocr = Arc::new(FakeOcr {
            text: "Jane Doe\nAcme Inc.",
            calls: AtomicUsize::new(0),
        });
        let app = app_with(ocr.clone(), Arc::new(FixedFields(sample_record())));

        let (status, body) = send(app, "POST", post_body(IMAGE)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "text": "Jane Doe\nAcme Inc.",
                "data": {
                    "name": "Jane Doe",
                    "company": "Acme Inc.",
                    "phone": "555-123-4567",
                    "email": "jane@acme.com",
                    "website": "acme.com",
                    "address": "1 Main St",
                    "businessType": "Technology",
                }
            })
        );
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn placeholder_provider_returns_empty_card() {
        let (status, body) = send(placeholder_app(), "POST", post_body(IMAGE)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "text": "",
                "data": {
                    "name": "",
                    "company": "",
                    "phone": "",
                    "email": "",
                    "website": "",
                    "address": "",
                    "businessType": "Other",
                }
            })
        );
    }

    #[tokio::test]
    async fn data_url_payload_is_accepted() {
        let ocr = Arc::new(FakeOcr {
            text: "",
            calls: AtomicUsize::new(0),
        });
        let app = app_with(ocr, Arc::new(HeuristicExtractor));
        let (status, _) = send(app, "POST", post_body("data:image/jpeg;base64,aGVsbG8=")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn provider_failure_is_internal_error() {
        let app = app_with(Arc::new(FailingOcr), Arc::new(HeuristicExtractor));
        let (status, body) = send(app, "POST", post_body(IMAGE)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("quota exceeded"));
        assert_eq!(body.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn extractor_failure_is_internal_error() {
        let app = app_with(Arc::new(PlaceholderOcr), Arc::new(BrokenFields));
        let (status, body) = send(app, "POST", post_body(IMAGE)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"error": "field extraction failed: unreadable layout"})
        );
    }

    #[tokio::test]
    async fn invalid_base64_is_internal_error() {
        let (status, body) = send(placeholder_app(), "POST", post_body("***")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid base64 image data"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_times_out_as_internal_error() {
        let app = app_with(Arc::new(StalledOcr), Arc::new(HeuristicExtractor));
        let (status, body) = send(app, "POST", post_body(IMAGE)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "OCR extraction timed out after 5s"}));
    }

    #[tokio::test]
    async fn oversized_body_is_internal_error() {
        let huge = post_body(&"A".repeat(4096));
        let (status, body) = send(placeholder_app(), "POST", huge).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("failed to read request body"));
    }

    #[tokio::test]
    async fn repeated_requests_are_independent() {
        let ocr = Arc::new(FakeOcr {
            text: "Jane Doe",
            calls: AtomicUsize::new(0),
        });
        let app = app_with(ocr.clone(), Arc::new(FixedFields(sample_record())));

        let first = send(app.clone(), "POST", post_body(IMAGE)).await;
        let second = send(app, "POST", post_body(IMAGE)).await;
        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(first, second);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = placeholder_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn requests_beyond_max_instances_wait_for_a_slot() {
        let ocr = Arc::new(GatedOcr::new());
        let app = app_with_instances(ocr.clone(), Arc::new(HeuristicExtractor), 1);

        let first = tokio::spawn(send(app.clone(), "POST", post_body(IMAGE)));
        ocr.wait_started(1).await;

        let second = tokio::spawn(send(app, "POST", post_body(IMAGE)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ocr.started.load(Ordering::SeqCst), 1);

        ocr.gate.add_permits(1);
        let (status, _) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);

        ocr.wait_started(2).await;
        ocr.gate.add_permits(1);
        let (status, _) = second.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_answers_while_extraction_slots_are_full() {
        let ocr = Arc::new(GatedOcr::new());
        let app = app_with_instances(ocr.clone(), Arc::new(HeuristicExtractor), 1);

        let busy = tokio::spawn(send(app.clone(), "POST", post_body(IMAGE)));
        ocr.wait_started(1).await;

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = tokio::time::timeout(Duration::from_secs(2), app.oneshot(request))
            .await
            .expect("health must not queue behind extractions")
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        ocr.gate.add_permits(1);
        assert_eq!(busy.await.unwrap().0, StatusCode::OK);
    }
}
