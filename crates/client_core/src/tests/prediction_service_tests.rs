use super::*;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Router,
};
use tokio::{net::TcpListener, sync::Mutex};

use crate::{config::parse_base_url, SubmissionOutcome, UploadController};

#[derive(Debug, Clone)]
struct ReceivedField {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct MockService {
    predict_status: StatusCode,
    predict_body: String,
    heatmap_status: StatusCode,
    heatmap_body: String,
    uploads: Arc<Mutex<Vec<ReceivedField>>>,
    heatmap_bodies: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockService {
    fn ok() -> Self {
        Self {
            predict_status: StatusCode::OK,
            predict_body: r#"{"prediction":"forged","confidence":87.34}"#.to_string(),
            heatmap_status: StatusCode::OK,
            heatmap_body: r#"{"heatmap_path":"static/heatmaps/abc.png"}"#.to_string(),
            uploads: Arc::new(Mutex::new(Vec::new())),
            heatmap_bodies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_predict(mut self, status: StatusCode, body: &str) -> Self {
        self.predict_status = status;
        self.predict_body = body.to_string();
        self
    }

    fn with_heatmap(mut self, status: StatusCode, body: &str) -> Self {
        self.heatmap_status = status;
        self.heatmap_body = body.to_string();
        self
    }
}

async fn predict_handler(
    State(state): State<MockService>,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.expect("field bytes").to_vec();
        state.uploads.lock().await.push(ReceivedField {
            name,
            file_name,
            content_type,
            bytes,
        });
    }
    (state.predict_status, state.predict_body.clone())
}

async fn heatmap_handler(State(state): State<MockService>, body: Bytes) -> (StatusCode, String) {
    state.heatmap_bodies.lock().await.push(body.to_vec());
    (state.heatmap_status, state.heatmap_body.clone())
}

async fn spawn_mock_service(state: MockService) -> std::io::Result<Url> {
    let app = Router::new()
        .route("/predict", post(predict_handler))
        .route("/generate_heatmap", post(heatmap_handler))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(parse_base_url(&format!("http://{addr}")).expect("mock base url"))
}

fn sample_selection() -> Selection {
    Selection::new("photo.png", b"\x89PNG not really".to_vec())
}

#[tokio::test]
async fn predict_posts_image_as_multipart_file_field() {
    let mock = MockService::ok();
    let uploads = mock.uploads.clone();
    let base_url = spawn_mock_service(mock).await.expect("spawn mock");
    let service = HttpPredictionService::new(base_url);

    let response = service.predict(&sample_selection()).await.expect("predict");
    assert_eq!(response.prediction, "forged");
    assert_eq!(response.confidence, 87.34);

    let uploads = uploads.lock().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].name, PREDICT_FILE_FIELD);
    assert_eq!(uploads[0].file_name.as_deref(), Some("photo.png"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(uploads[0].bytes, b"\x89PNG not really".to_vec());
}

#[tokio::test]
async fn predict_maps_non_success_status() {
    let mock = MockService::ok().with_predict(StatusCode::INTERNAL_SERVER_ERROR, "boom");
    let base_url = spawn_mock_service(mock).await.expect("spawn mock");
    let service = HttpPredictionService::new(base_url);

    let err = service
        .predict(&sample_selection())
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        ServiceError::Status {
            endpoint: Endpoint::Predict,
            status: 500
        }
    ));
}

#[tokio::test]
async fn predict_reports_malformed_body() {
    let mock = MockService::ok().with_predict(StatusCode::OK, r#"{"label":"forged"}"#);
    let base_url = spawn_mock_service(mock).await.expect("spawn mock");
    let service = HttpPredictionService::new(base_url);

    let err = service
        .predict(&sample_selection())
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        ServiceError::Malformed {
            endpoint: Endpoint::Predict,
            ..
        }
    ));
}

#[tokio::test]
async fn generate_heatmap_posts_empty_body() {
    let mock = MockService::ok();
    let bodies = mock.heatmap_bodies.clone();
    let base_url = spawn_mock_service(mock).await.expect("spawn mock");
    let service = HttpPredictionService::new(base_url);

    let response = service.generate_heatmap().await.expect("heatmap");
    assert_eq!(response.heatmap_path, "static/heatmaps/abc.png");
    assert_eq!(bodies.lock().await.as_slice(), &[Vec::<u8>::new()]);
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let base_url = parse_base_url(&format!("http://{addr}")).expect("base url");
    let service = HttpPredictionService::new(base_url);

    let err = service.generate_heatmap().await.expect_err("must fail");
    assert!(matches!(
        err,
        ServiceError::Transport {
            endpoint: Endpoint::GenerateHeatmap,
            ..
        }
    ));
}

#[tokio::test]
async fn controller_completes_both_calls_over_http() {
    let mock = MockService::ok();
    let uploads = mock.uploads.clone();
    let base_url = spawn_mock_service(mock).await.expect("spawn mock");
    let controller = UploadController::new(Arc::new(HttpPredictionService::new(base_url.clone())));
    controller.select_file(sample_selection());

    let outcome = controller.submit().await.expect("selection present");

    let SubmissionOutcome::Success {
        prediction,
        heatmap,
    } = outcome.clone()
    else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(prediction.display_confidence(), "87.34");
    let expected_prefix = format!("{base_url}static/heatmaps/abc.png?t=");
    assert!(
        heatmap.url.starts_with(&expected_prefix),
        "unexpected heatmap url: {}",
        heatmap.url
    );
    assert_eq!(uploads.lock().await.len(), 1);
}

#[tokio::test]
async fn controller_skips_heatmap_after_predict_failure_over_http() {
    let mock = MockService::ok().with_predict(StatusCode::BAD_GATEWAY, "");
    let bodies = mock.heatmap_bodies.clone();
    let base_url = spawn_mock_service(mock).await.expect("spawn mock");
    let controller = UploadController::new(Arc::new(HttpPredictionService::new(base_url)));
    controller.select_file(sample_selection());

    let outcome = controller.submit().await.expect("selection present");

    assert_eq!(
        outcome,
        SubmissionOutcome::HttpError {
            endpoint: Endpoint::Predict,
            status: 502,
        }
    );
    assert!(bodies.lock().await.is_empty());
}

#[tokio::test]
async fn malformed_heatmap_body_is_a_failure_over_http() {
    let mock = MockService::ok().with_heatmap(StatusCode::OK, "not json");
    let base_url = spawn_mock_service(mock).await.expect("spawn mock");
    let controller = UploadController::new(Arc::new(HttpPredictionService::new(base_url)));
    controller.select_file(sample_selection());

    let outcome = controller.submit().await.expect("selection present");

    assert!(matches!(
        outcome,
        SubmissionOutcome::Failed {
            endpoint: Endpoint::GenerateHeatmap,
            ..
        }
    ));
    let state = controller.snapshot();
    assert!(state.prediction.is_some());
    assert!(state.heatmap.is_none());
    assert!(!state.is_predicting);
}

#[test]
fn endpoints_join_beneath_base_path() {
    let service = HttpPredictionService::new(parse_base_url("http://host.test/api").expect("base"));
    assert_eq!(
        service.endpoint_url(Endpoint::Predict).expect("url").as_str(),
        "http://host.test/api/predict"
    );
    assert_eq!(
        service
            .endpoint_url(Endpoint::GenerateHeatmap)
            .expect("url")
            .as_str(),
        "http://host.test/api/generate_heatmap"
    );
}

#[test]
fn heatmap_url_resolves_relative_path_with_stamp() {
    let base = parse_base_url("https://img-forgery.example").expect("base");
    let url = resolve_heatmap_url(&base, "static/heatmaps/abc.png", 1_700_000_000_123).expect("url");
    assert_eq!(
        url.as_str(),
        "https://img-forgery.example/static/heatmaps/abc.png?t=1700000000123"
    );
}

#[test]
fn heatmap_url_tolerates_leading_slash_and_existing_query() {
    let base = parse_base_url("http://host.test/api").expect("base");
    let url = resolve_heatmap_url(&base, "/static/h.png?v=2", 7).expect("url");
    assert_eq!(url.as_str(), "http://host.test/api/static/h.png?v=2&t=7");
}
