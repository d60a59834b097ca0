use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use segmentation_client::config::ApiSettings;
use segmentation_client::prediction::{SegmentationClient, SegmentationClientError};
use segmentation_client::upload::UploadCase;
use segmentation_client::view::{
    ViewHandles, ViewSinks, PLACEHOLDER_OVERLAY_URL, STATUS_DONE, STATUS_UNEXPECTED,
    STATUS_UPLOADING,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Binds a stub prediction API on an ephemeral port and returns its port.
async fn spawn_stub(router: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    port
}

fn client_for(port: u16) -> (SegmentationClient, ViewHandles) {
    let api = ApiSettings {
        host: "127.0.0.1".into(),
        port,
        request_timeout_secs: 5,
        health_retries: 2,
    };
    let (view, handles) = ViewSinks::channels();
    let client = SegmentationClient::new(&api, view).unwrap();
    (client, handles)
}

fn write_case() -> (TempDir, UploadCase) {
    let dir = tempdir().unwrap();
    for name in [
        "case_t1.nii.gz",
        "case_t1ce.nii.gz",
        "case_t2.nii.gz",
        "case_flair.nii.gz",
    ] {
        std::fs::write(dir.path().join(name), b"nifti").unwrap();
    }
    let case = UploadCase::from_dir(dir.path()).unwrap();
    (dir, case)
}

#[tokio::test]
async fn successful_prediction_reaches_done_and_sets_overlay() {
    let router = Router::new().route(
        "/predict",
        post(|| async {
            Json(json!({
                "mask_path": "/download/mask",
                "mesh_path": "/download/mesh",
                "dice_estimate": null
            }))
        }),
    );
    let port = spawn_stub(router).await;
    let (client, handles) = client_for(port);
    let (_dir, case) = write_case();

    let response = client.submit(&case).await.unwrap();

    assert_eq!(response.mask_path.as_deref(), Some("/download/mask"));
    assert_eq!(*handles.status.borrow(), STATUS_DONE);
    assert_eq!(
        handles.overlay.borrow().as_deref(),
        Some(PLACEHOLDER_OVERLAY_URL)
    );
}

#[tokio::test]
async fn server_error_message_is_surfaced_verbatim() {
    let router = Router::new().route(
        "/predict",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Upload four files named t1, t1ce, t2, flair"})),
            )
        }),
    );
    let port = spawn_stub(router).await;
    let (client, handles) = client_for(port);
    let (_dir, case) = write_case();

    let err = client.submit(&case).await.unwrap_err();

    assert!(matches!(err, SegmentationClientError::Server { .. }));
    assert_eq!(
        *handles.status.borrow(),
        "Error: Upload four files named t1, t1ce, t2, flair"
    );
}

#[tokio::test]
async fn missing_error_field_falls_back_to_reason_phrase() {
    let router = Router::new().route(
        "/predict",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))) }),
    );
    let port = spawn_stub(router).await;
    let (client, handles) = client_for(port);
    let (_dir, case) = write_case();

    client.submit(&case).await.unwrap_err();

    assert_eq!(*handles.status.borrow(), "Error: Service Unavailable");
}

#[tokio::test]
async fn connection_failure_reports_generic_message() {
    // Bind and drop to get a port nothing listens on.
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        listener.local_addr().unwrap().port()
    };
    let (client, handles) = client_for(port);
    let (_dir, case) = write_case();

    let err = client.submit(&case).await.unwrap_err();

    assert!(matches!(err, SegmentationClientError::Transport(_)));
    assert_eq!(*handles.status.borrow(), STATUS_UNEXPECTED);
}

#[tokio::test]
async fn overlapping_submission_is_rejected() {
    let router = Router::new().route(
        "/predict",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Json(json!({}))
        }),
    );
    let port = spawn_stub(router).await;
    let (client, handles) = client_for(port);
    let client = Arc::new(client);
    let (_dir, case) = write_case();

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.submit(&case).await }
    });

    // Let the first submission reach the await on the slow endpoint.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*handles.status.borrow(), STATUS_UPLOADING);

    let (_dir2, second_case) = write_case();
    let err = client.submit(&second_case).await.unwrap_err();
    assert!(matches!(err, SegmentationClientError::SubmissionInFlight));

    // The in-flight submission is unaffected by the rejection.
    first.await.unwrap().unwrap();
    assert_eq!(*handles.status.borrow(), STATUS_DONE);
}

#[tokio::test]
async fn artifacts_download_to_local_files() {
    let router = Router::new()
        .route("/download/mask", get(|| async { "MASKBYTES" }))
        .route("/download/mesh", get(|| async { "OBJBYTES" }));
    let port = spawn_stub(router).await;
    let (client, _handles) = client_for(port);

    let response = segmentation_client::prediction::PredictionResponse {
        mask_path: Some("/download/mask".into()),
        mesh_path: None,
        dice_estimate: None,
    };

    let out = tempdir().unwrap();
    let mask_dest = out.path().join("mask.npy");
    let mesh_dest = out.path().join("tumor.obj");

    client.download_mask(&response, &mask_dest).await.unwrap();
    // mesh_path is absent, the client falls back to the well-known path.
    client.download_mesh(&response, &mesh_dest).await.unwrap();

    assert_eq!(std::fs::read(&mask_dest).unwrap(), b"MASKBYTES");
    assert_eq!(std::fs::read(&mesh_dest).unwrap(), b"OBJBYTES");
}

#[tokio::test]
async fn waits_for_health_and_gives_up_after_budget() {
    let router = Router::new().route("/health", get(|| async { Json(json!({"status": "ok"})) }));
    let port = spawn_stub(router).await;
    let (client, _handles) = client_for(port);
    client.wait_until_healthy().await.unwrap();

    let dead_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        listener.local_addr().unwrap().port()
    };
    let (client, _handles) = client_for(dead_port);
    let err = client.wait_until_healthy().await.unwrap_err();
    assert!(matches!(
        err,
        SegmentationClientError::HealthRetriesExceeded(2)
    ));
}

#[test]
fn case_resolution_requires_all_modalities() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("case_t1.nii.gz"), b"nifti").unwrap();
    assert!(UploadCase::from_dir(dir.path()).is_err());
    assert!(UploadCase::from_dir(Path::new("/nonexistent")).is_err());
}
