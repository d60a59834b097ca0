use crate::config::ApiSettings;
use crate::upload::{UploadCase, UploadCaseError};
use crate::view::{
    ViewSinks, PLACEHOLDER_OVERLAY_URL, STATUS_COMPLETE, STATUS_DONE, STATUS_UNEXPECTED,
    STATUS_UPLOADING,
};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tokio::{
    sync::Mutex,
    time::{sleep, Duration},
};
use tracing::instrument;

#[derive(Error, Debug)]
pub enum SegmentationClientError {
    #[error("Prediction service reported failure: {message}")]
    Server { message: String },
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Upload case error: {0}")]
    Case(#[from] UploadCaseError),
    #[error("A prediction is already in flight.")]
    SubmissionInFlight,
    #[error("Prediction service not healthy after {0} attempts.")]
    HealthRetriesExceeded(u64),
    #[error("Failed to write artifact: {0}")]
    ArtifactWrite(#[from] std::io::Error),
}

/// Successful `/predict` body. The artifact paths are server-relative
/// download locations; `dice_estimate` is null until the API computes it.
#[derive(Debug, Deserialize)]
pub struct PredictionResponse {
    pub mask_path: Option<String>,
    pub mesh_path: Option<String>,
    pub dice_estimate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

pub struct SegmentationClient {
    http: reqwest::Client,
    base_url: String,
    health_retries: u64,
    view: ViewSinks,
    in_flight: Mutex<()>,
}

impl SegmentationClient {
    pub fn new(api: &ApiSettings, view: ViewSinks) -> Result<Self, SegmentationClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: api.base_url(),
            health_retries: api.health_retries,
            view,
            in_flight: Mutex::new(()),
        })
    }

    /// Submits a case for segmentation and reflects progress into the view.
    ///
    /// At most one prediction is in flight at a time; an overlapping call
    /// is rejected with [`SegmentationClientError::SubmissionInFlight`]
    /// without disturbing the running one. Every other failure updates the
    /// status text and returns, leaving the client usable.
    #[instrument(skip(self, case))]
    pub async fn submit(
        &self,
        case: &UploadCase,
    ) -> Result<PredictionResponse, SegmentationClientError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SegmentationClientError::SubmissionInFlight)?;

        self.view.set_status(STATUS_UPLOADING);

        match self.predict(case).await {
            Ok(response) => {
                self.view.set_status(STATUS_COMPLETE);
                // The API does not serve the overlay PNG yet.
                self.view.set_overlay(PLACEHOLDER_OVERLAY_URL);
                self.view.set_status(STATUS_DONE);
                Ok(response)
            }
            Err(SegmentationClientError::Server { message }) => {
                self.view.set_status(format!("Error: {message}"));
                Err(SegmentationClientError::Server { message })
            }
            Err(err) => {
                tracing::error!("Prediction request failed: {err}");
                self.view.set_status(STATUS_UNEXPECTED);
                Err(err)
            }
        }
    }

    async fn predict(
        &self,
        case: &UploadCase,
    ) -> Result<PredictionResponse, SegmentationClientError> {
        let form = case.to_form().await?;
        let response = self
            .http
            .post(format!("{}/predict", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(server_error(response).await);
        }

        Ok(response.json::<PredictionResponse>().await?)
    }

    pub async fn health(&self) -> Result<(), SegmentationClientError> {
        self.http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Probes `/health` with capped exponential backoff until the service
    /// answers or the retry budget runs out.
    pub async fn wait_until_healthy(&self) -> Result<(), SegmentationClientError> {
        let mut retry_delay = Duration::from_millis(50);
        let max_retry_delay = Duration::from_secs(1);
        let mut retry_count = 0;

        while retry_count < self.health_retries {
            match self.health().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Health check failed: {e}");
                }
            }

            retry_count += 1;
            let jitter = rand::random::<f32>() * 0.2 + 0.9;
            sleep(retry_delay.mul_f32(jitter)).await;
            retry_delay = (retry_delay * 2).min(max_retry_delay);
        }

        Err(SegmentationClientError::HealthRetriesExceeded(
            self.health_retries,
        ))
    }

    #[instrument(skip(self, response))]
    pub async fn download_mask(
        &self,
        response: &PredictionResponse,
        dest: &Path,
    ) -> Result<(), SegmentationClientError> {
        let path = response.mask_path.as_deref().unwrap_or("/download/mask");
        self.download_artifact(path, dest).await
    }

    #[instrument(skip(self, response))]
    pub async fn download_mesh(
        &self,
        response: &PredictionResponse,
        dest: &Path,
    ) -> Result<(), SegmentationClientError> {
        let path = response.mesh_path.as_deref().unwrap_or("/download/mesh");
        self.download_artifact(path, dest).await
    }

    async fn download_artifact(
        &self,
        path: &str,
        dest: &Path,
    ) -> Result<(), SegmentationClientError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(server_error(response).await);
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        tracing::info!(dest = %dest.display(), bytes = bytes.len(), "Artifact downloaded");
        Ok(())
    }
}

/// Maps a non-OK response to a server failure: the body's `error` field if
/// it parses, the HTTP reason phrase otherwise.
async fn server_error(response: reqwest::Response) -> SegmentationClientError {
    let status = response.status();
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });
    SegmentationClientError::Server { message }
}
