use crate::config::Settings;
use crate::prediction::{SegmentationClient, SegmentationClientError};
use crate::render::{PlaceholderRenderer, StatusLineSurface};
use crate::upload::UploadCase;
use crate::view::ViewSinks;

use anyhow::Context;
use std::path::Path;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Settings, case_dir: &Path) -> anyhow::Result<()> {
    let case = UploadCase::from_dir(case_dir)
        .with_context(|| format!("failed to resolve case in {}", case_dir.display()))?;

    let (view, handles) = ViewSinks::channels();
    let client = match SegmentationClient::new(&config.api, view) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to initialize segmentation client: {e}");
            return Err(e.into());
        }
    };

    let (shutdown_tx, _) = broadcast::channel(1);

    let renderer = PlaceholderRenderer::new(StatusLineSurface::new(handles.status.clone()));
    let render_handle = tokio::spawn(renderer.run(config.render.tick_ms, shutdown_tx.subscribe()));

    tokio::spawn({
        let mut overlay = handles.overlay.clone();
        async move {
            while overlay.changed().await.is_ok() {
                let src = overlay.borrow_and_update().clone();
                if let Some(src) = src {
                    tracing::info!(%src, "Overlay image updated");
                }
            }
        }
    });

    tokio::select! {
        result = run_case(&client, &case, &config) => {
            if let Err(e) = result {
                // Already surfaced through the status line; the failure is
                // not fatal to the app.
                tracing::error!("Case processing failed: {e}");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, starting graceful shutdown.");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = render_handle.await;
    println!();

    Ok(())
}

async fn run_case(
    client: &SegmentationClient,
    case: &UploadCase,
    config: &Settings,
) -> Result<(), SegmentationClientError> {
    client.wait_until_healthy().await?;

    let response = client.submit(case).await?;

    tokio::fs::create_dir_all(&config.artifacts_dir)
        .await
        .map_err(SegmentationClientError::ArtifactWrite)?;
    client
        .download_mask(&response, &config.artifacts_dir.join("mask.npy"))
        .await?;
    client
        .download_mesh(&response, &config.artifacts_dir.join("tumor.obj"))
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
