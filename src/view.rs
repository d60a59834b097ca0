use tokio::sync::watch;

pub const STATUS_UPLOADING: &str = "Uploading and running segmentation...";
pub const STATUS_COMPLETE: &str = "Segmentation complete. Downloading artifacts...";
pub const STATUS_DONE: &str = "Done. You can also download 3D mesh and mask from the API.";
pub const STATUS_UNEXPECTED: &str = "Unexpected error. Check logs.";

// Overlay source is not derived from the prediction response yet; the API
// does not expose the overlay PNG, so the client points at a placeholder.
pub const PLACEHOLDER_OVERLAY_URL: &str =
    "https://dummyimage.com/512x512/111827/ff004c&text=Segmentation+Overlay";

/// Write side of the view: the client pushes status text and the overlay
/// image source here instead of touching a concrete UI.
pub struct ViewSinks {
    status: watch::Sender<String>,
    overlay: watch::Sender<Option<String>>,
}

/// Read side handed to the host (terminal status line, tests).
#[derive(Clone)]
pub struct ViewHandles {
    pub status: watch::Receiver<String>,
    pub overlay: watch::Receiver<Option<String>>,
}

impl ViewSinks {
    pub fn channels() -> (Self, ViewHandles) {
        let (status_tx, status_rx) = watch::channel(String::new());
        let (overlay_tx, overlay_rx) = watch::channel(None);
        (
            Self {
                status: status_tx,
                overlay: overlay_tx,
            },
            ViewHandles {
                status: status_rx,
                overlay: overlay_rx,
            },
        )
    }

    pub fn set_status(&self, text: impl Into<String>) {
        let _ = self.status.send(text.into());
    }

    pub fn set_overlay(&self, src: impl Into<String>) {
        let _ = self.overlay.send(Some(src.into()));
    }
}
