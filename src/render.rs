use std::io::Write;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Duration};

/// Drawing target for the placeholder renderer. The redraw is clear-only
/// until a real mesh renderer is plugged in, so `clear` is the whole
/// surface contract.
pub trait RenderSurface: Send {
    fn clear(&mut self);
}

/// Rotating-mesh placeholder: the angle advances on every tick but nothing
/// is drawn yet. The real mesh stays a downloadable `.obj` artifact.
pub struct PlaceholderRenderer<S: RenderSurface> {
    angle: f64,
    surface: S,
}

impl<S: RenderSurface> PlaceholderRenderer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            angle: 0.0,
            surface,
        }
    }

    pub fn tick(&mut self) {
        self.angle += 0.01;
        self.surface.clear();
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub async fn run(mut self, tick_ms: u64, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(Duration::from_millis(tick_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                _ = shutdown_rx.recv() => {
                    tracing::info!("Render ticker received shutdown signal");
                    break;
                }
            }
        }
    }
}

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

/// Terminal-backed surface: clearing the current line and repainting the
/// latest status text is its entire redraw.
pub struct StatusLineSurface {
    status: watch::Receiver<String>,
    frame: usize,
}

impl StatusLineSurface {
    pub fn new(status: watch::Receiver<String>) -> Self {
        Self { status, frame: 0 }
    }
}

impl RenderSurface for StatusLineSurface {
    fn clear(&mut self) {
        self.frame = (self.frame + 1) % SPINNER_FRAMES.len();
        let status = self.status.borrow().clone();
        print!("\r\x1b[2K{} {}", SPINNER_FRAMES[self.frame], status);
        let _ = std::io::stdout().flush();
    }
}
