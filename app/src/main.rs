//! camloop: capture a camera continuously, preview it, and record it as a
//! rolling series of fixed-length segments.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camloop_capture::TestPatternSource;
use camloop_display::HeadlessSurface;
use camloop_encoder::Y4mWriterFactory;
use camloop_engine::{SessionBackends, SessionController, SystemClock};
use camloop_ipc::{event_channel, SessionConfig, SessionEvent};

/// Environment variable naming an optional JSON configuration file.
const CONFIG_ENV: &str = "CAMLOOP_CONFIG";

/// Name of the preview surface.
const SURFACE_NAME: &str = "Video Feed";

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "camloop=info,camloop_engine=debug,camloop_capture=info,camloop_display=info,camloop_encoder=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Read the session configuration from `path`, or use the defaults.
fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str::<SessionConfig>(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => SessionConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn log_events(event_rx: Receiver<SessionEvent>) {
    for event in event_rx {
        match event {
            SessionEvent::StateChanged { previous, current } => {
                debug!(previous = previous.name(), current = current.name(), "Session state");
            }
            SessionEvent::OutputDirectory(dir) => info!(dir = %dir.display(), "Output directory"),
            SessionEvent::SegmentStarted {
                index,
                path,
                fps,
                size,
            } => info!(index, path = %path.display(), fps, %size, "Segment started"),
            SessionEvent::SegmentFinished(report) => info!(
                index = report.index,
                frames = report.frames_written,
                finalized = report.finalized,
                "Segment finished"
            ),
            SessionEvent::SegmentFailed {
                index,
                path,
                message,
            } => warn!(index, path = %path.display(), "Segment skipped: {}", message),
            SessionEvent::ComponentExited {
                component,
                error: Some(message),
            } => error!(component = component.name(), "Component failed: {}", message),
            SessionEvent::Metrics(metrics) => debug!(
                captured = metrics.frames_captured,
                shown = metrics.frames_shown,
                recorded = metrics.frames_recorded,
                fps = metrics.capture_fps,
                "Metrics"
            ),
            SessionEvent::SessionEnded { reason } => info!("Session ended: {}", reason.message()),
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!("camloop starting");

    let config_path = std::env::var_os(CONFIG_ENV).map(std::path::PathBuf::from);
    let config = load_config(config_path.as_deref())?;
    debug!(?config, "Configuration loaded");

    let (event_tx, event_rx) = event_channel();
    thread::Builder::new()
        .name("camloop-events".to_string())
        .spawn(move || log_events(event_rx))
        .context("Failed to spawn event thread")?;

    let backends = SessionBackends {
        capture: Arc::new(TestPatternSource::new()),
        surface: Some(Box::new(HeadlessSurface::new(
            SURFACE_NAME,
            config.display_geometry,
        ))),
        writer: Arc::new(Y4mWriterFactory::new()),
        clock: Arc::new(SystemClock::new()),
    };
    let mut controller = SessionController::new(config, backends).with_events(event_tx);
    let shutdown = controller.shutdown_handle();

    let mut session = tokio::task::spawn_blocking(move || controller.run());

    let summary = tokio::select! {
        result = &mut session => result.context("Session task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
            shutdown.shutdown();
            session.await.context("Session task panicked")??
        }
    };

    info!(
        dir = %summary.directory.display(),
        segments = summary.segments.len(),
        completed = summary.completed().count(),
        reason = %summary.reason.message(),
        "Shutdown complete"
    );
    Ok(())
}
