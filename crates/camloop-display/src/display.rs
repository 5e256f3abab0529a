//! Display component: drains its subscription onto the render surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, trace, warn};

use camloop_capture::{
    catch_worker_panic, CancelToken, CapturedFrame, FrameBuffer, StateCell, StatusReporter, Subscription,
    WorkerHandle, DEFAULT_JOIN_TIMEOUT,
};
use camloop_ipc::{ComponentState, Geometry, SessionConfig};

use crate::error::DisplayError;
use crate::surface::RenderSurface;
use crate::DisplayResult;

/// Timing knobs for the display loop.
#[derive(Debug, Clone, Copy)]
pub struct DisplayOptions {
    /// How long to wait for a frame before checking for cancellation.
    pub idle_backoff: Duration,

    /// Bound on joining the display thread.
    pub join_timeout: Duration,
}

impl DisplayOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            idle_backoff: config.idle_backoff(),
            join_timeout: config.join_timeout(),
        }
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(5),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

#[derive(Debug, Default)]
struct DisplayCounters {
    shown: AtomicU64,
    render_failures: AtomicU64,
}

/// Live preview of the capture stream.
///
/// Owns the surface exclusively. Frames are scaled to the surface's target
/// size and shown at the screen origin.
pub struct Display {
    surface: Option<Box<dyn RenderSurface>>,
    subscription: Option<Subscription>,
    buffer: Arc<FrameBuffer>,
    options: DisplayOptions,
    state: StateCell,
    cancel: CancelToken,
    worker: Option<WorkerHandle>,
    counters: Arc<DisplayCounters>,
}

impl Display {
    pub fn new(
        surface: Box<dyn RenderSurface>,
        subscription: Subscription,
        options: DisplayOptions,
    ) -> Self {
        Self {
            surface: Some(surface),
            buffer: subscription.shared_buffer(),
            subscription: Some(subscription),
            options,
            state: StateCell::new(ComponentState::Stopped),
            cancel: CancelToken::new(),
            worker: None,
            counters: Arc::new(DisplayCounters::default()),
        }
    }

    /// Start the display loop.
    #[instrument(name = "display_start", skip_all)]
    pub fn start(&mut self, reporter: StatusReporter) -> DisplayResult<()> {
        let (Some(surface), Some(subscription)) = (self.surface.take(), self.subscription.take())
        else {
            return Err(DisplayError::AlreadyStarted);
        };

        let ctx = DisplayLoop {
            surface,
            subscription,
            idle_backoff: self.options.idle_backoff,
            cancel: self.cancel.clone(),
            state: self.state.clone(),
            counters: Arc::clone(&self.counters),
            reporter: reporter.clone(),
        };

        self.state.set(ComponentState::Running);
        reporter.state_changed(ComponentState::Running);

        match WorkerHandle::spawn("display", move || ctx.run()) {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.state.set(ComponentState::Failed);
                Err(DisplayError::ThreadSpawn(e))
            }
        }
    }

    /// Stop the loop after it drains what is buffered, then release the
    /// surface.
    #[instrument(name = "display_stop", skip(self))]
    pub fn stop(&mut self) -> DisplayResult<()> {
        self.cancel.cancel();

        let Some(mut worker) = self.worker.take() else {
            if let Some(mut surface) = self.surface.take() {
                surface.close();
            }
            return Ok(());
        };

        self.state
            .transition(ComponentState::Running, ComponentState::Stopping);
        info!("Stopping display");
        worker.join_timeout(self.options.join_timeout)?;
        self.state
            .transition(ComponentState::Stopping, ComponentState::Stopped);

        info!(
            shown = self.frames_shown(),
            render_failures = self.render_failures(),
            "Display stopped"
        );
        Ok(())
    }

    pub fn state(&self) -> ComponentState {
        self.state.get()
    }

    pub fn frames_shown(&self) -> u64 {
        self.counters.shown.load(Ordering::Relaxed)
    }

    pub fn render_failures(&self) -> u64 {
        self.counters.render_failures.load(Ordering::Relaxed)
    }

    /// Frames the display buffer rejected because it was full.
    pub fn frames_dropped(&self) -> u64 {
        self.buffer.dropped()
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct DisplayLoop {
    surface: Box<dyn RenderSurface>,
    subscription: Subscription,
    idle_backoff: Duration,
    cancel: CancelToken,
    state: StateCell,
    counters: Arc<DisplayCounters>,
    reporter: StatusReporter,
}

impl DisplayLoop {
    fn run(mut self) {
        let target = self.surface.target_geometry();
        let placement = Geometry::at_origin(target.width, target.height);
        debug!(surface = self.surface.name(), size = %target.size(), "Display loop starting");

        let error = catch_worker_panic("display", || self.show_until_cancelled(placement)).err();

        self.surface.close();
        let final_state = if error.is_some() {
            ComponentState::Failed
        } else {
            ComponentState::Stopped
        };
        self.state.set(final_state);
        self.reporter.state_changed(final_state);
        self.reporter.exited(error);
    }

    fn show_until_cancelled(&mut self, placement: Geometry) {
        while !self.cancel.is_cancelled() {
            if let Some(frame) = self.subscription.pop_timeout(self.idle_backoff) {
                self.present(&frame, placement);
            }
        }

        // Drain what was buffered when stop was observed
        let pending = self.subscription.len();
        for _ in 0..pending {
            match self.subscription.pop_front() {
                Some(frame) => self.present(&frame, placement),
                None => break,
            }
        }
        debug!(drained = pending, "Display drained");
    }

    fn present(&mut self, frame: &CapturedFrame, placement: Geometry) {
        let scaled = frame.scaled(placement.size());
        match self.surface.show(&scaled, placement) {
            Ok(()) => {
                self.counters.shown.fetch_add(1, Ordering::Relaxed);
                trace!(sequence = frame.sequence, "Frame shown");
            }
            Err(e) => {
                let failures = self.counters.render_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(sequence = frame.sequence, failures, "Failed to show frame: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use bytes::Bytes;
    use camloop_capture::{CaptureTimestamp, FrameDispatcher, PixelFormat};
    use camloop_ipc::{ComponentKind, FrameSize, SessionEvent};

    use crate::surface::HeadlessSurface;

    fn bgr_frame(sequence: u64, width: u32, height: u32) -> Arc<CapturedFrame> {
        let data = vec![0x80u8; (width * height * 3) as usize];
        Arc::new(CapturedFrame::new(
            Bytes::from(data),
            width,
            height,
            PixelFormat::Bgr24,
            CaptureTimestamp::now(Instant::now()),
            sequence,
        ))
    }

    struct FailingSurface {
        attempts: Arc<AtomicU64>,
    }

    impl RenderSurface for FailingSurface {
        fn show(&mut self, _frame: &CapturedFrame, _geometry: Geometry) -> DisplayResult<()> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(DisplayError::RenderFailed("no window".to_string()))
        }

        fn target_geometry(&self) -> Geometry {
            Geometry::at_origin(4, 4)
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_frames_are_scaled_to_surface() {
        let dispatcher = FrameDispatcher::new();
        let surface = HeadlessSurface::new("preview", Geometry::at_origin(8, 6));
        let stats = surface.stats();
        let mut display = Display::new(
            Box::new(surface),
            dispatcher.subscribe("display", 10),
            DisplayOptions::default(),
        );
        display.start(StatusReporter::silent(ComponentKind::Display)).unwrap();

        for i in 0..3 {
            dispatcher.publish(bgr_frame(i, 16, 12));
        }
        display.stop().unwrap();

        assert_eq!(display.frames_shown(), 3);
        assert_eq!(stats.shown(), 3);
        assert_eq!(stats.last_size(), Some(FrameSize::new(8, 6)));
        assert!(stats.is_closed());
        assert_eq!(display.state(), ComponentState::Stopped);
    }

    #[test]
    fn test_stop_drains_buffered_frames() {
        let dispatcher = FrameDispatcher::new();
        let subscription = dispatcher.subscribe("display", 10);
        for i in 0..5 {
            dispatcher.publish(bgr_frame(i, 4, 4));
        }

        let surface = HeadlessSurface::new("preview", Geometry::at_origin(4, 4));
        let stats = surface.stats();
        let mut display = Display::new(Box::new(surface), subscription, DisplayOptions::default());

        // Cancel before the loop runs so only the drain path shows frames
        display.cancel.cancel();
        display.start(StatusReporter::silent(ComponentKind::Display)).unwrap();
        display.stop().unwrap();

        assert_eq!(stats.shown(), 5);
    }

    #[test]
    fn test_render_failures_are_counted_not_fatal() {
        let dispatcher = FrameDispatcher::new();
        let attempts = Arc::new(AtomicU64::new(0));
        let (tx, rx) = crossbeam_channel::bounded(16);
        let mut display = Display::new(
            Box::new(FailingSurface {
                attempts: Arc::clone(&attempts),
            }),
            dispatcher.subscribe("display", 10),
            DisplayOptions::default(),
        );
        display
            .start(StatusReporter::new(ComponentKind::Display, Some(tx)))
            .unwrap();

        dispatcher.publish(bgr_frame(0, 4, 4));
        dispatcher.publish(bgr_frame(1, 4, 4));
        display.stop().unwrap();

        assert_eq!(attempts.load(Ordering::Relaxed), 2);
        assert_eq!(display.render_failures(), 2);
        assert_eq!(display.frames_shown(), 0);

        let exited_cleanly = rx.try_iter().any(|event| {
            matches!(
                event,
                SessionEvent::ComponentExited {
                    component: ComponentKind::Display,
                    error: None
                }
            )
        });
        assert!(exited_cleanly);
    }

    #[test]
    fn test_start_twice_fails() {
        let dispatcher = FrameDispatcher::new();
        let mut display = Display::new(
            Box::new(HeadlessSurface::new("preview", Geometry::default())),
            dispatcher.subscribe("display", 2),
            DisplayOptions::default(),
        );
        display.start(StatusReporter::silent(ComponentKind::Display)).unwrap();
        assert!(matches!(
            display.start(StatusReporter::silent(ComponentKind::Display)),
            Err(DisplayError::AlreadyStarted)
        ));
        display.stop().unwrap();
    }

    #[test]
    fn test_unsubscribes_on_exit() {
        let dispatcher = FrameDispatcher::new();
        let mut display = Display::new(
            Box::new(HeadlessSurface::new("preview", Geometry::default())),
            dispatcher.subscribe("display", 2),
            DisplayOptions::default(),
        );
        assert_eq!(dispatcher.subscriber_count(), 1);
        display.start(StatusReporter::silent(ComponentKind::Display)).unwrap();
        display.stop().unwrap();
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    struct PanickingSurface;

    impl RenderSurface for PanickingSurface {
        fn show(&mut self, _frame: &CapturedFrame, _geometry: Geometry) -> DisplayResult<()> {
            panic!("window destroyed");
        }

        fn target_geometry(&self) -> Geometry {
            Geometry::at_origin(4, 4)
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[test]
    fn test_panicking_surface_exits_as_failed() {
        let dispatcher = FrameDispatcher::new();
        let (tx, rx) = crossbeam_channel::bounded(16);
        let mut display = Display::new(
            Box::new(PanickingSurface),
            dispatcher.subscribe("display", 10),
            DisplayOptions::default(),
        );
        display
            .start(StatusReporter::new(ComponentKind::Display, Some(tx)))
            .unwrap();

        dispatcher.publish(bgr_frame(0, 4, 4));
        let exit = rx
            .iter()
            .find_map(|event| match event {
                SessionEvent::ComponentExited { error, .. } => Some(error),
                _ => None,
            })
            .unwrap();
        display.stop().unwrap();

        assert!(exit.unwrap().contains("window destroyed"));
        assert_eq!(display.state(), ComponentState::Failed);
    }
}
