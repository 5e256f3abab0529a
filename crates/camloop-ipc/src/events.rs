//! Status events published by the session controller and its components.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::{ComponentKind, ComponentState, SessionState, StopReason};
use crate::types::{FrameSize, SegmentReport, SessionMetrics};

/// Events emitted while a session runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Session state has changed.
    StateChanged {
        previous: Box<SessionState>,
        current: Box<SessionState>,
    },

    /// A worker component changed lifecycle state.
    ComponentStateChanged {
        component: ComponentKind,
        state: ComponentState,
    },

    /// A worker loop exited. `error` is set when it ended on a failure.
    ComponentExited {
        component: ComponentKind,
        error: Option<String>,
    },

    /// The output directory for this session is ready.
    OutputDirectory(PathBuf),

    /// A new segment writer was opened.
    SegmentStarted {
        index: u64,
        path: PathBuf,
        fps: u32,
        size: FrameSize,
    },

    /// A segment was stopped and finalized.
    SegmentFinished(SegmentReport),

    /// A segment's writer could not be opened; the index was skipped.
    SegmentFailed {
        index: u64,
        path: PathBuf,
        message: String,
    },

    /// Periodic metrics snapshot.
    Metrics(SessionMetrics),

    /// The session has ended and every component is released.
    SessionEnded { reason: StopReason },
}
