//! Component and session state machine types.

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by every worker component.
///
/// `Stopped -> Running -> Stopping -> Stopped`, with `Failed` as the
/// terminal state of a loop that ended on an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentState {
    #[default]
    Stopped,
    Running,
    Stopping,
    Failed,
}

impl ComponentState {
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true once the worker loop is no longer consuming or producing.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Failed => "Failed",
        }
    }
}

impl From<ComponentState> for u8 {
    fn from(state: ComponentState) -> Self {
        match state {
            ComponentState::Stopped => 0,
            ComponentState::Running => 1,
            ComponentState::Stopping => 2,
            ComponentState::Failed => 3,
        }
    }
}

impl From<u8> for ComponentState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Failed,
            _ => Self::Stopped,
        }
    }
}

/// The pipeline component a status message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Capture,
    Display,
    Recorder,
}

impl ComponentKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Display => "display",
            Self::Recorder => "recorder",
        }
    }
}

/// State of the session controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Not started yet.
    #[default]
    Idle,

    /// Waiting for the camera to settle before capture starts.
    PreRoll,

    /// Capture and display are up; `segment` is the active index.
    Recording { segment: u64 },

    /// Tearing down components.
    Stopping { reason: StopReason },

    /// All components have been released.
    Finished { reason: StopReason },
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PreRoll => "PreRoll",
            Self::Recording { .. } => "Recording",
            Self::Stopping { .. } => "Stopping",
            Self::Finished { .. } => "Finished",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Shutdown was requested through the session handle.
    ShutdownRequested,

    /// The camera stopped producing frames (end of stream).
    CaptureEnded,

    /// Reading from the camera failed.
    CaptureFailed { message: String },

    /// The configured number of segments has been produced.
    SegmentLimitReached,
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::ShutdownRequested => "Session stopped by request".to_string(),
            Self::CaptureEnded => "Camera stream ended".to_string(),
            Self::CaptureFailed { message } => format!("Capture failed: {message}"),
            Self::SegmentLimitReached => "Segment limit reached".to_string(),
        }
    }

    /// Returns true if the session ended because of an error.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::CaptureFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_state_u8_roundtrip() {
        for state in [
            ComponentState::Stopped,
            ComponentState::Running,
            ComponentState::Stopping,
            ComponentState::Failed,
        ] {
            assert_eq!(ComponentState::from(u8::from(state)), state);
        }
    }

    #[test]
    fn test_component_state_finished() {
        assert!(ComponentState::Stopped.is_finished());
        assert!(ComponentState::Failed.is_finished());
        assert!(!ComponentState::Running.is_finished());
        assert!(!ComponentState::Stopping.is_finished());
    }

    #[test]
    fn test_stop_reason_failure() {
        assert!(StopReason::CaptureFailed {
            message: "io".into()
        }
        .is_failure());
        assert!(!StopReason::ShutdownRequested.is_failure());
        assert_eq!(
            StopReason::CaptureEnded.message(),
            "Camera stream ended".to_string()
        );
    }
}
