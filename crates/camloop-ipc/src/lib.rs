//! Shared types for the camloop pipeline.
//!
//! This crate defines the configuration, component state machine and
//! status events exchanged between the session controller, its worker
//! components and whoever embeds the controller.

mod config;
mod events;
mod state;
mod types;

pub use config::{ConfigError, FpsPolicy, SessionConfig};
pub use events::SessionEvent;
pub use state::{ComponentKind, ComponentState, SessionState, StopReason};
pub use types::{FrameSize, Geometry, SegmentReport, SessionMetrics};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for session events (controller → embedder).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
