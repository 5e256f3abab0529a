//! Live preview of captured frames.
//!
//! The display consumes its own fan-out subscription, so a slow surface
//! only drops frames from the preview and never starves recording.

mod display;
mod error;
mod surface;

pub use display::{Display, DisplayOptions};
pub use error::DisplayError;
pub use surface::{HeadlessSurface, RenderSurface, SurfaceStats};

/// Result type for display operations.
pub type DisplayResult<T> = Result<T, DisplayError>;
