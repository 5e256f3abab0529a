//! Output directory and segment file naming.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::debug;

/// Timestamp layout of a session directory name.
pub const SESSION_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Directory for a session started at `started`.
pub fn session_dir<Tz>(root: &Path, started: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    root.join(started.format(SESSION_DIR_FORMAT).to_string())
}

/// Create the session directory if it does not exist yet.
pub fn create_session_dir<Tz>(root: &Path, started: &DateTime<Tz>) -> io::Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let dir = session_dir(root, started);
    fs::create_dir_all(&dir)?;
    debug!(dir = %dir.display(), "Session directory ready");
    Ok(dir)
}

/// Path of segment `index`: `video_<index>.<extension>`.
pub fn segment_path(dir: &Path, index: u64, extension: &str) -> PathBuf {
    dir.join(format!("video_{index}.{extension}"))
}
