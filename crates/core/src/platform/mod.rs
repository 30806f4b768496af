pub mod stub;
pub mod hotkey;

#[cfg(target_os = "macos")]
pub mod darwin;

use std::time::Duration;

use crate::error::{ActionError, CollaboratorError};
use crate::logger;
use crate::types::*;

/// Supplies captures of screen sub-regions.
pub trait FrameSource: Send {
    fn capture(&mut self, rect: CaptureRect) -> Result<Capture, CollaboratorError>;
}

/// Synthetic input. Calls are fire-and-forget: callers log failures and move on.
pub trait ActionSink: Send {
    fn click(&mut self, at: Point) -> Result<(), ActionError>;
    fn key(&mut self, key: &str) -> Result<(), ActionError>;
    /// Press at `from`, move to `to` over `duration`, release.
    fn drag(&mut self, from: Point, to: Point, duration: Duration) -> Result<(), ActionError>;
}

/// Run `moves` while a button is held, then `release` it whether or not the
/// moves succeeded. The first error wins.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn while_held<T, E>(
    moves: impl FnOnce() -> Result<T, E>,
    release: impl FnOnce() -> Result<(), E>,
) -> Result<T, E> {
    let moved = moves();
    let released = release();
    let value = moved?;
    released?;
    Ok(value)
}

/// Platform-level factory. Every thread that needs input or capture gets its own handle.
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;
    fn frame_source(&self) -> Box<dyn FrameSource>;
    fn action_sink(&self) -> Box<dyn ActionSink>;
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Box<dyn Platform> {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Box::new(stub::StubPlatform);
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        return Box::new(darwin::DarwinPlatform::new());
    }
    #[cfg(not(target_os = "macos"))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Box::new(stub::StubPlatform);
    }
}
