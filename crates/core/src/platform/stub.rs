use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ActionError, CollaboratorError};
use crate::types::*;
use super::{ActionSink, FrameSource, Platform};

/// Logs every call and captures flat mid-gray frames, which every probe reads as "nothing there".
pub struct StubPlatform;

impl Platform for StubPlatform {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn frame_source(&self) -> Box<dyn FrameSource> {
        Box::new(StubFrameSource)
    }

    fn action_sink(&self) -> Box<dyn ActionSink> {
        Box::new(StubActionSink)
    }
}

struct StubFrameSource;

impl FrameSource for StubFrameSource {
    fn capture(&mut self, rect: CaptureRect) -> Result<Capture, CollaboratorError> {
        if rect.w <= 0 || rect.h <= 0 {
            return Err(CollaboratorError::Capture(format!("empty rect {:?}", rect)));
        }
        debug!("capture({:?})", rect);
        Ok(Capture::filled(rect.w as u32, rect.h as u32, [128, 128, 128, 255]))
    }
}

struct StubActionSink;

impl ActionSink for StubActionSink {
    fn click(&mut self, at: Point) -> Result<(), ActionError> {
        info!("click{}", at);
        Ok(())
    }

    fn key(&mut self, key: &str) -> Result<(), ActionError> {
        debug!("key(\"{}\")", key);
        Ok(())
    }

    fn drag(&mut self, from: Point, to: Point, duration: Duration) -> Result<(), ActionError> {
        info!("drag{} -> {} over {:?}", from, to, duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_capture_matches_rect() {
        let mut src = StubPlatform.frame_source();
        let cap = src.capture(CaptureRect::new(0, 0, 4, 3)).unwrap();
        assert_eq!((cap.width, cap.height, cap.bytes_per_row), (4, 3, 16));
        assert_eq!(cap.rgb(3, 2), (128, 128, 128));
        assert!(src.capture(CaptureRect::new(0, 0, 0, 3)).is_err());
    }
}
