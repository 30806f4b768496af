use std::cell::Cell;
use std::thread;
use std::time::Duration;

use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventType, CGKeyCode, CGMouseButton};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::window::{
    create_image, kCGNullWindowID, kCGWindowImageNominalResolution, kCGWindowListOptionOnScreenOnly,
};
use tracing::debug;

use crate::error::{ActionError, CollaboratorError};
use crate::types::*;
use super::{while_held, ActionSink, FrameSource, Platform};

// macOS virtual key codes (Carbon kVK_*) for the keys the hunt loop sends
fn virtual_key_code(key: &str) -> Option<CGKeyCode> {
    let code = match key.to_lowercase().as_str() {
        "0" => 29,
        "1" => 18,
        "2" => 19,
        "3" => 20,
        "4" => 21,
        "5" => 23,
        "6" => 22,
        "7" => 26,
        "8" => 28,
        "9" => 25,
        "f1" => 122,
        "f2" => 120,
        "f3" => 99,
        "f4" => 118,
        "f5" => 96,
        "f6" => 97,
        "enter" | "return" => 36,
        "escape" | "esc" => 53,
        "tab" => 48,
        "space" => 49,
        _ => return None,
    };
    Some(code)
}

const CLICK_HOLD: Duration = Duration::from_millis(15);
const KEY_HOLD: Duration = Duration::from_millis(10);
const DRAG_STEP: Duration = Duration::from_millis(16);

pub struct DarwinPlatform;

impl DarwinPlatform {
    pub fn new() -> Self {
        DarwinPlatform
    }
}

impl Platform for DarwinPlatform {
    fn name(&self) -> &'static str {
        "darwin"
    }

    fn frame_source(&self) -> Box<dyn FrameSource> {
        Box::new(DarwinFrameSource)
    }

    fn action_sink(&self) -> Box<dyn ActionSink> {
        Box::new(DarwinActionSink)
    }
}

struct DarwinFrameSource;

impl FrameSource for DarwinFrameSource {
    fn capture(&mut self, rect: CaptureRect) -> Result<Capture, CollaboratorError> {
        let cg_rect = CGRect::new(
            &CGPoint::new(rect.l as f64, rect.t as f64),
            &CGSize::new(rect.w as f64, rect.h as f64),
        );
        let image = create_image(
            cg_rect,
            kCGWindowListOptionOnScreenOnly,
            kCGNullWindowID,
            kCGWindowImageNominalResolution,
        )
        .ok_or_else(|| {
            CollaboratorError::Capture(format!(
                "CGWindowListCreateImage returned nothing for {:?} (screen recording permission?)",
                rect
            ))
        })?;

        let cf_data = image.data();
        Ok(Capture {
            data: cf_data.bytes().to_vec(),
            width: image.width() as u32,
            height: image.height() as u32,
            bytes_per_row: image.bytes_per_row() as u32,
        })
    }
}

struct DarwinActionSink;

fn event_source() -> Result<CGEventSource, String> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|_| "failed to create event source".to_string())
}

fn mouse_event(
    source: &CGEventSource,
    kind: CGEventType,
    at: Point,
    button: CGMouseButton,
) -> Result<CGEvent, String> {
    CGEvent::new_mouse_event(source.clone(), kind, CGPoint::new(at.x as f64, at.y as f64), button)
        .map_err(|_| "failed to create mouse event".to_string())
}

impl ActionSink for DarwinActionSink {
    fn click(&mut self, at: Point) -> Result<(), ActionError> {
        let fail = |reason: String| ActionError::Click { at, reason };
        let source = event_source().map_err(fail)?;

        mouse_event(&source, CGEventType::LeftMouseDown, at, CGMouseButton::Left)
            .map_err(fail)?
            .post(CGEventTapLocation::HID);
        thread::sleep(CLICK_HOLD);
        mouse_event(&source, CGEventType::LeftMouseUp, at, CGMouseButton::Left)
            .map_err(fail)?
            .post(CGEventTapLocation::HID);
        thread::sleep(CLICK_HOLD);
        Ok(())
    }

    fn key(&mut self, key: &str) -> Result<(), ActionError> {
        let fail = |reason: String| ActionError::Key { key: key.to_string(), reason };
        let code = virtual_key_code(key).ok_or_else(|| fail("no virtual key code".into()))?;
        let source = event_source().map_err(fail)?;

        for down in [true, false] {
            CGEvent::new_keyboard_event(source.clone(), code, down)
                .map_err(|_| fail("failed to create keyboard event".into()))?
                .post(CGEventTapLocation::HID);
            thread::sleep(KEY_HOLD);
        }
        Ok(())
    }

    fn drag(&mut self, from: Point, to: Point, duration: Duration) -> Result<(), ActionError> {
        let fail = |reason: String| ActionError::Drag { from, to, reason };
        let source = event_source().map_err(fail)?;

        mouse_event(&source, CGEventType::RightMouseDown, from, CGMouseButton::Right)
            .map_err(fail)?
            .post(CGEventTapLocation::HID);

        let steps = (duration.as_millis() / DRAG_STEP.as_millis()).max(1) as i32;
        let last = Cell::new(from);
        while_held(
            || {
                for i in 1..=steps {
                    let at = Point::new(
                        from.x + (to.x - from.x) * i / steps,
                        from.y + (to.y - from.y) * i / steps,
                    );
                    mouse_event(&source, CGEventType::RightMouseDragged, at, CGMouseButton::Right)?
                        .post(CGEventTapLocation::HID);
                    last.set(at);
                    thread::sleep(DRAG_STEP);
                }
                Ok(())
            },
            || {
                mouse_event(&source, CGEventType::RightMouseUp, last.get(), CGMouseButton::Right)
                    .map(|up| up.post(CGEventTapLocation::HID))
            },
        )
        .map_err(fail)?;
        debug!("drag {} -> {} in {} steps", from, to, steps);
        Ok(())
    }
}

