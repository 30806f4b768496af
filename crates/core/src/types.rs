use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Absolute screen coordinate in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(self, dx: i32, dy: i32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Screen-space rectangle to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRect {
    pub l: i32,
    pub t: i32,
    pub w: i32,
    pub h: i32,
}

impl CaptureRect {
    pub const fn new(l: i32, t: i32, w: i32, h: i32) -> Self {
        Self { l, t, w, h }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.l, self.t)
    }

    pub fn right(&self) -> i32 {
        self.l + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.t + self.h
    }
}

/// Raw screenshot pixel data (BGRA)
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl Capture {
    /// Solid-color capture, mostly useful for stubs and tests.
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&bgra);
        }
        Self { data, width, height, bytes_per_row: width * 4 }
    }

    /// (r, g, b) at pixel (x, y).
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let idx = (y * self.bytes_per_row + x * 4) as usize;
        (self.data[idx + 2], self.data[idx + 1], self.data[idx])
    }

    /// Iterate every pixel as (r, g, b), row by row.
    pub fn pixels(&self) -> impl Iterator<Item = (u8, u8, u8)> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| self.rgb(x, y)))
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Axis-aligned box in capture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Intersection over union.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One candidate object from the detector, valid for a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Box center in screen coordinates.
    pub screen_position: Point,
    /// Where a click should land to hit the object.
    pub action_position: Point,
}

impl Detection {
    /// Detection whose box is centered on `at`, for stubs and tests.
    pub fn at(at: Point, confidence: f32) -> Self {
        let (x, y) = (at.x as f32, at.y as f32);
        Self {
            bbox: BoundingBox { x1: x - 20.0, y1: y - 20.0, x2: x + 20.0, y2: y + 20.0 },
            confidence,
            screen_position: at,
            action_position: at,
        }
    }
}

/// The detection currently being engaged.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentTarget {
    pub detection: Detection,
    pub acquired_at: Instant,
}

/// Result of the combat-indicator probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatIndicator {
    NoIndicatorVisible,
    IndicatorVisibleWithLiveSignal,
    IndicatorVisibleNoLiveSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Paused = 2,
}

impl RunState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => RunState::Running,
            2 => RunState::Paused,
            _ => RunState::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathState {
    Alive,
    Incapacitated,
}

/// Discrete operator requests, from the TUI or the global hotkey listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Toggle,
    CycleZone,
    TestDeath,
    Quit,
}
