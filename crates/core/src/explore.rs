//! Repositioning when nothing is in the zone.
//!
//! The planner sweeps eight compass directions (0° is east, y grows down),
//! spending a fixed number of moves on each before turning 45°. Every few
//! moves it also asks for a camera drag so the sweep is not stuck looking
//! at the same ring of ground.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{secs, Config};
use crate::types::{CaptureRect, Point};

const DIRECTIONS: u32 = 8;
const STEP_DEGREES: u32 = 45;

/// A press-drag-release camera gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewpointDrag {
    pub from: Point,
    pub to: Point,
    pub duration: Duration,
}

pub struct ExplorationPlanner {
    center: Point,
    bounds: CaptureRect,
    reach: f64,
    min_distance: f64,
    attempts_per_direction: u32,
    moves_per_adjust: u32,
    viewpoint_offset: i32,
    drag_duration: Duration,
    hunting_delay: Duration,
    move_interval: Duration,

    direction: u32,
    attempts: u32,
    moves_since_adjust: u32,
    last_target_seen_at: Option<Instant>,
    last_move_at: Option<Instant>,
    next_drag_left: bool,
}

impl ExplorationPlanner {
    pub fn new(config: &Config) -> Self {
        let ex = &config.explore;
        Self {
            center: config.center(),
            bounds: config.movement_bounds(),
            reach: ex.reach_distance,
            min_distance: ex.min_movement_distance,
            attempts_per_direction: ex.attempts_per_direction.max(1),
            moves_per_adjust: ex.moves_per_viewpoint_adjust.max(1),
            viewpoint_offset: ex.viewpoint_offset,
            drag_duration: secs(ex.viewpoint_drag_secs),
            hunting_delay: secs(ex.hunting_delay),
            move_interval: secs(ex.move_interval),
            direction: 0,
            attempts: 0,
            moves_since_adjust: 0,
            last_target_seen_at: None,
            last_move_at: None,
            next_drag_left: true,
        }
    }

    /// Current direction in degrees.
    pub fn direction(&self) -> u32 {
        self.direction * STEP_DEGREES
    }

    pub fn attempts_in_direction(&self) -> u32 {
        self.attempts
    }

    pub fn moves_since_adjust(&self) -> u32 {
        self.moves_since_adjust
    }

    pub fn last_target_seen_at(&self) -> Option<Instant> {
        self.last_target_seen_at
    }

    /// Gate [`next_move`](Self::next_move) on time. The first empty tick only
    /// starts the clock; moves begin once the hunting delay has passed and
    /// are then spaced by the move interval.
    pub fn plan(&mut self, now: Instant) -> Option<Point> {
        let Some(since) = self.last_target_seen_at else {
            debug!("no target, waiting {:?} before exploring", self.hunting_delay);
            self.last_target_seen_at = Some(now);
            return None;
        };
        if now.saturating_duration_since(since) < self.hunting_delay {
            return None;
        }
        if let Some(last) = self.last_move_at {
            if now.saturating_duration_since(last) < self.move_interval {
                return None;
            }
        }
        self.last_move_at = Some(now);
        Some(self.next_move())
    }

    /// The next reposition point. Always at least the minimum movement
    /// distance from center.
    pub fn next_move(&mut self) -> Point {
        let angle = self.direction();
        let rad = (angle as f64).to_radians();
        let raw = Point::new(
            self.center.x + (self.reach * rad.cos()).round() as i32,
            self.center.y + (self.reach * rad.sin()).round() as i32,
        );
        let clamped = Point::new(
            raw.x.clamp(self.bounds.l, self.bounds.right()),
            raw.y.clamp(self.bounds.t, self.bounds.bottom()),
        );

        let point = if clamped.distance_to(self.center) < self.min_distance {
            let corner = self.corner_for(angle);
            debug!("move {} too short, using corner {}", clamped, corner);
            corner
        } else {
            clamped
        };

        self.attempts += 1;
        if self.attempts >= self.attempts_per_direction {
            self.attempts = 0;
            self.direction = (self.direction + 1) % DIRECTIONS;
            debug!("exploring towards {}°", self.direction());
        }
        info!("explore {} at {}°", point, angle);
        point
    }

    /// Count a completed move. Every `moves_per_viewpoint_adjust` moves this
    /// returns a horizontal drag, alternating left and right.
    pub fn maybe_adjust_viewpoint(&mut self) -> Option<ViewpointDrag> {
        self.moves_since_adjust += 1;
        if self.moves_since_adjust < self.moves_per_adjust {
            return None;
        }
        self.moves_since_adjust = 0;
        let dx = if self.next_drag_left { -self.viewpoint_offset } else { self.viewpoint_offset };
        self.next_drag_left = !self.next_drag_left;
        let drag = ViewpointDrag {
            from: self.center,
            to: self.center.offset(dx, 0),
            duration: self.drag_duration,
        };
        info!("adjusting viewpoint {} -> {}", drag.from, drag.to);
        Some(drag)
    }

    /// An in-zone detection was seen. The sweep keeps its direction.
    pub fn confirm_detection(&mut self) {
        self.attempts = 0;
        self.moves_since_adjust = 0;
        self.last_target_seen_at = None;
        self.last_move_at = None;
    }

    fn corner_for(&self, angle: u32) -> Point {
        let b = &self.bounds;
        match angle % 360 {
            0..=89 => Point::new(b.right(), b.bottom()),
            90..=179 => Point::new(b.l, b.bottom()),
            180..=269 => Point::new(b.l, b.t),
            _ => Point::new(b.right(), b.t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn planner() -> ExplorationPlanner {
        ExplorationPlanner::new(&Config::default())
    }

    #[test]
    fn waits_for_hunting_delay_then_moves_and_turns() {
        let mut p = planner();
        let t0 = Instant::now();
        assert_eq!(p.plan(t0), None);
        assert_eq!(p.last_target_seen_at(), Some(t0));
        assert_eq!(p.plan(t0 + Duration::from_secs(2)), None);

        let first = p.plan(t0 + Duration::from_millis(3100)).expect("first move");
        assert!(first.distance_to(Point::new(960, 540)) >= 150.0);
        assert_eq!(p.direction(), 0);

        // Too soon after the first move.
        assert_eq!(p.plan(t0 + Duration::from_millis(3300)), None);
        assert!(p.plan(t0 + Duration::from_millis(3700)).is_some());
        assert_eq!(p.direction(), 45);
    }

    #[test]
    fn east_move_reaches_out_from_center() {
        let mut p = planner();
        assert_eq!(p.next_move(), Point::new(1160, 540));
        assert_eq!(p.next_move(), Point::new(1160, 540));
        // 45°: south-east
        assert_eq!(p.next_move(), Point::new(1101, 681));
    }

    #[test]
    fn full_sweep_returns_to_start() {
        let mut p = planner();
        let start = p.direction();
        let mut seen = Vec::new();
        for _ in 0..8 * 2 {
            seen.push(p.direction());
            p.next_move();
        }
        assert_eq!(p.direction(), start);
        seen.dedup();
        assert_eq!(seen, vec![0, 45, 90, 135, 180, 225, 270, 315]);
    }

    #[test]
    fn short_reach_falls_back_to_quadrant_corner() {
        let mut config = Config::default();
        config.explore.reach_distance = 50.0;
        let bounds = config.movement_bounds();
        let mut p = ExplorationPlanner::new(&config);
        let corners: Vec<Point> = (0..8).map(|_| { let c = p.next_move(); p.next_move(); c }).collect();
        assert_eq!(corners[0], Point::new(bounds.right(), bounds.bottom()));
        assert_eq!(corners[2], Point::new(bounds.l, bounds.bottom()));
        assert_eq!(corners[4], Point::new(bounds.l, bounds.t));
        assert_eq!(corners[6], Point::new(bounds.right(), bounds.t));
    }

    #[test]
    fn viewpoint_drags_alternate() {
        let mut p = planner();
        assert_eq!(p.maybe_adjust_viewpoint(), None);
        let left = p.maybe_adjust_viewpoint().expect("second move adjusts");
        assert_eq!(left.to, Point::new(720, 540));
        assert_eq!(p.moves_since_adjust(), 0);
        assert_eq!(p.maybe_adjust_viewpoint(), None);
        let right = p.maybe_adjust_viewpoint().expect("fourth move adjusts");
        assert_eq!(right.to, Point::new(1200, 540));
        assert_eq!(right.duration, Duration::from_millis(400));
    }

    #[test]
    fn detection_resets_counters_but_keeps_direction() {
        let mut p = planner();
        let t0 = Instant::now();
        p.plan(t0);
        for _ in 0..3 {
            p.next_move();
        }
        p.maybe_adjust_viewpoint();
        assert_eq!(p.direction(), 45);
        assert_eq!(p.attempts_in_direction(), 1);

        p.confirm_detection();
        assert_eq!(p.direction(), 45);
        assert_eq!(p.attempts_in_direction(), 0);
        assert_eq!(p.moves_since_adjust(), 0);
        assert_eq!(p.last_target_seen_at(), None);
    }

    proptest! {
        #[test]
        fn every_move_clears_the_floor(
            reach in 1.0f64..900.0,
            floor_frac in 0.0f64..=1.0,
            attempts in 1u32..4,
            steps in 1usize..40,
        ) {
            let mut config = Config::default();
            config.explore.reach_distance = reach;
            config.explore.attempts_per_direction = attempts;
            // The nearest corner of the default bounds is about 860px out.
            config.explore.min_movement_distance = 850.0 * floor_frac;
            prop_assume!(config.validate().is_ok());

            let center = config.center();
            let mut p = ExplorationPlanner::new(&config);
            for _ in 0..steps {
                let m = p.next_move();
                prop_assert!(m.distance_to(center) >= config.explore.min_movement_distance);
            }
        }
    }
}
