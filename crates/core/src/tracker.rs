//! Current-target identity and the combat lock.
//!
//! The lock is driven only by the combat-indicator probe. While it is held
//! the tracker never hands out a new target, it only re-anchors the one it
//! has. The lock is never raised without a target.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::probes::SignalProbes;
use crate::state::LockWriter;
use crate::types::{CombatIndicator, CurrentTarget, Detection};

pub struct TargetTracker {
    current: Option<CurrentTarget>,
    lock: LockWriter,
    locked_since: Option<Instant>,
    reidentify_radius: f64,
    switch_allowed: bool,
}

impl TargetTracker {
    pub fn new(lock: LockWriter, reidentify_radius: f64) -> Self {
        lock.set(false);
        Self {
            current: None,
            lock,
            locked_since: None,
            reidentify_radius,
            switch_allowed: true,
        }
    }

    pub fn current(&self) -> Option<&CurrentTarget> {
        self.current.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.get()
    }

    pub fn locked_since(&self) -> Option<Instant> {
        self.locked_since
    }

    /// Result of the most recent [`should_switch`](Self::should_switch).
    pub fn switch_allowed(&self) -> bool {
        self.switch_allowed
    }

    /// Per-tick targeting decision over zone-filtered detections.
    ///
    /// Locked: the current target is re-anchored to the nearest detection
    /// within the re-identification radius and returned as-is. With no
    /// target yet, the first detection is adopted without switching.
    /// Free: the first detection becomes the target.
    pub fn decide(
        &mut self,
        zone: &[Detection],
        probes: &mut dyn SignalProbes,
        now: Instant,
    ) -> Option<Detection> {
        if !self.should_switch(probes, now) {
            match self.current.as_mut() {
                Some(target) => {
                    let anchor = target.detection.screen_position;
                    let nearest = zone
                        .iter()
                        .map(|d| (d, d.screen_position.distance_to(anchor)))
                        .filter(|&(_, dist)| dist <= self.reidentify_radius)
                        .min_by(|a, b| a.1.total_cmp(&b.1));
                    if let Some((d, dist)) = nearest {
                        debug!("re-anchored target {} -> {} ({:.1}px)", anchor, d.screen_position, dist);
                        target.detection = d.clone();
                    }
                }
                None => {
                    let first = zone.first()?;
                    info!("engaged {} before selecting it, adopting as target", first.screen_position);
                    self.current = Some(CurrentTarget { detection: first.clone(), acquired_at: now });
                    self.engage_lock(now);
                }
            }
            return self.current.as_ref().map(|t| t.detection.clone());
        }

        match zone.first() {
            Some(d) => {
                self.set_target(d.clone(), now);
                Some(d.clone())
            }
            None => {
                self.clear_target();
                None
            }
        }
    }

    /// Query the combat indicator and update the lock. Returns whether a new
    /// target may be chosen and acted on. A failing probe counts as no indicator.
    pub fn should_switch(&mut self, probes: &mut dyn SignalProbes, now: Instant) -> bool {
        let indicator = probes.combat_indicator().unwrap_or_else(|e| {
            warn!("combat probe failed, treating as no indicator: {}", e);
            CombatIndicator::NoIndicatorVisible
        });

        self.switch_allowed = match indicator {
            CombatIndicator::IndicatorVisibleWithLiveSignal => {
                self.engage_lock(now);
                false
            }
            CombatIndicator::IndicatorVisibleNoLiveSignal | CombatIndicator::NoIndicatorVisible => {
                self.release_lock();
                true
            }
        };
        self.switch_allowed
    }

    pub fn set_target(&mut self, detection: Detection, now: Instant) {
        info!("target {} ({:.2})", detection.screen_position, detection.confidence);
        self.current = Some(CurrentTarget { detection, acquired_at: now });
        self.release_lock();
    }

    pub fn clear_target(&mut self) {
        if let Some(t) = self.current.take() {
            debug!("cleared target {}", t.detection.screen_position);
        }
        self.release_lock();
    }

    fn engage_lock(&mut self, now: Instant) {
        if self.current.is_none() || self.lock.get() {
            return;
        }
        self.lock.set(true);
        self.locked_since = Some(now);
        info!("combat lock on");
    }

    fn release_lock(&mut self) {
        if !self.lock.get() {
            return;
        }
        self.lock.set(false);
        self.locked_since = None;
        info!("combat lock off");
    }
}
