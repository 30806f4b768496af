//! Boolean screen probes: the target health bar, the death dialog and
//! the companion ("pet") card.
//!
//! Each probe captures a small fixed region and classifies pixels by
//! brightness and hue. The classifiers are plain functions over a
//! [`Capture`] so they can be exercised without a screen.

use tracing::debug;

use crate::error::CollaboratorError;
use crate::platform::FrameSource;
use crate::types::{Capture, CaptureRect, CombatIndicator, Point};

pub trait SignalProbes: Send {
    fn combat_indicator(&mut self) -> Result<CombatIndicator, CollaboratorError>;
    fn incapacitated(&mut self) -> Result<bool, CollaboratorError>;
    /// Whether the last click selected a companion instead of a hostile.
    fn pet_card(&mut self) -> Result<bool, CollaboratorError> {
        Ok(false)
    }
}

/// Screen regions the probes look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRegions {
    pub health_bar: CaptureRect,
    pub death_dialog: CaptureRect,
    pub pet_card: CaptureRect,
}

impl ProbeRegions {
    pub fn around(center: Point) -> Self {
        Self {
            health_bar: CaptureRect::new(600, 20, 720, 80),
            death_dialog: CaptureRect::new(200, 100, 1520, 880),
            pet_card: CaptureRect::new(center.x - 150, 10, 300, 80),
        }
    }
}

const RED_LIVE_THRESHOLD: u64 = 10;
const BAR_DARK_THRESHOLD: u64 = 100;
const BAR_BRIGHT_THRESHOLD: u64 = 50;

fn gray(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// HSV on the 0..180 / 0..255 / 0..255 scale.
fn hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max == 0.0 { 0.0 } else { 255.0 * delta / max };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }
    (h / 2.0, s, max)
}

fn is_red(r: u8, g: u8, b: u8) -> bool {
    let (h, s, v) = hsv(r, g, b);
    (h <= 15.0 || h >= 165.0) && s >= 50.0 && v >= 50.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthBarStats {
    pub red: u64,
    pub dark: u64,
    pub bright: u64,
}

pub fn health_bar_stats(cap: &Capture) -> HealthBarStats {
    let mut stats = HealthBarStats::default();
    for (r, g, b) in cap.pixels() {
        if is_red(r, g, b) {
            stats.red += 1;
        }
        let l = gray(r, g, b);
        if l < 100.0 {
            stats.dark += 1;
        } else if l > 150.0 {
            stats.bright += 1;
        }
    }
    stats
}

pub fn classify_health_bar(stats: HealthBarStats) -> CombatIndicator {
    let live = stats.red > RED_LIVE_THRESHOLD;
    let bar = stats.dark > BAR_DARK_THRESHOLD || stats.bright > BAR_BRIGHT_THRESHOLD || live;
    match (bar, live) {
        (true, true) => CombatIndicator::IndicatorVisibleWithLiveSignal,
        (true, false) => CombatIndicator::IndicatorVisibleNoLiveSignal,
        // A few red pixels without any bar chrome still mean something is alive.
        (false, _) if stats.red > 0 => CombatIndicator::IndicatorVisibleWithLiveSignal,
        (false, _) => CombatIndicator::NoIndicatorVisible,
    }
}

/// Dark overlay with some bright text: the death confirmation dialog.
pub fn looks_like_death_dialog(cap: &Capture) -> bool {
    let total = cap.pixel_count();
    if total == 0 {
        return false;
    }
    let (mut very_dark, mut dark, mut bright) = (0u64, 0u64, 0u64);
    for (r, g, b) in cap.pixels() {
        let l = gray(r, g, b);
        if l < 60.0 {
            very_dark += 1;
        }
        if l < 100.0 {
            dark += 1;
        } else if l > 150.0 {
            bright += 1;
        }
    }
    let total = total as f64;
    let has_dark_area = very_dark as f64 / total > 0.08 || dark as f64 / total > 0.2;
    has_dark_area && bright as f64 / total > 0.005
}

/// Companion cards are darker than hostile health bars.
pub fn looks_like_pet_card(cap: &Capture) -> bool {
    let total = cap.pixel_count();
    if total == 0 {
        return false;
    }
    let dark = cap.pixels().filter(|&(r, g, b)| gray(r, g, b) < 50.0).count();
    dark as f64 / total as f64 > 0.3
}

/// Probes backed by screen captures.
pub struct PixelProbes {
    source: Box<dyn FrameSource>,
    regions: ProbeRegions,
}

impl PixelProbes {
    pub fn new(source: Box<dyn FrameSource>, regions: ProbeRegions) -> Self {
        Self { source, regions }
    }
}

impl SignalProbes for PixelProbes {
    fn combat_indicator(&mut self) -> Result<CombatIndicator, CollaboratorError> {
        let cap = self.source.capture(self.regions.health_bar).map_err(as_probe_error)?;
        let stats = health_bar_stats(&cap);
        let indicator = classify_health_bar(stats);
        debug!(red = stats.red, dark = stats.dark, bright = stats.bright, "health bar {:?}", indicator);
        Ok(indicator)
    }

    fn incapacitated(&mut self) -> Result<bool, CollaboratorError> {
        let cap = self.source.capture(self.regions.death_dialog).map_err(as_probe_error)?;
        let dead = looks_like_death_dialog(&cap);
        if dead {
            save_debug_capture("death", &cap);
        }
        Ok(dead)
    }

    fn pet_card(&mut self) -> Result<bool, CollaboratorError> {
        let cap = self.source.capture(self.regions.pet_card).map_err(as_probe_error)?;
        let pet = looks_like_pet_card(&cap);
        if pet {
            save_debug_capture("pet", &cap);
        }
        Ok(pet)
    }
}

fn as_probe_error(e: CollaboratorError) -> CollaboratorError {
    match e {
        CollaboratorError::Capture(msg) => CollaboratorError::Probe(msg),
        other => other,
    }
}

#[cfg(feature = "debug-capture")]
fn save_debug_capture(kind: &str, cap: &Capture) {
    let dir = std::path::Path::new("logs").join("captures");
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let img = image::RgbaImage::from_fn(cap.width, cap.height, |x, y| {
        let (r, g, b) = cap.rgb(x, y);
        image::Rgba([r, g, b, 255])
    });
    let path = dir.join(format!("{}-{}.png", kind, chrono::Local::now().format("%H%M%S%.3f")));
    if let Err(e) = img.save(&path) {
        tracing::warn!("failed to save {}: {}", path.display(), e);
    }
}

#[cfg(not(feature = "debug-capture"))]
fn save_debug_capture(_kind: &str, _cap: &Capture) {}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [20, 20, 200, 255]; // BGRA
    const BLACK: [u8; 4] = [10, 10, 10, 255];
    const WHITE: [u8; 4] = [240, 240, 240, 255];
    const MID: [u8; 4] = [128, 128, 128, 255];

    /// Capture with the first `n` pixels painted `paint` over `base`.
    fn painted(w: u32, h: u32, base: [u8; 4], paint: [u8; 4], n: usize) -> Capture {
        let mut cap = Capture::filled(w, h, base);
        for px in cap.data.chunks_mut(4).take(n) {
            px.copy_from_slice(&paint);
        }
        cap
    }

    #[test]
    fn hsv_of_pure_red_and_green() {
        let (h, s, v) = hsv(255, 0, 0);
        assert_eq!((h, s, v), (0.0, 255.0, 255.0));
        let (h, _, _) = hsv(0, 255, 0);
        assert_eq!(h, 60.0);
        assert!(is_red(200, 20, 20));
        assert!(!is_red(20, 200, 20));
        assert!(!is_red(60, 40, 40)); // too desaturated
    }

    #[test]
    fn flat_gray_shows_no_indicator() {
        let stats = health_bar_stats(&Capture::filled(72, 8, MID));
        assert_eq!(classify_health_bar(stats), CombatIndicator::NoIndicatorVisible);
    }

    #[test]
    fn red_bar_is_live() {
        let cap = painted(72, 8, BLACK, RED, 200);
        assert_eq!(
            classify_health_bar(health_bar_stats(&cap)),
            CombatIndicator::IndicatorVisibleWithLiveSignal
        );
    }

    #[test]
    fn empty_bar_is_not_live() {
        let cap = painted(72, 8, MID, BLACK, 300);
        assert_eq!(
            classify_health_bar(health_bar_stats(&cap)),
            CombatIndicator::IndicatorVisibleNoLiveSignal
        );
    }

    #[test]
    fn stray_red_without_chrome_counts_as_live() {
        let cap = painted(72, 8, MID, RED, 3);
        assert_eq!(
            classify_health_bar(health_bar_stats(&cap)),
            CombatIndicator::IndicatorVisibleWithLiveSignal
        );
    }

    #[test]
    fn death_dialog_needs_dark_area_and_text() {
        // 30% black, 1% white, rest mid gray
        let mut cap = painted(100, 100, MID, BLACK, 3000);
        assert!(!looks_like_death_dialog(&cap));
        for px in cap.data.chunks_mut(4).skip(5000).take(100) {
            px.copy_from_slice(&WHITE);
        }
        assert!(looks_like_death_dialog(&cap));
        assert!(!looks_like_death_dialog(&Capture::filled(100, 100, MID)));
    }

    #[test]
    fn pet_card_threshold() {
        assert!(looks_like_pet_card(&painted(10, 10, MID, BLACK, 31)));
        assert!(!looks_like_pet_card(&painted(10, 10, MID, BLACK, 30)));
    }
}
