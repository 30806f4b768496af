use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::types::{CaptureRect, Point};

/// Zone radius presets, named after the weapon reach they suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZonePreset {
    Sword,
    Spear,
    Bow,
    Custom,
}

impl ZonePreset {
    pub const ALL: [ZonePreset; 4] = [ZonePreset::Sword, ZonePreset::Spear, ZonePreset::Bow, ZonePreset::Custom];

    /// Fixed radius, or `None` for `Custom`.
    pub fn radius(self) -> Option<f64> {
        match self {
            ZonePreset::Sword => Some(150.0),
            ZonePreset::Spear => Some(300.0),
            ZonePreset::Bow => Some(500.0),
            ZonePreset::Custom => None,
        }
    }

    pub fn next(self) -> ZonePreset {
        match self {
            ZonePreset::Sword => ZonePreset::Spear,
            ZonePreset::Spear => ZonePreset::Bow,
            ZonePreset::Bow => ZonePreset::Custom,
            ZonePreset::Custom => ZonePreset::Sword,
        }
    }
}

impl fmt::Display for ZonePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZonePreset::Sword => "sword",
            ZonePreset::Spear => "spear",
            ZonePreset::Bow => "bow",
            ZonePreset::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for ZonePreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ZonePreset::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownPreset(s.to_string()))
    }
}

/// What to do once the incapacitation probe fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathResponse {
    /// Click the respawn button, settle, then park the run until the operator resumes.
    RespawnTown,
    /// Click the wait-for-help button, use a resurrection item, resume automatically.
    WaitHelp,
    /// Do nothing; stay suspended until the indicator disappears.
    Manual,
}

impl fmt::Display for DeathResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeathResponse::RespawnTown => "respawn_town",
            DeathResponse::WaitHelp => "wait_help",
            DeathResponse::Manual => "manual",
        };
        f.write_str(s)
    }
}

impl FromStr for DeathResponse {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "respawn_town" | "respawn" => Ok(DeathResponse::RespawnTown),
            "wait_help" | "wait" => Ok(DeathResponse::WaitHelp),
            "manual" | "none" => Ok(DeathResponse::Manual),
            _ => Err(ConfigError::UnknownDeathResponse(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl Default for Margins {
    fn default() -> Self {
        Self { top: 100, bottom: 200, left: 100, right: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: i32,
    pub height: i32,
    pub margins: Margins,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self { width: 1920, height: 1080, margins: Margins::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    pub overlap_threshold: f32,
    pub max_results: usize,
    /// Vertical offset from box center to the click point.
    pub action_offset_y: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { confidence_threshold: 0.25, overlap_threshold: 0.45, max_results: 300, action_offset_y: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub preset: ZonePreset,
    pub custom_radius: f64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self { preset: ZonePreset::Spear, custom_radius: 300.0 }
    }
}

impl ZoneConfig {
    pub fn radius(&self) -> f64 {
        self.preset.radius().unwrap_or(self.custom_radius)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub reidentify_radius: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { reidentify_radius: 100.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    /// Seconds without an in-zone detection before the first move.
    pub hunting_delay: f64,
    /// Seconds between consecutive moves.
    pub move_interval: f64,
    pub reach_distance: f64,
    pub min_movement_distance: f64,
    /// Distance kept from the capture region's edges.
    pub edge_inset: i32,
    pub attempts_per_direction: u32,
    pub moves_per_viewpoint_adjust: u32,
    pub viewpoint_offset: i32,
    pub viewpoint_drag_secs: f64,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            hunting_delay: 3.0,
            move_interval: 0.5,
            reach_distance: 200.0,
            min_movement_distance: 150.0,
            edge_inset: 50,
            attempts_per_direction: 2,
            moves_per_viewpoint_adjust: 2,
            viewpoint_offset: 240,
            viewpoint_drag_secs: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeathConfig {
    pub response: DeathResponse,
    pub grace_secs: f64,
    pub settle_secs: f64,
    pub res_scroll_slot: String,
    pub inventory_key: String,
    pub game_key: String,
    pub check_pet_card: bool,
}

impl Default for DeathConfig {
    fn default() -> Self {
        Self {
            response: DeathResponse::RespawnTown,
            grace_secs: 5.0,
            settle_secs: 3.0,
            res_scroll_slot: "0".into(),
            inventory_key: "f4".into(),
            game_key: "f1".into(),
            check_pet_card: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub target_fps: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { target_fps: 30.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub sequence: String,
    pub key_delay: f64,
    pub cycle_delay: f64,
    pub idle_poll: f64,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self { sequence: "123145".into(), key_delay: 0.1, cycle_delay: 0.4, idle_poll: 0.1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub screen: ScreenConfig,
    pub detector: DetectorConfig,
    pub zone: ZoneConfig,
    pub tracker: TrackerConfig,
    pub explore: ExploreConfig,
    pub death: DeathConfig,
    #[serde(rename = "loop")]
    pub tick: LoopConfig,
    pub keys: KeyConfig,
}

/// Seconds to a `Duration`. Negative and NaN give zero, overflow saturates;
/// `Config::validate` rejects both before any of them reach here.
pub(crate) fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s.max(0.0)).unwrap_or(Duration::MAX)
}

impl Config {
    /// Load from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("failed to save config {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("failed to serialize config: {}", e),
        }
    }

    /// The operator's fixed reference point.
    pub fn center(&self) -> Point {
        Point::new(self.screen.width / 2, self.screen.height / 2)
    }

    /// Screen sub-region handed to the detector.
    pub fn capture_rect(&self) -> CaptureRect {
        let m = &self.screen.margins;
        CaptureRect::new(
            m.left,
            m.top,
            self.screen.width - m.left - m.right,
            self.screen.height - m.top - m.bottom,
        )
    }

    /// Capture region shrunk by the exploration edge inset.
    pub fn movement_bounds(&self) -> CaptureRect {
        let r = self.capture_rect();
        let i = self.explore.edge_inset;
        CaptureRect::new(r.l + i, r.t + i, r.w - 2 * i, r.h - 2 * i)
    }

    pub fn tick_period(&self) -> Duration {
        secs(1.0 / self.tick.target_fps)
    }

    /// Set a custom radius from the operator surface: 0 disables hunting,
    /// otherwise it must lie within 50..=800.
    pub fn set_custom_radius(&mut self, radius: u32) -> Result<(), ConfigError> {
        if radius != 0 && !(50..=800).contains(&radius) {
            return Err(ConfigError::CustomRadiusOutOfRange(radius));
        }
        self.zone.preset = ZonePreset::Custom;
        self.zone.custom_radius = radius as f64;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick.target_fps > 0.0) {
            return Err(ConfigError::NonPositiveCadence(self.tick.target_fps));
        }
        let period = 1.0 / self.tick.target_fps;
        for (field, value) in [
            ("loop.target_fps", period),
            ("explore.hunting_delay", self.explore.hunting_delay),
            ("explore.move_interval", self.explore.move_interval),
            ("explore.viewpoint_drag_secs", self.explore.viewpoint_drag_secs),
            ("death.grace_secs", self.death.grace_secs),
            ("death.settle_secs", self.death.settle_secs),
            ("keys.key_delay", self.keys.key_delay),
            ("keys.cycle_delay", self.keys.cycle_delay),
            ("keys.idle_poll", self.keys.idle_poll),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidDuration { field, secs: value });
            }
        }
        if self.zone.custom_radius < 0.0 {
            return Err(ConfigError::NegativeRadius(self.zone.custom_radius));
        }

        let rect = self.capture_rect();
        if rect.w <= 0 || rect.h <= 0 {
            return Err(ConfigError::EmptyCaptureRegion { width: rect.w, height: rect.h });
        }
        let bounds = self.movement_bounds();
        if bounds.w <= 0 || bounds.h <= 0 {
            return Err(ConfigError::EmptyCaptureRegion { width: bounds.w, height: bounds.h });
        }

        let ex = &self.explore;
        if ex.reach_distance <= 0.0 {
            return Err(ConfigError::NonPositive("explore.reach_distance"));
        }
        if ex.attempts_per_direction == 0 {
            return Err(ConfigError::NonPositive("explore.attempts_per_direction"));
        }
        if ex.moves_per_viewpoint_adjust == 0 {
            return Err(ConfigError::NonPositive("explore.moves_per_viewpoint_adjust"));
        }
        if ex.move_interval <= 0.0 {
            return Err(ConfigError::NonPositive("explore.move_interval"));
        }

        // Every quadrant falls back to its own corner, so the nearest one bounds the floor.
        let center = self.center();
        let nearest_corner = [
            Point::new(bounds.l, bounds.t),
            Point::new(bounds.right(), bounds.t),
            Point::new(bounds.l, bounds.bottom()),
            Point::new(bounds.right(), bounds.bottom()),
        ]
        .into_iter()
        .map(|c| c.distance_to(center))
        .fold(f64::INFINITY, f64::min);
        if ex.min_movement_distance > nearest_corner {
            return Err(ConfigError::UnreachableMovementFloor {
                min: ex.min_movement_distance,
                corner: nearest_corner,
            });
        }

        let keys = &self.keys;
        if keys.sequence.trim().is_empty() {
            return Err(ConfigError::EmptyKeySequence);
        }
        if keys.key_delay <= 0.0 || keys.cycle_delay <= 0.0 || keys.idle_poll <= 0.0 {
            return Err(ConfigError::NonPositive("keys delays"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.center(), Point::new(960, 540));
        assert_eq!(config.capture_rect(), CaptureRect::new(100, 100, 1720, 780));
        assert_eq!(config.zone.radius(), 300.0);
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut config = Config::default();
        config.tick.target_fps = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::NonPositiveCadence(_))));
    }

    #[test]
    fn out_of_range_durations_are_rejected_not_panicking() {
        let mut config = Config::default();
        config.tick.target_fps = 1e-30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration { field: "loop.target_fps", .. })
        ));

        let mut config = Config::default();
        config.explore.hunting_delay = 1e30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration { field: "explore.hunting_delay", .. })
        ));

        let mut config = Config::default();
        config.death.grace_secs = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDuration { .. })));

        assert_eq!(secs(1e30), Duration::MAX);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn negative_radius_is_rejected_but_zero_is_allowed() {
        let mut config = Config::default();
        config.zone.preset = ZonePreset::Custom;
        config.zone.custom_radius = 0.0;
        config.validate().unwrap();
        config.zone.custom_radius = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::NegativeRadius(_))));
    }

    #[test]
    fn unreachable_floor_is_rejected() {
        let mut config = Config::default();
        config.explore.min_movement_distance = 5000.0;
        assert!(matches!(config.validate(), Err(ConfigError::UnreachableMovementFloor { .. })));
    }

    #[test]
    fn custom_radius_range() {
        let mut config = Config::default();
        assert!(config.set_custom_radius(20).is_err());
        config.set_custom_radius(0).unwrap();
        assert_eq!(config.zone.radius(), 0.0);
        config.set_custom_radius(450).unwrap();
        assert_eq!(config.zone.preset, ZonePreset::Custom);
        assert_eq!(config.zone.radius(), 450.0);
    }

    #[test]
    fn presets_cycle_back_to_start() {
        let mut p = ZonePreset::Sword;
        for _ in 0..4 {
            p = p.next();
        }
        assert_eq!(p, ZonePreset::Sword);
        assert_eq!("BOW".parse::<ZonePreset>().unwrap(), ZonePreset::Bow);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"zone":{"preset":"bow"},"loop":{"target_fps":10}}"#).unwrap();
        assert_eq!(config.zone.radius(), 500.0);
        assert_eq!(config.tick.target_fps, 10.0);
        assert_eq!(config.keys.sequence, "123145");
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = Config::load(Path::new("/nonexistent/hunter.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn death_response_parses_aliases() {
        assert_eq!("wait-help".parse::<DeathResponse>().unwrap(), DeathResponse::WaitHelp);
        assert_eq!("respawn".parse::<DeathResponse>().unwrap(), DeathResponse::RespawnTown);
        assert!("explode".parse::<DeathResponse>().is_err());
    }
}
