use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CHUNK_SIZE, COMBO_LATENCY_BUFFER_MS, COMBO_MAX_MULTIPLIER, COMBO_MULTIPLIER_STEP,
    COMBO_THRESHOLDS, COMBO_TIMEOUT_MS, COOLDOWN_CHARM_PRICE, COOLDOWN_CHARM_STEP,
    DOUBLE_POINTS_DURATION_MS, DOUBLE_POINTS_MULTIPLIER, DOUBLE_POINTS_PRICE,
    FEVER_DURATION_MS, FEVER_MULTIPLIER, FEVER_THRESHOLD, FLOOD_FILL_CAP,
    INVISIBILITY_DURATION_MS, INVISIBILITY_PRICE, LEADERBOARD_SIZE, MAP_HEIGHT, MAP_WIDTH,
    MAX_COOLDOWN_REDUCTION, MAX_GUILD_BONUS, MINE_PENALTY, MINE_RATIO_THRESHOLD,
    PROGRESS_THRESHOLD, PROXIMITY_CELL_SIZE, SCAN_COOLDOWN_MS, SCAN_RADIUS,
    SESSION_END_COUNTDOWN_MS, SESSION_MAX_DURATION_MS, SESSION_RESTART_DELAY_MS,
    SHIELD_COOLDOWN_MS, SHIELD_DURATION_MS, SWEEP_COOLDOWN_MS, BASE_CELL_POINTS,
};
use crate::error::{EngineError, Result};
use crate::types::{ItemKind, Rect, SkillKind, Zone, ZoneType};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameConfig {
    pub width: i32,
    pub height: i32,
    pub chunk_size: i32,
    pub eager_generation: bool,
    pub flood_fill_cap: usize,
    /// Empty means the concentric default layout for the configured map size.
    pub zones: Vec<Zone>,

    pub session_max_duration_ms: u64,
    pub end_countdown_ms: u64,
    pub restart_delay_ms: u64,
    pub mine_ratio_threshold: f32,
    pub progress_threshold: f32,
    pub leaderboard_size: usize,

    pub combo_timeout_ms: u64,
    pub combo_latency_buffer_ms: u64,
    pub combo_thresholds: Vec<u32>,
    pub combo_multiplier_step: f32,
    pub combo_max_multiplier: f32,
    pub fever_threshold: u32,
    pub fever_duration_ms: u64,
    pub fever_multiplier: f32,

    pub base_cell_points: i64,
    pub mine_penalty: i64,
    pub max_guild_bonus: f32,

    pub scan_cooldown_ms: u64,
    pub scan_radius: i32,
    pub shield_cooldown_ms: u64,
    pub shield_duration_ms: u64,
    pub sweep_cooldown_ms: u64,

    pub double_points_duration_ms: u64,
    pub double_points_multiplier: f32,
    pub double_points_price: i64,
    pub invisibility_duration_ms: u64,
    pub invisibility_price: i64,
    pub cooldown_charm_step: f32,
    pub cooldown_charm_price: i64,
    pub max_cooldown_reduction: f32,

    pub proximity_cell_size: i32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: MAP_WIDTH,
            height: MAP_HEIGHT,
            chunk_size: CHUNK_SIZE,
            eager_generation: true,
            flood_fill_cap: FLOOD_FILL_CAP,
            zones: Vec::new(),
            session_max_duration_ms: SESSION_MAX_DURATION_MS,
            end_countdown_ms: SESSION_END_COUNTDOWN_MS,
            restart_delay_ms: SESSION_RESTART_DELAY_MS,
            mine_ratio_threshold: MINE_RATIO_THRESHOLD,
            progress_threshold: PROGRESS_THRESHOLD,
            leaderboard_size: LEADERBOARD_SIZE,
            combo_timeout_ms: COMBO_TIMEOUT_MS,
            combo_latency_buffer_ms: COMBO_LATENCY_BUFFER_MS,
            combo_thresholds: COMBO_THRESHOLDS.to_vec(),
            combo_multiplier_step: COMBO_MULTIPLIER_STEP,
            combo_max_multiplier: COMBO_MAX_MULTIPLIER,
            fever_threshold: FEVER_THRESHOLD,
            fever_duration_ms: FEVER_DURATION_MS,
            fever_multiplier: FEVER_MULTIPLIER,
            base_cell_points: BASE_CELL_POINTS,
            mine_penalty: MINE_PENALTY,
            max_guild_bonus: MAX_GUILD_BONUS,
            scan_cooldown_ms: SCAN_COOLDOWN_MS,
            scan_radius: SCAN_RADIUS,
            shield_cooldown_ms: SHIELD_COOLDOWN_MS,
            shield_duration_ms: SHIELD_DURATION_MS,
            sweep_cooldown_ms: SWEEP_COOLDOWN_MS,
            double_points_duration_ms: DOUBLE_POINTS_DURATION_MS,
            double_points_multiplier: DOUBLE_POINTS_MULTIPLIER,
            double_points_price: DOUBLE_POINTS_PRICE,
            invisibility_duration_ms: INVISIBILITY_DURATION_MS,
            invisibility_price: INVISIBILITY_PRICE,
            cooldown_charm_step: COOLDOWN_CHARM_STEP,
            cooldown_charm_price: COOLDOWN_CHARM_PRICE,
            max_cooldown_reduction: MAX_COOLDOWN_REDUCTION,
            proximity_cell_size: PROXIMITY_CELL_SIZE,
        }
    }
}

impl GameConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(EngineError::InvalidConfig(format!(
                "map size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.chunk_size <= 0 {
            return Err(EngineError::InvalidConfig(
                "chunkSize must be positive".to_string(),
            ));
        }
        if self.width % self.chunk_size != 0 || self.height % self.chunk_size != 0 {
            return Err(EngineError::InvalidConfig(format!(
                "chunkSize {} must divide the map size {}x{}",
                self.chunk_size, self.width, self.height
            )));
        }
        if self.flood_fill_cap == 0 {
            return Err(EngineError::InvalidConfig(
                "floodFillCap must be at least 1".to_string(),
            ));
        }
        for (label, value) in [
            ("mineRatioThreshold", self.mine_ratio_threshold),
            ("progressThreshold", self.progress_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(EngineError::InvalidConfig(format!(
                    "{label} must be within (0, 1], got {value}"
                )));
            }
        }
        if self.proximity_cell_size <= 0 {
            return Err(EngineError::InvalidConfig(
                "proximityCellSize must be positive".to_string(),
            ));
        }
        if let Some(zone) = self
            .zones
            .iter()
            .find(|zone| !(0.0..=1.0).contains(&zone.mine_density))
        {
            return Err(EngineError::InvalidConfig(format!(
                "zone {:?} density {} is outside [0, 1]",
                zone.zone_type, zone.mine_density
            )));
        }
        Ok(())
    }

    pub fn total_cells(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn chunks_x(&self) -> i32 {
        self.width / self.chunk_size
    }

    pub fn chunks_y(&self) -> i32 {
        self.height / self.chunk_size
    }

    pub fn zone_table(&self) -> Vec<Zone> {
        if self.zones.is_empty() {
            default_zones(self.width, self.height)
        } else {
            self.zones.clone()
        }
    }

    pub fn skill_cooldown_ms(&self, skill: SkillKind) -> u64 {
        match skill {
            SkillKind::Scan => self.scan_cooldown_ms,
            SkillKind::Shield => self.shield_cooldown_ms,
            SkillKind::Sweep => self.sweep_cooldown_ms,
        }
    }

    /// Active duration for skills that stay on after use.
    pub fn skill_duration_ms(&self, skill: SkillKind) -> Option<u64> {
        match skill {
            SkillKind::Shield => Some(self.shield_duration_ms),
            SkillKind::Scan | SkillKind::Sweep => None,
        }
    }

    pub fn item_price(&self, item: ItemKind) -> i64 {
        match item {
            ItemKind::DoublePoints => self.double_points_price,
            ItemKind::Invisibility => self.invisibility_price,
            ItemKind::CooldownCharm => self.cooldown_charm_price,
        }
    }
}

/// Concentric squares centred on the map, hardest first so the inner zone wins.
pub fn default_zones(width: i32, height: i32) -> Vec<Zone> {
    let centred = |fraction: f32| {
        let zone_width = (width as f32 * fraction).round() as i32;
        let zone_height = (height as f32 * fraction).round() as i32;
        Rect {
            x: (width - zone_width) / 2,
            y: (height - zone_height) / 2,
            width: zone_width,
            height: zone_height,
        }
    };
    vec![
        Zone {
            zone_type: ZoneType::Expert,
            mine_density: 0.25,
            score_multiplier: 3.0,
            bounds: centred(0.2),
        },
        Zone {
            zone_type: ZoneType::Hard,
            mine_density: 0.20,
            score_multiplier: 2.0,
            bounds: centred(0.5),
        },
        Zone {
            zone_type: ZoneType::Normal,
            mine_density: 0.15,
            score_multiplier: 1.5,
            bounds: centred(0.8),
        },
        Zone {
            zone_type: ZoneType::Beginner,
            mine_density: 0.10,
            score_multiplier: 1.0,
            bounds: Rect {
                x: 0,
                y: 0,
                width,
                height,
            },
        },
    ]
}
