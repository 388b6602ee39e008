pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const MAP_WIDTH: i32 = 1_000;
pub const MAP_HEIGHT: i32 = 1_000;
pub const CHUNK_SIZE: i32 = 100;
pub const FLOOD_FILL_CAP: usize = 500;

pub const SESSION_MAX_DURATION_MS: u64 = 60 * 60 * 1000;
pub const SESSION_END_COUNTDOWN_MS: u64 = 10_000;
pub const SESSION_RESTART_DELAY_MS: u64 = 5_000;
pub const MINE_RATIO_THRESHOLD: f32 = 0.30;
pub const PROGRESS_THRESHOLD: f32 = 0.80;
pub const LEADERBOARD_SIZE: usize = 10;

pub const COMBO_TIMEOUT_MS: u64 = 5_000;
pub const COMBO_LATENCY_BUFFER_MS: u64 = 500;
pub const COMBO_THRESHOLDS: [u32; 5] = [5, 10, 20, 35, 50];
pub const COMBO_MULTIPLIER_STEP: f32 = 0.5;
pub const COMBO_MAX_MULTIPLIER: f32 = 3.0;
pub const FEVER_THRESHOLD: u32 = 30;
pub const FEVER_DURATION_MS: u64 = 10_000;
pub const FEVER_MULTIPLIER: f32 = 5.0;

pub const BASE_CELL_POINTS: i64 = 1;
pub const MINE_PENALTY: i64 = 50;
pub const MAX_GUILD_BONUS: f32 = 0.5;

pub const SCAN_COOLDOWN_MS: u64 = 30_000;
pub const SCAN_RADIUS: i32 = 2;
pub const SHIELD_COOLDOWN_MS: u64 = 60_000;
pub const SHIELD_DURATION_MS: u64 = 15_000;
pub const SWEEP_COOLDOWN_MS: u64 = 45_000;

pub const DOUBLE_POINTS_DURATION_MS: u64 = 30_000;
pub const DOUBLE_POINTS_MULTIPLIER: f32 = 2.0;
pub const DOUBLE_POINTS_PRICE: i64 = 100;
pub const INVISIBILITY_DURATION_MS: u64 = 20_000;
pub const INVISIBILITY_PRICE: i64 = 80;
pub const COOLDOWN_CHARM_STEP: f32 = 0.1;
pub const COOLDOWN_CHARM_PRICE: i64 = 150;
pub const MAX_COOLDOWN_REDUCTION: f32 = 0.5;

pub const PROXIMITY_CELL_SIZE: i32 = 64;
pub const DEFAULT_VIEWPORT: (i32, i32) = (160, 100);
pub const MAX_VIEWPORT: (i32, i32) = (DEFAULT_VIEWPORT.0 * 4, DEFAULT_VIEWPORT.1 * 4);

/// Combo multiplier for a streak of `count` reveals, before fever is considered.
pub fn combo_multiplier(count: u32, thresholds: &[u32], step: f32, max: f32) -> f32 {
    let crossed = thresholds.iter().filter(|&&threshold| count >= threshold).count();
    (1.0 + crossed as f32 * step).min(max)
}

pub fn guild_multiplier(bonus: f32, max_bonus: f32) -> f32 {
    1.0 + bonus.clamp(0.0, max_bonus)
}
