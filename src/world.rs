use crate::config::GameConfig;
use crate::rng::cell_noise;
use crate::types::{Rect, Zone, ZoneType};

pub const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Pure seed → mine mapping over the whole map. Holds no per-cell state, so any
/// cell can be recomputed without materializing its chunk.
#[derive(Clone, Debug)]
pub struct WorldGenerator {
    width: i32,
    height: i32,
    zones: Vec<Zone>,
    fallback: Zone,
}

impl WorldGenerator {
    pub fn new(config: &GameConfig) -> Self {
        Self::with_zones(config.width, config.height, config.zone_table())
    }

    pub fn with_zones(width: i32, height: i32, zones: Vec<Zone>) -> Self {
        let fallback = zones
            .iter()
            .min_by(|a, b| a.mine_density.total_cmp(&b.mine_density))
            .cloned()
            .unwrap_or(Zone {
                zone_type: ZoneType::Beginner,
                mine_density: 0.0,
                score_multiplier: 1.0,
                bounds: Rect {
                    x: 0,
                    y: 0,
                    width,
                    height,
                },
            });
        Self {
            width,
            height,
            zones,
            fallback,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    /// First configured zone whose bounds contain the position, else the easiest one.
    pub fn zone_at(&self, x: i32, y: i32) -> &Zone {
        self.zones
            .iter()
            .find(|zone| zone.bounds.contains(x, y))
            .unwrap_or(&self.fallback)
    }

    pub fn score_multiplier(&self, zone_type: ZoneType) -> f32 {
        self.zones
            .iter()
            .find(|zone| zone.zone_type == zone_type)
            .map(|zone| zone.score_multiplier)
            .unwrap_or(1.0)
    }

    pub fn mine_at(&self, x: i32, y: i32, seed: u32) -> bool {
        self.sample(x, y, seed).0
    }

    /// Mine flag and zone for a position, resolving the zone once.
    pub fn sample(&self, x: i32, y: i32, seed: u32) -> (bool, ZoneType) {
        let zone = self.zone_at(x, y);
        let is_mine = self.in_bounds(x, y) && cell_noise(x, y, seed) < zone.mine_density;
        (is_mine, zone.zone_type)
    }

    pub fn adjacent_count(&self, x: i32, y: i32, seed: u32) -> u8 {
        NEIGHBOR_OFFSETS
            .iter()
            .filter(|(dx, dy)| self.mine_at(x + dx, y + dy, seed))
            .count() as u8
    }
}
