use crate::types::Cell;
use crate::world::WorldGenerator;

/// Everything a reveal's base points are multiplied by.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreMultipliers {
    pub combo: f32,
    pub item: f32,
    pub guild: f32,
}

impl ScoreMultipliers {
    pub fn product(&self) -> f32 {
        self.combo * self.item * self.guild
    }
}

/// Zone-weighted base value of the safe cells a reveal uncovered.
pub fn base_points(cells: &[Cell], world: &WorldGenerator, base_cell_points: i64) -> f32 {
    cells
        .iter()
        .filter(|cell| !cell.is_mine)
        .map(|cell| {
            (base_cell_points + cell.adjacent_mines as i64) as f32
                * world.score_multiplier(cell.zone)
        })
        .sum()
}

pub fn reveal_points(base: f32, multipliers: ScoreMultipliers) -> i64 {
    (base * multipliers.product()).round() as i64
}
