use std::collections::HashSet;

use crate::chunk_store::ChunkStore;
use crate::types::{Cell, CellState, RevealResult};
use crate::world::NEIGHBOR_OFFSETS;

/// Bounded flood fill over a [`ChunkStore`]. The only code path that reveals cells.
#[derive(Clone, Copy, Debug)]
pub struct RevealEngine {
    cap: usize,
}

impl RevealEngine {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1) }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn reveal(
        &self,
        store: &mut ChunkStore,
        x: i32,
        y: i32,
        player_id: &str,
        now_ms: u64,
    ) -> RevealResult {
        let Some((state, is_mine)) = store.cell_mut(x, y).map(|cell| (cell.state, cell.is_mine))
        else {
            return RevealResult::empty();
        };
        if state != CellState::Hidden {
            return RevealResult::empty();
        }

        if is_mine {
            let Some(cell) = store.mark_revealed(x, y, player_id, now_ms) else {
                return RevealResult::empty();
            };
            return RevealResult {
                cells: vec![cell],
                hit_mine: true,
                truncated: false,
            };
        }

        let width = store.world().width() as i64;
        let key = |x: i32, y: i32| y as i64 * width + x as i64;

        let mut visited: HashSet<i64> = HashSet::from([key(x, y)]);
        let mut stack = vec![(x, y)];
        let mut cells: Vec<Cell> = Vec::new();

        while let Some((cx, cy)) = stack.pop() {
            if cells.len() >= self.cap {
                stack.push((cx, cy));
                break;
            }
            let revealable = store
                .get_cell(cx, cy)
                .map(|cell| cell.is_hidden() && !cell.is_mine)
                .unwrap_or(false);
            if !revealable {
                continue;
            }
            let Some(revealed) = store.mark_revealed(cx, cy, player_id, now_ms) else {
                continue;
            };
            let expand = revealed.adjacent_mines == 0;
            cells.push(revealed);

            if !expand {
                continue;
            }
            for (dx, dy) in NEIGHBOR_OFFSETS {
                let (nx, ny) = (cx + dx, cy + dy);
                if !store.world().in_bounds(nx, ny) || !visited.insert(key(nx, ny)) {
                    continue;
                }
                let hidden = store
                    .cell_mut(nx, ny)
                    .map(|neighbor| neighbor.state == CellState::Hidden)
                    .unwrap_or(false);
                if hidden {
                    stack.push((nx, ny));
                }
            }
        }

        let truncated = !stack.is_empty();
        if truncated {
            tracing::debug!(
                x,
                y,
                player_id,
                cap = self.cap,
                abandoned = stack.len(),
                "flood fill truncated"
            );
        }
        RevealResult {
            cells,
            hit_mine: false,
            truncated,
        }
    }

    /// Hidden → Flagged, or Flagged → Hidden when the same player toggles it back.
    pub fn toggle_flag(
        &self,
        store: &mut ChunkStore,
        x: i32,
        y: i32,
        player_id: &str,
    ) -> Option<Cell> {
        let cell = store.cell_mut(x, y)?;
        match cell.state {
            CellState::Hidden => {
                cell.state = CellState::Flagged;
                cell.flagged_by = Some(player_id.to_string());
                Some(cell.clone())
            }
            CellState::Flagged if cell.flagged_by.as_deref() == Some(player_id) => {
                cell.state = CellState::Hidden;
                cell.flagged_by = None;
                Some(cell.clone())
            }
            CellState::Flagged | CellState::Revealed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkCoord, Rect, Zone, ZoneType};
    use crate::world::WorldGenerator;

    fn zone(zone_type: ZoneType, density: f32, bounds: Rect) -> Zone {
        Zone {
            zone_type,
            mine_density: density,
            score_multiplier: 1.0,
            bounds,
        }
    }

    fn empty_store(size: i32, chunk_size: i32) -> ChunkStore {
        let world = WorldGenerator::with_zones(
            size,
            size,
            vec![zone(
                ZoneType::Beginner,
                0.0,
                Rect {
                    x: 0,
                    y: 0,
                    width: size,
                    height: size,
                },
            )],
        );
        let mut store = ChunkStore::new(world, 1, chunk_size);
        store.generate_all().expect("generate");
        store
    }

    /// Safe 100x100 map with a solid mine wall on column 60.
    fn walled_store() -> ChunkStore {
        let world = WorldGenerator::with_zones(
            100,
            100,
            vec![
                zone(
                    ZoneType::Expert,
                    1.0,
                    Rect {
                        x: 60,
                        y: 0,
                        width: 1,
                        height: 100,
                    },
                ),
                zone(
                    ZoneType::Beginner,
                    0.0,
                    Rect {
                        x: 0,
                        y: 0,
                        width: 100,
                        height: 100,
                    },
                ),
            ],
        );
        let mut store = ChunkStore::new(world, 1, 50);
        store.generate_all().expect("generate");
        store
    }

    #[test]
    fn small_zero_region_reveals_fully_without_truncation() {
        let mut store = empty_store(20, 10);
        let result = RevealEngine::new(500).reveal(&mut store, 5, 5, "p1", 10);
        assert!(!result.hit_mine);
        assert!(!result.truncated);
        assert_eq!(result.cells.len(), 400);
        assert_eq!(store.revealed_safe_cells(), 400);
        let per_chunk: u32 = (0..2)
            .flat_map(|cy| (0..2).map(move |cx| ChunkCoord::new(cx, cy)))
            .map(|coord| store.get_chunk(coord).expect("chunk").revealed_count)
            .sum();
        assert_eq!(per_chunk, 400);
    }

    #[test]
    fn large_zero_region_truncates_at_cap() {
        let mut store = empty_store(100, 50);
        let result = RevealEngine::new(500).reveal(&mut store, 50, 50, "p1", 10);
        assert!(result.truncated);
        assert_eq!(result.cells.len(), 500);
        assert_eq!(store.revealed_safe_cells(), 500);

        let hidden_left = (0..100)
            .flat_map(|y| (0..100).map(move |x| (x, y)))
            .filter(|&(x, y)| store.get_cell(x, y).map(Cell::is_hidden).unwrap_or(false))
            .count();
        assert_eq!(hidden_left, 10_000 - 500);
    }

    #[test]
    fn fill_stops_at_numbered_border() {
        let mut store = walled_store();
        let result = RevealEngine::new(10_000).reveal(&mut store, 10, 10, "p1", 1);
        assert!(!result.truncated);
        assert_eq!(result.cells.len(), 60 * 100);
        assert!(result.cells.iter().all(|cell| !cell.is_mine && cell.x < 60));
        assert_eq!(store.get_cell(59, 0).expect("cell").adjacent_mines, 2);
        assert_eq!(store.get_cell(59, 50).expect("cell").adjacent_mines, 3);
        assert!(store.get_cell(61, 50).expect("cell").is_hidden());
    }

    #[test]
    fn mine_reveals_single_cell() {
        let mut store = walled_store();
        let result = RevealEngine::new(500).reveal(&mut store, 60, 3, "p2", 42);
        assert!(result.hit_mine);
        assert!(!result.truncated);
        assert_eq!(result.cells.len(), 1);
        assert_eq!(result.cells[0].revealed_by.as_deref(), Some("p2"));
        assert_eq!(result.cells[0].revealed_at, Some(42));
        assert_eq!(store.revealed_mines(), 1);
        assert_eq!(store.revealed_safe_cells(), 0);
    }

    #[test]
    fn revealed_or_flagged_target_is_a_no_op() {
        let mut store = walled_store();
        let engine = RevealEngine::new(500);
        engine.reveal(&mut store, 59, 10, "p1", 1);
        let before = store
            .get_chunk(ChunkCoord::new(1, 0))
            .expect("chunk")
            .revealed_count;

        assert_eq!(
            engine.reveal(&mut store, 59, 10, "p1", 2),
            RevealResult::empty()
        );
        engine.toggle_flag(&mut store, 58, 40, "p1").expect("flagged");
        assert_eq!(
            engine.reveal(&mut store, 58, 40, "p1", 3),
            RevealResult::empty()
        );
        assert_eq!(
            store
                .get_chunk(ChunkCoord::new(1, 0))
                .expect("chunk")
                .revealed_count,
            before
        );
    }

    #[test]
    fn out_of_range_target_is_a_no_op() {
        let mut store = empty_store(20, 10);
        let engine = RevealEngine::new(500);
        assert_eq!(engine.reveal(&mut store, -1, 0, "p1", 1), RevealResult::empty());
        assert_eq!(engine.reveal(&mut store, 20, 0, "p1", 1), RevealResult::empty());
    }

    #[test]
    fn fill_skips_flagged_cells() {
        let mut store = empty_store(20, 10);
        let engine = RevealEngine::new(500);
        engine.toggle_flag(&mut store, 0, 0, "p2").expect("flagged");
        let result = engine.reveal(&mut store, 10, 10, "p1", 1);
        assert_eq!(result.cells.len(), 399);
        assert!(!result.truncated);
        assert_eq!(
            store.get_cell(0, 0).expect("cell").state,
            CellState::Flagged
        );
    }

    #[test]
    fn only_original_flagger_can_unflag() {
        let mut store = empty_store(20, 10);
        let engine = RevealEngine::new(500);
        let flagged = engine.toggle_flag(&mut store, 4, 4, "alice").expect("flag");
        assert_eq!(flagged.flagged_by.as_deref(), Some("alice"));
        assert!(engine.toggle_flag(&mut store, 4, 4, "bob").is_none());
        let cleared = engine.toggle_flag(&mut store, 4, 4, "alice").expect("unflag");
        assert_eq!(cleared.state, CellState::Hidden);
        assert_eq!(cleared.flagged_by, None);

        engine.reveal(&mut store, 4, 4, "alice", 1);
        assert!(engine.toggle_flag(&mut store, 4, 4, "alice").is_none());
    }

    #[test]
    fn lazy_store_materializes_chunks_during_fill() {
        let world = WorldGenerator::with_zones(
            40,
            40,
            vec![zone(
                ZoneType::Beginner,
                0.0,
                Rect {
                    x: 0,
                    y: 0,
                    width: 40,
                    height: 40,
                },
            )],
        );
        let mut store = ChunkStore::new(world, 1, 10);
        let result = RevealEngine::new(5_000).reveal(&mut store, 0, 0, "p1", 1);
        assert_eq!(result.cells.len(), 1_600);
        assert_eq!(store.chunk_count(), 16);
    }
}
