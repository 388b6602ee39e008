use std::collections::HashMap;

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::types::{Cell, CellState, ChunkCoord, ChunkView};
use crate::world::{WorldGenerator, NEIGHBOR_OFFSETS};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub coord: ChunkCoord,
    pub size: i32,
    pub cells: Vec<Cell>,
    pub mine_count: u32,
    pub revealed_count: u32,
}

impl Chunk {
    pub fn origin(&self) -> (i32, i32) {
        (self.coord.cx * self.size, self.coord.cy * self.size)
    }

    pub fn cell(&self, x: i32, y: i32) -> Option<&Cell> {
        self.local_index(x, y).and_then(|index| self.cells.get(index))
    }

    pub fn to_view(&self) -> ChunkView {
        ChunkView {
            coord: self.coord,
            size: self.size,
            mine_count: self.mine_count,
            revealed_count: self.revealed_count,
            cells: self.cells.iter().map(Cell::to_view).collect(),
        }
    }

    fn local_index(&self, x: i32, y: i32) -> Option<usize> {
        let (ox, oy) = self.origin();
        let (lx, ly) = (x - ox, y - oy);
        if lx < 0 || ly < 0 || lx >= self.size || ly >= self.size {
            return None;
        }
        Some((ly * self.size + lx) as usize)
    }
}

/// Materialized chunks of one round's map plus the aggregate counters the
/// session thresholds read.
#[derive(Clone, Debug)]
pub struct ChunkStore {
    world: WorldGenerator,
    seed: u32,
    chunk_size: i32,
    chunks: HashMap<ChunkCoord, Chunk>,
    total_mines: u64,
    revealed_safe_cells: u64,
    revealed_mines: u64,
}

impl ChunkStore {
    pub fn new(world: WorldGenerator, seed: u32, chunk_size: i32) -> Self {
        Self {
            world,
            seed,
            chunk_size,
            chunks: HashMap::new(),
            total_mines: 0,
            revealed_safe_cells: 0,
            revealed_mines: 0,
        }
    }

    pub fn world(&self) -> &WorldGenerator {
        &self.world
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    pub fn chunks_x(&self) -> i32 {
        (self.world.width() + self.chunk_size - 1) / self.chunk_size
    }

    pub fn chunks_y(&self) -> i32 {
        (self.world.height() + self.chunk_size - 1) / self.chunk_size
    }

    pub fn coord_in_map(&self, coord: ChunkCoord) -> bool {
        coord.cx >= 0 && coord.cy >= 0 && coord.cx < self.chunks_x() && coord.cy < self.chunks_y()
    }

    /// Returns the cached chunk, building it on first request.
    pub fn generate(&mut self, coord: ChunkCoord) -> Result<&Chunk> {
        if !self.coord_in_map(coord) {
            return Err(EngineError::MissingChunk {
                cx: coord.cx,
                cy: coord.cy,
            });
        }
        if !self.chunks.contains_key(&coord) {
            let chunk = self.build_chunk(coord);
            self.total_mines += chunk.mine_count as u64;
            self.chunks.insert(coord, chunk);
        }
        self.chunks.get(&coord).ok_or(EngineError::MissingChunk {
            cx: coord.cx,
            cy: coord.cy,
        })
    }

    pub fn generate_all(&mut self) -> Result<()> {
        for cy in 0..self.chunks_y() {
            for cx in 0..self.chunks_x() {
                self.generate(ChunkCoord::new(cx, cy))?;
            }
        }
        tracing::debug!(
            chunks = self.chunks.len(),
            total_mines = self.total_mines,
            seed = self.seed,
            "generated full map"
        );
        Ok(())
    }

    pub fn get_chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    pub fn get_cell(&self, x: i32, y: i32) -> Option<&Cell> {
        if !self.world.in_bounds(x, y) {
            return None;
        }
        self.chunks
            .get(&ChunkCoord::containing(x, y, self.chunk_size))
            .and_then(|chunk| chunk.cell(x, y))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Mines in every materialized chunk; the whole map once eagerly generated.
    pub fn total_mines(&self) -> u64 {
        self.total_mines
    }

    pub fn total_cells(&self) -> u64 {
        self.world.width() as u64 * self.world.height() as u64
    }

    pub fn revealed_safe_cells(&self) -> u64 {
        self.revealed_safe_cells
    }

    pub fn revealed_mines(&self) -> u64 {
        self.revealed_mines
    }

    /// Like [`ChunkStore::get_cell`], but builds the owning chunk if it is missing.
    pub fn load_cell(&mut self, x: i32, y: i32) -> Option<&Cell> {
        self.cell_mut(x, y).map(|cell| &*cell)
    }

    /// Mutable access that materializes the owning chunk when needed.
    pub(crate) fn cell_mut(&mut self, x: i32, y: i32) -> Option<&mut Cell> {
        if !self.world.in_bounds(x, y) {
            return None;
        }
        let coord = ChunkCoord::containing(x, y, self.chunk_size);
        self.generate(coord).ok()?;
        let chunk = self.chunks.get_mut(&coord)?;
        let index = chunk.local_index(x, y)?;
        chunk.cells.get_mut(index)
    }

    /// Flips a hidden cell to revealed and keeps chunk and store counters in step.
    /// Returns `None` when the cell is missing or not hidden.
    pub(crate) fn mark_revealed(
        &mut self,
        x: i32,
        y: i32,
        player_id: &str,
        now_ms: u64,
    ) -> Option<Cell> {
        let cell = self.cell_mut(x, y)?;
        if cell.state != CellState::Hidden {
            return None;
        }
        cell.state = CellState::Revealed;
        cell.revealed_by = Some(player_id.to_string());
        cell.revealed_at = Some(now_ms);
        let revealed = cell.clone();

        let coord = ChunkCoord::containing(x, y, self.chunk_size);
        if let Some(chunk) = self.chunks.get_mut(&coord) {
            chunk.revealed_count += 1;
            debug_assert!(chunk.revealed_count as i64 <= (chunk.size * chunk.size) as i64);
        }
        if revealed.is_mine {
            self.revealed_mines += 1;
        } else {
            self.revealed_safe_cells += 1;
        }
        Some(revealed)
    }

    fn build_chunk(&self, coord: ChunkCoord) -> Chunk {
        let size = self.chunk_size;
        let ox = coord.cx * size;
        let oy = coord.cy * size;
        let mut cells = Vec::with_capacity((size * size) as usize);
        let mut mine_count = 0;

        for ly in 0..size {
            for lx in 0..size {
                let (x, y) = (ox + lx, oy + ly);
                let (is_mine, zone) = self.world.sample(x, y, self.seed);
                if is_mine {
                    mine_count += 1;
                }
                cells.push(Cell {
                    x,
                    y,
                    is_mine,
                    adjacent_mines: 0,
                    state: CellState::Hidden,
                    zone,
                    revealed_by: None,
                    flagged_by: None,
                    revealed_at: None,
                });
            }
        }

        for ly in 0..size {
            for lx in 0..size {
                let index = (ly * size + lx) as usize;
                if cells[index].is_mine {
                    continue;
                }
                let mut adjacent = 0;
                for (dx, dy) in NEIGHBOR_OFFSETS {
                    let (nlx, nly) = (lx + dx, ly + dy);
                    let neighbor_is_mine = if nlx >= 0 && nly >= 0 && nlx < size && nly < size {
                        cells[(nly * size + nlx) as usize].is_mine
                    } else {
                        self.world.mine_at(ox + nlx, oy + nly, self.seed)
                    };
                    if neighbor_is_mine {
                        adjacent += 1;
                    }
                }
                cells[index].adjacent_mines = adjacent;
            }
        }

        Chunk {
            coord,
            size,
            cells,
            mine_count,
            revealed_count: 0,
        }
    }
}
