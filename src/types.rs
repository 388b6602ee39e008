use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cy: i32,
}

impl ChunkCoord {
    pub const fn new(cx: i32, cy: i32) -> Self {
        Self { cx, cy }
    }

    pub fn containing(x: i32, y: i32, chunk_size: i32) -> Self {
        Self {
            cx: x.div_euclid(chunk_size),
            cy: y.div_euclid(chunk_size),
        }
    }
}

/// Half-open rectangle `[x, x + width) × [y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Beginner,
    Normal,
    Hard,
    Expert,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    pub mine_density: f32,
    pub score_multiplier: f32,
    pub bounds: Rect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Hidden,
    Revealed,
    Flagged,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub x: i32,
    pub y: i32,
    pub is_mine: bool,
    pub adjacent_mines: u8,
    pub state: CellState,
    pub zone: ZoneType,
    pub revealed_by: Option<String>,
    pub flagged_by: Option<String>,
    pub revealed_at: Option<u64>,
}

impl Cell {
    pub fn is_hidden(&self) -> bool {
        self.state == CellState::Hidden
    }

    /// Client-facing copy: mine data stays private until the cell is revealed.
    pub fn to_view(&self) -> CellView {
        let revealed = self.state == CellState::Revealed;
        CellView {
            x: self.x,
            y: self.y,
            state: self.state,
            is_mine: revealed.then_some(self.is_mine),
            adjacent_mines: revealed.then_some(self.adjacent_mines),
            revealed_by: self.revealed_by.clone(),
            flagged_by: self.flagged_by.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellView {
    pub x: i32,
    pub y: i32,
    pub state: CellState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mine: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjacent_mines: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged_by: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkView {
    pub coord: ChunkCoord,
    pub size: i32,
    pub mine_count: u32,
    pub revealed_count: u32,
    pub cells: Vec<CellView>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Waiting,
    Active,
    Ending,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    MineRatio,
    Cleared,
    TimeLimit,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: u64,
    pub state: SessionState,
    /// Server only. Anyone holding it can derive every hidden mine.
    #[serde(skip)]
    pub seed: u32,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub total_mines: u64,
    pub mines_exploded: u64,
    pub cells_revealed: u64,
    pub total_cells: u64,
    pub player_count: usize,
    pub end_reason: Option<EndReason>,
}

impl Session {
    pub fn waiting() -> Self {
        Self {
            id: 0,
            state: SessionState::Waiting,
            seed: 0,
            start_time: 0,
            end_time: None,
            total_mines: 0,
            mines_exploded: 0,
            cells_revealed: 0,
            total_cells: 0,
            player_count: 0,
            end_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn mine_ratio(&self) -> f32 {
        if self.total_mines == 0 {
            return 0.0;
        }
        self.mines_exploded as f32 / self.total_mines as f32
    }

    pub fn progress(&self) -> f32 {
        let safe_cells = self.total_cells.saturating_sub(self.total_mines);
        if safe_cells == 0 {
            return 0.0;
        }
        self.cells_revealed as f32 / safe_cells as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    Scan,
    Shield,
    Sweep,
}

impl SkillKind {
    pub const ALL: [SkillKind; 3] = [SkillKind::Scan, SkillKind::Shield, SkillKind::Sweep];
    pub const COUNT: usize = Self::ALL.len();

    pub const fn index(self) -> usize {
        match self {
            Self::Scan => 0,
            Self::Shield => 1,
            Self::Sweep => 2,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scan" => Some(Self::Scan),
            "shield" => Some(Self::Shield),
            "sweep" => Some(Self::Sweep),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    DoublePoints,
    Invisibility,
    CooldownCharm,
}

impl ItemKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "double_points" => Some(Self::DoublePoints),
            "invisibility" => Some(Self::Invisibility),
            "cooldown_charm" => Some(Self::CooldownCharm),
            _ => None,
        }
    }

    /// Timed effect granted by the item, if it is not an instant one.
    pub const fn effect_kind(self) -> Option<EffectKind> {
        match self {
            Self::DoublePoints => Some(EffectKind::DoublePoints),
            Self::Invisibility => Some(EffectKind::Invisibility),
            Self::CooldownCharm => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    DoublePoints,
    Invisibility,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSkillState {
    pub skill: SkillKind,
    pub last_used: Option<u64>,
    pub is_active: bool,
    pub active_until: Option<u64>,
}

impl PlayerSkillState {
    pub fn new(skill: SkillKind) -> Self {
        Self {
            skill,
            last_used: None,
            is_active: false,
            active_until: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEffect {
    pub kind: EffectKind,
    pub start_time: u64,
    pub end_time: u64,
    pub value: Option<f32>,
    pub stack_count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboState {
    pub count: u32,
    pub multiplier: f32,
    pub last_reveal_time: Option<u64>,
    pub is_fever: bool,
    pub fever_end_time: Option<u64>,
}

impl ComboState {
    pub fn new() -> Self {
        Self {
            multiplier: 1.0,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealResult {
    pub cells: Vec<Cell>,
    pub hit_mine: bool,
    pub truncated: bool,
}

impl RevealResult {
    pub fn empty() -> Self {
        Self {
            cells: Vec::new(),
            hit_mine: false,
            truncated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealOutcome {
    #[serde(flatten)]
    pub result: RevealResult,
    pub points: i64,
    pub shielded: bool,
    pub combo: u32,
    pub fever_triggered: bool,
}

impl RevealOutcome {
    pub fn no_op() -> Self {
        Self {
            result: RevealResult::empty(),
            points: 0,
            shielded: false,
            combo: 0,
            fever_triggered: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillUseResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_cells: Option<Vec<Position>>,
    pub message: String,
}

impl SkillUseResult {
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            affected_cells: None,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUseResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<ActiveEffect>,
    pub message: String,
}

impl ItemUseResult {
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            effect: None,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub player_id: String,
    pub name: String,
    pub score: i64,
    pub cells_revealed: u64,
    pub mines_hit: u32,
    pub best_combo: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndData {
    pub session: Session,
    pub reason: EndReason,
    pub duration_ms: u64,
    pub ended_at_iso: String,
    pub leaderboard: Vec<ScoreEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorView {
    pub player_id: String,
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillCooldownView {
    pub skill: SkillKind,
    pub ready: bool,
    pub remaining_cooldown_ms: u64,
    pub is_active: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub connected: bool,
    pub score: i64,
    pub cells_revealed: u64,
    pub mines_hit: u32,
    pub combo: ComboState,
    pub effects: Vec<ActiveEffect>,
    pub skills: Vec<SkillCooldownView>,
    pub invisible: bool,
    pub best_score: i64,
    pub rounds_played: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionStarted {
        session: Session,
    },
    SessionEnded {
        data: SessionEndData,
    },
    SessionFinished {
        session: Session,
    },
    FeverStarted {
        #[serde(rename = "playerId")]
        player_id: String,
        until: u64,
    },
    FeverEnded {
        #[serde(rename = "playerId")]
        player_id: String,
    },
    EffectExpired {
        #[serde(rename = "playerId")]
        player_id: String,
        kind: EffectKind,
    },
    SkillEnded {
        #[serde(rename = "playerId")]
        player_id: String,
        skill: SkillKind,
    },
}
