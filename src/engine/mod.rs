use crate::chunk_store::{Chunk, ChunkStore};
use crate::config::GameConfig;
use crate::constants::MAX_VIEWPORT;
use crate::effects::PlayerEffectStore;
use crate::error::Result;
use crate::players::{JoinOutcome, PlayerRegistry};
use crate::proximity::ProximityIndex;
use crate::reveal::RevealEngine;
use crate::rng::Rng;
use crate::server_utils::sanitize_name;
use crate::session::{LifecycleSignal, SessionLifecycle};
use crate::types::{
    ChunkCoord, CursorView, EndReason, EngineEvent, PlayerView, Position, ScoreEntry, Session,
    SessionEndData,
};
use crate::world::WorldGenerator;

mod reveal_system;
pub mod scoring;
mod skill_system;
mod utils;

pub use self::utils::now_ms;
use self::utils::iso_timestamp;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinResult {
    Joined {
        player_id: String,
    },
    Resumed {
        player_id: String,
        replaced_connection: Option<String>,
    },
    Rejected {
        reason: &'static str,
    },
}

/// The single owner of world, session and player state. Every external request
/// is one method call that runs to completion; timers advance only through
/// [`GameEngine::tick`], and collaborators learn about transitions by draining
/// [`EngineEvent`]s.
#[derive(Clone, Debug)]
pub struct GameEngine {
    pub config: GameConfig,
    world: WorldGenerator,
    store: ChunkStore,
    reveal: RevealEngine,
    lifecycle: SessionLifecycle,
    effects: PlayerEffectStore,
    players: PlayerRegistry,
    cursors: ProximityIndex<String>,
    seeds: Rng,
    events: Vec<EngineEvent>,
    next_id_counter: u64,
}

impl GameEngine {
    pub fn new(config: GameConfig, seed: u32) -> Result<Self> {
        config.validate()?;
        let world = WorldGenerator::new(&config);
        Ok(Self {
            store: ChunkStore::new(world.clone(), seed, config.chunk_size),
            reveal: RevealEngine::new(config.flood_fill_cap),
            lifecycle: SessionLifecycle::new(&config),
            effects: PlayerEffectStore::new(config.clone()),
            players: PlayerRegistry::new(),
            cursors: ProximityIndex::new(config.proximity_cell_size),
            seeds: Rng::new(seed),
            events: Vec::new(),
            next_id_counter: 1,
            world,
            config,
        })
    }

    pub fn get_session(&self) -> &Session {
        self.lifecycle.session()
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Regenerates the map under a fresh seed and wipes every per-round state.
    pub fn start_new_session(&mut self, now_ms: u64) -> &Session {
        let seed = self.seeds.next_u32();
        let mut store = ChunkStore::new(self.world.clone(), seed, self.config.chunk_size);
        if self.config.eager_generation {
            if let Err(error) = store.generate_all() {
                tracing::error!(%error, seed, "map generation failed");
            }
        }
        self.store = store;
        self.players.reset_round_stats();
        self.effects.reset_for_new_session();

        let session = self
            .lifecycle
            .start_new_session(
                seed,
                self.store.total_mines(),
                self.store.total_cells(),
                self.players.connected_count(),
                now_ms,
            )
            .clone();
        self.events.push(EngineEvent::SessionStarted { session });
        self.lifecycle.session()
    }

    /// Fires every player and lifecycle timer due at `now_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        let player_events = self.effects.tick(now_ms);
        self.events.extend(player_events);

        for signal in self.lifecycle.tick(now_ms) {
            match signal {
                LifecycleSignal::Ending(reason) => self.emit_session_end(reason, now_ms),
                LifecycleSignal::Finished => {
                    let session = self.lifecycle.session().clone();
                    tracing::info!(session_id = session.id, "session finished");
                    self.events.push(EngineEvent::SessionFinished { session });
                }
                LifecycleSignal::RestartDue => {
                    self.start_new_session(now_ms);
                }
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Registers a new player, or re-attaches `connection_id` to a known one.
    pub fn join(
        &mut self,
        name: &str,
        player_id: Option<&str>,
        connection_id: &str,
    ) -> JoinResult {
        if let Some(existing) = player_id.filter(|id| self.players.contains(id)) {
            let replaced_connection = self.players.bind_connection(connection_id, existing);
            self.lifecycle
                .set_player_count(self.players.connected_count());
            tracing::info!(player_id = existing, connection_id, "player resumed");
            return JoinResult::Resumed {
                player_id: existing.to_string(),
                replaced_connection,
            };
        }

        let name = sanitize_name(name);
        let player_id = match player_id {
            Some(requested) => requested.to_string(),
            None => self.make_id("player"),
        };
        match self.players.register(&player_id, &name) {
            JoinOutcome::Registered => {}
            JoinOutcome::NameTaken => {
                return JoinResult::Rejected {
                    reason: "name already taken",
                }
            }
            JoinOutcome::DuplicateId => {
                return JoinResult::Rejected {
                    reason: "player id already registered",
                }
            }
        }
        self.effects.ensure_player(&player_id);
        self.players.bind_connection(connection_id, &player_id);
        self.lifecycle
            .set_player_count(self.players.connected_count());
        tracing::info!(%player_id, %name, connection_id, "player joined");
        JoinResult::Joined { player_id }
    }

    pub fn bind_connection(&mut self, connection_id: &str, player_id: &str) -> Option<String> {
        let replaced = self.players.bind_connection(connection_id, player_id);
        self.lifecycle
            .set_player_count(self.players.connected_count());
        replaced
    }

    /// Detaches a connection. The player record and its score survive.
    pub fn disconnect(&mut self, connection_id: &str) -> Option<String> {
        let player_id = self.players.disconnect(connection_id)?;
        self.cursors.remove(&player_id);
        self.lifecycle
            .set_player_count(self.players.connected_count());
        tracing::info!(%player_id, connection_id, "player disconnected");
        Some(player_id)
    }

    pub fn player_for_connection(&self, connection_id: &str) -> Option<&str> {
        self.players.player_for_connection(connection_id)
    }

    pub fn connection_for_player(&self, player_id: &str) -> Option<&str> {
        self.players.connection_for_player(player_id)
    }

    pub fn get_chunk(&mut self, coord: ChunkCoord) -> Option<&Chunk> {
        if self.store.generate(coord).is_err() {
            return None;
        }
        if !self.config.eager_generation {
            self.lifecycle.set_total_mines(self.store.total_mines());
        }
        self.store.get_chunk(coord)
    }

    pub fn update_cursor(&mut self, player_id: &str, position: Position) -> bool {
        if !self.players.contains(player_id) || !self.world.in_bounds(position.x, position.y) {
            return false;
        }
        self.cursors.upsert(player_id.to_string(), position);
        true
    }

    /// Cursors a viewer should see: everything in its viewport except itself and
    /// invisible players.
    pub fn visible_cursors(&self, viewer_id: &str, viewport: (i32, i32)) -> Vec<CursorView> {
        let Some(center) = self.cursors.position(&viewer_id.to_string()) else {
            return Vec::new();
        };
        let mut cursors: Vec<CursorView> = self
            .cursors
            .query_viewport(center, viewport.0, viewport.1)
            .into_iter()
            .filter(|entity| entity.id != viewer_id && !self.effects.is_invisible(&entity.id))
            .map(|entity| CursorView {
                player_id: entity.id,
                x: entity.position.x,
                y: entity.position.y,
            })
            .collect();
        cursors.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        cursors
    }

    /// Players whose own viewport, as reported by `viewport_of`, covers the cursor
    /// of `player_id`. Agrees with what `visible_cursors` would show each of them.
    pub fn cursor_audience<F>(&self, player_id: &str, viewport_of: F) -> Vec<String>
    where
        F: Fn(&str) -> (i32, i32),
    {
        if self.effects.is_invisible(player_id) {
            return Vec::new();
        }
        let Some(mover) = self.cursors.position(&player_id.to_string()) else {
            return Vec::new();
        };
        // Widened by a bucket on each side so every viewer that could see the
        // mover is a candidate.
        let pad = self.cursors.cell_size() * 2 + 2;
        let mut audience: Vec<String> = self
            .cursors
            .query_viewport(mover, MAX_VIEWPORT.0 + pad, MAX_VIEWPORT.1 + pad)
            .into_iter()
            .filter(|viewer| viewer.id != player_id)
            .filter(|viewer| {
                let (width, height) = viewport_of(&viewer.id);
                self.cursors.viewport_contains(
                    viewer.position,
                    width.min(MAX_VIEWPORT.0),
                    height.min(MAX_VIEWPORT.1),
                    mover,
                )
            })
            .map(|viewer| viewer.id)
            .collect();
        audience.sort();
        audience
    }

    pub fn set_guild_bonus(&mut self, player_id: &str, bonus: f32) -> bool {
        self.players.set_guild_bonus(player_id, bonus)
    }

    pub fn leaderboard(&self) -> Vec<ScoreEntry> {
        self.players.leaderboard(self.config.leaderboard_size)
    }

    pub fn player_view(&self, player_id: &str, now_ms: u64) -> Option<PlayerView> {
        let record = self.players.get(player_id)?;
        let effects = self.effects.get(player_id)?;
        Some(PlayerView {
            id: record.id.clone(),
            name: record.name.clone(),
            connected: record.connected,
            score: record.round.score,
            cells_revealed: record.round.cells_revealed,
            mines_hit: record.round.mines_hit,
            combo: effects.combo.clone(),
            effects: self.effects.active_effects(player_id),
            skills: self.effects.skill_views(player_id, now_ms),
            invisible: effects.invisible,
            best_score: record.history.best_score,
            rounds_played: record.history.rounds_played,
        })
    }

    fn accepts_actions_from(&self, player_id: &str) -> bool {
        self.lifecycle.session().is_active() && self.players.contains(player_id)
    }

    /// Runs the threshold check every mutating action ends with.
    ///
    /// In lazy mode `total_mines` only covers chunks generated so far, so the mine
    /// ratio is measured against the explored part of the map.
    fn after_mutation(&mut self, now_ms: u64) {
        if !self.config.eager_generation {
            self.lifecycle.set_total_mines(self.store.total_mines());
        }
        if let Some(reason) = self.lifecycle.check_thresholds(now_ms) {
            self.emit_session_end(reason, now_ms);
        }
    }

    fn emit_session_end(&mut self, reason: EndReason, now_ms: u64) {
        let session = self.lifecycle.session().clone();
        let data = SessionEndData {
            duration_ms: now_ms.saturating_sub(session.start_time),
            ended_at_iso: iso_timestamp(now_ms),
            leaderboard: self.leaderboard(),
            reason,
            session,
        };
        tracing::info!(
            session_id = data.session.id,
            ?reason,
            duration_ms = data.duration_ms,
            "session ended"
        );
        self.events.push(EngineEvent::SessionEnded { data });
    }

    fn make_id(&mut self, prefix: &str) -> String {
        let id = format!("{}_{}", prefix, self.next_id_counter);
        self.next_id_counter = self.next_id_counter.saturating_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Rect, SessionState, Zone, ZoneType};
    use std::collections::HashMap;

    pub(super) fn small_config() -> GameConfig {
        GameConfig {
            width: 40,
            height: 40,
            chunk_size: 10,
            ..GameConfig::default()
        }
    }

    pub(super) fn uniform_config(density: f32) -> GameConfig {
        GameConfig {
            zones: vec![Zone {
                zone_type: ZoneType::Normal,
                mine_density: density,
                score_multiplier: 1.0,
                bounds: Rect {
                    x: 0,
                    y: 0,
                    width: 40,
                    height: 40,
                },
            }],
            ..small_config()
        }
    }

    pub(super) fn started(config: GameConfig) -> GameEngine {
        let mut engine = GameEngine::new(config, 1234).expect("engine");
        engine.start_new_session(0);
        engine.drain_events();
        engine
    }

    pub(super) fn join(engine: &mut GameEngine, name: &str) -> String {
        match engine.join(name, None, &format!("conn-{name}")) {
            JoinResult::Joined { player_id } => player_id,
            other => panic!("unexpected join result {other:?}"),
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = GameConfig {
            chunk_size: 7,
            ..small_config()
        };
        assert!(GameEngine::new(config, 1).is_err());
    }

    #[test]
    fn session_waits_until_started() {
        let mut engine = GameEngine::new(small_config(), 1).expect("engine");
        assert_eq!(engine.get_session().state, SessionState::Waiting);
        engine.start_new_session(100);
        let session = engine.get_session();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.total_cells, 1_600);
        assert_eq!(session.total_mines, engine.store().total_mines());
        assert!(matches!(
            engine.drain_events().as_slice(),
            [EngineEvent::SessionStarted { .. }]
        ));
    }

    #[test]
    fn same_seed_produces_same_map() {
        let a = started(small_config());
        let b = started(small_config());
        assert_eq!(a.get_session().seed, b.get_session().seed);
        assert_eq!(a.store().total_mines(), b.store().total_mines());
    }

    #[test]
    fn join_resume_and_disconnect() {
        let mut engine = started(small_config());
        let id = join(&mut engine, "Alice");
        assert_eq!(engine.get_session().player_count, 1);
        assert_eq!(
            engine.join("Mallory", None, "conn-x"),
            JoinResult::Joined {
                player_id: "player_2".to_string()
            }
        );
        assert_eq!(
            engine.join(" alice ", None, "conn-y"),
            JoinResult::Rejected {
                reason: "name already taken"
            }
        );

        let resumed = engine.join("Alice", Some(&id), "conn-2");
        assert_eq!(
            resumed,
            JoinResult::Resumed {
                player_id: id.clone(),
                replaced_connection: Some("conn-Alice".to_string()),
            }
        );
        assert_eq!(engine.player_for_connection("conn-2"), Some(id.as_str()));
        assert_eq!(engine.disconnect("conn-2"), Some(id.clone()));
        assert_eq!(engine.get_session().player_count, 1);
        assert!(engine.player_view(&id, 0).is_some());
    }

    #[test]
    fn cursor_visibility_is_scoped_and_respects_invisibility() {
        let mut engine = started(small_config());
        let alice = join(&mut engine, "Alice");
        let bob = join(&mut engine, "Bob");
        let carol = join(&mut engine, "Carol");
        assert!(engine.update_cursor(&alice, Position::new(2, 2)));
        assert!(engine.update_cursor(&bob, Position::new(5, 5)));
        assert!(engine.update_cursor(&carol, Position::new(6, 6)));
        assert!(!engine.update_cursor(&carol, Position::new(-1, 6)));

        let seen: Vec<_> = engine
            .visible_cursors(&alice, (20, 20))
            .into_iter()
            .map(|cursor| cursor.player_id)
            .collect();
        assert_eq!(seen, vec![bob.clone(), carol.clone()]);

        engine
            .effects
            .add_effect(&bob, crate::types::EffectKind::Invisibility, 1_000, None, 0);
        let seen: Vec<_> = engine
            .visible_cursors(&alice, (20, 20))
            .into_iter()
            .map(|cursor| cursor.player_id)
            .collect();
        assert_eq!(seen, vec![carol.clone()]);
        assert!(engine.cursor_audience(&bob, |_| (20, 20)).is_empty());
        assert_eq!(engine.cursor_audience(&carol, |_| (20, 20)), vec![alice.clone(), bob.clone()]);

        engine.disconnect("conn-Carol");
        assert!(engine.visible_cursors(&alice, (20, 20)).is_empty());
    }

    #[test]
    fn cursor_audience_uses_each_viewers_viewport() {
        let config = GameConfig {
            width: 200,
            height: 200,
            chunk_size: 50,
            proximity_cell_size: 4,
            ..GameConfig::default()
        };
        let mut engine = started(config);
        let alice = join(&mut engine, "Alice");
        let narrow = join(&mut engine, "Narrow");
        let wide = join(&mut engine, "Wide");
        let tiny = join(&mut engine, "Tiny");
        assert!(engine.update_cursor(&alice, Position::new(100, 100)));
        assert!(engine.update_cursor(&narrow, Position::new(130, 100)));
        assert!(engine.update_cursor(&wide, Position::new(130, 100)));
        assert!(engine.update_cursor(&tiny, Position::new(112, 100)));

        let viewports: HashMap<String, (i32, i32)> = [
            (narrow.clone(), (20, 20)),
            (wide.clone(), (80, 80)),
            (tiny.clone(), (4, 4)),
        ]
        .into_iter()
        .collect();
        let viewport_of = |id: &str| viewports.get(id).copied().unwrap_or((1, 1));

        let audience = engine.cursor_audience(&alice, viewport_of);
        assert_eq!(audience, vec![wide.clone()]);
        for viewer in [&narrow, &wide, &tiny] {
            let sees_alice = engine
                .visible_cursors(viewer, viewport_of(viewer.as_str()))
                .iter()
                .any(|cursor| cursor.player_id == alice);
            assert_eq!(sees_alice, audience.contains(viewer), "{viewer}");
        }
    }

    #[test]
    fn lazy_mode_mine_ratio_counts_generated_chunks_only() {
        let config = GameConfig {
            eager_generation: false,
            ..uniform_config(1.0)
        };
        let mut engine = started(config);
        let alice = join(&mut engine, "Alice");

        let mut exploded = 0u64;
        let first_chunk = (0..10).flat_map(|y| (0..10).map(move |x| Position::new(x, y)));
        for (i, cell) in first_chunk.enumerate() {
            if !engine.get_session().is_active() {
                break;
            }
            engine.reveal_cell(cell, &alice, 100 + i as u64);
            exploded += 1;
        }

        let session = engine.get_session();
        assert_eq!(engine.store().chunk_count(), 1);
        assert_eq!(session.total_mines, 100);
        assert_eq!(session.end_reason, Some(EndReason::MineRatio));
        // Measured against the 100 generated mines, not the 1600 on the map.
        assert!((29..=31).contains(&exploded), "{exploded}");
    }

    #[test]
    fn serialized_session_never_carries_the_seed() {
        let mut engine = GameEngine::new(small_config(), 1234).expect("engine");
        engine.start_new_session(0);

        let value = serde_json::to_value(engine.get_session()).expect("session json");
        assert!(value.get("seed").is_none());
        assert!(value.get("totalMines").is_some());

        let events = engine.drain_events();
        assert!(!events.is_empty());
        for event in events {
            let raw = serde_json::to_string(&event).expect("event json");
            assert!(!raw.contains("\"seed\""), "{raw}");
        }
    }

    #[test]
    fn lazy_mode_generates_chunks_on_request() {
        let config = GameConfig {
            eager_generation: false,
            ..small_config()
        };
        let mut engine = started(config);
        assert_eq!(engine.store().chunk_count(), 0);
        assert!(engine.get_chunk(ChunkCoord::new(1, 2)).is_some());
        assert!(engine.get_chunk(ChunkCoord::new(9, 9)).is_none());
        assert_eq!(engine.store().chunk_count(), 1);
        assert_eq!(engine.get_session().total_mines, engine.store().total_mines());
    }

    #[test]
    fn time_limit_runs_the_full_round_chain() {
        let config = GameConfig {
            session_max_duration_ms: 1_000,
            ..small_config()
        };
        let end_countdown = config.end_countdown_ms;
        let restart_delay = config.restart_delay_ms;
        let mut engine = started(config);
        let first = engine.get_session().id;

        engine.tick(1_000);
        let events = engine.drain_events();
        match events.as_slice() {
            [EngineEvent::SessionEnded { data }] => {
                assert_eq!(data.reason, EndReason::TimeLimit);
                assert_eq!(data.duration_ms, 1_000);
                assert_eq!(data.ended_at_iso, "1970-01-01T00:00:01.000Z");
            }
            other => panic!("unexpected events {other:?}"),
        }

        engine.tick(1_000 + end_countdown);
        assert!(matches!(
            engine.drain_events().as_slice(),
            [EngineEvent::SessionFinished { .. }]
        ));
        engine.tick(1_000 + end_countdown + restart_delay);
        assert!(matches!(
            engine.drain_events().as_slice(),
            [EngineEvent::SessionStarted { .. }]
        ));
        assert!(engine.get_session().is_active());
        assert_ne!(engine.get_session().id, first);
    }
}
