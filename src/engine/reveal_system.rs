use super::scoring::{base_points, reveal_points, ScoreMultipliers};
use super::GameEngine;
use crate::constants::guild_multiplier;
use crate::types::{Cell, CellState, EngineEvent, Position, RevealOutcome};

impl GameEngine {
    /// Reveals a cell for a player and runs the rest of the pipeline: combo,
    /// score, shield and the session end check.
    pub fn reveal_cell(&mut self, position: Position, player_id: &str, now_ms: u64) -> RevealOutcome {
        if !self.accepts_actions_from(player_id) {
            return RevealOutcome::no_op();
        }
        let result = self
            .reveal
            .reveal(&mut self.store, position.x, position.y, player_id, now_ms);
        if result.is_empty() {
            return RevealOutcome::no_op();
        }

        let mut outcome = RevealOutcome {
            result,
            ..RevealOutcome::no_op()
        };
        if outcome.result.hit_mine {
            self.resolve_mine_hit(player_id, now_ms, &mut outcome);
        } else {
            let fever_until = self.effects.on_reveal(player_id, now_ms).and_then(|update| {
                outcome.combo = update.combo.count;
                outcome.fever_triggered = update.fever_triggered;
                update.combo.fever_end_time.filter(|_| update.fever_triggered)
            });
            if let Some(until) = fever_until {
                self.events.push(EngineEvent::FeverStarted {
                    player_id: player_id.to_string(),
                    until,
                });
            }
            outcome.points = self.credit_safe_cells(player_id, &outcome.result.cells);
        }

        self.after_mutation(now_ms);
        outcome
    }

    /// Hidden → Flagged, or back to Hidden for the player who placed the flag.
    pub fn flag_cell(&mut self, position: Position, player_id: &str) -> Option<Cell> {
        if !self.accepts_actions_from(player_id) {
            return None;
        }
        let cell = self
            .reveal
            .toggle_flag(&mut self.store, position.x, position.y, player_id)?;
        if cell.state == CellState::Flagged {
            if let Some(round) = self.players.round_mut(player_id) {
                round.flags_placed += 1;
            }
        }
        Some(cell)
    }

    fn resolve_mine_hit(&mut self, player_id: &str, now_ms: u64, outcome: &mut RevealOutcome) {
        if self.effects.consume_shield(player_id, now_ms) {
            outcome.shielded = true;
            outcome.combo = self
                .effects
                .get(player_id)
                .map(|state| state.combo.count)
                .unwrap_or(0);
            if let Some(round) = self.players.round_mut(player_id) {
                round.mines_defused += 1;
            }
            tracing::debug!(player_id, "mine absorbed by shield");
            return;
        }

        self.effects.on_mine_hit(player_id);
        self.lifecycle.record_explosion();
        let before = self
            .players
            .get(player_id)
            .map(|player| player.round.score)
            .unwrap_or(0);
        let after = self
            .players
            .add_score(player_id, -self.config.mine_penalty)
            .unwrap_or(before);
        if let Some(round) = self.players.round_mut(player_id) {
            round.mines_hit += 1;
        }
        outcome.points = after - before;
    }

    /// Scores freshly revealed safe cells and books them on the round and session.
    pub(super) fn credit_safe_cells(&mut self, player_id: &str, cells: &[Cell]) -> i64 {
        let safe = cells.iter().filter(|cell| !cell.is_mine).count() as u64;
        if safe == 0 {
            return 0;
        }
        let multipliers = ScoreMultipliers {
            combo: self.effects.effective_combo_multiplier(player_id),
            item: self.effects.score_multiplier(player_id),
            guild: guild_multiplier(
                self.players.guild_bonus(player_id),
                self.config.max_guild_bonus,
            ),
        };
        let points = reveal_points(
            base_points(cells, &self.world, self.config.base_cell_points),
            multipliers,
        );
        self.players.add_score(player_id, points);
        let best_combo = self.effects.best_combo(player_id);
        if let Some(round) = self.players.round_mut(player_id) {
            round.cells_revealed += safe;
            round.best_combo = round.best_combo.max(best_combo);
        }
        self.lifecycle.record_reveals(safe);
        points
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{join, small_config, started, uniform_config};
    use crate::config::GameConfig;
    use crate::types::{EndReason, EngineEvent, Position, SessionState, SkillKind};
    use crate::GameEngine;

    fn first_cell(engine: &GameEngine, mine: bool) -> Position {
        (0..40)
            .flat_map(|y| (0..40).map(move |x| Position::new(x, y)))
            .find(|p| {
                engine
                    .store()
                    .get_cell(p.x, p.y)
                    .map(|cell| cell.is_mine == mine)
                    .unwrap_or(false)
            })
            .expect("cell of requested kind")
    }

    #[test]
    fn safe_map_reveal_scores_and_counts() {
        let mut engine = started(uniform_config(0.0));
        let alice = join(&mut engine, "Alice");
        let outcome = engine.reveal_cell(Position::new(3, 3), &alice, 10);
        assert_eq!(outcome.result.cells.len(), 500);
        assert!(outcome.result.truncated);
        assert_eq!(outcome.combo, 1);
        // 500 cells × 1 point × zone 1.0 × combo 1.0
        assert_eq!(outcome.points, 500);

        let view = engine.player_view(&alice, 10).expect("player");
        assert_eq!(view.score, 500);
        assert_eq!(view.cells_revealed, 500);
        assert_eq!(engine.get_session().cells_revealed, 500);
    }

    #[test]
    fn unknown_player_and_inactive_session_are_no_ops() {
        let mut engine = GameEngine::new(small_config(), 3).expect("engine");
        let alice = join(&mut engine, "Alice");
        assert!(engine.reveal_cell(Position::new(1, 1), &alice, 0).result.is_empty());

        let mut engine = started(small_config());
        assert!(engine
            .reveal_cell(Position::new(1, 1), "nobody", 0)
            .result
            .is_empty());
    }

    #[test]
    fn mine_hit_costs_penalty_and_resets_combo() {
        let mut engine = started(uniform_config(0.2));
        let alice = join(&mut engine, "Alice");
        engine.players.add_score(&alice, 80);
        engine.effects.on_reveal(&alice, 0);
        let mine = first_cell(&engine, true);

        let outcome = engine.reveal_cell(mine, &alice, 100);
        assert!(outcome.result.hit_mine);
        assert!(!outcome.shielded);
        assert_eq!(outcome.points, -50);
        assert_eq!(outcome.combo, 0);
        assert_eq!(engine.get_session().mines_exploded, 1);
        let view = engine.player_view(&alice, 100).expect("player");
        assert_eq!(view.score, 30);
        assert_eq!(view.mines_hit, 1);
    }

    #[test]
    fn shield_defuses_mine_without_penalty() {
        let mut engine = started(uniform_config(0.2));
        let alice = join(&mut engine, "Alice");
        engine.players.add_score(&alice, 80);
        assert!(engine.use_skill(&alice, SkillKind::Shield, None, 0).success);
        engine.effects.on_reveal(&alice, 0);
        let mine = first_cell(&engine, true);

        let outcome = engine.reveal_cell(mine, &alice, 1_000);
        assert!(outcome.shielded);
        assert_eq!(outcome.points, 0);
        assert_eq!(outcome.combo, 1);
        assert_eq!(engine.get_session().mines_exploded, 0);
        assert_eq!(engine.player_view(&alice, 1_000).expect("player").score, 80);
        assert!(!engine.effects.has_shield(&alice, 1_001));
    }

    #[test]
    fn fever_emits_event_and_boosts_points() {
        let mut engine = started(uniform_config(0.0));
        let alice = join(&mut engine, "Alice");
        for i in 0..29 {
            engine.effects.on_reveal(&alice, i);
        }
        let outcome = engine.reveal_cell(Position::new(0, 0), &alice, 30);
        assert!(outcome.fever_triggered);
        assert_eq!(outcome.points, 500 * 5);
        assert!(engine
            .drain_events()
            .iter()
            .any(|event| matches!(event, EngineEvent::FeverStarted { until, .. } if *until == 10_030)));
    }

    #[test]
    fn guild_and_double_points_compound() {
        let mut engine = started(uniform_config(0.0));
        let alice = join(&mut engine, "Alice");
        engine.set_guild_bonus(&alice, 0.5);
        engine
            .effects
            .add_effect(&alice, crate::types::EffectKind::DoublePoints, 30_000, Some(2.0), 0);
        let outcome = engine.reveal_cell(Position::new(0, 0), &alice, 10);
        assert_eq!(outcome.points, 1_500);
    }

    #[test]
    fn exploding_thirty_percent_of_mines_ends_round() {
        let config = GameConfig {
            mine_ratio_threshold: 0.3,
            ..uniform_config(0.01)
        };
        let mut engine = started(config);
        let alice = join(&mut engine, "Alice");
        let total = engine.get_session().total_mines;
        assert!(total > 0);

        let mines: Vec<Position> = (0..40)
            .flat_map(|y| (0..40).map(move |x| Position::new(x, y)))
            .filter(|p| engine.store().get_cell(p.x, p.y).expect("cell").is_mine)
            .collect();
        let mut exploded = 0u64;
        for (i, mine) in mines.iter().enumerate() {
            if !engine.get_session().is_active() {
                break;
            }
            engine.reveal_cell(*mine, &alice, 100 + i as u64);
            exploded += 1;
        }
        assert!(exploded as f32 / total as f32 >= 0.3);
        assert!(((exploded - 1) as f32 / total as f32) < 0.3);

        let session = engine.get_session();
        assert_eq!(session.state, SessionState::Ending);
        assert_eq!(session.end_reason, Some(EndReason::MineRatio));
        let ended = engine.drain_events().into_iter().find_map(|event| match event {
            EngineEvent::SessionEnded { data } => Some(data),
            _ => None,
        });
        let data = ended.expect("session end data");
        assert_eq!(data.leaderboard.len(), 1);
        assert_eq!(data.leaderboard[0].mines_hit as u64, exploded);
    }

    #[test]
    fn flag_toggles_and_counts() {
        let mut engine = started(small_config());
        let alice = join(&mut engine, "Alice");
        let bob = join(&mut engine, "Bob");
        let target = Position::new(4, 4);
        assert!(engine.flag_cell(target, &alice).is_some());
        assert!(engine.flag_cell(target, &bob).is_none());
        assert!(engine.reveal_cell(target, &bob, 5).result.is_empty());
        assert!(engine.flag_cell(target, &alice).is_some());
        let flags = engine
            .players
            .get(&alice)
            .map(|player| player.round.flags_placed);
        assert_eq!(flags, Some(1));
    }
}
