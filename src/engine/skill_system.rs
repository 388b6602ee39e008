use super::utils::square_around;
use super::GameEngine;
use crate::types::{
    Cell, EffectKind, ItemKind, ItemUseResult, Position, SkillKind, SkillUseResult,
};

impl GameEngine {
    /// Checks the cooldown, performs the skill's map action and only then records
    /// the use, so a rejected target never costs a cooldown.
    pub fn use_skill(
        &mut self,
        player_id: &str,
        skill: SkillKind,
        target: Option<Position>,
        now_ms: u64,
    ) -> SkillUseResult {
        if !self.accepts_actions_from(player_id) {
            return SkillUseResult::fail("no active session for this player");
        }
        let check = self.effects.can_use(player_id, skill, now_ms);
        if !check.can_use {
            return SkillUseResult::fail(format!(
                "skill on cooldown for {} ms",
                check.remaining_cooldown_ms
            ));
        }

        let result = match skill {
            SkillKind::Shield => SkillUseResult {
                success: true,
                affected_cells: None,
                message: format!(
                    "shield active for {} ms",
                    self.config.shield_duration_ms
                ),
            },
            SkillKind::Scan | SkillKind::Sweep => {
                let Some(target) = target.filter(|p| self.world.in_bounds(p.x, p.y)) else {
                    return SkillUseResult::fail("skill needs a target inside the map");
                };
                if skill == SkillKind::Scan {
                    self.scan(target)
                } else {
                    self.sweep(player_id, target, now_ms)
                }
            }
        };

        self.effects.use_skill(player_id, skill, now_ms);
        tracing::debug!(player_id, ?skill, "skill used");
        result
    }

    /// Hidden mines around the target, reported to the caller only.
    fn scan(&mut self, target: Position) -> SkillUseResult {
        let radius = self.config.scan_radius;
        let mines: Vec<Position> = square_around(target, radius)
            .filter(|p| {
                self.store
                    .load_cell(p.x, p.y)
                    .map(|cell| cell.is_hidden() && cell.is_mine)
                    .unwrap_or(false)
            })
            .collect();
        SkillUseResult {
            success: true,
            message: format!("{} mines detected", mines.len()),
            affected_cells: Some(mines),
        }
    }

    /// Reveals every hidden safe cell in the 3x3 block around the target.
    fn sweep(&mut self, player_id: &str, target: Position, now_ms: u64) -> SkillUseResult {
        let mut revealed: Vec<Cell> = Vec::new();
        for p in square_around(target, 1) {
            let safe_and_hidden = self
                .store
                .load_cell(p.x, p.y)
                .map(|cell| cell.is_hidden() && !cell.is_mine)
                .unwrap_or(false);
            if !safe_and_hidden {
                continue;
            }
            let result = self
                .reveal
                .reveal(&mut self.store, p.x, p.y, player_id, now_ms);
            revealed.extend(result.cells);
        }

        self.credit_safe_cells(player_id, &revealed);
        self.after_mutation(now_ms);
        SkillUseResult {
            success: true,
            message: format!("{} cells swept", revealed.len()),
            affected_cells: Some(
                revealed
                    .iter()
                    .map(|cell| Position::new(cell.x, cell.y))
                    .collect(),
            ),
        }
    }

    /// Buys an item with round score and applies it.
    pub fn use_item(&mut self, player_id: &str, item: ItemKind, now_ms: u64) -> ItemUseResult {
        if !self.accepts_actions_from(player_id) {
            return ItemUseResult::fail("no active session for this player");
        }
        if item == ItemKind::CooldownCharm {
            let reduction = self
                .effects
                .get(player_id)
                .map(|state| state.cooldown_reduction)
                .unwrap_or(0.0);
            if reduction >= self.config.max_cooldown_reduction {
                return ItemUseResult::fail("cooldown reduction already at maximum");
            }
        }
        let price = self.config.item_price(item);
        if !self.players.spend(player_id, price) {
            return ItemUseResult::fail(format!("item costs {price} points"));
        }

        let result = match item.effect_kind() {
            Some(kind) => {
                let (duration, value) = match kind {
                    EffectKind::DoublePoints => (
                        self.config.double_points_duration_ms,
                        Some(self.config.double_points_multiplier),
                    ),
                    EffectKind::Invisibility => (self.config.invisibility_duration_ms, None),
                };
                match self
                    .effects
                    .add_effect(player_id, kind, duration, value, now_ms)
                {
                    Some(effect) => ItemUseResult {
                        success: true,
                        message: format!("{kind:?} active until {}", effect.end_time),
                        effect: Some(effect),
                    },
                    None => ItemUseResult::fail("unknown player"),
                }
            }
            None => match self.effects.apply_cooldown_charm(player_id) {
                Some(reduction) => ItemUseResult {
                    success: true,
                    effect: None,
                    message: format!(
                        "cooldowns reduced by {:.0}%",
                        reduction * 100.0
                    ),
                },
                None => ItemUseResult::fail("unknown player"),
            },
        };
        tracing::debug!(player_id, ?item, success = result.success, "item used");
        result
    }
}
