use super::{PlayerEffectStore, PlayerEffects, PlayerTimer, TimerPurpose};
use crate::types::{ActiveEffect, EffectKind, EngineEvent};

impl PlayerEffects {
    /// Derived flags are a pure function of the effect map, so applying or
    /// reverting twice lands on the same state.
    fn sync_side_effects(&mut self) {
        self.score_multiplier = self
            .effects
            .get(&EffectKind::DoublePoints)
            .and_then(|effect| effect.value)
            .unwrap_or(1.0);
        self.invisible = self.effects.contains_key(&EffectKind::Invisibility);
    }
}

impl PlayerEffectStore {
    /// Starts an effect, or extends a running one by `duration_ms` on top of
    /// whatever remains. The previous expiry is replaced.
    pub fn add_effect(
        &mut self,
        player_id: &str,
        kind: EffectKind,
        duration_ms: u64,
        value: Option<f32>,
        now_ms: u64,
    ) -> Option<ActiveEffect> {
        let state = self.players.get_mut(player_id)?;
        let effect = match state.effects.get_mut(&kind) {
            Some(existing) if existing.end_time > now_ms => {
                let remaining = existing.end_time - now_ms;
                existing.end_time = now_ms + remaining + duration_ms;
                existing.stack_count += 1;
                if value.is_some() {
                    existing.value = value;
                }
                existing.clone()
            }
            _ => {
                let effect = ActiveEffect {
                    kind,
                    start_time: now_ms,
                    end_time: now_ms + duration_ms,
                    value,
                    stack_count: 1,
                };
                state.effects.insert(kind, effect.clone());
                effect
            }
        };
        state.sync_side_effects();
        self.timers.schedule(
            PlayerTimer::new(player_id, TimerPurpose::EffectEnd(kind)),
            effect.end_time,
        );
        Some(effect)
    }

    /// Removes an effect early. Returns whether anything was removed.
    pub fn remove_effect(&mut self, player_id: &str, kind: EffectKind) -> bool {
        self.timers
            .cancel(&PlayerTimer::new(player_id, TimerPurpose::EffectEnd(kind)));
        let Some(state) = self.players.get_mut(player_id) else {
            return false;
        };
        let removed = state.effects.remove(&kind).is_some();
        state.sync_side_effects();
        removed
    }

    pub(super) fn expire_effect(
        &mut self,
        player_id: &str,
        kind: EffectKind,
        now_ms: u64,
    ) -> Option<EngineEvent> {
        let state = self.players.get_mut(player_id)?;
        if state.effects.get(&kind)?.end_time > now_ms {
            return None;
        }
        state.effects.remove(&kind);
        state.sync_side_effects();
        Some(EngineEvent::EffectExpired {
            player_id: player_id.to_string(),
            kind,
        })
    }

    /// Adds one charm's worth of cooldown reduction, capped. Returns the new total.
    pub fn apply_cooldown_charm(&mut self, player_id: &str) -> Option<f32> {
        let step = self.config.cooldown_charm_step;
        let cap = self.config.max_cooldown_reduction;
        let state = self.players.get_mut(player_id)?;
        state.cooldown_reduction = (state.cooldown_reduction + step).min(cap);
        Some(state.cooldown_reduction)
    }

    pub fn score_multiplier(&self, player_id: &str) -> f32 {
        self.players
            .get(player_id)
            .map(|state| state.score_multiplier)
            .unwrap_or(1.0)
    }

    pub fn is_invisible(&self, player_id: &str) -> bool {
        self.players
            .get(player_id)
            .map(|state| state.invisible)
            .unwrap_or(false)
    }

    pub fn active_effects(&self, player_id: &str) -> Vec<ActiveEffect> {
        let Some(state) = self.players.get(player_id) else {
            return Vec::new();
        };
        let mut effects: Vec<_> = state.effects.values().cloned().collect();
        effects.sort_by_key(|effect| effect.end_time);
        effects
    }
}
