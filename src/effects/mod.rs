//! Per-player timed state: skill cooldowns and durations, stackable item effects,
//! and combo/fever escalation. Every expiry goes through one [`TimerQueue`] keyed
//! by `(player, purpose)`, so a reset or a re-schedule can never leave a stale
//! callback behind.

mod combo;
mod items;
mod skills;

use std::collections::HashMap;

use crate::config::GameConfig;
use crate::timers::TimerQueue;
use crate::types::{ActiveEffect, ComboState, EffectKind, EngineEvent, PlayerSkillState, SkillKind};

pub use combo::ComboUpdate;
pub use skills::CooldownCheck;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    SkillEnd(SkillKind),
    EffectEnd(EffectKind),
    FeverEnd,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlayerTimer {
    pub player_id: String,
    pub purpose: TimerPurpose,
}

impl PlayerTimer {
    fn new(player_id: &str, purpose: TimerPurpose) -> Self {
        Self {
            player_id: player_id.to_string(),
            purpose,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlayerEffects {
    pub skills: [PlayerSkillState; SkillKind::COUNT],
    pub effects: HashMap<EffectKind, ActiveEffect>,
    pub combo: ComboState,
    pub best_combo: u32,
    pub cooldown_reduction: f32,
    // Derived from `effects`; recomputed on every apply/remove.
    pub score_multiplier: f32,
    pub invisible: bool,
}

impl PlayerEffects {
    pub fn new() -> Self {
        Self {
            skills: SkillKind::ALL.map(PlayerSkillState::new),
            effects: HashMap::new(),
            combo: ComboState::new(),
            best_combo: 0,
            cooldown_reduction: 0.0,
            score_multiplier: 1.0,
            invisible: false,
        }
    }

    pub fn skill(&self, skill: SkillKind) -> &PlayerSkillState {
        &self.skills[skill.index()]
    }

    fn skill_mut(&mut self, skill: SkillKind) -> &mut PlayerSkillState {
        &mut self.skills[skill.index()]
    }
}

impl Default for PlayerEffects {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct PlayerEffectStore {
    config: GameConfig,
    players: HashMap<String, PlayerEffects>,
    timers: TimerQueue<PlayerTimer>,
}

impl PlayerEffectStore {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            players: HashMap::new(),
            timers: TimerQueue::new(),
        }
    }

    pub fn ensure_player(&mut self, player_id: &str) {
        if !self.players.contains_key(player_id) {
            self.players
                .insert(player_id.to_string(), PlayerEffects::new());
        }
    }

    pub fn remove_player(&mut self, player_id: &str) {
        self.timers
            .cancel_where(|timer| timer.player_id == player_id);
        self.players.remove(player_id);
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerEffects> {
        self.players.get(player_id)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Cancels every pending player timer, then rewrites all per-round state.
    pub fn reset_for_new_session(&mut self) {
        self.timers.clear();
        for state in self.players.values_mut() {
            *state = PlayerEffects::new();
        }
        tracing::debug!(players = self.players.len(), "player effects reset");
    }

    /// Applies every timer due at `now_ms`. Handlers re-check state, so a timer
    /// that lost a race with a manual change is a no-op.
    pub fn tick(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for timer in self.timers.pop_due(now_ms) {
            let event = match timer.purpose {
                TimerPurpose::SkillEnd(skill) => self.end_skill(&timer.player_id, skill, now_ms),
                TimerPurpose::EffectEnd(kind) => {
                    self.expire_effect(&timer.player_id, kind, now_ms)
                }
                TimerPurpose::FeverEnd => self.end_fever(&timer.player_id, now_ms),
            };
            events.extend(event);
        }
        events
    }
}
