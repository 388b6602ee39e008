use serde::Serialize;

use super::{PlayerEffectStore, PlayerTimer, TimerPurpose};
use crate::constants::combo_multiplier;
use crate::types::{ComboState, EngineEvent};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboUpdate {
    pub combo: ComboState,
    pub fever_triggered: bool,
}

impl PlayerEffectStore {
    fn fever_timer(player_id: &str) -> PlayerTimer {
        PlayerTimer::new(player_id, TimerPurpose::FeverEnd)
    }

    fn reset_combo(&mut self, player_id: &str) {
        self.timers.cancel(&Self::fever_timer(player_id));
        if let Some(state) = self.players.get_mut(player_id) {
            state.combo = ComboState::new();
        }
    }

    /// Counts one reveal action towards the streak.
    pub fn on_reveal(&mut self, player_id: &str, now_ms: u64) -> Option<ComboUpdate> {
        let window = self.config.combo_timeout_ms + self.config.combo_latency_buffer_ms;
        let expired = self
            .players
            .get(player_id)?
            .combo
            .last_reveal_time
            .is_some_and(|last| now_ms.saturating_sub(last) > window);
        if expired {
            self.reset_combo(player_id);
        }

        let fever_threshold = self.config.fever_threshold;
        let fever_until = now_ms + self.config.fever_duration_ms;
        let multiplier = |count| {
            combo_multiplier(
                count,
                &self.config.combo_thresholds,
                self.config.combo_multiplier_step,
                self.config.combo_max_multiplier,
            )
        };

        let state = self.players.get_mut(player_id)?;
        let previous = state.combo.count;
        state.combo.count += 1;
        state.combo.multiplier = multiplier(state.combo.count);
        state.combo.last_reveal_time = Some(now_ms);
        state.best_combo = state.best_combo.max(state.combo.count);

        let fever_triggered = !state.combo.is_fever
            && previous < fever_threshold
            && state.combo.count >= fever_threshold;
        if fever_triggered {
            state.combo.is_fever = true;
            state.combo.fever_end_time = Some(fever_until);
        }
        let combo = state.combo.clone();

        if fever_triggered {
            self.timers
                .schedule(Self::fever_timer(player_id), fever_until);
            tracing::debug!(player_id, count = combo.count, "fever started");
        }
        Some(ComboUpdate {
            combo,
            fever_triggered,
        })
    }

    /// A real mine hit breaks the streak and any fever in progress.
    pub fn on_mine_hit(&mut self, player_id: &str) {
        self.reset_combo(player_id);
    }

    /// Fever multiplier while fever runs, otherwise the streak multiplier.
    pub fn effective_combo_multiplier(&self, player_id: &str) -> f32 {
        match self.players.get(player_id) {
            Some(state) if state.combo.is_fever => self.config.fever_multiplier,
            Some(state) => state.combo.multiplier,
            None => 1.0,
        }
    }

    pub fn best_combo(&self, player_id: &str) -> u32 {
        self.players
            .get(player_id)
            .map(|state| state.best_combo)
            .unwrap_or(0)
    }

    pub(super) fn end_fever(&mut self, player_id: &str, now_ms: u64) -> Option<EngineEvent> {
        let combo = &mut self.players.get_mut(player_id)?.combo;
        if !combo.is_fever || combo.fever_end_time.is_some_and(|end| end > now_ms) {
            return None;
        }
        combo.is_fever = false;
        combo.fever_end_time = None;
        Some(EngineEvent::FeverEnded {
            player_id: player_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::GameConfig;
    use crate::effects::PlayerEffectStore;
    use crate::types::EngineEvent;

    fn store() -> PlayerEffectStore {
        let mut store = PlayerEffectStore::new(GameConfig::default());
        store.ensure_player("p1");
        store
    }

    #[test]
    fn streak_survives_short_gap_and_resets_after_long_one() {
        let mut store = store();
        store.on_reveal("p1", 0);
        let update = store.on_reveal("p1", 4_000).expect("player");
        assert_eq!(update.combo.count, 2);

        let update = store.on_reveal("p1", 10_000).expect("player");
        assert_eq!(update.combo.count, 1);
        assert_eq!(update.combo.multiplier, 1.0);
    }

    #[test]
    fn latency_buffer_extends_the_window() {
        let mut store = store();
        store.on_reveal("p1", 0);
        assert_eq!(store.on_reveal("p1", 5_500).expect("player").combo.count, 2);
        assert_eq!(store.on_reveal("p1", 11_001).expect("player").combo.count, 1);
    }

    #[test]
    fn multiplier_steps_at_thresholds() {
        let mut store = store();
        let mut last = None;
        for i in 0..10 {
            last = store.on_reveal("p1", i * 100);
        }
        let combo = last.expect("player").combo;
        assert_eq!(combo.count, 10);
        assert_eq!(combo.multiplier, 2.0);
    }

    #[test]
    fn fever_triggers_once_and_ends_on_timer() {
        let config = GameConfig::default();
        let mut store = store();
        let mut triggers = 0;
        for i in 0..40u64 {
            if store.on_reveal("p1", i * 10).expect("player").fever_triggered {
                triggers += 1;
            }
        }
        assert_eq!(triggers, 1);
        assert_eq!(
            store.effective_combo_multiplier("p1"),
            config.fever_multiplier
        );

        let fever_started_at = (config.fever_threshold as u64 - 1) * 10;
        let events = store.tick(fever_started_at + config.fever_duration_ms);
        assert_eq!(
            events,
            vec![EngineEvent::FeverEnded {
                player_id: "p1".to_string()
            }]
        );
        let state = store.get("p1").expect("player");
        assert!(!state.combo.is_fever);
        assert_eq!(state.combo.count, 40);
        assert_eq!(store.effective_combo_multiplier("p1"), 3.0);
    }

    #[test]
    fn mine_hit_resets_combo_and_cancels_fever() {
        let mut store = store();
        for i in 0..30u64 {
            store.on_reveal("p1", i);
        }
        assert!(store.get("p1").expect("player").combo.is_fever);
        store.on_mine_hit("p1");
        let combo = &store.get("p1").expect("player").combo;
        assert_eq!(combo.count, 0);
        assert_eq!(combo.multiplier, 1.0);
        assert!(!combo.is_fever);
        assert_eq!(store.pending_timers(), 0);
        assert_eq!(store.best_combo("p1"), 30);
    }
}
