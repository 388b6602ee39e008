use serde::Serialize;

use super::{PlayerEffectStore, PlayerTimer, TimerPurpose};
use crate::types::{EngineEvent, SkillCooldownView, SkillKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownCheck {
    pub can_use: bool,
    pub remaining_cooldown_ms: u64,
}

impl PlayerEffectStore {
    fn effective_cooldown_ms(&self, skill: SkillKind, reduction: f32) -> u64 {
        let base = self.config.skill_cooldown_ms(skill) as f32;
        (base * (1.0 - reduction.clamp(0.0, 1.0))).round() as u64
    }

    pub fn can_use(&self, player_id: &str, skill: SkillKind, now_ms: u64) -> CooldownCheck {
        let Some(state) = self.players.get(player_id) else {
            return CooldownCheck {
                can_use: false,
                remaining_cooldown_ms: 0,
            };
        };
        let Some(last_used) = state.skill(skill).last_used else {
            return CooldownCheck {
                can_use: true,
                remaining_cooldown_ms: 0,
            };
        };
        let cooldown = self.effective_cooldown_ms(skill, state.cooldown_reduction);
        let remaining = cooldown.saturating_sub(now_ms.saturating_sub(last_used));
        CooldownCheck {
            can_use: remaining == 0,
            remaining_cooldown_ms: remaining,
        }
    }

    /// Records a use. Duration skills switch on and arm their deactivation timer,
    /// replacing any previous one for the same skill.
    pub fn use_skill(&mut self, player_id: &str, skill: SkillKind, now_ms: u64) -> bool {
        if !self.can_use(player_id, skill, now_ms).can_use {
            return false;
        }
        let duration = self.config.skill_duration_ms(skill);
        let Some(state) = self.players.get_mut(player_id) else {
            return false;
        };
        let slot = state.skill_mut(skill);
        slot.last_used = Some(now_ms);

        if let Some(duration) = duration {
            let until = now_ms + duration;
            slot.is_active = true;
            slot.active_until = Some(until);
            self.timers.schedule(
                PlayerTimer::new(player_id, TimerPurpose::SkillEnd(skill)),
                until,
            );
        }
        true
    }

    pub fn has_shield(&self, player_id: &str, now_ms: u64) -> bool {
        self.players
            .get(player_id)
            .map(|state| {
                let shield = state.skill(SkillKind::Shield);
                shield.is_active && shield.active_until.is_some_and(|until| until > now_ms)
            })
            .unwrap_or(false)
    }

    /// Spends an active shield. The expiry is re-validated here, so a shield whose
    /// deactivation timer has not run yet still counts as gone once it is due.
    pub fn consume_shield(&mut self, player_id: &str, now_ms: u64) -> bool {
        let available = self.has_shield(player_id, now_ms);
        let Some(state) = self.players.get_mut(player_id) else {
            return false;
        };
        let shield = state.skill_mut(SkillKind::Shield);
        if !shield.is_active {
            return false;
        }
        shield.is_active = false;
        shield.active_until = None;
        self.timers.cancel(&PlayerTimer::new(
            player_id,
            TimerPurpose::SkillEnd(SkillKind::Shield),
        ));
        available
    }

    pub(super) fn end_skill(
        &mut self,
        player_id: &str,
        skill: SkillKind,
        now_ms: u64,
    ) -> Option<EngineEvent> {
        let slot = self.players.get_mut(player_id)?.skill_mut(skill);
        if !slot.is_active || slot.active_until.is_some_and(|until| until > now_ms) {
            return None;
        }
        slot.is_active = false;
        slot.active_until = None;
        Some(EngineEvent::SkillEnded {
            player_id: player_id.to_string(),
            skill,
        })
    }

    pub fn skill_views(&self, player_id: &str, now_ms: u64) -> Vec<SkillCooldownView> {
        let Some(state) = self.players.get(player_id) else {
            return Vec::new();
        };
        SkillKind::ALL
            .iter()
            .map(|&skill| {
                let check = self.can_use(player_id, skill, now_ms);
                SkillCooldownView {
                    skill,
                    ready: check.can_use,
                    remaining_cooldown_ms: check.remaining_cooldown_ms,
                    is_active: state.skill(skill).is_active,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::GameConfig;
    use crate::effects::PlayerEffectStore;
    use crate::types::SkillKind;

    fn store() -> PlayerEffectStore {
        let mut store = PlayerEffectStore::new(GameConfig::default());
        store.ensure_player("p1");
        store
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let mut store = store();
        assert!(store.use_skill("p1", SkillKind::Scan, 1_000));
        let check = store.can_use("p1", SkillKind::Scan, 11_000);
        assert!(!check.can_use);
        assert_eq!(check.remaining_cooldown_ms, 20_000);
        assert!(!store.use_skill("p1", SkillKind::Scan, 11_000));
        assert!(store.use_skill("p1", SkillKind::Scan, 31_000));
    }

    #[test]
    fn cooldown_reduction_shortens_wait() {
        let mut store = store();
        store.apply_cooldown_charm("p1");
        store.apply_cooldown_charm("p1");
        store.use_skill("p1", SkillKind::Sweep, 0);
        // 45 s * 0.8
        assert!(!store.can_use("p1", SkillKind::Sweep, 35_999).can_use);
        assert!(store.can_use("p1", SkillKind::Sweep, 36_000).can_use);
    }

    #[test]
    fn unknown_player_cannot_use_skills() {
        let mut store = store();
        assert!(!store.can_use("ghost", SkillKind::Scan, 0).can_use);
        assert!(!store.use_skill("ghost", SkillKind::Scan, 0));
    }

    #[test]
    fn shield_absorbs_once() {
        let mut store = store();
        store.use_skill("p1", SkillKind::Shield, 0);
        assert!(store.has_shield("p1", 5_000));
        assert!(store.consume_shield("p1", 5_000));
        assert!(!store.has_shield("p1", 5_001));
        assert!(!store.consume_shield("p1", 5_001));
        assert_eq!(store.pending_timers(), 0);
    }

    #[test]
    fn expired_shield_is_rejected_before_its_timer_runs() {
        let mut store = store();
        store.use_skill("p1", SkillKind::Shield, 0);
        // The deactivation timer is due at 15 s but tick has not run yet.
        assert!(!store.has_shield("p1", 15_000));
        assert!(!store.consume_shield("p1", 15_200));
        let shield = store.get("p1").expect("player").skill(SkillKind::Shield);
        assert!(!shield.is_active);
        assert!(store.tick(20_000).is_empty());
    }

    #[test]
    fn skill_views_report_readiness() {
        let mut store = store();
        store.use_skill("p1", SkillKind::Shield, 0);
        let views = store.skill_views("p1", 1_000);
        assert_eq!(views.len(), SkillKind::COUNT);
        let shield = &views[SkillKind::Shield.index()];
        assert!(!shield.ready);
        assert!(shield.is_active);
        assert_eq!(shield.remaining_cooldown_ms, 59_000);
        assert!(views[SkillKind::Scan.index()].ready);
    }
}
