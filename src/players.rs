use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::types::ScoreEntry;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStats {
    pub score: i64,
    pub cells_revealed: u64,
    pub mines_hit: u32,
    pub mines_defused: u32,
    pub flags_placed: u32,
    pub best_combo: u32,
}

impl RoundStats {
    fn is_idle(&self) -> bool {
        self.score == 0 && self.cells_revealed == 0 && self.mines_hit == 0 && self.mines_defused == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreHistory {
    pub rounds_played: u32,
    pub best_score: i64,
    pub total_score: i64,
}

#[derive(Clone, Debug)]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub connected: bool,
    pub round: RoundStats,
    pub history: ScoreHistory,
    pub guild_bonus: f32,
}

impl PlayerRecord {
    fn score_entry(&self) -> ScoreEntry {
        ScoreEntry {
            player_id: self.id.clone(),
            name: self.name.clone(),
            score: self.round.score,
            cells_revealed: self.round.cells_revealed,
            mines_hit: self.round.mines_hit,
            best_combo: self.round.best_combo,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Registered,
    DuplicateId,
    NameTaken,
}

/// Players keyed by stable id. Connections come and go; a record outlives all of
/// them and keeps its cross-round history.
#[derive(Clone, Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<String, PlayerRecord>,
    connection_to_player: HashMap<String, String>,
    player_to_connection: HashMap<String, String>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|player| player.connected).count()
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.players.get(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn name_taken(&self, name: &str, except: Option<&str>) -> bool {
        self.players.values().any(|player| {
            Some(player.id.as_str()) != except && player.name.eq_ignore_ascii_case(name)
        })
    }

    pub fn register(&mut self, player_id: &str, name: &str) -> JoinOutcome {
        if self.players.contains_key(player_id) {
            return JoinOutcome::DuplicateId;
        }
        if self.name_taken(name, None) {
            return JoinOutcome::NameTaken;
        }
        self.players.insert(
            player_id.to_string(),
            PlayerRecord {
                id: player_id.to_string(),
                name: name.to_string(),
                connected: false,
                round: RoundStats::default(),
                history: ScoreHistory::default(),
                guild_bonus: 0.0,
            },
        );
        JoinOutcome::Registered
    }

    /// Points the player at `connection_id`. Returns the connection it replaced.
    pub fn bind_connection(&mut self, connection_id: &str, player_id: &str) -> Option<String> {
        let player = self.players.get_mut(player_id)?;
        player.connected = true;

        if let Some(previous_player) = self.connection_to_player.remove(connection_id) {
            if previous_player != player_id {
                self.player_to_connection.remove(&previous_player);
                if let Some(previous) = self.players.get_mut(&previous_player) {
                    previous.connected = false;
                }
            }
        }
        let replaced = self
            .player_to_connection
            .insert(player_id.to_string(), connection_id.to_string())
            .filter(|old| old != connection_id);
        if let Some(old) = &replaced {
            self.connection_to_player.remove(old);
        }
        self.connection_to_player
            .insert(connection_id.to_string(), player_id.to_string());
        replaced
    }

    /// Drops the connection. The player stays registered, marked disconnected.
    pub fn disconnect(&mut self, connection_id: &str) -> Option<String> {
        let player_id = self.connection_to_player.remove(connection_id)?;
        self.player_to_connection.remove(&player_id);
        if let Some(player) = self.players.get_mut(&player_id) {
            player.connected = false;
        }
        Some(player_id)
    }

    pub fn player_for_connection(&self, connection_id: &str) -> Option<&str> {
        self.connection_to_player
            .get(connection_id)
            .map(String::as_str)
    }

    pub fn connection_for_player(&self, player_id: &str) -> Option<&str> {
        self.player_to_connection.get(player_id).map(String::as_str)
    }

    pub fn round_mut(&mut self, player_id: &str) -> Option<&mut RoundStats> {
        self.players.get_mut(player_id).map(|player| &mut player.round)
    }

    /// Adds (or with a negative delta removes) round score, never going below zero.
    pub fn add_score(&mut self, player_id: &str, delta: i64) -> Option<i64> {
        let round = self.round_mut(player_id)?;
        round.score = round.score.saturating_add(delta).max(0);
        Some(round.score)
    }

    pub fn spend(&mut self, player_id: &str, amount: i64) -> bool {
        let Some(round) = self.round_mut(player_id) else {
            return false;
        };
        if round.score < amount {
            return false;
        }
        round.score -= amount;
        true
    }

    pub fn set_guild_bonus(&mut self, player_id: &str, bonus: f32) -> bool {
        match self.players.get_mut(player_id) {
            Some(player) => {
                player.guild_bonus = bonus;
                true
            }
            None => false,
        }
    }

    pub fn guild_bonus(&self, player_id: &str) -> f32 {
        self.players
            .get(player_id)
            .map(|player| player.guild_bonus)
            .unwrap_or(0.0)
    }

    /// Folds the finished round into each player's history, then zeroes it.
    pub fn reset_round_stats(&mut self) {
        for player in self.players.values_mut() {
            let round = std::mem::take(&mut player.round);
            if round.is_idle() {
                continue;
            }
            player.history.rounds_played += 1;
            player.history.best_score = player.history.best_score.max(round.score);
            player.history.total_score += round.score;
        }
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<ScoreEntry> {
        let mut ranked: Vec<&PlayerRecord> = self.players.values().collect();
        ranked.sort_by(|a, b| compare_standing(a, b));
        ranked
            .into_iter()
            .take(limit)
            .map(PlayerRecord::score_entry)
            .collect()
    }
}

fn compare_standing(a: &PlayerRecord, b: &PlayerRecord) -> Ordering {
    b.round
        .score
        .cmp(&a.round.score)
        .then_with(|| b.round.cells_revealed.cmp(&a.round.cells_revealed))
        .then_with(|| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PlayerRegistry {
        let mut registry = PlayerRegistry::new();
        assert_eq!(registry.register("p1", "Alice"), JoinOutcome::Registered);
        assert_eq!(registry.register("p2", "Bob"), JoinOutcome::Registered);
        registry
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut registry = registry();
        assert_eq!(registry.register("p1", "Carol"), JoinOutcome::DuplicateId);
        assert_eq!(registry.register("p3", "alice"), JoinOutcome::NameTaken);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn reconnect_replaces_previous_connection() {
        let mut registry = registry();
        assert_eq!(registry.bind_connection("c1", "p1"), None);
        assert_eq!(registry.bind_connection("c2", "p1"), Some("c1".to_string()));
        assert_eq!(registry.player_for_connection("c1"), None);
        assert_eq!(registry.player_for_connection("c2"), Some("p1"));
        assert_eq!(registry.connection_for_player("p1"), Some("c2"));

        // The stale socket closing later must not disconnect the new one.
        assert_eq!(registry.disconnect("c1"), None);
        assert!(registry.get("p1").expect("player").connected);
        assert_eq!(registry.disconnect("c2"), Some("p1".to_string()));
        assert!(!registry.get("p1").expect("player").connected);
        assert!(registry.contains("p1"));
    }

    #[test]
    fn binding_unknown_player_is_a_no_op() {
        let mut registry = registry();
        assert_eq!(registry.bind_connection("c1", "ghost"), None);
        assert_eq!(registry.player_for_connection("c1"), None);
    }

    #[test]
    fn score_never_goes_negative() {
        let mut registry = registry();
        registry.add_score("p1", 30);
        assert_eq!(registry.add_score("p1", -50), Some(0));
        assert!(!registry.spend("p1", 1));
        registry.add_score("p1", 120);
        assert!(registry.spend("p1", 100));
        assert_eq!(registry.get("p1").expect("player").round.score, 20);
    }

    #[test]
    fn leaderboard_orders_by_score_then_cells_then_name() {
        let mut registry = registry();
        registry.register("p3", "Aaron");
        registry.add_score("p1", 10);
        registry.add_score("p2", 10);
        registry.add_score("p3", 10);
        registry.round_mut("p2").expect("player").cells_revealed = 5;

        let names: Vec<_> = registry
            .leaderboard(10)
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["Bob", "Aaron", "Alice"]);
        assert_eq!(registry.leaderboard(1).len(), 1);
    }

    #[test]
    fn reset_archives_round_into_history() {
        let mut registry = registry();
        registry.add_score("p1", 40);
        registry.reset_round_stats();
        registry.add_score("p1", 25);
        registry.reset_round_stats();

        let player = registry.get("p1").expect("player");
        assert_eq!(player.round, RoundStats::default());
        assert_eq!(player.history.rounds_played, 2);
        assert_eq!(player.history.best_score, 40);
        assert_eq!(player.history.total_score, 65);
        assert_eq!(registry.get("p2").expect("player").history.rounds_played, 0);
    }
}
