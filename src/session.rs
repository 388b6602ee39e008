use crate::config::GameConfig;
use crate::timers::TimerQueue;
use crate::types::{EndReason, Session, SessionState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionStage {
    MaxDuration,
    Finish,
    Restart,
}

/// Lifecycle timers carry the session id, so a stage armed for one round can
/// never act on the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionTimer {
    pub session_id: u64,
    pub stage: SessionStage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleSignal {
    Ending(EndReason),
    Finished,
    RestartDue,
}

#[derive(Clone, Debug)]
pub struct SessionLifecycle {
    session: Session,
    next_id: u64,
    timers: TimerQueue<SessionTimer>,
    max_duration_ms: u64,
    end_countdown_ms: u64,
    restart_delay_ms: u64,
    mine_ratio_threshold: f32,
    progress_threshold: f32,
}

impl SessionLifecycle {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            session: Session::waiting(),
            next_id: 1,
            timers: TimerQueue::new(),
            max_duration_ms: config.session_max_duration_ms,
            end_countdown_ms: config.end_countdown_ms,
            restart_delay_ms: config.restart_delay_ms,
            mine_ratio_threshold: config.mine_ratio_threshold,
            progress_threshold: config.progress_threshold,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Replaces the live session with a fresh Active one. Every lifecycle timer
    /// still pending from the previous round is cancelled first.
    pub fn start_new_session(
        &mut self,
        seed: u32,
        total_mines: u64,
        total_cells: u64,
        player_count: usize,
        now_ms: u64,
    ) -> &Session {
        self.timers.clear();
        let id = self.next_id;
        self.next_id += 1;
        self.session = Session {
            id,
            state: SessionState::Active,
            seed,
            start_time: now_ms,
            end_time: None,
            total_mines,
            mines_exploded: 0,
            cells_revealed: 0,
            total_cells,
            player_count,
            end_reason: None,
        };
        self.arm(SessionStage::MaxDuration, now_ms + self.max_duration_ms);
        tracing::info!(session_id = id, seed, total_mines, "session started");
        &self.session
    }

    pub fn set_player_count(&mut self, player_count: usize) {
        self.session.player_count = player_count;
    }

    /// Lazy generation only learns the mine total as chunks materialize.
    pub fn set_total_mines(&mut self, total_mines: u64) {
        self.session.total_mines = total_mines;
    }

    pub fn record_reveals(&mut self, safe_cells: u64) {
        if self.session.is_active() {
            self.session.cells_revealed += safe_cells;
        }
    }

    pub fn record_explosion(&mut self) {
        if self.session.is_active() {
            self.session.mines_exploded += 1;
        }
    }

    /// Evaluates both end conditions after a mutating action.
    pub fn check_thresholds(&mut self, now_ms: u64) -> Option<EndReason> {
        if !self.session.is_active() {
            return None;
        }
        let reason = if self.session.mine_ratio() >= self.mine_ratio_threshold {
            EndReason::MineRatio
        } else if self.session.progress() >= self.progress_threshold {
            EndReason::Cleared
        } else {
            return None;
        };
        self.begin_ending(reason, now_ms).then_some(reason)
    }

    pub fn begin_ending(&mut self, reason: EndReason, now_ms: u64) -> bool {
        if !self.session.is_active() {
            return false;
        }
        self.session.state = SessionState::Ending;
        self.session.end_reason = Some(reason);
        let max_duration = self.timer(SessionStage::MaxDuration);
        self.timers.cancel(&max_duration);
        self.arm(SessionStage::Finish, now_ms + self.end_countdown_ms);
        tracing::info!(
            session_id = self.session.id,
            ?reason,
            mine_ratio = self.session.mine_ratio(),
            progress = self.session.progress(),
            "session ending"
        );
        true
    }

    pub fn tick(&mut self, now_ms: u64) -> Vec<LifecycleSignal> {
        let mut signals = Vec::new();
        for timer in self.timers.pop_due(now_ms) {
            if timer.session_id != self.session.id {
                tracing::warn!(?timer, current = self.session.id, "stale lifecycle timer");
                continue;
            }
            match (timer.stage, self.session.state) {
                (SessionStage::MaxDuration, SessionState::Active) => {
                    if self.begin_ending(EndReason::TimeLimit, now_ms) {
                        signals.push(LifecycleSignal::Ending(EndReason::TimeLimit));
                    }
                }
                (SessionStage::Finish, SessionState::Ending) => {
                    self.session.state = SessionState::Finished;
                    self.session.end_time = Some(now_ms);
                    self.arm(SessionStage::Restart, now_ms + self.restart_delay_ms);
                    signals.push(LifecycleSignal::Finished);
                }
                (SessionStage::Restart, SessionState::Finished) => {
                    signals.push(LifecycleSignal::RestartDue);
                }
                (stage, state) => {
                    tracing::debug!(?stage, ?state, "lifecycle timer ignored");
                }
            }
        }
        signals
    }

    fn timer(&self, stage: SessionStage) -> SessionTimer {
        SessionTimer {
            session_id: self.session.id,
            stage,
        }
    }

    fn arm(&mut self, stage: SessionStage, due_ms: u64) {
        let timer = self.timer(stage);
        self.timers.schedule(timer, due_ms);
    }
}
