use anyhow::Context;
use clap::Parser;
use mmo_minesweeper_rust_server::constants::TICK_MS;
use mmo_minesweeper_rust_server::engine::JoinResult;
use mmo_minesweeper_rust_server::rng::Rng;
use mmo_minesweeper_rust_server::types::{
    EndReason, EngineEvent, ItemKind, Position, SessionState, SkillKind,
};
use mmo_minesweeper_rust_server::{GameConfig, GameEngine};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    bots: Option<i32>,
    #[arg(long)]
    minutes: Option<i32>,
    #[arg(long)]
    size: Option<i32>,
    #[arg(long)]
    seed: Option<u64>,
    /// JSON game config; map size and duration flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    bots: usize,
    minutes: i32,
    size: i32,
    seed: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    bots: usize,
    minutes: i32,
    size: i32,
    reason: Option<EndReason>,
    duration_ms: u64,
    cells_revealed: u64,
    total_cells: u64,
    mines_exploded: u64,
    total_mines: u64,
    truncated_reveals: u32,
    shield_saves: u32,
    fevers: u32,
    skills_used: u32,
    items_used: u32,
    top_score: i64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug)]
struct ScenarioRunResult {
    result: ScenarioResultLine,
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenario_count: usize,
    anomaly_count: usize,
    average_duration_ms: u64,
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StructuredLogLine {
    timestamp_ms: u64,
    level: String,
    event: String,
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

#[derive(Default)]
struct Counters {
    truncated_reveals: u32,
    shield_saves: u32,
    fevers: u32,
    skills_used: u32,
    items_used: u32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let base_config = match cli.config.as_deref() {
        Some(path) => GameConfig::load(path)
            .with_context(|| format!("loading game config from {}", path.display()))?,
        None => GameConfig::default(),
    };
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({
                "bots": scenario.bots,
                "minutes": scenario.minutes,
                "size": scenario.size,
            }),
        )?;
        let scenario_run = run_scenario(&scenario, &base_config)?;

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &match_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.tick),
                json!({ "message": anomaly.message }),
            )?;
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_duration_ms += scenario_run.result.duration_ms;
        *reason_counts
            .entry(end_reason_key(scenario_run.result.reason))
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.finished_tick),
            json!({
                "reason": scenario_run.result.reason,
                "durationMs": scenario_run.result.duration_ms,
                "cellsRevealed": scenario_run.result.cells_revealed,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        )?;

        println!("{}", serde_json::to_string(&scenario_run.result)?);
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        reason_counts,
        total_anomalies,
        total_duration_ms,
    );

    if let Some(path) = cli.summary_out.as_ref() {
        write_summary(path, &summary)
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }

    emit_log(
        "info",
        "run_finished",
        &match_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageDurationMs": summary.average_duration_ms,
            "reasonCounts": summary.reason_counts,
        }),
    )?;

    if has_anomaly {
        std::process::exit(1);
    }
    Ok(())
}

fn scenario_config(base: &GameConfig, scenario: &Scenario) -> GameConfig {
    let mut config = base.clone();
    config.width = scenario.size;
    config.height = scenario.size;
    config.chunk_size = fitting_chunk_size(scenario.size, config.chunk_size);
    config.zones = Vec::new();
    config.session_max_duration_ms = scenario.minutes as u64 * 60_000;
    config
}

/// Largest chunk edge no bigger than `preferred` that tiles the map exactly.
fn fitting_chunk_size(size: i32, preferred: i32) -> i32 {
    (1..=preferred.min(size).max(1))
        .rev()
        .find(|chunk| size % chunk == 0)
        .unwrap_or(1)
}

fn run_scenario(scenario: &Scenario, base: &GameConfig) -> anyhow::Result<ScenarioRunResult> {
    let config = scenario_config(base, scenario);
    let mut engine = GameEngine::new(config, scenario.seed)
        .with_context(|| format!("building engine for {}", scenario.name))?;
    let mut bot_rng = Rng::new(scenario.seed ^ 0x9e37_79b9);
    let mut now = 0u64;
    engine.start_new_session(now);

    let mut bots = Vec::with_capacity(scenario.bots);
    for idx in 0..scenario.bots {
        let connection_id = format!("sim_{}_{}", scenario.seed, idx + 1);
        match engine.join(&format!("Bot-{:02}", idx + 1), None, &connection_id) {
            JoinResult::Joined { player_id } => bots.push(player_id),
            other => anyhow::bail!("bot {idx} could not join: {other:?}"),
        }
    }

    let mut counters = Counters::default();
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut tick = 0u64;
    let mut end_reason = None;
    let tick_limit = scenario.minutes as u64 * 60_000 / TICK_MS + 1_000;

    while end_reason.is_none() {
        tick += 1;
        now += TICK_MS;
        if tick > tick_limit {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                tick,
                "tick safety limit exceeded".to_string(),
            );
            break;
        }

        for player_id in &bots {
            step_bot(&mut engine, &mut bot_rng, player_id, now, &mut counters);
        }
        engine.tick(now);

        for event in engine.drain_events() {
            match event {
                EngineEvent::FeverStarted { .. } => counters.fevers += 1,
                EngineEvent::SessionEnded { data } => end_reason = Some(data.reason),
                _ => {}
            }
        }
        for message in collect_anomalies(&engine) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                tick,
                message,
            );
        }
    }

    let session = engine.get_session().clone();
    let top_score = engine
        .leaderboard()
        .first()
        .map(|entry| entry.score)
        .unwrap_or(0);
    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            bots: scenario.bots,
            minutes: scenario.minutes,
            size: scenario.size,
            reason: end_reason,
            duration_ms: now.saturating_sub(session.start_time),
            cells_revealed: session.cells_revealed,
            total_cells: session.total_cells,
            mines_exploded: session.mines_exploded,
            total_mines: session.total_mines,
            truncated_reveals: counters.truncated_reveals,
            shield_saves: counters.shield_saves,
            fevers: counters.fevers,
            skills_used: counters.skills_used,
            items_used: counters.items_used,
            top_score,
            anomalies,
        },
        anomaly_records,
        finished_tick: tick,
    })
}

/// One bot decision per tick: mostly reveals, with the odd flag, skill or purchase.
fn step_bot(engine: &mut GameEngine, rng: &mut Rng, player_id: &str, now: u64, counters: &mut Counters) {
    let width = engine.config.width;
    let height = engine.config.height;
    let target = Position::new(rng.int(0, width - 1), rng.int(0, height - 1));
    engine.update_cursor(player_id, target);

    let roll = rng.next_f32();
    if roll < 0.70 {
        let outcome = engine.reveal_cell(target, player_id, now);
        if outcome.result.truncated {
            counters.truncated_reveals += 1;
        }
        if outcome.shielded {
            counters.shield_saves += 1;
        }
    } else if roll < 0.80 {
        engine.flag_cell(target, player_id);
    } else if roll < 0.90 {
        let skill = SkillKind::ALL[rng.pick_index(SkillKind::ALL.len())];
        if engine.use_skill(player_id, skill, Some(target), now).success {
            counters.skills_used += 1;
        }
    } else if roll < 0.92 {
        let items = [ItemKind::DoublePoints, ItemKind::Invisibility, ItemKind::CooldownCharm];
        let item = items[rng.pick_index(items.len())];
        if engine.use_item(player_id, item, now).success {
            counters.items_used += 1;
        }
    }
}

fn collect_anomalies(engine: &GameEngine) -> Vec<String> {
    let mut anomalies = Vec::new();
    let session = engine.get_session();
    if session.cells_revealed > session.total_cells {
        anomalies.push(format!(
            "revealed more cells than exist: {}/{}",
            session.cells_revealed, session.total_cells
        ));
    }
    if session.mines_exploded > session.total_mines {
        anomalies.push(format!(
            "exploded more mines than exist: {}/{}",
            session.mines_exploded, session.total_mines
        ));
    }
    if session.state == SessionState::Waiting {
        anomalies.push("session fell back to waiting".to_string());
    }

    let leaderboard = engine.leaderboard();
    if leaderboard.iter().any(|entry| entry.score < 0) {
        anomalies.push("negative score on leaderboard".to_string());
    }
    if leaderboard
        .windows(2)
        .any(|pair| pair[0].score < pair[1].score)
    {
        anomalies.push("leaderboard out of order".to_string());
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));

    if cli.single || cli.bots.is_some() || cli.minutes.is_some() || cli.size.is_some() {
        let bots = cli.bots.unwrap_or(4).clamp(1, 200);
        return vec![Scenario {
            name: format!("custom-bots{bots}"),
            bots: bots as usize,
            minutes: cli.minutes.unwrap_or(5).clamp(1, 60),
            size: cli.size.unwrap_or(200).clamp(16, 1_000),
            seed,
        }];
    }

    vec![
        Scenario {
            name: "quick-check-bots4".to_string(),
            bots: 4,
            minutes: 2,
            size: 100,
            seed,
        },
        Scenario {
            name: "crowd-check-bots32".to_string(),
            bots: 32,
            minutes: 5,
            size: 300,
            seed: normalize_seed(seed as u64 + 1),
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    reason_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        reason_counts,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    match_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    tick: Option<u64>,
    details: Value,
) -> serde_json::Result<()> {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        tick,
        details,
    };
    eprintln!("{}", serde_json::to_string(&log_line)?);
    Ok(())
}

fn end_reason_key(reason: Option<EndReason>) -> String {
    match reason {
        Some(EndReason::MineRatio) => "mine_ratio",
        Some(EndReason::Cleared) => "cleared",
        Some(EndReason::TimeLimit) => "time_limit",
        None => "unfinished",
    }
    .to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, summary_text)?;
    Ok(())
}
