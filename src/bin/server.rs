use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use mmo_minesweeper_rust_server::constants::{DEFAULT_VIEWPORT, TICK_MS};
use mmo_minesweeper_rust_server::engine::{now_ms, JoinResult};
use mmo_minesweeper_rust_server::server_protocol::{parse_client_message, ParsedClientMessage};
use mmo_minesweeper_rust_server::server_utils::{normalize_viewport, parse_leaderboard_limit};
use mmo_minesweeper_rust_server::types::{CellView, EngineEvent, Position, SkillKind};
use mmo_minesweeper_rust_server::{GameConfig, GameEngine};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const CURSOR_SNAPSHOT_EVERY_TICKS: u64 = 5;

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    player_id: Option<String>,
    viewport: (i32, i32),
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    game: GameEngine,
    tick_counter: u64,
}

impl ServerState {
    fn new(game: GameEngine) -> Self {
        Self {
            clients: HashMap::new(),
            game,
            tick_counter: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let config = match std::env::var("GAME_CONFIG_PATH") {
        Ok(path) => GameConfig::load(Path::new(&path))
            .with_context(|| format!("loading game config from {path}"))?,
        Err(_) => GameConfig::default(),
    };
    let seed = rand::random::<u32>();
    let mut game = GameEngine::new(config, seed).context("building game engine")?;
    game.start_new_session(now_ms());
    game.drain_events();
    tracing::info!(
        seed,
        width = game.config.width,
        height = game.config.height,
        "engine ready"
    );

    let state = Arc::new(Mutex::new(ServerState::new(game)));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/session", get(session_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        tracing::info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        tracing::warn!("static file root not found; serving websocket and api only");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;

    tracing::info!(port, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [
        PathBuf::from("dist/client"),
        PathBuf::from("../../dist/client"),
    ];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn session_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(json!({ "session": guard.game.get_session() }))
}

async fn leaderboard_handler(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let guard = state.lock().await;
    let mut entries = guard.game.leaderboard();
    if let Some(limit) = parse_leaderboard_limit(query.limit.as_deref()) {
        entries.truncate(limit);
    }
    Json(json!({ "leaderboard": entries }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                player_id: None,
                viewport: DEFAULT_VIEWPORT,
            },
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&state, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = std::str::from_utf8(&raw) {
                    handle_client_message(&state, &client_id, text).await;
                } else {
                    let mut guard = state.lock().await;
                    send_error(&mut guard, &client_id, "invalid utf8 message");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        disconnect_client_internal(&mut guard, &client_id);
    }
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) {
    let mut guard = state.lock().await;
    let Some(message) = parse_client_message(raw) else {
        send_error(&mut guard, client_id, "invalid message");
        return;
    };

    if let ParsedClientMessage::Hello { name, player_id } = &message {
        handle_hello(&mut guard, client_id, name, player_id.as_deref());
        flush_engine_events(&mut guard);
        return;
    }
    if let ParsedClientMessage::Ping { t } = message {
        send_to_client(
            &mut guard,
            client_id,
            &json!({ "type": "pong", "t": t }),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    }

    let Some(player_id) = guard
        .clients
        .get(client_id)
        .and_then(|client| client.player_id.clone())
    else {
        send_error(&mut guard, client_id, "send hello first");
        return;
    };

    let now = now_ms();
    match message {
        ParsedClientMessage::Reveal { position } => {
            let outcome = guard.game.reveal_cell(position, &player_id, now);
            if !outcome.result.is_empty() {
                let cells: Vec<CellView> = outcome.result.cells.iter().map(|cell| cell.to_view()).collect();
                broadcast(
                    &mut guard,
                    &json!({ "type": "cells_revealed", "playerId": player_id, "cells": cells }),
                    QueuePolicy::DropOnFull,
                );
            }
            send_to_client(
                &mut guard,
                client_id,
                &json!({ "type": "reveal_result", "outcome": outcome }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::Flag { position } => match guard.game.flag_cell(position, &player_id) {
            Some(cell) => broadcast(
                &mut guard,
                &json!({ "type": "cell_flagged", "cell": cell.to_view() }),
                QueuePolicy::DropOnFull,
            ),
            None => send_error(&mut guard, client_id, "cannot flag that cell"),
        },
        ParsedClientMessage::UseSkill { skill, target } => {
            let result = guard.game.use_skill(&player_id, skill, target, now);
            if result.success && skill == SkillKind::Sweep {
                let cells = cell_views(&guard.game, result.affected_cells.as_deref().unwrap_or_default());
                broadcast(
                    &mut guard,
                    &json!({ "type": "cells_revealed", "playerId": player_id, "cells": cells }),
                    QueuePolicy::DropOnFull,
                );
            }
            send_to_client(
                &mut guard,
                client_id,
                &json!({ "type": "skill_result", "skill": skill, "result": result }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::UseItem { item } => {
            let result = guard.game.use_item(&player_id, item, now);
            send_to_client(
                &mut guard,
                client_id,
                &json!({ "type": "item_result", "item": item, "result": result }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::Cursor { position } => {
            if guard.game.update_cursor(&player_id, position) {
                forward_cursor(&mut guard, &player_id, position);
            }
        }
        ParsedClientMessage::GetChunk { coord } => {
            let payload = match guard.game.get_chunk(coord) {
                Some(chunk) => json!({ "type": "chunk", "chunk": chunk.to_view() }),
                None => json!({ "type": "error", "message": "chunk outside the map" }),
            };
            send_to_client(&mut guard, client_id, &payload, QueuePolicy::DisconnectOnFull);
        }
        ParsedClientMessage::Viewport { width, height } => {
            if let Some(client) = guard.clients.get_mut(client_id) {
                client.viewport = normalize_viewport(width, height);
            }
        }
        ParsedClientMessage::Hello { .. } | ParsedClientMessage::Ping { .. } => {}
    }
    flush_engine_events(&mut guard);
}

fn handle_hello(state: &mut ServerState, client_id: &str, name: &str, player_id: Option<&str>) {
    let result = state.game.join(name, player_id, client_id);
    let player_id = match result {
        JoinResult::Joined { player_id } => player_id,
        JoinResult::Resumed {
            player_id,
            replaced_connection,
        } => {
            if let Some(old_client_id) = replaced_connection {
                if let Some(old_client) = state.clients.get_mut(&old_client_id) {
                    old_client.player_id = None;
                    let _ = old_client.tx.try_send(OutboundMessage::Close {
                        code: 4001,
                        reason: "superseded by new connection".to_string(),
                    });
                }
            }
            player_id
        }
        JoinResult::Rejected { reason } => {
            send_error(state, client_id, reason);
            return;
        }
    };

    if let Some(client) = state.clients.get_mut(client_id) {
        client.player_id = Some(player_id.clone());
    }
    let now = now_ms();
    let welcome = json!({
        "type": "welcome",
        "playerId": player_id,
        "session": state.game.get_session(),
        "config": {
            "width": state.game.config.width,
            "height": state.game.config.height,
            "chunkSize": state.game.config.chunk_size,
        },
        "player": state.game.player_view(&player_id, now),
        "leaderboard": state.game.leaderboard(),
    });
    send_to_client(state, client_id, &welcome, QueuePolicy::DisconnectOnFull);
}

fn cell_views(game: &GameEngine, positions: &[Position]) -> Vec<CellView> {
    positions
        .iter()
        .filter_map(|p| game.store().get_cell(p.x, p.y))
        .map(|cell| cell.to_view())
        .collect()
}

fn forward_cursor(state: &mut ServerState, player_id: &str, position: Position) {
    let payload = json!({
        "type": "cursor",
        "playerId": player_id,
        "x": position.x,
        "y": position.y,
    });
    let viewports: HashMap<&str, (i32, i32)> = state
        .clients
        .values()
        .filter_map(|client| client.player_id.as_deref().map(|id| (id, client.viewport)))
        .collect();
    let audience = state.game.cursor_audience(player_id, |viewer| {
        viewports.get(viewer).copied().unwrap_or(DEFAULT_VIEWPORT)
    });
    for viewer_id in audience {
        let Some(client_id) = state.game.connection_for_player(&viewer_id).map(str::to_string) else {
            continue;
        };
        send_to_client(state, &client_id, &payload, QueuePolicy::DropOnFull);
    }
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_game(&mut guard);
        }
    });
}

fn tick_game(state: &mut ServerState) {
    state.tick_counter += 1;
    state.game.tick(now_ms());
    flush_engine_events(state);

    if state.tick_counter % CURSOR_SNAPSHOT_EVERY_TICKS == 0 {
        send_cursor_snapshots(state);
    }
}

/// Each client only hears about the cursors inside its own viewport.
fn send_cursor_snapshots(state: &mut ServerState) {
    let targets: Vec<(String, String, (i32, i32))> = state
        .clients
        .iter()
        .filter_map(|(client_id, client)| {
            client
                .player_id
                .clone()
                .map(|player_id| (client_id.clone(), player_id, client.viewport))
        })
        .collect();
    for (client_id, player_id, viewport) in targets {
        let cursors = state.game.visible_cursors(&player_id, viewport);
        send_to_client(
            state,
            &client_id,
            &json!({ "type": "cursors", "cursors": cursors }),
            QueuePolicy::DropOnFull,
        );
    }
}

fn flush_engine_events(state: &mut ServerState) {
    for event in state.game.drain_events() {
        let payload = json!({ "type": "event", "event": event });
        match event_recipient(&event) {
            Some(player_id) => {
                let Some(client_id) = state.game.connection_for_player(player_id).map(str::to_string)
                else {
                    continue;
                };
                send_to_client(state, &client_id, &payload, QueuePolicy::DropOnFull);
            }
            None => broadcast(state, &payload, QueuePolicy::DisconnectOnFull),
        }
    }
}

fn event_recipient(event: &EngineEvent) -> Option<&str> {
    match event {
        EngineEvent::FeverStarted { player_id, .. }
        | EngineEvent::FeverEnded { player_id }
        | EngineEvent::EffectExpired { player_id, .. }
        | EngineEvent::SkillEnded { player_id, .. } => Some(player_id),
        EngineEvent::SessionStarted { .. }
        | EngineEvent::SessionEnded { .. }
        | EngineEvent::SessionFinished { .. } => None,
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        tracing::warn!(client_id, "outbound queue full; dropping client");
        disconnect_client_internal(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        if client.player_id.is_none() {
            continue;
        }
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        disconnect_client_internal(state, &client_id);
    }
}

fn send_error(state: &mut ServerState, client_id: &str, message: &str) {
    send_to_client(
        state,
        client_id,
        &json!({ "type": "error", "message": message }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    let _ = context.tx.try_send(OutboundMessage::Close {
        code: 1000,
        reason: "disconnected".to_string(),
    });
    state.game.disconnect(client_id);
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_events_go_to_one_recipient() {
        let event = EngineEvent::FeverEnded {
            player_id: "player_1".to_string(),
        };
        assert_eq!(event_recipient(&event), Some("player_1"));
    }

    #[test]
    fn make_id_is_unique_and_prefixed() {
        let a = make_id("client");
        let b = make_id("client");
        assert_ne!(a, b);
        assert!(a.starts_with("client_"));
    }
}
