use crate::constants::{DEFAULT_VIEWPORT, MAX_VIEWPORT};

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(16).collect()
}

/// Viewport size a client asked for, clamped to what the server will scope
/// cursor broadcasts to.
pub fn normalize_viewport(width: Option<i64>, height: Option<i64>) -> (i32, i32) {
    let clamp = |value: Option<i64>, fallback: i32, max: i32| {
        value
            .map(|raw| raw.clamp(1, max as i64) as i32)
            .unwrap_or(fallback)
    };
    (
        clamp(width, DEFAULT_VIEWPORT.0, MAX_VIEWPORT.0),
        clamp(height, DEFAULT_VIEWPORT.1, MAX_VIEWPORT.1),
    )
}

pub fn parse_leaderboard_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}
