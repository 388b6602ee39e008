use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat};

use crate::types::Position;

pub fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

/// RFC 3339 UTC timestamp for an epoch-millisecond instant.
pub(super) fn iso_timestamp(epoch_ms: u64) -> String {
    DateTime::from_timestamp_millis(epoch_ms as i64)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Positions of the `(2r + 1)²` square centred on `center`, row by row.
pub(super) fn square_around(center: Position, radius: i32) -> impl Iterator<Item = Position> {
    (-radius..=radius).flat_map(move |dy| {
        (-radius..=radius).map(move |dx| Position::new(center.x + dx, center.y + dy))
    })
}
