use serde_json::Value;

use crate::types::{ChunkCoord, ItemKind, Position, SkillKind};

#[derive(Debug)]
pub enum ParsedClientMessage {
    Hello {
        name: String,
        player_id: Option<String>,
    },
    Reveal {
        position: Position,
    },
    Flag {
        position: Position,
    },
    UseSkill {
        skill: SkillKind,
        target: Option<Position>,
    },
    UseItem {
        item: ItemKind,
    },
    Cursor {
        position: Position,
    },
    GetChunk {
        coord: ChunkCoord,
    },
    Viewport {
        width: Option<i64>,
        height: Option<i64>,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            let player_id = match object.get("playerId") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ParsedClientMessage::Hello { name, player_id })
        }
        "reveal" => Some(ParsedClientMessage::Reveal {
            position: parse_position(object.get("x"), object.get("y"))?,
        }),
        "flag" => Some(ParsedClientMessage::Flag {
            position: parse_position(object.get("x"), object.get("y"))?,
        }),
        "use_skill" => {
            let skill = SkillKind::parse(object.get("skill")?.as_str()?)?;
            let target = match (object.get("x"), object.get("y")) {
                (None, None) => None,
                (x, y) => Some(parse_position(x, y)?),
            };
            Some(ParsedClientMessage::UseSkill { skill, target })
        }
        "use_item" => {
            let item = ItemKind::parse(object.get("item")?.as_str()?)?;
            Some(ParsedClientMessage::UseItem { item })
        }
        "cursor" => Some(ParsedClientMessage::Cursor {
            position: parse_position(object.get("x"), object.get("y"))?,
        }),
        "get_chunk" => {
            let cx = parse_coordinate(object.get("cx")?)?;
            let cy = parse_coordinate(object.get("cy")?)?;
            Some(ParsedClientMessage::GetChunk {
                coord: ChunkCoord::new(cx, cy),
            })
        }
        "viewport" => {
            let width = parse_optional_i64(object.get("width"))?;
            let height = parse_optional_i64(object.get("height"))?;
            Some(ParsedClientMessage::Viewport { width, height })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    let number = value.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    let floored = number.floor();
    if floored < i64::MIN as f64 || floored >= i64::MAX as f64 {
        return None;
    }
    Some(Some(floored as i64))
}

fn parse_position(x: Option<&Value>, y: Option<&Value>) -> Option<Position> {
    Some(Position::new(parse_coordinate(x?)?, parse_coordinate(y?)?))
}

/// Grid coordinate from a JSON number. Fractions are floored; anything outside
/// `i32` is rejected.
fn parse_coordinate(value: &Value) -> Option<i32> {
    if let Some(number) = value.as_i64() {
        return i32::try_from(number).ok();
    }
    if let Some(number) = value.as_u64() {
        return i32::try_from(number).ok();
    }
    let number = value.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    let floored = number.floor();
    if floored < i32::MIN as f64 || floored > i32::MAX as f64 {
        return None;
    }
    Some(floored as i32)
}
