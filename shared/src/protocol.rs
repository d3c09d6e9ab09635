//! Message and snapshot types as they appear on the wire.
//!
//! Every frame payload is one JSON document shaped by the serde attributes
//! below: messages are tagged by `type`, inputs by `action` with their
//! payload under `data`, so `{"type":"INPUT","action":"MOVE","data":{...}}`
//! round-trips field for field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// First message on every connection, server to client; carries the
    /// player id assigned at accept time.
    #[serde(rename = "WELCOME")]
    Welcome { player_id: u32 },
    /// Client to server, one per player action.
    #[serde(rename = "INPUT")]
    Input {
        #[serde(flatten)]
        action: InputAction,
    },
    /// Server to client, full world state once per tick.
    #[serde(rename = "SNAPSHOT")]
    Snapshot { data: WorldSnapshot },
    /// Server to client on graceful shutdown; the session is dead afterwards.
    #[serde(rename = "DISCONNECTED")]
    Disconnected { reason: String },
}

impl Message {
    /// Wire tag of this message, for logs and error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Welcome { .. } => "WELCOME",
            Message::Input { .. } => "INPUT",
            Message::Snapshot { .. } => "SNAPSHOT",
            Message::Disconnected { .. } => "DISCONNECTED",
        }
    }
}

/// Player action carried by an `INPUT` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum InputAction {
    /// Replaces the full movement intent vector; dx/dy are -1, 0 or 1.
    #[serde(rename = "MOVE")]
    Move { dx: i32, dy: i32 },
    /// Zeroes one axis of the movement intent, the other keeps running.
    #[serde(rename = "STOP_MOVE")]
    StopMove { axis: Axis },
    /// Drop a bomb on the sender's current tile.
    #[serde(rename = "BOMB")]
    Bomb {},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

/// Full authoritative world state for one tick.
///
/// Players are keyed by id; walls carry their grid cell; enemies carry a
/// stable spawn id. Bombs, power-ups and explosions have no wire identity
/// beyond list position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(with = "player_map")]
    pub players: BTreeMap<u32, PlayerSnap>,
    pub bombs: Vec<BombSnap>,
    pub enemies: Vec<EnemySnap>,
    pub walls: Vec<WallSnap>,
    pub powerups: Vec<PowerupSnap>,
    pub score: u32,
    pub explosions: Vec<ExplosionSnap>,
    pub game_over: bool,
    pub win: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnap {
    pub x: i32,
    pub y: i32,
    pub alive: bool,
    pub hp: i32,
    pub invincible: bool,
    pub inv_timer: f32,
}

/// Bomb position in pixels. Fuse timers stay server-side; clients infer the
/// detonation from the bomb disappearing and an explosion appearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BombSnap {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySnap {
    /// Monotonically increasing spawn id, the client's reconciliation key.
    pub id: u32,
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallSnap {
    pub gx: i32,
    pub gy: i32,
    #[serde(rename = "type")]
    pub kind: WallKind,
    pub hp: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WallKind {
    /// Border ring; survives anything.
    Unbreakable,
    /// Inner pillars; also blast-proof.
    Hard,
    /// Crumbles when a blast reaches it, may leave a power-up behind.
    Breakable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerupSnap {
    pub gx: i32,
    pub gy: i32,
    pub kind: PowerupKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerupKind {
    BombCount,
    BombPower,
    Speed,
}

/// One blast-covered tile, in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionSnap {
    pub x: i32,
    pub y: i32,
}

/// Player ids cross the wire as JSON object keys, which are always strings.
/// Converting explicitly on both sides keeps the map decodable even when the
/// payload arrives through serde's buffered content path (the tagged
/// `Message` enum buffers its fields before picking a variant, and buffered
/// string keys never coerce back to integers on their own).
mod player_map {
    use super::PlayerSnap;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(map: &BTreeMap<u32, PlayerSnap>, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ser.collect_map(map.iter().map(|(id, snap)| (id.to_string(), snap)))
    }

    pub fn deserialize<'de, D>(de: D) -> Result<BTreeMap<u32, PlayerSnap>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let keyed = BTreeMap::<String, PlayerSnap>::deserialize(de)?;
        keyed
            .into_iter()
            .map(|(key, snap)| {
                key.parse::<u32>()
                    .map(|id| (id, snap))
                    .map_err(|_| D::Error::custom(format!("invalid player id key {:?}", key)))
            })
            .collect()
    }
}
