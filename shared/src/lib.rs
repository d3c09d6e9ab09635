//! Wire protocol shared by the gridblast server and client: message types,
//! snapshot values, and the length-prefixed frame codec.

pub mod codec;
pub mod protocol;

pub use codec::{encode_frame, read_message, write_message, ProtocolError, MAX_FRAME_LEN};
pub use protocol::{
    Axis, BombSnap, EnemySnap, ExplosionSnap, InputAction, Message, PlayerSnap, PowerupKind,
    PowerupSnap, WallKind, WallSnap, WorldSnapshot,
};

/// Side length of one grid cell in pixels.
pub const TILE_SIZE: i32 = 48;
/// Arena width in cells, border walls included.
pub const GRID_WIDTH: i32 = 15;
/// Arena height in cells, border walls included.
pub const GRID_HEIGHT: i32 = 13;
/// Lifetime of an explosion effect in seconds, identical on both ends so the
/// client can expire effects locally without the server re-announcing them.
pub const EXPLOSION_TIME: f32 = 0.4;
