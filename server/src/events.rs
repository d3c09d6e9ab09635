use log::{debug, info};

/// Gameplay milestone raised by the world while it steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    BombPlaced { owner: u32, gx: i32, gy: i32 },
    BombExploded { gx: i32, gy: i32 },
    WallDestroyed { gx: i32, gy: i32 },
    PowerupPicked { player_id: u32, gx: i32, gy: i32 },
    PlayerDied { player_id: u32 },
}

/// Receiver for world events, injected at world construction.
pub trait EventSink: Send {
    fn emit(&mut self, event: WorldEvent);
}

/// Swallows every event. Default sink for tests and benchmarks.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: WorldEvent) {}
}

/// Forwards every event to the log. Used by the server binary.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: WorldEvent) {
        match event {
            WorldEvent::PlayerDied { player_id } => info!("Player {} died", player_id),
            WorldEvent::WallDestroyed { gx, gy } => debug!("Wall destroyed at ({}, {})", gx, gy),
            WorldEvent::PowerupPicked { player_id, gx, gy } => {
                info!("Player {} picked up power-up at ({}, {})", player_id, gx, gy)
            }
            other => debug!("{:?}", other),
        }
    }
}
