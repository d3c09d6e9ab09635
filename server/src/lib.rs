//! Authoritative game server for the two-player bomb arena.
//!
//! The server owns the only real simulation: it accepts exactly two
//! connections, assigns them player ids, drains their inputs once per tick,
//! advances the world, and broadcasts a full-state snapshot to both peers.
//! Clients never simulate; they mirror whatever arrives here.
//!
//! Module layout:
//! - [`network`]: the session manager with its listener phases,
//!   per-connection reader tasks, inbox channel, and the tick loop.
//! - [`client_manager`]: the registry owning every connection's write half,
//!   with broadcast and per-recipient failure pruning.
//! - [`world`]: the authoritative arena of walls, players, bombs, enemies,
//!   power-ups, score, and terminal flags.
//! - [`snapshot`]: the world-to-wire projection captured once per tick.
//! - [`events`]: gameplay event sink injected into the world.

pub mod client_manager;
pub mod events;
pub mod network;
pub mod snapshot;
pub mod world;
