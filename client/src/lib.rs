//! Client side of the two-player bomb arena: the session that talks to the
//! server and the render-only mirror that shadows its world.
//!
//! In networked mode the client runs no simulation at all. It sends intent
//! changes upstream, takes whatever snapshot arrived most recently, and
//! reconciles it into local objects a renderer can animate. Movement
//! vectors and facing are inferred from position deltas, never simulated.
//!
//! Module layout:
//! - [`network`]: the session, covering handshake, background reader,
//!   latest-wins snapshot slot, control queue, and best-effort sends.
//! - [`mirror`]: the world shadow with identity reconciliation for players,
//!   walls and enemies, plus local-only effect timers.
//! - [`input`]: held-key tracking that turns key samples into the input
//!   actions worth sending.

pub mod input;
pub mod mirror;
pub mod network;
