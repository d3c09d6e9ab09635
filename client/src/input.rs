//! Held-key tracking and change detection for networked inputs.
//!
//! The server wants intent changes, not key states: a `MOVE` with the full
//! vector when it changes, a `STOP_MOVE` per axis released to zero, and a
//! `BOMB` on the press edge only. The tracker diffs each frame's sampled
//! key state against what it last told the server and emits exactly the
//! actions that changed.

use shared::{Axis, InputAction};

/// Turns per-frame key samples into the input actions to send.
pub struct InputTracker {
    held: (i32, i32),
    bomb_held: bool,
}

impl InputTracker {
    pub fn new() -> Self {
        Self {
            held: (0, 0),
            bomb_held: false,
        }
    }

    /// Movement intent as last reported to the server.
    pub fn held(&self) -> (i32, i32) {
        self.held
    }

    /// Samples one frame of key state and returns the actions to send.
    ///
    /// Opposite keys held together cancel to zero on that axis. The
    /// returned list is empty while nothing changes, so holding a key
    /// produces one `MOVE`, not a stream of them.
    pub fn update(
        &mut self,
        right: bool,
        left: bool,
        up: bool,
        down: bool,
        bomb: bool,
    ) -> Vec<InputAction> {
        let dx = (right as i32) - (left as i32);
        let dy = (down as i32) - (up as i32);

        let mut actions = Vec::new();

        if (dx, dy) != self.held {
            if dx == 0 && self.held.0 != 0 {
                actions.push(InputAction::StopMove { axis: Axis::X });
            }
            if dy == 0 && self.held.1 != 0 {
                actions.push(InputAction::StopMove { axis: Axis::Y });
            }
            if (dx, dy) != (0, 0) {
                actions.push(InputAction::Move { dx, dy });
            }
            self.held = (dx, dy);
        }

        if bomb && !self.bomb_held {
            actions.push(InputAction::Bomb {});
        }
        self.bomb_held = bomb;

        actions
    }
}

impl Default for InputTracker {
    fn default() -> Self {
        Self::new()
    }
}
