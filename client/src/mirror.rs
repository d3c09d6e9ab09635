//! Render-only world mirror and snapshot reconciliation.
//!
//! The mirror holds no gameplay logic. Each applied snapshot overwrites the
//! authoritative fields verbatim; the derived fields a renderer wants
//! (movement vector, moving flag, facing) are inferred from the position
//! delta against the same identity's previous position. Identity is the
//! player id for players, the grid cell for walls, and the stable spawn id
//! for enemies; bombs and power-ups are rebuilt wholesale every apply.

use shared::{PowerupSnap, WallKind, WorldSnapshot, EXPLOSION_TIME};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Direction an entity's sprite faces. Kept from the previous tick while
/// the entity stands still.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct MirrorPlayer {
    pub x: i32,
    pub y: i32,
    /// Synthesized movement-intent vector, purely for animation.
    pub move_dir: (i32, i32),
    pub moving: bool,
    pub facing: Facing,
    pub alive: bool,
    pub hp: i32,
    pub invincible: bool,
    pub inv_timer: f32,
}

#[derive(Debug, Clone)]
pub struct MirrorEnemy {
    pub x: i32,
    pub y: i32,
    pub kind: u8,
    pub move_dir: (i32, i32),
    pub facing: Facing,
}

#[derive(Debug, Clone)]
pub struct MirrorBomb {
    pub x: i32,
    pub y: i32,
    /// Local time since this bomb was first seen, drives the flicker cycle.
    pub age: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorWall {
    pub kind: WallKind,
    pub hp: i32,
}

/// A time-boxed local explosion effect.
#[derive(Debug, Clone)]
pub struct Effect {
    pub x: i32,
    pub y: i32,
    pub ttl: f32,
}

/// The client's shadow of the authoritative world.
#[derive(Debug, Default)]
pub struct Mirror {
    pub players: BTreeMap<u32, MirrorPlayer>,
    pub walls: HashMap<(i32, i32), MirrorWall>,
    pub enemies: BTreeMap<u32, MirrorEnemy>,
    pub bombs: Vec<MirrorBomb>,
    pub powerups: Vec<PowerupSnap>,
    pub explosions: Vec<Effect>,
    pub score: u32,
    pub game_over: bool,
    pub win: bool,
    /// Positions with a still-alive local effect, so a blast the server
    /// keeps reporting is not re-spawned every apply.
    live_effects: HashSet<(i32, i32)>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles one snapshot into the mirror.
    ///
    /// Applying the same snapshot twice leaves the wall map unchanged and
    /// zeroes every motion vector (no delta means no movement).
    pub fn apply(&mut self, snap: &WorldSnapshot) {
        self.apply_players(snap);
        self.apply_walls(snap);
        self.apply_enemies(snap);
        self.apply_bombs(snap);
        self.powerups = snap.powerups.clone();
        self.apply_explosions(snap);

        self.score = snap.score;
        self.game_over = snap.game_over;
        self.win = snap.win;
    }

    /// Advances local-only timers: bomb flicker age and effect lifetimes.
    pub fn tick(&mut self, dt: f32) {
        for bomb in &mut self.bombs {
            bomb.age += dt;
        }
        for effect in &mut self.explosions {
            effect.ttl -= dt;
        }
        let live = &mut self.live_effects;
        self.explosions.retain(|e| {
            if e.ttl > 0.0 {
                true
            } else {
                live.remove(&(e.x, e.y));
                false
            }
        });
    }

    fn apply_players(&mut self, snap: &WorldSnapshot) {
        for (&id, ps) in &snap.players {
            match self.players.get_mut(&id) {
                Some(player) => {
                    let dx = ps.x - player.x;
                    let dy = ps.y - player.y;
                    player.move_dir = (dx.signum(), dy.signum());
                    player.moving = dx != 0 || dy != 0;
                    if let Some(facing) = infer_facing(dx, dy) {
                        player.facing = facing;
                    }
                    player.x = ps.x;
                    player.y = ps.y;
                    player.alive = ps.alive;
                    player.hp = ps.hp;
                    player.invincible = ps.invincible;
                    player.inv_timer = ps.inv_timer;
                }
                None => {
                    self.players.insert(
                        id,
                        MirrorPlayer {
                            x: ps.x,
                            y: ps.y,
                            move_dir: (0, 0),
                            moving: false,
                            facing: Facing::Down,
                            alive: ps.alive,
                            hp: ps.hp,
                            invincible: ps.invincible,
                            inv_timer: ps.inv_timer,
                        },
                    );
                }
            }
        }
    }

    // O(existing + incoming): one pass to drop absent cells, one to upsert.
    fn apply_walls(&mut self, snap: &WorldSnapshot) {
        let incoming: HashSet<(i32, i32)> = snap.walls.iter().map(|w| (w.gx, w.gy)).collect();
        self.walls.retain(|cell, _| incoming.contains(cell));

        for w in &snap.walls {
            let cell = (w.gx, w.gy);
            match self.walls.get_mut(&cell) {
                // same kind: the local object survives, only hp updates
                Some(existing) if existing.kind == w.kind => existing.hp = w.hp,
                // kind changed or new cell: destroyed-and-recreated
                _ => {
                    self.walls.insert(
                        cell,
                        MirrorWall {
                            kind: w.kind,
                            hp: w.hp,
                        },
                    );
                }
            }
        }
    }

    fn apply_enemies(&mut self, snap: &WorldSnapshot) {
        let incoming: HashSet<u32> = snap.enemies.iter().map(|e| e.id).collect();
        self.enemies.retain(|id, _| incoming.contains(id));

        for es in &snap.enemies {
            match self.enemies.get_mut(&es.id) {
                Some(enemy) => {
                    let dx = es.x - enemy.x;
                    let dy = es.y - enemy.y;
                    enemy.move_dir = (dx.signum(), dy.signum());
                    if let Some(facing) = infer_facing(dx, dy) {
                        enemy.facing = facing;
                    }
                    enemy.x = es.x;
                    enemy.y = es.y;
                    enemy.kind = es.kind;
                }
                None => {
                    self.enemies.insert(
                        es.id,
                        MirrorEnemy {
                            x: es.x,
                            y: es.y,
                            kind: es.kind,
                            move_dir: (0, 0),
                            facing: Facing::Down,
                        },
                    );
                }
            }
        }
    }

    // No wire identity: rebuilt every apply, carrying the flicker age over
    // by position so a standing bomb keeps its cycle.
    fn apply_bombs(&mut self, snap: &WorldSnapshot) {
        let previous = std::mem::take(&mut self.bombs);
        self.bombs = snap
            .bombs
            .iter()
            .map(|b| {
                let age = previous
                    .iter()
                    .find(|p| p.x == b.x && p.y == b.y)
                    .map(|p| p.age)
                    .unwrap_or(0.0);
                MirrorBomb {
                    x: b.x,
                    y: b.y,
                    age,
                }
            })
            .collect();
    }

    fn apply_explosions(&mut self, snap: &WorldSnapshot) {
        for e in &snap.explosions {
            // a re-reported blast does not refresh the local effect
            if self.live_effects.insert((e.x, e.y)) {
                self.explosions.push(Effect {
                    x: e.x,
                    y: e.y,
                    ttl: EXPLOSION_TIME,
                });
            }
        }
    }
}

fn infer_facing(dx: i32, dy: i32) -> Option<Facing> {
    if dx.abs() >= dy.abs() && dx != 0 {
        Some(if dx > 0 { Facing::Right } else { Facing::Left })
    } else if dy != 0 {
        Some(if dy > 0 { Facing::Down } else { Facing::Up })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BombSnap, EnemySnap, ExplosionSnap, PlayerSnap, WallSnap};

    fn player_at(x: i32, y: i32) -> PlayerSnap {
        PlayerSnap {
            x,
            y,
            alive: true,
            hp: 3,
            invincible: false,
            inv_timer: 0.0,
        }
    }

    fn snapshot_with_player(x: i32, y: i32) -> WorldSnapshot {
        let mut players = BTreeMap::new();
        players.insert(1, player_at(x, y));
        WorldSnapshot {
            players,
            ..Default::default()
        }
    }

    fn wall(gx: i32, gy: i32, kind: WallKind) -> WallSnap {
        WallSnap {
            gx,
            gy,
            kind,
            hp: 1,
        }
    }

    #[test]
    fn test_first_apply_creates_players_facing_down() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot_with_player(48, 48));

        let p = &mirror.players[&1];
        assert_eq!((p.x, p.y), (48, 48));
        assert!(!p.moving);
        assert_eq!(p.facing, Facing::Down);
    }

    #[test]
    fn test_position_delta_infers_motion_and_facing() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot_with_player(48, 48));
        mirror.apply(&snapshot_with_player(54, 48));

        let p = &mirror.players[&1];
        assert_eq!(p.move_dir, (1, 0));
        assert!(p.moving);
        assert_eq!(p.facing, Facing::Right);

        mirror.apply(&snapshot_with_player(54, 40));
        let p = &mirror.players[&1];
        assert_eq!(p.move_dir, (0, -1));
        assert_eq!(p.facing, Facing::Up);
    }

    #[test]
    fn test_facing_survives_standing_still() {
        let mut mirror = Mirror::new();
        mirror.apply(&snapshot_with_player(48, 48));
        mirror.apply(&snapshot_with_player(40, 48));
        mirror.apply(&snapshot_with_player(40, 48));

        let p = &mirror.players[&1];
        assert!(!p.moving);
        assert_eq!(p.move_dir, (0, 0));
        assert_eq!(p.facing, Facing::Left);
    }

    #[test]
    fn test_player_flags_copied_verbatim() {
        let mut mirror = Mirror::new();
        let mut snap = snapshot_with_player(48, 48);
        let ps = snap.players.get_mut(&1).unwrap();
        ps.alive = false;
        ps.hp = 0;
        ps.invincible = true;
        ps.inv_timer = 1.25;
        mirror.apply(&snap);

        let p = &mirror.players[&1];
        assert!(!p.alive);
        assert_eq!(p.hp, 0);
        assert!(p.invincible);
        assert_approx_eq!(p.inv_timer, 1.25);
    }

    #[test]
    fn test_wall_reconciliation_is_idempotent() {
        let mut mirror = Mirror::new();
        let snap = WorldSnapshot {
            walls: vec![
                wall(0, 0, WallKind::Unbreakable),
                wall(3, 4, WallKind::Breakable),
            ],
            ..Default::default()
        };

        mirror.apply(&snap);
        let first: Vec<((i32, i32), MirrorWall)> = sorted_walls(&mirror);
        mirror.apply(&snap);
        let second = sorted_walls(&mirror);

        assert_eq!(first, second);
        assert_eq!(mirror.walls.len(), 2);
    }

    #[test]
    fn test_absent_wall_is_removed() {
        let mut mirror = Mirror::new();
        mirror.apply(&WorldSnapshot {
            walls: vec![
                wall(3, 4, WallKind::Breakable),
                wall(0, 0, WallKind::Unbreakable),
            ],
            ..Default::default()
        });
        assert!(mirror.walls.contains_key(&(3, 4)));

        mirror.apply(&WorldSnapshot {
            walls: vec![wall(0, 0, WallKind::Unbreakable)],
            ..Default::default()
        });
        assert!(!mirror.walls.contains_key(&(3, 4)));
        assert!(mirror.walls.contains_key(&(0, 0)));
    }

    #[test]
    fn test_wall_kind_change_replaces_entry() {
        let mut mirror = Mirror::new();
        mirror.apply(&WorldSnapshot {
            walls: vec![wall(2, 2, WallKind::Breakable)],
            ..Default::default()
        });
        mirror.apply(&WorldSnapshot {
            walls: vec![wall(2, 2, WallKind::Hard)],
            ..Default::default()
        });

        assert_eq!(mirror.walls[&(2, 2)].kind, WallKind::Hard);
        assert_eq!(mirror.walls.len(), 1);
    }

    #[test]
    fn test_enemies_reconciled_by_id() {
        let mut mirror = Mirror::new();
        mirror.apply(&WorldSnapshot {
            enemies: vec![
                EnemySnap {
                    id: 1,
                    x: 96,
                    y: 96,
                    kind: 1,
                },
                EnemySnap {
                    id: 2,
                    x: 240,
                    y: 96,
                    kind: 2,
                },
            ],
            ..Default::default()
        });
        assert_eq!(mirror.enemies.len(), 2);

        // enemy 1 dies; enemy 2 moves left and keeps its own delta even
        // though it now sits first in the list
        mirror.apply(&WorldSnapshot {
            enemies: vec![EnemySnap {
                id: 2,
                x: 234,
                y: 96,
                kind: 2,
            }],
            ..Default::default()
        });

        assert!(!mirror.enemies.contains_key(&1));
        let e = &mirror.enemies[&2];
        assert_eq!(e.move_dir, (-1, 0));
        assert_eq!(e.facing, Facing::Left);
    }

    #[test]
    fn test_bomb_age_carries_over_by_position() {
        let mut mirror = Mirror::new();
        mirror.apply(&WorldSnapshot {
            bombs: vec![BombSnap { x: 96, y: 48 }],
            ..Default::default()
        });
        mirror.tick(0.5);
        mirror.apply(&WorldSnapshot {
            bombs: vec![BombSnap { x: 96, y: 48 }, BombSnap { x: 144, y: 48 }],
            ..Default::default()
        });

        assert_approx_eq!(mirror.bombs[0].age, 0.5);
        assert_approx_eq!(mirror.bombs[1].age, 0.0);
    }

    #[test]
    fn test_explosion_effects_deduplicate_and_expire() {
        let mut mirror = Mirror::new();
        let snap = WorldSnapshot {
            explosions: vec![ExplosionSnap { x: 96, y: 48 }],
            ..Default::default()
        };

        mirror.apply(&snap);
        assert_eq!(mirror.explosions.len(), 1);

        // the server keeps reporting the blast while it is alive; no
        // duplicate effect and no ttl refresh
        mirror.tick(0.2);
        mirror.apply(&snap);
        assert_eq!(mirror.explosions.len(), 1);
        assert_approx_eq!(mirror.explosions[0].ttl, EXPLOSION_TIME - 0.2);

        // expires locally regardless of further snapshots
        mirror.tick(EXPLOSION_TIME);
        assert!(mirror.explosions.is_empty());

        // once expired, a new report at the same position spawns afresh
        mirror.apply(&snap);
        assert_eq!(mirror.explosions.len(), 1);
        assert_approx_eq!(mirror.explosions[0].ttl, EXPLOSION_TIME);
    }

    #[test]
    fn test_score_and_terminal_flags_copied() {
        let mut mirror = Mirror::new();
        mirror.apply(&WorldSnapshot {
            score: 120,
            game_over: true,
            win: false,
            ..Default::default()
        });

        assert_eq!(mirror.score, 120);
        assert!(mirror.game_over);
        assert!(!mirror.win);
    }

    fn sorted_walls(mirror: &Mirror) -> Vec<((i32, i32), MirrorWall)> {
        let mut walls: Vec<_> = mirror
            .walls
            .iter()
            .map(|(&cell, wall)| (cell, wall.clone()))
            .collect();
        walls.sort_by_key(|(cell, _)| *cell);
        walls
    }
}
