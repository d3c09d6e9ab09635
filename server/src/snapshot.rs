use crate::world::World;
use shared::{
    BombSnap, EnemySnap, ExplosionSnap, PlayerSnap, PowerupSnap, WallSnap, WorldSnapshot,
};

/// Flattens the authoritative world into the wire snapshot value.
///
/// Entity positions are rounded to whole pixels; grid-locked entities
/// (bombs, explosions) are reported at their tile's pixel origin. Walls are
/// sorted by row then column so identical worlds serialize identically.
pub fn capture(world: &World) -> WorldSnapshot {
    let ts = world.config.tile_size;

    let players = world
        .players
        .iter()
        .map(|(id, p)| {
            (
                *id,
                PlayerSnap {
                    x: p.x.round() as i32,
                    y: p.y.round() as i32,
                    alive: p.alive,
                    hp: p.hp,
                    invincible: p.inv_timer > 0.0,
                    inv_timer: p.inv_timer,
                },
            )
        })
        .collect();

    let bombs = world
        .bombs
        .iter()
        .map(|b| BombSnap {
            x: b.gx * ts,
            y: b.gy * ts,
        })
        .collect();

    let enemies = world
        .enemies
        .iter()
        .map(|e| EnemySnap {
            id: e.id,
            x: e.x.round() as i32,
            y: e.y.round() as i32,
            kind: e.kind,
        })
        .collect();

    let mut walls: Vec<WallSnap> = world
        .walls
        .iter()
        .map(|(&(gx, gy), w)| WallSnap {
            gx,
            gy,
            kind: w.kind,
            hp: w.hp,
        })
        .collect();
    walls.sort_unstable_by_key(|w| (w.gy, w.gx));

    let powerups = world
        .powerups
        .iter()
        .map(|p| PowerupSnap {
            gx: p.gx,
            gy: p.gy,
            kind: p.kind,
        })
        .collect();

    let explosions = world
        .explosions
        .iter()
        .map(|e| ExplosionSnap {
            x: e.gx * ts,
            y: e.gy * ts,
        })
        .collect();

    WorldSnapshot {
        players,
        bombs,
        enemies,
        walls,
        powerups,
        score: world.score,
        explosions,
        game_over: world.game_over,
        win: world.win,
    }
}
