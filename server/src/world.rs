use crate::events::{EventSink, NullSink, WorldEvent};
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared::{
    Axis, InputAction, PowerupKind, WallKind, EXPLOSION_TIME, GRID_HEIGHT, GRID_WIDTH, TILE_SIZE,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub grid_width: i32,
    pub grid_height: i32,
    pub tile_size: i32,
    /// Pixels per second.
    pub player_speed: f32,
    pub player_hp: i32,
    pub invuln_time: f32,
    pub bomb_timer: f32,
    pub bomb_power: i32,
    pub max_bombs: usize,
    pub explosion_time: f32,
    /// Pixels per second.
    pub enemy_speed: f32,
    pub enemy_count: usize,
    pub breakable_density: f64,
    pub powerup_chance: f64,
    pub speed_boost_duration: f32,
    pub speed_boost_multiplier: f32,
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            grid_width: GRID_WIDTH,
            grid_height: GRID_HEIGHT,
            tile_size: TILE_SIZE,
            player_speed: 4.0 * TILE_SIZE as f32,
            player_hp: 3,
            invuln_time: 2.0,
            bomb_timer: 2.0,
            bomb_power: 2,
            max_bombs: 3,
            explosion_time: EXPLOSION_TIME,
            enemy_speed: 2.5 * TILE_SIZE as f32,
            enemy_count: 5,
            breakable_density: 0.45,
            powerup_chance: 0.35,
            speed_boost_duration: 5.0,
            speed_boost_multiplier: 3.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub move_dir: (i32, i32),
    pub hp: i32,
    pub alive: bool,
    pub inv_timer: f32,
    pub speed_timer: f32,
    pub bomb_cap: usize,
    pub bomb_power: i32,
}

#[derive(Debug, Clone)]
pub struct Wall {
    pub kind: WallKind,
    pub hp: i32,
}

#[derive(Debug, Clone)]
pub struct Bomb {
    pub owner: u32,
    pub gx: i32,
    pub gy: i32,
    pub timer: f32,
    pub power: i32,
}

#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: u32,
    pub kind: u8,
    pub hp: i32,
    pub x: f32,
    pub y: f32,
    pub dir: (i32, i32),
    pub target: Option<(f32, f32)>,
    pub rethink: f32,
}

#[derive(Debug, Clone)]
pub struct Powerup {
    pub gx: i32,
    pub gy: i32,
    pub kind: PowerupKind,
}

#[derive(Debug, Clone)]
pub struct Explosion {
    pub gx: i32,
    pub gy: i32,
    pub timer: f32,
}

/// The authoritative simulation. Only the game-loop task mutates it, through
/// `apply_input` and `update`.
pub struct World {
    pub config: WorldConfig,
    pub players: BTreeMap<u32, Player>,
    pub walls: HashMap<(i32, i32), Wall>,
    pub bombs: Vec<Bomb>,
    pub enemies: Vec<Enemy>,
    pub powerups: Vec<Powerup>,
    pub explosions: Vec<Explosion>,
    pub score: u32,
    pub game_over: bool,
    pub win: bool,
    next_enemy_id: u32,
    rng: StdRng,
    events: Box<dyn EventSink>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self::with_events(config, Box::new(NullSink))
    }

    pub fn with_events(config: WorldConfig, events: Box<dyn EventSink>) -> Self {
        let seed = config.seed;
        let mut world = Self {
            config,
            players: BTreeMap::new(),
            walls: HashMap::new(),
            bombs: Vec::new(),
            enemies: Vec::new(),
            powerups: Vec::new(),
            explosions: Vec::new(),
            score: 0,
            game_over: false,
            win: false,
            next_enemy_id: 1,
            rng: StdRng::seed_from_u64(seed),
            events,
        };
        world.build_level();
        world.spawn_players();
        world.spawn_enemies();
        world
    }

    fn build_level(&mut self) {
        let (gw, gh) = (self.config.grid_width, self.config.grid_height);

        for gx in 0..gw {
            for gy in 0..gh {
                let border = gx == 0 || gy == 0 || gx == gw - 1 || gy == gh - 1;
                if border {
                    self.walls.insert(
                        (gx, gy),
                        Wall {
                            kind: WallKind::Unbreakable,
                            hp: 1,
                        },
                    );
                } else if gx % 2 == 0 && gy % 2 == 0 {
                    self.walls.insert(
                        (gx, gy),
                        Wall {
                            kind: WallKind::Hard,
                            hp: 1,
                        },
                    );
                }
            }
        }

        let reserved = Self::spawn_pockets(gw, gh);
        for gx in 1..gw - 1 {
            for gy in 1..gh - 1 {
                if self.walls.contains_key(&(gx, gy)) || reserved.contains(&(gx, gy)) {
                    continue;
                }
                if self.rng.gen_bool(self.config.breakable_density) {
                    self.walls.insert(
                        (gx, gy),
                        Wall {
                            kind: WallKind::Breakable,
                            hp: 1,
                        },
                    );
                }
            }
        }
    }

    // Tiles kept wall-free so both players can take a first step.
    fn spawn_pockets(gw: i32, gh: i32) -> [(i32, i32); 6] {
        [
            (1, 1),
            (2, 1),
            (1, 2),
            (gw - 2, gh - 2),
            (gw - 3, gh - 2),
            (gw - 2, gh - 3),
        ]
    }

    fn spawn_players(&mut self) {
        let (gw, gh) = (self.config.grid_width, self.config.grid_height);
        for (id, (gx, gy)) in [(1u32, (1, 1)), (2u32, (gw - 2, gh - 2))] {
            let player = Player {
                id,
                x: (gx * self.config.tile_size) as f32,
                y: (gy * self.config.tile_size) as f32,
                move_dir: (0, 0),
                hp: self.config.player_hp,
                alive: true,
                inv_timer: 0.0,
                speed_timer: 0.0,
                bomb_cap: self.config.max_bombs,
                bomb_power: self.config.bomb_power,
            };
            info!("Spawned player {} at tile ({}, {})", id, gx, gy);
            self.players.insert(id, player);
        }
    }

    fn spawn_enemies(&mut self) {
        let (gw, gh) = (self.config.grid_width, self.config.grid_height);
        let reserved = Self::spawn_pockets(gw, gh);

        let mut free: Vec<(i32, i32)> = Vec::new();
        for gx in 1..gw - 1 {
            for gy in 1..gh - 1 {
                let cell = (gx, gy);
                if self.walls.contains_key(&cell) || reserved.contains(&cell) {
                    continue;
                }
                // keep the opening moves safe for both players
                if (gx <= 3 && gy <= 3) || (gx >= gw - 4 && gy >= gh - 4) {
                    continue;
                }
                free.push(cell);
            }
        }
        free.shuffle(&mut self.rng);

        for (i, &(gx, gy)) in free.iter().take(self.config.enemy_count).enumerate() {
            let kind = if i % 2 == 0 { 1u8 } else { 2u8 };
            self.enemies.push(Enemy {
                id: self.next_enemy_id,
                kind,
                hp: i32::from(kind),
                x: (gx * self.config.tile_size) as f32,
                y: (gy * self.config.tile_size) as f32,
                dir: (0, 0),
                target: None,
                rethink: 0.0,
            });
            self.next_enemy_id += 1;
        }
        info!("Spawned {} enemies", self.enemies.len());
    }

    pub fn apply_input(&mut self, player_id: u32, action: &InputAction) {
        match action {
            InputAction::Move { dx, dy } => self.move_intent(player_id, *dx, *dy),
            InputAction::StopMove { axis } => self.stop_move(player_id, *axis),
            InputAction::Bomb {} => self.place_bomb(player_id),
        }
    }

    pub fn move_intent(&mut self, player_id: u32, dx: i32, dy: i32) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.move_dir = (dx.signum(), dy.signum());
        }
    }

    pub fn stop_move(&mut self, player_id: u32, axis: Axis) {
        if let Some(player) = self.players.get_mut(&player_id) {
            match axis {
                Axis::X => player.move_dir.0 = 0,
                Axis::Y => player.move_dir.1 = 0,
            }
        }
    }

    pub fn place_bomb(&mut self, player_id: u32) {
        let (alive, x, y, cap, power) = match self.players.get(&player_id) {
            Some(p) => (p.alive, p.x, p.y, p.bomb_cap, p.bomb_power),
            None => return,
        };
        if !alive {
            return;
        }

        let (gx, gy) = self.cell_of(x, y);
        if self.bombs.iter().any(|b| b.gx == gx && b.gy == gy) {
            return;
        }
        if self.bombs.iter().filter(|b| b.owner == player_id).count() >= cap {
            return;
        }

        self.bombs.push(Bomb {
            owner: player_id,
            gx,
            gy,
            timer: self.config.bomb_timer,
            power,
        });
        self.events.emit(WorldEvent::BombPlaced {
            owner: player_id,
            gx,
            gy,
        });
    }

    pub fn update(&mut self, dt: f32) {
        self.update_players(dt);
        // age old explosion tiles before bombs add this tick's, so every
        // blast is visible for at least one full snapshot
        self.update_explosions(dt);
        self.update_bombs(dt);
        self.update_enemies(dt);
        self.update_pickups();
        self.update_flags();
    }

    fn update_players(&mut self, dt: f32) {
        let ids: Vec<u32> = self.players.keys().cloned().collect();
        for id in ids {
            let (x, y, dir, speed) = match self.players.get_mut(&id) {
                Some(p) => {
                    p.inv_timer = (p.inv_timer - dt).max(0.0);
                    p.speed_timer = (p.speed_timer - dt).max(0.0);
                    if !p.alive || p.move_dir == (0, 0) {
                        continue;
                    }
                    let mut speed = self.config.player_speed;
                    if p.speed_timer > 0.0 {
                        speed *= self.config.speed_boost_multiplier;
                    }
                    (p.x, p.y, p.move_dir, speed)
                }
                None => continue,
            };

            let (mut dx, mut dy) = (dir.0 as f32, dir.1 as f32);
            let len = (dx * dx + dy * dy).sqrt();
            dx /= len;
            dy /= len;

            // each axis resolves on its own so walls slide instead of stick
            let step = speed * dt;
            let mut nx = x + dx * step;
            if self.rect_hits_solid(nx, y) {
                nx = x;
            }
            let mut ny = y + dy * step;
            if self.rect_hits_solid(nx, ny) {
                ny = y;
            }

            if let Some(p) = self.players.get_mut(&id) {
                p.x = nx;
                p.y = ny;
            }
        }
    }

    fn update_bombs(&mut self, dt: f32) {
        for bomb in &mut self.bombs {
            bomb.timer -= dt;
        }

        let (due, rest): (Vec<Bomb>, Vec<Bomb>) =
            self.bombs.drain(..).partition(|b| b.timer <= 0.0);
        self.bombs = rest;

        for bomb in due {
            self.explode(&bomb);
        }
    }

    fn explode(&mut self, bomb: &Bomb) {
        let mut tiles = vec![(bomb.gx, bomb.gy)];

        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            for dist in 1..=bomb.power {
                let gx = bomb.gx + dx * dist;
                let gy = bomb.gy + dy * dist;
                if gx < 0
                    || gy < 0
                    || gx >= self.config.grid_width
                    || gy >= self.config.grid_height
                {
                    break;
                }
                match self.walls.get(&(gx, gy)).map(|w| w.kind) {
                    Some(WallKind::Unbreakable) | Some(WallKind::Hard) => break,
                    Some(WallKind::Breakable) => {
                        // the breakable tile itself burns, nothing behind it
                        tiles.push((gx, gy));
                        break;
                    }
                    None => tiles.push((gx, gy)),
                }
            }
        }

        for &(gx, gy) in &tiles {
            self.blast_tile(gx, gy);
        }
        self.events.emit(WorldEvent::BombExploded {
            gx: bomb.gx,
            gy: bomb.gy,
        });
    }

    fn blast_tile(&mut self, gx: i32, gy: i32) {
        self.explosions.push(Explosion {
            gx,
            gy,
            timer: self.config.explosion_time,
        });

        let mut destroyed = false;
        if let Some(wall) = self.walls.get_mut(&(gx, gy)) {
            if wall.kind == WallKind::Breakable {
                wall.hp -= 1;
                if wall.hp <= 0 {
                    destroyed = true;
                }
            }
        }
        if destroyed {
            self.walls.remove(&(gx, gy));
            self.score += 10;
            self.events.emit(WorldEvent::WallDestroyed { gx, gy });
            if self.rng.gen_bool(self.config.powerup_chance) {
                let kind = match self.rng.gen_range(0..3) {
                    0 => PowerupKind::BombCount,
                    1 => PowerupKind::BombPower,
                    _ => PowerupKind::Speed,
                };
                self.powerups.push(Powerup { gx, gy, kind });
            }
        }

        let ids: Vec<u32> = self.players.keys().cloned().collect();
        for id in ids {
            let on_tile = match self.players.get(&id) {
                Some(p) => p.alive && self.cell_of(p.x, p.y) == (gx, gy),
                None => false,
            };
            if on_tile {
                self.damage_player(id);
            }
        }

        let mut i = 0;
        while i < self.enemies.len() {
            let hit = {
                let e = &self.enemies[i];
                self.cell_of(e.x, e.y) == (gx, gy)
            };
            if hit {
                self.enemies[i].hp -= 1;
                if self.enemies[i].hp <= 0 {
                    self.enemies.remove(i);
                    self.score += 100;
                    continue;
                }
            }
            i += 1;
        }
    }

    fn damage_player(&mut self, player_id: u32) {
        let invuln = self.config.invuln_time;
        if let Some(player) = self.players.get_mut(&player_id) {
            if !player.alive || player.inv_timer > 0.0 {
                return;
            }
            player.hp -= 1;
            player.inv_timer = invuln;
            if player.hp <= 0 {
                player.hp = 0;
                player.alive = false;
                player.move_dir = (0, 0);
                self.events.emit(WorldEvent::PlayerDied { player_id });
            }
        }
    }

    fn update_enemies(&mut self, dt: f32) {
        let ts = self.config.tile_size as f32;
        let speed = self.config.enemy_speed;
        let rethink_interval = ts / speed;

        for i in 0..self.enemies.len() {
            let (x, y, target, dir, rethink) = {
                let e = &self.enemies[i];
                (e.x, e.y, e.target, e.dir, e.rethink)
            };

            if let Some((tx, ty)) = target {
                let step = speed * dt;
                let nx = move_toward(x, tx, step);
                let ny = move_toward(y, ty, step);
                let e = &mut self.enemies[i];
                e.x = nx;
                e.y = ny;
                if nx == tx && ny == ty {
                    e.target = None;
                }
            } else if rethink > dt {
                self.enemies[i].rethink = rethink - dt;
            } else {
                let (gx, gy) = ((x / ts).round() as i32, (y / ts).round() as i32);

                let mut options = [(1, 0), (-1, 0), (0, 1), (0, -1)];
                options.shuffle(&mut self.rng);
                let reverse = (-dir.0, -dir.1);

                let mut choice = None;
                for &d in &options {
                    if self.is_solid_cell(gx + d.0, gy + d.1) {
                        continue;
                    }
                    if d == reverse && dir != (0, 0) {
                        continue;
                    }
                    choice = Some(d);
                    break;
                }
                // dead end, turning back is allowed
                if choice.is_none()
                    && dir != (0, 0)
                    && !self.is_solid_cell(gx + reverse.0, gy + reverse.1)
                {
                    choice = Some(reverse);
                }

                let e = &mut self.enemies[i];
                e.rethink = rethink_interval;
                if let Some(d) = choice {
                    e.dir = d;
                    e.target = Some((((gx + d.0) as f32) * ts, ((gy + d.1) as f32) * ts));
                }
            }
        }

        let ids: Vec<u32> = self.players.keys().cloned().collect();
        for id in ids {
            let hit = match self.players.get(&id) {
                Some(p) if p.alive => self
                    .enemies
                    .iter()
                    .any(|e| (e.x - p.x).abs() < ts && (e.y - p.y).abs() < ts),
                _ => false,
            };
            if hit {
                self.damage_player(id);
            }
        }
    }

    fn update_pickups(&mut self) {
        let ids: Vec<u32> = self.players.keys().cloned().collect();
        for id in ids {
            let cell = match self.players.get(&id) {
                Some(p) if p.alive => self.cell_of(p.x, p.y),
                _ => continue,
            };
            if let Some(idx) = self.powerups.iter().position(|p| (p.gx, p.gy) == cell) {
                let powerup = self.powerups.remove(idx);
                self.apply_powerup(id, &powerup);
            }
        }
    }

    fn apply_powerup(&mut self, player_id: u32, powerup: &Powerup) {
        let duration = self.config.speed_boost_duration;
        match self.players.get_mut(&player_id) {
            Some(player) => match powerup.kind {
                PowerupKind::BombCount => player.bomb_cap += 1,
                PowerupKind::BombPower => player.bomb_power += 1,
                PowerupKind::Speed => player.speed_timer = duration,
            },
            None => return,
        }
        self.score += 25;
        self.events.emit(WorldEvent::PowerupPicked {
            player_id,
            gx: powerup.gx,
            gy: powerup.gy,
        });
    }

    fn update_explosions(&mut self, dt: f32) {
        for explosion in &mut self.explosions {
            explosion.timer -= dt;
        }
        self.explosions.retain(|e| e.timer > 0.0);
    }

    // terminal flags latch, nothing ever clears them
    fn update_flags(&mut self) {
        if !self.game_over && self.players.values().all(|p| !p.alive) {
            self.game_over = true;
            info!("Game over, every player is down");
        }
        if !self.win && self.enemies.is_empty() {
            self.win = true;
            info!("All enemies cleared");
        }
    }

    pub fn is_solid_cell(&self, gx: i32, gy: i32) -> bool {
        if gx < 0 || gy < 0 || gx >= self.config.grid_width || gy >= self.config.grid_height {
            return true;
        }
        self.walls.contains_key(&(gx, gy))
    }

    pub fn cell_of(&self, x: f32, y: f32) -> (i32, i32) {
        let ts = self.config.tile_size as f32;
        (((x + ts / 2.0) / ts) as i32, ((y + ts / 2.0) / ts) as i32)
    }

    fn rect_hits_solid(&self, x: f32, y: f32) -> bool {
        let ts = self.config.tile_size as f32;
        // shaving the far edge keeps a flush-aligned rect inside its own cells
        let eps = 0.01;
        let min_gx = (x / ts).floor() as i32;
        let max_gx = ((x + ts - eps) / ts).floor() as i32;
        let min_gy = (y / ts).floor() as i32;
        let max_gy = ((y + ts - eps) / ts).floor() as i32;

        for gx in min_gx..=max_gx {
            for gy in min_gy..=max_gy {
                if self.is_solid_cell(gx, gy) {
                    return true;
                }
            }
        }
        false
    }
}

fn move_toward(current: f32, target: f32, step: f32) -> f32 {
    if current < target {
        (current + step).min(target)
    } else if current > target {
        (current - step).max(target)
    } else {
        current
    }
}
