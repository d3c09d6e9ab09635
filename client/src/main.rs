use clap::Parser;
use client::input::InputTracker;
use client::mirror::Mirror;
use client::network::Session;
use log::{info, warn};
use shared::Message;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Drive a scripted input loop instead of idling
    #[arg(short, long)]
    exercise: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Connecting to {}", args.server);

    let mut session = Session::connect(&args.server).await?;
    info!("Playing as player {}", session.player_id());

    let mut mirror = Mirror::new();
    let mut tracker = InputTracker::new();

    let mut ticker = interval(Duration::from_secs_f32(1.0 / 60.0));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut last_tick = Instant::now();
    let mut last_status = Instant::now();

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let dt = (now - last_tick).as_secs_f32();
        last_tick = now;

        while let Some(msg) = session.poll_control() {
            match msg {
                Message::Disconnected { reason } => {
                    info!("Server closed the session: {}", reason);
                }
                other => warn!("Unexpected control message: {}", other.kind()),
            }
        }

        if let Some(snapshot) = session.take_snapshot() {
            mirror.apply(&snapshot);
        }
        mirror.tick(dt);

        if args.exercise {
            let elapsed = started.elapsed().as_secs_f32();
            let (right, left, up, down, bomb) = scripted_keys(elapsed);
            for action in tracker.update(right, left, up, down, bomb) {
                session.send_input(action).await;
            }
        }

        if last_status.elapsed() >= Duration::from_secs(2) {
            last_status = Instant::now();
            info!(
                "score {} | walls {} | enemies {} | bombs {}",
                mirror.score,
                mirror.walls.len(),
                mirror.enemies.len(),
                mirror.bombs.len()
            );
        }

        if mirror.game_over || mirror.win {
            info!(
                "Match ended: {} (score {})",
                if mirror.win { "win" } else { "game over" },
                mirror.score
            );
            break;
        }
        if !session.is_alive() {
            warn!("Session died, exiting");
            break;
        }
    }

    session.close().await;
    Ok(())
}

/// A repeating walk-and-bomb pattern for soak testing without a renderer.
fn scripted_keys(elapsed: f32) -> (bool, bool, bool, bool, bool) {
    let t = elapsed % 8.0;
    match t {
        t if t < 1.5 => (true, false, false, false, false),
        t if t < 1.7 => (false, false, false, false, true),
        t if t < 3.2 => (false, false, false, true, false),
        t if t < 3.4 => (false, false, false, false, true),
        t if t < 4.9 => (false, true, false, false, false),
        t if t < 5.1 => (false, false, false, false, true),
        t if t < 6.6 => (false, false, true, false, false),
        _ => (false, false, false, false, false),
    }
}
