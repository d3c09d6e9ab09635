use clap::Parser;
use log::info;
use server::events::LogSink;
use server::network::Server;
use server::world::{World, WorldConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value_t = 30)]
    tick_rate: u32,

    /// Level generation seed
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Number of enemies to spawn
    #[arg(short, long, default_value_t = 5)]
    enemies: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    info!("Starting server on {} ({} Hz)", addr, args.tick_rate);

    let mut server = Server::bind(&addr).await?;
    server.accept_players().await?;

    let config = WorldConfig {
        seed: args.seed,
        enemy_count: args.enemies,
        ..WorldConfig::default()
    };
    let mut world = World::with_events(config, Box::new(LogSink));

    server.run(&mut world, args.tick_rate).await;

    info!("Server stopped");
    Ok(())
}
