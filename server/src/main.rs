use clap::Parser;
use log::{info, warn};
use server::discovery::{self, DiscoveryConfig};
use server::network::Server;
use server::persistence;
use shared::{ItemRegistry, SimConfig, World};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on (tcp and udp)
    #[clap(short, long, default_value = "32887")]
    port: u16,
    /// Tick rate (simulation updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Maximum number of concurrent players
    #[clap(short, long, default_value = "32")]
    max_players: usize,
    /// World snapshot to load; a flat test world is generated if absent
    #[clap(short, long)]
    world: Option<PathBuf>,
    /// Server-list registry endpoint to announce to
    #[clap(long)]
    announce_url: Option<String>,
    /// Server name reported to the registry
    #[clap(long, default_value = "voxelfront server")]
    name: String,
    /// Server description reported to the registry
    #[clap(long, default_value = "")]
    description: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let world = match &args.world {
        Some(path) if path.exists() => {
            let world = persistence::load(path)?;
            info!("Loaded world from {:?}: {} chunks", path, world.chunk_count());
            world
        }
        Some(path) => {
            warn!("World file {:?} not found, generating flat world", path);
            World::flat(4)
        }
        None => World::flat(4),
    };

    let cfg = SimConfig {
        tick_rate: args.tick_rate,
        max_players: args.max_players,
        ..SimConfig::default()
    };
    let items = ItemRegistry::standard();

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, world, cfg, items).await?;

    if let Some(url) = args.announce_url.clone() {
        discovery::spawn_announcer(
            DiscoveryConfig {
                url,
                name: args.name.clone(),
                description: args.description.clone(),
                max_players: args.max_players,
            },
            server.registry(),
        );
    }

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                warn!("Server loop ended with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    if let Some(path) = &args.world {
        persistence::save(server.world(), path)?;
        info!("World saved to {:?}", path);
    }

    Ok(())
}
