//! Server-list announcements.
//!
//! Fire-and-forget: the server periodically posts its name, description and
//! player count to an external registry endpoint. Failures are logged and
//! never feed back into the simulation.

use crate::registry::SessionRegistry;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub url: String,
    pub name: String,
    pub description: String,
    pub max_players: usize,
}

/// Spawns the announcer task. It runs until the server exits.
pub fn spawn_announcer(
    config: DiscoveryConfig,
    registry: Arc<RwLock<SessionRegistry>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut interval = tokio::time::interval(ANNOUNCE_INTERVAL);
        loop {
            interval.tick().await;

            let players = registry.read().await.len();
            let payload = serde_json::json!({
                "name": config.name,
                "description": config.description,
                "players": players,
                "max_players": config.max_players,
            });

            match client.post(&config.url).json(&payload).send().await {
                Ok(response) if !response.status().is_success() => {
                    debug!("Discovery endpoint answered {}", response.status());
                }
                Ok(_) => {}
                Err(e) => debug!("Discovery announce failed: {}", e),
            }
        }
    })
}
