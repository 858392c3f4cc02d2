//! Session management for connected players
//!
//! This module handles the server-side registry of established sessions,
//! including:
//! - Player id allocation and session lifecycle (join, leave, kick, timeout)
//! - The mapping from player ids to transport endpoints on both channels
//! - Broadcast fan-out that never lets one dead client starve the others
//! - Admin operations (kick, set mode, set team) callable from any thread
//!
//! All mutating operations go through one `RwLock` around the registry, so
//! registration and deregistration can never race a broadcast into
//! observing a half-removed player.

use crate::actions::{team_spawn, ActionState, PlayerBody};
use crate::input::InputTracker;
use crate::network::Outbound;
use log::{info, warn};
use shared::protocol::{ConnectRejected, PlayerJoin, PlayerLeave};
use shared::{GameMode, Inventory, ItemRegistry, Message, Player, Vec3};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};

/// Sessions that stay silent this long are dropped.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// One established client: the player it owns plus both transport endpoints.
#[derive(Debug)]
pub struct Session {
    pub player: Player,
    pub input: InputTracker,
    pub actions: ActionState,
    /// Remote address of the reliable connection.
    pub addr: SocketAddr,
    /// Learned connectionless-channel address; set by the rendezvous echo.
    pub udp_addr: Option<SocketAddr>,
    /// Feeds this client's reliable-channel write task. Dropping it closes
    /// the connection.
    pub reliable_tx: mpsc::UnboundedSender<Message>,
    /// Last time any packet arrived from this client.
    pub last_seen: Instant,
}

impl Session {
    /// Queues a message on this session's reliable channel. A send failure
    /// means the write task is gone; the read task will tear the session
    /// down, so the error is only logged.
    pub fn send_reliable(&self, message: Message) {
        if self.reliable_tx.send(message).is_err() {
            warn!("Reliable channel to player {} is closed", self.player.id);
        }
    }
}

/// Registry of all established sessions.
///
/// Player ids are strictly increasing and never reused within a server run.
/// Team assignment balances the two teams at join time.
pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    next_player_id: u32,
    max_players: usize,
}

impl SessionRegistry {
    pub fn new(max_players: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_player_id: 1,
            max_players,
        }
    }

    /// Registers a new session after a successful handshake.
    ///
    /// Allocates the next player id, places the player at their team spawn
    /// with the default loadout, and stores the transport endpoints. The
    /// spawn table is passed separately because handshake tasks must not
    /// touch the tick thread's world.
    /// Returns None when the server is at capacity.
    pub fn register(
        &mut self,
        username: String,
        addr: SocketAddr,
        reliable_tx: mpsc::UnboundedSender<Message>,
        items: &ItemRegistry,
        spawns: &HashMap<String, Vec3>,
    ) -> Option<u32> {
        if self.sessions.len() >= self.max_players {
            return None;
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        let team = self.balanced_team();
        let spawn = spawns
            .get(team_spawn(team))
            .copied()
            .unwrap_or_else(|| Vec3::new(0.0, 2.0, 0.0));

        let mut player = Player::new(
            player_id,
            username,
            spawn,
            Inventory::default_loadout(items),
        );
        player.team = Some(team);

        info!(
            "Player {} ({}) joined team {} from {}",
            player_id, player.username, team, addr
        );

        self.sessions.insert(
            player_id,
            Session {
                player,
                input: InputTracker::new(player_id),
                actions: ActionState::new(),
                addr,
                udp_addr: None,
                reliable_tx,
                last_seen: Instant::now(),
            },
        );
        Some(player_id)
    }

    fn balanced_team(&self) -> u8 {
        let on_first = self
            .sessions
            .values()
            .filter(|s| s.player.team == Some(0))
            .count();
        let on_second = self.sessions.len() - on_first;
        u8::from(on_first > on_second)
    }

    /// The join announcement to broadcast for a freshly registered player.
    pub fn join_announcement(&self, player_id: u32) -> Option<Message> {
        self.sessions.get(&player_id).map(|s| {
            Message::PlayerJoin(PlayerJoin {
                player_id,
                username: s.player.username.clone(),
                team: s.player.team,
            })
        })
    }

    /// Removes a session and returns the leave announcement to broadcast.
    /// Dropping the session closes its reliable channel.
    pub fn deregister(&mut self, player_id: u32) -> Option<Message> {
        self.sessions.remove(&player_id).map(|session| {
            info!("Player {} ({}) left", player_id, session.player.username);
            Message::PlayerLeave(PlayerLeave { player_id })
        })
    }

    /// Kicks a player: a reason goes out on the reliable channel, then the
    /// session is removed. Returns the leave announcement to broadcast.
    pub fn kick(&mut self, player_id: u32, reason: &str) -> Option<Message> {
        if let Some(session) = self.sessions.get(&player_id) {
            session.send_reliable(Message::ConnectRejected(ConnectRejected {
                reason: reason.to_string(),
            }));
            info!("Kicking player {}: {}", player_id, reason);
        }
        self.deregister(player_id)
    }

    pub fn set_mode(&mut self, player_id: u32, mode: GameMode) -> bool {
        match self.sessions.get_mut(&player_id) {
            Some(session) => {
                session.player.mode = mode;
                true
            }
            None => false,
        }
    }

    pub fn set_team(&mut self, player_id: u32, team: Option<u8>) -> bool {
        match self.sessions.get_mut(&player_id) {
            Some(session) => {
                session.player.team = team;
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, player_id: u32) -> Option<&Session> {
        self.sessions.get(&player_id)
    }

    pub fn lookup_mut(&mut self, player_id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&player_id)
    }

    /// Binds the connectionless-channel address learned from a rendezvous
    /// datagram and refreshes the session's activity timestamp.
    pub fn bind_udp_addr(&mut self, player_id: u32, addr: SocketAddr) -> bool {
        match self.sessions.get_mut(&player_id) {
            Some(session) => {
                if session.udp_addr != Some(addr) {
                    info!("Player {} datagram channel bound to {}", player_id, addr);
                }
                session.udp_addr = Some(addr);
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn touch(&mut self, player_id: u32) {
        if let Some(session) = self.sessions.get_mut(&player_id) {
            session.last_seen = Instant::now();
        }
    }

    /// All player ids, for tick iteration. Order is not guaranteed stable.
    pub fn player_ids(&self) -> Vec<u32> {
        self.sessions.keys().copied().collect()
    }

    /// Position snapshots of every player, for occupancy checks.
    pub fn bodies(&self) -> Vec<PlayerBody> {
        self.sessions
            .values()
            .map(|s| PlayerBody {
                id: s.player.id,
                position: s.player.position,
            })
            .collect()
    }

    /// Connectionless send targets: every session whose rendezvous has
    /// completed.
    pub fn datagram_targets(&self) -> Vec<(u32, SocketAddr)> {
        self.sessions
            .iter()
            .filter_map(|(id, s)| s.udp_addr.map(|addr| (*id, addr)))
            .collect()
    }

    /// Fans a message out over every session's reliable channel. A failed
    /// delivery to one handler never aborts delivery to the others.
    pub fn broadcast_reliable(&self, message: &Message, exclude: Option<u32>) {
        for (id, session) in &self.sessions {
            if Some(*id) == exclude {
                continue;
            }
            session.send_reliable(message.clone());
        }
    }

    /// Removes sessions that have been silent past the timeout and returns
    /// their leave announcements.
    pub fn check_timeouts(&mut self) -> Vec<Message> {
        let timed_out: Vec<u32> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.last_seen.elapsed() > SESSION_TIMEOUT)
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| {
                warn!("Player {} timed out", id);
                self.deregister(id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Thread-safe surface for the command shell and admin tooling. Mutations go
/// through the registry lock; resulting announcements are queued on the
/// ordinary outbound path.
#[derive(Clone)]
pub struct AdminHandle {
    pub registry: Arc<RwLock<SessionRegistry>>,
    pub outbound: mpsc::UnboundedSender<Outbound>,
}

impl AdminHandle {
    pub async fn kick(&self, player_id: u32, reason: &str) -> bool {
        let leave = {
            let mut registry = self.registry.write().await;
            registry.kick(player_id, reason)
        };
        match leave {
            Some(message) => {
                let _ = self.outbound.send(Outbound::broadcast(false, message));
                true
            }
            None => false,
        }
    }

    pub async fn set_mode(&self, player_id: u32, mode: GameMode) -> bool {
        self.registry.write().await.set_mode(player_id, mode)
    }

    pub async fn set_team(&self, player_id: u32, team: Option<u8>) -> bool {
        self.registry.write().await.set_team(player_id, team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::World;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn setup() -> (SessionRegistry, ItemRegistry, World) {
        (
            SessionRegistry::new(4),
            ItemRegistry::standard(),
            World::flat(1),
        )
    }

    fn register(
        registry: &mut SessionRegistry,
        items: &ItemRegistry,
        world: &World,
        name: &str,
        addr: SocketAddr,
    ) -> (u32, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry
            .register(name.to_string(), addr, tx, items, &world.spawn_table())
            .expect("registration should succeed");
        (id, rx)
    }

    #[test]
    fn test_register_assigns_increasing_ids() {
        let (mut registry, items, world) = setup();
        let (id1, _rx1) = register(&mut registry, &items, &world, "a", test_addr());
        let (id2, _rx2) = register(&mut registry, &items, &world, "b", test_addr2());
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_at_capacity_fails() {
        let mut registry = SessionRegistry::new(1);
        let items = ItemRegistry::standard();
        let world = World::flat(1);

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(registry
            .register("a".to_string(), test_addr(), tx, &items, &world.spawn_table())
            .is_some());

        let (tx2, _rx2) = mpsc::unbounded_channel();
        assert!(registry
            .register("b".to_string(), test_addr2(), tx2, &items, &world.spawn_table())
            .is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_teams_are_balanced() {
        let (mut registry, items, world) = setup();
        let (id1, _rx1) = register(&mut registry, &items, &world, "a", test_addr());
        let (id2, _rx2) = register(&mut registry, &items, &world, "b", test_addr2());

        let t1 = registry.lookup(id1).unwrap().player.team;
        let t2 = registry.lookup(id2).unwrap().player.team;
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_players_spawn_at_their_team_spawn() {
        let (mut registry, items, world) = setup();
        let (id, _rx) = register(&mut registry, &items, &world, "a", test_addr());
        let session = registry.lookup(id).unwrap();
        let spawn = world
            .spawn(team_spawn(session.player.team.unwrap()))
            .unwrap();
        assert_eq!(session.player.position, spawn);
    }

    #[test]
    fn test_deregister_emits_leave_announcement() {
        let (mut registry, items, world) = setup();
        let (id, _rx) = register(&mut registry, &items, &world, "a", test_addr());

        match registry.deregister(id) {
            Some(Message::PlayerLeave(leave)) => assert_eq!(leave.player_id, id),
            other => panic!("expected leave announcement, got {:?}", other),
        }
        assert!(registry.is_empty());
        assert!(registry.deregister(id).is_none());
    }

    #[test]
    fn test_kick_sends_reason_then_removes() {
        let (mut registry, items, world) = setup();
        let (id, mut rx) = register(&mut registry, &items, &world, "a", test_addr());

        let leave = registry.kick(id, "being a nuisance");
        assert!(leave.is_some());
        assert!(registry.lookup(id).is_none());

        match rx.try_recv() {
            Ok(Message::ConnectRejected(r)) => assert_eq!(r.reason, "being a nuisance"),
            other => panic!("expected rejection on reliable channel, got {:?}", other),
        }
    }

    #[test]
    fn test_datagram_targets_require_rendezvous() {
        let (mut registry, items, world) = setup();
        let (id1, _rx1) = register(&mut registry, &items, &world, "a", test_addr());
        let (_id2, _rx2) = register(&mut registry, &items, &world, "b", test_addr2());

        assert!(registry.datagram_targets().is_empty());

        let udp_addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert!(registry.bind_udp_addr(id1, udp_addr));
        let targets = registry.datagram_targets();
        assert_eq!(targets, vec![(id1, udp_addr)]);
    }

    #[test]
    fn test_broadcast_reliable_survives_dead_receiver() {
        let (mut registry, items, world) = setup();
        let (id1, rx1) = register(&mut registry, &items, &world, "a", test_addr());
        let (_id2, mut rx2) = register(&mut registry, &items, &world, "b", test_addr2());

        // First client's receiver is gone; the second must still get it.
        drop(rx1);
        registry.broadcast_reliable(
            &Message::PlayerLeave(PlayerLeave { player_id: 99 }),
            None,
        );
        assert!(rx2.try_recv().is_ok());

        // Excluding a player skips them.
        registry.broadcast_reliable(
            &Message::PlayerLeave(PlayerLeave { player_id: 99 }),
            Some(id1),
        );
    }

    #[test]
    fn test_timeout_removes_silent_sessions() {
        let (mut registry, items, world) = setup();
        let (id, _rx) = register(&mut registry, &items, &world, "a", test_addr());

        assert!(registry.check_timeouts().is_empty());

        registry.lookup_mut(id).unwrap().last_seen =
            Instant::now() - SESSION_TIMEOUT - Duration::from_secs(1);
        let leaves = registry.check_timeouts();
        assert_eq!(leaves.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_set_mode_and_team() {
        let (mut registry, items, world) = setup();
        let (id, _rx) = register(&mut registry, &items, &world, "a", test_addr());

        assert!(registry.set_mode(id, GameMode::Creative));
        assert_eq!(registry.lookup(id).unwrap().player.mode, GameMode::Creative);

        assert!(registry.set_team(id, Some(1)));
        assert_eq!(registry.lookup(id).unwrap().player.team, Some(1));

        assert!(!registry.set_mode(999, GameMode::Normal));
        assert!(!registry.set_team(999, None));
    }
}
