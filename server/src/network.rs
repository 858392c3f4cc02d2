//! Server transport layer and tick loop coordination.
//!
//! Two channels: a TCP listener carries the reliable ordered channel
//! (handshake, chat, world push, inventory snapshots), and one shared UDP
//! socket carries everything sent at tick frequency. Inbound traffic from
//! all tasks funnels through one event channel into the main loop, which is
//! the single writer for the world and all player simulation state.

use crate::actions::{self, TickContext};
use crate::projectile::ProjectileEngine;
use crate::registry::{AdminHandle, SessionRegistry};
use log::{debug, error, info, warn};
use shared::protocol::{
    ConnectAccepted, ConnectRejected, ChunkData, PlayerUpdate, PROTOCOL_VERSION,
};
use shared::protocol::{ChatBroadcast, MAX_DATAGRAM_LEN, MAX_FRAME_LEN};
use shared::{decode, encode, ItemRegistry, Message, SimConfig, Vec3, World};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, timeout, MissedTickBehavior};

const MAX_USERNAME_LEN: usize = 32;
const MAX_CHAT_LEN: usize = 256;

/// Writes one length-framed message to the reliable channel.
pub async fn write_frame<S>(stream: &mut S, message: &Message) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let payload =
        encode(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds size limit",
        ));
    }
    stream.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    stream.write_all(&payload).await?;
    Ok(())
}

/// Reads one length-framed message from the reliable channel.
pub async fn read_frame<S>(stream: &mut S) -> io::Result<Message>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let len = u32::from_le_bytes(header) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad frame length",
        ));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    decode(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Events sent from network tasks to the main loop.
#[derive(Debug)]
pub enum ServerEvent {
    /// A datagram arrived on the connectionless channel.
    Datagram { message: Message, addr: SocketAddr },
    /// A message arrived on an established client's reliable channel.
    Reliable { player_id: u32, message: Message },
    /// A handshake completed and the session is registered.
    Joined { player_id: u32 },
    /// A client's reliable channel failed or closed.
    Disconnected { player_id: u32 },
}

/// Outgoing traffic queued by the main loop and drained by the sender task.
#[derive(Debug)]
pub enum Outbound {
    Direct {
        player_id: u32,
        reliable: bool,
        message: Message,
    },
    Broadcast {
        reliable: bool,
        exclude: Option<u32>,
        message: Message,
    },
}

impl Outbound {
    pub fn direct(player_id: u32, reliable: bool, message: Message) -> Self {
        Outbound::Direct {
            player_id,
            reliable,
            message,
        }
    }

    pub fn broadcast(reliable: bool, message: Message) -> Self {
        Outbound::Broadcast {
            reliable,
            exclude: None,
            message,
        }
    }

    pub fn message(&self) -> &Message {
        match self {
            Outbound::Direct { message, .. } => message,
            Outbound::Broadcast { message, .. } => message,
        }
    }
}

/// Main server: owns the world and the simulation, coordinates the accept
/// loop, per-client readers, the shared datagram receiver and the sender
/// task.
pub struct Server {
    listener: Option<TcpListener>,
    udp: Arc<UdpSocket>,
    registry: Arc<RwLock<SessionRegistry>>,
    items: Arc<ItemRegistry>,
    cfg: Arc<SimConfig>,
    spawns: Arc<HashMap<String, Vec3>>,
    world: World,
    projectiles: ProjectileEngine,
    /// Simulation clock in seconds, advanced once per tick.
    sim_clock: f64,
    tick: u64,

    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Server {
    pub async fn new(
        addr: &str,
        world: World,
        cfg: SimConfig,
        items: ItemRegistry,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // Both channels share one advertised port. Binding TCP first makes
        // port 0 resolve to something the UDP bind can follow.
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let udp = Arc::new(UdpSocket::bind(local).await?);
        info!("Server listening on {} (tcp+udp)", local);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let spawns = Arc::new(world.spawn_table());
        let max_players = cfg.max_players;

        Ok(Server {
            listener: Some(listener),
            udp,
            registry: Arc::new(RwLock::new(SessionRegistry::new(max_players))),
            items: Arc::new(items),
            cfg: Arc::new(cfg),
            spawns,
            world,
            projectiles: ProjectileEngine::new(),
            sim_clock: 0.0,
            tick: 0,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    /// Address both channels are bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Handle for admin tooling; safe to use from any thread.
    pub fn admin_handle(&self) -> AdminHandle {
        AdminHandle {
            registry: Arc::clone(&self.registry),
            outbound: self.outbound_tx.clone(),
        }
    }

    pub fn registry(&self) -> Arc<RwLock<SessionRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    fn queue(&self, outbound: Outbound) {
        if self.outbound_tx.send(outbound).is_err() {
            error!("Outbound channel closed");
        }
    }

    /// Spawns the accept loop; each connection gets its own handshake task.
    fn spawn_accept_loop(&mut self) {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => return,
        };
        let registry = Arc::clone(&self.registry);
        let items = Arc::clone(&self.items);
        let cfg = Arc::clone(&self.cfg);
        let spawns = Arc::clone(&self.spawns);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("Incoming connection from {}", addr);
                        let registry = Arc::clone(&registry);
                        let items = Arc::clone(&items);
                        let cfg = Arc::clone(&cfg);
                        let spawns = Arc::clone(&spawns);
                        let server_tx = server_tx.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, addr, registry, items, cfg, spawns, server_tx)
                                .await;
                        });
                    }
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that listens on the connectionless channel.
    fn spawn_datagram_receiver(&self) {
        let udp = Arc::clone(&self.udp);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_LEN];
            loop {
                match udp.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(message) => {
                            if server_tx
                                .send(ServerEvent::Datagram { message, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            // Malformed datagrams are dropped; the channel
                            // keeps running.
                            warn!("Dropping bad datagram from {}: {}", addr, e);
                        }
                    },
                    Err(e) => {
                        error!("Datagram receive error: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outbound queue. Sends never block the
    /// tick loop; a failure to one client never stops the fan-out.
    fn spawn_outbound_sender(&mut self) {
        let udp = Arc::clone(&self.udp);
        let registry = Arc::clone(&self.registry);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Direct {
                        player_id,
                        reliable,
                        message,
                    } => {
                        let registry = registry.read().await;
                        let session = match registry.lookup(player_id) {
                            Some(session) => session,
                            None => continue,
                        };
                        if reliable {
                            session.send_reliable(message);
                        } else if let Some(addr) = session.udp_addr {
                            send_datagram(&udp, &message, addr).await;
                        }
                    }
                    Outbound::Broadcast {
                        reliable,
                        exclude,
                        message,
                    } => {
                        if reliable {
                            registry.read().await.broadcast_reliable(&message, exclude);
                        } else {
                            let targets = registry.read().await.datagram_targets();
                            for (player_id, addr) in targets {
                                if Some(player_id) == exclude {
                                    continue;
                                }
                                send_datagram(&udp, &message, addr).await;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns the task that sweeps out silent sessions.
    fn spawn_timeout_checker(&self) {
        let registry = Arc::clone(&self.registry);
        let outbound_tx = self.outbound_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let leaves = {
                    let mut registry = registry.write().await;
                    registry.check_timeouts()
                };
                for leave in leaves {
                    if outbound_tx.send(Outbound::broadcast(false, leave)).is_err() {
                        return;
                    }
                }
            }
        });
    }

    /// Routes one inbound event. Runs on the same task as the tick loop, so
    /// every mutation here keeps the single-writer invariant.
    async fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Datagram { message, addr } => {
                self.handle_datagram(message, addr).await
            }
            ServerEvent::Reliable { player_id, message } => {
                self.handle_reliable(player_id, message).await
            }
            ServerEvent::Joined { player_id } => self.handle_joined(player_id).await,
            ServerEvent::Disconnected { player_id } => {
                let leave = {
                    let mut registry = self.registry.write().await;
                    registry.deregister(player_id)
                };
                if let Some(leave) = leave {
                    self.queue(Outbound::broadcast(false, leave));
                }
            }
        }
    }

    async fn handle_datagram(&mut self, message: Message, addr: SocketAddr) {
        match message {
            Message::DatagramInit(init) => {
                let bound = {
                    let mut registry = self.registry.write().await;
                    registry.bind_udp_addr(init.player_id, addr)
                };
                if bound {
                    // Echo the init verbatim; the client stops retrying once
                    // it sees its own datagram come back.
                    send_datagram(&self.udp, &Message::DatagramInit(init), addr).await;
                } else {
                    warn!("Datagram init for unknown player {} from {}", init.player_id, addr);
                }
            }
            Message::ClientInput(snapshot) => {
                let mut registry = self.registry.write().await;
                if let Some(session) = registry.lookup_mut(snapshot.player_id) {
                    if session.udp_addr == Some(addr) {
                        session.input.accept(snapshot);
                        session.last_seen = Instant::now();
                    } else {
                        warn!("Input for player {} from unexpected {}", snapshot.player_id, addr);
                    }
                }
            }
            Message::ClientOrientation(orientation) => {
                let mut registry = self.registry.write().await;
                if let Some(session) = registry.lookup_mut(orientation.player_id) {
                    if session.udp_addr == Some(addr) {
                        session
                            .input
                            .set_orientation(orientation.yaw, orientation.pitch);
                        session.last_seen = Instant::now();
                    }
                }
            }
            Message::BlockColorSelect(select) => {
                let mut registry = self.registry.write().await;
                if let Some(session) = registry.lookup_mut(select.player_id) {
                    if session.udp_addr == Some(addr) {
                        let color = select.color.clamp(1, 127);
                        for stack in &mut session.player.inventory.stacks {
                            if let shared::ItemStack::Block { color: c, .. } = stack {
                                *c = color;
                            }
                        }
                    }
                }
            }
            other => {
                warn!("Unexpected datagram from {}: {:?}", addr, other);
            }
        }
    }

    async fn handle_reliable(&mut self, player_id: u32, message: Message) {
        match message {
            Message::ChatSubmit(chat) => {
                let text = chat.text.trim();
                if text.is_empty() || text.len() > MAX_CHAT_LEN {
                    return;
                }
                let username = {
                    let mut registry = self.registry.write().await;
                    registry.touch(player_id);
                    match registry.lookup(player_id) {
                        Some(session) => session.player.username.clone(),
                        None => return,
                    }
                };
                info!("<{}> {}", username, text);
                self.queue(Outbound::broadcast(
                    true,
                    Message::ChatBroadcast(ChatBroadcast {
                        player_id,
                        username,
                        text: text.to_string(),
                    }),
                ));
            }
            other => {
                warn!("Unexpected reliable message from player {}: {:?}", player_id, other);
            }
        }
    }

    /// World sync for a freshly established session: every chunk and the
    /// starting inventory over the reliable channel, the roster of players
    /// already present, then the join broadcast for everyone else.
    async fn handle_joined(&mut self, player_id: u32) {
        for (coord, chunk) in self.world.chunks() {
            self.queue(Outbound::direct(
                player_id,
                true,
                Message::ChunkData(ChunkData {
                    coord: *coord,
                    voxels: chunk.as_bytes().to_vec(),
                }),
            ));
        }

        let registry = self.registry.read().await;
        if let Some(session) = registry.lookup(player_id) {
            self.queue(Outbound::direct(
                player_id,
                true,
                Message::InventorySnapshot(shared::protocol::InventorySnapshot {
                    player_id,
                    stacks: session.player.inventory.stacks.clone(),
                    selected: session.player.inventory.selected_index() as u8,
                }),
            ));
        }
        for other_id in registry.player_ids() {
            if other_id == player_id {
                continue;
            }
            if let Some(join) = registry.join_announcement(other_id) {
                self.queue(Outbound::direct(player_id, true, join));
            }
        }
        if let Some(join) = registry.join_announcement(player_id) {
            self.queue(Outbound::Broadcast {
                reliable: false,
                exclude: Some(player_id),
                message: join,
            });
        }
    }

    /// One fixed-rate simulation step over every registered player, then the
    /// projectile pass. Only players whose state actually changed are
    /// broadcast.
    async fn run_tick(&mut self) {
        let started = Instant::now();
        let dt = self.cfg.tick_dt();
        self.sim_clock += dt as f64;
        self.tick += 1;

        let mut registry = self.registry.write().await;
        let bodies = registry.bodies();

        // Iteration order across players within one tick is not stable and
        // nothing below relies on it.
        for player_id in registry.player_ids() {
            let session = match registry.lookup_mut(player_id) {
                Some(session) => session,
                None => continue,
            };
            let mut out = Vec::new();
            let mut ctx = TickContext {
                world: &mut self.world,
                projectiles: &mut self.projectiles,
                bodies: &bodies,
                registry: &self.items,
                cfg: &self.cfg,
                now: self.sim_clock,
                dt,
            };
            let changed = actions::resolve(
                &mut session.player,
                &mut session.input,
                &mut session.actions,
                &mut ctx,
                &mut out,
            );

            if changed {
                out.push(Outbound::broadcast(
                    false,
                    Message::PlayerUpdate(PlayerUpdate {
                        player_id,
                        position: session.player.position,
                        velocity: session.player.velocity,
                        yaw: session.player.yaw,
                        pitch: session.player.pitch,
                        crouching: session.player.crouching,
                    }),
                ));
            }
            for outbound in out {
                if self.outbound_tx.send(outbound).is_err() {
                    error!("Outbound channel closed during tick");
                    break;
                }
            }
        }
        drop(registry);

        for update in self.projectiles.advance(&self.cfg, dt) {
            self.queue(Outbound::broadcast(false, Message::ProjectileUpdate(update)));
        }

        let budget = Duration::from_secs_f32(dt);
        let elapsed = started.elapsed();
        if elapsed > budget {
            // No catch-up: simulation time degrades under overload instead
            // of diverging from wall clock.
            warn!(
                "Tick {} overran its budget: {:?} > {:?}",
                self.tick, elapsed, budget
            );
        }

        if self.tick % 600 == 0 {
            let players = self.registry.read().await.len();
            if players > 0 {
                debug!(
                    "Tick {}: {} players, {} live projectiles",
                    self.tick,
                    players,
                    self.projectiles.live_count()
                );
            }
        }
    }

    /// Main loop: inbound events and fixed-rate ticks multiplexed on one
    /// task.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_accept_loop();
        self.spawn_datagram_receiver();
        self.spawn_outbound_sender();
        self.spawn_timeout_checker();

        let mut ticker = interval(Duration::from_secs_f32(self.cfg.tick_dt()));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started: {} tick/s, {} chunks loaded",
            self.cfg.tick_rate,
            self.world.chunk_count()
        );

        loop {
            tokio::select! {
                event = self.server_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            info!("Event channel closed, shutting down");
                            break;
                        }
                    }
                },
                _ = ticker.tick() => {
                    self.run_tick().await;
                },
            }
        }

        Ok(())
    }
}

async fn send_datagram(udp: &UdpSocket, message: &Message, addr: SocketAddr) {
    match encode(message) {
        Ok(bytes) => {
            if let Err(e) = udp.send_to(&bytes, addr).await {
                warn!("Datagram send to {} failed: {}", addr, e);
            }
        }
        Err(e) => error!("Failed to encode outgoing datagram: {}", e),
    }
}

/// Per-connection handshake and read loop.
///
/// State machine: awaiting hello, then established. The hello must arrive
/// within a bounded number of timed-out reads or the client is rejected
/// with a reason and the connection closed.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<RwLock<SessionRegistry>>,
    items: Arc<ItemRegistry>,
    cfg: Arc<SimConfig>,
    spawns: Arc<HashMap<String, Vec3>>,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let (mut read_half, mut write_half) = stream.into_split();

    let hello = await_hello(&mut read_half, &cfg).await;
    let request = match hello {
        Ok(request) => request,
        Err(reason) => {
            info!("Rejecting {}: {}", addr, reason);
            let reject = Message::ConnectRejected(ConnectRejected { reason });
            let _ = write_frame(&mut write_half, &reject).await;
            return;
        }
    };

    let (reliable_tx, mut reliable_rx) = mpsc::unbounded_channel::<Message>();
    let player_id = {
        let mut registry = registry.write().await;
        registry.register(
            request.username,
            addr,
            reliable_tx.clone(),
            &items,
            &spawns,
        )
    };
    let player_id = match player_id {
        Some(player_id) => player_id,
        None => {
            info!("Rejecting {}: server full", addr);
            let reject = Message::ConnectRejected(ConnectRejected {
                reason: "server full".to_string(),
            });
            let _ = write_frame(&mut write_half, &reject).await;
            return;
        }
    };

    // Write task: drains the session's reliable queue until the session is
    // torn down, which drops the sender and ends the loop.
    tokio::spawn(async move {
        while let Some(message) = reliable_rx.recv().await {
            if let Err(e) = write_frame(&mut write_half, &message).await {
                debug!("Reliable write to player {} failed: {}", player_id, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    // Accepted goes out first on the queue, then the main loop follows with
    // the world push.
    let _ = reliable_tx.send(Message::ConnectAccepted(ConnectAccepted {
        player_id,
        tick_rate: cfg.tick_rate,
    }));
    if server_tx.send(ServerEvent::Joined { player_id }).is_err() {
        return;
    }

    // Established: forward reliable traffic until the connection dies.
    loop {
        match read_frame(&mut read_half).await {
            Ok(message) => {
                if server_tx
                    .send(ServerEvent::Reliable { player_id, message })
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                debug!("Reliable read from player {} ended: {}", player_id, e);
                let _ = server_tx.send(ServerEvent::Disconnected { player_id });
                break;
            }
        }
    }
}

/// Waits for a valid hello, tolerating up to the configured number of
/// timed-out or malformed reads. Returns the validated request or the
/// rejection reason.
async fn await_hello(
    read_half: &mut OwnedReadHalf,
    cfg: &SimConfig,
) -> Result<shared::protocol::ConnectRequest, String> {
    let per_read = Duration::from_millis(cfg.handshake_read_timeout_ms);

    for _ in 0..cfg.handshake_attempts {
        match timeout(per_read, read_frame(read_half)).await {
            Ok(Ok(Message::ConnectRequest(request))) => {
                if request.protocol_version != PROTOCOL_VERSION {
                    return Err(format!(
                        "protocol version mismatch (server {}, client {})",
                        PROTOCOL_VERSION, request.protocol_version
                    ));
                }
                let username = request.username.trim();
                if username.is_empty() || username.len() > MAX_USERNAME_LEN {
                    return Err("invalid username".to_string());
                }
                return Ok(shared::protocol::ConnectRequest {
                    username: username.to_string(),
                    protocol_version: request.protocol_version,
                });
            }
            Ok(Ok(other)) => {
                warn!("Expected hello, got {:?}", other);
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err("connection closed before hello".to_string());
            }
            Ok(Err(e)) => {
                warn!("Bad frame while awaiting hello: {}", e);
            }
            Err(_) => {
                // Read timed out; burn one attempt.
            }
        }
    }
    Err("no hello received within the handshake window".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::ConnectRequest;

    #[tokio::test]
    async fn test_frame_roundtrip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let echo = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let message = read_frame(&mut stream).await.unwrap();
            write_frame(&mut stream, &message).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let sent = Message::ConnectRequest(ConnectRequest {
            username: "framed".to_string(),
            protocol_version: PROTOCOL_VERSION,
        });
        write_frame(&mut client, &sent).await.unwrap();
        let received = read_frame(&mut client).await.unwrap();
        assert_eq!(sent, received);

        echo.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_length() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let writer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let bogus = (MAX_FRAME_LEN as u32 + 1).to_le_bytes();
            stream.write_all(&bogus).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let result = read_frame(&mut client).await;
        assert!(result.is_err());

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_timeout_rejects_with_reason() {
        let mut cfg = SimConfig::default();
        cfg.handshake_attempts = 3;
        cfg.handshake_read_timeout_ms = 10;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let registry = Arc::new(RwLock::new(SessionRegistry::new(4)));
            let items = Arc::new(ItemRegistry::standard());
            let spawns = Arc::new(HashMap::new());
            let (server_tx, _server_rx) = mpsc::unbounded_channel();
            handle_connection(
                stream,
                peer,
                Arc::clone(&registry),
                items,
                Arc::new(cfg),
                spawns,
                server_tx,
            )
            .await;
            let len = registry.read().await.len();
            len
        });

        // Connect and send nothing.
        let mut client = TcpStream::connect(addr).await.unwrap();
        let rejection = read_frame(&mut client).await.unwrap();
        match rejection {
            Message::ConnectRejected(r) => assert!(!r.reason.is_empty()),
            other => panic!("expected rejection, got {:?}", other),
        }

        // The registry never gained an entry.
        assert_eq!(server.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handshake_accepts_valid_hello() {
        let cfg = SimConfig::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let registry = Arc::new(RwLock::new(SessionRegistry::new(4)));
        let server_registry = Arc::clone(&registry);
        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let items = Arc::new(ItemRegistry::standard());
            let spawns = Arc::new(World::flat(1).spawn_table());
            let (server_tx, server_rx) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                handle_connection(
                    stream,
                    peer,
                    server_registry,
                    items,
                    Arc::new(cfg),
                    spawns,
                    server_tx,
                )
                .await;
            });
            server_rx
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        write_frame(
            &mut client,
            &Message::ConnectRequest(ConnectRequest {
                username: "deuce".to_string(),
                protocol_version: PROTOCOL_VERSION,
            }),
        )
        .await
        .unwrap();

        let accepted = read_frame(&mut client).await.unwrap();
        let player_id = match accepted {
            Message::ConnectAccepted(a) => a.player_id,
            other => panic!("expected acceptance, got {:?}", other),
        };
        assert_eq!(player_id, 1);

        let mut server_rx = server.await.unwrap();
        match server_rx.recv().await {
            Some(ServerEvent::Joined { player_id: id }) => assert_eq!(id, player_id),
            other => panic!("expected joined event, got {:?}", other),
        }
        assert_eq!(registry.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_hello_bad_version() {
        let cfg = SimConfig::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let registry = Arc::new(RwLock::new(SessionRegistry::new(4)));
            let items = Arc::new(ItemRegistry::standard());
            let spawns = Arc::new(HashMap::new());
            let (server_tx, _server_rx) = mpsc::unbounded_channel();
            handle_connection(stream, peer, registry, items, Arc::new(cfg), spawns, server_tx)
                .await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        write_frame(
            &mut client,
            &Message::ConnectRequest(ConnectRequest {
                username: "deuce".to_string(),
                protocol_version: PROTOCOL_VERSION + 1,
            }),
        )
        .await
        .unwrap();

        match read_frame(&mut client).await.unwrap() {
            Message::ConnectRejected(r) => {
                assert!(r.reason.contains("version"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
