//! Wire protocol shared by both channels.
//!
//! Every message is its own struct supplying its own field layout; the
//! [`Message`] enum aggregates them, and its variant index is the message's
//! registered type tag on the wire. [`encode`]/[`decode`] are the single
//! serialization substrate for both the reliable and the connectionless
//! channel; which channel a message travels on is a routing decision, not a
//! codec one.

use crate::items::{ItemStack, ItemTypeId};
use crate::math::Vec3;
use crate::world::{BlockCoord, ChunkCoord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped on every incompatible protocol change.
pub const PROTOCOL_VERSION: u32 = 1;

/// Length prefix size on the reliable channel.
pub const FRAME_HEADER_LEN: usize = 4;
/// Upper bound for a single reliable-channel frame. A full chunk push is the
/// largest legitimate message; anything past this is a corrupt peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;
/// Receive buffer size for the connectionless channel.
pub const MAX_DATAGRAM_LEN: usize = 2048;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty message buffer")]
    Empty,
    #[error("malformed message: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),
}

/// Encodes a message for either channel.
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(message)?)
}

/// Decodes a message from either channel. Empty buffers, unknown type tags
/// and truncated bodies all report as [`ProtocolError`].
pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(bincode::deserialize(bytes)?)
}

/// Snapshot of one client's held buttons plus the selected inventory slot.
///
/// Clients send this only when it differs from the previous snapshot, so a
/// received snapshot may describe a press that is already over by the time
/// the next tick runs. The server's input tracker keeps those visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClientInputState {
    pub player_id: u32,
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub crouch: bool,
    pub sprint: bool,
    pub primary: bool,
    pub secondary: bool,
    pub reload: bool,
    pub selected_slot: u8,
}

impl ClientInputState {
    pub fn for_player(player_id: u32) -> Self {
        Self {
            player_id,
            ..Self::default()
        }
    }
}

// Reliable-channel messages.

/// First message on a new reliable connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub username: String,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectAccepted {
    pub player_id: u32,
    pub tick_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRejected {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSubmit {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    pub player_id: u32,
    pub username: String,
    pub text: String,
}

/// Full inventory push. Reliable: losing one desynchronizes ammo counts
/// until the next resupply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub player_id: u32,
    pub stacks: Vec<ItemStack>,
    pub selected: u8,
}

/// One full chunk, pushed over the reliable channel during world sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkData {
    pub coord: ChunkCoord,
    pub voxels: Vec<u8>,
}

// Connectionless-channel messages. Each carries the relevant player id
// because datagrams arrive without per-packet session context.

/// Rendezvous datagram: the client repeats it until it observes the
/// server's verbatim echo, which binds the client's ephemeral UDP address
/// to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatagramInit {
    pub player_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOrientation {
    pub player_id: u32,
    pub yaw: f32,
    pub pitch: f32,
}

/// Per-tick state delta for one player, broadcast to everyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    pub player_id: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub crouching: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoin {
    pub player_id: u32,
    pub username: String,
    pub team: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLeave {
    pub player_id: u32,
}

/// Single-voxel change broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkUpdate {
    pub cell: BlockCoord,
    pub value: u8,
}

/// Content hash of a chunk, sent after each change so observers can detect
/// missed updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHash {
    pub coord: ChunkCoord,
    pub hash: u64,
}

/// Single-slot inventory delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStackUpdate {
    pub player_id: u32,
    pub slot: u8,
    pub stack: ItemStack,
}

/// Acknowledges a slot switch to the client that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySelect {
    pub player_id: u32,
    pub index: u8,
}

/// Client picks the palette value its block stack paints with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockColorSelect {
    pub player_id: u32,
    pub color: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundKind {
    WeaponFire,
    Reload,
    BlockBreak,
    BlockPlace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEffect {
    pub kind: SoundKind,
    pub source_player: u32,
    pub item_type: ItemTypeId,
    pub position: Vec3,
}

/// View-kick applied after a shot, sent to the firing client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponRecoil {
    pub player_id: u32,
    pub yaw_offset: f32,
    pub pitch_offset: f32,
}

/// Per-tick projectile state; the final one carries `destroyed = true` and
/// doubles as the removal notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileUpdate {
    pub projectile_id: u32,
    pub owner: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthUpdate {
    pub player_id: u32,
    pub health: f32,
}

/// The tagged union carried on the wire. The variant index is the message's
/// type tag; adding a message means adding a struct and a variant here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // Reliable channel
    ConnectRequest(ConnectRequest),
    ConnectAccepted(ConnectAccepted),
    ConnectRejected(ConnectRejected),
    ChatSubmit(ChatSubmit),
    ChatBroadcast(ChatBroadcast),
    InventorySnapshot(InventorySnapshot),
    ChunkData(ChunkData),

    // Connectionless channel
    DatagramInit(DatagramInit),
    ClientInput(ClientInputState),
    ClientOrientation(ClientOrientation),
    PlayerUpdate(PlayerUpdate),
    PlayerJoin(PlayerJoin),
    PlayerLeave(PlayerLeave),
    ChunkUpdate(ChunkUpdate),
    ChunkHash(ChunkHash),
    ItemStackUpdate(ItemStackUpdate),
    InventorySelect(InventorySelect),
    BlockColorSelect(BlockColorSelect),
    SoundEffect(SoundEffect),
    WeaponRecoil(WeaponRecoil),
    ProjectileUpdate(ProjectileUpdate),
    HealthUpdate(HealthUpdate),
}
