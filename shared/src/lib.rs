//! Data model and wire protocol shared by the server and headless tooling:
//! vector math, simulation configuration, items and inventories, the chunked
//! voxel world, the player record, and the message codec.

pub mod config;
pub mod items;
pub mod math;
pub mod player;
pub mod protocol;
pub mod world;

pub use config::SimConfig;
pub use items::{Inventory, ItemRegistry, ItemStack, ItemType, ItemTypeId};
pub use math::Vec3;
pub use player::{GameMode, Player};
pub use protocol::{decode, encode, ClientInputState, Message, ProtocolError};
pub use world::{Chunk, World, CHUNK_SIZE};
