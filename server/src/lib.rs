//! # Voxelfront Server Library
//!
//! Authoritative simulation core for the multiplayer voxel shooter. The
//! server runs the definitive copy of the world and every player; clients
//! send inputs and render whatever state comes back.
//!
//! ## Architecture
//!
//! One accept loop hands each reliable connection to a handshake task; each
//! established client gets a read task and a write task. A single shared
//! receiver drains the connectionless channel. Everything funnels into one
//! event channel consumed by the main loop, which interleaves event handling
//! with fixed-rate simulation ticks and is the only writer of the world and
//! of per-player state.
//!
//! ## Module Organization
//!
//! - [`network`]: both transport channels, the handshake state machine,
//!   the outbound sender task, and the tick loop.
//! - [`registry`]: established sessions, id allocation, broadcast fan-out,
//!   and the admin surface (kick, set mode, set team).
//! - [`input`]: per-player impulse accumulation between ticks.
//! - [`actions`]: the per-tick action resolver for inventory switching,
//!   block break/place, the weapon fire/reload state machine, resupply
//!   and regen.
//! - [`movement`]: mode-dependent integration and swept voxel collision.
//! - [`projectile`]: ballistic integration and lifecycle broadcasts.
//! - [`persistence`]: world snapshot save/load.
//! - [`discovery`]: fire-and-forget server-list announcements.

pub mod actions;
pub mod discovery;
pub mod input;
pub mod movement;
pub mod network;
pub mod persistence;
pub mod projectile;
pub mod registry;
