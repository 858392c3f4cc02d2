//! Simulation constants shared by the server and any headless tooling.

use serde::{Deserialize, Serialize};

/// Read-only bundle of tick, physics and gameplay constants.
///
/// The simulation core never mutates this; it is built once at startup
/// (defaults below, individual fields overridable by the launcher) and
/// passed by reference to every component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,

    // Physics
    pub gravity: f32,
    pub walk_speed: f32,
    pub sprint_speed: f32,
    pub crouch_speed: f32,
    /// Horizontal speed cap while aiming down sights.
    pub aim_speed: f32,
    pub creative_speed: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    pub jump_speed: f32,
    /// Multiplier applied to jump speed while sprinting.
    pub sprint_jump_boost: f32,

    // Player shape
    pub player_radius: f32,
    pub player_height: f32,
    pub eye_height: f32,

    // Damage
    /// Downward speed above which landing hurts.
    pub fall_damage_speed: f32,
    /// Health lost per unit of speed beyond the threshold.
    pub fall_damage_scale: f32,
    /// Distance outside the loaded world before a player is killed.
    pub world_kill_margin: f32,

    // Actions
    pub block_reach: f32,
    pub block_break_cooldown: f32,
    pub block_place_cooldown: f32,
    /// Radius around a team spawn where enemies cannot fire or dig.
    pub spawn_protect_radius: f32,
    pub resupply_radius: f32,
    pub resupply_cooldown: f32,
    /// Health restored per second in normal mode.
    pub health_regen_rate: f32,

    // Projectiles
    pub projectile_max_distance: f32,
    /// Fraction of recoil applied while aiming down sights.
    pub aim_recoil_scale: f32,

    // Transport
    pub max_players: usize,
    pub handshake_attempts: u32,
    pub handshake_read_timeout_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,

            gravity: 32.0,
            walk_speed: 4.5,
            sprint_speed: 6.8,
            crouch_speed: 2.2,
            aim_speed: 2.8,
            creative_speed: 12.0,
            acceleration: 48.0,
            deceleration: 36.0,
            jump_speed: 8.5,
            sprint_jump_boost: 1.15,

            player_radius: 0.4,
            player_height: 1.8,
            eye_height: 1.6,

            fall_damage_speed: 14.0,
            fall_damage_scale: 0.05,
            world_kill_margin: 8.0,

            block_reach: 4.0,
            block_break_cooldown: 0.25,
            block_place_cooldown: 0.25,
            spawn_protect_radius: 8.0,
            resupply_radius: 4.0,
            resupply_cooldown: 10.0,
            health_regen_rate: 0.05,

            projectile_max_distance: 128.0,
            aim_recoil_scale: 0.35,

            max_players: 32,
            handshake_attempts: 100,
            handshake_read_timeout_ms: 100,
        }
    }
}

impl SimConfig {
    /// Duration of one tick in seconds.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tick_dt() {
        let cfg = SimConfig::default();
        assert!((cfg.tick_dt() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_defaults_are_sane() {
        let cfg = SimConfig::default();
        assert!(cfg.crouch_speed < cfg.walk_speed);
        assert!(cfg.walk_speed < cfg.sprint_speed);
        assert!(cfg.aim_speed < cfg.walk_speed);
        assert!(cfg.handshake_attempts > 0);
        assert!(cfg.max_players > 0);
    }
}
