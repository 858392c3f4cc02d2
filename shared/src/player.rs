use crate::items::Inventory;
use crate::math::Vec3;
use serde::{Deserialize, Serialize};

/// Movement rules applied to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    Normal,
    Creative,
    Spectator,
}

/// One player's simulation state.
///
/// Owned by the session that represents it; mutated only by that session's
/// tick processing (or by the connection layer at creation and teardown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: u32,
    pub username: String,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Radians around the vertical axis, normalized to [0, 2*pi).
    pub yaw: f32,
    /// Polar angle from straight up, clamped to [0, pi].
    pub pitch: f32,
    /// Nominal range (0, 1].
    pub health: f32,
    pub mode: GameMode,
    pub crouching: bool,
    pub team: Option<u8>,
    pub inventory: Inventory,
}

impl Player {
    pub fn new(id: u32, username: String, position: Vec3, inventory: Inventory) -> Self {
        Self {
            id,
            username,
            position,
            velocity: Vec3::default(),
            yaw: 0.0,
            pitch: std::f32::consts::FRAC_PI_2,
            health: 1.0,
            mode: GameMode::Normal,
            crouching: false,
            team: None,
            inventory,
        }
    }

    /// Stores a new orientation, normalizing yaw into [0, 2*pi) and clamping
    /// pitch into [0, pi].
    pub fn set_orientation(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw.rem_euclid(std::f32::consts::TAU);
        self.pitch = pitch.clamp(0.0, std::f32::consts::PI);
    }

    /// Unit vector the player is looking along.
    pub fn view_vector(&self) -> Vec3 {
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        Vec3::new(sin_pitch * cos_yaw, cos_pitch, sin_pitch * sin_yaw)
    }

    /// Camera origin: feet position raised by the configured eye height.
    pub fn eye_position(&self, eye_height: f32) -> Vec3 {
        self.position.add(&Vec3::new(0.0, eye_height, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{Inventory, ItemRegistry};
    use assert_approx_eq::assert_approx_eq;

    fn test_player() -> Player {
        let registry = ItemRegistry::standard();
        Player::new(
            1,
            "tester".to_string(),
            Vec3::new(0.0, 0.0, 0.0),
            Inventory::default_loadout(&registry),
        )
    }

    #[test]
    fn test_new_player_defaults() {
        let player = test_player();
        assert_eq!(player.health, 1.0);
        assert_eq!(player.mode, GameMode::Normal);
        assert!(!player.crouching);
        assert!(player.team.is_none());
    }

    #[test]
    fn test_yaw_normalization() {
        let mut player = test_player();
        player.set_orientation(-0.5, 1.0);
        assert!(player.yaw >= 0.0 && player.yaw < std::f32::consts::TAU);
        assert_approx_eq!(player.yaw, std::f32::consts::TAU - 0.5, 0.0001);

        player.set_orientation(std::f32::consts::TAU + 1.0, 1.0);
        assert_approx_eq!(player.yaw, 1.0, 0.0001);
    }

    #[test]
    fn test_pitch_clamping() {
        let mut player = test_player();
        player.set_orientation(0.0, -1.0);
        assert_eq!(player.pitch, 0.0);
        player.set_orientation(0.0, 10.0);
        assert_eq!(player.pitch, std::f32::consts::PI);
    }

    #[test]
    fn test_view_vector_level() {
        let mut player = test_player();
        player.set_orientation(0.0, std::f32::consts::FRAC_PI_2);
        let v = player.view_vector();
        assert_approx_eq!(v.x, 1.0, 0.0001);
        assert_approx_eq!(v.y, 0.0, 0.0001);
        assert_approx_eq!(v.z, 0.0, 0.0001);
    }

    #[test]
    fn test_view_vector_straight_up() {
        let mut player = test_player();
        player.set_orientation(0.0, 0.0);
        let v = player.view_vector();
        assert_approx_eq!(v.y, 1.0, 0.0001);
    }

    #[test]
    fn test_eye_position() {
        let mut player = test_player();
        player.position = Vec3::new(1.0, 2.0, 3.0);
        let eye = player.eye_position(1.6);
        assert_approx_eq!(eye.y, 3.6, 0.0001);
    }
}
