//! Ballistic projectiles.
//!
//! Projectiles are ephemeral: spawned by a firing action, integrated every
//! tick, and destroyed once they have travelled the configured maximum
//! distance. The final update they broadcast carries the destroyed flag and
//! doubles as the removal notice; there is no separate despawn message.

use rand::Rng;
use shared::protocol::ProjectileUpdate;
use shared::{ItemType, Player, SimConfig, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileKind {
    Bullet,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: u32,
    pub kind: ProjectileKind,
    pub owner: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub origin: Vec3,
    pub destroyed: bool,
}

/// Owns every live projectile and advances them once per tick.
#[derive(Debug, Default)]
pub struct ProjectileEngine {
    live: Vec<Projectile>,
    next_id: u32,
}

impl ProjectileEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live(&self) -> impl Iterator<Item = &Projectile> {
        self.live.iter()
    }

    /// Spawns one projectile per pellet at the owner's eye position, along
    /// the owner's view vector scaled to the weapon's muzzle speed. Pellet
    /// spread widens as weapon accuracy drops.
    pub fn spawn_volley(
        &mut self,
        owner: &Player,
        weapon: &ItemType,
        cfg: &SimConfig,
        rng: &mut impl Rng,
    ) {
        let eye = owner.eye_position(cfg.eye_height);
        let view = owner.view_vector();
        let spread = (1.0 - weapon.accuracy).max(0.0) * 0.1;

        for _ in 0..weapon.pellets.max(1) {
            let jitter = Vec3::new(
                rng.gen_range(-spread..=spread),
                rng.gen_range(-spread..=spread),
                rng.gen_range(-spread..=spread),
            );
            let direction = view.add(&jitter).normalize();
            let id = self.next_id;
            self.next_id += 1;
            self.live.push(Projectile {
                id,
                kind: ProjectileKind::Bullet,
                owner: owner.id,
                position: eye,
                velocity: direction.scale(weapon.muzzle_speed),
                origin: eye,
                destroyed: false,
            });
        }
    }

    /// Integrates every live projectile by one tick and returns the update
    /// to broadcast for each. Destroyed projectiles are dropped from the
    /// live set in the same call, after their final update is built.
    //
    // TODO: trace each displacement against the voxel grid and player boxes
    // so bullets stop at the first thing they hit instead of expiring by
    // distance alone.
    pub fn advance(&mut self, cfg: &SimConfig, dt: f32) -> Vec<ProjectileUpdate> {
        let mut updates = Vec::with_capacity(self.live.len());

        for projectile in &mut self.live {
            projectile.velocity.y -= cfg.gravity * dt;
            projectile.position = projectile.position.add(&projectile.velocity.scale(dt));

            if projectile.position.distance(&projectile.origin) >= cfg.projectile_max_distance {
                projectile.destroyed = true;
            }

            updates.push(ProjectileUpdate {
                projectile_id: projectile.id,
                owner: projectile.owner,
                position: projectile.position,
                velocity: projectile.velocity,
                destroyed: projectile.destroyed,
            });
        }

        self.live.retain(|p| !p.destroyed);
        updates
    }
}
