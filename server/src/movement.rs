//! Mode-dependent movement integration and swept voxel collision.
//!
//! Displacement is resolved in unit-length substeps, and each substep clips
//! the player's bounding box against every overlapping solid voxel one face
//! at a time. Resolving per axis instead of as a single 3D test is what
//! makes sliding along a wall while still moving forward work.

use crate::input::InputTracker;
use shared::{GameMode, Player, SimConfig, Vec3, World};

const EPS: f32 = 0.001;

/// What one tick of movement did to a player.
#[derive(Debug, Default, Clone, Copy)]
pub struct MoveOutcome {
    /// Position or velocity changed this tick.
    pub changed: bool,
    /// Health lost to a hard landing.
    pub fall_damage: f32,
    /// Killed by fall damage or by leaving the world bounds.
    pub died: bool,
}

/// Advances one player by one tick. `aiming` is true while the selected
/// weapon is scoped, which caps normal-mode speed at the aim tier.
pub fn step(
    player: &mut Player,
    input: &InputTracker,
    world: &World,
    cfg: &SimConfig,
    aiming: bool,
    dt: f32,
) -> MoveOutcome {
    let before_pos = player.position;
    let before_vel = player.velocity;

    let mut outcome = match player.mode {
        GameMode::Spectator => MoveOutcome::default(),
        GameMode::Creative => {
            step_creative(player, input, cfg, dt);
            MoveOutcome::default()
        }
        GameMode::Normal => step_normal(player, input, world, cfg, aiming, dt),
    };

    outcome.changed = before_pos.distance(&player.position) > 1e-5
        || before_vel.distance(&player.velocity) > 1e-5;
    outcome
}

/// Horizontal direction the held movement keys ask for, rotated into the
/// player's facing yaw. Zero when no key is held.
fn wish_direction(input: &InputTracker, yaw: f32) -> Vec3 {
    let forward = Vec3::new(yaw.cos(), 0.0, yaw.sin());
    let right = Vec3::new(-yaw.sin(), 0.0, yaw.cos());

    let mut wish = Vec3::default();
    if input.forward() {
        wish = wish.add(&forward);
    }
    if input.backward() {
        wish = wish.sub(&forward);
    }
    if input.right() {
        wish = wish.add(&right);
    }
    if input.left() {
        wish = wish.sub(&right);
    }
    wish.normalize()
}

/// Moves the current horizontal velocity toward `target`, accelerating when
/// input is held and decelerating toward zero otherwise.
fn approach_horizontal(velocity: &mut Vec3, target: Vec3, cfg: &SimConfig, dt: f32) {
    let current = velocity.horizontal();
    let has_input = target.magnitude() > 0.0;
    let rate = if has_input {
        cfg.acceleration
    } else {
        cfg.deceleration
    };

    let delta = target.sub(&current);
    let max_step = rate * dt;
    let applied = if delta.magnitude() <= max_step {
        delta
    } else {
        delta.normalize().scale(max_step)
    };

    velocity.x += applied.x;
    velocity.z += applied.z;
}

fn step_creative(player: &mut Player, input: &InputTracker, cfg: &SimConfig, dt: f32) {
    let wish = wish_direction(input, player.yaw);
    let target = wish.scale(cfg.creative_speed);
    approach_horizontal(&mut player.velocity, target, cfg, dt);

    // Fly vertically on jump/crouch, same approach rate as horizontal.
    let vertical = (input.jump() as i32 - input.crouch() as i32) as f32;
    let target_y = vertical * cfg.creative_speed;
    let delta_y = target_y - player.velocity.y;
    let rate = if vertical != 0.0 {
        cfg.acceleration
    } else {
        cfg.deceleration
    };
    let step_y = (rate * dt).min(delta_y.abs());
    player.velocity.y += step_y * delta_y.signum();

    player.position = player.position.add(&player.velocity.scale(dt));
}

fn step_normal(
    player: &mut Player,
    input: &InputTracker,
    world: &World,
    cfg: &SimConfig,
    aiming: bool,
    dt: f32,
) -> MoveOutcome {
    let grounded = is_grounded(world, cfg, &player.position);

    let speed_cap = if player.crouching {
        cfg.crouch_speed
    } else if aiming {
        cfg.aim_speed
    } else if input.sprint() && input.forward() {
        cfg.sprint_speed
    } else {
        cfg.walk_speed
    };

    let wish = wish_direction(input, player.yaw);
    approach_horizontal(&mut player.velocity, wish.scale(speed_cap), cfg, dt);

    if grounded {
        if input.jump() {
            let boost = if input.sprint() && input.forward() {
                cfg.sprint_jump_boost
            } else {
                1.0
            };
            player.velocity.y = cfg.jump_speed * boost;
        }
    } else {
        player.velocity.y -= cfg.gravity * dt;
    }

    let impact = sweep(world, cfg, &mut player.position, &mut player.velocity, dt);

    let mut outcome = MoveOutcome::default();
    if let Some(speed) = impact {
        if speed > cfg.fall_damage_speed {
            outcome.fall_damage = (speed - cfg.fall_damage_speed) * cfg.fall_damage_scale;
            player.health -= outcome.fall_damage;
            if player.health <= 0.0 {
                outcome.died = true;
            }
        }
    }

    if world.outside_bounds(&player.position, cfg.world_kill_margin) {
        outcome.died = true;
    }
    outcome
}

/// True when a solid voxel sits directly under any corner of the player's
/// footprint.
pub fn is_grounded(world: &World, cfg: &SimConfig, position: &Vec3) -> bool {
    let r = cfg.player_radius;
    let y = (position.y - 0.05).floor() as i32;
    for (dx, dz) in [(-r, -r), (-r, r), (r, -r), (r, r)] {
        let x = (position.x + dx).floor() as i32;
        let z = (position.z + dz).floor() as i32;
        if world.is_solid(x, y, z) {
            return true;
        }
    }
    false
}

/// Sweeps the player's box along `velocity * dt`, clamping per axis at each
/// solid voxel face crossed from its empty side. Returns the downward impact
/// speed if the sweep landed on a floor.
fn sweep(
    world: &World,
    cfg: &SimConfig,
    position: &mut Vec3,
    velocity: &mut Vec3,
    dt: f32,
) -> Option<f32> {
    let r = cfg.player_radius;
    let h = cfg.player_height;

    let mut remaining = velocity.scale(dt);
    let steps = remaining.magnitude().ceil().max(1.0) as u32;
    let mut impact: Option<f32> = None;

    for _ in 0..steps {
        let len = remaining.magnitude();
        if len < 1e-6 {
            break;
        }
        // Unit-length substep, clamped to the full remainder on the last one.
        let sub = remaining.scale((1.0 / len).min(1.0));
        let prev = *position;
        let mut next = prev.add(&sub);

        let (mut hit_x, mut hit_y, mut hit_z) = (false, false, false);

        let min_x = (next.x - r).floor() as i32;
        let max_x = (next.x + r).floor() as i32;
        let min_y = next.y.floor() as i32;
        let max_y = (next.y + h).floor() as i32;
        let min_z = (next.z - r).floor() as i32;
        let max_z = (next.z + r).floor() as i32;

        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                for cz in min_z..=max_z {
                    if !world.is_solid(cx, cy, cz) {
                        continue;
                    }
                    let (fx, fy, fz) = (cx as f32, cy as f32, cz as f32);

                    // -X face, approached from the empty cell beside it.
                    if prev.x + r <= fx && next.x + r > fx && !world.is_solid(cx - 1, cy, cz) {
                        next.x = fx - r - EPS;
                        velocity.x = 0.0;
                        hit_x = true;
                    }
                    // +X face.
                    if prev.x - r >= fx + 1.0
                        && next.x - r < fx + 1.0
                        && !world.is_solid(cx + 1, cy, cz)
                    {
                        next.x = fx + 1.0 + r + EPS;
                        velocity.x = 0.0;
                        hit_x = true;
                    }
                    // -Z face.
                    if prev.z + r <= fz && next.z + r > fz && !world.is_solid(cx, cy, cz - 1) {
                        next.z = fz - r - EPS;
                        velocity.z = 0.0;
                        hit_z = true;
                    }
                    // +Z face.
                    if prev.z - r >= fz + 1.0
                        && next.z - r < fz + 1.0
                        && !world.is_solid(cx, cy, cz + 1)
                    {
                        next.z = fz + 1.0 + r + EPS;
                        velocity.z = 0.0;
                        hit_z = true;
                    }
                    // Floor (+Y face): landing.
                    if prev.y >= fy + 1.0 && next.y < fy + 1.0 && !world.is_solid(cx, cy + 1, cz) {
                        if velocity.y < 0.0 {
                            let speed = -velocity.y;
                            impact = Some(impact.map_or(speed, |s: f32| s.max(speed)));
                        }
                        next.y = fy + 1.0 + EPS;
                        velocity.y = 0.0;
                        hit_y = true;
                    }
                    // Ceiling (-Y face): head bump.
                    if prev.y + h <= fy && next.y + h > fy && !world.is_solid(cx, cy - 1, cz) {
                        next.y = fy - h - EPS;
                        velocity.y = 0.0;
                        hit_y = true;
                    }
                }
            }
        }

        *position = next;
        remaining = remaining.sub(&sub);
        if hit_x {
            remaining.x = 0.0;
        }
        if hit_y {
            remaining.y = 0.0;
        }
        if hit_z {
            remaining.z = 0.0;
        }
    }

    impact
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ClientInputState, Inventory, ItemRegistry};

    fn test_player(position: Vec3) -> Player {
        let registry = ItemRegistry::standard();
        Player::new(
            1,
            "mover".to_string(),
            position,
            Inventory::default_loadout(&registry),
        )
    }

    fn tracker_with(f: impl FnOnce(&mut ClientInputState)) -> InputTracker {
        let mut tracker = InputTracker::new(1);
        let mut snap = ClientInputState::for_player(1);
        f(&mut snap);
        tracker.accept(snap);
        tracker
    }

    fn box_overlaps_solid(world: &World, cfg: &SimConfig, p: &Vec3) -> bool {
        let r = cfg.player_radius;
        let h = cfg.player_height;
        for cx in ((p.x - r).floor() as i32)..=((p.x + r).floor() as i32) {
            for cy in (p.y.floor() as i32)..=((p.y + h).floor() as i32) {
                for cz in ((p.z - r).floor() as i32)..=((p.z + r).floor() as i32) {
                    if world.is_solid(cx, cy, cz) {
                        return true;
                    }
                }
            }
        }
        false
    }

    #[test]
    fn test_grounded_on_flat_world() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        assert!(is_grounded(&world, &cfg, &Vec3::new(0.5, 0.001, 0.5)));
        assert!(!is_grounded(&world, &cfg, &Vec3::new(0.5, 3.0, 0.5)));
    }

    #[test]
    fn test_jump_from_ground_sets_vertical_velocity() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(0.5, 0.001, 0.5));
        let tracker = tracker_with(|s| s.jump = true);

        let outcome = step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());

        assert!(outcome.changed);
        assert!(player.velocity.y > 0.0);
        assert!((player.velocity.y - cfg.jump_speed).abs() < 0.0001);
    }

    #[test]
    fn test_airborne_player_is_pulled_down() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(0.5, 5.0, 0.5));
        let tracker = InputTracker::new(1);

        step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());
        assert!(player.velocity.y < 0.0);
    }

    #[test]
    fn test_falling_player_lands_without_embedding() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(0.5, 6.0, 0.5));
        let tracker = InputTracker::new(1);

        for _ in 0..240 {
            step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());
            assert!(
                !box_overlaps_solid(&world, &cfg, &player.position),
                "player box embedded in solid at {:?}",
                player.position
            );
        }
        assert!(player.position.y >= 0.0);
        assert!(player.position.y < 0.1);
        assert_eq!(player.velocity.y, 0.0);
    }

    #[test]
    fn test_wall_clamps_one_axis_and_slides_the_other() {
        let mut world = World::flat(1);
        // Wall plane at x = 3.
        for y in 0..4 {
            for z in -8..8 {
                world.set_block(3, y, z, 1);
            }
        }
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(2.0, 0.001, 0.0));
        player.velocity = Vec3::new(10.0, 0.0, 4.0);

        sweep(
            &world,
            &cfg,
            &mut player.position,
            &mut player.velocity,
            0.5,
        );

        // X stops at the wall face minus the radius; Z keeps going.
        assert!(player.position.x <= 3.0 - cfg.player_radius);
        assert_eq!(player.velocity.x, 0.0);
        assert!(player.position.z > 0.5);
        assert!(player.velocity.z > 0.0);
    }

    #[test]
    fn test_hard_landing_applies_fall_damage() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(0.5, 1.5, 0.5));
        player.velocity.y = -(cfg.fall_damage_speed + 6.0);
        let tracker = InputTracker::new(1);

        let outcome = step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());

        assert!(outcome.fall_damage > 0.0);
        assert!(player.health < 1.0);
    }

    #[test]
    fn test_soft_landing_is_free() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(0.5, 0.3, 0.5));
        player.velocity.y = -2.0;
        let tracker = InputTracker::new(1);

        let outcome = step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());

        assert_eq!(outcome.fall_damage, 0.0);
        assert_eq!(player.health, 1.0);
    }

    #[test]
    fn test_leaving_world_bounds_kills() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(0.5, -80.0, 0.5));
        player.velocity.y = -30.0;
        let tracker = InputTracker::new(1);

        let outcome = step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());
        assert!(outcome.died);
    }

    #[test]
    fn test_spectator_never_moves() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(0.5, 5.0, 0.5));
        player.mode = GameMode::Spectator;
        let tracker = tracker_with(|s| {
            s.forward = true;
            s.jump = true;
        });

        let outcome = step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());

        assert!(!outcome.changed);
        assert_eq!(player.position, Vec3::new(0.5, 5.0, 0.5));
    }

    #[test]
    fn test_creative_flight_ignores_collision() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        // Start inside the floor level; creative movement does not care.
        let mut player = test_player(Vec3::new(0.5, 2.0, 0.5));
        player.mode = GameMode::Creative;
        let tracker = tracker_with(|s| s.crouch = true);

        for _ in 0..120 {
            step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());
        }
        // Descended straight through the solid floor.
        assert!(player.position.y < -1.0);
    }

    #[test]
    fn test_creative_decelerates_without_input() {
        let world = World::flat(1);
        let cfg = SimConfig::default();
        let mut player = test_player(Vec3::new(0.5, 5.0, 0.5));
        player.mode = GameMode::Creative;
        player.velocity = Vec3::new(cfg.creative_speed, 0.0, 0.0);
        let tracker = InputTracker::new(1);

        for _ in 0..240 {
            step(&mut player, &tracker, &world, &cfg, false, cfg.tick_dt());
        }
        assert!(player.velocity.magnitude() < 0.01);
    }

    #[test]
    fn test_sprint_is_faster_than_walk() {
        let world = World::flat(3);
        let cfg = SimConfig::default();

        let mut walker = test_player(Vec3::new(0.5, 0.001, 0.5));
        let walk_input = tracker_with(|s| s.forward = true);
        let mut sprinter = test_player(Vec3::new(0.5, 0.001, 0.5));
        let sprint_input = tracker_with(|s| {
            s.forward = true;
            s.sprint = true;
        });

        for _ in 0..120 {
            step(&mut walker, &walk_input, &world, &cfg, false, cfg.tick_dt());
            step(
                &mut sprinter,
                &sprint_input,
                &world,
                &cfg,
                false,
                cfg.tick_dt(),
            );
        }
        assert!(sprinter.position.x > walker.position.x);
    }
}
