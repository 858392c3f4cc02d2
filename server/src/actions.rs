//! Per-tick action resolution.
//!
//! Runs once per player per tick on the single writer thread, in a fixed
//! order so that a slot switch is visible before the firing logic reads the
//! now-current stack. Failed precondition checks (out of reach, cooldown,
//! occupied cell, protected zone) silently cancel that one action for the
//! tick; they are not errors.

use crate::input::InputTracker;
use crate::movement;
use crate::network::Outbound;
use crate::projectile::ProjectileEngine;
use log::{debug, info};
use rand::Rng;
use shared::items::{ItemKind, ItemStack};
use shared::protocol::{
    ChunkHash, ChunkUpdate, HealthUpdate, InventorySelect, InventorySnapshot, ItemStackUpdate,
    SoundEffect, SoundKind, WeaponRecoil,
};
use shared::world::{chunk_containing, BlockCoord};
use shared::{GameMode, ItemRegistry, ItemType, Message, Player, SimConfig, Vec3, World};

/// Per-session action timers and weapon state, attached to the player by
/// composition rather than subclassing.
#[derive(Debug, Default)]
pub struct ActionState {
    last_fire: Option<f64>,
    reload_started: Option<f64>,
    needs_recock: bool,
    last_break: Option<f64>,
    last_place: Option<f64>,
    last_resupply: Option<f64>,
}

impl ActionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reloading(&self) -> bool {
        self.reload_started.is_some()
    }
}

/// Position snapshot of one player, used for placement occupancy checks.
#[derive(Debug, Clone, Copy)]
pub struct PlayerBody {
    pub id: u32,
    pub position: Vec3,
}

/// Everything a tick hands to the resolver besides the player itself.
pub struct TickContext<'a> {
    pub world: &'a mut World,
    pub projectiles: &'a mut ProjectileEngine,
    pub bodies: &'a [PlayerBody],
    pub registry: &'a ItemRegistry,
    pub cfg: &'a SimConfig,
    /// Simulation clock in seconds.
    pub now: f64,
    pub dt: f32,
}

fn elapsed(since: Option<f64>, now: f64, cooldown: f32) -> bool {
    since.map_or(true, |t| now - t >= cooldown as f64)
}

/// Spawn point name owned by a team.
pub fn team_spawn(team: u8) -> &'static str {
    match team {
        0 => "alpha",
        _ => "bravo",
    }
}

fn spawn_owner(name: &str) -> Option<u8> {
    match name {
        "alpha" => Some(0),
        "bravo" => Some(1),
        _ => None,
    }
}

/// True when the position lies inside the protected radius of a spawn the
/// player's team does not own. Authoritative: no mode bypasses it.
fn in_enemy_protected_zone(
    world: &World,
    cfg: &SimConfig,
    position: &Vec3,
    team: Option<u8>,
) -> bool {
    for (name, spawn) in world.spawns() {
        let owner = match spawn_owner(name) {
            Some(owner) => owner,
            None => continue,
        };
        if team == Some(owner) {
            continue;
        }
        if position.distance(spawn) <= cfg.spawn_protect_radius {
            return true;
        }
    }
    false
}

fn cell_occupied(cell: BlockCoord, bodies: &[PlayerBody], cfg: &SimConfig) -> bool {
    let r = cfg.player_radius;
    let h = cfg.player_height;
    let (cx, cy, cz) = (cell.0 as f32, cell.1 as f32, cell.2 as f32);
    bodies.iter().any(|body| {
        let p = &body.position;
        cx < p.x + r
            && cx + 1.0 > p.x - r
            && cy < p.y + h
            && cy + 1.0 > p.y
            && cz < p.z + r
            && cz + 1.0 > p.z - r
    })
}

fn cell_center(cell: BlockCoord) -> Vec3 {
    Vec3::new(
        cell.0 as f32 + 0.5,
        cell.1 as f32 + 0.5,
        cell.2 as f32 + 0.5,
    )
}

fn push_stack_update(player: &Player, out: &mut Vec<Outbound>) {
    let slot = player.inventory.selected_index();
    if let Some(stack) = player.inventory.selected_stack() {
        out.push(Outbound::direct(
            player.id,
            false,
            Message::ItemStackUpdate(ItemStackUpdate {
                player_id: player.id,
                slot: slot as u8,
                stack: stack.clone(),
            }),
        ));
    }
}

fn push_inventory_snapshot(player: &Player, out: &mut Vec<Outbound>) {
    out.push(Outbound::direct(
        player.id,
        true,
        Message::InventorySnapshot(InventorySnapshot {
            player_id: player.id,
            stacks: player.inventory.stacks.clone(),
            selected: player.inventory.selected_index() as u8,
        }),
    ));
}

/// Broadcasts the voxel change plus the owning chunk's fresh content hash.
fn push_block_change(world: &World, cell: BlockCoord, value: u8, out: &mut Vec<Outbound>) {
    out.push(Outbound::broadcast(
        false,
        Message::ChunkUpdate(ChunkUpdate { cell, value }),
    ));
    let coord = chunk_containing(cell);
    if let Some(chunk) = world.chunk(coord) {
        out.push(Outbound::broadcast(
            false,
            Message::ChunkHash(ChunkHash {
                coord,
                hash: chunk.content_hash(),
            }),
        ));
    }
}

fn push_sound(
    kind: SoundKind,
    player: &Player,
    item_type: u8,
    position: Vec3,
    out: &mut Vec<Outbound>,
) {
    out.push(Outbound::broadcast(
        false,
        Message::SoundEffect(SoundEffect {
            kind,
            source_player: player.id,
            item_type,
            position,
        }),
    ));
}

/// Resolves one player's tick: consumes the accumulated input, mutates
/// inventory/world/health, runs the movement controller, and queues every
/// resulting broadcast. Returns true when the player's broadcast-relevant
/// state changed this tick.
pub fn resolve(
    player: &mut Player,
    tracker: &mut InputTracker,
    state: &mut ActionState,
    ctx: &mut TickContext<'_>,
    out: &mut Vec<Outbound>,
) -> bool {
    let mut changed = false;

    // Latest orientation applies before anything reads the view vector.
    if let Some((yaw, pitch)) = tracker.take_orientation() {
        player.set_orientation(yaw, pitch);
        changed = true;
    }

    // 1. Slot switch, acknowledged to the requesting client only.
    let before = player.inventory.selected_index();
    player.inventory.select(tracker.selected_slot());
    let selected = player.inventory.selected_index();
    if selected != before {
        out.push(Outbound::direct(
            player.id,
            false,
            Message::InventorySelect(InventorySelect {
                player_id: player.id,
                index: selected as u8,
            }),
        ));
    }

    // 2. Dispatch by the kind of the now-current stack.
    let selected_type = player.inventory.selected_stack().map(|s| s.item_type());
    if let Some(type_id) = selected_type {
        if let Some(item) = ctx.registry.get(type_id).cloned() {
            match item.kind {
                ItemKind::Block => {
                    resolve_block_stack(player, tracker, state, ctx, &item, type_id, out)
                }
                ItemKind::Weapon => {
                    resolve_gun_stack(player, tracker, state, ctx, &item, type_id, out)
                }
            }
        }
    }

    // 3. Resupply at the own team spawn.
    if let Some(team) = player.team {
        if let Some(spawn) = ctx.world.spawn(team_spawn(team)) {
            if player.position.distance(&spawn) <= ctx.cfg.resupply_radius
                && elapsed(state.last_resupply, ctx.now, ctx.cfg.resupply_cooldown)
            {
                player.inventory.refill(ctx.registry);
                state.last_resupply = Some(ctx.now);
                push_inventory_snapshot(player, out);
                debug!("Player {} resupplied", player.id);
            }
        }
    }

    // 4. Passive regeneration.
    if player.mode == GameMode::Normal && player.health > 0.0 && player.health < 1.0 {
        player.health = (player.health + ctx.cfg.health_regen_rate * ctx.dt).min(1.0);
        out.push(Outbound::direct(
            player.id,
            false,
            Message::HealthUpdate(HealthUpdate {
                player_id: player.id,
                health: player.health,
            }),
        ));
    }

    // 5. Crouch flag sync.
    let crouching = tracker.crouch();
    if player.crouching != crouching {
        player.crouching = crouching;
        changed = true;
    }

    // 6. Mode-specific movement.
    let aiming = tracker.secondary()
        && matches!(
            player.inventory.selected_stack(),
            Some(ItemStack::Gun { .. })
        );
    let moved = movement::step(player, tracker, ctx.world, ctx.cfg, aiming, ctx.dt);
    changed |= moved.changed;
    if moved.fall_damage > 0.0 {
        out.push(Outbound::direct(
            player.id,
            false,
            Message::HealthUpdate(HealthUpdate {
                player_id: player.id,
                health: player.health.max(0.0),
            }),
        ));
    }
    if moved.died {
        respawn(player, ctx, out);
        changed = true;
    }

    // 7. The tick has consumed this input.
    tracker.reset();
    changed
}

#[allow(clippy::too_many_arguments)]
fn resolve_block_stack(
    player: &mut Player,
    tracker: &InputTracker,
    state: &mut ActionState,
    ctx: &mut TickContext<'_>,
    item: &ItemType,
    type_id: u8,
    out: &mut Vec<Outbound>,
) {
    let eye = player.eye_position(ctx.cfg.eye_height);
    let view = player.view_vector();

    // Break.
    if tracker.primary() && elapsed(state.last_break, ctx.now, ctx.cfg.block_break_cooldown) {
        if let Some(hit) = ctx.world.raycast(eye, view, ctx.cfg.block_reach) {
            let center = cell_center(hit.cell);
            if !in_enemy_protected_zone(ctx.world, ctx.cfg, &center, player.team)
                && ctx.world.set_block(hit.cell.0, hit.cell.1, hit.cell.2, 0)
            {
                state.last_break = Some(ctx.now);
                if player.mode == GameMode::Normal {
                    if let Some(ItemStack::Block { count, .. }) =
                        player.inventory.selected_stack_mut()
                    {
                        *count = (*count + 1).min(item.capacity);
                    }
                    push_stack_update(player, out);
                }
                push_block_change(ctx.world, hit.cell, 0, out);
                push_sound(SoundKind::BlockBreak, player, type_id, center, out);
            }
        }
    }

    // Place.
    if tracker.secondary() && elapsed(state.last_place, ctx.now, ctx.cfg.block_place_cooldown) {
        let (color, count) = match player.inventory.selected_stack() {
            Some(ItemStack::Block { color, count, .. }) => (*color, *count),
            _ => return,
        };
        if player.mode == GameMode::Normal && count == 0 {
            return;
        }
        if let Some(hit) = ctx.world.raycast(eye, view, ctx.cfg.block_reach) {
            let target = hit.previous;
            let center = cell_center(target);
            if !cell_occupied(target, ctx.bodies, ctx.cfg)
                && !in_enemy_protected_zone(ctx.world, ctx.cfg, &center, player.team)
                && ctx.world.set_block(target.0, target.1, target.2, color)
            {
                state.last_place = Some(ctx.now);
                if player.mode == GameMode::Normal {
                    if let Some(ItemStack::Block { count, .. }) =
                        player.inventory.selected_stack_mut()
                    {
                        *count = count.saturating_sub(1);
                    }
                    push_stack_update(player, out);
                }
                push_block_change(ctx.world, target, color, out);
                push_sound(SoundKind::BlockPlace, player, type_id, center, out);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_gun_stack(
    player: &mut Player,
    tracker: &InputTracker,
    state: &mut ActionState,
    ctx: &mut TickContext<'_>,
    item: &ItemType,
    type_id: u8,
    out: &mut Vec<Outbound>,
) {
    // Finish an elapsed reload before the trigger is considered.
    if let Some(started) = state.reload_started {
        if ctx.now - started >= item.reload_time as f64 {
            state.reload_started = None;
            if let Some(ItemStack::Gun { bullets, .. }) = player.inventory.selected_stack_mut() {
                *bullets = item.capacity;
            }
            push_stack_update(player, out);
        }
    }

    // A released trigger re-cocks the weapon. The held state is used here,
    // not the impulse view: the release itself must be observed.
    if !tracker.primary_held() {
        state.needs_recock = false;
    }

    let bullets = match player.inventory.selected_stack() {
        Some(ItemStack::Gun { bullets, .. }) => *bullets,
        _ => 0,
    };

    if tracker.primary()
        && bullets > 0
        && state.reload_started.is_none()
        && elapsed(state.last_fire, ctx.now, item.fire_cooldown)
        && (item.automatic || !state.needs_recock)
        && !in_enemy_protected_zone(ctx.world, ctx.cfg, &player.position, player.team)
    {
        let mut rng = rand::thread_rng();
        ctx.projectiles
            .spawn_volley(player, item, ctx.cfg, &mut rng);
        state.last_fire = Some(ctx.now);
        if !item.automatic {
            state.needs_recock = true;
        }

        if let Some(ItemStack::Gun { bullets, .. }) = player.inventory.selected_stack_mut() {
            *bullets -= 1;
        }
        push_stack_update(player, out);

        // Randomized view kick, damped while scoped.
        let scale = if tracker.secondary() {
            ctx.cfg.aim_recoil_scale
        } else {
            1.0
        };
        let pitch_offset = -item.recoil * rng.gen_range(0.6..=1.0) * scale;
        let yaw_offset = item.recoil * rng.gen_range(-0.4..=0.4) * scale;
        player.set_orientation(player.yaw + yaw_offset, player.pitch + pitch_offset);
        out.push(Outbound::direct(
            player.id,
            false,
            Message::WeaponRecoil(WeaponRecoil {
                player_id: player.id,
                yaw_offset,
                pitch_offset,
            }),
        ));

        push_sound(
            SoundKind::WeaponFire,
            player,
            type_id,
            player.position,
            out,
        );
    }

    // Start a reload. The spare clip is spent the moment the reload starts.
    if tracker.reload() && state.reload_started.is_none() {
        let mut started = false;
        if let Some(ItemStack::Gun { clips, .. }) = player.inventory.selected_stack_mut() {
            if *clips > 0 {
                *clips -= 1;
                started = true;
            }
        }
        if started {
            state.reload_started = Some(ctx.now);
            push_stack_update(player, out);
            push_sound(SoundKind::Reload, player, type_id, player.position, out);
        }
    }
}

/// Death handling: back to the team spawn with full health and a fresh
/// loadout, announced to the owning client.
fn respawn(player: &mut Player, ctx: &mut TickContext<'_>, out: &mut Vec<Outbound>) {
    let spawn = player
        .team
        .and_then(|team| ctx.world.spawn(team_spawn(team)))
        .or_else(|| ctx.world.spawn("alpha"))
        .unwrap_or_default();

    info!("Player {} died, respawning at {:?}", player.id, spawn);
    player.position = spawn;
    player.velocity = Vec3::default();
    player.health = 1.0;
    player.inventory.refill(ctx.registry);

    out.push(Outbound::direct(
        player.id,
        false,
        Message::HealthUpdate(HealthUpdate {
            player_id: player.id,
            health: player.health,
        }),
    ));
    push_inventory_snapshot(player, out);
}
