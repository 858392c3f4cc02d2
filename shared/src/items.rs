//! Item definitions, the startup-built item registry, and player inventories.

use serde::{Deserialize, Serialize};

/// Index into the [`ItemRegistry`].
pub type ItemTypeId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Block,
    Weapon,
}

/// Static definition of one item type.
///
/// Block items only use `kind` and `capacity`; the weapon fields are zeroed
/// for them. Item types never cross the wire; both endpoints build the same
/// registry at startup and exchange only [`ItemTypeId`]s.
#[derive(Debug, Clone)]
pub struct ItemType {
    pub name: &'static str,
    pub kind: ItemKind,
    /// Blocks carried for a block item, bullets per clip for a weapon.
    pub capacity: u32,
    /// Spare clips handed out on spawn and resupply.
    pub spare_clips: u32,
    /// 0.0 = wild spray, 1.0 = perfectly straight.
    pub accuracy: f32,
    /// Seconds between shots.
    pub fire_cooldown: f32,
    /// Seconds a reload takes.
    pub reload_time: f32,
    /// Health removed per hit.
    pub damage: f32,
    /// View-kick in radians per shot.
    pub recoil: f32,
    pub automatic: bool,
    /// Projectile speed in blocks per second.
    pub muzzle_speed: f32,
    /// Projectiles spawned per trigger pull.
    pub pellets: u32,
}

impl ItemType {
    fn block(name: &'static str, capacity: u32) -> Self {
        Self {
            name,
            kind: ItemKind::Block,
            capacity,
            spare_clips: 0,
            accuracy: 0.0,
            fire_cooldown: 0.0,
            reload_time: 0.0,
            damage: 0.0,
            recoil: 0.0,
            automatic: false,
            muzzle_speed: 0.0,
            pellets: 0,
        }
    }
}

/// All item types known to a running server.
///
/// Built once at startup and passed by reference to every component that has
/// to resolve an [`ItemTypeId`]; nothing in the codebase holds a process-wide
/// static copy.
#[derive(Debug, Clone)]
pub struct ItemRegistry {
    types: Vec<ItemType>,
}

pub const ITEM_RIFLE: ItemTypeId = 0;
pub const ITEM_SMG: ItemTypeId = 1;
pub const ITEM_SHOTGUN: ItemTypeId = 2;
pub const ITEM_BLOCK: ItemTypeId = 3;

impl ItemRegistry {
    /// The standard loadout item set.
    pub fn standard() -> Self {
        Self {
            types: vec![
                ItemType {
                    name: "rifle",
                    kind: ItemKind::Weapon,
                    capacity: 10,
                    spare_clips: 4,
                    accuracy: 0.95,
                    fire_cooldown: 0.5,
                    reload_time: 2.5,
                    damage: 0.34,
                    recoil: 0.05,
                    automatic: false,
                    muzzle_speed: 90.0,
                    pellets: 1,
                },
                ItemType {
                    name: "smg",
                    kind: ItemKind::Weapon,
                    capacity: 30,
                    spare_clips: 3,
                    accuracy: 0.85,
                    fire_cooldown: 0.11,
                    reload_time: 2.0,
                    damage: 0.12,
                    recoil: 0.02,
                    automatic: true,
                    muzzle_speed: 70.0,
                    pellets: 1,
                },
                ItemType {
                    name: "shotgun",
                    kind: ItemKind::Weapon,
                    capacity: 6,
                    spare_clips: 4,
                    accuracy: 0.7,
                    fire_cooldown: 1.0,
                    reload_time: 2.8,
                    damage: 0.12,
                    recoil: 0.1,
                    automatic: false,
                    muzzle_speed: 60.0,
                    pellets: 8,
                },
                ItemType::block("block", 50),
            ],
        }
    }

    pub fn get(&self, id: ItemTypeId) -> Option<&ItemType> {
        self.types.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// One inventory slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemStack {
    Block {
        item_type: ItemTypeId,
        /// Palette value painted when placing.
        color: u8,
        count: u32,
    },
    Gun {
        item_type: ItemTypeId,
        bullets: u32,
        clips: u32,
    },
}

impl ItemStack {
    pub fn item_type(&self) -> ItemTypeId {
        match self {
            ItemStack::Block { item_type, .. } => *item_type,
            ItemStack::Gun { item_type, .. } => *item_type,
        }
    }

    /// Restores the stack to its freshly-spawned state.
    pub fn refill(&mut self, registry: &ItemRegistry) {
        let ty = match registry.get(self.item_type()) {
            Some(ty) => ty,
            None => return,
        };
        match self {
            ItemStack::Block { count, .. } => *count = ty.capacity,
            ItemStack::Gun { bullets, clips, .. } => {
                *bullets = ty.capacity;
                *clips = ty.spare_clips;
            }
        }
    }
}

/// Ordered item stacks plus the selected slot.
///
/// The selected index is clamped into bounds by every mutator, so readers
/// can index without checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub stacks: Vec<ItemStack>,
    selected: usize,
}

impl Inventory {
    pub fn new(stacks: Vec<ItemStack>) -> Self {
        Self { stacks, selected: 0 }
    }

    /// The standard spawn loadout: rifle, smg, shotgun, blocks.
    pub fn default_loadout(registry: &ItemRegistry) -> Self {
        let mut stacks = Vec::new();
        for id in [ITEM_RIFLE, ITEM_SMG, ITEM_SHOTGUN] {
            if let Some(ty) = registry.get(id) {
                stacks.push(ItemStack::Gun {
                    item_type: id,
                    bullets: ty.capacity,
                    clips: ty.spare_clips,
                });
            }
        }
        if let Some(ty) = registry.get(ITEM_BLOCK) {
            stacks.push(ItemStack::Block {
                item_type: ITEM_BLOCK,
                color: 1,
                count: ty.capacity,
            });
        }
        Self { stacks, selected: 0 }
    }

    pub fn selected_index(&self) -> usize {
        self.selected.min(self.stacks.len().saturating_sub(1))
    }

    pub fn select(&mut self, index: usize) {
        self.selected = index.min(self.stacks.len().saturating_sub(1));
    }

    pub fn selected_stack(&self) -> Option<&ItemStack> {
        self.stacks.get(self.selected_index())
    }

    pub fn selected_stack_mut(&mut self) -> Option<&mut ItemStack> {
        let idx = self.selected_index();
        self.stacks.get_mut(idx)
    }

    /// Refills every stack to capacity.
    pub fn refill(&mut self, registry: &ItemRegistry) {
        for stack in &mut self.stacks {
            stack.refill(registry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = ItemRegistry::standard();
        assert_eq!(registry.get(ITEM_RIFLE).unwrap().name, "rifle");
        assert_eq!(registry.get(ITEM_BLOCK).unwrap().kind, ItemKind::Block);
        assert!(registry.get(200).is_none());
    }

    #[test]
    fn test_default_loadout_shape() {
        let registry = ItemRegistry::standard();
        let inv = Inventory::default_loadout(&registry);
        assert_eq!(inv.stacks.len(), 4);
        assert_eq!(inv.selected_index(), 0);
        match &inv.stacks[3] {
            ItemStack::Block { count, color, .. } => {
                assert_eq!(*count, 50);
                assert_eq!(*color, 1);
            }
            other => panic!("expected block stack, got {:?}", other),
        }
    }

    #[test]
    fn test_select_clamps_out_of_range() {
        let registry = ItemRegistry::standard();
        let mut inv = Inventory::default_loadout(&registry);
        inv.select(99);
        assert_eq!(inv.selected_index(), inv.stacks.len() - 1);
    }

    #[test]
    fn test_refill_restores_capacity() {
        let registry = ItemRegistry::standard();
        let mut inv = Inventory::default_loadout(&registry);
        if let Some(ItemStack::Gun { bullets, clips, .. }) = inv.stacks.get_mut(0) {
            *bullets = 0;
            *clips = 0;
        }
        inv.refill(&registry);
        match &inv.stacks[0] {
            ItemStack::Gun { bullets, clips, .. } => {
                assert_eq!(*bullets, 10);
                assert_eq!(*clips, 4);
            }
            other => panic!("expected gun stack, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_inventory_has_no_selection() {
        let inv = Inventory::new(Vec::new());
        assert!(inv.selected_stack().is_none());
    }
}
