//! Per-player input accumulation between ticks.
//!
//! Input snapshots arrive asynchronously and at a different rate than the
//! simulation tick. A button pressed and released entirely between two ticks
//! must still register as "was pressed" for exactly one tick, so each
//! arriving snapshot ORs its held buttons into an impulse set that survives
//! until the tick consumes it.

use shared::ClientInputState;

/// Buttons seen pressed since the last tick consumed them.
#[derive(Debug, Default, Clone, Copy)]
struct Impulses {
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    jump: bool,
    crouch: bool,
    sprint: bool,
    primary: bool,
    secondary: bool,
    reload: bool,
}

/// Tracks one player's input between ticks.
///
/// Accessors return `last_held OR impulse`; [`InputTracker::reset`] clears
/// only the impulse half, so held buttons stay visible across ticks.
#[derive(Debug)]
pub struct InputTracker {
    last: ClientInputState,
    impulses: Impulses,
    pending_orientation: Option<(f32, f32)>,
}

impl InputTracker {
    pub fn new(player_id: u32) -> Self {
        Self {
            last: ClientInputState::for_player(player_id),
            impulses: Impulses::default(),
            pending_orientation: None,
        }
    }

    /// Absorbs a newly arrived snapshot.
    pub fn accept(&mut self, snapshot: ClientInputState) {
        self.impulses.forward |= snapshot.forward;
        self.impulses.backward |= snapshot.backward;
        self.impulses.left |= snapshot.left;
        self.impulses.right |= snapshot.right;
        self.impulses.jump |= snapshot.jump;
        self.impulses.crouch |= snapshot.crouch;
        self.impulses.sprint |= snapshot.sprint;
        self.impulses.primary |= snapshot.primary;
        self.impulses.secondary |= snapshot.secondary;
        self.impulses.reload |= snapshot.reload;
        self.last = snapshot;
    }

    /// Stores an orientation update for the next tick to apply.
    pub fn set_orientation(&mut self, yaw: f32, pitch: f32) {
        self.pending_orientation = Some((yaw, pitch));
    }

    /// Takes the pending orientation, if any arrived since the last tick.
    pub fn take_orientation(&mut self) -> Option<(f32, f32)> {
        self.pending_orientation.take()
    }

    pub fn forward(&self) -> bool {
        self.last.forward || self.impulses.forward
    }

    pub fn backward(&self) -> bool {
        self.last.backward || self.impulses.backward
    }

    pub fn left(&self) -> bool {
        self.last.left || self.impulses.left
    }

    pub fn right(&self) -> bool {
        self.last.right || self.impulses.right
    }

    pub fn jump(&self) -> bool {
        self.last.jump || self.impulses.jump
    }

    pub fn crouch(&self) -> bool {
        self.last.crouch || self.impulses.crouch
    }

    pub fn sprint(&self) -> bool {
        self.last.sprint || self.impulses.sprint
    }

    pub fn primary(&self) -> bool {
        self.last.primary || self.impulses.primary
    }

    pub fn secondary(&self) -> bool {
        self.last.secondary || self.impulses.secondary
    }

    pub fn reload(&self) -> bool {
        self.last.reload || self.impulses.reload
    }

    /// Currently held primary state, without impulses. The weapon re-cock
    /// check needs to observe the release itself.
    pub fn primary_held(&self) -> bool {
        self.last.primary
    }

    pub fn selected_slot(&self) -> usize {
        self.last.selected_slot as usize
    }

    /// Clears the impulse half only; called once per tick after the action
    /// resolver has consumed the input.
    pub fn reset(&mut self) {
        self.impulses = Impulses::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(player_id: u32) -> ClientInputState {
        ClientInputState::for_player(player_id)
    }

    #[test]
    fn test_press_and_release_between_ticks_is_visible_once() {
        let mut tracker = InputTracker::new(1);

        // Press arrives, then release arrives, all before the next tick.
        let mut pressed = snapshot(1);
        pressed.jump = true;
        tracker.accept(pressed);
        tracker.accept(snapshot(1));

        // The tick still sees the press...
        assert!(tracker.jump());
        tracker.reset();

        // ...and only that one tick.
        assert!(!tracker.jump());
    }

    #[test]
    fn test_held_button_survives_reset() {
        let mut tracker = InputTracker::new(1);
        let mut held = snapshot(1);
        held.forward = true;
        tracker.accept(held);

        tracker.reset();
        assert!(tracker.forward());
    }

    #[test]
    fn test_primary_held_ignores_impulses() {
        let mut tracker = InputTracker::new(1);
        let mut pressed = snapshot(1);
        pressed.primary = true;
        tracker.accept(pressed);
        tracker.accept(snapshot(1));

        // Impulse keeps the press visible, but the held state shows the
        // release.
        assert!(tracker.primary());
        assert!(!tracker.primary_held());
    }

    #[test]
    fn test_orientation_taken_once() {
        let mut tracker = InputTracker::new(1);
        tracker.set_orientation(1.0, 2.0);
        assert_eq!(tracker.take_orientation(), Some((1.0, 2.0)));
        assert_eq!(tracker.take_orientation(), None);
    }

    #[test]
    fn test_selected_slot_follows_last_snapshot() {
        let mut tracker = InputTracker::new(1);
        let mut snap = snapshot(1);
        snap.selected_slot = 3;
        tracker.accept(snap);
        assert_eq!(tracker.selected_slot(), 3);
    }
}
