//! Local input mapping
//!
//! Turns held keys into the discrete drive direction of each local paddle and
//! pointer movement into an absolute position for the left paddle.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::sim::{MatchEngine, Side};

/// Up/down key pair driving one paddle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    pub up: String,
    pub down: String,
}

impl KeySet {
    pub fn new(up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            up: up.into(),
            down: down.into(),
        }
    }

    /// -1 up, +1 down, 0 when neither or both are held
    pub fn direction(&self, held: &HashSet<String>) -> i8 {
        let up = held.contains(&self.up);
        let down = held.contains(&self.down);
        match (up, down) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.up == key || self.down == key
    }
}

/// Key bindings for both local paddles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub left: KeySet,
    pub right: KeySet,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            left: KeySet::new("KeyW", "KeyS"),
            right: KeySet::new("ArrowUp", "ArrowDown"),
        }
    }
}

impl KeyBindings {
    pub fn for_side(&self, side: Side) -> &KeySet {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Tracks held keys and forwards changes to a match engine
#[derive(Debug, Clone, Default)]
pub struct InputMapper {
    bindings: KeyBindings,
    held: HashSet<String>,
    /// Pointer y in court coordinates, consumed on the next apply
    pointer_y: Option<f32>,
}

impl InputMapper {
    pub fn new(bindings: KeyBindings) -> Self {
        Self {
            bindings,
            held: HashSet::new(),
            pointer_y: None,
        }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// Returns true if the key is bound
    pub fn key_down(&mut self, key: &str) -> bool {
        if !self.is_bound(key) {
            return false;
        }
        self.held.insert(key.to_string());
        true
    }

    pub fn key_up(&mut self, key: &str) -> bool {
        self.held.remove(key)
    }

    fn is_bound(&self, key: &str) -> bool {
        self.bindings.left.contains(key) || self.bindings.right.contains(key)
    }

    /// Release everything, e.g. when the window loses focus
    pub fn clear(&mut self) {
        self.held.clear();
        self.pointer_y = None;
    }

    /// Pointer moved; `y` is in court coordinates
    pub fn pointer_moved(&mut self, y: f32) {
        self.pointer_y = Some(y);
    }

    pub fn direction(&self, side: Side) -> i8 {
        self.bindings.for_side(side).direction(&self.held)
    }

    /// Push the current input into `engine` for the locally driven sides
    ///
    /// AI-driven sides are left alone by the engine itself.
    pub fn apply(&mut self, engine: &mut MatchEngine, local_sides: &[Side]) {
        for &side in local_sides {
            engine.set_paddle_velocity(side, self.direction(side));
        }
        if let Some(y) = self.pointer_y.take() {
            if local_sides.contains(&Side::Left) {
                engine.set_paddle_position(Side::Left, y);
            }
        }
    }
}
