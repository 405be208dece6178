use std::collections::{HashMap, HashSet};

use winit::{
    event::{ElementState, KeyEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::behavior::Controls;

/// Tracks keyboard state across frames.
#[derive(Debug, Default)]
pub struct InputState {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame pressed/released flags.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
    }

    /// Handle a keyboard input event from winit.
    pub fn handle_key(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(keycode) = event.physical_key {
            match event.state {
                ElementState::Pressed => self.press(keycode),
                ElementState::Released => self.release(keycode),
            }
        }
    }

    pub fn press(&mut self, key: KeyCode) {
        if self.keys_down.insert(key) {
            self.keys_pressed.insert(key);
        }
    }

    pub fn release(&mut self, key: KeyCode) {
        if self.keys_down.remove(&key) {
            self.keys_released.insert(key);
        }
    }

    /// Returns true if the key is currently held down.
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// Returns true if the key was pressed this frame.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Returns true if the key was released this frame.
    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }
}

/// Game actions that can be bound to keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Left,
    Right,
    Jump,
    Attack,
    Pause,
    Step,
    Reset,
}

/// Mapping from actions to physical keys.
#[derive(Clone, Debug, Default)]
pub struct InputMap {
    actions: HashMap<Action, Vec<KeyCode>>,
}

impl InputMap {
    /// Create an empty input map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrow keys or WASD to move, Space / Up / W to jump, X / J to attack,
    /// P to pause, N to single-step while paused and R to reset.
    pub fn platformer() -> Self {
        let mut map = Self::new();
        for (action, keys) in [
            (Action::Left, &[KeyCode::ArrowLeft, KeyCode::KeyA][..]),
            (Action::Right, &[KeyCode::ArrowRight, KeyCode::KeyD][..]),
            (Action::Jump, &[KeyCode::Space, KeyCode::ArrowUp, KeyCode::KeyW][..]),
            (Action::Attack, &[KeyCode::KeyX, KeyCode::KeyJ][..]),
            (Action::Pause, &[KeyCode::KeyP][..]),
            (Action::Step, &[KeyCode::KeyN][..]),
            (Action::Reset, &[KeyCode::KeyR][..]),
        ] {
            for key in keys {
                map.bind_key(action, *key);
            }
        }
        map
    }

    /// Bind a key to an action.
    pub fn bind_key(&mut self, action: Action, key: KeyCode) {
        self.actions.entry(action).or_default().push(key);
    }

    fn any(&self, action: Action, test: impl Fn(KeyCode) -> bool) -> bool {
        self.actions
            .get(&action)
            .map(|keys| keys.iter().any(|&k| test(k)))
            .unwrap_or(false)
    }

    /// Check if an action is currently held down.
    pub fn action_down(&self, input: &InputState, action: Action) -> bool {
        self.any(action, |k| input.is_key_down(k))
    }

    /// Check if an action was pressed this frame.
    pub fn action_pressed(&self, input: &InputState, action: Action) -> bool {
        self.any(action, |k| input.is_key_pressed(k))
    }

    /// Check if an action was released this frame.
    pub fn action_released(&self, input: &InputState, action: Action) -> bool {
        self.any(action, |k| input.is_key_released(k))
    }

    /// Sample the current frame into simulation controls.
    pub fn controls(&self, input: &InputState) -> Controls {
        Controls {
            left: self.action_down(input, Action::Left),
            right: self.action_down(input, Action::Right),
            jump_pressed: self.action_pressed(input, Action::Jump),
            jump_released: self.action_released(input, Action::Jump),
            attack_pressed: self.action_pressed(input, Action::Attack),
            pause_pressed: self.action_pressed(input, Action::Pause),
            step_pressed: self.action_pressed(input, Action::Step),
            reset_pressed: self.action_pressed(input, Action::Reset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressed_and_released_last_one_frame() {
        let mut input = InputState::new();
        input.press(KeyCode::Space);
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_down(KeyCode::Space));

        input.begin_frame();
        input.press(KeyCode::Space); // key repeat
        assert!(!input.is_key_pressed(KeyCode::Space));

        input.release(KeyCode::Space);
        assert!(input.is_key_released(KeyCode::Space));
        input.begin_frame();
        assert!(!input.is_key_released(KeyCode::Space));
        assert!(!input.is_key_down(KeyCode::Space));
    }

    #[test]
    fn platformer_map_builds_controls() {
        let map = InputMap::platformer();
        let mut input = InputState::new();
        input.press(KeyCode::KeyA);
        input.press(KeyCode::KeyW);

        let controls = map.controls(&input);
        assert!(controls.left && !controls.right);
        assert!(controls.jump_pressed);
        assert!(!controls.attack_pressed);

        input.begin_frame();
        input.release(KeyCode::KeyW);
        let controls = map.controls(&input);
        assert!(!controls.jump_pressed);
        assert!(controls.jump_released);
    }
}
