use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{Key, NamedKey};

/// Pixels of trackpad scroll counted as one wheel notch.
const PIXELS_PER_NOTCH: f32 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key { key: Key, pressed: bool },
    PointerButton { button: MouseButton, pressed: bool },
    PointerMoved { x: f32, y: f32 },
    PointerLeft,
    Wheel { notches: f32 },
    Other,
}

impl InputEvent {
    pub fn from_window_event(ev: &WindowEvent) -> Self {
        match ev {
            WindowEvent::MouseWheel { delta, .. } => {
                let notches = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_NOTCH,
                };
                InputEvent::Wheel { notches }
            }
            WindowEvent::CursorMoved { position, .. } => {
                InputEvent::PointerMoved { x: position.x as f32, y: position.y as f32 }
            }
            WindowEvent::CursorLeft { .. } => InputEvent::PointerLeft,
            WindowEvent::MouseInput { state, button, .. } => {
                InputEvent::PointerButton { button: *button, pressed: *state == ElementState::Pressed }
            }
            WindowEvent::KeyboardInput { event, .. } => InputEvent::Key {
                key: event.logical_key.clone(),
                pressed: event.state == ElementState::Pressed,
            },
            _ => InputEvent::Other,
        }
    }
}

/// Per-frame pointer and key state for the globe controls.
#[derive(Debug, Default)]
pub struct Input {
    cursor: Option<Vec2>,
    drag: Vec2,
    wheel: f32,
    pointer_held: bool,
    gesture: bool,
    exit_requested: bool,
    restart_requested: bool,
    vsync_toggled: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ev: InputEvent) {
        match ev {
            InputEvent::Key { key, pressed } => {
                if !pressed {
                    return;
                }
                self.gesture = true;
                match key {
                    Key::Named(NamedKey::Escape) => self.exit_requested = true,
                    Key::Character(ch) if ch.eq_ignore_ascii_case("r") => self.restart_requested = true,
                    Key::Character(ch) if ch.eq_ignore_ascii_case("v") => self.vsync_toggled = true,
                    _ => {}
                }
            }
            InputEvent::PointerButton { button: MouseButton::Left, pressed } => {
                self.pointer_held = pressed;
                if pressed {
                    self.gesture = true;
                }
            }
            InputEvent::PointerButton { pressed: true, .. } => self.gesture = true,
            InputEvent::PointerButton { .. } => {}
            InputEvent::PointerMoved { x, y } => {
                let position = Vec2::new(x, y);
                if let (true, Some(previous)) = (self.pointer_held, self.cursor) {
                    self.drag += position - previous;
                }
                self.cursor = Some(position);
            }
            InputEvent::PointerLeft => {
                self.cursor = None;
                self.pointer_held = false;
            }
            InputEvent::Wheel { notches } => self.wheel += notches,
            InputEvent::Other => {}
        }
    }

    pub fn pointer_held(&self) -> bool {
        self.pointer_held
    }

    pub fn cursor_position(&self) -> Option<Vec2> {
        self.cursor
    }

    /// Pointer movement while held since the last call, in pixels.
    pub fn take_drag(&mut self) -> Vec2 {
        std::mem::take(&mut self.drag)
    }

    pub fn take_wheel(&mut self) -> f32 {
        std::mem::take(&mut self.wheel)
    }

    /// True once after any key or button press.
    pub fn take_gesture(&mut self) -> bool {
        std::mem::take(&mut self.gesture)
    }

    pub fn take_exit_request(&mut self) -> bool {
        std::mem::take(&mut self.exit_requested)
    }

    pub fn take_restart_request(&mut self) -> bool {
        std::mem::take(&mut self.restart_requested)
    }

    pub fn take_vsync_toggle(&mut self) -> bool {
        std::mem::take(&mut self.vsync_toggled)
    }

    /// Forgets held state, e.g. when the globe restarts under a held pointer.
    pub fn reset(&mut self) {
        *self = Self { cursor: self.cursor, ..Self::default() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moved(x: f32, y: f32) -> InputEvent {
        InputEvent::PointerMoved { x, y }
    }

    fn left(pressed: bool) -> InputEvent {
        InputEvent::PointerButton { button: MouseButton::Left, pressed }
    }

    #[test]
    fn drag_accumulates_only_while_held() {
        let mut input = Input::new();
        input.push(moved(10.0, 10.0));
        input.push(moved(20.0, 10.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);
        input.push(left(true));
        input.push(moved(25.0, 14.0));
        input.push(moved(30.0, 20.0));
        assert_eq!(input.take_drag(), Vec2::new(10.0, 10.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);
        input.push(left(false));
        input.push(moved(0.0, 0.0));
        assert_eq!(input.take_drag(), Vec2::ZERO);
    }

    #[test]
    fn escape_and_r_map_to_requests() {
        let mut input = Input::new();
        input.push(InputEvent::Key { key: Key::Named(NamedKey::Escape), pressed: true });
        input.push(InputEvent::Key { key: Key::Character("R".into()), pressed: true });
        input.push(InputEvent::Key { key: Key::Character("v".into()), pressed: true });
        assert!(input.take_exit_request());
        assert!(input.take_restart_request());
        assert!(input.take_vsync_toggle());
        assert!(!input.take_exit_request());
        assert!(input.take_gesture());
    }

    #[test]
    fn wheel_notches_sum_until_taken() {
        let mut input = Input::new();
        input.push(InputEvent::Wheel { notches: 1.0 });
        input.push(InputEvent::Wheel { notches: 2.0 });
        assert_eq!(input.take_wheel(), 3.0);
        assert_eq!(input.take_wheel(), 0.0);
        assert!(!input.take_gesture());
    }

    #[test]
    fn leaving_the_window_releases_the_pointer() {
        let mut input = Input::new();
        input.push(left(true));
        input.push(InputEvent::PointerLeft);
        assert!(!input.pointer_held());
        assert_eq!(input.cursor_position(), None);
    }
}
