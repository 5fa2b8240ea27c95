// Physical input simulation. The enigo backend is only built with the
// `desktop` feature; everything else talks to the traits.
use async_trait::async_trait;

use crate::agent_engine::state::ScrollDirection;
use crate::errors::DeskPilotResult;

/// Pointer device. `Ok(false)` means the device refused without an error.
#[async_trait]
pub trait PointerController: Send + Sync {
    async fn click(&self, x: i32, y: i32) -> DeskPilotResult<bool>;
    async fn double_click(&self, x: i32, y: i32) -> DeskPilotResult<bool>;
    async fn right_click(&self, x: i32, y: i32) -> DeskPilotResult<bool>;
    async fn drag(&self, from: (i32, i32), to: (i32, i32)) -> DeskPilotResult<bool>;
    /// Scrolls by `amount` notches, optionally moving to `at` first.
    async fn scroll(&self, direction: ScrollDirection, amount: i32, at: Option<(i32, i32)>) -> DeskPilotResult<bool>;
}

#[async_trait]
pub trait KeyController: Send + Sync {
    async fn type_text(&self, text: &str) -> DeskPilotResult<bool>;
    /// Single key tap, e.g. `enter`, `tab`, `f5`.
    async fn press(&self, key: &str) -> DeskPilotResult<bool>;
    /// Modifier chord, e.g. `["ctrl", "shift", "t"]`.
    async fn hotkey(&self, keys: &[String]) -> DeskPilotResult<bool>;
}

#[cfg(feature = "desktop")]
pub use desktop::EnigoInput;

#[cfg(feature = "desktop")]
mod desktop {
    use std::time::Duration;

    use async_trait::async_trait;
    use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

    use super::{KeyController, PointerController};
    use crate::agent_engine::state::ScrollDirection;
    use crate::errors::{DeskPilotError, DeskPilotResult};

    const DRAG_SETTLE: Duration = Duration::from_millis(80);

    /// enigo-backed pointer and keyboard. Each call opens its own `Enigo`
    /// on a blocking thread since the handle is not `Send` on every platform.
    #[derive(Debug, Default, Clone)]
    pub struct EnigoInput;

    fn input_err(e: impl std::fmt::Display) -> DeskPilotError {
        DeskPilotError::Input(e.to_string())
    }

    async fn with_enigo<F>(op: &'static str, f: F) -> DeskPilotResult<bool>
    where
        F: FnOnce(&mut Enigo) -> DeskPilotResult<()> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let mut enigo = Enigo::new(&Settings::default()).map_err(input_err)?;
            f(&mut enigo)
        })
        .await
        .map_err(|e| DeskPilotError::Input(format!("{op} task join: {e}")))??;
        tracing::debug!(op, "input sent");
        Ok(true)
    }

    fn click_at(enigo: &mut Enigo, x: i32, y: i32, button: Button, count: u32) -> DeskPilotResult<()> {
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
        for _ in 0..count {
            enigo.button(button, Direction::Click).map_err(input_err)?;
        }
        Ok(())
    }

    fn parse_key(name: &str) -> DeskPilotResult<Key> {
        let lower = name.trim().to_lowercase();
        let key = match lower.as_str() {
            "ctrl" | "control" => Key::Control,
            "shift" => Key::Shift,
            "alt" | "option" => Key::Alt,
            "win" | "super" | "meta" | "cmd" | "command" => Key::Meta,
            "enter" | "return" => Key::Return,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Escape,
            "space" => Key::Space,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "page_up" => Key::PageUp,
            "pagedown" | "page_down" => Key::PageDown,
            "up" => Key::UpArrow,
            "down" => Key::DownArrow,
            "left" => Key::LeftArrow,
            "right" => Key::RightArrow,
            "f1" => Key::F1,
            "f2" => Key::F2,
            "f3" => Key::F3,
            "f4" => Key::F4,
            "f5" => Key::F5,
            "f6" => Key::F6,
            "f7" => Key::F7,
            "f8" => Key::F8,
            "f9" => Key::F9,
            "f10" => Key::F10,
            "f11" => Key::F11,
            "f12" => Key::F12,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Unicode(c),
                    _ => return Err(DeskPilotError::Input(format!("unknown key: {name}"))),
                }
            }
        };
        Ok(key)
    }

    #[async_trait]
    impl PointerController for EnigoInput {
        async fn click(&self, x: i32, y: i32) -> DeskPilotResult<bool> {
            with_enigo("click", move |e| click_at(e, x, y, Button::Left, 1)).await
        }

        async fn double_click(&self, x: i32, y: i32) -> DeskPilotResult<bool> {
            with_enigo("double_click", move |e| click_at(e, x, y, Button::Left, 2)).await
        }

        async fn right_click(&self, x: i32, y: i32) -> DeskPilotResult<bool> {
            with_enigo("right_click", move |e| click_at(e, x, y, Button::Right, 1)).await
        }

        async fn drag(&self, from: (i32, i32), to: (i32, i32)) -> DeskPilotResult<bool> {
            with_enigo("drag", move |e| {
                e.move_mouse(from.0, from.1, Coordinate::Abs).map_err(input_err)?;
                e.button(Button::Left, Direction::Press).map_err(input_err)?;
                std::thread::sleep(DRAG_SETTLE);
                e.move_mouse(to.0, to.1, Coordinate::Abs).map_err(input_err)?;
                std::thread::sleep(DRAG_SETTLE);
                e.button(Button::Left, Direction::Release).map_err(input_err)
            })
            .await
        }

        async fn scroll(&self, direction: ScrollDirection, amount: i32, at: Option<(i32, i32)>) -> DeskPilotResult<bool> {
            with_enigo("scroll", move |e| {
                if let Some((x, y)) = at {
                    e.move_mouse(x, y, Coordinate::Abs).map_err(input_err)?;
                }
                let amount = amount.max(1);
                let (length, axis) = match direction {
                    ScrollDirection::Up => (-amount, Axis::Vertical),
                    ScrollDirection::Down => (amount, Axis::Vertical),
                    ScrollDirection::Left => (-amount, Axis::Horizontal),
                    ScrollDirection::Right => (amount, Axis::Horizontal),
                };
                e.scroll(length, axis).map_err(input_err)
            })
            .await
        }
    }

    #[async_trait]
    impl KeyController for EnigoInput {
        async fn type_text(&self, text: &str) -> DeskPilotResult<bool> {
            let text = text.to_string();
            with_enigo("type_text", move |e| e.text(&text).map_err(input_err)).await
        }

        async fn press(&self, key: &str) -> DeskPilotResult<bool> {
            let key = parse_key(key)?;
            with_enigo("press", move |e| e.key(key, Direction::Click).map_err(input_err)).await
        }

        async fn hotkey(&self, keys: &[String]) -> DeskPilotResult<bool> {
            let keys = keys.iter().map(|k| parse_key(k)).collect::<DeskPilotResult<Vec<_>>>()?;
            with_enigo("hotkey", move |e| {
                for key in &keys {
                    e.key(*key, Direction::Press).map_err(input_err)?;
                }
                for key in keys.iter().rev() {
                    e.key(*key, Direction::Release).map_err(input_err)?;
                }
                Ok(())
            })
            .await
        }
    }
}
