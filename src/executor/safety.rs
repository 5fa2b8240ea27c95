// Security policy: every primitive action passes through `allow` before it
// reaches an OS provider.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::ActionSpec;
use crate::config::SecurityConfig;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Characters an app name may not contain. App names reach osascript,
/// PowerShell and `cmd start`.
pub const APP_NAME_FORBIDDEN_CHARS: &[char] = &[
    '"', '\'', '`', '\n', '\r', '&', '|', ';', '<', '>', '^', '%', '$',
];

/// Rate-limit class of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Pointer,
    Keyboard,
    App,
    Perception,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Capability::Pointer => "pointer",
            Capability::Keyboard => "keyboard",
            Capability::App => "app",
            Capability::Perception => "perception",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("{capability} rate limit reached ({max} actions per minute)")]
    RateLimited { capability: Capability, max: u32 },

    #[error("pointer target ({x}, {y}) is outside the screen")]
    OutOfBounds { x: i32, y: i32 },

    #[error("pointer target ({x}, {y}) is inside a forbidden region")]
    ForbiddenRegion { x: i32, y: i32 },

    #[error("pointer target ({x}, {y}) is outside the sandbox area")]
    OutsideSandbox { x: i32, y: i32 },

    #[error("key combination '{0}' is forbidden")]
    ForbiddenHotkey(String),

    #[error("text contains forbidden pattern '{0}'")]
    DangerousText(String),

    #[error("text length {len} exceeds sandbox limit {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("app name {name:?} contains forbidden character {found:?}")]
    UnsafeAppName { name: String, found: char },
}

#[derive(Debug)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug)]
struct PolicyState {
    screen: (u32, u32),
    windows: HashMap<Capability, RateWindow>,
}

/// Process-wide rule evaluator with rolling per-capability counters.
///
/// Rules are evaluated in a fixed order and the first failing rule wins:
/// rate limit, pointer bounds/regions/sandbox, forbidden key combinations,
/// text content and app names. Counters only move when every rule passes.
#[derive(Debug)]
pub struct SecurityPolicy {
    config: SecurityConfig,
    forbidden_combos: Vec<String>,
    state: Mutex<PolicyState>,
}

impl SecurityPolicy {
    pub fn new(config: SecurityConfig) -> Self {
        let forbidden_combos = config
            .forbidden_hotkeys
            .iter()
            .map(|combo| normalize_combo(&split_combo(combo)))
            .collect();
        let screen = (config.screen_width, config.screen_height);
        Self {
            config,
            forbidden_combos,
            state: Mutex::new(PolicyState {
                screen,
                windows: HashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn sandbox_mode(&self) -> bool {
        self.config.sandbox_mode
    }

    /// Updates the screen size used for bounds checks, typically from the
    /// latest capture.
    pub fn set_screen_size(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let mut state = self.lock_state();
        if state.screen != (width, height) {
            tracing::debug!(width, height, "security policy screen size updated");
            state.screen = (width, height);
        }
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.lock_state().screen
    }

    /// Checks `spec` with its resolved pointer `points` and records it against
    /// the capability's rate window when allowed.
    pub fn allow(&self, spec: &ActionSpec, points: &[(i32, i32)]) -> Result<(), PolicyViolation> {
        let capability = spec.kind().capability();
        let mut state = self.lock_state();
        let now = Instant::now();

        // 1. rate limit (checked here, counted only once everything passed)
        let limit = self.rate_limit(capability);
        if let Some(max) = limit {
            let window = state.windows.entry(capability).or_insert(RateWindow {
                count: 0,
                reset_at: now,
            });
            if now.duration_since(window.reset_at) > RATE_WINDOW {
                window.count = 0;
                window.reset_at = now;
            }
            if window.count >= max {
                tracing::warn!(%capability, max, "rate limit reached");
                return Err(PolicyViolation::RateLimited { capability, max });
            }
        }

        // 2. pointer targets
        for &(x, y) in points {
            self.check_point(state.screen, x, y)?;
        }

        // 3. key combinations
        match spec {
            ActionSpec::Hotkey { keys } => self.check_combo(keys)?,
            ActionSpec::PressKey { key } => self.check_combo(&split_combo(key))?,
            _ => {}
        }

        // 4. text content
        match spec {
            ActionSpec::TypeText { text } => self.check_text(text)?,
            ActionSpec::NavigateUrl { url } => self.check_text(url)?,
            ActionSpec::OpenApp { app_name }
            | ActionSpec::SwitchApp { app_name }
            | ActionSpec::CloseApp { app_name } => self.check_app_name(app_name)?,
            _ => {}
        }

        if limit.is_some() {
            if let Some(window) = state.windows.get_mut(&capability) {
                window.count += 1;
            }
        }
        Ok(())
    }

    /// Current count in the capability's window (0 if never used).
    pub fn usage(&self, capability: Capability) -> u32 {
        self.lock_state()
            .windows
            .get(&capability)
            .map(|w| w.count)
            .unwrap_or(0)
    }

    fn rate_limit(&self, capability: Capability) -> Option<u32> {
        match capability {
            Capability::Pointer => Some(self.config.max_pointer_actions_per_minute),
            Capability::Keyboard => Some(self.config.max_key_actions_per_minute),
            Capability::App | Capability::Perception => None,
        }
    }

    fn check_point(&self, screen: (u32, u32), x: i32, y: i32) -> Result<(), PolicyViolation> {
        let (width, height) = screen;
        if x < 0 || y < 0 || x as i64 >= width as i64 || y as i64 >= height as i64 {
            return Err(PolicyViolation::OutOfBounds { x, y });
        }
        if self.config.forbidden_regions.iter().any(|r| r.contains(x, y)) {
            return Err(PolicyViolation::ForbiddenRegion { x, y });
        }
        if self.config.sandbox_mode {
            let cx = width as f64 / 2.0;
            let cy = height as f64 / 2.0;
            let max_dist = width.min(height) as f64 / 3.0;
            let dist = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            if dist > max_dist {
                return Err(PolicyViolation::OutsideSandbox { x, y });
            }
        }
        Ok(())
    }

    fn check_combo(&self, keys: &[String]) -> Result<(), PolicyViolation> {
        let combo = normalize_combo(keys);
        if combo.is_empty() {
            return Ok(());
        }
        if self.forbidden_combos.iter().any(|f| *f == combo) {
            return Err(PolicyViolation::ForbiddenHotkey(combo));
        }
        Ok(())
    }

    fn check_text(&self, text: &str) -> Result<(), PolicyViolation> {
        let lowered = text.to_lowercase();
        if let Some(pattern) = self
            .config
            .dangerous_patterns
            .iter()
            .find(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()))
        {
            return Err(PolicyViolation::DangerousText(pattern.clone()));
        }
        let len = text.chars().count();
        if self.config.sandbox_mode && len > self.config.max_sandbox_text_length {
            return Err(PolicyViolation::TextTooLong {
                len,
                max: self.config.max_sandbox_text_length,
            });
        }
        Ok(())
    }

    fn check_app_name(&self, name: &str) -> Result<(), PolicyViolation> {
        self.check_text(name)?;
        if let Some(found) = unsafe_app_name_char(name) {
            return Err(PolicyViolation::UnsafeAppName {
                name: name.to_string(),
                found,
            });
        }
        Ok(())
    }

    /// Ages the capability's rate window by `by`.
    #[cfg(test)]
    fn age_window(&self, capability: Capability, by: Duration) {
        if let Some(window) = self.lock_state().windows.get_mut(&capability) {
            if let Some(earlier) = window.reset_at.checked_sub(by) {
                window.reset_at = earlier;
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PolicyState> {
        // A poisoned lock only means another thread panicked mid-check; the
        // counters are still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// First character that makes `name` unsafe to hand to a shell or script
/// host. A leading `-` counts, since it would be read as an option.
pub fn unsafe_app_name_char(name: &str) -> Option<char> {
    let trimmed = name.trim();
    if trimmed.starts_with('-') {
        return Some('-');
    }
    trimmed
        .chars()
        .find(|c| APP_NAME_FORBIDDEN_CHARS.contains(c) || c.is_control())
}

fn split_combo(combo: &str) -> Vec<String> {
    combo
        .split('+')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Canonical form of a key combination: lowercase, aliases folded, sorted,
/// joined with `+`.
pub fn normalize_combo(keys: &[String]) -> String {
    let mut parts: Vec<String> = keys
        .iter()
        .map(|k| canonical_key(&k.trim().to_lowercase()).to_string())
        .filter(|k| !k.is_empty())
        .collect();
    parts.sort();
    parts.dedup();
    parts.join("+")
}

fn canonical_key(key: &str) -> &str {
    match key {
        "control" | "ctl" => "ctrl",
        "del" => "delete",
        "esc" => "escape",
        "option" | "opt" | "alt_l" | "alt_r" => "alt",
        "super" | "meta" | "windows" | "lwin" | "rwin" => "win",
        "command" | "⌘" => "cmd",
        "return" => "enter",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rect;

    fn policy(sandbox: bool) -> SecurityPolicy {
        SecurityPolicy::new(SecurityConfig {
            sandbox_mode: sandbox,
            ..SecurityConfig::default()
        })
    }

    #[test]
    fn forbidden_region_rejects_regardless_of_sandbox() {
        for sandbox in [false, true] {
            let policy = SecurityPolicy::new(SecurityConfig {
                sandbox_mode: sandbox,
                forbidden_regions: vec![Rect::new(0, 0, 100, 100)],
                ..SecurityConfig::default()
            });
            // region rule is checked before the sandbox radius
            assert_eq!(
                policy.allow(&ActionSpec::click(5, 5), &[(5, 5)]),
                Err(PolicyViolation::ForbiddenRegion { x: 5, y: 5 })
            );
        }
    }

    #[test]
    fn out_of_bounds_rejected() {
        let p = policy(false);
        assert_eq!(
            p.allow(&ActionSpec::click(1920, 10), &[(1920, 10)]),
            Err(PolicyViolation::OutOfBounds { x: 1920, y: 10 })
        );
        assert_eq!(
            p.allow(&ActionSpec::click(-1, 10), &[(-1, 10)]),
            Err(PolicyViolation::OutOfBounds { x: -1, y: 10 })
        );
        assert!(p.allow(&ActionSpec::click(1919, 1079), &[(1919, 1079)]).is_ok());
    }

    #[test]
    fn sandbox_limits_distance_from_center() {
        let p = policy(true);
        // 1080 / 3 = 360 px radius around (960, 540)
        assert!(p.allow(&ActionSpec::click(960, 540), &[(960, 540)]).is_ok());
        assert!(p.allow(&ActionSpec::click(1320, 540), &[(1320, 540)]).is_ok());
        assert_eq!(
            p.allow(&ActionSpec::click(1321, 540), &[(1321, 540)]),
            Err(PolicyViolation::OutsideSandbox { x: 1321, y: 540 })
        );
        assert!(policy(false).allow(&ActionSpec::click(10, 10), &[(10, 10)]).is_ok());
    }

    #[test]
    fn pointer_rate_limit_blocks_after_max() {
        let p = SecurityPolicy::new(SecurityConfig {
            max_pointer_actions_per_minute: 2,
            ..SecurityConfig::default()
        });
        let click = ActionSpec::click(10, 10);
        assert!(p.allow(&click, &[(10, 10)]).is_ok());
        assert!(p.allow(&click, &[(10, 10)]).is_ok());
        assert_eq!(
            p.allow(&click, &[(10, 10)]),
            Err(PolicyViolation::RateLimited {
                capability: Capability::Pointer,
                max: 2
            })
        );
        // keyboard has its own window
        assert!(p.allow(&ActionSpec::type_text("hi"), &[]).is_ok());
    }

    #[test]
    fn rate_window_resets_after_a_minute() {
        let p = SecurityPolicy::new(SecurityConfig {
            max_pointer_actions_per_minute: 2,
            forbidden_regions: vec![Rect::new(0, 0, 100, 100)],
            ..SecurityConfig::default()
        });
        let click = ActionSpec::click(500, 500);
        assert!(p.allow(&click, &[(500, 500)]).is_ok());

        // denied inside the window: count untouched
        assert!(p.allow(&ActionSpec::click(5, 5), &[(5, 5)]).is_err());
        assert_eq!(p.usage(Capability::Pointer), 1);

        assert!(p.allow(&click, &[(500, 500)]).is_ok());
        assert!(matches!(
            p.allow(&click, &[(500, 500)]),
            Err(PolicyViolation::RateLimited { .. })
        ));

        p.age_window(Capability::Pointer, Duration::from_secs(61));
        assert!(p.allow(&ActionSpec::click(5, 5), &[(5, 5)]).is_err());
        assert_eq!(p.usage(Capability::Pointer), 0);
        assert!(p.allow(&click, &[(500, 500)]).is_ok());
        assert_eq!(p.usage(Capability::Pointer), 1);
    }

    #[test]
    fn app_names_are_checked_before_reaching_the_os() {
        let p = policy(false);
        let injected = ActionSpec::OpenApp {
            app_name: "Finder\" to activate\ndo shell script \"rm -rf ~".into(),
        };
        assert_eq!(
            p.allow(&injected, &[]),
            Err(PolicyViolation::DangerousText("rm -rf".into()))
        );

        for name in ["Finder\" to quit", "notepad & calc", "a'b", "x|y", "x;y", "line\nbreak", "--help"] {
            let spec = ActionSpec::SwitchApp { app_name: name.into() };
            assert!(
                matches!(p.allow(&spec, &[]), Err(PolicyViolation::UnsafeAppName { .. })),
                "{name:?}"
            );
        }

        for name in ["Google Chrome", "notepad", "Visual Studio Code", "firefox-esr"] {
            let spec = ActionSpec::CloseApp { app_name: name.into() };
            assert!(p.allow(&spec, &[]).is_ok(), "{name:?}");
        }
    }

    #[test]
    fn denied_actions_do_not_consume_rate() {
        let p = SecurityPolicy::new(SecurityConfig {
            forbidden_regions: vec![Rect::new(0, 0, 100, 100)],
            ..SecurityConfig::default()
        });
        assert!(p.allow(&ActionSpec::click(5, 5), &[(5, 5)]).is_err());
        assert_eq!(p.usage(Capability::Pointer), 0);
        assert!(p.allow(&ActionSpec::click(500, 500), &[(500, 500)]).is_ok());
        assert_eq!(p.usage(Capability::Pointer), 1);
    }

    #[test]
    fn forbidden_hotkeys_match_after_normalization() {
        let p = policy(false);
        let spec = ActionSpec::Hotkey {
            keys: vec!["Delete".into(), "Control".into(), "ALT".into()],
        };
        assert_eq!(
            p.allow(&spec, &[]),
            Err(PolicyViolation::ForbiddenHotkey("alt+ctrl+delete".into()))
        );
        let spec = ActionSpec::PressKey {
            key: "ctrl+shift+esc".into(),
        };
        assert!(matches!(p.allow(&spec, &[]), Err(PolicyViolation::ForbiddenHotkey(_))));
        let copy = ActionSpec::Hotkey {
            keys: vec!["ctrl".into(), "c".into()],
        };
        assert!(p.allow(&copy, &[]).is_ok());
    }

    #[test]
    fn dangerous_text_rejected_case_insensitive() {
        let p = policy(false);
        assert_eq!(
            p.allow(&ActionSpec::type_text("sudo RM -RF /"), &[]),
            Err(PolicyViolation::DangerousText("rm -rf".into()))
        );
        assert!(p.allow(&ActionSpec::type_text("hello world"), &[]).is_ok());
    }

    #[test]
    fn sandbox_limits_text_length() {
        let long = "a".repeat(1001);
        assert!(policy(false).allow(&ActionSpec::type_text(long.clone()), &[]).is_ok());
        assert_eq!(
            policy(true).allow(&ActionSpec::type_text(long), &[]),
            Err(PolicyViolation::TextTooLong { len: 1001, max: 1000 })
        );
    }

    #[test]
    fn screen_size_updates_bounds() {
        let p = policy(false);
        p.set_screen_size(800, 600);
        assert_eq!(p.screen_size(), (800, 600));
        assert!(p.allow(&ActionSpec::click(900, 10), &[(900, 10)]).is_err());
        p.set_screen_size(0, 0);
        assert_eq!(p.screen_size(), (800, 600));
    }
}
