//! Rotary-encoder menu state machine.
//!
//! Converts raw encoder/button events into feature changes. A long press
//! opens a session; while one is open the engine drops external feature
//! updates so remote commands can't race the local edit. Cancelling (long
//! press or 60 s of inactivity) restores whatever feature was active when
//! the session opened.

use std::time::{Duration, Instant};

use lamp_rgb::{rgb_to_hsv, Rgb};
use serde_json::{json, Value};
use tracing::debug;

use crate::lamp;

/// Inactivity window after which an open session is cancelled.
const SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Step of the idle brightness nudge, on the encoder's 0-255 scale.
const BRIGHTNESS_STEP: i16 = 10;

/// Animations offered by the animation submenu.
const ANIMATION_CHOICES: [&str; 5] = ["none", "rainbow", "breathe", "wheel", "flash_color"];

/// Raw events from the encoder/button driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ShortPress,
    LongPress,
    EncoderNext,
    EncoderPrev,
}

/// What the engine should do in response to an input event.
#[derive(Debug, PartialEq)]
pub enum MenuAction {
    /// Apply a feature change, broadcast it and persist it.
    Commit { feature_id: String, value: Value },
    /// Reapply the captured feature after a cancelled session. Silent.
    Restore { feature_id: String, value: Value },
    /// Drive the lamp for a preview only.
    Preview(Preview),
}

#[derive(Debug, PartialEq)]
pub enum Preview {
    /// Blink a badge color identifying the highlighted menu entry.
    Badge(Rgb),
    /// Show a candidate value as it would look when committed.
    Candidate { feature_id: String, value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    GlobalColor,
    Animation,
    Visualizer,
}

const MENU_ITEMS: [MenuItem; 3] = [
    MenuItem::GlobalColor,
    MenuItem::Animation,
    MenuItem::Visualizer,
];

impl MenuItem {
    fn badge(self) -> Rgb {
        match self {
            MenuItem::GlobalColor => Rgb::WHITE,
            MenuItem::Animation => Rgb::MAGENTA,
            MenuItem::Visualizer => Rgb::CYAN,
        }
    }

    fn choice_count(self) -> usize {
        match self {
            MenuItem::GlobalColor => Rgb::NAMED.len(),
            MenuItem::Animation => ANIMATION_CHOICES.len(),
            MenuItem::Visualizer => 2,
        }
    }

    fn commit(self, choice: usize) -> (String, Value) {
        match self {
            MenuItem::GlobalColor => (
                lamp::FEATURE_GLOBAL_COLOR.to_owned(),
                json!(Rgb::NAMED[choice].1.to_hex()),
            ),
            MenuItem::Animation => (
                lamp::FEATURE_ANIMATION.to_owned(),
                json!(ANIMATION_CHOICES[choice]),
            ),
            MenuItem::Visualizer => {
                (lamp::FEATURE_VISUALIZER.to_owned(), json!(choice as u64))
            }
        }
    }

    fn preview(self, choice: usize) -> Preview {
        match self {
            MenuItem::GlobalColor => Preview::Candidate {
                feature_id: lamp::FEATURE_GLOBAL_COLOR.to_owned(),
                value: json!(Rgb::NAMED[choice].1.to_hex()),
            },
            MenuItem::Animation => Preview::Candidate {
                feature_id: lamp::FEATURE_ANIMATION.to_owned(),
                value: json!(ANIMATION_CHOICES[choice]),
            },
            // the visualizer itself is too heavy to preview: show green for
            // on, dark for off
            MenuItem::Visualizer => Preview::Candidate {
                feature_id: lamp::FEATURE_GLOBAL_COLOR.to_owned(),
                value: json!(if choice == 1 {
                    Rgb::GREEN.to_hex()
                } else {
                    Rgb::OFF.to_hex()
                }),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuState {
    Idle,
    Menu { item: usize },
    Submenu { item: usize, choice: usize },
}

pub struct Menu {
    state: MenuState,
    /// Feature active when the session opened, reapplied on cancel.
    captured: Option<(String, Value)>,
    last_activity: Instant,
}

impl Menu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: MenuState::Idle,
            captured: None,
            last_activity: Instant::now(),
        }
    }

    /// Whether a menu session is open. While true, external feature updates
    /// must not reach the lamp.
    pub fn in_session(&self) -> bool {
        self.state != MenuState::Idle
    }

    pub fn handle(
        &mut self,
        event: InputEvent,
        active: (String, Value),
        color: Rgb,
    ) -> Option<MenuAction> {
        self.last_activity = Instant::now();
        match (self.state, event) {
            (MenuState::Idle, InputEvent::LongPress) => {
                self.captured = Some(active);
                self.state = MenuState::Menu { item: 0 };
                debug!("menu opened");
                Some(MenuAction::Preview(Preview::Badge(MENU_ITEMS[0].badge())))
            }
            (MenuState::Idle, InputEvent::EncoderNext) => {
                Some(Self::nudge(color, BRIGHTNESS_STEP))
            }
            (MenuState::Idle, InputEvent::EncoderPrev) => {
                Some(Self::nudge(color, -BRIGHTNESS_STEP))
            }
            (MenuState::Idle, InputEvent::ShortPress) => None,
            (MenuState::Menu { item }, InputEvent::EncoderNext) => {
                let item = (item + 1) % MENU_ITEMS.len();
                self.state = MenuState::Menu { item };
                Some(MenuAction::Preview(Preview::Badge(MENU_ITEMS[item].badge())))
            }
            (MenuState::Menu { item }, InputEvent::EncoderPrev) => {
                let item = (item + MENU_ITEMS.len() - 1) % MENU_ITEMS.len();
                self.state = MenuState::Menu { item };
                Some(MenuAction::Preview(Preview::Badge(MENU_ITEMS[item].badge())))
            }
            (MenuState::Menu { item }, InputEvent::ShortPress) => {
                self.state = MenuState::Submenu { item, choice: 0 };
                Some(MenuAction::Preview(MENU_ITEMS[item].preview(0)))
            }
            (MenuState::Menu { .. }, InputEvent::LongPress) => self.cancel(),
            (MenuState::Submenu { item, choice }, InputEvent::EncoderNext) => {
                let choice = (choice + 1) % MENU_ITEMS[item].choice_count();
                self.state = MenuState::Submenu { item, choice };
                Some(MenuAction::Preview(MENU_ITEMS[item].preview(choice)))
            }
            (MenuState::Submenu { item, choice }, InputEvent::EncoderPrev) => {
                let count = MENU_ITEMS[item].choice_count();
                let choice = (choice + count - 1) % count;
                self.state = MenuState::Submenu { item, choice };
                Some(MenuAction::Preview(MENU_ITEMS[item].preview(choice)))
            }
            (MenuState::Submenu { item, choice }, InputEvent::ShortPress) => {
                let (feature_id, value) = MENU_ITEMS[item].commit(choice);
                self.state = MenuState::Idle;
                self.captured = None;
                debug!("menu committed {feature_id}");
                Some(MenuAction::Commit { feature_id, value })
            }
            (MenuState::Submenu { .. }, InputEvent::LongPress) => self.cancel(),
        }
    }

    /// Cancels the session once it has been inactive for the timeout,
    /// restoring the captured feature exactly as a long-press cancel would.
    pub fn poll_timeout(&mut self) -> Option<MenuAction> {
        self.poll_timeout_at(Instant::now())
    }

    fn poll_timeout_at(&mut self, now: Instant) -> Option<MenuAction> {
        if !self.in_session()
            || now.duration_since(self.last_activity) < SESSION_TIMEOUT
        {
            return None;
        }
        debug!("menu session timed out");
        self.cancel()
    }

    fn cancel(&mut self) -> Option<MenuAction> {
        self.state = MenuState::Idle;
        self.captured
            .take()
            .map(|(feature_id, value)| MenuAction::Restore { feature_id, value })
    }

    fn nudge(color: Rgb, delta: i16) -> MenuAction {
        let (_, _, v) = rgb_to_hsv(color);
        #[allow(clippy::cast_possible_truncation)]
        let brightness = (v / 100.0 * 255.0).round() as i16;
        let nudged = brightness.saturating_add(delta).clamp(0, 255) as u8;
        MenuAction::Commit {
            feature_id: lamp::FEATURE_GLOBAL_COLOR.to_owned(),
            value: json!(color.with_brightness(nudged).to_hex()),
        }
    }
}

impl Default for Menu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn active_color(hex: &str) -> (String, Value) {
        (lamp::FEATURE_GLOBAL_COLOR.to_owned(), json!(hex))
    }

    #[test]
    fn test_long_press_captures_and_restores() {
        let mut menu = Menu::new();
        let action = menu
            .handle(InputEvent::LongPress, active_color("#ff0000"), Rgb::RED)
            .unwrap();
        assert!(matches!(action, MenuAction::Preview(Preview::Badge(_))));
        assert!(menu.in_session());

        let action = menu
            .handle(InputEvent::LongPress, active_color("#00ff00"), Rgb::GREEN)
            .unwrap();
        assert_eq!(
            action,
            MenuAction::Restore {
                feature_id: lamp::FEATURE_GLOBAL_COLOR.to_owned(),
                value: json!("#ff0000"),
            }
        );
        assert!(!menu.in_session());
    }

    #[test]
    fn test_commit_path() {
        let mut menu = Menu::new();
        menu.handle(InputEvent::LongPress, active_color("#ffffff"), Rgb::WHITE);
        // highlight the animation item
        menu.handle(InputEvent::EncoderNext, active_color("#ffffff"), Rgb::WHITE);
        menu.handle(InputEvent::ShortPress, active_color("#ffffff"), Rgb::WHITE);
        // cycle to "rainbow"
        let preview = menu
            .handle(InputEvent::EncoderNext, active_color("#ffffff"), Rgb::WHITE)
            .unwrap();
        assert_eq!(
            preview,
            MenuAction::Preview(Preview::Candidate {
                feature_id: lamp::FEATURE_ANIMATION.to_owned(),
                value: json!("rainbow"),
            })
        );
        let commit = menu
            .handle(InputEvent::ShortPress, active_color("#ffffff"), Rgb::WHITE)
            .unwrap();
        assert_eq!(
            commit,
            MenuAction::Commit {
                feature_id: lamp::FEATURE_ANIMATION.to_owned(),
                value: json!("rainbow"),
            }
        );
        // the commit auto-returned to idle
        assert!(!menu.in_session());
    }

    #[test]
    fn test_idle_encoder_nudges_brightness() {
        let mut menu = Menu::new();
        let action = menu
            .handle(
                InputEvent::EncoderPrev,
                active_color("#ffffff"),
                Rgb::WHITE,
            )
            .unwrap();
        let MenuAction::Commit { feature_id, value } = action else {
            panic!("expected a commit, got {action:?}");
        };
        assert_eq!(feature_id, lamp::FEATURE_GLOBAL_COLOR);
        // 255 - 10 = 245 on all channels for white
        assert_eq!(value, json!("#f5f5f5"));
        assert!(!menu.in_session());
    }

    #[test]
    fn test_session_times_out_to_restore() {
        let mut menu = Menu::new();
        menu.handle(InputEvent::LongPress, active_color("#ff0000"), Rgb::RED);
        assert!(menu.poll_timeout().is_none(), "fresh session must not expire");

        let later = Instant::now() + SESSION_TIMEOUT + Duration::from_secs(1);
        let action = menu.poll_timeout_at(later).unwrap();
        assert_eq!(
            action,
            MenuAction::Restore {
                feature_id: lamp::FEATURE_GLOBAL_COLOR.to_owned(),
                value: json!("#ff0000"),
            }
        );
        assert!(!menu.in_session());
    }

    #[test]
    fn test_menu_items_wrap() {
        let mut menu = Menu::new();
        menu.handle(InputEvent::LongPress, active_color("#ffffff"), Rgb::WHITE);
        let first = menu
            .handle(InputEvent::EncoderPrev, active_color("#ffffff"), Rgb::WHITE)
            .unwrap();
        // stepping back from the first item lands on the last
        assert_eq!(
            first,
            MenuAction::Preview(Preview::Badge(MenuItem::Visualizer.badge()))
        );
    }
}
