//! Global scene state: window arena, Z-order, focus, the pointer state
//! machine, keyboard dispatch, and the compositor.
//!
//! Windows live in a slot arena; the Z-order is a flat vector of arena keys
//! from bottom to top, so "raise" is an explicit move instead of pointer
//! surgery. Connections hold arena keys, never references.
//!
//! Scene code never touches sockets. Everything it wants delivered to a
//! client is pushed onto an outbound queue the server drains into the
//! owning connection's transmit ring, which keeps per-connection ordering.

use std::collections::VecDeque;
use std::process::Command;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::gfx::cursor;
use crate::gfx::font::{self, Font, FONT_HEIGHT};
use crate::gfx::framebuffer::{make_color, Framebuffer};
use crate::gfx::wallpaper;
use crate::input::keyboard::{self, keys, Modifiers};
use crate::input::mouse::{self, Packet, PacketAccumulator, BUTTON_LEFT};
use crate::proto::{CrtcMode, Event};

use super::tile::{self, TileKey, TileState};
use super::window::{
    ConnId, ButtonState, ResizeEdge, Window, BUTTON_CLOSE, BUTTON_MAXIMIZE, DOUBLE_CLICK_MS,
    RESIZE_GRACE,
};

pub type WindowKey = usize;

const INPUT_GRAB_SUFFIX: &str = " - Input Grabbed";

/// What the held-down left button is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerState {
    #[default]
    None,
    /// Drag disowned (button demoted, or double-click already handled).
    Ignore,
    ButtonPress { window: WindowKey, button: usize },
    TitleMove { window: WindowKey },
    Resize { window: WindowKey, edge: ResizeEdge },
}

pub struct Display {
    windows: Vec<Option<Window>>,
    /// Z-order, bottom to top.
    z: Vec<WindowKey>,
    active: Option<WindowKey>,
    tab_candidate: Option<WindowKey>,
    mods: Modifiers,
    pointer_x: i32,
    pointer_y: i32,
    pointer_state: PointerState,
    buttons_down: u8,
    accumulator: PacketAccumulator,
    hover: Option<WindowKey>,
    output: Framebuffer,
    wallpaper_fb: Framebuffer,
    wallpaper_seed: u64,
    mode: CrtcMode,
    running: bool,
    exit_code: i32,
    announcement: Option<String>,
    redraw: bool,
    cascade: i32,
    font: Font,
    terminal_cmd: String,
    events: VecDeque<(ConnId, Event)>,
}

impl Display {
    pub fn new(mode: CrtcMode, font: Font, wallpaper_seed: u64, terminal_cmd: String) -> Option<Display> {
        let output = Framebuffer::try_new(mode.view_xres, mode.view_yres)?;
        let mut wallpaper_fb = Framebuffer::try_new(mode.view_xres, mode.view_yres)?;
        wallpaper::paint(&mut wallpaper_fb, wallpaper_seed);
        Some(Display {
            windows: Vec::new(),
            z: Vec::new(),
            active: None,
            tab_candidate: None,
            mods: Modifiers::default(),
            pointer_x: mode.view_xres as i32 / 2,
            pointer_y: mode.view_yres as i32 / 2,
            pointer_state: PointerState::None,
            buttons_down: 0,
            accumulator: PacketAccumulator::default(),
            hover: None,
            output,
            wallpaper_fb,
            wallpaper_seed,
            mode,
            running: true,
            exit_code: 0,
            announcement: None,
            redraw: true,
            cascade: 0,
            font,
            terminal_cmd,
            events: VecDeque::new(),
        })
    }

    pub fn screen_width(&self) -> u32 {
        self.mode.view_xres
    }

    pub fn screen_height(&self) -> u32 {
        self.mode.view_yres
    }

    pub fn mode(&self) -> CrtcMode {
        self.mode
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn redraw_wanted(&self) -> bool {
        self.redraw
    }

    pub fn schedule_redraw(&mut self) {
        self.redraw = true;
    }

    pub fn output(&self) -> &Framebuffer {
        &self.output
    }

    pub fn pop_event(&mut self) -> Option<(ConnId, Event)> {
        self.events.pop_front()
    }

    /// Queue an event for the server to deliver to `conn`. One queue for
    /// all connections keeps per-connection ordering trivially correct.
    pub fn push_event(&mut self, conn: ConnId, event: Event) {
        self.events.push_back((conn, event));
    }

    fn win(&self, key: WindowKey) -> Option<&Window> {
        self.windows.get(key)?.as_ref()
    }

    fn win_mut(&mut self, key: WindowKey) -> Option<&mut Window> {
        self.windows.get_mut(key)?.as_mut()
    }

    // --- Z-order ---

    fn check_invariants(&self) {
        #[cfg(debug_assertions)]
        {
            let live = self.windows.iter().filter(|w| w.is_some()).count();
            assert_eq!(self.z.len(), live, "z-list and arena disagree");
            for (i, key) in self.z.iter().enumerate() {
                assert!(self.win(*key).is_some(), "stale key in z-list");
                assert!(!self.z[..i].contains(key), "duplicate key in z-list");
            }
            if let Some(active) = self.active {
                assert!(self.z.contains(&active), "active window not linked");
            }
            if let Some(candidate) = self.tab_candidate {
                assert!(self.z.contains(&candidate), "tab candidate not linked");
            }
        }
    }

    fn link_at_top(&mut self, key: WindowKey) {
        debug_assert!(!self.z.contains(&key));
        self.z.push(key);
        self.check_invariants();
    }

    fn unlink(&mut self, key: WindowKey) {
        self.z.retain(|k| *k != key);
    }

    fn raise(&mut self, key: WindowKey) {
        self.unlink(key);
        self.z.push(key);
        self.check_invariants();
    }

    fn top(&self) -> Option<WindowKey> {
        self.z.last().copied()
    }

    fn below(&self, key: WindowKey) -> Option<WindowKey> {
        let idx = self.z.iter().position(|k| *k == key)?;
        if idx > 0 {
            Some(self.z[idx - 1])
        } else {
            None
        }
    }

    /// Detach a window that is about to be destroyed, migrating the tab
    /// candidate and clearing focus as needed.
    fn unlink_for_removal(&mut self, key: WindowKey) {
        if self.tab_candidate == Some(key) {
            let next = self.below(key).or_else(|| {
                let top = self.top();
                if top == Some(key) {
                    None
                } else {
                    top
                }
            });
            self.tab_candidate = next;
        }
        if self.active == Some(key) {
            self.active = None;
        }
        if self.hover == Some(key) {
            self.hover = None;
        }
        self.unlink(key);
        self.check_invariants();
    }

    /// Focus handoff. Un-focusing a window synthesizes a release for every
    /// key it still holds, so nothing stays stuck down in the old client.
    fn set_active(&mut self, key: Option<WindowKey>) {
        if self.active != key {
            if let Some(prev) = self.active {
                let mut handoff = None;
                if let Some(w) = self.win_mut(prev) {
                    w.focus = false;
                    handoff = Some((w.conn, w.client_id, w.take_held_keys()));
                }
                if let Some((conn, window_id, held)) = handoff {
                    for code in held {
                        self.push_event(
                            conn,
                            Event::Keyboard {
                                window_id,
                                unit: keyboard::encode_key(-code),
                            },
                        );
                    }
                    let font = &self.font;
                    if let Some(w) = self.windows[prev].as_mut() {
                        w.render_frame(font);
                    }
                }
            }
            self.active = key;
        }
        if let Some(new) = key {
            let font = &self.font;
            if let Some(w) = self.windows[new].as_mut() {
                w.focus = true;
                w.render_frame(font);
            }
            self.raise(new);
        }
        self.check_invariants();
        self.redraw = true;
    }

    // --- Window lifecycle (driven by connection dispatch) ---

    /// Create and link a window at the next cascade position. The initial
    /// zero-size client resize emits the first resize event.
    pub fn create_window(&mut self, conn: ConnId, client_id: u32) -> Option<WindowKey> {
        let pos = self.cascade;
        let limit = (self.screen_width().min(self.screen_height()) * 3 / 5) as i32;
        self.cascade += 30;
        if self.cascade > limit {
            self.cascade = 0;
        }
        let window = Window::new(conn, client_id, pos, pos)?;
        let key = match self.windows.iter().position(|slot| slot.is_none()) {
            Some(idx) => {
                self.windows[idx] = Some(window);
                idx
            }
            None => {
                self.windows.push(Some(window));
                self.windows.len() - 1
            }
        };
        self.link_at_top(key);
        if self.active.is_none() {
            self.set_active(Some(key));
        }
        self.resize_window(key, 0, 0);
        Some(key)
    }

    pub fn destroy_window(&mut self, key: WindowKey) {
        self.unlink_for_removal(key);
        if let PointerState::ButtonPress { window, .. }
        | PointerState::TitleMove { window }
        | PointerState::Resize { window, .. } = self.pointer_state
        {
            if window == key {
                self.pointer_state = PointerState::Ignore;
            }
        }
        self.windows[key] = None;
        self.redraw = true;
    }

    /// Tear down every window a disconnected client owned.
    pub fn destroy_connection_windows(&mut self, conn: ConnId) {
        let keys: Vec<WindowKey> = self
            .z
            .iter()
            .copied()
            .filter(|&k| self.win(k).map(|w| w.conn == conn) == Some(true))
            .collect();
        for key in keys {
            self.destroy_window(key);
        }
    }

    pub fn resize_window(&mut self, key: WindowKey, width: u32, height: u32) {
        let font = &self.font;
        let Some(w) = self.windows.get_mut(key).and_then(|s| s.as_mut()) else {
            return;
        };
        if !w.client_resize(width, height, font) {
            warn!("window resize to {}x{} failed, retrying next cycle", width, height);
            self.redraw = true;
            return;
        }
        let (conn, window_id) = (w.conn, w.client_id);
        let (cw, ch) = (w.client_width(), w.client_height());
        self.push_event(conn, Event::Resize { window_id, width: cw, height: ch });
        self.redraw = true;
    }

    pub fn render_window(&mut self, key: WindowKey, left: u32, top: u32, width: u32, height: u32, pixels: &[u8]) {
        if let Some(w) = self.win_mut(key) {
            w.render_client(left, top, width, height, pixels);
            self.redraw = true;
        }
    }

    pub fn title_window(&mut self, key: WindowKey, title: &str) {
        let font = &self.font;
        if let Some(w) = self.windows.get_mut(key).and_then(|s| s.as_mut()) {
            w.title = title.to_owned();
            w.render_frame(font);
            self.redraw = true;
        }
    }

    pub fn show_window(&mut self, key: WindowKey, show: bool) {
        if let Some(w) = self.win_mut(key) {
            w.show = show;
            self.redraw = true;
        }
    }

    // --- Tiling ---

    fn apply_tile(&mut self, key: WindowKey, state: TileState) {
        let (sw, sh) = (self.screen_width(), self.screen_height());
        let Some((x, y, w, h)) = tile::tile_rect(state, sw, sh) else {
            return;
        };
        let font = &self.font;
        let Some(win) = self.windows.get_mut(key).and_then(|s| s.as_mut()) else {
            return;
        };
        win.left = x;
        win.top = y;
        let cw = w.saturating_sub(2 * super::window::BORDER_WIDTH);
        let ch = h.saturating_sub(super::window::TITLE_HEIGHT + super::window::BORDER_WIDTH);
        if !win.client_resize(cw, ch, font) {
            self.redraw = true;
            return;
        }
        win.tile = state;
        let (conn, window_id) = (win.conn, win.client_id);
        let (cw, ch) = (win.client_width(), win.client_height());
        self.push_event(conn, Event::Resize { window_id, width: cw, height: ch });
        self.redraw = true;
    }

    fn restore_window(&mut self, key: WindowKey) {
        let font = &self.font;
        let Some(win) = self.windows.get_mut(key).and_then(|s| s.as_mut()) else {
            return;
        };
        if !win.restore_geometry(font) {
            self.redraw = true;
            return;
        }
        let (conn, window_id) = (win.conn, win.client_id);
        let (cw, ch) = (win.client_width(), win.client_height());
        self.push_event(conn, Event::Resize { window_id, width: cw, height: ch });
        self.redraw = true;
    }

    /// Apply the tiling transition table for one keypress.
    fn tile_transition(&mut self, key: WindowKey, tkey: TileKey) {
        let Some(win) = self.win(key) else { return };
        let current = win.tile;
        let Some(next) = tile::transition(current, tkey) else {
            return;
        };
        if next == TileState::Regular {
            self.restore_window(key);
        } else {
            if current == TileState::Regular {
                if let Some(w) = self.win_mut(key) {
                    w.save_geometry();
                }
            }
            self.apply_tile(key, next);
        }
    }

    fn toggle_maximize(&mut self, key: WindowKey) {
        let Some(win) = self.win(key) else { return };
        if win.tile == TileState::Maximized {
            self.restore_window(key);
        } else {
            if win.tile == TileState::Regular {
                if let Some(w) = self.win_mut(key) {
                    w.save_geometry();
                }
            }
            self.apply_tile(key, TileState::Maximized);
        }
    }

    // --- Keyboard ---

    pub fn on_keyboard_unit(&mut self, unit: u32) {
        let key = keyboard::decode_key(unit);
        self.mods.update(key);
        let down = key > 0;
        let code = key.abs();

        // A grab routes everything to the window; only F12 escapes it.
        if let Some(ak) = self.active {
            if self.win(ak).map(|w| w.grab_input) == Some(true) {
                if down && code == keys::F12 {
                    self.set_input_grab(ak, false);
                    return;
                }
                self.forward_key(ak, unit);
                return;
            }
        }

        if down {
            match code {
                _ if code == keys::DELETE && self.mods.lctrl && self.mods.lalt => {
                    self.request_exit(0);
                    return;
                }
                _ if code == keys::T && self.mods.lctrl && self.mods.lalt => {
                    self.spawn_terminal();
                    return;
                }
                _ if code == keys::F4 && self.mods.lalt => {
                    if let Some(ak) = self.active {
                        self.send_quit(ak);
                    }
                    return;
                }
                _ if code == keys::F10 && self.mods.lalt => {
                    if let Some(ak) = self.active {
                        self.toggle_maximize(ak);
                    }
                    return;
                }
                _ if code == keys::TAB && self.mods.lalt => {
                    self.advance_tab_candidate();
                    return;
                }
                _ if code == keys::LEFT && self.mods.any_super() => {
                    if let Some(ak) = self.active {
                        self.tile_transition(ak, TileKey::Left);
                    }
                    return;
                }
                _ if code == keys::RIGHT && self.mods.any_super() => {
                    if let Some(ak) = self.active {
                        self.tile_transition(ak, TileKey::Right);
                    }
                    return;
                }
                _ if code == keys::UP && self.mods.any_super() => {
                    if let Some(ak) = self.active {
                        self.tile_transition(ak, TileKey::Up);
                    }
                    return;
                }
                _ if code == keys::DOWN && self.mods.any_super() => {
                    if let Some(ak) = self.active {
                        self.tile_transition(ak, TileKey::Down);
                    }
                    return;
                }
                _ if code == keys::F11 => {
                    if let Some(ak) = self.active {
                        self.set_input_grab(ak, true);
                    }
                    return;
                }
                _ if code == keys::F12 => {
                    if let Some(ak) = self.active {
                        self.set_input_grab(ak, false);
                    }
                    return;
                }
                _ => {}
            }
        } else {
            if code == keys::LALT && self.tab_candidate.is_some() {
                self.commit_tab_candidate();
                // The release still reaches the (new) focused window below.
            }
            if code == keys::TAB && self.tab_candidate.is_some() {
                return;
            }
        }

        if let Some(ak) = self.active {
            self.forward_key(ak, unit);
        }
    }

    fn forward_key(&mut self, key: WindowKey, unit: u32) {
        let Some(w) = self.win_mut(key) else { return };
        w.track_key(keyboard::decode_key(unit));
        let (conn, window_id) = (w.conn, w.client_id);
        self.push_event(conn, Event::Keyboard { window_id, unit });
    }

    fn send_quit(&mut self, key: WindowKey) {
        // The client acknowledges by destroying the window itself.
        if let Some(w) = self.win(key) {
            let (conn, window_id) = (w.conn, w.client_id);
            self.push_event(conn, Event::Quit { window_id });
        }
    }

    fn set_input_grab(&mut self, key: WindowKey, grab: bool) {
        let font = &self.font;
        let Some(w) = self.windows.get_mut(key).and_then(|s| s.as_mut()) else {
            return;
        };
        if grab == w.grab_input {
            return;
        }
        w.grab_input = grab;
        if grab {
            w.title.push_str(INPUT_GRAB_SUFFIX);
        } else if let Some(stripped) = w.title.strip_suffix(INPUT_GRAB_SUFFIX) {
            w.title = stripped.to_owned();
        }
        w.render_frame(font);
        self.redraw = true;
    }

    fn advance_tab_candidate(&mut self) {
        if self.z.is_empty() {
            return;
        }
        let old = self.tab_candidate;
        let current = old.or(self.active);
        let next = match current {
            Some(key) => self.below(key).or_else(|| self.top()),
            None => self.top(),
        };
        let font = &self.font;
        if let Some(o) = old {
            if let Some(w) = self.windows.get_mut(o).and_then(|s| s.as_mut()) {
                w.preview = false;
                w.render_frame(font);
            }
        }
        if let Some(n) = next {
            if let Some(w) = self.windows.get_mut(n).and_then(|s| s.as_mut()) {
                w.preview = true;
                w.render_frame(font);
            }
        }
        self.tab_candidate = next;
        self.check_invariants();
        self.redraw = true;
    }

    fn commit_tab_candidate(&mut self) {
        let Some(candidate) = self.tab_candidate.take() else {
            return;
        };
        let font = &self.font;
        if let Some(w) = self.windows.get_mut(candidate).and_then(|s| s.as_mut()) {
            w.preview = false;
            w.render_frame(font);
        }
        self.set_active(Some(candidate));
    }

    fn spawn_terminal(&mut self) {
        match Command::new(&self.terminal_cmd).spawn() {
            Ok(child) => debug!("spawned terminal {} (pid {})", self.terminal_cmd, child.id()),
            Err(err) => warn!("failed to spawn terminal {}: {}", self.terminal_cmd, err),
        }
    }

    /// Begin shutdown: one more composite shows the announcement, then the
    /// event loop returns.
    pub fn request_exit(&mut self, code: i32) {
        info!("exit requested with code {}", code);
        self.running = false;
        self.exit_code = code;
        self.announcement = Some(exit_announcement(code).to_owned());
        self.redraw = true;
    }

    // --- Pointer ---

    pub fn on_pointer_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if let Some(packet) = self.accumulator.push(byte) {
                self.on_pointer_packet(packet);
            }
        }
    }

    pub fn on_pointer_packet(&mut self, packet: Packet) {
        let (dx, dy) = mouse::accelerate(packet.dx, packet.dy);
        let old_x = self.pointer_x;
        let old_y = self.pointer_y;
        let want_x = old_x + dx;
        let want_y = old_y + dy;
        // The upper-right end of the screen is inclusive.
        self.pointer_x = want_x.clamp(0, self.screen_width() as i32);
        self.pointer_y = want_y.clamp(0, self.screen_height() as i32);
        let clip = ClipFlags {
            left: want_x < 0,
            right: want_x > self.screen_width() as i32,
            top: want_y < 0,
            bottom: want_y > self.screen_height() as i32,
        };
        if dx != 0 || dy != 0 {
            self.redraw = true;
        }

        let left_was = self.buttons_down & BUTTON_LEFT != 0;
        let left_now = packet.buttons & BUTTON_LEFT != 0;
        self.buttons_down = packet.buttons;

        let hit = self.window_at(old_x, old_y);

        if left_now && !left_was {
            self.on_left_down(hit, old_x, old_y);
        } else if left_now && (dx != 0 || dy != 0) {
            self.on_left_drag(dx, dy, clip);
        }
        if left_was && !left_now {
            self.on_left_up();
        }
        if !left_now {
            self.update_hover(hit);
        }
    }

    /// Topmost window under a point, honoring the resize grace margin
    /// (maximized windows get none).
    fn window_at(&self, x: i32, y: i32) -> Option<WindowKey> {
        self.z.iter().rev().copied().find(|&key| {
            self.win(key).map_or(false, |w| {
                if !w.show {
                    return false;
                }
                let margin = if w.tile == TileState::Maximized { 0 } else { RESIZE_GRACE };
                w.contains(x, y, margin)
            })
        })
    }

    fn on_left_down(&mut self, hit: Option<WindowKey>, x: i32, y: i32) {
        let Some(key) = hit else {
            self.pointer_state = PointerState::None;
            return;
        };
        self.set_active(Some(key));

        if let Some(button) = self.win(key).and_then(|w| w.button_at(x, y)) {
            let font = &self.font;
            if let Some(w) = self.windows.get_mut(key).and_then(|s| s.as_mut()) {
                w.buttons[button] = ButtonState::Pressed;
                w.render_frame(font);
            }
            self.pointer_state = PointerState::ButtonPress { window: key, button };
            self.redraw = true;
            return;
        }

        let on_title = self.win(key).map(|w| w.on_title_bar(x, y)) == Some(true);
        if self.mods.lalt || on_title {
            if on_title {
                let now = Instant::now();
                let double = self
                    .win(key)
                    .and_then(|w| w.last_title_press)
                    .map(|prev| now.duration_since(prev) <= Duration::from_millis(DOUBLE_CLICK_MS))
                    .unwrap_or(false);
                if double {
                    if let Some(w) = self.win_mut(key) {
                        w.last_title_press = None;
                    }
                    self.toggle_maximize(key);
                    self.pointer_state = PointerState::Ignore;
                    return;
                }
                if let Some(w) = self.win_mut(key) {
                    w.last_title_press = Some(now);
                }
            }
            self.pointer_state = PointerState::TitleMove { window: key };
            return;
        }

        if let Some(edge) = self.win(key).and_then(|w| w.resize_edge_at(x, y)) {
            self.pointer_state = PointerState::Resize { window: key, edge };
            self.redraw = true;
            return;
        }

        self.pointer_state = PointerState::None;
    }

    fn on_left_drag(&mut self, dx: i32, dy: i32, clip: ClipFlags) {
        match self.pointer_state {
            PointerState::TitleMove { window } => self.drag_title(window, dx, dy, clip),
            PointerState::Resize { window, edge } => {
                let (ml, mt, gw, gh) = edge.deltas(dx, dy);
                let font = &self.font;
                let Some(w) = self.windows.get_mut(window).and_then(|s| s.as_mut()) else {
                    return;
                };
                if w.drag_resize(ml, mt, gw, gh, font) {
                    let (conn, window_id) = (w.conn, w.client_id);
                    let (cw, ch) = (w.client_width(), w.client_height());
                    self.push_event(conn, Event::Resize { window_id, width: cw, height: ch });
                }
                self.redraw = true;
            }
            PointerState::ButtonPress { window, button } => {
                let over = self
                    .win(window)
                    .and_then(|w| w.button_at(self.pointer_x, self.pointer_y));
                if over != Some(button) {
                    let font = &self.font;
                    if let Some(w) = self.windows.get_mut(window).and_then(|s| s.as_mut()) {
                        w.buttons[button] = ButtonState::Normal;
                        w.render_frame(font);
                    }
                    self.pointer_state = PointerState::Ignore;
                    self.redraw = true;
                }
            }
            PointerState::Ignore | PointerState::None => {}
        }
    }

    fn drag_title(&mut self, key: WindowKey, dx: i32, dy: i32, clip: ClipFlags) {
        if clip.any() {
            // Pointer hit a screen edge: snap-tile by position. Both axes
            // clipped at once picks the quarter tile.
            let state = match (clip.left, clip.right, clip.top, clip.bottom) {
                (true, _, true, _) => TileState::TopLeft,
                (_, true, true, _) => TileState::TopRight,
                (true, _, _, true) => TileState::BottomLeft,
                (_, true, _, true) => TileState::BottomRight,
                (true, _, _, _) => TileState::Left,
                (_, true, _, _) => TileState::Right,
                (_, _, true, _) => TileState::Top,
                _ => TileState::Bottom,
            };
            let current = self.win(key).map(|w| w.tile);
            if current == Some(state) {
                return;
            }
            if current == Some(TileState::Regular) {
                if let Some(w) = self.win_mut(key) {
                    w.save_geometry();
                }
            }
            self.apply_tile(key, state);
            return;
        }

        let Some(win) = self.win(key) else { return };
        if win.tile == TileState::Regular {
            if let Some(w) = self.win_mut(key) {
                w.left += dx;
                w.top += dy;
            }
            self.redraw = true;
            return;
        }

        // Dragging a tiled window off its tile: restore, re-center under
        // the pointer, then move. Skipped while the pointer sits on an edge
        // so an edge-snap is not immediately undone.
        let on_edge = self.pointer_x == 0
            || self.pointer_x == self.screen_width() as i32
            || self.pointer_y == 0
            || self.pointer_y == self.screen_height() as i32;
        if on_edge {
            return;
        }
        self.restore_window(key);
        if let Some(w) = self.windows.get_mut(key).and_then(|s| s.as_mut()) {
            w.left = self.pointer_x - w.width() as i32 / 2;
            w.top = self.pointer_y - super::window::TITLE_HEIGHT as i32 / 2;
            w.left += dx;
            w.top += dy;
        }
        self.redraw = true;
    }

    fn on_left_up(&mut self) {
        if let PointerState::ButtonPress { window, button } = self.pointer_state {
            let over = self
                .win(window)
                .and_then(|w| w.button_at(self.pointer_x, self.pointer_y));
            let font = &self.font;
            if let Some(w) = self.windows.get_mut(window).and_then(|s| s.as_mut()) {
                w.buttons[button] = ButtonState::Normal;
                w.render_frame(font);
            }
            self.redraw = true;
            if over == Some(button) {
                match button {
                    BUTTON_MAXIMIZE => self.toggle_maximize(window),
                    BUTTON_CLOSE => self.send_quit(window),
                    // Minimize is not wired up yet.
                    _ => {}
                }
            }
        }
        if matches!(self.pointer_state, PointerState::Resize { .. }) {
            // The cursor glyph falls back to the arrow.
            self.redraw = true;
        }
        self.pointer_state = PointerState::None;
    }

    fn update_hover(&mut self, hit: Option<WindowKey>) {
        if self.hover != hit {
            if let Some(old) = self.hover {
                let font = &self.font;
                if let Some(w) = self.windows.get_mut(old).and_then(|s| s.as_mut()) {
                    if w.buttons.iter().any(|b| *b != ButtonState::Normal) {
                        w.buttons = [ButtonState::Normal; 3];
                        w.render_frame(font);
                        self.redraw = true;
                    }
                }
            }
            self.hover = hit;
        }
        let Some(key) = hit else { return };
        let (px, py) = (self.pointer_x, self.pointer_y);
        let over = self.win(key).and_then(|w| w.button_at(px, py));
        let font = &self.font;
        if let Some(w) = self.windows.get_mut(key).and_then(|s| s.as_mut()) {
            let mut changed = false;
            for (i, state) in w.buttons.iter_mut().enumerate() {
                let want = if over == Some(i) { ButtonState::Hover } else { ButtonState::Normal };
                if *state != want {
                    *state = want;
                    changed = true;
                }
            }
            if changed {
                w.render_frame(font);
                self.redraw = true;
            }
        }
    }

    // --- Mode changes and composition ---

    /// Adopt a new display mode: fresh output and wallpaper buffers, then
    /// every window re-applies its tile rule against the new size.
    pub fn reconfigure(&mut self, mode: CrtcMode) -> bool {
        if mode.view_xres == self.mode.view_xres && mode.view_yres == self.mode.view_yres {
            self.mode = mode;
            return true;
        }
        let Some(output) = Framebuffer::try_new(mode.view_xres, mode.view_yres) else {
            self.redraw = true;
            return false;
        };
        let Some(mut paper) = Framebuffer::try_new(mode.view_xres, mode.view_yres) else {
            self.redraw = true;
            return false;
        };
        wallpaper::paint(&mut paper, self.wallpaper_seed);
        self.output = output;
        self.wallpaper_fb = paper;
        self.mode = mode;
        self.pointer_x = self.pointer_x.clamp(0, mode.view_xres as i32);
        self.pointer_y = self.pointer_y.clamp(0, mode.view_yres as i32);

        for key in self.z.clone() {
            let Some(w) = self.win(key) else { continue };
            match w.tile {
                TileState::Minimized => {}
                TileState::Regular => {
                    let off_screen = w.left >= mode.view_xres as i32
                        || w.top >= mode.view_yres as i32
                        || w.left < 0
                        || w.top < 0;
                    if off_screen {
                        if let Some(w) = self.win_mut(key) {
                            w.left = 0;
                            w.top = 0;
                        }
                    }
                }
                state => self.apply_tile(key, state),
            }
        }
        self.redraw = true;
        true
    }

    /// Re-render the whole scene into the output framebuffer and clear the
    /// redraw flag. Full-screen redraw every time, by design simple.
    pub fn composite(&mut self) {
        let mut out = self.output.view_mut();
        out.copy_from(&self.wallpaper_fb.view());

        if let Some(text) = &self.announcement {
            let tw = font::text_width(text);
            let x = (self.mode.view_xres as i32 - tw as i32) / 2;
            let y = (self.mode.view_yres as i32 - FONT_HEIGHT as i32) / 2;
            self.font.render_text(&mut out, x + 1, y + 1, make_color(0, 0, 0), text);
            self.font.render_text(&mut out, x, y, make_color(0xFF, 0xFF, 0xFF), text);
            self.redraw = false;
            return;
        }

        for &key in &self.z {
            let Some(w) = self.windows.get(key).and_then(|s| s.as_ref()) else {
                continue;
            };
            if !w.show {
                continue;
            }
            let src_x = (-w.left).max(0) as u32;
            let src_y = (-w.top).max(0) as u32;
            let dst_x = w.left.max(0) as u32;
            let dst_y = w.top.max(0) as u32;
            let src = w.frame().view().crop(src_x, src_y, u32::MAX, u32::MAX);
            let mut dst = out.reborrow().crop(dst_x, dst_y, u32::MAX, u32::MAX);
            dst.blend_from(&src);
        }

        let sprite = match self.pointer_state {
            PointerState::Resize { edge, .. } => match edge {
                ResizeEdge::Top | ResizeEdge::Bottom => &cursor::RESIZE_NS,
                ResizeEdge::Left | ResizeEdge::Right => &cursor::RESIZE_EW,
                ResizeEdge::TopLeft | ResizeEdge::BottomRight => &cursor::RESIZE_NWSE,
                ResizeEdge::TopRight | ResizeEdge::BottomLeft => &cursor::RESIZE_NESW,
            },
            _ => &cursor::ARROW,
        };
        sprite.draw(&mut out, self.pointer_x, self.pointer_y);
        self.redraw = false;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClipFlags {
    left: bool,
    right: bool,
    top: bool,
    bottom: bool,
}

impl ClipFlags {
    fn any(&self) -> bool {
        self.left || self.right || self.top || self.bottom
    }
}

/// Announcement text for a requested exit. The power-management codes map
/// directly; anything else depends on whether we run under a login session.
fn exit_announcement(code: i32) -> &'static str {
    match code {
        0 => "Powering off...",
        1 => "Rebooting...",
        2 => "Halting...",
        3 => "Reinitializing...",
        _ => {
            if std::env::var_os("DISPLAY_SESSION").map(|v| v == "login") == Some(true) {
                "Logging out..."
            } else {
                "Exiting..."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::font::test_font;
    use crate::input::mouse::Packet;

    fn display() -> Display {
        let mode = CrtcMode { view_xres: 1024, view_yres: 768, fb_format: 32 };
        Display::new(mode, test_font(), 42, "terminal".into()).expect("display")
    }

    fn drain(d: &mut Display) -> Vec<(ConnId, Event)> {
        let mut events = Vec::new();
        while let Some(e) = d.pop_event() {
            events.push(e);
        }
        events
    }

    fn press(d: &mut Display) {
        d.on_pointer_packet(Packet { buttons: BUTTON_LEFT, dx: 0, dy: 0 });
    }

    fn release(d: &mut Display) {
        d.on_pointer_packet(Packet { buttons: 0, dx: 0, dy: 0 });
    }

    #[test]
    fn create_render_destroy_round_trip() {
        let mut d = display();
        let key = d.create_window(1, 7).expect("window");
        let events = drain(&mut d);
        assert!(matches!(
            events[..],
            [(1, Event::Resize { window_id: 7, width: 0, height: 0 })]
        ));

        d.resize_window(key, 100, 50);
        let events = drain(&mut d);
        assert!(matches!(
            events[..],
            [(1, Event::Resize { window_id: 7, width: 100, height: 50 })]
        ));

        let red = vec![[0u8, 0, 0xFF, 0xFF]; 100 * 50].concat();
        d.render_window(key, 0, 0, 100, 50, &red);
        d.composite();
        let red_px = make_color(0xFF, 0, 0);
        assert!(d.output().pixels().contains(&red_px));

        d.destroy_window(key);
        assert!(d.z.is_empty());
        assert!(d.active.is_none());
        assert!(drain(&mut d).is_empty());
    }

    #[test]
    fn alt_tab_cycles_and_clears_held_keys() {
        let mut d = display();
        let a = d.create_window(1, 1).expect("window");
        let b = d.create_window(2, 1).expect("window");
        drain(&mut d);
        assert_eq!(d.active, Some(a));
        assert_eq!(d.top(), Some(b));

        d.on_keyboard_unit(keyboard::encode_key(keys::LALT));
        d.on_keyboard_unit(keyboard::encode_key(keys::TAB));
        d.on_keyboard_unit(keyboard::encode_key(-keys::TAB));
        assert_eq!(d.tab_candidate, Some(b));
        assert_eq!(d.active, Some(a), "preview must not move focus");
        d.on_keyboard_unit(keyboard::encode_key(-keys::LALT));

        assert_eq!(d.active, Some(b));
        assert_eq!(d.top(), Some(b));
        assert_eq!(d.tab_candidate, None);
        assert_eq!(d.win(a).expect("a").held_key_count(), 0);

        let events = drain(&mut d);
        // Alt-down went to A; the focus handoff synthesized its release.
        let synthesized = keyboard::encode_key(-keys::LALT);
        assert!(events
            .iter()
            .any(|(conn, e)| *conn == 1
                && matches!(e, Event::Keyboard { unit, .. } if *unit == synthesized)));
        // The real alt release lands on B.
        assert!(events
            .iter()
            .any(|(conn, e)| *conn == 2 && matches!(e, Event::Keyboard { .. })));
    }

    #[test]
    fn focus_handoff_synthesizes_one_release_per_held_key() {
        let mut d = display();
        let a = d.create_window(1, 1).expect("window");
        let _b = d.create_window(2, 2).expect("window");
        drain(&mut d);
        assert_eq!(d.active, Some(a));
        d.on_keyboard_unit(keyboard::encode_key(keys::T));
        d.on_keyboard_unit(keyboard::encode_key(keys::ENTER));
        drain(&mut d);
        assert_eq!(d.win(a).expect("a").held_key_count(), 2);

        d.set_active(None);
        let events = drain(&mut d);
        let ups: Vec<_> = events
            .iter()
            .filter(|(conn, e)| {
                *conn == 1 && matches!(e, Event::Keyboard { unit, .. } if keyboard::decode_key(*unit) < 0)
            })
            .collect();
        assert_eq!(ups.len(), 2);
        assert_eq!(d.win(a).expect("a").held_key_count(), 0);
    }

    #[test]
    fn double_click_on_title_maximizes() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        if let Some(w) = d.win_mut(key) {
            w.left = 100;
            w.top = 100;
        }
        d.resize_window(key, 398, 271);
        drain(&mut d);

        d.pointer_x = 150;
        d.pointer_y = 105;
        press(&mut d);
        release(&mut d);
        press(&mut d);
        release(&mut d);

        let w = d.win(key).expect("window");
        assert_eq!(w.tile, TileState::Maximized);
        assert_eq!((w.left, w.top), (0, 0));
        assert_eq!((w.width(), w.height()), (1024, 768));
        assert_eq!(w.saved_geometry(), (100, 100, 400, 300));
    }

    #[test]
    fn stale_double_click_does_not_maximize() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        d.resize_window(key, 100, 100);
        drain(&mut d);
        d.pointer_x = 20;
        d.pointer_y = 10;
        press(&mut d);
        release(&mut d);
        if let Some(w) = d.win_mut(key) {
            w.last_title_press = Some(Instant::now() - Duration::from_millis(DOUBLE_CLICK_MS + 100));
        }
        press(&mut d);
        release(&mut d);
        assert_eq!(d.win(key).expect("window").tile, TileState::Regular);
    }

    #[test]
    fn title_drag_to_left_edge_snaps_half_tile() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        if let Some(w) = d.win_mut(key) {
            w.left = 200;
            w.top = 200;
        }
        d.resize_window(key, 300, 200);
        drain(&mut d);

        d.pointer_x = 250;
        d.pointer_y = 210;
        press(&mut d);
        // Drag hard left; the pointer clips at x = 0.
        d.on_pointer_packet(Packet { buttons: BUTTON_LEFT, dx: -100, dy: 0 });
        d.on_pointer_packet(Packet { buttons: BUTTON_LEFT, dx: -100, dy: 0 });
        release(&mut d);

        let w = d.win(key).expect("window");
        assert_eq!(w.tile, TileState::Left);
        assert_eq!((w.left, w.top), (0, 0));
        assert_eq!((w.width(), w.height()), (512, 768));
        // The first drag packet moved the window before the snap saved it.
        assert_eq!(w.saved_geometry(), (0, 200, 302, 229));
    }

    #[test]
    fn corner_drag_snaps_quarter_tile() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        if let Some(w) = d.win_mut(key) {
            w.left = 200;
            w.top = 200;
        }
        d.resize_window(key, 300, 200);
        drain(&mut d);
        d.pointer_x = 250;
        d.pointer_y = 210;
        press(&mut d);
        d.on_pointer_packet(Packet { buttons: BUTTON_LEFT, dx: -255, dy: -255 });
        d.on_pointer_packet(Packet { buttons: BUTTON_LEFT, dx: -255, dy: -255 });
        release(&mut d);
        assert_eq!(d.win(key).expect("window").tile, TileState::TopLeft);
    }

    #[test]
    fn close_button_sends_quit_but_keeps_window() {
        let mut d = display();
        let key = d.create_window(1, 9).expect("window");
        d.resize_window(key, 200, 100);
        drain(&mut d);
        let (bx, by, _, _) = d.win(key).expect("window").button_rect(BUTTON_CLOSE);
        d.pointer_x = bx + 2;
        d.pointer_y = by + 2;
        press(&mut d);
        assert!(matches!(d.pointer_state, PointerState::ButtonPress { .. }));
        release(&mut d);
        let events = drain(&mut d);
        assert!(events
            .iter()
            .any(|(conn, e)| *conn == 1 && matches!(e, Event::Quit { window_id: 9 })));
        assert!(d.win(key).is_some(), "quit must not destroy the window");
    }

    #[test]
    fn leaving_pressed_button_cancels_the_click() {
        let mut d = display();
        let key = d.create_window(1, 9).expect("window");
        d.resize_window(key, 200, 100);
        drain(&mut d);
        let (bx, by, _, _) = d.win(key).expect("window").button_rect(BUTTON_CLOSE);
        d.pointer_x = bx + 2;
        d.pointer_y = by + 2;
        press(&mut d);
        d.on_pointer_packet(Packet { buttons: BUTTON_LEFT, dx: 0, dy: 60 });
        assert_eq!(d.pointer_state, PointerState::Ignore);
        release(&mut d);
        assert!(drain(&mut d)
            .iter()
            .all(|(_, e)| !matches!(e, Event::Quit { .. })));
    }

    #[test]
    fn maximize_restore_round_trip_each_direction() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        if let Some(w) = d.win_mut(key) {
            w.left = 50;
            w.top = 60;
        }
        d.resize_window(key, 200, 100);
        drain(&mut d);
        let before = {
            let w = d.win(key).expect("window");
            (w.left, w.top, w.width(), w.height())
        };
        for tkey in [TileKey::Left, TileKey::Right, TileKey::Up, TileKey::Down] {
            d.tile_transition(key, tkey);
            assert!(d.win(key).expect("window").tile.is_tiled());
            let reverse = match tkey {
                TileKey::Left => TileKey::Right,
                TileKey::Right => TileKey::Left,
                TileKey::Up => TileKey::Down,
                TileKey::Down => TileKey::Up,
            };
            d.tile_transition(key, reverse);
            let w = d.win(key).expect("window");
            assert_eq!(w.tile, TileState::Regular);
            assert_eq!((w.left, w.top, w.width(), w.height()), before);
        }
    }

    #[test]
    fn resolution_change_retiles_windows() {
        let mut d = display();
        let tiled = d.create_window(1, 1).expect("window");
        let regular = d.create_window(1, 2).expect("window");
        d.resize_window(tiled, 100, 100);
        d.resize_window(regular, 50, 50);
        if let Some(w) = d.win_mut(tiled) {
            w.save_geometry();
        }
        d.apply_tile(tiled, TileState::Right);
        if let Some(w) = d.win_mut(regular) {
            w.left = 2000;
            w.top = 10;
        }
        drain(&mut d);

        assert!(d.reconfigure(CrtcMode { view_xres: 800, view_yres: 600, fb_format: 32 }));
        let w = d.win(tiled).expect("window");
        assert_eq!(w.tile, TileState::Right);
        assert_eq!((w.left, w.width()), (400, 400));
        let r = d.win(regular).expect("window");
        assert_eq!((r.left, r.top), (0, 0));
    }

    #[test]
    fn composite_is_deterministic() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        d.resize_window(key, 120, 80);
        d.render_window(key, 0, 0, 2, 2, &[0x7F; 16]);
        d.composite();
        let first = d.output().clone();
        d.schedule_redraw();
        d.composite();
        assert_eq!(d.output(), &first);
    }

    #[test]
    fn announcement_replaces_scene() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        d.resize_window(key, 120, 80);
        d.request_exit(1);
        assert!(!d.running());
        assert_eq!(d.exit_code(), 1);
        d.composite();
        // White announcement glyphs are present.
        assert!(d.output().pixels().contains(&make_color(0xFF, 0xFF, 0xFF)));
    }

    #[test]
    fn grab_swallows_shortcuts_until_f12() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        d.resize_window(key, 100, 100);
        drain(&mut d);
        d.on_keyboard_unit(keyboard::encode_key(keys::F11));
        let w = d.win(key).expect("window");
        assert!(w.grab_input);
        assert!(w.title.ends_with(INPUT_GRAB_SUFFIX));

        // Alt+F4 is forwarded instead of closing the window.
        d.on_keyboard_unit(keyboard::encode_key(keys::LALT));
        d.on_keyboard_unit(keyboard::encode_key(keys::F4));
        let events = drain(&mut d);
        assert!(events.iter().all(|(_, e)| !matches!(e, Event::Quit { .. })));
        assert_eq!(events.len(), 2);

        d.on_keyboard_unit(keyboard::encode_key(keys::F12));
        let w = d.win(key).expect("window");
        assert!(!w.grab_input);
        assert!(!w.title.ends_with(INPUT_GRAB_SUFFIX));
    }

    #[test]
    fn destroying_candidate_migrates_it() {
        let mut d = display();
        let a = d.create_window(1, 1).expect("window");
        let b = d.create_window(1, 2).expect("window");
        let c = d.create_window(1, 3).expect("window");
        drain(&mut d);
        // z = [a, b, c]; candidate walks a -> c (below wraps to top).
        d.tab_candidate = Some(b);
        d.destroy_window(b);
        assert_eq!(d.tab_candidate, Some(a));
        d.tab_candidate = Some(a);
        d.destroy_window(a);
        assert_eq!(d.tab_candidate, Some(c));
        d.tab_candidate = Some(c);
        d.destroy_window(c);
        assert_eq!(d.tab_candidate, None);
    }

    #[test]
    fn pointer_clamps_inclusive() {
        let mut d = display();
        d.on_pointer_packet(Packet { buttons: 0, dx: 5000, dy: 5000 });
        assert_eq!((d.pointer_x, d.pointer_y), (1024, 768));
        d.on_pointer_packet(Packet { buttons: 0, dx: -9000, dy: -9000 });
        assert_eq!((d.pointer_x, d.pointer_y), (0, 0));
    }

    #[test]
    fn hidden_windows_are_not_hit() {
        let mut d = display();
        let key = d.create_window(1, 1).expect("window");
        if let Some(w) = d.win_mut(key) {
            w.left = 0;
            w.top = 0;
        }
        d.resize_window(key, 200, 200);
        assert_eq!(d.window_at(50, 50), Some(key));
        d.show_window(key, false);
        assert_eq!(d.window_at(50, 50), None);
    }
}
