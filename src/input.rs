use std::sync::Arc;

use crossterm::event::{
    Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton,
    MouseEvent, MouseEventKind,
};
use ratatui::layout::Position;
use ratatui::prelude::Rect;

use crate::animation::{self, AnimationKind, FAST_DURATION};
use crate::clipboard;
use crate::config::{parse_key, Config};
use crate::copy_mode::{CopyMode, CopyOutcome};
use crate::layout;
use crate::types::{
    Action, App, Bind, Corner, DragState, Mode, Overlay, PrefixState, ResizeState, Severity,
    SnapTarget, SubPrefix, DRAG_SWAP_THRESHOLD,
};
use crate::workspace;

// ─── Keybinding registry ────────────────────────────────────────────────────

/// Window-management-mode defaults. `H J K L` swap slots under tiling
/// and resize under floating; everything else is mode-independent.
pub fn default_binds(config: &Config) -> Vec<Bind> {
    let mut binds = Vec::new();
    let mut bind = |code: KeyCode, mods: KeyModifiers, action: Action| {
        binds.push(Bind { code, mods, action });
    };
    let none = KeyModifiers::NONE;
    let shift = KeyModifiers::SHIFT;
    let ctrl = KeyModifiers::CONTROL;

    bind(KeyCode::Char('i'), none, Action::EnterTerminal);
    bind(KeyCode::Enter, none, Action::EnterTerminal);
    bind(KeyCode::Char('n'), none, Action::NewWindow);
    bind(KeyCode::Char('x'), none, Action::CloseWindow);
    bind(KeyCode::Tab, none, Action::FocusNext);
    bind(KeyCode::BackTab, shift, Action::FocusPrev);
    bind(KeyCode::Char('h'), none, Action::MoveLeft);
    bind(KeyCode::Char('j'), none, Action::MoveDown);
    bind(KeyCode::Char('k'), none, Action::MoveUp);
    bind(KeyCode::Char('l'), none, Action::MoveRight);
    bind(KeyCode::Left, none, Action::MoveLeft);
    bind(KeyCode::Down, none, Action::MoveDown);
    bind(KeyCode::Up, none, Action::MoveUp);
    bind(KeyCode::Right, none, Action::MoveRight);
    bind(KeyCode::Char('H'), shift, Action::SwapLeft);
    bind(KeyCode::Char('J'), shift, Action::SwapDown);
    bind(KeyCode::Char('K'), shift, Action::SwapUp);
    bind(KeyCode::Char('L'), shift, Action::SwapRight);
    bind(KeyCode::Char('m'), none, Action::Minimize);
    bind(KeyCode::Char('f'), none, Action::Snap(SnapTarget::Fullscreen));
    bind(KeyCode::Char('['), none, Action::Snap(SnapTarget::Left));
    bind(KeyCode::Char(']'), none, Action::Snap(SnapTarget::Right));
    bind(KeyCode::Char('u'), none, Action::Snap(SnapTarget::Unsnap));
    bind(KeyCode::Char('y'), ctrl, Action::Snap(SnapTarget::TopLeft));
    bind(KeyCode::Char('u'), ctrl, Action::Snap(SnapTarget::TopRight));
    bind(KeyCode::Char('b'), ctrl, Action::Snap(SnapTarget::BottomLeft));
    bind(KeyCode::Char('n'), ctrl, Action::Snap(SnapTarget::BottomRight));
    bind(KeyCode::Char('t'), none, Action::ToggleTiling);
    bind(KeyCode::Char(','), none, Action::ResizeMasterShrink);
    bind(KeyCode::Char('.'), none, Action::ResizeMasterGrow);
    bind(KeyCode::Char('r'), none, Action::Rename);
    bind(KeyCode::Char('?'), shift, Action::ToggleHelp);
    bind(KeyCode::Char('?'), none, Action::ToggleHelp);
    bind(KeyCode::Char('l'), ctrl, Action::ToggleLogs);
    bind(KeyCode::Char('k'), ctrl, Action::ToggleCacheStats);
    bind(KeyCode::Char('q'), ctrl, Action::Quit);
    for d in 1..=9u8 {
        bind(KeyCode::Char((b'0' + d) as char), none, Action::SwitchWorkspace(d));
    }
    for (sym, d) in "!@#$%^&*(".chars().zip(1..=9u8) {
        bind(KeyCode::Char(sym), shift, Action::MoveToWorkspace(d));
        bind(KeyCode::Char(sym), none, Action::MoveToWorkspace(d));
    }

    for (name, spec) in &config.keybind_overrides {
        let Some(action) = action_by_name(name) else {
            log::warn!("ignoring keybinding for unknown action {name:?}");
            continue;
        };
        let Some((code, mods)) = parse_key(spec) else {
            log::warn!("ignoring unparseable key {spec:?} for action {name:?}");
            continue;
        };
        // Drop any default chord for the action, then the new chord's old
        // owner, so the override fully replaces both.
        binds.retain(|b| b.action != action && !(b.code == code && b.mods == mods));
        binds.push(Bind { code, mods, action });
    }
    binds
}

pub fn action_by_name(name: &str) -> Option<Action> {
    let a = match name {
        "enter-terminal" => Action::EnterTerminal,
        "new-window" => Action::NewWindow,
        "close-window" => Action::CloseWindow,
        "focus-next" => Action::FocusNext,
        "focus-prev" => Action::FocusPrev,
        "move-left" => Action::MoveLeft,
        "move-right" => Action::MoveRight,
        "move-up" => Action::MoveUp,
        "move-down" => Action::MoveDown,
        "grow-width" => Action::GrowWidth,
        "shrink-width" => Action::ShrinkWidth,
        "grow-height" => Action::GrowHeight,
        "shrink-height" => Action::ShrinkHeight,
        "swap-left" => Action::SwapLeft,
        "swap-right" => Action::SwapRight,
        "swap-up" => Action::SwapUp,
        "swap-down" => Action::SwapDown,
        "snap-fullscreen" => Action::Snap(SnapTarget::Fullscreen),
        "snap-left" => Action::Snap(SnapTarget::Left),
        "snap-right" => Action::Snap(SnapTarget::Right),
        "snap-top-left" => Action::Snap(SnapTarget::TopLeft),
        "snap-top-right" => Action::Snap(SnapTarget::TopRight),
        "snap-bottom-left" => Action::Snap(SnapTarget::BottomLeft),
        "snap-bottom-right" => Action::Snap(SnapTarget::BottomRight),
        "unsnap" => Action::Snap(SnapTarget::Unsnap),
        "minimize" => Action::Minimize,
        "restore-all" => Action::RestoreAll,
        "toggle-tiling" => Action::ToggleTiling,
        "resize-master-grow" => Action::ResizeMasterGrow,
        "resize-master-shrink" => Action::ResizeMasterShrink,
        "rename" => Action::Rename,
        "toggle-help" => Action::ToggleHelp,
        "toggle-logs" => Action::ToggleLogs,
        "toggle-cache-stats" => Action::ToggleCacheStats,
        "quit" => Action::Quit,
        _ => return None,
    };
    Some(a)
}

// ─── Event entry points ─────────────────────────────────────────────────────

pub fn handle_event(app: &mut App, event: CrosstermEvent) {
    match event {
        CrosstermEvent::Key(key) if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) => {
            app.record_key(format_key(key.code, key.modifiers));
            handle_key(app, key);
        }
        CrosstermEvent::Mouse(me) => handle_mouse(app, me),
        CrosstermEvent::Resize(w, h) => workspace::screen_resized(app, w, h),
        CrosstermEvent::Paste(text) => {
            if app.mode == Mode::Terminal {
                send_paste(app, &text);
            }
        }
        _ => {}
    }
}

pub fn handle_key(app: &mut App, key: KeyEvent) {
    app.ui_dirty = true;

    // The rename prompt swallows everything.
    if app.rename.is_some() {
        match key.code {
            KeyCode::Esc => app.rename = None,
            KeyCode::Enter => workspace::commit_rename(app),
            KeyCode::Backspace => {
                if let Some(r) = app.rename.as_mut() {
                    r.buffer.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(r) = app.rename.as_mut() {
                    r.buffer.push(c);
                }
            }
            _ => {}
        }
        return;
    }

    // Overlays are modal: Esc or q dismisses, everything else is inert.
    if app.overlay != Overlay::None {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?')) {
            app.overlay = Overlay::None;
        }
        return;
    }

    // An active copy mode owns the keyboard for its window.
    if let Some(idx) = app.focused_index() {
        if app.windows[idx].copy_mode.is_some() {
            copy_mode_key(app, idx, key);
            return;
        }
    }

    match app.mode {
        Mode::Terminal => terminal_key(app, key),
        Mode::WindowManagement => management_key(app, key),
    }
}

fn management_key(app: &mut App, key: KeyEvent) {
    let found = app
        .binds
        .iter()
        .find(|b| b.code == key.code && b.mods == key.modifiers)
        .map(|b| b.action);
    if let Some(action) = found {
        handle_action(app, action);
    }
}

fn terminal_key(app: &mut App, key: KeyEvent) {
    // Prefix protocol. An expired prefix means the key is fresh.
    if let Some(prefix) = &app.prefix {
        if prefix.expired() {
            app.prefix = None;
        } else {
            prefix_key(app, key);
            return;
        }
    }

    if (key.code, key.modifiers & !KeyModifiers::SHIFT) == app.config.prefix {
        app.prefix = Some(PrefixState::new());
        return;
    }

    if app.focused_index().is_none() {
        app.mode = Mode::WindowManagement;
        return;
    }

    // Paste intents are intercepted, never forwarded as ^V.
    if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('v' | 'V')) {
        paste_from_host(app);
        return;
    }

    if let Some(bytes) = encode_key(key.code, key.modifiers) {
        forward_to_focused(app, &bytes);
    }
}

fn prefix_key(app: &mut App, key: KeyEvent) {
    let sub = app.prefix.as_ref().and_then(|p| p.sub);
    match sub {
        None => prefix_root_key(app, key),
        Some(SubPrefix::Window) => {
            app.prefix = None;
            match key.code {
                KeyCode::Char('c') => {
                    if let Err(e) = workspace::add_window(app, None) {
                        app.notify(Severity::Error, format!("new window failed: {e}"));
                    }
                }
                KeyCode::Char('x') => workspace::close_focused(app),
                KeyCode::Char('r') => workspace::begin_rename(app),
                KeyCode::Char('n') => workspace::cycle_focus(app, true),
                KeyCode::Char('p') => workspace::cycle_focus(app, false),
                KeyCode::Char('t') => workspace::toggle_tiling(app),
                _ => {}
            }
        }
        Some(SubPrefix::Workspace) => {
            app.prefix = None;
            match key.code {
                KeyCode::Char(d @ '1'..='9') => {
                    workspace::switch_workspace(app, d as u8 - b'0');
                }
                KeyCode::Char(sym) => {
                    if let Some(pos) = "!@#$%^&*(".find(sym) {
                        workspace::move_focused_to_workspace(app, pos as u8 + 1);
                    }
                }
                _ => {}
            }
        }
        Some(SubPrefix::Minimize) => {
            app.prefix = None;
            match key.code {
                KeyCode::Char('m') => workspace::minimize_focused(app),
                KeyCode::Char('a') => workspace::restore_all(app),
                KeyCode::Char(d @ '1'..='9') => {
                    workspace::restore_by_slot(app, (d as u8 - b'1') as usize);
                }
                _ => {}
            }
        }
        Some(SubPrefix::Debug) => {
            app.prefix = None;
            match key.code {
                KeyCode::Char('l') => toggle_overlay(app, Overlay::Logs),
                KeyCode::Char('c') => toggle_overlay(app, Overlay::CacheStats),
                _ => {}
            }
        }
    }
}

fn prefix_root_key(app: &mut App, key: KeyEvent) {
    // Leader twice sends one literal leader byte through.
    if (key.code, key.modifiers & !KeyModifiers::SHIFT) == app.config.prefix {
        app.prefix = None;
        if let Some(bytes) = encode_key(key.code, key.modifiers) {
            forward_to_focused(app, &bytes);
        }
        return;
    }
    match key.code {
        KeyCode::Char('d') | KeyCode::Esc => {
            app.prefix = None;
            app.mode = Mode::WindowManagement;
        }
        KeyCode::Char('[') => {
            app.prefix = None;
            if let Some(idx) = app.focused_index() {
                enter_copy_mode(app, idx, 0);
            }
        }
        KeyCode::Char('t') => set_sub_prefix(app, SubPrefix::Window),
        KeyCode::Char('w') => set_sub_prefix(app, SubPrefix::Workspace),
        KeyCode::Char('m') => set_sub_prefix(app, SubPrefix::Minimize),
        KeyCode::Char('D') => set_sub_prefix(app, SubPrefix::Debug),
        KeyCode::Char('?') => {
            app.prefix = None;
            toggle_overlay(app, Overlay::Help);
        }
        _ => {
            // Not a command: drop the chord without forwarding.
            app.prefix = None;
        }
    }
}

fn set_sub_prefix(app: &mut App, sub: SubPrefix) {
    if let Some(p) = app.prefix.as_mut() {
        p.sub = Some(sub);
        // The decay window restarts with the namespace.
        p.since = std::time::Instant::now();
    }
}

fn toggle_overlay(app: &mut App, overlay: Overlay) {
    app.overlay = if app.overlay == overlay { Overlay::None } else { overlay };
    app.ui_dirty = true;
}

pub fn handle_action(app: &mut App, action: Action) {
    match action {
        Action::EnterTerminal => {
            if app.focused_index().is_some() {
                app.mode = Mode::Terminal;
            }
        }
        Action::NewWindow => {
            if let Err(e) = workspace::add_window(app, None) {
                app.notify(Severity::Error, format!("new window failed: {e}"));
            }
        }
        Action::CloseWindow => workspace::close_focused(app),
        Action::FocusNext => workspace::cycle_focus(app, true),
        Action::FocusPrev => workspace::cycle_focus(app, false),
        Action::MoveLeft => workspace::move_focused_by(app, -2, 0),
        Action::MoveRight => workspace::move_focused_by(app, 2, 0),
        Action::MoveUp => workspace::move_focused_by(app, 0, -1),
        Action::MoveDown => workspace::move_focused_by(app, 0, 1),
        Action::GrowWidth => workspace::resize_focused_by(app, 2, 0),
        Action::ShrinkWidth => workspace::resize_focused_by(app, -2, 0),
        Action::GrowHeight => workspace::resize_focused_by(app, 0, 1),
        Action::ShrinkHeight => workspace::resize_focused_by(app, 0, -1),
        // Under tiling these swap slots; under floating they resize.
        Action::SwapLeft => {
            if app.tiling_enabled() {
                workspace::swap_focused(app, -1, 0);
            } else {
                workspace::resize_focused_by(app, -2, 0);
            }
        }
        Action::SwapRight => {
            if app.tiling_enabled() {
                workspace::swap_focused(app, 1, 0);
            } else {
                workspace::resize_focused_by(app, 2, 0);
            }
        }
        Action::SwapUp => {
            if app.tiling_enabled() {
                workspace::swap_focused(app, 0, -1);
            } else {
                workspace::resize_focused_by(app, 0, -1);
            }
        }
        Action::SwapDown => {
            if app.tiling_enabled() {
                workspace::swap_focused(app, 0, 1);
            } else {
                workspace::resize_focused_by(app, 0, 1);
            }
        }
        Action::Snap(target) => workspace::snap_focused(app, target),
        Action::Minimize => workspace::minimize_focused(app),
        Action::RestoreAll => workspace::restore_all(app),
        Action::ToggleTiling => workspace::toggle_tiling(app),
        Action::ResizeMasterGrow => workspace::resize_master(app, layout::MASTER_RATIO_STEP),
        Action::ResizeMasterShrink => workspace::resize_master(app, -layout::MASTER_RATIO_STEP),
        Action::Rename => workspace::begin_rename(app),
        Action::SwitchWorkspace(n) => workspace::switch_workspace(app, n),
        Action::MoveToWorkspace(n) => workspace::move_focused_to_workspace(app, n),
        Action::ToggleHelp => toggle_overlay(app, Overlay::Help),
        Action::ToggleLogs => toggle_overlay(app, Overlay::Logs),
        Action::ToggleCacheStats => toggle_overlay(app, Overlay::CacheStats),
        Action::Quit => app.quit = true,
    }
}

// ─── Copy mode plumbing ─────────────────────────────────────────────────────

pub fn enter_copy_mode(app: &mut App, idx: usize, scroll_up: usize) {
    workspace::focus_window(app, idx);
    app.mode = Mode::Terminal;
    let w = &mut app.windows[idx];
    if w.copy_mode.is_some() {
        return;
    }
    let term = Arc::clone(&w.term);
    let Ok(mut parser) = term.lock() else { return };
    let mut cm = CopyMode::new(&parser);
    if scroll_up > 0 {
        cm.scroll(&mut parser, scroll_up as isize);
    }
    w.copy_mode = Some(cm);
    app.ui_dirty = true;
}

pub fn exit_copy_mode(app: &mut App, idx: usize) {
    if let Some(w) = app.windows.get_mut(idx) {
        w.copy_mode = None;
    }
    app.ui_dirty = true;
}

fn copy_mode_key(app: &mut App, idx: usize, key: KeyEvent) {
    let term = Arc::clone(&app.windows[idx].term);
    let seq = app.windows[idx].sequence();
    let Ok(mut parser) = term.lock() else { return };
    let outcome = match app.windows[idx].copy_mode.as_mut() {
        Some(cm) => cm.handle_key(&mut parser, seq, key),
        None => return,
    };
    drop(parser);
    match outcome {
        CopyOutcome::Exit => exit_copy_mode(app, idx),
        CopyOutcome::Yank(text) => {
            let chars = text.chars().count();
            if clipboard::set(&text) {
                app.notify(Severity::Success, format!("copied {chars} characters"));
            } else {
                app.notify(Severity::Warning, "clipboard unavailable");
            }
        }
        CopyOutcome::SearchSaturated => {
            app.notify(Severity::Warning, format!("search stopped at {} matches", crate::search::MATCH_CAP));
        }
        CopyOutcome::None => {}
    }
}

// ─── PTY forwarding ─────────────────────────────────────────────────────────

fn forward_to_focused(app: &mut App, bytes: &[u8]) {
    let Some(idx) = app.focused_index() else { return };
    if let Err(e) = app.windows[idx].send_input(bytes) {
        // The write side is gone: surface it and stop treating the window
        // as an input sink.
        app.notify(Severity::Error, format!("write to terminal failed: {e}"));
        app.mode = Mode::WindowManagement;
    }
}

fn paste_from_host(app: &mut App) {
    let text = clipboard::get().or_else(|| app.clipboard_cache.clone());
    let Some(text) = text else {
        app.notify(Severity::Warning, "clipboard unavailable");
        return;
    };
    app.clipboard_cache = Some(text.clone());
    send_paste(app, &text);
}

fn send_paste(app: &mut App, text: &str) {
    let Some(idx) = app.focused_index() else { return };
    let bracketed = app.windows[idx]
        .term
        .lock()
        .map(|p| p.screen().bracketed_paste())
        .unwrap_or(false);
    let mut bytes = Vec::with_capacity(text.len() + 12);
    if bracketed {
        bytes.extend_from_slice(b"\x1b[200~");
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(b"\x1b[201~");
    } else {
        bytes.extend_from_slice(text.as_bytes());
    }
    forward_to_focused(app, &bytes);
}

// ─── Key encoding (terminal mode → PTY bytes) ───────────────────────────────

fn modifier_param(mods: KeyModifiers) -> u8 {
    let mut m = 1;
    if mods.contains(KeyModifiers::SHIFT) {
        m += 1;
    }
    if mods.contains(KeyModifiers::ALT) {
        m += 2;
    }
    if mods.contains(KeyModifiers::CONTROL) {
        m += 4;
    }
    m
}

fn csi_special(base: char, mods: KeyModifiers) -> Vec<u8> {
    if mods.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT | KeyModifiers::CONTROL) {
        format!("\x1b[1;{}{}", modifier_param(mods), base).into_bytes()
    } else {
        format!("\x1b[{base}").into_bytes()
    }
}

fn csi_tilde(num: u8, mods: KeyModifiers) -> Vec<u8> {
    if mods.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT | KeyModifiers::CONTROL) {
        format!("\x1b[{};{}~", num, modifier_param(mods)).into_bytes()
    } else {
        format!("\x1b[{num}~").into_bytes()
    }
}

/// Translate a decoded key into the byte sequence an xterm-compatible
/// terminal would produce.
pub fn encode_key(code: KeyCode, mods: KeyModifiers) -> Option<Vec<u8>> {
    let ctrl = mods.contains(KeyModifiers::CONTROL);
    let alt = mods.contains(KeyModifiers::ALT);
    match code {
        KeyCode::Char(c) => {
            let mut out = Vec::new();
            if alt {
                out.push(0x1b);
            }
            if ctrl {
                match c.to_ascii_lowercase() {
                    lc @ 'a'..='z' => out.push(lc as u8 - b'a' + 1),
                    ' ' | '@' => out.push(0),
                    '[' => out.push(0x1b),
                    '\\' => out.push(0x1c),
                    ']' => out.push(0x1d),
                    '^' => out.push(0x1e),
                    '_' | '/' => out.push(0x1f),
                    _ => {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    }
                }
            } else {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            Some(out)
        }
        KeyCode::Enter => Some(if alt { vec![0x1b, b'\r'] } else { vec![b'\r'] }),
        KeyCode::Tab => Some(vec![b'\t']),
        KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),
        KeyCode::Backspace => Some(if alt { vec![0x1b, 0x7f] } else { vec![0x7f] }),
        KeyCode::Esc => Some(vec![0x1b]),
        KeyCode::Up => Some(csi_special('A', mods)),
        KeyCode::Down => Some(csi_special('B', mods)),
        KeyCode::Right => Some(csi_special('C', mods)),
        KeyCode::Left => Some(csi_special('D', mods)),
        KeyCode::Home => Some(csi_special('H', mods)),
        KeyCode::End => Some(csi_special('F', mods)),
        KeyCode::Insert => Some(csi_tilde(2, mods)),
        KeyCode::Delete => Some(csi_tilde(3, mods)),
        KeyCode::PageUp => Some(csi_tilde(5, mods)),
        KeyCode::PageDown => Some(csi_tilde(6, mods)),
        KeyCode::F(n @ 1..=4) => {
            if mods.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT | KeyModifiers::CONTROL) {
                let base = [b'P', b'Q', b'R', b'S'][n as usize - 1] as char;
                Some(format!("\x1b[1;{}{}", modifier_param(mods), base).into_bytes())
            } else {
                Some(vec![0x1b, b'O', [b'P', b'Q', b'R', b'S'][n as usize - 1]])
            }
        }
        KeyCode::F(n @ 5..=12) => {
            let num = [15, 17, 18, 19, 20, 21, 23, 24][n as usize - 5];
            Some(csi_tilde(num, mods))
        }
        _ => None,
    }
}

/// Short human label for the --show-keys readout.
pub fn format_key(code: KeyCode, mods: KeyModifiers) -> String {
    let mut s = String::new();
    if mods.contains(KeyModifiers::CONTROL) {
        s.push_str("C-");
    }
    if mods.contains(KeyModifiers::ALT) {
        s.push_str("M-");
    }
    match code {
        KeyCode::Char(' ') => s.push_str("Space"),
        KeyCode::Char(c) => s.push(c),
        KeyCode::Enter => s.push_str("CR"),
        KeyCode::Esc => s.push_str("Esc"),
        KeyCode::Tab => s.push_str("Tab"),
        KeyCode::BackTab => s.push_str("S-Tab"),
        KeyCode::Backspace => s.push_str("BS"),
        KeyCode::Up => s.push_str("Up"),
        KeyCode::Down => s.push_str("Down"),
        KeyCode::Left => s.push_str("Left"),
        KeyCode::Right => s.push_str("Right"),
        KeyCode::F(n) => s.push_str(&format!("F{n}")),
        other => s.push_str(&format!("{other:?}")),
    }
    s
}

// ─── Mouse ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleButton {
    Close,
    Minimize,
    Maximize,
}

/// Hit-test the title-bar buttons. Floating windows carry all three;
/// tiled windows only a close button.
pub fn button_at(rect: Rect, tiling: bool, hidden: bool, x: u16, y: u16) -> Option<TitleButton> {
    if hidden || y != rect.y || rect.width < 10 {
        return None;
    }
    let right = rect.x + rect.width;
    if x == right.wrapping_sub(3) {
        return Some(TitleButton::Close);
    }
    if tiling {
        return None;
    }
    if x == right.wrapping_sub(5) {
        return Some(TitleButton::Maximize);
    }
    if x == right.wrapping_sub(7) {
        return Some(TitleButton::Minimize);
    }
    None
}

/// Highest-Z visible window of the current workspace containing the cell.
pub fn hit_test(app: &App, x: u16, y: u16) -> Option<usize> {
    app.visible_windows(app.current_workspace)
        .into_iter()
        .filter(|&i| app.windows[i].rect().contains(Position { x, y }))
        .max_by_key(|&i| app.windows[i].z)
}

fn content_local(rect: Rect, x: u16, y: u16) -> Option<(u16, u16)> {
    let inner = Rect::new(
        rect.x + 1,
        rect.y + 1,
        rect.width.saturating_sub(2),
        rect.height.saturating_sub(2),
    );
    if inner.contains(Position { x, y }) {
        Some((x - inner.x, y - inner.y))
    } else {
        None
    }
}

/// Forward a mouse event to the PTY as SGR when the program asked for
/// mouse tracking. Coordinates are 1-based and content-local.
fn forward_mouse_sgr(app: &mut App, idx: usize, button: u8, x: u16, y: u16, press: bool) -> bool {
    let Some((lx, ly)) = content_local(app.windows[idx].rect(), x, y) else { return false };
    let tracking = app.windows[idx]
        .term
        .lock()
        .map(|p| p.screen().mouse_protocol_mode() != vt100::MouseProtocolMode::None)
        .unwrap_or(false);
    if !tracking {
        return false;
    }
    let ch = if press { 'M' } else { 'm' };
    let seq = format!("\x1b[<{};{};{}{}", button, lx + 1, ly + 1, ch);
    let _ = app.windows[idx].send_input(seq.as_bytes());
    true
}

pub fn handle_mouse(app: &mut App, me: MouseEvent) {
    let (x, y) = (me.column, me.row);
    let dock = layout::dock_row(app.screen, app.config.dockbar_top);

    match me.kind {
        MouseEventKind::Down(MouseButton::Left) if y == dock.y => {
            dock_click(app, x, y);
        }
        MouseEventKind::Down(MouseButton::Left) => {
            let Some(idx) = hit_test(app, x, y) else { return };
            // Copy-mode selection inside the focused window's content.
            if app.focused_index() == Some(idx) && app.windows[idx].copy_mode.is_some() {
                if let Some((lx, ly)) = content_local(app.windows[idx].rect(), x, y) {
                    let term = Arc::clone(&app.windows[idx].term);
                    if let Ok(mut parser) = term.lock() {
                        if let Some(cm) = app.windows[idx].copy_mode.as_mut() {
                            cm.mouse_press(&mut parser, lx, ly);
                        }
                    }
                    app.ui_dirty = true;
                    return;
                }
            }
            workspace::focus_window(app, idx);
            let rect = app.windows[idx].rect();
            let tiling = app.tiling_enabled();
            if let Some(btn) = button_at(rect, tiling, app.config.hide_window_buttons, x, y) {
                match btn {
                    TitleButton::Close => workspace::close_window(app, idx),
                    TitleButton::Minimize => workspace::minimize_window(app, idx),
                    TitleButton::Maximize => {
                        let target = if app.windows[idx].snap_state
                            == crate::types::SnapState::Fullscreen
                        {
                            SnapTarget::Unsnap
                        } else {
                            SnapTarget::Fullscreen
                        };
                        workspace::snap_focused(app, target);
                    }
                }
                return;
            }
            // In-content clicks forward to mouse-aware programs when the
            // window is the terminal input sink.
            if app.mode == Mode::Terminal
                && content_local(rect, x, y).is_some()
                && forward_mouse_sgr(app, idx, 0, x, y, true)
            {
                return;
            }
            // Anywhere else on the window: start a drag.
            if tiling {
                animation::finalize_all(app);
            }
            let rect = app.windows[idx].rect();
            app.windows[idx].being_manipulated = true;
            app.drag = Some(DragState {
                id: app.windows[idx].id,
                dx: x.saturating_sub(rect.x),
                dy: y.saturating_sub(rect.y),
                start: (x, y),
                origin: rect,
                moved: false,
            });
        }
        MouseEventKind::Down(MouseButton::Right) => {
            let Some(idx) = hit_test(app, x, y) else { return };
            if app.mode == Mode::Terminal
                && app.focused_index() == Some(idx)
                && forward_mouse_sgr(app, idx, 2, x, y, true)
            {
                return;
            }
            if app.tiling_enabled() {
                return; // geometry is owned by the layout
            }
            workspace::focus_window(app, idx);
            let rect = app.windows[idx].rect();
            let corner = nearest_corner(rect, x, y);
            app.windows[idx].being_manipulated = true;
            app.resizing = Some(ResizeState { id: app.windows[idx].id, corner, origin: rect });
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if let Some(d) = &app.drag {
                let id = d.id;
                let (dx, dy) = (d.dx, d.dy);
                let start = d.start;
                let area = app.workspace_area();
                if let Some(idx) = app.window_index(id) {
                    let mut r = app.windows[idx].rect();
                    r.x = x.saturating_sub(dx);
                    r.y = y.saturating_sub(dy);
                    let r = layout::clamp_into(r, area);
                    app.windows[idx].set_rect(r);
                    if !app.tiling_enabled() {
                        app.windows[idx].snap_state = crate::types::SnapState::None;
                    }
                }
                if let Some(d) = app.drag.as_mut() {
                    d.moved = d.moved || (x, y) != start;
                }
                app.ui_dirty = true;
                return;
            }
            if let Some(rs) = &app.resizing {
                resize_drag(app, rs.id, rs.corner, x, y);
                return;
            }
            // Copy-mode sweep.
            if let Some(idx) = app.focused_index() {
                if app.windows[idx].copy_mode.is_some() {
                    if let Some((lx, ly)) = content_local(app.windows[idx].rect(), x, y) {
                        let term = Arc::clone(&app.windows[idx].term);
                        if let Ok(mut parser) = term.lock() {
                            if let Some(cm) = app.windows[idx].copy_mode.as_mut() {
                                cm.mouse_drag(&mut parser, lx, ly);
                            }
                        }
                        app.ui_dirty = true;
                        return;
                    }
                }
                if app.mode == Mode::Terminal {
                    forward_mouse_sgr(app, idx, 32, x, y, true);
                }
            }
        }
        MouseEventKind::Up(MouseButton::Left) => {
            if let Some(d) = app.drag.take() {
                finish_drag(app, d, x, y);
                return;
            }
            if let Some(idx) = app.focused_index() {
                if app.mode == Mode::Terminal && app.windows[idx].copy_mode.is_none() {
                    forward_mouse_sgr(app, idx, 0, x, y, false);
                }
            }
        }
        MouseEventKind::Up(MouseButton::Right) => {
            if let Some(rs) = app.resizing.take() {
                if let Some(idx) = app.window_index(rs.id) {
                    app.windows[idx].being_manipulated = false;
                    app.windows[idx].resize_to_geometry();
                }
                app.ui_dirty = true;
            }
        }
        MouseEventKind::ScrollUp => {
            if let Some(idx) = app.focused_index() {
                if app.windows[idx].copy_mode.is_some() {
                    scroll_copy_mode(app, idx, 3);
                    return;
                }
            }
            let Some(idx) = hit_test(app, x, y) else { return };
            let focused = app.focused_index() == Some(idx);
            if focused && app.mode == Mode::Terminal && forward_mouse_sgr(app, idx, 64, x, y, true) {
                return;
            }
            // Wheel over a terminal that is not consuming the mouse:
            // enter copy mode, scrolled back a notch.
            enter_copy_mode(app, idx, 3);
        }
        MouseEventKind::ScrollDown => {
            if let Some(idx) = app.focused_index() {
                if app.windows[idx].copy_mode.is_some() {
                    let at_bottom = scroll_copy_mode(app, idx, -3);
                    if at_bottom {
                        exit_copy_mode(app, idx);
                    }
                    return;
                }
                if app.mode == Mode::Terminal {
                    forward_mouse_sgr(app, idx, 65, x, y, true);
                }
            }
        }
        _ => {}
    }
}

/// Scroll a window's copy mode; returns true when the view reached the
/// live screen.
fn scroll_copy_mode(app: &mut App, idx: usize, delta: isize) -> bool {
    let term = Arc::clone(&app.windows[idx].term);
    let Ok(mut parser) = term.lock() else { return false };
    let offset = match app.windows[idx].copy_mode.as_mut() {
        Some(cm) => cm.scroll(&mut parser, delta),
        None => return false,
    };
    app.ui_dirty = true;
    delta < 0 && offset == 0
}

fn nearest_corner(rect: Rect, x: u16, y: u16) -> Corner {
    let mid_x = rect.x + rect.width / 2;
    let mid_y = rect.y + rect.height / 2;
    match (x >= mid_x, y >= mid_y) {
        (false, false) => Corner::TopLeft,
        (true, false) => Corner::TopRight,
        (false, true) => Corner::BottomLeft,
        (true, true) => Corner::BottomRight,
    }
}

fn resize_drag(app: &mut App, id: u64, corner: Corner, x: u16, y: u16) {
    let area = app.workspace_area();
    let Some(idx) = app.window_index(id) else { return };
    let r = app.windows[idx].rect();
    let (x1, y1, x2, y2) = (r.x, r.y, r.x + r.width, r.y + r.height);
    let (nx1, ny1, nx2, ny2) = match corner {
        Corner::TopLeft => (x.min(x2.saturating_sub(1)), y.min(y2.saturating_sub(1)), x2, y2),
        Corner::TopRight => (x1, y.min(y2.saturating_sub(1)), x.max(x1 + 1), y2),
        Corner::BottomLeft => (x.min(x2.saturating_sub(1)), y1, x2, y.max(y1 + 1)),
        Corner::BottomRight => (x1, y1, x.max(x1 + 1), y.max(y1 + 1)),
    };
    let rect = layout::clamp_into(
        Rect::new(nx1, ny1, nx2.saturating_sub(nx1).max(1), ny2.saturating_sub(ny1).max(1)),
        area,
    );
    app.windows[idx].set_rect(rect);
    app.windows[idx].resize_to_geometry();
    app.windows[idx].snap_state = crate::types::SnapState::None;
    app.ui_dirty = true;
}

fn finish_drag(app: &mut App, d: DragState, x: u16, y: u16) {
    let Some(idx) = app.window_index(d.id) else { return };
    app.windows[idx].being_manipulated = false;
    app.ui_dirty = true;
    if !app.tiling_enabled() {
        return;
    }
    // Tiling: a long enough drop over a neighbor swaps slots; anything
    // else snaps back to the origin slot.
    let dist = x.abs_diff(d.start.0).max(y.abs_diff(d.start.1));
    let target = hit_test_excluding(app, x, y, idx);
    if dist > DRAG_SWAP_THRESHOLD {
        if let Some(other) = target {
            workspace::swap_windows(app, idx, other);
            layout::retile(app);
            return;
        }
    }
    let from = app.windows[idx].rect();
    animation::start(app, d.id, AnimationKind::Snap, from, d.origin, FAST_DURATION);
}

fn hit_test_excluding(app: &App, x: u16, y: u16, excluded: usize) -> Option<usize> {
    app.visible_windows(app.current_workspace)
        .into_iter()
        .filter(|&i| i != excluded)
        .filter(|&i| app.windows[i].rect().contains(Position { x, y }))
        .max_by_key(|&i| app.windows[i].z)
}

fn dock_click(app: &mut App, x: u16, y: u16) {
    if let Some(ws) = layout::dock_workspace_at(app.screen, app.config.dockbar_top, x, y) {
        workspace::switch_workspace(app, ws);
        return;
    }
    if let Some(slot) = layout::dock_slot_at(app.screen, app.config.dockbar_top, x, y) {
        workspace::restore_by_slot(app, slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn test_app() -> (App, mpsc::Receiver<crate::types::AppEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut app = App::new(Config::default(), tx);
        app.screen = Rect::new(0, 0, 80, 24);
        (app, rx)
    }

    fn key(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn teardown(app: &mut App) {
        while !app.windows.is_empty() {
            workspace::close_window(app, 0);
        }
    }

    #[test]
    fn arrow_and_function_key_encoding() {
        assert_eq!(encode_key(KeyCode::Up, KeyModifiers::NONE).unwrap(), b"\x1b[A");
        assert_eq!(
            encode_key(KeyCode::Up, KeyModifiers::SHIFT).unwrap(),
            b"\x1b[1;2A"
        );
        assert_eq!(
            encode_key(KeyCode::Right, KeyModifiers::CONTROL).unwrap(),
            b"\x1b[1;5C"
        );
        assert_eq!(
            encode_key(KeyCode::Left, KeyModifiers::CONTROL | KeyModifiers::SHIFT).unwrap(),
            b"\x1b[1;6D"
        );
        assert_eq!(encode_key(KeyCode::F(1), KeyModifiers::NONE).unwrap(), b"\x1bOP");
        assert_eq!(encode_key(KeyCode::F(5), KeyModifiers::NONE).unwrap(), b"\x1b[15~");
        assert_eq!(encode_key(KeyCode::F(12), KeyModifiers::NONE).unwrap(), b"\x1b[24~");
        assert_eq!(
            encode_key(KeyCode::Delete, KeyModifiers::ALT).unwrap(),
            b"\x1b[3;3~"
        );
        assert_eq!(encode_key(KeyCode::Home, KeyModifiers::NONE).unwrap(), b"\x1b[H");
        assert_eq!(encode_key(KeyCode::End, KeyModifiers::NONE).unwrap(), b"\x1b[F");
    }

    #[test]
    fn control_and_alt_characters_encode() {
        assert_eq!(encode_key(KeyCode::Char('c'), KeyModifiers::CONTROL).unwrap(), vec![3]);
        assert_eq!(encode_key(KeyCode::Char('a'), KeyModifiers::ALT).unwrap(), vec![0x1b, b'a']);
        assert_eq!(
            encode_key(KeyCode::Char('b'), KeyModifiers::CONTROL | KeyModifiers::ALT).unwrap(),
            vec![0x1b, 2]
        );
        assert_eq!(encode_key(KeyCode::Char('é'), KeyModifiers::NONE).unwrap(), "é".as_bytes());
        assert_eq!(encode_key(KeyCode::Enter, KeyModifiers::NONE).unwrap(), vec![b'\r']);
        assert_eq!(encode_key(KeyCode::Backspace, KeyModifiers::NONE).unwrap(), vec![0x7f]);
    }

    #[test]
    fn prefix_workspace_switch_keeps_terminal_mode() {
        // Scenario: terminal mode, Ctrl+B then w then 3.
        let (mut app, _rx) = test_app();
        workspace::add_window(&mut app, Some("sh")).unwrap();
        app.mode = Mode::Terminal;
        handle_key(&mut app, key(KeyCode::Char('b'), KeyModifiers::CONTROL));
        assert!(app.prefix.is_some());
        handle_key(&mut app, key(KeyCode::Char('w'), KeyModifiers::NONE));
        assert_eq!(app.prefix.as_ref().and_then(|p| p.sub), Some(SubPrefix::Workspace));
        handle_key(&mut app, key(KeyCode::Char('3'), KeyModifiers::NONE));
        assert_eq!(app.current_workspace, 3);
        assert_eq!(app.mode, Mode::Terminal);
        assert!(app.prefix.is_none());
        teardown(&mut app);
    }

    #[test]
    fn expired_prefix_is_treated_as_fresh_input() {
        let (mut app, _rx) = test_app();
        workspace::add_window(&mut app, Some("sh")).unwrap();
        app.mode = Mode::Terminal;
        app.prefix = Some(PrefixState {
            since: Instant::now() - Duration::from_millis(2001),
            sub: None,
        });
        // 2001 ms after the leader, `3` is a plain key: forwarded to the
        // PTY, not a workspace command.
        handle_key(&mut app, key(KeyCode::Char('3'), KeyModifiers::NONE));
        assert_eq!(app.current_workspace, 1);
        assert!(app.prefix.is_none());
        assert_eq!(app.mode, Mode::Terminal);
        teardown(&mut app);
    }

    #[test]
    fn prefix_d_detaches_to_window_management() {
        let (mut app, _rx) = test_app();
        workspace::add_window(&mut app, Some("sh")).unwrap();
        app.mode = Mode::Terminal;
        handle_key(&mut app, key(KeyCode::Char('b'), KeyModifiers::CONTROL));
        handle_key(&mut app, key(KeyCode::Char('d'), KeyModifiers::NONE));
        assert_eq!(app.mode, Mode::WindowManagement);
        teardown(&mut app);
    }

    #[test]
    fn prefix_bracket_enters_copy_mode() {
        let (mut app, _rx) = test_app();
        let idx = workspace::add_window(&mut app, Some("sh")).unwrap();
        app.mode = Mode::Terminal;
        handle_key(&mut app, key(KeyCode::Char('b'), KeyModifiers::CONTROL));
        handle_key(&mut app, key(KeyCode::Char('['), KeyModifiers::NONE));
        assert!(app.windows[idx].copy_mode.is_some());
        // q leaves copy mode; the window is otherwise untouched.
        handle_key(&mut app, key(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(app.windows[idx].copy_mode.is_none());
        assert_eq!(app.mode, Mode::Terminal);
        teardown(&mut app);
    }

    #[test]
    fn management_keys_drive_actions() {
        let (mut app, _rx) = test_app();
        workspace::add_window(&mut app, Some("sh")).unwrap();
        assert_eq!(app.mode, Mode::WindowManagement);
        handle_key(&mut app, key(KeyCode::Char('i'), KeyModifiers::NONE));
        assert_eq!(app.mode, Mode::Terminal);
        // Back out via prefix, then switch workspaces with a digit.
        handle_key(&mut app, key(KeyCode::Char('b'), KeyModifiers::CONTROL));
        handle_key(&mut app, key(KeyCode::Esc, KeyModifiers::NONE));
        assert_eq!(app.mode, Mode::WindowManagement);
        handle_key(&mut app, key(KeyCode::Char('2'), KeyModifiers::NONE));
        assert_eq!(app.current_workspace, 2);
        teardown(&mut app);
    }

    #[test]
    fn enter_terminal_requires_a_focused_window() {
        let (mut app, _rx) = test_app();
        handle_key(&mut app, key(KeyCode::Char('i'), KeyModifiers::NONE));
        assert_eq!(app.mode, Mode::WindowManagement);
    }

    #[test]
    fn rename_prompt_captures_text() {
        let (mut app, _rx) = test_app();
        let idx = workspace::add_window(&mut app, Some("sh")).unwrap();
        handle_key(&mut app, key(KeyCode::Char('r'), KeyModifiers::NONE));
        assert!(app.rename.is_some());
        for c in "logs".chars() {
            handle_key(&mut app, key(KeyCode::Char(c), KeyModifiers::NONE));
        }
        handle_key(&mut app, key(KeyCode::Enter, KeyModifiers::NONE));
        assert_eq!(app.windows[idx].display_title(), "logs");
        teardown(&mut app);
    }

    #[test]
    fn overlay_swallows_keys_until_dismissed() {
        let (mut app, _rx) = test_app();
        workspace::add_window(&mut app, Some("sh")).unwrap();
        handle_key(&mut app, key(KeyCode::Char('?'), KeyModifiers::NONE));
        assert_eq!(app.overlay, Overlay::Help);
        // A workspace digit must not fire while the overlay is open.
        handle_key(&mut app, key(KeyCode::Char('2'), KeyModifiers::NONE));
        assert_eq!(app.current_workspace, 1);
        handle_key(&mut app, key(KeyCode::Esc, KeyModifiers::NONE));
        assert_eq!(app.overlay, Overlay::None);
        teardown(&mut app);
    }

    #[test]
    fn title_buttons_hit_test() {
        let rect = Rect::new(10, 5, 40, 10);
        assert_eq!(button_at(rect, false, false, 47, 5), Some(TitleButton::Close));
        assert_eq!(button_at(rect, false, false, 45, 5), Some(TitleButton::Maximize));
        assert_eq!(button_at(rect, false, false, 43, 5), Some(TitleButton::Minimize));
        assert_eq!(button_at(rect, false, false, 30, 5), None);
        assert_eq!(button_at(rect, false, false, 47, 6), None);
        // Tiling keeps only the close button.
        assert_eq!(button_at(rect, true, false, 45, 5), None);
        assert_eq!(button_at(rect, true, false, 47, 5), Some(TitleButton::Close));
        // Hidden buttons never hit.
        assert_eq!(button_at(rect, false, true, 47, 5), None);
    }

    #[test]
    fn hit_test_picks_highest_z() {
        let (mut app, _rx) = test_app();
        let a = workspace::add_window(&mut app, Some("sh")).unwrap();
        let b = workspace::add_window(&mut app, Some("sh")).unwrap();
        // Overlap both windows at the same spot.
        app.windows[a].set_rect(Rect::new(0, 0, 30, 10));
        app.windows[b].set_rect(Rect::new(5, 2, 30, 10));
        assert_eq!(hit_test(&app, 10, 5), Some(b));
        workspace::focus_window(&mut app, a);
        assert_eq!(hit_test(&app, 10, 5), Some(a));
        teardown(&mut app);
    }

    #[test]
    fn double_leader_sends_literal_byte() {
        let (mut app, _rx) = test_app();
        workspace::add_window(&mut app, Some("sh")).unwrap();
        app.mode = Mode::Terminal;
        handle_key(&mut app, key(KeyCode::Char('b'), KeyModifiers::CONTROL));
        assert!(app.prefix.is_some());
        handle_key(&mut app, key(KeyCode::Char('b'), KeyModifiers::CONTROL));
        assert!(app.prefix.is_none());
        assert_eq!(app.mode, Mode::Terminal);
        teardown(&mut app);
    }

    #[test]
    fn keybind_overrides_replace_defaults() {
        let mut config = Config::default();
        config.keybind_overrides = vec![("new-window".to_string(), "ctrl+o".to_string())];
        let binds = default_binds(&config);
        assert!(binds
            .iter()
            .any(|b| b.action == Action::NewWindow
                && b.code == KeyCode::Char('o')
                && b.mods == KeyModifiers::CONTROL));
        assert!(!binds
            .iter()
            .any(|b| b.action == Action::NewWindow && b.code == KeyCode::Char('n')));
    }
}
