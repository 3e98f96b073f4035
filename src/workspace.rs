use crate::animation::{self, AnimationKind, DEFAULT_DURATION};
use crate::layout;
use crate::types::{App, Mode, RenameState, Severity, SnapState, SnapTarget, WORKSPACE_COUNT};
use crate::window::{Window, WindowError};

/// Pure focus resolution: highest-Z non-minimized entry. Input tuples
/// are `(index, z, minimized)`.
fn pick_focus(items: &[(usize, u32, bool)]) -> Option<usize> {
    items
        .iter()
        .filter(|(_, _, minimized)| !minimized)
        .max_by_key(|(_, z, _)| *z)
        .map(|(i, _, _)| *i)
}

/// Focus fallback for a workspace per the focus invariant: the highest-Z
/// non-minimized window, if any.
pub fn resolve_focus(windows: &[Window], ws: u8) -> Option<usize> {
    let items: Vec<(usize, u32, bool)> = windows
        .iter()
        .enumerate()
        .filter(|(_, w)| w.workspace == ws)
        .map(|(i, w)| (i, w.z, w.minimized))
        .collect();
    pick_focus(&items)
}

/// Focus a window and promote it to the top of its workspace's stack.
pub fn focus_window(app: &mut App, idx: usize) {
    if idx >= app.windows.len() || app.windows[idx].minimized {
        return;
    }
    let ws = app.windows[idx].workspace;
    let top = app.max_z(ws) + 1;
    app.windows[idx].z = top;
    app.focused[ws as usize] = Some(idx);
    app.ui_dirty = true;
}

pub fn cycle_focus(app: &mut App, forward: bool) {
    let ws = app.current_workspace;
    let visible: Vec<usize> = app
        .workspace_windows(ws)
        .into_iter()
        .filter(|&i| !app.windows[i].minimized)
        .collect();
    if visible.is_empty() {
        return;
    }
    let cur = app.focused_index().and_then(|f| visible.iter().position(|&i| i == f));
    let next = match cur {
        Some(p) if forward => visible[(p + 1) % visible.len()],
        Some(p) => visible[(p + visible.len() - 1) % visible.len()],
        None => visible[0],
    };
    focus_window(app, next);
}

// ─── Window lifecycle ───────────────────────────────────────────────────────

/// Create a window on the current workspace, focus it, and retile.
pub fn add_window(app: &mut App, program: Option<&str>) -> Result<usize, WindowError> {
    let ws = app.current_workspace;
    let area = app.workspace_area();
    let rect = layout::cascade_rect(app.workspace_windows(ws).len(), area);
    let id = app.next_window_id;
    let program = program.or(app.config.default_program.as_deref());
    let window = Window::create(
        id,
        ws,
        program,
        rect,
        app.config.scrollback_lines,
        app.event_tx.clone(),
    )?;
    app.next_window_id += 1;
    app.windows.push(window);
    let idx = app.windows.len() - 1;
    focus_window(app, idx);
    layout::retile(app);
    Ok(idx)
}

/// Close a window and repair every index-based reference to the list.
pub fn close_window(app: &mut App, idx: usize) {
    if idx >= app.windows.len() {
        return;
    }
    let id = app.windows[idx].id;
    let ws = app.windows[idx].workspace;
    app.windows[idx].close();
    app.windows.remove(idx);
    app.animations.retain(|a| a.window_id != id);
    if app.drag.as_ref().is_some_and(|d| d.id == id) {
        app.drag = None;
    }
    if app.resizing.as_ref().is_some_and(|r| r.id == id) {
        app.resizing = None;
    }
    if app.rename.as_ref().is_some_and(|r| r.window_id == id) {
        app.rename = None;
    }
    for slot in app.focused.iter_mut() {
        if let Some(f) = slot {
            if *f == idx {
                *slot = None;
            } else if *f > idx {
                *f -= 1;
            }
        }
    }
    if app.focused[ws as usize].is_none() {
        app.focused[ws as usize] = resolve_focus(&app.windows, ws);
    }
    if app.mode == Mode::Terminal && app.focused_index().is_none() {
        app.mode = Mode::WindowManagement;
    }
    layout::retile(app);
    app.ui_dirty = true;
}

pub fn close_focused(app: &mut App) {
    if let Some(idx) = app.focused_index() {
        close_window(app, idx);
    }
}

/// PTY EOF / child exit delivered through the event channel.
pub fn handle_window_exited(app: &mut App, id: u64) {
    if let Some(idx) = app.window_index(id) {
        app.windows[idx].dead = true;
        close_window(app, idx);
    }
}

// ─── Workspaces ─────────────────────────────────────────────────────────────

pub fn switch_workspace(app: &mut App, ws: u8) {
    if ws == 0 || ws > WORKSPACE_COUNT || ws == app.current_workspace {
        return;
    }
    // Focus memory is maintained continuously, so switch-out state is
    // already saved; only the restore side needs validation.
    app.current_workspace = ws;
    let remembered = app.focused[ws as usize].filter(|&i| {
        i < app.windows.len() && app.windows[i].workspace == ws && !app.windows[i].minimized
    });
    app.focused[ws as usize] = remembered.or_else(|| resolve_focus(&app.windows, ws));
    layout::retile(app);
    app.ui_dirty = true;
}

pub fn move_focused_to_workspace(app: &mut App, ws: u8) {
    if ws == 0 || ws > WORKSPACE_COUNT || ws == app.current_workspace {
        return;
    }
    let Some(idx) = app.focused_index() else { return };
    let cur = app.current_workspace as usize;
    let top = app.max_z(ws) + 1;
    {
        let w = &mut app.windows[idx];
        w.workspace = ws;
        w.z = top;
    }
    app.focused[ws as usize] = Some(idx);
    app.focused[cur] = resolve_focus(&app.windows, app.current_workspace);
    layout::retile(app);
    app.notify(Severity::Info, format!("window moved to workspace {ws}"));
}

// ─── Tiling controls ────────────────────────────────────────────────────────

pub fn toggle_tiling(app: &mut App) {
    let ws = app.current_workspace;
    let slot = ws as usize;
    let enabled = !app.layouts[slot].tiling;
    app.layouts[slot].tiling = enabled;
    if enabled {
        app.layouts[slot].floating_snapshot = app
            .workspace_windows(ws)
            .into_iter()
            .map(|i| (app.windows[i].id, app.windows[i].rect()))
            .collect();
        layout::retile(app);
    } else {
        let area = app.workspace_area();
        let snapshot = std::mem::take(&mut app.layouts[slot].floating_snapshot);
        for (id, rect) in snapshot {
            let Some(idx) = app.window_index(id) else { continue };
            if app.windows[idx].workspace != ws || app.windows[idx].minimized {
                continue;
            }
            let from = app.windows[idx].rect();
            let to = layout::clamp_into(rect, area);
            animation::start(app, id, AnimationKind::Snap, from, to, DEFAULT_DURATION);
        }
    }
    app.ui_dirty = true;
}

pub fn resize_master(app: &mut App, delta: f64) {
    let slot = app.current_workspace as usize;
    if !app.layouts[slot].tiling {
        return;
    }
    let ratio = (app.layouts[slot].master_ratio + delta)
        .clamp(layout::MASTER_RATIO_MIN, layout::MASTER_RATIO_MAX);
    app.layouts[slot].master_ratio = ratio;
    layout::retile(app);
}

/// Swap the focused window with its geometric neighbor in the given
/// direction within the tiling order. Reorders the creation-order list,
/// which is what the layout derives slots from.
pub fn swap_focused(app: &mut App, dx: i32, dy: i32) {
    if !app.tiling_enabled() {
        return;
    }
    let Some(focused) = app.focused_index() else { return };
    let ws = app.current_workspace;
    let tiled = app.tiled_windows(ws);
    if !tiled.contains(&focused) {
        return;
    }

    let center = |i: usize| -> (i32, i32) {
        let r = app.windows[i].rect();
        (r.x as i32 + r.width as i32 / 2, r.y as i32 + r.height as i32 / 2)
    };
    let (fx, fy) = center(focused);
    let mut best: Option<(usize, i32)> = None;
    for &i in &tiled {
        if i == focused {
            continue;
        }
        let (cx, cy) = center(i);
        let (ddx, ddy) = (cx - fx, cy - fy);
        let aligned = (dx != 0 && ddx.signum() == dx && ddx.abs() >= ddy.abs())
            || (dy != 0 && ddy.signum() == dy && ddy.abs() >= ddx.abs());
        if !aligned {
            continue;
        }
        let dist = ddx.abs() + ddy.abs();
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((i, dist));
        }
    }
    let Some((other, _)) = best else { return };
    swap_windows(app, focused, other);
    layout::retile(app);
}

/// Swap two slots in the window list, fixing up every index reference.
pub fn swap_windows(app: &mut App, a: usize, b: usize) {
    if a == b || a >= app.windows.len() || b >= app.windows.len() {
        return;
    }
    app.windows.swap(a, b);
    for slot in app.focused.iter_mut() {
        match *slot {
            Some(f) if f == a => *slot = Some(b),
            Some(f) if f == b => *slot = Some(a),
            _ => {}
        }
    }
    app.ui_dirty = true;
}

// ─── Minimize / restore ─────────────────────────────────────────────────────

/// Dock slot for a window: the number of minimized-or-minimizing windows
/// preceding it in creation order on its workspace.
pub fn dock_slot_index(app: &App, idx: usize) -> usize {
    let ws = app.windows[idx].workspace;
    app.windows[..idx]
        .iter()
        .filter(|w| w.workspace == ws && (w.minimized || w.minimizing))
        .count()
}

pub fn minimize_window(app: &mut App, idx: usize) {
    if idx >= app.windows.len() {
        return;
    }
    if app.windows[idx].minimized || app.windows[idx].minimizing {
        return;
    }
    let id = app.windows[idx].id;
    let slot = dock_slot_index(app, idx);
    let target = layout::dock_slot_rect(app.screen, app.config.dockbar_top, slot);
    let from = {
        let w = &mut app.windows[idx];
        w.pre_minimize = Some(w.rect());
        w.minimizing = true;
        w.being_manipulated = false;
        w.rect()
    };
    animation::start(app, id, AnimationKind::Minimize, from, target, DEFAULT_DURATION);
    layout::retile(app);
}

pub fn minimize_focused(app: &mut App) {
    if let Some(idx) = app.focused_index() {
        minimize_window(app, idx);
    }
}

pub fn restore_window(app: &mut App, idx: usize) {
    if idx >= app.windows.len() {
        return;
    }
    if !app.windows[idx].minimized || app.has_restore_animation(app.windows[idx].id) {
        return;
    }
    let id = app.windows[idx].id;
    let slot = dock_slot_index(app, idx);
    let from = layout::dock_slot_rect(app.screen, app.config.dockbar_top, slot);
    // Minimize completion put the pre-minimize geometry back in place;
    // that is the restore target.
    let to = app.windows[idx].rect();
    animation::start(app, id, AnimationKind::Restore, from, to, DEFAULT_DURATION);
}

/// Restore the `n`-th minimized window (dock order) of the current
/// workspace.
pub fn restore_by_slot(app: &mut App, slot: usize) {
    let ws = app.current_workspace;
    let minimized: Vec<usize> = app
        .workspace_windows(ws)
        .into_iter()
        .filter(|&i| app.windows[i].minimized)
        .collect();
    if let Some(&idx) = minimized.get(slot) {
        restore_window(app, idx);
    }
}

pub fn restore_all(app: &mut App) {
    let ws = app.current_workspace;
    let minimized: Vec<usize> = app
        .workspace_windows(ws)
        .into_iter()
        .filter(|&i| app.windows[i].minimized)
        .collect();
    for idx in minimized {
        restore_window(app, idx);
    }
}

// ─── Floating geometry ──────────────────────────────────────────────────────

pub fn snap_focused(app: &mut App, target: SnapTarget) {
    if app.tiling_enabled() {
        return; // snapping has no meaning in a tiled workspace
    }
    let Some(idx) = app.focused_index() else { return };
    let area = app.workspace_area();
    let id = app.windows[idx].id;
    match target {
        SnapTarget::Unsnap => {
            let Some(prev) = app.windows[idx].pre_snap.take() else { return };
            app.windows[idx].snap_state = SnapState::None;
            let from = app.windows[idx].rect();
            let to = layout::clamp_into(prev, area);
            animation::start(app, id, AnimationKind::Snap, from, to, DEFAULT_DURATION);
        }
        t => {
            let Some(to) = layout::snap_rect(t, area) else { return };
            let from = {
                let w = &mut app.windows[idx];
                if w.snap_state == SnapState::None {
                    w.pre_snap = Some(w.rect());
                }
                w.snap_state = match t {
                    SnapTarget::Fullscreen => SnapState::Fullscreen,
                    SnapTarget::Left => SnapState::Left,
                    SnapTarget::Right => SnapState::Right,
                    SnapTarget::TopLeft => SnapState::TopLeft,
                    SnapTarget::TopRight => SnapState::TopRight,
                    SnapTarget::BottomLeft => SnapState::BottomLeft,
                    SnapTarget::BottomRight => SnapState::BottomRight,
                    SnapTarget::Unsnap => unreachable!(),
                };
                w.rect()
            };
            animation::start(app, id, AnimationKind::Snap, from, to, DEFAULT_DURATION);
        }
    }
}

pub fn move_focused_by(app: &mut App, dx: i32, dy: i32) {
    if app.tiling_enabled() {
        return;
    }
    let area = app.workspace_area();
    let Some(w) = app.focused_window_mut() else { return };
    let mut r = w.rect();
    r.x = (r.x as i32 + dx).max(0) as u16;
    r.y = (r.y as i32 + dy).max(0) as u16;
    let r = layout::clamp_into(r, area);
    w.set_rect(r);
    w.snap_state = SnapState::None;
    app.ui_dirty = true;
}

pub fn resize_focused_by(app: &mut App, dw: i32, dh: i32) {
    if app.tiling_enabled() {
        return;
    }
    let area = app.workspace_area();
    let Some(w) = app.focused_window_mut() else { return };
    let mut r = w.rect();
    r.width = (r.width as i32 + dw).max(crate::types::MIN_WINDOW_WIDTH as i32) as u16;
    r.height = (r.height as i32 + dh).max(crate::types::MIN_WINDOW_HEIGHT as i32) as u16;
    let r = layout::clamp_into(r, area);
    w.set_rect(r);
    w.resize_to_geometry();
    w.snap_state = SnapState::None;
    app.ui_dirty = true;
}

/// Screen resize: clamp floating windows back in and retile.
pub fn screen_resized(app: &mut App, width: u16, height: u16) {
    app.screen = ratatui::prelude::Rect::new(0, 0, width, height);
    let area = app.workspace_area();
    for w in app.windows.iter_mut() {
        if w.minimized || w.minimizing {
            continue;
        }
        let clamped = layout::clamp_into(w.rect(), area);
        if clamped != w.rect() {
            w.set_rect(clamped);
            w.resize_to_geometry();
        }
    }
    layout::retile(app);
    app.ui_dirty = true;
}

// ─── Rename ─────────────────────────────────────────────────────────────────

pub fn begin_rename(app: &mut App) {
    let Some(w) = app.focused_window() else { return };
    app.rename = Some(RenameState {
        window_id: w.id,
        buffer: w.custom_name.clone().unwrap_or_default(),
    });
    app.ui_dirty = true;
}

pub fn commit_rename(app: &mut App) {
    let Some(state) = app.rename.take() else { return };
    if let Some(w) = app.window_by_id_mut(state.window_id) {
        let name = state.buffer.trim().to_string();
        w.custom_name = if name.is_empty() { None } else { Some(name) };
    }
    app.ui_dirty = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use ratatui::prelude::Rect;
    use std::sync::mpsc;

    fn test_app() -> (App, mpsc::Receiver<crate::types::AppEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut app = App::new(Config::default(), tx);
        app.screen = Rect::new(0, 0, 80, 24);
        (app, rx)
    }

    fn add(app: &mut App) -> usize {
        add_window(app, Some("sh")).expect("spawn sh")
    }

    fn teardown(app: &mut App) {
        while !app.windows.is_empty() {
            close_window(app, 0);
        }
    }

    #[test]
    fn pick_focus_prefers_highest_z_visible() {
        assert_eq!(pick_focus(&[]), None);
        assert_eq!(pick_focus(&[(0, 5, true)]), None);
        assert_eq!(pick_focus(&[(0, 5, false), (1, 9, false), (2, 9, true)]), Some(1));
        assert_eq!(pick_focus(&[(3, 1, true), (7, 2, false)]), Some(7));
    }

    #[test]
    fn focus_invariant_holds_through_lifecycle() {
        let (mut app, _rx) = test_app();
        let a = add(&mut app);
        assert_eq!(app.focused_index(), Some(a));
        let b = add(&mut app);
        assert_eq!(app.focused_index(), Some(b));
        // Focused window always carries the maximum Z on its workspace.
        let max = app.max_z(1);
        assert_eq!(app.windows[b].z, max);
        close_window(&mut app, b);
        assert_eq!(app.focused_index(), Some(a));
        close_window(&mut app, a);
        assert_eq!(app.focused_index(), None);
        teardown(&mut app);
    }

    #[test]
    fn delete_remaps_focus_indices() {
        let (mut app, _rx) = test_app();
        add(&mut app);
        add(&mut app);
        let c = add(&mut app);
        assert_eq!(app.focused_index(), Some(c));
        // Removing an earlier window shifts the focused index down.
        close_window(&mut app, 0);
        assert_eq!(app.focused_index(), Some(c - 1));
        teardown(&mut app);
    }

    #[test]
    fn tiling_split_and_swap_scenario() {
        let (mut app, _rx) = test_app();
        app.layouts[1].tiling = true;
        let a = add(&mut app);
        let b = add(&mut app);
        animation::finalize_all(&mut app);
        assert_eq!(app.windows[a].rect(), Rect::new(0, 0, 40, 23));
        assert_eq!(app.windows[b].rect(), Rect::new(40, 0, 40, 23));

        focus_window(&mut app, a);
        swap_focused(&mut app, 1, 0);
        animation::finalize_all(&mut app);
        let a = app.window_index(1).unwrap();
        let b = app.window_index(2).unwrap();
        assert_eq!(app.windows[a].rect(), Rect::new(40, 0, 40, 23));
        assert_eq!(app.windows[b].rect(), Rect::new(0, 0, 40, 23));
        // Focus stayed on the window that was swapped.
        assert_eq!(app.focused_index(), Some(a));
        teardown(&mut app);
    }

    #[test]
    fn minimize_restore_round_trip() {
        let (mut app, _rx) = test_app();
        let idx = add(&mut app);
        let rect = Rect::new(10, 5, 40, 15);
        app.windows[idx].set_rect(rect);
        app.windows[idx].resize_to_geometry();

        minimize_window(&mut app, idx);
        assert!(app.windows[idx].minimizing);
        animation::finalize_all(&mut app);
        assert!(app.windows[idx].minimized);
        assert!(!app.windows[idx].minimizing);
        // Geometry fields hold the pre-minimize values while docked.
        assert_eq!(app.windows[idx].rect(), rect);

        restore_window(&mut app, idx);
        assert!(app.has_restore_animation(app.windows[idx].id));
        animation::finalize_all(&mut app);
        assert!(!app.windows[idx].minimized);
        assert_eq!(app.windows[idx].rect(), rect);
        assert_eq!(app.focused_index(), Some(idx));
        teardown(&mut app);
    }

    #[test]
    fn minimize_transfers_focus_without_new_animations() {
        let (mut app, _rx) = test_app();
        let a = add(&mut app);
        let b = add(&mut app);
        assert_eq!(app.focused_index(), Some(b));
        minimize_window(&mut app, b);
        animation::finalize_all(&mut app);
        assert_eq!(app.focused_index(), Some(a));
        assert!(app.animations.is_empty());
        teardown(&mut app);
    }

    #[test]
    fn snap_then_unsnap_restores_geometry() {
        let (mut app, _rx) = test_app();
        let idx = add(&mut app);
        let rect = Rect::new(7, 3, 30, 12);
        app.windows[idx].set_rect(rect);
        snap_focused(&mut app, SnapTarget::Left);
        animation::finalize_all(&mut app);
        assert_eq!(app.windows[idx].rect(), Rect::new(0, 0, 40, 23));
        assert_eq!(app.windows[idx].snap_state, SnapState::Left);
        snap_focused(&mut app, SnapTarget::Unsnap);
        animation::finalize_all(&mut app);
        assert_eq!(app.windows[idx].rect(), rect);
        assert_eq!(app.windows[idx].snap_state, SnapState::None);
        teardown(&mut app);
    }

    #[test]
    fn snap_is_a_silent_noop_under_tiling() {
        let (mut app, _rx) = test_app();
        app.layouts[1].tiling = true;
        let idx = add(&mut app);
        animation::finalize_all(&mut app);
        let before = app.windows[idx].rect();
        snap_focused(&mut app, SnapTarget::Left);
        assert!(app.animations.is_empty());
        assert_eq!(app.windows[idx].rect(), before);
        assert!(app.notifications.is_empty());
        teardown(&mut app);
    }

    #[test]
    fn workspace_switch_restores_remembered_focus() {
        let (mut app, _rx) = test_app();
        let a = add(&mut app);
        switch_workspace(&mut app, 2);
        assert_eq!(app.current_workspace, 2);
        assert_eq!(app.focused_index(), None);
        let b = add(&mut app);
        assert_eq!(app.focused_index(), Some(b));
        switch_workspace(&mut app, 1);
        assert_eq!(app.focused_index(), Some(a));
        // Switching to the current workspace is a no-op.
        let before = app.focused[1];
        switch_workspace(&mut app, 1);
        assert_eq!(app.current_workspace, 1);
        assert_eq!(app.focused[1], before);
        teardown(&mut app);
    }

    #[test]
    fn move_to_workspace_updates_both_sides() {
        let (mut app, _rx) = test_app();
        let a = add(&mut app);
        let b = add(&mut app);
        assert_eq!(app.focused_index(), Some(b));
        move_focused_to_workspace(&mut app, 3);
        assert_eq!(app.windows[b].workspace, 3);
        assert_eq!(app.focused_index(), Some(a));
        switch_workspace(&mut app, 3);
        assert_eq!(app.focused_index(), Some(b));
        teardown(&mut app);
    }

    #[test]
    fn tiling_toggle_round_trips_floating_geometry() {
        let (mut app, _rx) = test_app();
        let idx = add(&mut app);
        let rect = Rect::new(5, 4, 33, 13);
        app.windows[idx].set_rect(rect);
        toggle_tiling(&mut app);
        animation::finalize_all(&mut app);
        assert_eq!(app.windows[idx].rect(), app.workspace_area());
        toggle_tiling(&mut app);
        animation::finalize_all(&mut app);
        assert_eq!(app.windows[idx].rect(), rect);
        teardown(&mut app);
    }

    #[test]
    fn dock_slots_follow_creation_order() {
        let (mut app, _rx) = test_app();
        let a = add(&mut app);
        let b = add(&mut app);
        let c = add(&mut app);
        minimize_window(&mut app, b);
        animation::finalize_all(&mut app);
        minimize_window(&mut app, c);
        animation::finalize_all(&mut app);
        assert_eq!(dock_slot_index(&app, b), 0);
        assert_eq!(dock_slot_index(&app, c), 1);
        // `a` still visible; minimizing it would take slot 0 (it precedes
        // b in creation order).
        assert_eq!(dock_slot_index(&app, a), 0);
        teardown(&mut app);
    }

    #[test]
    fn rename_sets_and_clears_custom_name() {
        let (mut app, _rx) = test_app();
        let idx = add(&mut app);
        begin_rename(&mut app);
        app.rename.as_mut().unwrap().buffer = "build".to_string();
        commit_rename(&mut app);
        assert_eq!(app.windows[idx].display_title(), "build");
        begin_rename(&mut app);
        app.rename.as_mut().unwrap().buffer.clear();
        commit_rename(&mut app);
        assert_eq!(app.windows[idx].custom_name, None);
        teardown(&mut app);
    }
}
