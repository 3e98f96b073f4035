use ratatui::prelude::Rect;

use crate::animation::{self, AnimationKind, DEFAULT_DURATION};
use crate::types::{App, SnapTarget, MIN_WINDOW_HEIGHT, MIN_WINDOW_WIDTH};

pub const MASTER_RATIO_MIN: f64 = 0.2;
pub const MASTER_RATIO_MAX: f64 = 0.8;
pub const MASTER_RATIO_STEP: f64 = 0.05;

/// Width of one minimized-window pill on the dockbar.
pub const DOCK_PILL_WIDTH: u16 = 14;
/// Columns reserved at the dock's left edge for the mode tag and the
/// workspace indicator ("1 2 3 4 5 6 7 8 9").
pub const DOCK_INDICATOR_WIDTH: u16 = 6 + 18;

// ─── Screen partitioning ────────────────────────────────────────────────────

/// The rectangle windows may occupy: the full screen minus the one-row
/// dockbar.
pub fn workspace_area(screen: Rect, dockbar_top: bool) -> Rect {
    if screen.height == 0 {
        return screen;
    }
    let h = screen.height - 1;
    if dockbar_top {
        Rect::new(screen.x, screen.y + 1, screen.width, h)
    } else {
        Rect::new(screen.x, screen.y, screen.width, h)
    }
}

/// The single dockbar row.
pub fn dock_row(screen: Rect, dockbar_top: bool) -> Rect {
    let y = if dockbar_top { screen.y } else { screen.y + screen.height.saturating_sub(1) };
    Rect::new(screen.x, y, screen.width, 1)
}

/// Rectangle of the minimized-window pill at `slot` on the dockbar.
pub fn dock_slot_rect(screen: Rect, dockbar_top: bool, slot: usize) -> Rect {
    let row = dock_row(screen, dockbar_top);
    let x = row.x
        + DOCK_INDICATOR_WIDTH
        + (slot as u16).saturating_mul(DOCK_PILL_WIDTH + 1);
    let x = x.min(row.x + row.width.saturating_sub(1));
    let w = DOCK_PILL_WIDTH.min(row.width.saturating_sub(x - row.x)).max(1);
    Rect::new(x, row.y, w, 1)
}

/// Which pill slot a dockbar click at column `x` lands on.
pub fn dock_slot_at(screen: Rect, dockbar_top: bool, x: u16, y: u16) -> Option<usize> {
    let row = dock_row(screen, dockbar_top);
    if y != row.y || x < row.x + DOCK_INDICATOR_WIDTH {
        return None;
    }
    let rel = x - row.x - DOCK_INDICATOR_WIDTH;
    let slot = (rel / (DOCK_PILL_WIDTH + 1)) as usize;
    if rel % (DOCK_PILL_WIDTH + 1) == DOCK_PILL_WIDTH {
        return None; // gap between pills
    }
    Some(slot)
}

/// Which workspace digit a dockbar click at column `x` lands on.
pub fn dock_workspace_at(screen: Rect, dockbar_top: bool, x: u16, y: u16) -> Option<u8> {
    let row = dock_row(screen, dockbar_top);
    if y != row.y {
        return None;
    }
    // Digits start after the 6-column mode tag, two columns per digit.
    let start = row.x + 6;
    if x < start || x >= start + 18 {
        return None;
    }
    let idx = (x - start) / 2;
    Some(idx as u8 + 1)
}

// ─── Tiling ─────────────────────────────────────────────────────────────────

/// Master-plus-stack rectangles for `n` windows inside `area`.
///
/// The master fills a vertical strip of `round(width × ratio)`; the
/// remaining windows stack vertically on the right with equal heights,
/// the last absorbing the rounding remainder. A single window fills the
/// whole area.
pub fn tile_rects(n: usize, area: Rect, ratio: f64) -> Vec<Rect> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![area];
    }
    let master_w = ((area.width as f64) * ratio).round() as u16;
    let master_w = master_w
        .max(MIN_WINDOW_WIDTH)
        .min(area.width.saturating_sub(MIN_WINDOW_WIDTH).max(MIN_WINDOW_WIDTH));
    let stack_w = area.width - master_w;
    let stack_x = area.x + master_w;
    let stack_count = n - 1;
    let each = area.height / stack_count as u16;
    let each = each.max(1);

    let mut rects = Vec::with_capacity(n);
    rects.push(Rect::new(area.x, area.y, master_w, area.height));
    let mut y = area.y;
    for i in 0..stack_count {
        let h = if i == stack_count - 1 {
            (area.y + area.height).saturating_sub(y)
        } else {
            each
        };
        rects.push(Rect::new(stack_x, y, stack_w, h.max(1)));
        y = y.saturating_add(each);
    }
    rects
}

/// Recompute tiling targets for the current workspace and animate any
/// window whose geometry differs.
pub fn retile(app: &mut App) {
    let ws = app.current_workspace;
    if !app.layouts[ws as usize].tiling {
        return;
    }
    let area = app.workspace_area();
    let idxs = app.tiled_windows(ws);
    if idxs.is_empty() {
        return;
    }
    let ratio = app.layouts[ws as usize].master_ratio;
    let rects = tile_rects(idxs.len(), area, ratio);
    for (&i, rect) in idxs.iter().zip(rects) {
        let id = app.windows[i].id;
        let from = app.windows[i].rect();
        if from != rect {
            animation::start(app, id, AnimationKind::Snap, from, rect, DEFAULT_DURATION);
        }
    }
    app.ui_dirty = true;
}

// ─── Floating snaps ─────────────────────────────────────────────────────────

/// The preset rectangle for a snap target. `Unsnap` has no preset and
/// must be resolved against the window's remembered geometry.
pub fn snap_rect(target: SnapTarget, area: Rect) -> Option<Rect> {
    let half_w = area.width / 2;
    let half_h = area.height / 2;
    let right_w = area.width - half_w;
    let bottom_h = area.height - half_h;
    let r = match target {
        SnapTarget::Fullscreen => area,
        SnapTarget::Left => Rect::new(area.x, area.y, half_w, area.height),
        SnapTarget::Right => Rect::new(area.x + half_w, area.y, right_w, area.height),
        SnapTarget::TopLeft => Rect::new(area.x, area.y, half_w, half_h),
        SnapTarget::TopRight => Rect::new(area.x + half_w, area.y, right_w, half_h),
        SnapTarget::BottomLeft => Rect::new(area.x, area.y + half_h, half_w, bottom_h),
        SnapTarget::BottomRight => Rect::new(area.x + half_w, area.y + half_h, right_w, bottom_h),
        SnapTarget::Unsnap => return None,
    };
    Some(r)
}

/// Clamp a floating rectangle into the workspace area, preserving size
/// where possible.
pub fn clamp_into(mut r: Rect, area: Rect) -> Rect {
    r.width = r.width.clamp(MIN_WINDOW_WIDTH, area.width.max(MIN_WINDOW_WIDTH));
    r.height = r.height.clamp(MIN_WINDOW_HEIGHT, area.height.max(MIN_WINDOW_HEIGHT));
    if r.x < area.x {
        r.x = area.x;
    }
    if r.y < area.y {
        r.y = area.y;
    }
    if r.x + r.width > area.x + area.width {
        r.x = (area.x + area.width).saturating_sub(r.width).max(area.x);
    }
    if r.y + r.height > area.y + area.height {
        r.y = (area.y + area.height).saturating_sub(r.height).max(area.y);
    }
    r
}

/// Default placement for the `n`-th floating window: a cascade from the
/// top-left corner.
pub fn cascade_rect(n: usize, area: Rect) -> Rect {
    let w = (area.width * 3 / 5).max(MIN_WINDOW_WIDTH);
    let h = (area.height * 3 / 5).max(MIN_WINDOW_HEIGHT);
    let step = ((n % 8) as u16) * 2;
    clamp_into(Rect::new(area.x + 2 + step, area.y + 1 + step, w, h), area)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disjoint(a: Rect, b: Rect) -> bool {
        a.x + a.width <= b.x || b.x + b.width <= a.x || a.y + a.height <= b.y || b.y + b.height <= a.y
    }

    #[test]
    fn single_window_fills_workspace() {
        let area = Rect::new(0, 0, 80, 23);
        assert_eq!(tile_rects(1, area, 0.5), vec![area]);
    }

    #[test]
    fn two_windows_split_at_master_ratio() {
        // 80x24 terminal minus the one-row dock.
        let area = workspace_area(Rect::new(0, 0, 80, 24), false);
        assert_eq!(area, Rect::new(0, 0, 80, 23));
        let rects = tile_rects(2, area, 0.5);
        assert_eq!(rects[0], Rect::new(0, 0, 40, 23));
        assert_eq!(rects[1], Rect::new(40, 0, 40, 23));
    }

    #[test]
    fn tiled_rects_partition_the_workspace() {
        let area = Rect::new(0, 0, 120, 35);
        for n in 1..=7 {
            for ratio in [0.2, 0.35, 0.5, 0.8] {
                let rects = tile_rects(n, area, ratio);
                assert_eq!(rects.len(), n);
                let cell_count: u32 =
                    rects.iter().map(|r| r.width as u32 * r.height as u32).sum();
                assert_eq!(
                    cell_count,
                    area.width as u32 * area.height as u32,
                    "n={n} ratio={ratio}"
                );
                for i in 0..rects.len() {
                    for j in i + 1..rects.len() {
                        assert!(disjoint(rects[i], rects[j]), "n={n} overlap {i}/{j}");
                    }
                }
            }
        }
    }

    #[test]
    fn stack_remainder_goes_to_last_row() {
        let area = Rect::new(0, 0, 80, 23);
        let rects = tile_rects(3, area, 0.5);
        // 23 rows over 2 stack windows: 11 + 12.
        assert_eq!(rects[1].height, 11);
        assert_eq!(rects[2].height, 12);
        assert_eq!(rects[2].y, 11);
    }

    #[test]
    fn master_ratio_moves_the_split() {
        let area = Rect::new(0, 0, 100, 30);
        let rects = tile_rects(2, area, 0.3);
        assert_eq!(rects[0].width, 30);
        let rects = tile_rects(2, area, 0.8);
        assert_eq!(rects[0].width, 80);
    }

    #[test]
    fn snap_rects_cover_expected_regions() {
        let area = Rect::new(0, 0, 80, 23);
        assert_eq!(snap_rect(SnapTarget::Fullscreen, area), Some(area));
        assert_eq!(snap_rect(SnapTarget::Left, area), Some(Rect::new(0, 0, 40, 23)));
        assert_eq!(snap_rect(SnapTarget::Right, area), Some(Rect::new(40, 0, 40, 23)));
        assert_eq!(snap_rect(SnapTarget::TopLeft, area), Some(Rect::new(0, 0, 40, 11)));
        assert_eq!(
            snap_rect(SnapTarget::BottomRight, area),
            Some(Rect::new(40, 11, 40, 12))
        );
        assert_eq!(snap_rect(SnapTarget::Unsnap, area), None);
    }

    #[test]
    fn dockbar_position_moves_workspace_area() {
        let screen = Rect::new(0, 0, 80, 24);
        assert_eq!(workspace_area(screen, false), Rect::new(0, 0, 80, 23));
        assert_eq!(workspace_area(screen, true), Rect::new(0, 1, 80, 23));
        assert_eq!(dock_row(screen, false).y, 23);
        assert_eq!(dock_row(screen, true).y, 0);
    }

    #[test]
    fn dock_slots_are_hit_testable() {
        let screen = Rect::new(0, 0, 120, 30);
        let r0 = dock_slot_rect(screen, false, 0);
        let r1 = dock_slot_rect(screen, false, 1);
        assert_eq!(r0.y, 29);
        assert!(r1.x > r0.x + r0.width);
        assert_eq!(dock_slot_at(screen, false, r0.x + 1, 29), Some(0));
        assert_eq!(dock_slot_at(screen, false, r1.x + 1, 29), Some(1));
        assert_eq!(dock_slot_at(screen, false, r0.x + 1, 10), None);
    }

    #[test]
    fn clamping_keeps_windows_inside() {
        let area = Rect::new(0, 0, 80, 23);
        let r = clamp_into(Rect::new(70, 20, 40, 10), area);
        assert!(r.x + r.width <= 80);
        assert!(r.y + r.height <= 23);
        assert!(r.width >= MIN_WINDOW_WIDTH && r.height >= MIN_WINDOW_HEIGHT);
    }
}
