use std::time::{Duration, Instant};

use ratatui::prelude::Rect;

use crate::types::App;

pub const DEFAULT_DURATION: Duration = Duration::from_millis(200);
pub const FAST_DURATION: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    Minimize,
    Restore,
    Snap,
}

/// One in-flight geometry transition. Interpolation happens once per
/// frame immediately before rendering, so input handlers never observe a
/// mid-tween geometry they did not themselves set.
#[derive(Debug, Clone, Copy)]
pub struct Animation {
    pub window_id: u64,
    pub kind: AnimationKind,
    pub from: Rect,
    pub to: Rect,
    pub started: Instant,
    pub duration: Duration,
}

impl Animation {
    pub fn progress(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        (elapsed / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }
}

pub fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        let u = -2.0 * t + 2.0;
        1.0 - u * u * u / 2.0
    }
}

pub fn lerp_rect(from: Rect, to: Rect, p: f64) -> Rect {
    let lerp = |a: u16, b: u16| -> u16 {
        let v = a as f64 + (b as f64 - a as f64) * p;
        v.round().max(0.0) as u16
    };
    Rect::new(
        lerp(from.x, to.x),
        lerp(from.y, to.y),
        lerp(from.width, to.width),
        lerp(from.height, to.height),
    )
}

/// Begin an animation on a window. An in-flight animation on the same
/// window is finalized first so geometry never races itself.
pub fn start(app: &mut App, window_id: u64, kind: AnimationKind, from: Rect, to: Rect, duration: Duration) {
    if let Some(pos) = app.animations.iter().position(|a| a.window_id == window_id) {
        let prior = app.animations.remove(pos);
        complete(app, &prior);
    }
    if let Some(w) = app.window_by_id_mut(window_id) {
        w.set_rect(from);
    }
    app.animations.push(Animation {
        window_id,
        kind,
        from,
        to,
        started: Instant::now(),
        duration,
    });
    app.ui_dirty = true;
}

/// Immediately finalize every in-flight animation. Called before a drag
/// begins in tiling mode so slot positions cannot race the pointer.
pub fn finalize_all(app: &mut App) {
    let anims = std::mem::take(&mut app.animations);
    for a in &anims {
        complete(app, a);
    }
}

/// Advance all animations one frame. Returns true while any are active
/// so the compositor keeps scheduling frames.
pub fn tick(app: &mut App) -> bool {
    if app.animations.is_empty() {
        return false;
    }
    let now = Instant::now();
    let anims: Vec<Animation> = app.animations.drain(..).collect();
    let mut live = Vec::with_capacity(anims.len());
    for a in anims {
        let t = a.progress(now);
        if t >= 1.0 {
            complete(app, &a);
            continue;
        }
        let p = ease_in_out_cubic(t);
        match app.window_by_id_mut(a.window_id) {
            Some(w) => {
                w.set_rect(lerp_rect(a.from, a.to, p));
                if a.kind == AnimationKind::Snap {
                    // Resize along the way so the program has reflowed by
                    // the time the animation settles.
                    w.resize_to_geometry();
                }
                live.push(a);
            }
            None => {} // window closed mid-flight
        }
    }
    app.animations = live;
    app.ui_dirty = true;
    true
}

/// Commit an animation's end state exactly. Interpolation rounding never
/// leaks into the final geometry because the target rect is assigned
/// verbatim here.
pub fn complete(app: &mut App, a: &Animation) {
    let Some(idx) = app.window_index(a.window_id) else { return };
    match a.kind {
        AnimationKind::Snap => {
            let w = &mut app.windows[idx];
            w.set_rect(a.to);
            w.resize_to_geometry();
        }
        AnimationKind::Minimize => {
            let ws;
            let was_focused;
            {
                let w = &mut app.windows[idx];
                w.minimizing = false;
                w.minimized = true;
                // The dock shrink was purely visual; the window keeps its
                // pre-minimize geometry while hidden.
                let prev = w.pre_minimize.take().unwrap_or(a.from);
                w.set_rect(prev);
                w.resize_to_geometry();
                ws = w.workspace;
                was_focused = app.focused[ws as usize] == Some(idx);
            }
            if was_focused {
                // Plain focus transfer; deliberately not animated so a
                // burst of minimizes cannot cascade.
                let next = crate::workspace::resolve_focus(&app.windows, ws);
                app.focused[ws as usize] = next;
                if let Some(n) = next {
                    let z = app.max_z(ws) + 1;
                    app.windows[n].z = z;
                }
            }
        }
        AnimationKind::Restore => {
            let ws;
            {
                let w = &mut app.windows[idx];
                w.minimizing = false;
                w.minimized = false;
                w.set_rect(a.to);
                w.resize_to_geometry();
                ws = w.workspace;
            }
            if ws == app.current_workspace {
                crate::workspace::focus_window(app, idx);
                crate::layout::retile(app);
            }
        }
    }
    app.ui_dirty = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easing_is_monotonic_and_bounded() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        let mut prev = 0.0;
        for i in 0..=100 {
            let v = ease_in_out_cubic(i as f64 / 100.0);
            assert!(v >= prev - 1e-9);
            assert!((0.0..=1.0).contains(&v));
            prev = v;
        }
        // Symmetric about the midpoint.
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn lerp_endpoints_are_exact() {
        let from = Rect::new(10, 5, 40, 20);
        let to = Rect::new(3, 22, 14, 1);
        assert_eq!(lerp_rect(from, to, 0.0), from);
        assert_eq!(lerp_rect(from, to, 1.0), to);
        let mid = lerp_rect(from, to, 0.5);
        assert!(mid.x <= from.x && mid.x >= to.x);
        assert!(mid.y >= from.y && mid.y <= to.y);
    }
}
