//! The compositor: Z-ordered window overlay, chrome, dockbar,
//! notifications, and overlays, drawn into the ratatui buffer. The
//! buffer diff against the previous frame is what reaches the host
//! terminal.

use std::sync::Arc;

use chrono::Local;
use ratatui::buffer::Buffer;
use ratatui::layout::Position;
use ratatui::prelude::{Frame, Rect};
use ratatui::style::{Color, Modifier, Style};
use unicode_width::UnicodeWidthStr;

use crate::copy_mode::CopyState;
use crate::input;
use crate::layout::{self, DOCK_PILL_WIDTH};
use crate::style::cell_attrs;
use crate::types::{App, Mode, Overlay};
use crate::window::scrollback_len;

/// Whether anything must reach the screen this frame. When this returns
/// false the frame is skipped entirely and nothing is written to the
/// host terminal.
pub fn needs_frame(app: &App) -> bool {
    if app.ui_dirty || !app.animations.is_empty() {
        return true;
    }
    if !app.notifications.is_empty() || app.prefix.is_some() {
        return true;
    }
    let focused = app.focused_index();
    for idx in app.visible_windows(app.current_workspace) {
        let w = &app.windows[idx];
        if w.sequence() == w.last_rendered_seq {
            continue;
        }
        // Background windows redraw at a third of the frame rate.
        if focused != Some(idx) && app.frame_counter % 3 != 0 {
            continue;
        }
        return true;
    }
    false
}

pub fn render(f: &mut Frame, app: &mut App) {
    let screen = f.area();
    app.screen = screen;
    let ws_area = app.workspace_area();

    let mut order = app.visible_windows(app.current_workspace);
    order.sort_by_key(|&i| app.windows[i].z);
    for idx in order {
        render_window(f, app, idx, ws_area);
    }

    render_dockbar(f, app);
    render_notification(f, app);
    match app.overlay {
        Overlay::Help => render_help(f, app),
        Overlay::Logs => render_logs(f, app),
        Overlay::CacheStats => render_cache_stats(f, app),
        Overlay::None => {}
    }
    render_rename(f, app);
    place_cursor(f, app);

    app.ui_dirty = false;
}

fn put(buf: &mut Buffer, clip: Rect, x: u16, y: u16, sym: &str, style: Style) {
    if !clip.contains(Position { x, y }) {
        return;
    }
    if let Some(cell) = buf.cell_mut(Position { x, y }) {
        cell.set_symbol(sym);
        cell.set_style(style);
    }
}

fn put_str(buf: &mut Buffer, clip: Rect, x: u16, y: u16, text: &str, style: Style) {
    let mut cx = x;
    for ch in text.chars() {
        let mut b = [0u8; 4];
        let s = ch.encode_utf8(&mut b);
        let w = UnicodeWidthStr::width(&*s).max(1) as u16;
        put(buf, clip, cx, y, s, style);
        cx = cx.saturating_add(w);
    }
}

// ─── Windows ────────────────────────────────────────────────────────────────

fn render_window(f: &mut Frame, app: &mut App, idx: usize, ws_area: Rect) {
    app.windows[idx].sync_title();
    let focused = app.focused_index() == Some(idx);
    let tiling = app.tiling_enabled();
    let rect = app.windows[idx].rect();
    let clip = rect.intersection(ws_area);
    if clip.width == 0 || clip.height == 0 {
        return;
    }

    let theme = app.config.theme.clone();
    let border_set = app.config.border.set();
    let border_style = Style::default().fg(if focused {
        theme.border_focused
    } else {
        theme.border_unfocused
    });

    let buf = f.buffer_mut();
    let (x0, y0) = (rect.x, rect.y);
    let x1 = rect.x + rect.width - 1;
    let y1 = rect.y + rect.height - 1;

    // Frame.
    for x in rect.x + 1..x1 {
        put(buf, clip, x, y0, border_set.horizontal_top, border_style);
        put(buf, clip, x, y1, border_set.horizontal_bottom, border_style);
    }
    for y in rect.y + 1..y1 {
        put(buf, clip, x0, y, border_set.vertical_left, border_style);
        put(buf, clip, x1, y, border_set.vertical_right, border_style);
    }
    put(buf, clip, x0, y0, border_set.top_left, border_style);
    put(buf, clip, x1, y0, border_set.top_right, border_style);
    put(buf, clip, x0, y1, border_set.bottom_left, border_style);
    put(buf, clip, x1, y1, border_set.bottom_right, border_style);

    // Title and buttons live on the top border row.
    render_title_bar(buf, app, idx, rect, clip, focused, tiling);

    render_content(f, app, idx, rect, ws_area, focused);
}

fn render_title_bar(
    buf: &mut Buffer,
    app: &App,
    idx: usize,
    rect: Rect,
    clip: Rect,
    focused: bool,
    tiling: bool,
) {
    let theme = &app.config.theme;
    let w = &app.windows[idx];
    let title_style = Style::default()
        .fg(if focused { theme.title_focused } else { theme.title_unfocused })
        .add_modifier(if focused { Modifier::BOLD } else { Modifier::empty() });

    let mut title = format!(" {} ", w.display_title());
    if let Some(cm) = &w.copy_mode {
        if cm.offset > 0 {
            title.push_str(&format!("[-{}] ", cm.offset));
        } else {
            title.push_str("[copy] ");
        }
    }
    let max = rect.width.saturating_sub(10) as usize;
    if UnicodeWidthStr::width(title.as_str()) > max {
        let truncated: String = title.chars().take(max.saturating_sub(1)).collect();
        title = format!("{truncated}…");
    }
    put_str(buf, clip, rect.x + 2, rect.y, &title, title_style);

    if app.config.hide_window_buttons || rect.width < 10 {
        return;
    }
    let ascii = app.config.ascii_only;
    let right = rect.x + rect.width;
    let btn_style = Style::default().fg(theme.title_unfocused);
    put(buf, clip, right - 3, rect.y, if ascii { "x" } else { "×" }, btn_style);
    if !tiling {
        put(buf, clip, right - 5, rect.y, if ascii { "+" } else { "□" }, btn_style);
        put(buf, clip, right - 7, rect.y, if ascii { "-" } else { "─" }, btn_style);
    }
}

fn render_content(
    f: &mut Frame,
    app: &mut App,
    idx: usize,
    rect: Rect,
    ws_area: Rect,
    focused: bool,
) {
    let inner = Rect::new(
        rect.x + 1,
        rect.y + 1,
        rect.width.saturating_sub(2),
        rect.height.saturating_sub(2),
    );
    let clip = inner.intersection(ws_area);
    if clip.width == 0 || clip.height == 0 {
        return;
    }

    let term = Arc::clone(&app.windows[idx].term);
    let Ok(mut parser) = term.lock() else { return };

    let (offset, copy_view) = match &app.windows[idx].copy_mode {
        Some(cm) => (cm.offset, true),
        None => (0, false),
    };
    let saved = parser.screen().scrollback();
    if copy_view {
        parser.screen_mut().set_scrollback(offset);
    }

    let theme = app.config.theme.clone();
    {
        let screen = parser.screen();
        let buf = f.buffer_mut();
        let (rows, cols) = screen.size();
        for ry in 0..inner.height {
            let y = inner.y + ry;
            let mut rx = 0u16;
            while rx < inner.width {
                let x = inner.x + rx;
                if ry >= rows || rx >= cols {
                    put(buf, clip, x, y, " ", Style::default());
                    rx += 1;
                    continue;
                }
                match screen.cell(ry, rx) {
                    Some(cell) if cell.is_wide_continuation() => {
                        rx += 1;
                    }
                    Some(cell) => {
                        let style = app.style_cache.styled(
                            cell.fgcolor(),
                            cell.bgcolor(),
                            cell_attrs(cell),
                            focused,
                        );
                        let contents = cell.contents();
                        let wide = cell.is_wide();
                        if contents.is_empty() {
                            put(buf, clip, x, y, " ", style);
                        } else if wide && rx + 1 < inner.width {
                            put(buf, clip, x, y, &contents, style);
                            put(buf, clip, x + 1, y, " ", style);
                        } else if wide {
                            put(buf, clip, x, y, " ", style);
                        } else {
                            put(buf, clip, x, y, &contents, style);
                        }
                        rx += if wide { 2 } else { 1 };
                    }
                    None => {
                        put(buf, clip, x, y, " ", Style::default());
                        rx += 1;
                    }
                }
            }
        }
    }

    // Copy-mode decorations re-lock the emulator, so the guard must be
    // released (with the view offset restored) before drawing them.
    let sb = if copy_view { scrollback_len(&mut parser) } else { 0 };
    parser.screen_mut().set_scrollback(saved);
    drop(parser);
    if copy_view {
        render_copy_decorations(f, app, idx, inner, clip, sb, &theme);
        render_copy_scrollbar(f, app, idx, rect, ws_area, sb, &theme);
    }

    let w = &mut app.windows[idx];
    w.last_rendered_seq = w.sequence();
}

fn render_copy_decorations(
    f: &mut Frame,
    app: &mut App,
    idx: usize,
    inner: Rect,
    clip: Rect,
    sb: usize,
    theme: &crate::style::Theme,
) {
    let term = Arc::clone(&app.windows[idx].term);
    let Ok(mut parser) = term.lock() else { return };
    let Some(cm) = &app.windows[idx].copy_mode else { return };
    let buf = f.buffer_mut();
    let abs_top = sb.saturating_sub(cm.offset);

    // Search matches.
    for (i, m) in cm.matches.iter().enumerate() {
        if m.line < abs_top || m.line >= abs_top + inner.height as usize {
            continue;
        }
        let y = inner.y + (m.line - abs_top) as u16;
        let bg = if cm.current_match == Some(i) {
            theme.search_current_bg
        } else {
            theme.search_bg
        };
        for col in m.start_col..m.end_col.min(inner.width) {
            let x = inner.x + col;
            if clip.contains(Position { x, y }) {
                if let Some(cell) = buf.cell_mut(Position { x, y }) {
                    cell.set_bg(bg);
                    cell.set_fg(Color::Black);
                }
            }
        }
    }

    // Visual selection.
    if let Some((start, end, _line_wise)) = cm.selection(&mut parser) {
        for line in start.0..=end.0 {
            if line < abs_top || line >= abs_top + inner.height as usize {
                continue;
            }
            let y = inner.y + (line - abs_top) as u16;
            let from = if line == start.0 { start.1 } else { 0 };
            let to = if line == end.0 { end.1 } else { inner.width.saturating_sub(1) };
            for col in from..=to.min(inner.width.saturating_sub(1)) {
                let x = inner.x + col;
                if clip.contains(Position { x, y }) {
                    if let Some(cell) = buf.cell_mut(Position { x, y }) {
                        cell.set_bg(theme.selection_bg);
                    }
                }
            }
        }
    }

    // The copy cursor.
    let x = inner.x + cm.cursor_x.min(inner.width.saturating_sub(1));
    let y = inner.y + cm.cursor_y.min(inner.height.saturating_sub(1));
    if clip.contains(Position { x, y }) {
        if let Some(cell) = buf.cell_mut(Position { x, y }) {
            cell.set_bg(theme.copy_cursor_bg);
            cell.set_fg(Color::Black);
        }
    }

    // Search input line, drawn over the window's bottom border.
    if cm.state == CopyState::Search {
        let prompt = format!("{}{}", if cm.search_forward { '/' } else { '?' }, cm.search_input);
        let y = inner.y + inner.height; // bottom border row
        let style = Style::default().fg(theme.search_current_bg);
        let max = inner.width.saturating_sub(2) as usize;
        let shown: String = prompt.chars().rev().take(max).collect::<Vec<_>>().into_iter().rev().collect();
        put_str(buf, clip_expand_row(clip, y), inner.x + 1, y, &shown, style);
    }
}

/// The search prompt sits on the border row just below the clip; widen
/// the clip vertically by one so it can land there when visible.
fn clip_expand_row(clip: Rect, y: u16) -> Rect {
    if y == clip.y + clip.height {
        Rect::new(clip.x, clip.y, clip.width, clip.height + 1)
    } else {
        clip
    }
}

fn render_copy_scrollbar(
    f: &mut Frame,
    app: &App,
    idx: usize,
    rect: Rect,
    ws_area: Rect,
    sb: usize,
    theme: &crate::style::Theme,
) {
    let Some(cm) = &app.windows[idx].copy_mode else { return };
    if sb == 0 || rect.height < 4 {
        return;
    }
    let clip = rect.intersection(ws_area);
    let buf = f.buffer_mut();
    let track_h = rect.height.saturating_sub(2) as usize;
    // offset == sb is the oldest view, offset == 0 the live screen.
    let frac = 1.0 - (cm.offset as f64 / sb as f64);
    let marker = (frac * (track_h.saturating_sub(1)) as f64).round() as u16;
    let x = rect.x + rect.width - 1;
    let y = rect.y + 1 + marker;
    put(buf, clip, x, y, "█", Style::default().fg(theme.border_focused));
}

// ─── Dockbar ────────────────────────────────────────────────────────────────

fn render_dockbar(f: &mut Frame, app: &mut App) {
    let theme = app.config.theme.clone();
    let dock = layout::dock_row(app.screen, app.config.dockbar_top);
    let buf = f.buffer_mut();
    let base = Style::default().bg(theme.dock_bg).fg(theme.dock_fg);
    for x in dock.x..dock.x + dock.width {
        put(buf, dock, x, dock.y, " ", base);
    }

    // Mode tag, 6 columns.
    let copy_active = app
        .focused_window()
        .map(|w| w.copy_mode.is_some())
        .unwrap_or(false);
    let (tag, tag_color) = if copy_active {
        ("COPY", theme.search_bg)
    } else if app.prefix.as_ref().is_some_and(|p| !p.expired()) {
        ("PFX", theme.search_current_bg)
    } else {
        match app.mode {
            Mode::WindowManagement => ("WM", theme.dock_active),
            Mode::Terminal => ("TERM", theme.notify_success),
        }
    };
    let tag_style = Style::default().bg(theme.dock_bg).fg(tag_color).add_modifier(Modifier::BOLD);
    put_str(buf, dock, dock.x + 1, dock.y, tag, tag_style);

    // Workspace indicator, two columns per digit.
    let digits_x = dock.x + 6;
    for ws in 1..=crate::types::WORKSPACE_COUNT {
        let x = digits_x + (ws as u16 - 1) * 2;
        let has_windows = app.windows.iter().any(|w| w.workspace == ws);
        let style = if ws == app.current_workspace {
            Style::default().bg(theme.dock_active).fg(theme.dock_bg).add_modifier(Modifier::BOLD)
        } else if has_windows {
            base.add_modifier(Modifier::BOLD)
        } else {
            base.add_modifier(Modifier::DIM)
        };
        put_str(buf, dock, x, dock.y, &format!("{ws} "), style);
    }

    // Minimized pills.
    let minimized: Vec<usize> = app
        .workspace_windows(app.current_workspace)
        .into_iter()
        .filter(|&i| app.windows[i].minimized || app.windows[i].minimizing)
        .collect();
    for (slot, &idx) in minimized.iter().enumerate() {
        let r = layout::dock_slot_rect(app.screen, app.config.dockbar_top, slot);
        let title = app.windows[idx].display_title();
        let label: String = title.chars().take(DOCK_PILL_WIDTH as usize - 2).collect();
        let pill = Style::default().bg(theme.selection_bg).fg(theme.dock_fg);
        for x in r.x..r.x + r.width {
            put(buf, dock, x, dock.y, " ", pill);
        }
        put_str(buf, dock, r.x + 1, dock.y, &label, pill);
    }

    // Right side: recent keys, then the clock.
    let clock = Local::now().format("%H:%M").to_string();
    let clock_x = (dock.x + dock.width).saturating_sub(clock.len() as u16 + 1);
    put_str(buf, dock, clock_x, dock.y, &clock, base.add_modifier(Modifier::BOLD));
    if app.config.show_keys && !app.recent_keys.is_empty() {
        let keys: Vec<String> = app.recent_keys.iter().cloned().collect();
        let text = keys.join(" ");
        let width = UnicodeWidthStr::width(text.as_str()) as u16;
        let x = clock_x.saturating_sub(width + 2);
        put_str(buf, dock, x, dock.y, &text, base.add_modifier(Modifier::DIM));
    }
}

// ─── Notifications ──────────────────────────────────────────────────────────

fn render_notification(f: &mut Frame, app: &mut App) {
    let theme = app.config.theme.clone();
    let screen = app.screen;
    let top = app.workspace_area().y;
    let Some(n) = app.active_notification() else { return };
    let color = theme.notify_color(n.severity);
    let text = format!(" {} ", n.text);
    let width = (UnicodeWidthStr::width(text.as_str()) as u16).min(screen.width);
    let x = screen.x + screen.width - width;
    let style = Style::default().bg(color).fg(Color::Black).add_modifier(Modifier::BOLD);
    let buf = f.buffer_mut();
    put_str(buf, screen, x, top, &text, style);
}

// ─── Overlays ───────────────────────────────────────────────────────────────

fn overlay_area(app: &App) -> Rect {
    // Full screen minus the dock row.
    app.workspace_area()
}

fn render_overlay_frame(f: &mut Frame, app: &App, title: &str) -> Rect {
    let area = overlay_area(app);
    let theme = &app.config.theme;
    let set = app.config.border.set();
    let style = Style::default().fg(theme.overlay_border);
    let fill = Style::default().bg(theme.dock_bg).fg(theme.dock_fg);
    let buf = f.buffer_mut();
    for y in area.y..area.y + area.height {
        for x in area.x..area.x + area.width {
            put(buf, area, x, y, " ", fill);
        }
    }
    let x1 = area.x + area.width - 1;
    let y1 = area.y + area.height - 1;
    for x in area.x + 1..x1 {
        put(buf, area, x, area.y, set.horizontal_top, style);
        put(buf, area, x, y1, set.horizontal_bottom, style);
    }
    for y in area.y + 1..y1 {
        put(buf, area, area.x, y, set.vertical_left, style);
        put(buf, area, x1, y, set.vertical_right, style);
    }
    put(buf, area, area.x, area.y, set.top_left, style);
    put(buf, area, x1, area.y, set.top_right, style);
    put(buf, area, area.x, y1, set.bottom_left, style);
    put(buf, area, x1, y1, set.bottom_right, style);
    put_str(buf, area, area.x + 2, area.y, &format!(" {title} "), style.add_modifier(Modifier::BOLD));
    Rect::new(area.x + 2, area.y + 1, area.width.saturating_sub(4), area.height.saturating_sub(2))
}

fn render_help(f: &mut Frame, app: &mut App) {
    let inner = render_overlay_frame(f, app, "help");
    let theme = app.config.theme.clone();
    let key_style = Style::default().bg(theme.dock_bg).fg(theme.dock_active).add_modifier(Modifier::BOLD);
    let desc_style = Style::default().bg(theme.dock_bg).fg(theme.dock_fg);
    let head_style = Style::default().bg(theme.dock_bg).fg(theme.search_current_bg).add_modifier(Modifier::BOLD);

    // Three columns, one per section.
    let col_w = inner.width / 3;
    let buf = f.buffer_mut();
    for (col, (heading, keys)) in crate::help::overlay_sections().into_iter().enumerate() {
        let x = inner.x + col as u16 * col_w;
        put_str(buf, inner, x, inner.y, heading, head_style);
        for (row, (chord, desc)) in keys.iter().enumerate() {
            let y = inner.y + 2 + row as u16;
            if y >= inner.y + inner.height {
                break;
            }
            put_str(buf, inner, x, y, chord, key_style);
            put_str(buf, inner, x + 18, y, desc, desc_style);
        }
    }
}

fn render_logs(f: &mut Frame, app: &mut App) {
    let inner = render_overlay_frame(f, app, "logs");
    let theme = app.config.theme.clone();
    let entries = crate::logging::entries();
    let take = inner.height as usize;
    let start = entries.len().saturating_sub(take);
    let buf = f.buffer_mut();
    for (row, entry) in entries[start..].iter().enumerate() {
        let y = inner.y + row as u16;
        let level_color = match entry.level {
            log::Level::Error => theme.notify_error,
            log::Level::Warn => theme.notify_warning,
            log::Level::Info => theme.notify_info,
            _ => theme.dock_fg,
        };
        let line = format!(
            "{} {:5} {}",
            entry.time.format("%H:%M:%S"),
            entry.level,
            entry.message
        );
        let style = Style::default().bg(theme.dock_bg).fg(level_color);
        put_str(buf, inner, inner.x, y, &line, style);
    }
}

fn render_cache_stats(f: &mut Frame, app: &mut App) {
    let inner = render_overlay_frame(f, app, "style cache");
    let theme = app.config.theme.clone();
    let stats = app.style_cache.stats();
    let total = stats.hits + stats.misses;
    let hit_rate = if total > 0 { stats.hits as f64 * 100.0 / total as f64 } else { 0.0 };
    let lines = [
        format!("entries    {}", stats.len),
        format!("hits       {}", stats.hits),
        format!("misses     {}", stats.misses),
        format!("hit rate   {hit_rate:.1}%"),
        format!("evictions  {}", stats.evictions),
    ];
    let style = Style::default().bg(theme.dock_bg).fg(theme.dock_fg);
    let buf = f.buffer_mut();
    for (row, line) in lines.iter().enumerate() {
        put_str(buf, inner, inner.x, inner.y + row as u16, line, style);
    }
}

// ─── Rename prompt ──────────────────────────────────────────────────────────

fn render_rename(f: &mut Frame, app: &mut App) {
    let Some(r) = &app.rename else { return };
    let theme = app.config.theme.clone();
    let dock = layout::dock_row(app.screen, app.config.dockbar_top);
    let style = Style::default().bg(theme.dock_bg).fg(theme.search_current_bg);
    let buf = f.buffer_mut();
    for x in dock.x..dock.x + dock.width {
        put(buf, dock, x, dock.y, " ", style);
    }
    let text = format!("rename: {}█", r.buffer);
    put_str(buf, dock, dock.x + 1, dock.y, &text, style);
}

// ─── Hardware cursor ────────────────────────────────────────────────────────

fn place_cursor(f: &mut Frame, app: &mut App) {
    if app.mode != Mode::Terminal || app.overlay != Overlay::None || app.rename.is_some() {
        return;
    }
    let Some(idx) = app.focused_index() else { return };
    let w = &app.windows[idx];
    if w.copy_mode.is_some() {
        return;
    }
    let Ok(parser) = w.term.lock() else { return };
    if parser.screen().hide_cursor() {
        return;
    }
    let (cy, cx) = parser.screen().cursor_position();
    drop(parser);
    let rect = w.rect();
    let x = rect.x + 1 + cx;
    let y = rect.y + 1 + cy;
    let ws_area = app.workspace_area();
    let pos = Position { x, y };
    if !rect.intersection(ws_area).contains(pos) {
        return;
    }
    // The cursor cell must not be covered by a higher window.
    if input::hit_test(app, x, y) != Some(idx) {
        return;
    }
    f.set_cursor_position(pos);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::Severity;
    use crate::workspace;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::sync::mpsc;

    fn test_app() -> (App, mpsc::Receiver<crate::types::AppEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut app = App::new(Config::default(), tx);
        app.screen = Rect::new(0, 0, 80, 24);
        (app, rx)
    }

    #[test]
    fn idle_app_skips_frames() {
        let (mut app, _rx) = test_app();
        assert!(needs_frame(&app)); // initial paint
        app.ui_dirty = false;
        assert!(!needs_frame(&app));
        app.notify(Severity::Info, "hello");
        assert!(needs_frame(&app));
    }

    #[test]
    fn chrome_reaches_the_buffer() {
        let (mut app, _rx) = test_app();
        let idx = workspace::add_window(&mut app, Some("sh")).unwrap();
        app.windows[idx].set_rect(Rect::new(2, 1, 40, 12));
        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &mut app)).unwrap();
        let buf = terminal.backend().buffer().clone();
        // Rounded corners of the window frame.
        assert_eq!(buf.cell(Position { x: 2, y: 1 }).unwrap().symbol(), "╭");
        assert_eq!(buf.cell(Position { x: 41, y: 1 }).unwrap().symbol(), "╮");
        assert_eq!(buf.cell(Position { x: 2, y: 12 }).unwrap().symbol(), "╰");
        // Dock row carries the workspace indicator.
        assert_eq!(buf.cell(Position { x: 6, y: 23 }).unwrap().symbol(), "1");
        workspace::close_window(&mut app, idx);
    }

    #[test]
    fn windows_clip_against_the_dock_row() {
        let (mut app, _rx) = test_app();
        let idx = workspace::add_window(&mut app, Some("sh")).unwrap();
        // Try to cover the whole screen; the dock row must survive.
        app.windows[idx].set_rect(Rect::new(0, 0, 80, 24));
        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &mut app)).unwrap();
        let buf = terminal.backend().buffer().clone();
        // Bottom border row would be at y=23 but the dock owns it.
        assert_ne!(buf.cell(Position { x: 40, y: 23 }).unwrap().symbol(), "─");
        workspace::close_window(&mut app, idx);
    }

    #[test]
    fn rendering_clears_the_dirty_flag() {
        let (mut app, _rx) = test_app();
        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &mut app)).unwrap();
        assert!(!app.ui_dirty);
    }
}
