//! Color conversion, themes, and the compositor's bounded style cache.

use std::collections::HashMap;

use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::border;

// ─── VT color conversion ────────────────────────────────────────────────────

pub fn vt_to_color(c: vt100::Color) -> Color {
    match c {
        vt100::Color::Default => Color::Reset,
        vt100::Color::Idx(i) => Color::Indexed(i),
        vt100::Color::Rgb(r, g, b) => Color::Rgb(r, g, b),
    }
}

// ─── Attribute bits used as cache-key components ────────────────────────────

pub const ATTR_BOLD: u8 = 1;
pub const ATTR_ITALIC: u8 = 2;
pub const ATTR_UNDERLINE: u8 = 4;
pub const ATTR_INVERSE: u8 = 8;
pub const ATTR_DIM: u8 = 16;

pub fn cell_attrs(cell: &vt100::Cell) -> u8 {
    let mut a = 0;
    if cell.bold() {
        a |= ATTR_BOLD;
    }
    if cell.italic() {
        a |= ATTR_ITALIC;
    }
    if cell.underline() {
        a |= ATTR_UNDERLINE;
    }
    if cell.inverse() {
        a |= ATTR_INVERSE;
    }
    if cell.dim() {
        a |= ATTR_DIM;
    }
    a
}

fn encode_color(c: vt100::Color) -> u32 {
    match c {
        vt100::Color::Default => 0x0100_0000,
        vt100::Color::Idx(i) => 0x0200_0000 | i as u32,
        vt100::Color::Rgb(r, g, b) => ((r as u32) << 16) | ((g as u32) << 8) | b as u32,
    }
}

// ─── Style cache ────────────────────────────────────────────────────────────

const STYLE_CACHE_CAP: usize = 1024;

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct CacheKey {
    fg: u32,
    bg: u32,
    attrs: u8,
    focused: bool,
}

struct CacheEntry {
    style: Style,
    hits: u64,
    last_used: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StyleCacheStats {
    pub len: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded LRU-ish cache from `(fg, bg, attrs, focused)` to a composed
/// ratatui style. Eviction weighs both age and hit frequency.
pub struct StyleCache {
    map: HashMap<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    clock: u64,
}

impl StyleCache {
    pub fn new() -> Self {
        StyleCache { map: HashMap::new(), hits: 0, misses: 0, evictions: 0, clock: 0 }
    }

    pub fn styled(&mut self, fg: vt100::Color, bg: vt100::Color, attrs: u8, focused: bool) -> Style {
        self.clock += 1;
        let key = CacheKey { fg: encode_color(fg), bg: encode_color(bg), attrs, focused };
        if let Some(entry) = self.map.get_mut(&key) {
            entry.hits += 1;
            entry.last_used = self.clock;
            self.hits += 1;
            return entry.style;
        }
        self.misses += 1;
        let style = compose_style(fg, bg, attrs, focused);
        if self.map.len() >= STYLE_CACHE_CAP {
            self.evict();
        }
        self.map.insert(key, CacheEntry { style, hits: 1, last_used: self.clock });
        style
    }

    /// Drop the coldest eighth of the cache, scoring entries by recency
    /// plus accumulated hits.
    fn evict(&mut self) {
        let mut scored: Vec<(CacheKey, u64)> = self
            .map
            .iter()
            .map(|(k, e)| (*k, e.last_used + e.hits * 16))
            .collect();
        scored.sort_by_key(|&(_, score)| score);
        let drop_count = (STYLE_CACHE_CAP / 8).max(1);
        for (key, _) in scored.into_iter().take(drop_count) {
            self.map.remove(&key);
            self.evictions += 1;
        }
    }

    pub fn stats(&self) -> StyleCacheStats {
        StyleCacheStats {
            len: self.map.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}

fn compose_style(fg: vt100::Color, bg: vt100::Color, attrs: u8, focused: bool) -> Style {
    let mut fg = vt_to_color(fg);
    let mut bg = vt_to_color(bg);
    if attrs & ATTR_INVERSE != 0 {
        std::mem::swap(&mut fg, &mut bg);
    }
    let mut style = Style::default().fg(fg).bg(bg);
    if attrs & ATTR_BOLD != 0 {
        style = style.add_modifier(Modifier::BOLD);
    }
    if attrs & ATTR_ITALIC != 0 {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if attrs & ATTR_UNDERLINE != 0 {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if attrs & ATTR_DIM != 0 || !focused {
        style = style.add_modifier(Modifier::DIM);
    }
    style
}

// ─── Border styles ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderKind {
    Rounded,
    Plain,
    Double,
    Thick,
    Ascii,
}

impl BorderKind {
    pub fn parse(s: &str) -> Option<BorderKind> {
        match s {
            "rounded" => Some(BorderKind::Rounded),
            "plain" | "single" => Some(BorderKind::Plain),
            "double" => Some(BorderKind::Double),
            "thick" => Some(BorderKind::Thick),
            "ascii" => Some(BorderKind::Ascii),
            _ => None,
        }
    }

    pub fn set(self) -> border::Set {
        const ASCII: border::Set = border::Set {
            top_left: "+",
            top_right: "+",
            bottom_left: "+",
            bottom_right: "+",
            vertical_left: "|",
            vertical_right: "|",
            horizontal_top: "-",
            horizontal_bottom: "-",
        };
        match self {
            BorderKind::Rounded => border::ROUNDED,
            BorderKind::Plain => border::PLAIN,
            BorderKind::Double => border::DOUBLE,
            BorderKind::Thick => border::THICK,
            BorderKind::Ascii => ASCII,
        }
    }
}

// ─── Themes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Theme {
    pub name: &'static str,
    pub border_focused: Color,
    pub border_unfocused: Color,
    pub title_focused: Color,
    pub title_unfocused: Color,
    pub dock_bg: Color,
    pub dock_fg: Color,
    pub dock_active: Color,
    pub selection_bg: Color,
    pub search_bg: Color,
    pub search_current_bg: Color,
    pub copy_cursor_bg: Color,
    pub overlay_border: Color,
    pub notify_info: Color,
    pub notify_success: Color,
    pub notify_warning: Color,
    pub notify_error: Color,
}

impl Theme {
    pub fn by_name(name: &str) -> Option<Theme> {
        match name {
            "default" => Some(DEFAULT_THEME.clone()),
            "ocean" => Some(Theme {
                name: "ocean",
                border_focused: Color::Rgb(86, 182, 194),
                border_unfocused: Color::Rgb(60, 80, 95),
                title_focused: Color::Rgb(220, 235, 240),
                dock_bg: Color::Rgb(20, 32, 44),
                dock_active: Color::Rgb(86, 182, 194),
                ..DEFAULT_THEME.clone()
            }),
            "mono" => Some(Theme {
                name: "mono",
                border_focused: Color::White,
                border_unfocused: Color::DarkGray,
                title_focused: Color::White,
                dock_bg: Color::Black,
                dock_active: Color::White,
                selection_bg: Color::DarkGray,
                search_bg: Color::DarkGray,
                search_current_bg: Color::Gray,
                ..DEFAULT_THEME.clone()
            }),
            _ => None,
        }
    }

    pub fn notify_color(&self, severity: crate::types::Severity) -> Color {
        match severity {
            crate::types::Severity::Info => self.notify_info,
            crate::types::Severity::Success => self.notify_success,
            crate::types::Severity::Warning => self.notify_warning,
            crate::types::Severity::Error => self.notify_error,
        }
    }
}

pub const DEFAULT_THEME: Theme = Theme {
    name: "default",
    border_focused: Color::Rgb(137, 180, 250),
    border_unfocused: Color::Rgb(88, 91, 112),
    title_focused: Color::Rgb(205, 214, 244),
    title_unfocused: Color::Rgb(127, 132, 156),
    dock_bg: Color::Rgb(24, 24, 37),
    dock_fg: Color::Rgb(166, 173, 200),
    dock_active: Color::Rgb(137, 180, 250),
    selection_bg: Color::Rgb(69, 71, 90),
    search_bg: Color::Rgb(250, 179, 135),
    search_current_bg: Color::Rgb(249, 226, 175),
    copy_cursor_bg: Color::Rgb(245, 224, 220),
    overlay_border: Color::Rgb(137, 180, 250),
    notify_info: Color::Rgb(137, 180, 250),
    notify_success: Color::Rgb(166, 227, 161),
    notify_warning: Color::Rgb(249, 226, 175),
    notify_error: Color::Rgb(243, 139, 168),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_counts_hits_and_misses() {
        let mut cache = StyleCache::new();
        let fg = vt100::Color::Idx(2);
        let bg = vt100::Color::Default;
        let a = cache.styled(fg, bg, ATTR_BOLD, true);
        let b = cache.styled(fg, bg, ATTR_BOLD, true);
        assert_eq!(a, b);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.len, 1);
    }

    #[test]
    fn focused_flag_is_part_of_the_key() {
        let mut cache = StyleCache::new();
        let fg = vt100::Color::Idx(2);
        let bg = vt100::Color::Default;
        let focused = cache.styled(fg, bg, 0, true);
        let unfocused = cache.styled(fg, bg, 0, false);
        assert_ne!(focused, unfocused);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn cache_stays_bounded() {
        let mut cache = StyleCache::new();
        for i in 0..3000u32 {
            let fg = vt100::Color::Rgb((i >> 8) as u8, i as u8, 7);
            cache.styled(fg, vt100::Color::Default, 0, true);
        }
        let stats = cache.stats();
        assert!(stats.len <= STYLE_CACHE_CAP);
        assert!(stats.evictions > 0);
    }

    #[test]
    fn inverse_swaps_colors() {
        let s = compose_style(vt100::Color::Idx(1), vt100::Color::Idx(2), ATTR_INVERSE, true);
        assert_eq!(s.fg, Some(Color::Indexed(2)));
        assert_eq!(s.bg, Some(Color::Indexed(1)));
    }

    #[test]
    fn unknown_theme_is_rejected_for_fallback() {
        assert!(Theme::by_name("no-such-theme").is_none());
        assert_eq!(Theme::by_name("default").unwrap().name, "default");
    }
}
