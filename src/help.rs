// Canonical keybinding reference for the help overlay. One table per
// input mode so the overlay and any future list-keys command share a
// single source of truth.

pub const MANAGEMENT_KEYS: &[(&str, &str)] = &[
    ("i / Enter", "focus terminal input"),
    ("n", "new window"),
    ("x", "close window"),
    ("Tab / S-Tab", "cycle focus"),
    ("h j k l / arrows", "move window (floating)"),
    ("H J K L", "swap slot (tiling) / resize (floating)"),
    ("m", "minimize"),
    ("f", "toggle fullscreen snap"),
    ("[ / ]", "snap left / right half"),
    ("C-y C-u C-b C-n", "snap quarters"),
    ("u", "unsnap"),
    ("t", "toggle tiling"),
    (", / .", "shrink / grow master"),
    ("r", "rename window"),
    ("1-9", "switch workspace"),
    ("shift+1-9", "move window to workspace"),
    ("?", "this help"),
    ("C-l / C-k", "log / cache-stats overlay"),
    ("C-q", "quit"),
];

pub const PREFIX_KEYS: &[(&str, &str)] = &[
    ("prefix prefix", "send literal leader"),
    ("prefix d / Esc", "to window management"),
    ("prefix [", "copy mode"),
    ("prefix t c", "new window"),
    ("prefix t x", "close window"),
    ("prefix t r", "rename window"),
    ("prefix t n / p", "next / previous window"),
    ("prefix t t", "toggle tiling"),
    ("prefix w 1-9", "switch workspace"),
    ("prefix w shift+1-9", "move window to workspace"),
    ("prefix m m", "minimize focused"),
    ("prefix m 1-9", "restore minimized by slot"),
    ("prefix m a", "restore all"),
    ("prefix D l", "log overlay"),
    ("prefix D c", "style-cache stats overlay"),
];

pub const COPY_KEYS: &[(&str, &str)] = &[
    ("h j k l", "move cursor"),
    ("w b e / W B E", "word motions"),
    ("0 ^ $", "line start / first char / line end"),
    ("C-u C-d / C-b C-f", "half / full page"),
    ("gg G nG", "document top / bottom / line n"),
    ("H M L", "screen top / middle / bottom"),
    ("{ }", "paragraph back / forward"),
    ("%", "matching bracket"),
    ("f F t T ; ,", "find char on line, repeat"),
    ("/ ?", "search forward / backward"),
    ("n N", "next / previous match"),
    ("C-l", "clear search highlights"),
    ("v V", "visual / visual line"),
    ("y", "yank selection to clipboard"),
    ("q / Esc", "leave copy mode"),
];

/// Flattened lines for the overlay renderer.
pub fn overlay_sections() -> [(&'static str, &'static [(&'static str, &'static str)]); 3] {
    [
        ("Window management", MANAGEMENT_KEYS),
        ("Prefix (terminal mode)", PREFIX_KEYS),
        ("Copy mode", COPY_KEYS),
    ]
}
