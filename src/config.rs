use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyModifiers};
use serde::Deserialize;

use crate::cli::CliArgs;
use crate::style::{BorderKind, Theme, DEFAULT_THEME};
use crate::types::{DEFAULT_SCROLLBACK, SCROLLBACK_MAX, SCROLLBACK_MIN};

/// Resolved runtime configuration: file values with CLI flags layered on
/// top. A parse failure never aborts startup; the defaults win and the
/// problem is surfaced as a warning notification.
pub struct Config {
    pub theme: Theme,
    pub border: BorderKind,
    pub dockbar_top: bool,
    pub hide_window_buttons: bool,
    pub ascii_only: bool,
    pub show_keys: bool,
    pub scrollback_lines: usize,
    pub default_program: Option<String>,
    pub prefix: (KeyCode, KeyModifiers),
    pub keybind_overrides: Vec<(String, String)>,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            theme: DEFAULT_THEME,
            border: BorderKind::Rounded,
            dockbar_top: false,
            hide_window_buttons: false,
            ascii_only: false,
            show_keys: false,
            scrollback_lines: DEFAULT_SCROLLBACK,
            default_program: None,
            prefix: (KeyCode::Char('b'), KeyModifiers::CONTROL),
            keybind_overrides: Vec::new(),
            debug: false,
        }
    }
}

/// On-disk schema (`~/.config/tuios/config.toml`).
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    theme: Option<String>,
    border_style: Option<String>,
    dockbar_position: Option<String>,
    hide_window_buttons: Option<bool>,
    ascii_only: Option<bool>,
    show_keys: Option<bool>,
    scrollback_lines: Option<usize>,
    default_program: Option<String>,
    prefix_key: Option<String>,
    #[serde(rename = "keybindings")]
    keybindings: Option<std::collections::BTreeMap<String, String>>,
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tuios").join("config.toml"))
}

/// Load the config file (if any), merge CLI flags over it, and clamp.
/// Returns the config plus any warnings to surface once the UI is up.
pub fn load(cli: &CliArgs) -> (Config, Vec<String>) {
    let contents = config_path().and_then(|p| std::fs::read_to_string(p).ok());
    from_sources(contents.as_deref(), cli)
}

pub fn from_sources(file: Option<&str>, cli: &CliArgs) -> (Config, Vec<String>) {
    let mut warnings = Vec::new();
    let mut cfg = Config::default();

    let parsed: ConfigFile = match file {
        Some(text) => match toml::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                warnings.push(format!("config parse error, using defaults: {e}"));
                ConfigFile::default()
            }
        },
        None => ConfigFile::default(),
    };

    let theme_name = cli.theme.clone().or(parsed.theme);
    if let Some(name) = theme_name {
        match Theme::by_name(&name) {
            Some(t) => cfg.theme = t,
            None => warnings.push(format!("unknown theme {name:?}, using default")),
        }
    }
    let border_name = cli.border_style.clone().or(parsed.border_style);
    if let Some(name) = border_name {
        match BorderKind::parse(&name) {
            Some(b) => cfg.border = b,
            None => warnings.push(format!("unknown border style {name:?}, using rounded")),
        }
    }
    let dock = cli.dockbar_position.clone().or(parsed.dockbar_position);
    if let Some(pos) = dock {
        match pos.as_str() {
            "top" => cfg.dockbar_top = true,
            "bottom" => cfg.dockbar_top = false,
            other => warnings.push(format!("unknown dockbar position {other:?}, using bottom")),
        }
    }
    cfg.hide_window_buttons = cli.hide_window_buttons || parsed.hide_window_buttons.unwrap_or(false);
    cfg.ascii_only = cli.ascii_only || parsed.ascii_only.unwrap_or(false);
    cfg.show_keys = cli.show_keys || parsed.show_keys.unwrap_or(false);
    cfg.debug = cli.debug;
    if cfg.ascii_only {
        cfg.border = BorderKind::Ascii;
    }

    let scrollback = cli.scrollback_lines.or(parsed.scrollback_lines).unwrap_or(DEFAULT_SCROLLBACK);
    cfg.scrollback_lines = scrollback.clamp(SCROLLBACK_MIN, SCROLLBACK_MAX);

    cfg.default_program = parsed.default_program;

    if let Some(spec) = parsed.prefix_key {
        match parse_key(&spec) {
            Some(chord) => cfg.prefix = chord,
            None => warnings.push(format!("unparseable prefix_key {spec:?}, keeping ctrl+b")),
        }
    }

    if let Some(binds) = parsed.keybindings {
        cfg.keybind_overrides = binds.into_iter().collect();
    }

    (cfg, warnings)
}

/// Parse a chord like `"ctrl+b"`, `"alt+enter"`, `"f5"`, or `"x"`.
pub fn parse_key(spec: &str) -> Option<(KeyCode, KeyModifiers)> {
    let mut mods = KeyModifiers::NONE;
    let mut code = None;
    for part in spec.split('+') {
        let p = part.trim().to_lowercase();
        match p.as_str() {
            "ctrl" | "control" | "c" => mods |= KeyModifiers::CONTROL,
            "alt" | "meta" | "m" => mods |= KeyModifiers::ALT,
            "shift" | "s" => mods |= KeyModifiers::SHIFT,
            "enter" | "return" => code = Some(KeyCode::Enter),
            "esc" | "escape" => code = Some(KeyCode::Esc),
            "space" => code = Some(KeyCode::Char(' ')),
            "tab" => code = Some(KeyCode::Tab),
            "backspace" => code = Some(KeyCode::Backspace),
            "up" => code = Some(KeyCode::Up),
            "down" => code = Some(KeyCode::Down),
            "left" => code = Some(KeyCode::Left),
            "right" => code = Some(KeyCode::Right),
            "home" => code = Some(KeyCode::Home),
            "end" => code = Some(KeyCode::End),
            "pageup" => code = Some(KeyCode::PageUp),
            "pagedown" => code = Some(KeyCode::PageDown),
            _ => {
                if let Some(n) = p.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=12).contains(&n) {
                        code = Some(KeyCode::F(n));
                        continue;
                    }
                }
                let mut chars = part.trim().chars();
                let c = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                if c.is_uppercase() {
                    mods |= KeyModifiers::SHIFT;
                }
                code = Some(KeyCode::Char(c));
            }
        }
    }
    code.map(|c| (c, mods))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Command;

    fn bare_cli() -> CliArgs {
        CliArgs {
            command: Command::Run,
            theme: None,
            border_style: None,
            dockbar_position: None,
            hide_window_buttons: false,
            ascii_only: false,
            show_keys: false,
            scrollback_lines: None,
            debug: false,
        }
    }

    #[test]
    fn defaults_without_file() {
        let (cfg, warnings) = from_sources(None, &bare_cli());
        assert!(warnings.is_empty());
        assert_eq!(cfg.scrollback_lines, DEFAULT_SCROLLBACK);
        assert_eq!(cfg.border, BorderKind::Rounded);
        assert_eq!(cfg.prefix, (KeyCode::Char('b'), KeyModifiers::CONTROL));
    }

    #[test]
    fn file_values_apply() {
        let toml = r#"
            theme = "mono"
            border_style = "double"
            dockbar_position = "top"
            scrollback_lines = 500
            prefix_key = "ctrl+a"

            [keybindings]
            new-window = "c"
        "#;
        let (cfg, warnings) = from_sources(Some(toml), &bare_cli());
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(cfg.theme.name, "mono");
        assert_eq!(cfg.border, BorderKind::Double);
        assert!(cfg.dockbar_top);
        assert_eq!(cfg.scrollback_lines, 500);
        assert_eq!(cfg.prefix, (KeyCode::Char('a'), KeyModifiers::CONTROL));
        assert_eq!(cfg.keybind_overrides, vec![("new-window".into(), "c".into())]);
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let (cfg, warnings) = from_sources(Some("theme = ["), &bare_cli());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("parse error"));
        assert_eq!(cfg.theme.name, "default");
    }

    #[test]
    fn scrollback_is_clamped() {
        let (cfg, _) = from_sources(Some("scrollback_lines = 5"), &bare_cli());
        assert_eq!(cfg.scrollback_lines, SCROLLBACK_MIN);
        let (cfg, _) = from_sources(Some("scrollback_lines = 99999999"), &bare_cli());
        assert_eq!(cfg.scrollback_lines, SCROLLBACK_MAX);
    }

    #[test]
    fn cli_flags_win_over_file() {
        let mut cli = bare_cli();
        cli.scrollback_lines = Some(2000);
        cli.border_style = Some("thick".into());
        let (cfg, _) = from_sources(Some("scrollback_lines = 500\nborder_style = \"double\""), &cli);
        assert_eq!(cfg.scrollback_lines, 2000);
        assert_eq!(cfg.border, BorderKind::Thick);
    }

    #[test]
    fn ascii_only_forces_ascii_borders() {
        let mut cli = bare_cli();
        cli.ascii_only = true;
        cli.border_style = Some("rounded".into());
        let (cfg, _) = from_sources(None, &cli);
        assert_eq!(cfg.border, BorderKind::Ascii);
    }

    #[test]
    fn key_chord_parsing() {
        assert_eq!(parse_key("ctrl+b"), Some((KeyCode::Char('b'), KeyModifiers::CONTROL)));
        assert_eq!(parse_key("alt+enter"), Some((KeyCode::Enter, KeyModifiers::ALT)));
        assert_eq!(parse_key("f5"), Some((KeyCode::F(5), KeyModifiers::NONE)));
        assert_eq!(parse_key("X"), Some((KeyCode::Char('X'), KeyModifiers::SHIFT)));
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("ctrl+notakey"), None);
    }

    #[test]
    fn unknown_theme_warns_and_defaults() {
        let (cfg, warnings) = from_sources(Some("theme = \"nope\""), &bare_cli());
        assert_eq!(cfg.theme.name, "default");
        assert_eq!(warnings.len(), 1);
    }
}
