use crate::types::VERSION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// The terminal window manager itself.
    Run,
    /// Serve isolated sessions over the framed wire protocol.
    Web(WebArgs),
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebArgs {
    pub host: String,
    pub port: u16,
    pub read_only: bool,
    pub max_connections: usize,
}

impl Default for WebArgs {
    fn default() -> Self {
        WebArgs { host: "127.0.0.1".to_string(), port: 7681, read_only: false, max_connections: 32 }
    }
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub command: Command,
    pub theme: Option<String>,
    pub border_style: Option<String>,
    pub dockbar_position: Option<String>,
    pub hide_window_buttons: bool,
    pub ascii_only: bool,
    pub show_keys: bool,
    pub scrollback_lines: Option<usize>,
    pub debug: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
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
}

/// Parse process arguments (without the binary name).
pub fn parse(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut web: Option<WebArgs> = None;
    let mut i = 0;

    if args.first().map(|a| a.as_str()) == Some("web") {
        web = Some(WebArgs::default());
        i = 1;
    }

    let value = |args: &[String], i: usize, flag: &str| -> Result<String, String> {
        args.get(i + 1).cloned().ok_or_else(|| format!("{flag} requires a value"))
    };

    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-h" | "--help" => {
                cli.command = Command::Help;
                return Ok(cli);
            }
            "-V" | "--version" => {
                cli.command = Command::Version;
                return Ok(cli);
            }
            "--theme" => {
                cli.theme = Some(value(args, i, arg)?);
                i += 1;
            }
            "--border-style" => {
                cli.border_style = Some(value(args, i, arg)?);
                i += 1;
            }
            "--dockbar-position" => {
                cli.dockbar_position = Some(value(args, i, arg)?);
                i += 1;
            }
            "--hide-window-buttons" => cli.hide_window_buttons = true,
            "--ascii-only" => cli.ascii_only = true,
            "--show-keys" => cli.show_keys = true,
            "--scrollback-lines" => {
                let v = value(args, i, arg)?;
                let n = v.parse::<usize>().map_err(|_| format!("invalid --scrollback-lines value {v:?}"))?;
                cli.scrollback_lines = Some(n);
                i += 1;
            }
            "--debug" => cli.debug = true,
            "--host" => {
                let v = value(args, i, arg)?;
                match web.as_mut() {
                    Some(w) => w.host = v,
                    None => return Err("--host is only valid with the web command".into()),
                }
                i += 1;
            }
            "--port" => {
                let v = value(args, i, arg)?;
                let port = v.parse::<u16>().map_err(|_| format!("invalid --port value {v:?}"))?;
                match web.as_mut() {
                    Some(w) => w.port = port,
                    None => return Err("--port is only valid with the web command".into()),
                }
                i += 1;
            }
            "--read-only" => match web.as_mut() {
                Some(w) => w.read_only = true,
                None => return Err("--read-only is only valid with the web command".into()),
            },
            "--max-connections" => {
                let v = value(args, i, arg)?;
                let n = v.parse::<usize>().map_err(|_| format!("invalid --max-connections value {v:?}"))?;
                match web.as_mut() {
                    Some(w) => w.max_connections = n.max(1),
                    None => return Err("--max-connections is only valid with the web command".into()),
                }
                i += 1;
            }
            other => return Err(format!("unknown argument {other:?} (try --help)")),
        }
        i += 1;
    }

    if let Some(w) = web {
        cli.command = Command::Web(w);
    }
    Ok(cli)
}

pub fn print_help() {
    println!(
        r#"tuios {VERSION} - terminal window manager

USAGE:
    tuios [FLAGS]
    tuios web [FLAGS]

FLAGS:
    --theme <name>             Color theme (default, ocean, mono)
    --border-style <style>     Window borders: rounded, plain, double, thick, ascii
    --dockbar-position <pos>   Dockbar row: bottom (default) or top
    --hide-window-buttons      Do not draw title-bar buttons
    --ascii-only               Restrict chrome to ASCII characters
    --show-keys                Show recent keystrokes on the dockbar
    --scrollback-lines <n>     Scrollback per window, clamped to 100..1000000
    --debug                    Verbose logging (visible in the log overlay)
    -h, --help                 Show this help
    -V, --version              Show version

WEB FLAGS (after the `web` command):
    --host <addr>              Bind address (default 127.0.0.1)
    --port <port>              Bind port (default 7681)
    --read-only                Drop client input, stream output only
    --max-connections <n>      Concurrent session limit (default 32)

KEYS (window management mode):
    i / Enter    focus terminal     n  new window      x  close window
    Tab / S-Tab  cycle focus        m  minimize        f  fullscreen snap
    h j k l      move window        t  toggle tiling   r  rename
    H J K L      resize window      1-9 switch workspace   ?  help

The leader (default Ctrl+B) opens the prefix namespace from terminal
mode: d detach to management, [ copy mode, t window commands, w
workspace commands, m minimize commands, D debug overlays.
"#
    );
}

pub fn print_version() {
    println!("tuios {VERSION}");
}
