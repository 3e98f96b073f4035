use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::Event as CrosstermEvent;
use ratatui::prelude::Rect;

use crate::animation::Animation;
use crate::config::Config;
use crate::style::StyleCache;
use crate::window::Window;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of workspaces. Workspace indices are 1-based; slot 0 of the
/// per-workspace arrays is unused.
pub const WORKSPACE_COUNT: u8 = 9;

pub const MIN_WINDOW_WIDTH: u16 = 12;
pub const MIN_WINDOW_HEIGHT: u16 = 4;

pub const DEFAULT_SCROLLBACK: usize = 10_000;
pub const SCROLLBACK_MIN: usize = 100;
pub const SCROLLBACK_MAX: usize = 1_000_000;

pub const PREFIX_TIMEOUT: Duration = Duration::from_secs(2);
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(2);
pub const CLOSE_GRACE: Duration = Duration::from_millis(200);

/// Drag distance (in cells) beyond which dropping a tiled window onto a
/// neighbor swaps their slots instead of snapping back.
pub const DRAG_SWAP_THRESHOLD: u16 = 5;

/// Safety bound for word-motion and char-search loops in copy mode.
pub const MOTION_SAFETY_BOUND: usize = 1000;

// ─── Events ─────────────────────────────────────────────────────────────────

/// Everything the UI thread can block on. Reader threads and the input
/// thread feed this channel; the UI thread drains it between frames.
pub enum AppEvent {
    Input(CrosstermEvent),
    /// A window's PTY reached EOF or its child exited; integrate the
    /// closure on the main path at the next frame.
    WindowExited(u64),
}

// ─── Modes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Keys drive the window manager.
    WindowManagement,
    /// Keys are translated to byte sequences for the focused window's PTY.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    Help,
    Logs,
    CacheStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPrefix {
    Window,
    Workspace,
    Minimize,
    Debug,
}

/// Prefix-active state entered by the leader chord; decays after 2 s.
pub struct PrefixState {
    pub since: Instant,
    pub sub: Option<SubPrefix>,
}

impl PrefixState {
    pub fn new() -> Self {
        PrefixState { since: Instant::now(), sub: None }
    }

    pub fn expired(&self) -> bool {
        self.since.elapsed() > PREFIX_TIMEOUT
    }
}

// ─── Window geometry states ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapState {
    None,
    Left,
    Right,
    Fullscreen,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// A snap request; `Unsnap` restores the pre-snap floating geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapTarget {
    Fullscreen,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Unsnap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// In-flight left-button window drag.
pub struct DragState {
    pub id: u64,
    /// Offset of the grab point from the window origin.
    pub dx: u16,
    pub dy: u16,
    pub start: (u16, u16),
    pub origin: Rect,
    pub moved: bool,
}

/// In-flight right-button window resize from one corner.
pub struct ResizeState {
    pub id: u64,
    pub corner: Corner,
    pub origin: Rect,
}

// ─── Notifications ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

pub struct Notification {
    pub text: String,
    pub severity: Severity,
    pub created: Instant,
    pub ttl: Duration,
}

impl Notification {
    pub fn expired(&self) -> bool {
        self.created.elapsed() > self.ttl
    }
}

// ─── Keybinding registry ────────────────────────────────────────────────────

/// Closed set of window-manager commands a key chord can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EnterTerminal,
    NewWindow,
    CloseWindow,
    FocusNext,
    FocusPrev,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    GrowWidth,
    ShrinkWidth,
    GrowHeight,
    ShrinkHeight,
    Snap(SnapTarget),
    SwapLeft,
    SwapRight,
    SwapUp,
    SwapDown,
    Minimize,
    RestoreAll,
    ToggleTiling,
    ResizeMasterGrow,
    ResizeMasterShrink,
    Rename,
    SwitchWorkspace(u8),
    MoveToWorkspace(u8),
    ToggleHelp,
    ToggleLogs,
    ToggleCacheStats,
    Quit,
}

pub struct Bind {
    pub code: crossterm::event::KeyCode,
    pub mods: crossterm::event::KeyModifiers,
    pub action: Action,
}

// ─── Per-workspace layout memory ────────────────────────────────────────────

pub struct WorkspaceLayout {
    pub tiling: bool,
    pub master_ratio: f64,
    /// Floating geometries captured when tiling was toggled on, restored
    /// when it is toggled off.
    pub floating_snapshot: Vec<(u64, Rect)>,
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        WorkspaceLayout { tiling: false, master_ratio: 0.5, floating_snapshot: Vec::new() }
    }
}

// ─── Rename prompt ──────────────────────────────────────────────────────────

pub struct RenameState {
    pub window_id: u64,
    pub buffer: String,
}

// ─── Top-level state ────────────────────────────────────────────────────────

/// Process-wide workspace manager. Owned and mutated exclusively by the
/// UI thread; reader threads only touch their own emulator behind its
/// mutex and the event channel.
pub struct App {
    pub windows: Vec<Window>,
    pub current_workspace: u8,
    /// Remembered focused window index per workspace (slot 0 unused).
    pub focused: [Option<usize>; WORKSPACE_COUNT as usize + 1],
    pub layouts: [WorkspaceLayout; WORKSPACE_COUNT as usize + 1],
    pub mode: Mode,
    pub overlay: Overlay,
    pub prefix: Option<PrefixState>,
    pub drag: Option<DragState>,
    pub resizing: Option<ResizeState>,
    pub animations: Vec<Animation>,
    pub notifications: VecDeque<Notification>,
    pub rename: Option<RenameState>,
    pub binds: Vec<Bind>,
    /// Most recent key chords for the --show-keys dockbar readout.
    pub recent_keys: VecDeque<String>,
    pub clipboard_cache: Option<String>,
    pub style_cache: StyleCache,
    pub config: Config,
    pub screen: Rect,
    pub next_window_id: u64,
    pub next_z: u32,
    pub frame_counter: u64,
    /// Set by any state mutation that must reach the screen; cleared by
    /// the compositor after a frame is emitted.
    pub ui_dirty: bool,
    pub quit: bool,
    pub event_tx: mpsc::Sender<AppEvent>,
}

impl App {
    pub fn new(config: Config, event_tx: mpsc::Sender<AppEvent>) -> Self {
        let binds = crate::input::default_binds(&config);
        App {
            windows: Vec::new(),
            current_workspace: 1,
            focused: Default::default(),
            layouts: Default::default(),
            mode: Mode::WindowManagement,
            overlay: Overlay::None,
            prefix: None,
            drag: None,
            resizing: None,
            animations: Vec::new(),
            notifications: VecDeque::new(),
            rename: None,
            binds,
            recent_keys: VecDeque::new(),
            clipboard_cache: None,
            style_cache: StyleCache::new(),
            config,
            screen: Rect::new(0, 0, 80, 24),
            next_window_id: 1,
            next_z: 1,
            frame_counter: 0,
            ui_dirty: true,
            quit: false,
            event_tx,
        }
    }

    pub fn focused_index(&self) -> Option<usize> {
        let idx = self.focused[self.current_workspace as usize]?;
        if idx < self.windows.len() { Some(idx) } else { None }
    }

    pub fn focused_window(&self) -> Option<&Window> {
        self.focused_index().map(|i| &self.windows[i])
    }

    pub fn focused_window_mut(&mut self) -> Option<&mut Window> {
        let idx = self.focused_index()?;
        Some(&mut self.windows[idx])
    }

    pub fn window_index(&self, id: u64) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    pub fn window_by_id_mut(&mut self, id: u64) -> Option<&mut Window> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    /// Indices of windows on the given workspace, in creation order.
    pub fn workspace_windows(&self, ws: u8) -> Vec<usize> {
        (0..self.windows.len()).filter(|&i| self.windows[i].workspace == ws).collect()
    }

    /// Indices of windows participating in rendering on the given
    /// workspace: not minimized, or still animating toward or away from
    /// the dock.
    pub fn visible_windows(&self, ws: u8) -> Vec<usize> {
        (0..self.windows.len())
            .filter(|&i| {
                let w = &self.windows[i];
                w.workspace == ws && (!w.minimized || w.minimizing || self.has_restore_animation(w.id))
            })
            .collect()
    }

    pub fn has_restore_animation(&self, id: u64) -> bool {
        self.animations
            .iter()
            .any(|a| a.window_id == id && a.kind == crate::animation::AnimationKind::Restore)
    }

    /// Windows counted by the tiling layout: on the workspace, not
    /// minimized and not on their way to the dock.
    pub fn tiled_windows(&self, ws: u8) -> Vec<usize> {
        (0..self.windows.len())
            .filter(|&i| {
                let w = &self.windows[i];
                w.workspace == ws && !w.minimized && !w.minimizing
            })
            .collect()
    }

    pub fn max_z(&self, ws: u8) -> u32 {
        self.windows
            .iter()
            .filter(|w| w.workspace == ws)
            .map(|w| w.z)
            .max()
            .unwrap_or(0)
    }

    pub fn tiling_enabled(&self) -> bool {
        self.layouts[self.current_workspace as usize].tiling
    }

    /// The rectangle windows may occupy: the screen minus the dock row.
    pub fn workspace_area(&self) -> Rect {
        crate::layout::workspace_area(self.screen, self.config.dockbar_top)
    }

    pub fn notify(&mut self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        match severity {
            Severity::Error => log::error!("{text}"),
            Severity::Warning => log::warn!("{text}"),
            _ => log::info!("{text}"),
        }
        self.notifications.push_back(Notification {
            text,
            severity,
            created: Instant::now(),
            ttl: NOTIFICATION_TTL,
        });
        // Old entries survive in the log overlay; the banner queue stays bounded.
        while self.notifications.len() > 16 {
            self.notifications.pop_front();
        }
        self.ui_dirty = true;
    }

    /// The notification currently shown in the banner, if any.
    pub fn active_notification(&mut self) -> Option<&Notification> {
        while self.notifications.front().is_some_and(|n| n.expired()) {
            self.notifications.pop_front();
        }
        self.notifications.front()
    }

    pub fn record_key(&mut self, label: String) {
        if !self.config.show_keys {
            return;
        }
        self.recent_keys.push_back(label);
        while self.recent_keys.len() > 8 {
            self.recent_keys.pop_front();
        }
    }
}
