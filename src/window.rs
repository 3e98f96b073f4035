use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use ratatui::prelude::Rect;
use thiserror::Error;

use crate::copy_mode::CopyMode;
use crate::types::{AppEvent, SnapState, CLOSE_GRACE, MIN_WINDOW_HEIGHT, MIN_WINDOW_WIDTH};

/// Upper bound on a requested terminal dimension; anything larger is a
/// caller bug, not a screen we can exist on.
const MAX_TERM_DIM: u16 = 1000;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("failed to open pty: {0}")]
    PtyOpen(String),
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },
    #[error("requested size {0}x{1} is too large")]
    TooLarge(u16, u16),
    #[error("pty is gone")]
    PtyGone,
}

/// Owned snapshot of one emulator cell, for callers that must not hold
/// the emulator lock.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSnapshot {
    pub contents: String,
    pub fg: vt100::Color,
    pub bg: vt100::Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub inverse: bool,
    pub dim: bool,
    /// 0 = continuation of a preceding wide cell, otherwise 1 or 2.
    pub width: u16,
}

/// One PTY-backed terminal window. Geometry is in screen cells and
/// includes the one-cell border on each side; the emulator grid is
/// always `(width - 2, height - 2)`.
pub struct Window {
    pub id: u64,
    /// Emulator-set (OSC) title, falling back to the spawned program name.
    pub title: String,
    /// User-supplied name from the rename prompt; wins over `title`.
    pub custom_name: Option<String>,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub z: u32,
    pub workspace: u8,
    pub minimized: bool,
    pub minimizing: bool,
    pub being_manipulated: bool,
    pub snap_state: SnapState,
    pub pre_minimize: Option<Rect>,
    pub pre_snap: Option<Rect>,
    pub term: Arc<Mutex<vt100::Parser>>,
    /// Monotonic sequence bumped by the reader thread on every processed
    /// chunk; the compositor compares against `last_rendered_seq`.
    pub seq: Arc<AtomicU64>,
    pub last_rendered_seq: u64,
    pub copy_mode: Option<CopyMode>,
    /// PTY reached EOF or the child exited; close at the next frame.
    pub dead: bool,
    master: Box<dyn MasterPty>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    shutdown: Arc<AtomicBool>,
}

impl Window {
    /// Open a PTY, spawn `program` (or the user's shell) and start the
    /// reader thread. No resources are leaked when the spawn fails.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: u64,
        workspace: u8,
        program: Option<&str>,
        rect: Rect,
        scrollback: usize,
        event_tx: mpsc::Sender<AppEvent>,
    ) -> Result<Window, WindowError> {
        if rect.width > MAX_TERM_DIM || rect.height > MAX_TERM_DIM {
            return Err(WindowError::TooLarge(rect.width, rect.height));
        }
        let width = rect.width.max(MIN_WINDOW_WIDTH);
        let height = rect.height.max(MIN_WINDOW_HEIGHT);
        let (cols, rows) = (width - 2, height - 2);

        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| WindowError::PtyOpen(e.to_string()))?;

        let (cmd, title) = build_command(program);
        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| WindowError::Spawn { program: title.clone(), message: e.to_string() })?;
        // The child owns the sole slave reference from here on.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| WindowError::PtyOpen(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| WindowError::PtyOpen(e.to_string()))?;

        let term = Arc::new(Mutex::new(vt100::Parser::new(rows, cols, scrollback)));
        let seq = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let term_reader = Arc::clone(&term);
        let seq_writer = Arc::clone(&seq);
        let shutdown_reader = Arc::clone(&shutdown);
        thread::spawn(move || {
            let mut buf = [0u8; 65536];
            loop {
                if shutdown_reader.load(Ordering::Acquire) {
                    break;
                }
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Ok(mut parser) = term_reader.lock() {
                            parser.process(&buf[..n]);
                        }
                        seq_writer.fetch_add(1, Ordering::Release);
                    }
                    Err(_) => break,
                }
            }
            let _ = event_tx.send(AppEvent::WindowExited(id));
        });

        Ok(Window {
            id,
            title,
            custom_name: None,
            x: rect.x,
            y: rect.y,
            width,
            height,
            z: 0,
            workspace,
            minimized: false,
            minimizing: false,
            being_manipulated: false,
            snap_state: SnapState::None,
            pre_minimize: None,
            pre_snap: None,
            term,
            seq,
            last_rendered_seq: 0,
            copy_mode: None,
            dead: false,
            master: pair.master,
            writer: Some(writer),
            child,
            shutdown,
        })
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn set_rect(&mut self, r: Rect) {
        self.x = r.x;
        self.y = r.y;
        self.width = r.width.max(MIN_WINDOW_WIDTH);
        self.height = r.height.max(MIN_WINDOW_HEIGHT);
    }

    /// Emulator grid dimensions implied by the current geometry.
    pub fn inner_size(&self) -> (u16, u16) {
        (self.width.saturating_sub(2).max(1), self.height.saturating_sub(2).max(1))
    }

    /// Title shown in the chrome: the user's name wins, then the
    /// emulator-set title.
    pub fn display_title(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.title)
    }

    pub fn sequence(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    /// Write bytes to the PTY master. All writes happen on the UI thread;
    /// the per-window writer is the serialization point.
    pub fn send_input(&mut self, bytes: &[u8]) -> Result<(), WindowError> {
        let writer = self.writer.as_mut().ok_or(WindowError::PtyGone)?;
        writer.write_all(bytes).map_err(|_| WindowError::PtyGone)?;
        writer.flush().map_err(|_| WindowError::PtyGone)
    }

    /// Resize PTY and emulator together under the emulator lock so the
    /// reader thread never parses against a half-applied size.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        let cols = cols.max(MIN_WINDOW_WIDTH - 2);
        let rows = rows.max(MIN_WINDOW_HEIGHT - 2);
        if let Ok(mut parser) = self.term.lock() {
            if parser.screen().size() == (rows, cols) {
                return;
            }
            // A rejected PTY resize keeps the old size on both sides.
            if let Err(e) = self.master.resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 }) {
                log::warn!("pty resize to {cols}x{rows} rejected: {e}");
                return;
            }
            parser.screen_mut().set_size(rows, cols);
        }
    }

    /// Resize the emulator to match the current window geometry.
    pub fn resize_to_geometry(&mut self) {
        let (cols, rows) = self.inner_size();
        self.resize(cols, rows);
    }

    /// Pull the emulator-set title into `self.title`. Returns true when
    /// it changed.
    pub fn sync_title(&mut self) -> bool {
        let Ok(parser) = self.term.lock() else { return false };
        let t = parser.screen().title();
        if !t.is_empty() && t != self.title {
            let t = t.to_string();
            drop(parser);
            self.title = t;
            true
        } else {
            false
        }
    }

    /// Read one live-screen cell (window content coordinates).
    pub fn cell_at(&self, x: u16, y: u16) -> Option<CellSnapshot> {
        let parser = self.term.lock().ok()?;
        let cell = parser.screen().cell(y, x)?;
        Some(snapshot_cell(cell))
    }

    pub fn child_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Hang up, give the child a bounded grace to exit, then force-kill.
    /// Also cancels the reader thread.
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Dropping the writer closes our side; the child sees EOF/HUP.
        self.writer = None;
        let deadline = Instant::now() + CLOSE_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                _ => {
                    let _ = self.child.kill();
                    let _ = self.child.try_wait();
                    break;
                }
            }
        }
    }
}

fn build_command(program: Option<&str>) -> (CommandBuilder, String) {
    let mut cmd = match program {
        Some(p) => {
            let mut parts = p.split_whitespace();
            let prog = parts.next().unwrap_or(p);
            let resolved = which::which(prog)
                .map(|pb| pb.to_string_lossy().into_owned())
                .unwrap_or_else(|_| prog.to_string());
            let mut c = CommandBuilder::new(resolved);
            c.args(parts);
            c
        }
        None => CommandBuilder::new_default_prog(),
    };
    cmd.env("TERM", "xterm-256color");
    cmd.env("COLORTERM", "truecolor");
    cmd.env("TERM_PROGRAM", "tuios");
    cmd.env("TERM_PROGRAM_VERSION", crate::types::VERSION);
    let title = program
        .and_then(|p| p.split_whitespace().next())
        .map(|p| {
            std::path::Path::new(p)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(p)
                .to_string()
        })
        .or_else(|| {
            std::env::var("SHELL").ok().and_then(|s| {
                std::path::Path::new(&s)
                    .file_stem()
                    .map(|st| st.to_string_lossy().into_owned())
            })
        })
        .unwrap_or_else(|| "shell".to_string());
    (cmd, title)
}

fn snapshot_cell(cell: &vt100::Cell) -> CellSnapshot {
    let contents = cell.contents();
    let width = if cell.is_wide_continuation() {
        0
    } else if cell.is_wide() {
        2
    } else {
        1
    };
    CellSnapshot {
        contents: if contents.is_empty() { " ".to_string() } else { contents.to_string() },
        fg: cell.fgcolor(),
        bg: cell.bgcolor(),
        bold: cell.bold(),
        italic: cell.italic(),
        underline: cell.underline(),
        inverse: cell.inverse(),
        dim: cell.dim(),
        width,
    }
}

// ─── Scrollback / virtual line access ───────────────────────────────────────
//
// Copy mode and search address `(scrollback ∥ live screen)` as one line
// space: absolute line 0 is the oldest scrollback line, lines
// `scrollback_len..total_lines` are the live screen top to bottom. The
// emulator exposes scrollback by repositioning its view, so these
// helpers save and restore the view offset around each access.

/// Number of lines currently held in the scrollback ring.
pub fn scrollback_len(parser: &mut vt100::Parser) -> usize {
    let saved = parser.screen().scrollback();
    parser.screen_mut().set_scrollback(usize::MAX);
    let len = parser.screen().scrollback();
    parser.screen_mut().set_scrollback(saved);
    len
}

/// Scrollback plus live screen rows.
pub fn total_lines(parser: &mut vt100::Parser) -> usize {
    let rows = parser.screen().size().0 as usize;
    scrollback_len(parser) + rows
}

/// Run `f` against the screen positioned so that absolute line `abs` is
/// the row passed to the closure. Returns `None` past the end.
pub fn with_absolute_line<R>(
    parser: &mut vt100::Parser,
    abs: usize,
    f: impl FnOnce(&vt100::Screen, u16) -> R,
) -> Option<R> {
    let rows = parser.screen().size().0 as usize;
    let sb = scrollback_len(parser);
    let saved = parser.screen().scrollback();
    let (offset, row) = if abs < sb {
        (sb - abs, 0u16)
    } else if abs - sb < rows {
        (0, (abs - sb) as u16)
    } else {
        return None;
    };
    parser.screen_mut().set_scrollback(offset);
    let out = f(parser.screen(), row);
    parser.screen_mut().set_scrollback(saved);
    Some(out)
}

/// Snapshot the non-continuation cells of absolute line `abs` as
/// `(start_col, contents)` pairs. Empty cells read as a single space.
pub fn line_cells(parser: &mut vt100::Parser, abs: usize) -> Option<Vec<(u16, String)>> {
    let cols = parser.screen().size().1;
    with_absolute_line(parser, abs, |screen, row| {
        let mut out = Vec::with_capacity(cols as usize);
        let mut col = 0u16;
        while col < cols {
            match screen.cell(row, col) {
                Some(cell) if cell.is_wide_continuation() => {
                    col += 1;
                }
                Some(cell) => {
                    let t = cell.contents();
                    let text = if t.is_empty() { " ".to_string() } else { t.to_string() };
                    let wide = cell.is_wide();
                    out.push((col, text));
                    col += if wide { 2 } else { 1 };
                }
                None => {
                    out.push((col, " ".to_string()));
                    col += 1;
                }
            }
        }
        out
    })
}

/// Absolute line `abs` flattened to plain text (continuation cells
/// skipped, trailing blanks trimmed).
pub fn line_text(parser: &mut vt100::Parser, abs: usize) -> Option<String> {
    let cells = line_cells(parser, abs)?;
    let mut s: String = cells.iter().map(|(_, t)| t.as_str()).collect();
    let trimmed = s.trim_end().len();
    s.truncate(trimmed);
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser_with_lines(lines: &[&str], rows: u16, cols: u16, scrollback: usize) -> vt100::Parser {
        let mut p = vt100::Parser::new(rows, cols, scrollback);
        for (i, l) in lines.iter().enumerate() {
            if i > 0 {
                p.process(b"\r\n");
            }
            p.process(l.as_bytes());
        }
        p
    }

    #[test]
    fn scrollback_ring_is_bounded() {
        let mut p = vt100::Parser::new(4, 20, 100);
        for i in 0..200 {
            p.process(format!("line {i}\r\n").as_bytes());
        }
        assert_eq!(scrollback_len(&mut p), 100);
        // One more write evicts exactly the oldest line.
        let oldest_before = line_text(&mut p, 0).unwrap();
        p.process(b"line 200\r\n");
        assert_eq!(scrollback_len(&mut p), 100);
        let oldest_after = line_text(&mut p, 0).unwrap();
        assert_ne!(oldest_before, oldest_after);
    }

    #[test]
    fn absolute_lines_span_scrollback_and_screen() {
        let mut p = parser_with_lines(
            &["one", "two", "three", "four", "five", "six"],
            4,
            20,
            100,
        );
        // 6 lines on a 4-row screen: two scrolled off.
        assert_eq!(scrollback_len(&mut p), 2);
        assert_eq!(total_lines(&mut p), 6);
        assert_eq!(line_text(&mut p, 0).as_deref(), Some("one"));
        assert_eq!(line_text(&mut p, 1).as_deref(), Some("two"));
        assert_eq!(line_text(&mut p, 2).as_deref(), Some("three"));
        assert_eq!(line_text(&mut p, 5).as_deref(), Some("six"));
        assert_eq!(line_text(&mut p, 6), None);
    }

    #[test]
    fn line_access_preserves_view_offset() {
        let mut p = parser_with_lines(&["a", "b", "c", "d", "e", "f"], 4, 20, 100);
        p.screen_mut().set_scrollback(1);
        let _ = line_text(&mut p, 0);
        assert_eq!(p.screen().scrollback(), 1);
    }

    #[test]
    fn wide_cells_collapse_to_single_entries() {
        let mut p = parser_with_lines(&["a\u{4f60}b"], 4, 20, 0);
        let cells = line_cells(&mut p, 0).unwrap();
        assert_eq!(cells[0], (0, "a".to_string()));
        assert_eq!(cells[1].0, 1);
        assert_eq!(cells[1].1, "\u{4f60}");
        // The wide cell consumes columns 1-2; the next entry starts at 3.
        assert_eq!(cells[2], (3, "b".to_string()));
    }

    #[test]
    fn spawn_failure_surfaces_as_error() {
        let (tx, _rx) = std::sync::mpsc::channel();
        let err = Window::create(
            1,
            1,
            Some("/nonexistent/definitely-not-a-program"),
            Rect::new(0, 0, 40, 12),
            100,
            tx,
        );
        assert!(matches!(err, Err(WindowError::Spawn { .. })));
    }

    #[test]
    fn shell_window_round_trip() {
        let (tx, _rx) = std::sync::mpsc::channel();
        let mut w = Window::create(1, 1, Some("sh"), Rect::new(0, 0, 40, 12), 100, tx).unwrap();
        w.send_input(b"printf 'marker-%s\\n' ok\r").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut found = false;
        while Instant::now() < deadline {
            {
                let mut parser = w.term.lock().unwrap();
                let total = total_lines(&mut parser);
                for abs in 0..total {
                    if line_text(&mut parser, abs).is_some_and(|l| l.contains("marker-ok")) {
                        found = true;
                        break;
                    }
                }
            }
            if found {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
        assert!(found, "child output never reached the emulator");
        w.close();
    }

    #[test]
    fn grid_tracks_geometry_minus_border() {
        let (tx, _rx) = std::sync::mpsc::channel();
        let mut w = Window::create(1, 1, Some("sh"), Rect::new(2, 3, 44, 14), 100, tx).unwrap();
        assert_eq!(w.inner_size(), (42, 12));
        {
            let parser = w.term.lock().unwrap();
            assert_eq!(parser.screen().size(), (12, 42));
        }
        w.set_rect(Rect::new(2, 3, 30, 10));
        w.resize_to_geometry();
        {
            let parser = w.term.lock().unwrap();
            assert_eq!(parser.screen().size(), (8, 28));
        }
        w.close();
    }
}
