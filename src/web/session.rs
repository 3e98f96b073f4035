//! One isolated PTY session per web connection. The session is a pump
//! between the transport channels and a freshly spawned program; the
//! client-side emulator renders the raw output, while a local parser
//! shadows it only to detect title changes.

use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use portable_pty::{CommandBuilder, PtySize};

use super::protocol::Message;

/// Everything the session loop can wake up on: client traffic and the
/// session's own PTY.
pub enum SessionEvent {
    FromClient(Message),
    PtyOutput(Vec<u8>),
    PtyExited,
}

pub struct SessionConfig {
    pub read_only: bool,
    /// Program to host; defaults to this binary so each connection gets
    /// its own full instance.
    pub program: Option<String>,
}

/// Drive one session to completion. The contract with the client:
/// nothing is emitted until the initial resize arrives; then `Options`
/// exactly once, an `Output` stream, and `Closed` exactly once before
/// the transport goes away.
pub fn run_session(
    events: Receiver<SessionEvent>,
    events_tx: Sender<SessionEvent>,
    out: Sender<Message>,
    cfg: SessionConfig,
) -> io::Result<()> {
    let mut closed_sent = false;
    let send_closed = |out: &Sender<Message>, closed_sent: &mut bool| {
        if !*closed_sent {
            let _ = out.send(Message::Closed);
            *closed_sent = true;
        }
    };

    // Phase 1: wait for the sizing resize.
    let (cols, rows) = loop {
        match events.recv() {
            Ok(SessionEvent::FromClient(Message::Resize { cols, rows })) => {
                break (cols.max(2), rows.max(2))
            }
            Ok(SessionEvent::FromClient(Message::Ping)) => {
                let _ = out.send(Message::Pong);
            }
            Ok(SessionEvent::FromClient(Message::Closed)) | Err(_) => {
                send_closed(&out, &mut closed_sent);
                return Ok(());
            }
            Ok(_) => {} // input before sizing is dropped
        }
    };

    // Phase 2: spawn the hosted program.
    let pty_system = portable_pty::native_pty_system();
    let pair = pty_system
        .openpty(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
        .map_err(|e| io::Error::other(format!("openpty: {e}")))?;
    let mut cmd = match &cfg.program {
        Some(p) => {
            let mut parts = p.split_whitespace();
            let mut c = CommandBuilder::new(parts.next().unwrap_or(p));
            c.args(parts);
            c
        }
        None => match std::env::current_exe() {
            Ok(exe) => CommandBuilder::new(exe),
            Err(_) => CommandBuilder::new_default_prog(),
        },
    };
    cmd.env("TERM", "xterm-256color");
    cmd.env("COLORTERM", "truecolor");
    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| io::Error::other(format!("spawn: {e}")))?;
    drop(pair.slave);
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| io::Error::other(format!("pty writer: {e}")))?;
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| io::Error::other(format!("pty reader: {e}")))?;
    thread::spawn(move || {
        let mut buf = [0u8; 65536];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if events_tx.send(SessionEvent::PtyOutput(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
        let _ = events_tx.send(SessionEvent::PtyExited);
    });

    // Title shadow parser; output otherwise passes through untouched.
    let mut parser = vt100::Parser::new(rows, cols, 0);
    let mut last_title = String::new();

    let _ = out.send(Message::Options { read_only: cfg.read_only });

    // Phase 3: pump until either side ends.
    loop {
        match events.recv() {
            Ok(SessionEvent::FromClient(msg)) => match msg {
                Message::Input(bytes) => {
                    if !cfg.read_only {
                        let _ = writer.write_all(&bytes);
                        let _ = writer.flush();
                    }
                }
                Message::Resize { cols, rows } => {
                    let (cols, rows) = (cols.max(2), rows.max(2));
                    let _ = pair.master.resize(PtySize {
                        rows,
                        cols,
                        pixel_width: 0,
                        pixel_height: 0,
                    });
                    parser.screen_mut().set_size(rows, cols);
                }
                Message::Ping => {
                    let _ = out.send(Message::Pong);
                }
                Message::Closed => break,
                _ => {}
            },
            Ok(SessionEvent::PtyOutput(bytes)) => {
                parser.process(&bytes);
                let _ = out.send(Message::Output(bytes));
                let title = parser.screen().title();
                if !title.is_empty() && title != last_title {
                    last_title = title.to_string();
                    let _ = out.send(Message::SetTitle(last_title.clone()));
                }
            }
            Ok(SessionEvent::PtyExited) => break,
            Err(_) => break,
        }
    }

    let _ = child.kill();
    let _ = child.try_wait();
    send_closed(&out, &mut closed_sent);
    Ok(())
}
