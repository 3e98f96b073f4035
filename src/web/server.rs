//! Framed-stream listener for the web variant. Each accepted connection
//! gets its own isolated session; the WebSocket / HTTP3 endpoints that
//! browsers speak wrap this framed channel and live outside this crate.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::cli::WebArgs;

use super::protocol::{self, Message, ProtocolError};
use super::session::{run_session, SessionConfig, SessionEvent};

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const READ_POLL: Duration = Duration::from_millis(500);

/// Bind and serve until the shutdown flag flips. Bind failure is fatal
/// at startup and propagates to the caller.
pub fn run(opts: &WebArgs, program: Option<String>, shutdown: Arc<AtomicBool>) -> io::Result<()> {
    let listener = TcpListener::bind((opts.host.as_str(), opts.port))?;
    listener.set_nonblocking(true)?;
    log::info!("web: listening on {}:{} (read_only={})", opts.host, opts.port, opts.read_only);

    let active = Arc::new(AtomicUsize::new(0));
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if active.load(Ordering::SeqCst) >= opts.max_connections {
                    log::warn!("web: rejecting {peer}: connection limit reached");
                    drop(stream);
                    continue;
                }
                active.fetch_add(1, Ordering::SeqCst);
                let active = Arc::clone(&active);
                let shutdown = Arc::clone(&shutdown);
                let cfg = SessionConfig { read_only: opts.read_only, program: program.clone() };
                thread::spawn(move || {
                    log::info!("web: session for {peer} opened");
                    if let Err(e) = handle_connection(stream, cfg, shutdown) {
                        log::warn!("web: session for {peer} failed: {e}");
                    } else {
                        log::info!("web: session for {peer} closed");
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                log::warn!("web: accept failed: {e}");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    log::info!("web: shutting down");
    Ok(())
}

fn handle_connection(
    stream: TcpStream,
    cfg: SessionConfig,
    shutdown: Arc<AtomicBool>,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    let mut write_half = stream.try_clone()?;
    let mut read_half = stream;

    let (ev_tx, ev_rx) = mpsc::channel::<SessionEvent>();
    let (out_tx, out_rx) = mpsc::channel::<Message>();

    // Writer: drains session output onto the socket. Ends when the
    // session drops its sender.
    let writer = thread::spawn(move || {
        for msg in out_rx {
            if protocol::write_frame(&mut write_half, &msg).is_err() {
                break;
            }
        }
        let _ = write_half.shutdown(std::net::Shutdown::Write);
    });

    // Session: owns the PTY and the pump loop.
    let session_ev_tx = ev_tx.clone();
    let session = thread::spawn(move || run_session(ev_rx, session_ev_tx, out_tx, cfg));

    // This thread: parse frames off the socket into session events.
    loop {
        if shutdown.load(Ordering::SeqCst) {
            let _ = ev_tx.send(SessionEvent::FromClient(Message::Closed));
            break;
        }
        match protocol::read_frame(&mut read_half) {
            Ok(Some(msg)) => {
                if ev_tx.send(SessionEvent::FromClient(msg)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                let _ = ev_tx.send(SessionEvent::FromClient(Message::Closed));
                break;
            }
            Err(ProtocolError::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(e) => {
                log::debug!("web: dropping connection on protocol error: {e}");
                let _ = ev_tx.send(SessionEvent::FromClient(Message::Closed));
                break;
            }
        }
    }
    drop(ev_tx);

    let result = session.join().unwrap_or_else(|_| Err(io::Error::other("session panicked")));
    let _ = writer.join();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn free_port_args() -> WebArgs {
        // Bind to port 0 first to find a free port, then reuse it.
        let probe = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        WebArgs { host: "127.0.0.1".into(), port, read_only: false, max_connections: 4 }
    }

    #[test]
    fn end_to_end_framed_handshake() {
        let opts = free_port_args();
        let shutdown = Arc::new(AtomicBool::new(false));
        let server_shutdown = Arc::clone(&shutdown);
        let server_opts = opts.clone();
        let server = thread::spawn(move || {
            run(&server_opts, Some("sh".to_string()), server_shutdown)
        });

        // Connect with a retry window while the listener comes up.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut stream = loop {
            match TcpStream::connect(("127.0.0.1", opts.port)) {
                Ok(s) => break s,
                Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
                Err(e) => panic!("connect: {e}"),
            }
        };

        protocol::write_frame(&mut stream, &Message::Resize { cols: 120, rows: 40 }).unwrap();
        let first = protocol::read_frame(&mut stream).unwrap().unwrap();
        assert_eq!(first, Message::Options { read_only: false });

        protocol::write_frame(&mut stream, &Message::Ping).unwrap();
        // Pong arrives amid the output stream.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got_pong = false;
        while Instant::now() < deadline {
            match protocol::read_frame(&mut stream) {
                Ok(Some(Message::Pong)) => {
                    got_pong = true;
                    break;
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => panic!("read: {e}"),
            }
        }
        assert!(got_pong);

        // Client hangup: the server must answer with exactly one Closed
        // before tearing the transport down.
        protocol::write_frame(&mut stream, &Message::Closed).unwrap();
        let mut closes = 0;
        loop {
            match protocol::read_frame(&mut stream) {
                Ok(Some(Message::Closed)) => closes += 1,
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        assert_eq!(closes, 1);

        shutdown.store(true, Ordering::SeqCst);
        server.join().unwrap().unwrap();
    }
}
