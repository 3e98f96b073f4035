mod animation;
mod cli;
mod clipboard;
mod config;
mod copy_mode;
mod help;
mod input;
mod layout;
mod logging;
mod rendering;
mod search;
mod style;
mod types;
mod web;
mod window;
mod workspace;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::Rect;
use ratatui::Terminal;

use crate::types::{App, AppEvent, Severity};

/// SIGINT/SIGTERM flip this flag; the UI loop and the web accept loop
/// watch it and unwind through their normal teardown paths.
fn install_signal_handlers() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&shutdown)) {
            log::warn!("cannot install handler for signal {sig}: {e}");
        }
    }
    shutdown
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match cli::parse(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("tuios: {e}");
            std::process::exit(1);
        }
    };
    match &cli.command {
        cli::Command::Help => {
            cli::print_help();
            return;
        }
        cli::Command::Version => {
            cli::print_version();
            return;
        }
        _ => {}
    }

    logging::init(cli.debug);
    let shutdown = install_signal_handlers();
    let (config, warnings) = config::load(&cli);

    let result = match cli.command.clone() {
        cli::Command::Web(opts) => run_web(&opts, config, shutdown),
        _ => run_tui(config, warnings, shutdown),
    };
    if let Err(e) = result {
        eprintln!("tuios: {e:#}");
        std::process::exit(1);
    }
}

fn run_web(
    opts: &cli::WebArgs,
    config: config::Config,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    web::server::run(opts, config.default_program.clone(), shutdown)
        .with_context(|| format!("cannot serve on {}:{}", opts.host, opts.port))
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(
        io::stdout(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    );
}

fn run_tui(
    config: config::Config,
    warnings: Vec<String>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    enable_raw_mode().context("cannot open the host terminal")?;
    execute!(
        io::stdout(),
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )
    .context("cannot initialize the host terminal")?;
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        restore_terminal();
        default_panic(info);
    }));

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend).context("cannot open the host terminal")?;

    let (tx, rx) = mpsc::channel::<AppEvent>();
    let input_tx = tx.clone();
    thread::spawn(move || loop {
        match crossterm::event::read() {
            Ok(ev) => {
                if input_tx.send(AppEvent::Input(ev)).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });

    let mut app = App::new(config, tx);
    let size = terminal.size().context("cannot query the terminal size")?;
    app.screen = Rect::new(0, 0, size.width, size.height);
    workspace::add_window(&mut app, None).context("cannot allocate the initial window")?;
    for w in warnings {
        app.notify(Severity::Warning, w);
    }

    let run = event_loop(&mut terminal, &mut app, rx, &shutdown);

    // Teardown: every window releases its PTY, emulator, and reader.
    while let Some(mut w) = app.windows.pop() {
        w.close();
    }
    restore_terminal();
    run
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    rx: mpsc::Receiver<AppEvent>,
    shutdown: &AtomicBool,
) -> anyhow::Result<()> {
    let mut last_frame = Instant::now();
    while !app.quit {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        // 60 fps when idle-interactive; 30 fps is plenty while geometry
        // is in flight.
        let busy = !app.animations.is_empty() || app.drag.is_some() || app.resizing.is_some();
        let frame_interval = Duration::from_millis(if busy { 33 } else { 16 });
        let timeout = frame_interval.saturating_sub(last_frame.elapsed());

        match rx.recv_timeout(timeout) {
            Ok(ev) => {
                dispatch(app, ev);
                // Events are processed to completion in arrival order.
                while let Ok(ev) = rx.try_recv() {
                    dispatch(app, ev);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if app.prefix.as_ref().is_some_and(|p| p.expired()) {
            app.prefix = None;
            app.ui_dirty = true;
        }

        if last_frame.elapsed() >= frame_interval {
            app.frame_counter = app.frame_counter.wrapping_add(1);
            animation::tick(app);
            if rendering::needs_frame(app) {
                terminal
                    .draw(|f| rendering::render(f, app))
                    .context("cannot write a frame to the host terminal")?;
            }
            last_frame = Instant::now();
        }
    }
    Ok(())
}

fn dispatch(app: &mut App, ev: AppEvent) {
    match ev {
        AppEvent::Input(event) => input::handle_event(app, event),
        AppEvent::WindowExited(id) => workspace::handle_window_exited(app, id),
    }
}
