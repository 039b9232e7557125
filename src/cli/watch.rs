//! Live terminal view over a running engine: summary, load/poll status, and a
//! lookup-time sparkline for the recent window.
//!
//! `q`, `Esc` or `Ctrl-C` exits; `r` reloads the log from the start. SIGHUP
//! reloads too, SIGINT/SIGTERM exit.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::time::{Duration, Instant};

use chrono::{Local, TimeDelta};
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::style::{Attribute, Color, SetAttribute, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};

use super::render;
use crate::engine::monitor::EngineHandle;
use crate::engine::signals::SignalHandler;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub refresh: Duration,
    pub window: TimeDelta,
}

/// Run the view until the user or a signal exits.
pub fn run(engine: &EngineHandle, signals: &SignalHandler, config: &WatchConfig) -> io::Result<()> {
    let mut stdout = io::stdout();

    terminal::enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;

    let result = run_inner(&mut stdout, engine, signals, config);

    // Always restore terminal state.
    let _ = execute!(stdout, LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();

    result
}

fn run_inner(
    stdout: &mut io::Stdout,
    engine: &EngineHandle,
    signals: &SignalHandler,
    config: &WatchConfig,
) -> io::Result<()> {
    let mut last_render: Option<Instant> = None;

    loop {
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = event::read()?
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(());
                }
                KeyCode::Char('r') => signals.request_reload(),
                _ => {}
            }
        }

        if signals.should_shutdown() {
            return Ok(());
        }
        if signals.should_reload() {
            engine.reload().map_err(io::Error::other)?;
            last_render = None;
        }

        if last_render.is_some_and(|at| at.elapsed() < config.refresh) {
            continue;
        }
        last_render = Some(Instant::now());

        let (cols, _rows) = terminal::size()?;
        render_frame(stdout, usize::from(cols), engine, config)?;
    }
}

fn render_frame(
    stdout: &mut io::Stdout,
    width: usize,
    engine: &EngineHandle,
    config: &WatchConfig,
) -> io::Result<()> {
    let snapshot = engine.snapshot();
    let now = Local::now().naive_local();
    let view = engine.store().window(now, config.window);

    queue!(stdout, MoveTo(0, 0), Clear(ClearType::All))?;

    queue!(
        stdout,
        SetForegroundColor(Color::Cyan),
        SetAttribute(Attribute::Bold),
    )?;
    write!(
        stdout,
        " Chia log monitor v{}  [{}]",
        env!("CARGO_PKG_VERSION"),
        now.format("%H:%M:%S")
    )?;
    queue!(stdout, SetAttribute(Attribute::Reset))?;

    let mut row: u16 = 2;
    for line in render::render_summary(&snapshot).lines() {
        queue!(stdout, MoveTo(0, row))?;
        write!(stdout, "{line}")?;
        row = row.saturating_add(1);
    }

    row = row.saturating_add(1);
    queue!(stdout, MoveTo(0, row))?;
    write!(
        stdout,
        " Last {} min: {} lookups, {} fast, {} slow, ceiling {:.0}s",
        config.window.num_minutes(),
        view.len(),
        view.fast().count(),
        view.slow().count(),
        view.suggested_y_limit()
    )?;
    row = row.saturating_add(1);
    queue!(stdout, MoveTo(0, row), SetForegroundColor(Color::Green))?;
    write!(
        stdout,
        " {}",
        render::lookup_sparkline(&view, width.saturating_sub(2))
    )?;
    queue!(stdout, SetAttribute(Attribute::Reset))?;

    row = row.saturating_add(2);
    queue!(stdout, MoveTo(0, row), SetAttribute(Attribute::Dim))?;
    write!(stdout, " q quit  r reload")?;
    queue!(stdout, SetAttribute(Attribute::Reset))?;

    stdout.flush()
}
