//! Text rendering of store snapshots and windowed views for terminals.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use colored::Colorize;

use crate::model::ProofEvent;
use crate::store::ingest::{LoadState, PollStatus, StoreSnapshot};
use crate::store::window::WindowedView;

const SPARK_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

const PENDING: &str = "pending";

/// `1 day 2 hours 3 minutes 4 seconds`; zero-valued leading units are omitted,
/// seconds are always shown.
#[must_use]
pub fn humanize_elapsed(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    let mut out = String::new();
    for (value, unit) in [(days, "day"), (hours, "hour"), (minutes, "minute")] {
        if value > 0 {
            let _ = write!(out, "{value} {unit}{} ", plural(value));
        }
    }
    let _ = write!(out, "{seconds} second{}", plural(seconds));
    out
}

const fn plural(value: i64) -> &'static str {
    if value == 1 { "" } else { "s" }
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%d/%m/%Y %H:%M:%S").to_string()
}

fn last_proof_line(label: &str, event: Option<&ProofEvent>) -> String {
    event.map_or_else(
        || format!("{label}: none"),
        |e| {
            format!(
                "{label}: {} ({:.2} s)",
                format_timestamp(e.timestamp),
                e.time_taken_secs
            )
        },
    )
}

fn section(out: &mut String, title: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "{}", format!(":: {title} ::").bold().cyan());
}

/// One-line description of the load progress.
#[must_use]
pub fn load_status_line(load: &LoadState) -> String {
    match *load {
        LoadState::Idle => "idle".to_string(),
        LoadState::Loading {
            lines_processed,
            total_lines,
        } => {
            let pct = load.progress().unwrap_or(0.0) * 100.0;
            format!("loading {lines_processed}/{total_lines} lines ({pct:.0}%)")
        }
        LoadState::Complete { lines } => format!("complete ({lines} lines)"),
        LoadState::Cancelled { lines_processed } => {
            format!("cancelled after {lines_processed} lines")
        }
    }
}

/// One-line description of the last poll.
#[must_use]
pub fn poll_status_line(status: &PollStatus) -> String {
    match status {
        PollStatus::Pending => "waiting for first poll".to_string(),
        PollStatus::Healthy {
            path,
            new_lines,
            rotated,
        } => {
            let rotated = if *rotated { ", rotated" } else { "" };
            format!("{} (+{new_lines} lines{rotated})", path.display())
        }
        PollStatus::FileNotFound { path } => {
            format!("{} not found, retrying", path.display())
                .yellow()
                .to_string()
        }
        PollStatus::ReadError { path, message } => {
            format!("{}: {message}", path.display()).red().to_string()
        }
    }
}

/// Multi-section summary of everything the store knows.
#[must_use]
pub fn render_summary(snapshot: &StoreSnapshot) -> String {
    let stats = &snapshot.stats;
    let threshold = stats.buckets.threshold_secs;
    let mut out = String::new();

    section(&mut out, "Pool");
    match &stats.pool {
        Some(pool) => {
            let _ = writeln!(out, " Name: {}", pool.name);
            let discord = if pool.discord_handle.is_empty() {
                "-"
            } else {
                pool.discord_handle.as_str()
            };
            let _ = writeln!(out, " Discord: {discord}");
            let _ = writeln!(out, " Fee: {}%", pool.fee_percent);
        }
        None => {
            let _ = writeln!(out, " {PENDING}");
        }
    }

    section(&mut out, "Farm");
    let _ = writeln!(
        out,
        " Total plots: {}",
        stats
            .current_total_plots
            .map_or_else(|| PENDING.to_string(), |n| n.to_string())
    );
    match &stats.farmer {
        Some(farmer) => {
            let _ = writeln!(out, " Difficulty: {}", farmer.current_difficulty);
            let _ = writeln!(out, " Points: {}", farmer.current_points);
        }
        None => {
            let _ = writeln!(out, " Difficulty: {PENDING}");
        }
    }
    if let Some(points) = stats.latest_points {
        let _ = writeln!(out, " Latest points report: {points}");
    }

    section(&mut out, "Proofs");
    let _ = writeln!(out, " Total entries: {}", stats.event_count);
    let _ = writeln!(out, " Total proofs found: {}", stats.total_proofs_found);
    let b = &stats.buckets;
    let _ = writeln!(
        out,
        " Lookups <= {threshold}s: {} ({:.2}%)",
        b.count_le, b.percent_le
    );
    let slow = format!(
        " Lookups > {threshold}s: {} ({:.2}%)",
        b.count_gt, b.percent_gt
    );
    if b.count_gt > 0 {
        let _ = writeln!(out, "{}", slow.yellow());
    } else {
        let _ = writeln!(out, "{slow}");
    }
    if let Some(agg) = &stats.time_taken {
        let _ = writeln!(out, " Min lookup time: {:.2} s", agg.min_secs);
        let _ = writeln!(out, " Avg lookup time: {:.2} s", agg.average_secs);
        let _ = writeln!(out, " Max lookup time: {:.2} s", agg.max_secs);
    }
    let _ = writeln!(
        out,
        " {}",
        last_proof_line(
            &format!("Last proof <= {threshold}s"),
            stats.last_fast_proof.as_ref()
        )
    );
    let _ = writeln!(
        out,
        " {}",
        last_proof_line(
            &format!("Last proof > {threshold}s"),
            stats.last_slow_proof.as_ref()
        )
    );

    section(&mut out, "Other");
    let fee = stats.fee.map_or_else(
        || PENDING.to_string(),
        |fee| {
            let gpu = if fee.gpu_used { " (GPU)" } else { "" };
            format!("{}%{gpu}", fee.fee_rate_percent)
        },
    );
    let _ = writeln!(out, " Harvester fee: {fee}");
    let _ = writeln!(
        out,
        " Elapsed since first entry: {}",
        stats
            .elapsed_secs
            .map_or_else(|| PENDING.to_string(), humanize_elapsed)
    );
    if stats.unrecognized_lines > 0 {
        let _ = writeln!(
            out,
            " Unrecognized lines: {} ({} rejected payloads)",
            stats.unrecognized_lines, stats.rejected_payloads
        );
    }
    let _ = writeln!(out, " Load: {}", load_status_line(&snapshot.load));
    let _ = writeln!(out, " Log: {}", poll_status_line(&snapshot.last_poll));
    out
}

/// One event per line: timestamp, eligible, proofs, lookup time, total plots.
#[must_use]
pub fn render_events(view: &WindowedView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!(
            "{:<23}  {:>8}  {:>6}  {:>9}  {:>6}",
            "timestamp", "eligible", "proofs", "time (s)", "plots"
        )
        .bold()
    );
    for event in view.events() {
        let line = format!(
            "{:<23}  {:>8}  {:>6}  {:>9.2}  {:>6}",
            event.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f"),
            event.eligible_plots,
            event.proofs_found,
            event.time_taken_secs,
            event.total_plots
        );
        if event.is_slow(view.threshold_secs()) {
            let _ = writeln!(out, "{}", line.yellow());
        } else if event.found_proof() {
            let _ = writeln!(out, "{}", line.green());
        } else {
            let _ = writeln!(out, "{line}");
        }
    }
    let _ = writeln!(
        out,
        "{} events, {} over {}s",
        view.len(),
        view.slow().count(),
        view.threshold_secs()
    );
    out
}

/// Lookup times of the last `width` events in the window, scaled to the
/// view's suggested y-axis ceiling.
#[must_use]
pub fn lookup_sparkline(view: &WindowedView, width: usize) -> String {
    let ceiling = view.suggested_y_limit();
    let events = view.events();
    let start = events.len().saturating_sub(width);
    events[start..]
        .iter()
        .map(|event| {
            let ratio = (event.time_taken_secs / ceiling).clamp(0.0, 1.0);
            let idx = (ratio * (SPARK_CHARS.len() - 1) as f64).round() as usize;
            SPARK_CHARS[idx.min(SPARK_CHARS.len() - 1)]
        })
        .collect()
}
