//! Interactive console monitor.
//!
//! Reads commands from stdin on a dedicated thread. A blocking stdin read
//! cannot be cancelled, so the thread is detached and simply ends with the
//! process.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::tracing::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Summary,
    Help,
}

fn parse(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "s" | "summary" => Some(Command::Summary),
        "h" | "help" | "?" => Some(Command::Help),
        _ => None,
    }
}

/// Start the console thread; `s` + enter notifies `summary`.
pub fn spawn(summary: Arc<Notify>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("xel-console".into())
        .spawn(move || run(std::io::stdin().lock(), &summary))?;
    Ok(())
}

fn run(input: impl BufRead, summary: &Notify) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        match parse(&line) {
            Some(Command::Summary) => summary.notify_one(),
            Some(Command::Help) => info!("Console commands: s = mining summary, h = help"),
            None if line.trim().is_empty() => {}
            None => debug!(input = %line.trim(), "Unknown console command"),
        }
    }
    trace!("Console input closed");
}
