//! Line-based control shell on stdin.
//!
//! Mirrors the tray menu of the desktop build: refresh, disconnect, start and
//! stop monitoring, exit.

use flrp_core::OperatorControls;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Refresh,
    Disconnect,
    Start,
    Stop,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "status" => Some(Self::Status),
            "refresh" => Some(Self::Refresh),
            "disconnect" => Some(Self::Disconnect),
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "help" | "?" => Some(Self::Help),
            "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Why the console stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    /// Input closed. The relay keeps running until interrupted.
    EndOfInput,
}

const HELP: &str = "commands: status, refresh, disconnect, start, stop, quit";

fn apply<W: Write>(command: ConsoleCommand, controls: &OperatorControls, out: &mut W) -> io::Result<()> {
    match command {
        ConsoleCommand::Status => writeln!(out, "{}", controls.last_status()),
        ConsoleCommand::Refresh => {
            controls.request_refresh();
            writeln!(out, "Refreshing Discord connection")
        }
        ConsoleCommand::Disconnect => {
            controls.request_disconnect();
            writeln!(out, "Disconnecting from Discord until refresh")
        }
        ConsoleCommand::Start => {
            controls.set_monitoring(true);
            writeln!(out, "Monitoring started")
        }
        ConsoleCommand::Stop => {
            controls.set_monitoring(false);
            writeln!(out, "Monitoring stopped")
        }
        ConsoleCommand::Help => writeln!(out, "{HELP}"),
        ConsoleCommand::Quit => {
            controls.request_shutdown();
            writeln!(out, "Exiting")
        }
    }
}

pub fn run<R: BufRead, W: Write>(input: R, mut out: W, controls: &OperatorControls) -> io::Result<ConsoleExit> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match ConsoleCommand::parse(&line) {
            Some(command) => {
                tracing::debug!(?command, "Console command");
                apply(command, controls, &mut out)?;
                out.flush()?;
                if command == ConsoleCommand::Quit {
                    return Ok(ConsoleExit::Quit);
                }
            }
            None => {
                writeln!(out, "unknown command: {} ({HELP})", line.trim())?;
                out.flush()?;
            }
        }
    }
    Ok(ConsoleExit::EndOfInput)
}
