//! Operator console
//!
//! Line editor on a blocking thread. Every keystroke is reported to the
//! coordinator (pausing auto-update and arming the typing indicator); a
//! submitted line becomes a manual chatbox message unless it is a `/command`.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::{
    Cmd, ConditionalEventHandler, DefaultEditor, Event, EventContext, EventHandler, KeyCode,
    KeyEvent, Modifiers, RepeatCount,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::relay::{InputBuffer, ManualSend, PollControl, RelayStatus, UpdateCoordinator};

const PROMPT: &str = "chatbox> ";

/// Parsed console input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Plain text (or `;`) for the chatbox
    Message(String),
    /// Send the current track now, ignoring the pause
    Track,
    Status,
    /// Forget the last sent line
    Forget,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "/quit" | "/exit" => Self::Quit,
            "/track" => Self::Track,
            "/status" => Self::Status,
            "/forget" => Self::Forget,
            "/help" | "/?" => Self::Help,
            _ => Self::Message(line.to_string()),
        }
    }
}

/// Mirrors editor keystrokes into the coordinator
struct KeystrokeHook {
    coordinator: Arc<UpdateCoordinator>,
    input: InputBuffer,
}

impl ConditionalEventHandler for KeystrokeHook {
    fn handle(
        &self,
        evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext,
    ) -> Option<Cmd> {
        let Some(KeyEvent(code, mods)) = evt.get(0) else {
            return None;
        };
        if matches!(code, KeyCode::Enter) {
            return None;
        }

        self.input.set(&predict_line(ctx.line(), ctx.pos(), *code, *mods));
        self.coordinator.notify_user_activity(&self.input);

        // Let the editor apply the key as usual
        None
    }
}

/// Line content after the editor applies `code` at byte offset `pos`
fn predict_line(line: &str, pos: usize, code: KeyCode, mods: Modifiers) -> String {
    let mut next = line.to_string();
    let pos = pos.min(next.len());
    match code {
        KeyCode::Char(c) if !mods.intersects(Modifiers::CTRL | Modifiers::ALT) => {
            next.insert(pos, c);
        }
        KeyCode::Backspace => {
            if let Some((idx, _)) = next[..pos].char_indices().next_back() {
                next.remove(idx);
            }
        }
        KeyCode::Delete => {
            if pos < next.len() {
                next.remove(pos);
            }
        }
        _ => {}
    }
    next
}

/// Spawn the console on its own thread; the receiver fires when it exits
pub fn spawn_console(
    coordinator: Arc<UpdateCoordinator>,
    control: PollControl,
) -> oneshot::Receiver<Result<()>> {
    let (done_tx, done_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let result = run_console(coordinator, control);
            let _ = done_tx.send(result);
        })
        .map_err(|e| warn!("Failed to start console thread: {}", e))
        .ok();

    done_rx
}

/// Blocking console loop
pub fn run_console(coordinator: Arc<UpdateCoordinator>, control: PollControl) -> Result<()> {
    let input = InputBuffer::new();
    let mut rl = DefaultEditor::new()?;
    rl.bind_sequence(
        Event::Any,
        EventHandler::Conditional(Box::new(KeystrokeHook {
            coordinator: Arc::clone(&coordinator),
            input: input.clone(),
        })),
    );

    print_help();

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        match ConsoleCommand::parse(&line) {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Status => print_status(&coordinator.status()),
            ConsoleCommand::Forget => coordinator.forget_last_sent(),
            ConsoleCommand::Track => control.send_now_blocking(),
            ConsoleCommand::Message(text) => {
                if !text.trim().is_empty() {
                    let _ = rl.add_history_entry(text.as_str());
                }
                let outcome = coordinator.request_manual_send(&text);
                debug!("Manual send: {:?}", outcome);
                if outcome == ManualSend::SendFailed {
                    println!("{}", "Message could not be sent".red());
                }
            }
        }
        input.clear();
    }

    println!("{}", "Console closed".dimmed());
    Ok(())
}

fn print_help() {
    println!("{}", "=== NowPlaying OSC ===".bold().cyan());
    println!("Type a message and press Enter to send it to the chatbox.");
    println!("  {}        resume track updates now", ";".yellow());
    println!("  {}   send the current track now", "/track".yellow());
    println!("  {}  show relay state", "/status".yellow());
    println!("  {}  re-send the current track on the next update", "/forget".yellow());
    println!("  {}    exit", "/quit".yellow());
}

fn print_status(status: &RelayStatus) {
    let mode = if status.auto_update {
        "running".green()
    } else {
        "paused".yellow()
    };
    println!("Auto-update: {}", mode);
    if let Some(left) = status.paused_for {
        println!("Resumes in:  {:.1}s", left.as_secs_f32());
    }
    let last = if status.last_sent.is_empty() {
        "(nothing)".dimmed().to_string()
    } else {
        status.last_sent.clone()
    };
    println!("Last sent:   {}", last);
    println!("Typing flag: {}", status.typing_sent);
}
