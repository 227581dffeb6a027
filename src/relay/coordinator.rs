//! Update coordinator
//!
//! Owns the relay's shared state behind a single lock and decides, per
//! operation, whether the chatbox may be written. Two contexts call in:
//! the console thread (manual sends, keystrokes) and the poll loop task.
//!
//! Every read-then-branch on the state happens inside one critical section.
//! The lock is released before I/O, except in [`UpdateCoordinator::emit_if_changed`]
//! where the dedup compare, the send and the `last_sent` update form one
//! critical section so two racing callers cannot both emit the same line.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::debounce::TypingDebouncer;
use super::format::{format_track, NOTHING_PLAYING};
use super::poll::PollCommand;
use crate::config::AppConfig;
use crate::osc::MessageSink;
use crate::playback::PlaybackSnapshot;

/// Input that re-enables auto-update instead of being sent
pub const RESUME_COMMAND: &str = ";";

/// Capacity of the poll loop command channel
const COMMAND_BUFFER: usize = 16;

/// Observer for "now playing" display changes
pub type TrackCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Observer for operator-facing log lines
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Pause and typing policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Pause after a manual message
    pub manual_pause: Duration,
    /// Pause extension per keystroke
    pub typing_pause: Duration,
    /// Quiet time before the typing indicator is sent
    pub typing_debounce: Duration,
    /// Typing indicator payload
    pub typing_text: String,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            manual_pause: Duration::from_secs(10),
            typing_pause: Duration::from_secs(5),
            typing_debounce: Duration::from_millis(500),
            typing_text: ". . .".to_string(),
        }
    }
}

impl RelayPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            manual_pause: config.timing.manual_pause(),
            typing_pause: config.timing.typing_pause(),
            typing_debounce: config.timing.typing_debounce(),
            typing_text: config.osc.typing_text.clone(),
        }
    }
}

/// Shared handle to the operator's current (unsubmitted) input
///
/// The console owns its lifecycle; the debouncer only reads it.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer(Arc<RwLock<String>>);

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, text: &str) {
        let mut buf = self.0.write();
        buf.clear();
        buf.push_str(text);
    }

    pub fn push(&self, c: char) {
        self.0.write().push(c);
    }

    pub fn pop(&self) {
        self.0.write().pop();
    }

    pub fn clear(&self) {
        self.0.write().clear();
    }

    pub fn text(&self) -> String {
        self.0.read().clone()
    }

    /// True if the buffer holds anything besides whitespace
    pub fn has_text(&self) -> bool {
        !self.0.read().trim().is_empty()
    }
}

/// Result of [`UpdateCoordinator::request_manual_send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualSend {
    /// Blank input, nothing changed
    Ignored,
    /// `;` re-enabled auto-update and queued an immediate cycle
    Resumed,
    /// Text went out, auto-update paused
    Sent,
    /// Auto-update paused but the sink rejected the text
    SendFailed,
}

/// Result of [`UpdateCoordinator::emit_if_changed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    /// New line delivered to the sink
    Sent(String),
    /// Same line as last time
    Unchanged,
    /// Playback stopped; `last_sent` reset, nothing sent
    Cleared,
    /// Playback stopped and nothing had been sent
    Idle,
    /// Sink rejected the line; `last_sent` unchanged so the next cycle retries
    SendFailed,
}

/// Snapshot of the shared state for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStatus {
    pub auto_update: bool,
    /// Time left before auto-resume (None when running or already expired)
    pub paused_for: Option<Duration>,
    pub last_sent: String,
    pub typing_sent: bool,
}

#[derive(Debug)]
struct SharedState {
    auto_update: bool,
    /// Only meaningful while `auto_update` is false
    pause_until: Option<Instant>,
    last_sent: String,
    typing_sent: bool,
}

/// Single owner of the relay state
pub struct UpdateCoordinator {
    state: Mutex<SharedState>,
    sink: Arc<dyn MessageSink>,
    policy: RelayPolicy,
    debouncer: TypingDebouncer,
    commands: mpsc::Sender<PollCommand>,
    track_subscribers: RwLock<Vec<TrackCallback>>,
    log_subscribers: RwLock<Vec<LogCallback>>,
}

impl UpdateCoordinator {
    /// Create the coordinator and the receiving end of the poll command channel
    ///
    /// Must be called inside a tokio runtime (the typing timer spawns on it).
    pub fn new(
        sink: Arc<dyn MessageSink>,
        policy: RelayPolicy,
    ) -> (Arc<Self>, mpsc::Receiver<PollCommand>) {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let coordinator = Arc::new(Self {
            state: Mutex::new(SharedState {
                auto_update: true,
                pause_until: None,
                last_sent: String::new(),
                typing_sent: false,
            }),
            sink,
            debouncer: TypingDebouncer::new(policy.typing_debounce),
            policy,
            commands,
            track_subscribers: RwLock::new(Vec::new()),
            log_subscribers: RwLock::new(Vec::new()),
        });

        (coordinator, command_rx)
    }

    /// Sender for the poll loop commands
    pub fn poll_commands(&self) -> mpsc::Sender<PollCommand> {
        self.commands.clone()
    }

    /// Register a "now playing" observer
    pub fn subscribe_track_updates(&self, callback: TrackCallback) {
        self.track_subscribers.write().push(callback);
    }

    /// Register a log observer
    pub fn subscribe_log(&self, callback: LogCallback) {
        self.log_subscribers.write().push(callback);
    }

    /// Handle a submitted line from the operator
    ///
    /// `;` resumes auto-update and asks the poll loop for an immediate cycle.
    /// Anything else pauses auto-update for the manual window and is sent with
    /// the instant flag. Clearing the input is the caller's job.
    pub fn request_manual_send(&self, text: &str) -> ManualSend {
        let text = text.trim();
        if text.is_empty() {
            return ManualSend::Ignored;
        }
        let resume = text == RESUME_COMMAND;

        // A typing timer that already fired finishes before the state changes
        self.debouncer.cancel();
        {
            let mut state = self.state.lock();
            state.typing_sent = false;
            if resume {
                state.auto_update = true;
                state.pause_until = None;
            } else {
                state.auto_update = false;
                state.pause_until = Some(Instant::now() + self.policy.manual_pause);
            }
        }

        if resume {
            self.emit_log("[INFO] Auto-update enabled by ';' command.");
            if let Err(e) = self.commands.try_send(PollCommand::Resume) {
                warn!("Could not queue resume cycle: {}", e);
            }
            return ManualSend::Resumed;
        }

        self.emit_log(&format!(
            "[INFO] Auto-update paused until {}",
            wall_clock_after(self.policy.manual_pause)
        ));

        match self.sink.send(text, true) {
            Ok(()) => {
                self.emit_log(&format!("[UI SEND] {}", text));
                ManualSend::Sent
            }
            Err(e) => {
                self.emit_log(&format!("[ERROR] Failed to send message: {:#}", e));
                ManualSend::SendFailed
            }
        }
    }

    /// Handle one keystroke in the input
    ///
    /// Pauses auto-update for the typing window (never shortening a longer
    /// pause already in place) and restarts the typing indicator timer.
    pub fn notify_user_activity(self: &Arc<Self>, input: &InputBuffer) {
        {
            let mut state = self.state.lock();
            let until = Instant::now() + self.policy.typing_pause;
            state.pause_until = match state.pause_until {
                Some(existing) if !state.auto_update && existing > until => Some(existing),
                _ => Some(until),
            };
            state.auto_update = false;
        }

        let coordinator = Arc::downgrade(self);
        let input = input.clone();
        self.debouncer.schedule(move || {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.send_typing_indicator(&input);
            }
        });
    }

    /// Send the typing indicator once per burst, only if there is text pending
    pub(crate) fn send_typing_indicator(&self, input: &InputBuffer) -> bool {
        if !input.has_text() {
            return false;
        }
        {
            let mut state = self.state.lock();
            if state.typing_sent {
                return false;
            }
            state.typing_sent = true;
        }

        match self.sink.send(&self.policy.typing_text, true) {
            Ok(()) => {
                self.emit_log("[TYPING] Sending typing indicator...");
                true
            }
            Err(e) => {
                // Let the next burst try again
                self.state.lock().typing_sent = false;
                self.emit_log(&format!("[ERROR] Failed to send typing indicator: {:#}", e));
                false
            }
        }
    }

    /// Decide whether this poll tick may emit
    ///
    /// Flips auto-update back on once the pause deadline has passed. This is
    /// the only way out of a pause besides the `;` command.
    pub fn poll_gate(&self) -> bool {
        let (allowed, resumed) = {
            let mut state = self.state.lock();
            let mut resumed = false;
            if !state.auto_update {
                let expired = state
                    .pause_until
                    .map_or(true, |deadline| Instant::now() > deadline);
                if expired {
                    state.auto_update = true;
                    state.pause_until = None;
                    resumed = true;
                }
            }
            (state.auto_update, resumed)
        };

        if resumed {
            self.emit_log("[INFO] Auto-update enabled after timeout.");
        } else if !allowed {
            debug!("Poll gate closed");
            self.emit_log("[INFO] Paused sending track updates.");
        }
        allowed
    }

    /// Emit the formatted snapshot if it differs from the last sent line
    ///
    /// `None` (no device, or an unusable response) is handled like a stopped
    /// player: `last_sent` is reset and observers are told, but nothing is
    /// sent to the chatbox.
    pub fn emit_if_changed(&self, snapshot: Option<&PlaybackSnapshot>) -> EmitOutcome {
        let candidate = snapshot
            .filter(|s| s.is_playing)
            .map(format_track);

        let Some(line) = candidate else {
            let cleared = {
                let mut state = self.state.lock();
                if state.last_sent.is_empty() {
                    false
                } else {
                    state.last_sent.clear();
                    true
                }
            };
            if !cleared {
                return EmitOutcome::Idle;
            }
            self.emit_log("[SEND] No track playing or playback paused.");
            self.emit_track(NOTHING_PLAYING);
            return EmitOutcome::Cleared;
        };

        let outcome = {
            let mut state = self.state.lock();
            if state.last_sent == line {
                return EmitOutcome::Unchanged;
            }
            match self.sink.send(&line, true) {
                Ok(()) => {
                    state.last_sent.clone_from(&line);
                    state.typing_sent = false;
                    EmitOutcome::Sent(line)
                }
                Err(e) => {
                    warn!("Chatbox send failed: {:#}", e);
                    EmitOutcome::SendFailed
                }
            }
        };

        match &outcome {
            EmitOutcome::Sent(line) => {
                self.emit_log(&format!("[SEND] {}", line));
                self.emit_track(line);
            }
            EmitOutcome::SendFailed => {
                self.emit_log("[ERROR] Failed to send track update.");
            }
            _ => {}
        }
        outcome
    }

    /// Forget the last sent line so the next permitted cycle sends again
    pub fn forget_last_sent(&self) {
        self.state.lock().last_sent.clear();
        info!("Last sent track forgotten");
    }

    pub fn status(&self) -> RelayStatus {
        let state = self.state.lock();
        let paused_for = if state.auto_update {
            None
        } else {
            state
                .pause_until
                .and_then(|deadline| deadline.checked_duration_since(Instant::now()))
                .filter(|left| !left.is_zero())
        };
        RelayStatus {
            auto_update: state.auto_update,
            paused_for,
            last_sent: state.last_sent.clone(),
            typing_sent: state.typing_sent,
        }
    }

    /// Report an error through the log observers
    pub fn report_error(&self, message: &str) {
        self.emit_log(&format!("[ERROR] {}", message));
    }

    fn emit_log(&self, message: &str) {
        info!("{}", message);
        for callback in self.log_subscribers.read().iter() {
            callback(message);
        }
    }

    fn emit_track(&self, display: &str) {
        for callback in self.track_subscribers.read().iter() {
            callback(display);
        }
    }
}

/// Local wall-clock time `after` from now, `HH:MM:SS`
fn wall_clock_after(after: Duration) -> String {
    let delta = chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::zero());
    (chrono::Local::now() + delta).format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_buffer_edits() {
        let input = InputBuffer::new();
        assert!(!input.has_text());

        input.push('h');
        input.push('i');
        assert_eq!(input.text(), "hi");

        input.pop();
        assert_eq!(input.text(), "h");

        input.set("   ");
        assert!(!input.has_text());

        input.clear();
        assert_eq!(input.text(), "");
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = AppConfig::default();
        config.timing.manual_pause_ms = 2_000;
        config.osc.typing_text = "typing".to_string();

        let policy = RelayPolicy::from_config(&config);
        assert_eq!(policy.manual_pause, Duration::from_secs(2));
        assert_eq!(policy.typing_pause, Duration::from_secs(5));
        assert_eq!(policy.typing_text, "typing");
    }

    #[test]
    fn test_default_policy() {
        let policy = RelayPolicy::default();
        assert_eq!(policy.manual_pause, Duration::from_secs(10));
        assert_eq!(policy.typing_debounce, Duration::from_millis(500));
    }

    #[test]
    fn test_wall_clock_shape() {
        let clock = wall_clock_after(Duration::from_secs(10));
        assert_eq!(clock.len(), 8);
        assert_eq!(clock.matches(':').count(), 2);
    }
}
