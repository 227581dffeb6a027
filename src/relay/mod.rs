//! Relay core - "now playing" to chatbox coordination
//!
//! - [`format`]: snapshot to chatbox line
//! - [`coordinator`]: shared pause/dedup state behind one lock
//! - [`debounce`]: single pending typing-indicator timer
//! - [`poll`]: periodic background poller with a command channel

pub mod coordinator;
pub mod debounce;
pub mod format;
pub mod poll;


pub use coordinator::{
    EmitOutcome, InputBuffer, LogCallback, ManualSend, RelayPolicy, RelayStatus, TrackCallback,
    UpdateCoordinator, RESUME_COMMAND,
};
pub use debounce::TypingDebouncer;
pub use format::{format_clock, format_track, NOTE_GLYPH, NOTHING_PLAYING};
pub use poll::{PollCommand, PollControl, PollLoop, PollLoopHandle, TickOutcome};

#[cfg(test)]
pub(crate) mod test_support {
    //! Fakes for the sink and the playback source

    use crate::osc::MessageSink;
    use crate::playback::{PlaybackError, PlaybackSnapshot, PlaybackSource};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Sink that records every payload
    #[derive(Default)]
    pub struct RecordingSink {
        sent: Mutex<Vec<(String, bool)>>,
        delay: Option<Duration>,
        failing: AtomicBool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Block each send for `delay` (widens race windows)
        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<(String, bool)> {
            self.sent.lock().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent.lock().iter().map(|(t, _)| t.clone()).collect()
        }

        pub fn count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    impl MessageSink for RecordingSink {
        fn send(&self, text: &str, instant: bool) -> anyhow::Result<()> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("sink offline");
            }
            self.sent.lock().push((text.to_string(), instant));
            Ok(())
        }
    }

    pub type Scripted = Result<Option<PlaybackSnapshot>, PlaybackError>;

    /// Source that replays queued answers, then repeats a fallback
    pub struct ScriptedSource {
        queue: Mutex<VecDeque<Scripted>>,
        fallback: Mutex<Option<PlaybackSnapshot>>,
        latency: Option<Duration>,
        calls: Mutex<usize>,
    }

    impl ScriptedSource {
        pub fn new(fallback: Option<PlaybackSnapshot>) -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(fallback),
                latency: None,
                calls: Mutex::new(0),
            }
        }

        /// Every query sleeps for `latency` (tokio time)
        pub fn hanging(latency: Duration) -> Self {
            Self {
                latency: Some(latency),
                ..Self::new(None)
            }
        }

        pub fn push(&self, answer: Scripted) {
            self.queue.lock().push_back(answer);
        }

        pub fn set_fallback(&self, snapshot: Option<PlaybackSnapshot>) {
            *self.fallback.lock() = snapshot;
        }

        pub fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl PlaybackSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn current_playback(&self) -> Scripted {
            *self.calls.lock() += 1;
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            let next = self.queue.lock().pop_front();
            match next {
                Some(answer) => answer,
                None => Ok(self.fallback.lock().clone()),
            }
        }
    }
}
