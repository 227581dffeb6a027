//! Poll loop
//!
//! Background task that asks the coordinator for permission once per
//! interval, queries the playback source and hands the result to
//! `emit_if_changed`. Commands from the console arrive over an mpsc channel
//! and run a cycle right away; the interval restarts after each one.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::coordinator::{EmitOutcome, UpdateCoordinator};
use crate::playback::{PlaybackError, PlaybackSnapshot, PlaybackSource};

/// Commands accepted by the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    /// Gated cycle now (sent by the `;` command)
    Resume,
    /// Ungated cycle now ("send current track")
    SendNow,
    /// Stop the loop
    Shutdown,
}

/// What one cycle did
#[derive(Debug)]
pub enum TickOutcome {
    /// Gate closed, nothing queried
    Paused,
    /// Source answered (possibly with an unusable response)
    Emitted(EmitOutcome),
    /// Source failed; state untouched
    Failed(PlaybackError),
}

/// The periodic poller
pub struct PollLoop {
    coordinator: Arc<UpdateCoordinator>,
    source: Arc<dyn PlaybackSource>,
    commands: mpsc::Receiver<PollCommand>,
    interval: Duration,
    query_timeout: Duration,
}

impl PollLoop {
    pub fn new(
        coordinator: Arc<UpdateCoordinator>,
        source: Arc<dyn PlaybackSource>,
        commands: mpsc::Receiver<PollCommand>,
        interval: Duration,
        query_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            source,
            commands,
            interval,
            query_timeout,
        }
    }

    /// Spawn the loop on the current runtime
    pub fn spawn(self) -> PollLoopHandle {
        let control = PollControl(self.coordinator.poll_commands());
        let task = tokio::spawn(self.run());
        PollLoopHandle { control, task }
    }

    /// Run until `Shutdown` arrives or every command sender is gone
    pub async fn run(mut self) {
        info!(
            "🎧 Poll loop started (source: {}, every {:?})",
            self.source.name(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                command = self.commands.recv() => {
                    match command {
                        Some(PollCommand::Resume) => {
                            debug!("Resume cycle requested");
                            self.tick().await;
                        }
                        Some(PollCommand::SendNow) => {
                            debug!("Immediate cycle requested");
                            self.cycle().await;
                        }
                        Some(PollCommand::Shutdown) | None => break,
                    }
                    ticker.reset();
                }
            }
        }

        info!("Poll loop stopped");
    }

    /// One gated cycle: skip entirely while auto-update is paused
    pub async fn tick(&self) -> TickOutcome {
        if !self.coordinator.poll_gate() {
            return TickOutcome::Paused;
        }
        self.cycle().await
    }

    /// One ungated cycle: query the source and emit if the line changed
    pub async fn cycle(&self) -> TickOutcome {
        match self.query().await {
            Ok(snapshot) => {
                TickOutcome::Emitted(self.coordinator.emit_if_changed(snapshot.as_ref()))
            }
            Err(PlaybackError::Format(reason)) => {
                warn!("Unusable playback state ({}), treating as stopped", reason);
                let outcome = self.coordinator.emit_if_changed(None);
                debug!("Format fallback: {:?}", outcome);
                TickOutcome::Failed(PlaybackError::Format(reason))
            }
            Err(err) => {
                self.coordinator
                    .report_error(&format!("{} API error: {}", self.source.name(), err));
                if matches!(err, PlaybackError::Auth(_)) {
                    self.coordinator
                        .report_error("Credentials rejected; re-run with --authorize or --setup");
                }
                TickOutcome::Failed(err)
            }
        }
    }

    async fn query(&self) -> Result<Option<PlaybackSnapshot>, PlaybackError> {
        match tokio::time::timeout(self.query_timeout, self.source.current_playback()).await {
            Ok(result) => result,
            Err(_) => Err(PlaybackError::Transport(format!(
                "no answer within {:?}",
                self.query_timeout
            ))),
        }
    }
}

/// Cloneable sender side of the poll loop commands
#[derive(Clone)]
pub struct PollControl(mpsc::Sender<PollCommand>);

impl PollControl {
    /// Request an ungated cycle
    pub async fn send_now(&self) {
        self.send(PollCommand::SendNow).await;
    }

    pub async fn shutdown(&self) {
        self.send(PollCommand::Shutdown).await;
    }

    /// Non-async variant for the console thread
    pub fn send_now_blocking(&self) {
        if let Err(e) = self.0.blocking_send(PollCommand::SendNow) {
            warn!("Poll loop is not running: {}", e);
        }
    }

    async fn send(&self, command: PollCommand) {
        if self.0.send(command).await.is_err() {
            debug!("Poll loop already stopped, dropping {:?}", command);
        }
    }
}

/// Handle to a spawned poll loop
pub struct PollLoopHandle {
    control: PollControl,
    task: JoinHandle<()>,
}

impl PollLoopHandle {
    pub fn control(&self) -> PollControl {
        self.control.clone()
    }

    pub async fn send_now(&self) {
        self.control.send_now().await;
    }

    pub async fn shutdown(&self) {
        self.control.shutdown().await;
    }

    /// Wait for the loop task to finish
    pub async fn join(self) -> anyhow::Result<()> {
        self.task
            .await
            .map_err(|e| anyhow::anyhow!("Poll loop task failed: {}", e))
    }
}
