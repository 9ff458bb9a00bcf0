//! Supervisor: owns the child, runs the relays and consumes the command queue
//!
//! The output relay and the operator loop run on their own threads and block
//! on I/O. The supervisor awaits the event queue and is the only consumer of
//! detected commands, forwarding them to the child in arrival order.

use super::child::{ChildHandle, ChildKiller, PtyChild};
use crate::config::{Config, RelayConfig};
use crate::detect::DetectedCommand;
use crate::error::{RelayKind, Result};
use crate::relay::{
    event_queue, EventReceiver, InputRelay, OutputRelay, RelayEvent, RelayStats, StopFlag,
};
use chrono::{DateTime, Local};
use std::future::Future;
use std::io::{self, BufRead, BufReader, Write};
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Why the supervisor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A detected command started with the exit sentinel
    Sentinel,
    /// The child's output ended without the sentinel
    ChildExited(i32),
    /// The output relay failed and the child was killed
    RelayFailed,
    /// The operator interrupted the supervisor
    Interrupted,
}

impl ExitReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::Sentinel => 0,
            ExitReason::ChildExited(code) => *code,
            ExitReason::RelayFailed => 1,
            ExitReason::Interrupted => 130,
        }
    }
}

type WaitResult = (Box<dyn ChildHandle>, io::Result<i32>);

/// How a wait on the child ended
enum Waited {
    Exited(Option<i32>),
    Interrupted,
}

pub struct Supervisor {
    child: Option<Box<dyn ChildHandle>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    input: InputRelay<Box<dyn Write + Send>>,
    events: EventReceiver,
    output_stop: StopFlag,
    stats: Arc<RelayStats>,
    sentinel: String,
    started_at: DateTime<Local>,
    forwarded: u64,
}

impl Supervisor {
    /// Spawn the configured server and relay it to this process's terminal
    pub fn launch(config: &Config) -> Result<Self> {
        let child = PtyChild::spawn(&config.server)?;
        info!(
            executable = %config.server.executable,
            args = ?config.server.args,
            pid = ?child.pid(),
            "server started"
        );
        Self::start(
            child,
            &config.relay,
            BufReader::new(io::stdin()),
            io::stdout(),
        )
    }

    /// Wire the relays to an already running child and start them
    pub fn start<C, I, D>(mut child: C, config: &RelayConfig, operator: I, display: D) -> Result<Self>
    where
        C: ChildHandle,
        I: BufRead + Send + 'static,
        D: Write + Send + 'static,
    {
        let output = child.take_output()?;
        let input = child.take_input()?;
        let killer = child.killer();

        let (tx, rx) = event_queue();
        let output_stop = StopFlag::new();
        let stats = Arc::new(RelayStats::default());

        OutputRelay::new(
            output,
            display,
            &config.output_settings(),
            tx.clone(),
            output_stop.clone(),
            Arc::clone(&stats),
        )
        .spawn();

        let input = InputRelay::new(
            input,
            config.line_separator(),
            config.strip_command_slash,
            StopFlag::new(),
        );
        input.spawn_operator(operator, tx);

        Ok(Self {
            child: Some(Box::new(child)),
            killer,
            input,
            events: rx,
            output_stop,
            stats,
            sentinel: config.exit_sentinel.clone(),
            started_at: Local::now(),
            forwarded: 0,
        })
    }

    /// Run until shutdown, treating Ctrl-C as an interrupt
    pub async fn run(self) -> ExitReason {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the coordination loop until the sentinel, the end of the child's
    /// output, an output relay failure, or `interrupt` completes
    pub async fn run_until<F>(mut self, interrupt: F) -> ExitReason
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let reason = loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(RelayEvent::Command(cmd)) => {
                        let exit = cmd.is_sentinel(&self.sentinel);
                        self.forward(&cmd);
                        if exit {
                            info!(username = %cmd.username, "exit requested, waiting for server to stop");
                            match self.wait_child_or(interrupt.as_mut()).await {
                                Waited::Exited(_) => break ExitReason::Sentinel,
                                Waited::Interrupted => break ExitReason::Interrupted,
                            }
                        }
                    }
                    Some(RelayEvent::OutputClosed) | None => {
                        match self.wait_child_or(interrupt.as_mut()).await {
                            Waited::Exited(code) => {
                                let code = code.unwrap_or(1);
                                warn!(exit_code = code, "server exited without an exit command");
                                break ExitReason::ChildExited(code);
                            }
                            Waited::Interrupted => break ExitReason::Interrupted,
                        }
                    }
                    Some(RelayEvent::OperatorClosed) => {
                        debug!("operator input closed, still relaying detected commands");
                    }
                    Some(RelayEvent::Failed { relay: RelayKind::Output, error }) => {
                        error!(relay = %RelayKind::Output, "{:#}", anyhow::Error::from(error));
                        self.kill_child();
                        self.wait_child().await;
                        break ExitReason::RelayFailed;
                    }
                    Some(RelayEvent::Failed { relay: RelayKind::Input, error }) => {
                        warn!(relay = %RelayKind::Input, "{:#}; operator input is no longer relayed", anyhow::Error::from(error));
                    }
                },
                _ = &mut interrupt => {
                    warn!("interrupted, stopping server");
                    self.kill_child();
                    self.wait_child().await;
                    break ExitReason::Interrupted;
                }
            }
        };

        self.stop_relays();
        self.log_summary(reason);
        reason
    }

    fn forward(&mut self, cmd: &DetectedCommand) {
        match self.input.write_command(&cmd.text) {
            Ok(()) => {
                self.forwarded += 1;
                debug!(username = %cmd.username, command = %cmd.text, "command forwarded");
            }
            Err(e) => warn!(username = %cmd.username, "{e}; command dropped"),
        }
    }

    fn stop_relays(&self) {
        self.output_stop.stop();
        self.input.stop_writing();
    }

    fn kill_child(&mut self) {
        if let Err(e) = self.killer.kill() {
            debug!(error = %e, "kill failed, server may already be gone");
        }
    }

    fn spawn_wait(&mut self) -> Option<JoinHandle<WaitResult>> {
        let mut child = self.child.take()?;
        Some(tokio::task::spawn_blocking(move || {
            let status = child.wait();
            (child, status)
        }))
    }

    /// Wait for the child; `None` if the exit code is unknown
    async fn wait_child(&mut self) -> Option<i32> {
        let wait = self.spawn_wait()?;
        let joined = wait.await;
        self.finish_wait(joined)
    }

    /// Wait for the child unless `interrupt` fires first, in which case the
    /// child is killed and reaped
    async fn wait_child_or<F>(&mut self, interrupt: Pin<&mut F>) -> Waited
    where
        F: Future<Output = ()>,
    {
        let Some(mut wait) = self.spawn_wait() else {
            return Waited::Exited(None);
        };

        tokio::select! {
            joined = &mut wait => Waited::Exited(self.finish_wait(joined)),
            _ = interrupt => {
                warn!("interrupted while waiting for the server, stopping it");
                self.kill_child();
                let joined = wait.await;
                self.finish_wait(joined);
                Waited::Interrupted
            }
        }
    }

    fn finish_wait(&mut self, joined: std::result::Result<WaitResult, JoinError>) -> Option<i32> {
        match joined {
            Ok((child, status)) => {
                self.child = Some(child);
                match status {
                    Ok(code) => {
                        info!(exit_code = code, "server exited");
                        Some(code)
                    }
                    Err(e) => {
                        error!(error = %e, "failed waiting for server");
                        None
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "wait task failed");
                None
            }
        }
    }

    fn log_summary(&self, reason: ExitReason) {
        let uptime = Local::now().signed_duration_since(self.started_at);
        info!(
            started_at = %self.started_at.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            lines = self.stats.lines(),
            detected = self.stats.detected(),
            forwarded = self.forwarded,
            reason = ?reason,
            "session ended"
        );
    }
}
