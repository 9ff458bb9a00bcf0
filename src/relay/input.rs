//! Input relay: the single writer into the child's stdin
//!
//! Two producers share it: the operator's terminal (line by line) and the
//! supervisor forwarding detected commands.

use super::{EventSender, RelayEvent, StopFlag};
use crate::error::{RelayError, RelayKind, Result};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

pub struct InputRelay<W> {
    writer: Arc<Mutex<W>>,
    line_separator: String,
    strip_command_slash: bool,
    stop: StopFlag,
}

impl<W> Clone for InputRelay<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            line_separator: self.line_separator.clone(),
            strip_command_slash: self.strip_command_slash,
            stop: self.stop.clone(),
        }
    }
}

impl<W: Write> InputRelay<W> {
    pub fn new(writer: W, line_separator: &str, strip_command_slash: bool, stop: StopFlag) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            line_separator: line_separator.to_string(),
            strip_command_slash,
            stop,
        }
    }

    /// Write a forwarded command terminated by the platform line separator
    pub fn write_command(&self, text: &str) -> Result<()> {
        let body = if self.strip_command_slash {
            text.strip_prefix('/').unwrap_or(text)
        } else {
            text
        };
        let payload = format!("{body}{}", self.line_separator);
        self.send(payload.as_bytes(), |source| RelayError::Write {
            command: text.to_string(),
            source,
        })
    }

    /// Stop accepting writes; a blocked operator read still finishes first
    ///
    /// Taking the writer lock means a write already in progress completes
    /// before this returns, and none starts afterwards.
    pub fn stop_writing(&self) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.stop.stop();
    }

    /// Relay operator lines to the child until stopped or the input ends
    ///
    /// Operator lines are always terminated with `\n`, regardless of platform.
    pub fn run_operator<I: BufRead>(&self, mut input: I, events: &EventSender) {
        let mut line = String::new();

        while !self.stop.is_stopped() {
            line.clear();
            match input.read_line(&mut line) {
                Ok(0) => {
                    debug!("operator input closed");
                    let _ = events.send(RelayEvent::OperatorClosed);
                    return;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    let error = RelayError::Stream {
                        relay: RelayKind::Input,
                        source,
                    };
                    self.report_failure(events, error, "error reading operator input");
                    return;
                }
            }

            if self.stop.is_stopped() {
                debug!("input relay stopped, dropping operator line");
                return;
            }

            let text = line.trim_end_matches(['\r', '\n']);
            let written = self.send(format!("{text}\n").as_bytes(), |source| RelayError::Stream {
                relay: RelayKind::Input,
                source,
            });
            match written {
                Ok(()) => {}
                Err(RelayError::Stopped) => {
                    debug!("input relay stopped, dropping operator line");
                    return;
                }
                Err(e) => {
                    self.report_failure(events, e, "error writing operator line to child");
                    return;
                }
            }
        }
    }

    /// Write and flush under the writer lock; the stop flag is checked while holding it
    fn send<F>(&self, bytes: &[u8], on_error: F) -> Result<()>
    where
        F: FnOnce(io::Error) -> RelayError,
    {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.stop.is_stopped() {
            return Err(RelayError::Stopped);
        }
        writer
            .write_all(bytes)
            .and_then(|()| writer.flush())
            .map_err(on_error)
    }

    fn report_failure(&self, events: &EventSender, error: RelayError, context: &str) {
        error!(error = %error, "{context}");
        let _ = events.send(RelayEvent::Failed {
            relay: RelayKind::Input,
            error,
        });
    }
}

impl<W: Write + Send + 'static> InputRelay<W> {
    /// Run the operator loop on its own thread
    pub fn spawn_operator<I>(&self, input: I, events: EventSender) -> JoinHandle<()>
    where
        I: BufRead + Send + 'static,
    {
        let relay = self.clone();
        thread::spawn(move || relay.run_operator(input, &events))
    }
}
