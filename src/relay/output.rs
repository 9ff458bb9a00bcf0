//! Output relay: echoes the child's output and detects chat commands in it

use super::{EventSender, RelayEvent, RelayStats, StopFlag};
use crate::detect::{self, LineFramer};
use crate::error::{RelayError, RelayKind};
use std::io::{self, BufReader, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Settings the output relay needs from the relay config
#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub line_separator: String,
    pub backup_marker: String,
    pub backup_delay: Duration,
}

pub struct OutputRelay<R, D> {
    reader: R,
    display: D,
    framer: LineFramer,
    backup_delay: Duration,
    events: EventSender,
    stop: StopFlag,
    stats: Arc<RelayStats>,
}

impl<R: Read, D: Write> OutputRelay<R, D> {
    pub fn new(
        reader: R,
        display: D,
        settings: &OutputSettings,
        events: EventSender,
        stop: StopFlag,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            reader,
            display,
            framer: LineFramer::new(&settings.line_separator, &settings.backup_marker),
            backup_delay: settings.backup_delay,
            events,
            stop,
            stats,
        }
    }

    /// Pump the child's output until it ends, fails, or the relay is stopped
    ///
    /// Every byte is echoed to the display before the next blocking read. The
    /// stop flag is only consulted when a line completes.
    pub fn run(mut self) {
        let mut reader = BufReader::new(self.reader);
        let mut byte = [0u8; 1];
        let mut display_ok = true;

        loop {
            match reader.read(&mut byte) {
                Ok(0) => {
                    if let Some(rest) = self.framer.take_partial() {
                        debug!(partial = %rest, "child output ended mid-line");
                    }
                    info!("child output stream closed");
                    let _ = self.events.send(RelayEvent::OutputClosed);
                    return;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    error!(error = %source, "error reading child output, output relay stopping");
                    let _ = self.events.send(RelayEvent::Failed {
                        relay: RelayKind::Output,
                        error: RelayError::Stream {
                            relay: RelayKind::Output,
                            source,
                        },
                    });
                    return;
                }
            }

            if display_ok {
                let mut echo = self.display.write_all(&byte);
                if echo.is_ok() && reader.buffer().is_empty() {
                    echo = self.display.flush();
                }
                if let Err(e) = echo {
                    warn!(error = %e, "operator display unavailable, output no longer echoed");
                    display_ok = false;
                }
            }

            match self.framer.push(byte[0]) {
                Some(line) => {
                    self.stats.record_line();
                    if let Some(cmd) = detect::detect(&line) {
                        self.stats.record_detected();
                        info!(username = %cmd.username, command = %cmd.text, "chat command detected");
                        if self.events.send(RelayEvent::Command(cmd)).is_err() {
                            debug!("supervisor gone, output relay stopping");
                            return;
                        }
                    }
                    if self.stop.is_stopped() {
                        debug!("output relay stopped");
                        return;
                    }
                }
                None if self.framer.is_throttled() => thread::sleep(self.backup_delay),
                None => {}
            }
        }
    }
}

impl<R, D> OutputRelay<R, D>
where
    R: Read + Send + 'static,
    D: Write + Send + 'static,
{
    /// Run the relay on its own thread
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }
}
