//! Shared fixtures: an in-memory child process and a shared output buffer

#![allow(dead_code)]

use chatrelay::config::RelayConfig;
use chatrelay::error::Result;
use chatrelay::process::ChildKiller;
use chatrelay::ChildHandle;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output fed chunk by chunk; reads end once every sender is dropped
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Cursor<Vec<u8>>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.pending.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            match self.rx.recv() {
                Ok(chunk) => self.pending = Cursor::new(chunk),
                Err(_) => return Ok(0),
            }
        }
    }
}

pub struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "stream torn down"))
    }
}

/// Lets a test write into a live child's output
#[derive(Clone, Debug)]
pub struct Feed(Arc<Mutex<Option<Sender<Vec<u8>>>>>);

impl Feed {
    pub fn send(&self, bytes: &[u8]) {
        if let Some(tx) = self.0.lock().unwrap().as_ref() {
            let _ = tx.send(bytes.to_vec());
        }
    }

    /// Close the child's output stream
    pub fn close(&self) {
        self.0.lock().unwrap().take();
    }
}

/// Kill handle for a [`ScriptedChild`]; a kill cuts a pending wait short
#[derive(Clone, Debug)]
pub struct ScriptedKiller {
    killed: Arc<AtomicBool>,
    feed: Option<Feed>,
    kill_tx: Arc<Mutex<Sender<()>>>,
}

impl ChildKiller for ScriptedKiller {
    fn kill(&mut self) -> io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        if let Some(feed) = &self.feed {
            feed.close();
        }
        let _ = self.kill_tx.lock().unwrap().send(());
        Ok(())
    }

    fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
        Box::new(self.clone())
    }
}

pub struct ScriptedChild {
    output: Option<Box<dyn Read + Send>>,
    pub input: SharedBuf,
    exit_code: i32,
    wait_delay: Duration,
    pub exited: Arc<AtomicBool>,
    pub killed: Arc<AtomicBool>,
    feed: Option<Feed>,
    kill_tx: Arc<Mutex<Sender<()>>>,
    kill_rx: Receiver<()>,
}

impl ScriptedChild {
    /// A child that prints `output` and then closes its stream
    pub fn finite(output: &[u8], exit_code: i32) -> Self {
        Self::with_reader(Box::new(Cursor::new(output.to_vec())), exit_code)
    }

    /// A child whose output arrives through the returned feed
    pub fn live() -> (Self, Feed) {
        let (tx, rx) = mpsc::channel();
        let feed = Feed(Arc::new(Mutex::new(Some(tx))));
        let reader = ChannelReader {
            rx,
            pending: Cursor::new(Vec::new()),
        };
        let mut child = Self::with_reader(Box::new(reader), 0);
        child.feed = Some(feed.clone());
        (child, feed)
    }

    pub fn with_reader(output: Box<dyn Read + Send>, exit_code: i32) -> Self {
        let (kill_tx, kill_rx) = mpsc::channel();
        Self {
            output: Some(output),
            input: SharedBuf::default(),
            exit_code,
            wait_delay: Duration::ZERO,
            exited: Arc::new(AtomicBool::new(false)),
            killed: Arc::new(AtomicBool::new(false)),
            feed: None,
            kill_tx: Arc::new(Mutex::new(kill_tx)),
            kill_rx,
        }
    }

    pub fn wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = delay;
        self
    }
}

impl ChildHandle for ScriptedChild {
    fn take_output(&mut self) -> Result<Box<dyn Read + Send>> {
        self.output
            .take()
            .ok_or(chatrelay::RelayError::StreamTaken("output"))
    }

    fn take_input(&mut self) -> Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.input.clone()))
    }

    fn wait(&mut self) -> io::Result<i32> {
        // Exits after the delay, or as soon as it is killed
        let _ = self.kill_rx.recv_timeout(self.wait_delay);
        self.exited.store(true, Ordering::SeqCst);
        Ok(self.exit_code)
    }

    fn killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
        Box::new(ScriptedKiller {
            killed: Arc::clone(&self.killed),
            feed: self.feed.clone(),
            kill_tx: Arc::clone(&self.kill_tx),
        })
    }
}

pub fn relay_config(separator: &str) -> RelayConfig {
    RelayConfig {
        line_separator: Some(separator.to_string()),
        backup_delay_ms: 1,
        ..RelayConfig::default()
    }
}

pub fn no_operator() -> Cursor<Vec<u8>> {
    Cursor::new(Vec::new())
}
