//! The supervised server process

use crate::config::ServerConfig;
use crate::error::{RelayError, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
pub use portable_pty::ChildKiller;
use std::io::{self, Read, Write};

/// Handle to a running child with a merged output stream and an input stream
///
/// The supervisor owns the handle; each relay takes exactly one of the streams.
pub trait ChildHandle: Send + 'static {
    /// Take the child's combined stdout/stderr
    fn take_output(&mut self) -> Result<Box<dyn Read + Send>>;

    /// Take the child's stdin
    fn take_input(&mut self) -> Result<Box<dyn Write + Send>>;

    /// Block until the child exits, returning its exit code
    fn wait(&mut self) -> io::Result<i32>;

    /// A kill handle usable while another thread is blocked in [`ChildHandle::wait`]
    fn killer(&self) -> Box<dyn ChildKiller + Send + Sync>;

    fn pid(&self) -> Option<u32> {
        None
    }
}

/// A child running under a pseudo-terminal, so stderr lands in the same stream as stdout
pub struct PtyChild {
    // Dropping the master hangs up the child
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    output: Option<Box<dyn Read + Send>>,
    input: Option<Box<dyn Write + Send>>,
}

impl PtyChild {
    pub fn spawn(server: &ServerConfig) -> Result<Self> {
        let launch_err = |source: anyhow::Error| RelayError::Launch {
            executable: server.executable.clone(),
            source,
        };

        let cwd = server.resolved_working_dir().map_err(launch_err)?;

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: server.pty_rows,
                cols: server.pty_cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(launch_err)?;
        // Keep typed input out of the output stream the detector scans
        disable_echo(&*pair.master).map_err(launch_err)?;

        let mut cmd = CommandBuilder::new(&server.executable);
        cmd.args(&server.args);
        cmd.cwd(cwd);

        let child = pair.slave.spawn_command(cmd).map_err(launch_err)?;
        // Only the child keeps the slave open, so its exit ends our reads
        drop(pair.slave);

        let output = pair.master.try_clone_reader().map_err(launch_err)?;
        let input = pair.master.take_writer().map_err(launch_err)?;

        Ok(Self {
            _master: pair.master,
            child,
            output: Some(Box::new(PtyOutput(output))),
            input: Some(input),
        })
    }
}

impl ChildHandle for PtyChild {
    fn take_output(&mut self) -> Result<Box<dyn Read + Send>> {
        self.output.take().ok_or(RelayError::StreamTaken("output"))
    }

    fn take_input(&mut self) -> Result<Box<dyn Write + Send>> {
        self.input.take().ok_or(RelayError::StreamTaken("input"))
    }

    fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait()?;
        Ok(i32::try_from(status.exit_code()).unwrap_or(i32::MAX))
    }

    fn killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
        self.child.clone_killer()
    }

    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }
}

#[cfg(unix)]
fn disable_echo(master: &(dyn MasterPty + Send)) -> anyhow::Result<()> {
    use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};
    use std::os::fd::BorrowedFd;

    let Some(raw) = master.as_raw_fd() else {
        return Ok(());
    };
    // SAFETY: the master stays open for the duration of this call
    let fd = unsafe { BorrowedFd::borrow_raw(raw) };
    let mut termios = tcgetattr(fd)?;
    termios.local_flags.remove(LocalFlags::ECHO);
    tcsetattr(fd, SetArg::TCSANOW, &termios)?;
    Ok(())
}

#[cfg(not(unix))]
fn disable_echo(_master: &(dyn MasterPty + Send)) -> anyhow::Result<()> {
    Ok(())
}

/// PTY master reader that reports the child's hangup as end-of-stream
struct PtyOutput(Box<dyn Read + Send>);

impl Read for PtyOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf) {
            Err(e) if is_hangup(&e) => Ok(0),
            other => other,
        }
    }
}

#[cfg(unix)]
fn is_hangup(e: &io::Error) -> bool {
    // EIO once the slave side has no open descriptors left
    e.raw_os_error() == Some(5)
}

#[cfg(not(unix))]
fn is_hangup(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::BrokenPipe
}
