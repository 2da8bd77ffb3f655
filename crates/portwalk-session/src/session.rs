//! Port session
//!
//! A [`Session`] owns one open serial link through a spawned I/O task. The
//! session itself is a cheap handle: share it behind an `Arc` and one task can
//! sit in [`Session::read`] while others write, reconfigure, toggle modem
//! lines or close.
//!
//! # Architecture
//!
//! ```text
//!  read / write / set_mode / ...        close
//!          │  mpsc<Command>               │ watch<bool>
//!          ▼                              ▼
//!   ┌─────────────────────── I/O task ───────────────────────┐
//!   │ select! { closed, next command, link.read (if wanted) } │
//!   └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads are pulled: the task only reads the link while a reader is waiting,
//! so bytes stay in the OS buffer (and are purged by
//! [`Session::reset_input_buffer`]) until someone asks for them. Bytes read
//! for a reader that gave up before delivery are stashed and served first on
//! the next read.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use portwalk_core::{Mode, PortError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::link::{open_link, Buffer, SerialLink};

/// Largest single read from the link
const READ_CHUNK: usize = 4096;

/// Depth of the command queue
const COMMAND_QUEUE: usize = 32;

/// Last driven state of the modem control outputs
///
/// `None` until the line is first set through the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lines {
    pub dtr: Option<bool>,
    pub rts: Option<bool>,
}

type Reply<T> = oneshot::Sender<Result<T, PortError>>;

enum Command {
    Read { max: usize, reply: Reply<Vec<u8>> },
    Write { data: Vec<u8>, reply: Reply<usize> },
    SetMode { mode: Mode, reply: Reply<()> },
    SetDtr { level: bool, reply: Reply<()> },
    SetRts { level: bool, reply: Reply<()> },
    Reset { buffer: Buffer, reply: Reply<()> },
}

#[derive(Debug)]
struct LinkState {
    mode: Mode,
    lines: Lines,
}

/// State shared between the handle and its I/O task
struct Shared {
    name: String,
    closed: watch::Sender<bool>,
    state: Mutex<LinkState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// An open serial port
pub struct Session {
    shared: Arc<Shared>,
    commands: mpsc::Sender<Command>,
    read_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open a serial device.
    ///
    /// Fails with `PortNotFound`, `PermissionDenied`, `PortBusy`,
    /// `InvalidMode`, `InvalidSpeed` or `Io`. Nothing is retried; see
    /// [`PortError::is_retryable`].
    ///
    /// The serial driver has no mark or space parity and no 1.5 stop bits;
    /// a `mode` asking for either fails with `InvalidMode`, here and in
    /// [`Session::set_mode`].
    pub async fn open(name: &str, mode: Mode) -> Result<Session, PortError> {
        let link = open_link(name, &mode)?;
        info!(port = %name, mode = %mode, "Serial port opened");
        Session::with_link(name, link, mode)
    }

    /// Start a session over an already open link, applying `mode` first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_link<L: SerialLink>(
        name: impl Into<String>,
        mut link: L,
        mode: Mode,
    ) -> Result<Session, PortError> {
        mode.validate()?;
        link.apply_mode(&mode)?;

        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            name: name.into(),
            closed,
            state: Mutex::new(LinkState {
                mode,
                lines: Lines::default(),
            }),
        });
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let task = tokio::spawn(run_link(shared.clone(), link, command_rx));

        Ok(Session {
            shared,
            commands,
            read_lock: tokio::sync::Mutex::new(()),
            task: Mutex::new(Some(task)),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_open(&self) -> bool {
        !self.shared.is_closed()
    }

    /// The most recently applied mode
    pub fn mode(&self) -> Mode {
        self.shared.state().mode
    }

    pub fn lines(&self) -> Lines {
        self.shared.state().lines
    }

    /// Wait for at least one byte, copying at most `buf.len()`.
    ///
    /// Returns `PortClosed` as soon as the session is closed from anywhere,
    /// or when the device hangs up. Concurrent reads are served one at a
    /// time.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, PortError> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let mut closed = self.shared.closed.subscribe();
        let _guard = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => return Err(PortError::PortClosed),
            guard = self.read_lock.lock() => guard,
        };

        let (reply, response) = oneshot::channel();
        self.send(Command::Read {
            max: buf.len(),
            reply,
        })
        .await?;

        let data = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => return Err(PortError::PortClosed),
            result = response => result.map_err(|_| PortError::PortClosed)??,
        };

        // Data may race a close; a closed session delivers nothing
        if self.shared.is_closed() {
            return Err(PortError::PortClosed);
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Write and flush the whole buffer.
    ///
    /// A write stalled by flow control is abandoned when the session closes
    /// and reports `PortClosed`; some of the data may have been sent.
    pub async fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        let data = data.to_vec();
        self.request(|reply| Command::Write { data, reply }).await
    }

    /// Reconfigure the open port. A pending read is not disturbed.
    pub async fn set_mode(&self, mode: Mode) -> Result<(), PortError> {
        self.ensure_open()?;
        mode.validate()?;
        self.request(|reply| Command::SetMode { mode, reply }).await
    }

    pub async fn set_dtr(&self, level: bool) -> Result<(), PortError> {
        self.request(|reply| Command::SetDtr { level, reply }).await
    }

    pub async fn set_rts(&self, level: bool) -> Result<(), PortError> {
        self.request(|reply| Command::SetRts { level, reply }).await
    }

    /// Discard received data that has not been read yet
    pub async fn reset_input_buffer(&self) -> Result<(), PortError> {
        self.request(|reply| Command::Reset {
            buffer: Buffer::Input,
            reply,
        })
        .await
    }

    /// Discard written data that has not been transmitted yet
    pub async fn reset_output_buffer(&self) -> Result<(), PortError> {
        self.request(|reply| Command::Reset {
            buffer: Buffer::Output,
            reply,
        })
        .await
    }

    /// Close the port, cancelling any pending read.
    ///
    /// Returns once the link has been released. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), PortError> {
        if !self.shared.closed.send_replace(true) {
            info!(port = %self.shared.name, "Closing serial port");
        }

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(port = %self.shared.name, error = %e, "I/O task ended abnormally");
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), PortError> {
        if self.shared.is_closed() {
            Err(PortError::PortClosed)
        } else {
            Ok(())
        }
    }

    /// Queue a command for the I/O task, giving up when the session closes
    async fn send(&self, command: Command) -> Result<(), PortError> {
        let mut closed = self.shared.closed.subscribe();
        tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => Err(PortError::PortClosed),
            sent = self.commands.send(command) => sent.map_err(|_| PortError::PortClosed),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, PortError> {
        self.ensure_open()?;
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| PortError::PortClosed)?
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.closed.send_replace(true);
    }
}

enum Event {
    Closed,
    Command(Option<Command>),
    Read(std::io::Result<usize>),
}

async fn run_link<L: SerialLink>(
    shared: Arc<Shared>,
    mut link: L,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut closed = shared.closed.subscribe();
    let mut pending: Option<(usize, Reply<Vec<u8>>)> = None;
    let mut stash: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];

    debug!(port = %shared.name, "I/O task started");

    loop {
        if pending.as_ref().is_some_and(|(_, reply)| reply.is_closed()) {
            trace!(port = %shared.name, "Reader went away");
            pending = None;
        }

        if !stash.is_empty() {
            if let Some((max, reply)) = pending.take() {
                let n = max.min(stash.len());
                let data: Vec<u8> = stash.drain(..n).collect();
                if let Err(Ok(data)) = reply.send(Ok(data)) {
                    stash.splice(0..0, data);
                }
                continue;
            }
        }

        let want = pending.as_ref().map_or(0, |(max, _)| (*max).min(READ_CHUNK));
        let event = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => Event::Closed,
            command = commands.recv() => Event::Command(command),
            result = link.read(&mut buf[..want]), if pending.is_some() => Event::Read(result),
        };

        match event {
            Event::Closed | Event::Command(None) => break,
            Event::Command(Some(command)) => {
                handle_command(
                    &shared,
                    &mut link,
                    &mut closed,
                    command,
                    &mut pending,
                    &mut stash,
                )
                .await;
            }
            Event::Read(Ok(0)) => {
                info!(port = %shared.name, "Device hung up");
                shared.closed.send_replace(true);
                break;
            }
            Event::Read(Ok(n)) => {
                trace!(port = %shared.name, bytes = n, data = ?&buf[..n], "Received data");
                if let Some((_, reply)) = pending.take() {
                    if let Err(Ok(data)) = reply.send(Ok(buf[..n].to_vec())) {
                        stash.extend_from_slice(&data);
                    }
                }
            }
            Event::Read(Err(e)) => {
                warn!(port = %shared.name, error = %e, "Read failed");
                if let Some((_, reply)) = pending.take() {
                    let _ = reply.send(Err(PortError::Io(e)));
                }
            }
        }
    }

    // Pending callers see their reply channel drop and report PortClosed
    drop(pending);
    drop(link);
    debug!(port = %shared.name, "I/O task finished, link released");
}

async fn handle_command<L: SerialLink>(
    shared: &Shared,
    link: &mut L,
    closed: &mut watch::Receiver<bool>,
    command: Command,
    pending: &mut Option<(usize, Reply<Vec<u8>>)>,
    stash: &mut Vec<u8>,
) {
    match command {
        Command::Read { max, reply } => {
            *pending = Some((max, reply));
        }
        Command::Write { data, reply } => {
            let write = async {
                link.write_all(&data).await?;
                link.flush().await
            };
            let result = tokio::select! {
                biased;
                _ = closed.wait_for(|c| *c) => {
                    debug!(port = %shared.name, "Write abandoned on close");
                    Err(PortError::PortClosed)
                }
                written = write => written.map(|()| data.len()).map_err(PortError::Io),
            };
            if result.is_ok() {
                trace!(port = %shared.name, bytes = data.len(), "Sent data");
            }
            let _ = reply.send(result);
        }
        Command::SetMode { mode, reply } => {
            let result = link.apply_mode(&mode);
            if result.is_ok() {
                shared.state().mode = mode;
                debug!(port = %shared.name, mode = %mode, "Mode changed");
            }
            let _ = reply.send(result);
        }
        Command::SetDtr { level, reply } => {
            let result = link.set_dtr(level);
            if result.is_ok() {
                shared.state().lines.dtr = Some(level);
            }
            let _ = reply.send(result);
        }
        Command::SetRts { level, reply } => {
            let result = link.set_rts(level);
            if result.is_ok() {
                shared.state().lines.rts = Some(level);
            }
            let _ = reply.send(result);
        }
        Command::Reset { buffer, reply } => {
            let result = link.clear(buffer);
            if buffer == Buffer::Input {
                stash.clear();
            }
            debug!(port = %shared.name, ?buffer, "Buffer reset");
            let _ = reply.send(result);
        }
    }
}
