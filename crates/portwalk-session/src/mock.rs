//! In-memory serial link
//!
//! [`mock_link`] returns a connected pair: the [`MockLink`] goes into a
//! session, the [`MockPeer`] stays with the test to play the device. The peer
//! injects inbound bytes, collects what the session wrote, watches mode and
//! modem line changes, and can hang the line up.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use portwalk_core::{Mode, PortError};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::link::{Buffer, SerialLink};

/// Control operation observed on a mock link, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Mode(Mode),
    Dtr(bool),
    Rts(bool),
    Clear(Buffer),
}

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<u8>,
    read_waker: Option<Waker>,
    outbound: Vec<u8>,
    mode: Option<Mode>,
    dtr: Option<bool>,
    rts: Option<bool>,
    events: Vec<LinkEvent>,
    input_clears: usize,
    output_clears: usize,
    rejected_bauds: Vec<u32>,
    writes_stalled: bool,
    write_waker: Option<Waker>,
    hung_up: bool,
    released: usize,
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session side of the pair
#[derive(Debug)]
pub struct MockLink {
    state: Shared,
}

/// Device side of the pair
#[derive(Debug, Clone)]
pub struct MockPeer {
    state: Shared,
}

/// Create a connected link/peer pair
pub fn mock_link() -> (MockLink, MockPeer) {
    let state = Shared::default();
    (
        MockLink {
            state: state.clone(),
        },
        MockPeer { state },
    )
}

impl MockPeer {
    /// Make bytes available to the next read
    pub fn inject(&self, data: &[u8]) {
        let mut state = lock(&self.state);
        state.inbound.extend(data);
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).outbound.clone()
    }

    /// Inbound bytes not yet consumed by the session
    pub fn unread(&self) -> usize {
        lock(&self.state).inbound.len()
    }

    /// Last applied mode
    pub fn mode(&self) -> Option<Mode> {
        lock(&self.state).mode
    }

    pub fn dtr(&self) -> Option<bool> {
        lock(&self.state).dtr
    }

    pub fn rts(&self) -> Option<bool> {
        lock(&self.state).rts
    }

    /// Control operations in the order they reached the link
    pub fn events(&self) -> Vec<LinkEvent> {
        lock(&self.state).events.clone()
    }

    pub fn input_clears(&self) -> usize {
        lock(&self.state).input_clears
    }

    pub fn output_clears(&self) -> usize {
        lock(&self.state).output_clears
    }

    /// Fail `apply_mode` for this baud rate
    pub fn reject_baud(&self, baud_rate: u32) {
        lock(&self.state).rejected_bauds.push(baud_rate);
    }

    /// Hold every write pending, as a port with CTS low would
    pub fn stall_writes(&self) {
        lock(&self.state).writes_stalled = true;
    }

    /// Let stalled writes through again
    pub fn resume_writes(&self) {
        let mut state = lock(&self.state);
        state.writes_stalled = false;
        if let Some(waker) = state.write_waker.take() {
            waker.wake();
        }
    }

    /// Signal end of stream to the reader
    pub fn hang_up(&self) {
        let mut state = lock(&self.state);
        state.hung_up = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }

    /// How many times the link was dropped
    pub fn released(&self) -> usize {
        lock(&self.state).released
    }
}

impl AsyncRead for MockLink {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = lock(&self.state);
        if !state.inbound.is_empty() {
            let n = buf.remaining().min(state.inbound.len());
            let chunk: Vec<u8> = state.inbound.drain(..n).collect();
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        if state.hung_up {
            return Poll::Ready(Ok(()));
        }
        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for MockLink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = lock(&self.state);
        if state.hung_up {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        if state.writes_stalled {
            state.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        state.outbound.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl SerialLink for MockLink {
    fn apply_mode(&mut self, mode: &Mode) -> Result<(), PortError> {
        let mut state = lock(&self.state);
        if state.rejected_bauds.contains(&mode.baud_rate) {
            return Err(PortError::InvalidSpeed(mode.baud_rate));
        }
        state.mode = Some(*mode);
        state.events.push(LinkEvent::Mode(*mode));
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        let mut state = lock(&self.state);
        state.dtr = Some(level);
        state.events.push(LinkEvent::Dtr(level));
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        let mut state = lock(&self.state);
        state.rts = Some(level);
        state.events.push(LinkEvent::Rts(level));
        Ok(())
    }

    fn clear(&mut self, buffer: Buffer) -> Result<(), PortError> {
        let mut state = lock(&self.state);
        match buffer {
            Buffer::Input => {
                state.inbound.clear();
                state.input_clears += 1;
            }
            Buffer::Output => state.output_clears += 1,
        }
        state.events.push(LinkEvent::Clear(buffer));
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        lock(&self.state).released += 1;
    }
}
