//! Scripted in-memory link for exercising sessions without hardware.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::codec::{encode, encode_packet};
use super::session::Link;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
struct MockState {
    inbound: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    written: Vec<Vec<u8>>,
    read_error: Option<io::ErrorKind>,
}

/// Cloneable handle; all clones share the same wire.
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link that answers every write through `responder`.
    pub fn with_responder(responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        let link = Self::new();
        link.state().responder = Some(Box::new(responder));
        link
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Queue the bytes delivered after the next write.
    pub fn reply(&self, bytes: impl Into<Vec<u8>>) -> &Self {
        self.state().replies.push_back(bytes.into());
        self
    }

    /// Bytes already sitting in the input buffer.
    pub fn stale(&self, bytes: &[u8]) -> &Self {
        self.state().inbound.extend(bytes.iter().copied());
        self
    }

    /// Make every following read fail with `kind`.
    pub fn fail_reads(&self, kind: io::ErrorKind) -> &Self {
        self.state().read_error = Some(kind);
        self
    }

    /// Every write, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    /// Opcodes of every write, in order.
    pub fn sent_opcodes(&self) -> Vec<u8> {
        self.state().written.iter().map(|w| w[1]).collect()
    }

    pub fn pending_input(&self) -> usize {
        self.state().inbound.len()
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if let Some(kind) = state.read_error {
            return Err(io::Error::new(kind, "link failure"));
        }
        if state.inbound.is_empty() {
            drop(state);
            std::thread::sleep(Duration::from_millis(1));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.state();
        let state = &mut *guard;
        state.written.push(buf.to_vec());
        let reply = match state.responder.as_mut() {
            Some(responder) => responder(buf),
            None => state.replies.pop_front().unwrap_or_default(),
        };
        state.inbound.extend(reply);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for MockLink {
    fn discard_input(&mut self) -> io::Result<usize> {
        let mut state = self.state();
        let n = state.inbound.len();
        state.inbound.clear();
        Ok(n)
    }
}

/// Response header as the module would send it.
pub fn ack(opcode: u8, field_a: u8, field_b: u8, status: u8) -> Vec<u8> {
    encode(opcode, field_a, field_b, status, 0).to_vec()
}

/// Successful header announcing `data`, followed by its body packet.
pub fn ack_with_body(opcode: u8, data: &[u8]) -> Vec<u8> {
    let [high, low] = (data.len() as u16).to_be_bytes();
    let mut bytes = ack(opcode, high, low, 0);
    bytes.extend_from_slice(&encode_packet(data));
    bytes
}
