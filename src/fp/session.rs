//! Serial transport: one half-duplex request/response exchange at a time.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info, warn};

use super::codec::{decode_body, decode_header};
use super::commands::{Command, ResponseShape, TimeoutClass};
use super::error::{FpError, Result};
use super::response::{Reply, Status, interpret};
use super::types::{BODY_OVERHEAD, FRAME_SIZE};

/// Default baud rate of the module.
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Per-read port timeout; the session loops on it until the exchange window closes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Approximate duration of one unit of the module's acquisition timeout setting.
const ACQUISITION_UNIT: Duration = Duration::from_millis(300);

/// Slack added on top of the module's own acquisition timeout.
const ACQUISITION_MARGIN: Duration = Duration::from_secs(1);

/// Byte stream to the module.
pub trait Link: Read + Write + Send {
    /// Drop any buffered inbound bytes, returning how many were discarded.
    fn discard_input(&mut self) -> io::Result<usize>;
}

impl Link for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<usize> {
        let pending = self.bytes_to_read().map_err(io::Error::from)?;
        self.clear(ClearBuffer::Input).map_err(io::Error::from)?;
        Ok(pending as usize)
    }
}

/// Header wait per timeout class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub fast: Duration,
    pub slow: Duration,
    pub capture: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fast: Duration::from_millis(100),
            slow: Duration::from_secs(6),
            capture: Duration::from_secs(6),
        }
    }
}

/// Owned connection to one module.
pub struct Session<L: Link> {
    link: L,
    timeouts: Timeouts,
    baud_rate: u32,
    /// Last acquisition timeout value set on or read from the module.
    acquisition_timeout: Option<u8>,
}

impl Session<Box<dyn SerialPort>> {
    /// Open the serial port at `path`.
    pub fn open(path: &str, baud_rate: u32, poll_interval: Duration, timeouts: Timeouts) -> Result<Self> {
        info!("Opening fingerprint module on {path} at {baud_rate} baud");

        let port = serialport::new(path, baud_rate).timeout(poll_interval).open()?;
        Ok(Self::new(port, baud_rate, timeouts))
    }
}

impl<L: Link> Session<L> {
    pub fn new(link: L, baud_rate: u32, timeouts: Timeouts) -> Self {
        Self {
            link,
            timeouts,
            baud_rate,
            acquisition_timeout: None,
        }
    }

    /// Acquisition timeout value last seen on the module, if any.
    pub fn acquisition_timeout(&self) -> Option<u8> {
        self.acquisition_timeout
    }

    /// Record the module's acquisition timeout so capture windows follow it.
    pub fn note_acquisition_timeout(&mut self, value: u8) {
        self.acquisition_timeout = Some(value);
    }

    /// Header wait for a timeout class.
    pub fn window(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Fast => self.timeouts.fast,
            TimeoutClass::Slow => self.timeouts.slow,
            TimeoutClass::Capture => match self.acquisition_timeout {
                // 0 means the module waits for a finger indefinitely
                Some(value) if value > 0 => ACQUISITION_UNIT * u32::from(value) + ACQUISITION_MARGIN,
                _ => self.timeouts.capture,
            },
        }
    }

    /// Time to move `len` bytes over the wire, doubled for slack.
    fn transfer_time(&self, len: usize) -> Duration {
        let bits = (len as u64) * 10 * 2;
        Duration::from_millis(bits * 1000 / u64::from(self.baud_rate.max(1)))
    }

    /// Run one command and interpret its reply.
    pub fn execute(&mut self, command: &Command) -> Result<Reply> {
        let bytes = command.encode()?;
        let opcode = command.opcode();
        let window = self.window(command.timeout_class());
        debug!("{} (opcode {opcode:#04x}, window {window:?})", command.name());

        let raw = self.send_and_await(&bytes, opcode, window)?;
        let header = decode_header(&raw).inspect_err(|e| {
            warn!("Discarding reply to {}: {e}", command.name());
            self.resync();
        })?;

        if header.opcode != opcode {
            self.resync();
            return Err(FpError::framing(format!(
                "Reply echoes opcode {:#04x}, sent {opcode:#04x}",
                header.opcode
            )));
        }

        let status = Status::resolve(command.status_family(), header.status);
        let reply = match command.response_shape() {
            ResponseShape::Body { max_len } if status.is_success() => {
                let declared = usize::from(header.value());
                if declared > max_len {
                    self.resync();
                    return Err(FpError::integrity(format!(
                        "{} declares a {declared} byte body, maximum is {max_len}",
                        command.name()
                    )));
                }
                let body_window = window + self.transfer_time(declared + BODY_OVERHEAD);
                let raw_body = self.read_body(opcode, declared, body_window)?;
                let data = decode_body(&raw_body, declared).inspect_err(|e| {
                    warn!("Discarding body of {}: {e}", command.name());
                })?;
                interpret(command, &header, Some(data))?
            }
            _ => interpret(command, &header, None)?,
        };

        match (command, &reply) {
            (Command::SetAcquisitionTimeout(value), _) | (Command::GetAcquisitionTimeout, Reply::Value(value)) => {
                self.note_acquisition_timeout(*value);
            }
            _ => {}
        }

        Ok(reply)
    }

    /// Discard stale input, transmit `bytes` and wait for the fixed-size header.
    pub fn send_and_await(&mut self, bytes: &[u8], opcode: u8, window: Duration) -> Result<[u8; FRAME_SIZE]> {
        let stale = self.link.discard_input()?;
        if stale > 0 {
            warn!("Discarded {stale} stale bytes before opcode {opcode:#04x}");
        }

        debug!("TX ({} bytes): {:02X?}", bytes.len(), &bytes[..bytes.len().min(32)]);
        self.link.write_all(bytes)?;
        self.link.flush()?;

        let mut header = [0u8; FRAME_SIZE];
        self.read_within(&mut header, opcode, window)?;
        debug!("RX header: {header:02X?}");
        Ok(header)
    }

    /// Read a body of `declared_len` data bytes plus its framing.
    pub fn read_body(&mut self, opcode: u8, declared_len: usize, window: Duration) -> Result<Vec<u8>> {
        let mut body = vec![0u8; declared_len + BODY_OVERHEAD];
        self.read_within(&mut body, opcode, window)?;
        debug!("RX body ({} bytes): {:02X?}", body.len(), &body[..body.len().min(32)]);
        Ok(body)
    }

    /// Fill `buf` or fail with a timeout once `window` has elapsed.
    fn read_within(&mut self, buf: &mut [u8], opcode: u8, window: Duration) -> Result<()> {
        let deadline = Instant::now() + window;
        let mut received = 0;

        while received < buf.len() {
            if Instant::now() >= deadline {
                warn!(
                    "Timeout after {window:?} on opcode {opcode:#04x}: got {received} of {} bytes",
                    buf.len()
                );
                self.resync();
                return Err(FpError::AcquisitionTimeout { opcode, waited: window });
            }

            match self.link.read(&mut buf[received..]) {
                Ok(n) => received += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    warn!("Link read failed on opcode {opcode:#04x}: {e}");
                    self.resync();
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// Drop whatever is left of an abandoned exchange.
    fn resync(&mut self) {
        match self.link.discard_input() {
            Ok(0) => {}
            Ok(n) => debug!("Resync discarded {n} bytes"),
            Err(e) => warn!("Failed to discard input: {e}"),
        }
    }
}
