//! Request/response command protocol.
//!
//! A [`Session`] owns the port and performs one exchange at a time:
//!
//! 1. discard stale input left over from an earlier timed-out exchange
//! 2. write the request frame
//! 3. read byte by byte until the frame footer arrives or a read deadline
//!    passes with nothing received
//!
//! A missing or invalid reply is an ordinary [`Exchange`] outcome. Only
//! transport failures surface as errors.

use {
    crate::{
        error::{FrameError, Result},
        event::{EventSink, LogSink},
        port::Port,
        protocol::{
            CommandKind, CommandTable, Codec, FrameLayout, Response,
            frame::{FOOTER, HEADER},
        },
    },
    log::{debug, warn},
};

/// Bytes read before a reply with no footer is given up on.
pub const MAX_RESPONSE_LEN: usize = 1024;

/// Outcome of one request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// A frame that passed validation.
    Response(Response),
    /// Nothing arrived before the deadline.
    Timeout,
    /// Bytes arrived but did not form a valid frame.
    Malformed {
        /// Everything read for this exchange.
        raw: Vec<u8>,
        /// Why validation failed.
        error: FrameError,
    },
}

impl Exchange {
    /// Whether the device acknowledged the request.
    ///
    /// The protocol has no negative acknowledgment, so any valid frame counts.
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// The validated response, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Response(response) => Some(response),
            _ => None,
        }
    }
}

/// Exclusive, half-duplex command channel to one bootloader.
pub struct Session<P: Port, S: EventSink = LogSink> {
    port: P,
    codec: Codec,
    commands: CommandTable,
    sink: S,
}

impl<P: Port> Session<P> {
    /// Create a session with the default frame layout and command table,
    /// reporting events through `log`.
    pub fn new(port: P) -> Self {
        Self {
            port,
            codec: Codec::default(),
            commands: CommandTable::default(),
            sink: LogSink,
        }
    }
}

impl<P: Port, S: EventSink> Session<P, S> {
    /// Use a different frame layout.
    #[must_use]
    pub fn with_layout(mut self, layout: FrameLayout) -> Self {
        self.codec = Codec::new(layout);
        self
    }

    /// Use a different opcode table.
    #[must_use]
    pub fn with_commands(mut self, commands: CommandTable) -> Self {
        self.commands = commands;
        self
    }

    /// Report events to `sink` instead.
    pub fn with_sink<T: EventSink>(self, sink: T) -> Session<P, T> {
        Session {
            port: self.port,
            codec: self.codec,
            commands: self.commands,
            sink,
        }
    }

    /// The frame codec.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// The opcode table.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Get a reference to the event sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Get a mutable reference to the event sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the session and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Release the port. Later exchanges fail with a transport error.
    pub fn close(&mut self) -> Result<()> {
        debug!("Closing {}", self.port.name());
        self.port.close()
    }

    /// Build the request frame for a command.
    pub fn encode(&self, kind: CommandKind, payload: &[u8]) -> Result<Vec<u8>> {
        self.codec
            .encode_with_payload(self.commands.opcode(kind), payload)
    }

    /// Send one command and wait for its reply.
    ///
    /// An oversized payload is rejected before anything is written.
    pub fn transact(&mut self, kind: CommandKind, payload: &[u8]) -> Result<Exchange> {
        let frame = self.encode(kind, payload)?;

        self.port.clear_input()?;
        self.port.write_all_bytes(&frame)?;
        self.sink.on_sent(&frame);

        let raw = self.read_reply()?;
        if raw.is_empty() {
            debug!("{kind}: no response");
            self.sink.on_timeout();
            return Ok(Exchange::Timeout);
        }
        self.sink.on_received(&raw);

        match self.codec.decode_response(&raw) {
            Ok(response) => {
                debug!("{kind}: acknowledged ({} payload bytes)", response.payload.len());
                Ok(Exchange::Response(response))
            },
            Err(error) => {
                warn!("{kind}: malformed response: {error}");
                Ok(Exchange::Malformed { raw, error })
            },
        }
    }

    /// Send a command without payload.
    pub fn send(&mut self, kind: CommandKind) -> Result<Exchange> {
        self.transact(kind, &[])
    }

    /// Open the bootloader session.
    pub fn connect(&mut self) -> Result<Exchange> {
        self.send(CommandKind::Connect)
    }

    /// Close the bootloader session.
    pub fn disconnect(&mut self) -> Result<Exchange> {
        self.send(CommandKind::Disconnect)
    }

    /// Reset the device.
    pub fn reboot(&mut self) -> Result<Exchange> {
        self.send(CommandKind::Reboot)
    }

    /// Erase the application area.
    pub fn erase_firmware(&mut self) -> Result<Exchange> {
        self.send(CommandKind::EraseFirmware)
    }

    /// Request a firmware read-back.
    pub fn read_firmware(&mut self) -> Result<Exchange> {
        self.send(CommandKind::ReadFirmware)
    }

    /// Read until a complete frame, the deadline, or [`MAX_RESPONSE_LEN`].
    fn read_reply(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        while let Some(byte) = self.port.read_byte()? {
            buf.push(byte);
            if self.is_complete(&buf) {
                return Ok(buf);
            }
            if buf.len() >= MAX_RESPONSE_LEN {
                warn!("Reply exceeded {MAX_RESPONSE_LEN} bytes without a footer");
                return Ok(buf);
            }
        }
        Ok(buf)
    }

    fn is_complete(&self, buf: &[u8]) -> bool {
        let layout = self.codec.layout();
        let min = layout.min_frame_len();
        if buf.len() < min || !buf.ends_with(&FOOTER) {
            return false;
        }
        // With a length byte, a footer pattern inside the payload is not the end.
        if layout.length_byte && buf.starts_with(&HEADER) {
            let declared = usize::from(buf[HEADER.len() + 2]);
            return buf.len() >= min + declared;
        }
        true
    }
}
