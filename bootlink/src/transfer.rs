//! Chunked firmware upload.
//!
//! ## State machine
//!
//! ```text
//!            start            chunk acked
//!   Idle ------------> Sending(0) -----> Sending(n) ... Sending(total)
//!                         |                  |               |
//!                         | timeout/abort    |               | WriteComplete
//!                         v                  v               v
//!                      Aborted  <------------+          Done(acked?)
//! ```
//!
//! Every chunk is a `WriteFirmware` frame holding `image[offset..offset + n]`.
//! Any valid reply acknowledges it; a timeout or malformed reply aborts the
//! transfer without retry. After the last chunk a `WriteComplete` frame
//! carries the image size and whole-image checksum, both big-endian.
//!
//! [`TransferMode::Automatic`] transfers are driven by [`FirmwareTransfer::run`].
//! [`TransferMode::ManualStep`] transfers advance one transition per call to
//! [`FirmwareTransfer::advance`]. Both put the same bytes on the wire.

use {
    crate::{
        error::{Error, Result},
        event::EventSink,
        port::Port,
        protocol::{CommandKind, Crc32, frame::MAX_PAYLOAD},
        session::{Exchange, Session},
    },
    byteorder::{BigEndian, WriteBytesExt},
    log::{debug, info, warn},
    std::{
        io::Read,
        path::Path,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    },
};

/// Chunk size used when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = MAX_PAYLOAD;

/// An immutable firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
    checksum: u32,
}

impl FirmwareImage {
    /// Wrap image bytes.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let checksum = Crc32::default().checksum_widened(&data);
        Self { data, checksum }
    }

    /// Read an image to the end of `reader`.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::from_bytes(data))
    }

    /// Load a raw binary image from disk.
    pub fn from_file<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        debug!(
            "Loaded {} bytes from {}",
            data.len(),
            path.as_ref().display()
        );
        Ok(Self::from_bytes(data))
    }

    /// Image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image has no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Word-widened checksum over the whole image, as sent in the completion
    /// packet.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Number of chunks of at most `chunk_size` bytes.
    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        if chunk_size == 0 {
            return 0;
        }
        self.data.len().div_ceil(chunk_size)
    }

    /// Payload of the completion packet: size then checksum, big-endian.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn completion_payload(&self) -> Result<Vec<u8>> {
        let size = u32::try_from(self.data.len()).map_err(|_| Error::ImageTooLarge(self.data.len()))?;
        let mut payload = Vec::with_capacity(8);
        payload.write_u32::<BigEndian>(size).unwrap();
        payload.write_u32::<BigEndian>(self.checksum).unwrap();
        Ok(payload)
    }
}

/// Tunables of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct TransferConfig {
    /// Largest chunk per `WriteFirmware` frame (1..=255).
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferConfig {
    /// Create a validated configuration.
    pub fn new(chunk_size: usize) -> Result<Self> {
        let config = Self { chunk_size };
        config.validate()?;
        Ok(config)
    }

    /// Check that every chunk fits in one frame.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD {
            return Err(Error::Config(format!(
                "chunk size must be between 1 and {MAX_PAYLOAD}, got {}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

/// How a transfer is paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum TransferMode {
    /// Send the next chunk as soon as the previous one is acknowledged.
    #[default]
    Automatic,
    /// Send one chunk per operator request.
    ManualStep,
}

/// Why a transfer stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The operator asked to stop.
    Operator,
    /// A chunk got no valid reply.
    NoAck,
    /// The port failed.
    Transport,
}

/// Position of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    /// Not started.
    #[default]
    Idle,
    /// `offset` bytes acknowledged; the next chunk starts there.
    Sending {
        /// Bytes acknowledged so far.
        offset: usize,
    },
    /// The completion packet is in flight.
    Completing,
    /// Finished; `acknowledged` tells whether the completion packet was.
    Done {
        /// The device answered the completion packet.
        acknowledged: bool,
    },
    /// Stopped before completion. Terminal.
    Aborted {
        /// Bytes acknowledged before stopping.
        offset: usize,
        /// Why it stopped.
        reason: AbortReason,
    },
}

impl TransferState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Aborted { .. })
    }

    /// Whether the transfer has started and not yet finished.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Sending { .. } | Self::Completing)
    }

    /// Whether the transfer finished with an acknowledged completion.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done { acknowledged: true })
    }
}

/// Cooperative cancellation flag, checked between chunks.
///
/// Cheap to clone and safe to trigger from another thread or a signal
/// handler.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Request the transfer to stop before its next chunk.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether an abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One firmware upload.
#[derive(Debug)]
pub struct FirmwareTransfer {
    image: FirmwareImage,
    mode: TransferMode,
    config: TransferConfig,
    state: TransferState,
    abort: AbortHandle,
}

impl FirmwareTransfer {
    /// Prepare a transfer of `image`.
    pub fn new(image: FirmwareImage, mode: TransferMode) -> Self {
        Self {
            image,
            mode,
            config: TransferConfig::default(),
            state: TransferState::Idle,
            abort: AbortHandle::default(),
        }
    }

    /// Use different tunables. Validated when the transfer starts.
    #[must_use]
    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Pacing mode.
    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// The image being sent.
    pub fn image(&self) -> &FirmwareImage {
        &self.image
    }

    /// Active tunables.
    pub fn config(&self) -> TransferConfig {
        self.config
    }

    /// A handle that can abort this transfer from elsewhere.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Acknowledged bytes and image size.
    pub fn progress(&self) -> (usize, usize) {
        let total = self.image.len();
        let done = match self.state {
            TransferState::Idle => 0,
            TransferState::Sending { offset } | TransferState::Aborted { offset, .. } => offset,
            TransferState::Completing | TransferState::Done { .. } => total,
        };
        (done, total)
    }

    /// Leave `Idle` and prepare to send the first chunk.
    pub fn start(&mut self) -> Result<()> {
        if self.state != TransferState::Idle {
            return Err(Error::InvalidState(format!(
                "transfer cannot start from {:?}",
                self.state
            )));
        }
        if self.image.is_empty() {
            return Err(Error::NoImageLoaded);
        }
        if u32::try_from(self.image.len()).is_err() {
            return Err(Error::ImageTooLarge(self.image.len()));
        }
        self.config.validate()?;

        info!(
            "Starting {:?} transfer: {} bytes in {} chunks",
            self.mode,
            self.image.len(),
            self.image.chunk_count(self.config.chunk_size)
        );
        self.state = TransferState::Sending { offset: 0 };
        Ok(())
    }

    /// Perform exactly one transition and return the new state.
    ///
    /// From `Idle` the transfer is started first. From `Sending` this sends
    /// either the next chunk or, once every byte is acknowledged, the
    /// completion packet. A pending abort request is honored before
    /// anything is sent.
    ///
    /// Transport failures abort the transfer and are returned as errors.
    /// A missing acknowledgment is not an error: it yields an `Aborted`
    /// state.
    pub fn advance<P: Port, S: EventSink>(
        &mut self,
        session: &mut Session<P, S>,
    ) -> Result<TransferState> {
        if self.state == TransferState::Idle {
            self.start()?;
        }

        let TransferState::Sending { offset } = self.state else {
            return Err(Error::InvalidState(format!(
                "transfer already finished: {:?}",
                self.state
            )));
        };

        if self.abort.is_aborted() {
            return Ok(self.stop(session, offset, AbortReason::Operator));
        }

        let total = self.image.len();
        if offset == total {
            return self.complete(session);
        }

        let end = total.min(offset + self.config.chunk_size);
        let chunk = &self.image.as_bytes()[offset..end];
        debug!("Sending chunk {offset:#x}..{end:#x}");

        match session.transact(CommandKind::WriteFirmware, chunk) {
            Ok(Exchange::Response(_)) => {
                self.state = TransferState::Sending { offset: end };
                session
                    .sink_mut()
                    .on_transfer_progress(end, total);
                Ok(self.state)
            },
            Ok(_) => {
                warn!("Chunk at offset {offset} not acknowledged");
                Ok(self.stop(session, offset, AbortReason::NoAck))
            },
            Err(e) => {
                self.stop(session, offset, AbortReason::Transport);
                Err(e)
            },
        }
    }

    /// Drive an automatic transfer to its end.
    pub fn run<P: Port, S: EventSink>(&mut self, session: &mut Session<P, S>) -> Result<TransferState> {
        if self.mode != TransferMode::Automatic {
            return Err(Error::InvalidState(
                "step-mode transfers are advanced by the operator".to_string(),
            ));
        }
        loop {
            let state = self.advance(session)?;
            if state.is_terminal() {
                return Ok(state);
            }
        }
    }

    /// Stop the transfer now. No frame is sent.
    ///
    /// Has no effect once the transfer has finished. An abort requested
    /// before the transfer starts is applied at its first step.
    pub fn abort<P: Port, S: EventSink>(&mut self, session: &mut Session<P, S>) -> TransferState {
        self.abort.abort();
        if let TransferState::Sending { offset } = self.state {
            self.stop(session, offset, AbortReason::Operator);
        }
        self.state
    }

    /// Return a finished transfer to `Idle` so the image can be sent again.
    pub fn reset(&mut self) -> Result<()> {
        if self.state.is_active() {
            return Err(Error::InvalidState(
                "cannot reset a transfer in progress".to_string(),
            ));
        }
        self.abort.clear();
        self.state = TransferState::Idle;
        Ok(())
    }

    fn complete<P: Port, S: EventSink>(&mut self, session: &mut Session<P, S>) -> Result<TransferState> {
        let total = self.image.len();
        let payload = self.image.completion_payload()?;
        self.state = TransferState::Completing;
        debug!(
            "All {total} bytes acknowledged, sending completion (checksum {:#010x})",
            self.image.checksum()
        );

        let acknowledged = match session.transact(CommandKind::WriteComplete, &payload) {
            Ok(exchange) => exchange.is_ack(),
            Err(e) => {
                self.stop(session, total, AbortReason::Transport);
                return Err(e);
            },
        };

        if acknowledged {
            info!("Transfer of {total} bytes complete");
        } else {
            warn!("Completion packet not acknowledged");
        }
        self.state = TransferState::Done { acknowledged };
        session
            .sink_mut()
            .on_transfer_done(acknowledged);
        Ok(self.state)
    }

    fn stop<P: Port, S: EventSink>(
        &mut self,
        session: &mut Session<P, S>,
        offset: usize,
        reason: AbortReason,
    ) -> TransferState {
        warn!(
            "Transfer aborted at {offset}/{} bytes ({reason:?})",
            self.image.len()
        );
        self.state = TransferState::Aborted { offset, reason };
        session
            .sink_mut()
            .on_transfer_done(false);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            event::{Event, Recorder},
            port::mock::MockPort,
            protocol::{Codec, frame::REQUEST_ACK},
        },
    };

    const WRITE: u8 = 0xA0;
    const COMPLETE: u8 = 0xA8;

    #[allow(clippy::cast_possible_truncation)]
    fn image(len: usize) -> FirmwareImage {
        FirmwareImage::from_bytes((0..len).map(|i| (i % 256) as u8).collect::<Vec<_>>())
    }

    fn ack() -> Vec<u8> {
        Codec::default()
            .encode_frame(WRITE, REQUEST_ACK, &[])
            .unwrap()
    }

    fn acking_session(replies: usize) -> Session<MockPort, Recorder> {
        let mut port = MockPort::new();
        for _ in 0..replies {
            port.reply(&ack());
        }
        Session::new(port).with_sink(Recorder::default())
    }

    /// Decoded (command, payload) of every written frame.
    fn sent(session: &Session<MockPort, Recorder>) -> Vec<(u8, Vec<u8>)> {
        let codec = Codec::default();
        session
            .port()
            .written
            .iter()
            .map(|frame| {
                let parsed = codec.decode_response(frame).unwrap();
                (parsed.command, parsed.payload)
            })
            .collect()
    }

    #[test]
    fn test_image_checksum_and_chunks() {
        let img = image(300);
        assert_eq!(img.len(), 300);
        assert_eq!(img.checksum(), 0xE732FEFA);
        assert_eq!(img.chunk_count(255), 2);
        assert_eq!(img.chunk_count(100), 3);
        assert_eq!(img.chunk_count(0), 0);
        assert_eq!(
            img.completion_payload().unwrap(),
            vec![0x00, 0x00, 0x01, 0x2C, 0xE7, 0x32, 0xFE, 0xFA]
        );
    }

    #[test]
    fn test_image_from_reader_and_file() {
        let bytes: Vec<u8> = (0..=255).collect();
        let from_reader = FirmwareImage::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(from_reader.as_bytes(), bytes.as_slice());

        let path = std::env::temp_dir().join(format!("bootlink-image-{}.bin", std::process::id()));
        std::fs::write(&path, &bytes).unwrap();
        let from_file = FirmwareImage::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(from_file, from_reader);

        assert!(FirmwareImage::from_file("/nonexistent/bootlink.bin").is_err());
    }

    #[test]
    fn test_automatic_300_bytes() {
        let img = image(300);
        let mut session = acking_session(3);
        let mut transfer = FirmwareTransfer::new(img.clone(), TransferMode::Automatic);

        let state = transfer.run(&mut session).unwrap();
        assert_eq!(state, TransferState::Done { acknowledged: true });
        assert!(state.is_success());

        let frames = sent(&session);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], (WRITE, img.as_bytes()[..255].to_vec()));
        assert_eq!(frames[1], (WRITE, img.as_bytes()[255..].to_vec()));
        assert_eq!(
            frames[2],
            (COMPLETE, vec![0x00, 0x00, 0x01, 0x2C, 0xE7, 0x32, 0xFE, 0xFA])
        );

        let sink = session.sink();
        assert_eq!(sink.count(&Event::Progress(255, 300)), 1);
        assert_eq!(sink.count(&Event::Progress(300, 300)), 1);
        assert_eq!(sink.count(&Event::Done(true)), 1);
        assert_eq!(sink.count(&Event::Done(false)), 0);
    }

    #[test]
    fn test_manual_step_matches_automatic() {
        let img = image(300);

        let mut auto_session = acking_session(3);
        FirmwareTransfer::new(img.clone(), TransferMode::Automatic)
            .run(&mut auto_session)
            .unwrap();

        let mut step_session = acking_session(3);
        let mut transfer = FirmwareTransfer::new(img, TransferMode::ManualStep);
        assert_eq!(
            transfer.advance(&mut step_session).unwrap(),
            TransferState::Sending { offset: 255 }
        );
        assert_eq!(step_session.port().written.len(), 1);
        assert_eq!(
            transfer.advance(&mut step_session).unwrap(),
            TransferState::Sending { offset: 300 }
        );
        assert_eq!(step_session.port().written.len(), 2);
        assert_eq!(
            transfer.advance(&mut step_session).unwrap(),
            TransferState::Done { acknowledged: true }
        );

        assert_eq!(step_session.port().written, auto_session.port().written);
        assert!(matches!(
            transfer.advance(&mut step_session),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_run_refuses_manual_step() {
        let mut session = acking_session(0);
        let mut transfer = FirmwareTransfer::new(image(10), TransferMode::ManualStep);
        assert!(matches!(
            transfer.run(&mut session),
            Err(Error::InvalidState(_))
        ));
        assert!(session.port().written.is_empty());
        assert_eq!(transfer.state(), TransferState::Idle);
    }

    #[test]
    fn test_chunks_partition_image() {
        for chunk_size in [255usize, 64, 1] {
            for len in [1usize, 64, 254, 255, 256, 510, 511, 1000] {
                let img = image(len);
                let chunks = img.chunk_count(chunk_size);
                let mut session = acking_session(chunks + 1);
                let mut transfer = FirmwareTransfer::new(img.clone(), TransferMode::Automatic)
                    .with_config(TransferConfig::new(chunk_size).unwrap());

                let state = transfer.run(&mut session).unwrap();
                assert!(state.is_success(), "len {len} chunk {chunk_size}");

                let frames = sent(&session);
                assert_eq!(frames.len(), chunks + 1);
                let (body, last) = frames.split_at(chunks);
                assert!(body.iter().all(|(cmd, p)| *cmd == WRITE && p.len() <= chunk_size));
                let joined: Vec<u8> = body
                    .iter()
                    .flat_map(|(_, p)| p.iter().copied())
                    .collect();
                assert_eq!(joined, img.as_bytes());
                assert_eq!(last[0], (COMPLETE, img.completion_payload().unwrap()));
            }
        }
    }

    #[test]
    fn test_operator_abort_between_steps() {
        let mut session = acking_session(3);
        let mut transfer = FirmwareTransfer::new(image(600), TransferMode::ManualStep);
        transfer.advance(&mut session).unwrap();

        assert_eq!(
            transfer.abort(&mut session),
            TransferState::Aborted {
                offset: 255,
                reason: AbortReason::Operator
            }
        );
        assert!(transfer.advance(&mut session).is_err());
        assert_eq!(session.port().written.len(), 1);
        assert_eq!(session.sink().count(&Event::Done(false)), 1);
    }

    struct AbortOnProgress {
        handle: AbortHandle,
        inner: Recorder,
    }

    impl EventSink for AbortOnProgress {
        fn on_sent(&mut self, frame: &[u8]) {
            self.inner.on_sent(frame);
        }

        fn on_transfer_progress(&mut self, offset: usize, total: usize) {
            self.inner.on_transfer_progress(offset, total);
            self.handle.abort();
        }

        fn on_transfer_done(&mut self, ok: bool) {
            self.inner.on_transfer_done(ok);
        }
    }

    #[test]
    fn test_abort_before_start_sends_nothing() {
        let mut session = acking_session(2);
        let mut transfer = FirmwareTransfer::new(image(300), TransferMode::ManualStep);

        assert_eq!(transfer.abort(&mut session), TransferState::Idle);
        assert_eq!(
            transfer.advance(&mut session).unwrap(),
            TransferState::Aborted {
                offset: 0,
                reason: AbortReason::Operator,
            }
        );
        assert!(session.sink().sent().is_empty());
        assert!(session.port().written.is_empty());
        assert_eq!(session.sink().events, vec![Event::Done(false)]);
    }

    #[test]
    fn test_abort_handle_stops_automatic_run() {
        let mut port = MockPort::new();
        for _ in 0..4 {
            port.reply(&ack());
        }
        let mut transfer = FirmwareTransfer::new(image(600), TransferMode::Automatic);
        let sink = AbortOnProgress {
            handle: transfer.abort_handle(),
            inner: Recorder::default(),
        };
        let mut session = Session::new(port).with_sink(sink);

        let state = transfer.run(&mut session).unwrap();
        assert_eq!(
            state,
            TransferState::Aborted {
                offset: 255,
                reason: AbortReason::Operator
            }
        );
        assert_eq!(session.port().written.len(), 1);
        assert_eq!(session.sink().inner.count(&Event::Done(false)), 1);
    }

    #[test]
    fn test_abort_after_last_chunk_skips_completion() {
        let mut session = acking_session(2);
        let mut transfer = FirmwareTransfer::new(image(300), TransferMode::ManualStep);
        transfer.advance(&mut session).unwrap();
        transfer.advance(&mut session).unwrap();
        transfer.abort_handle().abort();

        assert_eq!(
            transfer.advance(&mut session).unwrap(),
            TransferState::Aborted {
                offset: 300,
                reason: AbortReason::Operator
            }
        );
        assert!(
            sent(&session)
                .iter()
                .all(|(cmd, _)| *cmd == WRITE)
        );
    }

    #[test]
    fn test_chunk_timeout_aborts() {
        let mut port = MockPort::new();
        port.reply(&ack()).silence();
        let mut session = Session::new(port).with_sink(Recorder::default());
        let mut transfer = FirmwareTransfer::new(image(600), TransferMode::Automatic);

        let state = transfer.run(&mut session).unwrap();
        assert_eq!(
            state,
            TransferState::Aborted {
                offset: 255,
                reason: AbortReason::NoAck
            }
        );
        assert_eq!(session.port().written.len(), 2);
        assert_eq!(session.sink().count(&Event::Timeout), 1);
        assert_eq!(session.sink().count(&Event::Done(false)), 1);
    }

    #[test]
    fn test_malformed_chunk_reply_aborts() {
        let mut bad = ack();
        bad[5] ^= 0x01;
        let mut port = MockPort::new();
        port.reply(&bad);
        let mut session = Session::new(port).with_sink(Recorder::default());
        let mut transfer = FirmwareTransfer::new(image(10), TransferMode::Automatic);

        assert_eq!(
            transfer.run(&mut session).unwrap(),
            TransferState::Aborted {
                offset: 0,
                reason: AbortReason::NoAck
            }
        );
    }

    #[test]
    fn test_completion_timeout_still_done() {
        let mut port = MockPort::new();
        port.reply(&ack()).silence();
        let mut session = Session::new(port).with_sink(Recorder::default());
        let mut transfer = FirmwareTransfer::new(image(100), TransferMode::Automatic);

        assert_eq!(
            transfer.run(&mut session).unwrap(),
            TransferState::Done {
                acknowledged: false
            }
        );
        assert_eq!(transfer.progress(), (100, 100));
        assert_eq!(session.sink().count(&Event::Done(false)), 1);
    }

    #[test]
    fn test_empty_image_rejected() {
        let mut session = acking_session(1);
        let mut transfer = FirmwareTransfer::new(FirmwareImage::from_bytes(Vec::new()), TransferMode::Automatic);
        assert!(matches!(
            transfer.run(&mut session),
            Err(Error::NoImageLoaded)
        ));
        assert!(session.port().written.is_empty());
        assert_eq!(transfer.state(), TransferState::Idle);
    }

    #[test]
    fn test_transport_failure_aborts_and_errors() {
        let mut port = MockPort::new();
        port.fail_writes = true;
        let mut session = Session::new(port).with_sink(Recorder::default());
        let mut transfer = FirmwareTransfer::new(image(10), TransferMode::Automatic);

        assert!(matches!(transfer.run(&mut session), Err(Error::Io(_))));
        assert_eq!(
            transfer.state(),
            TransferState::Aborted {
                offset: 0,
                reason: AbortReason::Transport
            }
        );
        assert_eq!(session.sink().count(&Event::Done(false)), 1);
    }

    #[test]
    fn test_chunk_size_validation() {
        assert!(TransferConfig::new(0).is_err());
        assert!(TransferConfig::new(256).is_err());
        assert_eq!(TransferConfig::new(128).unwrap().chunk_size, 128);

        let mut session = acking_session(1);
        let mut transfer = FirmwareTransfer::new(image(10), TransferMode::Automatic)
            .with_config(TransferConfig { chunk_size: 300 });
        assert!(matches!(
            transfer.run(&mut session),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_reset_after_abort() {
        let mut session = acking_session(2);
        let mut transfer = FirmwareTransfer::new(image(10), TransferMode::ManualStep);
        transfer.start().unwrap();
        assert!(transfer.reset().is_err());

        transfer.abort(&mut session);
        transfer.reset().unwrap();
        assert_eq!(transfer.state(), TransferState::Idle);
        assert!(!transfer.abort_handle().is_aborted());
        assert_eq!(
            transfer.advance(&mut session).unwrap(),
            TransferState::Sending { offset: 10 }
        );
    }
}
