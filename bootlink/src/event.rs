//! Protocol events for display.
//!
//! Every frame written, every frame (or partial frame) read, every timeout
//! and every decoded info field is reported through an [`EventSink`]. The
//! protocol never prints anything itself.

use {
    crate::{info::InfoField, protocol::to_hex},
    log::{debug, info, trace, warn},
};

/// Receiver of protocol events.
///
/// All methods default to doing nothing, so a sink only implements what it
/// displays.
pub trait EventSink {
    /// A complete frame was written to the port.
    fn on_sent(&mut self, _frame: &[u8]) {}

    /// Bytes were read in reply to a request, whether or not they validate.
    fn on_received(&mut self, _frame: &[u8]) {}

    /// The read deadline passed before any reply arrived.
    fn on_timeout(&mut self) {}

    /// An info query finished; `text` is what should be shown (`N/A` if none).
    fn on_field_decoded(&mut self, _field: InfoField, _text: &str) {}

    /// `offset` of `total` image bytes have been acknowledged.
    fn on_transfer_progress(&mut self, _offset: usize, _total: usize) {}

    /// The transfer ended; `ok` is false on abort or unacknowledged completion.
    fn on_transfer_done(&mut self, _ok: bool) {}
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn on_sent(&mut self, frame: &[u8]) {
        (**self).on_sent(frame);
    }

    fn on_received(&mut self, frame: &[u8]) {
        (**self).on_received(frame);
    }

    fn on_timeout(&mut self) {
        (**self).on_timeout();
    }

    fn on_field_decoded(&mut self, field: InfoField, text: &str) {
        (**self).on_field_decoded(field, text);
    }

    fn on_transfer_progress(&mut self, offset: usize, total: usize) {
        (**self).on_transfer_progress(offset, total);
    }

    fn on_transfer_done(&mut self, ok: bool) {
        (**self).on_transfer_done(ok);
    }
}

/// Sink that routes events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_sent(&mut self, frame: &[u8]) {
        trace!("TX {}", to_hex(frame));
    }

    fn on_received(&mut self, frame: &[u8]) {
        trace!("RX {}", to_hex(frame));
    }

    fn on_timeout(&mut self) {
        debug!("No response before deadline");
    }

    fn on_field_decoded(&mut self, field: InfoField, text: &str) {
        info!("{field}: {text}");
    }

    fn on_transfer_progress(&mut self, offset: usize, total: usize) {
        debug!("Transferred {offset}/{total} bytes");
    }

    fn on_transfer_done(&mut self, ok: bool) {
        if ok {
            info!("Firmware transfer complete");
        } else {
            warn!("Firmware transfer failed");
        }
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Sink that records every event, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub events: Vec<Event>,
}

/// A recorded event.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Sent(Vec<u8>),
    Received(Vec<u8>),
    Timeout,
    Field(InfoField, String),
    Progress(usize, usize),
    Done(bool),
}

#[cfg(test)]
impl Recorder {
    pub fn sent(&self) -> Vec<&[u8]> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Sent(frame) => Some(frame.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events
            .iter()
            .filter(|e| *e == wanted)
            .count()
    }
}

#[cfg(test)]
impl EventSink for Recorder {
    fn on_sent(&mut self, frame: &[u8]) {
        self.events.push(Event::Sent(frame.to_vec()));
    }

    fn on_received(&mut self, frame: &[u8]) {
        self.events.push(Event::Received(frame.to_vec()));
    }

    fn on_timeout(&mut self) {
        self.events.push(Event::Timeout);
    }

    fn on_field_decoded(&mut self, field: InfoField, text: &str) {
        self.events.push(Event::Field(field, text.to_string()));
    }

    fn on_transfer_progress(&mut self, offset: usize, total: usize) {
        self.events.push(Event::Progress(offset, total));
    }

    fn on_transfer_done(&mut self, ok: bool) {
        self.events.push(Event::Done(ok));
    }
}
