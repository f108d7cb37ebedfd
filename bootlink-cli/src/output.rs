//! Terminal rendering of protocol events.

use bootlink::{EventSink, InfoField, to_hex};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::use_fancy_output;

/// Prints frame traffic and info fields to stderr and drives the flash
/// progress bar.
pub struct ConsoleSink {
    frames: bool,
    fields: bool,
    progress: ProgressBar,
}

impl ConsoleSink {
    /// A sink that prints nothing.
    pub fn silent() -> Self {
        Self {
            frames: false,
            fields: false,
            progress: ProgressBar::hidden(),
        }
    }

    /// Log every frame sent and received.
    #[must_use]
    pub fn with_frames(mut self, frames: bool) -> Self {
        self.frames = frames;
        self
    }

    /// Print decoded info fields as they arrive.
    #[must_use]
    pub fn with_fields(mut self, fields: bool) -> Self {
        self.fields = fields;
        self
    }

    /// Report transfer progress on `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// The attached progress bar.
    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    /// Print a line without tearing the progress bar.
    pub fn println(&self, message: &str) {
        if self.progress.is_hidden() {
            eprintln!("{message}");
        } else {
            self.progress.println(message);
        }
    }
}

/// Percent progress bar on stderr, hidden when quiet or not a terminal.
pub fn transfer_progress_bar(quiet: bool) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// Integer percentage, 0 for an empty total.
pub fn percent(done: usize, total: usize) -> u64 {
    if total == 0 {
        return 0;
    }
    (done.min(total) * 100 / total) as u64
}

impl EventSink for ConsoleSink {
    fn on_sent(&mut self, frame: &[u8]) {
        if self.frames {
            self.println(&format!(">>> Sent: {}", style(to_hex(frame)).dim()));
        }
    }

    fn on_received(&mut self, frame: &[u8]) {
        if self.frames {
            self.println(&format!("<<< Received: {}", style(to_hex(frame)).dim()));
        }
    }

    fn on_timeout(&mut self) {
        if self.frames {
            self.println(&format!("<<< {}", style("No response (timeout)").yellow()));
        }
    }

    fn on_field_decoded(&mut self, field: InfoField, text: &str) {
        if self.fields {
            let value = if text == "N/A" {
                style(text).dim()
            } else {
                style(text).cyan()
            };
            self.println(&format!("  {}: {value}", style(field.label()).bold()));
        }
    }

    fn on_transfer_progress(&mut self, offset: usize, total: usize) {
        self.progress.set_position(percent(offset, total));
        self.progress
            .set_message(format!("{offset}/{total} bytes"));
    }

    fn on_transfer_done(&mut self, ok: bool) {
        if ok {
            self.progress.finish_with_message("complete");
        } else {
            self.progress.abandon_with_message("stopped");
        }
    }
}
