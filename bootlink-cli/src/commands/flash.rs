//! Firmware upload.

use anyhow::{Context, Result};
use bootlink::{
    AbortHandle, AbortReason, CommandKind, FirmwareImage, FirmwareTransfer, NativePort, Session,
    TransferMode, TransferState,
};
use console::style;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::warn;
use std::path::Path;
use std::time::Duration;

use crate::commands::device::expect_ack;
use crate::config::Config;
use crate::output::{ConsoleSink, transfer_progress_bar};
use crate::serial::ensure_interactive_terminal;
use crate::{Cli, CliError, device_err, open_session};

/// What the operator asked for in step mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKey {
    Next,
    Abort,
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    step: bool,
    connect: bool,
) -> Result<()> {
    let mode = if step {
        if cli.non_interactive {
            return Err(CliError::Usage("--step cannot be used with --non-interactive".into()).into());
        }
        ensure_interactive_terminal()?;
        TransferMode::ManualStep
    } else {
        TransferMode::Automatic
    };

    if !cli.quiet {
        eprintln!(
            "{} Loading firmware: {}",
            style("📦").cyan(),
            firmware.display()
        );
    }
    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;

    let mut transfer = FirmwareTransfer::new(image, mode).with_config(config.transfer_config()?);
    transfer.start().map_err(device_err)?;

    if !cli.quiet {
        let image = transfer.image();
        eprintln!(
            "{} {} bytes in {} chunks, checksum 0x{:08X}",
            style("ℹ").blue(),
            image.len(),
            image.chunk_count(transfer.config().chunk_size),
            image.checksum()
        );
    }

    let sink = ConsoleSink::silent()
        .with_frames(cli.verbose >= 1)
        .with_progress(transfer_progress_bar(cli.quiet));
    let mut session = open_session(cli, config, sink)?;

    if connect {
        if !cli.quiet {
            eprintln!("{} Connecting to device...", style("⏳").yellow());
        }
        let exchange = session.connect().map_err(device_err)?;
        expect_ack(CommandKind::Connect, &exchange)?;
        if !cli.quiet {
            eprintln!("{} Connected", style("✓").green());
        }
    }

    let handle = transfer.abort_handle();
    if let Err(e) = ctrlc::set_handler(move || handle.abort()) {
        warn!("Could not install Ctrl-C handler: {e}");
    }

    let state = match mode {
        TransferMode::Automatic => transfer.run(&mut session).map_err(device_err)?,
        TransferMode::ManualStep => step_transfer(&mut transfer, &mut session)?,
    };
    session.close().map_err(device_err)?;

    outcome(state)?;
    if !cli.quiet {
        eprintln!(
            "\n{} Firmware written ({} bytes)",
            style("🎉").green().bold(),
            transfer.image().len()
        );
    }
    Ok(())
}

/// Map the final transfer state to the command result.
fn outcome(state: TransferState) -> Result<()> {
    match state {
        TransferState::Done { acknowledged: true } => Ok(()),
        TransferState::Done {
            acknowledged: false,
        } => Err(CliError::Device("Device did not acknowledge write completion".into()).into()),
        TransferState::Aborted {
            offset,
            reason: AbortReason::Operator,
        } => Err(CliError::Cancelled(format!("Transfer aborted after {offset} bytes")).into()),
        TransferState::Aborted {
            offset,
            reason: AbortReason::NoAck,
        } => Err(CliError::Device(format!("No acknowledgement for chunk at byte {offset}")).into()),
        TransferState::Aborted {
            offset,
            reason: AbortReason::Transport,
        } => Err(CliError::Device(format!("Port failed at byte {offset}")).into()),
        other => Err(anyhow::anyhow!("Transfer stopped in state {other:?}")),
    }
}

/// Drive a step-mode transfer from the keyboard.
fn step_transfer(
    transfer: &mut FirmwareTransfer,
    session: &mut Session<NativePort, ConsoleSink>,
) -> Result<TransferState> {
    let chunk_size = transfer.config().chunk_size;
    let chunks = transfer.image().chunk_count(chunk_size);
    let abort = transfer.abort_handle();

    loop {
        let (done, total) = transfer.progress();
        let prompt = if done == total {
            "Enter: finish transfer, q: abort".to_string()
        } else {
            format!("Enter: send chunk {}/{chunks}, q: abort", done / chunk_size + 1)
        };
        session
            .sink()
            .println(&format!("{} {}", style("▶").cyan(), style(prompt).dim()));

        match wait_for_step(&abort)? {
            StepKey::Next => {
                let state = transfer.advance(session).map_err(device_err)?;
                if state.is_terminal() {
                    return Ok(state);
                }
            },
            StepKey::Abort => return Ok(transfer.abort(session)),
        }
    }
}

fn key_action(code: KeyCode, modifiers: KeyModifiers) -> Option<StepKey> {
    match (code, modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Char('q') | KeyCode::Esc, _) => {
            Some(StepKey::Abort)
        },
        (KeyCode::Enter | KeyCode::Char(' '), _) => Some(StepKey::Next),
        _ => None,
    }
}

/// Block until the operator presses a step key or the transfer is aborted.
fn wait_for_step(abort: &AbortHandle) -> Result<StepKey> {
    // Raw mode swallows SIGINT, so Ctrl-C arrives here as a key.
    terminal::enable_raw_mode().context("Failed to enable raw terminal mode")?;
    let _raw_guard = RawModeGuard;

    loop {
        if abort.is_aborted() {
            return Ok(StepKey::Abort);
        }
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        if let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        {
            if let Some(action) = key_action(code, modifiers) {
                return Ok(action);
            }
        }
    }
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(result: Result<()>) -> Option<u8> {
        result
            .err()
            .and_then(|e| e.downcast_ref::<CliError>().map(CliError::exit_code))
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert!(outcome(TransferState::Done { acknowledged: true }).is_ok());
        assert_eq!(
            code(outcome(TransferState::Done {
                acknowledged: false
            })),
            Some(4)
        );
        assert_eq!(
            code(outcome(TransferState::Aborted {
                offset: 255,
                reason: AbortReason::Operator
            })),
            Some(130)
        );
        assert_eq!(
            code(outcome(TransferState::Aborted {
                offset: 0,
                reason: AbortReason::NoAck
            })),
            Some(4)
        );
        assert_eq!(code(outcome(TransferState::Idle)), None);
    }

    #[test]
    fn test_operator_abort_message_reports_offset() {
        let err = outcome(TransferState::Aborted {
            offset: 510,
            reason: AbortReason::Operator,
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Transfer aborted after 510 bytes");
    }

    #[test]
    fn test_step_keys() {
        assert_eq!(
            key_action(KeyCode::Enter, KeyModifiers::NONE),
            Some(StepKey::Next)
        );
        assert_eq!(
            key_action(KeyCode::Char(' '), KeyModifiers::NONE),
            Some(StepKey::Next)
        );
        assert_eq!(
            key_action(KeyCode::Char('q'), KeyModifiers::NONE),
            Some(StepKey::Abort)
        );
        assert_eq!(
            key_action(KeyCode::Esc, KeyModifiers::NONE),
            Some(StepKey::Abort)
        );
        assert_eq!(
            key_action(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(StepKey::Abort)
        );
        assert_eq!(key_action(KeyCode::Char('c'), KeyModifiers::NONE), None);
    }
}
