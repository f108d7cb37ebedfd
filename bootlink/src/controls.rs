//! Which operator actions are available.
//!
//! Front ends recompute [`Controls`] from the link and transfer state after
//! every transition instead of toggling individual controls.

use crate::transfer::{FirmwareTransfer, TransferMode, TransferState};

/// Whether the port is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No port held.
    #[default]
    Closed,
    /// Port open and owned by a session.
    Open,
}

/// Enabled state of every operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
#[allow(missing_docs)]
pub struct Controls {
    pub open_port: bool,
    pub close_port: bool,
    pub connect: bool,
    pub disconnect: bool,
    pub fetch_info: bool,
    pub write_firmware: bool,
    pub read_firmware: bool,
    pub erase_firmware: bool,
    pub reboot: bool,
    /// Send the next chunk of a step-mode transfer.
    pub step: bool,
    /// Stop the running transfer.
    pub abort: bool,
}

impl Controls {
    /// Derive the available actions.
    pub fn project(link: LinkState, transfer: Option<&FirmwareTransfer>) -> Self {
        if link == LinkState::Closed {
            return Self {
                open_port: true,
                ..Self::default()
            };
        }

        let (state, mode) = transfer.map_or((TransferState::Idle, TransferMode::Automatic), |t| {
            (t.state(), t.mode())
        });

        if state.is_active() {
            let sending = matches!(state, TransferState::Sending { .. });
            return Self {
                step: sending && mode == TransferMode::ManualStep,
                abort: sending,
                ..Self::default()
            };
        }

        Self {
            open_port: false,
            close_port: true,
            connect: true,
            disconnect: true,
            fetch_info: true,
            write_firmware: true,
            read_firmware: true,
            erase_firmware: true,
            reboot: true,
            step: false,
            abort: false,
        }
    }
}
