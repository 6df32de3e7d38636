// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Command headers, and the contract with the command execution subsystem.

use crate::{
    error::SsitError,
    slr::{SlrIndex, SsitLines},
    ssit::{Ssit, table::SsitLink},
};
use num_enum::TryFromPrimitive;

/// Mask of the API id within a command header.
pub const API_ID_MASK: u32 = 0x3f;
/// Mask of the target SLR id within a command header.
pub const SLR_ID_MASK: u32 = 0xc0;
const SLR_ID_SHIFT: u32 = 6;
/// Mask of the module id within a command header.
pub const MODULE_ID_MASK: u32 = 0xff00;
const MODULE_ID_SHIFT: u32 = 8;
/// Mask of the payload length within a command header.
pub const LEN_MASK: u32 = 0xff_0000;
const LEN_SHIFT: u32 = 16;

/// The longest payload which is described by the length field of the header alone. Longer
/// commands carry their length in the word after the header.
pub const MAX_SHORT_CMD_LEN: u32 = 7;

/// The module id of the generic module, which owns the SSIT sync commands.
pub const GENERIC_MODULE_ID: u32 = 1;

/// Subsystem id given to commands forwarded from the master SLR.
pub const FORWARDED_SUBSYSTEM_ID: u32 = 0;

/// Builds a command header.
pub const fn header(module_id: u32, api_id: u32, len: u32) -> u32 {
    ((len << LEN_SHIFT) & LEN_MASK)
        | ((module_id << MODULE_ID_SHIFT) & MODULE_ID_MASK)
        | (api_id & API_ID_MASK)
}

/// Returns the SLR a command header is addressed to.
pub fn target_slr(header: u32) -> Result<SlrIndex, SsitError> {
    SlrIndex::from_raw((header & SLR_ID_MASK) >> SLR_ID_SHIFT)
}

/// A decoded command, borrowing its payload from the buffer it arrived in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Command<'a> {
    /// The raw header word.
    pub header: u32,
    /// The payload words following the header (and the length word, for long commands).
    pub payload: &'a [u32],
    /// The subsystem which issued the command, or [`FORWARDED_SUBSYSTEM_ID`].
    pub subsystem_id: u32,
}

impl<'a> Command<'a> {
    /// Decodes a command forwarded from the master SLR.
    ///
    /// The payload length comes from the header, or from the second word if the header length is
    /// longer than [`MAX_SHORT_CMD_LEN`].
    pub fn from_forwarded(buffer: &'a [u32]) -> Result<Self, SsitError> {
        let (&header, rest) = buffer.split_first().ok_or(SsitError::InvalidCommand)?;
        let len = (header & LEN_MASK) >> LEN_SHIFT;
        let (len, rest) = if len > MAX_SHORT_CMD_LEN {
            let (&len, rest) = rest.split_first().ok_or(SsitError::InvalidCommand)?;
            (len, rest)
        } else {
            (len, rest)
        };
        let payload = rest
            .get(..len as usize)
            .ok_or(SsitError::InvalidCommand)?;
        Ok(Self {
            header,
            payload,
            subsystem_id: FORWARDED_SUBSYSTEM_ID,
        })
    }

    /// Returns the API id.
    pub fn api_id(&self) -> u32 {
        self.header & API_ID_MASK
    }

    /// Returns the module id.
    pub fn module_id(&self) -> u32 {
        (self.header & MODULE_ID_MASK) >> MODULE_ID_SHIFT
    }

    /// Returns whether the command was forwarded from the master rather than issued locally.
    pub fn is_forwarded(&self) -> bool {
        self.subsystem_id == FORWARDED_SUBSYSTEM_ID
    }
}

/// Executes commands on behalf of the SSIT layer.
pub trait CommandExecutor {
    /// Checks whether `cmd` may be executed. Returns the status to report if not.
    fn validate(&self, _cmd: &Command) -> Result<(), u32> {
        Ok(())
    }

    /// Executes `cmd`, filling in any response words after the status.
    ///
    /// Returns the status word on failure.
    fn execute(&self, cmd: &Command, response: &mut [u32]) -> Result<(), u32>;
}

/// The SSIT commands of the generic module.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum SsitCommand {
    /// Slave: sync with the master. No payload.
    SyncMaster = 0x0a,
    /// Master: sync with the slaves. Payload is the slave line mask and a timeout in µs.
    SyncSlaves = 0x0b,
    /// Master: wait for the slaves to reach a sync point. Same payload as `SyncSlaves`.
    WaitSlaves = 0x0c,
}

impl<L: SsitLink> Ssit<'_, L> {
    /// Executes one of the generic-module SSIT commands.
    ///
    /// These commands sync the die which runs them, so they are rejected when forwarded from the
    /// master: the slave would block inside the `MESSAGE` handler while the master waits for the
    /// response.
    pub fn execute_ssit_command(&self, cmd: &Command) -> Result<(), SsitError> {
        if cmd.module_id() != GENERIC_MODULE_ID {
            return Err(SsitError::InvalidCommand);
        }
        if cmd.is_forwarded() {
            return Err(SsitError::NoAccess);
        }
        let command =
            SsitCommand::try_from(cmd.api_id()).map_err(|_| SsitError::InvalidCommand)?;
        match command {
            SsitCommand::SyncMaster => self.sync_master(),
            SsitCommand::SyncSlaves | SsitCommand::WaitSlaves => {
                let &[lines, timeout_us, ..] = cmd.payload else {
                    return Err(SsitError::InvalidCommand);
                };
                let slaves = SsitLines::from_bits_truncate(lines).to_slave_mask();
                if command == SsitCommand::SyncSlaves {
                    self.sync_slaves(slaves, timeout_us)
                } else {
                    self.wait_slaves(slaves, timeout_us)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_command() {
        let buffer = [header(1, 0x22, 2), 7, 8, 9];
        let cmd = Command::from_forwarded(&buffer).unwrap();
        assert_eq!(cmd.payload, [7, 8]);
        assert_eq!(cmd.api_id(), 0x22);
        assert_eq!(cmd.module_id(), 1);
        assert!(cmd.is_forwarded());
    }

    #[test]
    fn long_command() {
        let buffer = [header(5, 1, 0xff), 3, 10, 11, 12, 13];
        let cmd = Command::from_forwarded(&buffer).unwrap();
        assert_eq!(cmd.payload, [10, 11, 12]);
        assert_eq!(cmd.module_id(), 5);
    }

    #[test]
    fn truncated_commands() {
        assert_eq!(Command::from_forwarded(&[]), Err(SsitError::InvalidCommand));
        assert_eq!(
            Command::from_forwarded(&[header(1, 1, 3), 1, 2]),
            Err(SsitError::InvalidCommand)
        );
        assert_eq!(
            Command::from_forwarded(&[header(1, 1, 8)]),
            Err(SsitError::InvalidCommand)
        );
    }

    #[test]
    fn command_without_payload() {
        let buffer = [0x1234, 0, 0, 0, 0, 0, 0, 0];
        let cmd = Command::from_forwarded(&buffer).unwrap();
        assert!(cmd.payload.is_empty());
        assert_eq!(cmd.module_id(), 0x12);
        assert_eq!(cmd.api_id(), 0x34);
    }

    #[test]
    fn slr_id() {
        assert_eq!(target_slr(0x0000_0034), Ok(SlrIndex::Master));
        assert_eq!(target_slr(0x0001_0140), Ok(SlrIndex::Slave0));
        assert_eq!(target_slr(0x0001_01c0), Ok(SlrIndex::Slave2));
    }
}
