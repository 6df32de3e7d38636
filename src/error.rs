// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

/// Status word reported for a command or event which completed successfully.
pub const SUCCESS: u32 = 0;

/// Errors returned by the SSIT event, message and sync layers.
///
/// Each variant has a stable status code, which is what travels across dies in response buffers.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SsitError {
    /// SSIT interrupts have not been enabled on this die yet.
    #[error("SSIT interrupts are not enabled")]
    NotEnabled = 0x1a0,
    /// The operation is not supported between the two dies, e.g. Slave to Slave.
    #[error("Operation not supported between these SLRs")]
    UnsupportedTopology = 0x1a1,
    /// The local die is not in the event's origin mask.
    #[error("Event cannot be triggered from this SLR")]
    OriginNotAllowed = 0x1a2,
    /// The event index is beyond the event vectors.
    #[error("Invalid event")]
    InvalidEvent = 0x1a3,
    /// The event is still pending from a previous trigger.
    #[error("Event is already pending")]
    AlreadyPending = 0x1a4,
    /// The event was expected to be pending but is not.
    #[error("Event is not pending")]
    NotPending = 0x1a5,
    /// The remote die did not acknowledge the event in time.
    #[error("Event was not acknowledged")]
    NotAcknowledged = 0x1a6,
    /// More words were given than fit in a message buffer.
    #[error("Buffer size exceeds the message buffer")]
    BufferTooLarge = 0x1a7,
    /// The event index is beyond the event vector table.
    #[error("Event index out of range")]
    OutOfRange = 0x1a8,
    /// The origin mask names dies which do not exist.
    #[error("Invalid event origin mask")]
    InvalidOriginMask = 0x1a9,
    /// A raw SLR index or line number did not name a die.
    #[error("Invalid SLR index")]
    InvalidSlrIndex = 0x1aa,
    /// The SLR type register held an unknown value.
    #[error("Invalid SLR type")]
    InvalidSlrType = 0x1ab,
    /// The device is monolithic, so there are no other dies to talk to.
    #[error("Not an SSIT device")]
    NotSsitDevice = 0x1ac,
    /// Not all requested slaves reached the sync point before the timeout.
    #[error("Slave SLRs did not sync in time")]
    SlaveSyncTimeout = 0x1ad,
    /// A forwarded command was rejected by access validation.
    #[error("Forwarded command not allowed")]
    NoAccess = 0x1ae,
    /// The command header or payload was malformed or unknown.
    #[error("Invalid command")]
    InvalidCommand = 0x1af,
    /// The SSIT region of the remote die is outside the local address map.
    #[error("SSIT region of the SLR is not addressable")]
    RegionNotAddressable = 0x1b0,
    /// The event is registered but this die does not handle it.
    #[error("Event not supported on this SLR")]
    EventNotSupported = 0x1b1,
}

impl SsitError {
    /// Returns the status word for the error.
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl From<SsitError> for u32 {
    fn from(e: SsitError) -> Self {
        e.code()
    }
}
