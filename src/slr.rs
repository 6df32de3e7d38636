// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Die (SLR) identities, masks and cross-die address translation.

use crate::error::SsitError;
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The maximum number of slave SLRs attached to the master SLR.
pub const MAX_SLAVE_SLRS: usize = 3;

/// The number of SLRs in the largest SSIT device, including the master.
pub const MAX_SLRS: usize = MAX_SLAVE_SLRS + 1;

/// Mask of the type field in the PMC TAP SLR type register.
pub const SLR_TYPE_MASK: u32 = 0x7;

/// Base address of the PMC address space as seen locally on every die.
pub const PMC_BASE_ADDR: u32 = 0xf000_0000;

/// Base address at which the master SLR's PMC space is visible to all dies.
pub const MASTER_SLR_BASE_ADDR: u64 = 0x1_0000_0000;

/// Distance between the global windows of consecutive SLRs.
pub const SLR_ADDR_DIFF: u64 = 0x0800_0000;

/// The value of the PMC TAP SLR type register.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum SlrType {
    /// Third slave, always at the top of the stack.
    Slave2Top = 0x0,
    /// Second slave with another slave above it.
    Slave1NonTop = 0x2,
    /// First slave with another slave above it.
    Slave0NonTop = 0x3,
    /// Second slave at the top of the stack.
    Slave1Top = 0x4,
    /// First slave at the top of the stack.
    Slave0Top = 0x5,
    /// The master SLR of an SSIT device.
    Master = 0x6,
    /// A single-die device.
    Monolithic = 0x7,
}

impl SlrType {
    /// Decodes the raw PMC TAP SLR type register value.
    pub fn from_register(value: u32) -> Result<Self, SsitError> {
        Self::try_from(value & SLR_TYPE_MASK).map_err(|_| SsitError::InvalidSlrType)
    }

    /// Returns the SLR index of a die of this type, or `None` for monolithic devices.
    pub const fn index(self) -> Option<SlrIndex> {
        match self {
            Self::Master => Some(SlrIndex::Master),
            Self::Slave0Top | Self::Slave0NonTop => Some(SlrIndex::Slave0),
            Self::Slave1Top | Self::Slave1NonTop => Some(SlrIndex::Slave1),
            Self::Slave2Top => Some(SlrIndex::Slave2),
            Self::Monolithic => None,
        }
    }
}

/// The index of a die within an SSIT device.
#[derive(
    Clone, Copy, Debug, Eq, IntoPrimitive, Ord, PartialEq, PartialOrd, TryFromPrimitive,
)]
#[repr(u8)]
pub enum SlrIndex {
    /// The master SLR, which is the hub for all inter-die traffic.
    Master = 0,
    /// The first slave SLR.
    Slave0 = 1,
    /// The second slave SLR.
    Slave1 = 2,
    /// The third slave SLR.
    Slave2 = 3,
}

impl SlrIndex {
    /// All slave SLRs, in index order.
    pub const SLAVES: [Self; MAX_SLAVE_SLRS] = [Self::Slave0, Self::Slave1, Self::Slave2];

    /// Converts a raw index to an `SlrIndex`.
    pub fn from_raw(raw: u32) -> Result<Self, SsitError> {
        u8::try_from(raw)
            .ok()
            .and_then(|raw| Self::try_from(raw).ok())
            .ok_or(SsitError::InvalidSlrIndex)
    }

    /// Returns whether this is the master SLR.
    pub const fn is_master(self) -> bool {
        matches!(self, Self::Master)
    }

    /// Returns the zero-based slave number (0 for `Slave0`), or `None` for the master.
    pub const fn slave_number(self) -> Option<usize> {
        match self {
            Self::Master => None,
            Self::Slave0 => Some(0),
            Self::Slave1 => Some(1),
            Self::Slave2 => Some(2),
        }
    }

    /// Returns the single-bit mask for this SLR.
    pub const fn mask(self) -> SlrMask {
        SlrMask::from_bits_retain(1 << self as u8)
    }
}

bitflags! {
    /// A set of SLRs, one bit per `SlrIndex`.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SlrMask: u32 {
        /// The master SLR.
        const MASTER = 1 << 0;
        /// Slave SLR 0.
        const SLAVE0 = 1 << 1;
        /// Slave SLR 1.
        const SLAVE1 = 1 << 2;
        /// Slave SLR 2.
        const SLAVE2 = 1 << 3;
        /// All slave SLRs.
        const ALL_SLAVES = Self::SLAVE0.bits() | Self::SLAVE1.bits() | Self::SLAVE2.bits();
    }
}

impl SlrMask {
    /// Returns whether the mask contains the given SLR.
    pub const fn has(self, slr: SlrIndex) -> bool {
        self.bits() & slr.mask().bits() != 0
    }
}

bitflags! {
    /// SSIT_ERR lines, as driven in the SSIT_ERR output register and latched in the error status.
    ///
    /// On the master, line `n` connects to slave `n`. Slaves drive line 0 towards the master and
    /// receive on the line numbered after their own slave number.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SsitLines: u32 {
        /// Line 0.
        const LINE0 = 1 << 0;
        /// Line 1.
        const LINE1 = 1 << 1;
        /// Line 2.
        const LINE2 = 1 << 2;
    }
}

impl SsitLines {
    /// Returns the line connecting the master to the given slave, or the empty set for the master.
    pub const fn for_slave(slr: SlrIndex) -> Self {
        match slr.slave_number() {
            Some(n) => Self::from_bits_retain(1 << n),
            None => Self::empty(),
        }
    }

    /// Returns the slaves whose lines are set, in order.
    pub fn slaves(self) -> impl Iterator<Item = SlrIndex> {
        SlrIndex::SLAVES
            .into_iter()
            .filter(move |&slave| self.contains(Self::for_slave(slave)))
    }

    /// Converts a set of lines to the mask of slaves they connect to.
    pub fn to_slave_mask(self) -> SlrMask {
        self.slaves()
            .fold(SlrMask::empty(), |mask, slave| mask | slave.mask())
    }
}

/// Translates a local PMC address to the global address of the same location on `slr`.
///
/// Returns `None` if `address` is not within the PMC address space.
pub fn slr_addr(address: u32, slr: SlrIndex) -> Option<u64> {
    let offset = address.checked_sub(PMC_BASE_ADDR)?;
    Some(MASTER_SLR_BASE_ADDR + SLR_ADDR_DIFF * u64::from(u8::from(slr)) + u64::from(offset))
}
