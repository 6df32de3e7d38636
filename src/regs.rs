// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

/// 32-bit register access, provided by the platform.
///
/// Each access is assumed to be a single atomic bus transaction with no side effects beyond the
/// addressed register.
pub trait RegisterAccess {
    /// Reads the register at `addr`.
    fn read32(&self, addr: u32) -> u32;

    /// Writes `value` to the register at `addr`.
    fn write32(&self, addr: u32, value: u32);
}

impl<R: RegisterAccess + ?Sized> RegisterAccess for &R {
    fn read32(&self, addr: u32) -> u32 {
        (**self).read32(addr)
    }

    fn write32(&self, addr: u32, value: u32) {
        (**self).write32(addr, value)
    }
}
