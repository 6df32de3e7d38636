// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Dead-man's switch for an external watchdog.
//!
//! The external watchdog expects a GPIO pin to toggle at least once per period. The pin is only
//! toggled if something called [`Liveness::set_alive`] since the previous period ended, so a hung
//! main loop (or a poll loop which forgets to report liveness) lets the external watchdog expire.

use crate::{
    platform::{Platform, PlatformImpl, RegistersImpl},
    regs::RegisterAccess,
};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use log::{debug, warn};
use spin::Once;
use thiserror::Error;

/// The shortest supported watchdog period.
pub const MIN_PERIOD_MS: u32 = 15;

/// The longest supported watchdog period.
pub const MAX_PERIOD_MS: u32 = 1000;

static WDT: Once<Watchdog<RegistersImpl>> = Once::new();

/// Something which can be told that the firmware is still making progress.
pub trait Liveness {
    /// Records that the firmware is alive.
    fn set_alive(&self);
}

/// Errors from configuring the watchdog.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum WdtError {
    /// The requested period is outside `MIN_PERIOD_MS..=MAX_PERIOD_MS`.
    #[error("Watchdog period {0} ms is not supported")]
    InvalidPeriod(u32),
}

/// Where the watchdog GPIO lives and how often it must toggle.
#[derive(Clone, Copy, Debug)]
pub struct WdtConfig {
    /// Address of the GPIO data register.
    pub gpio_data_addr: u32,
    /// The bit of the GPIO data register connected to the external watchdog.
    pub pin_mask: u32,
    /// The period used when the watchdog is enabled at boot, or 0 to leave it disabled.
    pub boot_period_ms: u32,
}

/// Toggles the watchdog GPIO once per period, provided liveness was reported.
pub struct Watchdog<R: RegisterAccess> {
    regs: R,
    config: WdtConfig,
    alive: AtomicBool,
    enabled: AtomicBool,
    period_ms: AtomicU32,
    elapsed_ms: AtomicU32,
}

impl<R: RegisterAccess> Watchdog<R> {
    /// Creates a disabled watchdog.
    pub const fn new(regs: R, config: WdtConfig) -> Self {
        Self {
            regs,
            config,
            alive: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            period_ms: AtomicU32::new(0),
            elapsed_ms: AtomicU32::new(0),
        }
    }

    /// Starts checking liveness every `period_ms` milliseconds.
    ///
    /// Liveness must be reported during the first period too.
    pub fn enable(&self, period_ms: u32) -> Result<(), WdtError> {
        if !(MIN_PERIOD_MS..=MAX_PERIOD_MS).contains(&period_ms) {
            return Err(WdtError::InvalidPeriod(period_ms));
        }
        self.enabled.store(false, Ordering::Release);
        self.period_ms.store(period_ms, Ordering::Relaxed);
        self.elapsed_ms.store(0, Ordering::Relaxed);
        self.alive.store(false, Ordering::Relaxed);
        self.enabled.store(true, Ordering::Release);
        debug!("Watchdog enabled with period {period_ms} ms");
        Ok(())
    }

    /// Stops toggling the GPIO.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Returns whether the watchdog is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Handles a 1 ms timer tick.
    ///
    /// At the end of each period the GPIO is toggled if liveness was reported during the period,
    /// and the liveness flag is cleared. Returns whether the GPIO was toggled.
    pub fn tick(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let elapsed = self.elapsed_ms.load(Ordering::Relaxed) + 1;
        if elapsed < self.period_ms.load(Ordering::Relaxed) {
            self.elapsed_ms.store(elapsed, Ordering::Relaxed);
            return false;
        }
        self.elapsed_ms.store(0, Ordering::Relaxed);

        if self.alive.swap(false, Ordering::AcqRel) {
            let value = self.regs.read32(self.config.gpio_data_addr);
            self.regs
                .write32(self.config.gpio_data_addr, value ^ self.config.pin_mask);
            true
        } else {
            warn!("Firmware did not report liveness, not kicking the watchdog");
            false
        }
    }
}

impl<R: RegisterAccess> Liveness for Watchdog<R> {
    fn set_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }
}

/// Creates the global watchdog, enabling it if the platform asks for it at boot.
pub fn init() -> Result<&'static Watchdog<RegistersImpl>, WdtError> {
    let wdt = WDT.call_once(|| {
        Watchdog::new(PlatformImpl::create_registers(), PlatformImpl::WDT_CONFIG)
    });
    if PlatformImpl::WDT_CONFIG.boot_period_ms != 0 {
        wdt.enable(PlatformImpl::WDT_CONFIG.boot_period_ms)?;
    }
    Ok(wdt)
}
