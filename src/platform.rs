// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

macro_rules! select_platform {
    (platform = $condition:literal, $mod:ident::$plat_impl:ident) => {
        #[cfg(platform = $condition)]
        mod $mod;

        #[cfg(platform = $condition)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
    (test, $mod:ident::$plat_impl:ident) => {
        #[cfg(test)]
        pub mod $mod;

        #[cfg(test)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
}

select_platform!(platform = "versal", versal::Versal);
select_platform!(test, test::TestPlatform);

use crate::{
    cmd::CommandExecutor,
    em::{EmActions, EmConfig, ErrorNode},
    logger::LogSink,
    regs::RegisterAccess,
    slr::{SlrIndex, SsitLines},
    ssit::{SsitConfig, table::SsitLink},
    wdt::WdtConfig,
};

/// Type alias for convenience, to avoid having to use the complicated type name everywhere.
pub type LogSinkImpl = <PlatformImpl as Platform>::LogSinkImpl;

/// The platform's SSIT link type, which the global SSIT state is built on.
pub type LinkImpl = <PlatformImpl as Platform>::LinkImpl;

/// The platform's register access type, which the global watchdog is built on.
pub type RegistersImpl = <PlatformImpl as Platform>::RegistersImpl;

/// The hooks implemented by all platforms.
pub trait Platform {
    /// Timeouts for the SSIT layer.
    const SSIT_CONFIG: SsitConfig;

    /// Where the external watchdog is connected.
    const WDT_CONFIG: WdtConfig;

    /// Base addresses of the units with custom error handlers.
    const EM_CONFIG: EmConfig;

    /// Platform dependent LogSink implementation type for Logger.
    type LogSinkImpl: LogSink;

    /// How this die reaches the SSIT regions and SSIT_ERR lines.
    type LinkImpl: SsitLink + Sync;

    /// Register access for the watchdog.
    type RegistersImpl: RegisterAccess + Sync;

    /// Initialises the logger.
    ///
    /// Any logs sent before this is called will be ignored.
    fn init_logger();

    /// Returns the raw value of the PMC TAP SLR type register.
    fn slr_type_register() -> u32;

    /// Creates the SSIT link for the die `slr`.
    ///
    /// # Safety
    ///
    /// This must only be called once, as the link owns the writes to the local SSIT region and the
    /// SSIT_ERR output register.
    unsafe fn create_link(slr: SlrIndex) -> Self::LinkImpl;

    /// Creates register access for the watchdog.
    fn create_registers() -> Self::RegistersImpl;

    /// Returns the executor for commands forwarded from the master SLR.
    fn command_executor() -> &'static (dyn CommandExecutor + Sync);

    /// Returns register access for the error handlers.
    fn em_registers() -> &'static (dyn RegisterAccess + Sync);

    /// Returns the actions the error manager can take.
    fn em_actions() -> &'static (dyn EmActions + Sync);

    /// Returns and acknowledges the SSIT_ERR interrupts latched since the last call.
    fn take_ssit_interrupts() -> SsitLines;

    /// Returns and clears the error status of `node`, excluding errors signalled through
    /// [`take_ssit_interrupts`](Self::take_ssit_interrupts).
    fn take_error_status(node: ErrorNode) -> u32;

    /// Returns how many 1 ms timer ticks elapsed since the last call.
    fn take_timer_ticks() -> u32;
}
