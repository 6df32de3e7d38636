// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Error manager: maps hardware and software error ids to the action taken when they are raised.
//!
//! Errors are reported per node, as a 32-bit status word in which each set bit is one error id.
//! The action table starts from fixed defaults and is patched through
//! [`ErrorManager::set_action`] while the firmware is being configured.

mod handlers;

use crate::{
    platform::{Platform, PlatformImpl},
    regs::RegisterAccess,
    slr::SlrIndex,
    ssit::{Ssit, table::SsitLink},
};
use log::{debug, error, info, warn};
use num_enum::TryFromPrimitive;
use spin::{Once, mutex::SpinMutex};
use thiserror::Error;

/// The number of error ids, including reserved ones.
pub const ERROR_ID_COUNT: usize = 137;

/// The number of error ids reported by each node.
const IDS_PER_NODE: u32 = u32::BITS;

/// The error the master raises on behalf of a slave for a single EAM event.
pub const SINGLE_EAM_ERROR: ErrorId = ErrorId::FW_CR;

static EM: Once<ErrorManager<'static>> = Once::new();

/// Errors from configuring the error manager.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum EmError {
    /// The id is out of range or reserved.
    #[error("Invalid error id {0}")]
    InvalidErrorId(u32),
    /// The raw value does not name an error node.
    #[error("Invalid error node {0:#x}")]
    InvalidNode(u32),
    /// `ErrorAction::Invalid` can't be assigned.
    #[error("Invalid error action")]
    InvalidAction,
}

/// A group of up to 32 errors sharing a status register.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum ErrorNode {
    /// First PMC error status register.
    PmcErr1 = 0x2810_0000,
    /// Second PMC error status register.
    PmcErr2 = 0x2810_4000,
    /// First PSM error status register.
    PsmErr1 = 0x2810_8000,
    /// Second PSM error status register.
    PsmErr2 = 0x2810_c000,
    /// Errors raised by software.
    SwErr = 0x2811_0000,
}

impl ErrorNode {
    /// Decodes a raw node id.
    pub fn from_raw(raw: u32) -> Result<Self, EmError> {
        Self::try_from(raw).map_err(|_| EmError::InvalidNode(raw))
    }

    /// Returns the id of the error reported on bit 0 of this node.
    pub const fn first_id(self) -> u32 {
        match self {
            Self::PmcErr1 => 0,
            Self::PmcErr2 => 32,
            Self::PsmErr1 => 64,
            Self::PsmErr2 => 96,
            Self::SwErr => 128,
        }
    }
}

/// Identifies one error.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ErrorId(pub u32);

impl ErrorId {
    /// Correctable error raised by firmware.
    pub const FW_CR: Self = Self(2);
    /// Non-correctable error raised by firmware.
    pub const FW_NCR: Self = Self(3);
    /// Correctable error reported by the PSM.
    pub const PMC_PSM_CR: Self = Self(8);
    /// Non-correctable error reported by the PSM.
    pub const PMC_PSM_NCR: Self = Self(9);
    /// SLD notification from slave 0, on the master.
    pub const SSIT3: Self = Self(29);
    /// SLD notification from slave 1, on the master.
    pub const SSIT4: Self = Self(30);
    /// SLD notification from slave 2, on the master.
    pub const SSIT5: Self = Self(31);
    /// PMC XMPU access violation.
    pub const PMC_XMPU: Self = Self(59);
    /// PMC or PMC NPI XPPU access violation.
    pub const PMC_XPPU: Self = Self(60);
    /// Events from slave 0 on the master, or from the master on slave 0.
    pub const SSIT0: Self = Self(61);
    /// Events from slave 1 on the master, or from the master on slave 1.
    pub const SSIT1: Self = Self(62);
    /// Events from slave 2 on the master, or from the master on slave 2.
    pub const SSIT2: Self = Self(63);
    /// CPM correctable error.
    pub const CPM_CR: Self = Self(80);
    /// CPM non-correctable error, including PCIe link down.
    pub const CPM_NCR: Self = Self(81);
    /// LPD XMPU access violation.
    pub const LPD_XMPU: Self = Self(114);
    /// LPD XPPU access violation.
    pub const LPD_XPPU: Self = Self(115);
    /// FPD XMPU access violation.
    pub const FPD_XMPU: Self = Self(116);
    /// Software error raised by the first healthy boot monitor.
    pub const HB_MON_0: Self = Self(128);
    /// Exception taken by the PLM itself.
    pub const PLM_EXCEPTION: Self = Self(132);

    /// Returns the id reported on `bit` of `node`, if it exists.
    pub fn new(node: ErrorNode, bit: u32) -> Option<Self> {
        let id = node.first_id() + bit;
        (bit < IDS_PER_NODE && (id as usize) < ERROR_ID_COUNT).then_some(Self(id))
    }

    /// Returns the id of the SSIT_ERR line carrying events between the master and `slave`.
    pub fn ssit_event(slave: SlrIndex) -> Option<Self> {
        slave
            .slave_number()
            .map(|number| Self(Self::SSIT0.0 + number as u32))
    }

    /// Returns the id of the line carrying secure lockdown notifications from `slave`.
    pub fn ssit_sld(slave: SlrIndex) -> Option<Self> {
        slave
            .slave_number()
            .map(|number| Self(Self::SSIT3.0 + number as u32))
    }
}

/// Handles an error with [`ErrorAction::Custom`].
pub type CustomHandler = fn(&ErrorManager<'_>, ErrorId);

/// What to do when an error is raised.
#[derive(Clone, Copy, Debug)]
pub enum ErrorAction {
    /// Ignore the error.
    None,
    /// Log the error.
    PrintToLog,
    /// Reset the system.
    Reset,
    /// Assert the error out pin.
    ErrOut,
    /// Call the handler, which decides what to do.
    Custom(CustomHandler),
    /// Shut down the given subsystem.
    SubsystemShutdown(u32),
    /// Restart the given subsystem.
    SubsystemRestart(u32),
    /// The id is reserved.
    Invalid,
}

/// The action for every error id.
pub type ErrorTable = [ErrorAction; ERROR_ID_COUNT];

/// Platform actions the error manager triggers.
pub trait EmActions {
    /// Resets the system. Doesn't return on hardware.
    fn reset(&self);

    /// Asserts the error out pin for `id`.
    fn err_out(&self, id: ErrorId);

    /// Shuts down `subsystem`.
    fn subsystem_shutdown(&self, subsystem: u32);

    /// Restarts `subsystem`.
    fn subsystem_restart(&self, subsystem: u32);

    /// Runs the stored procedure `proc_id`, returning its status on failure.
    fn execute_proc(&self, proc_id: u32) -> Result<(), u32>;

    /// Starts the secure lockdown tamper response.
    fn tamper_response(&self);

    /// Sets the hardware trigger for `id`, so it is reported through its node like any other
    /// hardware error.
    fn trigger_error(&self, id: ErrorId);
}

/// Base addresses of the units whose errors have custom handlers.
#[derive(Clone, Copy, Debug)]
pub struct EmConfig {
    /// PMC XPPU.
    pub pmc_xppu: u32,
    /// PMC NPI XPPU, which shares its error id with the PMC XPPU.
    pub pmc_xppu_npi: u32,
    /// PMC XMPU.
    pub pmc_xmpu: u32,
    /// LPD XPPU.
    pub lpd_xppu: u32,
    /// LPD XMPU.
    pub lpd_xmpu: u32,
    /// FPD XMPU.
    pub fpd_xmpu: u32,
    /// CPM registers, if the device has a CPM.
    pub cpm: Option<CpmConfig>,
}

/// CPM status registers. Each status register is followed by its mask or enable register.
#[derive(Clone, Copy, Debug)]
pub struct CpmConfig {
    /// Uncorrectable error status of the CPM SLCR.
    pub uncorr_ir_status: u32,
    /// PCIe interrupt status of each PCIe controller.
    pub pcie_ir_status: [u32; 2],
    /// DMA interrupt decode status of each PCIe controller.
    pub dma_csr_int_dec: [u32; 2],
}

const fn default_action(id: u32) -> ErrorAction {
    match id {
        2 => ErrorAction::ErrOut,
        3 | 8 => ErrorAction::Reset,
        4 | 5 | 10..=13 | 15 | 17..=19 | 22 | 23 => ErrorAction::PrintToLog,
        34..=43 | 48 | 57 | 58 => ErrorAction::PrintToLog,
        44..=46 | 52 | 53 => ErrorAction::Invalid,
        59 | 60 | 114..=116 => ErrorAction::Custom(handlers::protection_unit),
        64..=77 | 80 | 82..=92 | 96 | 97 => ErrorAction::PrintToLog,
        81 => ErrorAction::Custom(handlers::cpm_non_correctable),
        93..=95 | 98..=113 | 117..=127 => ErrorAction::Invalid,
        0..ERROR_ID_COUNT_U32 => ErrorAction::None,
        _ => ErrorAction::Invalid,
    }
}

const ERROR_ID_COUNT_U32: u32 = ERROR_ID_COUNT as u32;

/// The table the error manager starts with.
pub const DEFAULT_ERROR_TABLE: ErrorTable = {
    let mut table = [ErrorAction::Invalid; ERROR_ID_COUNT];
    let mut id = 0;
    while id < ERROR_ID_COUNT {
        table[id] = default_action(id as u32);
        id += 1;
    }
    table
};

/// Dispatches raised errors to their actions.
pub struct ErrorManager<'a> {
    regs: &'a (dyn RegisterAccess + Sync),
    actions: &'a (dyn EmActions + Sync),
    config: EmConfig,
    table: SpinMutex<ErrorTable>,
}

impl<'a> ErrorManager<'a> {
    /// Creates an error manager with the default action table.
    pub const fn new(
        regs: &'a (dyn RegisterAccess + Sync),
        actions: &'a (dyn EmActions + Sync),
        config: EmConfig,
    ) -> Self {
        Self {
            regs,
            actions,
            config,
            table: SpinMutex::new(DEFAULT_ERROR_TABLE),
        }
    }

    /// Returns a copy of the action table.
    pub fn error_table(&self) -> ErrorTable {
        *self.table.lock()
    }

    /// Returns the action for `id`, if `id` is in range.
    pub fn action(&self, id: ErrorId) -> Option<ErrorAction> {
        self.table.lock().get(id.0 as usize).copied()
    }

    /// Replaces the action for `id`.
    ///
    /// Reserved ids can't be configured, and no id can be made reserved.
    pub fn set_action(&self, id: ErrorId, action: ErrorAction) -> Result<(), EmError> {
        if matches!(action, ErrorAction::Invalid) {
            return Err(EmError::InvalidAction);
        }
        let mut table = self.table.lock();
        let entry = table
            .get_mut(id.0 as usize)
            .filter(|entry| !matches!(entry, ErrorAction::Invalid))
            .ok_or(EmError::InvalidErrorId(id.0))?;
        *entry = action;
        Ok(())
    }

    /// Performs the action of every error set in `status` for `node`.
    pub fn handle_errors(&self, node: ErrorNode, status: u32) {
        let mut pending = status;
        while pending != 0 {
            let bit = pending.trailing_zeros();
            pending &= !(1 << bit);
            match ErrorId::new(node, bit) {
                Some(id) => self.raise(id),
                None => warn!("Unknown error bit {bit} on {node:?}"),
            }
        }
    }

    /// Performs the action for a single error.
    pub fn raise(&self, id: ErrorId) {
        // The lock is released before the action runs, as custom handlers may reconfigure it.
        let Some(action) = self.action(id) else {
            warn!("Error id {} out of range", id.0);
            return;
        };
        match action {
            ErrorAction::None => debug!("Ignoring error {}", id.0),
            ErrorAction::PrintToLog => error!("Received error {}", id.0),
            ErrorAction::Reset => {
                error!("Error {} is fatal, resetting", id.0);
                self.actions.reset();
            }
            ErrorAction::ErrOut => {
                error!("Error {}, asserting error out", id.0);
                self.actions.err_out(id);
            }
            ErrorAction::Custom(handler) => handler(self, id),
            ErrorAction::SubsystemShutdown(subsystem) => {
                info!("Error {}, shutting down subsystem {subsystem:#x}", id.0);
                self.actions.subsystem_shutdown(subsystem);
            }
            ErrorAction::SubsystemRestart(subsystem) => {
                info!("Error {}, restarting subsystem {subsystem:#x}", id.0);
                self.actions.subsystem_restart(subsystem);
            }
            ErrorAction::Invalid => warn!("Reserved error {} raised", id.0),
        }
    }

    /// Raises the error for an SSIT error notification received from `remote`.
    pub fn remote_error(&self, remote: SlrIndex) {
        warn!("Error notification from {remote:?}");
        if let Some(id) = ErrorId::ssit_event(remote) {
            self.raise(id);
        }
    }

    /// Raises [`SINGLE_EAM_ERROR`] in hardware for a single EAM event from `remote`, so the
    /// device reports it through the master's error routing.
    pub fn single_eam_event(&self, remote: SlrIndex) {
        warn!("Single EAM event from {remote:?}");
        self.actions.trigger_error(SINGLE_EAM_ERROR);
    }

    /// Starts the tamper response.
    pub fn tamper_response(&self) {
        self.actions.tamper_response();
    }

    /// Enables SSIT interrupts on this die.
    ///
    /// On the master, secure lockdown notifications from the slaves start the tamper response.
    /// Does nothing if interrupts are already enabled.
    pub fn enable_ssit_errors<L: SsitLink>(&self, ssit: &Ssit<'_, L>) -> Result<(), EmError> {
        if ssit.interrupts_enabled() {
            return Ok(());
        }
        if ssit.slr().is_master() {
            for id in [ErrorId::SSIT3, ErrorId::SSIT4, ErrorId::SSIT5] {
                self.set_action(id, ErrorAction::Custom(handlers::ssit_lockdown))?;
            }
        }
        ssit.enable_interrupts();
        info!("Enabled SSIT interrupts");
        Ok(())
    }
}

/// Creates the global error manager.
pub fn init() -> &'static ErrorManager<'static> {
    EM.call_once(|| {
        ErrorManager::new(
            PlatformImpl::em_registers(),
            PlatformImpl::em_actions(),
            PlatformImpl::EM_CONFIG,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::{
        FakeRegisters, RecordedAction, SimDie, SimFabric, TEST_EM_CONFIG, TestActions,
    };
    use crate::slr::SlrType;

    fn manager<'a>(regs: &'a FakeRegisters, actions: &'a TestActions) -> ErrorManager<'a> {
        ErrorManager::new(regs, actions, TEST_EM_CONFIG)
    }

    #[test]
    fn node_ids() {
        assert_eq!(ErrorNode::from_raw(0x2810_8000), Ok(ErrorNode::PsmErr1));
        assert_eq!(
            ErrorNode::from_raw(0x2810_0001),
            Err(EmError::InvalidNode(0x2810_0001))
        );
        assert_eq!(ErrorId::new(ErrorNode::PmcErr2, 29), Some(ErrorId::SSIT0));
        assert_eq!(ErrorId::new(ErrorNode::SwErr, 8), Some(ErrorId(136)));
        assert_eq!(ErrorId::new(ErrorNode::SwErr, 9), None);
        assert_eq!(ErrorId::ssit_sld(SlrIndex::Slave2), Some(ErrorId::SSIT5));
        assert_eq!(ErrorId::ssit_event(SlrIndex::Master), None);
    }

    #[test]
    fn default_table() {
        let table = DEFAULT_ERROR_TABLE;
        assert!(matches!(table[ErrorId::FW_CR.0 as usize], ErrorAction::ErrOut));
        assert!(matches!(table[ErrorId::FW_NCR.0 as usize], ErrorAction::Reset));
        assert!(matches!(table[ErrorId::PMC_XPPU.0 as usize], ErrorAction::Custom(_)));
        assert!(matches!(table[ErrorId::CPM_NCR.0 as usize], ErrorAction::Custom(_)));
        assert!(matches!(table[ErrorId::CPM_CR.0 as usize], ErrorAction::PrintToLog));
        assert!(matches!(table[44], ErrorAction::Invalid));
        assert!(matches!(table[120], ErrorAction::Invalid));
        assert!(matches!(table[ErrorId::SSIT3.0 as usize], ErrorAction::None));
        assert!(matches!(table[ErrorId::PLM_EXCEPTION.0 as usize], ErrorAction::None));
    }

    #[test]
    fn set_action() {
        let regs = FakeRegisters::new();
        let actions = TestActions::new();
        let em = manager(&regs, &actions);

        assert_eq!(
            em.set_action(ErrorId(44), ErrorAction::PrintToLog),
            Err(EmError::InvalidErrorId(44))
        );
        assert_eq!(
            em.set_action(ErrorId(ERROR_ID_COUNT as u32), ErrorAction::None),
            Err(EmError::InvalidErrorId(ERROR_ID_COUNT as u32))
        );
        assert_eq!(
            em.set_action(ErrorId::HB_MON_0, ErrorAction::Invalid),
            Err(EmError::InvalidAction)
        );
        em.set_action(ErrorId::HB_MON_0, ErrorAction::SubsystemRestart(0x1c00_0003))
            .unwrap();
        assert!(matches!(
            em.error_table()[ErrorId::HB_MON_0.0 as usize],
            ErrorAction::SubsystemRestart(0x1c00_0003)
        ));
    }

    #[test]
    fn dispatch_each_set_bit() {
        let regs = FakeRegisters::new();
        let actions = TestActions::new();
        let em = manager(&regs, &actions);
        em.set_action(ErrorId(129), ErrorAction::SubsystemShutdown(7))
            .unwrap();

        // FW_CR, FW_NCR and a logged id, then a reserved id.
        em.handle_errors(ErrorNode::PmcErr1, (1 << 2) | (1 << 3) | (1 << 4));
        em.handle_errors(ErrorNode::PmcErr2, 1 << 12);
        em.handle_errors(ErrorNode::SwErr, (1 << 1) | (1 << 31));

        assert_eq!(
            actions.recorded(),
            [
                RecordedAction::ErrOut(ErrorId::FW_CR),
                RecordedAction::Reset,
                RecordedAction::SubsystemShutdown(7),
            ]
        );
    }

    #[test]
    fn ssit_errors_on_master() {
        let fabric = SimFabric::new();
        let master = SimDie::new_disabled(fabric, SlrType::Master);
        let regs = FakeRegisters::new();
        let actions = TestActions::new();
        let em = manager(&regs, &actions);

        em.enable_ssit_errors(&master.ssit).unwrap();
        assert!(master.ssit.interrupts_enabled());
        em.handle_errors(ErrorNode::PmcErr1, 1 << 30);
        assert_eq!(actions.recorded(), [RecordedAction::TamperResponse]);

        // Already enabled, so the table is left alone.
        em.set_action(ErrorId::SSIT4, ErrorAction::None).unwrap();
        em.enable_ssit_errors(&master.ssit).unwrap();
        assert!(matches!(em.action(ErrorId::SSIT4), Some(ErrorAction::None)));
    }

    #[test]
    fn ssit_errors_on_slave() {
        let fabric = SimFabric::new();
        let slave = SimDie::new_disabled(fabric, SlrType::Slave0Top);
        let regs = FakeRegisters::new();
        let actions = TestActions::new();
        let em = manager(&regs, &actions);

        em.enable_ssit_errors(&slave.ssit).unwrap();
        assert!(slave.ssit.interrupts_enabled());
        assert!(matches!(em.action(ErrorId::SSIT3), Some(ErrorAction::None)));
    }

    #[test]
    fn remote_error_uses_event_line_action() {
        let regs = FakeRegisters::new();
        let actions = TestActions::new();
        let em = manager(&regs, &actions);
        em.set_action(ErrorId::SSIT1, ErrorAction::ErrOut).unwrap();

        em.remote_error(SlrIndex::Slave1);
        em.remote_error(SlrIndex::Master);
        assert_eq!(actions.recorded(), [RecordedAction::ErrOut(ErrorId::SSIT1)]);
    }

    #[test]
    fn single_eam_event_triggers_error() {
        let regs = FakeRegisters::new();
        let actions = TestActions::new();
        let em = manager(&regs, &actions);

        em.single_eam_event(SlrIndex::Slave2);
        assert_eq!(
            actions.recorded(),
            [RecordedAction::TriggerError(SINGLE_EAM_ERROR)]
        );
    }
}
