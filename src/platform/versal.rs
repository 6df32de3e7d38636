// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use super::Platform;
use crate::{
    cmd::{Command, CommandExecutor, GENERIC_MODULE_ID},
    em::{CpmConfig, EmActions, EmConfig, ErrorId, ErrorNode},
    error::SsitError,
    logger::{self, HybridLogger, LockedWriter, inmemory::MemoryLogger},
    regs::RegisterAccess,
    slr::{SLR_TYPE_MASK, SlrIndex, SsitLines, slr_addr},
    ssit::{
        self, SsitConfig,
        table::{SsitLink, SsitRegion},
    },
    wdt::WdtConfig,
};
use arm_pl011_uart::{PL011Registers, Uart, UniqueMmioPointer};
use core::{
    hint::spin_loop,
    ptr::{NonNull, read_volatile, write_volatile},
};
use log::{error, warn};

const PMC_GLOBAL_BASE: u32 = 0xf111_0000;
const PMC_GLOBAL_SSIT_ERR: u32 = PMC_GLOBAL_BASE + 0x958;
const PMC_ERR1_STATUS: u32 = PMC_GLOBAL_BASE + 0x2_0000;
const PMC_ERR2_STATUS: u32 = PMC_GLOBAL_BASE + 0x2_0004;
const PMC_ERR1_TRIG: u32 = PMC_GLOBAL_BASE + 0x2_0010;
const PMC_ERR2_TRIG: u32 = PMC_GLOBAL_BASE + 0x2_0014;
const PMC_ERR_OUT1_EN: u32 = PMC_GLOBAL_BASE + 0x2_0024;
const PMC_SRST1_EN: u32 = PMC_GLOBAL_BASE + 0x2_0084;
const PSM_ERR1_STATUS: u32 = 0xffc9_1000;
const PSM_ERR2_STATUS: u32 = 0xffc9_1004;

/// SSIT_ERR bits of the PMC error status registers.
const SSIT_ERR_SHIFT: u32 = 29;
const SSIT_ERR_MASK: u32 = 0x7 << SSIT_ERR_SHIFT;

const PMC_TAP_SLR_TYPE: u32 = 0xf11a_0024;

const MB_IO_IRQ_ISR: u32 = 0xf028_0030;
const MB_IO_IRQ_ACK: u32 = 0xf028_003c;
const MB_IO_SSIT_SHIFT: u32 = 24;
const MB_IO_SSIT_MASK: u32 = 0x7 << MB_IO_SSIT_SHIFT;
/// The 1 ms tick from the IOModule PIT.
const MB_IO_PIT1_MASK: u32 = 1 << 3;

/// Local address of the SSIT region of every die.
const SSIT_REGION_BASE: u32 = 0xf201_5800;

/// Busy loop iterations per microsecond at the PMC clock.
const LOOPS_PER_US: u32 = 100;

/// Base address of UART0.
const UART0_BASE: usize = 0xff00_0000;
const PL011_BASE_ADDRESS: *mut PL011Registers = UART0_BASE as _;

/// The in-memory log buffer size in bytes.
const LOG_BUFFER_SIZE: usize = 4096;

/// The in-memory log, kept so it can be retrieved after the UART is handed over.
static MEMORY_LOGGER: LockedWriter<MemoryLogger<LOG_BUFFER_SIZE>> =
    LockedWriter::new(MemoryLogger::new());

static REGISTERS: MmioRegisters = MmioRegisters;
static EXECUTOR: VersalExecutor = VersalExecutor;
static ACTIONS: VersalActions = VersalActions;

/// The Versal PMC, on monolithic and SSIT devices.
pub struct Versal;

impl Platform for Versal {
    const SSIT_CONFIG: SsitConfig = SsitConfig::DEFAULT;

    const WDT_CONFIG: WdtConfig = WdtConfig {
        // PMC GPIO bank 1 data register.
        gpio_data_addr: 0xf102_0044,
        pin_mask: 1 << 0,
        boot_period_ms: 0,
    };

    const EM_CONFIG: EmConfig = EmConfig {
        pmc_xppu: 0xf131_0000,
        pmc_xppu_npi: 0xf130_0000,
        pmc_xmpu: 0xf12f_0000,
        lpd_xppu: 0xff99_0000,
        lpd_xmpu: 0xff98_0000,
        fpd_xmpu: 0xfd39_0000,
        cpm: Some(CpmConfig {
            uncorr_ir_status: 0xfcdd_0320,
            pcie_ir_status: [0xfcdd_02a0, 0xfcdd_02b4],
            dma_csr_int_dec: [0xfce2_0e10, 0xfcea_0e10],
        }),
    };

    type LogSinkImpl = HybridLogger<
        &'static LockedWriter<MemoryLogger<LOG_BUFFER_SIZE>>,
        LockedWriter<Uart<'static>>,
    >;
    type LinkImpl = MmioLink;
    type RegistersImpl = MmioRegisters;

    fn init_logger() {
        // SAFETY: `PL011_BASE_ADDRESS` is the base address of a PL011 device, and nothing else
        // accesses that address range.
        let uart_pointer =
            unsafe { UniqueMmioPointer::new(NonNull::new(PL011_BASE_ADDRESS).unwrap()) };
        logger::init(HybridLogger::new(
            &MEMORY_LOGGER,
            LockedWriter::new(Uart::new(uart_pointer)),
        ))
        .expect("Failed to initialise logger");
    }

    fn slr_type_register() -> u32 {
        REGISTERS.read32(PMC_TAP_SLR_TYPE) & SLR_TYPE_MASK
    }

    unsafe fn create_link(slr: SlrIndex) -> MmioLink {
        MmioLink { slr }
    }

    fn create_registers() -> MmioRegisters {
        MmioRegisters
    }

    fn command_executor() -> &'static (dyn CommandExecutor + Sync) {
        &EXECUTOR
    }

    fn em_registers() -> &'static (dyn RegisterAccess + Sync) {
        &REGISTERS
    }

    fn em_actions() -> &'static (dyn EmActions + Sync) {
        &ACTIONS
    }

    fn take_ssit_interrupts() -> SsitLines {
        let Some(ssit) = ssit::get() else {
            return SsitLines::empty();
        };
        if ssit.slr().is_master() {
            let status = REGISTERS.read32(PMC_ERR2_STATUS) & SSIT_ERR_MASK;
            REGISTERS.write32(PMC_ERR2_STATUS, status);
            SsitLines::from_bits_truncate(status >> SSIT_ERR_SHIFT)
        } else {
            let status = REGISTERS.read32(MB_IO_IRQ_ISR) & MB_IO_SSIT_MASK;
            REGISTERS.write32(MB_IO_IRQ_ACK, status);
            SsitLines::from_bits_truncate(status >> MB_IO_SSIT_SHIFT)
        }
    }

    fn take_error_status(node: ErrorNode) -> u32 {
        let (addr, exclude) = match node {
            ErrorNode::PmcErr1 => (PMC_ERR1_STATUS, 0),
            ErrorNode::PmcErr2 => (PMC_ERR2_STATUS, SSIT_ERR_MASK),
            ErrorNode::PsmErr1 => (PSM_ERR1_STATUS, 0),
            ErrorNode::PsmErr2 => (PSM_ERR2_STATUS, 0),
            ErrorNode::SwErr => return 0,
        };
        let status = REGISTERS.read32(addr) & !exclude;
        REGISTERS.write32(addr, status);
        status
    }

    fn take_timer_ticks() -> u32 {
        if REGISTERS.read32(MB_IO_IRQ_ISR) & MB_IO_PIT1_MASK == 0 {
            return 0;
        }
        REGISTERS.write32(MB_IO_IRQ_ACK, MB_IO_PIT1_MASK);
        1
    }
}

/// Volatile access to the PMC's 32-bit address space.
pub struct MmioRegisters;

impl RegisterAccess for MmioRegisters {
    fn read32(&self, addr: u32) -> u32 {
        // SAFETY: The PMC address map is flat and identity mapped, and every caller passes the
        // address of a 32-bit register.
        unsafe { read_volatile(addr as usize as *const u32) }
    }

    fn write32(&self, addr: u32, value: u32) {
        // SAFETY: As for `read32`.
        unsafe { write_volatile(addr as usize as *mut u32, value) }
    }
}

/// The SSIT link through the PMC address map.
///
/// The local region is at [`SSIT_REGION_BASE`], and every other die's region is reached through
/// the SLR address window.
pub struct MmioLink {
    slr: SlrIndex,
}

impl MmioLink {
    fn word_addr(&self, slr: SlrIndex, offset: usize) -> Option<usize> {
        let local = SSIT_REGION_BASE + u32::try_from(offset * size_of::<u32>()).ok()?;
        if slr == self.slr {
            return Some(local as usize);
        }
        usize::try_from(slr_addr(local, slr)?).ok()
    }
}

impl SsitLink for MmioLink {
    fn local_slr(&self) -> SlrIndex {
        self.slr
    }

    fn read(&self, slr: SlrIndex, offset: usize, words: &mut [u32]) -> Result<(), SsitError> {
        assert!(offset + words.len() <= SsitRegion::WORDS);
        let base = self
            .word_addr(slr, offset)
            .ok_or(SsitError::RegionNotAddressable)?;
        for (i, word) in words.iter_mut().enumerate() {
            // SAFETY: `base` is the address of word `offset` of an SSIT region, which is device
            // memory always mapped on SSIT devices, and the region is large enough.
            *word = unsafe { read_volatile((base as *const u32).add(i)) };
        }
        Ok(())
    }

    fn write_local(&self, offset: usize, words: &[u32]) {
        assert!(offset + words.len() <= SsitRegion::WORDS);
        let base = (SSIT_REGION_BASE as usize + offset * size_of::<u32>()) as *mut u32;
        for (i, &word) in words.iter().enumerate() {
            // SAFETY: `base` is within the local SSIT region, which only this link writes.
            unsafe { write_volatile(base.add(i), word) };
        }
    }

    fn pulse_lines(&self, lines: SsitLines) {
        REGISTERS.write32(PMC_GLOBAL_SSIT_ERR, lines.bits());
        REGISTERS.write32(PMC_GLOBAL_SSIT_ERR, 0);
    }

    fn drive_lines(&self, lines: SsitLines) {
        REGISTERS.write32(PMC_GLOBAL_SSIT_ERR, lines.bits());
    }

    fn asserted_lines(&self) -> SsitLines {
        // Latched status is cleared first, so only a line still held sets it again.
        if self.slr.is_master() {
            REGISTERS.write32(PMC_ERR1_STATUS, SSIT_ERR_MASK);
            let status = REGISTERS.read32(PMC_ERR1_STATUS) & SSIT_ERR_MASK;
            SsitLines::from_bits_truncate(status >> SSIT_ERR_SHIFT)
        } else {
            REGISTERS.write32(MB_IO_IRQ_ACK, MB_IO_SSIT_MASK);
            let status = REGISTERS.read32(MB_IO_IRQ_ISR) & MB_IO_SSIT_MASK;
            SsitLines::from_bits_truncate(status >> MB_IO_SSIT_SHIFT)
        }
    }

    fn delay_us(&self, us: u32) {
        for _ in 0..us.saturating_mul(LOOPS_PER_US) {
            spin_loop();
        }
    }
}

/// Runs commands forwarded from the master SLR.
///
/// The generic module is the only one in this firmware, and its SSIT commands refuse to run when
/// forwarded, so every forwarded command gets an error status back.
struct VersalExecutor;

impl CommandExecutor for VersalExecutor {
    fn execute(&self, cmd: &Command, _response: &mut [u32]) -> Result<(), u32> {
        if cmd.module_id() != GENERIC_MODULE_ID {
            warn!("No handler for module {:#x}", cmd.module_id());
            return Err(SsitError::InvalidCommand.code());
        }
        let ssit = ssit::get().ok_or(SsitError::NotSsitDevice.code())?;
        ssit.execute_ssit_command(cmd).map_err(SsitError::code)
    }
}

/// Error actions through the PMC error aggregation registers.
struct VersalActions;

/// FW_NCR bit of the PMC error trigger and enable registers.
const FW_NCR_MASK: u32 = 1 << ErrorId::FW_NCR.0;

impl EmActions for VersalActions {
    fn reset(&self) {
        // A firmware non-correctable error with system reset enabled resets the device.
        REGISTERS.write32(PMC_SRST1_EN, FW_NCR_MASK);
        REGISTERS.write32(PMC_ERR1_TRIG, FW_NCR_MASK);
        loop {
            spin_loop();
        }
    }

    fn err_out(&self, id: ErrorId) {
        // Error out is only enabled from firmware for the first PMC node.
        if id.0 >= u32::BITS {
            warn!("Error out for error {} is routed by hardware", id.0);
            return;
        }
        REGISTERS.write32(PMC_ERR_OUT1_EN, 1 << id.0);
        self.trigger_error(id);
    }

    fn subsystem_shutdown(&self, subsystem: u32) {
        warn!("No power management, leaving subsystem {subsystem:#x} running");
    }

    fn subsystem_restart(&self, subsystem: u32) {
        warn!("No power management, cannot restart subsystem {subsystem:#x}");
    }

    fn execute_proc(&self, proc_id: u32) -> Result<(), u32> {
        warn!("Procedure {proc_id:#x} not stored");
        Err(SsitError::InvalidCommand.code())
    }

    fn tamper_response(&self) {
        error!("Secure lockdown");
        if let Some(ssit) = ssit::get() {
            ssit.notify_sld_slave_slrs();
            if let Err(e) = ssit.inter_slr_sld_handshake() {
                error!("Secure lockdown handshake failed: {e}");
            }
        }
        self.reset();
    }

    fn trigger_error(&self, id: ErrorId) {
        let trigger = match id.0 / u32::BITS {
            0 => PMC_ERR1_TRIG,
            1 => PMC_ERR2_TRIG,
            _ => {
                warn!("Error {} has no PMC trigger", id.0);
                return;
            }
        };
        REGISTERS.write32(trigger, 1 << (id.0 % u32::BITS));
    }
}
