// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Custom error handlers.

use super::{ErrorAction, ErrorId, ErrorManager};
use log::{debug, error, warn};

const XPPU_ERR_STATUS1: u32 = 0x004;
const XPPU_ERR_STATUS2: u32 = 0x008;
const XPPU_ISR: u32 = 0x010;

const XMPU_ERR_STATUS1_LO: u32 = 0x004;
const XMPU_ERR_STATUS1_HI: u32 = 0x008;
const XMPU_ERR_STATUS2: u32 = 0x00c;
const XMPU_ISR: u32 = 0x010;

const CPM_UNCORR_PCIE_MASK: [u32; 2] = [1 << 1, 1 << 2];
const PCIE_LOCAL_ERR_MASK: u32 = 1 << 0;
const DMA_LINK_DOWN_MASK: u32 = 1 << 0;
const PCIE_LINK_DOWN_PROC_ID: [u32; 2] = [0x1, 0x2];

/// Offset of the mask or enable register which follows each CPM status register.
const NEXT_REG: u32 = 4;

/// Logs the status of the protection unit which reported a violation.
///
/// Violations tend to repeat for as long as the offending master keeps issuing transactions, so
/// each one is only reported once: the action is then set to [`ErrorAction::None`]. The status is
/// not cleared, as software owning the unit may still want it.
pub(super) fn protection_unit(em: &ErrorManager<'_>, id: ErrorId) {
    let config = &em.config;
    match id {
        ErrorId::PMC_XPPU => {
            log_xppu(em, config.pmc_xppu, "PMC_XPPU");
            log_xppu(em, config.pmc_xppu_npi, "PMC_XPPU_NPI");
        }
        ErrorId::LPD_XPPU => log_xppu(em, config.lpd_xppu, "LPD_XPPU"),
        ErrorId::PMC_XMPU => log_xmpu(em, config.pmc_xmpu, "PMC_XMPU"),
        ErrorId::LPD_XMPU => log_xmpu(em, config.lpd_xmpu, "LPD_XMPU"),
        ErrorId::FPD_XMPU => log_xmpu(em, config.fpd_xmpu, "FPD_XMPU"),
        _ => {
            warn!("Unhandled protection unit error {}", id.0);
            return;
        }
    }
    if em.set_action(id, ErrorAction::None).is_err() {
        warn!("Could not disable error {}", id.0);
    }
}

fn log_xppu(em: &ErrorManager<'_>, base: u32, name: &str) {
    error!(
        "{name}: ERR_ST1: {:#010x}, ERR_ST2: {:#010x}, ISR: {:#010x}",
        em.regs.read32(base + XPPU_ERR_STATUS1),
        em.regs.read32(base + XPPU_ERR_STATUS2),
        em.regs.read32(base + XPPU_ISR),
    );
}

fn log_xmpu(em: &ErrorManager<'_>, base: u32, name: &str) {
    error!(
        "{name}: ERR_ST1_LO: {:#010x}, ERR_ST1_HI: {:#010x}, ERR_ST2: {:#010x}, ISR: {:#010x}",
        em.regs.read32(base + XMPU_ERR_STATUS1_LO),
        em.regs.read32(base + XMPU_ERR_STATUS1_HI),
        em.regs.read32(base + XMPU_ERR_STATUS2),
        em.regs.read32(base + XMPU_ISR),
    );
}

/// Handles PCIe link down on either CPM PCIe controller by running its link down procedure.
pub(super) fn cpm_non_correctable(em: &ErrorManager<'_>, _id: ErrorId) {
    let Some(cpm) = em.config.cpm else {
        warn!("CPM error on a device without CPM");
        return;
    };
    let status = em.regs.read32(cpm.uncorr_ir_status);
    let enabled = !em.regs.read32(cpm.uncorr_ir_status + NEXT_REG)
        & (CPM_UNCORR_PCIE_MASK[0] | CPM_UNCORR_PCIE_MASK[1]);
    if enabled == 0 {
        error!("Unhandled CPM_NCR error: {status:#x}");
        return;
    }

    for pcie in 0..CPM_UNCORR_PCIE_MASK.len() {
        if status & CPM_UNCORR_PCIE_MASK[pcie] == 0 {
            continue;
        }
        error!("Received CPM PCIE{pcie} interrupt");
        handle_link_down(
            em,
            cpm.pcie_ir_status[pcie],
            cpm.dma_csr_int_dec[pcie],
            PCIE_LINK_DOWN_PROC_ID[pcie],
        );
        em.regs.write32(cpm.uncorr_ir_status, CPM_UNCORR_PCIE_MASK[pcie]);
    }
}

fn handle_link_down(em: &ErrorManager<'_>, pcie_ir_status: u32, dma_int_dec: u32, proc_id: u32) {
    let local_err = em.regs.read32(pcie_ir_status);
    let local_enabled = !em.regs.read32(pcie_ir_status + NEXT_REG) & PCIE_LOCAL_ERR_MASK != 0;
    if !local_enabled || local_err & PCIE_LOCAL_ERR_MASK == 0 {
        debug!("Not a PCIe local event: {local_err:#x}");
        return;
    }

    let link_down = em.regs.read32(dma_int_dec);
    let link_down_enabled = em.regs.read32(dma_int_dec + NEXT_REG) & DMA_LINK_DOWN_MASK != 0;
    if !link_down_enabled || link_down & DMA_LINK_DOWN_MASK == 0 {
        debug!("Not a PCIe link down event: {link_down:#x}");
        return;
    }

    if let Err(status) = em.actions.execute_proc(proc_id) {
        error!("Error handling PCIe link down: {status:#x}");
    }
    em.regs.write32(dma_int_dec, DMA_LINK_DOWN_MASK);
    em.regs.write32(pcie_ir_status, PCIE_LOCAL_ERR_MASK);
}

/// A slave signalled secure lockdown.
pub(super) fn ssit_lockdown(em: &ErrorManager<'_>, id: ErrorId) {
    warn!("Secure lockdown notification on error {}", id.0);
    em.tamper_response();
}
