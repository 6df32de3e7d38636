// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! PLM: the platform management firmware of one die, with inter-die (SSIT) events, error
//! management and the external watchdog.

#![cfg_attr(not(test), no_main)]
#![cfg_attr(not(test), no_std)]

mod cmd;
mod debug;
mod em;
mod error;
mod logger;
mod platform;
mod regs;
mod slr;
mod ssit;
mod wdt;

use crate::{
    em::{ErrorManager, ErrorNode},
    platform::{Platform, PlatformImpl},
    slr::SlrIndex,
    ssit::SsitHooks,
    wdt::Liveness,
};
use log::{error, info};
use spin::Once;

/// The error nodes polled by the main loop.
#[cfg_attr(test, allow(unused))]
const POLLED_NODES: [ErrorNode; 4] = [
    ErrorNode::PmcErr1,
    ErrorNode::PmcErr2,
    ErrorNode::PsmErr1,
    ErrorNode::PsmErr2,
];

/// Routes SSIT notifications to the error manager.
#[cfg_attr(test, allow(unused))]
struct PlmHooks {
    em: &'static ErrorManager<'static>,
}

impl SsitHooks for PlmHooks {
    fn tamper_response(&self) {
        self.em.tamper_response();
    }

    fn error_notification(&self, remote: SlrIndex) {
        self.em.remote_error(remote);
    }

    fn single_eam_event(&self, remote: SlrIndex) {
        self.em.single_eam_event(remote);
    }
}

#[cfg_attr(test, allow(unused))]
static HOOKS: Once<PlmHooks> = Once::new();

#[cfg_attr(test, allow(unused))]
#[unsafe(no_mangle)]
extern "C" fn plm_main() -> ! {
    PlatformImpl::init_logger();
    info!("PLM starting");

    let wdt = match wdt::init() {
        Ok(wdt) => wdt,
        Err(e) => panic!("Failed to set up watchdog: {e}"),
    };
    let em = em::init();
    let hooks = HOOKS.call_once(|| PlmHooks { em });

    let ssit = match ssit::init(hooks, wdt) {
        Ok(ssit) => ssit,
        Err(e) => {
            error!("SSIT setup failed: {e}");
            None
        }
    };
    if let Some(ssit) = ssit
        && let Err(e) = em.enable_ssit_errors(ssit)
    {
        error!("Failed to enable SSIT errors: {e}");
    }

    loop {
        if let Some(ssit) = ssit {
            ssit.handle_ssit_irq(PlatformImpl::take_ssit_interrupts());
        }
        for node in POLLED_NODES {
            let status = PlatformImpl::take_error_status(node);
            if status != 0 {
                em.handle_errors(node, status);
            }
        }
        if let Some(ssit) = ssit {
            ssit.run_pending_tasks();
        }

        wdt.set_alive();
        for _ in 0..PlatformImpl::take_timer_ticks() {
            wdt.tick();
        }
    }
}
