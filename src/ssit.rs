// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Inter-die (SSIT) event and messaging subsystem.
//!
//! The master SLR is the hub: every event and message flows between the master and one slave.
//! Each die keeps an [`SsitRegion`](table::SsitRegion) which only it writes and every other die
//! reads through its [`SsitLink`].

pub mod event;
pub mod message;
pub mod sync;
pub mod table;
pub mod task;

use crate::{
    cmd::CommandExecutor,
    error::SsitError,
    platform::{LinkImpl, Platform, PlatformImpl},
    slr::{SlrIndex, SlrMask, SlrType, SsitLines},
    wdt::Liveness,
};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use event::{EventIndex, EventRegistry};
use log::{debug, info, warn};
use spin::{Once, mutex::SpinMutex};
use table::SsitLink;
use task::TaskQueue;

static SSIT: Once<Ssit<'static, LinkImpl>> = Once::new();

/// Timeouts used by the SSIT layer, in microseconds.
#[derive(Clone, Copy, Debug)]
pub struct SsitConfig {
    /// How long the master waits for a slave to acknowledge a forwarded command.
    pub slave_event_timeout_us: u32,
    /// How long the master holds the SSIT_ERR lines for slaves to release theirs, when syncing
    /// before SSIT interrupts are enabled.
    pub sync_ack_timeout_us: u32,
    /// How long the master waits for all slaves during the secure lockdown handshake.
    pub sld_ack_timeout_us: u32,
    /// Minimum time an SSIT_ERR line stays asserted for a secure lockdown notification.
    pub sld_long_pulse_us: u32,
}

impl SsitConfig {
    /// Timeouts suitable for most devices.
    pub const DEFAULT: Self = Self {
        slave_event_timeout_us: 10_000,
        sync_ack_timeout_us: 100,
        sld_ack_timeout_us: 1000,
        sld_long_pulse_us: 1,
    };
}

/// Actions the SSIT layer needs from the rest of the firmware.
pub trait SsitHooks {
    /// Starts the secure lockdown tamper response.
    fn tamper_response(&self);

    /// Raises a local error notification on behalf of `remote`.
    fn error_notification(&self, remote: SlrIndex);

    /// Raises the error which `remote` asked the master to report for the whole device.
    fn single_eam_event(&self, remote: SlrIndex);
}

/// The collaborators an [`Ssit`] borrows for its whole lifetime.
#[derive(Clone, Copy)]
pub struct SsitServices<'a> {
    /// Told about progress inside polling loops.
    pub liveness: &'a (dyn Liveness + Sync),
    /// Executes commands forwarded from the master.
    pub executor: &'a (dyn CommandExecutor + Sync),
    /// Tamper and error reporting.
    pub hooks: &'a (dyn SsitHooks + Sync),
}

/// The SSIT state of one die.
pub struct Ssit<'a, L: SsitLink> {
    slr: SlrIndex,
    link: L,
    config: SsitConfig,
    services: SsitServices<'a>,
    registry: SpinMutex<EventRegistry<L>>,
    /// Serialises read-modify-write of the local event vectors.
    table_lock: SpinMutex<()>,
    interrupts_enabled: AtomicBool,
    slaves_mask: AtomicU32,
    tasks: TaskQueue,
}

impl<'a, L: SsitLink> Ssit<'a, L> {
    /// Sets up the SSIT state for a die of type `slr_type`, registering the built-in events.
    ///
    /// SSIT interrupts start disabled, so no events can be triggered until
    /// [`enable_interrupts`](Self::enable_interrupts) is called.
    pub fn new(
        slr_type: SlrType,
        link: L,
        config: SsitConfig,
        services: SsitServices<'a>,
    ) -> Result<Self, SsitError> {
        let slr = slr_type.index().ok_or(SsitError::NotSsitDevice)?;
        if slr != link.local_slr() {
            return Err(SsitError::InvalidSlrType);
        }

        let mut registry = EventRegistry::new();
        registry.register(EventIndex::SYNC, None, SlrMask::ALL_SLAVES)?;
        registry.register(
            EventIndex::MESSAGE,
            Some(message::message_event_handler),
            SlrMask::MASTER,
        )?;
        registry.register(
            EventIndex::NOTIFY_ERROR,
            Some(notify_error_handler),
            SlrMask::ALL_SLAVES,
        )?;
        registry.register(
            EventIndex::SINGLE_EAM,
            Some(single_eam_event_handler),
            SlrMask::ALL_SLAVES,
        )?;

        Ok(Self {
            slr,
            link,
            config,
            services,
            registry: SpinMutex::new(registry),
            table_lock: SpinMutex::new(()),
            interrupts_enabled: AtomicBool::new(false),
            slaves_mask: AtomicU32::new(0),
            tasks: TaskQueue::new(),
        })
    }

    /// Returns the index of this die.
    pub fn slr(&self) -> SlrIndex {
        self.slr
    }

    /// Allows events to be triggered, once SSIT_ERR interrupts are routed to
    /// [`handle_ssit_irq`](Self::handle_ssit_irq).
    pub fn enable_interrupts(&self) {
        self.interrupts_enabled.store(true, Ordering::Release);
    }

    /// Returns whether SSIT interrupts are enabled.
    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.load(Ordering::Acquire)
    }

    /// Returns every slave that has been part of a master sync so far.
    pub fn slaves_mask(&self) -> SlrMask {
        SlrMask::from_bits_retain(self.slaves_mask.load(Ordering::Relaxed))
    }

    fn add_slaves(&self, slaves: SlrMask) {
        self.slaves_mask.fetch_or(slaves.bits(), Ordering::Relaxed);
    }

    /// Returns the indices of the local and remote event vectors for traffic with `remote`.
    fn table_indices(&self, remote: SlrIndex) -> Result<(usize, usize), SsitError> {
        match (self.slr.slave_number(), remote.slave_number()) {
            (None, Some(slave)) => Ok((slave, 0)),
            (Some(slave), None) => Ok((0, slave)),
            _ => Err(SsitError::UnsupportedTopology),
        }
    }

    /// Waits 1 µs inside a polling loop, reporting liveness so the loop does not starve the
    /// watchdog.
    fn yield_point(&self) {
        self.link.delay_us(1);
        self.services.liveness.set_alive();
    }

    /// Tells all slaves that secure lockdown has started, by holding every SSIT_ERR line.
    ///
    /// Does nothing on slaves or before interrupts are enabled.
    pub fn notify_sld_slave_slrs(&self) {
        if self.slr.is_master() && self.interrupts_enabled() {
            info!("Notifying slave SLRs of secure lockdown");
            self.link.drive_lines(SsitLines::all());
        }
    }

    /// Synchronises all dies on the SSIT_ERR lines before secure lockdown proceeds.
    ///
    /// The master waits for every slave to report ready, holds its lines for twice the minimum
    /// notification pulse, then releases them. A slave reports ready and waits for the master to
    /// release its line.
    pub fn inter_slr_sld_handshake(&self) -> Result<(), SsitError> {
        if !self.interrupts_enabled() {
            return Ok(());
        }
        if self.slr.is_master() {
            let expected = self.expected_slave_lines();
            let mut remaining = self.config.sld_ack_timeout_us;
            while !self.link.asserted_lines().contains(expected) {
                if remaining == 0 {
                    warn!("Slave SLRs not ready for secure lockdown");
                    break;
                }
                self.yield_point();
                remaining -= 1;
            }
            self.link.delay_us(2 * self.config.sld_long_pulse_us);
            self.link.drive_lines(SsitLines::empty());
            Ok(())
        } else {
            self.link.drive_lines(SsitLines::LINE0);
            let mut remaining = self.config.sld_ack_timeout_us;
            while !self.link.asserted_lines().is_empty() {
                if remaining == 0 {
                    return Err(SsitError::NotAcknowledged);
                }
                self.yield_point();
                remaining -= 1;
            }
            Ok(())
        }
    }

    /// Returns the lines the master expects asserted by slaves, based on the slaves seen in syncs.
    fn expected_slave_lines(&self) -> SsitLines {
        Self::lines_of(self.slaves_mask())
    }
}

/// Acknowledges an error notification from a slave and raises it locally.
fn notify_error_handler<L: SsitLink>(ssit: &Ssit<'_, L>, remote: SlrIndex) -> Result<(), SsitError> {
    ssit.acknowledge_event(remote, EventIndex::NOTIFY_ERROR)?;
    ssit.services.hooks.error_notification(remote);
    Ok(())
}

/// Acknowledges a single EAM event from a slave and raises its error on the master.
fn single_eam_event_handler<L: SsitLink>(
    ssit: &Ssit<'_, L>,
    remote: SlrIndex,
) -> Result<(), SsitError> {
    if !ssit.slr.is_master() {
        return Err(SsitError::EventNotSupported);
    }
    debug!("Acknowledging single EAM event from {remote:?}");
    ssit.acknowledge_event(remote, EventIndex::SINGLE_EAM)?;
    ssit.services.hooks.single_eam_event(remote);
    Ok(())
}

/// Sets up the global SSIT state for this die.
///
/// Returns `Ok(None)` on monolithic devices, which have no other dies.
pub fn init(
    hooks: &'static (dyn SsitHooks + Sync),
    liveness: &'static (dyn Liveness + Sync),
) -> Result<Option<&'static Ssit<'static, LinkImpl>>, SsitError> {
    let slr_type = SlrType::from_register(PlatformImpl::slr_type_register())?;
    let Some(slr) = slr_type.index() else {
        info!("Monolithic device, SSIT events not used");
        return Ok(None);
    };
    let ssit = SSIT.try_call_once(|| {
        Ssit::new(
            slr_type,
            // SAFETY: This is the only place the link is created, and `try_call_once` runs this
            // closure at most once successfully.
            unsafe { PlatformImpl::create_link(slr) },
            PlatformImpl::SSIT_CONFIG,
            SsitServices {
                liveness,
                executor: PlatformImpl::command_executor(),
                hooks,
            },
        )
    })?;
    info!("SSIT events initialised on {slr:?}");
    Ok(Some(ssit))
}

/// Returns the global SSIT state, if it has been initialised.
#[cfg_attr(test, allow(unused))]
pub fn get() -> Option<&'static Ssit<'static, LinkImpl>> {
    SSIT.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::{SimDie, SimFabric};

    #[test]
    fn monolithic_is_not_ssit() {
        let fabric = SimFabric::new();
        assert_eq!(
            SimDie::try_new(fabric, SlrType::Monolithic).err(),
            Some(SsitError::NotSsitDevice)
        );
    }

    #[test]
    fn table_indices() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave1NonTop);
        assert_eq!(master.ssit.table_indices(SlrIndex::Slave2), Ok((2, 0)));
        assert_eq!(slave.ssit.table_indices(SlrIndex::Master), Ok((0, 1)));
        assert_eq!(
            slave.ssit.table_indices(SlrIndex::Slave0),
            Err(SsitError::UnsupportedTopology)
        );
        assert_eq!(
            master.ssit.table_indices(SlrIndex::Master),
            Err(SsitError::UnsupportedTopology)
        );
    }

    #[test]
    fn notify_error_from_slave() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave2Top);

        slave
            .ssit
            .trigger_event(SlrIndex::Master, EventIndex::NOTIFY_ERROR)
            .unwrap();
        master.step();

        assert_eq!(fabric.error_notifications(SlrIndex::Master), [SlrIndex::Slave2]);
        assert_eq!(
            slave
                .ssit
                .is_event_pending(SlrIndex::Master, EventIndex::NOTIFY_ERROR),
            Ok(false)
        );
    }

    #[test]
    fn sld_notification_and_handshake() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave0 = SimDie::new(fabric, SlrType::Slave0Top);
        let slave1 = SimDie::new(fabric, SlrType::Slave1Top);
        master.ssit.add_slaves(SlrMask::SLAVE0 | SlrMask::SLAVE1);

        master.ssit.notify_sld_slave_slrs();
        slave0.step();
        slave1.step();
        assert_eq!(fabric.tamper_responses(SlrIndex::Slave0), 1);
        assert_eq!(fabric.tamper_responses(SlrIndex::Slave1), 1);

        // Both slaves report ready before the master checks.
        slave0.ssit.link.drive_lines(SsitLines::LINE0);
        slave1.ssit.link.drive_lines(SsitLines::LINE0);
        master.ssit.inter_slr_sld_handshake().unwrap();
        assert!(slave0.ssit.link.asserted_lines().is_empty());
        assert_eq!(slave0.ssit.inter_slr_sld_handshake(), Ok(()));
    }

    #[test]
    fn slave_sld_handshake_times_out_while_master_holds_lines() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave0Top);
        master.ssit.notify_sld_slave_slrs();
        assert_eq!(
            slave.ssit.inter_slr_sld_handshake(),
            Err(SsitError::NotAcknowledged)
        );
    }

    #[test]
    fn single_eam_event_from_slave() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave1NonTop);

        slave
            .ssit
            .trigger_event(SlrIndex::Master, EventIndex::SINGLE_EAM)
            .unwrap();
        assert_eq!(fabric.take_interrupts(SlrIndex::Master), SsitLines::LINE1);
        master.ssit.handle_ssit_irq(SsitLines::LINE1);
        master.ssit.run_pending_tasks();

        assert_eq!(fabric.single_eam_events(SlrIndex::Master), [SlrIndex::Slave1]);
        assert_eq!(
            slave
                .ssit
                .is_event_pending(SlrIndex::Master, EventIndex::SINGLE_EAM),
            Ok(false)
        );
        assert!(fabric.error_notifications(SlrIndex::Master).is_empty());
    }

    #[test]
    fn single_eam_event_only_on_master() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave0Top);

        assert_eq!(
            master
                .ssit
                .trigger_event(SlrIndex::Slave0, EventIndex::SINGLE_EAM),
            Err(SsitError::OriginNotAllowed)
        );
        assert_eq!(
            single_eam_event_handler(&slave.ssit, SlrIndex::Master),
            Err(SsitError::EventNotSupported)
        );
        assert!(fabric.single_eam_events(SlrIndex::Slave0).is_empty());
    }
}
