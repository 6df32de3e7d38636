// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SSIT_ERR interrupt handling and deferred event dispatch.
//!
//! The interrupt handler only records which remote die signalled. Handlers run later from
//! [`Ssit::run_pending_tasks`], which the event loop calls before any other queued work.

use super::{Ssit, event::EventIndex, table::SsitLink};
use crate::{
    error::SsitError,
    slr::{SlrIndex, SlrMask, SsitLines},
};
use core::sync::atomic::{AtomicU32, Ordering};
use log::{error, trace, warn};

/// The remote dies with events waiting to be dispatched.
pub struct TaskQueue {
    pending: AtomicU32,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
        }
    }

    /// Posts a dispatch task for `remote`. Posting a task which is already queued has no effect.
    pub fn post(&self, remote: SlrIndex) {
        self.pending.fetch_or(remote.mask().bits(), Ordering::AcqRel);
    }

    /// Returns whether no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    /// Removes and returns every queued task.
    fn take(&self) -> SlrMask {
        SlrMask::from_bits_retain(self.pending.swap(0, Ordering::AcqRel))
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SsitLink> Ssit<'_, L> {
    /// Handles an SSIT_ERR interrupt for the given latched input lines.
    ///
    /// On a slave, a line which is still asserted after the minimum secure lockdown pulse is a
    /// lockdown notification from the master rather than an event, and starts the tamper response.
    pub fn handle_ssit_irq(&self, lines: SsitLines) {
        if lines.is_empty() || !self.interrupts_enabled() {
            return;
        }
        if self.slr.is_master() {
            for slave in lines.slaves() {
                self.tasks.post(slave);
            }
            return;
        }

        self.link.delay_us(self.config.sld_long_pulse_us);
        if !self.link.asserted_lines().is_empty() {
            warn!("Secure lockdown notification from master SLR");
            self.services.hooks.tamper_response();
            return;
        }
        self.tasks.post(SlrIndex::Master);
    }

    /// Returns whether any dispatch tasks are waiting.
    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Runs every posted dispatch task to completion.
    pub fn run_pending_tasks(&self) {
        let remotes = self.tasks.take();
        for remote in [SlrIndex::Master]
            .into_iter()
            .chain(SlrIndex::SLAVES)
            .filter(|&remote| remotes.has(remote))
        {
            if let Err(e) = self.dispatch_events(remote) {
                error!("Failed to dispatch events from {remote:?}: {e}");
            }
        }
    }

    /// Calls the handler of every event pending from `remote`.
    ///
    /// Events whose origin mask does not include `remote` are ones this die triggered and is
    /// waiting on, so they are skipped. A failing handler is logged and does not stop the others.
    fn dispatch_events(&self, remote: SlrIndex) -> Result<(), SsitError> {
        let (local_table, remote_table) = self.table_indices(remote)?;
        let local = self.link.read_event_vector(self.slr, local_table)?;
        let remote_vector = self.link.read_event_vector(remote, remote_table)?;

        for event in local.pending(&remote_vector).events().map(EventIndex) {
            let Some(entry) = self.event_entry(event) else {
                warn!("Unregistered event {} pending from {remote:?}", event.0);
                continue;
            };
            if !entry.origin.has(remote) {
                continue;
            }
            let Some(handler) = entry.handler else {
                continue;
            };
            trace!("Dispatching event {} from {remote:?}", event.0);
            if let Err(e) = handler(self, remote) {
                error!("Handler for event {} from {remote:?} failed: {e}", event.0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        platform::test::{SimDie, SimFabric, SimLink},
        slr::SlrType,
    };

    const FAILING: EventIndex = EventIndex(5);
    const COUNTED: EventIndex = EventIndex(6);

    fn failing_handler(_ssit: &Ssit<'_, SimLink>, _remote: SlrIndex) -> Result<(), SsitError> {
        Err(SsitError::NotPending)
    }

    fn acking_handler(ssit: &Ssit<'_, SimLink>, remote: SlrIndex) -> Result<(), SsitError> {
        ssit.acknowledge_event(remote, COUNTED)
    }

    fn register_test_events(die: &SimDie) {
        die.ssit
            .register_event(FAILING, Some(failing_handler), SlrMask::ALL_SLAVES)
            .unwrap();
        die.ssit
            .register_event(COUNTED, Some(acking_handler), SlrMask::ALL_SLAVES)
            .unwrap();
    }

    #[test]
    fn queue() {
        let queue = TaskQueue::new();
        assert!(queue.is_empty());
        queue.post(SlrIndex::Slave1);
        queue.post(SlrIndex::Slave1);
        queue.post(SlrIndex::Master);
        assert_eq!(queue.take(), SlrMask::MASTER | SlrMask::SLAVE1);
        assert!(queue.is_empty());
    }

    #[test]
    fn master_posts_one_task_per_line() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        master
            .ssit
            .handle_ssit_irq(SsitLines::LINE0 | SsitLines::LINE2);
        assert_eq!(master.ssit.tasks.take(), SlrMask::SLAVE0 | SlrMask::SLAVE2);
    }

    #[test]
    fn interrupts_ignored_until_enabled() {
        let fabric = SimFabric::new();
        let master = SimDie::new_disabled(fabric, SlrType::Master);
        master.ssit.handle_ssit_irq(SsitLines::all());
        assert!(!master.ssit.has_pending_tasks());
    }

    #[test]
    fn handler_failure_does_not_stop_dispatch() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave1NonTop);
        register_test_events(master);
        register_test_events(slave);

        slave.ssit.trigger_event(SlrIndex::Master, FAILING).unwrap();
        slave.ssit.trigger_event(SlrIndex::Master, COUNTED).unwrap();
        master.step();

        assert_eq!(master.ssit.is_event_pending(SlrIndex::Slave1, FAILING), Ok(true));
        assert_eq!(master.ssit.is_event_pending(SlrIndex::Slave1, COUNTED), Ok(false));
        assert!(!master.ssit.has_pending_tasks());
    }

    #[test]
    fn own_triggers_are_not_dispatched() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave0Top);

        // The master's own message to the slave stays pending while it handles an error
        // notification from the same slave.
        master
            .ssit
            .trigger_event(SlrIndex::Slave0, EventIndex::MESSAGE)
            .unwrap();
        fabric.take_interrupts(SlrIndex::Slave0);
        slave
            .ssit
            .trigger_event(SlrIndex::Master, EventIndex::NOTIFY_ERROR)
            .unwrap();
        master.step();

        assert_eq!(fabric.error_notifications(SlrIndex::Master), [SlrIndex::Slave0]);
        assert_eq!(
            master.ssit.is_event_pending(SlrIndex::Slave0, EventIndex::MESSAGE),
            Ok(true)
        );
    }

    #[test]
    fn slave_event_pulse_posts_master_task() {
        let fabric = SimFabric::new();
        let _master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new_disabled(fabric, SlrType::Slave2Top);
        slave.ssit.enable_interrupts();

        slave.ssit.handle_ssit_irq(SsitLines::LINE2);
        assert_eq!(slave.ssit.tasks.take(), SlrMask::MASTER);
        assert_eq!(fabric.tamper_responses(SlrIndex::Slave2), 0);
    }

    #[test]
    fn held_line_is_secure_lockdown() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave2Top);

        master.ssit.notify_sld_slave_slrs();
        slave.step();
        assert_eq!(fabric.tamper_responses(SlrIndex::Slave2), 1);
        assert!(!slave.ssit.has_pending_tasks());
    }

    #[test]
    fn unreachable_remote_region() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave0Top);
        register_test_events(master);
        register_test_events(slave);

        slave.ssit.trigger_event(SlrIndex::Master, COUNTED).unwrap();
        fabric.set_unreachable(SlrIndex::Slave0);
        assert_eq!(
            master.ssit.dispatch_events(SlrIndex::Slave0),
            Err(SsitError::RegionNotAddressable)
        );
        assert_eq!(
            master.ssit.is_event_pending(SlrIndex::Slave0, COUNTED),
            Err(SsitError::RegionNotAddressable)
        );
        assert_eq!(
            master.ssit.trigger_event(SlrIndex::Slave0, EventIndex::MESSAGE),
            Err(SsitError::RegionNotAddressable)
        );
        let mut response = [0x55];
        assert_eq!(
            master.ssit.read_response(SlrIndex::Slave0, &mut response),
            Err(SsitError::RegionNotAddressable)
        );
        assert_eq!(response, [0x55]);

        // Nothing was toggled, so the event is still pending once the region is reachable.
        assert_eq!(slave.ssit.is_event_pending(SlrIndex::Master, COUNTED), Ok(true));
    }
}
