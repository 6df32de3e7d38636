// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Event registry and the trigger / wait / acknowledge primitives.
//!
//! An event between this die and a remote die is pending when the event's bit differs between the
//! vector this die drives towards the remote die and the vector the remote die drives back.
//! Triggering and acknowledging both toggle the local bit: the trigger makes the vectors differ and
//! the acknowledgement from the other side makes them match again.

use super::{Ssit, table::{EventVector, MAX_EVENTS, SsitLink, SsitRegion}};
use crate::{
    error::SsitError,
    slr::{SlrIndex, SlrMask, SsitLines},
};
use log::{debug, trace};

/// Identifies one kind of cross-die event.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct EventIndex(pub u32);

impl EventIndex {
    /// A slave reached a sync point. Polled directly rather than dispatched.
    pub const SYNC: Self = Self(0);
    /// The master wrote a request to the slave's message buffer.
    pub const MESSAGE: Self = Self(1);
    /// A slave reports an error to be aggregated on the master.
    pub const NOTIFY_ERROR: Self = Self(2);
    /// A slave asks the master to raise an error for the whole device.
    pub const SINGLE_EAM: Self = Self(3);
}

/// Called from task context when an event from `remote` is seen pending.
pub type EventHandler<L> = fn(&Ssit<'_, L>, remote: SlrIndex) -> Result<(), SsitError>;

/// Who may trigger an event, and what runs on the observing die.
pub struct EventEntry<L: SsitLink> {
    /// The dies allowed to trigger the event.
    pub origin: SlrMask,
    /// The handler, or `None` for events which are only polled.
    pub handler: Option<EventHandler<L>>,
}

impl<L: SsitLink> EventEntry<L> {
    const UNREGISTERED: Self = Self {
        origin: SlrMask::empty(),
        handler: None,
    };
}

impl<L: SsitLink> Clone for EventEntry<L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: SsitLink> Copy for EventEntry<L> {}

/// The registered events, indexed by event number.
pub struct EventRegistry<L: SsitLink> {
    entries: [EventEntry<L>; MAX_EVENTS as usize],
}

impl<L: SsitLink> EventRegistry<L> {
    /// Creates a registry with no events registered.
    pub const fn new() -> Self {
        Self {
            entries: [EventEntry::UNREGISTERED; MAX_EVENTS as usize],
        }
    }

    /// Returns the entry for `event`, or `None` if it is out of range or unregistered.
    pub fn get(&self, event: EventIndex) -> Option<EventEntry<L>> {
        self.entries
            .get(event.0 as usize)
            .filter(|entry| !entry.origin.is_empty())
            .copied()
    }

    /// Registers or replaces the entry for `event`.
    pub fn register(
        &mut self,
        event: EventIndex,
        handler: Option<EventHandler<L>>,
        origin: SlrMask,
    ) -> Result<(), SsitError> {
        let entry = self
            .entries
            .get_mut(event.0 as usize)
            .ok_or(SsitError::OutOfRange)?;
        if origin.bits() & !SlrMask::all().bits() != 0 {
            return Err(SsitError::InvalidOriginMask);
        }
        *entry = EventEntry { origin, handler };
        Ok(())
    }
}

impl<L: SsitLink> Default for EventRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SsitLink> Ssit<'_, L> {
    /// Registers `handler` to run when `event` is seen pending, and allows the dies in `origin`
    /// to trigger it. Replaces any previous registration.
    pub fn register_event(
        &self,
        event: EventIndex,
        handler: Option<EventHandler<L>>,
        origin: SlrMask,
    ) -> Result<(), SsitError> {
        self.registry.lock().register(event, handler, origin)
    }

    /// Returns the registered entry for `event`, if any.
    pub(super) fn event_entry(&self, event: EventIndex) -> Option<EventEntry<L>> {
        self.registry.lock().get(event)
    }

    /// Returns whether `event` is pending between this die and `remote`.
    pub fn is_event_pending(&self, remote: SlrIndex, event: EventIndex) -> Result<bool, SsitError> {
        let (local_table, remote_table) = self.table_indices(remote)?;
        if event.0 >= MAX_EVENTS {
            return Err(SsitError::InvalidEvent);
        }
        let (word, bit) = EventVector::locate(event.0);
        let local = self.link.read_event_vector(self.slr, local_table)?;
        let remote = self.link.read_event_vector(remote, remote_table)?;
        Ok((local.events32[word] ^ remote.events32[word]) & bit != 0)
    }

    /// Signals `event` to `remote`.
    ///
    /// This only toggles the local bit and, for events other than `SYNC`, pulses the SSIT_ERR line
    /// towards `remote`. It does not wait for the event to be acknowledged.
    pub fn trigger_event(&self, remote: SlrIndex, event: EventIndex) -> Result<(), SsitError> {
        if !self.interrupts_enabled() {
            return Err(SsitError::NotEnabled);
        }
        let (local_table, _) = self.table_indices(remote)?;
        if event.0 >= MAX_EVENTS {
            return Err(SsitError::InvalidEvent);
        }
        // An unregistered slot has an empty origin mask, so nobody may trigger it.
        let origin = self
            .event_entry(event)
            .map_or(SlrMask::empty(), |entry| entry.origin);
        if !origin.has(self.slr) {
            return Err(SsitError::OriginNotAllowed);
        }

        {
            let _guard = self.table_lock.lock();
            if self.is_event_pending(remote, event)? {
                return Err(SsitError::AlreadyPending);
            }
            self.toggle_local(local_table, event)?;
        }

        if event != EventIndex::SYNC {
            self.link.pulse_lines(self.lines_towards(remote));
        }
        trace!("Triggered event {} towards {:?}", event.0, remote);
        Ok(())
    }

    /// Waits up to `timeout_us` microseconds for `event` towards `remote` to be acknowledged.
    pub fn wait_for_event(
        &self,
        remote: SlrIndex,
        event: EventIndex,
        timeout_us: u32,
    ) -> Result<(), SsitError> {
        self.table_indices(remote)?;
        let mut remaining = timeout_us;
        while self.is_event_pending(remote, event)? {
            if remaining == 0 {
                debug!("Event {} towards {:?} not acknowledged", event.0, remote);
                return Err(SsitError::NotAcknowledged);
            }
            self.yield_point();
            remaining -= 1;
        }
        Ok(())
    }

    /// Acknowledges `event` received from `remote`, clearing its pendency.
    ///
    /// The remote die notices the acknowledgement by polling, so no line is pulsed.
    pub fn acknowledge_event(&self, remote: SlrIndex, event: EventIndex) -> Result<(), SsitError> {
        let (local_table, _) = self.table_indices(remote)?;
        let _guard = self.table_lock.lock();
        if !self.is_event_pending(remote, event)? {
            return Err(SsitError::NotPending);
        }
        self.toggle_local(local_table, event)?;
        trace!("Acknowledged event {} from {:?}", event.0, remote);
        Ok(())
    }

    /// Flips the local bit for `event` in the vector at `table`. The caller holds `table_lock`.
    fn toggle_local(&self, table: usize, event: EventIndex) -> Result<(), SsitError> {
        let (word, bit) = EventVector::locate(event.0);
        let offset = SsitRegion::event_table_offset(table) + word;
        let mut value = [0];
        self.link.read(self.slr, offset, &mut value)?;
        value[0] ^= bit;
        self.link.write_local(offset, &value);
        Ok(())
    }

    /// Returns the SSIT_ERR line on which this die signals `remote`.
    fn lines_towards(&self, remote: SlrIndex) -> SsitLines {
        if self.slr.is_master() {
            SsitLines::for_slave(remote)
        } else {
            SsitLines::LINE0
        }
    }
}
