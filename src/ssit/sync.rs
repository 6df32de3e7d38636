// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Sync points between the master and slave PLMs.
//!
//! Once SSIT interrupts are enabled, syncs use the `SYNC` event. A slave reaching a sync point
//! triggers `SYNC` towards the master and waits for it to be acknowledged. The master either
//! acknowledges every slave it waited for (sync) or leaves the events pending (wait).
//!
//! Before that, the SSIT_ERR lines are used directly. A slave holds its line until the master
//! answers by holding the slave's line, then releases it and waits for the master to release too.

use super::{Ssit, event::EventIndex, table::SsitLink};
use crate::{
    error::SsitError,
    slr::{SlrIndex, SlrMask, SsitLines},
};
use log::{debug, error, info};

impl<L: SsitLink> Ssit<'_, L> {
    /// Waits up to `timeout_us` for every slave in `slaves` to reach a sync point, then
    /// acknowledges them all.
    ///
    /// On timeout no slave is acknowledged, so the ones which were ready stay pending.
    pub fn sync_slaves(&self, slaves: SlrMask, timeout_us: u32) -> Result<(), SsitError> {
        self.collect_slaves(slaves, timeout_us)?;
        if self.interrupts_enabled() {
            for slave in Self::slaves_in(slaves) {
                self.acknowledge_event(slave, EventIndex::SYNC)?;
            }
        } else {
            self.release_line_sync(Self::lines_of(slaves))?;
        }
        info!("SSIT sync slaves successful");
        Ok(())
    }

    /// Waits up to `timeout_us` for every slave in `slaves` to reach a sync point, without
    /// acknowledging them.
    pub fn wait_slaves(&self, slaves: SlrMask, timeout_us: u32) -> Result<(), SsitError> {
        self.collect_slaves(slaves, timeout_us)?;
        info!("SSIT wait slaves successful");
        Ok(())
    }

    /// Reaches a sync point on a slave, returning once the master has acknowledged it.
    ///
    /// There is no timeout: the slave cannot make progress until the master has synced, so it
    /// keeps the watchdog fed while it waits.
    pub fn sync_master(&self) -> Result<(), SsitError> {
        if self.slr.is_master() {
            return Err(SsitError::UnsupportedTopology);
        }
        if !self.interrupts_enabled() {
            return self.line_sync_master();
        }
        self.trigger_event(SlrIndex::Master, EventIndex::SYNC)?;
        debug!("SSIT sync initiated");
        while self.is_event_pending(SlrIndex::Master, EventIndex::SYNC)? {
            self.yield_point();
        }
        info!("SSIT sync master successful");
        Ok(())
    }

    /// Slave side of a sync on the SSIT_ERR lines.
    fn line_sync_master(&self) -> Result<(), SsitError> {
        self.link.drive_lines(SsitLines::LINE0);
        debug!("SSIT sync initiated on SSIT_ERR");
        while self.link.asserted_lines().is_empty() {
            self.yield_point();
        }
        self.link.drive_lines(SsitLines::empty());
        while !self.link.asserted_lines().is_empty() {
            self.yield_point();
        }
        info!("SSIT sync master successful");
        Ok(())
    }

    /// Master side of the end of a sync on the SSIT_ERR lines: holds `lines` until the slaves
    /// release theirs.
    fn release_line_sync(&self, lines: SsitLines) -> Result<(), SsitError> {
        self.link.drive_lines(lines);
        let mut remaining = self.config.sync_ack_timeout_us;
        let result = loop {
            let held = self.link.asserted_lines() & lines;
            if held.is_empty() {
                break Ok(());
            }
            if remaining == 0 {
                error!("Slaves {:?} did not release SSIT_ERR", held.to_slave_mask());
                break Err(SsitError::SlaveSyncTimeout);
            }
            self.yield_point();
            remaining -= 1;
        };
        self.link.drive_lines(SsitLines::empty());
        result
    }

    /// Polls each slave in `slaves` until all have reached a sync point.
    ///
    /// A slave is ready when its `SYNC` event is pending or, while SSIT interrupts are disabled,
    /// when it holds its SSIT_ERR line.
    fn collect_slaves(&self, slaves: SlrMask, timeout_us: u32) -> Result<(), SsitError> {
        if !self.slr.is_master() {
            return Err(SsitError::UnsupportedTopology);
        }
        let slaves = slaves & SlrMask::ALL_SLAVES;
        self.add_slaves(slaves);
        let use_events = self.interrupts_enabled();

        let mut ready = SlrMask::empty();
        let mut remaining = timeout_us;
        loop {
            if use_events {
                for slave in Self::slaves_in(slaves - ready) {
                    if self.is_event_pending(slave, EventIndex::SYNC)? {
                        ready |= slave.mask();
                    }
                }
            } else {
                ready |= (self.link.asserted_lines() & Self::lines_of(slaves)).to_slave_mask();
            }
            if ready == slaves {
                return Ok(());
            }
            if remaining == 0 {
                error!("Slaves {:?} did not initiate sync", slaves - ready);
                return Err(SsitError::SlaveSyncTimeout);
            }
            self.yield_point();
            remaining -= 1;
        }
    }

    fn slaves_in(slaves: SlrMask) -> impl Iterator<Item = SlrIndex> {
        SlrIndex::SLAVES
            .into_iter()
            .filter(move |&slave| slaves.has(slave))
    }

    /// Returns the SSIT_ERR lines connecting the master to `slaves`.
    pub(super) fn lines_of(slaves: SlrMask) -> SsitLines {
        Self::slaves_in(slaves).fold(SsitLines::empty(), |lines, slave| {
            lines | SsitLines::for_slave(slave)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmd::{Command, FORWARDED_SUBSYSTEM_ID, GENERIC_MODULE_ID, SsitCommand, header},
        platform::test::{SIM_SSIT_CONFIG, SimDie, SimFabric},
        slr::SlrType,
        ssit::SsitConfig,
    };
    use std::thread;

    /// The subsystem id of the PMC, which issues commands from the boot image.
    const PMC_SUBSYSTEM_ID: u32 = 0x1c00_0001;

    #[test]
    fn sync_with_two_slaves() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave0 = SimDie::new(fabric, SlrType::Slave0Top);
        let slave1 = SimDie::new(fabric, SlrType::Slave1Top);

        slave0
            .ssit
            .trigger_event(SlrIndex::Master, EventIndex::SYNC)
            .unwrap();
        slave1
            .ssit
            .trigger_event(SlrIndex::Master, EventIndex::SYNC)
            .unwrap();
        master
            .ssit
            .sync_slaves(SlrMask::SLAVE0 | SlrMask::SLAVE1, 100)
            .unwrap();

        for slave in [slave0, slave1] {
            assert_eq!(
                slave
                    .ssit
                    .wait_for_event(SlrIndex::Master, EventIndex::SYNC, 0),
                Ok(())
            );
        }
        assert_eq!(master.ssit.slaves_mask(), SlrMask::SLAVE0 | SlrMask::SLAVE1);
    }

    #[test]
    fn sync_timeout_leaves_ready_slave_pending() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave0 = SimDie::new(fabric, SlrType::Slave0Top);
        let _slave1 = SimDie::new(fabric, SlrType::Slave1Top);

        slave0
            .ssit
            .trigger_event(SlrIndex::Master, EventIndex::SYNC)
            .unwrap();
        let start = fabric.now_us();
        assert_eq!(
            master
                .ssit
                .sync_slaves(SlrMask::SLAVE0 | SlrMask::SLAVE1, 30),
            Err(SsitError::SlaveSyncTimeout)
        );
        assert_eq!(fabric.now_us() - start, 30);
        assert_eq!(
            master.ssit.is_event_pending(SlrIndex::Slave0, EventIndex::SYNC),
            Ok(true)
        );
        assert_eq!(
            master.ssit.is_event_pending(SlrIndex::Slave1, EventIndex::SYNC),
            Ok(false)
        );
    }

    #[test]
    fn wait_slaves_does_not_acknowledge() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave2Top);

        slave
            .ssit
            .trigger_event(SlrIndex::Master, EventIndex::SYNC)
            .unwrap();
        master.ssit.wait_slaves(SlrMask::SLAVE2, 10).unwrap();
        assert_eq!(
            master.ssit.is_event_pending(SlrIndex::Slave2, EventIndex::SYNC),
            Ok(true)
        );
        master.ssit.sync_slaves(SlrMask::SLAVE2, 10).unwrap();
        assert_eq!(
            slave.ssit.is_event_pending(SlrIndex::Master, EventIndex::SYNC),
            Ok(false)
        );
    }

    #[test]
    fn empty_mask_succeeds_immediately() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let start = fabric.now_us();
        assert_eq!(master.ssit.sync_slaves(SlrMask::empty(), 0), Ok(()));
        assert_eq!(master.ssit.wait_slaves(SlrMask::MASTER, 0), Ok(()));
        assert_eq!(fabric.now_us(), start);
    }

    #[test]
    fn sync_master_blocks_until_acknowledged() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave0 = SimDie::new(fabric, SlrType::Slave0Top);
        let slave1 = SimDie::new(fabric, SlrType::Slave1Top);

        let (result0, result1, master_result) = thread::scope(|scope| {
            let sync0 = scope.spawn(|| slave0.ssit.sync_master());
            let sync1 = scope.spawn(|| slave1.ssit.sync_master());
            let master_result = master
                .ssit
                .sync_slaves(SlrMask::SLAVE0 | SlrMask::SLAVE1, 1_000_000);
            (sync0.join().unwrap(), sync1.join().unwrap(), master_result)
        });
        assert_eq!(master_result, Ok(()));
        assert_eq!(result0, Ok(()));
        assert_eq!(result1, Ok(()));

        for (slave, die) in [(SlrIndex::Slave0, slave0), (SlrIndex::Slave1, slave1)] {
            assert_eq!(master.ssit.is_event_pending(slave, EventIndex::SYNC), Ok(false));
            assert_eq!(
                die.ssit.is_event_pending(SlrIndex::Master, EventIndex::SYNC),
                Ok(false)
            );
        }
    }

    #[test]
    fn sync_master_reports_liveness_while_blocked() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave2Top);

        let result = thread::scope(|scope| {
            let sync = scope.spawn(|| slave.ssit.sync_master());
            master.ssit.wait_slaves(SlrMask::SLAVE2, 1_000_000).unwrap();
            while slave.liveness_reports() == 0 {
                thread::yield_now();
            }
            assert!(!sync.is_finished());
            master.ssit.sync_slaves(SlrMask::SLAVE2, 0).unwrap();
            sync.join().unwrap()
        });
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn line_sync_before_interrupts() {
        let fabric = SimFabric::new();
        let config = SsitConfig {
            sync_ack_timeout_us: 1_000_000,
            ..SIM_SSIT_CONFIG
        };
        let master = SimDie::with_config(fabric, SlrType::Master, config);
        let slave0 = SimDie::with_config(fabric, SlrType::Slave0Top, config);
        let slave2 = SimDie::with_config(fabric, SlrType::Slave2Top, config);

        let (result0, result2, master_result) = thread::scope(|scope| {
            let sync0 = scope.spawn(|| slave0.ssit.sync_master());
            let sync2 = scope.spawn(|| slave2.ssit.sync_master());
            let master_result = master
                .ssit
                .sync_slaves(SlrMask::SLAVE0 | SlrMask::SLAVE2, 1_000_000);
            (sync0.join().unwrap(), sync2.join().unwrap(), master_result)
        });
        assert_eq!(master_result, Ok(()));
        assert_eq!(result0, Ok(()));
        assert_eq!(result2, Ok(()));

        // Every line is released and no event was used.
        assert!(master.ssit.link.asserted_lines().is_empty());
        assert!(slave0.ssit.link.asserted_lines().is_empty());
        assert!(slave2.ssit.link.asserted_lines().is_empty());
        assert_eq!(
            master.ssit.is_event_pending(SlrIndex::Slave0, EventIndex::SYNC),
            Ok(false)
        );
        assert_eq!(master.ssit.slaves_mask(), SlrMask::SLAVE0 | SlrMask::SLAVE2);
    }

    #[test]
    fn line_sync_timeouts() {
        let fabric = SimFabric::new();
        let master = SimDie::new_disabled(fabric, SlrType::Master);
        let slave0 = SimDie::new_disabled(fabric, SlrType::Slave0Top);
        let _slave1 = SimDie::new_disabled(fabric, SlrType::Slave1Top);

        // Slave 0 holds its line but slave 1 never does.
        slave0.ssit.link.drive_lines(SsitLines::LINE0);
        let start = fabric.now_us();
        assert_eq!(
            master
                .ssit
                .sync_slaves(SlrMask::SLAVE0 | SlrMask::SLAVE1, 20),
            Err(SsitError::SlaveSyncTimeout)
        );
        assert_eq!(fabric.now_us() - start, 20);
        assert!(slave0.ssit.link.asserted_lines().is_empty());

        // Waiting only looks at the lines.
        master.ssit.wait_slaves(SlrMask::SLAVE0, 0).unwrap();
        assert!(slave0.ssit.link.asserted_lines().is_empty());

        // Slave 0 never releases its line after the master answers.
        let start = fabric.now_us();
        assert_eq!(
            master.ssit.sync_slaves(SlrMask::SLAVE0, 10),
            Err(SsitError::SlaveSyncTimeout)
        );
        assert_eq!(fabric.now_us() - start, u64::from(SIM_SSIT_CONFIG.sync_ack_timeout_us));
        assert!(slave0.ssit.link.asserted_lines().is_empty());
    }

    #[test]
    fn wrong_side() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave0Top);
        assert_eq!(master.ssit.sync_master(), Err(SsitError::UnsupportedTopology));
        assert_eq!(
            slave.ssit.sync_slaves(SlrMask::SLAVE1, 10),
            Err(SsitError::UnsupportedTopology)
        );
    }

    #[test]
    fn sync_commands() {
        let fabric = SimFabric::new();
        let master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave1Top);

        slave
            .ssit
            .trigger_event(SlrIndex::Master, EventIndex::SYNC)
            .unwrap();
        let payload = [SsitLines::LINE1.bits(), 10];
        let wait = Command {
            header: header(GENERIC_MODULE_ID, SsitCommand::WaitSlaves as u32, 2),
            payload: &payload,
            subsystem_id: PMC_SUBSYSTEM_ID,
        };
        master.ssit.execute_ssit_command(&wait).unwrap();
        let sync = Command {
            header: header(GENERIC_MODULE_ID, SsitCommand::SyncSlaves as u32, 2),
            ..wait
        };
        master.ssit.execute_ssit_command(&sync).unwrap();
        assert_eq!(
            slave.ssit.is_event_pending(SlrIndex::Master, EventIndex::SYNC),
            Ok(false)
        );

        let short = Command {
            payload: &payload[..1],
            ..sync
        };
        assert_eq!(
            master.ssit.execute_ssit_command(&short),
            Err(SsitError::InvalidCommand)
        );
        let unknown = Command {
            header: header(GENERIC_MODULE_ID, 0x3f, 0),
            ..sync
        };
        assert_eq!(
            master.ssit.execute_ssit_command(&unknown),
            Err(SsitError::InvalidCommand)
        );
    }

    #[test]
    fn forwarded_sync_commands_rejected() {
        let fabric = SimFabric::new();
        let _master = SimDie::new(fabric, SlrType::Master);
        let slave = SimDie::new(fabric, SlrType::Slave0Top);

        let forwarded = Command {
            header: header(GENERIC_MODULE_ID, SsitCommand::SyncMaster as u32, 0),
            payload: &[],
            subsystem_id: FORWARDED_SUBSYSTEM_ID,
        };
        assert_eq!(
            slave.ssit.execute_ssit_command(&forwarded),
            Err(SsitError::NoAccess)
        );
        assert_eq!(
            slave.ssit.is_event_pending(SlrIndex::Master, EventIndex::SYNC),
            Ok(false)
        );
    }
}
