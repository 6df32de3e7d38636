// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Forwarding of one command at a time from the master to a slave, on top of the `MESSAGE` event.
//!
//! The master writes the request to the slave's message buffer in its own region and triggers
//! `MESSAGE`. The slave executes it, writes the status to the response buffer in its own region
//! and acknowledges `MESSAGE`, which is what tells the master the response is ready.

use super::{
    Ssit,
    event::EventIndex,
    table::{MSG_BUFFER_WORDS, SsitLink, SsitRegion},
};
use crate::{
    cmd::{self, Command, SLR_ID_MASK},
    error::{SUCCESS, SsitError},
    slr::SlrIndex,
};
use log::{debug, warn};

impl<L: SsitLink> Ssit<'_, L> {
    /// Returns the slave number of `slave` if this die is the master and `slave` is a slave.
    fn master_to_slave(&self, slave: SlrIndex) -> Result<usize, SsitError> {
        match slave.slave_number() {
            Some(number) if self.slr.is_master() => Ok(number),
            _ => Err(SsitError::UnsupportedTopology),
        }
    }

    /// Copies `request` to the message buffer for `slave` and triggers `MESSAGE` towards it.
    pub fn write_event_buffer_and_trigger(
        &self,
        slave: SlrIndex,
        request: &[u32],
    ) -> Result<(), SsitError> {
        let number = self.master_to_slave(slave)?;
        if self.is_event_pending(slave, EventIndex::MESSAGE)? {
            return Err(SsitError::AlreadyPending);
        }
        if request.len() > MSG_BUFFER_WORDS {
            return Err(SsitError::BufferTooLarge);
        }
        self.link
            .write_local(SsitRegion::msg_buffer_offset(number), request);
        self.trigger_event(slave, EventIndex::MESSAGE)
    }

    /// Copies the master's request for this slave into `request`.
    pub fn read_event_buffer(&self, request: &mut [u32]) -> Result<(), SsitError> {
        let number = self
            .slr
            .slave_number()
            .ok_or(SsitError::UnsupportedTopology)?;
        if request.len() > MSG_BUFFER_WORDS {
            return Err(SsitError::BufferTooLarge);
        }
        self.link.read(
            SlrIndex::Master,
            SsitRegion::msg_buffer_offset(number),
            request,
        )
    }

    /// Copies the response written by `slave` into `response`.
    pub fn read_response(&self, slave: SlrIndex, response: &mut [u32]) -> Result<(), SsitError> {
        self.master_to_slave(slave)?;
        if response.len() > MSG_BUFFER_WORDS {
            return Err(SsitError::BufferTooLarge);
        }
        self.link
            .read(slave, SsitRegion::RESP_BUFFER_OFFSET, response)
    }

    /// Writes `response` for the master and acknowledges its `MESSAGE` event.
    pub fn write_response_and_ack(&self, response: &[u32]) -> Result<(), SsitError> {
        if self.slr.is_master() {
            return Err(SsitError::UnsupportedTopology);
        }
        if !self.is_event_pending(SlrIndex::Master, EventIndex::MESSAGE)? {
            return Err(SsitError::NotPending);
        }
        if response.len() > MSG_BUFFER_WORDS {
            return Err(SsitError::BufferTooLarge);
        }
        self.link.write_local(SsitRegion::RESP_BUFFER_OFFSET, response);
        self.acknowledge_event(SlrIndex::Master, EventIndex::MESSAGE)
    }

    /// Sends `request` to `slave`, waits up to `timeout_us` for it to be handled and reads back the
    /// response.
    ///
    /// Stops at the first step which fails. The message buffer is simply overwritten by the next
    /// request.
    pub fn send_msg_event_and_get_response(
        &self,
        slave: SlrIndex,
        request: &[u32],
        response: &mut [u32],
        timeout_us: u32,
    ) -> Result<(), SsitError> {
        self.write_event_buffer_and_trigger(slave, request)?;
        self.wait_for_event(slave, EventIndex::MESSAGE, timeout_us)?;
        self.read_response(slave, response)
    }

    /// Forwards an IPI command to the slave named by the SLR id bits of its header.
    ///
    /// The SLR id bits are cleared in `payload` before it is sent, so the slave executes the
    /// command locally.
    pub fn send_ipi_cmd_to_slave_slr(
        &self,
        payload: &mut [u32],
        response: &mut [u32],
    ) -> Result<(), SsitError> {
        let header = payload.first_mut().ok_or(SsitError::InvalidCommand)?;
        let slave = cmd::target_slr(*header)?;
        if slave.is_master() {
            return Err(SsitError::InvalidSlrIndex);
        }
        *header &= !SLR_ID_MASK;
        self.send_msg_event_and_get_response(
            slave,
            payload,
            response,
            self.config.slave_event_timeout_us,
        )
    }
}

/// Executes a command forwarded by the master and sends back its status.
pub(super) fn message_event_handler<L: SsitLink>(
    ssit: &Ssit<'_, L>,
    _remote: SlrIndex,
) -> Result<(), SsitError> {
    let mut request = [0; MSG_BUFFER_WORDS];
    ssit.read_event_buffer(&mut request)?;

    let mut response = [0; MSG_BUFFER_WORDS];
    let (status, data) = response.split_at_mut(1);
    status[0] = match Command::from_forwarded(&request) {
        Ok(cmd) => {
            let executor = ssit.services.executor;
            match executor
                .validate(&cmd)
                .map_err(|_| SsitError::NoAccess.code())
                .and_then(|()| executor.execute(&cmd, data))
            {
                Ok(()) => SUCCESS,
                Err(status) => {
                    debug!("Forwarded command {:#x} failed: {status:#x}", cmd.header);
                    status
                }
            }
        }
        Err(e) => {
            warn!("Malformed forwarded command {:#x}", request[0]);
            e.code()
        }
    };
    ssit.write_response_and_ack(&response)
}
