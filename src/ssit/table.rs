// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Layout of the per-die SSIT region and the link through which dies reach each other's regions.

use crate::{
    error::SsitError,
    slr::{MAX_SLAVE_SLRS, SlrIndex, SsitLines},
};
use core::mem::{offset_of, size_of};

/// The number of 32-bit words in an event vector.
pub const EVENT_WORDS: usize = 2;

/// The number of events in one word of an event vector.
pub const EVENTS_PER_WORD: u32 = u32::BITS;

/// The number of events supported by an event vector.
pub const MAX_EVENTS: u32 = EVENT_WORDS as u32 * EVENTS_PER_WORD;

/// The capacity in words of a message or response buffer.
pub const MSG_BUFFER_WORDS: usize = 8;

const WORD_SIZE: usize = size_of::<u32>();

/// Toggle parity of every event as last driven by one die towards one remote die.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
pub struct EventVector {
    /// One bit per event index, little-endian within each word.
    pub events32: [u32; EVENT_WORDS],
}

impl EventVector {
    /// Returns the word index and bit mask for an event index, which must be below `MAX_EVENTS`.
    pub const fn locate(event: u32) -> (usize, u32) {
        (
            (event / EVENTS_PER_WORD) as usize,
            1 << (event % EVENTS_PER_WORD),
        )
    }

    /// Returns the word-by-word XOR of two vectors. A set bit is a pending event.
    pub fn pending(&self, other: &Self) -> Self {
        let mut events32 = [0; EVENT_WORDS];
        for (pending, (a, b)) in events32
            .iter_mut()
            .zip(self.events32.iter().zip(&other.events32))
        {
            *pending = a ^ b;
        }
        Self { events32 }
    }

    /// Returns the set event indices, in ascending order.
    pub fn events(&self) -> impl Iterator<Item = u32> + '_ {
        self.events32
            .iter()
            .enumerate()
            .filter(|&(_, &word)| word != 0)
            .flat_map(|(index, &word)| {
                (0..EVENTS_PER_WORD)
                    .filter(move |bit| word & (1 << bit) != 0)
                    .map(move |bit| index as u32 * EVENTS_PER_WORD + bit)
            })
    }
}

/// The SSIT state owned by one die.
///
/// The table at index `n` of `event_tables` is the one this die drives towards:
/// - slave `n` when this die is the master;
/// - the master when `n` is 0 and this die is a slave. Other entries are unused on slaves.
#[repr(C)]
pub struct SsitRegion {
    /// Event vectors driven by this die.
    pub event_tables: [EventVector; MAX_SLAVE_SLRS],
    /// Requests from the master to each slave. Only used on the master.
    pub msg_buffers: [[u32; MSG_BUFFER_WORDS]; MAX_SLAVE_SLRS],
    /// Response to the last request from the master. Only used on slaves.
    pub resp_buffer: [u32; MSG_BUFFER_WORDS],
}

impl SsitRegion {
    /// The size of the region in words.
    pub const WORDS: usize = size_of::<Self>() / WORD_SIZE;

    /// Word offset of the response buffer.
    pub const RESP_BUFFER_OFFSET: usize = offset_of!(Self, resp_buffer) / WORD_SIZE;

    /// Returns the word offset of the event vector at `table`.
    pub const fn event_table_offset(table: usize) -> usize {
        (offset_of!(Self, event_tables) + table * size_of::<EventVector>()) / WORD_SIZE
    }

    /// Returns the word offset of the message buffer for the slave with the given number.
    pub const fn msg_buffer_offset(slave: usize) -> usize {
        (offset_of!(Self, msg_buffers) + slave * MSG_BUFFER_WORDS * WORD_SIZE) / WORD_SIZE
    }
}

/// The view one die has of the SSIT regions and SSIT_ERR lines of every die.
///
/// The parity protocol depends on each region having exactly one writer: the die which owns it.
/// That is why there is a `read` for any die but only a `write_local`. A region written from two
/// contexts at once can end up with a bit which is stuck pending, or never seen as pending.
pub trait SsitLink {
    /// Returns the index of the die this link belongs to.
    fn local_slr(&self) -> SlrIndex;

    /// Copies `words.len()` words at word `offset` of the SSIT region of `slr` into `words`.
    ///
    /// Fails with [`SsitError::RegionNotAddressable`] if the region of `slr` can't be reached from
    /// this die, in which case `words` is left unchanged.
    fn read(&self, slr: SlrIndex, offset: usize, words: &mut [u32]) -> Result<(), SsitError>;

    /// Writes `words` at word `offset` of the local SSIT region.
    fn write_local(&self, offset: usize, words: &[u32]);

    /// Asserts then de-asserts the given output lines.
    fn pulse_lines(&self, lines: SsitLines);

    /// Sets the output lines to exactly `lines`, leaving them asserted.
    fn drive_lines(&self, lines: SsitLines);

    /// Returns the input lines which are currently asserted by other dies.
    fn asserted_lines(&self) -> SsitLines;

    /// Busy-waits for the given number of microseconds.
    fn delay_us(&self, us: u32);

    /// Reads the event vector at `table` of the SSIT region of `slr`.
    fn read_event_vector(&self, slr: SlrIndex, table: usize) -> Result<EventVector, SsitError> {
        let mut vector = EventVector::default();
        self.read(
            slr,
            SsitRegion::event_table_offset(table),
            &mut vector.events32,
        )?;
        Ok(vector)
    }
}
