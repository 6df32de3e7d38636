// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! A circular in-memory log buffer, which keeps the most recent output for later retrieval.

use core::{
    cmp::min,
    fmt::{self, Write},
};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// An in-memory logger with a circular buffer.
///
/// The layout is fixed so that a debugger, or the next boot stage, can find the buffer and its
/// write position in memory.
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MemoryLogger<const BUFFER_SIZE: usize> {
    /// Where the next byte goes.
    head: usize,
    /// Bytes logged since creation. May exceed `BUFFER_SIZE`.
    total: usize,
    buffer: [u8; BUFFER_SIZE],
}

impl<const BUFFER_SIZE: usize> MemoryLogger<BUFFER_SIZE> {
    /// Creates an empty logger.
    pub const fn new() -> Self {
        Self {
            head: 0,
            total: 0,
            buffer: [0; BUFFER_SIZE],
        }
    }

    /// Returns the number of bytes still held, which is at most `BUFFER_SIZE`.
    pub fn len(&self) -> usize {
        min(self.total, BUFFER_SIZE)
    }

    /// Returns whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Returns whether older bytes have been overwritten.
    pub fn wrapped(&self) -> bool {
        self.total > BUFFER_SIZE
    }

    fn push(&mut self, mut bytes: &[u8]) {
        self.total += bytes.len();
        if bytes.len() > BUFFER_SIZE {
            bytes = &bytes[bytes.len() - BUFFER_SIZE..];
        }
        let (tail, wrapped) = bytes.split_at(min(bytes.len(), BUFFER_SIZE - self.head));
        self.buffer[self.head..self.head + tail.len()].copy_from_slice(tail);
        self.buffer[..wrapped.len()].copy_from_slice(wrapped);
        self.head = (self.head + bytes.len()) % BUFFER_SIZE;
    }

    /// Returns the held bytes as a string, oldest first.
    ///
    /// Once the buffer has wrapped its oldest character may have been partly overwritten, so any
    /// invalid UTF-8 at the start is skipped.
    pub fn as_str(&mut self) -> &str {
        if self.wrapped() {
            self.buffer.rotate_left(self.head);
            self.head = 0;
        }
        let mut held = &self.buffer[..self.len()];
        loop {
            match str::from_utf8(held) {
                Ok(text) => return text,
                Err(e) => match e.error_len() {
                    Some(len) if e.valid_up_to() == 0 => held = &held[len..],
                    // Keep what comes before anything invalid further on.
                    _ => return str::from_utf8(&held[..e.valid_up_to()]).unwrap_or_default(),
                },
            }
        }
    }
}

impl<const BUFFER_SIZE: usize> Default for MemoryLogger<BUFFER_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BUFFER_SIZE: usize> Write for MemoryLogger<BUFFER_SIZE> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        Ok(())
    }
}
