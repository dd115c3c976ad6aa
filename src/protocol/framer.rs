// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte stream to response line framing.

/// Splits a raw byte stream into response lines.
///
/// Every byte below 32 terminates the current line; every other byte is
/// appended to it. Empty lines are never emitted and partial lines survive
/// across calls to [`push`](Self::push).
///
/// A line longer than the configured limit is discarded in full, up to its
/// terminator, so a device spewing garbage cannot grow the buffer.
///
/// # Examples
///
/// ```
/// use optoma_bridge::protocol::FrameAssembler;
///
/// let mut framer = FrameAssembler::new(64);
/// assert!(framer.push(b"INFO").is_empty());
/// assert_eq!(framer.push(b"1\r\nOk\r"), vec!["INFO1", "Ok"]);
/// ```
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: String,
    max_len: usize,
    overflowed: bool,
}

impl FrameAssembler {
    /// Creates an assembler that buffers at most `max_len` bytes per line.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: String::with_capacity(max_len.min(256)),
            max_len,
            overflowed: false,
        }
    }

    /// Consumes a chunk of bytes and returns the lines it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte < 32 {
                if self.overflowed {
                    self.overflowed = false;
                } else if !self.buffer.is_empty() {
                    lines.push(std::mem::take(&mut self.buffer));
                }
                continue;
            }

            if self.overflowed {
                continue;
            }

            if self.buffer.len() >= self.max_len {
                tracing::warn!(
                    max_len = self.max_len,
                    "Discarding over-long response line"
                );
                self.buffer.clear();
                self.overflowed = true;
                continue;
            }

            // Bytes above 0x7f map to the Latin-1 code point of the same value.
            self.buffer.push(char::from(byte));
        }

        lines
    }

    /// Returns the number of bytes buffered for the current partial line.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_reference(input: &[u8]) -> Vec<String> {
        input
            .split(|b| *b < 32)
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.iter().map(|b| char::from(*b)).collect())
            .collect()
    }

    #[test]
    fn drops_empty_segments() {
        let mut framer = FrameAssembler::new(64);
        assert_eq!(framer.push(b"\r\n\r\nP\r\r"), vec!["P"]);
    }

    #[test]
    fn any_control_byte_terminates() {
        let mut framer = FrameAssembler::new(64);
        assert_eq!(framer.push(b"A\x00B\tC\x1fD\n"), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn partial_line_is_kept() {
        let mut framer = FrameAssembler::new(64);
        assert!(framer.push(b"OK1").is_empty());
        assert_eq!(framer.pending_len(), 3);
        assert_eq!(framer.push(b"\r"), vec!["OK1"]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn chunk_boundaries_do_not_change_lines() {
        let input = b"INFO0\rAMXB<-Make=Optoma><-Model=UHD>\r\nOK10001\r\r F\rP\n";
        let expected = split_reference(input);

        for chunk_size in 1..=input.len() {
            let mut framer = FrameAssembler::new(256);
            let lines: Vec<String> = input
                .chunks(chunk_size)
                .flat_map(|chunk| framer.push(chunk))
                .collect();
            assert_eq!(lines, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn overlong_line_is_dropped() {
        let mut framer = FrameAssembler::new(4);
        assert_eq!(framer.push(b"ABCDEFGH\rOK1\r"), vec!["OK1"]);
    }

    #[test]
    fn line_at_limit_is_kept() {
        let mut framer = FrameAssembler::new(4);
        assert_eq!(framer.push(b"ABCD\r"), vec!["ABCD"]);
    }
}
