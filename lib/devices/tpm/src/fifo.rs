//! Command and response buffers behind the data FIFO.

use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};
use log::warn;

/// tag(2) + commandSize(4); the size field is known once this many bytes arrived.
pub const TPM_CMD_SIZE_END: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// Stored, declared length not reached (or not known yet).
    Pending,
    /// Stored, and the buffer now holds the declared length.
    Complete,
    /// Buffer full; byte discarded.
    Dropped,
}

pub struct CommandBuffer {
    buf: Vec<u8>,
    capacity: usize,
    declared_len: Option<u32>,
    overflowed: bool,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            declared_len: None,
            overflowed: false,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.declared_len = None;
        self.overflowed = false;
    }

    pub fn append(&mut self, byte: u8) -> Append {
        if self.buf.len() >= self.capacity {
            if !self.overflowed {
                warn!("tpm: command exceeds {} bytes, dropping the rest", self.capacity);
                self.overflowed = true;
            }
            return Append::Dropped;
        }
        self.buf.push(byte);

        if self.buf.len() >= TPM_CMD_SIZE_END {
            let declared = BigEndian::read_u32(&self.buf[2..TPM_CMD_SIZE_END]);
            self.declared_len = Some(declared);
        }

        if self.is_complete() {
            Append::Complete
        } else {
            Append::Pending
        }
    }

    /// Declared length is known and has been reached.
    pub fn is_complete(&self) -> bool {
        match self.declared_len {
            Some(declared) => self.buf.len() as u64 >= declared as u64,
            None => false,
        }
    }

    pub fn declared_len(&self) -> Option<u32> {
        self.declared_len
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

pub struct ResponseBuffer {
    buf: Vec<u8>,
    capacity: usize,
    cursor: usize,
}

impl ResponseBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    /// Replaces the contents with whatever `fill` produces, truncated to capacity.
    pub fn load<F: FnOnce(&mut Vec<u8>)>(&mut self, fill: F) {
        self.clear();
        fill(&mut self.buf);
        if self.buf.len() > self.capacity {
            warn!(
                "tpm: response of {} bytes truncated to {}",
                self.buf.len(),
                self.capacity
            );
            self.buf.truncate(self.capacity);
        }
    }

    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = *self.buf.get(self.cursor)?;
        self.cursor += 1;
        Some(byte)
    }

    pub fn is_drained(&self) -> bool {
        self.cursor >= self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(cmd: &mut CommandBuffer, bytes: &[u8]) -> Append {
        let mut last = Append::Pending;
        for &b in bytes {
            last = cmd.append(b);
        }
        last
    }

    #[test]
    fn length_unknown_until_six_bytes() {
        let mut cmd = CommandBuffer::new(64);
        assert_eq!(fill(&mut cmd, &[0x80, 0x01, 0x00, 0x00, 0x00]), Append::Pending);
        assert_eq!(cmd.declared_len(), None);
        assert_eq!(cmd.append(0x0C), Append::Pending);
        assert_eq!(cmd.declared_len(), Some(12));
    }

    #[test]
    fn complete_exactly_at_declared_length() {
        let mut cmd = CommandBuffer::new(64);
        let command = [0x80, 0x01, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x01, 0x44];
        assert_eq!(fill(&mut cmd, &command[..9]), Append::Pending);
        assert!(!cmd.is_complete());
        assert_eq!(cmd.append(command[9]), Append::Complete);
        assert_eq!(cmd.as_slice(), &command[..]);
    }

    #[test]
    fn overflow_drops_without_corrupting() {
        let mut cmd = CommandBuffer::new(8);
        // declares 0x100 bytes, far beyond capacity
        fill(&mut cmd, &[0x80, 0x01, 0x00, 0x00, 0x01, 0x00, 0xAA, 0xBB]);
        assert_eq!(cmd.append(0xCC), Append::Dropped);
        assert_eq!(cmd.append(0xDD), Append::Dropped);
        assert_eq!(cmd.len(), 8);
        assert_eq!(cmd.as_slice()[7], 0xBB);
        assert!(!cmd.is_complete());
    }

    #[test]
    fn response_cursor_stops_at_end() {
        let mut rsp = ResponseBuffer::new(16);
        rsp.load(|buf| buf.extend_from_slice(&[1, 2, 3]));
        assert_eq!(rsp.next_byte(), Some(1));
        assert_eq!(rsp.remaining(), 2);
        assert_eq!(rsp.next_byte(), Some(2));
        assert_eq!(rsp.next_byte(), Some(3));
        assert!(rsp.is_drained());
        assert_eq!(rsp.next_byte(), None);
        assert_eq!(rsp.remaining(), 0);
    }

    #[test]
    fn response_truncated_to_capacity() {
        let mut rsp = ResponseBuffer::new(4);
        rsp.load(|buf| buf.extend_from_slice(&[9; 10]));
        assert_eq!(rsp.len(), 4);
    }
}
