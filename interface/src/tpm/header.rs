// TIS-over-SPI transaction header.
// Ref: TCG PC Client Platform TPM Profile (PTP), SPI hardware protocol.
//
// [R/W | len-1][0xD4][addr_hi][addr_lo]

use byteorder::{BigEndian, ByteOrder};

use crate::error::{ErrorKind, Result};

pub const SPI_HEADER_SIZE: usize = 4;

/// Byte 1 of every header. Part of the 24-bit TIS SPI address space
/// (0xD4_xxxx), never interpreted as register address.
pub const TPM_SPI_MARKER: u8 = 0xD4;

/// Largest data phase a single header can announce.
pub const MAX_SPI_FRAMESIZE: usize = 64;

/// Bit 0 of the byte shifted in alongside the last header byte. Clear means the
/// TPM inserts wait states before the data phase.
pub const SPI_WAIT_STATE_READY: u8 = 0x01;

bitfield! {
    struct HeaderByte0(u8);
    impl Debug;
    u8;
    read, set_read: 7;
    xfer_size, set_xfer_size: 5, 0;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpiHeader {
    pub read: bool,
    /// Data phase length in bytes, 1..=64.
    pub len: usize,
    pub addr: u16,
}

impl SpiHeader {
    pub fn new(read: bool, len: usize, addr: u16) -> Result<Self> {
        if len == 0 || len > MAX_SPI_FRAMESIZE {
            return Err(ErrorKind::InvalidInput);
        }
        Ok(Self { read, len, addr })
    }

    /// Decoding never fails: every 4-byte pattern is a header.
    pub fn decode(raw: &[u8; SPI_HEADER_SIZE]) -> Self {
        let byte0 = HeaderByte0(raw[0]);
        Self {
            read: byte0.read(),
            len: byte0.xfer_size() as usize + 1,
            addr: BigEndian::read_u16(&raw[2..4]),
        }
    }

    pub fn encode(&self) -> [u8; SPI_HEADER_SIZE] {
        let mut byte0 = HeaderByte0(0);
        byte0.set_read(self.read);
        byte0.set_xfer_size((self.len - 1) as u8);

        let mut raw = [byte0.0, TPM_SPI_MARKER, 0, 0];
        BigEndian::write_u16(&mut raw[2..4], self.addr);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_status_write() {
        let hdr = SpiHeader::decode(&[0x05, 0xD4, 0x00, 0x18]);
        assert_eq!(hdr, SpiHeader { read: false, len: 6, addr: 0x0018 });
    }

    #[test]
    fn decode_fifo_read_ignores_reserved_bit() {
        // bit 6 is reserved and must not leak into the length
        let hdr = SpiHeader::decode(&[0xFF, 0xD4, 0x0F, 0x00]);
        assert_eq!(hdr, SpiHeader { read: true, len: 64, addr: 0x0F00 });
    }

    #[test]
    fn header_decode_recovers_every_triple() {
        for &read in &[false, true] {
            for len in 1..=MAX_SPI_FRAMESIZE {
                for &addr in &[0x0000u16, 0x0018, 0x0024, 0x1F04, 0xFFFF] {
                    let hdr = SpiHeader::new(read, len, addr).unwrap();
                    let raw = hdr.encode();
                    assert_eq!(raw[1], TPM_SPI_MARKER);
                    assert_eq!(SpiHeader::decode(&raw), hdr);
                }
            }
        }
    }

    #[test]
    fn oversized_frames_are_rejected() {
        assert_eq!(SpiHeader::new(true, 0, 0x24), Err(ErrorKind::InvalidInput));
        assert_eq!(SpiHeader::new(true, 65, 0x24), Err(ErrorKind::InvalidInput));
    }
}
