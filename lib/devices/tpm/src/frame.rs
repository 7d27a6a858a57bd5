//! Per-byte framing of TPM SPI transactions.

use log::{debug, trace};

use interface::tpm::{SpiHeader, SPI_HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiPhase {
    /// Chip select deasserted.
    Idle,
    /// Collecting the 4 header bytes.
    Header,
    /// Header decoded; every further byte is data.
    Data(SpiHeader),
}

/// What the device must do with one shifted-in byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Outside a transaction.
    Idle,
    /// Header byte 0..=2 accepted.
    Header,
    /// Last header byte; the device signals it is ready for the data phase.
    Ready(SpiHeader),
    Read(u32),
    Write(u32, u8),
}

pub struct FrameParser {
    phase: SpiPhase,
    header: [u8; SPI_HEADER_SIZE],
    header_pos: usize,
    data_pos: u32,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            phase: SpiPhase::Idle,
            header: [0; SPI_HEADER_SIZE],
            header_pos: 0,
            data_pos: 0,
        }
    }

    /// Chip select asserted. Anything buffered from an unfinished
    /// transaction is discarded.
    pub fn begin(&mut self) {
        if self.phase != SpiPhase::Idle {
            trace!("spi: restart in {:?}", self.phase);
        }
        self.phase = SpiPhase::Header;
        self.header_pos = 0;
        self.data_pos = 0;
    }

    /// Chip select deasserted.
    pub fn end(&mut self) {
        if self.phase == SpiPhase::Header && self.header_pos > 0 {
            debug!("spi: dropping partial header ({} bytes)", self.header_pos);
        }
        self.phase = SpiPhase::Idle;
        self.header_pos = 0;
        self.data_pos = 0;
    }

    pub fn shift(&mut self, tx: u8) -> Route {
        match self.phase {
            SpiPhase::Idle => Route::Idle,
            SpiPhase::Header => {
                self.header[self.header_pos] = tx;
                self.header_pos += 1;
                if self.header_pos < SPI_HEADER_SIZE {
                    return Route::Header;
                }
                let hdr = SpiHeader::decode(&self.header);
                trace!(
                    "spi: {} {} bytes at {:#06x}",
                    if hdr.read { "read" } else { "write" },
                    hdr.len,
                    hdr.addr
                );
                self.phase = SpiPhase::Data(hdr);
                self.data_pos = 0;
                Route::Ready(hdr)
            }
            SpiPhase::Data(hdr) => {
                // the address auto-increments; the register file decides
                // what each offset aliases to
                let addr = hdr.addr as u32 + self.data_pos;
                self.data_pos += 1;
                if hdr.read {
                    Route::Read(addr)
                } else {
                    Route::Write(addr, tx)
                }
            }
        }
    }

    pub fn phase(&self) -> SpiPhase {
        self.phase
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_outside_a_transaction_are_idle() {
        let mut p = FrameParser::new();
        assert_eq!(p.shift(0x80), Route::Idle);
        assert_eq!(p.phase(), SpiPhase::Idle);
    }

    #[test]
    fn header_then_write_data() {
        let mut p = FrameParser::new();
        p.begin();
        assert_eq!(p.shift(0x01), Route::Header);
        assert_eq!(p.shift(0xD4), Route::Header);
        assert_eq!(p.shift(0x00), Route::Header);
        let hdr = SpiHeader { read: false, len: 2, addr: 0x0024 };
        assert_eq!(p.shift(0x24), Route::Ready(hdr));
        assert_eq!(p.phase(), SpiPhase::Data(hdr));
        assert_eq!(p.shift(0xAA), Route::Write(0x24, 0xAA));
        assert_eq!(p.shift(0xBB), Route::Write(0x25, 0xBB));
    }

    #[test]
    fn read_addresses_auto_increment() {
        let mut p = FrameParser::new();
        p.begin();
        for &b in &[0x83, 0xD4, 0x0F, 0x00] {
            p.shift(b);
        }
        let routes: [Route; 4] = [p.shift(0), p.shift(0), p.shift(0), p.shift(0)];
        assert_eq!(
            routes,
            [
                Route::Read(0x0F00),
                Route::Read(0x0F01),
                Route::Read(0x0F02),
                Route::Read(0x0F03)
            ]
        );
    }

    #[test]
    fn end_discards_partial_header() {
        let mut p = FrameParser::new();
        p.begin();
        p.shift(0x80);
        p.shift(0xD4);
        p.end();
        assert_eq!(p.phase(), SpiPhase::Idle);
        assert_eq!(p.shift(0x00), Route::Idle);

        p.begin();
        assert_eq!(p.shift(0x80), Route::Header);
        assert_eq!(p.shift(0xD4), Route::Header);
        assert_eq!(p.shift(0x00), Route::Header);
        assert!(matches!(p.shift(0x18), Route::Ready(_)));
    }

    #[test]
    fn begin_restarts_mid_data() {
        let mut p = FrameParser::new();
        p.begin();
        for &b in &[0x00, 0xD4, 0x00, 0x18, 0x40] {
            p.shift(b);
        }
        p.begin();
        assert_eq!(p.phase(), SpiPhase::Header);
        assert_eq!(p.shift(0x00), Route::Header);
    }
}
