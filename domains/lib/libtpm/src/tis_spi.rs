//! TIS register access over SPI: one transaction per register access, split
//! at the 64-byte frame limit.

use log::{trace, warn};

use interface::error::{ErrorKind, Result};
use interface::spi::{SpiBus, SpiFlags};
use interface::tpm::{
    SpiHeader, TpmDev, TpmRegs, MAX_SPI_FRAMESIZE, SPI_HEADER_SIZE, SPI_WAIT_STATE_READY,
    TPM_MAX_LOCALITY,
};

pub struct TisSpi<B> {
    bus: B,
    wait_state_polls: usize,
}

impl<B: SpiBus> TisSpi<B> {
    pub fn new(bus: B, wait_state_polls: usize) -> Self {
        Self { bus, wait_state_polls }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Sends the header with the select held and waits until the TPM flags
    /// the data phase as ready.
    fn start(&mut self, hdr: &SpiHeader) -> Result<()> {
        let mut wait = [0u8; SPI_HEADER_SIZE];
        self.bus
            .xfer(SPI_HEADER_SIZE * 8, Some(&hdr.encode()), Some(&mut wait), SpiFlags::BEGIN)?;
        if wait[SPI_HEADER_SIZE - 1] & SPI_WAIT_STATE_READY != 0 {
            return Ok(());
        }

        for polls in 1..=self.wait_state_polls {
            let mut rx = [0u8; 1];
            self.bus.xfer(8, None, Some(&mut rx), SpiFlags::empty())?;
            if rx[0] & SPI_WAIT_STATE_READY != 0 {
                trace!("tis_spi: ready after {} wait states", polls);
                return Ok(());
            }
        }

        warn!(
            "tis_spi: no ready after {} wait states at {:#06x}",
            self.wait_state_polls, hdr.addr
        );
        self.bus.xfer(0, None, None, SpiFlags::END)?;
        Err(ErrorKind::TimedOut)
    }

    fn addr(locality: u32, reg: TpmRegs) -> Result<u16> {
        if locality > TPM_MAX_LOCALITY {
            return Err(ErrorKind::InvalidInput);
        }
        Ok(reg.addr(locality))
    }
}

impl<B: SpiBus> TpmDev for TisSpi<B> {
    fn read_reg(&mut self, locality: u32, reg: TpmRegs, buf: &mut [u8]) -> Result<()> {
        let addr = Self::addr(locality, reg)?;
        for chunk in buf.chunks_mut(MAX_SPI_FRAMESIZE) {
            let hdr = SpiHeader::new(true, chunk.len(), addr)?;
            self.start(&hdr)?;
            self.bus.xfer(chunk.len() * 8, None, Some(chunk), SpiFlags::END)?;
        }
        Ok(())
    }

    fn write_reg(&mut self, locality: u32, reg: TpmRegs, buf: &[u8]) -> Result<()> {
        let addr = Self::addr(locality, reg)?;
        for chunk in buf.chunks(MAX_SPI_FRAMESIZE) {
            let hdr = SpiHeader::new(false, chunk.len(), addr)?;
            self.start(&hdr)?;
            self.bus.xfer(chunk.len() * 8, Some(chunk), None, SpiFlags::END)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use interface::spi::xfer_len;
    use tpm_device::{SpiPhase, TpmSpiDevice};

    /// Holds the data phase back for `waits` polls after every header.
    struct Stalling<B> {
        inner: B,
        waits: usize,
        pending: usize,
        pos: usize,
        polled: usize,
    }

    impl<B> Stalling<B> {
        fn new(inner: B, waits: usize) -> Self {
            Self { inner, waits, pending: 0, pos: 0, polled: 0 }
        }
    }

    impl<B: SpiBus> SpiBus for Stalling<B> {
        fn xfer(
            &mut self,
            bitlen: usize,
            dout: Option<&[u8]>,
            mut din: Option<&mut [u8]>,
            flags: SpiFlags,
        ) -> Result<()> {
            let len = xfer_len(bitlen, dout, din.as_deref())?;
            let mut begin = flags.contains(SpiFlags::BEGIN);
            if begin {
                self.pos = 0;
                self.pending = self.waits;
            }
            for i in 0..len {
                let rx = if self.pos == SPI_HEADER_SIZE && self.pending > 0 {
                    self.pending -= 1;
                    self.polled += 1;
                    if self.pending == 0 { SPI_WAIT_STATE_READY } else { 0x00 }
                } else {
                    let tx = dout.map_or(0, |d| d[i]);
                    let mut b = [0u8; 1];
                    let f = if begin { SpiFlags::BEGIN } else { SpiFlags::empty() };
                    begin = false;
                    self.inner.xfer(8, Some(&[tx]), Some(&mut b), f)?;
                    self.pos += 1;
                    if self.pos == SPI_HEADER_SIZE && self.pending > 0 { 0x00 } else { b[0] }
                };
                if let Some(d) = din.as_mut() {
                    d[i] = rx;
                }
            }
            if flags.contains(SpiFlags::END) {
                self.inner.xfer(0, None, None, SpiFlags::END)?;
            }
            Ok(())
        }
    }

    #[test]
    fn reads_identity_without_wait_states() {
        let mut tis = TisSpi::new(TpmSpiDevice::default(), 5);
        assert_eq!(tis.read_u32(0, TpmRegs::TPM_DID_VID), Ok(0x001D_15D1));
        assert_eq!(tis.read_u8(0, TpmRegs::TPM_RID), Ok(0x36));
        assert_eq!(tis.bus().phase(), SpiPhase::Idle);
    }

    #[test]
    fn polls_through_wait_states() {
        let mut tis = TisSpi::new(Stalling::new(TpmSpiDevice::default(), 3), 5);
        assert_eq!(tis.read_u8(0, TpmRegs::TPM_RID), Ok(0x36));
        assert_eq!(tis.bus().polled, 3);
    }

    #[test]
    fn gives_up_and_releases_the_select() {
        let mut tis = TisSpi::new(Stalling::new(TpmSpiDevice::default(), 100), 5);
        assert_eq!(tis.read_u8(0, TpmRegs::TPM_RID), Err(ErrorKind::TimedOut));
        assert_eq!(tis.bus().polled, 5);
        assert_eq!(tis.bus().inner.phase(), SpiPhase::Idle);
    }

    #[test]
    fn long_fifo_writes_are_split() {
        let mut tis = TisSpi::new(TpmSpiDevice::default(), 5);
        let mut cmd: Vec<u8> = (0..150u32).map(|i| i as u8).collect();
        cmd[..6].copy_from_slice(&[0x80, 0x01, 0x00, 0x00, 0x00, 150]);
        tis.write_reg(0, TpmRegs::TPM_DATA_FIFO, &cmd).unwrap();
        assert_eq!(tis.bus().command(), &cmd[..]);
    }

    #[test]
    fn locality_out_of_range() {
        let mut tis = TisSpi::new(TpmSpiDevice::default(), 5);
        assert_eq!(tis.read_u8(5, TpmRegs::TPM_ACCESS), Err(ErrorKind::InvalidInput));
    }
}
