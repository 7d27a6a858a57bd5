//! BCM2835/BCM2711 SPI master with a software chip select.
#![no_std]

extern crate alloc;
#[macro_use]
extern crate bitflags;

mod regs;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

use log::{debug, error, trace};

use interface::error::{ErrorKind, Result};
use interface::spi::{xfer_len, SpiBus, SpiFlags};
use libtime::{poll_with_budget, Delay};

pub use regs::*;

pub const SPI_DEFAULT_CLK_HZ: u32 = 250_000_000;
pub const SPI_DEFAULT_SPEED_HZ: u32 = 1_000_000;

/// Dividers at or above this wrap to 0, the slowest setting (clk/65536).
const SPI_CDIV_LIMIT: u32 = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfig {
    /// Core clock feeding the divider.
    pub clk_hz: u32,
    pub speed_hz: u32,
    pub mode: SpiMode,
    /// Settle time after asserting the select and after clearing the FIFOs.
    pub cs_setup_ns: u64,
    /// Status polls allowed while shifting the bytes of one transfer.
    pub xfer_poll_budget: usize,
    /// Status polls (1us apart) allowed while waiting for DONE.
    pub done_poll_budget: usize,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            clk_hz: SPI_DEFAULT_CLK_HZ,
            speed_hz: SPI_DEFAULT_SPEED_HZ,
            mode: SpiMode::MODE_0,
            cs_setup_ns: 1_000,
            xfer_poll_budget: 100_000,
            done_poll_budget: 10_000,
        }
    }
}

/// Even divider of `clk_hz` closest to (not faster than) `speed_hz`.
pub fn clock_divider(clk_hz: u32, speed_hz: u32) -> u32 {
    let speed = if speed_hz == 0 { SPI_DEFAULT_SPEED_HZ } else { speed_hz };
    if speed >= clk_hz / 2 {
        return 2;
    }
    let mut cdiv = ((clk_hz as u64 + speed as u64 - 1) / speed as u64) as u32;
    cdiv += cdiv & 1;
    if cdiv >= SPI_CDIV_LIMIT {
        0
    } else {
        cdiv
    }
}

pub struct Bcm2835Spi<R, C, D> {
    regs: R,
    cs: C,
    delay: D,
    config: SpiConfig,
    /// SPI_CS without the transient TA/CLEAR bits.
    control: CsFlags,
    cs_asserted: bool,
}

impl<R: SpiRegisters, C: ChipSelect, D: Delay> Bcm2835Spi<R, C, D> {
    pub fn new(regs: R, cs: C, delay: D, config: SpiConfig) -> Self {
        let mut spi = Self {
            regs,
            cs,
            delay,
            config,
            control: CsFlags::empty(),
            cs_asserted: false,
        };
        spi.cs.deassert();
        spi.reset();
        spi.set_speed(config.speed_hz);
        spi.set_mode(config.mode);
        spi
    }

    /// Clears both FIFOs and drops TA.
    pub fn reset(&mut self) {
        self.regs
            .write(SpiRegs::SPI_CS, (CsFlags::CLEAR_RX | CsFlags::CLEAR_TX).bits());
    }

    pub fn set_speed(&mut self, speed_hz: u32) -> u32 {
        let speed = if speed_hz == 0 { SPI_DEFAULT_SPEED_HZ } else { speed_hz };
        let cdiv = clock_divider(self.config.clk_hz, speed);
        self.config.speed_hz = speed;
        self.regs.write(SpiRegs::SPI_CLK, cdiv);
        debug!("spi: speed {} Hz, cdiv {}", speed, cdiv);
        cdiv
    }

    pub fn set_mode(&mut self, mode: SpiMode) {
        self.config.mode = mode;
        self.control = mode.cs_bits();
        debug!("spi: mode {:?}, cs {:#x}", mode, self.control.bits());
    }

    pub fn cs_asserted(&self) -> bool {
        self.cs_asserted
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    fn assert_cs(&mut self) {
        self.cs.assert();
        self.cs_asserted = true;
    }

    fn deassert_cs(&mut self) {
        self.cs.deassert();
        self.cs_asserted = false;
    }

    fn status(&mut self) -> CsFlags {
        CsFlags::from_bits_truncate(self.regs.read(SpiRegs::SPI_CS))
    }

    /// Drops TA and releases the bus after a poll ran out.
    fn abort(&mut self, ctrl: CsFlags, what: &str, tx: usize, rx: usize, len: usize) -> ErrorKind {
        self.regs.write(SpiRegs::SPI_CS, ctrl.bits());
        self.deassert_cs();
        error!(
            "spi: timed out waiting for {} (tx {}/{}, rx {}/{})",
            what, tx, len, rx, len
        );
        ErrorKind::TimedOut
    }
}

impl<R: SpiRegisters, C: ChipSelect, D: Delay> SpiBus for Bcm2835Spi<R, C, D> {
    fn xfer(
        &mut self,
        bitlen: usize,
        dout: Option<&[u8]>,
        mut din: Option<&mut [u8]>,
        flags: SpiFlags,
    ) -> Result<()> {
        if bitlen == 0 {
            if flags.contains(SpiFlags::END) {
                self.deassert_cs();
                trace!("spi: deassert only");
            }
            return Ok(());
        }
        let len = xfer_len(bitlen, dout, din.as_deref())?;
        trace!("spi: xfer {} bytes {:?}", len, flags);

        // the select is a GPIO, keep the hardware CS lines out of it
        let ctrl = self.control - (CsFlags::CS_10 | CsFlags::CS_01);

        if flags.contains(SpiFlags::BEGIN) {
            self.assert_cs();
            self.delay.delay_ns(self.config.cs_setup_ns);
            self.regs.write(
                SpiRegs::SPI_CS,
                (ctrl | CsFlags::CLEAR_RX | CsFlags::CLEAR_TX).bits(),
            );
            self.delay.delay_ns(self.config.cs_setup_ns);
        }

        self.regs.write(SpiRegs::SPI_CS, (ctrl | CsFlags::TA).bits());

        let mut tx_count = 0;
        let mut rx_count = 0;
        let regs = &mut self.regs;
        let rx_buf = &mut din;
        let shifted = poll_with_budget(self.config.xfer_poll_budget, || {
            let mut sts = CsFlags::from_bits_truncate(regs.read(SpiRegs::SPI_CS));

            while sts.contains(CsFlags::TXD) && tx_count < len {
                let byte = dout.map_or(0, |d| d[tx_count]);
                regs.write(SpiRegs::SPI_FIFO, byte as u32);
                tx_count += 1;
                sts = CsFlags::from_bits_truncate(regs.read(SpiRegs::SPI_CS));
            }

            while sts.contains(CsFlags::RXD) && rx_count < len {
                let byte = regs.read(SpiRegs::SPI_FIFO) as u8;
                if let Some(d) = rx_buf.as_mut() {
                    d[rx_count] = byte;
                }
                rx_count += 1;
                sts = CsFlags::from_bits_truncate(regs.read(SpiRegs::SPI_CS));
            }

            if tx_count >= len && rx_count >= len {
                Some(())
            } else {
                None
            }
        });
        if !shifted.is_ready() {
            return Err(self.abort(ctrl, "FIFO", tx_count, rx_count, len));
        }

        let regs = &mut self.regs;
        let delay = &mut self.delay;
        let done = poll_with_budget(self.config.done_poll_budget, || {
            if CsFlags::from_bits_truncate(regs.read(SpiRegs::SPI_CS)).contains(CsFlags::DONE) {
                Some(())
            } else {
                delay.delay_us(1);
                None
            }
        });
        if !done.is_ready() {
            return Err(self.abort(ctrl, "DONE", tx_count, rx_count, len));
        }

        // residual bytes beyond what the caller asked for are discarded
        for _ in 0..SPI_FIFO_DEPTH {
            if !self.status().contains(CsFlags::RXD) {
                break;
            }
            let byte = self.regs.read(SpiRegs::SPI_FIFO) as u8;
            if rx_count < len {
                if let Some(d) = din.as_mut() {
                    d[rx_count] = byte;
                }
                rx_count += 1;
            }
        }

        self.regs.write(SpiRegs::SPI_CS, ctrl.bits());

        if flags.contains(SpiFlags::END) {
            self.deassert_cs();
        } else {
            self.cs_asserted = true;
        }
        Ok(())
    }
}
