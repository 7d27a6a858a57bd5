//! Register-level model of the controller for host-side testing.
//!
//! Bytes written to the FIFO while a transfer is active are shifted through
//! the attached slave at once; the slave sees `BEGIN` on the first byte after
//! the select line goes low and an `END`-only transfer when it goes high.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use core::cell::RefCell;
use log::trace;

use interface::spi::{SpiBus, SpiFlags};

use crate::regs::{ChipSelect, CsFlags, SpiRegisters, SpiRegs, SPI_FIFO_DEPTH};

/// Floating MISO reads as all ones.
const SIM_MISO_IDLE: u8 = 0xFF;

/// Where a stalled controller stops making progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    Never,
    /// TXD never sets, so nothing gets shifted.
    Shift,
    /// Bytes shift but DONE never sets.
    Done,
}

struct SimBus<S> {
    slave: S,
    control: CsFlags,
    clk: u32,
    rx: VecDeque<u8>,
    selected: bool,
    pending_begin: bool,
    stall: Stall,
    shifted: usize,
}

impl<S: SpiBus> SimBus<S> {
    fn status(&self) -> CsFlags {
        let mut sts = self.control;
        let active = sts.contains(CsFlags::TA);
        sts.set(
            CsFlags::TXD,
            active && self.stall != Stall::Shift && self.rx.len() < SPI_FIFO_DEPTH,
        );
        sts.set(CsFlags::RXD, !self.rx.is_empty());
        sts.set(CsFlags::DONE, active && self.stall == Stall::Never);
        sts
    }

    fn shift(&mut self, tx: u8) {
        if !self.control.contains(CsFlags::TA) {
            trace!("sim: FIFO write {:#04x} with TA clear dropped", tx);
            return;
        }
        let mut rx = [SIM_MISO_IDLE];
        if self.selected {
            let flags = if self.pending_begin {
                SpiFlags::BEGIN
            } else {
                SpiFlags::empty()
            };
            self.pending_begin = false;
            if self.slave.xfer(8, Some(&[tx]), Some(&mut rx), flags).is_err() {
                rx[0] = SIM_MISO_IDLE;
            }
        }
        self.shifted += 1;
        self.rx.push_back(rx[0]);
    }
}

/// Register block side of a simulated bus.
pub struct SimController<S>(Rc<RefCell<SimBus<S>>>);

/// Select line side of a simulated bus.
pub struct SimChipSelect<S>(Rc<RefCell<SimBus<S>>>);

/// A controller and its chip select, both wired to `slave`.
pub fn bus<S: SpiBus>(slave: S) -> (SimController<S>, SimChipSelect<S>) {
    let shared = Rc::new(RefCell::new(SimBus {
        slave,
        control: CsFlags::empty(),
        clk: 0,
        rx: VecDeque::new(),
        selected: false,
        pending_begin: false,
        stall: Stall::Never,
        shifted: 0,
    }));
    (SimController(shared.clone()), SimChipSelect(shared))
}

impl<S> Clone for SimController<S> {
    fn clone(&self) -> Self {
        SimController(self.0.clone())
    }
}

impl<S: SpiBus> SimController<S> {
    pub fn set_stall(&self, stall: Stall) {
        self.0.borrow_mut().stall = stall;
    }

    pub fn selected(&self) -> bool {
        self.0.borrow().selected
    }

    /// Last value written to the clock divider register.
    pub fn clock_divider(&self) -> u32 {
        self.0.borrow().clk
    }

    /// SPI_CS as last written, without status bits.
    pub fn control(&self) -> CsFlags {
        self.0.borrow().control
    }

    /// Bytes shifted since the bus was created.
    pub fn shifted(&self) -> usize {
        self.0.borrow().shifted
    }

    pub fn with_slave<T, F: FnOnce(&mut S) -> T>(&self, f: F) -> T {
        f(&mut self.0.borrow_mut().slave)
    }
}

impl<S: SpiBus> SpiRegisters for SimController<S> {
    fn read(&mut self, reg: SpiRegs) -> u32 {
        let mut bus = self.0.borrow_mut();
        match reg {
            SpiRegs::SPI_CS => bus.status().bits(),
            SpiRegs::SPI_FIFO => bus.rx.pop_front().unwrap_or(0) as u32,
            SpiRegs::SPI_CLK => bus.clk,
            _ => 0,
        }
    }

    fn write(&mut self, reg: SpiRegs, val: u32) {
        let mut bus = self.0.borrow_mut();
        match reg {
            SpiRegs::SPI_CS => {
                let req = CsFlags::from_bits_truncate(val);
                if req.contains(CsFlags::CLEAR_RX) {
                    bus.rx.clear();
                }
                // status bits are read-only
                bus.control = req
                    - (CsFlags::CLEAR_RX | CsFlags::CLEAR_TX)
                    - (CsFlags::DONE | CsFlags::RXD | CsFlags::TXD | CsFlags::RXR | CsFlags::RXF);
            }
            SpiRegs::SPI_FIFO => bus.shift(val as u8),
            SpiRegs::SPI_CLK => bus.clk = val,
            _ => {}
        }
    }
}

impl<S: SpiBus> ChipSelect for SimChipSelect<S> {
    fn assert(&mut self) {
        let mut bus = self.0.borrow_mut();
        bus.selected = true;
        bus.pending_begin = true;
    }

    fn deassert(&mut self) {
        let mut bus = self.0.borrow_mut();
        if bus.selected && !bus.pending_begin {
            if let Err(e) = bus.slave.xfer(0, None, None, SpiFlags::END) {
                trace!("sim: slave rejected deassert: {}", e);
            }
        }
        bus.selected = false;
        bus.pending_begin = false;
    }
}
