// BCM2835/BCM2711 SPI0 and GPIO register definitions
// Derived from the BCM2711 ARM Peripherals datasheet, chapter 9 (SPI)

use core::ptr;

pub const SPI0_BASE: usize = 0xFE20_4000;
pub const GPIO_BASE: usize = 0xFE20_0000;

/// Depth of the TX and RX FIFOs.
pub const SPI_FIFO_DEPTH: usize = 64;

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpiRegs {
    SPI_CS = 0x00,
    SPI_FIFO = 0x04,
    SPI_CLK = 0x08,
    SPI_DLEN = 0x0C,
    SPI_LTOH = 0x10,
    SPI_DC = 0x14,
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GpioRegs {
    GPSET0 = 0x1C,
    GPCLR0 = 0x28,
}

bitflags! {
    /// SPI_CS control and status bits.
    pub struct CsFlags: u32 {
        const CS_01 = 1 << 0;
        const CS_10 = 1 << 1;
        const CPHA = 1 << 2;
        const CPOL = 1 << 3;
        const CLEAR_TX = 1 << 4;
        const CLEAR_RX = 1 << 5;
        const CSPOL = 1 << 6;
        const TA = 1 << 7;
        const DMAEN = 1 << 8;
        const INTD = 1 << 9;
        const INTR = 1 << 10;
        const ADCS = 1 << 11;
        const REN = 1 << 12;
        const LEN = 1 << 13;
        const DONE = 1 << 16;
        const RXD = 1 << 17;
        const TXD = 1 << 18;
        const RXR = 1 << 19;
        const RXF = 1 << 20;
        const CSPOL0 = 1 << 21;
        const CSPOL1 = 1 << 22;
        const CSPOL2 = 1 << 23;
        const DMA_LEN = 1 << 24;
        const LEN_LONG = 1 << 25;
    }
}

bitflags! {
    pub struct SpiMode: u8 {
        const CPHA = 1 << 0;
        const CPOL = 1 << 1;
        const MODE_0 = 0;
        const MODE_1 = Self::CPHA.bits;
        const MODE_2 = Self::CPOL.bits;
        const MODE_3 = Self::CPOL.bits | Self::CPHA.bits;
    }
}

impl SpiMode {
    /// Clock polarity/phase bits of SPI_CS for this mode.
    pub fn cs_bits(self) -> CsFlags {
        let mut cs = CsFlags::empty();
        cs.set(CsFlags::CPOL, self.contains(SpiMode::CPOL));
        cs.set(CsFlags::CPHA, self.contains(SpiMode::CPHA));
        cs
    }
}

/// 32-bit access to the controller's register block.
pub trait SpiRegisters {
    fn read(&mut self, reg: SpiRegs) -> u32;

    fn write(&mut self, reg: SpiRegs, val: u32);
}

impl<R: SpiRegisters + ?Sized> SpiRegisters for &mut R {
    fn read(&mut self, reg: SpiRegs) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: SpiRegs, val: u32) {
        (**self).write(reg, val)
    }
}

pub struct MmioSpiRegisters {
    base: usize,
}

impl MmioSpiRegisters {
    /// # Safety
    ///
    /// `base` must be the mapped address of an SPI register block that nothing
    /// else accesses for the lifetime of the returned value.
    pub unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl SpiRegisters for MmioSpiRegisters {
    #[inline(always)]
    fn read(&mut self, reg: SpiRegs) -> u32 {
        unsafe { ptr::read_volatile((self.base + reg as usize) as *const u32) }
    }

    #[inline(always)]
    fn write(&mut self, reg: SpiRegs, val: u32) {
        unsafe { ptr::write_volatile((self.base + reg as usize) as *mut u32, val) }
    }
}

/// The select line of one slave.
pub trait ChipSelect {
    fn assert(&mut self);

    fn deassert(&mut self);
}

impl<C: ChipSelect + ?Sized> ChipSelect for &mut C {
    fn assert(&mut self) {
        (**self).assert()
    }

    fn deassert(&mut self) {
        (**self).deassert()
    }
}

/// Software chip select on an active-low GPIO output. The hardware CS lines
/// are left unused so the select can be held across transfers.
pub struct GpioChipSelect {
    base: usize,
    pin: u32,
}

impl GpioChipSelect {
    /// CE0 is GPIO8, CE1 is GPIO7.
    pub fn pin_for(cs: u8) -> u32 {
        if cs == 0 {
            8
        } else {
            7
        }
    }

    /// # Safety
    ///
    /// `base` must be the mapped GPIO register block and `pin` must already be
    /// configured as an output.
    pub unsafe fn new(base: usize, pin: u32) -> Self {
        Self { base, pin }
    }

    #[inline(always)]
    fn write(&mut self, reg: GpioRegs, val: u32) {
        unsafe { ptr::write_volatile((self.base + reg as usize) as *mut u32, val) }
    }
}

impl ChipSelect for GpioChipSelect {
    fn assert(&mut self) {
        self.write(GpioRegs::GPCLR0, 1 << self.pin);
    }

    fn deassert(&mut self) {
        self.write(GpioRegs::GPSET0, 1 << self.pin);
    }
}
