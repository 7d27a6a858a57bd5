mod header;
mod regs;

pub use header::*;
pub use regs::*;

use crate::error::Result;

/// TIS register offsets within one locality's 4 KiB window.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TpmRegs {
    TPM_ACCESS = 0x0000,
    TPM_INT_ENABLE = 0x0008,
    TPM_INT_VECTOR = 0x000C,
    TPM_INT_STATS = 0x0010,
    TPM_INTF_CAPABILITY = 0x0014,
    TPM_STS = 0x0018,
    TPM_DATA_FIFO = 0x0024,
    TPM_xDATA_FIFO = 0x0083,
    TPM_DID_VID = 0x0F00,
    TPM_RID = 0x0F04,
}

/// Locality stride in the TIS address space.
pub const TPM_LOCALITY_STRIDE: u16 = 0x1000;

/// Maximum locality the TIS address map encodes.
pub const TPM_MAX_LOCALITY: u32 = 4;

impl TpmRegs {
    /// Offset of this register inside `locality`'s window.
    pub fn addr(self, locality: u32) -> u16 {
        (locality as u16) * TPM_LOCALITY_STRIDE + self as u16
    }
}

// Driver -> TPM interface
pub trait TpmDev {
    fn read_reg(&mut self, locality: u32, reg: TpmRegs, buf: &mut [u8]) -> Result<()>;

    fn write_reg(&mut self, locality: u32, reg: TpmRegs, buf: &[u8]) -> Result<()>;

    fn read_u8(&mut self, locality: u32, reg: TpmRegs) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_reg(locality, reg, &mut buf)?;
        Ok(buf[0])
    }

    fn write_u8(&mut self, locality: u32, reg: TpmRegs, val: u8) -> Result<()> {
        self.write_reg(locality, reg, &[val])
    }

    /// TIS registers are little-endian on the wire.
    fn read_u32(&mut self, locality: u32, reg: TpmRegs) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_reg(locality, reg, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u32(&mut self, locality: u32, reg: TpmRegs, val: u32) -> Result<()> {
        self.write_reg(locality, reg, &val.to_le_bytes())
    }
}
