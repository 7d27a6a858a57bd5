//! Register map and the status register record.

use core::ops::Range;

use interface::tpm::{TpmAccess, TpmRegs, TpmStatus};

/// Register offsets are taken modulo the 4 KiB locality window.
pub const TPM_REG_WINDOW_MASK: u32 = 0x0FFF;

/// Returned for unmapped reads and FIFO reads with nothing to deliver.
pub const TPM_READ_SENTINEL: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Access,
    IntfCapability,
    Status,
    /// Every offset up to DID_VID aliases the FIFO so auto-incrementing
    /// multi-byte transfers keep hitting the same stream.
    DataFifo,
    DidVid,
    Rid,
}

const fn reg(r: TpmRegs) -> u32 {
    r as u32
}

const REGISTER_MAP: [(Range<u32>, Register); 6] = [
    (reg(TpmRegs::TPM_ACCESS)..reg(TpmRegs::TPM_ACCESS) + 1, Register::Access),
    (reg(TpmRegs::TPM_INTF_CAPABILITY)..reg(TpmRegs::TPM_INTF_CAPABILITY) + 4, Register::IntfCapability),
    (reg(TpmRegs::TPM_STS)..reg(TpmRegs::TPM_STS) + 4, Register::Status),
    (reg(TpmRegs::TPM_DATA_FIFO)..reg(TpmRegs::TPM_DID_VID), Register::DataFifo),
    (reg(TpmRegs::TPM_DID_VID)..reg(TpmRegs::TPM_DID_VID) + 4, Register::DidVid),
    (reg(TpmRegs::TPM_RID)..reg(TpmRegs::TPM_RID) + 1, Register::Rid),
];

impl Register {
    /// Maps a bus address to a register and the byte offset inside it.
    /// Locality bits above the window are ignored.
    pub fn lookup(addr: u32) -> Option<(Register, usize)> {
        let offset = addr & TPM_REG_WINDOW_MASK;
        REGISTER_MAP
            .iter()
            .find(|(range, _)| range.contains(&offset))
            .map(|(range, reg)| (*reg, (offset - range.start) as usize))
    }
}

/// Byte `idx` of a little-endian register value.
pub fn reg_byte(val: u32, idx: usize) -> u8 {
    val.to_le_bytes()[idx]
}

/// The status register as named flags plus the advertised burst count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    pub valid: bool,
    pub command_ready: bool,
    pub go: bool,
    pub data_avail: bool,
    pub expect: bool,
    pub burst_count: u16,
}

impl Status {
    pub fn pack(&self) -> u32 {
        let mut sts = TpmStatus(0);
        sts.set_sts_valid(self.valid);
        sts.set_command_ready(self.command_ready);
        sts.set_tpm_go(self.go);
        sts.set_data_avail(self.data_avail);
        sts.set_expect(self.expect);
        sts.set_burst_count(self.burst_count);
        sts.0
    }

    pub fn unpack(raw: u32) -> Self {
        let sts = TpmStatus(raw);
        Self {
            valid: sts.sts_valid(),
            command_ready: sts.command_ready(),
            go: sts.tpm_go(),
            data_avail: sts.data_avail(),
            expect: sts.expect(),
            burst_count: sts.burst_count(),
        }
    }

    /// Decodes one byte written to the status register at `idx`.
    /// Only byte 0 carries request bits.
    pub fn written_byte(val: u8, idx: usize) -> Self {
        let mut raw = [0u8; 4];
        raw[idx] = val;
        Self::unpack(u32::from_le_bytes(raw))
    }
}

/// Access register of the single modelled locality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub valid: bool,
    pub active_locality: bool,
}

impl Access {
    pub fn pack(&self) -> u8 {
        let mut acc = TpmAccess(0);
        acc.set_tpm_reg_validsts(self.valid);
        acc.set_active_locality(self.active_locality);
        acc.0
    }
}
