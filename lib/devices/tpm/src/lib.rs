//! Device side of a TPM behind a TIS-over-SPI link: frames bus bytes into
//! register accesses and runs the TIS command/response handshake.
#![no_std]

extern crate alloc;

mod fifo;
mod frame;
mod regs;
mod tis;

use alloc::vec::Vec;
use log::{debug, trace};

use interface::error::Result;
use interface::spi::{xfer_len, SpiBus, SpiFlags};
use interface::tpm::{TpmIntfCap, SPI_WAIT_STATE_READY};

pub use fifo::{Append, CommandBuffer, ResponseBuffer, TPM_CMD_SIZE_END};
pub use frame::{FrameParser, Route, SpiPhase};
pub use regs::{Access, Register, Status, TPM_READ_SENTINEL, TPM_REG_WINDOW_MASK};
pub use tis::{CommandHandler, Tis, TisState};

pub const TPM_DID_VID_VALUE: u32 = 0x001D_15D1;
pub const TPM_RID_VALUE: u8 = 0x36;
pub const TPM_INTF_CAPS_VALUE: u32 = 0x3000_0697;
pub const TPM_BURST_COUNT: u16 = 64;
pub const TPM_BUFFER_SIZE: usize = 4096;

/// Returned on MISO while the header is still being shifted in.
const TPM_HEADER_FILL: u8 = 0x00;

/// TPM_ST_NO_SESSIONS, size 10, TPM_RC_SUCCESS.
pub const TPM_SUCCESS_RESPONSE: [u8; 10] = [0x80, 0x01, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmSpiConfig {
    pub did_vid: u32,
    pub rid: u8,
    pub intf_caps: u32,
    pub burst_count: u16,
    pub cmd_capacity: usize,
    pub rsp_capacity: usize,
}

impl Default for TpmSpiConfig {
    fn default() -> Self {
        Self {
            did_vid: TPM_DID_VID_VALUE,
            rid: TPM_RID_VALUE,
            intf_caps: TPM_INTF_CAPS_VALUE,
            burst_count: TPM_BURST_COUNT,
            cmd_capacity: TPM_BUFFER_SIZE,
            rsp_capacity: TPM_BUFFER_SIZE,
        }
    }
}

impl TpmSpiConfig {
    pub fn caps(&self) -> TpmIntfCap {
        TpmIntfCap(self.intf_caps)
    }
}

/// Answers every command with a bare success header.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticResponder;

impl CommandHandler for StaticResponder {
    fn execute(&mut self, _command: &[u8], response: &mut Vec<u8>) {
        response.extend_from_slice(&TPM_SUCCESS_RESPONSE);
    }
}

pub struct TpmSpiDevice<H = StaticResponder> {
    frame: FrameParser,
    tis: Tis<H>,
}

impl<H: CommandHandler> TpmSpiDevice<H> {
    pub fn new(config: TpmSpiConfig, handler: H) -> Self {
        let mut tis = Tis::new(&config, handler);
        tis.probe();
        let caps = config.caps();
        debug!(
            "tpm: probed did_vid {:#010x} rid {:#04x} burst {} iface v{} xfer size {}",
            config.did_vid,
            config.rid,
            config.burst_count,
            caps.iface_ver(),
            caps.data_xfer_size()
        );
        Self {
            frame: FrameParser::new(),
            tis,
        }
    }

    /// Back to power-on state, then Ready.
    pub fn reset(&mut self) {
        self.frame = FrameParser::new();
        self.tis.reset();
    }

    /// Shifts one byte in and returns the byte shifted out in the same slot.
    pub fn shift(&mut self, tx: u8) -> u8 {
        match self.frame.shift(tx) {
            Route::Idle => TPM_READ_SENTINEL,
            Route::Header => TPM_HEADER_FILL,
            Route::Ready(_) => SPI_WAIT_STATE_READY,
            Route::Read(addr) => self.tis.read(addr),
            Route::Write(addr, val) => {
                self.tis.write(addr, val);
                TPM_HEADER_FILL
            }
        }
    }

    pub fn phase(&self) -> SpiPhase {
        self.frame.phase()
    }

    pub fn tis_state(&self) -> TisState {
        self.tis.state()
    }

    pub fn status(&self) -> Status {
        self.tis.status()
    }

    pub fn command(&self) -> &[u8] {
        self.tis.command().as_slice()
    }

    pub fn response(&self) -> &[u8] {
        self.tis.response().as_slice()
    }

    pub fn handler(&self) -> &H {
        self.tis.handler()
    }
}

impl Default for TpmSpiDevice<StaticResponder> {
    fn default() -> Self {
        Self::new(TpmSpiConfig::default(), StaticResponder)
    }
}

impl<H: CommandHandler> SpiBus for TpmSpiDevice<H> {
    fn xfer(
        &mut self,
        bitlen: usize,
        dout: Option<&[u8]>,
        mut din: Option<&mut [u8]>,
        flags: SpiFlags,
    ) -> Result<()> {
        let len = xfer_len(bitlen, dout, din.as_deref())?;
        trace!("tpm: xfer {} bytes {:?}", len, flags);

        if flags.contains(SpiFlags::BEGIN) {
            self.frame.begin();
        }

        for i in 0..len {
            let tx = dout.map_or(0, |d| d[i]);
            let rx = self.shift(tx);
            if let Some(d) = din.as_mut() {
                d[i] = rx;
            }
        }

        if flags.contains(SpiFlags::END) {
            self.frame.end();
        }
        Ok(())
    }
}
