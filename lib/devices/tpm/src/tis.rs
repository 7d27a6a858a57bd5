//! TIS register file and command/response state machine.
//!
//! ```text
//!   Idle --probe--> Ready --FIFO write--> Reception --go--> Execution --> Completion
//!                     ^                                                     |
//!                     +------------------ last response byte read ----------+
//!   any state --commandReady write--> Ready
//! ```

use alloc::vec::Vec;
use log::{debug, trace, warn};

use interface::tpm::TpmAccess;

use crate::fifo::{Append, CommandBuffer, ResponseBuffer};
use crate::regs::{reg_byte, Access, Register, Status, TPM_READ_SENTINEL};
use crate::TpmSpiConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TisState {
    Idle,
    Ready,
    Reception,
    Execution,
    Completion,
}

/// Produces the response to one complete command. The TIS layer never looks
/// inside either buffer beyond the command size field.
pub trait CommandHandler {
    fn execute(&mut self, command: &[u8], response: &mut Vec<u8>);
}

impl<H: CommandHandler + ?Sized> CommandHandler for &mut H {
    fn execute(&mut self, command: &[u8], response: &mut Vec<u8>) {
        (**self).execute(command, response)
    }
}

pub struct Tis<H> {
    state: TisState,
    access: Access,
    status: Status,
    intf_caps: u32,
    did_vid: u32,
    rid: u8,
    burst_count: u16,
    command: CommandBuffer,
    response: ResponseBuffer,
    handler: H,
}

impl<H: CommandHandler> Tis<H> {
    pub fn new(config: &TpmSpiConfig, handler: H) -> Self {
        Self {
            state: TisState::Idle,
            access: Access { valid: true, active_locality: false },
            status: Status {
                valid: true,
                burst_count: config.burst_count,
                ..Status::default()
            },
            intf_caps: config.intf_caps,
            did_vid: config.did_vid,
            rid: config.rid,
            burst_count: config.burst_count,
            command: CommandBuffer::new(config.cmd_capacity),
            response: ResponseBuffer::new(config.rsp_capacity),
            handler,
        }
    }

    /// Brings a freshly created (or reset) TIS from Idle to Ready.
    pub fn probe(&mut self) {
        if self.state != TisState::Idle {
            return;
        }
        self.command.clear();
        self.response.clear();
        self.status = self.ready_status();
        self.set_state(TisState::Ready);
    }

    pub fn reset(&mut self) {
        self.access = Access { valid: true, active_locality: false };
        self.state = TisState::Idle;
        self.probe();
    }

    pub fn read(&mut self, addr: u32) -> u8 {
        match Register::lookup(addr) {
            Some((Register::Access, _)) => self.access.pack(),
            Some((Register::IntfCapability, idx)) => reg_byte(self.intf_caps, idx),
            Some((Register::Status, idx)) => reg_byte(self.status.pack(), idx),
            Some((Register::DataFifo, _)) => self.fifo_read(),
            Some((Register::DidVid, idx)) => reg_byte(self.did_vid, idx),
            Some((Register::Rid, _)) => self.rid,
            None => {
                trace!("tis: read of unmapped register {:#06x}", addr);
                TPM_READ_SENTINEL
            }
        }
    }

    pub fn write(&mut self, addr: u32, val: u8) {
        match Register::lookup(addr) {
            Some((Register::Access, _)) => self.write_access(val),
            Some((Register::Status, idx)) => self.write_status(Status::written_byte(val, idx)),
            Some((Register::DataFifo, _)) => self.fifo_write(val),
            Some((reg, _)) => trace!("tis: write {:#04x} to read-only {:?}", val, reg),
            None => trace!("tis: write {:#04x} to unmapped register {:#06x}", val, addr),
        }
    }

    fn write_access(&mut self, val: u8) {
        let req = TpmAccess(val);
        // single locality: every request is granted at once
        if req.request_use() {
            self.access.valid = true;
            self.access.active_locality = true;
            debug!("tis: locality granted");
        } else if req.active_locality() {
            self.access.active_locality = false;
            debug!("tis: locality relinquished");
        }
    }

    fn write_status(&mut self, req: Status) {
        if req.command_ready {
            self.abort();
        }
        if req.go {
            self.go();
        }
    }

    fn abort(&mut self) {
        self.command.clear();
        self.response.clear();
        self.status = self.ready_status();
        self.set_state(TisState::Ready);
    }

    fn go(&mut self) {
        if self.state != TisState::Reception || !self.command.is_complete() {
            warn!(
                "tis: go ignored in {:?} with {} of {:?} command bytes",
                self.state,
                self.command.len(),
                self.command.declared_len()
            );
            return;
        }

        self.set_state(TisState::Execution);
        let command = &self.command;
        let handler = &mut self.handler;
        self.response
            .load(|rsp| handler.execute(command.as_slice(), rsp));

        if self.response.is_empty() {
            warn!("tis: command produced no response");
            self.abort();
            return;
        }

        self.status = Status {
            valid: true,
            data_avail: true,
            burst_count: self.burst_count,
            ..Status::default()
        };
        self.set_state(TisState::Completion);
    }

    fn fifo_write(&mut self, val: u8) {
        match self.state {
            TisState::Ready => {
                self.command.clear();
                self.status = Status {
                    valid: true,
                    expect: true,
                    burst_count: self.burst_count,
                    ..Status::default()
                };
                self.set_state(TisState::Reception);
            }
            TisState::Reception => {}
            // overlapping request/response is invalid TIS usage
            TisState::Completion | TisState::Execution | TisState::Idle => {
                warn!("tis: FIFO write of {:#04x} in {:?} ignored", val, self.state);
                return;
            }
        }

        if self.command.append(val) == Append::Complete && self.status.expect {
            self.status.expect = false;
            debug!("tis: command complete, {} bytes", self.command.len());
        }
    }

    fn fifo_read(&mut self) -> u8 {
        if self.state != TisState::Completion {
            return TPM_READ_SENTINEL;
        }
        let byte = match self.response.next_byte() {
            Some(b) => b,
            None => return TPM_READ_SENTINEL,
        };
        if self.response.is_drained() {
            self.command.clear();
            self.response.clear();
            self.status = self.ready_status();
            self.set_state(TisState::Ready);
        }
        byte
    }

    fn ready_status(&self) -> Status {
        Status {
            valid: true,
            command_ready: true,
            burst_count: self.burst_count,
            ..Status::default()
        }
    }

    fn set_state(&mut self, next: TisState) {
        if self.state != next {
            debug!("tis: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    pub fn state(&self) -> TisState {
        self.state
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn command(&self) -> &CommandBuffer {
        &self.command
    }

    pub fn response(&self) -> &ResponseBuffer {
        &self.response
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}
