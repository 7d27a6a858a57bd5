/*
This library implements the host side of the TPM TIS (FIFO) interface from
the TCG PC Client Platform TPM Profile specification: locality handling,
the command-ready/go/data-available handshake and the burst-count paced
FIFO transfers that carry TPM 2.0 commands and responses.
https://trustedcomputinggroup.org/wp-content/uploads/PC-Client-Specific-Platform-TPM-Profile-for-TPM-2p0-v1p05p_r14_pub.pdf
*/

#![no_std]

extern crate alloc;
extern crate byteorder;

mod config;
mod proto;
mod tis_spi;

use bitfield::BitRange;
use log::{debug, error, warn};

use interface::error::{ErrorKind, Result};
use interface::tpm::{TpmAccess, TpmDev, TpmRegs, TpmStatus};
use libtime::{poll_with_budget, Delay};

pub use config::*;
pub use proto::*;
pub use tis_spi::TisSpi;

/// Vendor, device and revision as reported by DID_VID and RID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmId {
    pub vendor_id: u16,
    pub device_id: u16,
    pub revision_id: u8,
}

fn status_flags(f: impl FnOnce(&mut TpmStatus)) -> u8 {
    let mut reg_sts = TpmStatus(0);
    f(&mut reg_sts);
    reg_sts.bit_range(7, 0)
}

fn burst_count<T: TpmDev>(tpm: &mut T, locality: u32) -> Result<u16> {
    let reg_sts = TpmStatus(tpm.read_u32(locality, TpmRegs::TPM_STS)?);
    Ok(reg_sts.burst_count())
}

/// A TPM reached through `TpmDev`, driven through the TIS handshake.
pub struct TpmSession<T, D> {
    tpm: T,
    delay: D,
    config: TisConfig,
}

impl<T: TpmDev, D: Delay> TpmSession<T, D> {
    pub fn new(tpm: T, delay: D, config: TisConfig) -> Self {
        Self { tpm, delay, config }
    }

    pub fn tpm(&self) -> &T {
        &self.tpm
    }

    pub fn tpm_mut(&mut self) -> &mut T {
        &mut self.tpm
    }

    pub fn config(&self) -> &TisConfig {
        &self.config
    }

    fn locality(&self) -> u32 {
        self.config.locality
    }

    fn access(&mut self) -> Result<TpmAccess> {
        let locality = self.locality();
        Ok(TpmAccess(self.tpm.read_u8(locality, TpmRegs::TPM_ACCESS)?))
    }

    /// Polls ACCESS once per millisecond until `done` holds.
    fn wait_for_access<F: Fn(&TpmAccess) -> bool>(&mut self, timeout_ms: usize, done: F) -> Result<()> {
        let locality = self.locality();
        let tpm = &mut self.tpm;
        let delay = &mut self.delay;
        poll_with_budget(timeout_ms, || match tpm.read_u8(locality, TpmRegs::TPM_ACCESS) {
            Ok(reg) if done(&TpmAccess(reg)) => Some(Ok(())),
            Ok(_) => {
                delay.delay_ms(1);
                None
            }
            Err(e) => Some(Err(e)),
        })
        .ready_or_timeout()?
    }

    /// Our locality is valid and currently active.
    pub fn check_locality(&mut self) -> Result<bool> {
        let reg_acc = self.access()?;
        Ok(reg_acc.tpm_reg_validsts() && reg_acc.active_locality())
    }

    /// Requests the TPM to switch to our locality and waits for it to
    /// acknowledge the request.
    pub fn request_locality(&mut self) -> Result<()> {
        let reg_acc = self.access()?;
        debug!("Request locality access {:x?}", reg_acc);

        if !reg_acc.tpm_reg_validsts() {
            return Err(ErrorKind::LocalityNotGranted);
        }
        if reg_acc.active_locality() {
            return Ok(());
        }

        let mut reg_acc = TpmAccess(0);
        reg_acc.set_request_use(true);
        reg_acc.set_active_locality(true);
        let locality = self.locality();
        self.tpm.write_u8(locality, TpmRegs::TPM_ACCESS, reg_acc.0)?;

        let timeout = self.config.timeout_a;
        self.wait_for_access(timeout, |acc| acc.tpm_reg_validsts() && acc.active_locality())
            .map_err(|e| match e {
                ErrorKind::TimedOut => ErrorKind::LocalityNotGranted,
                e => e,
            })
    }

    /// Explicitly gives up the locality.
    pub fn relinquish_locality(&mut self) -> Result<()> {
        let mut reg_acc = TpmAccess(0);
        reg_acc.set_active_locality(true);
        let locality = self.locality();
        self.tpm.write_u8(locality, TpmRegs::TPM_ACCESS, reg_acc.0)?;

        let timeout = self.config.timeout_a;
        self.wait_for_access(timeout, |acc| acc.tpm_reg_validsts() && !acc.active_locality())
    }

    pub fn read_tpm_id(&mut self) -> Result<TpmId> {
        let locality = self.locality();
        let did_vid = self.tpm.read_u32(locality, TpmRegs::TPM_DID_VID)?;
        let rid = self.tpm.read_u8(locality, TpmRegs::TPM_RID)?;
        let id = TpmId {
            vendor_id: did_vid as u16,
            device_id: (did_vid >> 16) as u16,
            revision_id: rid,
        };
        debug!("Locality {} => {:x?}", locality, id);
        Ok(id)
    }

    /// Reads the burst count: the number of bytes the TPM can take or
    /// deliver through the FIFO without another status check.
    pub fn get_burst(&mut self) -> Result<u16> {
        let locality = self.locality();
        burst_count(&mut self.tpm, locality)
    }

    /// Busy-waits, one millisecond per poll, for all bits of `flag` to be set
    /// in the low byte of STS.
    pub fn wait_for_status_flag(&mut self, flag: u8, timeout_ms: usize) -> Result<()> {
        let locality = self.locality();
        let tpm = &mut self.tpm;
        let delay = &mut self.delay;
        poll_with_budget(timeout_ms, || match tpm.read_u8(locality, TpmRegs::TPM_STS) {
            Ok(sts) if sts & flag == flag => Some(Ok(())),
            Ok(_) => {
                delay.delay_ms(1);
                None
            }
            Err(e) => Some(Err(e)),
        })
        .ready_or_timeout()?
    }

    fn wait_for_burst(&mut self) -> Result<usize> {
        let locality = self.locality();
        let tpm = &mut self.tpm;
        let delay = &mut self.delay;
        poll_with_budget(self.config.timeout_d, || match burst_count(tpm, locality) {
            Ok(0) => {
                delay.delay_ms(1);
                None
            }
            Ok(burst) => Some(Ok(burst as usize)),
            Err(e) => Some(Err(e)),
        })
        .ready_or_timeout()?
    }

    fn command_ready(&mut self) -> Result<()> {
        let locality = self.locality();
        let flag = status_flags(|s| s.set_command_ready(true));
        self.tpm.write_u8(locality, TpmRegs::TPM_STS, flag)
    }

    fn read_status(&mut self) -> Result<TpmStatus> {
        let locality = self.locality();
        Ok(TpmStatus(self.tpm.read_u8(locality, TpmRegs::TPM_STS)? as u32))
    }

    /// Reads exactly `buf.len()` bytes from the FIFO, at most one burst at a time.
    fn read_fifo(&mut self, buf: &mut [u8]) -> Result<()> {
        let locality = self.locality();
        let mut size = 0;
        while size < buf.len() {
            let burst = self.wait_for_burst()?.min(buf.len() - size);
            self.tpm
                .read_reg(locality, TpmRegs::TPM_DATA_FIFO, &mut buf[size..size + burst])?;
            size += burst;
        }
        Ok(())
    }

    /// Makes sure the TPM is ready for a command, writes it to the FIFO in
    /// burst-sized pieces and starts execution with `go`.
    pub fn send_data(&mut self, cmd: &[u8]) -> Result<usize> {
        if cmd.len() > self.config.max_command_size {
            warn!(
                "command of {} bytes exceeds {}",
                cmd.len(),
                self.config.max_command_size
            );
            return Err(ErrorKind::BufferOverflow);
        }
        if cmd.len() < TPM_HEADER_SIZE {
            return Err(ErrorKind::InvalidInput);
        }

        let status = self.read_status()?;
        debug!("Send before STS {:x?}", status);
        if !status.command_ready() {
            // abort whatever the TPM is doing
            self.command_ready()?;
            let flag = status_flags(|s| {
                s.set_sts_valid(true);
                s.set_command_ready(true);
            });
            let timeout = self.config.timeout_b;
            self.wait_for_status_flag(flag, timeout)?;
        }

        let locality = self.locality();
        let mut size = 0;
        while size < cmd.len() {
            let burst = self.wait_for_burst()?.min(cmd.len() - size);
            self.tpm
                .write_reg(locality, TpmRegs::TPM_DATA_FIFO, &cmd[size..size + burst])?;
            size += burst;

            let status = self.read_status()?;
            // the TPM must keep asking for data until the last byte
            if status.expect() != (size < cmd.len()) {
                error!(
                    "TPM expect={} after {} of {} command bytes",
                    status.expect(),
                    size,
                    cmd.len()
                );
                self.command_ready()?;
                return Err(ErrorKind::InvalidFramingState);
            }
        }

        let go = status_flags(|s| s.set_tpm_go(true));
        self.tpm.write_u8(locality, TpmRegs::TPM_STS, go)?;
        Ok(cmd.len())
    }

    /// Waits for a response, reads its header to learn the length, then the
    /// rest of it. Returns the response length; the code is left in `buf`.
    pub fn recv_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < TPM_HEADER_SIZE {
            return Err(ErrorKind::InvalidInput);
        }
        let flag = status_flags(|s| {
            s.set_sts_valid(true);
            s.set_data_avail(true);
        });
        let timeout = self.config.timeout_c;
        self.wait_for_status_flag(flag, timeout)?;

        self.read_fifo(&mut buf[..TPM_HEADER_SIZE])?;
        let hdr = TpmHeader::from_slice(&buf[..TPM_HEADER_SIZE])?;
        let len = hdr.length as usize;
        if len < TPM_HEADER_SIZE {
            error!("response length {} shorter than its header", len);
            self.command_ready()?;
            return Err(ErrorKind::InvalidData);
        }
        if len > buf.len() {
            error!("response of {} bytes does not fit {}", len, buf.len());
            self.command_ready()?;
            return Err(ErrorKind::BufferOverflow);
        }

        self.read_fifo(&mut buf[TPM_HEADER_SIZE..len])?;
        self.command_ready()?;
        Ok(len)
    }

    /// Sends `cmd` and reads the response into `rsp`. A TPM that answers
    /// TPM_RC_RETRY is retried with a doubling delay up to `duration_long_ms`.
    pub fn transmit_cmd(&mut self, cmd: &[u8], rsp: &mut [u8]) -> Result<usize> {
        let hdr = TpmHeader::from_slice(cmd)?;
        debug!("tpm_transmit_cmd len {} ord {:x}", hdr.length, hdr.ordinal);

        let mut delay_ms: u64 = 1;
        loop {
            self.send_data(cmd)?;
            let len = self.recv_data(rsp)?;
            let rc = TpmHeader::from_slice(&rsp[..len])?.ordinal;

            if rc == Tpm2ReturnCodes::TPM2_RC_SUCCESS as u32 {
                return Ok(len);
            }
            if rc != Tpm2ReturnCodes::TPM2_RC_RETRY as u32 {
                warn!("TPM returned with error {:#x}", rc);
                return Err(ErrorKind::TpmError(rc));
            }
            if delay_ms > self.config.duration_long_ms {
                error!("TPM in retry loop");
                return Err(ErrorKind::TpmError(rc));
            }
            debug!("TPM returned retry, waiting {} ms", delay_ms);
            self.delay.delay_ms(delay_ms);
            delay_ms *= 2;
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use alloc::vec::Vec;
    use libtime::NoDelay;
    use log::LevelFilter;
    use spi_device::sim::{self, SimChipSelect, SimController};
    use spi_device::{Bcm2835Spi, SpiConfig};
    use tpm_device::{CommandHandler, StaticResponder, TisState, TpmSpiConfig, TpmSpiDevice, TPM_SUCCESS_RESPONSE};

    type Dev<H> = TpmSpiDevice<H>;
    type Bus<H> = Bcm2835Spi<SimController<Dev<H>>, SimChipSelect<Dev<H>>, NoDelay>;
    type Session<H> = TpmSession<TisSpi<Bus<H>>, Recorder>;

    // TPM2_Startup(TPM_SU_CLEAR)
    const STARTUP: [u8; 12] = [0x80, 0x01, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x01, 0x44, 0x00, 0x00];

    fn print_sink(s: &str) {
        std::print!("{}", s);
    }

    #[derive(Default)]
    struct Recorder {
        slept_ms: Vec<u64>,
    }

    impl Delay for Recorder {
        fn delay_ns(&mut self, ns: u64) {
            self.slept_ms.push(ns / libtime::ONE_MS_IN_NS);
        }
    }

    fn stack<H: CommandHandler>(handler: H) -> (Session<H>, SimController<Dev<H>>) {
        // every test races to install the logger; only the first wins
        let _ = console::init_logging(print_sink, LevelFilter::Debug);

        let dev = TpmSpiDevice::new(TpmSpiConfig::default(), handler);
        let (ctrl, cs) = sim::bus(dev);
        let probe = ctrl.clone();
        let spi = Bcm2835Spi::new(ctrl, cs, NoDelay, SpiConfig::default());
        let config = TisConfig::default();
        let tis = TisSpi::new(spi, config.wait_state_polls);
        (TpmSession::new(tis, Recorder::default(), config), probe)
    }

    /// Records commands and answers each with the next scripted response code.
    struct Scripted {
        codes: Vec<u32>,
        commands: Vec<Vec<u8>>,
        payload: usize,
    }

    impl Scripted {
        fn new(codes: &[u32], payload: usize) -> Self {
            Self { codes: codes.to_vec(), commands: Vec::new(), payload }
        }
    }

    impl CommandHandler for Scripted {
        fn execute(&mut self, command: &[u8], response: &mut Vec<u8>) {
            self.commands.push(command.to_vec());
            let rc = if self.codes.is_empty() { 0 } else { self.codes.remove(0) };
            let len = (TPM_HEADER_SIZE + self.payload) as u32;
            response.extend_from_slice(&TpmHeader::new(0x8001, len, rc).to_vec());
            response.extend((0..self.payload).map(|i| i as u8));
        }
    }

    #[test]
    fn identifies_the_tpm() {
        let (mut tpm, _) = stack(StaticResponder);
        assert_eq!(
            tpm.read_tpm_id(),
            Ok(TpmId { vendor_id: 0x15D1, device_id: 0x001D, revision_id: 0x36 })
        );
        assert_eq!(tpm.get_burst(), Ok(64));
    }

    #[test]
    fn locality_round_trip() {
        let (mut tpm, _) = stack(StaticResponder);
        assert_eq!(tpm.check_locality(), Ok(false));
        tpm.request_locality().unwrap();
        assert_eq!(tpm.check_locality(), Ok(true));
        // already active
        tpm.request_locality().unwrap();
        tpm.relinquish_locality().unwrap();
        assert_eq!(tpm.check_locality(), Ok(false));
    }

    #[test]
    fn transmits_a_command() {
        let (mut tpm, probe) = stack(StaticResponder);
        tpm.request_locality().unwrap();
        let mut rsp = [0u8; 64];
        assert_eq!(tpm.transmit_cmd(&STARTUP, &mut rsp), Ok(10));
        assert_eq!(&rsp[..10], &TPM_SUCCESS_RESPONSE[..]);
        probe.with_slave(|dev| {
            assert_eq!(dev.tis_state(), TisState::Ready);
            assert!(dev.command().is_empty());
        });
        assert!(!probe.selected());
        assert!(tpm.delay.slept_ms.is_empty());
    }

    #[test]
    fn large_command_and_response_go_in_bursts() {
        let (mut tpm, probe) = stack(Scripted::new(&[], 150));
        let mut cmd: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        cmd[..10].copy_from_slice(&[0x80, 0x01, 0x00, 0x00, 0x00, 200, 0x00, 0x00, 0x01, 0x7B]);
        let mut rsp = [0u8; 256];
        assert_eq!(tpm.transmit_cmd(&cmd, &mut rsp), Ok(160));
        assert!(rsp[10..160].iter().enumerate().all(|(i, &b)| b == i as u8));
        probe.with_slave(|dev| assert_eq!(dev.handler().commands, [cmd.clone()]));
    }

    #[test]
    fn deassert_only_transfer_keeps_buffered_command() {
        use interface::spi::{SpiBus, SpiFlags};

        let (mut tpm, probe) = stack(StaticResponder);
        let spi = tpm.tpm_mut().bus_mut();
        let frame = [0x02u8, 0xD4, 0x00, 0x24, 0x80, 0x01, 0x00];
        spi.xfer(frame.len() * 8, Some(&frame), None, SpiFlags::BEGIN).unwrap();
        assert!(probe.selected());

        spi.xfer(0, None, None, SpiFlags::END).unwrap();
        assert!(!probe.selected());
        probe.with_slave(|dev| {
            assert_eq!(dev.tis_state(), TisState::Reception);
            assert_eq!(dev.command(), &[0x80, 0x01, 0x00][..]);
        });
    }

    #[test]
    fn retry_backs_off_then_succeeds() {
        let retry = Tpm2ReturnCodes::TPM2_RC_RETRY as u32;
        let (mut tpm, probe) = stack(Scripted::new(&[retry, retry], 0));
        let mut rsp = [0u8; 32];
        assert_eq!(tpm.transmit_cmd(&STARTUP, &mut rsp), Ok(10));
        assert_eq!(tpm.delay.slept_ms, [1, 2]);
        probe.with_slave(|dev| assert_eq!(dev.handler().commands.len(), 3));
    }

    #[test]
    fn retry_gives_up_after_duration_long() {
        let retry = Tpm2ReturnCodes::TPM2_RC_RETRY as u32;
        let (mut tpm, _) = stack(Scripted::new(&[retry; 16], 0));
        let mut rsp = [0u8; 32];
        assert_eq!(tpm.transmit_cmd(&STARTUP, &mut rsp), Err(ErrorKind::TpmError(retry)));
        // 1 + 2 + ... + 1024, the next step would exceed 2000 ms
        assert_eq!(tpm.delay.slept_ms.len(), 11);
        assert_eq!(tpm.delay.slept_ms.last(), Some(&1024));
    }

    #[test]
    fn error_code_is_reported() {
        let failure = Tpm2ReturnCodes::TPM2_RC_FAILURE as u32;
        let (mut tpm, _) = stack(Scripted::new(&[failure], 0));
        let mut rsp = [0u8; 32];
        assert_eq!(tpm.transmit_cmd(&STARTUP, &mut rsp), Err(ErrorKind::TpmError(0x101)));
    }

    #[test]
    fn oversized_command_is_refused() {
        let (mut tpm, probe) = stack(StaticResponder);
        let cmd = [0u8; TPM_MAX_COMMAND_SIZE + 1];
        assert_eq!(tpm.send_data(&cmd), Err(ErrorKind::BufferOverflow));
        assert_eq!(probe.shifted(), 0);
    }

    #[test]
    fn short_length_field_is_caught() {
        let (mut tpm, probe) = stack(StaticResponder);
        // claims 14 bytes but carries 12
        let mut cmd = STARTUP;
        cmd[5] = 14;
        assert_eq!(tpm.send_data(&cmd), Err(ErrorKind::InvalidFramingState));
        probe.with_slave(|dev| assert_eq!(dev.tis_state(), TisState::Ready));
    }

    #[test]
    fn response_larger_than_buffer() {
        let (mut tpm, probe) = stack(Scripted::new(&[], 40));
        tpm.send_data(&STARTUP).unwrap();
        let mut rsp = [0u8; 20];
        assert_eq!(tpm.recv_data(&mut rsp), Err(ErrorKind::BufferOverflow));
        probe.with_slave(|dev| assert_eq!(dev.tis_state(), TisState::Ready));
    }

    #[test]
    fn recv_without_command_times_out() {
        let (mut tpm, _) = stack(StaticResponder);
        let mut rsp = [0u8; 32];
        assert_eq!(tpm.recv_data(&mut rsp), Err(ErrorKind::TimedOut));
        assert_eq!(tpm.delay.slept_ms.len(), TIMEOUT_C);
    }
}
