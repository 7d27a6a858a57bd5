// TPM 2.0 command/response framing shared by every command.
// Generously borrowed from linux/drivers/char/tpm/tpm.h

use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};

use interface::error::{ErrorKind, Result};

pub const TPM_HEADER_SIZE: usize = 10;

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tpm2ReturnCodes {
    TPM2_RC_SUCCESS = 0x0000,
    TPM2_RC_HASH = 0x0083, /* RC_FMT1 */
    TPM2_RC_HANDLE = 0x008B,
    TPM2_RC_INITIALIZE = 0x0100, /* RC_VER1 */
    TPM2_RC_FAILURE = 0x0101,
    TPM2_RC_DISABLED = 0x0120,
    TPM2_RC_COMMAND_CODE = 0x0143,
    TPM2_RC_TESTING = 0x090A, /* RC_WARN */
    TPM2_RC_REFERENCE_H0 = 0x0910,
    TPM2_RC_RETRY = 0x0922,
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tpm2Structures {
    TPM2_ST_NO_SESSIONS = 0x8001,
    TPM2_ST_SESSIONS = 0x8002,
}

/// Leading 10 bytes of every command and response. `ordinal` is the command
/// code on the way in and the response code on the way out.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TpmHeader {
    pub tag: u16,
    pub length: u32,
    pub ordinal: u32,
}

impl TpmHeader {
    pub fn new(tag: u16, length: u32, ordinal: u32) -> Self {
        Self { tag, length, ordinal }
    }

    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        if buf.len() < TPM_HEADER_SIZE {
            return Err(ErrorKind::InvalidData);
        }
        Ok(Self {
            tag: BigEndian::read_u16(&buf[0..2]),
            length: BigEndian::read_u32(&buf[2..6]),
            ordinal: BigEndian::read_u32(&buf[6..10]),
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::with_capacity(TPM_HEADER_SIZE);
        buf.extend_from_slice(&u16::to_be_bytes(self.tag));
        buf.extend_from_slice(&u32::to_be_bytes(self.length));
        buf.extend_from_slice(&u32::to_be_bytes(self.ordinal));
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_are_big_endian() {
        let raw = [0x80, 0x01, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x01, 0x44, 0x00, 0x00];
        let hdr = TpmHeader::from_slice(&raw).unwrap();
        assert_eq!(hdr, TpmHeader::new(Tpm2Structures::TPM2_ST_NO_SESSIONS as u16, 12, 0x144));
        assert_eq!(hdr.to_vec(), &raw[..TPM_HEADER_SIZE]);
    }

    #[test]
    fn short_header_is_invalid() {
        assert_eq!(TpmHeader::from_slice(&[0x80, 0x01]), Err(ErrorKind::InvalidData));
    }
}
