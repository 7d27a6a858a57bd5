// Modified from https://github.com/rust-lang/rust/blob/master/src/libstd/io/error.rs

use core::fmt;

/// A specialized `Result` type for bus, register and session operations.
pub type Result<T> = core::result::Result<T, ErrorKind>;

/// A list specifying the categories of error the TPM stack can report.
///
/// Protocol anomalies observed by the device model itself (a `go` without a
/// complete command, a FIFO write while a response is pending) are absorbed and
/// never show up here; the wire protocol has no in-band channel to report them.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A bounded poll loop ran out of iterations. The chip select has been
    /// released; the caller may retry from a fresh `BEGIN`.
    TimedOut,
    /// A command does not fit into the command buffer.
    BufferOverflow,
    /// The address does not map to any TIS register. The emulated device never
    /// returns it (unmapped reads yield 0xFF, writes are dropped); it is kept
    /// for register backends that reject unmapped offsets.
    UnknownRegister,
    /// The register handshake is not in the state the operation requires.
    InvalidFramingState,
    /// Bit length is not a multiple of 8, or exceeds the supplied buffers.
    InvalidTransferLength,
    /// A parameter was incorrect.
    InvalidInput,
    /// Data returned by the TPM is malformed (e.g. a response header whose
    /// length field is shorter than the header itself).
    InvalidData,
    /// The TPM did not grant the requested locality.
    LocalityNotGranted,
    /// The TPM answered with a non-success response code.
    TpmError(u32),
    /// A global facility (logger, console) was already installed.
    AlreadyInitialized,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match *self {
            ErrorKind::TimedOut => "timed out",
            ErrorKind::BufferOverflow => "command buffer overflow",
            ErrorKind::UnknownRegister => "unknown register",
            ErrorKind::InvalidFramingState => "invalid framing state",
            ErrorKind::InvalidTransferLength => "invalid transfer length",
            ErrorKind::InvalidInput => "invalid input parameter",
            ErrorKind::InvalidData => "invalid data",
            ErrorKind::LocalityNotGranted => "locality not granted",
            ErrorKind::TpmError(_) => "tpm returned an error code",
            ErrorKind::AlreadyInitialized => "already initialized",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorKind::TpmError(rc) => write!(f, "{} (rc {:#x})", self.as_str(), rc),
            _ => f.write_str(self.as_str()),
        }
    }
}
