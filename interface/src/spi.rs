use crate::error::Result;

bitflags! {
    /// Chip-select bracketing of one bus transaction.
    pub struct SpiFlags: u32 {
        /// Assert chip select before shifting the first byte.
        const BEGIN = 1 << 0;
        /// Release chip select after shifting the last byte.
        const END   = 1 << 1;
        const ONESHOT = Self::BEGIN.bits | Self::END.bits;
    }
}

/// Full-duplex transfer primitive of a SPI master, as seen by the device on the
/// other side of the wire or by the session layer driving it.
///
/// `bitlen` must be a multiple of 8. `dout` supplies the bytes to shift out (zeros
/// when `None`) and `din` receives the bytes shifted in (discarded when `None`).
/// Without `END` the chip select stays asserted so the next call continues the
/// same transaction. `bitlen == 0` with `END` only releases the chip select.
pub trait SpiBus {
    fn xfer(
        &mut self,
        bitlen: usize,
        dout: Option<&[u8]>,
        din: Option<&mut [u8]>,
        flags: SpiFlags,
    ) -> Result<()>;
}

impl<T: SpiBus + ?Sized> SpiBus for &mut T {
    fn xfer(
        &mut self,
        bitlen: usize,
        dout: Option<&[u8]>,
        din: Option<&mut [u8]>,
        flags: SpiFlags,
    ) -> Result<()> {
        (**self).xfer(bitlen, dout, din, flags)
    }
}

/// Byte count of a transfer, or `InvalidTransferLength` for partial bytes or
/// buffers shorter than the transfer.
pub fn xfer_len(bitlen: usize, dout: Option<&[u8]>, din: Option<&[u8]>) -> Result<usize> {
    use crate::error::ErrorKind;

    if bitlen % 8 != 0 {
        return Err(ErrorKind::InvalidTransferLength);
    }
    let len = bitlen / 8;
    if dout.map_or(false, |d| d.len() < len) || din.map_or(false, |d| d.len() < len) {
        return Err(ErrorKind::InvalidTransferLength);
    }
    Ok(len)
}
