//! Types shared between the TPM device model, the SPI controller driver and the TIS
//! session layer.
//!
//! host -[TpmDev]-> libtpm -[SpiBus]-> controller -> TPM

#![no_std]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate bitfield;

pub mod error;
pub mod spi;
pub mod tpm;
