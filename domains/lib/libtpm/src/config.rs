// Timeouts are in milliseconds.
pub const TIMEOUT_A: usize = 750;
pub const TIMEOUT_B: usize = 2000;
pub const TIMEOUT_C: usize = 750;
pub const TIMEOUT_D: usize = 750;

/// Upper bound on the retry back-off of a command the TPM keeps deferring.
pub const DURATION_LONG: u64 = 2000;

/// Wait-state polls after a header before giving up on the transaction.
pub const TPM_SPI_WAIT_STATE_POLLS: usize = 50;

pub const TPM_MAX_COMMAND_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TisConfig {
    pub locality: u32,
    /// Locality grant and release.
    pub timeout_a: usize,
    /// Command-ready after an abort.
    pub timeout_b: usize,
    /// Status valid / data available.
    pub timeout_c: usize,
    /// Non-zero burst count.
    pub timeout_d: usize,
    pub wait_state_polls: usize,
    pub duration_long_ms: u64,
    pub max_command_size: usize,
}

impl Default for TisConfig {
    fn default() -> Self {
        Self {
            locality: 0,
            timeout_a: TIMEOUT_A,
            timeout_b: TIMEOUT_B,
            timeout_c: TIMEOUT_C,
            timeout_d: TIMEOUT_D,
            wait_state_polls: TPM_SPI_WAIT_STATE_POLLS,
            duration_long_ms: DURATION_LONG,
            max_command_size: TPM_MAX_COMMAND_SIZE,
        }
    }
}
