// Register definitions of the TIS registers the SPI interface exposes
// Derived from https://trustedcomputinggroup.org/wp-content/uploads/TCG_PCClientTPMInterfaceSpecification_TIS__1-3_27_03212013.pdf
//

bitfield! {
    pub struct TpmAccess(u8);
    impl Debug;
    pub tpm_reg_validsts, set_tpm_reg_validsts: 7;
    pub active_locality, set_active_locality: 5;
    pub been_seized, set_been_seized: 4;
    pub seize, set_seize: 3;
    pub pending_request, set_pending_request: 2;
    pub request_use, set_request_use: 1;
    pub tpm_establishment, _: 0;
}

bitfield! {
    pub struct TpmStatus(u32);
    impl Debug;
    u32;
    pub command_cancel, _: 24;
    pub u16, burst_count, set_burst_count: 23, 8;
    pub sts_valid, set_sts_valid: 7;
    pub command_ready, set_command_ready: 6;
    pub tpm_go, set_tpm_go: 5;
    pub data_avail, set_data_avail: 4;
    pub expect, set_expect: 3;
    pub selftest_done, _: 2;
    pub response_retry, set_response_retry: 1;
}

bitfield! {
    pub struct TpmIntfCap(u32);
    impl Debug;
    u32;
    pub iface_ver, _: 30, 28;
    pub data_xfer_size, _: 10, 9;
    pub burst_count_static, _: 8;
    pub cmd_ready_int, _: 7;
    pub irq_edge_falling, _: 6;
    pub irq_edge_rising, _: 5;
    pub irq_level_low, _: 4;
    pub irq_level_high, _: 3;
    pub locality_change_int, _: 2;
    pub sts_valid_int, _: 1;
    pub data_avail_int, _: 0;
}
