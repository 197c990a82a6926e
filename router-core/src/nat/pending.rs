use std::net::Ipv4Addr;

/// An unsolicited inbound TCP SYN to a high port with no matching mapping, parked for
/// up to [`crate::nat::table::PENDING_UNSOLICITED_TIMEOUT_SECS`] awaiting a matching
/// outbound SYN. The frame is an owned copy ([Open questions]: the C original stored a
/// borrowed pointer into the caller's packet buffer with unclear ownership semantics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUnsolicited {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub recv_at: u64,
    pub frame: Vec<u8>,
    pub out_iface: String,
}
