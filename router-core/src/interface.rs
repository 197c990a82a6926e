//! Interfaces and the `send` collaborator primitive the core dispatches frames to.
//!
//! Frame I/O itself ([`NetworkIo`]) is out of scope for this crate — the spec treats
//! `send`/`receive` as external collaborators supplied by whatever embeds the data
//! plane (a raw-socket loop, a simulator, a test harness).

use crate::codec::MacAddr;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
}

/// Transmits fully-formed Ethernet frames on behalf of the data plane.
///
/// Implementations must not block the caller indefinitely; the pipeline calls this
/// only after releasing any locks it held (see the re-entrancy note on
/// [`crate::nat::NatTable`] and [`crate::arp_cache::ArpCache`]).
pub trait NetworkIo: Send + Sync + 'static {
    fn send(&self, frame: &[u8], iface: &str);
}

/// A [`NetworkIo`] that records every frame instead of transmitting it. Used by tests
/// and anywhere frames need to be inspected rather than put on a wire.
#[derive(Debug, Default)]
pub struct RecordingIo {
    pub sent: parking_lot::Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.sent.lock())
    }
}

impl NetworkIo for RecordingIo {
    fn send(&self, frame: &[u8], iface: &str) {
        self.sent.lock().push((iface.to_string(), frame.to_vec()));
    }
}
