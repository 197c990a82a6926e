//! Constructs ICMP Echo Reply, Destination Unreachable, and Time Exceeded messages
//! ([COMPONENT DESIGN] §4.4). Every function here returns a ready-to-forward IPv4
//! packet; dispatching it through ARP resolution is the pipeline's job.

use crate::codec::icmp::{self, IcmpEcho, IcmpError};
use crate::codec::ipv4::{Ipv4Header, DEFAULT_TTL, PROTO_ICMP};
use std::net::Ipv4Addr;

/// Rewrites an echo request into its reply in place: swap src/dst, type 8 -> 0, fresh
/// TTL, both checksums recomputed. The caller forwards the result as if it were
/// locally originated ([COMPONENT DESIGN] §4.4, "local send").
pub fn echo_reply(ip: &Ipv4Header, echo: &IcmpEcho) -> (Ipv4Header, IcmpEcho) {
    let mut reply_echo = echo.clone();
    reply_echo.ty = icmp::ICMP_TYPE_ECHO_REPLY;
    reply_echo.recompute_checksum();

    let reply_bytes = reply_echo.to_bytes();
    let mut reply_ip = Ipv4Header::new(ip.dst, ip.src, PROTO_ICMP, reply_bytes.len() as u16);
    reply_ip.ttl = DEFAULT_TTL;
    reply_ip.recompute_checksum();

    (reply_ip, reply_echo)
}

/// Truncates `original_ip_header` + `original_payload` down to the RFC 792 "original
/// header + first 8 bytes" shape expected inside an ICMP error.
fn offending_bytes(original_ip_header: &[u8], original_payload: &[u8]) -> Vec<u8> {
    let mut bytes = original_ip_header.to_vec();
    let take = original_payload.len().min(8);
    bytes.extend_from_slice(&original_payload[..take]);
    bytes
}

/// Time Exceeded (11/0): sourced from the interface the offending packet arrived on.
pub fn time_exceeded(
    arrival_iface_ip: Ipv4Addr,
    offending_src: Ipv4Addr,
    original_ip_header: &[u8],
    original_payload: &[u8],
) -> (Ipv4Header, IcmpError) {
    let offending = offending_bytes(original_ip_header, original_payload);
    let err = IcmpError::time_exceeded(&offending);
    let body = err.to_bytes();

    let mut ip = Ipv4Header::new(arrival_iface_ip, offending_src, PROTO_ICMP, body.len() as u16);
    ip.ttl = DEFAULT_TTL;
    ip.recompute_checksum();

    (ip, err)
}

/// Destination Unreachable (3/code). Net (0) and host (1) unreachable are sourced from
/// the arrival interface; port (3) unreachable is sourced from the original packet's
/// destination, so a NAT port-unreachable appears to come from the advertised external
/// address.
pub fn dest_unreachable(
    code: u8,
    source_ip: Ipv4Addr,
    offending_src: Ipv4Addr,
    original_ip_header: &[u8],
    original_payload: &[u8],
) -> (Ipv4Header, IcmpError) {
    let offending = offending_bytes(original_ip_header, original_payload);
    let err = IcmpError::dest_unreachable(code, &offending);
    let body = err.to_bytes();

    let mut ip = Ipv4Header::new(source_ip, offending_src, PROTO_ICMP, body.len() as u16);
    ip.ttl = DEFAULT_TTL;
    ip.recompute_checksum();

    (ip, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::icmp::ICMP_TYPE_ECHO_REQUEST;

    #[test]
    fn echo_reply_reverses_addresses_and_id() {
        let ip = Ipv4Header::new(
            Ipv4Addr::new(10, 0, 1, 100),
            Ipv4Addr::new(8, 8, 8, 8),
            PROTO_ICMP,
            8,
        );
        let mut echo = IcmpEcho {
            ty: ICMP_TYPE_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier: 0x1234,
            sequence: 1,
            payload: vec![],
        };
        echo.recompute_checksum();

        let (reply_ip, reply_echo) = echo_reply(&ip, &echo);
        assert_eq!(reply_ip.src, ip.dst);
        assert_eq!(reply_ip.dst, ip.src);
        assert_eq!(reply_echo.identifier, echo.identifier);
        assert!(reply_echo.verify_checksum());
        assert!(reply_ip.verify_checksum());
    }

    #[test]
    fn time_exceeded_sourced_from_arrival_interface() {
        let arrival_ip = Ipv4Addr::new(10, 0, 1, 1);
        let offending_src = Ipv4Addr::new(10, 0, 1, 100);
        let header_bytes = Ipv4Header::new(offending_src, Ipv4Addr::new(8, 8, 8, 8), PROTO_ICMP, 8).to_bytes();

        let (ip, err) = time_exceeded(arrival_ip, offending_src, &header_bytes, &[0u8; 8]);
        assert_eq!(ip.src, arrival_ip);
        assert_eq!(ip.dst, offending_src);
        assert_eq!(err.ty, icmp::ICMP_TYPE_TIME_EXCEEDED);
    }
}
