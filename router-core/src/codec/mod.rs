//! Fixed-layout, byte-exact encoders/decoders for every header the data plane touches.
//!
//! All multi-byte fields are big-endian on the wire, matching the protocols themselves.
//! Checksums are never trusted across a rewrite: whichever stage mutates a header is
//! responsible for calling the matching `recompute_checksum`.

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod tcp;

pub use ethernet::MacAddr;

use crate::error::CodecError;

/// The result of classifying and parsing an inbound Ethernet frame far enough to
/// dispatch it: either an ARP packet, or an IPv4 packet together with its upper-layer
/// header if we understood it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFrame {
    Arp {
        eth: ethernet::EthernetHeader,
        arp: arp::ArpPacket,
    },
    Ipv4 {
        eth: ethernet::EthernetHeader,
        ip: ipv4::Ipv4Header,
        payload: Vec<u8>,
    },
}

/// Parses an Ethernet frame and, for the ethertypes we support, everything after it.
/// Unsupported ethertypes are reported as [`CodecError::Unsupported`]; the pipeline's
/// caller treats that the same as any other `ParseFailure` (silent drop).
pub fn parse_frame(bytes: &[u8]) -> Result<ParsedFrame, CodecError> {
    let eth = ethernet::EthernetHeader::parse(bytes)?;
    let rest = &bytes[ethernet::ETHERNET_HEADER_LEN..];

    match eth.ethertype {
        ethernet::ETHERTYPE_ARP => {
            let arp = arp::ArpPacket::parse(rest)?;
            Ok(ParsedFrame::Arp { eth, arp })
        }
        ethernet::ETHERTYPE_IPV4 => {
            let ip = ipv4::Ipv4Header::parse(rest)?;
            let header_len = ip.ihl_bytes();
            if rest.len() < header_len {
                return Err(CodecError::Truncated {
                    need: header_len,
                    got: rest.len(),
                });
            }
            let payload = rest[header_len..].to_vec();
            Ok(ParsedFrame::Ipv4 { eth, ip, payload })
        }
        other => Err(CodecError::Unsupported {
            field: "eth.ethertype",
            value: other as u32,
        }),
    }
}

/// Assembles an Ethernet frame from a header and an already-serialized payload.
pub fn build_frame(eth: &ethernet::EthernetHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ethernet::ETHERNET_HEADER_LEN + payload.len());
    out.extend_from_slice(&eth.to_bytes());
    out.extend_from_slice(payload);
    out
}
