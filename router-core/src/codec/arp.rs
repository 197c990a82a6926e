//! ARP for IPv4 over Ethernet (RFC 826), the only combination the router speaks.

use crate::codec::ethernet::MacAddr;
use crate::error::CodecError;
use std::net::Ipv4Addr;

pub const ARP_PACKET_LEN: usize = 28;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const HLEN_ETHERNET: u8 = 6;
const PLEN_IPV4: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOpcode {
    Request,
    Reply,
}

impl ArpOpcode {
    fn to_u16(self) -> u16 {
        match self {
            ArpOpcode::Request => 1,
            ArpOpcode::Reply => 2,
        }
    }

    fn from_u16(value: u16) -> Result<Self, CodecError> {
        match value {
            1 => Ok(ArpOpcode::Request),
            2 => Ok(ArpOpcode::Reply),
            other => Err(CodecError::Unsupported {
                field: "arp.opcode",
                value: other as u32,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub opcode: ArpOpcode,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < ARP_PACKET_LEN {
            return Err(CodecError::Truncated {
                need: ARP_PACKET_LEN,
                got: bytes.len(),
            });
        }

        let htype = u16::from_be_bytes([bytes[0], bytes[1]]);
        let ptype = u16::from_be_bytes([bytes[2], bytes[3]]);
        let hlen = bytes[4];
        let plen = bytes[5];
        if htype != HTYPE_ETHERNET || hlen != HLEN_ETHERNET {
            return Err(CodecError::Unsupported {
                field: "arp.htype",
                value: htype as u32,
            });
        }
        if ptype != PTYPE_IPV4 || plen != PLEN_IPV4 {
            return Err(CodecError::Unsupported {
                field: "arp.ptype",
                value: ptype as u32,
            });
        }

        let opcode = ArpOpcode::from_u16(u16::from_be_bytes([bytes[6], bytes[7]]))?;

        let mut sender_mac = [0u8; 6];
        sender_mac.copy_from_slice(&bytes[8..14]);
        let sender_ip = Ipv4Addr::new(bytes[14], bytes[15], bytes[16], bytes[17]);

        let mut target_mac = [0u8; 6];
        target_mac.copy_from_slice(&bytes[18..24]);
        let target_ip = Ipv4Addr::new(bytes[24], bytes[25], bytes[26], bytes[27]);

        Ok(Self {
            opcode,
            sender_mac: MacAddr(sender_mac),
            sender_ip,
            target_mac: MacAddr(target_mac),
            target_ip,
        })
    }

    pub fn to_bytes(&self) -> [u8; ARP_PACKET_LEN] {
        let mut out = [0u8; ARP_PACKET_LEN];
        out[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        out[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
        out[4] = HLEN_ETHERNET;
        out[5] = PLEN_IPV4;
        out[6..8].copy_from_slice(&self.opcode.to_u16().to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_mac.0);
        out[14..18].copy_from_slice(&self.sender_ip.octets());
        out[18..24].copy_from_slice(&self.target_mac.0);
        out[24..28].copy_from_slice(&self.target_ip.octets());
        out
    }
}
