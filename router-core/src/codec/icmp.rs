use crate::codec::checksum::{internet_checksum, verify};
use crate::error::CodecError;

pub const ICMP_ECHO_HEADER_LEN: usize = 8;
/// 4-byte unused/next-mtu field + original IP header + first 8 bytes of its payload.
/// The original spec caps the original IPv4 header at 20 bytes (no options echoed back).
pub const ICMP_DATA_SIZE: usize = 4 + 20 + 8;

pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;
pub const ICMP_TYPE_TIME_EXCEEDED: u8 = 11;

pub const CODE_NET_UNREACHABLE: u8 = 0;
pub const CODE_HOST_UNREACHABLE: u8 = 1;
pub const CODE_PORT_UNREACHABLE: u8 = 3;

pub const CODE_TTL_EXCEEDED_IN_TRANSIT: u8 = 0;

const NEXT_MTU: u16 = 1500;

/// An echo request or reply: `{type, code, checksum, identifier, sequence, payload}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpEcho {
    pub ty: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl IcmpEcho {
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < ICMP_ECHO_HEADER_LEN {
            return Err(CodecError::Truncated {
                need: ICMP_ECHO_HEADER_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self {
            ty: bytes[0],
            code: bytes[1],
            checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
            payload: bytes[ICMP_ECHO_HEADER_LEN..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ICMP_ECHO_HEADER_LEN + self.payload.len());
        out.push(self.ty);
        out.push(self.code);
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&self.identifier.to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn recompute_checksum(&mut self) {
        self.checksum = 0;
        let bytes = self.to_bytes();
        self.checksum = internet_checksum(&bytes);
    }

    pub fn verify_checksum(&self) -> bool {
        verify(&self.to_bytes())
    }
}

/// Destination Unreachable (type 3) or Time Exceeded (type 11): both carry the same
/// `{unused/next_mtu, original header + 8 bytes}` body per RFC 792.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpError {
    pub ty: u8,
    pub code: u8,
    pub checksum: u16,
    /// First `ICMP_DATA_SIZE - 4` bytes of the packet that triggered the error
    /// (its IP header plus the first 8 bytes of payload).
    pub offending: Vec<u8>,
}

impl IcmpError {
    pub fn dest_unreachable(code: u8, offending_ip_and_payload: &[u8]) -> Self {
        Self::new(ICMP_TYPE_DEST_UNREACHABLE, code, offending_ip_and_payload)
    }

    pub fn time_exceeded(offending_ip_and_payload: &[u8]) -> Self {
        Self::new(
            ICMP_TYPE_TIME_EXCEEDED,
            CODE_TTL_EXCEEDED_IN_TRANSIT,
            offending_ip_and_payload,
        )
    }

    fn new(ty: u8, code: u8, offending_ip_and_payload: &[u8]) -> Self {
        let take = offending_ip_and_payload.len().min(ICMP_DATA_SIZE - 4);
        let mut this = Self {
            ty,
            code,
            checksum: 0,
            offending: offending_ip_and_payload[..take].to_vec(),
        };
        this.recompute_checksum();
        this
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < 8 {
            return Err(CodecError::Truncated { need: 8, got: bytes.len() });
        }
        Ok(Self {
            ty: bytes[0],
            code: bytes[1],
            checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
            offending: bytes[8..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.offending.len());
        out.push(self.ty);
        out.push(self.code);
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&[0, 0]); // unused
        out.extend_from_slice(&NEXT_MTU.to_be_bytes());
        out.extend_from_slice(&self.offending);
        out
    }

    pub fn recompute_checksum(&mut self) {
        self.checksum = 0;
        let bytes = self.to_bytes();
        self.checksum = internet_checksum(&bytes);
    }
}
