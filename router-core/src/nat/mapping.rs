use crate::nat::connection::NatConnection;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NatMappingType {
    Icmp,
    Tcp,
}

/// `(type, ip_int, aux_int)` — unique per mapping, used for internal-side lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub ty: NatMappingType,
    pub ip_int: Ipv4Addr,
    pub aux_int: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatMapping {
    pub ty: NatMappingType,
    pub ip_int: Ipv4Addr,
    pub aux_int: u16,
    pub ip_ext: Ipv4Addr,
    /// Host-order. See [DESIGN.md] for why: the C original applied `ntohs` on one
    /// lookup path but not on allocation, so this implementation picks host-order
    /// everywhere and converts to network order only when writing the wire field.
    pub aux_ext: u16,
    pub last_used: u64,
    pub conns: Vec<NatConnection>,
}

impl NatMapping {
    pub fn key(&self) -> MappingKey {
        MappingKey {
            ty: self.ty,
            ip_int: self.ip_int,
            aux_int: self.aux_int,
        }
    }
}
