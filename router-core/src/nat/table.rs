//! The NAT table: mappings, their TCP connection sub-tables, and the
//! pending-unsolicited-SYN queue, all behind one lock ([COMPONENT DESIGN] §4.5).
//!
//! `tick()` only computes and returns the actions the caller should perform (ICMP
//! Port Unreachable for timed-out parked SYNs); it never calls back into the table
//! itself, so a plain mutex is sufficient.

use crate::nat::connection::{ConnectionKey, NatConnection, TcpConnState};
use crate::nat::mapping::{MappingKey, NatMapping, NatMappingType};
use crate::nat::pending::PendingUnsolicited;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;

pub const PENDING_UNSOLICITED_TIMEOUT_SECS: u64 = 6;
pub const TCP_PORT_RANGE: std::ops::RangeInclusive<u16> = 1024..=65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ExternalKey {
    ty: NatMappingType,
    aux_ext: u16,
}

#[derive(Debug, Default)]
struct State {
    mappings: HashMap<MappingKey, NatMapping>,
    by_external: HashMap<ExternalKey, MappingKey>,
    pending: Vec<PendingUnsolicited>,
    icmp_ext_counter: u16,
}

impl State {
    fn allocate_aux(&mut self, ty: NatMappingType) -> u16 {
        match ty {
            NatMappingType::Icmp => {
                self.icmp_ext_counter = self.icmp_ext_counter.wrapping_add(1);
                self.icmp_ext_counter
            }
            NatMappingType::Tcp => {
                for port in TCP_PORT_RANGE {
                    if !self.by_external.contains_key(&ExternalKey {
                        ty: NatMappingType::Tcp,
                        aux_ext: port,
                    }) {
                        return port;
                    }
                }
                unreachable!("TCP port space exhausted — 64512 concurrent mappings")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NatTickAction {
    PortUnreachable { frame: Vec<u8>, out_iface: String },
}

#[derive(Debug, Default)]
pub struct NatTable {
    state: Mutex<State>,
}

impl NatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_internal(
        &self,
        ip_int: Ipv4Addr,
        aux_int: u16,
        ty: NatMappingType,
    ) -> Option<NatMapping> {
        self.state
            .lock()
            .mappings
            .get(&MappingKey { ty, ip_int, aux_int })
            .cloned()
    }

    pub fn lookup_external(&self, aux_ext: u16, ty: NatMappingType) -> Option<NatMapping> {
        let state = self.state.lock();
        let key = state.by_external.get(&ExternalKey { ty, aux_ext })?;
        state.mappings.get(key).cloned()
    }

    /// Touches an existing mapping for `(ip_int, aux_int, ty)`, or creates one bound to
    /// `ip_ext` with a freshly allocated `aux_ext`. Allocation is serialized by the
    /// lock: two concurrent calls with the same internal key never create two mappings.
    pub fn insert_or_touch(
        &self,
        ip_int: Ipv4Addr,
        aux_int: u16,
        ty: NatMappingType,
        ip_ext: Ipv4Addr,
        now: u64,
    ) -> NatMapping {
        let mut state = self.state.lock();
        let key = MappingKey { ty, ip_int, aux_int };

        if let Some(existing) = state.mappings.get_mut(&key) {
            existing.last_used = now;
            return existing.clone();
        }

        let aux_ext = state.allocate_aux(ty);
        let mapping = NatMapping {
            ty,
            ip_int,
            aux_int,
            ip_ext,
            aux_ext,
            last_used: now,
            conns: Vec::new(),
        };
        state.mappings.insert(key, mapping.clone());
        state
            .by_external
            .insert(ExternalKey { ty, aux_ext }, key);
        mapping
    }

    pub fn get_connection(
        &self,
        mapping_key: MappingKey,
        ip_dest: Ipv4Addr,
        port_dest: u16,
    ) -> Option<NatConnection> {
        let state = self.state.lock();
        let mapping = state.mappings.get(&mapping_key)?;
        mapping
            .conns
            .iter()
            .find(|c| c.key() == ConnectionKey { ip_dest, port_dest })
            .cloned()
    }

    /// CAS-style transition: only moves to `new_state` if the connection's current
    /// state equals `expected`. Always refreshes `last_used` on a hit, matching the
    /// "unknown flag combos leave state unchanged but refresh last_used" rule from
    /// [COMPONENT DESIGN] §4.6 for the transitions this method *is* called for.
    pub fn update_connection_state(
        &self,
        mapping_key: MappingKey,
        ip_dest: Ipv4Addr,
        port_dest: u16,
        expected: TcpConnState,
        new_state: TcpConnState,
        now: u64,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(mapping) = state.mappings.get_mut(&mapping_key) else {
            return false;
        };
        let Some(conn) = mapping
            .conns
            .iter_mut()
            .find(|c| c.key() == ConnectionKey { ip_dest, port_dest })
        else {
            return false;
        };

        if conn.state == expected {
            conn.state = new_state;
            conn.last_used = now;
            true
        } else {
            false
        }
    }

    /// Refreshes `last_used` without changing state — used when a flag combination
    /// doesn't match any transition we track.
    pub fn touch_connection(
        &self,
        mapping_key: MappingKey,
        ip_dest: Ipv4Addr,
        port_dest: u16,
        now: u64,
    ) {
        let mut state = self.state.lock();
        if let Some(mapping) = state.mappings.get_mut(&mapping_key) {
            if let Some(conn) = mapping
                .conns
                .iter_mut()
                .find(|c| c.key() == ConnectionKey { ip_dest, port_dest })
            {
                conn.last_used = now;
            }
        }
    }

    /// Adds a connection in `syn_sent`; no-op if one already exists for this remote
    /// endpoint.
    pub fn insert_connection(
        &self,
        mapping_key: MappingKey,
        ip_dest: Ipv4Addr,
        port_dest: u16,
        now: u64,
    ) {
        let mut state = self.state.lock();
        let Some(mapping) = state.mappings.get_mut(&mapping_key) else {
            return;
        };
        let exists = mapping
            .conns
            .iter()
            .any(|c| c.key() == ConnectionKey { ip_dest, port_dest });
        if !exists {
            mapping.conns.push(NatConnection {
                ip_dest,
                port_dest,
                state: TcpConnState::SynSent,
                last_used: now,
            });
        }
    }

    pub fn park_unsolicited(
        &self,
        ip: Ipv4Addr,
        port: u16,
        frame: Vec<u8>,
        out_iface: String,
        now: u64,
    ) {
        self.state.lock().pending.push(PendingUnsolicited {
            ip,
            port,
            recv_at: now,
            frame,
            out_iface,
        });
    }

    /// Removes any parked entry matching `(ip, port)` without side effects — used when
    /// a matching outbound SYN creates the mapping before the parking timeout fires.
    pub fn resolve_or_drop_pending(&self, ip: Ipv4Addr, port: u16) {
        self.state
            .lock()
            .pending
            .retain(|p| !(p.ip == ip && p.port == port));
    }

    /// Drives the 1 Hz timeout loop: expires idle mappings/connections and parked
    /// SYNs, returning the ICMP Port Unreachable actions the caller must perform for
    /// anything that timed out unclaimed.
    pub fn tick(
        &self,
        now: u64,
        icmp_timeout: u64,
        tcp_transitory_timeout: u64,
        tcp_established_timeout: u64,
    ) -> Vec<NatTickAction> {
        let mut state = self.state.lock();

        let mut expired_external_keys = Vec::new();
        state.mappings.retain(|key, mapping| {
            let keep = match mapping.ty {
                NatMappingType::Icmp => now.saturating_sub(mapping.last_used) <= icmp_timeout,
                NatMappingType::Tcp => {
                    mapping.conns.retain(|conn| {
                        let timeout = if conn.state.is_established() {
                            tcp_established_timeout
                        } else {
                            tcp_transitory_timeout
                        };
                        now.saturating_sub(conn.last_used) <= timeout
                    });
                    !mapping.conns.is_empty()
                }
            };
            if !keep {
                expired_external_keys.push(ExternalKey {
                    ty: mapping.ty,
                    aux_ext: mapping.aux_ext,
                });
                let _ = key;
            }
            keep
        });
        for key in expired_external_keys {
            state.by_external.remove(&key);
        }

        let mut actions = Vec::new();
        let (expired, remaining): (Vec<_>, Vec<_>) = state
            .pending
            .drain(..)
            .partition(|p| now.saturating_sub(p.recv_at) >= PENDING_UNSOLICITED_TIMEOUT_SECS);
        state.pending = remaining;
        for p in expired {
            actions.push(NatTickAction::PortUnreachable {
                frame: p.frame,
                out_iface: p.out_iface,
            });
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ext_ip() -> Ipv4Addr {
        Ipv4Addr::new(203, 0, 113, 1)
    }

    #[test]
    fn insert_then_lookup_both_directions() {
        let table = NatTable::new();
        let int_ip = Ipv4Addr::new(10, 0, 1, 100);
        let mapping = table.insert_or_touch(int_ip, 0x1234, NatMappingType::Icmp, ext_ip(), 0);
        assert_eq!(mapping.aux_ext, 1);

        let by_internal = table
            .lookup_internal(int_ip, 0x1234, NatMappingType::Icmp)
            .unwrap();
        assert_eq!(by_internal, mapping);

        let by_external = table
            .lookup_external(mapping.aux_ext, NatMappingType::Icmp)
            .unwrap();
        assert_eq!(by_external, mapping);
    }

    #[test]
    fn repeated_insert_or_touch_reuses_mapping() {
        let table = NatTable::new();
        let int_ip = Ipv4Addr::new(10, 0, 1, 100);
        let first = table.insert_or_touch(int_ip, 53000, NatMappingType::Tcp, ext_ip(), 0);
        let second = table.insert_or_touch(int_ip, 53000, NatMappingType::Tcp, ext_ip(), 5);
        assert_eq!(first.aux_ext, second.aux_ext);
        assert_eq!(second.last_used, 5);
    }

    #[test]
    fn tcp_aux_ext_allocation_is_lowest_free_port() {
        let table = NatTable::new();
        let m1 = table.insert_or_touch(Ipv4Addr::new(10, 0, 1, 1), 1, NatMappingType::Tcp, ext_ip(), 0);
        let m2 = table.insert_or_touch(Ipv4Addr::new(10, 0, 1, 2), 2, NatMappingType::Tcp, ext_ip(), 0);
        assert_eq!(m1.aux_ext, 1024);
        assert_eq!(m2.aux_ext, 1025);
    }

    #[test]
    fn tcp_connection_transitions() {
        let table = NatTable::new();
        let int_ip = Ipv4Addr::new(10, 0, 1, 1);
        let mapping = table.insert_or_touch(int_ip, 40000, NatMappingType::Tcp, ext_ip(), 0);
        let key = mapping.key();
        let dst = Ipv4Addr::new(8, 8, 8, 8);

        table.insert_connection(key, dst, 443, 0);
        assert_eq!(
            table.get_connection(key, dst, 443).unwrap().state,
            TcpConnState::SynSent
        );

        assert!(table.update_connection_state(
            key,
            dst,
            443,
            TcpConnState::SynSent,
            TcpConnState::SynRecv,
            1
        ));
        assert!(!table.update_connection_state(
            key,
            dst,
            443,
            TcpConnState::SynSent,
            TcpConnState::Established,
            2
        ));
        assert_eq!(
            table.get_connection(key, dst, 443).unwrap().state,
            TcpConnState::SynRecv
        );
    }

    #[test]
    fn tcp_mapping_gc_when_connections_empty() {
        let table = NatTable::new();
        let int_ip = Ipv4Addr::new(10, 0, 1, 1);
        let mapping = table.insert_or_touch(int_ip, 40000, NatMappingType::Tcp, ext_ip(), 0);
        table.insert_connection(mapping.key(), Ipv4Addr::new(8, 8, 8, 8), 443, 0);

        table.tick(400, 60, 300, 7440); // idle past transitory timeout, still syn_sent
        assert!(table
            .lookup_internal(int_ip, 40000, NatMappingType::Tcp)
            .is_none());
    }

    #[test]
    fn icmp_mapping_survives_until_timeout() {
        let table = NatTable::new();
        let int_ip = Ipv4Addr::new(10, 0, 1, 1);
        table.insert_or_touch(int_ip, 7, NatMappingType::Icmp, ext_ip(), 0);
        table.tick(59, 60, 300, 7440);
        assert!(table.lookup_internal(int_ip, 7, NatMappingType::Icmp).is_some());
        table.tick(61, 60, 300, 7440);
        assert!(table.lookup_internal(int_ip, 7, NatMappingType::Icmp).is_none());
    }

    #[test]
    fn pending_unsolicited_resolved_before_timeout() {
        let table = NatTable::new();
        let ip = Ipv4Addr::new(198, 51, 100, 2);
        table.park_unsolicited(ip, 5000, vec![1, 2, 3], "eth2".into(), 0);
        table.resolve_or_drop_pending(ip, 5000);
        let actions = table.tick(10, 60, 300, 7440);
        assert!(actions.is_empty());
    }

    #[test]
    fn pending_unsolicited_times_out_to_port_unreachable() {
        let table = NatTable::new();
        let ip = Ipv4Addr::new(198, 51, 100, 2);
        table.park_unsolicited(ip, 5000, vec![9, 9], "eth2".into(), 0);
        let actions = table.tick(6, 60, 300, 7440);
        assert_eq!(
            actions,
            vec![NatTickAction::PortUnreachable {
                frame: vec![9, 9],
                out_iface: "eth2".into()
            }]
        );
    }
}
