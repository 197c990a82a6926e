//! The dispatch core ([COMPONENT DESIGN] §4.7): ARP vs IPv4, local vs forward,
//! NAT translation in both directions, checksum validation, TTL policy.
//!
//! TTL bookkeeping: decrementing and recomputing the IP checksum happens exactly once,
//! at the point a packet is committed to a route (`forward_plain`/`forward_nat_egress`/
//! `forward_translated_in`), not when a queued packet is later drained off the ARP
//! cache. This resolves an ambiguity in the source material, where the retry/resolve
//! step and the forward step both read as decrementing TTL — see DESIGN.md.

use crate::arp_cache::{ArpTickAction, PendingPacket};
use crate::codec::arp::{ArpOpcode, ArpPacket};
use crate::codec::ethernet::{EthernetHeader, ETHERTYPE_ARP, ETHERTYPE_IPV4};
use crate::codec::icmp::{
    self, IcmpEcho, CODE_HOST_UNREACHABLE, CODE_NET_UNREACHABLE, CODE_PORT_UNREACHABLE,
};
use crate::codec::ipv4::{Ipv4Header, PROTO_ICMP, PROTO_TCP};
use crate::codec::tcp::TcpHeader;
use crate::codec::{build_frame, parse_frame, ParsedFrame};
use crate::icmp_responder;
use crate::interface::NetworkIo;
use crate::nat::table::NatTickAction;
use crate::nat::{NatMappingType, TcpConnState};
use crate::route::Route;
use crate::router::Router;
use crate::time::Clock;
use std::net::Ipv4Addr;

const SSH_PORT: u16 = 22;

impl<C: Clock, IO: NetworkIo> Router<C, IO> {
    /// Entry point for every inbound Ethernet frame. Never returns an error to the
    /// caller: parse failures and checksum mismatches are dropped silently, everything
    /// else either completes or emits an ICMP message.
    pub fn handle_frame(&self, frame: &[u8], arrival_iface: &str) {
        let Ok(parsed) = parse_frame(frame) else {
            tracing::trace!(iface = arrival_iface, "dropping unparseable frame");
            return;
        };

        match parsed {
            ParsedFrame::Arp { arp, .. } => self.handle_arp(arp, arrival_iface),
            ParsedFrame::Ipv4 { ip, payload, .. } => self.handle_ipv4(ip, payload, arrival_iface),
        }
    }

    fn handle_arp(&self, arp: ArpPacket, arrival_iface: &str) {
        let now = self.now();

        match arp.opcode {
            ArpOpcode::Request => {
                if let Some(satisfied) = self.arp.insert(arp.sender_ip, arp.sender_mac, now) {
                    self.drain_arp_queue(arp.sender_mac, satisfied);
                }

                let Some(iface) = self.iface_by_name(arrival_iface) else {
                    return;
                };

                let reply = ArpPacket {
                    opcode: ArpOpcode::Reply,
                    sender_mac: iface.mac,
                    sender_ip: iface.ip,
                    target_mac: arp.sender_mac,
                    target_ip: arp.sender_ip,
                };
                let eth = EthernetHeader {
                    dst: arp.sender_mac,
                    src: iface.mac,
                    ethertype: ETHERTYPE_ARP,
                };
                self.send(&build_frame(&eth, &reply.to_bytes()), arrival_iface);
            }
            ArpOpcode::Reply => {
                if !self.is_local_ip(arp.target_ip) {
                    return;
                }
                if let Some(satisfied) = self.arp.insert(arp.sender_ip, arp.sender_mac, now) {
                    self.drain_arp_queue(arp.sender_mac, satisfied);
                }
            }
        }
    }

    fn drain_arp_queue(&self, resolved_mac: crate::codec::MacAddr, request: crate::arp_cache::ArpRequest) {
        for pending in request.waiting {
            self.send_with_mac(&pending.frame, &pending.out_iface, resolved_mac);
        }
    }

    fn handle_ipv4(&self, ip: Ipv4Header, payload: Vec<u8>, arrival_iface: &str) {
        if !ip.verify_checksum() {
            tracing::trace!("dropping IPv4 packet with bad header checksum");
            return;
        }

        if self.is_local_ip(ip.dst) {
            self.handle_local(ip, payload, arrival_iface);
        } else {
            self.handle_forward(ip, payload, arrival_iface);
        }
    }

    fn handle_local(&self, ip: Ipv4Header, payload: Vec<u8>, arrival_iface: &str) {
        let nat_active = self.config.nat_enabled && !self.is_internal(arrival_iface);

        if !nat_active {
            self.handle_local_no_nat(ip, payload);
        } else {
            self.handle_local_nat_in(ip, payload, arrival_iface);
        }
    }

    fn handle_local_no_nat(&self, ip: Ipv4Header, payload: Vec<u8>) {
        if ip.protocol == PROTO_ICMP {
            if let Ok(echo) = IcmpEcho::parse(&payload) {
                if echo.ty == icmp::ICMP_TYPE_ECHO_REQUEST && echo.verify_checksum() {
                    let (reply_ip, reply_echo) = icmp_responder::echo_reply(&ip, &echo);
                    self.originate(reply_ip, reply_echo.to_bytes());
                    return;
                }
            }
        }
        self.emit_port_unreachable(&ip, &payload, ip.dst);
    }

    fn handle_local_nat_in(&self, ip: Ipv4Header, payload: Vec<u8>, arrival_iface: &str) {
        match ip.protocol {
            PROTO_ICMP => self.handle_nat_in_icmp(ip, payload),
            PROTO_TCP => self.handle_nat_in_tcp(ip, payload, arrival_iface),
            _ => self.emit_port_unreachable(&ip, &payload, ip.dst),
        }
    }

    fn handle_nat_in_icmp(&self, ip: Ipv4Header, payload: Vec<u8>) {
        let Ok(echo) = IcmpEcho::parse(&payload) else {
            return;
        };
        let Some(mapping) = self.nat.lookup_external(echo.identifier, NatMappingType::Icmp) else {
            tracing::trace!(id = echo.identifier, "no NAT mapping for inbound ICMP id");
            return;
        };

        let mut rewritten = echo;
        rewritten.identifier = mapping.aux_int;
        rewritten.recompute_checksum();

        let mut new_ip = ip;
        new_ip.dst = mapping.ip_int;
        self.forward_translated_in(new_ip, rewritten.to_bytes());
    }

    fn handle_nat_in_tcp(&self, ip: Ipv4Header, payload: Vec<u8>, arrival_iface: &str) {
        let Ok(tcp) = TcpHeader::parse(&payload) else {
            return;
        };
        let now = self.now();

        let is_bare_syn = tcp.flags.syn && !tcp.flags.ack;

        match self.nat.lookup_external(tcp.dst_port, NatMappingType::Tcp) {
            Some(mapping) => {
                let key = mapping.key();
                if self
                    .nat
                    .get_connection(key, ip.src, tcp.src_port)
                    .is_none()
                {
                    self.nat.insert_connection(key, ip.src, tcp.src_port, now);
                }
                if tcp.flags.syn {
                    self.nat.update_connection_state(
                        key,
                        ip.src,
                        tcp.src_port,
                        TcpConnState::SynSent,
                        TcpConnState::SynRecv,
                        now,
                    );
                } else {
                    self.nat.touch_connection(key, ip.src, tcp.src_port, now);
                }

                let mut new_ip = ip;
                new_ip.dst = mapping.ip_int;
                let mut new_tcp = tcp;
                new_tcp.dst_port = mapping.aux_int;
                new_tcp.recompute_checksum(new_ip.src, new_ip.dst);

                self.forward_translated_in(new_ip, new_tcp.to_bytes());
            }
            None if tcp.dst_port == SSH_PORT => {
                self.emit_port_unreachable(&ip, &payload, ip.dst);
            }
            None if is_bare_syn && tcp.dst_port >= 1024 => {
                let mut bytes = ip.to_bytes().to_vec();
                bytes.extend_from_slice(&payload);
                self.nat
                    .park_unsolicited(ip.src, tcp.dst_port, bytes, arrival_iface.to_string(), now);
            }
            None => {
                self.emit_port_unreachable(&ip, &payload, ip.dst);
            }
        }
    }

    fn handle_forward(&self, ip: Ipv4Header, payload: Vec<u8>, arrival_iface: &str) {
        if ip.ttl <= 1 {
            self.emit_time_exceeded(&ip, &payload, arrival_iface);
            return;
        }

        if self.config.nat_enabled && self.is_internal(arrival_iface) {
            self.forward_nat_egress(ip, payload, arrival_iface);
        } else {
            self.forward_plain(ip, payload, arrival_iface);
        }
    }

    fn forward_plain(&self, ip: Ipv4Header, payload: Vec<u8>, arrival_iface: &str) {
        let Some(route) = self.routes.lpm(ip.dst) else {
            self.emit_net_unreachable(&ip, &payload, arrival_iface);
            return;
        };

        let mut fwd_ip = ip;
        fwd_ip.ttl -= 1;
        fwd_ip.recompute_checksum();

        let next_hop = next_hop_for(&route, fwd_ip.dst);
        self.queue_or_send(fwd_ip, payload, &route.out_iface, next_hop);
    }

    fn forward_nat_egress(&self, ip: Ipv4Header, payload: Vec<u8>, arrival_iface: &str) {
        let Some(route) = self.routes.lpm(ip.dst) else {
            self.emit_net_unreachable(&ip, &payload, arrival_iface);
            return;
        };
        let Some(ext_ip) = self.external_iface().map(|i| i.ip) else {
            return;
        };
        let now = self.now();

        match ip.protocol {
            PROTO_ICMP => {
                let Ok(echo) = IcmpEcho::parse(&payload) else { return };
                if echo.ty != icmp::ICMP_TYPE_ECHO_REQUEST {
                    return;
                }
                let mapping = self
                    .nat
                    .insert_or_touch(ip.src, echo.identifier, NatMappingType::Icmp, ext_ip, now);

                let mut new_echo = echo;
                new_echo.identifier = mapping.aux_ext;
                new_echo.recompute_checksum();

                let mut new_ip = ip;
                new_ip.src = mapping.ip_ext;
                new_ip.ttl -= 1;
                new_ip.recompute_checksum();

                let next_hop = next_hop_for(&route, new_ip.dst);
                self.queue_or_send(new_ip, new_echo.to_bytes(), &route.out_iface, next_hop);
            }
            PROTO_TCP => {
                let Ok(tcp) = TcpHeader::parse(&payload) else { return };
                let mapping =
                    self.nat
                        .insert_or_touch(ip.src, tcp.src_port, NatMappingType::Tcp, ext_ip, now);
                let key = mapping.key();

                if self
                    .nat
                    .get_connection(key, ip.dst, tcp.dst_port)
                    .is_none()
                {
                    self.nat.insert_connection(key, ip.dst, tcp.dst_port, now);
                    self.nat.resolve_or_drop_pending(ip.dst, mapping.aux_ext);
                }

                if tcp.flags.ack && !tcp.flags.syn {
                    self.nat.update_connection_state(
                        key,
                        ip.dst,
                        tcp.dst_port,
                        TcpConnState::SynRecv,
                        TcpConnState::Established,
                        now,
                    );
                } else if tcp.flags.is_empty() {
                    let blocked = self
                        .nat
                        .get_connection(key, ip.dst, tcp.dst_port)
                        .is_some_and(|c| !c.state.is_established());
                    if blocked {
                        return;
                    }
                    self.nat.touch_connection(key, ip.dst, tcp.dst_port, now);
                } else {
                    self.nat.touch_connection(key, ip.dst, tcp.dst_port, now);
                }

                let mut new_ip = ip;
                new_ip.src = mapping.ip_ext;
                new_ip.ttl -= 1;
                let mut new_tcp = tcp;
                new_tcp.src_port = mapping.aux_ext;
                new_tcp.recompute_checksum(new_ip.src, new_ip.dst);
                new_ip.recompute_checksum();

                let next_hop = next_hop_for(&route, new_ip.dst);
                self.queue_or_send(new_ip, new_tcp.to_bytes(), &route.out_iface, next_hop);
            }
            _ => {
                // Non-goal: NAT only covers ICMP echo and TCP.
            }
        }
    }

    /// Routes a NAT-translated packet on to its (now-internal) destination. This is
    /// "local delivery" in the spec's taxonomy, not "forward": a routing miss or a
    /// fresh TTL-exceeded here is not escalated to the sender, it's just dropped —
    /// the mapping pointed somewhere we can no longer reach.
    fn forward_translated_in(&self, mut ip: Ipv4Header, payload: Vec<u8>) {
        let Some(route) = self.routes.lpm(ip.dst) else {
            return;
        };
        ip.ttl = ip.ttl.saturating_sub(1);
        ip.recompute_checksum();
        let next_hop = next_hop_for(&route, ip.dst);
        self.queue_or_send(ip, payload, &route.out_iface, next_hop);
    }

    /// Sends a packet this router itself created (ICMP echo reply or error). TTL is
    /// already the fresh default set by [`crate::icmp_responder`]; it is not
    /// decremented again here.
    fn originate(&self, ip: Ipv4Header, payload: Vec<u8>) {
        let Some(route) = self.routes.lpm(ip.dst) else {
            tracing::trace!(dst = %ip.dst, "no route for originated packet, dropping");
            return;
        };
        let next_hop = next_hop_for(&route, ip.dst);
        self.queue_or_send(ip, payload, &route.out_iface, next_hop);
    }

    fn queue_or_send(&self, ip: Ipv4Header, payload: Vec<u8>, out_iface: &str, next_hop: Ipv4Addr) {
        let mut bytes = ip.to_bytes().to_vec();
        bytes.extend_from_slice(&payload);

        match self.arp.lookup(next_hop) {
            Some(entry) => self.send_with_mac(&bytes, out_iface, entry.mac),
            None => self.arp.queue(next_hop, bytes, out_iface.to_string()),
        }
    }

    fn send_with_mac(&self, ip_bytes: &[u8], out_iface: &str, dst_mac: crate::codec::MacAddr) {
        let Some(src_mac) = self.mac_of(out_iface) else {
            return;
        };
        let eth = EthernetHeader {
            dst: dst_mac,
            src: src_mac,
            ethertype: ETHERTYPE_IPV4,
        };
        self.send(&build_frame(&eth, ip_bytes), out_iface);
    }

    fn emit_time_exceeded(&self, ip: &Ipv4Header, payload: &[u8], arrival_iface: &str) {
        let Some(iface) = self.iface_by_name(arrival_iface) else {
            return;
        };
        let header_bytes = ip.to_bytes();
        let (err_ip, err) = icmp_responder::time_exceeded(iface.ip, ip.src, &header_bytes, payload);
        self.originate(err_ip, err.to_bytes());
    }

    fn emit_net_unreachable(&self, ip: &Ipv4Header, payload: &[u8], arrival_iface: &str) {
        let Some(iface) = self.iface_by_name(arrival_iface) else {
            return;
        };
        let header_bytes = ip.to_bytes();
        let (err_ip, err) =
            icmp_responder::dest_unreachable(CODE_NET_UNREACHABLE, iface.ip, ip.src, &header_bytes, payload);
        self.originate(err_ip, err.to_bytes());
    }

    fn emit_port_unreachable(&self, ip: &Ipv4Header, payload: &[u8], source_ip: Ipv4Addr) {
        let header_bytes = ip.to_bytes();
        let (err_ip, err) =
            icmp_responder::dest_unreachable(CODE_PORT_UNREACHABLE, source_ip, ip.src, &header_bytes, payload);
        self.originate(err_ip, err.to_bytes());
    }

    /// Drives the 1 Hz ARP retry/eviction tick; see [`crate::timeout`].
    pub(crate) fn apply_arp_tick(&self, action: ArpTickAction) {
        match action {
            ArpTickAction::Broadcast { target_ip, out_iface } => {
                let Some(iface) = self.iface_by_name(&out_iface) else {
                    return;
                };
                let request = ArpPacket {
                    opcode: ArpOpcode::Request,
                    sender_mac: iface.mac,
                    sender_ip: iface.ip,
                    target_mac: crate::codec::ethernet::BROADCAST_MAC,
                    target_ip,
                };
                let eth = EthernetHeader {
                    dst: crate::codec::ethernet::BROADCAST_MAC,
                    src: iface.mac,
                    ethertype: ETHERTYPE_ARP,
                };
                self.send(&build_frame(&eth, &request.to_bytes()), &out_iface);
            }
            ArpTickAction::GiveUp { waiting, .. } => {
                for pending in waiting {
                    self.give_up_on_pending(pending);
                }
            }
        }
    }

    fn give_up_on_pending(&self, pending: PendingPacket) {
        let Ok(ip) = Ipv4Header::parse(&pending.frame) else {
            return;
        };
        let header_len = ip.ihl_bytes();
        let payload = pending.frame.get(header_len..).unwrap_or(&[]);
        let Some(out_iface) = self.iface_by_name(&pending.out_iface) else {
            return;
        };

        let header_bytes = ip.to_bytes();
        let (err_ip, err) = icmp_responder::dest_unreachable(
            CODE_HOST_UNREACHABLE,
            out_iface.ip,
            ip.src,
            &header_bytes,
            payload,
        );
        self.originate(err_ip, err.to_bytes());
    }

    /// Drives the 1 Hz NAT timeout tick; see [`crate::timeout`].
    pub(crate) fn apply_nat_tick(&self, action: NatTickAction) {
        match action {
            NatTickAction::PortUnreachable { frame, out_iface: _ } => {
                let Ok(ip) = Ipv4Header::parse(&frame) else {
                    return;
                };
                let header_len = ip.ihl_bytes();
                let payload = frame.get(header_len..).unwrap_or(&[]);
                self.emit_port_unreachable(&ip, payload, ip.dst);
            }
        }
    }
}

fn next_hop_for(route: &Route, dst: Ipv4Addr) -> Ipv4Addr {
    if route.gateway == Ipv4Addr::UNSPECIFIED {
        dst
    } else {
        route.gateway
    }
}
