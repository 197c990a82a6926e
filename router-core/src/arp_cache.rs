//! Concurrent ARP cache with a per-IP request/retry control loop ([COMPONENT DESIGN] §4.3).
//!
//! The cache and its pending-request table share one lock. `tick()` only computes and
//! returns the actions the caller should perform; it never calls back into the cache
//! itself, so a plain mutex is sufficient.

use crate::codec::MacAddr;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;

pub const ARP_ENTRY_TTL_SECS: u64 = 15;
pub const ARP_RETRY_INTERVAL_SECS: u64 = 1;
pub const ARP_MAX_RETRIES: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub inserted_at: u64,
}

/// An Ethernet frame parked awaiting ARP resolution, together with the interface it
/// should ultimately be sent on. Owned, not borrowed — see [DESIGN NOTES] on
/// ownership of the pending-unsolicited queue, which applies equally here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPacket {
    pub frame: Vec<u8>,
    pub out_iface: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpRequest {
    pub target_ip: Ipv4Addr,
    pub sent_count: u8,
    pub last_sent_at: u64,
    pub waiting: Vec<PendingPacket>,
}

/// What the retry tick wants the caller to do; the cache itself never touches the
/// network (see [`crate::interface::NetworkIo`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpTickAction {
    /// Broadcast an ARP request for `target_ip` on `out_iface`.
    Broadcast { target_ip: Ipv4Addr, out_iface: String },
    /// The retry budget is exhausted; emit ICMP Host Unreachable for every packet
    /// that was waiting on `target_ip`.
    GiveUp {
        target_ip: Ipv4Addr,
        waiting: Vec<PendingPacket>,
    },
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<Ipv4Addr, ArpEntry>,
    requests: HashMap<Ipv4Addr, ArpRequest>,
}

#[derive(Debug, Default)]
pub struct ArpCache {
    state: Mutex<State>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<ArpEntry> {
        self.state.lock().entries.get(&ip).cloned()
    }

    /// Upserts `(ip, mac)`, refreshing `inserted_at`. If a request was pending for
    /// `ip`, it is removed from the table and returned so the caller can drain its
    /// queued packets.
    pub fn insert(&self, ip: Ipv4Addr, mac: MacAddr, now: u64) -> Option<ArpRequest> {
        let mut state = self.state.lock();
        state.entries.insert(
            ip,
            ArpEntry {
                ip,
                mac,
                inserted_at: now,
            },
        );
        state.requests.remove(&ip)
    }

    /// Queues `frame` for delivery to `ip` once it resolves, creating the request if
    /// none existed yet.
    pub fn queue(&self, ip: Ipv4Addr, frame: Vec<u8>, out_iface: String) {
        let mut state = self.state.lock();
        let request = state.requests.entry(ip).or_insert_with(|| ArpRequest {
            target_ip: ip,
            sent_count: 0,
            last_sent_at: 0,
            waiting: Vec::new(),
        });
        request.waiting.push(PendingPacket { frame, out_iface });
    }

    /// Drives the 1 Hz retry/eviction loop. Returns the actions the caller must
    /// perform (broadcasts, give-ups) and removes any entries older than
    /// [`ARP_ENTRY_TTL_SECS`].
    pub fn tick(&self, now: u64) -> Vec<ArpTickAction> {
        let mut state = self.state.lock();

        state
            .entries
            .retain(|_, entry| now.saturating_sub(entry.inserted_at) < ARP_ENTRY_TTL_SECS);

        let mut actions = Vec::new();
        let mut to_remove = Vec::new();

        for request in state.requests.values_mut() {
            if now.saturating_sub(request.last_sent_at) < ARP_RETRY_INTERVAL_SECS {
                continue;
            }

            if request.sent_count >= ARP_MAX_RETRIES {
                to_remove.push(request.target_ip);
                actions.push(ArpTickAction::GiveUp {
                    target_ip: request.target_ip,
                    waiting: std::mem::take(&mut request.waiting),
                });
            } else {
                // One request can have packets queued for several output interfaces
                // only in principle; in practice every waiter shares the next hop's
                // interface, so broadcasting once per interface covers them all.
                let mut ifaces: Vec<&str> =
                    request.waiting.iter().map(|p| p.out_iface.as_str()).collect();
                ifaces.sort_unstable();
                ifaces.dedup();
                for iface in ifaces {
                    actions.push(ArpTickAction::Broadcast {
                        target_ip: request.target_ip,
                        out_iface: iface.to_string(),
                    });
                }
                request.sent_count += 1;
                request.last_sent_at = now;
            }
        }

        for ip in to_remove {
            state.requests.remove(&ip);
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_satisfies_pending_request() {
        let cache = ArpCache::new();
        cache.queue(Ipv4Addr::new(10, 0, 1, 2), vec![1, 2, 3], "eth1".into());

        let satisfied = cache
            .insert(Ipv4Addr::new(10, 0, 1, 2), MacAddr([1; 6]), 5)
            .expect("pending request should be returned");
        assert_eq!(satisfied.waiting.len(), 1);
        assert!(cache.lookup(Ipv4Addr::new(10, 0, 1, 2)).is_some());
    }

    #[test]
    fn retry_exhaustion_gives_up_after_five() {
        let cache = ArpCache::new();
        cache.queue(Ipv4Addr::new(10, 0, 1, 2), vec![9], "eth1".into());

        let mut now = 0;
        for _ in 0..5 {
            let actions = cache.tick(now);
            assert!(matches!(actions.as_slice(), [ArpTickAction::Broadcast { .. }]));
            now += ARP_RETRY_INTERVAL_SECS;
        }

        let actions = cache.tick(now);
        assert!(matches!(
            actions.as_slice(),
            [ArpTickAction::GiveUp { waiting, .. }] if waiting.len() == 1
        ));
        assert!(cache.tick(now + 1).is_empty());
    }

    #[test]
    fn entries_evicted_after_ttl() {
        let cache = ArpCache::new();
        cache.insert(Ipv4Addr::new(10, 0, 1, 2), MacAddr([1; 6]), 0);
        cache.tick(ARP_ENTRY_TTL_SECS - 1);
        assert!(cache.lookup(Ipv4Addr::new(10, 0, 1, 2)).is_some());
        cache.tick(ARP_ENTRY_TTL_SECS);
        assert!(cache.lookup(Ipv4Addr::new(10, 0, 1, 2)).is_none());
    }
}
