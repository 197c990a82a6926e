use crate::arp_cache::ArpCache;
use crate::codec::MacAddr;
use crate::config::RouterConfig;
use crate::interface::{Interface, NetworkIo};
use crate::nat::NatTable;
use crate::route::RoutingTable;
use crate::time::Clock;
use std::net::Ipv4Addr;

/// Owns every shared table the data plane touches. Cheap to share across threads:
/// clone the `Arc<Router<_, _>>`, not the router itself — each table is internally
/// locked, and lookups return owned copies (see module docs on
/// [`crate::arp_cache::ArpCache`] and [`crate::nat::NatTable`]).
pub struct Router<C, IO> {
    pub(crate) config: RouterConfig,
    pub(crate) interfaces: Vec<Interface>,
    pub(crate) routes: RoutingTable,
    pub(crate) arp: ArpCache,
    pub(crate) nat: NatTable,
    pub(crate) clock: C,
    pub(crate) io: IO,
}

impl<C: Clock, IO: NetworkIo> Router<C, IO> {
    pub fn new(
        config: RouterConfig,
        interfaces: Vec<Interface>,
        routes: RoutingTable,
        clock: C,
        io: IO,
    ) -> Self {
        Self {
            config,
            interfaces,
            routes,
            arp: ArpCache::new(),
            nat: NatTable::new(),
            clock,
            io,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp
    }

    pub fn nat_table(&self) -> &NatTable {
        &self.nat
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn iface_by_name(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn iface_by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.ip == ip)
    }

    pub fn is_local_ip(&self, ip: Ipv4Addr) -> bool {
        self.iface_by_ip(ip).is_some()
    }

    pub fn is_internal(&self, iface: &str) -> bool {
        iface == self.config.internal_iface
    }

    pub fn internal_iface(&self) -> Option<&Interface> {
        self.iface_by_name(&self.config.internal_iface)
    }

    pub fn external_iface(&self) -> Option<&Interface> {
        self.iface_by_name(&self.config.external_iface)
    }

    pub(crate) fn send(&self, frame: &[u8], iface: &str) {
        self.io.send(frame, iface);
    }

    pub(crate) fn mac_of(&self, iface: &str) -> Option<MacAddr> {
        self.iface_by_name(iface).map(|i| i.mac)
    }
}
