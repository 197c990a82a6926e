//! Longest-prefix-match routing table ([COMPONENT DESIGN] §4.2).

use ip_network::Ipv4Network;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub out_iface: String,
}

impl Route {
    fn network(&self) -> Option<Ipv4Network> {
        Ipv4Network::with_netmask(self.dest, self.mask).ok()
    }
}

/// A static set of routes, loaded once at startup. `lpm` is a pure function over the
/// loaded rows — no internal state beyond the `Vec` itself, scanned linearly on every
/// lookup exactly as [COMPONENT DESIGN] §4.2 specifies, so that ties between
/// equal-length prefixes resolve to whichever route was inserted first.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn push(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Longest-prefix match: the route with the most 1-bits in `mask` whose
    /// `(dst & mask) == dest` wins. `0.0.0.0/0` matches everything and only wins when
    /// nothing more specific does. Absent on a full miss.
    pub fn lpm(&self, dst: Ipv4Addr) -> Option<Route> {
        let mut best: Option<(&Route, u8)> = None;

        for route in &self.routes {
            let Some(network) = route.network() else {
                continue;
            };
            if !network.contains(dst) {
                continue;
            }

            let prefix_len = network.netmask();
            match best {
                Some((_, best_len)) if best_len >= prefix_len => {}
                _ => best = Some((route, prefix_len)),
            }
        }

        best.map(|(route, _)| route.clone())
    }
}
