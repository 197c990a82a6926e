//! TOML configuration file format ([EXTERNAL INTERFACES] §6): interfaces, static
//! routes, and the router-wide options `router-core`'s [`RouterConfig`] expects.

use anyhow::{bail, Context, Result};
use router_core::codec::MacAddr;
use router_core::config::RouterConfig;
use router_core::interface::Interface;
use router_core::route::{Route, RoutingTable};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawFile {
    router: RawRouter,
    #[serde(default)]
    interface: Vec<RawInterface>,
    #[serde(default)]
    route: Vec<RawRoute>,
}

#[derive(Debug, Deserialize)]
struct RawRouter {
    internal_iface: String,
    external_iface: String,
    #[serde(default)]
    nat_enabled: bool,
    #[serde(default = "default_icmp_timeout")]
    icmp_timeout_secs: u64,
    #[serde(default = "default_tcp_transitory_timeout")]
    tcp_transitory_timeout_secs: u64,
    #[serde(default = "default_tcp_established_timeout")]
    tcp_established_timeout_secs: u64,
}

fn default_icmp_timeout() -> u64 {
    RouterConfig::default().icmp_timeout_secs
}

fn default_tcp_transitory_timeout() -> u64 {
    RouterConfig::default().tcp_transitory_timeout_secs
}

fn default_tcp_established_timeout() -> u64 {
    RouterConfig::default().tcp_established_timeout_secs
}

fn unspecified_ipv4() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

#[derive(Debug, Deserialize)]
struct RawInterface {
    name: String,
    mac: String,
    ip: Ipv4Addr,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    dest: Ipv4Addr,
    mask: Ipv4Addr,
    #[serde(default = "unspecified_ipv4")]
    gateway: Ipv4Addr,
    iface: String,
}

pub struct LoadedConfig {
    pub router: RouterConfig,
    pub interfaces: Vec<Interface>,
    pub routes: RoutingTable,
}

/// Loads and validates a router configuration file. Errors on anything a running
/// router cannot recover from: an unparseable MAC, a route naming an interface that
/// doesn't exist, or an `internal_iface`/`external_iface` that isn't defined.
pub fn load(path: &Path) -> Result<LoadedConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let raw: RawFile = toml::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    let mut interfaces = Vec::with_capacity(raw.interface.len());
    for iface in raw.interface {
        interfaces.push(Interface {
            mac: parse_mac(&iface.mac)
                .with_context(|| format!("interface {}: invalid MAC address", iface.name))?,
            name: iface.name,
            ip: iface.ip,
        });
    }

    let known = |name: &str| interfaces.iter().any(|i| i.name == name);
    if !known(&raw.router.internal_iface) {
        bail!(
            "internal_iface {:?} is not defined in [[interface]]",
            raw.router.internal_iface
        );
    }
    if !known(&raw.router.external_iface) {
        bail!(
            "external_iface {:?} is not defined in [[interface]]",
            raw.router.external_iface
        );
    }

    let mut routes = RoutingTable::default();
    for route in raw.route {
        if !known(&route.iface) {
            bail!("route to {} names unknown interface {:?}", route.dest, route.iface);
        }
        routes.push(Route {
            dest: route.dest,
            mask: route.mask,
            gateway: route.gateway,
            out_iface: route.iface,
        });
    }

    Ok(LoadedConfig {
        router: RouterConfig {
            internal_iface: raw.router.internal_iface,
            external_iface: raw.router.external_iface,
            nat_enabled: raw.router.nat_enabled,
            icmp_timeout_secs: raw.router.icmp_timeout_secs,
            tcp_transitory_timeout_secs: raw.router.tcp_transitory_timeout_secs,
            tcp_established_timeout_secs: raw.router.tcp_established_timeout_secs,
        },
        interfaces,
        routes,
    })
}

fn parse_mac(s: &str) -> Result<MacAddr> {
    let mut octets = [0u8; 6];
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        bail!("expected 6 colon-separated octets, got {}", parts.len());
    }
    for (octet, part) in octets.iter_mut().zip(parts) {
        *octet = u8::from_str_radix(part, 16).with_context(|| format!("invalid hex octet {part:?}"))?;
    }
    Ok(MacAddr::new(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let dir = tempdir();
        let path = dir.join("router.toml");
        std::fs::write(
            &path,
            r#"
            [router]
            internal_iface = "eth1"
            external_iface = "eth2"
            nat_enabled = true

            [[interface]]
            name = "eth1"
            mac = "02:00:00:00:00:01"
            ip = "10.0.1.1"

            [[interface]]
            name = "eth2"
            mac = "02:00:00:00:00:02"
            ip = "192.168.0.1"

            [[route]]
            dest = "10.0.1.0"
            mask = "255.255.255.0"
            iface = "eth1"

            [[route]]
            dest = "0.0.0.0"
            mask = "0.0.0.0"
            gateway = "192.168.0.254"
            iface = "eth2"
            "#,
        )
        .unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.router.nat_enabled);
        assert_eq!(loaded.interfaces.len(), 2);
        assert!(loaded
            .routes
            .lpm(Ipv4Addr::new(10, 0, 1, 50))
            .is_some_and(|r| r.out_iface == "eth1"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_route_to_unknown_interface() {
        let dir = tempdir();
        let path = dir.join("bad.toml");
        std::fs::write(
            &path,
            r#"
            [router]
            internal_iface = "eth1"
            external_iface = "eth2"

            [[interface]]
            name = "eth1"
            mac = "02:00:00:00:00:01"
            ip = "10.0.1.1"
            [[interface]]
            name = "eth2"
            mac = "02:00:00:00:00:02"
            ip = "192.168.0.1"

            [[route]]
            dest = "0.0.0.0"
            mask = "0.0.0.0"
            iface = "eth3"
            "#,
        )
        .unwrap();

        assert!(load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("router-cli-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
