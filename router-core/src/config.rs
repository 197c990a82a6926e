//! Recognized configuration options ([EXTERNAL INTERFACES] §6).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub internal_iface: String,
    pub external_iface: String,
    pub nat_enabled: bool,
    pub icmp_timeout_secs: u64,
    pub tcp_transitory_timeout_secs: u64,
    pub tcp_established_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            internal_iface: "eth1".to_string(),
            external_iface: "eth2".to_string(),
            nat_enabled: false,
            icmp_timeout_secs: 60,
            tcp_transitory_timeout_secs: 300,
            tcp_established_timeout_secs: 7440,
        }
    }
}
