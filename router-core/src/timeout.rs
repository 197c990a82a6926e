//! The 1 Hz timeout drivers ([COMPONENT DESIGN] §4.3, §4.5): one thread sweeps the ARP
//! cache, one sweeps the NAT table, each turning expired soft state into the ICMP
//! messages the pipeline would have produced had this all happened inline.
//!
//! Grounded in the original router's single `sr_nat_timeout` thread (`sleep(1.0)` then
//! lock and sweep); here it's two threads, one per table, joined cleanly on drop
//! instead of `pthread_kill`.

use crate::interface::NetworkIo;
use crate::router::Router;
use crate::time::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Owns the two background sweep threads. Dropping it (or calling [`Self::stop`])
/// signals both threads to exit and joins them.
pub struct TimeoutDrivers {
    stop: Arc<AtomicBool>,
    arp_thread: Option<JoinHandle<()>>,
    nat_thread: Option<JoinHandle<()>>,
}

impl TimeoutDrivers {
    /// Spawns both sweep threads against `router`. `router` must be wrapped in an `Arc`
    /// since both threads, and whatever else is feeding frames in, share it.
    pub fn spawn<C, IO>(router: Arc<Router<C, IO>>) -> Self
    where
        C: Clock,
        IO: NetworkIo,
    {
        let stop = Arc::new(AtomicBool::new(false));

        let arp_thread = {
            let router = Arc::clone(&router);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("arp-timeout".into())
                .spawn(move || run_arp_loop(&router, &stop))
                .expect("failed to spawn arp-timeout thread")
        };

        let nat_thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("nat-timeout".into())
                .spawn(move || run_nat_loop(&router, &stop))
                .expect("failed to spawn nat-timeout thread")
        };

        Self {
            stop,
            arp_thread: Some(arp_thread),
            nat_thread: Some(nat_thread),
        }
    }

    /// Signals both threads to stop and waits for them to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.arp_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.nat_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimeoutDrivers {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_arp_loop<C: Clock, IO: NetworkIo>(router: &Router<C, IO>, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(TICK_INTERVAL);
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = router.now();
        for action in router.arp_cache().tick(now) {
            router.apply_arp_tick(action);
        }
    }
}

fn run_nat_loop<C: Clock, IO: NetworkIo>(router: &Router<C, IO>, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(TICK_INTERVAL);
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = router.now();
        let config = router.config();
        for action in router.nat_table().tick(
            now,
            config.icmp_timeout_secs,
            config.tcp_transitory_timeout_secs,
            config.tcp_established_timeout_secs,
        ) {
            router.apply_nat_tick(action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::interface::{Interface, RecordingIo};
    use crate::codec::MacAddr;
    use crate::route::RoutingTable;
    use crate::time::TestClock;
    use std::net::Ipv4Addr;

    fn router() -> Arc<Router<TestClock, RecordingIo>> {
        let interfaces = vec![
            Interface {
                name: "eth1".into(),
                mac: MacAddr([1; 6]),
                ip: Ipv4Addr::new(10, 0, 1, 1),
            },
            Interface {
                name: "eth2".into(),
                mac: MacAddr([2; 6]),
                ip: Ipv4Addr::new(192, 168, 0, 1),
            },
        ];
        Arc::new(Router::new(
            RouterConfig::default(),
            interfaces,
            RoutingTable::default(),
            TestClock::new(),
            RecordingIo::new(),
        ))
    }

    #[test]
    fn stop_joins_both_threads_promptly() {
        let router = router();
        let mut drivers = TimeoutDrivers::spawn(router);
        drivers.stop();
        assert!(drivers.arp_thread.is_none());
        assert!(drivers.nat_thread.is_none());
    }
}
