/*!
The contact manager (C9): a periodic task that activates and deactivates
contacts against wall-clock time and tells the rest of the agent when that
happens.

Grounded on `original_source/include/upcn/contact_manager.h` /
`contact_manager.c` for the activate/deactivate wakeup loop, and on the
teacher's `storage::reaper` task for the `tokio::select!` over
`sleep(next_wakeup) | notified() | cancelled()` idiom (§4.8, §5).
*/

use crate::rib::Rib;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub checking_max_period: Duration,
    pub max_concurrent_contacts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checking_max_period: Duration::from_secs(60),
            max_concurrent_contacts: 16,
        }
    }
}

/// What the manager observed this tick, for the caller to act on: contacts
/// that just ended (reschedule their bundles) and contacts that just began
/// (hand them to their CLA).
#[derive(Debug, Default)]
pub struct Tick {
    pub deactivated: Vec<u64>,
    pub activated: Vec<u64>,
}

pub struct ContactManager {
    active: std::sync::Mutex<std::collections::HashSet<u64>>,
    wakeup: hardy_async::Notify,
    config: Config,
}

impl ContactManager {
    pub fn new(config: Config) -> Self {
        Self {
            active: std::sync::Mutex::new(std::collections::HashSet::new()),
            wakeup: hardy_async::Notify::new(),
            config,
        }
    }

    /// Called by the router when it wants the manager to recheck contacts
    /// immediately rather than waiting for its next scheduled wakeup.
    pub fn request_recheck(&self) {
        self.wakeup.notify_one();
    }

    fn tick(&self, rib: &Rib, now: Instant) -> Tick {
        let mut active = self.active.lock().unwrap();

        let expired = rib.expired_contacts(now);
        for id in &expired {
            active.remove(id);
        }

        let mut activated = Vec::new();
        if active.len() < self.config.max_concurrent_contacts {
            for id in rib.newly_active_contacts(now, &active) {
                if active.len() >= self.config.max_concurrent_contacts {
                    break;
                }
                active.insert(id);
                activated.push(id);
            }
        }

        Tick {
            deactivated: expired,
            activated,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    fn next_wakeup(&self, rib: &Rib, now: Instant) -> Instant {
        rib.next_boundary(now)
            .map(|next| next.min(now + self.config.checking_max_period))
            .unwrap_or(now + self.config.checking_max_period)
    }

    /// Runs until cancelled, calling `on_tick` with whatever activated or
    /// deactivated between wakeups.
    pub async fn run(
        &self,
        rib: &Rib,
        cancel: &tokio_util::sync::CancellationToken,
        mut on_tick: impl FnMut(Tick),
    ) {
        loop {
            let now = Instant::now();
            let sleep_duration = self.next_wakeup(rib, now).saturating_duration_since(now);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {}
                _ = self.wakeup.notified() => {}
                _ = cancel.cancelled() => break,
            }

            let tick = self.tick(rib, Instant::now());
            if !tick.activated.is_empty() || !tick.deactivated.is_empty() {
                on_tick(tick);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardy_bpv7::eid::Eid;

    #[test]
    fn tick_activates_a_contact_whose_window_has_opened() {
        let rib = Rib::new();
        let now = Instant::now();
        rib.add_contact(
            Eid::Dtn("peer/".into()),
            now - Duration::from_secs(1),
            now + Duration::from_secs(60),
            1000,
            1.0,
            Vec::new(),
        );

        let manager = ContactManager::new(Config::default());
        let tick = manager.tick(&rib, now);
        assert_eq!(tick.activated.len(), 1);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn tick_deactivates_a_contact_whose_window_has_closed() {
        let rib = Rib::new();
        let now = Instant::now();
        rib.add_contact(
            Eid::Dtn("peer/".into()),
            now - Duration::from_secs(60),
            now - Duration::from_secs(1),
            1000,
            1.0,
            Vec::new(),
        );

        let manager = ContactManager::new(Config::default());
        manager.active.lock().unwrap().insert(1);
        let tick = manager.tick(&rib, now);
        assert_eq!(tick.deactivated, vec![1]);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn respects_max_concurrent_contacts() {
        let rib = Rib::new();
        let now = Instant::now();
        for i in 0..3 {
            rib.add_contact(
                Eid::Dtn(format!("peer{i}/").into()),
                now - Duration::from_secs(1),
                now + Duration::from_secs(60),
                1000,
                1.0,
                Vec::new(),
            );
        }
        let manager = ContactManager::new(Config {
            max_concurrent_contacts: 2,
            ..Config::default()
        });
        let tick = manager.tick(&rib, now);
        assert_eq!(tick.activated.len(), 2);
    }
}
