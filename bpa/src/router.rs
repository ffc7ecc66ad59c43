/*!
The router (C7): picks which contact(s) a bundle should travel over, and how
to fragment it across them when one contact can't carry the whole thing.

Grounded on `original_source/include/upcn/router.h` (`router_get_first_route`,
`router_calculate_fragment_route`, the deterministic/opportunistic confidence
thresholds) and `original_source/components/upcn/router.c` for the
union-probability combination rule.
*/

use crate::bundle::Priority;
use crate::rib::{Contact, Rib};
use hardy_bpv7::eid::Eid;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub deterministic_threshold: f32,
    pub opportunistic_threshold: f32,
    pub min_probability: f32,
    pub max_contacts: usize,
    pub fragment_min_payload: u64,
    pub trustworthiness_weight: f32,
    pub reliability_weight: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deterministic_threshold: 0.9,
            opportunistic_threshold: 0.3,
            min_probability: 0.5,
            max_contacts: 5,
            fragment_min_payload: 64,
            trustworthiness_weight: 0.5,
            reliability_weight: 0.5,
        }
    }
}

/// A single fragment's worth of a route: the bytes it carries and the
/// contacts chosen to carry it.
#[derive(Debug, Clone)]
pub struct FragmentRoute {
    pub payload_size: u64,
    pub probability: f32,
    pub contacts: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub fragments: Vec<FragmentRoute>,
}

/// Combines two independent probabilities of delivery: `P(A∪B) =
/// P(A)+P(B)-P(A)P(B)` (§4.6 step 4).
fn combine_probability(a: f32, b: f32) -> f32 {
    a + b - a * b
}

fn contact_confidence(contact: &Contact, config: &Config) -> f32 {
    contact.confidence(config.trustworthiness_weight, config.reliability_weight)
}

/// Picks contacts for one fragment of `size` bytes at `priority`, stopping
/// once their combined probability reaches `min_probability` or
/// `max_contacts` is exhausted. Deterministic-confidence contacts end
/// selection immediately; opportunistic ones accumulate via
/// [`combine_probability`].
fn select_contacts_for_fragment(
    candidates: &[Contact],
    size: u64,
    priority: Priority,
    config: &Config,
) -> Option<FragmentRoute> {
    let mut chosen = Vec::new();
    let mut probability = 0.0f32;
    let mut remaining = size as i64;

    for contact in candidates {
        if chosen.len() >= config.max_contacts || remaining <= 0 {
            break;
        }
        let confidence = contact_confidence(contact, config);
        if confidence < config.opportunistic_threshold {
            continue;
        }
        if contact.remaining_capacity(priority) <= 0 {
            continue;
        }
        chosen.push(contact.id);
        remaining -= contact.remaining_capacity(priority).min(remaining);

        if confidence >= config.deterministic_threshold {
            probability = 1.0;
            break;
        }
        probability = combine_probability(probability, confidence);
        if probability >= config.min_probability {
            break;
        }
    }

    if chosen.is_empty() || probability < config.min_probability {
        return None;
    }
    Some(FragmentRoute {
        payload_size: size,
        probability,
        contacts: chosen,
    })
}

/// The largest single-fragment payload this destination's candidate
/// contacts can plausibly carry right now (§4.6 step 2).
pub fn max_reasonable_fragment_size(candidates: &[Contact], priority: Priority, config: &Config) -> u64 {
    let mut total = 0u64;
    for contact in candidates {
        if contact_confidence(contact, config) < config.opportunistic_threshold {
            continue;
        }
        let cap = contact.remaining_capacity(priority);
        if cap > 0 {
            total += cap as u64;
        }
    }
    total
}

/// Computes a route for `size` bytes to `destination`, fragmenting greedily
/// across contacts if no single contact (or acceptable combination) can
/// carry it whole and fragmentation is allowed.
pub fn route(
    rib: &Rib,
    destination: &Eid,
    size: u64,
    priority: Priority,
    do_not_fragment: bool,
    config: &Config,
) -> Option<Route> {
    let candidates = rib.lookup_eid(destination);
    if candidates.is_empty() {
        return None;
    }

    let max_frag = max_reasonable_fragment_size(&candidates, priority, config);
    if size <= max_frag || do_not_fragment {
        if do_not_fragment && size > max_frag {
            return None;
        }
        return select_contacts_for_fragment(&candidates, size, priority, config)
            .map(|fragment| Route { fragments: vec![fragment] });
    }

    let mut fragments = Vec::new();
    let mut remaining = size;
    while remaining > 0 {
        let chunk = remaining.min(max_frag).max(config.fragment_min_payload.min(remaining));
        let fragment = select_contacts_for_fragment(&candidates, chunk, priority, config)?;
        remaining -= chunk;
        fragments.push(fragment);
    }
    Some(Route { fragments })
}

/// Verifies a previously computed route is still usable: every contact it
/// names still exists, has not ended, and has the capacity it was given
/// credit for (§4.6, "Router re-use").
pub fn try_reuse(rib: &Rib, route: &Route, priority: Priority, now: Instant) -> bool {
    route.fragments.iter().all(|fragment| {
        fragment.contacts.iter().all(|id| {
            rib.with_contact_mut(*id, |contact| {
                !contact.has_passed(now) && contact.remaining_capacity(priority) >= 0
            })
            .unwrap_or(false)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer() -> Eid {
        Eid::Dtn("peer/".into())
    }

    #[test]
    fn routes_whole_bundle_over_a_single_strong_contact() {
        let rib = Rib::new();
        let now = Instant::now();
        rib.add_contact(peer(), now, now + Duration::from_secs(100), 10_000, 1.0, Vec::new());

        let config = Config::default();
        let route = super::route(&rib, &peer(), 1000, Priority::Normal, false, &config).unwrap();
        assert_eq!(route.fragments.len(), 1);
        assert_eq!(route.fragments[0].probability, 1.0);
    }

    #[test]
    fn refuses_to_fragment_a_do_not_fragment_bundle_too_big_for_one_contact() {
        let rib = Rib::new();
        let now = Instant::now();
        rib.add_contact(peer(), now, now + Duration::from_secs(1), 10, 1.0, Vec::new());

        let config = Config::default();
        assert!(super::route(&rib, &peer(), 1_000_000, Priority::Normal, true, &config).is_none());
    }

    #[test]
    fn returns_none_when_no_contact_reaches_the_destination() {
        let rib = Rib::new();
        let config = Config::default();
        assert!(super::route(&rib, &peer(), 100, Priority::Normal, false, &config).is_none());
    }

    #[test]
    fn combine_probability_matches_union_formula() {
        assert!((combine_probability(0.5, 0.5) - 0.75).abs() < 1e-6);
    }
}
