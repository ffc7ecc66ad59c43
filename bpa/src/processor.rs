/*!
The bundle processor (C10, §4.9): the RFC 5050 §5 state machine that every
bundle passes through between arrival and final disposition.

Grounded on `original_source/components/router/routerTask.c` and
`original_source/components/upcn/custody_manager.c` for the
incoming/dispatch/forward/deliver-local/delete transitions, and on the
teacher's single-consumer-task idiom (one task owns all of this state;
cross-task data — the store, the routing table, the custody manager — is
reached through their own locks) for how this struct is meant to be driven
from an agent's signal-processing loop.
*/

use crate::bundle::{Bundle, BundleId, Retention};
use crate::custody::CustodyManager;
use crate::router::{self, Config as RouterConfig};
use crate::rib::Rib;
use crate::services;
use crate::store::Store;
use hardy_bpv7::eid::Eid;
use hardy_bpv7::status_report::ReasonCode;
use std::collections::HashSet;
use std::sync::Mutex;

/// What the caller should do with a bundle next, after the processor has
/// updated its retention state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Hand the bundle to the router for a route (forward). Carries the
    /// bundle's store id, assigned the moment it became forward-pending, so
    /// a caller that originated it (AAP's SENDBUNDLE, §4.10) can report it
    /// back without a second lookup.
    Route(u16),
    /// Deliver the bundle's payload to a registered local service.
    DeliverLocal,
    /// The bundle is a fragment; it has been stashed pending reassembly.
    AwaitingReassembly,
    /// The bundle was dropped; carries the reason, if any, for a status
    /// report.
    Dropped(Option<ReasonCode>),
}

/// A reassembly slot: every fragment of one original bundle seen so far,
/// kept sorted by offset (§3, "Reassembly slot").
struct ReassemblySlot {
    total_adu_length: u64,
    /// (offset, end, store id), kept sorted by offset.
    fragments: Vec<(u64, u64, u16)>,
}

impl ReassemblySlot {
    fn insert(&mut self, offset: u64, end: u64, store_id: u16) {
        let pos = self.fragments.partition_point(|(o, _, _)| *o < offset);
        self.fragments.insert(pos, (offset, end, store_id));
    }

    /// `true` once the fragments contiguously cover `[0, total_adu_length)`.
    fn is_complete(&self) -> bool {
        let mut covered = 0u64;
        for (offset, end, _) in &self.fragments {
            if *offset > covered {
                return false;
            }
            covered = covered.max(*end);
        }
        covered >= self.total_adu_length
    }
}

pub struct Processor {
    store: Store,
    rib: Rib,
    custody: CustodyManager,
    services: services::Registry,
    local_eid: Eid,
    router_config: RouterConfig,
    seen: Mutex<HashSet<BundleId>>,
    reassembly: Mutex<std::collections::HashMap<BundleId, ReassemblySlot>>,
}

impl Processor {
    pub fn new(
        store: Store,
        rib: Rib,
        custody: CustodyManager,
        services: services::Registry,
        local_eid: Eid,
        router_config: RouterConfig,
    ) -> Self {
        Self {
            store,
            rib,
            custody,
            services,
            local_eid,
            router_config,
            seen: Mutex::new(HashSet::new()),
            reassembly: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn rib(&self) -> &Rib {
        &self.rib
    }

    pub fn local_eid(&self) -> &Eid {
        &self.local_eid
    }

    pub fn services(&self) -> &services::Registry {
        &self.services
    }

    /// `INCOMING`: a freshly parsed bundle arrives. Checks expiry, takes
    /// ownership into the store, and decides dispatch vs. forward vs. drop.
    pub fn incoming(&self, mut bundle: Bundle) -> Disposition {
        if bundle.lifetime.is_zero() {
            return Disposition::Dropped(Some(ReasonCode::LifetimeExpired));
        }

        bundle.retention.dispatch_pending = true;
        bundle.retention.own = true;
        self.dispatch(bundle)
    }

    /// Dispatch: local delivery if the destination is this node, otherwise
    /// forward.
    fn dispatch(&self, bundle: Bundle) -> Disposition {
        if is_local(&bundle.destination, &self.local_eid) {
            self.deliver_local(bundle)
        } else {
            self.forward(bundle)
        }
    }

    /// Forward: mark forward-pending, clear dispatch-pending, take a store
    /// id, and route it onto a contact's queue immediately (§4.6, §4.9).
    fn forward(&self, mut bundle: Bundle) -> Disposition {
        bundle.retention.forward_pending = true;
        bundle.retention.dispatch_pending = false;
        match self.store.add(bundle) {
            Ok(id) => {
                self.route_and_assign(id);
                Disposition::Route(id)
            }
            Err(_) => Disposition::Dropped(Some(ReasonCode::DepletedStorage)),
        }
    }

    /// `ROUTE`: computes a route for a forward-pending bundle and assigns
    /// each fragment's bundle onto its chosen contacts' queues, persisting
    /// `routed_contacts` so [`Processor::contact_transmitted`] knows when
    /// every contact has confirmed transmission (§4.6 step 5, §4.9).
    ///
    /// A bundle that doesn't fragment gets a single entry in
    /// `routed_contacts` per contact selected for its one fragment; a
    /// fragmented bundle's original (unfragmented) store entry is assigned
    /// to every contact across every fragment, since this agent does not
    /// split a bundle into separate store entries per fragment at route
    /// time (the whole original stays queued until every contact it was
    /// given to has transmitted).
    ///
    /// Returns `None` if no route exists yet; the bundle stays
    /// forward-pending until a newly scheduled contact (§4.8) or an
    /// explicit reschedule (§4.5) triggers another call.
    pub fn route_and_assign(&self, id: u16) -> Option<Vec<u64>> {
        let Some(mut bundle) = self.store.get(id) else {
            return None;
        };
        let route = router::route(
            &self.rib,
            &bundle.destination,
            bundle.payload.len() as u64,
            bundle.flags.priority,
            bundle.flags.do_not_fragment,
            &self.router_config,
        )?;

        let mut contact_ids = Vec::new();
        for fragment in &route.fragments {
            for &contact_id in &fragment.contacts {
                self.rib.assign(contact_id, id, fragment.payload_size, bundle.flags.priority);
                contact_ids.push(contact_id);
            }
        }
        contact_ids.sort_unstable();
        contact_ids.dedup();

        bundle.routed_contacts = contact_ids.clone();
        self.store.update(id, bundle);
        Some(contact_ids)
    }

    /// `TRANSMISSION_SUCCESS` for a single contact: removes `contact_id`
    /// from the bundle's outstanding set, and only raises the full
    /// [`Processor::transmission_success`] once every contact it was
    /// assigned to has confirmed (§4.9, multi-contact completion).
    pub fn contact_transmitted(&self, id: u16, contact_id: u64) {
        let Some(mut bundle) = self.store.get(id) else {
            return;
        };
        bundle.routed_contacts.retain(|c| *c != contact_id);
        if bundle.routed_contacts.is_empty() {
            self.transmission_success(id);
        } else {
            self.store.update(id, bundle);
        }
    }

    /// `ROUTED`: the router found a route; if BPv6 custody was requested,
    /// accept custody now (custodian becomes this node).
    pub fn routed(&self, id: u16) {
        let Some(mut bundle) = self.store.get(id) else {
            return;
        };
        if bundle.flags.custody_transfer_requested && !self.custody.has_accepted(&bundle.bundle_id) {
            self.custody.accept(bundle.bundle_id.clone(), id);
            bundle.custodian = self.local_eid.clone();
            bundle.retention.custody_accepted = true;
            self.store.update(id, bundle);
        }
    }

    /// `TRANSMISSION_SUCCESS`: every contact for this bundle has serialized
    /// it; clear forward-pending and its ownership flag.
    pub fn transmission_success(&self, id: u16) {
        let Some(mut bundle) = self.store.get(id) else {
            return;
        };
        bundle.retention.forward_pending = false;
        bundle.retention.own = false;
        if bundle.retention.is_clear() {
            self.store.delete(id);
        } else {
            self.store.update(id, bundle);
        }
    }

    /// `TRANSMISSION_FAILURE`: policy is either retry (caller re-emits a
    /// route request) or drop if no custody is held.
    pub fn transmission_failure(&self, id: u16) -> Option<Disposition> {
        let bundle = self.store.get(id)?;
        if bundle.retention.custody_accepted {
            None // caller should retry routing
        } else {
            Some(self.delete(id, Some(ReasonCode::NoTimelyContactWithNextNodeOnRoute)))
        }
    }

    /// Deliver-local: duplicate-suppress, reassemble fragments, and hand
    /// whole ADUs to a registered service.
    fn deliver_local(&self, bundle: Bundle) -> Disposition {
        if !self.seen.lock().unwrap().insert(bundle.bundle_id.clone()) {
            return Disposition::Dropped(None);
        }

        if let Some(fragment) = bundle.bundle_id.fragment_info {
            let bundle_id = bundle.bundle_id.clone();
            let end = fragment.offset + bundle.payload.len() as u64;
            let id = match self.store.add(bundle) {
                Ok(id) => id,
                Err(_) => return Disposition::Dropped(Some(ReasonCode::DepletedStorage)),
            };
            let mut slots = self.reassembly.lock().unwrap();
            let slot = slots.entry(bundle_id.clone()).or_insert_with(|| ReassemblySlot {
                total_adu_length: fragment.total_adu_length,
                fragments: Vec::new(),
            });
            slot.insert(fragment.offset, end, id);
            if slot.is_complete() {
                slots.remove(&bundle_id);
                return Disposition::DeliverLocal;
            }
            return Disposition::AwaitingReassembly;
        }

        if let Some(sender) = self.services.find(&bundle.destination) {
            let _ = sender.send(bundle);
        }
        Disposition::DeliverLocal
    }

    /// Delete: clears all retention and removes the bundle from the store.
    /// Returns the disposition the caller should report up (for status
    /// report generation).
    pub fn delete(&self, id: u16, reason: Option<ReasonCode>) -> Disposition {
        if let Some(bundle) = self.store.get(id) {
            self.custody.release(&bundle.bundle_id);
        }
        self.store.delete(id);
        Disposition::Dropped(reason)
    }

}

/// The processor is the agent's [`crate::cla::Sink`]: a CLA hands it raw,
/// not-yet-parsed bundle bytes and peer address changes, and the processor
/// decides what to do with them. Tries BPv7 first, falling back to BPv6,
/// since a CLA has no way to know in advance which wire version a given
/// payload uses.
#[async_trait::async_trait]
impl crate::cla::Sink for Processor {
    async fn dispatch(&self, bundle: bytes::Bytes) -> crate::error::Result<()> {
        let unified = match hardy_bpv7::bundle::parse(&bundle) {
            Ok(parsed) => Bundle::from_bpv7(parsed.bundle, &bundle)?,
            Err(_) => {
                let bpv6 = hardy_bpv6::Bundle::parse(&bundle)?;
                Bundle::from_bpv6(bpv6, bundle.clone())?
            }
        };
        self.incoming(unified);
        Ok(())
    }

    async fn add_peer(&self, peer: Eid, _address: crate::cla::ClaAddress) -> crate::error::Result<bool> {
        tracing::debug!(%peer, "peer address noted");
        Ok(true)
    }

    async fn remove_peer(&self, peer: Eid, _address: &crate::cla::ClaAddress) -> crate::error::Result<bool> {
        tracing::debug!(%peer, "peer address removed");
        Ok(true)
    }
}

/// `true` if `destination`'s node prefix is this node's local EID — the
/// "destination EID prefix = local EID" rule (§4.9, dispatch).
fn is_local(destination: &Eid, local: &Eid) -> bool {
    match (destination, local) {
        (Eid::Dtn(dest), Eid::Dtn(local)) => {
            let strip = |s: &str| s.strip_prefix("//").unwrap_or(s).split('/').next().unwrap_or(s).to_string();
            strip(dest) == strip(local)
        }
        (Eid::Ipn { node_number: a, .. }, Eid::Ipn { node_number: b, .. }) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{FragmentInfo, Flags};
    use std::time::Duration;

    fn bundle(destination: Eid) -> Bundle {
        Bundle {
            id: None,
            version: crate::bundle::Version::V7,
            flags: Flags::default(),
            bundle_id: BundleId {
                source: Eid::Dtn("sender/".into()),
                creation_timestamp: 0,
                sequence_number: 0,
                fragment_info: None,
            },
            destination,
            report_to: Eid::Null,
            lifetime: Duration::from_secs(3600),
            retention: Retention::default(),
            custodian: Eid::Null,
            extension_blocks: Vec::new(),
            payload: Box::new([1, 2, 3]),
            wire_bytes: bytes::Bytes::from_static(&[1, 2, 3]),
            routed_contacts: Vec::new(),
        }
    }

    fn processor(local: &str) -> Processor {
        Processor::new(
            Store::new(),
            Rib::new(),
            CustodyManager::new(Duration::from_secs(60)),
            services::Registry::new(),
            Eid::Dtn(local.into()),
            RouterConfig::default(),
        )
    }

    #[test]
    fn incoming_with_zero_lifetime_is_dropped_as_expired() {
        let p = processor("local/");
        let mut b = bundle(Eid::Dtn("local/mail".into()));
        b.lifetime = Duration::ZERO;
        assert_eq!(
            p.incoming(b),
            Disposition::Dropped(Some(ReasonCode::LifetimeExpired))
        );
    }

    #[test]
    fn incoming_for_a_local_destination_delivers() {
        let p = processor("local/");
        let b = bundle(Eid::Dtn("local/mail".into()));
        assert_eq!(p.incoming(b), Disposition::DeliverLocal);
    }

    #[test]
    fn incoming_for_a_remote_destination_routes() {
        let p = processor("local/");
        let b = bundle(Eid::Dtn("remote/mail".into()));
        assert_eq!(p.incoming(b), Disposition::Route(1));
    }

    #[test]
    fn duplicate_local_delivery_is_dropped_silently() {
        let p = processor("local/");
        let b = bundle(Eid::Dtn("local/mail".into()));
        assert_eq!(p.incoming(b.clone()), Disposition::DeliverLocal);
        assert_eq!(p.incoming(b), Disposition::Dropped(None));
    }

    #[test]
    fn a_fragment_awaits_reassembly_until_coverage_is_complete() {
        let p = processor("local/");
        let mut first = bundle(Eid::Dtn("local/mail".into()));
        first.bundle_id.fragment_info = Some(FragmentInfo {
            offset: 0,
            total_adu_length: 6,
        });
        assert_eq!(p.incoming(first), Disposition::AwaitingReassembly);

        let mut second = bundle(Eid::Dtn("local/mail".into()));
        second.bundle_id.fragment_info = Some(FragmentInfo {
            offset: 3,
            total_adu_length: 6,
        });
        assert_eq!(p.incoming(second), Disposition::DeliverLocal);
    }

    #[test]
    fn transmission_success_clears_forward_pending_and_frees_the_bundle() {
        let p = processor("local/");
        let b = bundle(Eid::Dtn("remote/mail".into()));
        p.incoming(b);
        let id = p.store.len();
        assert_eq!(id, 1);
        p.transmission_success(1);
        assert!(!p.store.contains(1));
    }

    #[test]
    fn forward_assigns_the_bundle_to_a_matching_contact() {
        let p = processor("local/");
        let now = std::time::Instant::now();
        let crate::rib::AddContactOutcome::Created(contact_id) = p.rib.add_contact(
            Eid::Dtn("remote/".into()),
            now,
            now + Duration::from_secs(100),
            10_000,
            1.0,
            Vec::new(),
        ) else {
            panic!()
        };

        let b = bundle(Eid::Dtn("remote/mail".into()));
        assert_eq!(p.incoming(b), Disposition::Route(1));
        assert_eq!(p.rib.drain_queue(contact_id), vec![1]);
    }

    #[test]
    fn contact_transmitted_only_completes_once_every_assigned_contact_confirms() {
        let p = processor("local/");
        let now = std::time::Instant::now();
        let crate::rib::AddContactOutcome::Created(contact_id) = p.rib.add_contact(
            Eid::Dtn("remote/".into()),
            now,
            now + Duration::from_secs(100),
            10_000,
            1.0,
            Vec::new(),
        ) else {
            panic!()
        };

        let b = bundle(Eid::Dtn("remote/mail".into()));
        p.incoming(b);

        let mut bundle = p.store.get(1).unwrap();
        bundle.routed_contacts.push(contact_id + 1);
        p.store.update(1, bundle);

        p.contact_transmitted(1, contact_id);
        assert!(p.store.contains(1));

        p.contact_transmitted(1, contact_id + 1);
        assert!(!p.store.contains(1));
    }
}
