/*!
The routing table (C6): nodes, their contacts, and the reverse index used to
answer "through which contacts can I reach this EID".

Grounded on `original_source/include/upcn/routing_table.h` for the shape
(`node_table_entry { ref_count, associated_contacts }`, a node list plus a
global contact list sorted by `from`) and on the teacher's `rib::Rib` for the
`RwLock`-guarded-inner-struct idiom — reads (route lookups) dominate writes
(contact scheduling), so a reader/writer lock replaces the teacher's mutex
here, matching §5's "RwLock where reads dominate" rule.
*/

use hardy_bpv7::eid::Eid;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// A scheduled opportunity to reach a node, with its capacity and the
/// confidence the router should place in it (RFC-independent, grounded on
/// `struct contact` in `original_source/include/upcn/node.h`-style models).
///
/// `trustworthiness`/`reliability` are a cached copy of the owning
/// [`Node`]'s scalars, taken at add/merge time: the node is the scalars'
/// source of truth, but [`Contact::confidence`] is called from the router's
/// hot path and shouldn't need a second table lookup to read them.
#[derive(Debug, Clone)]
pub struct Contact {
    pub id: u64,
    pub node_eid: Eid,
    /// Additional endpoints reachable through this contact specifically
    /// (as opposed to [`Node::endpoints`], reachable through any contact).
    pub endpoints: Vec<Eid>,
    pub from: Instant,
    pub to: Instant,
    pub bitrate_bytes_per_sec: u64,
    pub trustworthiness: f32,
    pub reliability: f32,
    pub association_probability: f32,
    /// FIFO of bundle store ids the router has assigned to this contact,
    /// in the order they should be handed to the CLA once it activates.
    pub queue: Vec<u16>,
    capacity_bytes: [i64; 3],
}

impl Contact {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: u64,
        node_eid: Eid,
        endpoints: Vec<Eid>,
        from: Instant,
        to: Instant,
        bitrate_bytes_per_sec: u64,
        trustworthiness: f32,
        reliability: f32,
        association_probability: f32,
    ) -> Self {
        let total = bitrate_bytes_per_sec as i64 * to.saturating_duration_since(from).as_secs() as i64;
        Self {
            id,
            node_eid,
            endpoints,
            from,
            to,
            bitrate_bytes_per_sec,
            trustworthiness,
            reliability,
            association_probability,
            queue: Vec::new(),
            capacity_bytes: [total, total, total],
        }
    }

    /// Confidence this contact materializes, combining the peer's
    /// trustworthiness/reliability with how certain we are it will be
    /// associated at all (`original_source/include/upcn/router.h`'s
    /// `ROUTER_CONTACT_CONFIDENCE` macro).
    pub fn confidence(&self, trustworthiness_weight: f32, reliability_weight: f32) -> f32 {
        (trustworthiness_weight * self.trustworthiness + reliability_weight * self.reliability)
            * self.association_probability
    }

    pub fn remaining_capacity(&self, priority: crate::bundle::Priority) -> i64 {
        self.capacity_bytes[priority as usize]
    }

    /// Reserves `bytes` at `priority` and at every lower priority it shares
    /// capacity with (a high-priority bundle also consumes the headroom a
    /// lower-priority bundle would have used).
    pub fn reserve(&mut self, bytes: u64, priority: crate::bundle::Priority) {
        for p in priority as usize..3 {
            self.capacity_bytes[p] -= bytes as i64;
        }
    }

    /// Recomputes total capacity for a changed bitrate, preserving whatever
    /// of the old capacity had already been consumed (§4.5, "bitrate changes
    /// trigger capacity recalculation").
    fn rebill(&mut self, bitrate_bytes_per_sec: u64) {
        let old_total = self.bitrate_bytes_per_sec as i64 * self.to.saturating_duration_since(self.from).as_secs() as i64;
        let new_total = bitrate_bytes_per_sec as i64 * self.to.saturating_duration_since(self.from).as_secs() as i64;
        for p in self.capacity_bytes.iter_mut() {
            let consumed = old_total - *p;
            *p = new_total - consumed;
        }
        self.bitrate_bytes_per_sec = bitrate_bytes_per_sec;
    }

    pub fn overlaps(&self, from: Instant, to: Instant) -> bool {
        self.from < to && from < self.to
    }

    fn same_window(&self, from: Instant, to: Instant) -> bool {
        self.from == from && self.to == to
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.from <= now && now < self.to
    }

    pub fn has_passed(&self, now: Instant) -> bool {
        self.to <= now
    }
}

/// A node this agent may exchange bundles with: an EID, its CLA address, the
/// additional endpoints reachable through it for group reachability, and its
/// trustworthiness/reliability as the router weighs it (§3, "Node").
#[derive(Debug, Clone)]
pub struct Node {
    pub eid: Eid,
    pub cla_addr: Option<String>,
    pub endpoints: Vec<Eid>,
    pub trustworthiness: f32,
    pub reliability: f32,
    /// This node's contacts, kept ordered by start time ascending.
    pub contacts: Vec<u64>,
}

/// What [`Rib::add_contact`] actually did, including whether a "bitrate
/// changed" reschedule signal (§4.5) needs acting on by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddContactOutcome {
    /// A brand new contact was scheduled.
    Created(u64),
    /// An existing contact for the same node and (from, to) window was
    /// found and its bitrate updated; `needs_reschedule` is set if the
    /// bitrate actually changed, so bundles already queued on it may no
    /// longer fit and should be re-routed.
    Merged { id: u64, needs_reschedule: bool },
    /// Rejected: overlaps an existing, different-window contact for the
    /// same node.
    Rejected,
}

/// What to remove from a node in [`Rib::delete_node`].
#[derive(Debug, Clone, Default)]
pub enum NodeDeletion {
    #[default]
    Whole,
    Partial {
        endpoints: Vec<Eid>,
        contact_ids: Vec<u64>,
    },
}

/// One reverse-index slot: how many things (the node itself, a node
/// endpoint, a per-contact endpoint) currently register under this key, and
/// the contacts actually reachable through it.
#[derive(Default)]
struct IndexEntry {
    ref_count: usize,
    associated_contacts: Vec<u64>,
}

struct Inner {
    nodes: HashMap<Eid, Node>,
    index: HashMap<Eid, IndexEntry>,
    contacts: HashMap<u64, Contact>,
    next_contact_id: u64,
}

impl Inner {
    fn index_add(&mut self, key: Eid) {
        self.index.entry(key).or_default().ref_count += 1;
    }

    fn index_remove(&mut self, key: &Eid) {
        if let Some(entry) = self.index.get_mut(key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 && entry.associated_contacts.is_empty() {
                self.index.remove(key);
            }
        }
    }

    fn register_contact(&mut self, key: Eid, contact_id: u64) {
        self.index.entry(key).or_default().associated_contacts.push(contact_id);
    }

    fn unregister_contact(&mut self, key: &Eid, contact_id: u64) {
        if let Some(entry) = self.index.get_mut(key) {
            entry.associated_contacts.retain(|id| *id != contact_id);
            if entry.ref_count == 0 && entry.associated_contacts.is_empty() {
                self.index.remove(key);
            }
        }
    }

    /// Every key a contact is registered under: its node's own EID, every
    /// endpoint of that node, and the contact's own per-contact endpoints
    /// (§4.5).
    fn contact_keys(&self, node_eid: &Eid, contact_endpoints: &[Eid]) -> Vec<Eid> {
        let mut keys = vec![node_key(node_eid)];
        if let Some(node) = self.nodes.get(&node_key(node_eid)) {
            keys.extend(node.endpoints.iter().map(node_key));
        }
        keys.extend(contact_endpoints.iter().map(node_key));
        keys.sort();
        keys.dedup();
        keys
    }
}

pub struct Rib {
    inner: RwLock<Inner>,
}

impl Default for Rib {
    fn default() -> Self {
        Self::new()
    }
}

impl Rib {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                nodes: HashMap::new(),
                index: HashMap::new(),
                contacts: HashMap::new(),
                next_contact_id: 1,
            }),
        }
    }

    /// Adds or merges a node record. If a node with this EID already exists
    /// its endpoint list is unioned with `endpoints` and its CLA address and
    /// trust scalars are replaced; every contact already scheduled for it
    /// has its cached trust scalars refreshed to match, and any newly added
    /// endpoint is registered in the reverse index against the node's
    /// existing contacts (§3, §4.5).
    pub fn add_node(&self, eid: Eid, cla_addr: Option<String>, endpoints: Vec<Eid>, trustworthiness: f32, reliability: f32) {
        let mut inner = self.inner.write().unwrap();
        let key = node_key(&eid);

        if inner.nodes.contains_key(&key) {
            let new_endpoints: Vec<Eid> = {
                let node = inner.nodes.get(&key).unwrap();
                endpoints
                    .into_iter()
                    .filter(|e| !node.endpoints.contains(e))
                    .collect()
            };

            let contacts = inner.nodes.get(&key).unwrap().contacts.clone();
            for endpoint in &new_endpoints {
                inner.index_add(node_key(endpoint));
                for &id in &contacts {
                    inner.register_contact(node_key(endpoint), id);
                }
            }

            let node = inner.nodes.get_mut(&key).unwrap();
            node.endpoints.extend(new_endpoints);
            node.cla_addr = cla_addr;
            node.trustworthiness = trustworthiness;
            node.reliability = reliability;

            for &id in &contacts {
                if let Some(contact) = inner.contacts.get_mut(&id) {
                    contact.trustworthiness = trustworthiness;
                    contact.reliability = reliability;
                }
            }
        } else {
            inner.index_add(key.clone());
            for endpoint in &endpoints {
                inner.index_add(node_key(endpoint));
            }
            inner.nodes.insert(
                key,
                Node {
                    eid,
                    cla_addr,
                    endpoints,
                    trustworthiness,
                    reliability,
                    contacts: Vec::new(),
                },
            );
        }
    }

    pub fn node(&self, eid: &Eid) -> Option<Node> {
        self.inner.read().unwrap().nodes.get(&node_key(eid)).cloned()
    }

    pub fn node_for_contact(&self, id: u64) -> Option<Node> {
        let inner = self.inner.read().unwrap();
        let contact = inner.contacts.get(&id)?;
        inner.nodes.get(&node_key(&contact.node_eid)).cloned()
    }

    /// Registers a contact to `node_eid`. Rejected if its (from, to)
    /// interval overlaps an existing, different-window contact for the
    /// same node; an exact (from, to) match against an existing contact is
    /// instead treated as a bitrate update (§4.5, "contact union with
    /// bitrate-change detection").
    ///
    /// Auto-vivifies a node record (trustworthiness/reliability 1.0, no CLA
    /// address or endpoints) if `node_eid` has no node yet, so callers that
    /// only care about scheduling — not the full node model — don't have to
    /// call [`Rib::add_node`] first.
    pub fn add_contact(
        &self,
        node_eid: Eid,
        from: Instant,
        to: Instant,
        bitrate_bytes_per_sec: u64,
        association_probability: f32,
        endpoints: Vec<Eid>,
    ) -> AddContactOutcome {
        let mut inner = self.inner.write().unwrap();
        let key = node_key(&node_eid);

        if !inner.nodes.contains_key(&key) {
            inner.index_add(key.clone());
            inner.nodes.insert(
                key.clone(),
                Node {
                    eid: node_eid.clone(),
                    cla_addr: None,
                    endpoints: Vec::new(),
                    trustworthiness: 1.0,
                    reliability: 1.0,
                    contacts: Vec::new(),
                },
            );
        }

        let existing_ids = inner.nodes[&key].contacts.clone();
        for id in &existing_ids {
            if inner.contacts[id].same_window(from, to) {
                let id = *id;
                let old_bitrate = inner.contacts[&id].bitrate_bytes_per_sec;
                let needs_reschedule = old_bitrate != bitrate_bytes_per_sec;
                if needs_reschedule {
                    inner.contacts.get_mut(&id).unwrap().rebill(bitrate_bytes_per_sec);
                }
                return AddContactOutcome::Merged { id, needs_reschedule };
            }
            if inner.contacts[id].overlaps(from, to) {
                return AddContactOutcome::Rejected;
            }
        }

        let (trustworthiness, reliability) = {
            let node = &inner.nodes[&key];
            (node.trustworthiness, node.reliability)
        };

        let id = inner.next_contact_id;
        inner.next_contact_id += 1;
        let contact = Contact::new(
            id,
            node_eid.clone(),
            endpoints.clone(),
            from,
            to,
            bitrate_bytes_per_sec,
            trustworthiness,
            reliability,
            association_probability,
        );
        inner.contacts.insert(id, contact);

        let node = inner.nodes.get_mut(&key).unwrap();
        let pos = node.contacts.partition_point(|c| inner.contacts[c].from <= from);
        node.contacts.insert(pos, id);

        for endpoint in &endpoints {
            inner.index_add(node_key(endpoint));
        }
        for key in inner.contact_keys(&node_eid, &endpoints) {
            inner.register_contact(key, id);
        }

        AddContactOutcome::Created(id)
    }

    pub fn remove_contact(&self, id: u64) -> bool {
        let mut inner = self.inner.write().unwrap();
        let Some(contact) = inner.contacts.remove(&id) else {
            return false;
        };
        if let Some(node) = inner.nodes.get_mut(&node_key(&contact.node_eid)) {
            node.contacts.retain(|c| *c != id);
        }
        for key in inner.contact_keys(&contact.node_eid, &contact.endpoints) {
            inner.unregister_contact(&key, id);
        }
        for endpoint in &contact.endpoints {
            inner.index_remove(&node_key(endpoint));
        }
        true
    }

    /// Removes a node, per `selector`: the whole node (every contact, every
    /// endpoint registration) or only a named subset of its endpoints and
    /// contacts (§4.5).
    pub fn delete_node(&self, eid: &Eid, selector: NodeDeletion) {
        let key = node_key(eid);
        match selector {
            NodeDeletion::Whole => {
                let contacts = {
                    let inner = self.inner.read().unwrap();
                    inner.nodes.get(&key).map(|n| n.contacts.clone()).unwrap_or_default()
                };
                for id in contacts {
                    self.remove_contact(id);
                }
                let mut inner = self.inner.write().unwrap();
                if let Some(node) = inner.nodes.remove(&key) {
                    for endpoint in &node.endpoints {
                        inner.index_remove(&node_key(endpoint));
                    }
                    inner.index_remove(&key);
                }
            }
            NodeDeletion::Partial { endpoints, contact_ids } => {
                for id in contact_ids {
                    self.remove_contact(id);
                }
                let mut inner = self.inner.write().unwrap();
                if let Some(node) = inner.nodes.get_mut(&key) {
                    node.endpoints.retain(|e| !endpoints.contains(e));
                }
                for endpoint in &endpoints {
                    inner.index_remove(&node_key(endpoint));
                }
            }
        }
    }

    /// Drops a node and re-adds it with new attributes, returning every
    /// bundle id that was queued on any of its contacts so the caller can
    /// reschedule them (§4.5, "replace-node... bundles on active contacts
    /// are rescheduled").
    pub fn replace_node(
        &self,
        eid: Eid,
        cla_addr: Option<String>,
        endpoints: Vec<Eid>,
        trustworthiness: f32,
        reliability: f32,
    ) -> Vec<u16> {
        let stranded = {
            let inner = self.inner.read().unwrap();
            inner
                .nodes
                .get(&node_key(&eid))
                .map(|n| {
                    n.contacts
                        .iter()
                        .filter_map(|id| inner.contacts.get(id))
                        .flat_map(|c| c.queue.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        self.delete_node(&eid, NodeDeletion::Whole);
        self.add_node(eid, cla_addr, endpoints, trustworthiness, reliability);
        stranded
    }

    /// Every contact through which `eid` may be reached, sorted by `to`
    /// ascending (soonest-ending first), matching
    /// `routing_table_lookup_eid`'s `associated_contact_list` ordering.
    pub fn lookup_eid(&self, eid: &Eid) -> Vec<Contact> {
        let inner = self.inner.read().unwrap();
        let Some(entry) = inner.index.get(&node_key(eid)) else {
            return Vec::new();
        };
        let mut contacts: Vec<Contact> = entry
            .associated_contacts
            .iter()
            .filter_map(|id| inner.contacts.get(id).cloned())
            .collect();
        contacts.sort_by_key(|c| c.to);
        contacts
    }

    pub fn with_contact_mut<R>(&self, id: u64, f: impl FnOnce(&mut Contact) -> R) -> Option<R> {
        let mut inner = self.inner.write().unwrap();
        inner.contacts.get_mut(&id).map(f)
    }

    /// Assigns `bundle_id` to `contact_id`'s FIFO and reserves its bytes
    /// against that contact's remaining capacity. Returns `false` if the
    /// contact doesn't exist.
    pub fn assign(&self, contact_id: u64, bundle_id: u16, bytes: u64, priority: crate::bundle::Priority) -> bool {
        self.with_contact_mut(contact_id, |contact| {
            contact.reserve(bytes, priority);
            contact.queue.push(bundle_id);
        })
        .is_some()
    }

    /// Removes and returns every bundle id queued on `contact_id`, e.g. when
    /// it activates and its contents are handed to a CLA, or when it needs
    /// to be rescheduled onto a different contact.
    pub fn drain_queue(&self, contact_id: u64) -> Vec<u16> {
        self.with_contact_mut(contact_id, |contact| std::mem::take(&mut contact.queue))
            .unwrap_or_default()
    }

    /// Contacts whose end time has already passed, so the contact manager
    /// can deactivate and re-route their bundles.
    pub fn expired_contacts(&self, now: Instant) -> Vec<u64> {
        let inner = self.inner.read().unwrap();
        inner
            .contacts
            .values()
            .filter(|c| c.has_passed(now))
            .map(|c| c.id)
            .collect()
    }

    /// Contacts that are live right now but not yet in `active`.
    pub fn newly_active_contacts(&self, now: Instant, active: &std::collections::HashSet<u64>) -> Vec<u64> {
        let inner = self.inner.read().unwrap();
        inner
            .contacts
            .values()
            .filter(|c| c.is_active(now) && !active.contains(&c.id))
            .map(|c| c.id)
            .collect()
    }

    /// The soonest time any known contact starts or ends after `now`, used
    /// by the contact manager to bound its sleep (§4.8).
    pub fn next_boundary(&self, now: Instant) -> Option<Instant> {
        let inner = self.inner.read().unwrap();
        inner
            .contacts
            .values()
            .flat_map(|c| [c.from, c.to])
            .filter(|t| *t > now)
            .min()
    }

    pub fn all_contacts(&self) -> Vec<Contact> {
        self.inner.read().unwrap().contacts.values().cloned().collect()
    }
}

/// For `dtn://node_id/app_id` EIDs the contact table is keyed on the node
/// prefix alone, per §4.5 ("the node_id prefix is extracted and looked up
/// separately"); other EID forms key on the whole value.
fn node_key(eid: &Eid) -> Eid {
    match eid {
        Eid::Dtn(ssp) => {
            let node = ssp.split('/').next().unwrap_or(ssp);
            Eid::Dtn(format!("{node}/").into())
        }
        Eid::Ipn { node_number, .. } => Eid::Ipn {
            node_number: *node_number,
            service_number: 0,
        },
        other => other.clone(),
    }
}

#[allow(dead_code)]
pub fn suggested_wakeup(rib: &Rib, now: Instant, max_period: Duration) -> Instant {
    rib.next_boundary(now)
        .map(|next| next.min(now + max_period))
        .unwrap_or(now + max_period)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: &str) -> Eid {
        Eid::Dtn(format!("{n}/").into())
    }

    #[test]
    fn overlapping_contacts_to_the_same_peer_are_rejected() {
        let rib = Rib::new();
        let now = Instant::now();
        let a = rib.add_contact(peer("a"), now, now + Duration::from_secs(10), 1000, 1.0, Vec::new());
        assert!(matches!(a, AddContactOutcome::Created(_)));
        let b = rib.add_contact(
            peer("a"),
            now + Duration::from_secs(5),
            now + Duration::from_secs(15),
            1000,
            1.0,
            Vec::new(),
        );
        assert_eq!(b, AddContactOutcome::Rejected);
    }

    #[test]
    fn an_exact_window_match_merges_and_reports_a_bitrate_change() {
        let rib = Rib::new();
        let now = Instant::now();
        let to = now + Duration::from_secs(10);
        let a = rib.add_contact(peer("a"), now, to, 1000, 1.0, Vec::new());
        let AddContactOutcome::Created(id) = a else { panic!() };

        let b = rib.add_contact(peer("a"), now, to, 2000, 1.0, Vec::new());
        assert_eq!(
            b,
            AddContactOutcome::Merged {
                id,
                needs_reschedule: true
            }
        );
    }

    #[test]
    fn lookup_returns_contacts_sorted_by_end_time() {
        let rib = Rib::new();
        let now = Instant::now();
        rib.add_contact(peer("a"), now, now + Duration::from_secs(20), 1000, 1.0, Vec::new());
        rib.add_contact(
            peer("a"),
            now + Duration::from_secs(30),
            now + Duration::from_secs(40),
            1000,
            1.0,
            Vec::new(),
        );
        let contacts = rib.lookup_eid(&peer("a"));
        assert_eq!(contacts.len(), 2);
        assert!(contacts[0].to < contacts[1].to);
    }

    #[test]
    fn node_prefix_lookup_ignores_the_app_suffix() {
        let rib = Rib::new();
        let now = Instant::now();
        rib.add_contact(peer("a"), now, now + Duration::from_secs(10), 1000, 1.0, Vec::new());
        let app_eid = Eid::Dtn("a/mail".into());
        assert_eq!(rib.lookup_eid(&app_eid).len(), 1);
    }

    #[test]
    fn add_node_carries_cla_addr_and_trust_scalars() {
        let rib = Rib::new();
        rib.add_node(peer("a"), Some("tcp://127.0.0.1:4556".into()), Vec::new(), 0.7, 0.8);
        let node = rib.node(&peer("a")).unwrap();
        assert_eq!(node.cla_addr.as_deref(), Some("tcp://127.0.0.1:4556"));
        assert_eq!(node.trustworthiness, 0.7);
    }

    #[test]
    fn a_contact_is_reachable_through_every_node_endpoint() {
        let rib = Rib::new();
        let now = Instant::now();
        let group = Eid::Dtn("group/".into());
        rib.add_node(peer("a"), None, vec![group.clone()], 1.0, 1.0);
        rib.add_contact(peer("a"), now, now + Duration::from_secs(10), 1000, 1.0, Vec::new());
        assert_eq!(rib.lookup_eid(&group).len(), 1);
    }

    #[test]
    fn a_contact_is_reachable_through_its_own_extra_endpoints() {
        let rib = Rib::new();
        let now = Instant::now();
        let relay_target = Eid::Dtn("via-this-contact-only/".into());
        rib.add_contact(
            peer("a"),
            now,
            now + Duration::from_secs(10),
            1000,
            1.0,
            vec![relay_target.clone()],
        );
        assert_eq!(rib.lookup_eid(&relay_target).len(), 1);
    }

    #[test]
    fn deleting_a_node_whole_removes_its_contacts_and_reachability() {
        let rib = Rib::new();
        let now = Instant::now();
        rib.add_node(peer("a"), None, Vec::new(), 1.0, 1.0);
        rib.add_contact(peer("a"), now, now + Duration::from_secs(10), 1000, 1.0, Vec::new());
        rib.delete_node(&peer("a"), NodeDeletion::Whole);
        assert!(rib.lookup_eid(&peer("a")).is_empty());
        assert!(rib.node(&peer("a")).is_none());
    }

    #[test]
    fn replace_node_returns_queued_bundle_ids_to_reschedule() {
        let rib = Rib::new();
        let now = Instant::now();
        rib.add_node(peer("a"), None, Vec::new(), 1.0, 1.0);
        let AddContactOutcome::Created(contact_id) =
            rib.add_contact(peer("a"), now, now + Duration::from_secs(10), 1000, 1.0, Vec::new())
        else {
            panic!()
        };
        rib.assign(contact_id, 42, 10, crate::bundle::Priority::Normal);

        let stranded = rib.replace_node(peer("a"), Some("x".into()), Vec::new(), 1.0, 1.0);
        assert_eq!(stranded, vec![42]);
        assert!(rib.lookup_eid(&peer("a")).is_empty());
    }
}
