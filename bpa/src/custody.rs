/*!
The custody manager (ambient supplement): tracks which bundles this node
has accepted custody of, and when to give up waiting for the next
custodian's acceptance.

Grounded on `original_source/include/upcn/custody_manager.h` /
`components/upcn/custody_manager.c`: acceptance is keyed on bundle identity
(source/creation-timestamp/sequence/fragment) so a redundant custody
request is recognized rather than double-counted, and a bundle whose
retransmission deadline passes without the next custodian confirming
acceptance is handed back to the router rather than dropped.
*/

use crate::bundle::BundleId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Record {
    bundle_store_id: u16,
    retransmit_deadline: Instant,
}

pub struct CustodyManager {
    records: Mutex<HashMap<BundleId, Record>>,
    retransmit_timeout: Duration,
}

impl CustodyManager {
    pub fn new(retransmit_timeout: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            retransmit_timeout,
        }
    }

    /// `true` if this node has already accepted custody of a bundle with
    /// this identity — the caller should treat a fresh custody request for
    /// it as redundant rather than inserting a second record.
    pub fn has_redundant(&self, id: &BundleId) -> bool {
        self.records.lock().unwrap().contains_key(id)
    }

    pub fn has_accepted(&self, id: &BundleId) -> bool {
        self.has_redundant(id)
    }

    /// Accepts custody, idempotently: a repeat call for the same identity
    /// just refreshes the retransmission deadline rather than erroring.
    pub fn accept(&self, id: BundleId, bundle_store_id: u16) {
        self.records.lock().unwrap().insert(
            id,
            Record {
                bundle_store_id,
                retransmit_deadline: Instant::now() + self.retransmit_timeout,
            },
        );
    }

    /// Drops custody of a bundle, e.g. once the next custodian confirms
    /// acceptance or the bundle itself is deleted.
    pub fn release(&self, id: &BundleId) {
        self.records.lock().unwrap().remove(id);
    }

    /// Bundle-store ids whose retransmission deadline has passed without a
    /// release; the caller should re-route each one rather than drop it.
    pub fn expired(&self) -> Vec<u16> {
        let now = Instant::now();
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.retransmit_deadline <= now)
            .map(|r| r.bundle_store_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardy_bpv7::eid::Eid;

    fn id(seq: u64) -> BundleId {
        BundleId {
            source: Eid::Dtn("a/".into()),
            creation_timestamp: 0,
            sequence_number: seq,
            fragment_info: None,
        }
    }

    #[test]
    fn accept_is_idempotent_for_the_same_bundle_identity() {
        let manager = CustodyManager::new(Duration::from_secs(60));
        manager.accept(id(1), 10);
        assert!(manager.has_redundant(&id(1)));
        manager.accept(id(1), 10);
        assert_eq!(manager.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn release_clears_acceptance() {
        let manager = CustodyManager::new(Duration::from_secs(60));
        manager.accept(id(1), 10);
        manager.release(&id(1));
        assert!(!manager.has_accepted(&id(1)));
    }

    #[test]
    fn expired_lists_only_bundles_past_their_deadline() {
        let manager = CustodyManager::new(Duration::from_millis(0));
        manager.accept(id(1), 10);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(manager.expired(), vec![10]);
    }
}
