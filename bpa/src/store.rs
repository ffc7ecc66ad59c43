/*!
The bundle store (C5): a process-wide, mutex-protected map from bundle id to
[`Bundle`], plus an expiry cache that lets the contact-expiry reaper stream
already-expired ids out without holding the store lock for a full scan.

Grounded on the teacher's `storage::store::Store` for the mutex-guarded map
shape and on `storage::reaper` for the expiry `BTreeSet` + [`Notify`] wakeup
pattern, simplified to an in-memory, non-persistent store: this agent does
not carry the teacher's pluggable `MetadataStorage`/`BundleStorage` engines
or restart recovery, since SPEC_FULL.md scopes storage to a single running
process.
*/

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sentinel id that is never assigned to a real bundle; returned by
/// `FromStr`-style code paths to signal "no such bundle" without an
/// `Option` wrapper where the teacher's equivalents use one.
pub const INVALID: u16 = 0;

struct Inner {
    bundles: BTreeMap<u16, Bundle>,
    next_id: u16,
    bytes_used: usize,
}

impl Inner {
    fn allocate_id(&mut self) -> Option<u16> {
        let start = self.next_id;
        loop {
            let candidate = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id == INVALID {
                self.next_id = self.next_id.wrapping_add(1);
            }
            if candidate != INVALID && !self.bundles.contains_key(&candidate) {
                return Some(candidate);
            }
            if self.next_id == start {
                return None;
            }
        }
    }
}

/// One entry in the expiry cache: the instant a bundle's lifetime runs out,
/// ordered first by expiry so the reaper only ever looks at the front.
#[derive(Clone, Eq, PartialEq)]
struct ExpiryEntry {
    expiry: Instant,
    id: u16,
}

impl PartialOrd for ExpiryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExpiryEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.expiry.cmp(&other.expiry).then_with(|| self.id.cmp(&other.id))
    }
}

/// The in-memory bundle store.
pub struct Store {
    inner: Mutex<Inner>,
    expiry_cache: Mutex<BTreeSet<ExpiryEntry>>,
    expiry_wakeup: hardy_async::Notify,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                bundles: BTreeMap::new(),
                next_id: 1,
                bytes_used: 0,
            }),
            expiry_cache: Mutex::new(BTreeSet::new()),
            expiry_wakeup: hardy_async::Notify::new(),
        }
    }

    /// Assigns the bundle the next available id, takes ownership of it, and
    /// schedules it for expiry once its lifetime elapses.
    pub fn add(&self, mut bundle: Bundle) -> Result<u16> {
        let expiry = Instant::now() + bundle.lifetime;
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.allocate_id().ok_or(Error::StoreExhausted)?;
            bundle.id = Some(id);
            inner.bytes_used += bundle.payload.len();
            inner.bundles.insert(id, bundle);
            id
        };
        self.watch_expiry(id, expiry);
        Ok(id)
    }

    pub fn get(&self, id: u16) -> Option<Bundle> {
        self.inner.lock().unwrap().bundles.get(&id).cloned()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.inner.lock().unwrap().bundles.contains_key(&id)
    }

    /// Removes a bundle from the store, returning `true` if it was present.
    pub fn delete(&self, id: u16) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(bundle) = inner.bundles.remove(&id) {
            inner.bytes_used -= bundle.payload.len();
            true
        } else {
            false
        }
    }

    /// Replaces an existing bundle's stored state in place, e.g. after its
    /// retention flags change. Returns `false` if no such bundle exists.
    pub fn update(&self, id: u16, bundle: Bundle) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.bundles.get(&id) {
            let delta = bundle.payload.len() as isize - old.payload.len() as isize;
            inner.bundles.insert(id, bundle);
            inner.bytes_used = (inner.bytes_used as isize + delta) as usize;
            true
        } else {
            false
        }
    }

    pub fn bytes_used(&self) -> usize {
        self.inner.lock().unwrap().bytes_used
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn watch_expiry(&self, id: u16, expiry: Instant) {
        let needs_wakeup = {
            let mut cache = self.expiry_cache.lock().unwrap();
            let old_first = cache.iter().next().map(|e| e.expiry);
            cache.insert(ExpiryEntry { expiry, id });
            old_first.is_none_or(|old| expiry < old)
        };
        if needs_wakeup {
            self.expiry_wakeup.notify_one();
        }
    }

    /// Runs until cancelled, sending each bundle id whose lifetime has
    /// elapsed to `expired_tx` as soon as it crosses that boundary. Does not
    /// remove the bundle itself; the caller (the bundle processor, §4.9)
    /// decides whether to delete it or regenerate a status report first.
    pub async fn run_reaper(
        &self,
        expired_tx: flume::Sender<u16>,
        cancel: &tokio_util::sync::CancellationToken,
    ) {
        loop {
            let sleep_duration = {
                let cache = self.expiry_cache.lock().unwrap();
                match cache.iter().next() {
                    Some(entry) => entry.expiry.saturating_duration_since(Instant::now()),
                    None => Duration::from_secs(3600),
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {}
                _ = self.expiry_wakeup.notified() => {}
                _ = cancel.cancelled() => break,
            }

            let now = Instant::now();
            let expired: Vec<u16> = {
                let mut cache = self.expiry_cache.lock().unwrap();
                let mut expired = Vec::new();
                while let Some(entry) = cache.iter().next().cloned() {
                    if entry.expiry > now {
                        break;
                    }
                    cache.remove(&entry);
                    expired.push(entry.id);
                }
                expired
            };

            for id in expired {
                if expired_tx.send_async(id).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleId, Flags, Retention};
    use hardy_bpv7::eid::Eid;

    fn sample_bundle() -> Bundle {
        Bundle {
            id: None,
            version: crate::bundle::Version::V7,
            flags: Flags::default(),
            bundle_id: BundleId {
                source: Eid::Null,
                creation_timestamp: 0,
                sequence_number: 0,
                fragment_info: None,
            },
            destination: Eid::Null,
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

    #[test]
    fn add_assigns_a_nonzero_id_and_is_retrievable() {
        let store = Store::new();
        let id = store.add(sample_bundle()).unwrap();
        assert_ne!(id, INVALID);
        assert!(store.contains(id));
        assert_eq!(store.get(id).unwrap().payload.len(), 3);
        assert_eq!(store.bytes_used(), 3);
    }

    #[test]
    fn delete_removes_the_bundle_and_frees_its_bytes() {
        let store = Store::new();
        let id = store.add(sample_bundle()).unwrap();
        assert!(store.delete(id));
        assert!(!store.contains(id));
        assert_eq!(store.bytes_used(), 0);
        assert!(!store.delete(id));
    }

    #[test]
    fn ids_are_never_invalid_and_do_not_collide() {
        let store = Store::new();
        let a = store.add(sample_bundle()).unwrap();
        let b = store.add(sample_bundle()).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, INVALID);
        assert_ne!(b, INVALID);
    }

    #[tokio::test]
    async fn reaper_reports_a_bundle_once_its_lifetime_elapses() {
        let mut bundle = sample_bundle();
        bundle.lifetime = Duration::from_millis(20);
        let store = Store::new();
        let id = store.add(bundle).unwrap();

        let (tx, rx) = flume::unbounded();
        let cancel = tokio_util::sync::CancellationToken::new();
        let reaper_cancel = cancel.clone();
        let handle = tokio::spawn(async move { store.run_reaper(tx, &reaper_cancel).await });

        let expired = rx.recv_async().await.unwrap();
        assert_eq!(expired, id);

        cancel.cancel();
        handle.await.unwrap();
    }
}
