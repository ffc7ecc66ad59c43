/*!
The local service registry: which application (if any) an EID pattern
delivers to. Backs both the AAP `REGISTER` message (§4.10) and
locally-destined delivery in the bundle processor (§4.9).

Grounded on the teacher's `services::registry::Registry` for the
pattern-keyed registration shape, simplified to the single concern this
agent's AAP actually needs: one local delivery channel per registered
pattern, replacing any previous registration for the same connection.
*/

use crate::bundle::Bundle;
use hardy_eid_patterns::EidPattern;
use std::collections::HashMap;
use std::sync::RwLock;

pub type AduSender = flume::Sender<Bundle>;

pub struct Registry {
    inner: RwLock<HashMap<EidPattern, AduSender>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `pattern` to deliver to `sender`, replacing any existing
    /// registration for the same pattern (an AAP `REGISTER` on an existing
    /// connection replaces rather than duplicates).
    pub fn register(&self, pattern: EidPattern, sender: AduSender) {
        self.inner.write().unwrap().insert(pattern, sender);
    }

    pub fn deregister(&self, pattern: &EidPattern) -> bool {
        self.inner.write().unwrap().remove(pattern).is_some()
    }

    /// Finds a registered service whose pattern matches `eid`, if any.
    pub fn find(&self, eid: &hardy_bpv7::eid::Eid) -> Option<AduSender> {
        self.inner
            .read()
            .unwrap()
            .iter()
            .find(|(pattern, _)| pattern.matches(eid))
            .map(|(_, sender)| sender.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardy_bpv7::eid::Eid;

    #[test]
    fn find_matches_a_registered_pattern() {
        let registry = Registry::new();
        let (tx, _rx) = flume::unbounded();
        let mail = Eid::Dtn("node1/mail".into());
        registry.register(EidPattern::from(mail.clone()), tx);

        assert!(registry.find(&mail).is_some());
        assert!(registry.find(&Eid::Dtn("node1/other".into())).is_none());
    }

    #[test]
    fn deregister_removes_the_registration() {
        let registry = Registry::new();
        let (tx, _rx) = flume::unbounded();
        let p = EidPattern::from(Eid::Dtn("node1/mail".into()));
        registry.register(p.clone(), tx);
        assert!(registry.deregister(&p));
        assert!(registry.is_empty());
    }
}
