//! The `ipn:node.service` pattern item: each field is either an exact
//! `u32` or a wildcard. Grounded on the teacher's own `ipn_pattern` module,
//! with the allocator-id component and bracketed range lists dropped since
//! this workspace's [`hardy_bpv7::eid::Eid::Ipn`] has no allocator field.

use hardy_bpv7::eid::Eid;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Wildcard,
    Number(u32),
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Wildcard => true,
            Field::Number(n) => *n == value,
        }
    }

    fn is_subset(&self, other: &Self) -> bool {
        match (self, other) {
            (_, Field::Wildcard) => true,
            (Field::Wildcard, Field::Number(_)) => false,
            (Field::Number(a), Field::Number(b)) => a == b,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Wildcard => write!(f, "*"),
            Field::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpnPatternItem {
    pub node_number: Field,
    pub service_number: Field,
}

impl IpnPatternItem {
    pub fn new(node_number: u32, service_number: u32) -> Self {
        Self {
            node_number: Field::Number(node_number),
            service_number: Field::Number(service_number),
        }
    }

    pub fn wildcard(node_number: Field, service_number: Field) -> Self {
        Self { node_number, service_number }
    }

    pub(super) fn matches(&self, eid: &Eid) -> bool {
        match eid {
            Eid::Ipn { node_number, service_number } => {
                self.node_number.matches(*node_number) && self.service_number.matches(*service_number)
            }
            Eid::Null => self.node_number.matches(0) && self.service_number.matches(0),
            _ => false,
        }
    }

    pub(super) fn is_subset(&self, other: &Self) -> bool {
        self.node_number.is_subset(&other.node_number) && self.service_number.is_subset(&other.service_number)
    }

    pub(super) fn try_to_eid(&self) -> Option<Eid> {
        match (&self.node_number, &self.service_number) {
            (Field::Number(0), Field::Number(0)) => Some(Eid::Null),
            (Field::Number(n), Field::Number(s)) => Some(Eid::Ipn { node_number: *n, service_number: *s }),
            _ => None,
        }
    }
}

impl std::fmt::Display for IpnPatternItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node_number, self.service_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matches_only_that_node_and_service() {
        let item = IpnPatternItem::new(2, 1);
        assert!(item.matches(&Eid::Ipn { node_number: 2, service_number: 1 }));
        assert!(!item.matches(&Eid::Ipn { node_number: 2, service_number: 2 }));
    }

    #[test]
    fn wildcard_service_matches_any_service() {
        let item = IpnPatternItem::wildcard(Field::Number(2), Field::Wildcard);
        assert!(item.matches(&Eid::Ipn { node_number: 2, service_number: 1 }));
        assert!(item.matches(&Eid::Ipn { node_number: 2, service_number: 99 }));
        assert!(!item.matches(&Eid::Ipn { node_number: 3, service_number: 1 }));
    }

    #[test]
    fn zero_zero_matches_null() {
        let item = IpnPatternItem::new(0, 0);
        assert!(item.matches(&Eid::Null));
    }
}
