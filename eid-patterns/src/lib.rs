/*!
EID pattern matching: the subset of the teacher's own `hardy-eid-patterns`
shape this agent's local-service registry and configuration grammars need.

Grounded on the teacher's own crate for the `EidPattern::{Any, Set}` /
`EidPatternItem` split and the `is_subset`/`matches` API, simplified to the
two EID schemes this workspace's [`hardy_bpv7::eid::Eid`] actually has (no
`LocalNode`/legacy-IPN/percent-encoded DTN glob support — those are
teacher-specific extensions this crate does not need, trimmed rather than
carried as dead code).
*/

use hardy_bpv7::eid::Eid;
use std::borrow::Cow;
use thiserror::Error;

mod ipn_pattern;
mod parse;

#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("not an exact Eid")]
    NotExact,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String"))]
#[cfg_attr(feature = "serde", serde(try_from = "Cow<'_,str>"))]
pub enum EidPattern {
    Any,
    Set(Box<[EidPatternItem]>),
}

impl EidPattern {
    pub fn matches(&self, eid: &Eid) -> bool {
        match self {
            EidPattern::Any => true,
            EidPattern::Set(items) => items.iter().any(|i| i.matches(eid)),
        }
    }

    /// Is `self` a subset (or equal to) `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        match (self, other) {
            (_, EidPattern::Any) => true,
            (EidPattern::Any, _) => false,
            (EidPattern::Set(lhs), EidPattern::Set(rhs)) => {
                !lhs.iter().any(|l| !rhs.iter().any(|r| l.is_subset(r)))
            }
        }
    }
}

impl TryFrom<Cow<'_, str>> for EidPattern {
    type Error = Error;

    fn try_from(value: Cow<'_, str>) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EidPattern> for String {
    fn from(value: EidPattern) -> Self {
        value.to_string()
    }
}

impl From<Eid> for EidPattern {
    fn from(value: Eid) -> Self {
        match value {
            Eid::Null => EidPattern::Set(
                [EidPatternItem::IpnPatternItem(ipn_pattern::IpnPatternItem::new(0, 0))].into(),
            ),
            Eid::Ipn { node_number, service_number } => EidPattern::Set(
                [EidPatternItem::IpnPatternItem(ipn_pattern::IpnPatternItem::new(
                    node_number,
                    service_number,
                ))]
                .into(),
            ),
            Eid::Dtn(ssp) => EidPattern::Set([EidPatternItem::DtnExact(ssp)].into()),
            Eid::Unknown { scheme, .. } => {
                EidPattern::Set([EidPatternItem::AnyNumericScheme(scheme)].into())
            }
        }
    }
}

impl TryFrom<EidPattern> for Eid {
    type Error = Error;

    fn try_from(value: EidPattern) -> Result<Self, Self::Error> {
        match value {
            EidPattern::Set(items) if items.len() == 1 => {
                items[0].try_to_eid().ok_or(Error::NotExact)
            }
            _ => Err(Error::NotExact),
        }
    }
}

impl std::fmt::Display for EidPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EidPattern::Any => write!(f, "*:**"),
            EidPattern::Set(items) => {
                for (i, p) in items.iter().enumerate() {
                    if i != 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{p}")?;
                }
                Ok(())
            }
        }
    }
}

/// One member of an [`EidPattern::Set`]. `DtnExact`/`DtnNone`/`DtnAny` cover
/// this crate's simplified, un-split `dtn://ssp` scheme; `IpnPatternItem`
/// covers `ipn:node.service` with optional wildcards on either field;
/// `AnyNumericScheme`/`AnyTextScheme` match every EID of a given scheme
/// regardless of its scheme-specific part (`ipn:**`, `2:**`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EidPatternItem {
    AnyNumericScheme(u64),
    AnyTextScheme(String),
    IpnPatternItem(ipn_pattern::IpnPatternItem),
    DtnNone,
    DtnAny,
    DtnExact(Box<str>),
}

impl EidPatternItem {
    fn matches(&self, eid: &Eid) -> bool {
        match self {
            EidPatternItem::IpnPatternItem(i) => i.matches(eid),
            EidPatternItem::DtnNone => eid.is_null(),
            EidPatternItem::DtnAny => matches!(eid, Eid::Dtn(_)),
            EidPatternItem::DtnExact(ssp) => matches!(eid, Eid::Dtn(s) if s == ssp),
            EidPatternItem::AnyNumericScheme(_) | EidPatternItem::AnyTextScheme(_) => false,
        }
    }

    fn is_subset(&self, other: &Self) -> bool {
        match (self, other) {
            (EidPatternItem::AnyNumericScheme(lhs), EidPatternItem::AnyNumericScheme(rhs)) => {
                lhs == rhs
            }
            (EidPatternItem::AnyNumericScheme(s_n), EidPatternItem::AnyTextScheme(s_str))
            | (EidPatternItem::AnyTextScheme(s_str), EidPatternItem::AnyNumericScheme(s_n)) => {
                (*s_n == 1 && s_str == "dtn") || (*s_n == 2 && s_str == "ipn")
            }
            (EidPatternItem::AnyTextScheme(lhs), EidPatternItem::AnyTextScheme(rhs)) => lhs == rhs,
            (EidPatternItem::IpnPatternItem(_), EidPatternItem::AnyNumericScheme(2)) => true,
            (EidPatternItem::IpnPatternItem(_), EidPatternItem::AnyTextScheme(s)) => s == "ipn",
            (EidPatternItem::IpnPatternItem(lhs), EidPatternItem::IpnPatternItem(rhs)) => {
                lhs.is_subset(rhs)
            }
            (EidPatternItem::DtnNone, EidPatternItem::DtnNone) => true,
            (EidPatternItem::DtnNone, EidPatternItem::DtnAny) => false,
            (_, EidPatternItem::DtnAny) if matches!(self, EidPatternItem::DtnExact(_)) => true,
            (EidPatternItem::DtnAny, EidPatternItem::DtnAny) => true,
            (EidPatternItem::DtnExact(lhs), EidPatternItem::DtnExact(rhs)) => lhs == rhs,
            (EidPatternItem::DtnNone, EidPatternItem::AnyNumericScheme(1)) => true,
            (EidPatternItem::DtnNone, EidPatternItem::AnyTextScheme(s)) => s == "dtn",
            (EidPatternItem::DtnAny, EidPatternItem::AnyNumericScheme(1)) => true,
            (EidPatternItem::DtnAny, EidPatternItem::AnyTextScheme(s)) => s == "dtn",
            (EidPatternItem::DtnExact(_), EidPatternItem::AnyNumericScheme(1)) => true,
            (EidPatternItem::DtnExact(_), EidPatternItem::AnyTextScheme(s)) => s == "dtn",
            _ => false,
        }
    }

    fn try_to_eid(&self) -> Option<Eid> {
        match self {
            EidPatternItem::IpnPatternItem(i) => i.try_to_eid(),
            EidPatternItem::DtnNone => Some(Eid::Null),
            EidPatternItem::DtnExact(ssp) => Some(Eid::Dtn(ssp.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for EidPatternItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EidPatternItem::IpnPatternItem(i) => write!(f, "ipn:{i}"),
            EidPatternItem::DtnNone => write!(f, "dtn:none"),
            EidPatternItem::DtnAny => write!(f, "dtn:**"),
            EidPatternItem::DtnExact(ssp) => write!(f, "dtn://{ssp}"),
            EidPatternItem::AnyNumericScheme(v) => write!(f, "{v}:**"),
            EidPatternItem::AnyTextScheme(v) => write!(f, "{v}:**"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_parses_and_matches_everything() {
        let p: EidPattern = "*:**".parse().unwrap();
        assert_eq!(p, EidPattern::Any);
        assert!(p.matches(&Eid::Null));
        assert!(p.matches(&"ipn:2.1".parse().unwrap()));
    }

    #[test]
    fn ipn_wildcard_service_matches_any_service_on_that_node() {
        let p: EidPattern = "ipn:2.*".parse().unwrap();
        assert!(p.matches(&"ipn:2.1".parse().unwrap()));
        assert!(p.matches(&"ipn:2.99".parse().unwrap()));
        assert!(!p.matches(&"ipn:3.1".parse().unwrap()));
    }

    #[test]
    fn dtn_exact_matches_only_that_ssp() {
        let p: EidPattern = "dtn://node1/mail".parse().unwrap();
        assert!(p.matches(&"dtn://node1/mail".parse().unwrap()));
        assert!(!p.matches(&"dtn://node1/other".parse().unwrap()));
    }

    #[test]
    fn dtn_wildcard_matches_any_dtn_eid() {
        let p: EidPattern = "dtn:**".parse().unwrap();
        assert!(p.matches(&"dtn://node1/mail".parse().unwrap()));
        assert!(!p.matches(&"ipn:2.1".parse().unwrap()));
    }

    #[test]
    fn set_pattern_matches_any_member() {
        let p: EidPattern = "dtn://node1/mail|ipn:2.1".parse().unwrap();
        assert!(p.matches(&"dtn://node1/mail".parse().unwrap()));
        assert!(p.matches(&"ipn:2.1".parse().unwrap()));
        assert!(!p.matches(&"ipn:2.2".parse().unwrap()));
    }

    #[test]
    fn from_eid_round_trips_through_try_into() {
        let eid: Eid = "dtn://node1/mail".parse().unwrap();
        let pattern = EidPattern::from(eid.clone());
        let back: Eid = pattern.try_into().unwrap();
        assert_eq!(back, eid);
    }

    #[test]
    fn exact_is_subset_of_wildcard_but_not_the_reverse() {
        let exact: EidPattern = "ipn:2.1".parse().unwrap();
        let wild: EidPattern = "ipn:2.*".parse().unwrap();
        assert!(exact.is_subset(&wild));
        assert!(!wild.is_subset(&exact));
    }
}
