//! `FromStr for EidPattern`, grounded on the teacher's own
//! `static_routes::parse` module's `winnow` style (`Caseless`/`alt`/
//! `separated` combinators over byte slices), adapted to `&str` input and
//! this crate's simplified, two-scheme grammar:
//!
//! ```text
//! EidPattern ::= "*:**" | item ("|" item)*
//! item       ::= ipn_item | dtn_item | scheme_wildcard
//! ipn_item   ::= "ipn:" field "." field
//! field      ::= "*" | <u32>
//! dtn_item   ::= "dtn:none" | "dtn:**" | "dtn://" <ssp>
//! scheme_wildcard ::= <scheme> ":**"
//! ```

use super::{EidPattern, EidPatternItem, Error, ipn_pattern};
use winnow::{
    ModalResult, Parser,
    ascii::dec_uint,
    combinator::{alt, separated},
    token::take_till,
};

fn parse_field(input: &mut &str) -> ModalResult<ipn_pattern::Field> {
    alt(('*'.map(|_| ipn_pattern::Field::Wildcard), dec_uint.map(ipn_pattern::Field::Number)))
        .parse_next(input)
}

fn parse_ipn_item(input: &mut &str) -> ModalResult<EidPatternItem> {
    ("ipn:", parse_field, '.', parse_field)
        .map(|(_, node_number, _, service_number)| {
            EidPatternItem::IpnPatternItem(ipn_pattern::IpnPatternItem::wildcard(node_number, service_number))
        })
        .parse_next(input)
}

fn parse_dtn_item(input: &mut &str) -> ModalResult<EidPatternItem> {
    alt((
        "dtn:none".map(|_| EidPatternItem::DtnNone),
        "dtn:**".map(|_| EidPatternItem::DtnAny),
        ("dtn://", take_till(0.., '|')).map(|(_, ssp): (_, &str)| EidPatternItem::DtnExact(ssp.into())),
    ))
    .parse_next(input)
}

fn parse_scheme_wildcard(input: &mut &str) -> ModalResult<EidPatternItem> {
    (take_till(1.., (':', '|')), ":**")
        .parse_next(input)
        .map(|(scheme, _): (&str, _)| {
            if let Ok(n) = scheme.parse::<u64>() {
                EidPatternItem::AnyNumericScheme(n)
            } else {
                EidPatternItem::AnyTextScheme(scheme.to_owned())
            }
        })
}

fn parse_item(input: &mut &str) -> ModalResult<EidPatternItem> {
    alt((parse_ipn_item, parse_dtn_item, parse_scheme_wildcard)).parse_next(input)
}

fn parse_pattern(input: &mut &str) -> ModalResult<EidPattern> {
    alt((
        "*:**".map(|_| EidPattern::Any),
        separated(1.., parse_item, '|').map(|items: Vec<_>| EidPattern::Set(items.into())),
    ))
    .parse_next(input)
}

impl std::str::FromStr for EidPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pattern
            .parse(s)
            .map_err(|e| Error::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any() {
        assert_eq!("*:**".parse::<EidPattern>().unwrap(), EidPattern::Any);
    }

    #[test]
    fn parses_exact_ipn() {
        let p: EidPattern = "ipn:2.1".parse().unwrap();
        assert_eq!(
            p,
            EidPattern::Set([EidPatternItem::IpnPatternItem(ipn_pattern::IpnPatternItem::new(2, 1))].into())
        );
    }

    #[test]
    fn parses_wildcard_ipn() {
        let p: EidPattern = "ipn:*.*".parse().unwrap();
        assert!(p.matches(&hardy_bpv7::eid::Eid::Ipn { node_number: 9, service_number: 9 }));
    }

    #[test]
    fn parses_dtn_none() {
        assert_eq!(
            "dtn:none".parse::<EidPattern>().unwrap(),
            EidPattern::Set([EidPatternItem::DtnNone].into())
        );
    }

    #[test]
    fn parses_dtn_exact() {
        let p: EidPattern = "dtn://node1/mail".parse().unwrap();
        assert!(p.matches(&hardy_bpv7::eid::Eid::Dtn("node1/mail".into())));
    }

    #[test]
    fn parses_a_set_of_items() {
        let p: EidPattern = "ipn:2.1|dtn://node1/mail".parse().unwrap();
        assert!(p.matches(&hardy_bpv7::eid::Eid::Ipn { node_number: 2, service_number: 1 }));
        assert!(p.matches(&hardy_bpv7::eid::Eid::Dtn("node1/mail".into())));
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-pattern".parse::<EidPattern>().is_err());
    }
}
