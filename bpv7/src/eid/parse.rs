use super::*;
use error::CaptureFieldErr;

fn ipn_from_str(s: &str) -> Result<Eid, EidError> {
    let Some((node, service)) = s.split_once('.') else {
        return Err(EidError::IpnInvalidComponents);
    };
    if node.contains('.') || service.contains('.') {
        return Err(EidError::IpnInvalidComponents);
    }

    let node_number: u64 = node.parse().map_field_err("Node Number")?;
    let service_number: u64 = service.parse().map_field_err("Service Number")?;

    if node_number > u32::MAX as u64 {
        return Err(EidError::IpnInvalidNodeNumber(node_number));
    }
    if service_number > u32::MAX as u64 {
        return Err(EidError::IpnInvalidServiceNumber(service_number));
    }

    Ok(Eid::Ipn {
        node_number: node_number as u32,
        service_number: service_number as u32,
    })
}

fn dtn_from_ssp(ssp: &str) -> Result<Eid, EidError> {
    let Some(rest) = ssp.strip_prefix("//") else {
        return Err(EidError::DtnMissingPrefix);
    };
    let node_name = rest.split('/').next().unwrap_or_default();
    if node_name.is_empty() {
        return Err(EidError::DtnNodeNameEmpty);
    }
    if !rest.contains('/') {
        return Err(EidError::DtnMissingSlash);
    }
    Ok(Eid::Dtn(rest.into()))
}

#[cfg(feature = "serde")]
impl From<Eid> for String {
    fn from(eid: Eid) -> Self {
        eid.to_string()
    }
}

#[cfg(feature = "serde")]
impl TryFrom<String> for Eid {
    type Error = EidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::str::FromStr for Eid {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(ssp) = s.strip_prefix("dtn:") {
            if ssp == "none" {
                Ok(Eid::Null)
            } else {
                dtn_from_ssp(ssp)
            }
        } else if let Some(ssp) = s.strip_prefix("ipn:") {
            ipn_from_str(ssp)
        } else if let Some((scheme, _)) = s.split_once(':') {
            Err(EidError::UnsupportedSchemeName(scheme.to_string()))
        } else {
            Err(EidError::MissingScheme)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dtn_none() {
        assert!(matches!("dtn:none".parse(), Ok(Eid::Null)));
    }

    #[test]
    fn parses_dtn_uri() {
        let eid: Eid = "dtn://node1/mail".parse().unwrap();
        assert_eq!(eid.to_string(), "dtn://node1/mail");
    }

    #[test]
    fn rejects_dtn_without_slashes() {
        assert!("dtn://node1".parse::<Eid>().is_err());
    }

    #[test]
    fn parses_ipn_uri() {
        let eid: Eid = "ipn:2.1".parse().unwrap();
        assert!(matches!(
            eid,
            Eid::Ipn {
                node_number: 2,
                service_number: 1
            }
        ));
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!(matches!(
            "mailto:foo@example.com".parse::<Eid>(),
            Err(EidError::UnsupportedSchemeName(s)) if s == "mailto"
        ));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(matches!(
            "not-a-uri".parse::<Eid>(),
            Err(EidError::MissingScheme)
        ));
    }
}
