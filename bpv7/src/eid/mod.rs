/*!
This module defines the [`Eid`] type, a simplified representation of a Bundle
Protocol Endpoint ID covering the two schemes used throughout this crate: `dtn`
and `ipn`. Endpoint IDs outside these two schemes are retained as opaque
[`Eid::Unknown`] values so that a bundle carrying one can still be routed and
re-serialized without being understood.
*/

use super::*;
use error::CaptureFieldErr;

mod error;
mod parse;

pub use error::EidError;

/// A Bundle Protocol Endpoint ID.
///
/// RFC 9171 defines EIDs as URIs. This crate only gives first-class treatment
/// to the `dtn` and `ipn` schemes; anything else round-trips as
/// [`Eid::Unknown`].
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String", try_from = "String"))]
pub enum Eid {
    /// The null endpoint, `dtn:none`, used as the source of bundles created by
    /// a node with no administrative endpoint, or as a "nobody cares" report-to.
    #[default]
    Null,
    /// A `dtn://` endpoint. The scheme-specific part (everything following
    /// `dtn://`) is stored verbatim, without being decomposed into a
    /// node-name and demux path.
    Dtn(Box<str>),
    /// An `ipn:node.service` endpoint, naming a service running on a node.
    Ipn {
        /// The node number.
        node_number: u32,
        /// The service number.
        service_number: u32,
    },
    /// An endpoint using a scheme this crate doesn't give special meaning to.
    /// Its CBOR scheme-specific part is kept as opaque, pre-encoded bytes.
    Unknown {
        /// The CBOR-encoded scheme code.
        scheme: u64,
        /// The raw CBOR encoding of the scheme-specific part.
        data: Box<[u8]>,
    },
}

impl Eid {
    /// Returns `true` if this is the null endpoint `dtn:none`.
    pub fn is_null(&self) -> bool {
        matches!(self, Eid::Null)
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eid::Null => f.write_str("dtn:none"),
            Eid::Dtn(ssp) => write!(f, "dtn://{ssp}"),
            Eid::Ipn {
                node_number,
                service_number,
            } => write!(f, "ipn:{node_number}.{service_number}"),
            Eid::Unknown { scheme, data } => write!(f, "unknown({scheme}):{data:x?}"),
        }
    }
}

impl hardy_cbor::encode::ToCbor for Eid {
    type Result = ();

    fn to_cbor(&self, encoder: &mut hardy_cbor::encode::Encoder) -> Self::Result {
        encoder.emit_array(Some(2), |a| match self {
            Eid::Null => {
                a.emit(&1u64);
                a.emit(&0u64);
            }
            Eid::Dtn(ssp) => {
                a.emit(&1u64);
                a.emit(&format!("//{ssp}"));
            }
            Eid::Ipn {
                node_number,
                service_number,
            } => {
                a.emit(&2u64);
                a.emit_array(Some(2), |a| {
                    a.emit(node_number);
                    a.emit(service_number);
                });
            }
            Eid::Unknown { scheme, data } => {
                a.emit(scheme);
                a.emit(&hardy_cbor::encode::Raw(data));
            }
        })
    }
}

impl hardy_cbor::decode::FromCbor for Eid {
    type Error = EidError;

    fn from_cbor(data: &[u8]) -> Result<(Self, bool, usize), Self::Error> {
        hardy_cbor::decode::parse_array(data, |a, shortest, tags| {
            let mut shortest = shortest && tags.is_empty() && a.is_definite();

            let (scheme, s) = a.parse::<u64>().map_field_err("EID scheme")?;
            shortest = shortest && s;

            match scheme {
                1 => {
                    let ((eid, s), _) = a
                        .parse_value(|value, s, tags| match value {
                            hardy_cbor::decode::Value::UnsignedInteger(0) => {
                                Ok((Eid::Null, s && tags.is_empty()))
                            }
                            hardy_cbor::decode::Value::Text(ssp) => ssp
                                .strip_prefix("//")
                                .ok_or(EidError::DtnMissingPrefix)
                                .map(|ssp| (Eid::Dtn(ssp.into()), s && tags.is_empty())),
                            value => Err(hardy_cbor::decode::Error::IncorrectType(
                                "Unsigned Integer or Text String".to_string(),
                                value.type_name(!tags.is_empty()),
                            )
                            .into()),
                        })
                        .map_field_err("'dtn' scheme-specific part")?;
                    Ok((eid, shortest && s))
                }
                2 => {
                    let ((eid, s), _) = a
                        .parse_value(|value, s, tags| match value {
                            hardy_cbor::decode::Value::Array(nested) => {
                                let mut s = s && tags.is_empty() && nested.is_definite();
                                let (node_number, s1) =
                                    nested.parse::<u32>().map_field_err("ipn node number")?;
                                let (service_number, s2) =
                                    nested.parse::<u32>().map_field_err("ipn service number")?;
                                nested.at_end()?;
                                s = s && s1 && s2;
                                Ok((
                                    Eid::Ipn {
                                        node_number,
                                        service_number,
                                    },
                                    s,
                                ))
                            }
                            value => Err(hardy_cbor::decode::Error::IncorrectType(
                                "Array".to_string(),
                                value.type_name(!tags.is_empty()),
                            )
                            .into()),
                        })
                        .map_field_err("'ipn' scheme-specific part")?;
                    Ok((eid, shortest && s))
                }
                scheme => {
                    let start = a.offset();
                    let Some((_, len)) = a
                        .skip_value(16)
                        .map_field_err("unknown scheme-specific part")?
                    else {
                        return Err(EidError::UnsupportedScheme(scheme));
                    };
                    Ok((
                        Eid::Unknown {
                            scheme,
                            data: data[start..start + len].into(),
                        },
                        false,
                    ))
                }
            }
        })
        .map(|((eid, s), len)| (eid, s, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardy_cbor::decode::FromCbor;
    use hardy_cbor::encode::ToCbor;

    fn round_trip(eid: &Eid) -> Eid {
        let (bytes, _) = hardy_cbor::encode::emit(eid);
        let (decoded, _, len) = Eid::from_cbor(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        decoded
    }

    #[test]
    fn null_round_trips() {
        assert_eq!(round_trip(&Eid::Null), Eid::Null);
    }

    #[test]
    fn dtn_round_trips() {
        let eid = Eid::Dtn("node1/mail".into());
        assert_eq!(round_trip(&eid), eid);
    }

    #[test]
    fn ipn_round_trips() {
        let eid = Eid::Ipn {
            node_number: 42,
            service_number: 7,
        };
        assert_eq!(round_trip(&eid), eid);
    }

    #[test]
    fn display_matches_uri_form() {
        assert_eq!(Eid::Null.to_string(), "dtn:none");
        assert_eq!(
            Eid::Ipn {
                node_number: 2,
                service_number: 1
            }
            .to_string(),
            "ipn:2.1"
        );
    }
}
