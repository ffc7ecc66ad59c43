/*!
This module provides functionality for creating, parsing, and managing BPv7
bundle status reports, the only administrative record type defined by RFC 9171.

A `BundleStatusReport` is used by a Bundle Protocol agent to report on the
status of a bundle: reception, forwarding, delivery, and deletion, along with
a reason code and (optionally) the time each event occurred.
*/

use super::*;
use crate::error::CaptureFieldErr;
use thiserror::Error;

/// Errors that can occur when working with status reports.
#[derive(Error, Debug)]
pub enum Error {
    /// Indicates that an unknown administrative record type was encountered.
    #[error("Unknown administrative record type {0}")]
    UnknownAdminRecordType(u64),

    /// Indicates that a reserved and unassigned reason code (255) was used.
    #[error("Reserved Status Report Reason Code (255)")]
    ReservedStatusReportReason,

    /// Error resulting from a failure to parse a field within the status report.
    #[error("Failed to parse {field}: {source}")]
    InvalidField {
        /// The name of the field that failed to parse.
        field: &'static str,
        /// The underlying error that caused the failure.
        source: Box<dyn core::error::Error + Send + Sync>,
    },

    /// Error resulting from invalid CBOR data.
    #[error(transparent)]
    InvalidCBOR(#[from] hardy_cbor::decode::Error),
}

impl crate::error::HasInvalidField for Error {
    fn invalid_field(
        field: &'static str,
        source: Box<dyn core::error::Error + Send + Sync>,
    ) -> Self {
        Error::InvalidField { field, source }
    }
}

/// Represents the reason for a bundle status report.
///
/// These codes are defined in RFC 9171 Section 6.1.2 and indicate why the
/// status report was generated.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReasonCode {
    /// No additional information is available.
    #[default]
    NoAdditionalInformation,
    /// The bundle's lifetime has expired.
    LifetimeExpired,
    /// The bundle was forwarded over a unidirectional link.
    ForwardedOverUnidirectionalLink,
    /// The transmission of the bundle was canceled.
    TransmissionCanceled,
    /// The bundle was deleted due to depleted storage.
    DepletedStorage,
    /// The destination endpoint ID was unavailable.
    DestinationEndpointIDUnavailable,
    /// There is no known route to the destination from the reporting node.
    NoKnownRouteToDestinationFromHere,
    /// There was no timely contact with the next node on the route.
    NoTimelyContactWithNextNodeOnRoute,
    /// A block in the bundle was unintelligible.
    BlockUnintelligible,
    /// The bundle's hop limit was exceeded.
    HopLimitExceeded,
    /// Traffic was pared (i.e., some bundles were dropped).
    TrafficPared,
    /// A block in the bundle is unsupported.
    BlockUnsupported,
    /// An unassigned reason code.
    Unassigned(u64),
}

impl From<ReasonCode> for u64 {
    fn from(value: ReasonCode) -> Self {
        match value {
            ReasonCode::NoAdditionalInformation => 0,
            ReasonCode::LifetimeExpired => 1,
            ReasonCode::ForwardedOverUnidirectionalLink => 2,
            ReasonCode::TransmissionCanceled => 3,
            ReasonCode::DepletedStorage => 4,
            ReasonCode::DestinationEndpointIDUnavailable => 5,
            ReasonCode::NoKnownRouteToDestinationFromHere => 6,
            ReasonCode::NoTimelyContactWithNextNodeOnRoute => 7,
            ReasonCode::BlockUnintelligible => 8,
            ReasonCode::HopLimitExceeded => 9,
            ReasonCode::TrafficPared => 10,
            ReasonCode::BlockUnsupported => 11,
            ReasonCode::Unassigned(v) => v,
        }
    }
}

impl TryFrom<u64> for ReasonCode {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReasonCode::NoAdditionalInformation),
            1 => Ok(ReasonCode::LifetimeExpired),
            2 => Ok(ReasonCode::ForwardedOverUnidirectionalLink),
            3 => Ok(ReasonCode::TransmissionCanceled),
            4 => Ok(ReasonCode::DepletedStorage),
            5 => Ok(ReasonCode::DestinationEndpointIDUnavailable),
            6 => Ok(ReasonCode::NoKnownRouteToDestinationFromHere),
            7 => Ok(ReasonCode::NoTimelyContactWithNextNodeOnRoute),
            8 => Ok(ReasonCode::BlockUnintelligible),
            9 => Ok(ReasonCode::HopLimitExceeded),
            10 => Ok(ReasonCode::TrafficPared),
            11 => Ok(ReasonCode::BlockUnsupported),
            255 => Err(Error::ReservedStatusReportReason),
            v => Ok(ReasonCode::Unassigned(v)),
        }
    }
}

impl hardy_cbor::encode::ToCbor for ReasonCode {
    type Result = ();

    fn to_cbor(&self, encoder: &mut hardy_cbor::encode::Encoder) -> Self::Result {
        encoder.emit(&u64::from(*self))
    }
}

impl hardy_cbor::decode::FromCbor for ReasonCode {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, bool, usize), Self::Error> {
        let ((v, s), len) = hardy_cbor::decode::parse_value(data, |value, shortest, tags| {
            match value {
                hardy_cbor::decode::Value::UnsignedInteger(v) => Ok((v, shortest && tags.is_empty())),
                value => Err(hardy_cbor::decode::Error::IncorrectType(
                    "Unsigned Integer".to_string(),
                    value.type_name(!tags.is_empty()),
                )
                .into()),
            }
        })?;
        Ok((ReasonCode::try_from(v)?, s, len))
    }
}

/// Represents a status assertion: whether an event occurred, and optionally
/// the time at which it occurred.
#[derive(Debug, Clone)]
pub struct StatusAssertion(pub Option<time::OffsetDateTime>);

fn emit_status_assertion(a: &mut hardy_cbor::encode::Array, sa: &Option<StatusAssertion>) {
    match sa {
        None => a.emit(&[false]),
        Some(StatusAssertion(None)) => a.emit(&[true]),
        Some(StatusAssertion(Some(timestamp))) => {
            a.emit(&(true, dtn_time::DtnTime::saturating_from(*timestamp)))
        }
    }
}

fn parse_status_assertion(
    a: &mut hardy_cbor::decode::Array,
    shortest: &mut bool,
) -> Result<Option<StatusAssertion>, Error> {
    a.parse_array(|a, s, tags| {
        let mut local_shortest = s && tags.is_empty() && a.is_definite();

        let (status, s) = a.parse::<bool>().map_field_err::<Error>("status")?;
        local_shortest = local_shortest && s;

        let assertion = if status {
            if let Some((timestamp, s)) = a
                .try_parse::<dtn_time::DtnTime>()
                .map_field_err::<Error>("timestamp")?
            {
                local_shortest = local_shortest && s;
                if timestamp.millisecs() == 0 {
                    Some(StatusAssertion(None))
                } else {
                    Some(StatusAssertion(Some(timestamp.into())))
                }
            } else {
                Some(StatusAssertion(None))
            }
        } else {
            None
        };
        Ok::<_, Error>((assertion, local_shortest))
    })
    .map(|((assertion, s), _)| {
        *shortest = *shortest && s;
        assertion
    })
}

/// Represents a bundle status report, carried as the payload of an
/// administrative-record bundle.
#[derive(Default, Debug, Clone)]
pub struct BundleStatusReport {
    /// The ID of the bundle that this report pertains to.
    pub bundle_id: bundle::Id,
    /// Status assertion for when the bundle was received.
    pub received: Option<StatusAssertion>,
    /// Status assertion for when the bundle was forwarded.
    pub forwarded: Option<StatusAssertion>,
    /// Status assertion for when the bundle was delivered.
    pub delivered: Option<StatusAssertion>,
    /// Status assertion for when the bundle was deleted.
    pub deleted: Option<StatusAssertion>,
    /// The reason for this status report.
    pub reason: ReasonCode,
}

impl hardy_cbor::encode::ToCbor for BundleStatusReport {
    type Result = ();

    fn to_cbor(&self, encoder: &mut hardy_cbor::encode::Encoder) -> Self::Result {
        encoder.emit_array(
            Some(if self.bundle_id.fragment_info.is_none() {
                4
            } else {
                6
            }),
            |a| {
                a.emit_array(Some(4), |a| {
                    emit_status_assertion(a, &self.received);
                    emit_status_assertion(a, &self.forwarded);
                    emit_status_assertion(a, &self.delivered);
                    emit_status_assertion(a, &self.deleted);
                });

                a.emit(&self.reason);
                a.emit(&self.bundle_id.source);
                a.emit(&self.bundle_id.timestamp);

                if let Some(fragment_info) = &self.bundle_id.fragment_info {
                    a.emit(&fragment_info.offset);
                    a.emit(&fragment_info.total_adu_length);
                }
            },
        )
    }
}

impl hardy_cbor::decode::FromCbor for BundleStatusReport {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, bool, usize), Self::Error> {
        hardy_cbor::decode::parse_array(data, |a, shortest, tags| {
            let mut shortest = shortest && tags.is_empty() && a.is_definite();

            let mut report = Self::default();
            a.parse_array(|a, s, tags| {
                let mut local_shortest = s && tags.is_empty() && a.is_definite();
                report.received = parse_status_assertion(a, &mut local_shortest)
                    .map_field_err::<Error>("received status")?;
                report.forwarded = parse_status_assertion(a, &mut local_shortest)
                    .map_field_err::<Error>("forwarded status")?;
                report.delivered = parse_status_assertion(a, &mut local_shortest)
                    .map_field_err::<Error>("delivered status")?;
                report.deleted = parse_status_assertion(a, &mut local_shortest)
                    .map_field_err::<Error>("deleted status")?;
                Ok::<_, Error>(local_shortest)
            })
            .map(|((s, _))| shortest = shortest && s)
            .map_field_err::<Error>("bundle status information")?;

            let (reason, s) = a.parse::<ReasonCode>().map_field_err::<Error>("reason")?;
            shortest = shortest && s;
            report.reason = reason;

            let (source, s) = a
                .parse::<eid::Eid>()
                .map_field_err::<Error>("source")?;
            shortest = shortest && s;

            let (timestamp, s) = a
                .parse::<creation_timestamp::CreationTimestamp>()
                .map_field_err::<Error>("timestamp")?;
            shortest = shortest && s;

            report.bundle_id = bundle::Id {
                source,
                timestamp,
                fragment_info: None,
            };

            if let Some((offset, s)) = a
                .try_parse::<u64>()
                .map_field_err::<Error>("fragment offset")?
            {
                shortest = shortest && s;
                let (total_adu_length, s) = a
                    .parse::<u64>()
                    .map_field_err::<Error>("fragment total ADU length")?;
                shortest = shortest && s;
                report.bundle_id.fragment_info = Some(bundle::FragmentInfo {
                    offset,
                    total_adu_length,
                });
            }
            Ok::<_, Error>((report, shortest))
        })
        .map(|((v, s), len)| (v, s, len))
    }
}

/// Represents an administrative record.
///
/// An administrative record is a special type of bundle payload used for
/// network management purposes. The only type defined by RFC 9171 is the
/// `BundleStatusReport`.
#[derive(Debug)]
pub enum AdministrativeRecord {
    /// A bundle status report.
    BundleStatusReport(BundleStatusReport),
}

impl hardy_cbor::encode::ToCbor for AdministrativeRecord {
    type Result = ();

    fn to_cbor(&self, encoder: &mut hardy_cbor::encode::Encoder) -> Self::Result {
        match self {
            AdministrativeRecord::BundleStatusReport(report) => {
                encoder.emit_array(Some(2), |a| {
                    a.emit(&1u64);
                    a.emit(report);
                })
            }
        }
    }
}

impl hardy_cbor::decode::FromCbor for AdministrativeRecord {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, bool, usize), Self::Error> {
        hardy_cbor::decode::parse_array(data, |a, shortest, tags| {
            let mut shortest = shortest && tags.is_empty() && a.is_definite();

            let (record_type, s) = a
                .parse::<u64>()
                .map_field_err::<Error>("record type code")?;
            shortest = shortest && s;

            match record_type {
                1 => {
                    let (report, s) = a
                        .parse::<BundleStatusReport>()
                        .map_field_err::<Error>("bundle status report")?;
                    Ok((Self::BundleStatusReport(report), shortest && s))
                }
                v => Err(Error::UnknownAdminRecordType(v)),
            }
        })
        .map(|((v, s), len)| (v, s, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardy_cbor::decode::FromCbor;

    #[test]
    fn status_report_round_trips() {
        let report = BundleStatusReport {
            bundle_id: bundle::Id {
                source: "ipn:2.1".parse().unwrap(),
                timestamp: creation_timestamp::CreationTimestamp::new_sequential(),
                fragment_info: None,
            },
            received: Some(StatusAssertion(None)),
            forwarded: None,
            delivered: None,
            deleted: None,
            reason: ReasonCode::NoAdditionalInformation,
        };
        let (bytes, _) = hardy_cbor::encode::emit(&report);
        let (decoded, _, len) = BundleStatusReport::from_cbor(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(decoded.bundle_id.source, report.bundle_id.source);
        assert_eq!(decoded.reason, report.reason);
    }

    #[test]
    fn rejects_reserved_reason_code() {
        assert!(matches!(
            ReasonCode::try_from(255),
            Err(Error::ReservedStatusReportReason)
        ));
    }
}
