/*!
BPv6 administrative records: status reports and custody signals (RFC 5050
§6.1, §6.2), carried as the payload of a bundle with the `is_admin_record`
flag set.

```text
record_type_and_flags(1) · [status_flags(1), reason_code(1)]? ·
[reason_code(1)|accepted(1)]? · [fragment_offset(sdnv), fragment_length(sdnv)]? ·
event_time(sdnv) · event_time_nanos(sdnv) ·
bundle_creation_time(sdnv) · bundle_creation_seq(sdnv) ·
source_eid_length(sdnv) · source_eid(source_eid_length bytes)
```

The high nibble of the first byte names the record type (1 = status report,
2 = custody signal); bit 0 of the low nibble marks the *subject* bundle as
a fragment, which gates the fragment offset/length pair.
*/

use crate::{eid::Eid, error::Error, sdnv};

const RECORD_TYPE_STATUS_REPORT: u8 = 1;
const RECORD_TYPE_CUSTODY_SIGNAL: u8 = 2;
const FLAG_SUBJECT_IS_FRAGMENT: u8 = 0x01;
const CUSTODY_ACCEPTED: u8 = 0x80;

/// Which lifecycle events a status report is flagging (RFC 5050 §6.1.1),
/// packed as a bitmask in a single byte.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags {
    pub received: bool,
    pub custody_accepted: bool,
    pub forwarded: bool,
    pub delivered: bool,
    pub deleted: bool,
}

impl From<u8> for StatusFlags {
    fn from(value: u8) -> Self {
        Self {
            received: value & 0x01 != 0,
            custody_accepted: value & 0x02 != 0,
            forwarded: value & 0x04 != 0,
            delivered: value & 0x08 != 0,
            deleted: value & 0x10 != 0,
        }
    }
}

impl From<StatusFlags> for u8 {
    fn from(value: StatusFlags) -> Self {
        let mut byte = 0u8;
        if value.received {
            byte |= 0x01;
        }
        if value.custody_accepted {
            byte |= 0x02;
        }
        if value.forwarded {
            byte |= 0x04;
        }
        if value.delivered {
            byte |= 0x08;
        }
        if value.deleted {
            byte |= 0x10;
        }
        byte
    }
}

/// The reason a status report or custody signal was generated (RFC 5050
/// §6.1.2, a strict subset of the codes BPv7 later inherited).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    #[default]
    NoAdditionalInformation,
    LifetimeExpired,
    ForwardedOverUnidirectionalLink,
    TransmissionCanceled,
    DepletedStorage,
    DestinationEndpointIdUnintelligible,
    NoKnownRouteToDestination,
    NoTimelyContactWithNextNode,
    BlockUnintelligible,
    Unassigned(u8),
}

impl From<u8> for ReasonCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ReasonCode::NoAdditionalInformation,
            1 => ReasonCode::LifetimeExpired,
            2 => ReasonCode::ForwardedOverUnidirectionalLink,
            3 => ReasonCode::TransmissionCanceled,
            4 => ReasonCode::DepletedStorage,
            5 => ReasonCode::DestinationEndpointIdUnintelligible,
            6 => ReasonCode::NoKnownRouteToDestination,
            7 => ReasonCode::NoTimelyContactWithNextNode,
            8 => ReasonCode::BlockUnintelligible,
            n => ReasonCode::Unassigned(n),
        }
    }
}

impl From<ReasonCode> for u8 {
    fn from(value: ReasonCode) -> Self {
        match value {
            ReasonCode::NoAdditionalInformation => 0,
            ReasonCode::LifetimeExpired => 1,
            ReasonCode::ForwardedOverUnidirectionalLink => 2,
            ReasonCode::TransmissionCanceled => 3,
            ReasonCode::DepletedStorage => 4,
            ReasonCode::DestinationEndpointIdUnintelligible => 5,
            ReasonCode::NoKnownRouteToDestination => 6,
            ReasonCode::NoTimelyContactWithNextNode => 7,
            ReasonCode::BlockUnintelligible => 8,
            ReasonCode::Unassigned(n) => n,
        }
    }
}

/// A DTN "event time": whole seconds since the DTN epoch plus a nanosecond
/// remainder, as carried by both record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTime {
    pub seconds: u64,
    pub nanos: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentExtent {
    pub offset: u64,
    pub length: u64,
}

/// Identifies the bundle a report or signal is *about*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectBundle {
    pub fragment_extent: Option<FragmentExtent>,
    pub creation_time: u64,
    pub sequence_number: u64,
    pub source: Eid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: StatusFlags,
    pub reason: ReasonCode,
    pub event_time: EventTimeRaw,
    pub subject: SubjectBundle,
}

/// A custody acceptance or refusal for a previously custody-transferred bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodySignal {
    pub accepted: bool,
    pub reason: ReasonCode,
    pub event_time: EventTimeRaw,
    pub subject: SubjectBundle,
}

/// Raw event time, kept distinct from [`EventTime`] only to note it is not
/// further interpreted by this crate; callers needing wall-clock values
/// should convert via their own DTN-epoch mapping.
pub type EventTimeRaw = EventTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdministrativeRecord {
    StatusReport(StatusReport),
    CustodySignal(CustodySignal),
}

fn parse_subject(
    data: &[u8],
    mut pos: usize,
    is_fragment: bool,
) -> Result<(SubjectBundle, EventTime, usize), Error> {
    let fragment_extent = if is_fragment {
        let (offset, len) = sdnv::decode(&data[pos..])?;
        pos += len;
        let (length, len) = sdnv::decode(&data[pos..])?;
        pos += len;
        Some(FragmentExtent { offset, length })
    } else {
        None
    };

    let (seconds, len) = sdnv::decode(&data[pos..])?;
    pos += len;
    let (nanos, len) = sdnv::decode(&data[pos..])?;
    pos += len;
    let event_time = EventTime {
        seconds,
        nanos: u32::try_from(nanos).map_err(|_| sdnv::Error::Overflow)?,
    };

    let (creation_time, len) = sdnv::decode(&data[pos..])?;
    pos += len;
    let (sequence_number, len) = sdnv::decode(&data[pos..])?;
    pos += len;

    let (eid_len, len) = sdnv::decode(&data[pos..])?;
    pos += len;
    let eid_bytes = data
        .get(pos..pos + eid_len as usize)
        .ok_or(Error::TruncatedAdminRecord)?;
    pos += eid_bytes.len();
    let source = core::str::from_utf8(eid_bytes)
        .map_err(|_| Error::InvalidEid)?
        .parse::<Eid>()?;

    Ok((
        SubjectBundle {
            fragment_extent,
            creation_time,
            sequence_number,
            source,
        },
        event_time,
        pos,
    ))
}

impl AdministrativeRecord {
    /// Parses an administrative record from a bundle's payload bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let header = *data.first().ok_or(Error::TruncatedAdminRecord)?;
        let record_type = header >> 4;
        let is_fragment = header & FLAG_SUBJECT_IS_FRAGMENT != 0;
        let mut pos = 1usize;

        match record_type {
            RECORD_TYPE_STATUS_REPORT => {
                let status = StatusFlags::from(*data.get(pos).ok_or(Error::TruncatedAdminRecord)?);
                pos += 1;
                let reason = ReasonCode::from(*data.get(pos).ok_or(Error::TruncatedAdminRecord)?);
                pos += 1;

                let (subject, event_time, _) = parse_subject(data, pos, is_fragment)?;
                Ok(AdministrativeRecord::StatusReport(StatusReport {
                    status,
                    reason,
                    event_time,
                    subject,
                }))
            }
            RECORD_TYPE_CUSTODY_SIGNAL => {
                let byte = *data.get(pos).ok_or(Error::TruncatedAdminRecord)?;
                pos += 1;
                let accepted = byte & CUSTODY_ACCEPTED != 0;
                let reason = ReasonCode::from(byte & 0x7F);

                let (subject, event_time, _) = parse_subject(data, pos, is_fragment)?;
                Ok(AdministrativeRecord::CustodySignal(CustodySignal {
                    accepted,
                    reason,
                    event_time,
                    subject,
                }))
            }
            n => Err(Error::UnknownAdminRecordType(n)),
        }
    }

    /// Serializes this record to the bytes of a bundle payload.
    pub fn emit(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            AdministrativeRecord::StatusReport(report) => {
                let is_fragment = report.subject.fragment_extent.is_some();
                out.push((RECORD_TYPE_STATUS_REPORT << 4) | u8::from(is_fragment));
                out.push(u8::from(report.status));
                out.push(u8::from(report.reason));
                emit_subject(&mut out, &report.subject, report.event_time);
            }
            AdministrativeRecord::CustodySignal(signal) => {
                let is_fragment = signal.subject.fragment_extent.is_some();
                out.push((RECORD_TYPE_CUSTODY_SIGNAL << 4) | u8::from(is_fragment));
                let accept_bit = if signal.accepted { CUSTODY_ACCEPTED } else { 0 };
                out.push(accept_bit | (u8::from(signal.reason) & 0x7F));
                emit_subject(&mut out, &signal.subject, signal.event_time);
            }
        }
        out
    }
}

fn emit_subject(out: &mut Vec<u8>, subject: &SubjectBundle, event_time: EventTime) {
    if let Some(extent) = subject.fragment_extent {
        out.extend(sdnv::encode(extent.offset));
        out.extend(sdnv::encode(extent.length));
    }
    out.extend(sdnv::encode(event_time.seconds));
    out.extend(sdnv::encode(event_time.nanos as u64));
    out.extend(sdnv::encode(subject.creation_time));
    out.extend(sdnv::encode(subject.sequence_number));
    let eid = subject.source.to_string();
    out.extend(sdnv::encode(eid.len() as u64));
    out.extend_from_slice(eid.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SubjectBundle {
        SubjectBundle {
            fragment_extent: None,
            creation_time: 700_000_000,
            sequence_number: 3,
            source: "dtn://node1/mail".parse().unwrap(),
        }
    }

    #[test]
    fn round_trips_a_status_report() {
        let record = AdministrativeRecord::StatusReport(StatusReport {
            status: StatusFlags {
                delivered: true,
                ..Default::default()
            },
            reason: ReasonCode::NoAdditionalInformation,
            event_time: EventTime {
                seconds: 700_000_100,
                nanos: 500,
            },
            subject: subject(),
        });

        let bytes = record.emit();
        let parsed = AdministrativeRecord::parse(&bytes).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn round_trips_a_custody_signal_with_fragment_info() {
        let mut subject = subject();
        subject.fragment_extent = Some(FragmentExtent {
            offset: 0,
            length: 1000,
        });
        let record = AdministrativeRecord::CustodySignal(CustodySignal {
            accepted: true,
            reason: ReasonCode::DepletedStorage,
            event_time: EventTime {
                seconds: 700_000_200,
                nanos: 0,
            },
            subject,
        });

        let bytes = record.emit();
        let parsed = AdministrativeRecord::parse(&bytes).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn rejects_unknown_record_type() {
        let bytes = [0x50, 0x00];
        assert!(matches!(
            AdministrativeRecord::parse(&bytes),
            Err(Error::UnknownAdminRecordType(5))
        ));
    }
}
