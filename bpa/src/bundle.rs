/*!
The unified, in-memory bundle representation (C4): a version-agnostic view
over a BPv6 ([`hardy_bpv6`]) or BPv7 ([`hardy_bpv7`]) bundle so the rest of
the agent — store, routing, and the bundle processor — can work with one
shape regardless of which wire protocol a bundle arrived on.
*/

use crate::error::{Error, Result};
use bytes::Bytes;
use hardy_bpv7::eid::Eid;
use std::time::Duration;

/// Which wire protocol a bundle was parsed from, or should be serialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V6,
    V7,
}

/// Class-of-service priority, common to both wire versions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    #[default]
    Bulk,
    Normal,
    Expedited,
}

/// Bundle-wide processing control flags, normalized across BP6 and BP7
/// (RFC 5050 §4.2, RFC 9171 §4.2.3).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Flags {
    pub is_admin_record: bool,
    pub do_not_fragment: bool,
    pub custody_transfer_requested: bool,
    pub priority: Priority,
    pub receipt_report_requested: bool,
    pub forward_report_requested: bool,
    pub delivery_report_requested: bool,
    pub delete_report_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentInfo {
    pub offset: u64,
    pub total_adu_length: u64,
}

/// The globally unique identity of a bundle: who created it, when, and
/// (if a fragment) which slice of the original it carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId {
    pub source: Eid,
    pub creation_timestamp: u64,
    pub sequence_number: u64,
    pub fragment_info: Option<FragmentInfo>,
}

/// Which known extension block type a block carries, so the processor can
/// act on previous-node/bundle-age/hop-count without re-parsing raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Payload,
    PreviousNode,
    BundleAge,
    HopCount,
    Unknown(u64),
}

#[derive(Debug, Clone)]
pub struct ExtensionBlock {
    pub block_type: BlockType,
    pub block_number: u64,
    pub must_replicate: bool,
    pub report_if_unprocessed: bool,
    pub delete_if_unprocessed: bool,
    pub discard_if_unprocessed: bool,
    pub data: Box<[u8]>,
}

/// Why a bundle is still being retained; it is freed only once every
/// constraint has cleared (RFC 5050 §4.2, the teacher's `BundleStatus`
/// retention-bitset idiom).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub dispatch_pending: bool,
    pub forward_pending: bool,
    pub custody_accepted: bool,
    pub reassembly_pending: bool,
    pub own: bool,
}

impl Retention {
    pub fn is_clear(&self) -> bool {
        !(self.dispatch_pending
            || self.forward_pending
            || self.custody_accepted
            || self.reassembly_pending
            || self.own)
    }
}

/// A fully parsed bundle, independent of which wire protocol produced it.
///
/// `id` is assigned by the bundle store (C5) and is `None` until the bundle
/// has been handed to it; `bundle_id` is the wire-level identity used for
/// duplicate detection and reassembly.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub id: Option<u16>,
    pub version: Version,
    pub flags: Flags,
    pub bundle_id: BundleId,
    pub destination: Eid,
    pub report_to: Eid,
    pub lifetime: Duration,
    pub retention: Retention,
    pub custodian: Eid,
    pub extension_blocks: Vec<ExtensionBlock>,
    pub payload: Box<[u8]>,
    /// This bundle's own wire encoding, kept alongside the parsed form so
    /// forwarding it to a CLA (§4.8 step 2) never needs to re-serialize —
    /// it hands the same bytes back out, whether they arrived off a CLA or
    /// were just built locally for an AAP send.
    pub wire_bytes: Bytes,
    /// Contacts the router has assigned this bundle to but which haven't
    /// yet reported a successful transmission; `TRANSMISSION_SUCCESS` only
    /// fires once this drains empty (§4.9).
    pub routed_contacts: Vec<u64>,
}

impl Bundle {
    pub fn serialized_size_hint(&self) -> usize {
        self.payload.len()
            + self
                .extension_blocks
                .iter()
                .map(|b| b.data.len() + 16)
                .sum::<usize>()
            + 64
    }

    pub fn is_fragment(&self) -> bool {
        self.bundle_id.fragment_info.is_some()
    }

    /// Converts a parsed BPv7 bundle (plus the source bytes its blocks
    /// borrow from) into the unified representation.
    pub fn from_bpv7(bundle: hardy_bpv7::bundle::Bundle, source_data: &Bytes) -> Result<Self> {
        let payload = bundle.payload(source_data)?.to_vec().into_boxed_slice();

        let mut extension_blocks = Vec::new();
        for (&number, block) in &bundle.blocks {
            if number == 0 || number == 1 {
                continue;
            }
            let Some(data) = block.payload(source_data) else {
                continue;
            };
            extension_blocks.push(ExtensionBlock {
                block_type: BlockType::Unknown(u64::from(block.block_type)),
                block_number: number,
                must_replicate: block.flags.must_replicate,
                report_if_unprocessed: block.flags.report_on_failure,
                delete_if_unprocessed: block.flags.delete_bundle_on_failure,
                discard_if_unprocessed: block.flags.delete_block_on_failure,
                data: data.to_vec().into_boxed_slice(),
            });
        }

        let priority = if bundle.flags.receipt_report_requested {
            Priority::Expedited
        } else {
            Priority::Normal
        };

        Ok(Self {
            id: None,
            version: Version::V7,
            flags: Flags {
                is_admin_record: bundle.flags.is_admin_record,
                do_not_fragment: bundle.flags.do_not_fragment,
                custody_transfer_requested: false,
                priority,
                receipt_report_requested: bundle.flags.receipt_report_requested,
                forward_report_requested: bundle.flags.forward_report_requested,
                delivery_report_requested: bundle.flags.delivery_report_requested,
                delete_report_requested: bundle.flags.delete_report_requested,
            },
            bundle_id: BundleId {
                source: bundle.id.source.clone(),
                creation_timestamp: bundle
                    .id
                    .timestamp
                    .creation_time()
                    .map(|t| t.secs())
                    .unwrap_or(0),
                sequence_number: bundle.id.timestamp.sequence_number(),
                fragment_info: bundle.id.fragment_info.as_ref().map(|f| FragmentInfo {
                    offset: f.offset,
                    total_adu_length: f.total_adu_length,
                }),
            },
            destination: bundle.destination.clone(),
            report_to: bundle.report_to.clone(),
            lifetime: bundle.lifetime,
            retention: Retention {
                dispatch_pending: true,
                ..Default::default()
            },
            custodian: Eid::Null,
            extension_blocks,
            payload,
            wire_bytes: source_data.clone(),
            routed_contacts: Vec::new(),
        })
    }

    /// Converts a parsed BPv6 bundle into the unified representation.
    pub fn from_bpv6(bundle: hardy_bpv6::Bundle, source_data: Bytes) -> Result<Self> {
        let payload = bundle
            .payload()
            .ok_or(hardy_bpv6::error::Error::MissingPayload)?
            .to_vec()
            .into_boxed_slice();

        let mut extension_blocks = Vec::new();
        let mut number = 2u64;
        for block in &bundle.blocks {
            if block.block_type == hardy_bpv6::block::Type::Payload {
                continue;
            }
            extension_blocks.push(ExtensionBlock {
                block_type: BlockType::Unknown(u8::from(block.block_type) as u64),
                block_number: number,
                must_replicate: block.flags.must_replicate,
                report_if_unprocessed: block.flags.report_on_failure,
                delete_if_unprocessed: block.flags.delete_bundle_on_failure,
                discard_if_unprocessed: block.flags.discard_on_failure,
                data: block.data.clone(),
            });
            number += 1;
        }

        let priority = match bundle.flags.priority {
            hardy_bpv6::flags::Priority::Bulk => Priority::Bulk,
            hardy_bpv6::flags::Priority::Normal => Priority::Normal,
            hardy_bpv6::flags::Priority::Expedited | hardy_bpv6::flags::Priority::Reserved => {
                Priority::Expedited
            }
        };

        Ok(Self {
            id: None,
            version: Version::V6,
            flags: Flags {
                is_admin_record: bundle.flags.is_admin_record,
                do_not_fragment: bundle.flags.do_not_fragment,
                custody_transfer_requested: bundle.flags.custody_transfer_requested,
                priority,
                receipt_report_requested: bundle.flags.receipt_report_requested,
                forward_report_requested: bundle.flags.forward_report_requested,
                delivery_report_requested: bundle.flags.delivery_report_requested,
                delete_report_requested: bundle.flags.delete_report_requested,
            },
            bundle_id: BundleId {
                source: eid_from_bpv6(&bundle.source),
                creation_timestamp: bundle.creation_timestamp.time,
                sequence_number: bundle.creation_timestamp.sequence_number,
                fragment_info: bundle.fragment_info.map(|f| FragmentInfo {
                    offset: f.offset,
                    total_adu_length: f.total_application_data_length,
                }),
            },
            destination: eid_from_bpv6(&bundle.destination),
            report_to: eid_from_bpv6(&bundle.report_to),
            lifetime: Duration::from_secs(bundle.lifetime),
            retention: Retention {
                dispatch_pending: true,
                ..Default::default()
            },
            custodian: eid_from_bpv6(&bundle.custodian),
            extension_blocks,
            payload,
            wire_bytes: source_data,
            routed_contacts: Vec::new(),
        })
    }
}

/// BPv6 EIDs are `scheme:ssp` strings; reinterpret the two schemes this
/// agent understands into the unified [`Eid`], preserving anything else as
/// `Unknown` so it still round-trips on re-serialization to BP6.
fn eid_from_bpv6(eid: &hardy_bpv6::eid::Eid) -> Eid {
    if eid.is_null() {
        return Eid::Null;
    }
    match &*eid.scheme {
        "dtn" => Eid::Dtn(eid.ssp.strip_prefix("//").unwrap_or(&eid.ssp).into()),
        "ipn" => eid
            .ssp
            .split_once('.')
            .and_then(|(node, service)| Some((node.parse::<u32>().ok()?, service.parse::<u32>().ok()?)))
            .map(|(node_number, service_number)| Eid::Ipn {
                node_number,
                service_number,
            })
            .unwrap_or_else(|| Eid::Unknown {
                scheme: 2,
                data: eid.ssp.as_bytes().into(),
            }),
        _ => Eid::Unknown {
            scheme: 0,
            data: format!("{eid}").into_bytes().into(),
        },
    }
}

pub fn eid_to_bpv6(eid: &Eid) -> hardy_bpv6::eid::Eid {
    match eid {
        Eid::Null => hardy_bpv6::eid::Eid::null(),
        Eid::Dtn(ssp) => hardy_bpv6::eid::Eid::new("dtn", format!("//{ssp}")),
        Eid::Ipn {
            node_number,
            service_number,
        } => hardy_bpv6::eid::Eid::new("ipn", format!("{node_number}.{service_number}")),
        Eid::Unknown { .. } => hardy_bpv6::eid::Eid::null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eid_from_bpv6_round_trips_dtn_and_ipn() {
        let dtn = hardy_bpv6::eid::Eid::new("dtn", "//node1/mail");
        assert_eq!(eid_from_bpv6(&dtn), Eid::Dtn("node1/mail".into()));

        let ipn = hardy_bpv6::eid::Eid::new("ipn", "5.2");
        assert_eq!(
            eid_from_bpv6(&ipn),
            Eid::Ipn {
                node_number: 5,
                service_number: 2
            }
        );

        assert_eq!(eid_to_bpv6(&eid_from_bpv6(&ipn)), ipn);
    }

    #[test]
    fn retention_is_clear_only_when_every_flag_is_unset() {
        let mut retention = Retention::default();
        assert!(retention.is_clear());
        retention.forward_pending = true;
        assert!(!retention.is_clear());
    }
}
