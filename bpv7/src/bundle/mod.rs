/*!
This module defines the core `Bundle` structure and its components, providing the
primary interface for creating, parsing, and interacting with BPv7 bundles.
It orchestrates the various parts of a bundle, from the primary block to extension
blocks and payload.
*/

use super::*;
use base64::prelude::*;

mod parse;
mod primary_block;

pub use parse::{InvalidBundle, ParsedBundle, parse};

/// Holds fragmentation information for a bundle.
///
/// As defined in RFC 9171 Section 4.2.1, this information is present in the
/// primary block if the bundle is a fragment of a larger original bundle.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FragmentInfo {
    /// The offset of this fragment's payload within the original bundle's payload.
    pub offset: u64,
    /// The total length of the original bundle's payload.
    pub total_adu_length: u64,
}

/// Contains the [`Id`] struct for uniquely identifying a bundle and related helpers.
pub mod id {
    use super::*;
    use thiserror::Error;

    /// Errors that can occur when parsing a bundle [`Id`] from a key.
    #[derive(Error, Debug)]
    pub enum Error {
        /// The key string is malformed and cannot be parsed.
        #[error("Bad bundle id key")]
        BadKey,

        /// The key is not valid Base64.
        #[error("Bad base64 encoding: {0}")]
        BadBase64(base64::DecodeError),

        /// A field within the decoded CBOR data is invalid.
        #[error("Failed to decode {field}: {source}")]
        InvalidField {
            field: &'static str,
            source: Box<dyn core::error::Error + Send + Sync>,
        },

        /// An error occurred during CBOR decoding.
        #[error(transparent)]
        InvalidCBOR(#[from] hardy_cbor::decode::Error),
    }
}

trait CaptureFieldIdErr<T> {
    fn map_field_id_err(self, field: &'static str) -> Result<T, id::Error>;
}

impl<T, E: Into<Box<dyn core::error::Error + Send + Sync>>> CaptureFieldIdErr<T>
    for core::result::Result<T, E>
{
    fn map_field_id_err(self, field: &'static str) -> Result<T, id::Error> {
        self.map_err(|e| id::Error::InvalidField {
            field,
            source: e.into(),
        })
    }
}

/// Represents the unique identifier of a BPv7 bundle.
///
/// A bundle ID is a tuple of `(source EID, creation timestamp, fragment info)`.
/// This combination is guaranteed to be unique across the DTN.
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id {
    /// The EID of the node that created the bundle.
    pub source: eid::Eid,
    /// The creation timestamp, including a sequence number for uniqueness.
    pub timestamp: creation_timestamp::CreationTimestamp,
    /// Fragmentation information, if this bundle is a fragment.
    pub fragment_info: Option<FragmentInfo>,
}

impl Id {
    /// Deserializes a bundle ID from a compact, base64-encoded string representation.
    ///
    /// This is useful for using the bundle ID as a key in databases or other systems.
    pub fn from_key(k: &str) -> Result<Self, id::Error> {
        hardy_cbor::decode::parse_array(
            &BASE64_STANDARD_NO_PAD
                .decode(k)
                .map_err(id::Error::BadBase64)?,
            |array, _, _| {
                let s = Self {
                    source: array.parse().map_field_id_err("source EID")?,
                    timestamp: array.parse().map_field_id_err("creation timestamp")?,
                    fragment_info: if array.len() == Some(4) {
                        Some(FragmentInfo {
                            offset: array.parse().map_field_id_err("fragment offset")?,
                            total_adu_length: array
                                .parse()
                                .map_field_id_err("total application data unit Length")?,
                        })
                    } else {
                        None
                    },
                };
                array.at_end()?;
                Ok::<_, id::Error>(s)
            },
        )
        .map(|v| v.0)
    }

    /// Serializes the bundle ID into a compact, base64-encoded string representation.
    ///
    /// This is useful for using the bundle ID as a key in databases or other systems.
    pub fn to_key(&self) -> String {
        BASE64_STANDARD_NO_PAD.encode(
            if let Some(fragment_info) = &self.fragment_info {
                hardy_cbor::encode::emit(&(
                    &self.source,
                    &self.timestamp,
                    fragment_info.offset,
                    fragment_info.total_adu_length,
                ))
            } else {
                hardy_cbor::encode::emit(&(&self.source, &self.timestamp))
            }
            .0,
        )
    }
}

impl core::fmt::Display for Id {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(fi) = &self.fragment_info {
            write!(
                f,
                "{}/{} fragment {}/{}",
                self.source, self.timestamp, fi.offset, fi.total_adu_length
            )
        } else {
            write!(f, "{}/{}", self.source, self.timestamp)
        }
    }
}

/// Represents the processing control flags for a BPv7 bundle.
///
/// These flags, defined in RFC 9171 Section 4.2.3, control how a node should
/// handle the bundle, such as whether it can be fragmented or if status reports
/// are requested.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    /// If set, this bundle is a fragment of a larger bundle.
    pub is_fragment: bool,
    /// If set, the payload is an administrative record.
    pub is_admin_record: bool,
    /// If set, the bundle must not be fragmented.
    pub do_not_fragment: bool,
    /// If set, the destination application is requested to send an acknowledgement.
    pub app_ack_requested: bool,
    /// If set, status reports should include the time of the reported event.
    pub report_status_time: bool,
    /// If set, a status report should be generated upon bundle reception.
    pub receipt_report_requested: bool,
    /// If set, a status report should be generated upon bundle forwarding.
    pub forward_report_requested: bool,
    /// If set, a status report should be generated upon bundle delivery.
    pub delivery_report_requested: bool,
    /// If set, a status report should be generated upon bundle deletion.
    pub delete_report_requested: bool,
    /// A bitmask of any unrecognized flags encountered during parsing.
    pub unrecognised: Option<u64>,
}

impl From<u64> for Flags {
    fn from(value: u64) -> Self {
        let mut flags = Self::default();
        let mut unrecognised = value;

        if (value & (1 << 0)) != 0 {
            flags.is_fragment = true;
            unrecognised &= !(1 << 0);
        }
        if (value & (1 << 1)) != 0 {
            flags.is_admin_record = true;
            unrecognised &= !(1 << 1);
        }
        if (value & (1 << 2)) != 0 {
            flags.do_not_fragment = true;
            unrecognised &= !(1 << 2);
        }
        if (value & (1 << 5)) != 0 {
            flags.app_ack_requested = true;
            unrecognised &= !(1 << 5);
        }
        if (value & (1 << 6)) != 0 {
            flags.report_status_time = true;
            unrecognised &= !(1 << 6);
        }
        if (value & (1 << 14)) != 0 {
            flags.receipt_report_requested = true;
            unrecognised &= !(1 << 14);
        }
        if (value & (1 << 16)) != 0 {
            flags.forward_report_requested = true;
            unrecognised &= !(1 << 16);
        }
        if (value & (1 << 17)) != 0 {
            flags.delivery_report_requested = true;
            unrecognised &= !(1 << 17);
        }
        if (value & (1 << 18)) != 0 {
            flags.delete_report_requested = true;
            unrecognised &= !(1 << 18);
        }

        if unrecognised != 0 {
            flags.unrecognised = Some(unrecognised);
        }
        flags
    }
}

impl From<&Flags> for u64 {
    fn from(value: &Flags) -> Self {
        let mut flags = value.unrecognised.unwrap_or(0);
        if value.is_fragment {
            flags |= 1 << 0;
        }
        if value.is_admin_record {
            flags |= 1 << 1;
        }
        if value.do_not_fragment {
            flags |= 1 << 2;
        }
        if value.app_ack_requested {
            flags |= 1 << 5;
        }
        if value.report_status_time {
            flags |= 1 << 6;
        }
        if value.receipt_report_requested {
            flags |= 1 << 14;
        }
        if value.forward_report_requested {
            flags |= 1 << 16;
        }
        if value.delivery_report_requested {
            flags |= 1 << 17;
        }
        if value.delete_report_requested {
            flags |= 1 << 18;
        }
        flags
    }
}

impl hardy_cbor::encode::ToCbor for Flags {
    type Result = ();

    fn to_cbor(&self, encoder: &mut hardy_cbor::encode::Encoder) -> Self::Result {
        encoder.emit(&u64::from(self))
    }
}

impl hardy_cbor::decode::FromCbor for Flags {
    type Error = hardy_cbor::decode::Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, bool, usize), Self::Error> {
        hardy_cbor::decode::parse::<u64>(data).map(|(value, shortest, len)| {
            let flags: Flags = value.into();
            (flags, shortest, len)
        })
    }
}

/// Represents a complete BPv7 bundle.
///
/// This struct contains all the information from the primary block, data unpacked
/// from known extension blocks, and a map of all blocks present in the bundle.
/// The bundle's raw byte data is stored separately, and this struct provides
/// methods to access and interpret it.
#[derive(Default, Debug, Clone)]
pub struct Bundle {
    // From Primary Block
    /// The unique identifier for the bundle.
    pub id: Id,
    /// The bundle-specific processing control flags.
    pub flags: Flags,
    /// The type of CRC used for the primary block's integrity check.
    pub crc_type: crc::CrcType,
    /// The EID of the bundle's final destination.
    pub destination: eid::Eid,
    /// The EID to which status reports should be sent.
    pub report_to: eid::Eid,
    /// The time duration after which the bundle should be considered expired.
    pub lifetime: core::time::Duration,

    // Unpacked from extension blocks
    /// The EID of the node that last forwarded the bundle.
    pub previous_node: Option<eid::Eid>,
    /// The age of the bundle, used if the source node has no clock.
    pub age: Option<core::time::Duration>,
    /// The hop limit and current hop count for the bundle.
    pub hop_count: Option<hop_info::HopInfo>,

    /// A map of all blocks in the bundle, keyed by their block number.
    pub blocks: std::collections::HashMap<u64, block::Block>,
}

impl Bundle {
    /// Emits the primary block into a CBOR array during bundle creation.
    pub(crate) fn emit_primary_block(
        &mut self,
        array: &mut hardy_cbor::encode::Array,
    ) -> Result<(), Error> {
        let extent = array.emit(&hardy_cbor::encode::Raw(
            &primary_block::PrimaryBlock::emit(self)?,
        ));

        self.blocks.insert(
            0,
            primary_block::PrimaryBlock::as_block(self.crc_type, extent),
        );
        Ok(())
    }

    /// Retrieves the raw payload bytes of a specific block by its number.
    pub fn block_data<'a>(
        &self,
        block_number: u64,
        source_data: &'a [u8],
    ) -> Result<block::Payload<'a>, Error> {
        self.blocks
            .get(&block_number)
            .and_then(|block| block.payload(source_data))
            .map(block::Payload::Borrowed)
            .ok_or(Error::MissingBlock(block_number))
    }

    /// Returns a reference to the bundle's payload block data, if present.
    pub fn payload<'a>(&self, source_data: &'a [u8]) -> Result<&'a [u8], Error> {
        self.blocks
            .get(&1)
            .and_then(|block| block.payload(source_data))
            .ok_or(Error::MissingPayload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_key() {
        let id = Id {
            source: "ipn:2.1".parse().unwrap(),
            timestamp: creation_timestamp::CreationTimestamp::new_sequential(),
            fragment_info: None,
        };
        let key = id.to_key();
        assert_eq!(Id::from_key(&key).unwrap(), id);
    }

    #[test]
    fn id_round_trips_with_fragment_info() {
        let id = Id {
            source: "ipn:2.1".parse().unwrap(),
            timestamp: creation_timestamp::CreationTimestamp::new_sequential(),
            fragment_info: Some(FragmentInfo {
                offset: 10,
                total_adu_length: 100,
            }),
        };
        let key = id.to_key();
        assert_eq!(Id::from_key(&key).unwrap(), id);
    }

    #[test]
    fn flags_round_trip() {
        let raw = (1 << 0) | (1 << 6) | (1 << 17) | (1 << 20);
        let flags: Flags = raw.into();
        assert!(flags.is_fragment);
        assert!(flags.report_status_time);
        assert!(flags.delivery_report_requested);
        assert_eq!(flags.unrecognised, Some(1 << 20));
        assert_eq!(u64::from(&flags), raw);
    }
}
