/*!
This internal module handles the parsing and emission of the BPv7 Primary Block.
It defines an intermediate `PrimaryBlock` struct that is used during the CBOR
decoding process before the final `Bundle` struct is assembled.
*/

use super::*;
use error::CaptureFieldErr;

/// An intermediate representation of the Primary Block used during parsing.
///
/// Most fields are stored as `Result` types so that a partial `Bundle` can
/// still be assembled, and a status report generated, even if one field is
/// malformed.
pub struct PrimaryBlock {
    pub flags: bundle::Flags,
    pub crc_type: Result<crc::CrcType, Error>,
    pub source: Result<eid::Eid, Error>,
    pub destination: Result<eid::Eid, Error>,
    pub report_to: eid::Eid,
    pub timestamp: Result<creation_timestamp::CreationTimestamp, Error>,
    pub lifetime: Result<core::time::Duration, Error>,
    pub fragment_info: Result<Option<bundle::FragmentInfo>, Error>,
    pub crc_result: Result<(), Error>,
}

impl hardy_cbor::decode::FromCbor for PrimaryBlock {
    type Error = Error;

    fn from_cbor(data: &[u8]) -> Result<(Self, bool, usize), Self::Error> {
        hardy_cbor::decode::parse_array(data, |block, s, tags| {
            let mut shortest = s && tags.is_empty() && block.is_definite();

            let version = block
                .parse()
                .map(|(v, s)| {
                    shortest = shortest && s;
                    v
                })
                .map_field_err("version")?;
            if version != 7 {
                return Err(Error::InvalidVersion(version));
            }

            let flags = block
                .parse::<bundle::Flags>()
                .map(|(v, s)| {
                    shortest = shortest && s;
                    v
                })
                .map_field_err("bundle processing control flags")?;

            let crc_type = block
                .parse()
                .map(|(v, s)| {
                    shortest = shortest && s;
                    v
                })
                .map_err(Into::into);

            let destination = block
                .parse()
                .map(|(v, s)| {
                    shortest = shortest && s;
                    v
                })
                .map_err(Into::into);

            let source = block
                .parse()
                .map(|(v, s)| {
                    shortest = shortest && s;
                    v
                })
                .map_err(Into::into);

            let report_to = block
                .parse()
                .map(|(v, s)| {
                    shortest = shortest && s;
                    v
                })
                .map_field_err("report-to EID")?;

            let timestamp = block.parse().map(|(v, s)| {
                shortest = shortest && s;
                v
            });

            let lifetime = block
                .parse::<u64>()
                .map(|(v, s)| {
                    shortest = shortest && s;
                    core::time::Duration::from_millis(v)
                })
                .map_err(Into::into);

            let fragment_info = if !flags.is_fragment {
                Ok(None)
            } else {
                match (block.parse(), block.parse()) {
                    (Ok((offset, s1)), Ok((total_adu_length, s2))) => {
                        if offset >= total_adu_length {
                            Err(Error::InvalidFragmentInfo(offset, total_adu_length))
                        } else {
                            shortest = shortest && s1 && s2;
                            Ok(Some(bundle::FragmentInfo {
                                offset,
                                total_adu_length,
                            }))
                        }
                    }
                    (Err(e), _) | (_, Err(e)) => Err(e.into()),
                }
            };

            let crc_result = match &crc_type {
                Ok(crc_type) => crc::parse_crc_value(data, block, *crc_type)
                    .map(|s| {
                        shortest = shortest && s;
                    })
                    .map_err(Into::into),
                Err(_) => Ok(()),
            };

            Ok((
                Self {
                    flags,
                    crc_type,
                    source,
                    destination,
                    report_to,
                    lifetime,
                    timestamp,
                    fragment_info,
                    crc_result,
                },
                shortest,
            ))
        })
        .map(|((v, s), len)| (v, s, len))
    }
}

impl PrimaryBlock {
    pub fn as_block(crc_type: crc::CrcType, extent: core::ops::Range<usize>) -> block::Block {
        block::Block {
            block_type: block::Type::Primary,
            flags: block::Flags::default(),
            crc_type,
            data: 0..extent.len(),
            extent,
        }
    }

    /// Converts the intermediate `PrimaryBlock` into a `bundle::Bundle`.
    ///
    /// Fields that failed to parse are filled with their default value, and the
    /// first error encountered is returned alongside the partially-built bundle.
    pub fn into_bundle(self, extent: core::ops::Range<usize>) -> (bundle::Bundle, Option<Error>) {
        fn unpack<T: core::default::Default>(
            r: Result<T, Error>,
            e: &mut Option<Error>,
            field: &'static str,
        ) -> T {
            match r {
                Ok(t) => t,
                Err(e2) => {
                    if e.is_none() {
                        *e = Some(Error::InvalidField {
                            field,
                            source: e2.into(),
                        });
                    }
                    T::default()
                }
            }
        }

        let mut e = None;
        let crc_type = unpack(self.crc_type, &mut e, "Crc Type");
        let bundle = bundle::Bundle {
            flags: self.flags,
            report_to: self.report_to,
            destination: unpack(self.destination, &mut e, "Destination EID"),
            id: bundle::Id {
                source: unpack(self.source, &mut e, "Source EID"),
                timestamp: unpack(self.timestamp, &mut e, "Creation Timestamp"),
                fragment_info: unpack(self.fragment_info, &mut e, "Fragment Info"),
            },
            lifetime: unpack(self.lifetime, &mut e, "Lifetime"),
            crc_type,
            blocks: [(0, Self::as_block(crc_type, extent))].into(),
            ..Default::default()
        };

        let e = e
            .or_else(|| {
                self.crc_result
                    .map_err(|e| Error::InvalidField {
                        field: "Crc Value",
                        source: e.into(),
                    })
                    .err()
            })
            .or_else(|| {
                (
                    // RFC 9171 §4.2.3: the null source EID may only be used
                    // when no reply traffic will be generated for the bundle.
                    (bundle.id.source.is_null()
                        && (bundle.flags.is_fragment
                            || !bundle.flags.do_not_fragment
                            || bundle.flags.receipt_report_requested
                            || bundle.flags.forward_report_requested
                            || bundle.flags.delivery_report_requested
                            || bundle.flags.delete_report_requested))
                    || (bundle.flags.is_admin_record
                        && (bundle.flags.receipt_report_requested
                            || bundle.flags.forward_report_requested
                            || bundle.flags.delivery_report_requested
                            || bundle.flags.delete_report_requested))
                )
                    .then_some(Error::InvalidFlags)
            });

        (bundle, e)
    }

    /// Emits a `PrimaryBlock` into a CBOR-encoded `Vec<u8>`.
    pub fn emit(bundle: &bundle::Bundle) -> Result<Vec<u8>, Error> {
        crc::append_crc_value(
            bundle.crc_type,
            hardy_cbor::encode::emit_array(
                Some({
                    let mut count = if let crc::CrcType::None = bundle.crc_type {
                        8
                    } else {
                        9
                    };
                    if bundle.id.fragment_info.is_some() {
                        count += 2;
                    }
                    count
                }),
                |a| {
                    a.emit(&7u64);
                    a.emit(&bundle.flags);
                    a.emit(&bundle.crc_type);
                    a.emit(&bundle.destination);
                    a.emit(&bundle.id.source);
                    a.emit(&bundle.report_to);
                    a.emit(&bundle.id.timestamp);
                    a.emit(&(bundle.lifetime.as_millis() as u64));

                    if let Some(fragment_info) = &bundle.id.fragment_info {
                        a.emit(&fragment_info.offset);
                        a.emit(&fragment_info.total_adu_length);
                    }

                    if let crc::CrcType::None = bundle.crc_type {
                    } else {
                        a.skip_value();
                    }
                },
            ),
        )
        .map_err(Into::into)
    }
}
