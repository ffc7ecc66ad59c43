/*!
This module contains the internal logic for parsing a BPv7 bundle from a byte slice.
It validates the primary block, iterates through extension blocks, unpacks the
well-known ones (Previous Node, Bundle Age, Hop Count) into `Bundle` fields, and
rewrites the bundle to canonical CBOR form if it wasn't already.
*/

use super::*;
use error::CaptureFieldErr;

/// The result of successfully parsing a bundle.
#[derive(Debug)]
pub struct ParsedBundle {
    /// The parsed bundle structure.
    pub bundle: Bundle,
    /// `true` if an unsupported block was encountered that requested a status report.
    pub report_unsupported: bool,
    /// The canonical CBOR encoding of the bundle, present only if the original
    /// encoding was not already in canonical form.
    pub new_data: Option<Box<[u8]>>,
}

/// Returned when a bundle fails to parse. Carries the partially-built `Bundle`
/// (filled in as far as parsing got) so a status report can still name its
/// source and creation timestamp.
#[derive(Debug)]
pub struct InvalidBundle {
    pub bundle: Bundle,
    pub reason: status_report::ReasonCode,
    pub error: Error,
}

/// A state machine for parsing the extension blocks of a bundle.
struct BlockParse {
    blocks: std::collections::HashMap<u64, block::Block>,
    noncanonical_blocks: std::collections::HashMap<u64, Option<Box<[u8]>>>,
    unique_blocks: std::collections::HashSet<block::Type>,
}

impl BlockParse {
    fn new() -> Self {
        Self {
            blocks: std::collections::HashMap::with_capacity(8),
            noncanonical_blocks: std::collections::HashMap::with_capacity(4),
            unique_blocks: std::collections::HashSet::with_capacity(4),
        }
    }

    /// Parses the payload of a specific, already-inserted block into a given type `T`.
    fn parse_payload<T>(&self, source_data: &[u8], block_number: u64) -> Result<(T, bool), Error>
    where
        T: hardy_cbor::decode::FromCbor<Error: Into<Error>>,
    {
        let payload = if let Some(Some(b)) = self.noncanonical_blocks.get(&block_number) {
            b.as_ref()
        } else {
            self.blocks
                .get(&block_number)
                .and_then(|block| block.payload(source_data))
                .ok_or(Error::MissingPayload)?
        };

        let (v, s, len) = T::from_cbor(payload).map_err(Into::into)?;
        Ok((v, s && len == payload.len()))
    }

    fn parse_blocks(
        &mut self,
        bundle: &Bundle,
        block_array: &mut hardy_cbor::decode::Array,
        source_data: &[u8],
    ) -> Result<bool, Error> {
        let mut last_block_number = 0;
        let mut report_unsupported = false;
        let mut offset = block_array.offset();

        while let Some((mut block, canonical)) =
            block_array.try_parse::<block::BlockWithNumber>()?
        {
            block.block.extent = block.block.extent.start + offset..block.block.extent.end + offset;
            offset = block_array.offset();

            if (bundle.flags.is_admin_record || bundle.id.source.is_null())
                && block.block.flags.report_on_failure
            {
                return Err(Error::InvalidFlags);
            }

            match block.block.block_type {
                block::Type::Primary => unreachable!(),
                block::Type::Payload
                | block::Type::PreviousNode
                | block::Type::BundleAge
                | block::Type::HopCount => {
                    if !self.unique_blocks.insert(block.block.block_type) {
                        return Err(Error::DuplicateBlockNumber(block.number));
                    }
                }
                block::Type::Unrecognised(_) => {
                    if block.block.flags.delete_bundle_on_failure {
                        return Err(Error::Unsupported(block.number));
                    }
                    if block.block.flags.report_on_failure {
                        report_unsupported = true;
                    }
                }
            }

            if self.blocks.insert(block.number, block.block).is_some() {
                return Err(Error::DuplicateBlockNumber(block.number));
            }

            if block.payload.is_some() || !canonical {
                self.noncanonical_blocks.insert(block.number, block.payload);
            }

            last_block_number = block.number;
        }

        if !self.unique_blocks.contains(&block::Type::Payload) {
            return Err(Error::MissingPayload);
        }
        if last_block_number != 1 {
            return Err(Error::PayloadNotFinal);
        }
        if block_array.offset() != source_data.len() {
            return Err(Error::AdditionalData);
        }

        Ok(report_unsupported)
    }

    /// Unpacks the well-known extension blocks (Previous Node, Bundle Age, Hop
    /// Count) into the corresponding `Bundle` fields.
    fn unpack_known_blocks(&self, bundle: &mut Bundle, source_data: &[u8]) -> Result<bool, Error> {
        let mut shortest = true;
        for (number, block) in &self.blocks {
            match block.block_type {
                block::Type::PreviousNode => {
                    let (eid, s) = self
                        .parse_payload::<eid::Eid>(source_data, *number)
                        .map_field_err("Previous Node block")?;
                    shortest = shortest && s;
                    bundle.previous_node = Some(eid);
                }
                block::Type::BundleAge => {
                    let (age, s) = self
                        .parse_payload::<u64>(source_data, *number)
                        .map_field_err("Bundle Age block")?;
                    shortest = shortest && s;
                    bundle.age = Some(core::time::Duration::from_millis(age));
                }
                block::Type::HopCount => {
                    let (hop_count, s) = self
                        .parse_payload::<hop_info::HopInfo>(source_data, *number)
                        .map_field_err("Hop Count block")?;
                    shortest = shortest && s;
                    bundle.hop_count = Some(hop_count);
                }
                _ => {}
            }
        }
        Ok(shortest)
    }

    /// Moves all parsed extension blocks into the bundle, then rewrites the
    /// bundle into canonical CBOR form if any block required it.
    fn finish(self, bundle: &mut Bundle, source_data: &[u8]) -> Result<Option<Box<[u8]>>, Error> {
        let mut block_numbers: Vec<u64> = self.blocks.keys().copied().collect();
        block_numbers.sort_unstable();

        if self.noncanonical_blocks.is_empty() {
            bundle.blocks.extend(self.blocks);
            return Ok(None);
        }

        let new_data = hardy_cbor::encode::emit_array(Some(1 + block_numbers.len()), |array| {
            bundle
                .emit_primary_block(array)
                .expect("re-emitting a valid primary block cannot fail");
            for number in &block_numbers {
                let mut block = self.blocks.get(number).unwrap().clone();
                if let Some(Some(payload)) = self.noncanonical_blocks.get(number) {
                    block
                        .emit(*number, payload, array)
                        .expect("re-emitting a block cannot fail");
                } else {
                    block.copy_whole(source_data, array);
                }
                bundle.blocks.insert(*number, block);
            }
        });
        Ok(Some(new_data.into()))
    }
}

fn reason_for(error: &Error) -> status_report::ReasonCode {
    match error {
        Error::InvalidVersion(_) => status_report::ReasonCode::BlockUnintelligible,
        Error::Unsupported(_) => status_report::ReasonCode::BlockUnsupported,
        Error::InvalidFragmentInfo(..) => status_report::ReasonCode::BlockUnintelligible,
        _ => status_report::ReasonCode::BlockUnintelligible,
    }
}

/// Parses a complete bundle from its CBOR-encoded byte representation.
pub fn parse(source_data: &[u8]) -> Result<ParsedBundle, InvalidBundle> {
    hardy_cbor::decode::parse_array(source_data, |array, shortest, tags| {
        let shortest = shortest && tags.is_empty() && array.is_definite();

        let primary_start = array.offset();
        let (primary, canonical_primary) = array.parse::<primary_block::PrimaryBlock>()?;
        let primary_end = array.offset();

        let (mut bundle, primary_error) = primary.into_bundle(primary_start..primary_end);
        if let Some(e) = primary_error {
            return Err(e);
        }

        let mut parser = BlockParse::new();
        let report_unsupported = parser.parse_blocks(&bundle, array, source_data)?;
        let unpack_shortest = parser.unpack_known_blocks(&mut bundle, source_data)?;
        let shortest = shortest && canonical_primary && unpack_shortest;

        let new_data = if shortest {
            parser.finish(&mut bundle, source_data)?
        } else {
            // A non-canonical primary block forces a full rewrite even if
            // every extension block was already canonical.
            let mut new_data = parser.finish(&mut bundle, source_data)?;
            if new_data.is_none() {
                new_data = Some(
                    hardy_cbor::encode::emit_array(Some(1 + bundle.blocks.len() - 1), |array| {
                        bundle
                            .emit_primary_block(array)
                            .expect("re-emitting a valid primary block cannot fail");
                        let mut numbers: Vec<u64> =
                            bundle.blocks.keys().copied().filter(|n| *n != 0).collect();
                        numbers.sort_unstable();
                        for number in numbers {
                            let mut block = bundle.blocks.get(&number).unwrap().clone();
                            block.copy_whole(source_data, array);
                            bundle.blocks.insert(number, block);
                        }
                    })
                    .into(),
                );
            }
            new_data
        };

        Ok((bundle, report_unsupported, new_data))
    })
    .map(|((bundle, report_unsupported, new_data), _)| ParsedBundle {
        bundle,
        report_unsupported,
        new_data,
    })
    .map_err(|error| InvalidBundle {
        bundle: Bundle::default(),
        reason: reason_for(&error),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::super::*;

    fn sample_bytes() -> Vec<u8> {
        let bundle = Bundle {
            id: Id {
                source: "ipn:2.1".parse().unwrap(),
                timestamp: creation_timestamp::CreationTimestamp::new_sequential(),
                fragment_info: None,
            },
            destination: "ipn:3.1".parse().unwrap(),
            report_to: eid::Eid::Null,
            lifetime: core::time::Duration::from_secs(3600),
            crc_type: crc::CrcType::None,
            ..Default::default()
        };

        hardy_cbor::encode::emit_array(Some(2), |array| {
            let mut bundle = bundle;
            bundle.emit_primary_block(array).unwrap();

            let mut payload_block = block::Block {
                block_type: block::Type::Payload,
                flags: block::Flags::default(),
                crc_type: crc::CrcType::None,
                extent: 0..0,
                data: 0..0,
            };
            payload_block.emit(1, b"hello", array).unwrap();
        })
    }

    #[test]
    fn parses_a_well_formed_bundle() {
        let data = sample_bytes();
        let parsed = parse(&data).unwrap();
        assert_eq!(parsed.bundle.destination.to_string(), "ipn:3.1");
        assert_eq!(parsed.bundle.payload(&data).unwrap(), b"hello");
        assert!(parsed.new_data.is_none());
    }

    #[test]
    fn rejects_missing_payload() {
        let bundle = Bundle {
            id: Id {
                source: "ipn:2.1".parse().unwrap(),
                timestamp: creation_timestamp::CreationTimestamp::new_sequential(),
                fragment_info: None,
            },
            destination: "ipn:3.1".parse().unwrap(),
            report_to: eid::Eid::Null,
            lifetime: core::time::Duration::from_secs(3600),
            crc_type: crc::CrcType::None,
            ..Default::default()
        };
        let data = hardy_cbor::encode::emit_array(Some(1), |array| {
            let mut bundle = bundle;
            bundle.emit_primary_block(array).unwrap();
        });
        let err = parse(&data).unwrap_err();
        assert!(matches!(err.error, Error::MissingPayload));
    }
}
