/*!
The BPv6 [`Bundle`]: a primary block plus an ordered run of extension blocks,
the last of which must be the payload block (RFC 5050 §4, §4.3).
*/

use crate::{
    block::{self, Block},
    eid::{Dictionary, Eid},
    error::Error,
    flags::BlockFlags,
    primary_block::{CreationTimestamp, FragmentInfo, PrimaryBlock},
};

/// A fully parsed BPv6 bundle and the extension blocks carried alongside its
/// payload, in wire order.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub flags: crate::flags::BundleFlags,
    pub destination: Eid,
    pub source: Eid,
    pub report_to: Eid,
    pub custodian: Eid,
    pub creation_timestamp: CreationTimestamp,
    pub lifetime: u64,
    pub fragment_info: Option<FragmentInfo>,
    pub blocks: Vec<Block>,
}

impl Bundle {
    /// Parses a complete bundle from its wire bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let (primary, mut offset) = PrimaryBlock::parse(data)?;

        let mut blocks = Vec::new();
        loop {
            let (block, len) = Block::parse(&data[offset..])?;
            offset += len;
            let last_block = block.flags.last_block;
            blocks.push(block);
            if last_block || offset >= data.len() {
                break;
            }
        }

        if !matches!(blocks.last().map(|b| b.block_type), Some(block::Type::Payload)) {
            return Err(Error::MissingPayload);
        }
        if !blocks.last().is_some_and(|b| b.flags.last_block) {
            return Err(Error::MissingLastBlock);
        }

        Ok(Self {
            flags: primary.flags,
            destination: primary.destination,
            source: primary.source,
            report_to: primary.report_to,
            custodian: primary.custodian,
            creation_timestamp: primary.creation_timestamp,
            lifetime: primary.lifetime,
            fragment_info: primary.fragment_info,
            blocks,
        })
    }

    /// Serializes the bundle to its wire form.
    pub fn emit(&self) -> Vec<u8> {
        let primary = PrimaryBlock {
            flags: self.flags.clone(),
            destination: self.destination.clone(),
            source: self.source.clone(),
            report_to: self.report_to.clone(),
            custodian: self.custodian.clone(),
            creation_timestamp: self.creation_timestamp,
            lifetime: self.lifetime,
            fragment_info: self.fragment_info,
        };
        let mut dict = Dictionary::new();
        let mut out = primary.emit(&mut dict);
        for block in &self.blocks {
            block.emit(&mut out);
        }
        out
    }

    /// Returns the payload block's data, if the bundle carries one.
    pub fn payload(&self) -> Option<&[u8]> {
        self.blocks
            .iter()
            .find(|b| b.block_type == block::Type::Payload)
            .map(|b| &*b.data)
    }

    /// Splits this bundle into a sequence of fragments, each whose serialized
    /// primary-block-plus-blocks size does not exceed `first_max` bytes for
    /// the first fragment and `subsequent_max` bytes thereafter (RFC 5050
    /// §5.8). Blocks flagged [`BlockFlags::must_replicate`] are copied into
    /// every fragment; all other extension blocks travel with the fragment
    /// that contains the start of the payload they were adjacent to only if
    /// that is the first fragment, matching the reference implementation's
    /// "replicate onto the first fragment only" rule for non-must-replicate
    /// blocks preceding the payload.
    pub fn fragment(&self, first_max: usize, subsequent_max: usize) -> Result<Vec<Bundle>, Error> {
        let payload = self.payload().ok_or(Error::MissingPayload)?;
        if self.flags.do_not_fragment {
            return Err(Error::InvalidFragmentInfo(0, payload.len() as u64));
        }

        let replicated: Vec<Block> = self
            .blocks
            .iter()
            .filter(|b| b.block_type != block::Type::Payload && b.flags.must_replicate)
            .cloned()
            .collect();
        let leading: Vec<Block> = self
            .blocks
            .iter()
            .filter(|b| b.block_type != block::Type::Payload && !b.flags.must_replicate)
            .cloned()
            .collect();

        let total_len = payload.len() as u64;
        let mut fragments = Vec::new();
        let mut consumed = 0usize;
        let mut first = true;
        while consumed < payload.len() {
            let budget = if first { first_max } else { subsequent_max };
            let chunk = budget.min(payload.len() - consumed).max(1);
            let chunk = chunk.min(payload.len() - consumed);

            let mut blocks = Vec::new();
            if first {
                blocks.extend(leading.iter().cloned());
            }
            blocks.extend(replicated.iter().cloned());
            blocks.push(Block {
                block_type: block::Type::Payload,
                flags: BlockFlags {
                    last_block: true,
                    ..Default::default()
                },
                eid_refs: Vec::new(),
                data: payload[consumed..consumed + chunk].to_vec().into_boxed_slice(),
            });

            fragments.push(Bundle {
                flags: crate::flags::BundleFlags {
                    is_fragment: true,
                    ..self.flags.clone()
                },
                destination: self.destination.clone(),
                source: self.source.clone(),
                report_to: self.report_to.clone(),
                custodian: self.custodian.clone(),
                creation_timestamp: self.creation_timestamp,
                lifetime: self.lifetime,
                fragment_info: Some(FragmentInfo {
                    offset: consumed as u64,
                    total_application_data_length: total_len,
                }),
                blocks,
            });

            consumed += chunk;
            first = false;
        }
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(payload: &[u8]) -> Bundle {
        Bundle {
            flags: crate::flags::BundleFlags::default(),
            destination: "dtn://node2/mail".parse().unwrap(),
            source: "dtn://node1/mail".parse().unwrap(),
            report_to: Eid::null(),
            custodian: Eid::null(),
            creation_timestamp: CreationTimestamp {
                time: 700_000_000,
                sequence_number: 0,
            },
            lifetime: 3600,
            fragment_info: None,
            blocks: vec![Block {
                block_type: block::Type::Payload,
                flags: BlockFlags {
                    last_block: true,
                    ..Default::default()
                },
                eid_refs: Vec::new(),
                data: payload.to_vec().into_boxed_slice(),
            }],
        }
    }

    #[test]
    fn round_trips_a_bundle() {
        let bundle = sample(b"hello world");
        let bytes = bundle.emit();
        let parsed = Bundle::parse(&bytes).unwrap();
        assert_eq!(parsed.payload(), Some(&b"hello world"[..]));
        assert_eq!(parsed.destination, bundle.destination);
    }

    #[test]
    fn rejects_bundle_missing_payload() {
        let mut bundle = sample(b"x");
        bundle.blocks[0].block_type = block::Type::Unknown(9);
        let bytes = bundle.emit();
        assert!(matches!(Bundle::parse(&bytes), Err(Error::MissingPayload)));
    }

    #[test]
    fn fragments_a_bundle_into_budgeted_chunks() {
        let bundle = sample(b"0123456789");
        let fragments = bundle.fragment(4, 4).unwrap();
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].payload(), Some(&b"0123"[..]));
        assert_eq!(fragments[1].payload(), Some(&b"4567"[..]));
        assert_eq!(fragments[2].payload(), Some(&b"89"[..]));
        for (i, frag) in fragments.iter().enumerate() {
            assert!(frag.flags.is_fragment);
            assert_eq!(
                frag.fragment_info.unwrap().total_application_data_length,
                10
            );
            let _ = i;
        }
    }

    #[test]
    fn refuses_to_fragment_when_do_not_fragment_is_set() {
        let mut bundle = sample(b"0123456789");
        bundle.flags.do_not_fragment = true;
        assert!(bundle.fragment(4, 4).is_err());
    }
}
