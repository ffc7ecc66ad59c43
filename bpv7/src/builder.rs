/*!
This module provides a fluent builder API for constructing new BPv7 bundles
from scratch, without needing to manually assemble CBOR arrays.
*/

use super::*;

const DEFAULT_CRC_TYPE: crc::CrcType = crc::CrcType::CRC32_CASTAGNOLI;
const DEFAULT_LIFETIME: core::time::Duration = core::time::Duration::from_secs(24 * 60 * 60);

/// A builder for constructing a new bundle.
///
/// Use [`Builder::new`] to start, chain the setter methods to configure the
/// primary block, then call [`Builder::build`] to serialize the bundle.
pub struct Builder {
    flags: bundle::Flags,
    crc_type: crc::CrcType,
    source: eid::Eid,
    destination: eid::Eid,
    report_to: Option<eid::Eid>,
    lifetime: core::time::Duration,
    payload: BlockTemplate,
    extensions: Vec<BlockTemplate>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            flags: bundle::Flags::default(),
            crc_type: DEFAULT_CRC_TYPE,
            source: eid::Eid::default(),
            destination: eid::Eid::default(),
            report_to: None,
            lifetime: DEFAULT_LIFETIME,
            payload: BlockTemplate::new(block::Type::Payload, block::Flags::default(), DEFAULT_CRC_TYPE),
            extensions: Vec::new(),
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn flags(mut self, flags: bundle::Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn crc_type(mut self, crc_type: crc::CrcType) -> Self {
        self.crc_type = crc_type;
        self
    }

    pub fn source(mut self, source: eid::Eid) -> Self {
        self.source = source;
        self
    }

    pub fn destination(mut self, destination: eid::Eid) -> Self {
        self.destination = destination;
        self
    }

    pub fn report_to(mut self, report_to: eid::Eid) -> Self {
        self.report_to = Some(report_to);
        self
    }

    pub fn lifetime(mut self, lifetime: core::time::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn add_extension_block(self, block_type: block::Type) -> BlockBuilder {
        BlockBuilder::new(self, block_type)
    }

    pub fn add_payload_block(self, data: Vec<u8>) -> Self {
        self.add_extension_block(block::Type::Payload).data(data).build()
    }

    /// Consumes the builder, returning the constructed [`Bundle`](bundle::Bundle)
    /// together with its canonical CBOR encoding.
    pub fn build(mut self) -> (bundle::Bundle, Box<[u8]>) {
        let mut bundle = bundle::Bundle {
            report_to: self.report_to.take().unwrap_or_else(|| self.source.clone()),
            id: bundle::Id {
                source: std::mem::take(&mut self.source),
                timestamp: creation_timestamp::CreationTimestamp::now(),
                fragment_info: None,
            },
            flags: self.flags,
            crc_type: self.crc_type,
            destination: std::mem::take(&mut self.destination),
            lifetime: self.lifetime,
            ..Default::default()
        };

        let data = hardy_cbor::encode::emit_array(None, |a| {
            bundle
                .emit_primary_block(a)
                .expect("a freshly-built primary block cannot fail to emit");

            for (i, block) in self.extensions.into_iter().enumerate() {
                let block_number = i as u64 + 2;
                bundle.blocks.insert(block_number, block.build(block_number, a));
            }

            bundle.blocks.insert(1, self.payload.build(1, a));
        });

        (bundle, data.into())
    }
}

/// A builder for a single extension block, obtained from [`Builder::add_extension_block`].
pub struct BlockBuilder {
    builder: Builder,
    template: BlockTemplate,
}

impl BlockBuilder {
    fn new(builder: Builder, block_type: block::Type) -> Self {
        Self {
            template: BlockTemplate::new(block_type, block::Flags::default(), builder.crc_type),
            builder,
        }
    }

    pub fn must_replicate(mut self, must_replicate: bool) -> Self {
        self.template.flags.must_replicate = must_replicate;
        self
    }

    pub fn report_on_failure(mut self, report_on_failure: bool) -> Self {
        self.template.flags.report_on_failure = report_on_failure;
        self
    }

    pub fn delete_bundle_on_failure(mut self, delete_bundle_on_failure: bool) -> Self {
        self.template.flags.delete_bundle_on_failure = delete_bundle_on_failure;
        self
    }

    pub fn delete_block_on_failure(mut self, delete_block_on_failure: bool) -> Self {
        self.template.flags.delete_block_on_failure = delete_block_on_failure;
        self
    }

    pub fn crc_type(mut self, crc_type: crc::CrcType) -> Self {
        self.template.crc_type = crc_type;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.template.data = data;
        self
    }

    pub fn build(mut self) -> Builder {
        if let block::Type::Payload = self.template.block_type {
            self.builder.payload = self.template;
        } else {
            self.builder.extensions.push(self.template);
        }
        self.builder
    }
}

/// A not-yet-serialized block, holding its metadata and payload until the
/// enclosing bundle is built.
#[derive(Clone)]
pub(crate) struct BlockTemplate {
    pub(crate) block_type: block::Type,
    flags: block::Flags,
    crc_type: crc::CrcType,
    data: Vec<u8>,
}

impl BlockTemplate {
    pub(crate) fn new(block_type: block::Type, flags: block::Flags, crc_type: crc::CrcType) -> Self {
        Self {
            block_type,
            flags,
            crc_type,
            data: Vec::new(),
        }
    }

    pub(crate) fn block_type(&self) -> block::Type {
        self.block_type
    }

    pub(crate) fn must_replicate(&mut self, must_replicate: bool) {
        self.flags.must_replicate = must_replicate;
    }

    pub(crate) fn report_on_failure(&mut self, report_on_failure: bool) {
        self.flags.report_on_failure = report_on_failure;
    }

    pub(crate) fn delete_bundle_on_failure(&mut self, delete_bundle_on_failure: bool) {
        self.flags.delete_bundle_on_failure = delete_bundle_on_failure;
    }

    pub(crate) fn delete_block_on_failure(&mut self, delete_block_on_failure: bool) {
        self.flags.delete_block_on_failure = delete_block_on_failure;
    }

    pub(crate) fn crc_type(&mut self, crc_type: crc::CrcType) {
        self.crc_type = crc_type;
    }

    pub(crate) fn data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub(crate) fn build(self, block_number: u64, array: &mut hardy_cbor::encode::Array) -> block::Block {
        let mut block = block::Block {
            block_type: self.block_type,
            flags: self.flags,
            crc_type: self.crc_type,
            extent: 0..0,
            data: 0..0,
        };
        block
            .emit(block_number, &self.data, array)
            .expect("a freshly-built block cannot fail to emit");
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_minimal_bundle() {
        let (bundle, data) = Builder::new()
            .source("ipn:1.0".parse().unwrap())
            .destination("ipn:2.0".parse().unwrap())
            .report_to("ipn:3.0".parse().unwrap())
            .add_payload_block(b"hello, world".to_vec())
            .build();

        assert_eq!(bundle.destination.to_string(), "ipn:2.0");
        assert_eq!(bundle.payload(&data).unwrap(), b"hello, world");
    }

    #[test]
    fn builds_with_an_extension_block() {
        let (bundle, data) = Builder::new()
            .source("ipn:1.0".parse().unwrap())
            .destination("ipn:2.0".parse().unwrap())
            .add_extension_block(block::Type::PreviousNode)
            .data(hardy_cbor::encode::emit(&"ipn:4.0".parse::<eid::Eid>().unwrap()).0)
            .build()
            .add_payload_block(b"payload".to_vec())
            .build();

        assert!(bundle.blocks.contains_key(&2));
        assert_eq!(bundle.payload(&data).unwrap(), b"payload");
    }
}
