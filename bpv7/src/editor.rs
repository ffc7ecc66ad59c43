/*!
This module provides a fluent API for editing an existing bundle: adding,
replacing, or removing extension blocks while keeping the blocks that are
unchanged as verbatim byte copies of the original.
*/

use super::*;
use std::collections::HashMap;

/// An in-progress edit of an existing bundle.
///
/// Every block starts out as [`BlockTemplate::Keep`]; calling
/// [`Editor::add_extension_block`] or [`Editor::replace_extension_block`]
/// swaps it for a freshly-built template, and [`Editor::build`] re-serializes
/// the whole bundle, copying unchanged blocks verbatim.
pub struct Editor<'a> {
    original: &'a bundle::Bundle,
    source_data: &'a [u8],
    blocks: HashMap<u64, BlockTemplate>,
}

enum BlockTemplate {
    Keep(block::Type),
    Add(builder::BlockTemplate),
}

/// A builder for a single extension block within an [`Editor`].
pub struct BlockBuilder<'a, 'b> {
    editor: &'b mut Editor<'a>,
    block_number: u64,
    template: builder::BlockTemplate,
}

impl<'a> Editor<'a> {
    pub fn new(original: &'a bundle::Bundle, source_data: &'a [u8]) -> Self {
        Self {
            blocks: original
                .blocks
                .iter()
                .map(|(block_number, block)| (*block_number, BlockTemplate::Keep(block.block_type)))
                .collect(),
            source_data,
            original,
        }
    }

    pub fn add_extension_block(&mut self, block_type: block::Type) -> BlockBuilder<'a, '_> {
        if let block::Type::Primary | block::Type::Payload = block_type {
            panic!("Don't add primary or payload blocks!");
        }

        let mut block_number = 2u64;
        loop {
            if !self.blocks.contains_key(&block_number) {
                return BlockBuilder::new(self, block_number, block_type);
            }
            block_number += 1;
        }
    }

    pub fn replace_extension_block(&mut self, block_type: block::Type) -> BlockBuilder<'a, '_> {
        if let block::Type::Primary = block_type {
            panic!("Don't replace the primary block!");
        }

        if let Some((block_number, template)) = self
            .blocks
            .iter()
            .find(|(_, block)| match block {
                BlockTemplate::Keep(t) => *t == block_type,
                BlockTemplate::Add(t) => t.block_type() == block_type,
            })
            .and_then(|(block_number, template)| match template {
                BlockTemplate::Keep(_) => self.original.blocks.get(block_number).map(|block| {
                    (
                        *block_number,
                        builder::BlockTemplate::new(block_type, block.flags.clone(), block.crc_type),
                    )
                }),
                BlockTemplate::Add(template) => Some((*block_number, template.clone())),
            })
        {
            BlockBuilder::new_from_template(self, block_number, template)
        } else {
            self.add_extension_block(block_type)
        }
    }

    pub fn remove_extension_block(&mut self, block_number: u64) {
        if block_number == 0 || block_number == 1 {
            panic!("Don't remove the primary or payload blocks!");
        }
        self.blocks.remove(&block_number);
    }

    /// Consumes the editor, returning the edited [`Bundle`](bundle::Bundle) and
    /// its re-serialized CBOR encoding.
    pub fn build(mut self) -> (bundle::Bundle, Box<[u8]>) {
        let mut bundle = bundle::Bundle {
            id: self.original.id.clone(),
            flags: self.original.flags.clone(),
            crc_type: self.original.crc_type,
            destination: self.original.destination.clone(),
            report_to: self.original.report_to.clone(),
            lifetime: self.original.lifetime,
            previous_node: self.original.previous_node.clone(),
            age: self.original.age,
            hop_count: self.original.hop_count.clone(),
            blocks: HashMap::new(),
        };

        let data = hardy_cbor::encode::emit_array(None, |a| {
            let primary_block = self.blocks.remove(&0).expect("bundle has no primary block");
            let block = self.build_block(0, primary_block, a);
            bundle.blocks.insert(0, block);

            let payload_block = self.blocks.remove(&1).expect("bundle has no payload block");

            for (block_number, block_template) in core::mem::take(&mut self.blocks) {
                let block = self.build_block(block_number, block_template, a);
                bundle.blocks.insert(block_number, block);
            }

            let block = self.build_block(1, payload_block, a);
            bundle.blocks.insert(1, block);
        });

        (bundle, data.into())
    }

    fn build_block(
        &self,
        block_number: u64,
        template: BlockTemplate,
        array: &mut hardy_cbor::encode::Array,
    ) -> block::Block {
        match template {
            BlockTemplate::Keep(_) => {
                let mut block = self
                    .original
                    .blocks
                    .get(&block_number)
                    .expect("block template does not match original bundle")
                    .clone();
                block.copy_whole(self.source_data, array);
                block
            }
            BlockTemplate::Add(template) => template.build(block_number, array),
        }
    }
}

impl<'a, 'b> BlockBuilder<'a, 'b> {
    fn new(editor: &'b mut Editor<'a>, block_number: u64, block_type: block::Type) -> Self {
        Self {
            template: builder::BlockTemplate::new(
                block_type,
                block::Flags::default(),
                editor.original.crc_type,
            ),
            block_number,
            editor,
        }
    }

    fn new_from_template(
        editor: &'b mut Editor<'a>,
        block_number: u64,
        template: builder::BlockTemplate,
    ) -> Self {
        Self {
            template,
            block_number,
            editor,
        }
    }

    pub fn must_replicate(mut self, must_replicate: bool) -> Self {
        self.template.must_replicate(must_replicate);
        self
    }

    pub fn report_on_failure(mut self, report_on_failure: bool) -> Self {
        self.template.report_on_failure(report_on_failure);
        self
    }

    pub fn delete_bundle_on_failure(mut self, delete_bundle_on_failure: bool) -> Self {
        self.template.delete_bundle_on_failure(delete_bundle_on_failure);
        self
    }

    pub fn delete_block_on_failure(mut self, delete_block_on_failure: bool) -> Self {
        self.template.delete_block_on_failure(delete_block_on_failure);
        self
    }

    pub fn crc_type(mut self, crc_type: crc::CrcType) -> Self {
        self.template.crc_type(crc_type);
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.template.data(data);
        self
    }

    pub fn build(self) -> &'b mut Editor<'a> {
        self.editor
            .blocks
            .insert(self.block_number, BlockTemplate::Add(self.template));
        self.editor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> (bundle::Bundle, Box<[u8]>) {
        builder::Builder::new()
            .source("ipn:1.0".parse().unwrap())
            .destination("ipn:2.0".parse().unwrap())
            .add_payload_block(b"original".to_vec())
            .build()
    }

    #[test]
    fn adds_an_extension_block_and_keeps_the_payload() {
        let (bundle, data) = sample_bundle();
        let mut editor = Editor::new(&bundle, &data);
        editor
            .add_extension_block(block::Type::PreviousNode)
            .data(hardy_cbor::encode::emit(&"ipn:4.0".parse::<eid::Eid>().unwrap()).0)
            .build();
        let (edited, edited_data) = editor.build();

        assert!(edited.blocks.contains_key(&2));
        assert_eq!(edited.payload(&edited_data).unwrap(), b"original");
    }

    #[test]
    fn removing_an_extension_block_drops_it() {
        let (bundle, data) = sample_bundle();
        let mut editor = Editor::new(&bundle, &data);
        editor
            .add_extension_block(block::Type::PreviousNode)
            .data(hardy_cbor::encode::emit(&"ipn:4.0".parse::<eid::Eid>().unwrap()).0)
            .build();
        editor.remove_extension_block(2);
        let (edited, _) = editor.build();

        assert!(!edited.blocks.contains_key(&2));
    }
}
