/*!
BPv6 extension blocks (RFC 5050 §4.3).

Unlike BPv7's CBOR-framed canonical blocks, a BPv6 block is a flat run of
SDNVs followed by a raw byte payload:

```text
block_type(1) · proc_flags(sdnv) · [eid_ref_count(sdnv), (scheme_offset(sdnv),
ssp_offset(sdnv))*]? · block_length(sdnv) · block_data(block_length bytes)
```

The EID-reference list is present only when [`BlockFlags::has_eid_reference_field`]
is set; it names dictionary offsets (see [`crate::eid`]) rather than inline
strings.
*/

use crate::{eid::EidReference, error::Error, flags::BlockFlags, sdnv};

/// The RFC 5050 block type codes this crate recognises. Unrecognised types
/// are preserved as [`Type::Unknown`] so they round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Payload,
    Unknown(u8),
}

impl From<u8> for Type {
    fn from(value: u8) -> Self {
        match value {
            1 => Type::Payload,
            n => Type::Unknown(n),
        }
    }
}

impl From<Type> for u8 {
    fn from(value: Type) -> Self {
        match value {
            Type::Payload => 1,
            Type::Unknown(n) => n,
        }
    }
}

/// A single parsed extension block, including the payload block itself
/// (block type 1).
#[derive(Debug, Clone)]
pub struct Block {
    pub block_type: Type,
    pub flags: BlockFlags,
    pub eid_refs: Vec<EidReference>,
    pub data: Box<[u8]>,
}

impl Block {
    /// Parses one block starting at the beginning of `data`, returning the
    /// block and the number of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), Error> {
        let mut offset = 0usize;

        let block_type = *data.first().ok_or(Error::NeedMoreData)?;
        offset += 1;

        let (raw_flags, len) = sdnv::decode(&data[offset..])?;
        offset += len;
        let flags = BlockFlags::from(raw_flags);

        let mut eid_refs = Vec::new();
        if flags.has_eid_reference_field {
            let (count, len) = sdnv::decode(&data[offset..])?;
            offset += len;
            eid_refs.reserve(count as usize);
            for _ in 0..count {
                let (scheme_offset, len) = sdnv::decode_u32(&data[offset..])?;
                offset += len;
                let (ssp_offset, len) = sdnv::decode_u32(&data[offset..])?;
                offset += len;
                eid_refs.push(EidReference {
                    scheme_offset,
                    ssp_offset,
                });
            }
        }

        let (block_length, len) = sdnv::decode(&data[offset..])?;
        offset += len;

        let block_data = data
            .get(offset..offset + block_length as usize)
            .ok_or(Error::InvalidBlockLength {
                declared: block_length,
                available: data.len().saturating_sub(offset),
            })?;
        offset += block_data.len();

        Ok((
            Self {
                block_type: Type::from(block_type),
                flags,
                eid_refs,
                data: block_data.into(),
            },
            offset,
        ))
    }

    /// Serializes this block, appending its bytes to `out`.
    pub fn emit(&self, out: &mut Vec<u8>) {
        out.push(self.block_type.into());
        out.extend(sdnv::encode(u64::from(&self.flags)));
        if self.flags.has_eid_reference_field {
            out.extend(sdnv::encode(self.eid_refs.len() as u64));
            for reference in &self.eid_refs {
                out.extend(sdnv::encode(reference.scheme_offset as u64));
                out.extend(sdnv::encode(reference.ssp_offset as u64));
            }
        }
        out.extend(sdnv::encode(self.data.len() as u64));
        out.extend_from_slice(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_payload_block() {
        let block = Block {
            block_type: Type::Payload,
            flags: BlockFlags {
                last_block: true,
                ..Default::default()
            },
            eid_refs: Vec::new(),
            data: b"hello world".to_vec().into_boxed_slice(),
        };

        let mut bytes = Vec::new();
        block.emit(&mut bytes);

        let (parsed, len) = Block::parse(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(parsed.block_type, Type::Payload);
        assert!(parsed.flags.last_block);
        assert_eq!(&*parsed.data, b"hello world");
    }

    #[test]
    fn round_trips_eid_references() {
        let block = Block {
            block_type: Type::Unknown(192),
            flags: BlockFlags {
                has_eid_reference_field: true,
                ..Default::default()
            },
            eid_refs: vec![EidReference {
                scheme_offset: 0,
                ssp_offset: 4,
            }],
            data: b"extra".to_vec().into_boxed_slice(),
        };

        let mut bytes = Vec::new();
        block.emit(&mut bytes);

        let (parsed, _) = Block::parse(&bytes).unwrap();
        assert_eq!(parsed.eid_refs, block.eid_refs);
    }

    #[test]
    fn rejects_truncated_block_length() {
        let bytes = [1u8, 0x00, 0x05, b'h', b'i'];
        assert!(matches!(
            Block::parse(&bytes),
            Err(Error::InvalidBlockLength { .. })
        ));
    }
}
