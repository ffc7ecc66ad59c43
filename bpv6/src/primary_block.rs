/*!
The BPv6 primary bundle block (RFC 5050 §4.5).

```text
version(1) · proc_flags(sdnv) · block_length(sdnv) ·
dest_scheme_offset(sdnv) · dest_ssp_offset(sdnv) ·
source_scheme_offset(sdnv) · source_ssp_offset(sdnv) ·
report_to_scheme_offset(sdnv) · report_to_ssp_offset(sdnv) ·
custodian_scheme_offset(sdnv) · custodian_ssp_offset(sdnv) ·
creation_timestamp_time(sdnv) · creation_timestamp_seq(sdnv) ·
lifetime(sdnv) · dict_length(sdnv) · dict_bytes(dict_length) ·
[fragment_offset(sdnv), total_adu_length(sdnv)]?
```

The fragment offset/length pair is present only when the `is_fragment` flag
is set (RFC 5050 §4.5, §5.8).
*/

use crate::{
    eid::{Dictionary, Eid, EidReference},
    error::Error,
    flags::BundleFlags,
    sdnv,
};

pub const PROTOCOL_VERSION: u8 = 6;

/// Fragmentation offset/total-length pair, present only on fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentInfo {
    pub offset: u64,
    pub total_application_data_length: u64,
}

/// The BPv6 creation timestamp: seconds since the DTN epoch plus a
/// per-second monotonic sequence number (RFC 5050 §4.1.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreationTimestamp {
    pub time: u64,
    pub sequence_number: u64,
}

/// A fully resolved BPv6 primary block: EID references have already been
/// looked up in the dictionary.
#[derive(Debug, Clone)]
pub struct PrimaryBlock {
    pub flags: BundleFlags,
    pub destination: Eid,
    pub source: Eid,
    pub report_to: Eid,
    pub custodian: Eid,
    pub creation_timestamp: CreationTimestamp,
    pub lifetime: u64,
    pub fragment_info: Option<FragmentInfo>,
}

struct RawRefs {
    destination: EidReference,
    source: EidReference,
    report_to: EidReference,
    custodian: EidReference,
}

impl PrimaryBlock {
    /// Parses the primary block at the start of `data`, returning the block
    /// and the number of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), Error> {
        let mut offset = 0usize;

        let version = *data.first().ok_or(Error::NeedMoreData)?;
        if version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion(version));
        }
        offset += 1;

        let (raw_flags, len) = sdnv::decode(&data[offset..])?;
        offset += len;
        let flags = BundleFlags::from(raw_flags);

        let (block_length, len) = sdnv::decode(&data[offset..])?;
        offset += len;
        let body = data
            .get(offset..offset + block_length as usize)
            .ok_or(Error::InvalidBlockLength {
                declared: block_length,
                available: data.len().saturating_sub(offset),
            })?;
        let block_end = offset + body.len();

        let (refs, rest) = Self::parse_refs(body)?;
        let mut pos = body.len() - rest.len();

        let (time, len) = sdnv::decode(&body[pos..])?;
        pos += len;
        let (sequence_number, len) = sdnv::decode(&body[pos..])?;
        pos += len;
        let (lifetime, len) = sdnv::decode(&body[pos..])?;
        pos += len;
        let (dict_length, len) = sdnv::decode(&body[pos..])?;
        pos += len;
        let dict = body
            .get(pos..pos + dict_length as usize)
            .ok_or(Error::InvalidBlockLength {
                declared: dict_length,
                available: body.len().saturating_sub(pos),
            })?;
        pos += dict.len();

        let fragment_info = if flags.is_fragment {
            let (frag_offset, len) = sdnv::decode(&body[pos..])?;
            pos += len;
            let (total_adu_length, len) = sdnv::decode(&body[pos..])?;
            pos += len;
            Some(FragmentInfo {
                offset: frag_offset,
                total_application_data_length: total_adu_length,
            })
        } else {
            None
        };

        Ok((
            Self {
                flags,
                destination: crate::eid::resolve(dict, refs.destination)?,
                source: crate::eid::resolve(dict, refs.source)?,
                report_to: crate::eid::resolve(dict, refs.report_to)?,
                custodian: crate::eid::resolve(dict, refs.custodian)?,
                creation_timestamp: CreationTimestamp {
                    time,
                    sequence_number,
                },
                lifetime,
                fragment_info,
            },
            block_end,
        ))
    }

    fn parse_refs(body: &[u8]) -> Result<(RawRefs, &[u8]), Error> {
        let mut pos = 0usize;
        let mut next_ref = |pos: &mut usize| -> Result<EidReference, Error> {
            let (scheme_offset, len) = sdnv::decode_u32(&body[*pos..])?;
            *pos += len;
            let (ssp_offset, len) = sdnv::decode_u32(&body[*pos..])?;
            *pos += len;
            Ok(EidReference {
                scheme_offset,
                ssp_offset,
            })
        };
        let destination = next_ref(&mut pos)?;
        let source = next_ref(&mut pos)?;
        let report_to = next_ref(&mut pos)?;
        let custodian = next_ref(&mut pos)?;
        Ok((
            RawRefs {
                destination,
                source,
                report_to,
                custodian,
            },
            &body[pos..],
        ))
    }

    /// Serializes this primary block, interning its EIDs into `dict`.
    pub fn emit(&self, dict: &mut Dictionary) -> Vec<u8> {
        let destination = dict.intern_eid(&self.destination);
        let source = dict.intern_eid(&self.source);
        let report_to = dict.intern_eid(&self.report_to);
        let custodian = dict.intern_eid(&self.custodian);

        let mut body = Vec::new();
        for reference in [destination, source, report_to, custodian] {
            body.extend(sdnv::encode(reference.scheme_offset as u64));
            body.extend(sdnv::encode(reference.ssp_offset as u64));
        }
        body.extend(sdnv::encode(self.creation_timestamp.time));
        body.extend(sdnv::encode(self.creation_timestamp.sequence_number));
        body.extend(sdnv::encode(self.lifetime));

        let dict_bytes = dict.bytes();
        body.extend(sdnv::encode(dict_bytes.len() as u64));
        body.extend_from_slice(dict_bytes);

        if let Some(fragment_info) = self.fragment_info {
            body.extend(sdnv::encode(fragment_info.offset));
            body.extend(sdnv::encode(fragment_info.total_application_data_length));
        }

        let mut out = Vec::with_capacity(body.len() + 8);
        out.push(PROTOCOL_VERSION);
        out.extend(sdnv::encode(u64::from(&self.flags)));
        out.extend(sdnv::encode(body.len() as u64));
        out.extend(body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PrimaryBlock {
        PrimaryBlock {
            flags: BundleFlags::default(),
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
        }
    }

    #[test]
    fn round_trips_a_primary_block() {
        let primary = sample();
        let mut dict = Dictionary::new();
        let bytes = primary.emit(&mut dict);

        let (parsed, len) = PrimaryBlock::parse(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(parsed.destination, primary.destination);
        assert_eq!(parsed.source, primary.source);
        assert_eq!(parsed.lifetime, primary.lifetime);
        assert_eq!(parsed.creation_timestamp, primary.creation_timestamp);
        assert!(parsed.fragment_info.is_none());
    }

    #[test]
    fn round_trips_a_fragment() {
        let mut primary = sample();
        primary.flags.is_fragment = true;
        primary.fragment_info = Some(FragmentInfo {
            offset: 100,
            total_application_data_length: 5000,
        });

        let mut dict = Dictionary::new();
        let bytes = primary.emit(&mut dict);

        let (parsed, _) = PrimaryBlock::parse(&bytes).unwrap();
        assert_eq!(parsed.fragment_info, primary.fragment_info);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut dict = Dictionary::new();
        let mut bytes = sample().emit(&mut dict);
        bytes[0] = 5;
        assert!(matches!(
            PrimaryBlock::parse(&bytes),
            Err(Error::InvalidVersion(5))
        ));
    }
}
