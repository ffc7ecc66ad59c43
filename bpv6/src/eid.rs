/*!
BPv6 Endpoint IDs and the dictionary byte-buffer used to encode them.

Unlike BPv7, which encodes each EID inline as a CBOR array, BPv6 primary
blocks interned the four distinct EIDs (destination, source, report-to,
custodian) once into a shared NUL-terminated string table and referenced them
by scheme/SSP byte offsets (RFC 5050 §4.2, §4.5.2).
*/

use crate::error::Error;
use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

/// A BPv6 Endpoint ID, the `scheme:ssp` pair named by RFC 5050 §4.1.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Eid {
    pub scheme: Box<str>,
    pub ssp: Box<str>,
}

impl Eid {
    pub fn new(scheme: impl Into<Box<str>>, ssp: impl Into<Box<str>>) -> Self {
        Self {
            scheme: scheme.into(),
            ssp: ssp.into(),
        }
    }

    /// The null endpoint, `dtn:none`.
    pub fn null() -> Self {
        Self::new("dtn", "none")
    }

    pub fn is_null(&self) -> bool {
        &*self.scheme == "dtn" && &*self.ssp == "none"
    }
}

impl Default for Eid {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.ssp)
    }
}

impl FromStr for Eid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, ssp) = s.split_once(':').ok_or(Error::InvalidEid)?;
        if scheme.is_empty() || ssp.is_empty() {
            return Err(Error::InvalidEid);
        }
        Ok(Self::new(scheme, ssp))
    }
}

/// The `scheme_offset`/`ssp_offset` pair stored inline in the primary block
/// for one EID, pointing into the dictionary byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EidReference {
    pub scheme_offset: u32,
    pub ssp_offset: u32,
}

/// Reads the NUL-terminated string starting at `offset` within a dictionary
/// byte buffer.
pub fn read_str(dict: &[u8], offset: u32) -> Result<&str, Error> {
    let start = offset as usize;
    let rest = dict
        .get(start..)
        .ok_or(Error::InvalidDictionaryOffset(offset))?;
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::InvalidDictionaryOffset(offset))?;
    core::str::from_utf8(&rest[..end]).map_err(|_| Error::InvalidDictionaryOffset(offset))
}

/// Resolves an [`EidReference`] against a dictionary buffer into an owned [`Eid`].
pub fn resolve(dict: &[u8], reference: EidReference) -> Result<Eid, Error> {
    Ok(Eid::new(
        read_str(dict, reference.scheme_offset)?,
        read_str(dict, reference.ssp_offset)?,
    ))
}

/// Builds the dictionary byte buffer used when serializing a primary block,
/// interning each distinct scheme/SSP string exactly once.
#[derive(Debug, Default)]
pub struct Dictionary {
    bytes: Vec<u8>,
    offsets: HashMap<Box<str>, u32>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.into(), offset);
        offset
    }

    /// Interns an EID's scheme and SSP, returning the reference pair to embed
    /// in the primary block.
    pub fn intern_eid(&mut self, eid: &Eid) -> EidReference {
        EidReference {
            scheme_offset: self.intern(&eid.scheme),
            ssp_offset: self.intern(&eid.ssp),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        let eid: Eid = "dtn://node1/mail".parse().unwrap();
        assert_eq!(eid.scheme.as_ref(), "dtn");
        assert_eq!(eid.ssp.as_ref(), "//node1/mail");
        assert_eq!(eid.to_string(), "dtn://node1/mail");
    }

    #[test]
    fn rejects_eid_without_colon() {
        assert!(Eid::from_str("nocolonhere").is_err());
    }

    #[test]
    fn dictionary_interns_repeated_strings_once() {
        let mut dict = Dictionary::new();
        let a = dict.intern_eid(&Eid::new("dtn", "//node1/mail"));
        let b = dict.intern_eid(&Eid::new("dtn", "//node1/other"));
        let c = dict.intern_eid(&Eid::new("dtn", "//node1/mail"));

        assert_eq!(a.scheme_offset, c.scheme_offset);
        assert_eq!(a.ssp_offset, c.ssp_offset);
        assert_ne!(a.ssp_offset, b.ssp_offset);

        let bytes = dict.into_bytes();
        assert_eq!(resolve(&bytes, a).unwrap(), Eid::new("dtn", "//node1/mail"));
        assert_eq!(
            resolve(&bytes, b).unwrap(),
            Eid::new("dtn", "//node1/other")
        );
    }
}
