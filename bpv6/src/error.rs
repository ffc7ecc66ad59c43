/*!
The primary error type for the `bpv6` crate, covering parsing and semantic
validation failures for BPv6 bundles (RFC 5050).
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported bundle protocol version {0}")]
    InvalidVersion(u8),

    #[error(transparent)]
    InvalidSdnv(#[from] crate::sdnv::Error),

    #[error("Primary block is truncated")]
    NeedMoreData,

    #[error("Dictionary offset {0} is out of range or not NUL-terminated")]
    InvalidDictionaryOffset(u32),

    #[error("Endpoint ID is not of the form 'scheme:ssp'")]
    InvalidEid,

    #[error("Block declares length {declared} but only {available} bytes remain")]
    InvalidBlockLength { declared: u64, available: usize },

    #[error("Bundle has no payload block")]
    MissingPayload,

    #[error("Bundle is missing its last-block marker")]
    MissingLastBlock,

    #[error("Bundle exceeds the configured size quota of {0} bytes")]
    QuotaExceeded(usize),

    #[error("Invalid fragment information: offset {0}, total length {1}")]
    InvalidFragmentInfo(u64, u64),

    #[error("Administrative record has an unknown type code {0}")]
    UnknownAdminRecordType(u8),

    #[error("Administrative record is truncated")]
    TruncatedAdminRecord,
}
