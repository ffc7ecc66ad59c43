/*!
Error type for Endpoint ID parsing, both from `dtn:`/`ipn:` URI text and from
the CBOR encoding of an EID used within a bundle.
*/

use thiserror::Error;

/// Errors that can occur while parsing or decoding an [`super::Eid`].
#[derive(Error, Debug)]
pub enum EidError {
    /// A `dtn://` URI has an empty node-name component.
    #[error("dtn URI node-name is empty")]
    DtnNodeNameEmpty,

    /// A `dtn://` URI is missing the `/` that separates the node-name from the demux part.
    #[error("dtn URI missing name-delim '/'")]
    DtnMissingSlash,

    /// A `dtn:` URI scheme-specific part does not start with `//` and is not `none`.
    #[error("dtn URIs must start with '//' or be 'none'")]
    DtnMissingPrefix,

    /// An `ipn:` URI does not have exactly 2 dot-separated components.
    #[error("ipn URI must have exactly 2 components, node.service")]
    IpnInvalidComponents,

    /// The node number component of an `ipn:` URI or CBOR EID exceeds `u32::MAX`.
    #[error("Invalid ipn node number {0}")]
    IpnInvalidNodeNumber(u64),

    /// The service number component of an `ipn:` URI or CBOR EID exceeds `u32::MAX`.
    #[error("Invalid ipn service number {0}")]
    IpnInvalidServiceNumber(u64),

    /// A URI has no `scheme:` prefix at all.
    #[error("Missing scheme separator")]
    MissingScheme,

    /// A URI names a scheme other than `dtn` or `ipn`.
    #[error("Unsupported EID scheme '{0}'")]
    UnsupportedSchemeName(String),

    /// A CBOR-encoded EID names a scheme code other than 1 (dtn) or 2 (ipn), and
    /// the unrecognised scheme-specific part could not be skipped.
    #[error("Unsupported EID scheme code {0}")]
    UnsupportedScheme(u64),

    /// A generic error for when parsing a specific field of an EID fails.
    #[error("Failed to parse {field}: {source}")]
    InvalidField {
        /// The name of the field that failed to parse.
        field: &'static str,
        /// The underlying error that caused the failure.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An error occurred while decoding the CBOR representation of an EID.
    #[error(transparent)]
    InvalidCBOR(#[from] hardy_cbor::decode::Error),
}

/// Extension trait for `Result` that maps errors to an `InvalidField` variant.
pub trait CaptureFieldErr<T> {
    /// Maps the error to an `InvalidField` error with the given field name.
    fn map_field_err(self, field: &'static str) -> Result<T, EidError>;
}

impl<T, E> CaptureFieldErr<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn map_field_err(self, field: &'static str) -> Result<T, EidError> {
        self.map_err(|e| EidError::InvalidField {
            field,
            source: e.into(),
        })
    }
}
