/*!
The crate-wide error type for the Bundle Processing Agent.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Bpv7(#[from] hardy_bpv7::Error),

    #[error(transparent)]
    Bpv6(#[from] hardy_bpv6::Error),

    #[error("bundle store has no room for a new bundle id")]
    StoreExhausted,

    #[error("no route to {0}")]
    NoRoute(hardy_bpv7::eid::Eid),

    #[error("contact for {0} already exists and overlaps")]
    OverlappingContact(hardy_bpv7::eid::Eid),

    #[error("a convergence layer adapter named {0} is already registered")]
    DuplicateCla(String),

    #[error("application agent payload exceeds the configured maximum of {0} bytes")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Internal(#[from] Box<dyn core::error::Error + Send + Sync>),
}

pub type Result<T> = core::result::Result<T, Error>;
