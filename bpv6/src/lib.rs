/*!
An implementation of Bundle Protocol version 6 (RFC 5050): the SDNV and
dictionary-based wire format that predates BPv7's CBOR framing.

This crate is deliberately narrow: it parses and serializes BPv6 bundles,
their extension blocks, administrative records, and fragmentation, so that a
bundle protocol agent can interoperate with legacy BPv6 nodes alongside BPv7
peers. Routing, storage, and convergence-layer concerns live above this
crate, mirroring how [`hardy_bpv7`](https://docs.rs/hardy-bpv7) is scoped.
*/

pub mod administrative_record;
pub mod block;
pub mod bundle;
pub mod eid;
pub mod error;
pub mod flags;
pub mod primary_block;
mod sdnv;

pub use bundle::Bundle;
pub use eid::Eid;
pub use error::Error;
