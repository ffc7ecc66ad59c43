/*!
The convergence layer adapter interface: the seam between this agent and
whatever transport actually moves bundle bytes (TCP, a serial radio link,
a file drop folder).

Grounded on the teacher's `cla::Cla`/`cla::Sink` traits and
`ClaAddressType`/`ClaAddress` enums, trimmed to the addressing and framing
this crate's contact model actually needs — no egress-queue priority levels
or peer-discovery plumbing, since §4.8's contact manager already knows which
peer a contact is for before it asks a CLA to carry anything.
*/

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use hardy_bpv7::eid::Eid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaAddressType {
    Tcp,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClaAddress {
    Tcp(std::net::SocketAddr),
    Private(Bytes),
}

impl ClaAddress {
    pub fn address_type(&self) -> ClaAddressType {
        match self {
            ClaAddress::Tcp(_) => ClaAddressType::Tcp,
            ClaAddress::Private(_) => ClaAddressType::Private,
        }
    }
}

impl std::fmt::Display for ClaAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaAddress::Tcp(addr) => write!(f, "tcp:{addr}"),
            ClaAddress::Private(bytes) => write!(f, "private:{bytes:02x?}"),
        }
    }
}

pub enum ForwardResult {
    Sent,
    NoNeighbour,
}

/// A convergence layer adapter: accepts fully serialized bundle bytes for
/// one of its addresses and puts them on the wire.
#[async_trait]
pub trait Cla: Send + Sync {
    /// Called once, when the CLA is registered with the agent; `sink` is
    /// how the CLA reports inbound bundles and peer changes back.
    async fn on_register(&self, sink: std::sync::Arc<dyn Sink>, local_eid: &Eid);

    async fn on_unregister(&self);

    async fn forward(&self, address: &ClaAddress, bundle: Bytes) -> Result<ForwardResult>;
}

/// The channel a CLA uses to hand things back to the agent, decoupling it
/// from the agent's internal structure.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Hands a just-received, not-yet-parsed bundle to the bundle processor.
    async fn dispatch(&self, bundle: Bytes) -> Result<()>;

    async fn add_peer(&self, peer: Eid, address: ClaAddress) -> Result<bool>;

    async fn remove_peer(&self, peer: Eid, address: &ClaAddress) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cla_address_reports_its_own_type() {
        let addr = ClaAddress::Tcp("127.0.0.1:4556".parse().unwrap());
        assert_eq!(addr.address_type(), ClaAddressType::Tcp);
        assert_eq!(format!("{addr}"), "tcp:127.0.0.1:4556");
    }
}
