/*!
The Application Agent Protocol (AAP) TCP server (§4.10): accepts local
connections, handles `REGISTER`/`SENDBUNDLE`/keepalive, and streams bundles
delivered to a registered pattern back to the connection as `RECVBUNDLE`.

Grounded on the wire codec in `hardy_bpa::aap` and on
`file-cla/src/watcher.rs`'s task-pair idiom (one task reading and reacting,
one task draining a channel into the outbound side) adapted to a pair of
halves of one TCP connection instead of a watched directory and a sink.

A successful SENDBUNDLE that ends up forward-pending replies SENDCONFIRM
carrying the bundle's store-assigned id (§4.10): `Disposition::Route` now
carries that id directly, so no second store lookup is needed to report
it. A SENDBUNDLE that is delivered to a local service instead (no
forward-pending store entry) or dropped reports ACK/NACK as before.
CANCELBUNDLE still has no forward-pending-by-id cancellation path to call
into and is NACKed.
*/

use bytes::Bytes;
use hardy_bpa::aap::Message;
use hardy_bpa::bpa::Bpa;
use hardy_bpa::processor::Disposition;
use hardy_bpv7::eid::Eid;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Binds `addr` and spawns the accept loop onto `tasks`, returning once the
/// listener is bound. Each accepted connection is itself spawned onto
/// `tasks`, so [`hardy_async::TaskPool::shutdown`] waits for every open
/// connection to notice cancellation and close.
pub async fn serve(
    addr: SocketAddr,
    bpa: Arc<Bpa>,
    max_payload_length: u64,
    tasks: Arc<hardy_async::TaskPool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "AAP listener started");

    let accept_cancel = tasks.cancel_token().clone();
    let conn_tasks = tasks.clone();
    tasks.spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let Ok((stream, peer)) = accepted else { break };
                    let bpa = bpa.clone();
                    let cancel = conn_tasks.cancel_token().child_token();
                    conn_tasks.spawn(async move {
                        if let Err(e) = handle_connection(stream, bpa, max_payload_length, cancel).await {
                            debug!(%peer, "AAP connection closed: {e}");
                        }
                    });
                }
                _ = accept_cancel.cancelled() => break,
            }
        }
    });

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    bpa: Arc<Bpa>,
    max_payload_length: u64,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(AsyncMutex::new(writer));

    let (adu_tx, adu_rx) = flume::unbounded::<hardy_bpa::bundle::Bundle>();

    let forward_writer = writer.clone();
    let forward_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                res = adu_rx.recv_async() => match res {
                    Err(_) => break,
                    Ok(bundle) => {
                        let msg = Message::RecvBundle {
                            source: bundle.bundle_id.source.to_string(),
                            payload: bundle.payload,
                        };
                        let mut w = forward_writer.lock().await;
                        if w.write_all(&msg.encode()).await.is_err() {
                            break;
                        }
                    }
                },
                _ = forward_cancel.cancelled() => break,
            }
        }
    });

    // WELCOME is sent immediately on accept, carrying this node's base EID,
    // before the client has registered anything.
    writer
        .lock()
        .await
        .write_all(
            &Message::Welcome {
                eid: bpa.processor().local_eid().to_string(),
            }
            .encode(),
        )
        .await?;

    // Tracks both the registration pattern (for the services registry) and
    // the registered EID itself, since SENDBUNDLE needs the latter to build
    // a bundle's source as `<local>/<registered demux>` (§4.10 scenario 5).
    let mut registered: Option<(hardy_eid_patterns::EidPattern, Eid)> = None;

    loop {
        tokio::select! {
            msg = read_message(&mut reader, max_payload_length) => {
                let Some(msg) = msg? else { break };

                if let Some(reply) = msg.keepalive_reply() {
                    writer.lock().await.write_all(&reply.encode()).await?;
                    continue;
                }

                let reply = match msg {
                    // A zero-length EID deregisters without registering a
                    // new pattern; otherwise REGISTER replaces any existing
                    // registration for this connection.
                    Message::Register { eid } if eid.is_empty() => {
                        if let Some((pattern, _)) = registered.take() {
                            bpa.processor().services().deregister(&pattern);
                        }
                        Some(Message::Ack)
                    }
                    Message::Register { eid } => match eid.parse::<Eid>() {
                        Ok(eid) => {
                            if let Some((old, _)) = registered.take() {
                                bpa.processor().services().deregister(&old);
                            }
                            let pattern = hardy_eid_patterns::EidPattern::from(eid.clone());
                            bpa.processor().services().register(pattern.clone(), adu_tx.clone());
                            registered = Some((pattern, eid));
                            Some(Message::Ack)
                        }
                        Err(e) => {
                            warn!("rejected REGISTER with unparseable EID: {e}");
                            Some(Message::Nack)
                        }
                    },
                    Message::SendBundle { eid, payload } => Some(match &registered {
                        None => Message::Nack,
                        Some((_, registered_eid)) => {
                            let source = demux_source(bpa.processor().local_eid(), registered_eid);
                            match send_bundle(&bpa, &eid, source, payload).await {
                                Ok(Disposition::Route(id)) => Message::SendConfirm { bundle_id: id as u64 },
                                Ok(Disposition::DeliverLocal | Disposition::AwaitingReassembly) => Message::Ack,
                                Ok(Disposition::Dropped(_)) => Message::Nack,
                                Err(e) => {
                                    warn!("SENDBUNDLE failed: {e}");
                                    Message::Nack
                                }
                            }
                        }
                    }),
                    Message::CancelBundle { .. } => Some(Message::Nack),
                    _ => None,
                };

                if let Some(reply) = reply {
                    writer.lock().await.write_all(&reply.encode()).await?;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    if let Some((pattern, _)) = registered {
        bpa.processor().services().deregister(&pattern);
    }
    Ok(())
}

/// Builds a new bundle from `payload` with `source` (the connection's
/// registered demux address, not the bare local EID) and hands it straight
/// to the processor's `incoming` state machine, returning its disposition
/// so the caller can report a SENDCONFIRM carrying the assigned id.
async fn send_bundle(bpa: &Arc<Bpa>, eid: &str, source: Eid, payload: Box<[u8]>) -> anyhow::Result<Disposition> {
    let destination: Eid = eid.parse()?;
    let (bundle, data) = hardy_bpv7::builder::Builder::new()
        .source(source)
        .destination(destination)
        .add_payload_block(Vec::from(payload))
        .build();

    let wire_bytes = Bytes::from(Vec::from(data));
    let unified = hardy_bpa::bundle::Bundle::from_bpv7(bundle, &wire_bytes)?;
    Ok(bpa.processor().incoming(unified))
}

/// `<local>/<demux>`: the source a SENDBUNDLE-originated bundle carries
/// (§4.10 scenario 5). `registered` is the EID the connection registered
/// under; its app-id/service-number suffix is grafted onto `local`'s node
/// prefix so every app on this node sends from a distinct sub-address.
fn demux_source(local: &Eid, registered: &Eid) -> Eid {
    match (local, registered) {
        (Eid::Dtn(local_ssp), Eid::Dtn(registered_ssp)) => {
            let node = local_ssp.split('/').next().unwrap_or(local_ssp);
            let demux = registered_ssp.splitn(2, '/').nth(1).unwrap_or("");
            if demux.is_empty() {
                Eid::Dtn(format!("{node}/").into())
            } else {
                Eid::Dtn(format!("{node}/{demux}").into())
            }
        }
        (Eid::Ipn { node_number, .. }, Eid::Ipn { service_number, .. }) => Eid::Ipn {
            node_number: *node_number,
            service_number: *service_number,
        },
        _ => local.clone(),
    }
}

/// Reads exactly one AAP message's worth of bytes from `reader` and decodes
/// it. Returns `Ok(None)` on a clean EOF before any bytes of a new message
/// have been read.
async fn read_message(
    reader: &mut (impl AsyncRead + Unpin),
    max_payload_length: u64,
) -> std::io::Result<Option<Message>> {
    let mut buf = vec![0u8; 1];
    if reader.read_exact(&mut buf).await.is_err() {
        return Ok(None);
    }

    let type_code = buf[0] & 0x0F;
    match type_code {
        0x0 | 0x1 | 0x8 => {} // Ack, Nack, Ping: header only
        0x2 | 0x7 => read_eid(reader, &mut buf).await?,     // Register, Welcome
        0x3 | 0x4 => {
            // SendBundle, RecvBundle
            read_eid(reader, &mut buf).await?;
            read_payload(reader, &mut buf, max_payload_length).await?;
        }
        0x5 | 0x6 => {
            // SendConfirm, CancelBundle
            let mut id = [0u8; 8];
            reader.read_exact(&mut id).await?;
            buf.extend_from_slice(&id);
        }
        _ => {} // unrecognized type; Message::decode reports it
    }

    Message::decode(&buf, max_payload_length)
        .map(Some)
        .map_err(std::io::Error::other)
}

async fn read_eid(reader: &mut (impl AsyncRead + Unpin), buf: &mut Vec<u8>) -> std::io::Result<()> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes).await?;
    let len = u16::from_be_bytes(len_bytes) as usize;
    buf.extend_from_slice(&len_bytes);

    let mut eid_bytes = vec![0u8; len];
    reader.read_exact(&mut eid_bytes).await?;
    buf.extend_from_slice(&eid_bytes);
    Ok(())
}

async fn read_payload(
    reader: &mut (impl AsyncRead + Unpin),
    buf: &mut Vec<u8>,
    max_payload_length: u64,
) -> std::io::Result<()> {
    let mut len_bytes = [0u8; 8];
    reader.read_exact(&mut len_bytes).await?;
    let len = u64::from_be_bytes(len_bytes);
    buf.extend_from_slice(&len_bytes);

    if len > max_payload_length {
        return Err(std::io::Error::other(format!(
            "payload of {len} bytes exceeds the configured maximum of {max_payload_length}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    buf.extend_from_slice(&payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_register_message_off_the_wire() {
        let msg = Message::Register {
            eid: "dtn://node1/mail".into(),
        };
        let mut encoded = std::io::Cursor::new(msg.encode());
        let decoded = read_message(&mut encoded, 4096).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn reads_a_send_bundle_message_off_the_wire() {
        let msg = Message::SendBundle {
            eid: "ipn:2.1".into(),
            payload: Box::new([1, 2, 3, 4]),
        };
        let mut encoded = std::io::Cursor::new(msg.encode());
        let decoded = read_message(&mut encoded, 4096).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn rejects_an_oversized_send_bundle_payload() {
        let msg = Message::SendBundle {
            eid: "ipn:2.1".into(),
            payload: Box::new([0u8; 16]),
        };
        let mut encoded = std::io::Cursor::new(msg.encode());
        assert!(read_message(&mut encoded, 4).await.is_err());
    }

    #[tokio::test]
    async fn returns_none_on_clean_eof() {
        let mut encoded = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_message(&mut encoded, 4096).await.unwrap().is_none());
    }

    #[test]
    fn demux_source_grafts_the_registered_app_id_onto_the_local_node() {
        let local = Eid::Dtn("local/".into());
        let registered = Eid::Dtn("local/myapp".into());
        assert_eq!(demux_source(&local, &registered), Eid::Dtn("local/myapp".into()));
    }

    #[test]
    fn demux_source_falls_back_to_the_bare_node_with_no_app_suffix() {
        let local = Eid::Dtn("local/".into());
        let registered = Eid::Dtn("local/".into());
        assert_eq!(demux_source(&local, &registered), Eid::Dtn("local/".into()));
    }

    #[test]
    fn demux_source_grafts_the_registered_service_number_for_ipn() {
        let local = Eid::Ipn {
            node_number: 1,
            service_number: 0,
        };
        let registered = Eid::Ipn {
            node_number: 1,
            service_number: 7,
        };
        assert_eq!(
            demux_source(&local, &registered),
            Eid::Ipn {
                node_number: 1,
                service_number: 7
            }
        );
    }
}
