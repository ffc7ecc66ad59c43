/*!
The management agent (§4.11/§6): a dedicated local-EID bundle sink named
`management` whose payloads are single-byte command codes followed by
parameters. Only one command is defined: `0x01 SET_TIME`, an 8-byte
big-endian u64 DTN timestamp that reinitializes [`crate::dtn_clock`]'s
offset.

Grounded on the same registered-sink idiom `aap_server` uses to drain a
`flume` receiver fed by [`hardy_bpa::services::Registry`], here reduced to
a single task with no connection to shuttle replies over.
*/

use hardy_bpv7::dtn_time::DtnTime;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SET_TIME: u8 = 0x01;

/// Registers the `management` sink and spawns a task that applies every
/// bundle delivered to it, until `cancel` fires.
pub fn spawn(
    bpa: &Arc<hardy_bpa::Bpa>,
    local_eid: &hardy_bpv7::eid::Eid,
    tasks: &hardy_async::TaskPool,
    cancel: CancellationToken,
) {
    let pattern = hardy_eid_patterns::EidPattern::from(management_eid(local_eid));
    let (tx, rx) = flume::unbounded::<hardy_bpa::bundle::Bundle>();
    bpa.processor().services().register(pattern.clone(), tx);

    let bpa = bpa.clone();
    tasks.spawn(async move {
        loop {
            tokio::select! {
                res = rx.recv_async() => match res {
                    Err(_) => break,
                    Ok(bundle) => apply(&bundle.payload),
                },
                _ = cancel.cancelled() => break,
            }
        }
        bpa.processor().services().deregister(&pattern);
    });
}

fn management_eid(local_eid: &hardy_bpv7::eid::Eid) -> hardy_bpv7::eid::Eid {
    match local_eid {
        hardy_bpv7::eid::Eid::Dtn(ssp) => hardy_bpv7::eid::Eid::Dtn(format!("{ssp}management").into()),
        hardy_bpv7::eid::Eid::Ipn { node_number, .. } => hardy_bpv7::eid::Eid::Ipn {
            node_number: *node_number,
            service_number: 2,
        },
        other => other.clone(),
    }
}

fn apply(payload: &[u8]) {
    let Some((&code, rest)) = payload.split_first() else {
        warn!("empty management command");
        return;
    };

    match code {
        SET_TIME => {
            let Ok(bytes) = <[u8; 8]>::try_from(rest) else {
                warn!(len = rest.len(), "SET_TIME command had the wrong parameter length");
                return;
            };
            let secs = u64::from_be_bytes(bytes);
            let at = DtnTime::from_secs(secs);
            crate::dtn_clock::set_time(at);
            info!(secs, "clock offset reinitialized by SET_TIME");
        }
        other => warn!(code = other, "unrecognized management command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_time_command_moves_the_clock() {
        let secs = 1_950_000_000u64;
        let mut payload = vec![SET_TIME];
        payload.extend_from_slice(&secs.to_be_bytes());
        apply(&payload);
        assert_eq!(crate::dtn_clock::now().secs(), secs);
    }

    #[test]
    fn rejects_a_short_set_time_command() {
        apply(&[SET_TIME, 0, 0]);
    }

    #[test]
    fn ignores_an_unrecognized_command_code() {
        apply(&[0xFF]);
    }

    #[test]
    fn ignores_an_empty_command() {
        apply(&[]);
    }
}
