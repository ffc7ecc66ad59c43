/*!
The config protocol (§4.11/§6): a dedicated local-EID bundle sink named
`config` carrying live add/update/delete commands for nodes and their
contacts. Command byte `1`/`2`/`3` selects add/update/delete; the body is
`(<node-eid>:<reliability>:<cla-addr>):[(<extra-eid>),...]:[{<from>,<to>,
<bitrate>,[(<extra-eid>)]},...];`.

Parsed with a `winnow` combinator grammar in the same style as
[`crate::static_routes`]'s, since this is a line/field-oriented text
format rather than a binary streaming one like AAP.

`add`/`update` first call [`Rib::add_node`] with the header's `cla-addr`
and the node-level `extra-eid` list (merged into the node's endpoints if
it already exists), then [`Rib::add_contact`] once per contact in the
body, passing that contact's own `extra-eid` list through as its
per-contact endpoints. `delete`'s contact list is instead treated as a set
of contact-window descriptions whose matching, currently scheduled
contacts should be removed; an empty contact list deletes the whole node.

The node-level `reliability` field is the only trust scalar the wire
grammar carries, so it is used for both of `Rib::add_node`'s
`trustworthiness` and `reliability` parameters; association probability,
which this grammar has no field for, defaults to `1.0` (these are
declared, not opportunistically-sensed, contacts).
*/

use hardy_bpv7::eid::Eid;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactSpec {
    pub from: u64,
    pub to: u64,
    pub bitrate_bytes_per_sec: u64,
    pub extra_eids: Vec<Eid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeCommand {
    pub op: Op,
    pub node_eid: Eid,
    pub reliability: f32,
    pub cla_addr: String,
    pub extra_eids: Vec<Eid>,
    pub contacts: Vec<ContactSpec>,
}

mod parse {
    use super::{ContactSpec, NodeCommand, Op};
    use hardy_bpv7::eid::Eid;
    use winnow::{
        ModalResult, Parser,
        ascii::dec_uint,
        combinator::{alt, cut_err, delimited, opt, separated},
        token::{one_of, take_till},
    };

    fn parse_op(input: &mut &str) -> ModalResult<Op> {
        one_of(('1', '2', '3'))
            .map(|c| match c {
                '1' => Op::Add,
                '2' => Op::Update,
                _ => Op::Delete,
            })
            .parse_next(input)
    }

    /// An EID appearing inside a parenthesized slot of its own
    /// (`(<extra-eid>)`, a contact's node list): unambiguously bounded by
    /// the closing paren, so interior colons (as in `ipn:2.1`) are fine.
    fn parse_eid(input: &mut &str) -> ModalResult<Eid> {
        take_till(1.., |c| c == ')').parse_to().parse_next(input)
    }

    /// The node EID in the header `(<node-eid>:<reliability>:<cla-addr>)`.
    /// Unlike a parenthesized EID slot, this one shares its delimiter (`:`)
    /// with the EID's own scheme separator, so it has to be recognized by
    /// scheme rather than bounded by the next colon.
    fn parse_header_eid(input: &mut &str) -> ModalResult<Eid> {
        alt((
            ("dtn://", take_till(0.., |c| c == ':')).take(),
            ("ipn:", take_till(1.., |c| c == ':')).take(),
            "dtn:none",
        ))
        .parse_to()
        .parse_next(input)
    }

    fn parse_u64(input: &mut &str) -> ModalResult<u64> {
        dec_uint.parse_next(input)
    }

    fn parse_reliability(input: &mut &str) -> ModalResult<f32> {
        take_till(1.., |c| matches!(c, ':' | ')'))
            .parse_to()
            .parse_next(input)
    }

    fn parse_cla_addr(input: &mut &str) -> ModalResult<String> {
        take_till(1.., |c| c == ')').map(str::to_owned).parse_next(input)
    }

    fn parse_eid_list(input: &mut &str) -> ModalResult<Vec<Eid>> {
        delimited(
            '[',
            separated(0.., delimited('(', parse_eid, ')'), ','),
            ']',
        )
        .parse_next(input)
    }

    fn parse_contact(input: &mut &str) -> ModalResult<ContactSpec> {
        delimited(
            '{',
            (
                parse_u64,
                ',',
                parse_u64,
                ',',
                parse_u64,
                ',',
                parse_eid_list,
            )
                .map(|(from, _, to, _, bitrate, _, extra_eids)| ContactSpec {
                    from,
                    to,
                    bitrate_bytes_per_sec: bitrate,
                    extra_eids,
                }),
            '}',
        )
        .parse_next(input)
    }

    fn parse_contact_list(input: &mut &str) -> ModalResult<Vec<ContactSpec>> {
        delimited('[', separated(0.., parse_contact, ','), ']').parse_next(input)
    }

    fn parse_header(input: &mut &str) -> ModalResult<(Eid, f32, String)> {
        delimited(
            '(',
            (parse_header_eid, ':', parse_reliability, ':', parse_cla_addr)
                .map(|(eid, _, reliability, _, cla_addr)| (eid, reliability, cla_addr)),
            ')',
        )
        .parse_next(input)
    }

    pub fn parse_command(input: &mut &str) -> ModalResult<NodeCommand> {
        cut_err((
            parse_op,
            parse_header,
            ':',
            parse_eid_list,
            ':',
            parse_contact_list,
            opt(';'),
        ))
        .map(|(op, (node_eid, reliability, cla_addr), _, extra_eids, _, contacts, _)| NodeCommand {
            op,
            node_eid,
            reliability,
            cla_addr,
            extra_eids,
            contacts,
        })
        .parse_next(input)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use winnow::Parser;

        #[test]
        fn parses_an_add_command_with_one_contact() {
            let cmd = parse_command
                .parse("1(ipn:2.0:0.9:tcp://10.0.0.1:4556):[]:[{100,200,500,[]}];")
                .unwrap();
            assert_eq!(cmd.op, Op::Add);
            assert_eq!(cmd.node_eid, "ipn:2.0".parse().unwrap());
            assert_eq!(cmd.reliability, 0.9);
            assert_eq!(cmd.cla_addr, "tcp://10.0.0.1:4556");
            assert_eq!(cmd.contacts.len(), 1);
            assert_eq!(cmd.contacts[0].from, 100);
            assert_eq!(cmd.contacts[0].to, 200);
            assert_eq!(cmd.contacts[0].bitrate_bytes_per_sec, 500);
        }

        #[test]
        fn parses_a_delete_command_with_no_contacts() {
            let cmd = parse_command.parse("3(dtn://node1/:1:x):[]:[];").unwrap();
            assert_eq!(cmd.op, Op::Delete);
            assert!(cmd.contacts.is_empty());
        }

        #[test]
        fn parses_extra_eids_on_node_and_contact() {
            let cmd = parse_command
                .parse("2(ipn:2.0:0.5:x):[(ipn:2.1)]:[{1,2,3,[(ipn:2.2)]}];")
                .unwrap();
            assert_eq!(cmd.extra_eids, vec!["ipn:2.1".parse().unwrap()]);
            assert_eq!(cmd.contacts[0].extra_eids, vec!["ipn:2.2".parse().unwrap()]);
        }

        #[test]
        fn rejects_garbage() {
            assert!(parse_command.parse("9(ipn:2.0:0.9:x):[]:[];").is_err());
            assert!(parse_command.parse("not a command").is_err());
        }
    }
}

/// Applies one parsed command to `rib`. `add` and `update` both merge the
/// node record, then add every contact in the body (an `update` first
/// removes none of the node's existing contacts, matching
/// `Rib::add_contact`'s own overlap rejection for anything that collides,
/// and bitrate changes on an unchanged (from, to) window are merged rather
/// than rejected — any bundles that no longer fit are drained back for
/// re-routing). An empty contact list on `delete` removes the whole node;
/// otherwise only contacts whose window matches one named in the body are
/// removed.
fn apply(bpa: &std::sync::Arc<hardy_bpa::Bpa>, cmd: &NodeCommand) {
    let rib = bpa.processor().rib();
    match cmd.op {
        Op::Add | Op::Update => {
            rib.add_node(
                cmd.node_eid.clone(),
                Some(cmd.cla_addr.clone()),
                cmd.extra_eids.clone(),
                cmd.reliability,
                cmd.reliability,
            );

            for contact in &cmd.contacts {
                let from = crate::dtn_clock::to_instant(contact.from);
                let to = crate::dtn_clock::to_instant(contact.to);
                match rib.add_contact(
                    cmd.node_eid.clone(),
                    from,
                    to,
                    contact.bitrate_bytes_per_sec,
                    1.0,
                    contact.extra_eids.clone(),
                ) {
                    hardy_bpa::rib::AddContactOutcome::Created(id) => {
                        info!(peer = %cmd.node_eid, id, "added contact")
                    }
                    hardy_bpa::rib::AddContactOutcome::Merged { id, needs_reschedule } => {
                        info!(peer = %cmd.node_eid, id, needs_reschedule, "merged contact");
                        if needs_reschedule {
                            for bundle_id in rib.drain_queue(id) {
                                bpa.processor().route_and_assign(bundle_id);
                            }
                        }
                    }
                    hardy_bpa::rib::AddContactOutcome::Rejected => {
                        warn!(peer = %cmd.node_eid, "rejected overlapping contact")
                    }
                }
            }
        }
        Op::Delete => {
            if cmd.contacts.is_empty() {
                rib.delete_node(&cmd.node_eid, hardy_bpa::rib::NodeDeletion::Whole);
            } else {
                let contact_ids = rib
                    .lookup_eid(&cmd.node_eid)
                    .into_iter()
                    .filter(|contact| {
                        cmd.contacts
                            .iter()
                            .any(|c| crate::dtn_clock::to_instant(c.from) == contact.from)
                    })
                    .map(|contact| contact.id)
                    .collect();
                rib.delete_node(
                    &cmd.node_eid,
                    hardy_bpa::rib::NodeDeletion::Partial {
                        endpoints: Vec::new(),
                        contact_ids,
                    },
                );
            }
        }
    }
}

/// Registers the `config` sink and spawns a task that parses and applies
/// every bundle delivered to it, until `cancel` fires.
pub fn spawn(
    bpa: &Arc<hardy_bpa::Bpa>,
    local_eid: &Eid,
    tasks: &hardy_async::TaskPool,
    cancel: tokio_util::sync::CancellationToken,
) {
    use winnow::Parser;

    let pattern = hardy_eid_patterns::EidPattern::from(config_eid(local_eid));
    let (tx, rx) = flume::unbounded::<hardy_bpa::bundle::Bundle>();
    bpa.processor().services().register(pattern.clone(), tx);

    let bpa = bpa.clone();
    tasks.spawn(async move {
        loop {
            tokio::select! {
                res = rx.recv_async() => match res {
                    Err(_) => break,
                    Ok(bundle) => match std::str::from_utf8(&bundle.payload) {
                        Ok(text) => match parse::parse_command.parse(text) {
                            Ok(cmd) => apply(&bpa, &cmd),
                            Err(e) => warn!("failed to parse config command: {e}"),
                        },
                        Err(e) => warn!("config command was not valid UTF-8: {e}"),
                    },
                },
                _ = cancel.cancelled() => break,
            }
        }
        bpa.processor().services().deregister(&pattern);
    });
}

fn config_eid(local_eid: &Eid) -> Eid {
    match local_eid {
        Eid::Dtn(ssp) => Eid::Dtn(format!("{ssp}config").into()),
        Eid::Ipn { node_number, .. } => Eid::Ipn {
            node_number: *node_number,
            service_number: 1,
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bpa() -> Arc<hardy_bpa::Bpa> {
        Arc::new(hardy_bpa::Bpa::new(&hardy_bpa::config::Config::default()).unwrap())
    }

    #[test]
    fn add_command_populates_the_rib() {
        let bpa = test_bpa();
        let cmd = NodeCommand {
            op: Op::Add,
            node_eid: "ipn:2.0".parse().unwrap(),
            reliability: 0.8,
            cla_addr: "x".into(),
            extra_eids: Vec::new(),
            contacts: vec![ContactSpec {
                from: 100,
                to: 200,
                bitrate_bytes_per_sec: 500,
                extra_eids: Vec::new(),
            }],
        };
        apply(&bpa, &cmd);
        assert_eq!(bpa.processor().rib().lookup_eid(&"ipn:2.1".parse().unwrap()).len(), 1);
        assert_eq!(
            bpa.processor().rib().node(&"ipn:2.0".parse().unwrap()).unwrap().cla_addr.as_deref(),
            Some("x")
        );
    }

    #[test]
    fn delete_command_with_no_contacts_removes_every_contact() {
        let bpa = test_bpa();
        let add = NodeCommand {
            op: Op::Add,
            node_eid: "ipn:2.0".parse().unwrap(),
            reliability: 0.8,
            cla_addr: "x".into(),
            extra_eids: Vec::new(),
            contacts: vec![ContactSpec {
                from: 100,
                to: 200,
                bitrate_bytes_per_sec: 500,
                extra_eids: Vec::new(),
            }],
        };
        apply(&bpa, &add);

        let delete = NodeCommand {
            op: Op::Delete,
            contacts: Vec::new(),
            ..add
        };
        apply(&bpa, &delete);
        assert!(bpa.processor().rib().lookup_eid(&"ipn:2.1".parse().unwrap()).is_empty());
    }
}
