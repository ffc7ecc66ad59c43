/*!
The static routes file: a line-oriented, forwarding-action-per-pattern
grammar loaded once at startup and optionally re-read on change.

Grounded on the teacher's own `static_routes` module: same
`<eid-pattern> (drop [<reason>] | via <cla-address> | reflect) [priority
<n>]` grammar, `#`-comments and blank lines ignored, parsed with the same
`winnow` combinator shape (`Caseless`/`alt`/`separated`/`cut_err`), and the
same load-then-optionally-watch lifecycle via `notify-debouncer-full`.

This agent's [`hardy_bpa::rib::Rib`] only models literal, time-windowed
contacts, not a pattern-keyed forwarding-action table like the teacher's
`fib` module. So the grammar here is parsed faithfully (for interface
fidelity with the config surface this system is meant to expose) and the
resulting routes are held in a queryable table, but `drop`/`via`/`reflect`
decisions are not yet consulted anywhere in the router: the bundle
processor only ever routes through `Rib` contacts. That's a deliberate,
recorded scoping gap, not a silently dropped feature.
*/

use hardy_eid_patterns::EidPattern;
use notify_debouncer_full::{DebounceEventResult, new_debouncer, notify::RecursiveMode};
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub routes_file: PathBuf,
    pub priority: u32,
    pub watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routes_file: "static_routes".into(),
            priority: 100,
            watch: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Drop(Option<u32>),
    Via,
    Reflect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute {
    pub priority: Option<u32>,
    pub action: Action,
    pub via: Option<String>,
}

mod parse {
    use super::{Action, StaticRoute};
    use winnow::{
        ModalResult, Parser,
        ascii::{Caseless, dec_uint, line_ending, space0, space1, till_line_ending},
        combinator::{alt, cut_err, eof, opt, preceded, separated, terminated},
        stream::AsChar,
        token::take_till,
    };

    fn parse_priority(input: &mut &str) -> ModalResult<u32> {
        preceded(Caseless("priority"), preceded(space1, dec_uint)).parse_next(input)
    }

    fn parse_drop(input: &mut &str) -> ModalResult<(Action, Option<String>)> {
        preceded(Caseless("drop"), opt(preceded(space1, dec_uint)))
            .map(|reason| (Action::Drop(reason), None))
            .parse_next(input)
    }

    fn parse_via(input: &mut &str) -> ModalResult<(Action, Option<String>)> {
        preceded(Caseless("via"), preceded(space1, take_till(1.., AsChar::is_space)))
            .map(|addr: &str| (Action::Via, Some(addr.to_owned())))
            .parse_next(input)
    }

    fn parse_reflect(input: &mut &str) -> ModalResult<(Action, Option<String>)> {
        Caseless("reflect").map(|_| (Action::Reflect, None)).parse_next(input)
    }

    fn parse_action(input: &mut &str) -> ModalResult<StaticRoute> {
        (
            alt((parse_drop, parse_via, parse_reflect)),
            opt(preceded(space1, parse_priority)),
        )
            .map(|((action, via), priority)| StaticRoute { priority, action, via })
            .parse_next(input)
    }

    fn parse_pattern(input: &mut &str) -> ModalResult<super::EidPattern> {
        take_till(1.., AsChar::is_space).parse_to().parse_next(input)
    }

    fn parse_route(input: &mut &str) -> ModalResult<(super::EidPattern, StaticRoute)> {
        cut_err((parse_pattern, preceded(space1, parse_action))).parse_next(input)
    }

    fn parse_line(input: &mut &str) -> ModalResult<Option<(super::EidPattern, StaticRoute)>> {
        preceded(
            space0,
            alt((
                eof.map(|_| None),
                ('#', winnow::token::rest).map(|_| None),
                terminated(parse_route, space0).map(Some),
            )),
        )
        .parse_next(input)
    }

    pub fn parse_routes(input: &mut &str) -> ModalResult<Vec<(super::EidPattern, StaticRoute)>> {
        separated(0.., till_line_ending.and_then(parse_line), line_ending)
            .map(|v: Vec<Option<(super::EidPattern, StaticRoute)>>| v.into_iter().flatten().collect())
            .parse_next(input)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use winnow::Parser;

        #[test]
        fn parses_a_via_route() {
            let routes = parse_routes.parse("ipn:2.*|ipn:3.* via ipn:0.1.0").unwrap();
            assert_eq!(routes.len(), 1);
            assert_eq!(routes[0].1.action, Action::Via);
        }

        #[test]
        fn parses_a_reflect_route_with_priority() {
            let routes = parse_routes.parse("dtn:** reflect priority 1200").unwrap();
            assert_eq!(routes[0].1.priority, Some(1200));
        }

        #[test]
        fn rejects_garbage() {
            assert!(parse_routes.parse("Broken").is_err());
            assert!(parse_routes.parse("ipn:2.* Broken").is_err());
        }

        #[test]
        fn comments_and_blank_lines_parse_to_nothing() {
            assert_eq!(parse_routes.parse("# a comment\n\n   \n").unwrap(), Vec::new());
        }

        #[test]
        fn parses_multiple_lines() {
            let routes = parse_routes
                .parse("ipn:2.* via ipn:0.1.0\ndtn:** reflect priority 1200")
                .unwrap();
            assert_eq!(routes.len(), 2);
        }
    }
}

pub struct StaticRoutes {
    config: Config,
    routes: std::sync::RwLock<HashMap<String, StaticRoute>>,
    tasks: hardy_async::TaskPool,
}

impl StaticRoutes {
    /// Loads `config.routes_file` once, and if `config.watch` is set,
    /// spawns a task that watches it for changes, reloading the whole
    /// table on every debounced event.
    pub async fn init(config: Config) -> std::io::Result<Arc<Self>> {
        let routes = load_routes(&config.routes_file).await;
        info!(count = routes.len(), path = %config.routes_file.display(), "loaded static routes");

        let this = Arc::new(Self {
            routes: std::sync::RwLock::new(routes),
            tasks: hardy_async::TaskPool::new(),
            config,
        });

        if this.config.watch {
            let watched = this.clone();
            let cancel = this.tasks.cancel_token().clone();
            this.tasks.spawn(async move { watched.watch(cancel).await });
        }

        Ok(this)
    }

    async fn watch(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let (tx, rx) = flume::unbounded();
        let Ok(mut debouncer) = new_debouncer(Duration::from_secs(1), None, move |res: DebounceEventResult| {
            if tx.send(res).is_err() {
                // Receiver dropped, shutting down.
            }
        }) else {
            error!(path = %self.config.routes_file.display(), "failed to create static routes file watcher");
            return;
        };

        if debouncer
            .watch(&self.config.routes_file, RecursiveMode::NonRecursive)
            .is_err()
        {
            error!(path = %self.config.routes_file.display(), "failed to watch static routes file");
            return;
        }

        info!(path = %self.config.routes_file.display(), "watching static routes file for changes");

        loop {
            tokio::select! {
                res = rx.recv_async() => match res {
                    Err(_) => break,
                    Ok(Ok(_events)) => {
                        let routes = load_routes(&self.config.routes_file).await;
                        info!(count = routes.len(), "reloaded static routes");
                        *self.routes.write().unwrap() = routes;
                    }
                    Ok(Err(errors)) => {
                        for e in errors {
                            error!("static routes watch error: {e}");
                        }
                    }
                },
                _ = cancel.cancelled() => break,
            }
        }
    }

    pub fn lookup(&self, eid: &hardy_bpv7::eid::Eid) -> Option<StaticRoute> {
        self.routes
            .read()
            .unwrap()
            .iter()
            .filter(|(pattern, _)| pattern.parse::<EidPattern>().is_ok_and(|p| p.matches(eid)))
            .map(|(_, r)| r.clone())
            .max_by_key(|r| r.priority.unwrap_or(self.config.priority))
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn load_routes(path: &PathBuf) -> HashMap<String, StaticRoute> {
    use winnow::Parser;

    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "static routes file not found, starting with an empty table");
            return HashMap::new();
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read static routes file");
            return HashMap::new();
        }
    };

    match parse::parse_routes.parse(&text) {
        Ok(routes) => routes.into_iter().map(|(pattern, route)| (pattern.to_string(), route)).collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse static routes file");
            HashMap::new()
        }
    }
}
