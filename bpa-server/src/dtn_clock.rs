/*!
A process-wide mapping between [`Instant`] (used internally by the routing
table) and `DtnTime` (used on the wire by the config-protocol and
management sinks of §4.11/§6). An anchor pair is captured the first time
this module is touched; the management agent's `SET_TIME` command adjusts
an offset on top of it, so the absolute `from`/`to` timestamps a config
command carries can be translated to the `Instant`s [`hardy_bpa::rib::Rib`]
expects, and so tests or operators can align the agent's notion of "now"
with a simulated or corrected clock without sleeping.

This offset is consulted only by [`now`] and [`to_instant`], which
`config_protocol` and `management` call directly. It does not reach into
`contact_manager`/`router`/`store` inside the `hardy_bpa` crate, which
continue to schedule against the real `Instant::now()`: rewiring every
"now" read in that crate behind a settable clock would be a much larger
change than the one command the management agent supports calls for. This
is a deliberate scoping boundary, not an oversight.
*/

use hardy_bpv7::dtn_time::DtnTime;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

static ANCHOR: OnceLock<(Instant, u64)> = OnceLock::new();
static OFFSET_SECS: AtomicI64 = AtomicI64::new(0);

fn anchor() -> (Instant, u64) {
    *ANCHOR.get_or_init(|| (Instant::now(), DtnTime::now().secs()))
}

/// Adjusts the clock offset so that [`now`] reports `at` as the current
/// time, per the management agent's `SET_TIME` command.
pub fn set_time(at: DtnTime) {
    let (_, anchor_secs) = anchor();
    OFFSET_SECS.store(at.secs() as i64 - anchor_secs as i64, Ordering::SeqCst);
}

pub fn now() -> DtnTime {
    let (anchor_instant, anchor_secs) = anchor();
    let elapsed = anchor_instant.elapsed().as_secs() as i64;
    let offset = OFFSET_SECS.load(Ordering::SeqCst);
    DtnTime::from_secs((anchor_secs as i64 + elapsed + offset).max(0) as u64)
}

/// Converts an absolute DTN-seconds timestamp, as carried by a
/// config-protocol contact declaration, to the `Instant` the `Rib`
/// expects.
pub fn to_instant(dtn_secs: u64) -> Instant {
    let (anchor_instant, anchor_secs) = anchor();
    let offset = OFFSET_SECS.load(Ordering::SeqCst);
    let delta = dtn_secs as i64 - anchor_secs as i64 - offset;
    if delta >= 0 {
        anchor_instant + Duration::from_secs(delta as u64)
    } else {
        anchor_instant
            .checked_sub(Duration::from_secs((-delta) as u64))
            .unwrap_or(anchor_instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_time_moves_now_to_the_requested_instant() {
        set_time(DtnTime::from_secs(1_900_000_000));
        assert_eq!(now().secs(), 1_900_000_000);
    }

    #[test]
    fn to_instant_is_monotonic_in_dtn_seconds() {
        let earlier = to_instant(1_000);
        let later = to_instant(2_000);
        assert!(later > earlier);
    }
}
