/*!
Tunables for the subsystems this crate wires together. Deserialized with
`serde`; the actual layered loading (defaults, file, environment,
command-line) belongs to the `bpa-server` binary crate, which assembles a
`Config` before handing it to [`crate::bpa::Bpa::new`] — mirroring the
teacher's split between its library crates' plain `Config` structs and
`bpa-server`'s layered settings loader.
*/

use crate::{contact_manager, optimizer, router};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub local_eid: String,
    pub router: RouterConfig,
    pub optimizer: OptimizerConfig,
    pub contact_manager: ContactManagerConfig,
    pub custody_retransmit_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_eid: "dtn://localhost/".into(),
            router: RouterConfig::default(),
            optimizer: OptimizerConfig::default(),
            contact_manager: ContactManagerConfig::default(),
            custody_retransmit_timeout: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub deterministic_threshold: f32,
    pub opportunistic_threshold: f32,
    pub min_probability: f32,
    pub max_contacts: usize,
    pub fragment_min_payload: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let d = router::Config::default();
        Self {
            deterministic_threshold: d.deterministic_threshold,
            opportunistic_threshold: d.opportunistic_threshold,
            min_probability: d.min_probability,
            max_contacts: d.max_contacts,
            fragment_min_payload: d.fragment_min_payload,
        }
    }
}

impl From<RouterConfig> for router::Config {
    fn from(c: RouterConfig) -> Self {
        router::Config {
            deterministic_threshold: c.deterministic_threshold,
            opportunistic_threshold: c.opportunistic_threshold,
            min_probability: c.min_probability,
            max_contacts: c.max_contacts,
            fragment_min_payload: c.fragment_min_payload,
            trustworthiness_weight: 0.5,
            reliability_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub opt_min_time: Duration,
    pub opt_max_pre_bundles: usize,
    pub opt_max_pre_bundles_contact: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let d = optimizer::Config::default();
        Self {
            opt_min_time: d.opt_min_time,
            opt_max_pre_bundles: d.opt_max_pre_bundles,
            opt_max_pre_bundles_contact: d.opt_max_pre_bundles_contact,
        }
    }
}

impl From<OptimizerConfig> for optimizer::Config {
    fn from(c: OptimizerConfig) -> Self {
        optimizer::Config {
            opt_min_time: c.opt_min_time,
            opt_max_pre_bundles: c.opt_max_pre_bundles,
            opt_max_pre_bundles_contact: c.opt_max_pre_bundles_contact,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ContactManagerConfig {
    pub checking_max_period: Duration,
    pub max_concurrent_contacts: usize,
}

impl Default for ContactManagerConfig {
    fn default() -> Self {
        let d = contact_manager::Config::default();
        Self {
            checking_max_period: d.checking_max_period,
            max_concurrent_contacts: d.max_concurrent_contacts,
        }
    }
}

impl From<ContactManagerConfig> for contact_manager::Config {
    fn from(c: ContactManagerConfig) -> Self {
        contact_manager::Config {
            checking_max_period: c.checking_max_period,
            max_concurrent_contacts: c.max_concurrent_contacts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_into_subsystem_configs() {
        let config = Config::default();
        let router_config: router::Config = config.router.into();
        assert_eq!(router_config.max_contacts, config.router.max_contacts);
    }
}
