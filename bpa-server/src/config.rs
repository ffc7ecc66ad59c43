/*!
Layered settings: command-line flags, an optional configuration file, and
`BPA_`-prefixed environment variables, assembled with the `config` crate and
deserialized into this binary's top-level [`Config`].

Grounded on the teacher's own `bpa-server/src/config.rs` (`getopts` for
`-c/-h/-v`, `directories::ProjectDirs` for the default config path,
`config::Environment::with_prefix` for env overrides, a flattened
`hardy_bpa::config::Config` embedded in the binary's own config struct),
trimmed to this workspace's actual subsystems: no storage-backend enum (this
agent's store is in-memory only), no gRPC, no ipn-legacy-filter.
*/

use serde::Deserialize;
use std::path::PathBuf;
use tracing::Level;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `tracing_subscriber::EnvFilter` directive string, e.g. `"info"` or
    /// `"hardy_bpa=debug,info"`.
    pub log_level: String,

    /// Address the AAP TCP listener binds to.
    pub aap_addr: std::net::SocketAddr,

    /// Largest ADU this agent will accept over a `SENDBUNDLE`/`RECVBUNDLE`
    /// AAP message (§4.10).
    pub aap_max_payload_length: u64,

    /// Flattened tunables for the agent's subsystems.
    #[serde(flatten)]
    pub bpa: hardy_bpa::config::Config,

    /// Static routes file, loaded once at startup and optionally watched
    /// for changes (§4.11 "ambient supplement").
    pub static_routes: Option<crate::static_routes::Config>,

    /// Convergence layer adapters to register at startup.
    pub clas: Vec<crate::clas::Cla>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            aap_addr: ([127, 0, 0, 1], 4556).into(),
            aap_max_payload_length: 1 << 20,
            bpa: hardy_bpa::config::Config::default(),
            static_routes: None,
            clas: Vec::new(),
        }
    }
}

fn options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optflag("h", "help", "print this help menu")
        .optflag("v", "version", "print the version information")
        .optopt("c", "config", "use a custom configuration file", "FILE");
    opts
}

fn config_dir() -> PathBuf {
    directories::ProjectDirs::from("dtn", "Hardy", env!("CARGO_PKG_NAME")).map_or_else(
        || std::path::Path::new("/etc").join(env!("CARGO_PKG_NAME")),
        |proj_dirs| proj_dirs.config_local_dir().to_path_buf(),
    )
}

/// Parses the command line and assembles a layered [`Config`]. Returns
/// `None` (after printing help/version) when the process should exit
/// immediately with success, without starting the agent.
pub fn init() -> Option<(Config, String)> {
    let opts = options();
    let args: Vec<String> = std::env::args().collect();
    let flags = opts.parse(&args[1..]).expect("failed to parse command line arguments");

    if flags.opt_present("h") {
        let brief = format!(
            "{} {} - {}\n\nUsage: {} [options]",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_DESCRIPTION"),
            args[0]
        );
        print!("{}", opts.usage(&brief));
        return None;
    }
    if flags.opt_present("v") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return None;
    }

    let mut b = ::config::Config::builder();

    let config_source = if let Some(source) = flags.opt_str("config") {
        let msg = format!("using configuration file '{source}' given on the command line");
        b = b.add_source(::config::File::with_name(&source));
        msg
    } else if let Ok(source) = std::env::var("BPA_CONFIG_FILE") {
        let msg =
            format!("using configuration file '{source}' given by the BPA_CONFIG_FILE environment variable");
        b = b.add_source(::config::File::with_name(&source));
        msg
    } else {
        let path = config_dir().join(format!("{}.yaml", env!("CARGO_PKG_NAME")));
        let msg = format!("using optional configuration file '{}'", path.display());
        b = b.add_source(::config::File::from(path).required(false));
        msg
    };

    b = b.add_source(::config::Environment::with_prefix("BPA").separator("__"));

    let config: Config = b
        .build()
        .expect("failed to read configuration")
        .try_deserialize()
        .expect("failed to parse configuration");

    Some((config, config_source))
}

pub fn log_filter(config: &Config) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::builder()
        .with_default_directive(
            config
                .log_level
                .parse::<Level>()
                .map(Into::into)
                .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .from_env_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_usable_aap_address() {
        let config = Config::default();
        assert_eq!(config.aap_addr.port(), 4556);
    }
}
