/*!
A file-based convergence layer adapter: bundles dropped into an `outbox`
directory are read and dispatched to the agent; bundles forwarded to a
peer are written as files into that peer's configured inbox directory.

Grounded on the teacher's own `file-cla` crate (same outbox/inbox-per-peer
shape, same watcher/forwarder task split), adapted to this workspace's
simplified `cla::Cla`/`cla::Sink` traits (`Eid` instead of a `NodeId` list,
no queue parameter on `forward`).
*/

use hardy_bpv7::eid::Eid;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};
use tracing::warn;

mod cla;
mod watcher;

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Directory watched for new files to dispatch as bundles. Each file is
    /// treated as one complete bundle and deleted once dispatched.
    pub outbox: Option<PathBuf>,
    /// Peer EID to inbox directory: a bundle forwarded to that peer is
    /// written as a file here.
    pub peers: HashMap<Eid, PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("failed to create directory '{path}': {source}")]
    CreateDir { path: String, source: std::io::Error },

    #[error("failed to canonicalize path '{path}': {source}")]
    Canonicalize { path: String, source: std::io::Error },

    #[error("failed to get current working directory: {0}")]
    CurrentDir(std::io::Error),

    #[error("failed to register CLA: {0}")]
    Registration(#[from] hardy_bpa::error::Error),
}

fn canonicalize_path(cwd: &Path, path: &PathBuf) -> Result<String, Error> {
    let full_path = cwd.join(path);

    if full_path.to_str().is_none() {
        return Err(Error::InvalidPath(format!("{}", full_path.display())));
    }

    std::fs::create_dir_all(&full_path).map_err(|e| Error::CreateDir {
        path: full_path.display().to_string(),
        source: e,
    })?;

    let canonical = full_path.canonicalize().map_err(|e| Error::Canonicalize {
        path: full_path.display().to_string(),
        source: e,
    })?;

    Ok(canonical.to_string_lossy().into_owned())
}

/// The file-based convergence layer adapter.
pub struct Cla {
    inboxes: HashMap<Eid, String>,
    outbox: Option<String>,
    sink: OnceLock<Arc<dyn hardy_bpa::cla::Sink>>,
    tasks: hardy_async::TaskPool,
}

impl Cla {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let cwd = std::env::current_dir().map_err(Error::CurrentDir)?;

        let mut inboxes = HashMap::new();
        for (eid, path) in &config.peers {
            inboxes.insert(eid.clone(), canonicalize_path(&cwd, path)?);
        }

        let outbox = config
            .outbox
            .as_ref()
            .map(|path| canonicalize_path(&cwd, path))
            .transpose()?;

        Ok(Self {
            inboxes,
            outbox,
            sink: OnceLock::new(),
            tasks: hardy_async::TaskPool::new(),
        })
    }

    /// Registers this CLA with a running agent under `name`. Every peer this
    /// CLA serves is announced individually via `add_peer` on registration,
    /// so it has no need to be the address-type fallback for unannounced
    /// nodes.
    pub async fn register(self: &Arc<Self>, bpa: &hardy_bpa::Bpa, name: String) -> Result<(), Error> {
        bpa.register_cla(name, None, self.clone()).await?;
        Ok(())
    }

    pub async fn unregister(&self) {
        self.tasks.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_canonicalizes_configured_paths() {
        let dir = std::env::temp_dir().join(format!("file-cla-test-{:?}", std::thread::current().id()));
        let config = Config {
            outbox: Some(dir.join("outbox")),
            peers: HashMap::new(),
        };
        let cla = Cla::new(&config).unwrap();
        assert!(cla.outbox.is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
