/*!
Convergence layer adapter configuration and startup.

Grounded on the teacher's own `bpa-server/src/clas.rs` (a tagged-union
`ClaConfig` per CLA entry, `#[serde(other)]` catch-all for unrecognized
types, one `match` arm per compiled-in CLA feature calling its crate's own
constructor then `bpa.register_cla`). Trimmed to the one convergence layer
adapter this workspace actually implements: `hardy-file-cla`. The teacher's
`tcpclv4`/UDP/BTP arms don't exist in this workspace and aren't ported.
*/

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
pub struct Cla {
    pub name: String,

    #[serde(flatten)]
    pub cla: ClaConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum ClaConfig {
    #[cfg(feature = "file-cla")]
    #[serde(rename = "file-cla")]
    File(hardy_file_cla::Config),

    #[serde(other)]
    Unknown,
}

pub async fn init(config: Vec<Cla>, bpa: &Arc<hardy_bpa::Bpa>) -> anyhow::Result<()> {
    for cla_config in config {
        match cla_config.cla {
            ClaConfig::Unknown => {
                warn!(name = %cla_config.name, "ignoring unknown CLA type");
            }
            #[cfg(feature = "file-cla")]
            ClaConfig::File(config) => {
                let cla = Arc::new(hardy_file_cla::Cla::new(&config).map_err(|e| {
                    anyhow::anyhow!("failed to start CLA '{}': {e}", cla_config.name)
                })?);

                cla.register(bpa, cla_config.name.clone()).await.map_err(|e| {
                    anyhow::anyhow!("failed to register CLA '{}': {e}", cla_config.name)
                })?;
            }
        };
    }
    Ok(())
}
