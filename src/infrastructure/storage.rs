use crate::config::AppConfig;
use crate::services::store::{ArtifactStore, StageKind};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<ArtifactStore>> {
    let store = ArtifactStore::new(&config.data_dir);
    store.ensure_layout().with_context(|| {
        format!(
            "Failed to create data directories under {}",
            config.data_dir.display()
        )
    })?;

    info!("📁 Data root: {}", store.root().display());
    for kind in StageKind::ALL {
        info!("   {} staging: {}", kind, store.staging_dir(kind).display());
    }
    info!("   output: {}", store.output_dir().display());

    Ok(Arc::new(store))
}
