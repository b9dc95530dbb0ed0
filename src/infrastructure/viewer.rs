use crate::config::AppConfig;
use crate::services::viewer::Viewer;
use std::sync::Arc;
use tracing::info;

pub fn setup_viewer(config: &AppConfig) -> Arc<dyn Viewer> {
    let viewer = crate::services::viewer::create_viewer(&config.viewer);
    info!("🖥️  PDF viewer: {}", viewer.name());
    if viewer.name() == "noop" {
        tracing::warn!("⚠️  Viewer disabled, /api/open will not launch anything");
    }
    viewer.into()
}
