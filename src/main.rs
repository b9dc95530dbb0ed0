use clap::Parser;
use dotenvy::dotenv;
use pdf_workbench::config::AppConfig;
use pdf_workbench::infrastructure::{storage, viewer};
use pdf_workbench::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Local web workbench that turns images and documents into PDFs and redacts PDFs
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the staging and output folders (overrides PDF_WORKBENCH_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_workbench=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting PDF Workbench...");

    let mut config = AppConfig::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    info!(
        "🛡️  Config: Max Size={}MB, Download TTL={}s, Viewer={}",
        config.max_request_size / 1024 / 1024,
        config.download_ttl.as_secs(),
        config.viewer
    );

    // Setup Infrastructure
    let store = storage::setup_storage(&config)?;
    let viewer_service = viewer::setup_viewer(&config);

    let state = AppState::new(config.clone(), store, viewer_service);
    let lifecycle = state.lifecycle.clone();

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Pending download deletions are dropped; the files stay on disk
    lifecycle.shutdown();
    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("❌ Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("❌ Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
