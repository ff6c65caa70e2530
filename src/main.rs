use clap::Parser;
use dotenvy::dotenv;
use pdf_master::config::AppConfig;
use pdf_master::infrastructure::{database, engines};
use pdf_master::services::staging::StagingArea;
use pdf_master::{AppState, create_app};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port for the API server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_master=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting PDF Master...");

    let mut config = AppConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    info!(
        "🛡️  Config: Max Size={}MB, Render DPI={}, OCR={}, CORS={}",
        config.max_file_size / 1024 / 1024,
        config.render_dpi,
        config.ocr_engine,
        config.cors_origins.join(",")
    );

    // 2. Setup Infrastructure
    let staging = StagingArea::prepare(&config.upload_dir).await?;
    info!("📁 Staging directory: {}", staging.root().display());

    let datastore = database::setup_database(&config).await;
    let renderer = engines::setup_renderer(&config).await;
    let recognizer = engines::setup_recognizer(&config).await;

    let state = AppState {
        config: config.clone(),
        staging,
        datastore,
        renderer,
        recognizer,
    };

    // Configure tracing layer for HTTP requests
    let trace_layer = TraceLayer::new_for_http()
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
        );

    let app = create_app(state).layer(trace_layer);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;

    info!("✅ API Server listening on: http://{}", config.bind_address());
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Shutting down PDF Master...");
    info!("👋 Server exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
