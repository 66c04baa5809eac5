use axum::extract::DefaultBodyLimit;
use std::env;
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod duration;
mod error;
mod manifest;
mod models;
mod package;
mod routes;
mod runtime;
mod subtitles;
mod util;
mod viewer;
mod xliff;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "rustiscorm_packager=info,tower_http=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::Config::from_env();
    std::fs::create_dir_all(&cfg.scratch_dir)?;
    let packager = package::Packager::new(&cfg.scratch_dir)
        .with_extract_limits(manifest::ExtractLimits::for_upload(cfg.max_upload_bytes));
    tracing::info!(scratch = %packager.scratch_root().display(), "scratch directory ready");

    let app = routes::router(packager)
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
