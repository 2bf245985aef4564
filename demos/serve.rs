use axum::Router;
use axum_tus::{Configuration, MemoryStore, Options};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("axum_tus=debug,info")))
        .init();

    let options = Options {
        base_path: std::env::var("TUS_BASE_PATH").unwrap_or_else(|_| "/files".to_string()),
    };
    let addr = std::env::var("TUS_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

    let configuration = Configuration::builder(MemoryStore::new()).options(options).build();
    let base_path = configuration.base_path().to_string();

    let router = if base_path == "/" {
        axum_tus::router(configuration)
    } else {
        Router::new().nest_service(&base_path, axum_tus::router(configuration))
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %base_path, "serving tus uploads");
    axum::serve(listener, router).await
}
