use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("DOORMAN_HTTP_PORT").unwrap_or_else(|_| "7878".to_string());
    let data_root = std::env::var("DOORMAN_DB_FOLDER").unwrap_or_else(|_| "data".to_string());
    let owner_identity = std::env::var("DOORMAN_OWNER_IDENTITY").ok();
    info!(
        target: "doorman",
        "doorman starting: RUST_LOG='{}', http_port={}, data_root='{}', owner_identity_set={}",
        rust_log, http_port, data_root, owner_identity.is_some()
    );

    let port = http_port.parse::<u16>().unwrap_or(7878);
    doorman::server::run_with_port(port, &data_root, owner_identity).await
}
