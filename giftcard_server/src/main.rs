use std::fs;

use dotenvy::dotenv;
use giftcard_engine::oracle::PriceProvider;
use giftcard_server::{
    config::{self, ServerConfig},
    server::run_server,
};
use log::{error, info};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if !preflight_check(&config) {
        eprintln!("🚦️ Preflight check failed. Exiting. Check the logs for details.");
        return;
    }

    info!("🚀️ Starting gift card API on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

fn preflight_check(config: &ServerConfig) -> bool {
    if config::skip_preflight() {
        info!("🚦️ Skipping preflight checks. I hope you know what you're doing!");
        return true;
    }
    let mut result = true;
    info!("🚦️ Running preflight checks...");

    // The node credential material must exist and be readable before anything dials out. The
    // macaroon is only ever sent over TLS, so both files are hard requirements.
    if let Err(e) = fs::read(&config.node.tls_cert_path) {
        error!("🚦️ Cannot read the node TLS certificate at {}: {e}", config.node.tls_cert_path);
        result = false;
    }
    if let Err(e) = fs::read(&config.node.macaroon_path) {
        error!("🚦️ Cannot read the node macaroon at {}: {e}", config.node.macaroon_path);
        result = false;
    }
    if config.database.user.is_empty() || config.database.database.is_empty() {
        error!("🚦️ GCB_DB_USER and GCB_DB_NAME must be set.");
        result = false;
    }
    if let Err(e) = PriceProvider::by_name(&config.oracle_provider, None, None) {
        error!("🚦️ {e}");
        result = false;
    }

    if result {
        info!("🚦️ Preflight check PASSED.");
    } else {
        error!("🚦️ Preflight check FAILED: Please fix the issues above before starting the server.");
        info!(
            "🚦️ If you really know what you're doing and want to skip the preflight check, set `GCB_SKIP_PREFLIGHT` \
             to `yes` in your environment variables"
        );
    }
    result
}
