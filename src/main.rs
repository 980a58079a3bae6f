use anyhow::Context;
use keel_axum::prelude::*;
use keel_axum::logging;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config: AppConfig = KeelConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    logging::init(&config.log).context("failed to initialize logging")?;

    let store: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
    store.connect().await.context("failed to connect the user store")?;

    let addr = config.server.addr();
    let served = KeelApp::new(config)
        .request_context()
        .request_logging()
        .compression()
        .cors(CorsLayer::permissive())
        .health_checks(store.clone())
        .mount(UsersController::new(store.clone()))
        .serve(&addr)
        .await;

    if let Err(e) = store.disconnect().await {
        warn!(error = %e, "failed to disconnect the user store");
    }
    served.context("server error")
}
