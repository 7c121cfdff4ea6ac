use std::sync::Arc;

use fleet_admin::admin::{AdminService, App};
use fleet_admin::config::Config;
use fleet_admin::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let listen_addr = cfg.server.listen_addr.clone();

    let service = AdminService::from_config(cfg);
    service.store.ensure_index_exists().await?;
    let app = Arc::new(App::new(service)?);

    tokio::select! {
        res = server::listener::run(&listen_addr, app) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
