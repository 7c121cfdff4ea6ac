use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::admin::App;
use crate::http::connection::Connection;

pub async fn run(listen_addr: &str, app: Arc<App>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on {}", listen_addr);

    serve(listener, app).await
}

/// Accepts connections on an already bound listener, one task each.
pub async fn serve(listener: TcpListener, app: Arc<App>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!("Accepted connection from {}", peer);

        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, app);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
