use std::sync::Arc;

use mpdashconfig::get_config;
use mpdashcontrol::{DaemonSession, DashboardExt, MpdSession};
use mpdashserver::{LoggingOptions, Server, init_logging};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Configuration et logs ==========
    let config = get_config();
    if let Err(e) = init_logging(&LoggingOptions::from_config()) {
        eprintln!("Logging already initialized: {}", e);
    }
    info!("📁 Config directory: {}", config.directory());

    // ========== PHASE 2 : Session MPD ==========
    let session = Arc::new(MpdSession::from_config());
    info!("🎵 MPD daemon at {}", session.address());

    // Connexion paresseuse : un démon absent au démarrage n'empêche pas de servir
    match session.version().await {
        Ok(version) => info!("✅ Connected to MPD {}", version),
        Err(e) => warn!("⚠️ MPD not reachable yet: {}", e),
    }

    // ========== PHASE 3 : Serveur HTTP ==========
    let mut server = Server::new_configured();
    let dashboard = server.init_dashboard(session).await?;

    // Identité du serveur, hors du préfixe du tableau de bord
    let server_info = server.info();
    let info_route = server_info.clone();
    server
        .add_route("/info", move || {
            let info = info_route.clone();
            async move { info }
        })
        .await;

    server.start().await?;
    info!(
        "🌐 Dashboard ready at http://{}:{}{}/",
        server_info.listen_address,
        server_info.http_port,
        dashboard.prefix()
    );

    server.wait().await;
    info!("👋 MPDash stopped");
    Ok(())
}
