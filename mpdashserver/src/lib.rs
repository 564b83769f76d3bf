//! # mpdashserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit une abstraction simple pour monter le tableau de bord MPDash
//! sur un serveur HTTP Axum.
//!
//! ## Fonctionnalités
//!
//! - **Routes JSON simples** : `add_route()`
//! - **Routers complets** : `add_router()` pour les extensions (tableau de bord, API)
//! - **Fichiers statiques** : `add_assets()` avec `RustEmbed` et `axum-embed`
//! - **Documentation OpenAPI** : `add_openapi()` et Swagger UI
//! - **Redirections** : `add_redirect()`
//! - **Logs** : initialisation de `tracing` depuis la configuration
//! - **Arrêt gracieux** : gestion propre de Ctrl+C
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use mpdashserver::{ServerBuilder, logs::{LoggingOptions, init_logging}};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     init_logging(&LoggingOptions::default()).ok();
//!
//!     let mut server = ServerBuilder::new("MyServer", "127.0.0.1", 8080).build();
//!     server.add_route("/info", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LoggingOptions, init_logging};
pub use server::{Server, ServerBuilder, ServerInfo};
