//! # Module Server - API de haut niveau pour Axum
//!
//! Ce module cache la configuration du routage Axum derrière quelques méthodes :
//!
//! - **Routes JSON simples** : `add_route()`
//! - **Sous-routers** : `add_router()`
//! - **Fichiers embarqués** : `add_assets()`
//! - **API documentée** : `add_openapi()` avec Swagger UI
//! - **Redirections** : `add_redirect()`
//! - **Gestion gracieuse** : arrêt propre sur Ctrl+C

use axum::response::Redirect;
use axum::routing::get;
use axum::{Json, Router};
use axum_embed::ServeEmbed;
use mpdashconfig::get_config;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{error, info};
use utoipa_swagger_ui::SwaggerUi;

/// Info serveur sérialisable
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub listen_address: String,
    pub http_port: u16,
}

/// Serveur principal
pub struct Server {
    name: String,
    listen_address: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// # Arguments
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `listen_address` - Adresse d'écoute (ex: "0.0.0.0")
    /// * `http_port` - Port HTTP à écouter
    pub fn new(
        name: impl Into<String>,
        listen_address: impl Into<String>,
        http_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            listen_address: listen_address.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
        }
    }

    /// Serveur configuré depuis `host.listen_address` et `host.http_port`
    pub fn new_configured() -> Self {
        ServerBuilder::new_configured().build()
    }

    /// Ajoute une route JSON dynamique
    ///
    /// La closure fournie est appelée à chaque requête GET sur le chemin spécifié.
    ///
    /// ```rust,no_run
    /// # use mpdashserver::Server;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", "127.0.0.1", 3000);
    /// server.add_route("/api/version", || async {
    ///     serde_json::json!({"version": "1.0.0"})
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let handler = move || {
            let f = f.clone();
            async move { Json(f().await) }
        };

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).route(path, get(handler));
    }

    /// Ajoute des fichiers statiques embarqués sous `path`
    ///
    /// Chaque fichier du dossier `E` est servi sous `{path}/{fichier}` par `ServeEmbed`
    /// (type MIME, ETag et `If-None-Match`).
    pub async fn add_assets<E>(&mut self, path: &str)
    where
        E: RustEmbed + Clone + Send + Sync + 'static,
    {
        let serve = ServeEmbed::<E>::new();
        let route = Router::new().fallback_service(serve);
        let path = path.trim_end_matches('/');

        let mut r = self.router.write().await;
        *r = if path.is_empty() {
            std::mem::take(&mut *r).merge(route)
        } else {
            std::mem::take(&mut *r).nest(path, route)
        };
    }

    /// Ajoute une API documentée par OpenAPI
    ///
    /// `api_router` porte déjà ses chemins complets et est fusionné tel quel. La
    /// spécification est servie sous `/api-docs/{name}.json` et Swagger UI sous
    /// `/swagger-ui/{name}`.
    pub async fn add_openapi(
        &mut self,
        api_router: Router,
        openapi: utoipa::openapi::OpenApi,
        name: &str,
    ) {
        // SwaggerUi exige des chemins 'static
        let swagger_path = format!("/swagger-ui/{}", name);
        let swagger_path_static: &'static str = Box::leak(swagger_path.into_boxed_str());
        let openapi_json_path = format!("/api-docs/{}.json", name);
        let openapi_json_path_static: &'static str =
            Box::leak(openapi_json_path.into_boxed_str());

        let swagger = SwaggerUi::new(swagger_path_static).url(openapi_json_path_static, openapi);

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).merge(api_router).merge(swagger);
        info!("API {} documented at {}", name, swagger_path_static);
    }

    /// Ajoute une redirection HTTP permanente (308)
    pub async fn add_redirect(&mut self, from: &str, to: &str) {
        let target = to.to_string();
        let handler = get(move || async move { Redirect::permanent(&target) });

        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).route(from, handler);
    }

    /// Ajoute un sous-router au serveur
    ///
    /// - Si `path` est "/", merge directement au router principal
    /// - Sinon, nest le router sous le chemin donné
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        let mut r = self.router.write().await;

        let combined = if path == "/" || path.is_empty() {
            std::mem::take(&mut *r).merge(sub_router)
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            std::mem::take(&mut *r).nest(&normalized, sub_router)
        };

        *r = combined;
    }

    /// Retourne une copie du router courant (utile pour les tests)
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Démarre le serveur HTTP
    ///
    /// L'adresse est liée avant de rendre la main : une erreur de bind est donc
    /// remontée à l'appelant. Le service tourne ensuite en tâche de fond jusqu'à Ctrl+C.
    pub async fn start(&mut self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.listen_address, self.http_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Server {} running at http://{}", self.name, addr);

        let router = self.router.read().await.clone();
        self.join_handle = Some(tokio::spawn(async move {
            let shutdown = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Ctrl+C reçu, arrêt gracieux");
            };

            if let Err(e) = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP server stopped with error: {}", e);
            }
        }));

        Ok(())
    }

    /// Attend la fin du serveur
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            listen_address: self.listen_address.clone(),
            http_port: self.http_port,
        }
    }
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    listen_address: String,
    http_port: u16,
}

impl ServerBuilder {
    /// Crée un nouveau builder
    pub fn new(
        name: impl Into<String>,
        listen_address: impl Into<String>,
        http_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            listen_address: listen_address.into(),
            http_port,
        }
    }

    /// Builder initialisé depuis la configuration globale (`host.listen_address`, `host.http_port`)
    /// Serveur configuré depuis `host.listen_address` et `host.http_port`
    pub fn new_configured() -> Self {
        let config = get_config();
        Self {
            name: "MPDash".to_string(),
            listen_address: config.get_listen_address(),
            http_port: config.get_http_port(),
        }
    }

    /// Construit le serveur
    pub fn build(self) -> Server {
        Server::new(self.name, self.listen_address, self.http_port)
    }
}
