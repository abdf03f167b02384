//! Route definitions for the proxy
//!
//! This module configures all HTTP routes and maps them to their respective handlers.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::config::Config;
use crate::database::MappingStore;
use crate::handler::{create_proxy_url, get_mapping, healthz, proxy_content};
use crate::pipeline::Pipeline;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub store: MappingStore,
}

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /{token}` - Proxies the URL behind the token (public endpoint)
/// - `POST /api/urls` - Issues a proxy link for a URL
/// - `GET /api/urls/{token}` - Mapping details and access count
/// - `GET /healthz` - Liveness probe
///
/// # Example Usage
///
/// ```no_run
/// # use std::sync::Arc;
/// # use linkproxy::config::Config;
/// # use linkproxy::database::{init_db, MappingStore};
/// # use linkproxy::pipeline::Pipeline;
/// # use linkproxy::route::{create_app, AppState};
/// let config = Config::default();
/// let db = init_db(&config.database_url).unwrap();
/// let state = AppState {
///     pipeline: Arc::new(Pipeline::from_config(&config).unwrap()),
///     store: MappingStore::new(Arc::new(db)),
///     config: Arc::new(config),
/// };
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/urls", post(create_proxy_url))
        .route("/urls/{token}", get(get_mapping));

    Router::new()
        .route("/healthz", get(healthz))
        // Public proxy endpoint - any single path segment is a candidate token
        .route("/{token}", get(proxy_content))
        .nest("/api", api_routes)
        .with_state(state)
}
