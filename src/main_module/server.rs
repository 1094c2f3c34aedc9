//! HTTP server initialization and routing

use axum::{body::Body, http::Request, middleware::from_fn_with_state, routing::get, Router};
use log::{error, info};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::security::auth_api::auth_middleware;
use crate::security::cors::create_cors_layer;

use super::{health_check, health_check_simple, shutdown_signal};

/// Every route of the API, without the outer CORS and trace layers.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    let mut api_router = Router::new()
        .route("/health", get(health_check_simple))
        .route("/api/health", get(health_check))
        .merge(crate::products::configure_catalog_routes())
        .merge(crate::branches::configure_branches_routes())
        .merge(crate::customers::configure_customers_routes())
        .merge(crate::sales::configure_payment_types_routes())
        .merge(crate::inventory::configure_movement_types_routes())
        .merge(crate::inventory::configure_inventory_routes())
        .merge(crate::inventory::configure_movements_routes())
        .merge(crate::sales::configure_sales_routes())
        .merge(crate::credits::configure_credits_routes())
        .merge(crate::transfers::configure_transfers_routes())
        .merge(crate::directory::configure_users_routes());

    #[cfg(feature = "invoicing")]
    {
        api_router = api_router.merge(crate::invoicing::configure_invoicing_routes());
    }

    api_router
        .layer(from_fn_with_state(app_state.clone(), auth_middleware))
        .with_state(app_state)
}

pub fn build_app(app_state: Arc<AppState>) -> Router {
    let cors = create_cors_layer(app_state.config.server.cors_allowed_origins.clone());
    api_router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            tracing::info_span!("request", method = %req.method(), uri = %req.uri())
        }))
}

pub async fn run_axum_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let addr = app_state.config.bind_address();
    let app = build_app(app_state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e);
        }
    };
    info!("HTTP server listening on {addr}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}
